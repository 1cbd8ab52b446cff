//! Notify resource - log a message on every run

use anyhow::Result;
use declarative::{Parameters, Plain, Provider, TypeDescriptor, Value};

pub const TYPE_NAME: &str = "notify";

pub fn descriptor() -> TypeDescriptor {
    TypeDescriptor::builder(TYPE_NAME)
        .property("message", Plain)
        .provider("log", |_| Box::new(LogProvider))
        .build()
}

/// Never in sync; writing logs the message.
#[derive(Debug, Default)]
pub struct LogProvider;

impl Provider for LogProvider {
    fn retrieve(&mut self, _attribute: &str, _params: &Parameters) -> Result<Value> {
        Ok(Value::absent())
    }

    fn write(&mut self, _attribute: &str, value: &Value, params: &Parameters) -> Result<()> {
        log::warn!("{}: {value}", params.str("name").unwrap_or_default());
        Ok(())
    }

    fn refresh(&mut self, params: &Parameters) -> Result<Option<String>> {
        log::info!("{}: notified", params.str("name").unwrap_or_default());
        Ok(None)
    }
}
