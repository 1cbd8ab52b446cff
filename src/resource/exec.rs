//! Exec resource - run a command

use anyhow::{Context, Result, bail};
use declarative::{
    Parameters, ParamSpec, PropertyContext, PropertyKind, Provider, TypeDescriptor, Value,
};
use std::path::Path;
use std::process::Command;

pub const TYPE_NAME: &str = "exec";

/// Build the `exec` type descriptor.
///
/// The command runs whenever `returns` is out of sync, which is every run
/// unless `creates` names an existing path or `refreshonly` is set. A
/// refresh always runs it.
pub fn descriptor() -> TypeDescriptor {
    TypeDescriptor::builder(TYPE_NAME)
        .namevar("command")
        .property_with_default("returns", Returns, Value::Integer(0))
        .parameter(
            ParamSpec::new("refreshonly")
                .values(&["true", "false"])
                .default_value(Value::token("false")),
        )
        .parameter(ParamSpec::new("creates"))
        .parameter(ParamSpec::new("cwd"))
        .provider("shell", |_| Box::new(ShellProvider))
        .build()
}

/// Expected exit status.
#[derive(Debug)]
struct Returns;

impl PropertyKind for Returns {
    fn munge(&self, raw: Value) -> std::result::Result<Value, String> {
        match &raw {
            Value::Integer(_) => Ok(raw),
            other => other
                .as_str()
                .and_then(|s| s.trim().parse().ok())
                .map(Value::Integer)
                .ok_or_else(|| format!("{raw} is not an exit status")),
        }
    }

    fn insync(&self, current: &Value, should: &[Value], cx: &mut PropertyContext<'_>) -> bool {
        if cx.params.flag("refreshonly") {
            return true;
        }
        if let Some(creates) = cx.params.str("creates") {
            if Path::new(creates).exists() {
                log::debug!("{}: {creates} exists", cx.resource);
                return true;
            }
        }
        should.iter().any(|s| s == current)
    }

    fn event(&self, _name: &str) -> String {
        "executed_command".to_string()
    }
}

/// Runs commands through `sh -c`.
#[derive(Debug, Default)]
pub struct ShellProvider;

impl ShellProvider {
    fn run(params: &Parameters) -> Result<i64> {
        let command = params.str("command").context("exec resource has no command")?;
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(cwd) = params.str("cwd") {
            cmd.current_dir(cwd);
        }

        log::info!("Executing '{command}'");
        let output = cmd
            .output()
            .with_context(|| format!("Failed to execute '{command}'"))?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            log::debug!("{command}: {line}");
        }
        let code = output.status.code().map_or(-1, i64::from);
        if code != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::debug!("{command} exited with {code}: {}", stderr.trim());
        }
        Ok(code)
    }
}

impl Provider for ShellProvider {
    fn retrieve(&mut self, _attribute: &str, _params: &Parameters) -> Result<Value> {
        Ok(Value::token("notrun"))
    }

    fn write(&mut self, attribute: &str, value: &Value, params: &Parameters) -> Result<()> {
        let Some(expected) = value.as_integer() else {
            bail!("cannot write {value} to {attribute}");
        };
        let code = Self::run(params)?;
        if code != expected {
            bail!("returned {code} instead of {expected}");
        }
        Ok(())
    }

    fn refresh(&mut self, params: &Parameters) -> Result<Option<String>> {
        let code = Self::run(params)?;
        if code != 0 {
            bail!("returned {code} instead of 0");
        }
        Ok(Some("executed command".to_string()))
    }
}
