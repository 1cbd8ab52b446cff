//! Built-in resource types
//!
//! Every type steward can manage is registered here explicitly:
//! - `file` - regular files, directories and their permissions
//! - `exec` - commands run on change or on refresh
//! - `notify` - log a message

pub mod exec;
pub mod file;
pub mod notify;

use declarative::TypeRegistry;

/// Register the built-in types into an existing registry.
pub fn register_builtin(registry: &mut TypeRegistry) -> declarative::Result<()> {
    registry.register(file::descriptor())?;
    registry.register(exec::descriptor())?;
    registry.register(notify::descriptor())?;
    Ok(())
}

/// A registry holding only the built-in types.
pub fn registry() -> declarative::Result<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    register_builtin(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types() {
        let registry = registry().unwrap();
        for name in ["file", "exec", "notify", "File"] {
            assert!(registry.contains(name), "{name} not registered");
        }
        assert!(!registry.contains("package"));
    }

    #[test]
    fn test_register_twice_fails() {
        let mut registry = registry().unwrap();
        assert!(register_builtin(&mut registry).is_err());
    }

    #[test]
    fn test_attribute_order_starts_with_namevar() {
        let registry = registry().unwrap();
        let file = registry.get("file").unwrap();
        assert_eq!(file.attribute_order()[0], "path");
        let exec = registry.get("exec").unwrap();
        assert_eq!(exec.attribute_order()[0], "command");
    }
}
