//! Centralized path resolution for steward
//!
//! Run as root, steward behaves like a system agent and keeps its files in
//! `/etc/steward` and `/var/lib/steward`. Run as any other user it keeps them
//! under that user's XDG directories, which is handy for trying catalogs out.
//!
//! # Environment Variables
//!
//! - `STEWARD_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/steward`)
//! - `STEWARD_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `STEWARD_CONFIG_DIR` environment variable
//! 2. `/etc/steward` when running as root (Unix)
//! 3. `XDG_CONFIG_HOME/steward` (if set)
//! 4. Platform default:
//!    - Windows: `%APPDATA%\steward`
//!    - macOS/Linux: `~/.config/steward`
//!
//! For state_dir():
//! 1. `STEWARD_STATE_DIR` environment variable
//! 2. `/var/lib/steward` when running as root (Unix)
//! 3. `XDG_STATE_HOME/steward` (if set)
//! 4. Platform default:
//!    - Windows: `%LOCALAPPDATA%\steward`
//!    - macOS/Linux: `~/.local/state/steward`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "STEWARD_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "STEWARD_STATE_DIR";

/// Config directory used by a root agent
pub const SYSTEM_CONFIG_DIR: &str = "/etc/steward";

/// State directory used by a root agent
pub const SYSTEM_STATE_DIR: &str = "/var/lib/steward";

/// Name of the settings file inside the config directory
pub const SETTINGS_FILE: &str = "steward.toml";

/// Whether the process runs with root privileges.
#[cfg(unix)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Get the steward config directory path
///
/// Priority:
/// 1. `STEWARD_CONFIG_DIR` env var
/// 2. `/etc/steward` for root
/// 3. `XDG_CONFIG_HOME/steward`
/// 4. Platform default
pub fn config_dir() -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    // 2. System agent
    if is_root() {
        log::debug!("Using system config dir: {SYSTEM_CONFIG_DIR}");
        return Ok(PathBuf::from(SYSTEM_CONFIG_DIR));
    }

    // 3. Check XDG_CONFIG_HOME
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("steward");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    // 4. Platform default
    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("steward");
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    // Unix default: ~/.config/steward
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("steward");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the steward state directory path
///
/// Priority:
/// 1. `STEWARD_STATE_DIR` env var
/// 2. `/var/lib/steward` for root
/// 3. `XDG_STATE_HOME/steward`
/// 4. Platform default
pub fn state_dir() -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    // 2. System agent
    if is_root() {
        log::debug!("Using system state dir: {SYSTEM_STATE_DIR}");
        return Ok(PathBuf::from(SYSTEM_STATE_DIR));
    }

    // 3. Check XDG_STATE_HOME
    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("steward");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    // 4. Platform default
    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join("steward");
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    // Unix default: ~/.local/state/steward
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("steward");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Path of the settings file
pub fn settings_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(SETTINGS_FILE))
}

/// Expand ~ and environment variables in a path string.
///
/// This is the canonical path expansion function for steward. All modules
/// should use this instead of calling shellexpand directly.
///
/// # Examples
///
/// ```ignore
/// use crate::paths;
///
/// // Expands ~ to home directory
/// let home_path = paths::expand("~/dotfiles");
///
/// // Expands environment variables
/// let var_path = paths::expand("$HOME/dotfiles");
///
/// // Both work together
/// let mixed = paths::expand("~/${PROJECT}/config");
/// ```
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that touch the process environment
    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Helper to run a test with temporary env var
    ///
    /// # Safety
    /// This function uses unsafe env::set_var/remove_var which can cause issues
    /// if other threads read environment variables concurrently.
    /// Only use in single-threaded test contexts.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    /// Helper to run a test with env var removed
    ///
    /// # Safety
    /// This function uses unsafe env::remove_var/set_var which can cause issues
    /// if other threads read environment variables concurrently.
    /// Only use in single-threaded test contexts.
    fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: Tests run in isolation
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        let _env = env_lock();
        with_env_var(ENV_CONFIG_DIR, "/custom/config/path", || {
            let result = config_dir().unwrap();
            assert_eq!(result, PathBuf::from("/custom/config/path"));
        });
    }

    #[test]
    fn test_config_dir_env_override_with_tilde() {
        let _env = env_lock();
        // Use a unique env var value to avoid test interference
        let home = dirs::home_dir().unwrap();
        let expected = home.join("dotfiles").join("steward-tilde-test");
        with_env_var(ENV_CONFIG_DIR, "~/dotfiles/steward-tilde-test", || {
            let result = config_dir().unwrap();
            assert_eq!(result, expected);
        });
    }

    #[test]
    fn test_state_dir_env_override() {
        let _env = env_lock();
        with_env_var(ENV_STATE_DIR, "/custom/state/path", || {
            let result = state_dir().unwrap();
            assert_eq!(result, PathBuf::from("/custom/state/path"));
        });
    }

    #[test]
    fn test_xdg_config_home() {
        let _env = env_lock();
        without_env_var(ENV_CONFIG_DIR, || {
            with_env_var("XDG_CONFIG_HOME", "/tmp/xdg-config-test", || {
                let result = config_dir().unwrap();
                if is_root() {
                    assert_eq!(result, PathBuf::from(SYSTEM_CONFIG_DIR));
                } else {
                    assert_eq!(result, PathBuf::from("/tmp/xdg-config-test/steward"));
                }
            });
        });
    }

    #[test]
    fn test_xdg_state_home() {
        let _env = env_lock();
        without_env_var(ENV_STATE_DIR, || {
            with_env_var("XDG_STATE_HOME", "/tmp/xdg-state-test", || {
                let result = state_dir().unwrap();
                if is_root() {
                    assert_eq!(result, PathBuf::from(SYSTEM_STATE_DIR));
                } else {
                    assert_eq!(result, PathBuf::from("/tmp/xdg-state-test/steward"));
                }
            });
        });
    }

    #[test]
    fn test_settings_file_name() {
        let _env = env_lock();
        with_env_var(ENV_CONFIG_DIR, "/custom/settings", || {
            let result = settings_file().unwrap();
            assert_eq!(result, PathBuf::from("/custom/settings/steward.toml"));
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/test/path");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("test").join("path"));
    }

    #[test]
    fn test_expand_absolute() {
        let result = expand("/absolute/path");
        assert_eq!(result, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_with_env_var() {
        let _env = env_lock();
        with_env_var("STEWARD_TEST_VAR", "test_value", || {
            let result = expand("/path/$STEWARD_TEST_VAR/file");
            assert_eq!(result, PathBuf::from("/path/test_value/file"));
        });
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        // Unknown env vars are left as-is by shellexpand::full
        let result = expand("/path/$NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_VAR_12345/file"));
    }

    #[test]
    fn test_env_var_constants() {
        assert_eq!(ENV_CONFIG_DIR, "STEWARD_CONFIG_DIR");
        assert_eq!(ENV_STATE_DIR, "STEWARD_STATE_DIR");
    }

    #[cfg(unix)]
    #[test]
    fn test_default_state_dir_unix() {
        let _env = env_lock();
        without_env_var(ENV_STATE_DIR, || {
            without_env_var("XDG_STATE_HOME", || {
                let result = state_dir().unwrap();
                if is_root() {
                    assert_eq!(result, PathBuf::from(SYSTEM_STATE_DIR));
                } else {
                    let home = dirs::home_dir().unwrap();
                    assert_eq!(result, home.join(".local").join("state").join("steward"));
                }
            });
        });
    }
}
