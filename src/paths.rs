//! Centralized path resolution for stackwright
//!
//! # Environment Variables
//!
//! - `STACKWRIGHT_CONFIG_DIR` - Override the directory holding stack files
//! - `STACKWRIGHT_STATE_DIR` - Override the directory holding realized state
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `STACKWRIGHT_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/stackwright` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\stackwright`
//!    - macOS/Linux: `~/.config/stackwright`
//!
//! For state_dir():
//! 1. `STACKWRIGHT_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/stackwright` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\stackwright`
//!    - macOS/Linux: `~/.local/state/stackwright`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "STACKWRIGHT_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "STACKWRIGHT_STATE_DIR";

const APP_DIR: &str = "stackwright";

/// Get the stackwright config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join(APP_DIR);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the stackwright state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join(APP_DIR);
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Path of a named stack file: `<config_dir>/stacks/<name>.toml`
pub fn stack_file(name: &str) -> Result<PathBuf> {
    Ok(config_dir()?.join("stacks").join(format!("{name}.toml")))
}

/// Path of the realized state for a stack: `<state_dir>/<name>.toml`
pub fn state_file(stack: &str) -> Result<PathBuf> {
    Ok(state_dir()?.join(format!("{stack}.toml")))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with `key` set to `value` (or removed for `None`), restoring it after
    ///
    /// # Safety
    /// Uses unsafe env::set_var/remove_var. Each env var is only touched by a
    /// single test in this module.
    fn with_env<F, R>(key: &str, value: Option<&str>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        match value {
            // SAFETY: no other test reads or writes this variable concurrently
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        let result = f();
        match original {
            // SAFETY: as above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_state_dir_resolution() {
        with_env(ENV_STATE_DIR, Some("/custom/state/path"), || {
            assert_eq!(state_dir().unwrap(), PathBuf::from("/custom/state/path"));
            assert_eq!(
                state_file("web-app").unwrap(),
                PathBuf::from("/custom/state/path/web-app.toml")
            );
        });

        with_env(ENV_STATE_DIR, None, || {
            with_env("XDG_STATE_HOME", Some("/tmp/xdg-state-test"), || {
                assert_eq!(
                    state_dir().unwrap(),
                    PathBuf::from("/tmp/xdg-state-test/stackwright")
                );
            });
        });
    }

    #[test]
    fn test_config_dir_resolution() {
        let home = dirs::home_dir().unwrap();
        with_env(ENV_CONFIG_DIR, Some("~/dotfiles/stackwright"), || {
            assert_eq!(
                config_dir().unwrap(),
                home.join("dotfiles").join("stackwright")
            );
            assert_eq!(
                stack_file("web-app").unwrap(),
                home.join("dotfiles")
                    .join("stackwright")
                    .join("stacks")
                    .join("web-app.toml")
            );
        });

        let dir = tempfile::tempdir().unwrap();
        let stacks = dir.path().join("stacks");
        std::fs::create_dir_all(&stacks).unwrap();
        std::fs::write(stacks.join("web-app.toml"), "name = \"web-app\"\n").unwrap();
        with_env(ENV_CONFIG_DIR, dir.path().to_str(), || {
            let stack = crate::stack::Stack::load_named("web-app").unwrap();
            assert_eq!(stack.name(), "web-app");

            let err = crate::stack::Stack::load_named("missing").unwrap_err();
            assert!(err.to_string().contains("Could not read stack file"));
        });

        with_env(ENV_CONFIG_DIR, None, || {
            with_env("XDG_CONFIG_HOME", Some("/tmp/xdg-config-test"), || {
                assert_eq!(
                    config_dir().unwrap(),
                    PathBuf::from("/tmp/xdg-config-test/stackwright")
                );
            });
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
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }
}
