// Process-wide state behind the C ABI.

use std::ffi::CString;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use aptprobe_apt::AptEngine;
use aptprobe_core::{ConfigError, ConfigManager, ProbeConfig, ProbeContext, CONFIG_PATH_ENV};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::warn;

pub(crate) struct FfiState {
    pub(crate) ctx: ProbeContext,
    /// Backing storage for the pointer handed out by `aptprobe_error_message`
    pub(crate) message: CString,
}

impl FfiState {
    fn from_environment() -> Self {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let (config, load_error) = load_config(path.as_deref());

        let mut ctx = ProbeContext::new(AptEngine::from_config(&config.engine));
        if let Some(e) = load_error {
            warn!("Falling back to default configuration: {}", e);
            ctx.record_error(format!("configuration ignored: {}", e));
        }
        Self::with_context(ctx)
    }

    fn with_context(ctx: ProbeContext) -> Self {
        Self {
            ctx,
            message: CString::default(),
        }
    }

    /// Refresh the C copy of the last error. Interior NULs cannot cross the
    /// boundary and are dropped.
    pub(crate) fn error_message_ptr(&mut self) -> *const std::os::raw::c_char {
        let text: Vec<u8> = self
            .ctx
            .last_error()
            .bytes()
            .filter(|&b| b != 0)
            .collect();
        self.message = CString::new(text).unwrap_or_default();
        self.message.as_ptr()
    }
}

/// The library reads a config file only when the host names one; the host's
/// working and home directories are never searched.
fn load_config(path: Option<&Path>) -> (ProbeConfig, Option<ConfigError>) {
    match ConfigManager::load_without_search(path) {
        Ok(manager) => (manager.into_config(), None),
        Err(e) => (ProbeConfig::default(), Some(e)),
    }
}

static STATE: Lazy<Mutex<FfiState>> = Lazy::new(|| Mutex::new(FfiState::from_environment()));

/// Run `f` against the shared state with all callers serialized. A panic
/// never unwinds into the host: it is recorded as the last error and
/// `fallback` is returned instead.
pub(crate) fn with_state<T>(fallback: T, f: impl FnOnce(&mut FfiState) -> T) -> T {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut state = STATE.lock();
        f(&mut state)
    }));

    match result {
        Ok(value) => value,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            if let Some(mut state) = STATE.try_lock() {
                state.ctx.record_error(format!("internal error: {}", reason));
            }
            fallback
        }
    }
}

/// Swap the process-wide context, returning the previous one.
///
/// Lets a Rust host (or a test) run the C entry points against an engine of
/// its choosing.
pub fn install_context(ctx: ProbeContext) -> ProbeContext {
    let mut state = STATE.lock();
    let previous = std::mem::replace(&mut *state, FfiState::with_context(ctx));
    previous.ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn named_config_file_is_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aptprobe.toml");
        std::fs::write(&path, "[check]\nreboot_warning_hours = 12\n").unwrap();

        let (config, error) = load_config(Some(&path));
        assert!(error.is_none());
        assert_eq!(config.check.reboot_warning_hours, Some(12));
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[engine\n").unwrap();

        let (config, error) = load_config(Some(&path));
        assert!(matches!(error, Some(ConfigError::ParseError(_))));
        assert_eq!(config.check, ProbeConfig::default().check);

        let (_, error) = load_config(Some(&dir.path().join("absent.toml")));
        assert!(matches!(error, Some(ConfigError::NotFound(_))));
    }
}
