//! C ABI over [`aptprobe_core::ProbeContext`].
//!
//! Every entry point locks one process-wide context, so calls from
//! several host threads are serialized rather than racing. See
//! `include/aptprobe.h` for the C declarations.

mod state;

use std::ffi::CStr;
use std::os::raw::c_char;

use aptprobe_core::{UpgradeSummary, UPGRADE_SUMMARY_ABI_VERSION};
use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

pub use state::install_context;

/// C name of the summary record.
pub type AptprobeUpgradeSummary = UpgradeSummary;

/// Initialize the dependency engine. Idempotent; after a failure every
/// later call fails too, until the process restarts.
#[no_mangle]
pub extern "C" fn aptprobe_init() -> bool {
    state::with_state(false, |state| state.ctx.init().is_ok())
}

/// Simulate a full upgrade and write the outcome to `out`.
///
/// Returns false and leaves `*out` untouched on any failure.
///
/// # Safety
///
/// `out` must be null or point to memory valid for writing one
/// `AptprobeUpgradeSummary`.
#[no_mangle]
pub unsafe extern "C" fn aptprobe_upgrade_summary_get(out: *mut AptprobeUpgradeSummary) -> bool {
    state::with_state(false, |state| {
        if out.is_null() {
            state
                .ctx
                .record_error("aptprobe_upgrade_summary_get: null output record");
            return false;
        }
        match state.ctx.upgrade_summary() {
            Ok(summary) => {
                // SAFETY: non-null and writable per the caller contract
                unsafe { out.write_unaligned(summary) };
                true
            }
            Err(_) => false,
        }
    })
}

/// Set an engine configuration value. Takes effect for initialization if
/// called before the first `aptprobe_init`.
///
/// # Safety
///
/// `name` and `value` must each be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn aptprobe_configuration_set_string(
    name: *const c_char,
    value: *const c_char,
) {
    state::with_state((), |state| {
        // SAFETY: NUL-terminated or null per the caller contract
        let (name, value) = unsafe { (c_str(name), c_str(value)) };
        match (name, value) {
            (Some(name), Some(value)) => state.ctx.set_config(name, value),
            _ => state.ctx.record_error(
                "aptprobe_configuration_set_string: name and value must be non-null UTF-8",
            ),
        }
    })
}

/// Most recent error message, or an empty string. Never null. The pointer
/// stays valid until the next call into this library.
#[no_mangle]
pub extern "C" fn aptprobe_error_message() -> *const c_char {
    static EMPTY: &CStr = c"";
    state::with_state(EMPTY.as_ptr(), |state| state.error_message_ptr())
}

/// Toggle step tracing. Enabling it also routes log output to stderr.
#[no_mangle]
pub extern "C" fn aptprobe_set_debug(enabled: bool) {
    if enabled {
        install_stderr_logging();
    }
    state::with_state((), |state| state.ctx.set_trace(enabled))
}

/// Version of the summary record layout this library writes.
#[no_mangle]
pub extern "C" fn aptprobe_abi_version() -> u32 {
    UPGRADE_SUMMARY_ABI_VERSION
}

fn install_stderr_logging() {
    static INSTALLED: OnceCell<()> = OnceCell::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("aptprobe=debug,aptprobe_core=debug,aptprobe_apt=debug")
        });
        // The host may already own the global subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller contract
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}
