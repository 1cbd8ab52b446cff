//! Restart on SIGHUP
//!
//! The handler only records the signal. The run in progress finishes first;
//! the entry point checks [`take_hangup`] afterwards and re-execs itself.

use std::sync::atomic::{AtomicBool, Ordering};

static HANGUP: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_hangup(_signal: libc::c_int) {
    HANGUP.store(true, Ordering::SeqCst);
}

/// Install the SIGHUP handler.
#[cfg(unix)]
pub fn install() {
    let handler = on_hangup as extern "C" fn(libc::c_int);
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe
    let previous = unsafe { libc::signal(libc::SIGHUP, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        log::warn!("Could not install SIGHUP handler");
    }
}

#[cfg(not(unix))]
pub fn install() {}

/// Whether a hangup arrived since the last call.
pub fn take_hangup() -> bool {
    HANGUP.swap(false, Ordering::SeqCst)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_hangup_is_recorded_once() {
        install();
        // SAFETY: raising a signal we just installed a handler for
        unsafe { libc::raise(libc::SIGHUP) };
        assert!(take_hangup());
        assert!(!take_hangup());
    }
}
