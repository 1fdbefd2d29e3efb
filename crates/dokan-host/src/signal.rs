//! Signal-driven unmount using signal-hook.
//!
//! - First signal: sets the shutdown flag and tears down every armed mount,
//!   which returns control from the blocking mount call
//! - Second signal: immediate process exit
//!
//! Handles SIGINT, SIGTERM, and SIGHUP where it exists.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;
use tracing::warn;

#[cfg(unix)]
use signal_hook::consts::signal::SIGHUP;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

static INSTALLED: AtomicBool = AtomicBool::new(false);

static SHUTDOWN_CONDVAR: OnceLock<(Mutex<bool>, Condvar)> = OnceLock::new();

fn shutdown_condvar() -> &'static (Mutex<bool>, Condvar) {
    SHUTDOWN_CONDVAR.get_or_init(|| (Mutex::new(false), Condvar::new()))
}

/// Installs the termination signal handlers.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn install_signal_handler() -> Result<(), std::io::Error> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));

    for &sig in TERM_SIGNALS {
        // Order matters: the conditional exit must see the flag from the
        // previous signal, not this one.
        flag::register_conditional_shutdown(sig, 1, Arc::clone(&shutdown))?;
        flag::register(sig, Arc::clone(&shutdown))?;
    }

    #[cfg(unix)]
    {
        flag::register_conditional_shutdown(SIGHUP, 1, Arc::clone(&shutdown))?;
        flag::register(SIGHUP, Arc::clone(&shutdown))?;
    }

    let (lock, cvar) = shutdown_condvar();
    let flag = Arc::clone(&shutdown);
    std::thread::Builder::new()
        .name("dokan-signal".to_string())
        .spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(50));
            }
            SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
            warn!("shutdown requested, unmounting (signal again to force exit)");

            crate::exit::run_exit_cleanup();

            let mut guard = lock.lock();
            *guard = true;
            cvar.notify_all();
        })?;

    Ok(())
}

/// Whether a termination signal has been received.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Blocks until a signal was handled or `timeout` expires.
///
/// Returns `true` if shutdown was requested.
pub fn wait_for_shutdown_timeout(timeout: Duration) -> bool {
    if shutdown_requested() {
        return true;
    }

    let (lock, cvar) = shutdown_condvar();
    let mut guard = lock.lock();
    if *guard || shutdown_requested() {
        return true;
    }
    let result = cvar.wait_for(&mut guard, timeout);
    !result.timed_out() || shutdown_requested()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_handler_idempotent() {
        let _first = install_signal_handler();
        assert!(install_signal_handler().is_ok());
    }

    #[test]
    fn test_wait_times_out_without_signal() {
        if shutdown_requested() {
            return;
        }
        assert!(!wait_for_shutdown_timeout(Duration::from_millis(10)));
    }
}
