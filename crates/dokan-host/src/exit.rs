//! Unmount-on-exit.
//!
//! A mount is armed here once the driver reports it live. On normal process
//! exit (`atexit`) or a termination signal (see [`crate::signal`]), every
//! armed mount is torn down. Teardown is one-shot per mount, so an explicit
//! stop followed by process exit unmounts only once.

use crate::lifecycle::{self, MountHandle, StopOutcome};
use dashmap::DashMap;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

static ARMED: LazyLock<DashMap<String, Arc<MountHandle>>> = LazyLock::new(DashMap::new);

static ATEXIT_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Registers `handle` for teardown at process exit.
pub(crate) fn arm(handle: Arc<MountHandle>) {
    install_atexit();
    debug!(mount_point = %handle.mount_point(), "exit cleanup armed");
    ARMED.insert(handle.key().to_string(), handle);
}

/// Removes `handle` from exit cleanup if it is still the armed one.
pub(crate) fn disarm(handle: &Arc<MountHandle>) {
    if ARMED
        .remove_if(handle.key(), |_, armed| Arc::ptr_eq(armed, handle))
        .is_some()
    {
        debug!(mount_point = %handle.mount_point(), "exit cleanup disarmed");
    }
}

/// Number of mounts that would be torn down at exit.
pub fn armed_count() -> usize {
    ARMED.len()
}

/// Tears down every armed mount now. Returns how many were unmounted.
///
/// Never panics; failures are logged.
pub fn run_exit_cleanup() -> usize {
    let keys: Vec<String> = ARMED.iter().map(|entry| entry.key().clone()).collect();
    keys.iter()
        .filter_map(|key| teardown_armed(key))
        .filter(StopOutcome::was_effectful)
        .count()
}

fn teardown_armed(key: &str) -> Option<StopOutcome> {
    let (_, handle) = ARMED.remove(key)?;
    info!(mount_point = %handle.mount_point(), "unmounting at exit");
    let outcome = lifecycle::stop_handle(&handle);
    if let StopOutcome::Incomplete(errors) = &outcome {
        warn!(
            mount_point = %handle.mount_point(),
            failures = errors.len(),
            "exit unmount incomplete"
        );
    }
    Some(outcome)
}

fn install_atexit() {
    if ATEXIT_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    // SAFETY: `on_process_exit` is a plain `extern "C"` function that never
    // unwinds.
    let rc = unsafe { libc::atexit(on_process_exit) };
    if rc != 0 {
        warn!(rc, "failed to register exit cleanup");
    }
}

extern "C" fn on_process_exit() {
    let _ = panic::catch_unwind(run_exit_cleanup);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Driver;
    use crate::testing::MockDriver;

    #[test]
    fn test_disarm_ignores_other_handle_for_same_key() {
        let driver: Arc<dyn Driver> = Arc::new(MockDriver::new());
        let first = Arc::new(MountHandle::new("Q:", Arc::clone(&driver)));
        let second = Arc::new(MountHandle::new("q:\\", driver));

        arm(Arc::clone(&first));
        disarm(&second);
        assert!(ARMED.contains_key(first.key()));
        disarm(&first);
        assert!(!ARMED.contains_key(first.key()));
    }

    #[test]
    fn test_exit_cleanup_tears_down_once() {
        let mock = Arc::new(MockDriver::new());
        let driver: Arc<dyn Driver> = mock.clone();
        let handle = Arc::new(MountHandle::new("P:", driver));

        arm(Arc::clone(&handle));
        assert!(teardown_armed(handle.key()).is_some_and(|o| o.was_effectful()));
        assert!(handle.is_torn_down());
        assert_eq!(mock.unmount_calls(), 1);

        // Nothing armed for this mount any more
        assert!(teardown_armed(handle.key()).is_none());
        assert_eq!(mock.unmount_calls(), 1);
    }
}
