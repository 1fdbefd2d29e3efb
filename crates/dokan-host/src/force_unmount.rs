//! Force unmount of mounts this process does not track.
//!
//! Used for stale mounts left behind by a crashed host: the driver still
//! holds the mount point but no [`MountHandle`](crate::MountHandle) exists.
//!
//! **Caller must know the mount is theirs.** The driver unmounts whatever is
//! at the given point without further checks.

use crate::driver::Driver;
use crate::lifecycle::{MountHandle, StopOutcome, is_mounted};
use std::sync::Arc;
use tracing::{info, warn};

/// Issues both unmount calls for `mount_point`, best-effort.
///
/// A mount point this process still owns is left alone and reported as
/// [`StopOutcome::NotMounted`]; use [`stop`](crate::stop) for those.
pub fn force_unmount(driver: Arc<dyn Driver>, mount_point: &str) -> StopOutcome {
    if is_mounted(mount_point) {
        warn!(mount_point, "mount is live in this process, refusing force unmount");
        return StopOutcome::NotMounted;
    }
    info!(mount_point, "force unmounting");
    MountHandle::new(mount_point, driver).teardown()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDriver;

    #[test]
    fn test_force_unmount_calls_driver() {
        let mock = Arc::new(MockDriver::new());
        let outcome = force_unmount(mock.clone(), "R:");
        assert!(outcome.was_effectful());
        assert_eq!(mock.unmount_calls(), 1);
        assert_eq!(mock.remove_mount_point_calls(), 1);
    }
}
