//! The driver seam.
//!
//! [`Driver`] is everything the lifecycle controller needs from the
//! user-mode driver library: version queries, the blocking mount entry point,
//! and the two unmount calls. `native::NativeDriver`
//! binds the real library on Windows; [`MockDriver`](crate::testing::MockDriver)
//! runs in-process for tests.

use crate::bridge::Dispatch;
use crate::error::MountError;
use crate::options::{DeviceOptions, MINIMUM_COMPATIBLE_VERSION};
use std::sync::Arc;
use tracing::{info, warn};

/// Operations provided by the driver library.
pub trait Driver: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str {
        "driver"
    }

    /// Version of the user-mode library, e.g. 151 for 1.5.1.
    fn library_version(&self) -> u32;

    /// Version of the kernel driver.
    fn driver_version(&self) -> u32;

    /// Mounts and blocks until the volume is unmounted.
    ///
    /// Returns the raw mount status: zero after a normal unmount, negative
    /// if the mount could not be established.
    fn run(&self, options: &DeviceOptions, dispatch: Arc<dyn Dispatch>) -> i32;

    /// Logical unmount of the volume at `letter`.
    fn unmount(&self, letter: char) -> bool;

    /// Removes the mount point registration.
    fn remove_mount_point(&self, mount_point: &str) -> bool;
}

/// Versions reported by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverVersions {
    /// User-mode library version.
    pub library: u32,
    /// Kernel driver version.
    pub driver: u32,
}

impl DriverVersions {
    /// Queries both versions.
    pub fn query(driver: &dyn Driver) -> Self {
        Self {
            library: driver.library_version(),
            driver: driver.driver_version(),
        }
    }

    /// Whether the library is at least [`MINIMUM_COMPATIBLE_VERSION`].
    ///
    /// Diagnostic only; the driver reports a real incompatibility at mount.
    pub fn is_compatible(&self) -> bool {
        self.library >= MINIMUM_COMPATIBLE_VERSION
    }

    /// Logs the versions, warning when the library looks too old.
    pub fn log(&self, driver_name: &str) {
        info!(
            driver = driver_name,
            library_version = self.library,
            driver_version = self.driver,
            "driver versions"
        );
        if !self.is_compatible() {
            warn!(
                library_version = self.library,
                minimum = MINIMUM_COMPATIBLE_VERSION,
                "driver library is older than supported, mount may fail"
            );
        }
    }
}

/// The platform driver.
///
/// Loads the native library on Windows; elsewhere there is no driver.
pub fn default_driver() -> Result<Arc<dyn Driver>, MountError> {
    #[cfg(windows)]
    {
        let driver = crate::native::NativeDriver::load()?;
        Ok(Arc::new(driver))
    }
    #[cfg(not(windows))]
    {
        Err(MountError::DriverUnavailable(
            "the driver is only available on Windows".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDriver;

    #[test]
    fn test_versions_query() {
        let driver = MockDriver::new().with_versions(151, 400);
        let versions = DriverVersions::query(&driver);
        assert_eq!(versions, DriverVersions { library: 151, driver: 400 });
        assert!(versions.is_compatible());
    }

    #[test]
    fn test_old_library_is_flagged() {
        let versions = DriverVersions {
            library: 100,
            driver: 100,
        };
        assert!(!versions.is_compatible());
        versions.log("mock");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_no_default_driver_off_windows() {
        assert!(matches!(default_driver(), Err(MountError::DriverUnavailable(_))));
    }
}
