//! Test infrastructure for hosted filesystems.
//!
//! - [`MockDriver`]: an in-process [`Driver`](crate::Driver) with real mount
//!   lifecycle semantics (blocking `run`, notifications, unmount counting)
//! - [`DriverSession`]: issues driver-shaped requests against a dispatcher
//! - Assertions on [`NtStatus`](crate::NtStatus) results
//!
//! # Usage
//!
//! ```ignore
//! use dokan_host::testing::{DriverSession, MockDriver, assert_status_ok};
//!
//! let driver = Arc::new(MockDriver::new());
//! // ... start a MountController on a thread, then:
//! driver.wait_until_mounted("Z:", Duration::from_secs(5));
//! let session = DriverSession::new(driver.dispatcher("Z:").unwrap());
//! let mut info = assert_status_ok(session.create_file("\\a.txt"), "create");
//! ```

pub mod assertions;
mod mock_driver;
mod session;

pub use assertions::{assert_known_status, assert_status, assert_status_err, assert_status_ok};
pub use mock_driver::MockDriver;
pub use session::{DriverSession, StatusResult, VolumeInformation};
