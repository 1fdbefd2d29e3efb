//! Host a user-space filesystem behind the Dokan driver.
//!
//! The driver forwards every filesystem request made against a mounted
//! volume to callbacks in this process. This crate sits between those
//! callbacks and a Rust [`FileSystem`] implementation, and owns the mount
//! lifecycle around it.
//!
//! # Components
//!
//! ## Capability interface
//!
//! - [`FileSystem`] - Trait a filesystem implements; every capability except
//!   create and get-file-information defaults to "not implemented"
//! - [`FsError`] - Error vocabulary returned by filesystems, mapped to
//!   [`NtStatus`] at the boundary
//!
//! ## Bridge
//!
//! - [`OperationRequest`] - One decoded driver callback
//! - [`Dispatch`] - Object-safe entry point the driver calls into
//! - [`Bridge`] - Routes requests to a [`FileSystem`], threads per-handle
//!   contexts through a [`HandleTable`] and never lets a panic escape
//! - [`BridgeStats`] - Per-operation call counters
//!
//! ## Lifecycle
//!
//! - [`DeviceOptions`] - Mount configuration, validated before any driver
//!   call
//! - [`MountController`] - Blocking `start`, idempotent `stop`
//! - [`MountHandle`] - One-shot teardown of a single mount
//! - [`force_unmount`] - Tear down a mount left behind by another process
//!
//! Every mount started in this process is also torn down at process exit and
//! on termination signals (see [`install_signal_handler`]).
//!
//! ## Drivers
//!
//! - [`Driver`] - Seam to the driver library
//! - [`default_driver`] - The installed driver (Windows only)
//! - [`testing::MockDriver`] - In-process driver for tests
//!
//! # Example
//!
//! ```
//! use dokan_host::testing::MockDriver;
//! use dokan_host::{
//!     Call, CreateRequest, DeviceOptions, FileMetadata, FileSystem, FsResult, MountController,
//!     Opened,
//! };
//! use std::sync::Arc;
//! use std::time::{Duration, SystemTime};
//!
//! struct Empty;
//!
//! impl FileSystem for Empty {
//!     type Context = ();
//!
//!     fn create_file(&self, _path: &str, _request: &CreateRequest) -> FsResult<Opened<()>> {
//!         Ok(Opened::existing((), true))
//!     }
//!
//!     fn get_file_information(&self, _call: &Call<'_, ()>) -> FsResult<FileMetadata> {
//!         Ok(FileMetadata::directory(SystemTime::now()))
//!     }
//! }
//!
//! let driver = Arc::new(MockDriver::new());
//! let controller =
//!     Arc::new(MountController::new(DeviceOptions::new("Y:"), Empty, driver.clone()).unwrap());
//!
//! let runner = {
//!     let controller = Arc::clone(&controller);
//!     std::thread::spawn(move || controller.start())
//! };
//! assert!(driver.wait_until_mounted("Y:", Duration::from_secs(5)));
//!
//! assert!(dokan_host::stop("Y:").was_effectful());
//! runner.join().unwrap().unwrap();
//! assert!(!dokan_host::is_mounted("Y:"));
//! ```

#![warn(missing_docs)]

mod bridge;
mod driver;
mod error;
mod exit;
mod filesystem;
mod force_unmount;
mod handle_table;
mod lifecycle;
mod options;
mod request;
mod signal;
mod stats;
mod status;
mod wildcard;

#[cfg(windows)]
pub mod native;
pub mod testing;

pub use bridge::{
    Bridge, Dispatch, FILE_DELETE_ON_CLOSE, FILE_DIRECTORY_FILE, FILE_NON_DIRECTORY_FILE,
};
pub use driver::{Driver, DriverVersions, default_driver};
pub use error::{
    ConfigurationError, FsError, FsResult, MountError, UnmountError, io_error_to_ntstatus,
};
pub use exit::{armed_count, run_exit_cleanup};
pub use filesystem::{
    Call, CreateDisposition, CreateRequest, DirEntry, DirFiller, DiskSpace, FileAttributes,
    FileMetadata, FileSystem, FileTimes, OpenKind, Opened, VolumeInfo, WriteOffset,
};
pub use force_unmount::force_unmount;
pub use handle_table::HandleTable;
pub use lifecycle::{MountController, MountHandle, StopOutcome, is_mounted, live_mounts, stop};
pub use options::{
    DEFAULT_THREAD_COUNT, DEFAULT_TIMEOUT, DRIVER_ABI_VERSION, DeviceOptions,
    MAX_SECURITY_DESCRIPTOR_LEN, MINIMUM_COMPATIBLE_VERSION, MountFlags, SecurityDescriptor,
    drive_letter, normalize_mount_point,
};
pub use request::{
    ALTERNATE_NAME_LEN, DiskFreeSpaceOut, FileInfo, FileInformation, FileTime, FillFindData,
    FindData, MAX_PATH, OperationKind, OperationRequest, VolumeInformationOut, WideStr, copy_wide,
    split_u64, to_wide,
};
pub use signal::{install_signal_handler, shutdown_requested, wait_for_shutdown_timeout};
pub use stats::{BridgeStats, BridgeStatsSnapshot};
pub use status::{MountStatus, NtStatus};
pub use wildcard::name_matches_expression;
