//! Error types and their mapping onto the driver's status vocabulary.
//!
//! - [`FsError`]: per-operation failures reported by a [`FileSystem`](crate::FileSystem).
//!   Caught at the bridge and converted with [`FsError::to_ntstatus`]; never
//!   crosses the driver boundary as anything but an [`NtStatus`].
//! - [`ConfigurationError`]: malformed [`DeviceOptions`](crate::DeviceOptions).
//! - [`MountError`]: the mount could not be established. Returned from
//!   [`MountController::start`](crate::MountController::start).
//! - [`UnmountError`]: best-effort teardown failures. Logged and reported in
//!   [`StopOutcome`](crate::StopOutcome), never raised.

use crate::status::{MountStatus, NtStatus};
use std::io;
use thiserror::Error;

/// Failure reported by a filesystem implementation.
#[derive(Debug, Error)]
pub enum FsError {
    /// The final path component does not exist.
    #[error("not found")]
    NotFound,

    /// A parent directory of the path does not exist.
    #[error("path not found")]
    PathNotFound,

    /// Caller may not perform the operation.
    #[error("access denied")]
    AccessDenied,

    /// Target already exists.
    #[error("already exists")]
    AlreadyExists,

    /// Expected a directory.
    #[error("not a directory")]
    NotADirectory,

    /// Expected a file.
    #[error("is a directory")]
    IsADirectory,

    /// Directory still has entries.
    #[error("directory not empty")]
    DirectoryNotEmpty,

    /// Volume is full.
    #[error("no space left on volume")]
    NoSpace,

    /// Byte range held by another handle.
    #[error("byte range is locked")]
    Locked,

    /// Unlock of a range that is not locked.
    #[error("byte range is not locked")]
    RangeNotLocked,

    /// Incompatible share mode.
    #[error("sharing violation")]
    SharingViolation,

    /// Volume mounted write-protected.
    #[error("volume is write-protected")]
    ReadOnly,

    /// Name could not be decoded or is not legal.
    #[error("invalid name")]
    InvalidName,

    /// Malformed argument.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unknown or already closed handle.
    #[error("invalid handle")]
    InvalidHandle,

    /// The filesystem does not provide this capability.
    #[error("operation not implemented")]
    NotImplemented,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Anything the filesystem could not classify.
    #[error("unknown failure: {0}")]
    Unknown(String),
}

impl FsError {
    /// Convenience constructor for [`FsError::InvalidParameter`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        FsError::InvalidParameter(reason.into())
    }

    /// Converts this error to the status returned to the driver.
    ///
    /// Total: every variant maps to exactly one status, unclassified failures
    /// fall back to `STATUS_IO_DEVICE_ERROR`.
    pub fn to_ntstatus(&self) -> NtStatus {
        match self {
            FsError::NotFound => NtStatus::OBJECT_NAME_NOT_FOUND,
            FsError::PathNotFound => NtStatus::OBJECT_PATH_NOT_FOUND,
            FsError::AccessDenied => NtStatus::ACCESS_DENIED,
            FsError::AlreadyExists => NtStatus::OBJECT_NAME_COLLISION,
            FsError::NotADirectory => NtStatus::NOT_A_DIRECTORY,
            FsError::IsADirectory => NtStatus::FILE_IS_A_DIRECTORY,
            FsError::DirectoryNotEmpty => NtStatus::DIRECTORY_NOT_EMPTY,
            FsError::NoSpace => NtStatus::DISK_FULL,
            FsError::Locked => NtStatus::FILE_LOCK_CONFLICT,
            FsError::RangeNotLocked => NtStatus::RANGE_NOT_LOCKED,
            FsError::SharingViolation => NtStatus::SHARING_VIOLATION,
            FsError::ReadOnly => NtStatus::MEDIA_WRITE_PROTECTED,
            FsError::InvalidName => NtStatus::OBJECT_NAME_INVALID,
            FsError::InvalidParameter(_) => NtStatus::INVALID_PARAMETER,
            FsError::InvalidHandle => NtStatus::INVALID_HANDLE,
            FsError::NotImplemented => NtStatus::NOT_IMPLEMENTED,
            FsError::Io(e) => io_error_to_ntstatus(e),
            FsError::Unknown(_) => NtStatus::IO_DEVICE_ERROR,
        }
    }

    /// Whether the filesystem reported the capability as unsupported.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, FsError::NotImplemented)
    }
}

impl From<&FsError> for NtStatus {
    fn from(e: &FsError) -> Self {
        e.to_ntstatus()
    }
}

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Converts an I/O error to a status by its kind.
pub fn io_error_to_ntstatus(e: &io::Error) -> NtStatus {
    match e.kind() {
        io::ErrorKind::NotFound => NtStatus::OBJECT_NAME_NOT_FOUND,
        io::ErrorKind::PermissionDenied => NtStatus::ACCESS_DENIED,
        io::ErrorKind::AlreadyExists => NtStatus::OBJECT_NAME_COLLISION,
        io::ErrorKind::InvalidInput => NtStatus::INVALID_PARAMETER,
        io::ErrorKind::InvalidFilename => NtStatus::OBJECT_NAME_INVALID,
        io::ErrorKind::NotADirectory => NtStatus::NOT_A_DIRECTORY,
        io::ErrorKind::IsADirectory => NtStatus::FILE_IS_A_DIRECTORY,
        io::ErrorKind::DirectoryNotEmpty => NtStatus::DIRECTORY_NOT_EMPTY,
        io::ErrorKind::StorageFull => NtStatus::DISK_FULL,
        io::ErrorKind::ReadOnlyFilesystem => NtStatus::MEDIA_WRITE_PROTECTED,
        io::ErrorKind::Unsupported => NtStatus::NOT_SUPPORTED,
        _ => NtStatus::IO_DEVICE_ERROR,
    }
}

/// Invalid [`DeviceOptions`](crate::DeviceOptions).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Mount point is the empty string.
    #[error("mount point is empty")]
    EmptyMountPoint,

    /// Mount point is neither a drive letter nor an absolute path.
    #[error("mount point is not a drive letter or absolute path: {0}")]
    InvalidMountPoint(String),

    /// Thread count below one.
    #[error("thread count must be at least 1")]
    ZeroThreadCount,

    /// Volume security descriptor larger than the driver accepts.
    #[error(
        "security descriptor is {0} bytes, larger than the {max} byte limit",
        max = crate::options::MAX_SECURITY_DESCRIPTOR_LEN
    )]
    SecurityDescriptorTooLarge(usize),
}

/// The mount could not be established.
#[derive(Debug, Error)]
pub enum MountError {
    /// Options were rejected before contacting the driver.
    #[error("invalid device options: {0}")]
    Configuration(#[from] ConfigurationError),

    /// This process already has a live mount at the mount point.
    #[error("mount point {0} is already mounted by this process")]
    AlreadyMounted(String),

    /// The driver refused or failed to establish the mount.
    #[error("failed to mount {mount_point}: {}", status.description())]
    Driver {
        /// Mount point the driver was asked to use.
        mount_point: String,
        /// Decoded driver status.
        status: MountStatus,
    },

    /// No usable driver on this system.
    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),
}

impl MountError {
    /// The decoded driver status, when the driver produced the failure.
    pub fn driver_status(&self) -> Option<MountStatus> {
        match self {
            MountError::Driver { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A best-effort teardown step failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnmountError {
    /// The logical unmount for the drive letter was refused.
    #[error("driver refused to unmount drive {letter}")]
    Unmount {
        /// Drive letter passed to the driver.
        letter: char,
    },

    /// The mount-point registration could not be removed.
    #[error("driver refused to remove mount point {0}")]
    RemoveMountPoint(String),

    /// No drive letter could be derived from the mount point.
    #[error("mount point {0} has no drive letter")]
    NoDriveLetter(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_error_all_variants() {
        assert_eq!(FsError::NotFound.to_ntstatus(), NtStatus::OBJECT_NAME_NOT_FOUND);
        assert_eq!(FsError::PathNotFound.to_ntstatus(), NtStatus::OBJECT_PATH_NOT_FOUND);
        assert_eq!(FsError::AccessDenied.to_ntstatus(), NtStatus::ACCESS_DENIED);
        assert_eq!(FsError::AlreadyExists.to_ntstatus(), NtStatus::OBJECT_NAME_COLLISION);
        assert_eq!(FsError::NotADirectory.to_ntstatus(), NtStatus::NOT_A_DIRECTORY);
        assert_eq!(FsError::IsADirectory.to_ntstatus(), NtStatus::FILE_IS_A_DIRECTORY);
        assert_eq!(FsError::DirectoryNotEmpty.to_ntstatus(), NtStatus::DIRECTORY_NOT_EMPTY);
        assert_eq!(FsError::NoSpace.to_ntstatus(), NtStatus::DISK_FULL);
        assert_eq!(FsError::Locked.to_ntstatus(), NtStatus::FILE_LOCK_CONFLICT);
        assert_eq!(FsError::RangeNotLocked.to_ntstatus(), NtStatus::RANGE_NOT_LOCKED);
        assert_eq!(FsError::SharingViolation.to_ntstatus(), NtStatus::SHARING_VIOLATION);
        assert_eq!(FsError::ReadOnly.to_ntstatus(), NtStatus::MEDIA_WRITE_PROTECTED);
        assert_eq!(FsError::InvalidName.to_ntstatus(), NtStatus::OBJECT_NAME_INVALID);
        assert_eq!(FsError::invalid("x").to_ntstatus(), NtStatus::INVALID_PARAMETER);
        assert_eq!(FsError::InvalidHandle.to_ntstatus(), NtStatus::INVALID_HANDLE);
        assert_eq!(FsError::NotImplemented.to_ntstatus(), NtStatus::NOT_IMPLEMENTED);
        assert_eq!(
            FsError::Unknown("boom".into()).to_ntstatus(),
            NtStatus::IO_DEVICE_ERROR
        );
    }

    #[test]
    fn test_io_error_mapping() {
        let e = FsError::from(io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(e.to_ntstatus(), NtStatus::OBJECT_NAME_NOT_FOUND);

        let e = FsError::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(e.to_ntstatus(), NtStatus::ACCESS_DENIED);
    }

    #[test]
    fn test_io_error_without_known_kind_is_io_device_error() {
        let e = io::Error::other("custom error");
        assert_eq!(io_error_to_ntstatus(&e), NtStatus::IO_DEVICE_ERROR);
    }

    #[test]
    fn test_mount_error_display_uses_description() {
        let e = MountError::Driver {
            mount_point: "Z:".to_string(),
            status: MountStatus::VersionError,
        };
        let text = e.to_string();
        assert!(text.contains("Z:"));
        assert!(text.contains("version mismatch"));
        assert_eq!(e.driver_status(), Some(MountStatus::VersionError));
    }

    #[test]
    fn test_configuration_error_converts_into_mount_error() {
        let e: MountError = ConfigurationError::EmptyMountPoint.into();
        assert!(matches!(
            e,
            MountError::Configuration(ConfigurationError::EmptyMountPoint)
        ));
        assert!(e.driver_status().is_none());
    }
}
