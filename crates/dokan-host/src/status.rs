//! Status vocabulary shared with the driver.
//!
//! Two code spaces cross the driver boundary:
//!
//! - [`NtStatus`]: the per-operation result every callback returns. Values
//!   `>= 0` are success; the named constants cover every status the bridge
//!   ever produces.
//! - [`MountStatus`]: the result of the blocking mount entry point. Zero is
//!   success, negative values are named mount failures.

use std::fmt;

/// NTSTATUS value returned from a driver callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct NtStatus(pub i32);

#[allow(clippy::cast_possible_wrap)]
impl NtStatus {
    /// Operation completed.
    pub const SUCCESS: Self = Self(0x0000_0000);
    /// Output buffer too small; the required length was reported.
    pub const BUFFER_OVERFLOW: Self = Self(0x8000_0005_u32 as i32);
    /// The filesystem does not provide this capability.
    pub const NOT_IMPLEMENTED: Self = Self(0xC000_0002_u32 as i32);
    /// No open context for the handle.
    pub const INVALID_HANDLE: Self = Self(0xC000_0008_u32 as i32);
    /// Malformed argument.
    pub const INVALID_PARAMETER: Self = Self(0xC000_000D_u32 as i32);
    /// Access denied.
    pub const ACCESS_DENIED: Self = Self(0xC000_0022_u32 as i32);
    /// Path could not be decoded or is not a legal name.
    pub const OBJECT_NAME_INVALID: Self = Self(0xC000_0033_u32 as i32);
    /// Final path component does not exist.
    pub const OBJECT_NAME_NOT_FOUND: Self = Self(0xC000_0034_u32 as i32);
    /// Object already exists (also "opened existing" for create).
    pub const OBJECT_NAME_COLLISION: Self = Self(0xC000_0035_u32 as i32);
    /// An intermediate directory does not exist.
    pub const OBJECT_PATH_NOT_FOUND: Self = Self(0xC000_003A_u32 as i32);
    /// Conflicting share access.
    pub const SHARING_VIOLATION: Self = Self(0xC000_0043_u32 as i32);
    /// Byte range is locked by another handle.
    pub const FILE_LOCK_CONFLICT: Self = Self(0xC000_0054_u32 as i32);
    /// Unlock of a range that was never locked.
    pub const RANGE_NOT_LOCKED: Self = Self(0xC000_007E_u32 as i32);
    /// No space left on the volume.
    pub const DISK_FULL: Self = Self(0xC000_007F_u32 as i32);
    /// Volume is write-protected.
    pub const MEDIA_WRITE_PROTECTED: Self = Self(0xC000_00A2_u32 as i32);
    /// Expected a file, found a directory.
    pub const FILE_IS_A_DIRECTORY: Self = Self(0xC000_00BA_u32 as i32);
    /// Request not supported.
    pub const NOT_SUPPORTED: Self = Self(0xC000_00BB_u32 as i32);
    /// A failure was caught at the callback boundary.
    pub const INTERNAL_ERROR: Self = Self(0xC000_00E5_u32 as i32);
    /// Directory still has entries.
    pub const DIRECTORY_NOT_EMPTY: Self = Self(0xC000_0101_u32 as i32);
    /// Expected a directory, found a file.
    pub const NOT_A_DIRECTORY: Self = Self(0xC000_0103_u32 as i32);
    /// Generic I/O failure.
    pub const IO_DEVICE_ERROR: Self = Self(0xC000_0185_u32 as i32);

    /// Every status the bridge can produce.
    pub const KNOWN: [Self; 21] = [
        Self::SUCCESS,
        Self::BUFFER_OVERFLOW,
        Self::NOT_IMPLEMENTED,
        Self::INVALID_HANDLE,
        Self::INVALID_PARAMETER,
        Self::ACCESS_DENIED,
        Self::OBJECT_NAME_INVALID,
        Self::OBJECT_NAME_NOT_FOUND,
        Self::OBJECT_NAME_COLLISION,
        Self::OBJECT_PATH_NOT_FOUND,
        Self::SHARING_VIOLATION,
        Self::FILE_LOCK_CONFLICT,
        Self::RANGE_NOT_LOCKED,
        Self::DISK_FULL,
        Self::MEDIA_WRITE_PROTECTED,
        Self::FILE_IS_A_DIRECTORY,
        Self::NOT_SUPPORTED,
        Self::INTERNAL_ERROR,
        Self::DIRECTORY_NOT_EMPTY,
        Self::NOT_A_DIRECTORY,
        Self::IO_DEVICE_ERROR,
    ];

    /// `NT_SUCCESS`: informational and success codes are non-negative.
    #[inline]
    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Whether this value is one of the named constants.
    pub fn is_known(self) -> bool {
        Self::KNOWN.contains(&self)
    }

    /// Symbolic name, e.g. `STATUS_ACCESS_DENIED`.
    pub fn name(self) -> &'static str {
        match self {
            Self::SUCCESS => "STATUS_SUCCESS",
            Self::BUFFER_OVERFLOW => "STATUS_BUFFER_OVERFLOW",
            Self::NOT_IMPLEMENTED => "STATUS_NOT_IMPLEMENTED",
            Self::INVALID_HANDLE => "STATUS_INVALID_HANDLE",
            Self::INVALID_PARAMETER => "STATUS_INVALID_PARAMETER",
            Self::ACCESS_DENIED => "STATUS_ACCESS_DENIED",
            Self::OBJECT_NAME_INVALID => "STATUS_OBJECT_NAME_INVALID",
            Self::OBJECT_NAME_NOT_FOUND => "STATUS_OBJECT_NAME_NOT_FOUND",
            Self::OBJECT_NAME_COLLISION => "STATUS_OBJECT_NAME_COLLISION",
            Self::OBJECT_PATH_NOT_FOUND => "STATUS_OBJECT_PATH_NOT_FOUND",
            Self::SHARING_VIOLATION => "STATUS_SHARING_VIOLATION",
            Self::FILE_LOCK_CONFLICT => "STATUS_FILE_LOCK_CONFLICT",
            Self::RANGE_NOT_LOCKED => "STATUS_RANGE_NOT_LOCKED",
            Self::DISK_FULL => "STATUS_DISK_FULL",
            Self::MEDIA_WRITE_PROTECTED => "STATUS_MEDIA_WRITE_PROTECTED",
            Self::FILE_IS_A_DIRECTORY => "STATUS_FILE_IS_A_DIRECTORY",
            Self::NOT_SUPPORTED => "STATUS_NOT_SUPPORTED",
            Self::INTERNAL_ERROR => "STATUS_INTERNAL_ERROR",
            Self::DIRECTORY_NOT_EMPTY => "STATUS_DIRECTORY_NOT_EMPTY",
            Self::NOT_A_DIRECTORY => "STATUS_NOT_A_DIRECTORY",
            Self::IO_DEVICE_ERROR => "STATUS_IO_DEVICE_ERROR",
            _ => "STATUS_UNRECOGNIZED",
        }
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[allow(clippy::cast_sign_loss)]
        let raw = self.0 as u32;
        write!(f, "{} (0x{raw:08X})", self.name())
    }
}

/// Result of the driver's blocking mount entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStatus {
    /// Mount ran and ended normally.
    Success,
    /// Unspecified driver failure.
    GeneralError,
    /// The drive letter is malformed or unusable.
    DriveLetterError,
    /// The kernel driver could not be installed.
    DriverInstallError,
    /// The kernel driver refused to start the device.
    StartError,
    /// The drive letter or mount point is already in use.
    MountError,
    /// The mount point is not a valid location.
    MountPointError,
    /// Driver and library versions are incompatible.
    VersionError,
    /// A code this crate does not know.
    Unrecognized(i32),
}

impl MountStatus {
    /// Decodes a raw driver return code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            -1 => Self::GeneralError,
            -2 => Self::DriveLetterError,
            -3 => Self::DriverInstallError,
            -4 => Self::StartError,
            -5 => Self::MountError,
            -6 => Self::MountPointError,
            -7 => Self::VersionError,
            other => Self::Unrecognized(other),
        }
    }

    /// The raw driver code.
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::GeneralError => -1,
            Self::DriveLetterError => -2,
            Self::DriverInstallError => -3,
            Self::StartError => -4,
            Self::MountError => -5,
            Self::MountPointError => -6,
            Self::VersionError => -7,
            Self::Unrecognized(code) => code,
        }
    }

    /// Whether the driver refused to establish the mount.
    pub fn is_failure(self) -> bool {
        self.code() < 0
    }

    /// Human-readable description used in error messages.
    pub fn description(self) -> String {
        match self {
            Self::Success => "success".to_string(),
            Self::GeneralError => "general mount error".to_string(),
            Self::DriveLetterError => "bad drive letter".to_string(),
            Self::DriverInstallError => "cannot install the driver".to_string(),
            Self::StartError => "the driver failed to start the device".to_string(),
            Self::MountError => {
                "mount point already in use or cannot be assigned".to_string()
            }
            Self::MountPointError => "mount point is invalid".to_string(),
            Self::VersionError => "driver/library version mismatch".to_string(),
            Self::Unrecognized(code) => format!("unrecognized mount status {code}"),
        }
    }
}

impl fmt::Display for MountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_non_negative() {
        assert!(NtStatus::SUCCESS.is_success());
        assert!(!NtStatus::ACCESS_DENIED.is_success());
        // Warnings are not NT_SUCCESS
        assert!(!NtStatus::BUFFER_OVERFLOW.is_success());
    }

    #[test]
    fn test_raw_values_match_ntstatus_h() {
        assert_eq!(NtStatus::NOT_IMPLEMENTED.0 as u32, 0xC000_0002);
        assert_eq!(NtStatus::OBJECT_NAME_NOT_FOUND.0 as u32, 0xC000_0034);
        assert_eq!(NtStatus::IO_DEVICE_ERROR.0 as u32, 0xC000_0185);
    }

    #[test]
    fn test_display_contains_name_and_hex() {
        let text = NtStatus::ACCESS_DENIED.to_string();
        assert!(text.contains("STATUS_ACCESS_DENIED"));
        assert!(text.contains("0xC0000022"));
        assert_eq!(NtStatus(0x1234).name(), "STATUS_UNRECOGNIZED");
    }

    #[test]
    fn test_mount_status_roundtrip_named_codes() {
        for code in 0..=7 {
            assert_eq!(MountStatus::from_code(-code).code(), -code);
        }
        assert_eq!(MountStatus::from_code(-42), MountStatus::Unrecognized(-42));
    }

    #[test]
    fn test_mount_status_descriptions() {
        assert_eq!(
            MountStatus::from_code(-7).description(),
            "driver/library version mismatch"
        );
        assert!(MountStatus::from_code(-5).description().contains("already in use"));
        assert!(MountStatus::from_code(-99).description().contains("-99"));
        assert!(!MountStatus::Success.is_failure());
        assert!(MountStatus::StartError.is_failure());
    }
}
