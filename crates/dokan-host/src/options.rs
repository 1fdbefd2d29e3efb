//! Device configuration handed to the driver at mount time.
//!
//! [`DeviceOptions`] is built by the caller (directly, through the builder
//! setters, or deserialized from a config file) and is immutable once a
//! [`MountController`](crate::MountController) owns it.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Library ABI version requested from the driver (1.5.0).
pub const DRIVER_ABI_VERSION: u16 = 150;

/// Oldest library version this crate knows how to talk to (1.1.0).
pub const MINIMUM_COMPATIBLE_VERSION: u32 = 110;

/// Default driver timeout before an unanswered request is cancelled.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of driver worker threads.
pub const DEFAULT_THREAD_COUNT: u16 = 5;

/// Largest volume security descriptor accepted.
pub const MAX_SECURITY_DESCRIPTOR_LEN: usize = 16 * 1024;

/// Capability flags requested from the driver.
///
/// Each field corresponds to one driver option bit; see [`MountFlags::bits`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct MountFlags {
    /// Driver debug output.
    pub debug: bool,
    /// Driver debug output goes to stderr.
    pub stderr: bool,
    /// Named streams are supported.
    pub alt_stream: bool,
    /// Volume is mounted read-only.
    pub write_protect: bool,
    /// Volume is a network drive (requires a UNC name).
    pub network: bool,
    /// Volume is removable media.
    pub removable: bool,
    /// Register with the mount manager.
    pub mount_manager: bool,
    /// Mount only in the current session.
    pub current_session: bool,
    /// Byte-range locks are handled in user mode.
    pub filelock_user_mode: bool,
}

impl MountFlags {
    /// `DOKAN_OPTION_DEBUG`
    pub const DEBUG: u32 = 1;
    /// `DOKAN_OPTION_STDERR`
    pub const STDERR: u32 = 2;
    /// `DOKAN_OPTION_ALT_STREAM`
    pub const ALT_STREAM: u32 = 4;
    /// `DOKAN_OPTION_WRITE_PROTECT`
    pub const WRITE_PROTECT: u32 = 8;
    /// `DOKAN_OPTION_NETWORK`
    pub const NETWORK: u32 = 16;
    /// `DOKAN_OPTION_REMOVABLE`
    pub const REMOVABLE: u32 = 32;
    /// `DOKAN_OPTION_MOUNT_MANAGER`
    pub const MOUNT_MANAGER: u32 = 64;
    /// `DOKAN_OPTION_CURRENT_SESSION`
    pub const CURRENT_SESSION: u32 = 128;
    /// `DOKAN_OPTION_FILELOCK_USER_MODE`
    pub const FILELOCK_USER_MODE: u32 = 256;

    /// Encodes the flags as the driver's option bitmask.
    pub fn bits(self) -> u32 {
        [
            (self.debug, Self::DEBUG),
            (self.stderr, Self::STDERR),
            (self.alt_stream, Self::ALT_STREAM),
            (self.write_protect, Self::WRITE_PROTECT),
            (self.network, Self::NETWORK),
            (self.removable, Self::REMOVABLE),
            (self.mount_manager, Self::MOUNT_MANAGER),
            (self.current_session, Self::CURRENT_SESSION),
            (self.filelock_user_mode, Self::FILELOCK_USER_MODE),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .fold(0, |acc, (_, bit)| acc | bit)
    }

    /// Decodes a driver option bitmask. Unknown bits are ignored.
    pub fn from_bits(bits: u32) -> Self {
        Self {
            debug: bits & Self::DEBUG != 0,
            stderr: bits & Self::STDERR != 0,
            alt_stream: bits & Self::ALT_STREAM != 0,
            write_protect: bits & Self::WRITE_PROTECT != 0,
            network: bits & Self::NETWORK != 0,
            removable: bits & Self::REMOVABLE != 0,
            mount_manager: bits & Self::MOUNT_MANAGER != 0,
            current_session: bits & Self::CURRENT_SESSION != 0,
            filelock_user_mode: bits & Self::FILELOCK_USER_MODE != 0,
        }
    }
}

/// Self-relative security descriptor applied to the volume.
///
/// Served for objects whose filesystem does not implement security queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityDescriptor(pub Vec<u8>);

impl SecurityDescriptor {
    /// Raw descriptor bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Configuration for one mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOptions {
    /// Drive letter (`Z:`) or absolute path of an empty NTFS folder.
    pub mount_point: String,

    /// Number of driver worker threads delivering callbacks.
    pub thread_count: u16,

    /// Capability flags.
    pub flags: MountFlags,

    /// Advisory request timeout forwarded to the driver.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// UNC name for network drives (`\\server\share`).
    pub unc_name: Option<String>,

    /// Allocation unit reported to the OS, 0 for the driver default.
    pub allocation_unit_size: u32,

    /// Sector size reported to the OS, 0 for the driver default.
    pub sector_size: u32,

    /// Library ABI version requested from the driver.
    pub version: u16,

    /// Volume-wide default security descriptor.
    pub security: Option<SecurityDescriptor>,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            mount_point: String::new(),
            thread_count: DEFAULT_THREAD_COUNT,
            flags: MountFlags::default(),
            timeout: DEFAULT_TIMEOUT,
            unc_name: None,
            allocation_unit_size: 0,
            sector_size: 0,
            version: DRIVER_ABI_VERSION,
            security: None,
        }
    }
}

impl DeviceOptions {
    /// Creates options for the given mount point with defaults elsewhere.
    pub fn new(mount_point: impl Into<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
            ..Default::default()
        }
    }

    /// Sets the worker thread count.
    #[must_use]
    pub fn thread_count(mut self, count: u16) -> Self {
        self.thread_count = count;
        self
    }

    /// Sets the capability flags.
    #[must_use]
    pub fn flags(mut self, flags: MountFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the advisory driver timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the UNC name used for network drives.
    #[must_use]
    pub fn unc_name(mut self, unc: impl Into<String>) -> Self {
        self.unc_name = Some(unc.into());
        self
    }

    /// Sets the volume-wide security descriptor.
    #[must_use]
    pub fn security(mut self, descriptor: SecurityDescriptor) -> Self {
        self.security = Some(descriptor);
        self
    }

    /// Timeout in whole milliseconds, saturated to the driver's field width.
    pub fn timeout_millis(&self) -> u32 {
        u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX)
    }

    /// Checks the invariants a mount needs before the driver is contacted.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.mount_point.is_empty() {
            return Err(ConfigurationError::EmptyMountPoint);
        }
        if !is_path_like(&self.mount_point) {
            return Err(ConfigurationError::InvalidMountPoint(
                self.mount_point.clone(),
            ));
        }
        if self.thread_count < 1 {
            return Err(ConfigurationError::ZeroThreadCount);
        }
        if let Some(sd) = &self.security
            && sd.0.len() > MAX_SECURITY_DESCRIPTOR_LEN
        {
            return Err(ConfigurationError::SecurityDescriptorTooLarge(sd.0.len()));
        }
        Ok(())
    }

    /// Registry key for this mount point, see [`normalize_mount_point`].
    pub fn normalized_mount_point(&self) -> String {
        normalize_mount_point(&self.mount_point)
    }
}

/// Drive letter of a mount point, if it starts with one.
pub fn drive_letter(mount_point: &str) -> Option<char> {
    let first = mount_point.chars().next()?;
    first.is_ascii_alphabetic().then(|| first.to_ascii_uppercase())
}

/// Canonical form used to compare mount points.
///
/// Drive letters become `X:`; paths lose trailing separators, use `\` and
/// compare case-insensitively.
pub fn normalize_mount_point(mount_point: &str) -> String {
    let trimmed = mount_point.trim();
    if is_bare_drive(trimmed)
        && let Some(letter) = drive_letter(trimmed)
    {
        return format!("{letter}:");
    }
    let unified = trimmed.replace('/', "\\");
    let stripped = unified.trim_end_matches('\\');
    stripped.to_lowercase()
}

/// `Z`, `Z:` or `Z:\`.
fn is_bare_drive(s: &str) -> bool {
    let bytes = s.as_bytes();
    match bytes {
        [l] => l.is_ascii_alphabetic(),
        [l, b':'] => l.is_ascii_alphabetic(),
        [l, b':', b'\\' | b'/'] => l.is_ascii_alphabetic(),
        _ => false,
    }
}

/// A drive letter or an absolute (`X:\...` or UNC) path.
fn is_path_like(s: &str) -> bool {
    if is_bare_drive(s) {
        return true;
    }
    let bytes = s.as_bytes();
    let drive_path = bytes.len() > 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'\\' | b'/');
    let unc = s.starts_with("\\\\") && s.len() > 2;
    drive_path || unc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = DeviceOptions::new("Z:");
        assert_eq!(opts.thread_count, DEFAULT_THREAD_COUNT);
        assert_eq!(opts.timeout, DEFAULT_TIMEOUT);
        assert_eq!(opts.version, DRIVER_ABI_VERSION);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let opts = DeviceOptions::new("Z:")
            .thread_count(4)
            .timeout(Duration::from_secs(5))
            .flags(MountFlags {
                removable: true,
                ..Default::default()
            });
        assert_eq!(opts.thread_count, 4);
        assert_eq!(opts.timeout_millis(), 5000);
        assert!(opts.flags.removable);
    }

    #[test]
    fn test_validate_rejects_empty_mount_point() {
        let opts = DeviceOptions::new("");
        assert_eq!(opts.validate(), Err(ConfigurationError::EmptyMountPoint));
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let opts = DeviceOptions::new("Z:").thread_count(0);
        assert_eq!(opts.validate(), Err(ConfigurationError::ZeroThreadCount));
    }

    #[test]
    fn test_validate_rejects_relative_paths() {
        for bad in ["mnt", "1:", "relative\\dir", "Z:relative"] {
            let opts = DeviceOptions::new(bad);
            assert!(
                matches!(opts.validate(), Err(ConfigurationError::InvalidMountPoint(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_accepts_drive_and_folder_mounts() {
        for good in ["Z", "z:", "Z:\\", "C:\\mnt\\vfs", "\\\\server\\share"] {
            assert!(DeviceOptions::new(good).validate().is_ok(), "{good}");
        }
    }

    #[test]
    fn test_validate_rejects_oversized_descriptor() {
        let opts = DeviceOptions::new("Z:").security(SecurityDescriptor(vec![
            0;
            MAX_SECURITY_DESCRIPTOR_LEN + 1
        ]));
        assert!(matches!(
            opts.validate(),
            Err(ConfigurationError::SecurityDescriptorTooLarge(_))
        ));
    }

    #[test]
    fn test_normalize_mount_point() {
        assert_eq!(normalize_mount_point("z"), "Z:");
        assert_eq!(normalize_mount_point("Z:\\"), "Z:");
        assert_eq!(normalize_mount_point("C:\\Mnt\\VFS\\"), "c:\\mnt\\vfs");
        assert_eq!(normalize_mount_point("C:/mnt/vfs"), "c:\\mnt\\vfs");
    }

    #[test]
    fn test_drive_letter() {
        assert_eq!(drive_letter("z:"), Some('Z'));
        assert_eq!(drive_letter("C:\\mnt"), Some('C'));
        assert_eq!(drive_letter("\\\\server\\share"), None);
        assert_eq!(drive_letter(""), None);
    }

    #[test]
    fn test_flag_bits() {
        let flags = MountFlags {
            write_protect: true,
            mount_manager: true,
            ..Default::default()
        };
        assert_eq!(flags.bits(), MountFlags::WRITE_PROTECT | MountFlags::MOUNT_MANAGER);
        assert_eq!(MountFlags::from_bits(flags.bits()), flags);
        assert_eq!(MountFlags::default().bits(), 0);
    }

    #[test]
    fn test_serde_humantime_timeout() {
        let json =
            r#"{"mount_point":"Z:","thread_count":2,"timeout":"45s","flags":{"removable":true}}"#;
        let opts: DeviceOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.timeout, Duration::from_secs(45));
        assert_eq!(opts.thread_count, 2);
        assert!(opts.flags.removable);
        assert_eq!(opts.version, DRIVER_ABI_VERSION);
    }
}
