//! Volume configuration.

use serde::{Deserialize, Serialize};

/// Default volume size: 512 MiB.
pub const DEFAULT_CAPACITY: u64 = 512 * 1024 * 1024;

/// How the in-memory volume presents itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemFsConfig {
    /// Volume label.
    pub label: String,
    /// Volume serial number.
    pub serial_number: u32,
    /// Total bytes file contents may occupy.
    pub capacity: u64,
    /// Filesystem name reported to the OS.
    pub fs_name: String,
    /// Refuse every modification.
    pub write_protect: bool,
}

impl Default for MemFsConfig {
    fn default() -> Self {
        Self {
            label: "MemFs".to_string(),
            serial_number: 0x4D45_4D46,
            capacity: DEFAULT_CAPACITY,
            fs_name: "NTFS".to_string(),
            write_protect: false,
        }
    }
}

impl MemFsConfig {
    /// Sets the volume label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the capacity in bytes.
    #[must_use]
    pub fn capacity(mut self, bytes: u64) -> Self {
        self.capacity = bytes;
        self
    }

    /// Makes the volume read-only.
    #[must_use]
    pub fn write_protect(mut self, enabled: bool) -> Self {
        self.write_protect = enabled;
        self
    }
}
