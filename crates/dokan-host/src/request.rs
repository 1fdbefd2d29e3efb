//! Driver-shaped requests.
//!
//! Every callback the driver can deliver is one variant of
//! [`OperationRequest`]. Variants carry arguments in the driver's own
//! encoding (UTF-16 paths, raw byte buffers, signed offsets, FILETIMEs) and
//! borrow the driver's output slots mutably; the bridge decodes them, calls the
//! filesystem, and writes results back in place. A request lives for exactly
//! one callback invocation.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Longest name (in UTF-16 units, including the terminator) a find entry holds.
pub const MAX_PATH: usize = 260;

/// Length of the 8.3 alternate name field.
pub const ALTERNATE_NAME_LEN: usize = 14;

/// Borrowed UTF-16 string without its NUL terminator.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WideStr<'a>(&'a [u16]);

impl<'a> WideStr<'a> {
    /// Wraps a slice, stopping at the first NUL if present.
    pub fn new(units: &'a [u16]) -> Self {
        let len = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        Self(&units[..len])
    }

    /// The UTF-16 code units.
    pub fn as_units(&self) -> &'a [u16] {
        self.0
    }

    /// Decodes into a `String`; `None` for unpaired surrogates.
    pub fn to_string_checked(&self) -> Option<String> {
        String::from_utf16(self.0).ok()
    }
}

impl fmt::Debug for WideStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf16_lossy(self.0))
    }
}

/// Encodes a string as NUL-terminated UTF-16.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Copies `s` into `out` NUL-terminated, truncating to fit. Returns the
/// number of units written, excluding the terminator.
pub fn copy_wide(s: &str, out: &mut [u16]) -> usize {
    let Some(capacity) = out.len().checked_sub(1) else {
        return 0;
    };
    let mut written = 0;
    for (slot, unit) in out.iter_mut().zip(s.encode_utf16().take(capacity)) {
        *slot = unit;
        written += 1;
    }
    out[written] = 0;
    written
}

/// Per-handle state the driver passes with every callback.
///
/// `context` is the opaque slot the bridge fills on create and reads on every
/// later call for the same handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct FileInfo {
    /// Opaque context slot, 0 when no context is attached.
    pub context: u64,
    /// Process that issued the request.
    pub process_id: u32,
    /// Set by the bridge on create when the object is a directory.
    pub is_directory: bool,
    /// The handle will be deleted when cleaned up.
    pub delete_on_close: bool,
    /// Request originates from the paging path.
    pub paging_io: bool,
    /// Handle was opened for synchronous I/O.
    pub synchronous_io: bool,
    /// Caching disabled for this handle.
    pub no_cache: bool,
    /// Write should append regardless of the offset.
    pub write_to_end_of_file: bool,
}

impl FileInfo {
    /// File info as issued by `process_id` before any context is attached.
    pub fn for_process(process_id: u32) -> Self {
        Self {
            process_id,
            ..Default::default()
        }
    }
}

/// FILETIME: 100 ns intervals since 1601-01-01 UTC, split in two halves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct FileTime {
    /// Low 32 bits.
    pub low: u32,
    /// High 32 bits.
    pub high: u32,
}

/// 100 ns ticks between 1601-01-01 and 1970-01-01.
const EPOCH_DIFFERENCE_TICKS: u64 = 116_444_736_000_000_000;

impl FileTime {
    /// Sentinel asking the filesystem to stop updating the timestamp.
    pub const DISABLE_UPDATES: Self = Self {
        low: u32::MAX,
        high: u32::MAX,
    };

    /// Builds from the combined 64-bit tick count.
    pub fn from_ticks(ticks: u64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self {
            low: ticks as u32,
            high: (ticks >> 32) as u32,
        }
    }

    /// Combined 64-bit tick count.
    pub fn ticks(self) -> u64 {
        (u64::from(self.high) << 32) | u64::from(self.low)
    }

    /// Converts a system time; times before 1601 clamp to zero.
    pub fn from_system_time(time: SystemTime) -> Self {
        let ticks = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => EPOCH_DIFFERENCE_TICKS.saturating_add(duration_ticks(after)),
            Err(before) => EPOCH_DIFFERENCE_TICKS.saturating_sub(duration_ticks(before.duration())),
        };
        Self::from_ticks(ticks)
    }

    /// Converts to a system time.
    pub fn to_system_time(self) -> SystemTime {
        let ticks = self.ticks();
        if ticks >= EPOCH_DIFFERENCE_TICKS {
            UNIX_EPOCH + ticks_duration(ticks - EPOCH_DIFFERENCE_TICKS)
        } else {
            UNIX_EPOCH - ticks_duration(EPOCH_DIFFERENCE_TICKS - ticks)
        }
    }

    /// Zero and all-ones mean "leave unchanged" in set-time requests.
    pub fn is_unchanged_marker(self) -> bool {
        self.ticks() == 0 || self == Self::DISABLE_UPDATES
    }
}

fn duration_ticks(d: Duration) -> u64 {
    u64::try_from(d.as_nanos() / 100).unwrap_or(u64::MAX)
}

fn ticks_duration(ticks: u64) -> Duration {
    Duration::from_secs(ticks / 10_000_000) + Duration::from_nanos((ticks % 10_000_000) * 100)
}

/// Splits a 64-bit value into (high, low) halves.
#[allow(clippy::cast_possible_truncation)]
pub fn split_u64(value: u64) -> (u32, u32) {
    ((value >> 32) as u32, value as u32)
}

/// Output of get-file-information, laid out like `BY_HANDLE_FILE_INFORMATION`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct FileInformation {
    pub file_attributes: u32,
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub volume_serial_number: u32,
    pub file_size_high: u32,
    pub file_size_low: u32,
    pub number_of_links: u32,
    pub file_index_high: u32,
    pub file_index_low: u32,
}

impl FileInformation {
    /// Recombined file size.
    pub fn file_size(&self) -> u64 {
        (u64::from(self.file_size_high) << 32) | u64::from(self.file_size_low)
    }
}

/// One directory entry, laid out like `WIN32_FIND_DATAW`.
#[derive(Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct FindData {
    pub file_attributes: u32,
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub file_size_high: u32,
    pub file_size_low: u32,
    pub file_name: [u16; MAX_PATH],
    pub alternate_file_name: [u16; ALTERNATE_NAME_LEN],
}

impl Default for FindData {
    fn default() -> Self {
        Self {
            file_attributes: 0,
            creation_time: FileTime::default(),
            last_access_time: FileTime::default(),
            last_write_time: FileTime::default(),
            file_size_high: 0,
            file_size_low: 0,
            file_name: [0; MAX_PATH],
            alternate_file_name: [0; ALTERNATE_NAME_LEN],
        }
    }
}

impl FindData {
    /// Entry name up to the terminator.
    pub fn name(&self) -> String {
        String::from_utf16_lossy(WideStr::new(&self.file_name).as_units())
    }

    /// Recombined file size.
    pub fn file_size(&self) -> u64 {
        (u64::from(self.file_size_high) << 32) | u64::from(self.file_size_low)
    }
}

impl fmt::Debug for FindData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindData")
            .field("name", &self.name())
            .field("file_attributes", &self.file_attributes)
            .field("file_size", &self.file_size())
            .finish_non_exhaustive()
    }
}

/// Sink for find results; returns `true` once the driver's buffer is full.
pub type FillFindData<'a> = dyn FnMut(&FindData) -> bool + 'a;

/// Output of get-disk-free-space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DiskFreeSpaceOut {
    pub free_bytes_available: u64,
    pub total_number_of_bytes: u64,
    pub total_number_of_free_bytes: u64,
}

/// Output slots of get-volume-information.
#[derive(Debug)]
#[allow(missing_docs)]
pub struct VolumeInformationOut<'a> {
    /// Receives the NUL-terminated volume label.
    pub volume_name: &'a mut [u16],
    pub volume_serial_number: &'a mut u32,
    pub maximum_component_length: &'a mut u32,
    pub file_system_flags: &'a mut u32,
    /// Receives the NUL-terminated filesystem name.
    pub file_system_name: &'a mut [u16],
}

/// The closed set of callbacks the driver delivers.
#[allow(missing_docs)]
pub enum OperationRequest<'a> {
    /// `ZwCreateFile`: open or create.
    Create {
        path: WideStr<'a>,
        desired_access: u32,
        file_attributes: u32,
        share_access: u32,
        create_disposition: u32,
        create_options: u32,
        info: &'a mut FileInfo,
    },
    /// Last user handle closed.
    Cleanup {
        path: WideStr<'a>,
        info: &'a mut FileInfo,
    },
    /// Handle fully released.
    Close {
        path: WideStr<'a>,
        info: &'a mut FileInfo,
    },
    Read {
        path: WideStr<'a>,
        buffer: &'a mut [u8],
        bytes_read: &'a mut u32,
        offset: i64,
        info: &'a mut FileInfo,
    },
    Write {
        path: WideStr<'a>,
        data: &'a [u8],
        bytes_written: &'a mut u32,
        offset: i64,
        info: &'a mut FileInfo,
    },
    Flush {
        path: WideStr<'a>,
        info: &'a mut FileInfo,
    },
    GetFileInformation {
        path: WideStr<'a>,
        out: &'a mut FileInformation,
        info: &'a mut FileInfo,
    },
    /// Directory listing, optionally filtered by a wildcard pattern.
    FindFiles {
        path: WideStr<'a>,
        pattern: Option<WideStr<'a>>,
        fill: &'a mut FillFindData<'a>,
        info: &'a mut FileInfo,
    },
    SetFileAttributes {
        path: WideStr<'a>,
        attributes: u32,
        info: &'a mut FileInfo,
    },
    /// `None` when the driver passed no timestamp for that slot.
    SetFileTime {
        path: WideStr<'a>,
        creation: Option<FileTime>,
        last_access: Option<FileTime>,
        last_write: Option<FileTime>,
        info: &'a mut FileInfo,
    },
    /// May the file be deleted on close?
    DeleteFile {
        path: WideStr<'a>,
        info: &'a mut FileInfo,
    },
    /// May the directory be deleted on close?
    DeleteDirectory {
        path: WideStr<'a>,
        info: &'a mut FileInfo,
    },
    Move {
        path: WideStr<'a>,
        new_path: WideStr<'a>,
        replace_if_existing: bool,
        info: &'a mut FileInfo,
    },
    SetEndOfFile {
        path: WideStr<'a>,
        offset: i64,
        info: &'a mut FileInfo,
    },
    SetAllocationSize {
        path: WideStr<'a>,
        size: i64,
        info: &'a mut FileInfo,
    },
    LockFile {
        path: WideStr<'a>,
        offset: i64,
        length: i64,
        info: &'a mut FileInfo,
    },
    UnlockFile {
        path: WideStr<'a>,
        offset: i64,
        length: i64,
        info: &'a mut FileInfo,
    },
    GetDiskFreeSpace {
        out: &'a mut DiskFreeSpaceOut,
        info: &'a mut FileInfo,
    },
    GetVolumeInformation {
        out: VolumeInformationOut<'a>,
        info: &'a mut FileInfo,
    },
    GetFileSecurity {
        path: WideStr<'a>,
        security_information: u32,
        buffer: &'a mut [u8],
        length_needed: &'a mut u32,
        info: &'a mut FileInfo,
    },
    SetFileSecurity {
        path: WideStr<'a>,
        security_information: u32,
        descriptor: &'a [u8],
        info: &'a mut FileInfo,
    },
    /// The mount is live.
    Mounted,
    /// The mount is gone; no further callbacks follow.
    Unmounted,
}

/// Discriminant of [`OperationRequest`], used for logging and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum OperationKind {
    Create,
    Cleanup,
    Close,
    Read,
    Write,
    Flush,
    GetFileInformation,
    FindFiles,
    SetFileAttributes,
    SetFileTime,
    DeleteFile,
    DeleteDirectory,
    Move,
    SetEndOfFile,
    SetAllocationSize,
    LockFile,
    UnlockFile,
    GetDiskFreeSpace,
    GetVolumeInformation,
    GetFileSecurity,
    SetFileSecurity,
    Mounted,
    Unmounted,
}

impl OperationKind {
    /// Number of kinds.
    pub const COUNT: usize = 23;

    /// All kinds in declaration order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Create,
        Self::Cleanup,
        Self::Close,
        Self::Read,
        Self::Write,
        Self::Flush,
        Self::GetFileInformation,
        Self::FindFiles,
        Self::SetFileAttributes,
        Self::SetFileTime,
        Self::DeleteFile,
        Self::DeleteDirectory,
        Self::Move,
        Self::SetEndOfFile,
        Self::SetAllocationSize,
        Self::LockFile,
        Self::UnlockFile,
        Self::GetDiskFreeSpace,
        Self::GetVolumeInformation,
        Self::GetFileSecurity,
        Self::SetFileSecurity,
        Self::Mounted,
        Self::Unmounted,
    ];

    /// Dense index for counter arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Callback name as the driver documents it.
    pub fn name(self) -> &'static str {
        match self {
            Self::Create => "ZwCreateFile",
            Self::Cleanup => "Cleanup",
            Self::Close => "CloseFile",
            Self::Read => "ReadFile",
            Self::Write => "WriteFile",
            Self::Flush => "FlushFileBuffers",
            Self::GetFileInformation => "GetFileInformation",
            Self::FindFiles => "FindFiles",
            Self::SetFileAttributes => "SetFileAttributes",
            Self::SetFileTime => "SetFileTime",
            Self::DeleteFile => "DeleteFile",
            Self::DeleteDirectory => "DeleteDirectory",
            Self::Move => "MoveFile",
            Self::SetEndOfFile => "SetEndOfFile",
            Self::SetAllocationSize => "SetAllocationSize",
            Self::LockFile => "LockFile",
            Self::UnlockFile => "UnlockFile",
            Self::GetDiskFreeSpace => "GetDiskFreeSpace",
            Self::GetVolumeInformation => "GetVolumeInformation",
            Self::GetFileSecurity => "GetFileSecurity",
            Self::SetFileSecurity => "SetFileSecurity",
            Self::Mounted => "Mounted",
            Self::Unmounted => "Unmounted",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl OperationRequest<'_> {
    /// Which callback this is.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::Cleanup { .. } => OperationKind::Cleanup,
            Self::Close { .. } => OperationKind::Close,
            Self::Read { .. } => OperationKind::Read,
            Self::Write { .. } => OperationKind::Write,
            Self::Flush { .. } => OperationKind::Flush,
            Self::GetFileInformation { .. } => OperationKind::GetFileInformation,
            Self::FindFiles { .. } => OperationKind::FindFiles,
            Self::SetFileAttributes { .. } => OperationKind::SetFileAttributes,
            Self::SetFileTime { .. } => OperationKind::SetFileTime,
            Self::DeleteFile { .. } => OperationKind::DeleteFile,
            Self::DeleteDirectory { .. } => OperationKind::DeleteDirectory,
            Self::Move { .. } => OperationKind::Move,
            Self::SetEndOfFile { .. } => OperationKind::SetEndOfFile,
            Self::SetAllocationSize { .. } => OperationKind::SetAllocationSize,
            Self::LockFile { .. } => OperationKind::LockFile,
            Self::UnlockFile { .. } => OperationKind::UnlockFile,
            Self::GetDiskFreeSpace { .. } => OperationKind::GetDiskFreeSpace,
            Self::GetVolumeInformation { .. } => OperationKind::GetVolumeInformation,
            Self::GetFileSecurity { .. } => OperationKind::GetFileSecurity,
            Self::SetFileSecurity { .. } => OperationKind::SetFileSecurity,
            Self::Mounted => OperationKind::Mounted,
            Self::Unmounted => OperationKind::Unmounted,
        }
    }
}

impl fmt::Debug for OperationRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().name())
    }
}
