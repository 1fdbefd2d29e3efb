//! The contract a hosted filesystem implements.
//!
//! The bridge decodes driver requests into the types here and calls one
//! [`FileSystem`] method per callback. Only [`FileSystem::create_file`] and
//! [`FileSystem::get_file_information`] are required; every other capability
//! defaults to [`FsError::NotImplemented`], which the driver sees as
//! `STATUS_NOT_IMPLEMENTED` while the mount stays up.
//!
//! Paths are decoded `\`-separated strings rooted at `\`. Calls for the same
//! path may arrive concurrently from different handles; the bridge adds no
//! locking of its own.

use crate::error::{FsError, FsResult};
use crate::request::FileInfo;
use std::fmt;
use std::time::SystemTime;

/// Windows file attribute bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileAttributes(pub u32);

impl FileAttributes {
    /// Read-only.
    pub const READONLY: Self = Self(0x1);
    /// Hidden from ordinary listings.
    pub const HIDDEN: Self = Self(0x2);
    /// Used by the operating system.
    pub const SYSTEM: Self = Self(0x4);
    /// The object is a directory.
    pub const DIRECTORY: Self = Self(0x10);
    /// Marked for backup.
    pub const ARCHIVE: Self = Self(0x20);
    /// No other attributes set.
    pub const NORMAL: Self = Self(0x80);
    /// Temporary storage.
    pub const TEMPORARY: Self = Self(0x100);

    /// Raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union.
    #[must_use]
    pub fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Clears the bits of `other`.
    #[must_use]
    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Whether no bits are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for FileAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileAttributes({:#x})", self.0)
    }
}

/// What to do when the target does or does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateDisposition {
    /// Replace if present, create otherwise.
    Supersede,
    /// Open; fail if absent.
    Open,
    /// Create; fail if present.
    Create,
    /// Open if present, create otherwise.
    OpenIf,
    /// Open and truncate; fail if absent.
    Overwrite,
    /// Open and truncate if present, create otherwise.
    OverwriteIf,
}

impl CreateDisposition {
    /// Decodes the driver's `CreateDisposition` value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Supersede,
            1 => Self::Open,
            2 => Self::Create,
            3 => Self::OpenIf,
            4 => Self::Overwrite,
            5 => Self::OverwriteIf,
            _ => return None,
        })
    }

    /// The driver's value.
    pub fn to_raw(self) -> u32 {
        match self {
            Self::Supersede => 0,
            Self::Open => 1,
            Self::Create => 2,
            Self::OpenIf => 3,
            Self::Overwrite => 4,
            Self::OverwriteIf => 5,
        }
    }

    /// Whether the disposition may create a missing object.
    pub fn may_create(self) -> bool {
        matches!(
            self,
            Self::Supersede | Self::Create | Self::OpenIf | Self::OverwriteIf
        )
    }

    /// Whether an existing object is truncated.
    pub fn truncates(self) -> bool {
        matches!(self, Self::Supersede | Self::Overwrite | Self::OverwriteIf)
    }

    /// Dispositions for which opening an existing object is reported as a
    /// name collision.
    pub fn reports_existing(self) -> bool {
        matches!(self, Self::Supersede | Self::OpenIf | Self::OverwriteIf)
    }
}

/// Object kind the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenKind {
    /// Either a file or a directory.
    Any,
    /// Must be a directory.
    Directory,
    /// Must not be a directory.
    File,
}

/// Decoded create arguments.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Requested access mask.
    pub desired_access: u32,
    /// Attributes for a newly created file.
    pub attributes: FileAttributes,
    /// Share mode.
    pub share_access: u32,
    /// Existing/missing behaviour.
    pub disposition: CreateDisposition,
    /// File or directory constraint.
    pub kind: OpenKind,
    /// Raw create option bits.
    pub create_options: u32,
    /// Handle deletes the object when closed.
    pub delete_on_close: bool,
    /// Requesting process.
    pub process_id: u32,
}

/// Successful create result.
#[derive(Debug)]
pub struct Opened<C> {
    /// Per-handle state passed back on every later call.
    pub context: C,
    /// Whether the opened object is a directory.
    pub is_directory: bool,
    /// Whether the object existed before this call.
    pub existed: bool,
}

impl<C> Opened<C> {
    /// A newly created object.
    pub fn created(context: C, is_directory: bool) -> Self {
        Self {
            context,
            is_directory,
            existed: false,
        }
    }

    /// An object that already existed.
    pub fn existing(context: C, is_directory: bool) -> Self {
        Self {
            context,
            is_directory,
            existed: true,
        }
    }
}

/// Borrowed arguments shared by every post-create callback.
#[derive(Debug)]
pub struct Call<'a, C> {
    /// Decoded path.
    pub path: &'a str,
    /// Context returned by `create_file` for this handle.
    pub context: &'a C,
    /// Driver flags for the request.
    pub info: &'a FileInfo,
}

/// Starting point of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOffset {
    /// Write at this byte offset, extending the file as needed.
    At(u64),
    /// Append.
    EndOfFile,
    /// Paging write: must not extend the file.
    Paging(u64),
}

/// Metadata returned by `get_file_information`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Attribute bits.
    pub attributes: FileAttributes,
    /// Creation time.
    pub creation_time: SystemTime,
    /// Last access time.
    pub last_access_time: SystemTime,
    /// Last write time.
    pub last_write_time: SystemTime,
    /// Size in bytes.
    pub size: u64,
    /// Hard link count.
    pub number_of_links: u32,
    /// Stable per-object index.
    pub file_index: u64,
    /// Serial number of the volume holding the object.
    pub volume_serial_number: u32,
}

impl FileMetadata {
    /// Metadata for a regular file with all times set to `now`.
    pub fn file(size: u64, now: SystemTime) -> Self {
        Self {
            attributes: FileAttributes::NORMAL,
            creation_time: now,
            last_access_time: now,
            last_write_time: now,
            size,
            number_of_links: 1,
            file_index: 0,
            volume_serial_number: 0,
        }
    }

    /// Metadata for a directory with all times set to `now`.
    pub fn directory(now: SystemTime) -> Self {
        Self {
            attributes: FileAttributes::DIRECTORY,
            ..Self::file(0, now)
        }
    }
}

/// One directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name without any path.
    pub name: String,
    /// Attribute bits.
    pub attributes: FileAttributes,
    /// Creation time.
    pub creation_time: SystemTime,
    /// Last access time.
    pub last_access_time: SystemTime,
    /// Last write time.
    pub last_write_time: SystemTime,
    /// Size in bytes.
    pub size: u64,
}

impl DirEntry {
    /// Builds an entry from an object's metadata.
    pub fn from_metadata(name: impl Into<String>, metadata: &FileMetadata) -> Self {
        Self {
            name: name.into(),
            attributes: metadata.attributes,
            creation_time: metadata.creation_time,
            last_access_time: metadata.last_access_time,
            last_write_time: metadata.last_write_time,
            size: metadata.size,
        }
    }
}

/// Receives directory entries during `find_files`.
///
/// `add` returns `true` once the driver's buffer is full; the filesystem
/// should stop enumerating and return `Ok(())`.
pub struct DirFiller<'a> {
    sink: &'a mut dyn FnMut(&DirEntry) -> bool,
    offered: usize,
    full: bool,
}

impl<'a> DirFiller<'a> {
    /// Wraps a sink that returns `true` when it can take no more entries.
    pub fn new(sink: &'a mut dyn FnMut(&DirEntry) -> bool) -> Self {
        Self {
            sink,
            offered: 0,
            full: false,
        }
    }

    /// Adds an entry. Returns `true` if the buffer is full.
    pub fn add(&mut self, entry: &DirEntry) -> bool {
        if self.full {
            return true;
        }
        self.full = (self.sink)(entry);
        self.offered += 1;
        self.full
    }

    /// Entries handed to the sink so far, including any it skipped.
    pub fn offered(&self) -> usize {
        self.offered
    }

    /// Whether the sink reported full.
    pub fn is_full(&self) -> bool {
        self.full
    }
}

impl fmt::Debug for DirFiller<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirFiller")
            .field("offered", &self.offered)
            .field("full", &self.full)
            .finish_non_exhaustive()
    }
}

/// Timestamps to update; `None` leaves the value unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTimes {
    /// New creation time.
    pub creation: Option<SystemTime>,
    /// New last access time.
    pub last_access: Option<SystemTime>,
    /// New last write time.
    pub last_write: Option<SystemTime>,
}

impl FileTimes {
    /// Whether nothing would change.
    pub fn is_empty(&self) -> bool {
        self.creation.is_none() && self.last_access.is_none() && self.last_write.is_none()
    }
}

/// Volume capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskSpace {
    /// Free bytes available to the caller.
    pub free_bytes_available: u64,
    /// Total volume size.
    pub total_bytes: u64,
    /// Free bytes on the volume.
    pub total_free_bytes: u64,
}

/// Volume identity and capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Label shown in Explorer.
    pub name: String,
    /// Serial number.
    pub serial_number: u32,
    /// Longest allowed path component.
    pub max_component_length: u32,
    /// `FILE_CASE_*` and related flags.
    pub fs_flags: u32,
    /// Filesystem name, e.g. `NTFS`.
    pub fs_name: String,
}

impl VolumeInfo {
    /// `FILE_CASE_SENSITIVE_SEARCH`
    pub const CASE_SENSITIVE_SEARCH: u32 = 0x1;
    /// `FILE_CASE_PRESERVED_NAMES`
    pub const CASE_PRESERVED_NAMES: u32 = 0x2;
    /// `FILE_UNICODE_ON_DISK`
    pub const UNICODE_ON_DISK: u32 = 0x4;
    /// `FILE_PERSISTENT_ACLS`
    pub const PERSISTENT_ACLS: u32 = 0x8;
    /// `FILE_READ_ONLY_VOLUME`
    pub const READ_ONLY_VOLUME: u32 = 0x0008_0000;
}

impl Default for VolumeInfo {
    fn default() -> Self {
        Self {
            name: "Dokan Volume".to_string(),
            serial_number: 0x1983_1116,
            max_component_length: 255,
            fs_flags: Self::CASE_PRESERVED_NAMES | Self::UNICODE_ON_DISK,
            fs_name: "NTFS".to_string(),
        }
    }
}

/// A filesystem hosted behind the driver.
///
/// Implementations must be thread-safe: the driver calls in from a pool of
/// worker threads. A panic inside any method is caught at the bridge and
/// reported to the driver as `STATUS_INTERNAL_ERROR`.
#[allow(unused_variables)]
pub trait FileSystem: Send + Sync + 'static {
    /// Per-open-handle state.
    type Context: Send + Sync + 'static;

    /// Opens or creates `path`.
    fn create_file(&self, path: &str, request: &CreateRequest) -> FsResult<Opened<Self::Context>>;

    /// Last user handle closed. `info.delete_on_close` asks for deletion.
    fn cleanup(&self, call: &Call<'_, Self::Context>) {}

    /// Handle released; the context is dropped afterwards.
    fn close(&self, call: &Call<'_, Self::Context>) {}

    /// Reads into `buffer` from `offset`, returning the byte count.
    fn read(
        &self,
        call: &Call<'_, Self::Context>,
        buffer: &mut [u8],
        offset: u64,
    ) -> FsResult<usize> {
        Err(FsError::NotImplemented)
    }

    /// Writes `data`, returning the byte count.
    fn write(
        &self,
        call: &Call<'_, Self::Context>,
        data: &[u8],
        offset: WriteOffset,
    ) -> FsResult<usize> {
        Err(FsError::NotImplemented)
    }

    /// Flushes buffered data.
    fn flush(&self, call: &Call<'_, Self::Context>) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Returns metadata for the handle.
    fn get_file_information(&self, call: &Call<'_, Self::Context>) -> FsResult<FileMetadata>;

    /// Lists the directory.
    fn find_files(&self, call: &Call<'_, Self::Context>, fill: &mut DirFiller<'_>) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Lists entries matching a wildcard pattern. Returning `NotImplemented`
    /// makes the driver fall back to `find_files` and filter itself.
    fn find_files_with_pattern(
        &self,
        call: &Call<'_, Self::Context>,
        pattern: &str,
        fill: &mut DirFiller<'_>,
    ) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Replaces the attribute bits.
    fn set_file_attributes(
        &self,
        call: &Call<'_, Self::Context>,
        attributes: FileAttributes,
    ) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Updates timestamps.
    fn set_file_times(&self, call: &Call<'_, Self::Context>, times: &FileTimes) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Whether the file may be deleted when the handle is cleaned up.
    fn delete_file(&self, call: &Call<'_, Self::Context>) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Whether the directory may be deleted when the handle is cleaned up.
    fn delete_directory(&self, call: &Call<'_, Self::Context>) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Renames the handle's object to `new_path`.
    fn move_file(
        &self,
        call: &Call<'_, Self::Context>,
        new_path: &str,
        replace_if_existing: bool,
    ) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Truncates or extends to `length`.
    fn set_end_of_file(&self, call: &Call<'_, Self::Context>, length: u64) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Sets the allocation size; shrinking below the file size truncates.
    fn set_allocation_size(&self, call: &Call<'_, Self::Context>, size: u64) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Locks a byte range.
    fn lock_file(&self, call: &Call<'_, Self::Context>, offset: u64, length: u64) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Unlocks a byte range.
    fn unlock_file(
        &self,
        call: &Call<'_, Self::Context>,
        offset: u64,
        length: u64,
    ) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// Volume capacity.
    fn get_disk_free_space(&self, info: &FileInfo) -> FsResult<DiskSpace> {
        Err(FsError::NotImplemented)
    }

    /// Volume identity.
    fn get_volume_information(&self, info: &FileInfo) -> FsResult<VolumeInfo> {
        Err(FsError::NotImplemented)
    }

    /// Self-relative security descriptor for the requested parts.
    fn get_file_security(
        &self,
        call: &Call<'_, Self::Context>,
        security_information: u32,
    ) -> FsResult<Vec<u8>> {
        Err(FsError::NotImplemented)
    }

    /// Applies a self-relative security descriptor.
    fn set_file_security(
        &self,
        call: &Call<'_, Self::Context>,
        security_information: u32,
        descriptor: &[u8],
    ) -> FsResult<()> {
        Err(FsError::NotImplemented)
    }

    /// The volume is visible.
    fn mounted(&self) -> FsResult<()> {
        Ok(())
    }

    /// The volume is gone.
    fn unmounted(&self) -> FsResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_decoding() {
        for raw in 0..=5 {
            let d = CreateDisposition::from_raw(raw).unwrap();
            assert_eq!(d.to_raw(), raw);
        }
        assert_eq!(CreateDisposition::from_raw(6), None);
        assert!(CreateDisposition::OpenIf.may_create());
        assert!(!CreateDisposition::Open.may_create());
        assert!(CreateDisposition::Overwrite.truncates());
        assert!(!CreateDisposition::Overwrite.reports_existing());
        assert!(CreateDisposition::OverwriteIf.reports_existing());
    }

    #[test]
    fn test_attributes_ops() {
        let attrs = FileAttributes::READONLY.with(FileAttributes::HIDDEN);
        assert!(attrs.contains(FileAttributes::READONLY));
        assert!(!attrs.contains(FileAttributes::DIRECTORY));
        assert_eq!(attrs.without(FileAttributes::READONLY), FileAttributes::HIDDEN);
        assert!(FileAttributes::default().is_empty());
    }

    #[test]
    fn test_dir_filler_stops_after_full() {
        let mut seen = Vec::new();
        let mut sink = |e: &DirEntry| {
            seen.push(e.name.clone());
            seen.len() == 2
        };
        let mut filler = DirFiller::new(&mut sink);
        let meta = FileMetadata::file(1, SystemTime::UNIX_EPOCH);
        assert!(!filler.add(&DirEntry::from_metadata("a", &meta)));
        assert!(filler.add(&DirEntry::from_metadata("b", &meta)));
        assert!(filler.add(&DirEntry::from_metadata("c", &meta)));
        assert_eq!(filler.offered(), 2);
        assert!(filler.is_full());
        drop(filler);
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_dir_filler_counts_skipped_entries_as_offered() {
        let mut kept = Vec::new();
        let mut sink = |e: &DirEntry| {
            if e.name.len() <= 4 {
                kept.push(e.name.clone());
            }
            false
        };
        let mut filler = DirFiller::new(&mut sink);
        let meta = FileMetadata::file(1, SystemTime::UNIX_EPOCH);
        assert!(!filler.add(&DirEntry::from_metadata("a", &meta)));
        assert!(!filler.add(&DirEntry::from_metadata("much-too-long", &meta)));
        assert_eq!(filler.offered(), 2);
        assert!(!filler.is_full());
        drop(filler);
        assert_eq!(kept, vec!["a"]);
    }

    #[test]
    fn test_directory_metadata() {
        let meta = FileMetadata::directory(SystemTime::UNIX_EPOCH);
        assert!(meta.attributes.contains(FileAttributes::DIRECTORY));
        assert_eq!(meta.size, 0);
    }
}
