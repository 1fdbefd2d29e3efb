//! Issue driver-shaped requests without a driver.

use crate::bridge::{Dispatch, FILE_DIRECTORY_FILE, FILE_NON_DIRECTORY_FILE};
use crate::filesystem::CreateDisposition;
use crate::request::{
    DiskFreeSpaceOut, FileInfo, FileInformation, FileTime, FindData, OperationRequest,
    VolumeInformationOut, WideStr, to_wide,
};
use crate::status::NtStatus;
use crate::wildcard::name_matches_expression;
use std::sync::Arc;

/// Result of a request that only reports a status.
pub type StatusResult<T> = Result<T, NtStatus>;

fn check(status: NtStatus) -> StatusResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(status)
    }
}

/// Volume information decoded from the output buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInformation {
    /// Label.
    pub name: String,
    /// Serial number.
    pub serial_number: u32,
    /// Longest component.
    pub max_component_length: u32,
    /// Filesystem flags.
    pub fs_flags: u32,
    /// Filesystem name.
    pub fs_name: String,
}

/// Drives a [`Dispatch`] the way the driver would.
///
/// Every method encodes its arguments as the driver does (NUL-terminated
/// UTF-16, raw buffers, signed offsets) and returns the status or decoded
/// outputs.
pub struct DriverSession {
    dispatch: Arc<dyn Dispatch>,
    process_id: u32,
    find_capacity: Option<usize>,
    volume_name_capacity: usize,
}

impl std::fmt::Debug for DriverSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverSession")
            .field("process_id", &self.process_id)
            .field("find_capacity", &self.find_capacity)
            .finish_non_exhaustive()
    }
}

impl DriverSession {
    /// Session against `dispatch` as process 4242.
    pub fn new(dispatch: Arc<dyn Dispatch>) -> Self {
        Self {
            dispatch,
            process_id: 4242,
            find_capacity: None,
            volume_name_capacity: crate::request::MAX_PATH,
        }
    }

    /// Find buffers report full after `entries` entries.
    #[must_use]
    pub fn with_find_capacity(mut self, entries: usize) -> Self {
        self.find_capacity = Some(entries);
        self
    }

    /// Size in UTF-16 units of the volume and filesystem name buffers.
    #[must_use]
    pub fn with_volume_name_capacity(mut self, units: usize) -> Self {
        self.volume_name_capacity = units;
        self
    }

    /// Sends a raw request.
    pub fn dispatch(&self, request: OperationRequest<'_>) -> NtStatus {
        self.dispatch.dispatch(request)
    }

    /// `ZwCreateFile` with raw arguments. Returns the status and the file
    /// info the handle will use.
    pub fn create_raw(
        &self,
        path: &str,
        disposition: u32,
        create_options: u32,
        attributes: u32,
    ) -> (NtStatus, FileInfo) {
        let wide = to_wide(path);
        let mut info = FileInfo::for_process(self.process_id);
        let status = self.dispatch(OperationRequest::Create {
            path: WideStr::new(&wide),
            desired_access: 0x0012_019F,
            file_attributes: attributes,
            share_access: 0x7,
            create_disposition: disposition,
            create_options,
            info: &mut info,
        });
        (status, info)
    }

    fn create_with(
        &self,
        path: &str,
        disposition: CreateDisposition,
        create_options: u32,
    ) -> StatusResult<FileInfo> {
        let (status, info) = self.create_raw(path, disposition.to_raw(), create_options, 0);
        if status.is_success() || status == NtStatus::OBJECT_NAME_COLLISION {
            Ok(info)
        } else {
            Err(status)
        }
    }

    /// Opens an existing file or directory.
    pub fn open(&self, path: &str) -> StatusResult<FileInfo> {
        self.create_with(path, CreateDisposition::Open, 0)
    }

    /// Creates a new file.
    pub fn create_file(&self, path: &str) -> StatusResult<FileInfo> {
        self.create_with(path, CreateDisposition::Create, FILE_NON_DIRECTORY_FILE)
    }

    /// Creates a new directory.
    pub fn create_directory(&self, path: &str) -> StatusResult<FileInfo> {
        self.create_with(path, CreateDisposition::Create, FILE_DIRECTORY_FILE)
    }

    /// Opens a directory, failing if it is a file.
    pub fn open_directory(&self, path: &str) -> StatusResult<FileInfo> {
        self.create_with(path, CreateDisposition::Open, FILE_DIRECTORY_FILE)
    }

    /// Cleanup then close, as the driver does when the last handle goes.
    pub fn close_handle(&self, path: &str, info: &mut FileInfo) -> StatusResult<()> {
        self.cleanup(path, info)?;
        self.close(path, info)
    }

    /// `Cleanup`.
    pub fn cleanup(&self, path: &str, info: &mut FileInfo) -> StatusResult<()> {
        let wide = to_wide(path);
        check(self.dispatch(OperationRequest::Cleanup {
            path: WideStr::new(&wide),
            info,
        }))
    }

    /// `CloseFile`.
    pub fn close(&self, path: &str, info: &mut FileInfo) -> StatusResult<()> {
        let wide = to_wide(path);
        check(self.dispatch(OperationRequest::Close {
            path: WideStr::new(&wide),
            info,
        }))
    }

    /// `ReadFile` into a buffer of `len` bytes.
    pub fn read(
        &self,
        path: &str,
        info: &mut FileInfo,
        offset: i64,
        len: usize,
    ) -> StatusResult<Vec<u8>> {
        let wide = to_wide(path);
        let mut buffer = vec![0u8; len];
        let mut read = 0u32;
        check(self.dispatch(OperationRequest::Read {
            path: WideStr::new(&wide),
            buffer: &mut buffer,
            bytes_read: &mut read,
            offset,
            info,
        }))?;
        buffer.truncate(read as usize);
        Ok(buffer)
    }

    /// `WriteFile`. Returns bytes written.
    pub fn write(
        &self,
        path: &str,
        info: &mut FileInfo,
        offset: i64,
        data: &[u8],
    ) -> StatusResult<u32> {
        let wide = to_wide(path);
        let mut written = 0u32;
        check(self.dispatch(OperationRequest::Write {
            path: WideStr::new(&wide),
            data,
            bytes_written: &mut written,
            offset,
            info,
        }))?;
        Ok(written)
    }

    /// `FlushFileBuffers`.
    pub fn flush(&self, path: &str, info: &mut FileInfo) -> StatusResult<()> {
        let wide = to_wide(path);
        check(self.dispatch(OperationRequest::Flush {
            path: WideStr::new(&wide),
            info,
        }))
    }

    /// `GetFileInformation`.
    pub fn get_file_information(
        &self,
        path: &str,
        info: &mut FileInfo,
    ) -> StatusResult<FileInformation> {
        let wide = to_wide(path);
        let mut out = FileInformation::default();
        check(self.dispatch(OperationRequest::GetFileInformation {
            path: WideStr::new(&wide),
            out: &mut out,
            info,
        }))?;
        Ok(out)
    }

    fn find(
        &self,
        path: &str,
        pattern: Option<&str>,
        info: &mut FileInfo,
    ) -> StatusResult<Vec<FindData>> {
        let wide = to_wide(path);
        let wide_pattern = pattern.map(to_wide);
        let capacity = self.find_capacity;
        let mut entries = Vec::new();
        let mut fill = |data: &FindData| -> bool {
            entries.push(*data);
            capacity.is_some_and(|c| entries.len() >= c)
        };
        let status = self.dispatch(OperationRequest::FindFiles {
            path: WideStr::new(&wide),
            pattern: wide_pattern.as_deref().map(WideStr::new),
            fill: &mut fill,
            info,
        });
        check(status)?;
        Ok(entries)
    }

    /// `FindFiles`.
    pub fn find_files(&self, path: &str, info: &mut FileInfo) -> StatusResult<Vec<FindData>> {
        self.find(path, None, info)
    }

    /// `FindFilesWithPattern`, falling back to `FindFiles` plus wildcard
    /// filtering when the filesystem does not implement it.
    pub fn find_files_with_pattern(
        &self,
        path: &str,
        pattern: &str,
        info: &mut FileInfo,
    ) -> StatusResult<Vec<FindData>> {
        match self.find(path, Some(pattern), info) {
            Err(NtStatus::NOT_IMPLEMENTED) => {
                let mut entries = self.find(path, None, info)?;
                entries.retain(|e| name_matches_expression(pattern, &e.name()));
                Ok(entries)
            }
            other => other,
        }
    }

    /// `SetFileAttributes`.
    pub fn set_file_attributes(
        &self,
        path: &str,
        info: &mut FileInfo,
        attributes: u32,
    ) -> StatusResult<()> {
        let wide = to_wide(path);
        check(self.dispatch(OperationRequest::SetFileAttributes {
            path: WideStr::new(&wide),
            attributes,
            info,
        }))
    }

    /// `SetFileTime`.
    pub fn set_file_time(
        &self,
        path: &str,
        info: &mut FileInfo,
        creation: Option<FileTime>,
        last_access: Option<FileTime>,
        last_write: Option<FileTime>,
    ) -> StatusResult<()> {
        let wide = to_wide(path);
        check(self.dispatch(OperationRequest::SetFileTime {
            path: WideStr::new(&wide),
            creation,
            last_access,
            last_write,
            info,
        }))
    }

    /// `DeleteFile`.
    pub fn delete_file(&self, path: &str, info: &mut FileInfo) -> StatusResult<()> {
        let wide = to_wide(path);
        check(self.dispatch(OperationRequest::DeleteFile {
            path: WideStr::new(&wide),
            info,
        }))
    }

    /// `DeleteDirectory`.
    pub fn delete_directory(&self, path: &str, info: &mut FileInfo) -> StatusResult<()> {
        let wide = to_wide(path);
        check(self.dispatch(OperationRequest::DeleteDirectory {
            path: WideStr::new(&wide),
            info,
        }))
    }

    /// Marks the handle delete-on-close after the filesystem agreed, then
    /// closes it. This is how the driver deletes.
    pub fn delete(&self, path: &str) -> StatusResult<()> {
        let mut info = self.open(path)?;
        let allowed = if info.is_directory {
            self.delete_directory(path, &mut info)
        } else {
            self.delete_file(path, &mut info)
        };
        if let Err(status) = allowed {
            self.close_handle(path, &mut info)?;
            return Err(status);
        }
        info.delete_on_close = true;
        self.close_handle(path, &mut info)
    }

    /// `MoveFile`.
    pub fn move_file(
        &self,
        path: &str,
        info: &mut FileInfo,
        new_path: &str,
        replace: bool,
    ) -> StatusResult<()> {
        let wide = to_wide(path);
        let wide_new = to_wide(new_path);
        check(self.dispatch(OperationRequest::Move {
            path: WideStr::new(&wide),
            new_path: WideStr::new(&wide_new),
            replace_if_existing: replace,
            info,
        }))
    }

    /// `SetEndOfFile`.
    pub fn set_end_of_file(
        &self,
        path: &str,
        info: &mut FileInfo,
        offset: i64,
    ) -> StatusResult<()> {
        let wide = to_wide(path);
        check(self.dispatch(OperationRequest::SetEndOfFile {
            path: WideStr::new(&wide),
            offset,
            info,
        }))
    }

    /// `SetAllocationSize`.
    pub fn set_allocation_size(
        &self,
        path: &str,
        info: &mut FileInfo,
        size: i64,
    ) -> StatusResult<()> {
        let wide = to_wide(path);
        check(self.dispatch(OperationRequest::SetAllocationSize {
            path: WideStr::new(&wide),
            size,
            info,
        }))
    }

    /// `LockFile`.
    pub fn lock_file(
        &self,
        path: &str,
        info: &mut FileInfo,
        offset: i64,
        length: i64,
    ) -> StatusResult<()> {
        let wide = to_wide(path);
        check(self.dispatch(OperationRequest::LockFile {
            path: WideStr::new(&wide),
            offset,
            length,
            info,
        }))
    }

    /// `UnlockFile`.
    pub fn unlock_file(
        &self,
        path: &str,
        info: &mut FileInfo,
        offset: i64,
        length: i64,
    ) -> StatusResult<()> {
        let wide = to_wide(path);
        check(self.dispatch(OperationRequest::UnlockFile {
            path: WideStr::new(&wide),
            offset,
            length,
            info,
        }))
    }

    /// `GetDiskFreeSpace`.
    pub fn get_disk_free_space(&self) -> StatusResult<DiskFreeSpaceOut> {
        let mut info = FileInfo::for_process(self.process_id);
        let mut out = DiskFreeSpaceOut::default();
        check(self.dispatch(OperationRequest::GetDiskFreeSpace {
            out: &mut out,
            info: &mut info,
        }))?;
        Ok(out)
    }

    /// `GetVolumeInformation`.
    pub fn get_volume_information(&self) -> StatusResult<VolumeInformation> {
        let mut info = FileInfo::for_process(self.process_id);
        let mut name = vec![0u16; self.volume_name_capacity];
        let mut fs_name = vec![0u16; self.volume_name_capacity];
        let (mut serial, mut max_len, mut flags) = (0u32, 0u32, 0u32);
        check(self.dispatch(OperationRequest::GetVolumeInformation {
            out: VolumeInformationOut {
                volume_name: &mut name,
                volume_serial_number: &mut serial,
                maximum_component_length: &mut max_len,
                file_system_flags: &mut flags,
                file_system_name: &mut fs_name,
            },
            info: &mut info,
        }))?;
        Ok(VolumeInformation {
            name: decode(&name),
            serial_number: serial,
            max_component_length: max_len,
            fs_flags: flags,
            fs_name: decode(&fs_name),
        })
    }

    /// `GetFileSecurity` into a buffer of `capacity` bytes.
    ///
    /// Returns the raw status, the bytes written and the reported length
    /// needed.
    pub fn get_file_security(
        &self,
        path: &str,
        info: &mut FileInfo,
        security_information: u32,
        capacity: usize,
    ) -> (NtStatus, Vec<u8>, u32) {
        let wide = to_wide(path);
        let mut buffer = vec![0u8; capacity];
        let mut needed = 0u32;
        let status = self.dispatch(OperationRequest::GetFileSecurity {
            path: WideStr::new(&wide),
            security_information,
            buffer: &mut buffer,
            length_needed: &mut needed,
            info,
        });
        if status.is_success() {
            buffer.truncate(needed as usize);
        } else {
            buffer.clear();
        }
        (status, buffer, needed)
    }

    /// `SetFileSecurity`.
    pub fn set_file_security(
        &self,
        path: &str,
        info: &mut FileInfo,
        security_information: u32,
        descriptor: &[u8],
    ) -> StatusResult<()> {
        let wide = to_wide(path);
        check(self.dispatch(OperationRequest::SetFileSecurity {
            path: WideStr::new(&wide),
            security_information,
            descriptor,
            info,
        }))
    }
}

fn decode(units: &[u16]) -> String {
    String::from_utf16_lossy(WideStr::new(units).as_units())
}
