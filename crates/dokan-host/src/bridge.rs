//! Operation dispatch bridge.
//!
//! [`Bridge`] turns each [`OperationRequest`] into one [`FileSystem`] call and
//! writes the outcome back into the request's output slots. It is the only
//! thing a [`Driver`](crate::Driver) ever calls into, through the object-safe
//! [`Dispatch`] trait.
//!
//! # Boundary rules
//!
//! - Every call returns an [`NtStatus`]. Filesystem errors are mapped with
//!   [`FsError::to_ntstatus`]; panics are caught and reported as
//!   `STATUS_INTERNAL_ERROR`.
//! - Contexts returned by `create_file` live in a [`HandleTable`]; the ID is
//!   stored in `FileInfo::context` and the same context is handed back on
//!   every later call for that handle until close removes it.
//! - No lock is held while the filesystem runs. Concurrent calls for
//!   different handles, or the same path, run in parallel.

use crate::error::{FsError, FsResult};
use crate::filesystem::{
    Call, CreateDisposition, CreateRequest, DirEntry, DirFiller, FileAttributes, FileSystem,
    FileTimes, OpenKind, WriteOffset,
};
use crate::handle_table::HandleTable;
use crate::options::SecurityDescriptor;
use crate::request::{
    FileInfo, FileInformation, FileTime, FindData, MAX_PATH, OperationKind, OperationRequest,
    WideStr, copy_wide, split_u64,
};
use crate::stats::BridgeStats;
use crate::status::NtStatus;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// `FILE_DIRECTORY_FILE` create option.
pub const FILE_DIRECTORY_FILE: u32 = 0x0000_0001;
/// `FILE_NON_DIRECTORY_FILE` create option.
pub const FILE_NON_DIRECTORY_FILE: u32 = 0x0000_0040;
/// `FILE_DELETE_ON_CLOSE` create option.
pub const FILE_DELETE_ON_CLOSE: u32 = 0x0000_1000;

/// Entry point the driver calls for every request.
pub trait Dispatch: Send + Sync {
    /// Handles one callback. Never panics.
    fn dispatch(&self, request: OperationRequest<'_>) -> NtStatus;
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Adapts driver requests onto a [`FileSystem`].
pub struct Bridge<F: FileSystem> {
    fs: Arc<F>,
    handles: HandleTable<F::Context>,
    stats: Arc<BridgeStats>,
    volume_security: Option<SecurityDescriptor>,
    on_mounted: Option<Hook>,
    on_unmounted: Option<Hook>,
}

impl<F: FileSystem> fmt::Debug for Bridge<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("open_handles", &self.handles.len())
            .field("volume_security", &self.volume_security.is_some())
            .finish_non_exhaustive()
    }
}

impl<F: FileSystem> Bridge<F> {
    /// Bridge over `fs` with fresh statistics.
    pub fn new(fs: Arc<F>) -> Self {
        Self {
            fs,
            handles: HandleTable::new(),
            stats: Arc::new(BridgeStats::new()),
            volume_security: None,
            on_mounted: None,
            on_unmounted: None,
        }
    }

    /// Descriptor served when the filesystem does not implement
    /// `get_file_security`.
    #[must_use]
    pub fn with_volume_security(mut self, descriptor: Option<SecurityDescriptor>) -> Self {
        self.volume_security = descriptor;
        self
    }

    /// Records into shared statistics.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<BridgeStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Runs after the filesystem accepted the mounted notification.
    #[must_use]
    pub fn on_mounted(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_mounted = Some(Box::new(hook));
        self
    }

    /// Runs after the unmounted notification.
    #[must_use]
    pub fn on_unmounted(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_unmounted = Some(Box::new(hook));
        self
    }

    /// The hosted filesystem.
    pub fn filesystem(&self) -> &Arc<F> {
        &self.fs
    }

    /// Statistics for this bridge.
    pub fn stats(&self) -> &Arc<BridgeStats> {
        &self.stats
    }

    /// Contexts currently registered.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn context(&self, info: &FileInfo) -> FsResult<Arc<F::Context>> {
        self.handles.get(info.context).ok_or(FsError::InvalidHandle)
    }

    fn handle(&self, request: OperationRequest<'_>) -> FsResult<NtStatus> {
        match request {
            OperationRequest::Create {
                path,
                desired_access,
                file_attributes,
                share_access,
                create_disposition,
                create_options,
                info,
            } => {
                let path = decode_path(path)?;
                let disposition = CreateDisposition::from_raw(create_disposition)
                    .ok_or_else(|| {
                        FsError::invalid(format!("create disposition {create_disposition}"))
                    })?;
                let kind = match (
                    create_options & FILE_DIRECTORY_FILE != 0,
                    create_options & FILE_NON_DIRECTORY_FILE != 0,
                ) {
                    (true, true) => {
                        return Err(FsError::invalid(
                            "both directory and non-directory requested",
                        ));
                    }
                    (true, false) => OpenKind::Directory,
                    (false, true) => OpenKind::File,
                    (false, false) => OpenKind::Any,
                };
                let request = CreateRequest {
                    desired_access,
                    attributes: FileAttributes(file_attributes),
                    share_access,
                    disposition,
                    kind,
                    create_options,
                    delete_on_close: create_options & FILE_DELETE_ON_CLOSE != 0,
                    process_id: info.process_id,
                };

                let opened = self.fs.create_file(&path, &request)?;
                info.is_directory = opened.is_directory;
                info.context = self.handles.insert(opened.context);
                self.stats.record_open();
                trace!(path = %path, context = info.context, existed = opened.existed, "opened");

                if opened.existed && disposition.reports_existing() {
                    Ok(NtStatus::OBJECT_NAME_COLLISION)
                } else {
                    Ok(NtStatus::SUCCESS)
                }
            }

            OperationRequest::Cleanup { path, info } => {
                let path = decode_path(path)?;
                match self.handles.get(info.context) {
                    Some(ctx) => self.fs.cleanup(&Call {
                        path: &path,
                        context: &*ctx,
                        info,
                    }),
                    None => debug!(path = %path, context = info.context, "cleanup without context"),
                }
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::Close { path, info } => {
                let path = decode_path(path)?;
                if let Some(ctx) = self.handles.remove(info.context) {
                    self.fs.close(&Call {
                        path: &path,
                        context: &*ctx,
                        info,
                    });
                    self.stats.record_close();
                }
                info.context = 0;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::Read {
                path,
                buffer,
                bytes_read,
                offset,
                info,
            } => {
                *bytes_read = 0;
                let path = decode_path(path)?;
                let offset = non_negative(offset, "read offset")?;
                let ctx = self.context(info)?;
                let call = Call {
                    path: &path,
                    context: &*ctx,
                    info,
                };
                let n = self.fs.read(&call, buffer, offset)?.min(buffer.len());
                *bytes_read = clamp_u32(n);
                self.stats.record_read(u64::from(*bytes_read));
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::Write {
                path,
                data,
                bytes_written,
                offset,
                info,
            } => {
                *bytes_written = 0;
                let path = decode_path(path)?;
                let offset = if info.write_to_end_of_file {
                    WriteOffset::EndOfFile
                } else if info.paging_io {
                    WriteOffset::Paging(non_negative(offset, "write offset")?)
                } else {
                    WriteOffset::At(non_negative(offset, "write offset")?)
                };
                let ctx = self.context(info)?;
                let call = Call {
                    path: &path,
                    context: &*ctx,
                    info,
                };
                let n = self.fs.write(&call, data, offset)?.min(data.len());
                *bytes_written = clamp_u32(n);
                self.stats.record_write(u64::from(*bytes_written));
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::Flush { path, info } => {
                let path = decode_path(path)?;
                let ctx = self.context(info)?;
                self.fs.flush(&Call {
                    path: &path,
                    context: &*ctx,
                    info,
                })?;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::GetFileInformation { path, out, info } => {
                let path = decode_path(path)?;
                let ctx = self.context(info)?;
                let meta = self.fs.get_file_information(&Call {
                    path: &path,
                    context: &*ctx,
                    info,
                })?;
                let (size_high, size_low) = split_u64(meta.size);
                let (index_high, index_low) = split_u64(meta.file_index);
                *out = FileInformation {
                    file_attributes: meta.attributes.bits(),
                    creation_time: FileTime::from_system_time(meta.creation_time),
                    last_access_time: FileTime::from_system_time(meta.last_access_time),
                    last_write_time: FileTime::from_system_time(meta.last_write_time),
                    volume_serial_number: meta.volume_serial_number,
                    file_size_high: size_high,
                    file_size_low: size_low,
                    number_of_links: meta.number_of_links,
                    file_index_high: index_high,
                    file_index_low: index_low,
                };
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::FindFiles {
                path,
                pattern,
                fill,
                info,
            } => {
                let path = decode_path(path)?;
                let pattern = pattern.map(decode_path).transpose()?;
                let ctx = self.context(info)?;
                let call = Call {
                    path: &path,
                    context: &*ctx,
                    info,
                };

                let mut sink = |entry: &DirEntry| -> bool {
                    match find_data(entry) {
                        Some(data) => fill(&data),
                        None => {
                            warn!(
                                path = %path,
                                name = %entry.name,
                                "directory entry name too long, skipped"
                            );
                            false
                        }
                    }
                };
                let mut filler = DirFiller::new(&mut sink);
                match &pattern {
                    Some(pattern) => self.fs.find_files_with_pattern(&call, pattern, &mut filler)?,
                    None => self.fs.find_files(&call, &mut filler)?,
                }
                trace!(path = %path, offered = filler.offered(), full = filler.is_full(), "listed");
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::SetFileAttributes { path, attributes, info } => {
                if attributes == 0 {
                    return Ok(NtStatus::SUCCESS);
                }
                let path = decode_path(path)?;
                let ctx = self.context(info)?;
                self.fs.set_file_attributes(
                    &Call {
                        path: &path,
                        context: &*ctx,
                        info,
                    },
                    FileAttributes(attributes),
                )?;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::SetFileTime {
                path,
                creation,
                last_access,
                last_write,
                info,
            } => {
                let path = decode_path(path)?;
                let ctx = self.context(info)?;
                let times = FileTimes {
                    creation: decode_time(creation),
                    last_access: decode_time(last_access),
                    last_write: decode_time(last_write),
                };
                self.fs.set_file_times(
                    &Call {
                        path: &path,
                        context: &*ctx,
                        info,
                    },
                    &times,
                )?;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::DeleteFile { path, info } => {
                let path = decode_path(path)?;
                let ctx = self.context(info)?;
                self.fs.delete_file(&Call {
                    path: &path,
                    context: &*ctx,
                    info,
                })?;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::DeleteDirectory { path, info } => {
                let path = decode_path(path)?;
                let ctx = self.context(info)?;
                self.fs.delete_directory(&Call {
                    path: &path,
                    context: &*ctx,
                    info,
                })?;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::Move {
                path,
                new_path,
                replace_if_existing,
                info,
            } => {
                let path = decode_path(path)?;
                let new_path = decode_path(new_path)?;
                let ctx = self.context(info)?;
                self.fs.move_file(
                    &Call {
                        path: &path,
                        context: &*ctx,
                        info,
                    },
                    &new_path,
                    replace_if_existing,
                )?;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::SetEndOfFile { path, offset, info } => {
                let path = decode_path(path)?;
                let length = non_negative(offset, "end of file")?;
                let ctx = self.context(info)?;
                self.fs.set_end_of_file(
                    &Call {
                        path: &path,
                        context: &*ctx,
                        info,
                    },
                    length,
                )?;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::SetAllocationSize { path, size, info } => {
                let path = decode_path(path)?;
                let size = non_negative(size, "allocation size")?;
                let ctx = self.context(info)?;
                self.fs.set_allocation_size(
                    &Call {
                        path: &path,
                        context: &*ctx,
                        info,
                    },
                    size,
                )?;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::LockFile {
                path,
                offset,
                length,
                info,
            } => {
                let path = decode_path(path)?;
                let offset = non_negative(offset, "lock offset")?;
                let length = non_negative(length, "lock length")?;
                let ctx = self.context(info)?;
                self.fs.lock_file(
                    &Call {
                        path: &path,
                        context: &*ctx,
                        info,
                    },
                    offset,
                    length,
                )?;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::UnlockFile {
                path,
                offset,
                length,
                info,
            } => {
                let path = decode_path(path)?;
                let offset = non_negative(offset, "unlock offset")?;
                let length = non_negative(length, "unlock length")?;
                let ctx = self.context(info)?;
                self.fs.unlock_file(
                    &Call {
                        path: &path,
                        context: &*ctx,
                        info,
                    },
                    offset,
                    length,
                )?;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::GetDiskFreeSpace { out, info } => {
                let space = self.fs.get_disk_free_space(info)?;
                out.free_bytes_available = space.free_bytes_available;
                out.total_number_of_bytes = space.total_bytes;
                out.total_number_of_free_bytes = space.total_free_bytes;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::GetVolumeInformation { out, info } => {
                let volume = self.fs.get_volume_information(info)?;
                copy_wide(&volume.name, out.volume_name);
                copy_wide(&volume.fs_name, out.file_system_name);
                *out.volume_serial_number = volume.serial_number;
                *out.maximum_component_length = volume.max_component_length;
                *out.file_system_flags = volume.fs_flags;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::GetFileSecurity {
                path,
                security_information,
                buffer,
                length_needed,
                info,
            } => {
                let path = decode_path(path)?;
                let ctx = self.context(info)?;
                let call = Call {
                    path: &path,
                    context: &*ctx,
                    info,
                };
                let descriptor = match self.fs.get_file_security(&call, security_information) {
                    Err(e) if e.is_not_implemented() => match &self.volume_security {
                        Some(volume) => volume.as_bytes().to_vec(),
                        None => return Err(e),
                    },
                    other => other?,
                };

                *length_needed = clamp_u32(descriptor.len());
                if descriptor.len() > buffer.len() {
                    return Ok(NtStatus::BUFFER_OVERFLOW);
                }
                buffer[..descriptor.len()].copy_from_slice(&descriptor);
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::SetFileSecurity {
                path,
                security_information,
                descriptor,
                info,
            } => {
                let path = decode_path(path)?;
                let ctx = self.context(info)?;
                self.fs.set_file_security(
                    &Call {
                        path: &path,
                        context: &*ctx,
                        info,
                    },
                    security_information,
                    descriptor,
                )?;
                Ok(NtStatus::SUCCESS)
            }

            OperationRequest::Mounted => {
                let result = self.fs.mounted();
                info!("volume mounted");
                // The driver has the volume up whatever the filesystem reports.
                if let Some(hook) = &self.on_mounted {
                    hook();
                }
                result.map(|()| NtStatus::SUCCESS)
            }

            OperationRequest::Unmounted => {
                let result = self.fs.unmounted();
                let leaked = self.handles.clear();
                if leaked > 0 {
                    warn!(handles = leaked, "contexts still open at unmount, dropped");
                }
                info!("volume unmounted");
                if let Some(hook) = &self.on_unmounted {
                    hook();
                }
                result.map(|()| NtStatus::SUCCESS)
            }
        }
    }
}

impl<F: FileSystem> Dispatch for Bridge<F> {
    fn dispatch(&self, request: OperationRequest<'_>) -> NtStatus {
        let kind = request.kind();
        self.stats.record_call(kind);

        let status = match panic::catch_unwind(AssertUnwindSafe(|| self.handle(request))) {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                let status = e.to_ntstatus();
                log_failure(kind, &e, status);
                status
            }
            Err(payload) => {
                self.stats.record_panic();
                error!(op = %kind, panic = panic_message(payload.as_ref()), "filesystem panicked");
                NtStatus::INTERNAL_ERROR
            }
        };

        self.stats.record_status(status);
        trace!(op = %kind, status = %status);
        status
    }
}

impl<D: Dispatch + ?Sized> Dispatch for Arc<D> {
    fn dispatch(&self, request: OperationRequest<'_>) -> NtStatus {
        (**self).dispatch(request)
    }
}

fn log_failure(kind: OperationKind, e: &FsError, status: NtStatus) {
    // Probes for missing files and unsupported capabilities are routine.
    match e {
        FsError::NotFound | FsError::PathNotFound | FsError::NotImplemented => {
            trace!(op = %kind, error = %e, status = %status, "operation failed");
        }
        _ => debug!(op = %kind, error = %e, status = %status, "operation failed"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn decode_path(path: WideStr<'_>) -> FsResult<String> {
    path.to_string_checked().ok_or(FsError::InvalidName)
}

fn non_negative(value: i64, what: &str) -> FsResult<u64> {
    u64::try_from(value).map_err(|_| FsError::invalid(format!("negative {what}: {value}")))
}

fn clamp_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn decode_time(time: Option<FileTime>) -> Option<std::time::SystemTime> {
    time.filter(|t| !t.is_unchanged_marker()).map(FileTime::to_system_time)
}

fn find_data(entry: &DirEntry) -> Option<FindData> {
    let name: Vec<u16> = entry.name.encode_utf16().collect();
    if name.len() >= MAX_PATH {
        return None;
    }
    let (size_high, size_low) = split_u64(entry.size);
    let mut data = FindData {
        file_attributes: entry.attributes.bits(),
        creation_time: FileTime::from_system_time(entry.creation_time),
        last_access_time: FileTime::from_system_time(entry.last_access_time),
        last_write_time: FileTime::from_system_time(entry.last_write_time),
        file_size_high: size_high,
        file_size_low: size_low,
        ..FindData::default()
    };
    data.file_name[..name.len()].copy_from_slice(&name);
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{FileMetadata, Opened};
    use crate::request::to_wide;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::SystemTime;

    /// Counter contexts, metadata only; `\panic` panics on open.
    struct Minimal {
        next: AtomicU64,
    }

    impl FileSystem for Minimal {
        type Context = u64;

        fn create_file(&self, path: &str, _request: &CreateRequest) -> FsResult<Opened<u64>> {
            if path == "\\panic" {
                panic!("boom");
            }
            Ok(Opened::existing(self.next.fetch_add(1, Ordering::Relaxed), false))
        }

        fn get_file_information(&self, call: &Call<'_, u64>) -> FsResult<FileMetadata> {
            Ok(FileMetadata::file(*call.context, SystemTime::UNIX_EPOCH))
        }
    }

    fn bridge() -> Bridge<Minimal> {
        Bridge::new(Arc::new(Minimal {
            next: AtomicU64::new(100),
        }))
    }

    fn create(
        bridge: &Bridge<Minimal>,
        path: &str,
        disposition: u32,
        info: &mut FileInfo,
    ) -> NtStatus {
        let wide = to_wide(path);
        bridge.dispatch(OperationRequest::Create {
            path: WideStr::new(&wide),
            desired_access: 0,
            file_attributes: 0,
            share_access: 0,
            create_disposition: disposition,
            create_options: 0,
            info,
        })
    }

    #[test]
    fn test_open_if_existing_reports_collision() {
        let bridge = bridge();
        let mut info = FileInfo::default();
        assert_eq!(create(&bridge, "\\a", 3, &mut info), NtStatus::OBJECT_NAME_COLLISION);
        assert_ne!(info.context, 0);
        assert_eq!(bridge.open_handles(), 1);

        let mut info = FileInfo::default();
        assert_eq!(create(&bridge, "\\a", 1, &mut info), NtStatus::SUCCESS);
    }

    #[test]
    fn test_bad_disposition_is_invalid_parameter() {
        let bridge = bridge();
        let mut info = FileInfo::default();
        assert_eq!(create(&bridge, "\\a", 9, &mut info), NtStatus::INVALID_PARAMETER);
        assert_eq!(info.context, 0);
    }

    #[test]
    fn test_conflicting_kind_options_rejected() {
        let bridge = bridge();
        let wide = to_wide("\\a");
        let mut info = FileInfo::default();
        let status = bridge.dispatch(OperationRequest::Create {
            path: WideStr::new(&wide),
            desired_access: 0,
            file_attributes: 0,
            share_access: 0,
            create_disposition: 1,
            create_options: FILE_DIRECTORY_FILE | FILE_NON_DIRECTORY_FILE,
            info: &mut info,
        });
        assert_eq!(status, NtStatus::INVALID_PARAMETER);
    }

    #[test]
    fn test_panic_becomes_internal_error() {
        let bridge = bridge();
        let mut info = FileInfo::default();
        assert_eq!(create(&bridge, "\\panic", 1, &mut info), NtStatus::INTERNAL_ERROR);
        assert_eq!(bridge.stats().panic_count(), 1);
        // Still serving afterwards
        assert_eq!(create(&bridge, "\\ok", 1, &mut info), NtStatus::SUCCESS);
    }

    #[test]
    fn test_unimplemented_flush_maps_to_not_implemented() {
        let bridge = bridge();
        let mut info = FileInfo::default();
        create(&bridge, "\\a", 1, &mut info);
        let wide = to_wide("\\a");
        let status = bridge.dispatch(OperationRequest::Flush {
            path: WideStr::new(&wide),
            info: &mut info,
        });
        assert_eq!(status, NtStatus::NOT_IMPLEMENTED);
    }

    #[test]
    fn test_unknown_context_is_invalid_handle() {
        let bridge = bridge();
        let wide = to_wide("\\a");
        let mut out = FileInformation::default();
        let mut info = FileInfo {
            context: 42,
            ..Default::default()
        };
        let status = bridge.dispatch(OperationRequest::GetFileInformation {
            path: WideStr::new(&wide),
            out: &mut out,
            info: &mut info,
        });
        assert_eq!(status, NtStatus::INVALID_HANDLE);
    }

    #[test]
    fn test_find_data_rejects_long_names() {
        let now = SystemTime::UNIX_EPOCH;
        let meta = FileMetadata::file(3, now);
        assert!(find_data(&DirEntry::from_metadata("x".repeat(MAX_PATH), &meta)).is_none());
        let data = find_data(&DirEntry::from_metadata("x".repeat(MAX_PATH - 1), &meta)).unwrap();
        assert_eq!(data.file_name[MAX_PATH - 1], 0);
        assert_eq!(data.file_size(), 3);
    }

    #[test]
    fn test_panic_message_variants() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(s.as_ref()), "non-string panic payload");
    }
}
