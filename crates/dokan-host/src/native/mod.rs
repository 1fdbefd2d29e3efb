//! Binding to the driver library (`dokan1.dll`).
//!
//! The library is loaded at runtime so the crate builds on machines without
//! the driver installed. Each callback is an `extern "system"` trampoline
//! that decodes raw pointers into an [`OperationRequest`] and hands it to
//! the [`Dispatch`] stored in the options' global context slot. Trampolines
//! never unwind: a panic anywhere on the path becomes
//! `STATUS_INTERNAL_ERROR`.

mod abi;

use crate::bridge::Dispatch;
use crate::driver::Driver;
use crate::error::MountError;
use crate::options::DeviceOptions;
use crate::request::{
    DiskFreeSpaceOut, FileInfo, FileInformation, FileTime, FindData, OperationRequest,
    VolumeInformationOut, WideStr, to_wide,
};
use crate::status::NtStatus;
use abi::{
    DOKAN_FILE_INFO, DOKAN_OPERATIONS, DOKAN_OPTIONS, DokanMainFn, DokanRemoveMountPointFn,
    DokanUnmountFn, DokanVersionFn, PDOKAN_FILE_INFO, PFillFindData,
};
use std::ffi::{CStr, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::{ptr, slice};
use tracing::{debug, warn};
use windows::Win32::Foundation::{BOOL, FILETIME, FreeLibrary, HMODULE};
use windows::Win32::Storage::FileSystem::{BY_HANDLE_FILE_INFORMATION, WIN32_FIND_DATAW};
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};
use windows::core::{PCSTR, PCWSTR, w};

/// File name of the driver library.
pub const LIBRARY_NAME: &str = "dokan1.dll";

struct Api {
    main: DokanMainFn,
    version: DokanVersionFn,
    driver_version: DokanVersionFn,
    unmount: DokanUnmountFn,
    remove_mount_point: DokanRemoveMountPointFn,
}

/// The installed driver.
pub struct NativeDriver {
    /// `HMODULE` as an address so the driver is `Send + Sync`.
    module: usize,
    api: Api,
}

impl std::fmt::Debug for NativeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeDriver")
            .field("library", &LIBRARY_NAME)
            .finish_non_exhaustive()
    }
}

impl NativeDriver {
    /// Loads the driver library and resolves its entry points.
    pub fn load() -> Result<Self, MountError> {
        // SAFETY: loading a library by name; the name is a static
        // NUL-terminated wide string.
        let module = unsafe { LoadLibraryW(w!("dokan1.dll")) }
            .map_err(|e| {
                MountError::DriverUnavailable(format!("cannot load {LIBRARY_NAME}: {e}"))
            })?;

        // SAFETY: symbol types match the exported signatures of Dokan 1.x.
        let api = unsafe {
            Api {
                main: symbol(module, c"DokanMain")?,
                version: symbol(module, c"DokanVersion")?,
                driver_version: symbol(module, c"DokanDriverVersion")?,
                unmount: symbol(module, c"DokanUnmount")?,
                remove_mount_point: symbol(module, c"DokanRemoveMountPoint")?,
            }
        };
        debug!(library = LIBRARY_NAME, "driver library loaded");
        Ok(Self {
            module: module.0 as usize,
            api,
        })
    }
}

impl Drop for NativeDriver {
    fn drop(&mut self) {
        // SAFETY: the module was loaded in `load` and no callback can run
        // once `run` has returned.
        if let Err(e) = unsafe { FreeLibrary(HMODULE(self.module as *mut c_void)) } {
            warn!(error = %e, "failed to unload driver library");
        }
    }
}

/// Resolves `name` as a function pointer of type `T`.
unsafe fn symbol<T: Copy>(module: HMODULE, name: &CStr) -> Result<T, MountError> {
    // SAFETY: `name` is NUL-terminated.
    let proc = unsafe { GetProcAddress(module, PCSTR::from_raw(name.as_ptr().cast())) };
    let proc = proc.ok_or_else(|| {
        MountError::DriverUnavailable(format!(
            "{LIBRARY_NAME} has no export {}",
            name.to_string_lossy()
        ))
    })?;
    // SAFETY: caller guarantees `T` is the function pointer type of the export.
    Ok(unsafe { std::mem::transmute_copy(&proc) })
}

impl Driver for NativeDriver {
    fn name(&self) -> &'static str {
        "dokan1"
    }

    fn library_version(&self) -> u32 {
        // SAFETY: resolved export without arguments.
        unsafe { (self.api.version)() }
    }

    fn driver_version(&self) -> u32 {
        // SAFETY: resolved export without arguments.
        unsafe { (self.api.driver_version)() }
    }

    fn run(&self, options: &DeviceOptions, dispatch: Arc<dyn Dispatch>) -> i32 {
        let mount_point = to_wide(&options.mount_point);
        let unc_name = options.unc_name.as_deref().map(to_wide);
        let global: Box<Arc<dyn Dispatch>> = Box::new(dispatch);

        let mut raw_options = DOKAN_OPTIONS {
            version: options.version,
            thread_count: options.thread_count,
            options: options.flags.bits(),
            global_context: ptr::from_ref::<Arc<dyn Dispatch>>(&*global) as u64,
            mount_point: PCWSTR::from_raw(mount_point.as_ptr()),
            unc_name: unc_name
                .as_ref()
                .map_or(PCWSTR::null(), |unc| PCWSTR::from_raw(unc.as_ptr())),
            timeout: options.timeout_millis(),
            allocation_unit_size: options.allocation_unit_size,
            sector_size: options.sector_size,
        };
        let mut operations = operations();

        // SAFETY: every pointer in `raw_options` outlives the call, and the
        // global context stays boxed until the driver has returned.
        let code = unsafe { (self.api.main)(&mut raw_options, &mut operations) };
        drop(global);
        code
    }

    fn unmount(&self, letter: char) -> bool {
        let mut unit = [0u16; 2];
        letter.encode_utf16(&mut unit);
        // SAFETY: plain value argument.
        unsafe { (self.api.unmount)(unit[0]) }.as_bool()
    }

    fn remove_mount_point(&self, mount_point: &str) -> bool {
        let wide = to_wide(mount_point);
        // SAFETY: `wide` is NUL-terminated and outlives the call.
        unsafe { (self.api.remove_mount_point)(PCWSTR::from_raw(wide.as_ptr())) }.as_bool()
    }
}

fn operations() -> DOKAN_OPERATIONS {
    DOKAN_OPERATIONS {
        zw_create_file: Some(zw_create_file),
        cleanup: Some(cleanup),
        close_file: Some(close_file),
        read_file: Some(read_file),
        write_file: Some(write_file),
        flush_file_buffers: Some(flush_file_buffers),
        get_file_information: Some(get_file_information),
        find_files: Some(find_files),
        find_files_with_pattern: Some(find_files_with_pattern),
        set_file_attributes: Some(set_file_attributes),
        set_file_time: Some(set_file_time),
        delete_file: Some(delete_file),
        delete_directory: Some(delete_directory),
        move_file: Some(move_file),
        set_end_of_file: Some(set_end_of_file),
        set_allocation_size: Some(set_allocation_size),
        lock_file: Some(lock_file),
        unlock_file: Some(unlock_file),
        get_disk_free_space: Some(get_disk_free_space),
        get_volume_information: Some(get_volume_information),
        mounted: Some(mounted),
        unmounted: Some(unmounted),
        get_file_security: Some(get_file_security),
        set_file_security: Some(set_file_security),
        find_streams: None,
    }
}

// --- pointer decoding ---

unsafe fn wide<'a>(p: PCWSTR) -> WideStr<'a> {
    if p.is_null() {
        return WideStr::new(&[]);
    }
    // SAFETY: the driver passes NUL-terminated strings valid for the call.
    unsafe { WideStr::new(p.as_wide()) }
}

unsafe fn bytes_mut<'a>(p: *mut c_void, len: u32) -> &'a mut [u8] {
    if p.is_null() || len == 0 {
        return &mut [];
    }
    // SAFETY: the driver's buffer holds `len` bytes for the call.
    unsafe { slice::from_raw_parts_mut(p.cast(), len as usize) }
}

unsafe fn bytes<'a>(p: *const c_void, len: u32) -> &'a [u8] {
    if p.is_null() || len == 0 {
        return &[];
    }
    // SAFETY: the driver's buffer holds `len` bytes for the call.
    unsafe { slice::from_raw_parts(p.cast(), len as usize) }
}

unsafe fn units_mut<'a>(p: *mut u16, len: u32) -> &'a mut [u16] {
    if p.is_null() || len == 0 {
        return &mut [];
    }
    // SAFETY: the driver's buffer holds `len` UTF-16 units for the call.
    unsafe { slice::from_raw_parts_mut(p, len as usize) }
}

unsafe fn out_slot<'a, T>(p: *mut T, fallback: &'a mut T) -> &'a mut T {
    // SAFETY: non-null output pointers are valid for the call.
    unsafe { p.as_mut() }.unwrap_or(fallback)
}

unsafe fn filetime(p: *const FILETIME) -> Option<FileTime> {
    // SAFETY: non-null time pointers are valid for the call.
    unsafe { p.as_ref() }.map(|t| FileTime {
        low: t.dwLowDateTime,
        high: t.dwHighDateTime,
    })
}

fn native_filetime(t: FileTime) -> FILETIME {
    FILETIME {
        dwLowDateTime: t.low,
        dwHighDateTime: t.high,
    }
}

/// Runs `f` with the dispatcher and a decoded [`FileInfo`], writing the
/// context slot and directory flag back afterwards.
unsafe fn call(
    raw: PDOKAN_FILE_INFO,
    f: impl FnOnce(&dyn Dispatch, &mut FileInfo) -> NtStatus,
) -> i32 {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        if raw.is_null() {
            return NtStatus::INVALID_PARAMETER;
        }
        // SAFETY: the driver passes a valid file info for the call, and the
        // global context was set to a boxed dispatcher in `run`.
        let (mut info, dispatch) = unsafe {
            let r: &DOKAN_FILE_INFO = &*raw;
            let global = r
                .dokan_options
                .as_ref()
                .map(|o| o.global_context as *const Arc<dyn Dispatch>);
            let info = FileInfo {
                context: r.context,
                process_id: r.process_id,
                is_directory: r.is_directory != 0,
                delete_on_close: r.delete_on_close != 0,
                paging_io: r.paging_io != 0,
                synchronous_io: r.synchronous_io != 0,
                no_cache: r.nocache != 0,
                write_to_end_of_file: r.write_to_end_of_file != 0,
            };
            (info, global.and_then(|g| g.as_ref()))
        };
        let Some(dispatch) = dispatch else {
            return NtStatus::INTERNAL_ERROR;
        };

        let status = f(dispatch.as_ref(), &mut info);

        // SAFETY: as above; no reference into `*raw` is live here.
        unsafe {
            (*raw).context = info.context;
            (*raw).is_directory = u8::from(info.is_directory);
        }
        status
    }));
    outcome.unwrap_or(NtStatus::INTERNAL_ERROR).0
}

// --- trampolines ---

unsafe extern "system" fn zw_create_file(
    path: PCWSTR,
    _security_context: *mut c_void,
    desired_access: u32,
    file_attributes: u32,
    share_access: u32,
    create_disposition: u32,
    create_options: u32,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let path = wide(path);
        call(raw, |d, info| {
            d.dispatch(OperationRequest::Create {
                path,
                desired_access,
                file_attributes,
                share_access,
                create_disposition,
                create_options,
                info,
            })
        })
    }
}

unsafe extern "system" fn cleanup(path: PCWSTR, raw: PDOKAN_FILE_INFO) {
    unsafe {
        let path = wide(path);
        call(raw, |d, info| d.dispatch(OperationRequest::Cleanup { path, info }));
    }
}

unsafe extern "system" fn close_file(path: PCWSTR, raw: PDOKAN_FILE_INFO) {
    unsafe {
        let path = wide(path);
        call(raw, |d, info| d.dispatch(OperationRequest::Close { path, info }));
    }
}

unsafe extern "system" fn read_file(
    path: PCWSTR,
    buffer: *mut c_void,
    length: u32,
    read: *mut u32,
    offset: i64,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let path = wide(path);
        let buffer = bytes_mut(buffer, length);
        let mut scratch = 0;
        let bytes_read = out_slot(read, &mut scratch);
        call(raw, |d, info| {
            d.dispatch(OperationRequest::Read {
                path,
                buffer,
                bytes_read,
                offset,
                info,
            })
        })
    }
}

unsafe extern "system" fn write_file(
    path: PCWSTR,
    data: *const c_void,
    length: u32,
    written: *mut u32,
    offset: i64,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let path = wide(path);
        let data = bytes(data, length);
        let mut scratch = 0;
        let bytes_written = out_slot(written, &mut scratch);
        call(raw, |d, info| {
            d.dispatch(OperationRequest::Write {
                path,
                data,
                bytes_written,
                offset,
                info,
            })
        })
    }
}

unsafe extern "system" fn flush_file_buffers(path: PCWSTR, raw: PDOKAN_FILE_INFO) -> i32 {
    unsafe {
        let path = wide(path);
        call(raw, |d, info| d.dispatch(OperationRequest::Flush { path, info }))
    }
}

unsafe extern "system" fn get_file_information(
    path: PCWSTR,
    out: *mut BY_HANDLE_FILE_INFORMATION,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let path = wide(path);
        let Some(out) = out.as_mut() else {
            return NtStatus::INVALID_PARAMETER.0;
        };
        let mut decoded = FileInformation::default();
        let status = call(raw, |d, info| {
            d.dispatch(OperationRequest::GetFileInformation {
                path,
                out: &mut decoded,
                info,
            })
        });
        out.dwFileAttributes = decoded.file_attributes;
        out.ftCreationTime = native_filetime(decoded.creation_time);
        out.ftLastAccessTime = native_filetime(decoded.last_access_time);
        out.ftLastWriteTime = native_filetime(decoded.last_write_time);
        out.dwVolumeSerialNumber = decoded.volume_serial_number;
        out.nFileSizeHigh = decoded.file_size_high;
        out.nFileSizeLow = decoded.file_size_low;
        out.nNumberOfLinks = decoded.number_of_links;
        out.nFileIndexHigh = decoded.file_index_high;
        out.nFileIndexLow = decoded.file_index_low;
        status
    }
}

unsafe fn find(
    path: PCWSTR,
    pattern: Option<PCWSTR>,
    fill: Option<PFillFindData>,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    let Some(fill) = fill else {
        return NtStatus::INVALID_PARAMETER.0;
    };
    unsafe {
        let path = wide(path);
        let pattern = pattern.map(|p| wide(p));
        call(raw, |d, info| {
            let mut sink = |data: &FindData| -> bool {
                let mut native = WIN32_FIND_DATAW {
                    dwFileAttributes: data.file_attributes,
                    ftCreationTime: native_filetime(data.creation_time),
                    ftLastAccessTime: native_filetime(data.last_access_time),
                    ftLastWriteTime: native_filetime(data.last_write_time),
                    nFileSizeHigh: data.file_size_high,
                    nFileSizeLow: data.file_size_low,
                    cFileName: data.file_name,
                    cAlternateFileName: data.alternate_file_name,
                    ..Default::default()
                };
                // SAFETY: `raw` is the file info of this call, unaliased here.
                fill(&mut native, raw) == 1
            };
            d.dispatch(OperationRequest::FindFiles {
                path,
                pattern,
                fill: &mut sink,
                info,
            })
        })
    }
}

unsafe extern "system" fn find_files(
    path: PCWSTR,
    fill: Option<PFillFindData>,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe { find(path, None, fill, raw) }
}

unsafe extern "system" fn find_files_with_pattern(
    path: PCWSTR,
    pattern: PCWSTR,
    fill: Option<PFillFindData>,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe { find(path, Some(pattern), fill, raw) }
}

unsafe extern "system" fn set_file_attributes(
    path: PCWSTR,
    attributes: u32,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let path = wide(path);
        call(raw, |d, info| {
            d.dispatch(OperationRequest::SetFileAttributes { path, attributes, info })
        })
    }
}

unsafe extern "system" fn set_file_time(
    path: PCWSTR,
    creation: *const FILETIME,
    last_access: *const FILETIME,
    last_write: *const FILETIME,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let path = wide(path);
        let (creation, last_access, last_write) =
            (filetime(creation), filetime(last_access), filetime(last_write));
        call(raw, |d, info| {
            d.dispatch(OperationRequest::SetFileTime {
                path,
                creation,
                last_access,
                last_write,
                info,
            })
        })
    }
}

unsafe extern "system" fn delete_file(path: PCWSTR, raw: PDOKAN_FILE_INFO) -> i32 {
    unsafe {
        let path = wide(path);
        call(raw, |d, info| d.dispatch(OperationRequest::DeleteFile { path, info }))
    }
}

unsafe extern "system" fn delete_directory(path: PCWSTR, raw: PDOKAN_FILE_INFO) -> i32 {
    unsafe {
        let path = wide(path);
        call(raw, |d, info| d.dispatch(OperationRequest::DeleteDirectory { path, info }))
    }
}

unsafe extern "system" fn move_file(
    path: PCWSTR,
    new_path: PCWSTR,
    replace: BOOL,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let (path, new_path) = (wide(path), wide(new_path));
        call(raw, |d, info| {
            d.dispatch(OperationRequest::Move {
                path,
                new_path,
                replace_if_existing: replace.as_bool(),
                info,
            })
        })
    }
}

unsafe extern "system" fn set_end_of_file(path: PCWSTR, offset: i64, raw: PDOKAN_FILE_INFO) -> i32 {
    unsafe {
        let path = wide(path);
        call(raw, |d, info| d.dispatch(OperationRequest::SetEndOfFile { path, offset, info }))
    }
}

unsafe extern "system" fn set_allocation_size(
    path: PCWSTR,
    size: i64,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let path = wide(path);
        call(raw, |d, info| d.dispatch(OperationRequest::SetAllocationSize { path, size, info }))
    }
}

unsafe extern "system" fn lock_file(
    path: PCWSTR,
    offset: i64,
    length: i64,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let path = wide(path);
        call(raw, |d, info| {
            d.dispatch(OperationRequest::LockFile {
                path,
                offset,
                length,
                info,
            })
        })
    }
}

unsafe extern "system" fn unlock_file(
    path: PCWSTR,
    offset: i64,
    length: i64,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let path = wide(path);
        call(raw, |d, info| {
            d.dispatch(OperationRequest::UnlockFile {
                path,
                offset,
                length,
                info,
            })
        })
    }
}

unsafe extern "system" fn get_disk_free_space(
    free_bytes_available: *mut u64,
    total_bytes: *mut u64,
    total_free_bytes: *mut u64,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let mut out = DiskFreeSpaceOut::default();
        let status = call(raw, |d, info| {
            d.dispatch(OperationRequest::GetDiskFreeSpace { out: &mut out, info })
        });
        for (slot, value) in [
            (free_bytes_available, out.free_bytes_available),
            (total_bytes, out.total_number_of_bytes),
            (total_free_bytes, out.total_number_of_free_bytes),
        ] {
            if let Some(slot) = slot.as_mut() {
                *slot = value;
            }
        }
        status
    }
}

unsafe extern "system" fn get_volume_information(
    volume_name: *mut u16,
    volume_name_size: u32,
    serial_number: *mut u32,
    max_component_length: *mut u32,
    fs_flags: *mut u32,
    fs_name: *mut u16,
    fs_name_size: u32,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let (mut s1, mut s2, mut s3) = (0, 0, 0);
        let out = VolumeInformationOut {
            volume_name: units_mut(volume_name, volume_name_size),
            volume_serial_number: out_slot(serial_number, &mut s1),
            maximum_component_length: out_slot(max_component_length, &mut s2),
            file_system_flags: out_slot(fs_flags, &mut s3),
            file_system_name: units_mut(fs_name, fs_name_size),
        };
        call(raw, |d, info| d.dispatch(OperationRequest::GetVolumeInformation { out, info }))
    }
}

unsafe extern "system" fn mounted(raw: PDOKAN_FILE_INFO) -> i32 {
    unsafe { call(raw, |d, _| d.dispatch(OperationRequest::Mounted)) }
}

unsafe extern "system" fn unmounted(raw: PDOKAN_FILE_INFO) -> i32 {
    unsafe { call(raw, |d, _| d.dispatch(OperationRequest::Unmounted)) }
}

unsafe extern "system" fn get_file_security(
    path: PCWSTR,
    security_information: *mut u32,
    descriptor: *mut c_void,
    length: u32,
    length_needed: *mut u32,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let path = wide(path);
        let security_information = security_information.as_ref().copied().unwrap_or(0);
        let buffer = bytes_mut(descriptor, length);
        let mut scratch = 0;
        let length_needed = out_slot(length_needed, &mut scratch);
        call(raw, |d, info| {
            d.dispatch(OperationRequest::GetFileSecurity {
                path,
                security_information,
                buffer,
                length_needed,
                info,
            })
        })
    }
}

unsafe extern "system" fn set_file_security(
    path: PCWSTR,
    security_information: *mut u32,
    descriptor: *mut c_void,
    length: u32,
    raw: PDOKAN_FILE_INFO,
) -> i32 {
    unsafe {
        let path = wide(path);
        let security_information = security_information.as_ref().copied().unwrap_or(0);
        let descriptor = bytes(descriptor, length);
        call(raw, |d, info| {
            d.dispatch(OperationRequest::SetFileSecurity {
                path,
                security_information,
                descriptor,
                info,
            })
        })
    }
}
