//! `repr(C)` mirrors of the driver library's structures.
#![allow(non_camel_case_types)]

use std::ffi::c_void;
use windows::Win32::Foundation::{BOOL, FILETIME};
use windows::Win32::Storage::FileSystem::{BY_HANDLE_FILE_INFORMATION, WIN32_FIND_DATAW};
use windows::core::PCWSTR;

/// `DOKAN_OPTIONS`
#[repr(C)]
pub struct DOKAN_OPTIONS {
    pub version: u16,
    pub thread_count: u16,
    pub options: u32,
    pub global_context: u64,
    pub mount_point: PCWSTR,
    pub unc_name: PCWSTR,
    pub timeout: u32,
    pub allocation_unit_size: u32,
    pub sector_size: u32,
}

/// `DOKAN_FILE_INFO`
#[repr(C)]
pub struct DOKAN_FILE_INFO {
    pub context: u64,
    pub dokan_context: u64,
    pub dokan_options: *mut DOKAN_OPTIONS,
    pub process_id: u32,
    pub is_directory: u8,
    pub delete_on_close: u8,
    pub paging_io: u8,
    pub synchronous_io: u8,
    pub nocache: u8,
    pub write_to_end_of_file: u8,
}

pub type PDOKAN_FILE_INFO = *mut DOKAN_FILE_INFO;

/// Returns 1 when the driver's buffer is full.
pub type PFillFindData = unsafe extern "system" fn(*mut WIN32_FIND_DATAW, PDOKAN_FILE_INFO) -> i32;

pub type ZwCreateFileFn = unsafe extern "system" fn(
    PCWSTR,
    *mut c_void,
    u32,
    u32,
    u32,
    u32,
    u32,
    PDOKAN_FILE_INFO,
) -> i32;
pub type PathVoidFn = unsafe extern "system" fn(PCWSTR, PDOKAN_FILE_INFO);
pub type PathFn = unsafe extern "system" fn(PCWSTR, PDOKAN_FILE_INFO) -> i32;
pub type ReadFileFn =
    unsafe extern "system" fn(PCWSTR, *mut c_void, u32, *mut u32, i64, PDOKAN_FILE_INFO) -> i32;
pub type WriteFileFn =
    unsafe extern "system" fn(PCWSTR, *const c_void, u32, *mut u32, i64, PDOKAN_FILE_INFO) -> i32;
pub type GetFileInformationFn =
    unsafe extern "system" fn(PCWSTR, *mut BY_HANDLE_FILE_INFORMATION, PDOKAN_FILE_INFO) -> i32;
pub type FindFilesFn =
    unsafe extern "system" fn(PCWSTR, Option<PFillFindData>, PDOKAN_FILE_INFO) -> i32;
pub type FindFilesWithPatternFn =
    unsafe extern "system" fn(PCWSTR, PCWSTR, Option<PFillFindData>, PDOKAN_FILE_INFO) -> i32;
pub type SetFileAttributesFn = unsafe extern "system" fn(PCWSTR, u32, PDOKAN_FILE_INFO) -> i32;
pub type SetFileTimeFn = unsafe extern "system" fn(
    PCWSTR,
    *const FILETIME,
    *const FILETIME,
    *const FILETIME,
    PDOKAN_FILE_INFO,
) -> i32;
pub type MoveFileFn = unsafe extern "system" fn(PCWSTR, PCWSTR, BOOL, PDOKAN_FILE_INFO) -> i32;
pub type OffsetFn = unsafe extern "system" fn(PCWSTR, i64, PDOKAN_FILE_INFO) -> i32;
pub type RangeFn = unsafe extern "system" fn(PCWSTR, i64, i64, PDOKAN_FILE_INFO) -> i32;
pub type GetDiskFreeSpaceFn =
    unsafe extern "system" fn(*mut u64, *mut u64, *mut u64, PDOKAN_FILE_INFO) -> i32;
pub type GetVolumeInformationFn = unsafe extern "system" fn(
    *mut u16,
    u32,
    *mut u32,
    *mut u32,
    *mut u32,
    *mut u16,
    u32,
    PDOKAN_FILE_INFO,
) -> i32;
pub type NotifyFn = unsafe extern "system" fn(PDOKAN_FILE_INFO) -> i32;
pub type GetFileSecurityFn = unsafe extern "system" fn(
    PCWSTR,
    *mut u32,
    *mut c_void,
    u32,
    *mut u32,
    PDOKAN_FILE_INFO,
) -> i32;
pub type SetFileSecurityFn =
    unsafe extern "system" fn(PCWSTR, *mut u32, *mut c_void, u32, PDOKAN_FILE_INFO) -> i32;

/// `DOKAN_OPERATIONS`, in driver order.
#[repr(C)]
pub struct DOKAN_OPERATIONS {
    pub zw_create_file: Option<ZwCreateFileFn>,
    pub cleanup: Option<PathVoidFn>,
    pub close_file: Option<PathVoidFn>,
    pub read_file: Option<ReadFileFn>,
    pub write_file: Option<WriteFileFn>,
    pub flush_file_buffers: Option<PathFn>,
    pub get_file_information: Option<GetFileInformationFn>,
    pub find_files: Option<FindFilesFn>,
    pub find_files_with_pattern: Option<FindFilesWithPatternFn>,
    pub set_file_attributes: Option<SetFileAttributesFn>,
    pub set_file_time: Option<SetFileTimeFn>,
    pub delete_file: Option<PathFn>,
    pub delete_directory: Option<PathFn>,
    pub move_file: Option<MoveFileFn>,
    pub set_end_of_file: Option<OffsetFn>,
    pub set_allocation_size: Option<OffsetFn>,
    pub lock_file: Option<RangeFn>,
    pub unlock_file: Option<RangeFn>,
    pub get_disk_free_space: Option<GetDiskFreeSpaceFn>,
    pub get_volume_information: Option<GetVolumeInformationFn>,
    pub mounted: Option<NotifyFn>,
    pub unmounted: Option<NotifyFn>,
    pub get_file_security: Option<GetFileSecurityFn>,
    pub set_file_security: Option<SetFileSecurityFn>,
    pub find_streams: Option<unsafe extern "system" fn()>,
}

pub type DokanMainFn = unsafe extern "system" fn(*mut DOKAN_OPTIONS, *mut DOKAN_OPERATIONS) -> i32;
pub type DokanVersionFn = unsafe extern "system" fn() -> u32;
pub type DokanUnmountFn = unsafe extern "system" fn(u16) -> BOOL;
pub type DokanRemoveMountPointFn = unsafe extern "system" fn(PCWSTR) -> BOOL;
