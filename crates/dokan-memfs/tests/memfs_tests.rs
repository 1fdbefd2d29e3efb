//! MemFs driven through the bridge, the way the driver talks to it.

mod common;

use common::{
    MOUNT_TIMEOUT, list, read_file, session, session_with, session_with_volume_security, write_file,
};
use dokan_host::testing::{MockDriver, assert_status, assert_status_err, assert_status_ok};
use dokan_host::{
    CreateDisposition, DeviceOptions, FILE_NON_DIRECTORY_FILE, FileAttributes, MountController,
    NtStatus, StopOutcome, VolumeInfo, stop,
};
use dokan_memfs::{MemFs, MemFsConfig};
use proptest::prelude::*;
use std::sync::Arc;

// ============================================================================
// Files and directories
// ============================================================================

#[test]
fn test_write_then_read_back() {
    let (fs, session) = session();
    write_file(&session, "\\notes.txt", b"hello memory");

    assert_eq!(read_file(&session, "\\notes.txt", 64), b"hello memory");
    assert_eq!(fs.used_bytes(), 12);
    assert_eq!(fs.node_count(), 2);
}

#[test]
fn test_names_are_case_insensitive_and_case_preserving() {
    let (fs, session) = session();
    write_file(&session, "\\ReadMe.TXT", b"x");

    assert!(fs.exists("\\readme.txt"));
    assert_eq!(read_file(&session, "\\README.txt", 4), b"x");
    assert_eq!(list(&session, "\\"), vec!["ReadMe.TXT"]);
}

#[test]
fn test_create_existing_collides() {
    let (_fs, session) = session();
    write_file(&session, "\\a.txt", b"1");

    let (status, _) = session.create_raw(
        "\\a.txt",
        CreateDisposition::Create.to_raw(),
        FILE_NON_DIRECTORY_FILE,
        0,
    );
    assert_status(status, NtStatus::OBJECT_NAME_COLLISION, "create over existing");
}

#[test]
fn test_missing_file_versus_missing_parent() {
    let (_fs, session) = session();
    assert_status_err(session.open("\\nope.txt"), NtStatus::OBJECT_NAME_NOT_FOUND, "missing file");
    assert_status_err(
        session.open("\\nodir\\nope.txt"),
        NtStatus::OBJECT_PATH_NOT_FOUND,
        "missing parent",
    );
}

#[test]
fn test_invalid_name_rejected() {
    let (fs, session) = session();
    assert_status_err(
        session.create_file("\\a<b.txt"), NtStatus::OBJECT_NAME_INVALID, "forbidden char",
    );
    assert_eq!(fs.node_count(), 1);
}

#[test]
fn test_opening_file_as_directory_fails() {
    let (_fs, session) = session();
    write_file(&session, "\\plain", b"");
    assert_status_err(session.open_directory("\\plain"), NtStatus::NOT_A_DIRECTORY, "file as dir");
}

#[test]
fn test_nested_directories_list_their_children() {
    let (_fs, session) = session();
    let mut dir = assert_status_ok(session.create_directory("\\docs"), "mkdir");
    assert!(dir.is_directory);
    assert_status_ok(session.close_handle("\\docs", &mut dir), "close dir");

    write_file(&session, "\\docs\\b.txt", b"bb");
    write_file(&session, "\\docs\\a.txt", b"a");

    assert_eq!(list(&session, "\\docs"), vec!["a.txt", "b.txt"]);
    assert_eq!(list(&session, "\\"), vec!["docs"]);

    let mut info = assert_status_ok(session.open("\\docs\\b.txt"), "open");
    let meta = assert_status_ok(session.get_file_information("\\docs\\b.txt", &mut info), "info");
    assert_eq!(meta.file_size(), 2);
    assert_eq!(meta.file_attributes & FileAttributes::DIRECTORY.bits(), 0);
    assert_eq!(meta.volume_serial_number, MemFsConfig::default().serial_number);
}

#[test]
fn test_pattern_find_filters_names() {
    let (_fs, session) = session();
    write_file(&session, "\\one.txt", b"");
    write_file(&session, "\\two.log", b"");
    write_file(&session, "\\three.TXT", b"");

    let mut root = assert_status_ok(session.open_directory("\\"), "open root");
    let found = session.find_files_with_pattern("\\", "*.txt", &mut root);
    let mut names: Vec<String> = assert_status_ok(found, "find")
        .iter()
        .map(dokan_host::FindData::name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["one.txt", "three.TXT"]);
}

#[test]
fn test_listing_stops_when_buffer_full() {
    let (_fs, session) = session();
    for i in 0..5 {
        write_file(&session, &format!("\\f{i}"), b"");
    }
    let session = session.with_find_capacity(2);
    let mut root = assert_status_ok(session.open_directory("\\"), "open root");
    assert_eq!(assert_status_ok(session.find_files("\\", &mut root), "find").len(), 2);
}

// ============================================================================
// Deletion
// ============================================================================

#[test]
fn test_delete_happens_on_close() {
    let (fs, session) = session();
    write_file(&session, "\\gone.txt", b"12345");

    let mut info = assert_status_ok(session.open("\\gone.txt"), "open");
    assert_status_ok(session.delete_file("\\gone.txt", &mut info), "delete allowed");
    assert!(fs.exists("\\gone.txt"));

    info.delete_on_close = true;
    assert_status_ok(session.close_handle("\\gone.txt", &mut info), "close");
    assert!(!fs.exists("\\gone.txt"));
    assert_eq!(fs.used_bytes(), 0);
}

#[test]
fn test_non_empty_directory_is_kept() {
    let (fs, session) = session();
    let mut dir = assert_status_ok(session.create_directory("\\full"), "mkdir");
    assert_status_ok(session.close_handle("\\full", &mut dir), "close");
    write_file(&session, "\\full\\inner", b"1");

    assert_status_err(session.delete("\\full"), NtStatus::DIRECTORY_NOT_EMPTY, "non-empty dir");
    assert_status_ok(session.delete("\\full\\inner"), "delete inner");
    assert_status_ok(session.delete("\\full"), "delete dir");
    assert!(!fs.exists("\\full"));
}

#[test]
fn test_root_cannot_be_deleted() {
    let (fs, session) = session();
    assert_status_err(session.delete("\\"), NtStatus::ACCESS_DENIED, "root");
    assert!(fs.exists("\\"));
}

#[test]
fn test_read_only_file_refuses_changes() {
    let (_fs, session) = session();
    write_file(&session, "\\locked.txt", b"keep");

    let mut info = assert_status_ok(session.open("\\locked.txt"), "open");
    assert_status_ok(
        session.set_file_attributes("\\locked.txt", &mut info, FileAttributes::READONLY.bits()),
        "set readonly",
    );
    let meta = assert_status_ok(session.get_file_information("\\locked.txt", &mut info), "info");
    assert_ne!(meta.file_attributes & FileAttributes::READONLY.bits(), 0);

    assert_status_err(
        session.write("\\locked.txt", &mut info, 0, b"x"),
        NtStatus::ACCESS_DENIED,
        "write",
    );
    assert_status_ok(session.close_handle("\\locked.txt", &mut info), "close");
    assert_status_err(session.delete("\\locked.txt"), NtStatus::ACCESS_DENIED, "delete");
    assert_eq!(read_file(&session, "\\locked.txt", 8), b"keep");
}

// ============================================================================
// Moves
// ============================================================================

#[test]
fn test_move_refuses_existing_target_without_replace() {
    let (_fs, session) = session();
    write_file(&session, "\\src.txt", b"source");
    write_file(&session, "\\dst.txt", b"target");

    let mut info = assert_status_ok(session.open("\\src.txt"), "open");
    assert_status_err(
        session.move_file("\\src.txt", &mut info, "\\dst.txt", false),
        NtStatus::OBJECT_NAME_COLLISION,
        "no replace",
    );
    assert_status_ok(session.move_file("\\src.txt", &mut info, "\\dst.txt", true), "replace");
    assert_status_ok(session.close_handle("\\dst.txt", &mut info), "close");

    assert_eq!(read_file(&session, "\\dst.txt", 16), b"source");
    assert_status_err(session.open("\\src.txt"), NtStatus::OBJECT_NAME_NOT_FOUND, "source gone");
}

#[test]
fn test_moving_directory_carries_its_contents() {
    let (fs, session) = session();
    let mut dir = assert_status_ok(session.create_directory("\\old"), "mkdir");
    assert_status_ok(session.close_handle("\\old", &mut dir), "close");
    write_file(&session, "\\old\\file.bin", b"payload");

    let mut dir = assert_status_ok(session.open_directory("\\old"), "open dir");
    assert_status_ok(session.move_file("\\old", &mut dir, "\\New", false), "move dir");
    assert_status_ok(session.close_handle("\\New", &mut dir), "close");

    assert!(!fs.exists("\\old"));
    assert_eq!(read_file(&session, "\\new\\FILE.bin", 16), b"payload");
    assert_eq!(list(&session, "\\"), vec!["New"]);
}

#[test]
fn test_directory_cannot_move_into_itself() {
    let (_fs, session) = session();
    let mut dir = assert_status_ok(session.create_directory("\\loop"), "mkdir");
    let status = session.move_file("\\loop", &mut dir, "\\loop\\inside", false);
    assert!(status.is_err());
    assert_status_ok(session.close_handle("\\loop", &mut dir), "close");
}

// ============================================================================
// Sizes and offsets
// ============================================================================

#[test]
fn test_overwrite_disposition_truncates() {
    let (fs, session) = session();
    write_file(&session, "\\big.bin", &[7u8; 100]);

    let (status, mut info) =
        session.create_raw("\\big.bin", CreateDisposition::Overwrite.to_raw(), 0, 0);
    assert!(status.is_success(), "overwrite returned {status}");
    let meta = assert_status_ok(session.get_file_information("\\big.bin", &mut info), "info");
    assert_eq!(meta.file_size(), 0);
    assert_eq!(fs.used_bytes(), 0);
}

#[test]
fn test_end_of_file_and_allocation_size() {
    let (fs, session) = session();
    write_file(&session, "\\sized", b"abcdef");
    let mut info = assert_status_ok(session.open("\\sized"), "open");

    assert_status_ok(session.set_end_of_file("\\sized", &mut info, 8), "extend");
    assert_eq!(assert_status_ok(session.read("\\sized", &mut info, 0, 16), "read"), b"abcdef\0\0");

    assert_status_ok(session.set_allocation_size("\\sized", &mut info, 64), "grow allocation");
    assert_eq!(fs.used_bytes(), 8);

    assert_status_ok(session.set_allocation_size("\\sized", &mut info, 3), "shrink allocation");
    assert_eq!(assert_status_ok(session.read("\\sized", &mut info, 0, 16), "read"), b"abc");
    assert_eq!(fs.used_bytes(), 3);
}

#[test]
fn test_paging_write_never_extends() {
    let (_fs, session) = session();
    write_file(&session, "\\paged", b"0123");
    let mut info = assert_status_ok(session.open("\\paged"), "open");
    info.paging_io = true;

    assert_eq!(assert_status_ok(session.write("\\paged", &mut info, 2, b"abcd"), "clipped"), 2);
    assert_eq!(assert_status_ok(session.write("\\paged", &mut info, 10, b"zz"), "past end"), 0);

    info.paging_io = false;
    assert_eq!(assert_status_ok(session.read("\\paged", &mut info, 0, 16), "read"), b"01ab");
}

#[test]
fn test_write_to_end_of_file_appends() {
    let (_fs, session) = session();
    write_file(&session, "\\log", b"one");
    let mut info = assert_status_ok(session.open("\\log"), "open");
    info.write_to_end_of_file = true;
    assert_status_ok(session.write("\\log", &mut info, 0, b"two"), "append");
    assert_eq!(assert_status_ok(session.read("\\log", &mut info, 0, 16), "read"), b"onetwo");
}

#[test]
fn test_read_past_end_returns_nothing() {
    let (_fs, session) = session();
    write_file(&session, "\\short", b"ab");
    let mut info = assert_status_ok(session.open("\\short"), "open");
    assert!(assert_status_ok(session.read("\\short", &mut info, 50, 4), "read").is_empty());
}

// ============================================================================
// Byte-range locks
// ============================================================================

#[test]
fn test_locks_conflict_between_handles() {
    let (_fs, session) = session();
    write_file(&session, "\\shared", b"0123456789");
    let mut owner = assert_status_ok(session.open("\\shared"), "open owner");
    let mut other = assert_status_ok(session.open("\\shared"), "open other");

    assert_status_ok(session.lock_file("\\shared", &mut owner, 0, 4), "lock");
    assert_eq!(assert_status_ok(session.read("\\shared", &mut owner, 0, 4), "owner read"), b"0123");
    assert_status_err(
        session.read("\\shared", &mut other, 2, 4),
        NtStatus::FILE_LOCK_CONFLICT,
        "other read",
    );
    assert_status_err(
        session.write("\\shared", &mut other, 0, b"x"),
        NtStatus::FILE_LOCK_CONFLICT,
        "other write",
    );
    assert_status_err(
        session.lock_file("\\shared", &mut other, 3, 2),
        NtStatus::FILE_LOCK_CONFLICT,
        "overlap",
    );
    assert_eq!(assert_status_ok(session.read("\\shared", &mut other, 4, 2), "outside lock"), b"45");

    assert_status_err(
        session.unlock_file("\\shared", &mut other, 0, 4),
        NtStatus::RANGE_NOT_LOCKED,
        "not owner",
    );
    assert_status_ok(session.unlock_file("\\shared", &mut owner, 0, 4), "unlock");
    assert_eq!(
        assert_status_ok(session.read("\\shared", &mut other, 0, 4), "after unlock"),
        b"0123"
    );
}

#[test]
fn test_cleanup_releases_locks() {
    let (_fs, session) = session();
    write_file(&session, "\\held", b"abcd");
    let mut owner = assert_status_ok(session.open("\\held"), "open owner");
    let mut other = assert_status_ok(session.open("\\held"), "open other");

    assert_status_ok(session.lock_file("\\held", &mut owner, 0, 4), "lock");
    assert_status_ok(session.close_handle("\\held", &mut owner), "close owner");
    assert_eq!(assert_status_ok(session.read("\\held", &mut other, 0, 4), "read"), b"abcd");
}

// ============================================================================
// Volume
// ============================================================================

#[test]
fn test_volume_information_reflects_config() {
    let (_fs, session) = session_with(MemFsConfig::default().label("Scratch"));
    let volume = assert_status_ok(session.get_volume_information(), "volume");
    assert_eq!(volume.name, "Scratch");
    assert_eq!(volume.fs_name, "NTFS");
    assert_eq!(volume.serial_number, MemFsConfig::default().serial_number);
    assert_ne!(volume.fs_flags & VolumeInfo::CASE_PRESERVED_NAMES, 0);
    assert_eq!(volume.fs_flags & VolumeInfo::READ_ONLY_VOLUME, 0);
}

#[test]
fn test_capacity_limits_writes() {
    let (fs, session) = session_with(MemFsConfig::default().capacity(16));
    write_file(&session, "\\fill", &[1u8; 10]);

    let mut info = assert_status_ok(session.open("\\fill"), "open");
    assert_status_err(
        session.write("\\fill", &mut info, 10, &[2u8; 10]),
        NtStatus::DISK_FULL,
        "overflow",
    );
    assert_eq!(fs.used_bytes(), 10);

    let space = assert_status_ok(session.get_disk_free_space(), "space");
    assert_eq!(space.total_number_of_bytes, 16);
    assert_eq!(space.total_number_of_free_bytes, 6);
    assert_eq!(space.free_bytes_available, 6);
}

#[test]
fn test_write_protected_volume_refuses_changes() {
    let (fs, session) = session_with(MemFsConfig::default().write_protect(true));

    assert_status_err(session.create_file("\\new.txt"), NtStatus::MEDIA_WRITE_PROTECTED, "create");
    let mut root = assert_status_ok(session.open_directory("\\"), "open root");
    assert!(assert_status_ok(session.find_files("\\", &mut root), "list").is_empty());

    let volume = assert_status_ok(session.get_volume_information(), "volume");
    assert_ne!(volume.fs_flags & VolumeInfo::READ_ONLY_VOLUME, 0);
    assert_eq!(fs.node_count(), 1);
}

// ============================================================================
// Security
// ============================================================================

#[test]
fn test_security_without_descriptor_is_not_implemented() {
    let (_fs, session) = session();
    write_file(&session, "\\plain", b"");
    let mut info = assert_status_ok(session.open("\\plain"), "open");
    let (status, _, _) = session.get_file_security("\\plain", &mut info, 0x4, 256);
    assert_status(status, NtStatus::NOT_IMPLEMENTED, "no descriptor");
}

#[test]
fn test_volume_descriptor_serves_objects_without_their_own() {
    let volume = [0x01, 0x00, 0x04, 0x80, 0, 0, 0, 0];
    let (_fs, session) = session_with_volume_security(&volume);
    let mut root = assert_status_ok(session.open_directory("\\"), "open root");
    let (status, bytes, needed) = session.get_file_security("\\", &mut root, 0x4, 64);
    assert_status(status, NtStatus::SUCCESS, "fallback");
    assert_eq!(bytes, volume);
    assert_eq!(needed, 8);
}

#[test]
fn test_stored_descriptor_round_trips_and_reports_size() {
    let (_fs, session) = session();
    write_file(&session, "\\secure", b"");
    let descriptor: Vec<u8> = (0u8..40).collect();

    let mut info = assert_status_ok(session.open("\\secure"), "open");
    assert_status_ok(session.set_file_security("\\secure", &mut info, 0x4, &descriptor), "set");

    let (status, bytes, needed) = session.get_file_security("\\secure", &mut info, 0x4, 64);
    assert_status(status, NtStatus::SUCCESS, "get");
    assert_eq!(bytes, descriptor);
    assert_eq!(needed, 40);

    let (status, _, needed) = session.get_file_security("\\secure", &mut info, 0x4, 16);
    assert_status(status, NtStatus::BUFFER_OVERFLOW, "small buffer");
    assert_eq!(needed, 40);
}

// ============================================================================
// Mounting
// ============================================================================

#[test]
fn test_mounts_and_serves_through_the_driver() {
    let driver = Arc::new(MockDriver::new());
    let controller = Arc::new(
        MountController::new(DeviceOptions::new("P:"), MemFs::default(), driver.clone())
            .expect("valid options"),
    );
    let runner = {
        let controller = Arc::clone(&controller);
        std::thread::spawn(move || controller.start())
    };
    assert!(driver.wait_until_mounted("P:", MOUNT_TIMEOUT));

    let session =
        dokan_host::testing::DriverSession::new(driver.dispatcher("P:").expect("dispatcher"));
    write_file(&session, "\\mounted.txt", b"via driver");
    assert!(controller.filesystem().exists("\\MOUNTED.TXT"));

    assert_eq!(stop("P:"), StopOutcome::Unmounted);
    runner.join().expect("mount thread panicked").expect("mount failed");
    assert!(driver.wait_until_unmounted("P:", MOUNT_TIMEOUT));
}

// ============================================================================
// Model check
// ============================================================================

proptest! {
    #[test]
    fn prop_writes_match_a_byte_vector(
        writes in prop::collection::vec(
            (0u64..64, prop::collection::vec(any::<u8>(), 0..16)),
            1..12,
        )
    ) {
        let (fs, session) = session();
        let mut info = session.create_file("\\model").expect("create");
        let mut model: Vec<u8> = Vec::new();

        for (offset, data) in &writes {
            session
                .write("\\model", &mut info, i64::try_from(*offset).unwrap(), data)
                .expect("write");
            let start = usize::try_from(*offset).unwrap();
            let end = start + data.len();
            if end > model.len() {
                model.resize(end, 0);
            }
            model[start..end].copy_from_slice(data);
        }

        let back = session.read("\\model", &mut info, 0, 128).expect("read");
        prop_assert_eq!(back, model.clone());
        prop_assert_eq!(fs.used_bytes(), model.len() as u64);
    }
}
