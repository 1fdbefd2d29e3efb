//! Shared setup for MemFs tests.

#![allow(dead_code)]

use dokan_host::testing::{DriverSession, assert_status_ok};
use dokan_host::{Bridge, SecurityDescriptor};
use dokan_memfs::{MemFs, MemFsConfig};
use std::sync::Arc;
use std::time::Duration;

pub const MOUNT_TIMEOUT: Duration = Duration::from_secs(5);

/// A fresh volume and a session talking to it through the bridge.
pub fn session_with(config: MemFsConfig) -> (Arc<MemFs>, DriverSession) {
    let fs = Arc::new(MemFs::new(config));
    let bridge = Bridge::new(Arc::clone(&fs));
    (fs, DriverSession::new(Arc::new(bridge)))
}

pub fn session() -> (Arc<MemFs>, DriverSession) {
    session_with(MemFsConfig::default())
}

/// Session whose bridge serves `descriptor` for objects without their own.
pub fn session_with_volume_security(descriptor: &[u8]) -> (Arc<MemFs>, DriverSession) {
    let fs = Arc::new(MemFs::default());
    let bridge = Bridge::new(Arc::clone(&fs))
        .with_volume_security(Some(SecurityDescriptor(descriptor.to_vec())));
    (fs, DriverSession::new(Arc::new(bridge)))
}

/// Creates `path` with `data` and closes it.
pub fn write_file(session: &DriverSession, path: &str, data: &[u8]) {
    let mut info = assert_status_ok(session.create_file(path), "create");
    assert_status_ok(session.write(path, &mut info, 0, data), "write");
    assert_status_ok(session.close_handle(path, &mut info), "close");
}

/// Opens `path`, reads up to `len` bytes and closes it.
pub fn read_file(session: &DriverSession, path: &str, len: usize) -> Vec<u8> {
    let mut info = assert_status_ok(session.open(path), "open");
    let data = assert_status_ok(session.read(path, &mut info, 0, len), "read");
    assert_status_ok(session.close_handle(path, &mut info), "close");
    data
}

/// Names listed in `dir`, sorted.
pub fn list(session: &DriverSession, dir: &str) -> Vec<String> {
    let mut info = assert_status_ok(session.open_directory(dir), "open dir");
    let mut names: Vec<String> = assert_status_ok(session.find_files(dir, &mut info), "find")
        .iter()
        .map(dokan_host::FindData::name)
        .collect();
    assert_status_ok(session.close_handle(dir, &mut info), "close dir");
    names.sort();
    names
}
