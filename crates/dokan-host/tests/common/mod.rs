//! Stub filesystems shared by the integration tests.

#![allow(dead_code)]

use dokan_host::testing::MockDriver;
use dokan_host::{
    Call, CreateRequest, DeviceOptions, DirEntry, DirFiller, Dispatch, Driver, FileMetadata,
    FileSystem, FsError, FsResult, MountController, MountError, Opened,
};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// How long tests wait for the mock driver to report a mount.
pub const MOUNT_TIMEOUT: Duration = Duration::from_secs(5);

fn epoch_metadata(is_directory: bool) -> FileMetadata {
    if is_directory {
        FileMetadata::directory(UNIX_EPOCH)
    } else {
        FileMetadata::file(0, UNIX_EPOCH)
    }
}

fn is_root(path: &str) -> bool {
    path == "\\"
}

/// Implements only the two required capabilities.
pub struct MinimalFs;

impl FileSystem for MinimalFs {
    type Context = ();

    fn create_file(&self, path: &str, _request: &CreateRequest) -> FsResult<Opened<()>> {
        Ok(Opened::existing((), is_root(path)))
    }

    fn get_file_information(&self, call: &Call<'_, ()>) -> FsResult<FileMetadata> {
        Ok(epoch_metadata(call.info.is_directory))
    }
}

/// Hands out a fresh token per open and logs which token each call saw.
#[derive(Default)]
pub struct TokenFs {
    next: AtomicU64,
    pub log: Mutex<Vec<(&'static str, u64)>>,
}

impl TokenFs {
    pub fn calls(&self) -> Vec<(&'static str, u64)> {
        self.log.lock().clone()
    }
}

impl FileSystem for TokenFs {
    type Context = u64;

    fn create_file(&self, path: &str, _request: &CreateRequest) -> FsResult<Opened<u64>> {
        let token = 1000 + self.next.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(("create", token));
        Ok(Opened::created(token, is_root(path)))
    }

    fn close(&self, call: &Call<'_, u64>) {
        self.log.lock().push(("close", *call.context));
    }

    fn read(&self, call: &Call<'_, u64>, buffer: &mut [u8], _offset: u64) -> FsResult<usize> {
        self.log.lock().push(("read", *call.context));
        buffer.fill(b'x');
        Ok(buffer.len())
    }

    fn get_file_information(&self, call: &Call<'_, u64>) -> FsResult<FileMetadata> {
        Ok(epoch_metadata(call.info.is_directory))
    }
}

/// A directory holding a fixed list of file names.
pub struct ListingFs {
    pub names: Vec<String>,
}

impl ListingFs {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl FileSystem for ListingFs {
    type Context = ();

    fn create_file(&self, path: &str, _request: &CreateRequest) -> FsResult<Opened<()>> {
        Ok(Opened::existing((), is_root(path)))
    }

    fn get_file_information(&self, call: &Call<'_, ()>) -> FsResult<FileMetadata> {
        Ok(epoch_metadata(call.info.is_directory))
    }

    fn find_files(&self, _call: &Call<'_, ()>, fill: &mut DirFiller<'_>) -> FsResult<()> {
        let meta = FileMetadata::file(3, SystemTime::UNIX_EPOCH);
        for name in &self.names {
            if fill.add(&DirEntry::from_metadata(name.clone(), &meta)) {
                break;
            }
        }
        Ok(())
    }
}

/// Every data operation fails with an unclassified error.
pub struct FailingFs {
    pub message: String,
}

impl FileSystem for FailingFs {
    type Context = ();

    fn create_file(&self, _path: &str, _request: &CreateRequest) -> FsResult<Opened<()>> {
        Ok(Opened::existing((), false))
    }

    fn read(&self, _call: &Call<'_, ()>, _buffer: &mut [u8], _offset: u64) -> FsResult<usize> {
        Err(FsError::Unknown(self.message.clone()))
    }

    fn get_file_information(&self, _call: &Call<'_, ()>) -> FsResult<FileMetadata> {
        Err(FsError::Io(std::io::Error::other(self.message.clone())))
    }
}

/// Reports a failure from the mounted notification.
pub struct RefusingMountFs;

impl FileSystem for RefusingMountFs {
    type Context = ();

    fn create_file(&self, path: &str, _request: &CreateRequest) -> FsResult<Opened<()>> {
        Ok(Opened::existing((), is_root(path)))
    }

    fn get_file_information(&self, call: &Call<'_, ()>) -> FsResult<FileMetadata> {
        Ok(epoch_metadata(call.info.is_directory))
    }

    fn mounted(&self) -> FsResult<()> {
        Err(FsError::Unknown("backing store offline".into()))
    }
}

/// Panics on read and write.
pub struct PanickingFs;

impl FileSystem for PanickingFs {
    type Context = ();

    fn create_file(&self, _path: &str, _request: &CreateRequest) -> FsResult<Opened<()>> {
        Ok(Opened::existing((), false))
    }

    fn read(&self, _call: &Call<'_, ()>, _buffer: &mut [u8], _offset: u64) -> FsResult<usize> {
        panic!("read exploded");
    }

    fn write(
        &self,
        _call: &Call<'_, ()>,
        _data: &[u8],
        _offset: dokan_host::WriteOffset,
    ) -> FsResult<usize> {
        panic!("{}", String::from("write exploded"));
    }

    fn get_file_information(&self, _call: &Call<'_, ()>) -> FsResult<FileMetadata> {
        Ok(epoch_metadata(false))
    }
}

/// Runs `controller.start()` on a background thread.
pub fn spawn_mount<F: FileSystem>(
    controller: &Arc<MountController<F>>,
) -> JoinHandle<Result<(), MountError>> {
    let controller = Arc::clone(controller);
    std::thread::spawn(move || controller.start())
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    true
}

// ============================================================================
// Gated driver
// ============================================================================

/// Holds every `run` until [`GatedDriver::open`], then behaves like the
/// wrapped [`MockDriver`]. Leaves a window where the mount point is reserved
/// but the volume is not up.
pub struct GatedDriver {
    pub inner: Arc<MockDriver>,
    open: Mutex<bool>,
    opened: Condvar,
}

impl GatedDriver {
    pub fn new(inner: Arc<MockDriver>) -> Self {
        Self {
            inner,
            open: Mutex::new(false),
            opened: Condvar::new(),
        }
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

impl Driver for GatedDriver {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn library_version(&self) -> u32 {
        self.inner.library_version()
    }

    fn driver_version(&self) -> u32 {
        self.inner.driver_version()
    }

    fn run(&self, options: &DeviceOptions, dispatch: Arc<dyn Dispatch>) -> i32 {
        {
            let mut open = self.open.lock();
            while !*open {
                self.opened.wait(&mut open);
            }
        }
        self.inner.run(options, dispatch)
    }

    fn unmount(&self, letter: char) -> bool {
        self.inner.unmount(letter)
    }

    fn remove_mount_point(&self, mount_point: &str) -> bool {
        self.inner.remove_mount_point(mount_point)
    }
}
