//! In-process stand-in for the driver library.

use crate::bridge::Dispatch;
use crate::driver::Driver;
use crate::options::{DeviceOptions, drive_letter, normalize_mount_point};
use crate::request::OperationRequest;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

struct LiveMount {
    letter: Option<char>,
    dispatch: Arc<dyn Dispatch>,
    /// Mounted notification delivered.
    ready: bool,
    stop: bool,
}

/// A [`Driver`] that mounts nothing.
///
/// `run` fires the mounted notification, blocks until `unmount` or
/// `remove_mount_point` names the mount, then fires unmounted and returns 0.
/// A forced negative status makes `run` fail immediately instead.
///
/// ```
/// use dokan_host::testing::MockDriver;
/// use dokan_host::Driver;
///
/// let driver = MockDriver::new().with_mount_status(-5);
/// assert_eq!(driver.library_version(), MockDriver::DEFAULT_VERSION);
/// ```
pub struct MockDriver {
    library_version: u32,
    driver_version: u32,
    mount_status: Option<i32>,
    refuse_unmount: bool,
    refuse_remove: bool,
    mounts: Mutex<HashMap<String, LiveMount>>,
    changed: Condvar,
    last_options: Mutex<Option<DeviceOptions>>,
    run_calls: AtomicUsize,
    unmount_calls: AtomicUsize,
    remove_calls: AtomicUsize,
}

impl std::fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDriver")
            .field("library_version", &self.library_version)
            .field("driver_version", &self.driver_version)
            .field("mount_status", &self.mount_status)
            .field("live", &self.mounts.lock().len())
            .finish_non_exhaustive()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Version reported by default for both library and driver.
    pub const DEFAULT_VERSION: u32 = 151;

    /// A driver that mounts successfully.
    pub fn new() -> Self {
        Self {
            library_version: Self::DEFAULT_VERSION,
            driver_version: Self::DEFAULT_VERSION,
            mount_status: None,
            refuse_unmount: false,
            refuse_remove: false,
            mounts: Mutex::new(HashMap::new()),
            changed: Condvar::new(),
            last_options: Mutex::new(None),
            run_calls: AtomicUsize::new(0),
            unmount_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
        }
    }

    /// Reports these versions.
    #[must_use]
    pub fn with_versions(mut self, library: u32, driver: u32) -> Self {
        self.library_version = library;
        self.driver_version = driver;
        self
    }

    /// `run` returns `code` immediately if negative, or after unmount
    /// otherwise.
    #[must_use]
    pub fn with_mount_status(mut self, code: i32) -> Self {
        self.mount_status = Some(code);
        self
    }

    /// `unmount` always returns `false` and does not stop the mount.
    #[must_use]
    pub fn refusing_unmount(mut self) -> Self {
        self.refuse_unmount = true;
        self
    }

    /// `remove_mount_point` always returns `false` and does not stop the
    /// mount.
    #[must_use]
    pub fn refusing_remove(mut self) -> Self {
        self.refuse_remove = true;
        self
    }

    /// Calls to `run` so far.
    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    /// Calls to `unmount` so far.
    pub fn unmount_calls(&self) -> usize {
        self.unmount_calls.load(Ordering::SeqCst)
    }

    /// Calls to `remove_mount_point` so far.
    pub fn remove_mount_point_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    /// Options passed to the most recent `run`.
    pub fn last_options(&self) -> Option<DeviceOptions> {
        self.last_options.lock().clone()
    }

    /// Whether `mount_point` is currently mounted.
    pub fn is_mounted(&self, mount_point: &str) -> bool {
        self.mounts
            .lock()
            .get(&normalize_mount_point(mount_point))
            .is_some_and(|m| m.ready)
    }

    /// Number of live mounts.
    pub fn live_count(&self) -> usize {
        self.mounts.lock().len()
    }

    /// Blocks until `mount_point` is mounted or `timeout` passes.
    pub fn wait_until_mounted(&self, mount_point: &str, timeout: Duration) -> bool {
        let key = normalize_mount_point(mount_point);
        self.wait_for(timeout, |mounts| mounts.get(&key).is_some_and(|m| m.ready))
    }

    /// Blocks until `mount_point` is gone or `timeout` passes.
    pub fn wait_until_unmounted(&self, mount_point: &str, timeout: Duration) -> bool {
        let key = normalize_mount_point(mount_point);
        self.wait_for(timeout, |mounts| !mounts.contains_key(&key))
    }

    /// The dispatcher serving `mount_point`, for issuing requests directly.
    pub fn dispatcher(&self, mount_point: &str) -> Option<Arc<dyn Dispatch>> {
        self.mounts
            .lock()
            .get(&normalize_mount_point(mount_point))
            .map(|m| Arc::clone(&m.dispatch))
    }

    fn wait_for(
        &self,
        timeout: Duration,
        done: impl Fn(&HashMap<String, LiveMount>) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut mounts = self.mounts.lock();
        while !done(&mounts) {
            if self.changed.wait_until(&mut mounts, deadline).timed_out() {
                return done(&mounts);
            }
        }
        true
    }

    fn request_stop(&self, matches: impl Fn(&str, &LiveMount) -> bool) -> bool {
        let mut mounts = self.mounts.lock();
        let mut found = false;
        for (key, mount) in mounts.iter_mut() {
            if matches(key, mount) {
                mount.stop = true;
                found = true;
            }
        }
        if found {
            self.changed.notify_all();
        }
        found
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn library_version(&self) -> u32 {
        self.library_version
    }

    fn driver_version(&self) -> u32 {
        self.driver_version
    }

    fn run(&self, options: &DeviceOptions, dispatch: Arc<dyn Dispatch>) -> i32 {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options.clone());

        if let Some(code) = self.mount_status
            && code < 0
        {
            return code;
        }

        let key = options.normalized_mount_point();
        {
            let mut mounts = self.mounts.lock();
            if mounts.contains_key(&key) {
                // Mount point already assigned
                return -5;
            }
            mounts.insert(
                key.clone(),
                LiveMount {
                    letter: drive_letter(&options.mount_point),
                    dispatch: Arc::clone(&dispatch),
                    ready: false,
                    stop: false,
                },
            );
        }

        dispatch.dispatch(OperationRequest::Mounted);

        {
            let mut mounts = self.mounts.lock();
            if let Some(mount) = mounts.get_mut(&key) {
                mount.ready = true;
            }
            self.changed.notify_all();
            while !mounts.get(&key).is_none_or(|m| m.stop) {
                self.changed.wait(&mut mounts);
            }
        }

        dispatch.dispatch(OperationRequest::Unmounted);
        self.mounts.lock().remove(&key);
        self.changed.notify_all();

        self.mount_status.unwrap_or(0)
    }

    fn unmount(&self, letter: char) -> bool {
        self.unmount_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_unmount {
            return false;
        }
        let letter = letter.to_ascii_uppercase();
        self.request_stop(|_, mount| mount.letter == Some(letter))
    }

    fn remove_mount_point(&self, mount_point: &str) -> bool {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_remove {
            return false;
        }
        let key = normalize_mount_point(mount_point);
        self.request_stop(|k, _| k == key);
        true
    }
}
