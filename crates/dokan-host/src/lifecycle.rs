//! Mount lifecycle controller.
//!
//! A [`MountController`] owns one [`DeviceOptions`] and one filesystem. Its
//! [`start`](MountController::start) blocks for the whole mount; any other
//! thread (or a signal, or process exit) ends the mount through
//! [`stop`]. Live mounts are tracked process-wide by normalized mount point,
//! at most one [`MountHandle`] each.
//!
//! # Teardown
//!
//! [`MountHandle::teardown`] is one-shot. The first call issues both driver
//! unmount calls, always attempting the second even if the first fails; every
//! later call is a no-op. Failures are logged and returned in
//! [`StopOutcome`], never raised.
//!
//! A stop that arrives after `start` reserved the mount point but before the
//! driver reported the volume up is recorded and carried out when the
//! mounted notification arrives.

use crate::bridge::Bridge;
use crate::driver::{Driver, DriverVersions};
use crate::error::{ConfigurationError, MountError, UnmountError};
use crate::exit;
use crate::filesystem::FileSystem;
use crate::options::{DeviceOptions, drive_letter, normalize_mount_point};
use crate::stats::BridgeStats;
use crate::status::MountStatus;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::thread;
use tracing::{debug, error, info, warn};

/// Live mounts of this process, keyed by normalized mount point.
static MOUNTS: LazyLock<DashMap<String, Arc<MountHandle>>> = LazyLock::new(DashMap::new);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Reserved by `start`; the driver has not reported the volume up.
    Reserved,
    /// The driver reported the volume up.
    Live,
    /// Stopped while reserved; unmount when the volume comes up.
    StopPending,
    TornDown,
}

/// One mount, from reservation in `start` until teardown.
pub struct MountHandle {
    mount_point: String,
    key: String,
    driver: Arc<dyn Driver>,
    phase: Mutex<Phase>,
}

impl fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountHandle")
            .field("mount_point", &self.mount_point)
            .field("driver", &self.driver.name())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

impl MountHandle {
    /// Handle for a volume `driver` already serves at `mount_point`.
    pub fn new(mount_point: impl Into<String>, driver: Arc<dyn Driver>) -> Self {
        Self::with_phase(mount_point.into(), driver, Phase::Live)
    }

    /// Handle for a mount `start` is about to bring up.
    fn reserved(mount_point: String, driver: Arc<dyn Driver>) -> Self {
        Self::with_phase(mount_point, driver, Phase::Reserved)
    }

    fn with_phase(mount_point: String, driver: Arc<dyn Driver>, phase: Phase) -> Self {
        Self {
            key: normalize_mount_point(&mount_point),
            mount_point,
            driver,
            phase: Mutex::new(phase),
        }
    }

    /// Mount point as configured.
    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// Normalized mount point.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether teardown already ran or is pending.
    pub fn is_torn_down(&self) -> bool {
        matches!(*self.phase.lock(), Phase::StopPending | Phase::TornDown)
    }

    /// Unmounts once. Later calls return [`StopOutcome::NotMounted`].
    ///
    /// Before the volume is up, the stop is only recorded and
    /// [`StopOutcome::Deferred`] is returned.
    pub fn teardown(&self) -> StopOutcome {
        {
            let mut phase = self.phase.lock();
            match *phase {
                Phase::Reserved => {
                    *phase = Phase::StopPending;
                    info!(
                        mount_point = %self.mount_point,
                        "stop requested before mount came up, deferring"
                    );
                    return StopOutcome::Deferred;
                }
                Phase::Live => *phase = Phase::TornDown,
                Phase::StopPending | Phase::TornDown => {
                    debug!(mount_point = %self.mount_point, "already torn down");
                    return StopOutcome::NotMounted;
                }
            }
        }
        self.unmount()
    }

    /// Called when the driver reports the volume up. Returns `true` if the
    /// mount should be armed for exit cleanup.
    fn established(self: &Arc<Self>) -> bool {
        {
            let mut phase = self.phase.lock();
            match *phase {
                Phase::Reserved => {
                    *phase = Phase::Live;
                    return true;
                }
                Phase::StopPending => *phase = Phase::TornDown,
                Phase::Live | Phase::TornDown => return false,
            }
        }

        // Unmount off the notification thread; the driver may still be
        // finishing the mount on it.
        info!(mount_point = %self.mount_point, "mount came up after stop, unmounting");
        let handle = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("dokan-deferred-unmount".to_string())
            .spawn(move || {
                handle.unmount();
            });
        if let Err(e) = spawned {
            warn!(
                mount_point = %self.mount_point,
                error = %e,
                "could not spawn unmount thread, unmounting inline"
            );
            self.unmount();
        }
        false
    }

    fn unmount(&self) -> StopOutcome {
        info!(mount_point = %self.mount_point, "unmounting");
        let mut errors = Vec::new();

        match drive_letter(&self.mount_point) {
            Some(letter) => {
                if !self.driver.unmount(letter) {
                    warn!(mount_point = %self.mount_point, %letter, "driver refused unmount");
                    errors.push(UnmountError::Unmount { letter });
                }
            }
            None => {
                warn!(mount_point = %self.mount_point, "no drive letter, skipping logical unmount");
                errors.push(UnmountError::NoDriveLetter(self.mount_point.clone()));
            }
        }

        if !self.driver.remove_mount_point(&self.mount_point) {
            warn!(mount_point = %self.mount_point, "driver refused to remove mount point");
            errors.push(UnmountError::RemoveMountPoint(self.mount_point.clone()));
        }

        if errors.is_empty() {
            StopOutcome::Unmounted
        } else {
            StopOutcome::Incomplete(errors)
        }
    }

    /// Marks the handle finished without calling the driver.
    fn retire(&self) {
        *self.phase.lock() = Phase::TornDown;
    }
}

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Both unmount calls succeeded.
    Unmounted,
    /// Nothing was mounted there (or it was already torn down); no driver
    /// call was made.
    NotMounted,
    /// Teardown ran but at least one step failed.
    Incomplete(Vec<UnmountError>),
    /// The driver had not reported the volume up yet; it is unmounted as
    /// soon as it does.
    Deferred,
}

impl StopOutcome {
    /// Whether the driver was asked to unmount.
    pub fn was_effectful(&self) -> bool {
        !matches!(self, StopOutcome::NotMounted)
    }
}

/// Ends the mount at `mount_point`, if this process owns one.
///
/// Never fails: an unknown mount point is logged and reported as
/// [`StopOutcome::NotMounted`].
pub fn stop(mount_point: &str) -> StopOutcome {
    let key = normalize_mount_point(mount_point);
    let Some((_, handle)) = MOUNTS.remove(&key) else {
        info!(mount_point, "no live mount at this mount point, nothing to stop");
        return StopOutcome::NotMounted;
    };
    exit::disarm(&handle);
    handle.teardown()
}

/// Stops exactly this handle, leaving a newer mount at the same point alone.
pub(crate) fn stop_handle(handle: &Arc<MountHandle>) -> StopOutcome {
    MOUNTS.remove_if(handle.key(), |_, live| Arc::ptr_eq(live, handle));
    handle.teardown()
}

/// Whether this process has a live mount at `mount_point`.
pub fn is_mounted(mount_point: &str) -> bool {
    MOUNTS.contains_key(&normalize_mount_point(mount_point))
}

/// Mount points this process currently owns.
pub fn live_mounts() -> Vec<String> {
    let mut mounts: Vec<String> = MOUNTS.iter().map(|e| e.value().mount_point.clone()).collect();
    mounts.sort();
    mounts
}

/// Drops the registry entry and exit hook for a mount whose driver loop
/// has returned.
fn release(handle: &Arc<MountHandle>) {
    MOUNTS.remove_if(handle.key(), |_, live| Arc::ptr_eq(live, handle));
    exit::disarm(handle);
}

/// Owns the lifecycle of one mount.
pub struct MountController<F: FileSystem> {
    options: DeviceOptions,
    fs: Arc<F>,
    driver: Arc<dyn Driver>,
    versions: DriverVersions,
    stats: Arc<BridgeStats>,
}

impl<F: FileSystem> fmt::Debug for MountController<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountController")
            .field("mount_point", &self.options.mount_point)
            .field("driver", &self.driver.name())
            .field("versions", &self.versions)
            .finish_non_exhaustive()
    }
}

impl<F: FileSystem> MountController<F> {
    /// Validates `options` and records the driver's versions.
    ///
    /// No driver call is made when the options are invalid.
    pub fn new(
        options: DeviceOptions,
        fs: F,
        driver: Arc<dyn Driver>,
    ) -> Result<Self, ConfigurationError> {
        Self::with_shared(options, Arc::new(fs), driver)
    }

    /// Like [`new`](Self::new) for a filesystem the caller keeps a handle to.
    pub fn with_shared(
        options: DeviceOptions,
        fs: Arc<F>,
        driver: Arc<dyn Driver>,
    ) -> Result<Self, ConfigurationError> {
        options.validate()?;
        let versions = DriverVersions::query(driver.as_ref());
        versions.log(driver.name());
        Ok(Self {
            options,
            fs,
            driver,
            versions,
            stats: Arc::new(BridgeStats::new()),
        })
    }

    /// The options this controller mounts with.
    pub fn options(&self) -> &DeviceOptions {
        &self.options
    }

    /// The hosted filesystem.
    pub fn filesystem(&self) -> &Arc<F> {
        &self.fs
    }

    /// Versions recorded at construction.
    pub fn versions(&self) -> DriverVersions {
        self.versions
    }

    /// Library version recorded at construction.
    pub fn library_version(&self) -> u32 {
        self.versions.library
    }

    /// Kernel driver version recorded at construction.
    pub fn driver_version(&self) -> u32 {
        self.versions.driver
    }

    /// Bridge statistics, accumulated across every `start`.
    pub fn stats(&self) -> &Arc<BridgeStats> {
        &self.stats
    }

    /// Mounts and blocks until the volume is unmounted.
    ///
    /// Fails without contacting the driver if the options are invalid or
    /// this process already has a mount at the same point. A negative driver
    /// status is returned as [`MountError::Driver`] and leaves nothing
    /// registered.
    pub fn start(&self) -> Result<(), MountError> {
        self.options.validate()?;

        let handle = Arc::new(MountHandle::reserved(
            self.options.mount_point.clone(),
            Arc::clone(&self.driver),
        ));
        match MOUNTS.entry(handle.key().to_string()) {
            Entry::Occupied(_) => {
                return Err(MountError::AlreadyMounted(self.options.mount_point.clone()));
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&handle));
            }
        }

        let armed = Arc::clone(&handle);
        let bridge = Bridge::new(Arc::clone(&self.fs))
            .with_volume_security(self.options.security.clone())
            .with_stats(Arc::clone(&self.stats))
            .on_mounted(move || {
                if armed.established() {
                    exit::arm(Arc::clone(&armed));
                }
            });

        info!(
            mount_point = %self.options.mount_point,
            threads = self.options.thread_count,
            flags = self.options.flags.bits(),
            timeout_ms = self.options.timeout_millis(),
            "mounting"
        );
        let code = self.driver.run(&self.options, Arc::new(bridge));
        let status = MountStatus::from_code(code);
        release(&handle);

        if status.is_failure() {
            error!(mount_point = %self.options.mount_point, code, %status, "mount failed");
            return Err(MountError::Driver {
                mount_point: self.options.mount_point.clone(),
                status,
            });
        }

        handle.retire();
        let snapshot = self.stats.snapshot();
        info!(
            mount_point = %self.options.mount_point,
            calls = snapshot.total_calls,
            failures = snapshot.failures,
            panics = snapshot.panics,
            bytes_read = snapshot.bytes_read,
            bytes_written = snapshot.bytes_written,
            "mount ended"
        );
        Ok(())
    }

    /// Stops the mount at `mount_point`. See [`stop`].
    pub fn stop(&self, mount_point: &str) -> StopOutcome {
        stop(mount_point)
    }

    /// Stops this controller's own mount.
    pub fn shutdown(&self) -> StopOutcome {
        stop(&self.options.mount_point)
    }

    /// Whether this controller's mount point is live in this process.
    pub fn is_mounted(&self) -> bool {
        is_mounted(&self.options.mount_point)
    }
}
