//! In-memory filesystem for the Dokan host.
//!
//! [`MemFs`] implements every [`FileSystem`](dokan_host::FileSystem)
//! capability over a case-insensitive tree held in memory: files and
//! directories, attributes and timestamps, delete-on-close, rename with
//! replace, truncation, byte-range locks, per-object security descriptors
//! and a fixed capacity. A write-protected volume refuses every change.
//!
//! The `memfs-mount` binary mounts one at a drive letter or folder.

#![warn(missing_docs)]

mod config;
mod memfs;
mod tree;

pub use config::{DEFAULT_CAPACITY, MemFsConfig};
pub use memfs::{MemFs, MemHandle};
