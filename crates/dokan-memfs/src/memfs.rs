//! [`FileSystem`] over the in-memory tree.

use crate::config::MemFsConfig;
use crate::tree::{self, ByteLock, NodeKind, Tree};
use dokan_host::{
    Call, CreateDisposition, CreateRequest, DirEntry, DirFiller, DiskSpace, FileAttributes,
    FileInfo, FileMetadata, FileSystem, FileTimes, FsError, FsResult, OpenKind, Opened, VolumeInfo,
    WriteOffset, name_matches_expression,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, info, trace};

/// Per-handle state.
#[derive(Debug)]
pub struct MemHandle {
    /// Unique among live handles; owns byte-range locks.
    pub id: u64,
    /// Opened object was a directory.
    pub is_directory: bool,
}

/// A volume that lives in memory and disappears at unmount.
///
/// Names compare case-insensitively and keep the spelling they were
/// created with.
///
/// ```
/// use dokan_host::testing::DriverSession;
/// use dokan_host::Bridge;
/// use dokan_memfs::MemFs;
/// use std::sync::Arc;
///
/// let session = DriverSession::new(Arc::new(Bridge::new(Arc::new(MemFs::default()))));
/// let mut info = session.create_file("\\hello.txt").unwrap();
/// session.write("\\hello.txt", &mut info, 0, b"hi").unwrap();
/// assert_eq!(session.read("\\HELLO.TXT", &mut info, 0, 8).unwrap(), b"hi");
/// ```
#[derive(Debug)]
pub struct MemFs {
    tree: RwLock<Tree>,
    config: MemFsConfig,
    next_handle: AtomicU64,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new(MemFsConfig::default())
    }
}

impl MemFs {
    /// An empty volume.
    pub fn new(config: MemFsConfig) -> Self {
        Self {
            tree: RwLock::new(Tree::new(config.capacity, SystemTime::now())),
            config,
            next_handle: AtomicU64::new(1),
        }
    }

    /// The volume configuration.
    pub fn config(&self) -> &MemFsConfig {
        &self.config
    }

    /// Number of files and directories, the root included.
    pub fn node_count(&self) -> usize {
        self.tree.read().len()
    }

    /// Bytes used by file contents.
    pub fn used_bytes(&self) -> u64 {
        self.tree.read().used()
    }

    /// Whether `path` exists.
    pub fn exists(&self, path: &str) -> bool {
        self.tree.read().contains(&tree::normalize(path))
    }

    fn writable(&self) -> FsResult<()> {
        if self.config.write_protect {
            Err(FsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn handle(&self, is_directory: bool) -> MemHandle {
        MemHandle {
            id: self.next_handle.fetch_add(1, Ordering::Relaxed),
            is_directory,
        }
    }

    fn metadata(&self, node: &tree::Node) -> FileMetadata {
        FileMetadata {
            attributes: node.attributes,
            creation_time: node.created,
            last_access_time: node.accessed,
            last_write_time: node.written,
            size: node.size(),
            number_of_links: 1,
            file_index: node.index,
            volume_serial_number: self.config.serial_number,
        }
    }

    fn list(
        &self,
        call: &Call<'_, MemHandle>,
        pattern: Option<&str>,
        fill: &mut DirFiller<'_>,
    ) -> FsResult<()> {
        let key = tree::normalize(call.path);
        let tree = self.tree.read();
        for child in tree.children(&key)? {
            if pattern.is_some_and(|p| !name_matches_expression(p, &child.name)) {
                continue;
            }
            if fill.add(&DirEntry::from_metadata(child.name.clone(), &self.metadata(child))) {
                debug!(path = call.path, "listing truncated, buffer full");
                break;
            }
        }
        Ok(())
    }

    /// Modifies a file node that is not read-only.
    fn modify_file<T>(
        &self,
        call: &Call<'_, MemHandle>,
        f: impl FnOnce(&mut Tree, &str, SystemTime) -> FsResult<T>,
    ) -> FsResult<T> {
        self.writable()?;
        let key = tree::normalize(call.path);
        let mut tree = self.tree.write();
        let node = tree.get(&key)?;
        if node.is_directory() {
            return Err(FsError::IsADirectory);
        }
        if node.is_read_only() {
            return Err(FsError::AccessDenied);
        }
        f(&mut tree, &key, SystemTime::now())
    }
}

impl FileSystem for MemFs {
    type Context = MemHandle;

    fn create_file(&self, path: &str, request: &CreateRequest) -> FsResult<Opened<MemHandle>> {
        let key = tree::normalize(path);
        let now = SystemTime::now();
        let mut tree = self.tree.write();

        if let Ok(node) = tree.get_mut(&key) {
            let is_directory = node.is_directory();
            match request.kind {
                OpenKind::Directory if !is_directory => return Err(FsError::NotADirectory),
                OpenKind::File if is_directory => return Err(FsError::IsADirectory),
                _ => {}
            }
            if request.disposition == CreateDisposition::Create {
                return Err(FsError::AlreadyExists);
            }
            if request.disposition.truncates() {
                if is_directory {
                    return Err(FsError::IsADirectory);
                }
                self.writable()?;
                if node.is_read_only() {
                    return Err(FsError::AccessDenied);
                }
                if request.disposition == CreateDisposition::Supersede
                    || !request.attributes.is_empty()
                {
                    node.set_attributes(request.attributes);
                }
                tree.set_len(&key, 0, now)?;
            } else {
                node.accessed = now;
            }
            trace!(path, "opened existing");
            return Ok(Opened::existing(self.handle(is_directory), is_directory));
        }

        if !request.disposition.may_create() {
            return Err(tree.missing(&key));
        }
        self.writable()?;
        let directory = request.kind == OpenKind::Directory;
        tree.insert(&key, tree::display_name(path), directory, request.attributes, now)?;
        debug!(path, directory, "created");
        Ok(Opened::created(self.handle(directory), directory))
    }

    fn cleanup(&self, call: &Call<'_, MemHandle>) {
        let key = tree::normalize(call.path);
        let mut tree = self.tree.write();
        if let Ok(node) = tree.get_mut(&key) {
            node.locks.retain(|lock| lock.owner != call.context.id);
        }
        if call.info.delete_on_close {
            match tree.remove(&key) {
                Ok(_) => debug!(path = call.path, "deleted on close"),
                Err(e) => debug!(path = call.path, error = %e, "delete on close failed"),
            }
        }
    }

    fn read(&self, call: &Call<'_, MemHandle>, buffer: &mut [u8], offset: u64) -> FsResult<usize> {
        let key = tree::normalize(call.path);
        let tree = self.tree.read();
        let node = tree.get(&key)?;
        let NodeKind::File(data) = &node.kind else {
            return Err(FsError::IsADirectory);
        };
        if node.conflicting_lock(call.context.id, offset, buffer.len() as u64).is_some() {
            return Err(FsError::Locked);
        }
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }
        let n = buffer.len().min(data.len() - start);
        buffer[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write(
        &self,
        call: &Call<'_, MemHandle>,
        data: &[u8],
        offset: WriteOffset,
    ) -> FsResult<usize> {
        self.modify_file(call, |tree, key, now| {
            let node = tree.get(key)?;
            let len = node.size();
            let (start, data) = match offset {
                WriteOffset::At(start) => (start, data),
                WriteOffset::EndOfFile => (len, data),
                WriteOffset::Paging(start) => {
                    // Paging writes never extend the file.
                    if start >= len {
                        return Ok(0);
                    }
                    let room = usize::try_from(len - start).unwrap_or(usize::MAX);
                    (start, &data[..data.len().min(room)])
                }
            };
            if node.conflicting_lock(call.context.id, start, data.len() as u64).is_some() {
                return Err(FsError::Locked);
            }
            tree.write_at(key, start, data, now)
        })
    }

    fn flush(&self, _call: &Call<'_, MemHandle>) -> FsResult<()> {
        Ok(())
    }

    fn get_file_information(&self, call: &Call<'_, MemHandle>) -> FsResult<FileMetadata> {
        let key = tree::normalize(call.path);
        let tree = self.tree.read();
        Ok(self.metadata(tree.get(&key)?))
    }

    fn find_files(&self, call: &Call<'_, MemHandle>, fill: &mut DirFiller<'_>) -> FsResult<()> {
        self.list(call, None, fill)
    }

    fn find_files_with_pattern(
        &self,
        call: &Call<'_, MemHandle>,
        pattern: &str,
        fill: &mut DirFiller<'_>,
    ) -> FsResult<()> {
        self.list(call, Some(pattern), fill)
    }

    fn set_file_attributes(
        &self,
        call: &Call<'_, MemHandle>,
        attributes: FileAttributes,
    ) -> FsResult<()> {
        self.writable()?;
        let key = tree::normalize(call.path);
        self.tree.write().get_mut(&key)?.set_attributes(attributes);
        Ok(())
    }

    fn set_file_times(&self, call: &Call<'_, MemHandle>, times: &FileTimes) -> FsResult<()> {
        self.writable()?;
        let key = tree::normalize(call.path);
        let mut tree = self.tree.write();
        let node = tree.get_mut(&key)?;
        if let Some(t) = times.creation {
            node.created = t;
        }
        if let Some(t) = times.last_access {
            node.accessed = t;
        }
        if let Some(t) = times.last_write {
            node.written = t;
        }
        Ok(())
    }

    fn delete_file(&self, call: &Call<'_, MemHandle>) -> FsResult<()> {
        self.writable()?;
        let key = tree::normalize(call.path);
        let tree = self.tree.read();
        let node = tree.get(&key)?;
        if node.is_directory() || node.is_read_only() {
            return Err(FsError::AccessDenied);
        }
        Ok(())
    }

    fn delete_directory(&self, call: &Call<'_, MemHandle>) -> FsResult<()> {
        self.writable()?;
        let key = tree::normalize(call.path);
        if key == tree::ROOT {
            return Err(FsError::AccessDenied);
        }
        let tree = self.tree.read();
        match &tree.get(&key)?.kind {
            NodeKind::Directory(children) if !children.is_empty() => {
                Err(FsError::DirectoryNotEmpty)
            }
            NodeKind::Directory(_) => Ok(()),
            NodeKind::File(_) => Err(FsError::NotADirectory),
        }
    }

    fn move_file(
        &self,
        call: &Call<'_, MemHandle>,
        new_path: &str,
        replace_if_existing: bool,
    ) -> FsResult<()> {
        self.writable()?;
        let from = tree::normalize(call.path);
        let to = tree::normalize(new_path);
        let mut tree = self.tree.write();

        if from != to && tree.contains(&to) {
            if !replace_if_existing {
                return Err(FsError::AlreadyExists);
            }
            let target = tree.get(&to)?;
            if target.is_directory() || target.is_read_only() {
                return Err(FsError::AccessDenied);
            }
            tree.remove(&to)?;
        }
        tree.rename(&from, &to, tree::display_name(new_path))?;
        debug!(from = call.path, to = new_path, "moved");
        Ok(())
    }

    fn set_end_of_file(&self, call: &Call<'_, MemHandle>, length: u64) -> FsResult<()> {
        self.modify_file(call, |tree, key, now| tree.set_len(key, length, now))
    }

    fn set_allocation_size(&self, call: &Call<'_, MemHandle>, size: u64) -> FsResult<()> {
        self.modify_file(call, |tree, key, now| {
            if size < tree.get(key)?.size() {
                tree.set_len(key, size, now)
            } else {
                Ok(())
            }
        })
    }

    fn lock_file(&self, call: &Call<'_, MemHandle>, offset: u64, length: u64) -> FsResult<()> {
        let key = tree::normalize(call.path);
        let mut tree = self.tree.write();
        let node = tree.get_mut(&key)?;
        if node.is_directory() {
            return Err(FsError::IsADirectory);
        }
        if node.locks.iter().any(|lock| lock.overlaps(offset, length)) {
            return Err(FsError::Locked);
        }
        node.locks.push(ByteLock {
            owner: call.context.id,
            offset,
            length,
        });
        Ok(())
    }

    fn unlock_file(&self, call: &Call<'_, MemHandle>, offset: u64, length: u64) -> FsResult<()> {
        let key = tree::normalize(call.path);
        let mut tree = self.tree.write();
        let node = tree.get_mut(&key)?;
        let wanted = ByteLock {
            owner: call.context.id,
            offset,
            length,
        };
        let position = node
            .locks
            .iter()
            .position(|lock| *lock == wanted)
            .ok_or(FsError::RangeNotLocked)?;
        node.locks.swap_remove(position);
        Ok(())
    }

    fn get_disk_free_space(&self, _info: &FileInfo) -> FsResult<DiskSpace> {
        let tree = self.tree.read();
        let free = tree.capacity().saturating_sub(tree.used());
        Ok(DiskSpace {
            free_bytes_available: free,
            total_bytes: tree.capacity(),
            total_free_bytes: free,
        })
    }

    fn get_volume_information(&self, _info: &FileInfo) -> FsResult<VolumeInfo> {
        let mut fs_flags = VolumeInfo::CASE_PRESERVED_NAMES
            | VolumeInfo::UNICODE_ON_DISK
            | VolumeInfo::PERSISTENT_ACLS;
        if self.config.write_protect {
            fs_flags |= VolumeInfo::READ_ONLY_VOLUME;
        }
        Ok(VolumeInfo {
            name: self.config.label.clone(),
            serial_number: self.config.serial_number,
            max_component_length: 255,
            fs_flags,
            fs_name: self.config.fs_name.clone(),
        })
    }

    /// Serves the descriptor last stored with `set_file_security`. Objects
    /// without one report `NotImplemented`, so the volume descriptor applies.
    fn get_file_security(
        &self,
        call: &Call<'_, MemHandle>,
        _security_information: u32,
    ) -> FsResult<Vec<u8>> {
        let key = tree::normalize(call.path);
        let tree = self.tree.read();
        tree.get(&key)?.security.clone().ok_or(FsError::NotImplemented)
    }

    /// Stores the whole descriptor, whichever parts `security_information`
    /// names.
    fn set_file_security(
        &self,
        call: &Call<'_, MemHandle>,
        _security_information: u32,
        descriptor: &[u8],
    ) -> FsResult<()> {
        self.writable()?;
        let key = tree::normalize(call.path);
        self.tree.write().get_mut(&key)?.security = Some(descriptor.to_vec());
        Ok(())
    }

    fn mounted(&self) -> FsResult<()> {
        info!(label = %self.config.label, capacity = self.config.capacity, "memory volume ready");
        Ok(())
    }

    fn unmounted(&self) -> FsResult<()> {
        let tree = self.tree.read();
        info!(nodes = tree.len(), used = tree.used(), "memory volume released");
        Ok(())
    }
}
