//! Case-insensitive node tree keyed by normalized path.
//!
//! Every node lives in one flat map under its lowercase full path (`\` for
//! the root, `\dir\file` below it). Directories keep the keys of their
//! children; nodes keep the name as it was first spelled.

use dokan_host::{FileAttributes, FsError, FsResult};
use std::collections::{BTreeSet, HashMap};
use std::time::SystemTime;

/// Key of the root directory.
pub const ROOT: &str = "\\";

/// Characters Windows does not allow in a name component.
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/'];

/// Lowercase key for `path`: `/` becomes `\`, trailing separators go, the
/// root stays `\`.
pub fn normalize(path: &str) -> String {
    let unified = path.replace('/', "\\");
    let trimmed = unified.trim_end_matches('\\');
    if trimmed.is_empty() {
        return ROOT.to_string();
    }
    let mut key = trimmed.to_lowercase();
    if !key.starts_with('\\') {
        key.insert(0, '\\');
    }
    key
}

/// Splits a key into its parent key and last component.
pub fn split(key: &str) -> (&str, &str) {
    match key.rfind('\\') {
        Some(0) => (ROOT, &key[1..]),
        Some(i) => (&key[..i], &key[i + 1..]),
        None => (ROOT, key),
    }
}

/// Last component of `path` as spelled by the caller.
pub fn display_name(path: &str) -> String {
    let trimmed = path.trim_end_matches(['\\', '/']);
    trimmed.rsplit(['\\', '/']).next().unwrap_or(trimmed).to_string()
}

fn check_name(name: &str) -> FsResult<()> {
    if name.is_empty()
        || name.len() > 255
        || name.contains(FORBIDDEN)
        || name.chars().any(char::is_control)
    {
        return Err(FsError::InvalidName);
    }
    Ok(())
}

/// `key` is `ancestor` or lies below it.
fn is_within(key: &str, ancestor: &str) -> bool {
    key == ancestor
        || ancestor == ROOT
        || key
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('\\'))
}

/// Byte-range lock held by one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteLock {
    pub owner: u64,
    pub offset: u64,
    pub length: u64,
}

impl ByteLock {
    fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    /// Whether `[offset, offset + length)` overlaps this lock.
    pub fn overlaps(&self, offset: u64, length: u64) -> bool {
        let end = offset.saturating_add(length);
        offset < self.end() && self.offset < end
    }
}

#[derive(Debug)]
pub enum NodeKind {
    File(Vec<u8>),
    Directory(BTreeSet<String>),
}

#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub attributes: FileAttributes,
    pub created: SystemTime,
    pub accessed: SystemTime,
    pub written: SystemTime,
    pub index: u64,
    pub security: Option<Vec<u8>>,
    pub locks: Vec<ByteLock>,
}

impl Node {
    fn new(
        name: String,
        kind: NodeKind,
        attributes: FileAttributes,
        index: u64,
        now: SystemTime,
    ) -> Self {
        let mut node = Self {
            name,
            kind,
            attributes: FileAttributes::default(),
            created: now,
            accessed: now,
            written: now,
            index,
            security: None,
            locks: Vec::new(),
        };
        node.set_attributes(attributes);
        node
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory(_))
    }

    pub fn size(&self) -> u64 {
        match &self.kind {
            NodeKind::File(data) => data.len() as u64,
            NodeKind::Directory(_) => 0,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes.contains(FileAttributes::READONLY)
    }

    /// Stores `attributes`, keeping the directory bit in step with the
    /// node kind. A file with no other bits is `NORMAL`.
    pub fn set_attributes(&mut self, attributes: FileAttributes) {
        let bits = attributes.without(FileAttributes::DIRECTORY).without(FileAttributes::NORMAL);
        self.attributes = if self.is_directory() {
            bits.with(FileAttributes::DIRECTORY)
        } else if bits.is_empty() {
            FileAttributes::NORMAL
        } else {
            bits
        };
    }

    /// A lock held by a handle other than `owner` overlapping the range.
    pub fn conflicting_lock(&self, owner: u64, offset: u64, length: u64) -> Option<&ByteLock> {
        self.locks
            .iter()
            .find(|lock| lock.owner != owner && lock.overlaps(offset, length))
    }
}

/// All nodes of one volume.
#[derive(Debug)]
pub struct Tree {
    nodes: HashMap<String, Node>,
    next_index: u64,
    used: u64,
    capacity: u64,
}

impl Tree {
    /// An empty volume of `capacity` bytes.
    pub fn new(capacity: u64, now: SystemTime) -> Self {
        let root = Node::new(
            String::new(),
            NodeKind::Directory(BTreeSet::new()),
            FileAttributes::DIRECTORY,
            1,
            now,
        );
        Self {
            nodes: HashMap::from([(ROOT.to_string(), root)]),
            next_index: 2,
            used: 0,
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> FsResult<&Node> {
        self.nodes.get(key).ok_or(FsError::NotFound)
    }

    pub fn get_mut(&mut self, key: &str) -> FsResult<&mut Node> {
        self.nodes.get_mut(key).ok_or(FsError::NotFound)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    /// Whether `key` names an existing directory.
    pub fn is_directory(&self, key: &str) -> bool {
        self.nodes.get(key).is_some_and(Node::is_directory)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Error for a missing `key`: `NotFound` when its parent exists,
    /// `PathNotFound` otherwise.
    pub fn missing(&self, key: &str) -> FsError {
        let (parent, _) = split(key);
        if self.is_directory(parent) {
            FsError::NotFound
        } else {
            FsError::PathNotFound
        }
    }

    /// Adds a node at `key` named `name`.
    pub fn insert(
        &mut self,
        key: &str,
        name: String,
        directory: bool,
        attributes: FileAttributes,
        now: SystemTime,
    ) -> FsResult<&mut Node> {
        check_name(&name)?;
        if self.nodes.contains_key(key) {
            return Err(FsError::AlreadyExists);
        }
        let (parent_key, child) = split(key);
        let child = child.to_string();
        match self.nodes.get_mut(parent_key).map(|p| &mut p.kind) {
            Some(NodeKind::Directory(children)) => {
                children.insert(child);
            }
            _ => return Err(FsError::PathNotFound),
        }
        if let Ok(parent) = self.get_mut(parent_key) {
            parent.written = now;
        }

        let kind = if directory {
            NodeKind::Directory(BTreeSet::new())
        } else {
            NodeKind::File(Vec::new())
        };
        let node = Node::new(name, kind, attributes, self.next_index, now);
        self.next_index += 1;
        Ok(self.nodes.entry(key.to_string()).or_insert(node))
    }

    /// Removes a file or an empty directory.
    pub fn remove(&mut self, key: &str) -> FsResult<Node> {
        if key == ROOT {
            return Err(FsError::AccessDenied);
        }
        if let NodeKind::Directory(children) = &self.get(key)?.kind
            && !children.is_empty()
        {
            return Err(FsError::DirectoryNotEmpty);
        }
        let node = self.nodes.remove(key).ok_or(FsError::NotFound)?;
        self.used -= node.size();
        let (parent_key, child) = split(key);
        if let Some(Node {
            kind: NodeKind::Directory(children),
            ..
        }) = self.nodes.get_mut(parent_key)
        {
            children.remove(child);
        }
        Ok(node)
    }

    /// Children of the directory at `key`, in name order.
    pub fn children(&self, key: &str) -> FsResult<Vec<&Node>> {
        match &self.get(key)?.kind {
            NodeKind::Directory(children) => Ok(children
                .iter()
                .filter_map(|child| self.nodes.get(&join(key, child)))
                .collect()),
            NodeKind::File(_) => Err(FsError::NotADirectory),
        }
    }

    /// Moves the node at `from` (and everything below it) to `to`, naming
    /// it `name`. `to` must not exist unless it only differs from `from` in
    /// case.
    pub fn rename(&mut self, from: &str, to: &str, name: String) -> FsResult<()> {
        check_name(&name)?;
        if from == ROOT {
            return Err(FsError::AccessDenied);
        }
        if from == to {
            self.get_mut(from)?.name = name;
            return Ok(());
        }
        if is_within(to, from) {
            return Err(FsError::invalid("cannot move a directory into itself"));
        }
        if self.contains(to) {
            return Err(FsError::AlreadyExists);
        }
        let (to_parent, to_child) = split(to);
        if !self.is_directory(to_parent) {
            return Err(FsError::PathNotFound);
        }
        self.get(from)?;

        let moved: Vec<String> = self
            .nodes
            .keys()
            .filter(|key| is_within(key, from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = self.nodes.remove(&old) {
                let new = format!("{to}{}", &old[from.len()..]);
                self.nodes.insert(new, node);
            }
        }

        let (from_parent, from_child) = split(from);
        if let Some(Node {
            kind: NodeKind::Directory(children),
            ..
        }) = self.nodes.get_mut(from_parent)
        {
            children.remove(from_child);
        }
        if let Some(Node {
            kind: NodeKind::Directory(children),
            ..
        }) = self.nodes.get_mut(to_parent)
        {
            children.insert(to_child.to_string());
        }
        self.get_mut(to)?.name = name;
        Ok(())
    }

    /// Resizes the file at `key`, zero-filling growth.
    pub fn set_len(&mut self, key: &str, len: u64, now: SystemTime) -> FsResult<()> {
        let (capacity, used) = (self.capacity, self.used);
        let node = self.nodes.get_mut(key).ok_or(FsError::NotFound)?;
        let NodeKind::File(data) = &mut node.kind else {
            return Err(FsError::IsADirectory);
        };
        let old = data.len() as u64;
        if len > old && used + (len - old) > capacity {
            return Err(FsError::NoSpace);
        }
        let new_len = usize::try_from(len).map_err(|_| FsError::NoSpace)?;
        data.resize(new_len, 0);
        node.written = now;
        self.used = used - old + len;
        Ok(())
    }

    /// Writes `bytes` at `offset` in the file at `key`, growing it as
    /// needed.
    pub fn write_at(
        &mut self,
        key: &str,
        offset: u64,
        bytes: &[u8],
        now: SystemTime,
    ) -> FsResult<usize> {
        let (capacity, used) = (self.capacity, self.used);
        let node = self.nodes.get_mut(key).ok_or(FsError::NotFound)?;
        let NodeKind::File(data) = &mut node.kind else {
            return Err(FsError::IsADirectory);
        };
        let old = data.len() as u64;
        let end = offset.checked_add(bytes.len() as u64).ok_or(FsError::NoSpace)?;
        if end > old && used + (end - old) > capacity {
            return Err(FsError::NoSpace);
        }
        let start = usize::try_from(offset).map_err(|_| FsError::NoSpace)?;
        let end = start + bytes.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        node.written = now;
        node.attributes = node
            .attributes
            .without(FileAttributes::NORMAL)
            .with(FileAttributes::ARCHIVE);
        self.used = used - old + data.len() as u64;
        Ok(bytes.len())
    }
}

/// Key of `child` inside the directory `parent`.
pub fn join(parent: &str, child: &str) -> String {
    if parent == ROOT {
        format!("\\{child}")
    } else {
        format!("{parent}\\{child}")
    }
}
