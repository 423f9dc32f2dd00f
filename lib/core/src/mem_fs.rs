//! In-memory filesystem.
//!
//! The whole tree lives under a single `RwLock`; file payloads are
//! `Arc<RwLock<_>>` buffers shared with open handles, so removing a name
//! detaches it from the tree while existing handles stay usable. Cloning a
//! `MemFs` clones the handle, not the tree.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use crate::errors::{FsError, FsResult, OperationError, OperationErrorKind};
use crate::fs::{ClosedFlag, FileSystem, VirtualFile};
use crate::info::{Details, FsMeta, Info, Namespaces, ResourceType, SetInfo};
use crate::mode::validate_openbin_mode;
use crate::path::{basename, iterate_parts, relpath};

#[derive(Debug)]
struct FileState {
    data: Vec<u8>,
    created: SystemTime,
    modified: SystemTime,
    accessed: SystemTime,
}

#[derive(Debug)]
struct FileNode {
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct DirNode {
    entries: BTreeMap<String, Node>,
    created: SystemTime,
    modified: SystemTime,
    accessed: SystemTime,
}

impl DirNode {
    fn new() -> Self {
        let now = SystemTime::now();
        DirNode {
            entries: BTreeMap::new(),
            created: now,
            modified: now,
            accessed: now,
        }
    }
}

#[derive(Debug)]
enum Node {
    Dir(DirNode),
    File(FileNode),
}

/// An in-memory filesystem, safe for concurrent use.
#[derive(Debug, Clone)]
pub struct MemFs {
    root: Arc<RwLock<DirNode>>,
    closed: Arc<ClosedFlag>,
}

impl Default for MemFs {
    fn default() -> Self {
        MemFs::new()
    }
}

fn poisoned() -> FsError {
    OperationError::new(OperationErrorKind::Failed).into()
}

fn split_parts(path: &str) -> Vec<String> {
    iterate_parts(relpath(path)).map(str::to_string).collect()
}

/// Walk to the node at `parts`, treating a file in an intermediate position
/// as a missing resource.
fn find<'a>(dir: &'a DirNode, parts: &[String]) -> Option<&'a Node> {
    let (first, rest) = parts.split_first()?;
    match dir.entries.get(first)? {
        node if rest.is_empty() => Some(node),
        Node::Dir(sub) => find(sub, rest),
        Node::File(_) => None,
    }
}

fn find_dir_mut<'a>(dir: &'a mut DirNode, parts: &[String]) -> Option<&'a mut DirNode> {
    match parts.split_first() {
        None => Some(dir),
        Some((first, rest)) => match dir.entries.get_mut(first)? {
            Node::Dir(sub) => find_dir_mut(sub, rest),
            Node::File(_) => None,
        },
    }
}

impl MemFs {
    pub fn new() -> Self {
        MemFs {
            root: Arc::new(RwLock::new(DirNode::new())),
            closed: Arc::new(ClosedFlag::new()),
        }
    }

    fn read_lock(&self) -> FsResult<RwLockReadGuard<'_, DirNode>> {
        self.root.read().map_err(|_| poisoned())
    }

    fn write_lock(&self) -> FsResult<RwLockWriteGuard<'_, DirNode>> {
        self.root.write().map_err(|_| poisoned())
    }

    fn info_for(path: &str, node: &Node, namespaces: Namespaces) -> FsResult<Info> {
        let name = basename(path);
        match node {
            Node::Dir(dir) => {
                let mut info = Info::new(name, true);
                if namespaces.contains(Namespaces::DETAILS) {
                    info = info.with_details(Details {
                        resource_type: ResourceType::Directory,
                        size: 0,
                        modified: Some(dir.modified),
                        accessed: Some(dir.accessed),
                        created: Some(dir.created),
                    });
                }
                Ok(info)
            }
            Node::File(file) => {
                let state = file.state.read().map_err(|_| poisoned())?;
                let mut info = Info::new(name, false);
                if namespaces.contains(Namespaces::DETAILS) {
                    info = info.with_details(Details {
                        resource_type: ResourceType::File,
                        size: state.data.len() as u64,
                        modified: Some(state.modified),
                        accessed: Some(state.accessed),
                        created: Some(state.created),
                    });
                }
                Ok(info)
            }
        }
    }
}

impl FileSystem for MemFs {
    fn getinfo(&self, path: &str, namespaces: Namespaces) -> FsResult<Info> {
        let target = self.validatepath(path)?;
        let parts = split_parts(&target);
        let root = self.read_lock()?;
        if parts.is_empty() {
            let mut info = Info::new("", true);
            if namespaces.contains(Namespaces::DETAILS) {
                info = info.with_details(Details {
                    resource_type: ResourceType::Directory,
                    size: 0,
                    modified: Some(root.modified),
                    accessed: Some(root.accessed),
                    created: Some(root.created),
                });
            }
            return Ok(info);
        }
        let node = find(&root, &parts).ok_or_else(|| FsError::not_found(path))?;
        Self::info_for(&target, node, namespaces)
    }

    fn listdir(&self, path: &str) -> FsResult<Vec<String>> {
        let target = self.validatepath(path)?;
        let parts = split_parts(&target);
        let root = self.read_lock()?;
        if parts.is_empty() {
            return Ok(root.entries.keys().cloned().collect());
        }
        match find(&root, &parts) {
            Some(Node::Dir(dir)) => Ok(dir.entries.keys().cloned().collect()),
            Some(Node::File(_)) => Err(FsError::directory_expected(path)),
            None => Err(FsError::not_found(path)),
        }
    }

    fn makedir(&self, path: &str, recreate: bool) -> FsResult<()> {
        let target = self.validatepath(path)?;
        let parts = split_parts(&target);
        if parts.is_empty() {
            return if recreate {
                Ok(())
            } else {
                Err(FsError::directory_exists(path))
            };
        }
        let mut root = self.write_lock()?;
        let (name, ancestors) = parts.split_last().expect("non-empty parts");
        let parent =
            find_dir_mut(&mut root, ancestors).ok_or_else(|| FsError::not_found(path))?;
        match parent.entries.get(name) {
            Some(Node::Dir(_)) if recreate => Ok(()),
            Some(Node::Dir(_)) => Err(FsError::directory_exists(path)),
            Some(Node::File(_)) if recreate => Err(FsError::directory_expected(path)),
            Some(Node::File(_)) => Err(FsError::directory_exists(path)),
            None => {
                parent.entries.insert(name.clone(), Node::Dir(DirNode::new()));
                parent.modified = SystemTime::now();
                Ok(())
            }
        }
    }

    fn openbin(&self, path: &str, mode: &str) -> FsResult<Box<dyn VirtualFile>> {
        let mode = validate_openbin_mode(mode)?;
        let target = self.validatepath(path)?;
        let parts = split_parts(&target);
        if parts.is_empty() {
            return Err(FsError::file_expected(path));
        }
        let mut root = self.write_lock()?;
        let (name, ancestors) = parts.split_last().expect("non-empty parts");
        let parent =
            find_dir_mut(&mut root, ancestors).ok_or_else(|| FsError::not_found(path))?;
        let state = match parent.entries.get(name) {
            Some(Node::Dir(_)) => return Err(FsError::file_expected(path)),
            Some(Node::File(file)) => {
                if mode.exclusive() {
                    return Err(FsError::file_exists(path));
                }
                if mode.truncate() {
                    let mut state = file.state.write().map_err(|_| poisoned())?;
                    state.data.clear();
                    state.modified = SystemTime::now();
                }
                file.state.clone()
            }
            None => {
                if !mode.create() {
                    return Err(FsError::not_found(path));
                }
                let now = SystemTime::now();
                let state = Arc::new(RwLock::new(FileState {
                    data: Vec::new(),
                    created: now,
                    modified: now,
                    accessed: now,
                }));
                parent
                    .entries
                    .insert(name.clone(), Node::File(FileNode { state: state.clone() }));
                parent.modified = now;
                state
            }
        };
        Ok(Box::new(MemFile {
            state,
            pos: 0,
            reading: mode.reading(),
            writing: mode.writing(),
            appending: mode.appending(),
        }))
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let target = self.validatepath(path)?;
        let parts = split_parts(&target);
        if parts.is_empty() {
            return Err(FsError::file_expected(path));
        }
        let mut root = self.write_lock()?;
        let (name, ancestors) = parts.split_last().expect("non-empty parts");
        let parent =
            find_dir_mut(&mut root, ancestors).ok_or_else(|| FsError::not_found(path))?;
        match parent.entries.get(name) {
            Some(Node::File(_)) => {
                parent.entries.remove(name);
                parent.modified = SystemTime::now();
                Ok(())
            }
            Some(Node::Dir(_)) => Err(FsError::file_expected(path)),
            None => Err(FsError::not_found(path)),
        }
    }

    fn removedir(&self, path: &str) -> FsResult<()> {
        let target = self.validatepath(path)?;
        let parts = split_parts(&target);
        if parts.is_empty() {
            return Err(FsError::remove_root(path));
        }
        let mut root = self.write_lock()?;
        let (name, ancestors) = parts.split_last().expect("non-empty parts");
        let parent =
            find_dir_mut(&mut root, ancestors).ok_or_else(|| FsError::not_found(path))?;
        match parent.entries.get(name) {
            Some(Node::Dir(dir)) if dir.entries.is_empty() => {
                parent.entries.remove(name);
                parent.modified = SystemTime::now();
                Ok(())
            }
            Some(Node::Dir(_)) => Err(FsError::directory_not_empty(path)),
            Some(Node::File(_)) => Err(FsError::directory_expected(path)),
            None => Err(FsError::not_found(path)),
        }
    }

    fn setinfo(&self, path: &str, info: &SetInfo) -> FsResult<()> {
        let target = self.validatepath(path)?;
        let parts = split_parts(&target);
        let mut root = self.write_lock()?;
        if parts.is_empty() {
            if let Some(accessed) = info.accessed {
                root.accessed = accessed;
            }
            if let Some(modified) = info.modified {
                root.modified = modified;
            }
            return Ok(());
        }
        let (name, ancestors) = parts.split_last().expect("non-empty parts");
        let parent =
            find_dir_mut(&mut root, ancestors).ok_or_else(|| FsError::not_found(path))?;
        match parent.entries.get_mut(name) {
            Some(Node::Dir(dir)) => {
                if let Some(accessed) = info.accessed {
                    dir.accessed = accessed;
                }
                if let Some(modified) = info.modified {
                    dir.modified = modified;
                }
                Ok(())
            }
            Some(Node::File(file)) => {
                let mut state = file.state.write().map_err(|_| poisoned())?;
                if let Some(accessed) = info.accessed {
                    state.accessed = accessed;
                }
                if let Some(modified) = info.modified {
                    state.modified = modified;
                }
                Ok(())
            }
            None => Err(FsError::not_found(path)),
        }
    }

    fn getmeta(&self) -> FsMeta {
        FsMeta {
            thread_safe: true,
            ..FsMeta::default()
        }
    }

    fn close(&self) -> FsResult<()> {
        if self.closed.close() {
            if let Ok(mut root) = self.root.write() {
                root.entries.clear();
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }
}

/// An open handle onto a shared in-memory buffer.
#[derive(Debug)]
struct MemFile {
    state: Arc<RwLock<FileState>>,
    pos: u64,
    reading: bool,
    writing: bool,
    appending: bool,
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.reading {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file not open for reading",
            ));
        }
        let mut state = self
            .state
            .write()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        state.accessed = SystemTime::now();
        let start = (self.pos as usize).min(state.data.len());
        let count = buf.len().min(state.data.len() - start);
        buf[..count].copy_from_slice(&state.data[start..start + count]);
        self.pos += count as u64;
        Ok(count)
    }
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writing {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file not open for writing",
            ));
        }
        let mut state = self
            .state
            .write()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        if self.appending {
            self.pos = state.data.len() as u64;
        }
        let start = self.pos as usize;
        if start > state.data.len() {
            state.data.resize(start, 0);
        }
        let overlap = (state.data.len() - start).min(buf.len());
        state.data[start..start + overlap].copy_from_slice(&buf[..overlap]);
        state.data.extend_from_slice(&buf[overlap..]);
        state.modified = SystemTime::now();
        self.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self
            .state
            .read()
            .map_err(|_| io::Error::other("lock poisoned"))?
            .data
            .len() as i64;
        let next = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => len + offset,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if next < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.pos = next as u64;
        Ok(self.pos)
    }
}
