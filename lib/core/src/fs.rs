//! The filesystem capability interface.
//!
//! Every backend, wrapper and router implements [`FileSystem`] and is used
//! through `Arc<dyn FileSystem>` handles. The trait carries a large provided
//! surface built from the small required core, so implementations override
//! only what they can do better natively.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::errors::{FsError, FsResult, PathError};
use crate::info::{FsMeta, Info, Namespaces, ResourceType, SetInfo};
use crate::os_errors::convert_os_errors;
use crate::path::{abspath, join, normalize};

/// Shared handle to a filesystem.
pub type DynFs = Arc<dyn FileSystem>;

/// A byte stream returned by [`FileSystem::openbin`].
///
/// Read-only handles implement `Write` by failing; backends decide.
pub trait VirtualFile: io::Read + io::Write + io::Seek + Send + fmt::Debug {}

impl<T> VirtualFile for T where T: io::Read + io::Write + io::Seek + Send + fmt::Debug {}

/// An iterator of [`Info`] produced by [`FileSystem::scandir`].
#[derive(Debug)]
pub struct ScanDir {
    entries: std::vec::IntoIter<Info>,
}

impl ScanDir {
    pub fn new(entries: Vec<Info>) -> Self {
        ScanDir {
            entries: entries.into_iter(),
        }
    }

    /// Apply an optional `(start, end)` page window to the entries.
    pub fn paged(mut entries: Vec<Info>, page: Option<(usize, usize)>) -> Self {
        if let Some((start, end)) = page {
            let end = end.min(entries.len());
            let start = start.min(end);
            entries = entries[start..end].to_vec();
        }
        ScanDir::new(entries)
    }
}

impl Iterator for ScanDir {
    type Item = Info;

    fn next(&mut self) -> Option<Info> {
        self.entries.next()
    }
}

/// Single-shot close state shared by every filesystem implementation.
///
/// `close` flips the flag exactly once; the first caller gets `true` and
/// performs the actual teardown, repeats are no-ops.
#[derive(Debug, Default)]
pub struct ClosedFlag(AtomicBool);

impl ClosedFlag {
    pub fn new() -> Self {
        ClosedFlag(AtomicBool::new(false))
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`FsError::Closed`] when the flag is set. Called at entry
    /// to every operation.
    pub fn check(&self) -> FsResult<()> {
        if self.is_closed() {
            Err(FsError::Closed)
        } else {
            Ok(())
        }
    }

    /// Set the flag; `true` when this call performed the transition.
    pub fn close(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

/// The capability interface.
///
/// Required methods form the primitive operation set; everything else is
/// provided in terms of them. Implementations must validate paths through
/// [`validatepath`](FileSystem::validatepath) (or equivalent normalization)
/// and open modes through [`crate::mode::validate_openbin_mode`] before
/// acting, and must check their closed flag at entry to every operation.
pub trait FileSystem: fmt::Debug + Send + Sync {
    /// Resource metadata for `path`, populating the requested namespaces.
    /// Fails `NotFound` when the resource is absent.
    fn getinfo(&self, path: &str, namespaces: Namespaces) -> FsResult<Info>;

    /// Child names of a directory. Fails `DirectoryExpected` when `path` is
    /// not a directory.
    fn listdir(&self, path: &str) -> FsResult<Vec<String>>;

    /// Create a directory. With `recreate`, an existing directory at `path`
    /// is accepted; otherwise fails `DirectoryExists`.
    fn makedir(&self, path: &str, recreate: bool) -> FsResult<()>;

    /// Open a byte stream. The mode string is validated for binary use;
    /// writable modes fail `ReadOnly` on read-only implementations.
    fn openbin(&self, path: &str, mode: &str) -> FsResult<Box<dyn VirtualFile>>;

    /// Remove a file. Fails `FileExpected` on a directory.
    fn remove(&self, path: &str) -> FsResult<()>;

    /// Remove an empty directory. Fails `RemoveRoot` on the root and
    /// `DirectoryNotEmpty` when children remain.
    fn removedir(&self, path: &str) -> FsResult<()>;

    /// Update resource info (timestamps).
    fn setinfo(&self, path: &str, info: &SetInfo) -> FsResult<()>;

    /// Static capability sheet for this filesystem.
    fn getmeta(&self) -> FsMeta;

    /// Release resources. Exactly one close takes effect; repeats are
    /// no-ops. Every operation on a closed filesystem fails `Closed`.
    fn close(&self) -> FsResult<()>;

    fn is_closed(&self) -> bool;

    // -- provided ---------------------------------------------------------

    /// Gate used at entry to every operation.
    fn check(&self) -> FsResult<()> {
        if self.is_closed() {
            Err(FsError::Closed)
        } else {
            Ok(())
        }
    }

    /// Validate a path for this filesystem and return its canonical
    /// absolute form.
    fn validatepath(&self, path: &str) -> FsResult<String> {
        self.check()?;
        let invalid = self.getmeta().invalid_path_chars;
        if path.chars().any(|c| invalid.contains(c)) {
            return Err(PathError::InvalidChars {
                path: path.to_string(),
            }
            .into());
        }
        Ok(abspath(&normalize(path)?))
    }

    /// Metadata for each child of a directory, with optional
    /// `(start, end)` paging.
    fn scandir(
        &self,
        path: &str,
        namespaces: Namespaces,
        page: Option<(usize, usize)>,
    ) -> FsResult<ScanDir> {
        let dir_path = self.validatepath(path)?;
        let mut entries = Vec::new();
        for name in self.listdir(&dir_path)? {
            entries.push(self.getinfo(&join(&dir_path, &name)?, namespaces)?);
        }
        Ok(ScanDir::paged(entries, page))
    }

    /// Whether a resource exists at `path`.
    fn exists(&self, path: &str) -> FsResult<bool> {
        match self.getinfo(path, Namespaces::BASIC) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Whether `path` names a directory; missing resources are `false`.
    fn isdir(&self, path: &str) -> FsResult<bool> {
        match self.getinfo(path, Namespaces::BASIC) {
            Ok(info) => Ok(info.is_dir()),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Whether `path` names a file; missing resources are `false`.
    fn isfile(&self, path: &str) -> FsResult<bool> {
        match self.getinfo(path, Namespaces::BASIC) {
            Ok(info) => Ok(info.is_file()),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// The resource type at `path`.
    fn gettype(&self, path: &str) -> FsResult<ResourceType> {
        self.getinfo(path, Namespaces::DETAILS)?.resource_type()
    }

    /// File size in bytes.
    fn getsize(&self, path: &str) -> FsResult<u64> {
        self.getinfo(path, Namespaces::DETAILS)?.size()
    }

    /// A path on the host filesystem corresponding to `path`, when the
    /// backend has one. Default: `NoSysPath`.
    fn getsyspath(&self, path: &str) -> FsResult<PathBuf> {
        Err(PathError::NoSysPath {
            path: path.to_string(),
        }
        .into())
    }

    /// A URL for `path` serving `purpose` (e.g. `download`, `fs`), when the
    /// backend has one. Default: `NoUrl`.
    fn geturl(&self, path: &str, purpose: &str) -> FsResult<String> {
        Err(PathError::NoUrl {
            path: path.to_string(),
            purpose: purpose.to_string(),
        }
        .into())
    }

    /// Whether [`geturl`](FileSystem::geturl) would succeed.
    fn hasurl(&self, path: &str, purpose: &str) -> FsResult<bool> {
        match self.geturl(path, purpose) {
            Ok(_) => Ok(true),
            Err(FsError::Path(PathError::NoUrl { .. })) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Read the whole of a file.
    fn readbytes(&self, path: &str) -> FsResult<Vec<u8>> {
        let mut file = self.openbin(path, "r")?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|err| convert_os_errors("readbytes", path, false, err))?;
        Ok(contents)
    }

    /// Replace the contents of a file, creating it when missing.
    fn writebytes(&self, path: &str, contents: &[u8]) -> FsResult<()> {
        let mut file = self.openbin(path, "w")?;
        file.write_all(contents)
            .map_err(|err| convert_os_errors("writebytes", path, false, err))?;
        file.flush()
            .map_err(|err| convert_os_errors("writebytes", path, false, err))?;
        Ok(())
    }

    /// Append to a file, creating it when missing.
    fn appendbytes(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let mut file = self.openbin(path, "a")?;
        file.write_all(data)
            .map_err(|err| convert_os_errors("appendbytes", path, false, err))?;
        file.flush()
            .map_err(|err| convert_os_errors("appendbytes", path, false, err))?;
        Ok(())
    }

    /// Create an empty file when missing, else refresh its timestamps.
    fn touch(&self, path: &str) -> FsResult<()> {
        self.check()?;
        if self.exists(path)? {
            let now = SystemTime::now();
            self.setinfo(
                path,
                &SetInfo {
                    accessed: Some(now),
                    modified: Some(now),
                },
            )
        } else {
            self.openbin(path, "w").map(drop)
        }
    }

    /// Create an empty file. Returns `false` when the file existed and
    /// `wipe` was not requested; `true` when a file was (re)created.
    fn create(&self, path: &str, wipe: bool) -> FsResult<bool> {
        self.check()?;
        if !wipe && self.exists(path)? {
            return Ok(false);
        }
        self.openbin(path, "w")?;
        Ok(true)
    }

    /// Update access/modification times.
    fn settimes(
        &self,
        path: &str,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> FsResult<()> {
        self.setinfo(path, &SetInfo { accessed, modified })
    }

    /// Create a directory chain, honoring `recreate` on the final segment
    /// only.
    fn makedirs(&self, path: &str, recreate: bool) -> FsResult<()> {
        self.check()?;
        let target = abspath(&normalize(path)?);
        if target == "/" {
            return if recreate {
                Ok(())
            } else {
                Err(FsError::directory_exists(path))
            };
        }
        let mut prefix = String::new();
        let parts: Vec<&str> = crate::path::iterate_parts(&target).collect();
        for (idx, part) in parts.iter().enumerate() {
            prefix.push('/');
            prefix.push_str(part);
            let last = idx == parts.len() - 1;
            self.makedir(&prefix, if last { recreate } else { true })?;
        }
        Ok(())
    }

    /// Remove a directory and everything beneath it. The root itself is
    /// emptied but never removed.
    fn removetree(&self, path: &str) -> FsResult<()> {
        let target = self.validatepath(path)?;
        for name in self.listdir(&target)? {
            let child = join(&target, &name)?;
            if self.isdir(&child)? {
                self.removetree(&child)?;
            } else {
                self.remove(&child)?;
            }
        }
        if target != "/" {
            self.removedir(&target)?;
        }
        Ok(())
    }

    /// Copy a file within this filesystem. Fails `DestinationExists` unless
    /// `overwrite`, and `IllegalDestination` when source and destination
    /// are the same resource.
    fn copy(&self, src: &str, dst: &str, overwrite: bool) -> FsResult<()> {
        self.check()?;
        let src_path = abspath(&normalize(src)?);
        let dst_path = abspath(&normalize(dst)?);
        if src_path == dst_path {
            return Err(FsError::illegal_destination(dst));
        }
        if !overwrite && self.exists(&dst_path)? {
            return Err(FsError::destination_exists(dst));
        }
        let mut reader = self.openbin(&src_path, "r")?;
        let mut writer = self.openbin(&dst_path, "w")?;
        io::copy(&mut reader, &mut writer)
            .map_err(|err| convert_os_errors("copy", src, false, err))?;
        writer
            .flush()
            .map_err(|err| convert_os_errors("copy", dst, false, err))?;
        Ok(())
    }

    /// Move a file within this filesystem: copy then remove the source.
    fn move_(&self, src: &str, dst: &str, overwrite: bool) -> FsResult<()> {
        self.copy(src, dst, overwrite)?;
        self.remove(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_flag_is_single_shot() {
        let flag = ClosedFlag::new();
        assert!(!flag.is_closed());
        assert!(flag.check().is_ok());
        assert!(flag.close());
        assert!(!flag.close());
        assert!(flag.is_closed());
        assert!(matches!(flag.check(), Err(FsError::Closed)));
    }

    #[test]
    fn scandir_paging_windows() {
        let entries: Vec<Info> = (0..5).map(|i| Info::new(format!("f{i}"), false)).collect();
        let page: Vec<String> = ScanDir::paged(entries.clone(), Some((1, 3)))
            .map(|info| info.name().to_string())
            .collect();
        assert_eq!(page, vec!["f1", "f2"]);

        let all: Vec<String> = ScanDir::paged(entries, None)
            .map(|info| info.name().to_string())
            .collect();
        assert_eq!(all.len(), 5);
    }
}
