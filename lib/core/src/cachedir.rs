//! Directory-metadata caching wrapper.

use std::sync::Mutex;

use indexmap::IndexMap;
use tracing::trace;

use crate::errors::{FsError, FsResult, OperationError, OperationErrorKind};
use crate::fs::{ClosedFlag, DynFs, FileSystem, ScanDir};
use crate::info::{Info, Namespaces};
use crate::lru::LruCache;
use crate::path::{abspath, normalize, split};
use crate::wrap::WrapFs;

const DEFAULT_CACHE_SIZE: usize = 1000;

/// Make a filesystem that caches directory information.
pub fn cache_directory(fs: DynFs) -> CachedDirFs {
    CachedDirFs::new(fs)
}

/// Caches `scandir` snapshots, keyed by `(directory, namespace set)`.
///
/// `getinfo` answers from the parent directory's cached snapshot (scanning
/// on a miss), and `isdir`/`isfile` derive from `getinfo`, so repeated
/// metadata queries hit the delegate once per directory.
///
/// Cached snapshots are never invalidated: mutating the underlying tree
/// after a scan yields stale results for the lifetime of the entry. The
/// frozen snapshot is the contract; use this wrapper in a scope where the
/// tree is not expected to change.
#[derive(Debug)]
pub struct CachedDirFs {
    inner: DynFs,
    cache: Mutex<LruCache<(String, Namespaces), IndexMap<String, Info>>>,
    closed: ClosedFlag,
}

impl CachedDirFs {
    pub fn new(inner: DynFs) -> CachedDirFs {
        CachedDirFs::with_capacity(inner, DEFAULT_CACHE_SIZE)
    }

    /// Bound the snapshot cache at `capacity` directories; the least
    /// recently used snapshot is evicted beyond that.
    pub fn with_capacity(inner: DynFs, capacity: usize) -> CachedDirFs {
        CachedDirFs {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            closed: ClosedFlag::new(),
        }
    }

    /// Fetch the `(dir_path, namespaces)` snapshot, scanning the delegate on
    /// a miss.
    fn snapshot(&self, dir_path: &str, namespaces: Namespaces) -> FsResult<IndexMap<String, Info>> {
        let key = (dir_path.to_string(), namespaces);
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| FsError::from(OperationError::new(OperationErrorKind::Failed)))?;
        if let Some(snapshot) = cache.get(&key) {
            return Ok(snapshot.clone());
        }
        trace!(path = dir_path, "directory cache miss");
        let entries: IndexMap<String, Info> = self
            .inner
            .scandir(dir_path, namespaces, None)?
            .map(|info| (info.name().to_string(), info))
            .collect();
        cache.put(key, entries.clone());
        Ok(entries)
    }
}

impl WrapFs for CachedDirFs {
    fn delegate_fs(&self) -> &dyn FileSystem {
        &*self.inner
    }

    fn closed_flag(&self) -> &ClosedFlag {
        &self.closed
    }

    fn scandir(
        &self,
        path: &str,
        namespaces: Namespaces,
        page: Option<(usize, usize)>,
    ) -> FsResult<ScanDir> {
        self.closed_flag().check()?;
        let dir_path = abspath(&normalize(path)?);
        let snapshot = self.snapshot(&dir_path, namespaces)?;
        Ok(ScanDir::paged(snapshot.into_values().collect(), page))
    }

    fn getinfo(&self, path: &str, namespaces: Namespaces) -> FsResult<Info> {
        self.closed_flag().check()?;
        let target = abspath(&normalize(path)?);
        if target == "/" {
            return Ok(Info::new("", true));
        }
        let (dir_path, name) = split(&target);
        let snapshot = self.snapshot(&dir_path, namespaces)?;
        snapshot
            .get(&name)
            .cloned()
            .ok_or_else(|| FsError::not_found(path))
    }

    fn isdir(&self, path: &str) -> FsResult<bool> {
        match WrapFs::getinfo(self, path, Namespaces::BASIC) {
            Ok(info) => Ok(info.is_dir()),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn isfile(&self, path: &str) -> FsResult<bool> {
        match WrapFs::getinfo(self, path, Namespaces::BASIC) {
            Ok(info) => Ok(info.is_file()),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}
