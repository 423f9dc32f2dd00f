//! Prefix-routing across multiple filesystems.

use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{debug, trace};

use crate::errors::{unwrap_errors, FsError, FsResult, MountError};
use crate::fs::{ClosedFlag, DynFs, FileSystem, ScanDir, VirtualFile};
use crate::info::{FsMeta, Info, Namespaces, ResourceType, SetInfo};
use crate::mem_fs::MemFs;
use crate::mode::validate_openbin_mode;
use crate::path::{abspath, forcedir, normalize};

/// A virtual filesystem that maps directory prefixes onto other
/// filesystems.
///
/// The mount table is an ordered sequence of `(prefix, filesystem)` pairs;
/// the first matching prefix wins. Paths under no mount are served by a
/// default in-memory store, which also materializes every mount point as a
/// directory so unmounted listings see it.
///
/// Mounting takes `&mut self`: assemble the router first, then share it as
/// an `Arc<dyn FileSystem>`. The table itself is unsynchronized.
#[derive(Debug)]
pub struct MountFs {
    auto_close: bool,
    default_fs: DynFs,
    mounts: Vec<(String, DynFs)>,
    closed: ClosedFlag,
}

impl MountFs {
    /// Create an empty router. With `auto_close`, closing the router closes
    /// every mounted filesystem as well.
    pub fn new(auto_close: bool) -> MountFs {
        MountFs {
            auto_close,
            default_fs: std::sync::Arc::new(MemFs::new()),
            mounts: Vec::new(),
            closed: ClosedFlag::new(),
        }
    }

    /// Mount `fs` under `path`.
    ///
    /// The prefix is normalized to absolute directory form. A mount point
    /// that is a prefix of an existing mount, or prefixed by one, is
    /// rejected with [`MountError`]. The directory chain for the mount
    /// point is created eagerly in the default store.
    pub fn mount(&mut self, path: &str, fs: DynFs) -> FsResult<()> {
        self.closed.check()?;
        let prefix = forcedir(&abspath(&normalize(path)?));
        for (existing, _) in &self.mounts {
            if prefix.starts_with(existing.as_str()) || existing.starts_with(prefix.as_str()) {
                return Err(MountError {
                    path: path.to_string(),
                }
                .into());
            }
        }
        debug!(prefix = %prefix, "mounting filesystem");
        self.default_fs.makedirs(&prefix, true)?;
        self.mounts.push((prefix, fs));
        Ok(())
    }

    /// The filesystem and delegate path serving `path`: the first mount
    /// whose prefix matches, else the default store with the path
    /// unchanged.
    fn delegate(&self, path: &str) -> FsResult<(&dyn FileSystem, String)> {
        let full = forcedir(&abspath(&normalize(path)?));
        for (prefix, fs) in &self.mounts {
            if full.starts_with(prefix.as_str()) {
                let rel = full[prefix.len()..].trim_end_matches('/').to_string();
                trace!(path, mount = %prefix, rel = %rel, "routing to mount");
                return Ok((&**fs, rel));
            }
        }
        Ok((&*self.default_fs, path.to_string()))
    }
}

impl FileSystem for MountFs {
    fn getinfo(&self, path: &str, namespaces: Namespaces) -> FsResult<Info> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.getinfo(&rel, namespaces), path)
    }

    fn listdir(&self, path: &str) -> FsResult<Vec<String>> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.listdir(&rel), path)
    }

    fn makedir(&self, path: &str, recreate: bool) -> FsResult<()> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.makedir(&rel, recreate), path)
    }

    fn openbin(&self, path: &str, mode: &str) -> FsResult<Box<dyn VirtualFile>> {
        validate_openbin_mode(mode)?;
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.openbin(&rel, mode), path)
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.remove(&rel), path)
    }

    fn removedir(&self, path: &str) -> FsResult<()> {
        self.check()?;
        let target = normalize(path)?;
        if target.is_empty() || target == "/" {
            return Err(FsError::remove_root(path));
        }
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.removedir(&rel), path)
    }

    fn setinfo(&self, path: &str, info: &SetInfo) -> FsResult<()> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.setinfo(&rel, info), path)
    }

    fn getmeta(&self) -> FsMeta {
        FsMeta {
            is_virtual: true,
            ..FsMeta::default()
        }
    }

    fn close(&self) -> FsResult<()> {
        if self.closed.close() {
            if self.auto_close {
                for (prefix, fs) in &self.mounts {
                    trace!(mount = %prefix, "closing mounted filesystem");
                    fs.close()?;
                }
            }
            self.default_fs.close()?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    fn scandir(
        &self,
        path: &str,
        namespaces: Namespaces,
        page: Option<(usize, usize)>,
    ) -> FsResult<ScanDir> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.scandir(&rel, namespaces, page), path)
    }

    fn isdir(&self, path: &str) -> FsResult<bool> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.isdir(&rel), path)
    }

    fn isfile(&self, path: &str) -> FsResult<bool> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.isfile(&rel), path)
    }

    fn gettype(&self, path: &str) -> FsResult<ResourceType> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.gettype(&rel), path)
    }

    fn getsize(&self, path: &str) -> FsResult<u64> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.getsize(&rel), path)
    }

    fn getsyspath(&self, path: &str) -> FsResult<PathBuf> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.getsyspath(&rel), path)
    }

    fn geturl(&self, path: &str, purpose: &str) -> FsResult<String> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.geturl(&rel, purpose), path)
    }

    fn hasurl(&self, path: &str, purpose: &str) -> FsResult<bool> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.hasurl(&rel, purpose), path)
    }

    fn validatepath(&self, path: &str) -> FsResult<String> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.validatepath(&rel), path)?;
        Ok(abspath(&normalize(path)?))
    }

    fn readbytes(&self, path: &str) -> FsResult<Vec<u8>> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.readbytes(&rel), path)
    }

    fn writebytes(&self, path: &str, contents: &[u8]) -> FsResult<()> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.writebytes(&rel, contents), path)
    }

    fn appendbytes(&self, path: &str, data: &[u8]) -> FsResult<()> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.appendbytes(&rel, data), path)
    }

    fn touch(&self, path: &str) -> FsResult<()> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.touch(&rel), path)
    }

    fn settimes(
        &self,
        path: &str,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> FsResult<()> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.settimes(&rel, accessed, modified), path)
    }

    fn makedirs(&self, path: &str, recreate: bool) -> FsResult<()> {
        self.check()?;
        let (fs, rel) = self.delegate(path)?;
        unwrap_errors(fs.makedirs(&rel, recreate), path)
    }
}

#[cfg(test)]
mod tests {
    use super::MountFs;
    use crate::errors::{FsError, OperationError, OperationErrorKind};
    use crate::fs::{DynFs, FileSystem};
    use crate::mem_fs::MemFs;
    use std::sync::Arc;

    #[test]
    fn unmounted_paths_route_to_the_default_store() {
        let fs = MountFs::new(true);
        fs.writebytes("/plain.txt", b"default").unwrap();
        assert_eq!(fs.readbytes("/plain.txt").unwrap(), b"default");
    }

    #[test]
    fn mount_points_appear_in_unmounted_listings() {
        let mut fs = MountFs::new(true);
        fs.mount("/a/b", Arc::new(MemFs::new())).unwrap();
        assert!(fs.isdir("/a").unwrap());
        assert!(fs.isdir("/a/b").unwrap());
        assert_eq!(fs.listdir("/").unwrap(), vec!["a"]);
    }

    #[test]
    fn first_matching_prefix_wins() {
        let mut fs = MountFs::new(true);
        let one: DynFs = Arc::new(MemFs::new());
        let two: DynFs = Arc::new(MemFs::new());
        fs.mount("/one", one.clone()).unwrap();
        fs.mount("/two", two.clone()).unwrap();

        fs.writebytes("/one/f.txt", b"1").unwrap();
        fs.writebytes("/two/f.txt", b"2").unwrap();
        assert_eq!(one.readbytes("/f.txt").unwrap(), b"1");
        assert_eq!(two.readbytes("/f.txt").unwrap(), b"2");
        assert_eq!(fs.readbytes("/two/f.txt").unwrap(), b"2");
    }

    #[test]
    fn mount_routing_strips_the_prefix() {
        let mut fs = MountFs::new(true);
        let backing: DynFs = Arc::new(MemFs::new());
        backing.makedirs("/sub", false).unwrap();
        backing.writebytes("/sub/file.txt", b"routed").unwrap();
        fs.mount("/a", backing).unwrap();
        assert_eq!(fs.readbytes("/a/sub/file.txt").unwrap(), b"routed");
    }

    #[test]
    fn overlapping_mounts_are_rejected() {
        let mut fs = MountFs::new(true);
        fs.mount("/a", Arc::new(MemFs::new())).unwrap();
        fs.mount("/b", Arc::new(MemFs::new())).unwrap();
        assert!(matches!(
            fs.mount("/a/sub", Arc::new(MemFs::new())),
            Err(FsError::Mount(_))
        ));
        assert!(matches!(
            fs.mount("/a", Arc::new(MemFs::new())),
            Err(FsError::Mount(_))
        ));
        // A parent of an existing mount is an overlap too.
        let mut nested = MountFs::new(true);
        nested.mount("/deep/mount", Arc::new(MemFs::new())).unwrap();
        assert!(matches!(
            nested.mount("/deep", Arc::new(MemFs::new())),
            Err(FsError::Mount(_))
        ));
    }

    #[test]
    fn root_is_never_removable() {
        let mut fs = MountFs::new(true);
        fs.mount("/m", Arc::new(MemFs::new())).unwrap();
        for path in ["/", ""] {
            assert!(matches!(
                fs.removedir(path),
                Err(FsError::Operation(OperationError {
                    kind: OperationErrorKind::RemoveRoot,
                    ..
                }))
            ));
        }
    }

    #[test]
    fn auto_close_closes_children() {
        let mut fs = MountFs::new(true);
        let child: DynFs = Arc::new(MemFs::new());
        fs.mount("/m", child.clone()).unwrap();
        fs.close().unwrap();
        assert!(fs.is_closed());
        assert!(child.is_closed());
        assert!(matches!(fs.listdir("/"), Err(FsError::Closed)));
    }

    #[test]
    fn without_auto_close_children_stay_open() {
        let mut fs = MountFs::new(false);
        let child: DynFs = Arc::new(MemFs::new());
        fs.mount("/m", child.clone()).unwrap();
        fs.close().unwrap();
        assert!(!child.is_closed());
    }

    #[test]
    fn errors_carry_the_router_path() {
        let mut fs = MountFs::new(true);
        fs.mount("/data", Arc::new(MemFs::new())).unwrap();
        match fs.readbytes("/data/missing.txt") {
            Err(FsError::Resource(err)) => assert_eq!(err.path, "/data/missing.txt"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
