//! Read-only enforcement wrapper.

use std::time::SystemTime;

use crate::errors::{FsError, FsResult};
use crate::fs::{ClosedFlag, DynFs, FileSystem, VirtualFile};
use crate::info::{FsMeta, SetInfo};
use crate::mode::check_writable;
use crate::wrap::WrapFs;

/// Make a read-only view of a filesystem.
pub fn read_only(fs: DynFs) -> ReadOnlyFs {
    ReadOnlyFs::new(fs)
}

/// A wrapper that rejects every mutating operation with
/// [`ResourceReadOnly`](crate::errors::ResourceErrorKind::ReadOnly) before
/// it reaches the delegate. Read operations forward unchanged.
#[derive(Debug, Clone)]
pub struct ReadOnlyFs {
    inner: DynFs,
    closed: std::sync::Arc<ClosedFlag>,
}

impl ReadOnlyFs {
    pub fn new(inner: DynFs) -> ReadOnlyFs {
        ReadOnlyFs {
            inner,
            closed: std::sync::Arc::new(ClosedFlag::new()),
        }
    }
}

impl WrapFs for ReadOnlyFs {
    fn delegate_fs(&self) -> &dyn FileSystem {
        &*self.inner
    }

    fn closed_flag(&self) -> &ClosedFlag {
        &self.closed
    }

    fn getmeta(&self) -> FsMeta {
        FsMeta {
            read_only: true,
            supports_rename: false,
            ..self.delegate_fs().getmeta()
        }
    }

    fn openbin(&self, path: &str, mode: &str) -> FsResult<Box<dyn VirtualFile>> {
        self.closed_flag().check()?;
        if check_writable(mode)? {
            return Err(FsError::read_only(path));
        }
        let inner = self.delegate_path(path)?;
        crate::errors::unwrap_errors(self.delegate_fs().openbin(&inner, mode), path)
    }

    fn makedir(&self, path: &str, _recreate: bool) -> FsResult<()> {
        self.closed_flag().check()?;
        Err(FsError::read_only(path))
    }

    fn makedirs(&self, path: &str, _recreate: bool) -> FsResult<()> {
        self.closed_flag().check()?;
        Err(FsError::read_only(path))
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        self.closed_flag().check()?;
        Err(FsError::read_only(path))
    }

    fn removedir(&self, path: &str) -> FsResult<()> {
        self.closed_flag().check()?;
        Err(FsError::read_only(path))
    }

    fn removetree(&self, path: &str) -> FsResult<()> {
        self.closed_flag().check()?;
        Err(FsError::read_only(path))
    }

    fn setinfo(&self, path: &str, _info: &SetInfo) -> FsResult<()> {
        self.closed_flag().check()?;
        Err(FsError::read_only(path))
    }

    fn settimes(
        &self,
        path: &str,
        _accessed: Option<SystemTime>,
        _modified: Option<SystemTime>,
    ) -> FsResult<()> {
        self.closed_flag().check()?;
        Err(FsError::read_only(path))
    }

    fn writebytes(&self, path: &str, _contents: &[u8]) -> FsResult<()> {
        self.closed_flag().check()?;
        Err(FsError::read_only(path))
    }

    fn appendbytes(&self, path: &str, _data: &[u8]) -> FsResult<()> {
        self.closed_flag().check()?;
        Err(FsError::read_only(path))
    }

    fn touch(&self, path: &str) -> FsResult<()> {
        self.closed_flag().check()?;
        Err(FsError::read_only(path))
    }

    fn create(&self, path: &str, _wipe: bool) -> FsResult<bool> {
        self.closed_flag().check()?;
        Err(FsError::read_only(path))
    }

    fn copy(&self, _src: &str, dst: &str, _overwrite: bool) -> FsResult<()> {
        self.closed_flag().check()?;
        Err(FsError::read_only(dst))
    }

    fn move_(&self, _src: &str, dst: &str, _overwrite: bool) -> FsResult<()> {
        self.closed_flag().check()?;
        Err(FsError::read_only(dst))
    }
}

#[cfg(test)]
mod tests {
    use super::read_only;
    use crate::errors::{FsError, ResourceError, ResourceErrorKind};
    use crate::fs::{DynFs, FileSystem};
    use crate::mem_fs::MemFs;
    use std::sync::Arc;

    fn fixture() -> (DynFs, DynFs) {
        let inner: DynFs = Arc::new(MemFs::new());
        inner.makedir("/docs", false).unwrap();
        inner.writebytes("/docs/readme.txt", b"hello").unwrap();
        let ro: DynFs = Arc::new(read_only(inner.clone()));
        (inner, ro)
    }

    fn assert_read_only(result: Result<(), FsError>, expected_path: &str) {
        match result {
            Err(FsError::Resource(ResourceError {
                kind: ResourceErrorKind::ReadOnly,
                path,
                ..
            })) => assert_eq!(path, expected_path),
            other => panic!("expected read-only error, got {other:?}"),
        }
    }

    #[test]
    fn reads_pass_through() {
        let (_inner, ro) = fixture();
        assert_eq!(ro.readbytes("/docs/readme.txt").unwrap(), b"hello");
        assert_eq!(ro.listdir("/docs").unwrap(), vec!["readme.txt"]);
        assert!(ro.isdir("/docs").unwrap());
        assert!(ro.openbin("/docs/readme.txt", "r").is_ok());
    }

    #[test]
    fn writes_are_rejected_without_reaching_the_delegate() {
        let (inner, ro) = fixture();
        assert_read_only(ro.remove("/docs/readme.txt"), "/docs/readme.txt");
        assert_read_only(ro.removedir("/docs"), "/docs");
        assert_read_only(ro.removetree("/docs"), "/docs");
        assert_read_only(ro.makedir("/new", false), "/new");
        assert_read_only(ro.writebytes("/docs/readme.txt", b"x"), "/docs/readme.txt");
        assert_read_only(ro.appendbytes("/docs/readme.txt", b"x"), "/docs/readme.txt");
        assert_read_only(ro.touch("/docs/readme.txt"), "/docs/readme.txt");
        assert_read_only(
            ro.copy("/docs/readme.txt", "/copy.txt", false),
            "/copy.txt",
        );
        assert_read_only(
            ro.move_("/docs/readme.txt", "/moved.txt", false),
            "/moved.txt",
        );
        assert_read_only(ro.settimes("/docs/readme.txt", None, None), "/docs/readme.txt");
        assert!(matches!(
            ro.create("/new.txt", false),
            Err(FsError::Resource(ResourceError {
                kind: ResourceErrorKind::ReadOnly,
                ..
            }))
        ));
        match ro.openbin("/docs/readme.txt", "w") {
            Err(FsError::Resource(ResourceError {
                kind: ResourceErrorKind::ReadOnly,
                ..
            })) => {}
            other => panic!("unexpected: {other:?}"),
        }

        // The delegate never saw any of it.
        assert_eq!(inner.readbytes("/docs/readme.txt").unwrap(), b"hello");
        assert!(inner.exists("/docs").unwrap());
        assert!(!inner.exists("/new").unwrap());
    }

    #[test]
    fn meta_reports_read_only() {
        let (_inner, ro) = fixture();
        let meta = ro.getmeta();
        assert!(meta.read_only);
        assert!(!meta.supports_rename);
    }

    #[test]
    fn closing_the_view_leaves_the_delegate_open() {
        let (inner, ro) = fixture();
        ro.close().unwrap();
        assert!(ro.is_closed());
        assert!(!inner.is_closed());
        assert!(matches!(ro.listdir("/"), Err(FsError::Closed)));
    }
}
