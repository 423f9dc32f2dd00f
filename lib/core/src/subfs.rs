//! A directory of a parent filesystem, presented as a filesystem of its own.

use crate::errors::FsResult;
use crate::fs::{ClosedFlag, DynFs, FileSystem};
use crate::path::{abspath, join, normalize, relpath};
use crate::wrap::WrapFs;

/// A sub-directory on a parent filesystem.
///
/// Every path is translated by prefixing the (fixed, normalized) scope
/// directory before delegation, so the scoped tree behaves as a root of its
/// own. Closing a `SubFs` does not close the parent.
#[derive(Debug, Clone)]
pub struct SubFs {
    parent: DynFs,
    sub_dir: String,
    closed: std::sync::Arc<ClosedFlag>,
}

impl SubFs {
    /// Scope `parent` to `path` (normalized to an absolute directory).
    pub fn new(parent: DynFs, path: &str) -> FsResult<SubFs> {
        let sub_dir = abspath(&normalize(path)?);
        Ok(SubFs {
            parent,
            sub_dir,
            closed: std::sync::Arc::new(ClosedFlag::new()),
        })
    }

    /// The scope directory in the parent's coordinate space.
    pub fn sub_dir(&self) -> &str {
        &self.sub_dir
    }
}

impl WrapFs for SubFs {
    fn delegate_fs(&self) -> &dyn FileSystem {
        &*self.parent
    }

    fn delegate_path(&self, path: &str) -> FsResult<String> {
        join(&self.sub_dir, relpath(&normalize(path)?))
    }

    fn closed_flag(&self) -> &ClosedFlag {
        &self.closed
    }
}

/// A [`SubFs`] that also closes its parent when closed.
///
/// Use this when the scope handle is the only remaining owner of the parent
/// and should take its lifetime with it.
#[derive(Debug, Clone)]
pub struct ClosingSubFs {
    sub: SubFs,
}

impl ClosingSubFs {
    pub fn new(parent: DynFs, path: &str) -> FsResult<ClosingSubFs> {
        Ok(ClosingSubFs {
            sub: SubFs::new(parent, path)?,
        })
    }
}

impl WrapFs for ClosingSubFs {
    fn delegate_fs(&self) -> &dyn FileSystem {
        self.sub.delegate_fs()
    }

    fn delegate_path(&self, path: &str) -> FsResult<String> {
        self.sub.delegate_path(path)
    }

    fn closed_flag(&self) -> &ClosedFlag {
        &self.sub.closed
    }

    fn close(&self) -> FsResult<()> {
        if self.closed_flag().close() {
            self.sub.parent.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // `WrapFs` stays unimported here: wrappers are exercised through the
    // `FileSystem` surface, the way consumers see them.
    use super::{ClosingSubFs, SubFs};
    use crate::errors::{FsError, ResourceError, ResourceErrorKind};
    use crate::fs::{DynFs, FileSystem};
    use crate::mem_fs::MemFs;
    use std::sync::Arc;

    fn scoped() -> (DynFs, SubFs) {
        let parent: DynFs = Arc::new(MemFs::new());
        parent.makedirs("/scope/inner", false).unwrap();
        let sub = SubFs::new(parent.clone(), "/scope").unwrap();
        (parent, sub)
    }

    #[test]
    fn paths_are_translated_into_the_scope() {
        let (parent, sub) = scoped();
        sub.writebytes("/file.txt", b"from sub").unwrap();
        assert_eq!(parent.readbytes("/scope/file.txt").unwrap(), b"from sub");
        assert!(sub.isdir("/inner").unwrap());
        assert_eq!(
            crate::wrap::WrapFs::delegate_path(&sub, "/a/b").unwrap(),
            "/scope/a/b"
        );
        assert_eq!(crate::wrap::WrapFs::delegate_path(&sub, "a").unwrap(), "/scope/a");
    }

    #[test]
    fn errors_report_the_scoped_path() {
        let (_parent, sub) = scoped();
        match sub.readbytes("/missing.txt") {
            Err(FsError::Resource(ResourceError {
                kind: ResourceErrorKind::NotFound,
                path,
                ..
            })) => assert_eq!(path, "/missing.txt"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn closing_a_subfs_leaves_the_parent_open() {
        let (parent, sub) = scoped();
        sub.close().unwrap();
        assert!(sub.is_closed());
        assert!(!parent.is_closed());
        assert!(matches!(sub.listdir("/"), Err(FsError::Closed)));
    }

    #[test]
    fn closing_subfs_closes_the_parent() {
        let parent: DynFs = Arc::new(MemFs::new());
        parent.makedir("/scope", false).unwrap();
        let sub = ClosingSubFs::new(parent.clone(), "/scope").unwrap();
        sub.close().unwrap();
        assert!(sub.is_closed());
        assert!(parent.is_closed());
    }
}
