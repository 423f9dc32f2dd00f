//! Ephemeral filesystem in a temporary directory.

use std::sync::Mutex;

use tempfile::TempDir;
use tracing::debug;

use quiltfs_core::errors::{FsError, FsResult};
use quiltfs_core::fs::{ClosedFlag, FileSystem};
use quiltfs_core::os_errors::convert_os_errors;
use quiltfs_core::wrap::WrapFs;

use crate::os_fs::OsFs;

/// An [`OsFs`] rooted in a fresh temporary directory.
///
/// Closing the filesystem deletes the directory and everything in it. This
/// is the default staging store for archive writers.
#[derive(Debug)]
pub struct TempFs {
    inner: OsFs,
    dir: Mutex<Option<TempDir>>,
    closed: ClosedFlag,
}

impl TempFs {
    pub fn new() -> FsResult<TempFs> {
        let dir = TempDir::new().map_err(FsError::create_failed)?;
        let inner = OsFs::new(dir.path())?;
        debug!(root = %dir.path().display(), "created temporary filesystem");
        Ok(TempFs {
            inner,
            dir: Mutex::new(Some(dir)),
            closed: ClosedFlag::new(),
        })
    }
}

impl WrapFs for TempFs {
    fn delegate_fs(&self) -> &dyn FileSystem {
        &self.inner
    }

    fn closed_flag(&self) -> &ClosedFlag {
        &self.closed
    }

    fn close(&self) -> FsResult<()> {
        if self.closed_flag().close() {
            self.inner.close()?;
            let dir = self.dir.lock().ok().and_then(|mut slot| slot.take());
            if let Some(dir) = dir {
                dir.close()
                    .map_err(|err| convert_os_errors("close", "/", true, err))?;
            }
        }
        Ok(())
    }
}
