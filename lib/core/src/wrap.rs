//! Generic delegation for wrapper filesystems.
//!
//! A wrapper holds exactly one delegate and modifies a subset of its
//! behavior. [`WrapFs`] provides the whole capability surface as default
//! methods that translate the path with
//! [`delegate_path`](WrapFs::delegate_path), forward to
//! [`delegate_fs`](WrapFs::delegate_fs) and rewrite error paths back into
//! the caller's coordinate space, so a concrete wrapper implements three
//! accessors and overrides only the operations that diverge. The blanket
//! `impl<T: WrapFs> FileSystem for T` bridges every wrapper into the
//! capability interface.
//!
//! Import this trait to implement a wrapper; consumers of a wrapper only
//! need [`FileSystem`].

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::errors::{unwrap_errors, unwrap_errors_map, FsResult};
use crate::fs::{ClosedFlag, FileSystem, ScanDir, VirtualFile};
use crate::info::{FsMeta, Info, Namespaces, ResourceType, SetInfo};
use crate::mode::validate_openbin_mode;
use crate::path::{abspath, normalize};

/// A filesystem that forwards to one inner delegate.
pub trait WrapFs: fmt::Debug + Send + Sync {
    /// The wrapped filesystem.
    fn delegate_fs(&self) -> &dyn FileSystem;

    /// Translate a caller path into the delegate's coordinate space.
    /// Identity unless overridden.
    fn delegate_path(&self, path: &str) -> FsResult<String> {
        Ok(path.to_string())
    }

    /// The wrapper's own close state. Closing a wrapper does not close its
    /// delegate unless the wrapper overrides [`close`](WrapFs::close).
    fn closed_flag(&self) -> &ClosedFlag;

    fn close(&self) -> FsResult<()> {
        self.closed_flag().close();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed_flag().is_closed()
    }

    fn getinfo(&self, path: &str, namespaces: Namespaces) -> FsResult<Info> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().getinfo(&inner, namespaces), path)
    }

    fn listdir(&self, path: &str) -> FsResult<Vec<String>> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().listdir(&inner), path)
    }

    fn makedir(&self, path: &str, recreate: bool) -> FsResult<()> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().makedir(&inner, recreate), path)
    }

    fn makedirs(&self, path: &str, recreate: bool) -> FsResult<()> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().makedirs(&inner, recreate), path)
    }

    fn openbin(&self, path: &str, mode: &str) -> FsResult<Box<dyn VirtualFile>> {
        validate_openbin_mode(mode)?;
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().openbin(&inner, mode), path)
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().remove(&inner), path)
    }

    fn removedir(&self, path: &str) -> FsResult<()> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().removedir(&inner), path)
    }

    fn removetree(&self, path: &str) -> FsResult<()> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().removetree(&inner), path)
    }

    fn setinfo(&self, path: &str, info: &SetInfo) -> FsResult<()> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().setinfo(&inner, info), path)
    }

    fn settimes(
        &self,
        path: &str,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> FsResult<()> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().settimes(&inner, accessed, modified), path)
    }

    fn scandir(
        &self,
        path: &str,
        namespaces: Namespaces,
        page: Option<(usize, usize)>,
    ) -> FsResult<ScanDir> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().scandir(&inner, namespaces, page), path)
    }

    fn getmeta(&self) -> FsMeta {
        self.delegate_fs().getmeta()
    }

    fn getsyspath(&self, path: &str) -> FsResult<PathBuf> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().getsyspath(&inner), path)
    }

    fn geturl(&self, path: &str, purpose: &str) -> FsResult<String> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().geturl(&inner, purpose), path)
    }

    fn hasurl(&self, path: &str, purpose: &str) -> FsResult<bool> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().hasurl(&inner, purpose), path)
    }

    fn isdir(&self, path: &str) -> FsResult<bool> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().isdir(&inner), path)
    }

    fn isfile(&self, path: &str) -> FsResult<bool> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().isfile(&inner), path)
    }

    fn exists(&self, path: &str) -> FsResult<bool> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().exists(&inner), path)
    }

    fn gettype(&self, path: &str) -> FsResult<ResourceType> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().gettype(&inner), path)
    }

    fn getsize(&self, path: &str) -> FsResult<u64> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().getsize(&inner), path)
    }

    fn validatepath(&self, path: &str) -> FsResult<String> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().validatepath(&inner), path)?;
        Ok(abspath(&normalize(path)?))
    }

    fn readbytes(&self, path: &str) -> FsResult<Vec<u8>> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().readbytes(&inner), path)
    }

    fn writebytes(&self, path: &str, contents: &[u8]) -> FsResult<()> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().writebytes(&inner, contents), path)
    }

    fn appendbytes(&self, path: &str, data: &[u8]) -> FsResult<()> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().appendbytes(&inner, data), path)
    }

    fn touch(&self, path: &str) -> FsResult<()> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().touch(&inner), path)
    }

    fn create(&self, path: &str, wipe: bool) -> FsResult<bool> {
        self.closed_flag().check()?;
        let inner = self.delegate_path(path)?;
        unwrap_errors(self.delegate_fs().create(&inner, wipe), path)
    }

    fn copy(&self, src: &str, dst: &str, overwrite: bool) -> FsResult<()> {
        self.closed_flag().check()?;
        let inner_src = self.delegate_path(src)?;
        let inner_dst = self.delegate_path(dst)?;
        unwrap_errors_map(
            self.delegate_fs().copy(&inner_src, &inner_dst, overwrite),
            &[(inner_src.as_str(), src), (inner_dst.as_str(), dst)],
        )
    }

    fn move_(&self, src: &str, dst: &str, overwrite: bool) -> FsResult<()> {
        self.closed_flag().check()?;
        let inner_src = self.delegate_path(src)?;
        let inner_dst = self.delegate_path(dst)?;
        unwrap_errors_map(
            self.delegate_fs().move_(&inner_src, &inner_dst, overwrite),
            &[(inner_src.as_str(), src), (inner_dst.as_str(), dst)],
        )
    }
}

impl<T: WrapFs> FileSystem for T {
    fn getinfo(&self, path: &str, namespaces: Namespaces) -> FsResult<Info> {
        WrapFs::getinfo(self, path, namespaces)
    }

    fn listdir(&self, path: &str) -> FsResult<Vec<String>> {
        WrapFs::listdir(self, path)
    }

    fn makedir(&self, path: &str, recreate: bool) -> FsResult<()> {
        WrapFs::makedir(self, path, recreate)
    }

    fn openbin(&self, path: &str, mode: &str) -> FsResult<Box<dyn VirtualFile>> {
        WrapFs::openbin(self, path, mode)
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        WrapFs::remove(self, path)
    }

    fn removedir(&self, path: &str) -> FsResult<()> {
        WrapFs::removedir(self, path)
    }

    fn setinfo(&self, path: &str, info: &SetInfo) -> FsResult<()> {
        WrapFs::setinfo(self, path, info)
    }

    fn getmeta(&self) -> FsMeta {
        WrapFs::getmeta(self)
    }

    fn close(&self) -> FsResult<()> {
        WrapFs::close(self)
    }

    fn is_closed(&self) -> bool {
        WrapFs::is_closed(self)
    }

    fn check(&self) -> FsResult<()> {
        WrapFs::closed_flag(self).check()
    }

    fn validatepath(&self, path: &str) -> FsResult<String> {
        WrapFs::validatepath(self, path)
    }

    fn scandir(
        &self,
        path: &str,
        namespaces: Namespaces,
        page: Option<(usize, usize)>,
    ) -> FsResult<ScanDir> {
        WrapFs::scandir(self, path, namespaces, page)
    }

    fn exists(&self, path: &str) -> FsResult<bool> {
        WrapFs::exists(self, path)
    }

    fn isdir(&self, path: &str) -> FsResult<bool> {
        WrapFs::isdir(self, path)
    }

    fn isfile(&self, path: &str) -> FsResult<bool> {
        WrapFs::isfile(self, path)
    }

    fn gettype(&self, path: &str) -> FsResult<ResourceType> {
        WrapFs::gettype(self, path)
    }

    fn getsize(&self, path: &str) -> FsResult<u64> {
        WrapFs::getsize(self, path)
    }

    fn getsyspath(&self, path: &str) -> FsResult<PathBuf> {
        WrapFs::getsyspath(self, path)
    }

    fn geturl(&self, path: &str, purpose: &str) -> FsResult<String> {
        WrapFs::geturl(self, path, purpose)
    }

    fn hasurl(&self, path: &str, purpose: &str) -> FsResult<bool> {
        WrapFs::hasurl(self, path, purpose)
    }

    fn readbytes(&self, path: &str) -> FsResult<Vec<u8>> {
        WrapFs::readbytes(self, path)
    }

    fn writebytes(&self, path: &str, contents: &[u8]) -> FsResult<()> {
        WrapFs::writebytes(self, path, contents)
    }

    fn appendbytes(&self, path: &str, data: &[u8]) -> FsResult<()> {
        WrapFs::appendbytes(self, path, data)
    }

    fn touch(&self, path: &str) -> FsResult<()> {
        WrapFs::touch(self, path)
    }

    fn create(&self, path: &str, wipe: bool) -> FsResult<bool> {
        WrapFs::create(self, path, wipe)
    }

    fn settimes(
        &self,
        path: &str,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> FsResult<()> {
        WrapFs::settimes(self, path, accessed, modified)
    }

    fn makedirs(&self, path: &str, recreate: bool) -> FsResult<()> {
        WrapFs::makedirs(self, path, recreate)
    }

    fn removetree(&self, path: &str) -> FsResult<()> {
        WrapFs::removetree(self, path)
    }

    fn copy(&self, src: &str, dst: &str, overwrite: bool) -> FsResult<()> {
        WrapFs::copy(self, src, dst, overwrite)
    }

    fn move_(&self, src: &str, dst: &str, overwrite: bool) -> FsResult<()> {
        WrapFs::move_(self, src, dst, overwrite)
    }
}
