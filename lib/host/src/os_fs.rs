//! Local-disk backend.

use std::fs::{self, File, FileTimes, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::trace;
use url::Url;

use quiltfs_core::errors::{FsError, FsResult, PathError};
use quiltfs_core::fs::{ClosedFlag, FileSystem, VirtualFile};
use quiltfs_core::info::{Access, Details, FsMeta, Info, Namespaces, ResourceType, SetInfo};
use quiltfs_core::mode::validate_openbin_mode;
use quiltfs_core::os_errors::{convert_os_errors, convert_os_result};
use quiltfs_core::path::{basename, relpath};

/// A filesystem over a directory on the host.
///
/// Virtual paths map to host paths beneath the fixed root; the
/// normalization boundary guarantees no path escapes it. Every io failure
/// is translated into the typed taxonomy at the call site.
#[derive(Debug, Clone)]
pub struct OsFs {
    root: PathBuf,
    closed: Arc<ClosedFlag>,
}

impl OsFs {
    /// Open an existing directory as a filesystem root.
    pub fn new(root: impl AsRef<Path>) -> FsResult<OsFs> {
        let root = root.as_ref().to_path_buf();
        let metadata = fs::metadata(&root).map_err(FsError::create_failed)?;
        if !metadata.is_dir() {
            return Err(FsError::create_failed(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("root '{}' is not a directory", root.display()),
            )));
        }
        Ok(OsFs {
            root,
            closed: Arc::new(ClosedFlag::new()),
        })
    }

    /// Create the root directory (and its parents) first, then open it.
    pub fn create(root: impl AsRef<Path>) -> FsResult<OsFs> {
        fs::create_dir_all(root.as_ref()).map_err(FsError::create_failed)?;
        OsFs::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate `path` and resolve it to the backing host path.
    fn resolve(&self, path: &str) -> FsResult<(String, PathBuf)> {
        let target = self.validatepath(path)?;
        let sys = self.root.join(relpath(&target));
        trace!(path = target, sys = %sys.display(), "resolved host path");
        Ok((target, sys))
    }

    fn details_for(metadata: &fs::Metadata) -> Details {
        let file_type = metadata.file_type();
        let resource_type = if file_type.is_dir() {
            ResourceType::Directory
        } else if file_type.is_file() {
            ResourceType::File
        } else if file_type.is_symlink() {
            ResourceType::Symlink
        } else {
            ResourceType::Unknown
        };
        Details {
            resource_type,
            size: metadata.len(),
            modified: metadata.modified().ok(),
            accessed: metadata.accessed().ok(),
            created: metadata.created().ok(),
        }
    }

    #[cfg(unix)]
    fn access_for(metadata: &fs::Metadata) -> Access {
        use std::os::unix::fs::MetadataExt;
        Access {
            uid: Some(metadata.uid() as u64),
            gid: Some(metadata.gid() as u64),
            user: None,
            group: None,
            mode: Some(metadata.mode()),
        }
    }

    #[cfg(not(unix))]
    fn access_for(_metadata: &fs::Metadata) -> Access {
        Access::default()
    }
}

impl FileSystem for OsFs {
    fn getinfo(&self, path: &str, namespaces: Namespaces) -> FsResult<Info> {
        let (target, sys) = self.resolve(path)?;
        let metadata = convert_os_result(fs::symlink_metadata(&sys), "getinfo", path, false)?;
        let mut info = Info::new(basename(&target), metadata.is_dir());
        if namespaces.contains(Namespaces::DETAILS) {
            info = info.with_details(Self::details_for(&metadata));
        }
        if namespaces.contains(Namespaces::ACCESS) {
            info = info.with_access(Self::access_for(&metadata));
        }
        Ok(info)
    }

    fn listdir(&self, path: &str) -> FsResult<Vec<String>> {
        let (_, sys) = self.resolve(path)?;
        let entries = convert_os_result(fs::read_dir(&sys), "listdir", path, true)?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = convert_os_result(entry, "listdir", path, true)?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn makedir(&self, path: &str, recreate: bool) -> FsResult<()> {
        let (_, sys) = self.resolve(path)?;
        match fs::create_dir(&sys) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists && recreate => {
                if sys.is_dir() {
                    Ok(())
                } else {
                    Err(FsError::directory_expected(path))
                }
            }
            Err(err) => Err(convert_os_errors("makedir", path, true, err)),
        }
    }

    fn openbin(&self, path: &str, mode: &str) -> FsResult<Box<dyn VirtualFile>> {
        let mode = validate_openbin_mode(mode)?;
        let (_, sys) = self.resolve(path)?;
        if sys.is_dir() {
            return Err(FsError::file_expected(path));
        }
        let mut options = OpenOptions::new();
        options.read(mode.reading());
        options.write(mode.writing());
        options.append(mode.appending());
        if mode.exclusive() {
            options.create_new(true);
        } else {
            options.create(mode.create());
            options.truncate(mode.truncate());
        }
        let file = convert_os_result(options.open(&sys), "openbin", path, false)?;
        Ok(Box::new(file))
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let (_, sys) = self.resolve(path)?;
        if sys.is_dir() {
            return Err(FsError::file_expected(path));
        }
        convert_os_result(fs::remove_file(&sys), "remove", path, false)
    }

    fn removedir(&self, path: &str) -> FsResult<()> {
        let (target, sys) = self.resolve(path)?;
        if target == "/" {
            return Err(FsError::remove_root(path));
        }
        convert_os_result(fs::remove_dir(&sys), "removedir", path, true)
    }

    fn setinfo(&self, path: &str, info: &SetInfo) -> FsResult<()> {
        let (_, sys) = self.resolve(path)?;
        let file = convert_os_result(File::open(&sys), "setinfo", path, false)?;
        let mut times = FileTimes::new();
        if let Some(accessed) = info.accessed {
            times = times.set_accessed(accessed);
        }
        if let Some(modified) = info.modified {
            times = times.set_modified(modified);
        }
        convert_os_result(file.set_times(times), "setinfo", path, false)
    }

    fn getmeta(&self) -> FsMeta {
        FsMeta {
            supports_rename: true,
            thread_safe: true,
            ..FsMeta::default()
        }
    }

    fn close(&self) -> FsResult<()> {
        self.closed.close();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    fn getsyspath(&self, path: &str) -> FsResult<PathBuf> {
        let (_, sys) = self.resolve(path)?;
        Ok(sys)
    }

    fn geturl(&self, path: &str, purpose: &str) -> FsResult<String> {
        let (_, sys) = self.resolve(path)?;
        match purpose {
            "download" => Url::from_file_path(&sys)
                .map(|url| url.to_string())
                .map_err(|_| {
                    FsError::from(PathError::NoUrl {
                        path: path.to_string(),
                        purpose: purpose.to_string(),
                    })
                }),
            "fs" => Ok(format!("osfs://{}", sys.display())),
            _ => Err(PathError::NoUrl {
                path: path.to_string(),
                purpose: purpose.to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OsFs;
    use quiltfs_core::errors::FsError;
    use quiltfs_core::fs::FileSystem;

    #[test]
    fn missing_root_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-there");
        match OsFs::new(&missing) {
            Err(FsError::CreateFailed { .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
        // create() brings the root into existence instead.
        let fs = OsFs::create(&missing).unwrap();
        assert!(fs.isdir("/").unwrap());
    }

    #[test]
    fn a_file_root_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            OsFs::new(&file),
            Err(FsError::CreateFailed { .. })
        ));
    }
}
