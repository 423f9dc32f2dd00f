//! Tar-archive-backed filesystems.
//!
//! Two variants share one entry point: opening for read yields a lazy,
//! indexed, read-only view of an existing archive ([`ReadTarFs`]); opening
//! for write yields an ordinary writable filesystem staged in a temporary
//! store, serialized into the archive when closed ([`WriteTarFs`]).
//!
//! ```no_run
//! use quiltfs_tar::open_tar;
//! use quiltfs_core::FileSystem;
//!
//! let archive = open_tar("backup.tar.gz", true)?;
//! archive.makedirs("/logs", false)?;
//! archive.writebytes("/logs/app.log", b"started")?;
//! archive.close()?; // serializes /logs/app.log into backup.tar.gz
//! # Ok::<(), quiltfs_core::FsError>(())
//! ```

mod read;
mod write;

use std::path::Path;
use std::sync::Arc;

use quiltfs_core::{DynFs, FsResult};

pub use read::ReadTarFs;
pub use write::WriteTarFs;

/// Compression codecs an archive may be wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Gzip,
    Xz,
}

impl Codec {
    /// Resolve a codec from a target filename, by extension. `None` means
    /// the archive is written uncompressed.
    pub fn from_filename(name: &str) -> Option<Codec> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Codec::Gzip)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Codec::Xz)
        } else {
            None
        }
    }
}

/// Open a tar archive as a filesystem.
///
/// With `write` unset, `path` names an existing archive and the result is a
/// read-only view of it. With `write` set, a new archive will be written to
/// `path` when the returned filesystem is closed; the codec is chosen from
/// the filename extension (see [`Codec::from_filename`]).
pub fn open_tar(path: impl AsRef<Path>, write: bool) -> FsResult<DynFs> {
    if write {
        Ok(Arc::new(WriteTarFs::create(path.as_ref(), None)?))
    } else {
        Ok(Arc::new(ReadTarFs::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::Codec;

    #[test]
    fn codec_extension_table() {
        assert_eq!(Codec::from_filename("a.tar.gz"), Some(Codec::Gzip));
        assert_eq!(Codec::from_filename("a.tgz"), Some(Codec::Gzip));
        assert_eq!(Codec::from_filename("a.tar.xz"), Some(Codec::Xz));
        assert_eq!(Codec::from_filename("a.txz"), Some(Codec::Xz));
        assert_eq!(Codec::from_filename("a.tar"), None);
        assert_eq!(Codec::from_filename("a.tgz.bak"), None);
    }
}
