//! Staged-write tar archive.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use tracing::debug;

use quiltfs_core::errors::{FsError, FsResult};
use quiltfs_core::fs::{ClosedFlag, DynFs, FileSystem};
use quiltfs_core::info::Namespaces;
use quiltfs_core::os_errors::convert_os_errors;
use quiltfs_core::path::{join, relpath};
use quiltfs_core::wrap::WrapFs;
use quiltfs_host::TempFs;

use crate::Codec;

enum TarTarget {
    Path(PathBuf),
    Stream(Box<dyn Write + Send>),
}

impl fmt::Debug for TarTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TarTarget::Path(path) => f.debug_tuple("Path").field(path).finish(),
            TarTarget::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

/// A writable tar archive.
///
/// While open this is an ordinary writable filesystem: every operation is
/// delegated to a staging store (a fresh [`TempFs`] unless one is
/// supplied). Closing it serializes the entire staged tree into the
/// destination archive and then closes the staging store; exactly one close
/// takes effect, repeats are no-ops. The codec is the explicit one given at
/// construction, else resolved from the destination filename, else none.
#[derive(Debug)]
pub struct WriteTarFs {
    target: Mutex<Option<TarTarget>>,
    codec: Option<Codec>,
    staging: DynFs,
    closed: ClosedFlag,
}

impl WriteTarFs {
    /// Stage a new archive to be written to `path` on close.
    pub fn create(path: impl Into<PathBuf>, codec: Option<Codec>) -> FsResult<WriteTarFs> {
        let staging: DynFs = Arc::new(TempFs::new()?);
        WriteTarFs::with_staging(path, codec, staging)
    }

    /// Like [`create`](WriteTarFs::create), but staging into a caller-provided
    /// filesystem instead of a fresh temporary store.
    pub fn with_staging(
        path: impl Into<PathBuf>,
        codec: Option<Codec>,
        staging: DynFs,
    ) -> FsResult<WriteTarFs> {
        let path = path.into();
        let codec = codec.or_else(|| Codec::from_filename(&path.to_string_lossy()));
        Ok(WriteTarFs {
            target: Mutex::new(Some(TarTarget::Path(path))),
            codec,
            staging,
            closed: ClosedFlag::new(),
        })
    }

    /// Stage a new archive to be written into an open stream on close.
    pub fn to_stream(stream: Box<dyn Write + Send>, codec: Option<Codec>) -> FsResult<WriteTarFs> {
        let staging: DynFs = Arc::new(TempFs::new()?);
        Ok(WriteTarFs {
            target: Mutex::new(Some(TarTarget::Stream(stream))),
            codec,
            staging,
            closed: ClosedFlag::new(),
        })
    }

    /// Serialize the staged tree into `path`, overriding the destination
    /// and codec chosen at construction. The construction-time destination
    /// is left untouched and still written on close.
    pub fn write_tar_to(&self, path: impl AsRef<Path>, codec: Option<Codec>) -> FsResult<()> {
        let path = path.as_ref();
        let codec = codec
            .or_else(|| Codec::from_filename(&path.to_string_lossy()))
            .or(self.codec);
        let file = File::create(path)
            .map_err(|err| convert_os_errors("write_tar", "/", false, err))?;
        write_archive(&*self.staging, file, codec)
    }

    /// Serialize the staged tree into the destination now.
    ///
    /// Called automatically on close; calling it earlier produces a
    /// snapshot archive. A stream destination can only be written once.
    pub fn write_tar(&self) -> FsResult<()> {
        let mut guard = self
            .target
            .lock()
            .map_err(|_| FsError::create_failed(io::Error::other("target lock poisoned")))?;
        match guard.as_mut() {
            Some(TarTarget::Path(path)) => {
                debug!(target = %path.display(), codec = ?self.codec, "serializing staged tree");
                let file = File::create(&*path)
                    .map_err(|err| convert_os_errors("write_tar", "/", false, err))?;
                write_archive(&*self.staging, file, self.codec)
            }
            Some(TarTarget::Stream(_)) => {
                let Some(TarTarget::Stream(stream)) = guard.take() else {
                    unreachable!("matched a stream target");
                };
                debug!(codec = ?self.codec, "serializing staged tree to stream");
                write_archive(&*self.staging, stream, self.codec)
            }
            None => Ok(()),
        }
    }
}

impl WrapFs for WriteTarFs {
    fn delegate_fs(&self) -> &dyn FileSystem {
        &*self.staging
    }

    fn closed_flag(&self) -> &ClosedFlag {
        &self.closed
    }

    fn close(&self) -> FsResult<()> {
        if self.closed_flag().close() {
            // Serialize first, but close the staging store even when the
            // serialization failed.
            let written = self.write_tar();
            let closed = self.staging.close();
            written?;
            closed?;
        }
        Ok(())
    }
}

fn write_archive(staging: &dyn FileSystem, writer: impl Write, codec: Option<Codec>) -> FsResult<()> {
    match codec {
        Some(Codec::Gzip) => {
            let encoder = flate2::write::GzEncoder::new(writer, flate2::Compression::default());
            let encoder = pack(staging, encoder)?;
            let writer = encoder
                .finish()
                .map_err(|err| convert_os_errors("write_tar", "/", false, err))?;
            flush(writer)
        }
        Some(Codec::Xz) => {
            let encoder = xz::write::XzEncoder::new(writer, 6);
            let encoder = pack(staging, encoder)?;
            let writer = encoder
                .finish()
                .map_err(|err| convert_os_errors("write_tar", "/", false, err))?;
            flush(writer)
        }
        None => {
            let writer = pack(staging, writer)?;
            flush(writer)
        }
    }
}

fn flush(mut writer: impl Write) -> FsResult<()> {
    writer
        .flush()
        .map_err(|err| convert_os_errors("write_tar", "/", false, err))
}

/// Serialize the staged tree into a tar stream, returning the underlying
/// writer.
fn pack<W: Write>(staging: &dyn FileSystem, writer: W) -> FsResult<W> {
    let mut builder = tar::Builder::new(writer);
    pack_dir(staging, &mut builder, "/")?;
    builder
        .into_inner()
        .map_err(|err| convert_os_errors("write_tar", "/", false, err))
}

fn pack_dir<W: Write>(
    staging: &dyn FileSystem,
    builder: &mut tar::Builder<W>,
    dir: &str,
) -> FsResult<()> {
    for info in staging.scandir(dir, Namespaces::BASIC | Namespaces::DETAILS, None)? {
        let path = join(dir, info.name())?;
        let name = relpath(&path).to_string();
        let mtime = info
            .modified()
            .ok()
            .flatten()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);

        if info.is_dir() {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_mode(0o755);
            header.set_mtime(mtime);
            builder
                .append_data(&mut header, format!("{name}/"), io::empty())
                .map_err(|err| convert_os_errors("write_tar", &path, false, err))?;
            pack_dir(staging, builder, &path)?;
        } else {
            let data = staging.readbytes(&path)?;
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(mtime);
            builder
                .append_data(&mut header, &name, data.as_slice())
                .map_err(|err| convert_os_errors("write_tar", &path, false, err))?;
        }
    }
    Ok(())
}
