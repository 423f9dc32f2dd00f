//! Read-only view of an existing tar archive.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde_json::json;
use tracing::{debug, trace};

use quiltfs_core::errors::{FsError, FsResult, PathError};
use quiltfs_core::fs::{ClosedFlag, FileSystem, VirtualFile};
use quiltfs_core::info::{Access, Details, FsMeta, Info, Namespaces, ResourceType, SetInfo};
use quiltfs_core::mode::validate_openbin_mode;
use quiltfs_core::os_errors::convert_os_errors;
use quiltfs_core::path::{basename, frombase, isbase, normalize, relpath};

/// The seekable byte source an archive is read from.
pub trait ReadStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadStream for T {}

type SharedStream = Arc<Mutex<Option<Box<dyn ReadStream>>>>;

/// One indexed archive member.
#[derive(Debug, Clone)]
struct TarEntry {
    is_dir: bool,
    resource_type: ResourceType,
    size: u64,
    offset: u64,
    mtime: u64,
    mode: u32,
    uid: u64,
    gid: u64,
    user: Option<String>,
    group: Option<String>,
    entry_type: u8,
    link_name: Option<String>,
}

/// A readable tar archive.
///
/// The archive index is built lazily on first metadata or listing access by
/// one pass over the archive headers, then cached for the lifetime of the
/// handle; the archive is assumed immutable while open. Entry names are
/// normalized; a name whose back references would escape the root is
/// treated as hostile and silently dropped from the index.
///
/// Directories that have no explicit archive entry but do have descendants
/// are reported as *implicit* directories: present, but without access or
/// raw header metadata.
pub struct ReadTarFs {
    source: Option<PathBuf>,
    stream: SharedStream,
    index: OnceCell<IndexMap<String, TarEntry>>,
    closed: ClosedFlag,
}

impl fmt::Debug for ReadTarFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadTarFs")
            .field("source", &self.source)
            .field("indexed", &self.index.get().is_some())
            .field("closed", &self.closed.is_closed())
            .finish()
    }
}

impl ReadTarFs {
    /// Open an archive file. Gzip- and xz-compressed archives are detected
    /// by their magic bytes and decompressed into memory; plain archives
    /// stream from the file.
    pub fn open(path: impl AsRef<Path>) -> FsResult<ReadTarFs> {
        let path = path.as_ref();
        let file = File::open(path).map_err(FsError::create_failed)?;
        ReadTarFs::prepare(Box::new(file), Some(path.to_path_buf()))
    }

    /// Open an archive from an already-open seekable stream.
    pub fn from_stream(stream: Box<dyn ReadStream>) -> FsResult<ReadTarFs> {
        ReadTarFs::prepare(stream, None)
    }

    fn prepare(mut stream: Box<dyn ReadStream>, source: Option<PathBuf>) -> FsResult<ReadTarFs> {
        let stream: Box<dyn ReadStream> = match sniff_codec(&mut stream).map_err(FsError::create_failed)? {
            Sniffed::Plain => stream,
            Sniffed::Gzip => {
                let mut buf = Vec::new();
                flate2::read::GzDecoder::new(stream)
                    .read_to_end(&mut buf)
                    .map_err(FsError::create_failed)?;
                Box::new(Cursor::new(buf))
            }
            Sniffed::Xz => {
                let mut buf = Vec::new();
                xz::read::XzDecoder::new(stream)
                    .read_to_end(&mut buf)
                    .map_err(FsError::create_failed)?;
                Box::new(Cursor::new(buf))
            }
        };
        Ok(ReadTarFs {
            source,
            stream: Arc::new(Mutex::new(Some(stream))),
            index: OnceCell::new(),
            closed: ClosedFlag::new(),
        })
    }

    /// The lazily built archive index, in archive order.
    fn entries(&self) -> FsResult<&IndexMap<String, TarEntry>> {
        self.index.get_or_try_init(|| {
            let mut guard = self.stream.lock().map_err(|_| FsError::Closed)?;
            let stream = guard.as_mut().ok_or(FsError::Closed)?;
            stream
                .seek(SeekFrom::Start(0))
                .map_err(|err| convert_os_errors("tar_index", "/", false, err))?;

            let mut archive = tar::Archive::new(&mut **stream);
            let mut index = IndexMap::new();
            let entries = archive
                .entries()
                .map_err(|err| convert_os_errors("tar_index", "/", false, err))?;
            for entry in entries {
                let entry =
                    entry.map_err(|err| convert_os_errors("tar_index", "/", false, err))?;
                let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
                let name = match normalize(raw_name.trim_matches('/')) {
                    Ok(name) => name,
                    Err(_) => {
                        // Back references outside the root: a hostile or
                        // malformed archive. Drop the entry.
                        debug!(name = %raw_name, "skipping archive entry escaping the root");
                        continue;
                    }
                };
                if name.is_empty() {
                    continue;
                }
                let header = entry.header();
                let entry_type = header.entry_type();
                let link_name = entry
                    .link_name()
                    .ok()
                    .flatten()
                    .map(|p| p.to_string_lossy().into_owned());
                index.insert(
                    name,
                    TarEntry {
                        is_dir: entry_type.is_dir(),
                        resource_type: translate_entry_type(entry_type),
                        size: entry.size(),
                        offset: entry.raw_file_position(),
                        mtime: header.mtime().unwrap_or(0),
                        mode: header.mode().unwrap_or(0),
                        uid: header.uid().unwrap_or(0),
                        gid: header.gid().unwrap_or(0),
                        user: header.username().ok().flatten().map(str::to_string),
                        group: header.groupname().ok().flatten().map(str::to_string),
                        entry_type: entry_type.as_byte(),
                        link_name,
                    },
                );
            }
            debug!(entries = index.len(), "built archive index");
            Ok(index)
        })
    }

    /// Whether some indexed entry lies strictly below `path`.
    fn has_descendants(entries: &IndexMap<String, TarEntry>, path: &str) -> bool {
        entries
            .keys()
            .any(|name| name != path && isbase(path, name))
    }

    fn entry_info(&self, path: &str, entry: &TarEntry, namespaces: Namespaces) -> Info {
        let mut info = Info::new(basename(path), entry.is_dir);
        if namespaces.contains(Namespaces::DETAILS) {
            info = info.with_details(Details {
                resource_type: entry.resource_type,
                size: entry.size,
                modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(entry.mtime)),
                accessed: None,
                created: None,
            });
        }
        if namespaces.contains(Namespaces::ACCESS) {
            info = info.with_access(Access {
                uid: Some(entry.uid),
                gid: Some(entry.gid),
                user: entry.user.clone(),
                group: entry.group.clone(),
                mode: Some(entry.mode),
            });
        }
        if namespaces.contains(Namespaces::RAW) {
            info = info.with_raw(
                "tar",
                json!({
                    "name": path,
                    "size": entry.size,
                    "mtime": entry.mtime,
                    "mode": entry.mode,
                    "uid": entry.uid,
                    "gid": entry.gid,
                    "uname": entry.user,
                    "gname": entry.group,
                    "type": entry.entry_type,
                    "linkname": entry.link_name,
                    "is_dir": entry.is_dir,
                    "is_file": entry.resource_type == ResourceType::File,
                }),
            );
        }
        info
    }

    fn implicit_dir_info(&self, path: &str, namespaces: Namespaces) -> Info {
        let mut info = Info::new(basename(path), true);
        if namespaces.contains(Namespaces::DETAILS) {
            // No explicit entry to take a timestamp from.
            info = info.with_details(Details {
                resource_type: ResourceType::Directory,
                size: 0,
                modified: None,
                accessed: None,
                created: None,
            });
        }
        info
    }
}

impl FileSystem for ReadTarFs {
    fn getinfo(&self, path: &str, namespaces: Namespaces) -> FsResult<Info> {
        let target = relpath(&self.validatepath(path)?).to_string();
        if target.is_empty() {
            // The synthetic root is always present.
            let mut info = Info::new("", true);
            if namespaces.contains(Namespaces::DETAILS) {
                info = info.with_details(Details {
                    resource_type: ResourceType::Directory,
                    size: 0,
                    modified: None,
                    accessed: None,
                    created: None,
                });
            }
            return Ok(info);
        }
        let entries = self.entries()?;
        if let Some(entry) = entries.get(&target) {
            Ok(self.entry_info(&target, entry, namespaces))
        } else if Self::has_descendants(entries, &target) {
            Ok(self.implicit_dir_info(&target, namespaces))
        } else {
            Err(FsError::not_found(path))
        }
    }

    fn listdir(&self, path: &str) -> FsResult<Vec<String>> {
        let target = relpath(&self.validatepath(path)?).to_string();
        let entries = self.entries()?;
        if !target.is_empty() {
            match entries.get(&target) {
                Some(entry) if entry.is_dir => {}
                Some(_) => return Err(FsError::directory_expected(path)),
                None => {
                    if !Self::has_descendants(entries, &target) {
                        return Err(FsError::not_found(path));
                    }
                }
            }
        }
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for name in entries.keys() {
            let Some(rest) = frombase(&target, name) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let first = rest.split('/').next().expect("non-empty remainder");
            if seen.insert(first.to_string()) {
                names.push(first.to_string());
            }
        }
        Ok(names)
    }

    fn makedir(&self, path: &str, _recreate: bool) -> FsResult<()> {
        self.check()?;
        Err(FsError::read_only(path))
    }

    fn openbin(&self, path: &str, mode: &str) -> FsResult<Box<dyn VirtualFile>> {
        let mode = validate_openbin_mode(mode)?;
        let target = relpath(&self.validatepath(path)?).to_string();
        if mode.writing() {
            return Err(FsError::read_only(path));
        }
        let entries = self.entries()?;
        let entry = entries.get(&target).ok_or_else(|| FsError::not_found(path))?;
        if entry.resource_type != ResourceType::File {
            return Err(FsError::file_expected(path));
        }
        trace!(path = %target, offset = entry.offset, size = entry.size, "opening archive member");
        Ok(Box::new(TarEntryReader {
            stream: self.stream.clone(),
            offset: entry.offset,
            size: entry.size,
            pos: 0,
        }))
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        self.check()?;
        Err(FsError::read_only(path))
    }

    fn removedir(&self, path: &str) -> FsResult<()> {
        self.check()?;
        Err(FsError::read_only(path))
    }

    fn setinfo(&self, path: &str, _info: &SetInfo) -> FsResult<()> {
        self.check()?;
        Err(FsError::read_only(path))
    }

    fn getmeta(&self) -> FsMeta {
        FsMeta {
            case_insensitive: true,
            read_only: true,
            supports_rename: false,
            thread_safe: true,
            ..FsMeta::default()
        }
    }

    fn close(&self) -> FsResult<()> {
        if self.closed.close() {
            // Release the archive stream.
            if let Ok(mut guard) = self.stream.lock() {
                guard.take();
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    fn geturl(&self, path: &str, purpose: &str) -> FsResult<String> {
        self.check()?;
        match (&self.source, purpose) {
            (Some(source), "fs") => Ok(format!("tar://{}!/{}", source.display(), relpath(path))),
            _ => Err(PathError::NoUrl {
                path: path.to_string(),
                purpose: purpose.to_string(),
            }
            .into()),
        }
    }
}

enum Sniffed {
    Plain,
    Gzip,
    Xz,
}

/// Identify a compression wrapper by magic bytes, leaving the stream
/// rewound.
fn sniff_codec(stream: &mut Box<dyn ReadStream>) -> io::Result<Sniffed> {
    let mut magic = [0u8; 6];
    let mut filled = 0;
    while filled < magic.len() {
        let n = stream.read(&mut magic[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    stream.seek(SeekFrom::Start(0))?;
    if filled >= 2 && magic[..2] == [0x1f, 0x8b] {
        Ok(Sniffed::Gzip)
    } else if filled >= 6 && magic == [0xfd, b'7', b'z', b'X', b'Z', 0x00] {
        Ok(Sniffed::Xz)
    } else {
        Ok(Sniffed::Plain)
    }
}

fn translate_entry_type(entry_type: tar::EntryType) -> ResourceType {
    use tar::EntryType;
    match entry_type {
        EntryType::Directory => ResourceType::Directory,
        EntryType::Regular | EntryType::Continuous => ResourceType::File,
        EntryType::Symlink | EntryType::Link => ResourceType::Symlink,
        EntryType::Char => ResourceType::Character,
        EntryType::Block => ResourceType::BlockSpecial,
        EntryType::Fifo => ResourceType::Fifo,
        _ => ResourceType::Unknown,
    }
}

/// Streaming reader over one archive member's byte range.
///
/// Seeks clamp to the member bounds; writes are rejected.
struct TarEntryReader {
    stream: SharedStream,
    offset: u64,
    size: u64,
    pos: u64,
}

impl fmt::Debug for TarEntryReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarEntryReader")
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("pos", &self.pos)
            .finish()
    }
}

impl Read for TarEntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.size.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let mut guard = self
            .stream
            .lock()
            .map_err(|_| io::Error::other("archive lock poisoned"))?;
        let stream = guard
            .as_mut()
            .ok_or_else(|| io::Error::other("archive is closed"))?;
        stream.seek(SeekFrom::Start(self.offset + self.pos))?;
        let take = buf.len().min(remaining as usize);
        let count = stream.read(&mut buf[..take])?;
        self.pos += count as u64;
        Ok(count)
    }
}

impl Write for TarEntryReader {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "archive member is read only",
        ))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for TarEntryReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let size = self.size as i64;
        let next = match pos {
            SeekFrom::Start(offset) => offset.min(self.size) as i64,
            SeekFrom::End(offset) => size.saturating_add(offset),
            SeekFrom::Current(offset) => (self.pos as i64).saturating_add(offset),
        };
        self.pos = next.clamp(0, size) as u64;
        Ok(self.pos)
    }
}
