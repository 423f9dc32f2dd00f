//! End-to-end archive behavior: staged writes serialized on close, lazy
//! read indexes, implicit directories and the read-only contract.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use quiltfs_core::{
    FileSystem, FsError, Namespaces, ResourceErrorKind, ResourceType,
};
use quiltfs_tar::{open_tar, Codec, ReadTarFs, WriteTarFs};

fn build_archive(target: &std::path::Path) {
    let fs = open_tar(target, true).unwrap();
    fs.makedirs("/foo/bar", false).unwrap();
    fs.makedir("/tmp", false).unwrap();
    fs.writebytes("/top.txt", b"Hello, World").unwrap();
    fs.writebytes("/foo/bar/egg", b"foofoo").unwrap();
    fs.close().unwrap();
}

fn read_kind(err: FsError) -> ResourceErrorKind {
    match err {
        FsError::Resource(err) => err.kind,
        other => panic!("expected resource error, got {other:?}"),
    }
}

#[test]
fn write_then_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.tar");

    let fs = open_tar(&target, true).unwrap();
    fs.makedirs("/foo", false).unwrap();
    fs.writebytes("/foo/bar.txt", b"hi").unwrap();
    // While open, the write variant is an ordinary filesystem.
    assert!(fs.isfile("/foo/bar.txt").unwrap());
    fs.close().unwrap();
    // Close is idempotent.
    fs.close().unwrap();

    let tar = open_tar(&target, false).unwrap();
    assert!(tar.isfile("/foo/bar.txt").unwrap());
    assert_eq!(tar.getsize("/foo/bar.txt").unwrap(), 2);
    assert_eq!(tar.readbytes("/foo/bar.txt").unwrap(), b"hi");
    assert!(tar.isdir("/foo").unwrap());
}

#[test]
fn read_view_is_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tests.tar");
    build_archive(&target);

    let fs = open_tar(&target, false).unwrap();
    assert_eq!(
        read_kind(fs.makedir("/newdir", false).unwrap_err()),
        ResourceErrorKind::ReadOnly
    );
    assert_eq!(
        read_kind(fs.remove("/top.txt").unwrap_err()),
        ResourceErrorKind::ReadOnly
    );
    assert_eq!(
        read_kind(fs.removedir("/foo/bar").unwrap_err()),
        ResourceErrorKind::ReadOnly
    );
    assert_eq!(
        read_kind(fs.create("/fresh.txt", false).unwrap_err()),
        ResourceErrorKind::ReadOnly
    );
    assert_eq!(
        read_kind(fs.setinfo("/top.txt", &Default::default()).unwrap_err()),
        ResourceErrorKind::ReadOnly
    );
    assert_eq!(
        read_kind(fs.writebytes("/top.txt", b"x").unwrap_err()),
        ResourceErrorKind::ReadOnly
    );
    assert_eq!(
        read_kind(fs.openbin("/top.txt", "w").unwrap_err()),
        ResourceErrorKind::ReadOnly
    );
    // Reading still works afterwards.
    assert_eq!(fs.readbytes("/top.txt").unwrap(), b"Hello, World");

    let meta = fs.getmeta();
    assert!(meta.read_only);
}

#[test]
fn directories_explicit_and_implicit() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tests.tar");
    build_archive(&target);

    let fs = open_tar(&target, false).unwrap();

    // Root is an always-present implicit directory.
    let root = fs.getinfo("/", Namespaces::DETAILS).unwrap();
    assert_eq!(root.name(), "");
    assert!(root.is_dir());
    assert_eq!(root.resource_type().unwrap(), ResourceType::Directory);

    let mut names = fs.listdir("/").unwrap();
    names.sort();
    assert_eq!(names, vec!["foo", "tmp", "top.txt"]);
    assert_eq!(fs.listdir("/foo").unwrap(), vec!["bar"]);
    assert_eq!(fs.listdir("/foo/bar").unwrap(), vec!["egg"]);

    assert!(fs.isdir("/foo").unwrap());
    assert!(fs.isfile("/foo/bar/egg").unwrap());
    assert!(!fs.isfile("/foo").unwrap());

    assert_eq!(
        read_kind(fs.listdir("/nowhere").unwrap_err()),
        ResourceErrorKind::NotFound
    );
    assert_eq!(
        read_kind(fs.listdir("/top.txt").unwrap_err()),
        ResourceErrorKind::DirectoryExpected
    );
    assert!(fs
        .getinfo("/foo/missing", Namespaces::BASIC)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn implicit_directories_have_no_access_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("implicit.tar");

    // Archive a single deep file with no explicit directory entries.
    let file = std::fs::File::create(&target).unwrap();
    let mut builder = tar::Builder::new(file);
    let mut header = tar::Header::new_gnu();
    header.set_size(4);
    header.set_mode(0o644);
    header.set_mtime(1_000_000);
    builder
        .append_data(&mut header, "deep/nested/file.txt", &b"data"[..])
        .unwrap();
    builder.into_inner().unwrap().flush().unwrap();

    let fs = open_tar(&target, false).unwrap();
    let info = fs
        .getinfo("/deep/nested", Namespaces::DETAILS | Namespaces::ACCESS)
        .unwrap();
    assert!(info.is_dir());
    // Implicit directory: no modified time, no access namespace.
    assert_eq!(info.modified().unwrap(), None);
    assert!(info.access().is_err());

    // The explicit file carries full metadata.
    let info = fs
        .getinfo(
            "/deep/nested/file.txt",
            Namespaces::DETAILS | Namespaces::ACCESS | Namespaces::RAW,
        )
        .unwrap();
    assert_eq!(info.size().unwrap(), 4);
    assert!(info.modified().unwrap().is_some());
    assert!(info.access().unwrap().mode.is_some());
    let raw = info.raw().unwrap();
    assert_eq!(raw.namespace, "tar");
    assert_eq!(raw.value["size"], 4);
}

#[test]
fn hostile_entry_names_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("hostile.tar");

    let file = std::fs::File::create(&target).unwrap();
    let mut builder = tar::Builder::new(file);

    let mut header = tar::Header::new_gnu();
    header.set_size(2);
    header.set_mode(0o644);
    header.set_mtime(0);
    builder.append_data(&mut header, "ok.txt", &b"ok"[..]).unwrap();

    // `set_path` refuses `..` components, so forge the name bytes the way a
    // hostile archive would carry them.
    let mut header = tar::Header::new_gnu();
    header.set_size(4);
    header.set_mode(0o644);
    header.set_mtime(0);
    let name = b"up/../../evil.txt";
    header.as_mut_bytes()[..name.len()].copy_from_slice(name);
    header.set_cksum();
    builder.append(&header, &b"evil"[..]).unwrap();

    builder.into_inner().unwrap().flush().unwrap();

    let fs = open_tar(&target, false).unwrap();
    assert_eq!(fs.listdir("/").unwrap(), vec!["ok.txt"]);
    assert!(!fs.exists("/evil.txt").unwrap());
}

#[test]
fn compressed_archives_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["packed.tar.gz", "packed.tgz", "packed.tar.xz"] {
        let target = dir.path().join(name);
        let fs = open_tar(&target, true).unwrap();
        fs.writebytes("/payload.txt", b"compressed contents").unwrap();
        fs.close().unwrap();

        // A compressed tar is not readable as a plain one unless sniffed.
        let fs = open_tar(&target, false).unwrap();
        assert_eq!(
            fs.readbytes("/payload.txt").unwrap(),
            b"compressed contents",
            "round trip failed for {name}"
        );
        fs.close().unwrap();
    }
}

#[test]
fn member_streams_are_seekable() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("seek.tar");
    let fs = open_tar(&target, true).unwrap();
    fs.writebytes("/digits.txt", b"0123456789").unwrap();
    fs.close().unwrap();

    let fs = open_tar(&target, false).unwrap();
    let mut member = fs.openbin("/digits.txt", "rb").unwrap();

    let mut buf = [0u8; 4];
    member.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"0123");

    member.seek(SeekFrom::Start(6)).unwrap();
    let mut rest = Vec::new();
    member.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, b"6789");

    // Seeks clamp to the member bounds.
    assert_eq!(member.seek(SeekFrom::End(10)).unwrap(), 10);
    assert_eq!(member.seek(SeekFrom::Current(-100)).unwrap(), 0);

    // Members reject writes.
    assert!(member.write_all(b"nope").is_err());
}

#[test]
fn stream_targets_and_sources() {
    #[derive(Debug, Clone)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let buf = SharedBuf(Arc::new(Mutex::new(Vec::new())));
    let fs = WriteTarFs::to_stream(Box::new(buf.clone()), Some(Codec::Gzip)).unwrap();
    fs.makedir("/notes", false).unwrap();
    fs.writebytes("/notes/a.txt", b"alpha").unwrap();
    fs.close().unwrap();

    let bytes = buf.0.lock().unwrap().clone();
    assert!(!bytes.is_empty());

    let fs = ReadTarFs::from_stream(Box::new(Cursor::new(bytes))).unwrap();
    assert_eq!(fs.readbytes("/notes/a.txt").unwrap(), b"alpha");
    // A stream-opened archive has no fs URL.
    assert!(!fs.hasurl("/notes/a.txt", "fs").unwrap());
}

#[test]
fn path_sources_expose_a_tar_url() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("url.tar");
    build_archive(&target);

    let fs = open_tar(&target, false).unwrap();
    let url = fs.geturl("/top.txt", "fs").unwrap();
    assert!(url.starts_with("tar://"), "unexpected url: {url}");
    assert!(url.ends_with("!/top.txt"), "unexpected url: {url}");
    assert!(!fs.hasurl("/top.txt", "download").unwrap());
}

#[test]
fn closing_releases_the_archive() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("close.tar");
    build_archive(&target);

    let fs = open_tar(&target, false).unwrap();
    let mut member = fs.openbin("/top.txt", "rb").unwrap();
    fs.close().unwrap();
    assert!(fs.is_closed());
    assert!(matches!(fs.listdir("/"), Err(FsError::Closed)));
    // The member stream is backed by the released archive handle.
    let mut out = Vec::new();
    assert!(member.read_to_end(&mut out).is_err());
    fs.close().unwrap();
}

#[test]
fn malformed_archives_fail_construction() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("missing.tar");
    match ReadTarFs::open(&target) {
        Err(FsError::CreateFailed { .. }) => {}
        other => panic!("unexpected: {other:?}"),
    }
}
