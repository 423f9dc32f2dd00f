//! Composable virtual filesystems.
//!
//! This crate defines the capability interface every backend implements
//! ([`FileSystem`]), the typed error taxonomy ([`FsError`]), and the
//! composition layer built on top: sub-directory scoping ([`SubFs`]),
//! read-only enforcement ([`ReadOnlyFs`]), directory-metadata caching
//! ([`CachedDirFs`]) and prefix-routing across backends ([`MountFs`]).
//! An in-memory backend ([`MemFs`]) serves as the default store of the
//! router and as the universal test double.
//!
//! Filesystems are shared as `Arc<dyn FileSystem>` ([`DynFs`]) and composed
//! freely:
//!
//! ```
//! use std::sync::Arc;
//! use quiltfs_core::{read_only, DynFs, FileSystem, MemFs, MountFs};
//!
//! let data: DynFs = Arc::new(MemFs::new());
//! data.writebytes("/hello.txt", b"hi")?;
//!
//! let mut root = MountFs::new(true);
//! root.mount("/data", Arc::new(read_only(data)))?;
//! assert_eq!(root.readbytes("/data/hello.txt")?, b"hi");
//! assert!(root.remove("/data/hello.txt").is_err());
//! # Ok::<(), quiltfs_core::FsError>(())
//! ```

pub mod cachedir;
pub mod errors;
pub mod fs;
pub mod info;
pub mod lru;
pub mod mem_fs;
pub mod mode;
pub mod mount;
pub mod os_errors;
pub mod path;
pub mod readonly;
pub mod subfs;
pub mod wrap;

pub use cachedir::{cache_directory, CachedDirFs};
pub use errors::{
    unwrap_errors, unwrap_errors_map, FsError, FsResult, MountError, OperationError,
    OperationErrorKind, PathError, ResourceError, ResourceErrorKind,
};
pub use fs::{ClosedFlag, DynFs, FileSystem, ScanDir, VirtualFile};
pub use info::{Access, Details, FsMeta, Info, Namespaces, RawNamespace, ResourceType, SetInfo};
pub use lru::LruCache;
pub use mem_fs::MemFs;
pub use mode::{check_readable, check_writable, validate_openbin_mode, Mode};
pub use mount::MountFs;
pub use os_errors::{convert_os_errors, convert_os_result};
pub use readonly::{read_only, ReadOnlyFs};
pub use subfs::{ClosingSubFs, SubFs};
pub use wrap::WrapFs;
