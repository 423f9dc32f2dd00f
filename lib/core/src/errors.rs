//! Typed errors raised by filesystem operations.
//!
//! Every failure surfaced by a [`FileSystem`](crate::FileSystem)
//! implementation is one of the variants below, so callers can match on the
//! broad branch (`Path`, `Resource`, `Operation`) or on a precise kind.
//! Low-level `io::Error` causes are translated at the backend call site (see
//! [`convert_os_errors`](crate::os_errors::convert_os_errors)) and never
//! cross a delegation boundary untranslated.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type FsResult<T> = Result<T, FsError>;

/// Root error for all filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// The path string itself is unusable for the requested purpose.
    #[error(transparent)]
    Path(#[from] PathError),

    /// A named resource exists, doesn't, or has the wrong shape for the
    /// operation.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The operation could not complete for environmental reasons.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// A mount point conflicts with an existing mount.
    #[error(transparent)]
    Mount(#[from] MountError),

    /// Attempt to use a closed filesystem.
    #[error("attempt to use closed filesystem")]
    Closed,

    /// A filesystem could not be constructed.
    #[error("unable to create filesystem, {details}")]
    CreateFailed {
        details: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A metadata attribute was read without requesting its namespace.
    #[error("namespace '{namespace}' is required for this attribute")]
    MissingNamespace { namespace: &'static str },

    /// An open-mode string failed validation.
    #[error("{message}")]
    InvalidMode { message: String },

    /// One or more operations of a bulk copy failed. The scheduling of such
    /// a fan-out lives above this crate; this variant is the aggregation
    /// shape it reports with.
    #[error("{} copy operation(s) failed", .errors.len())]
    BulkCopy { errors: Vec<FsError> },
}

impl FsError {
    /// Shorthand used when a missing resource maps to `false` rather than
    /// an error (`exists`, `isdir`, `isfile`).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FsError::Resource(ResourceError {
                kind: ResourceErrorKind::NotFound,
                ..
            })
        )
    }

    pub fn not_found(path: &str) -> Self {
        ResourceError::new(ResourceErrorKind::NotFound, path).into()
    }

    pub fn resource_invalid(path: &str) -> Self {
        ResourceError::new(ResourceErrorKind::Invalid, path).into()
    }

    pub fn file_expected(path: &str) -> Self {
        ResourceError::new(ResourceErrorKind::FileExpected, path).into()
    }

    pub fn directory_expected(path: &str) -> Self {
        ResourceError::new(ResourceErrorKind::DirectoryExpected, path).into()
    }

    pub fn file_exists(path: &str) -> Self {
        ResourceError::new(ResourceErrorKind::FileExists, path).into()
    }

    pub fn directory_exists(path: &str) -> Self {
        ResourceError::new(ResourceErrorKind::DirectoryExists, path).into()
    }

    pub fn directory_not_empty(path: &str) -> Self {
        ResourceError::new(ResourceErrorKind::DirectoryNotEmpty, path).into()
    }

    pub fn destination_exists(path: &str) -> Self {
        ResourceError::new(ResourceErrorKind::DestinationExists, path).into()
    }

    pub fn locked(path: &str) -> Self {
        ResourceError::new(ResourceErrorKind::Locked, path).into()
    }

    pub fn read_only(path: &str) -> Self {
        ResourceError::new(ResourceErrorKind::ReadOnly, path).into()
    }

    pub fn unsupported() -> Self {
        OperationError::new(OperationErrorKind::Unsupported).into()
    }

    pub fn permission_denied(path: &str) -> Self {
        OperationError::new(OperationErrorKind::PermissionDenied)
            .with_path(path)
            .into()
    }

    pub fn remove_root(path: &str) -> Self {
        OperationError::new(OperationErrorKind::RemoveRoot)
            .with_path(path)
            .into()
    }

    pub fn illegal_destination(path: &str) -> Self {
        OperationError::new(OperationErrorKind::IllegalDestination)
            .with_path(path)
            .into()
    }

    /// Wrap an arbitrary construction failure into `CreateFailed`, keeping
    /// the original cause for diagnostics.
    pub fn create_failed<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let source = source.into();
        FsError::CreateFailed {
            details: source.to_string(),
            source: Some(source),
        }
    }

    pub fn invalid_mode(message: impl Into<String>) -> Self {
        FsError::InvalidMode {
            message: message.into(),
        }
    }
}

/// Errors caused by the shape of a path string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path '{path}' is invalid")]
    Invalid { path: String },

    #[error("path '{path}' contains invalid characters")]
    InvalidChars { path: String },

    #[error("path '{path}' contains back-references outside of filesystem")]
    IllegalBackReference { path: String },

    #[error("path '{path}' does not map to the local filesystem")]
    NoSysPath { path: String },

    #[error("path '{path}' has no '{purpose}' URL")]
    NoUrl { path: String, purpose: String },
}

/// What went wrong with a named resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceErrorKind {
    NotFound,
    Invalid,
    FileExpected,
    DirectoryExpected,
    FileExists,
    DirectoryExists,
    DirectoryNotEmpty,
    DestinationExists,
    Locked,
    ReadOnly,
}

/// An error associated with a specific resource.
///
/// The `path` is always in the coordinate space of the original caller;
/// delegation layers rewrite it with [`unwrap_errors`] as the error
/// propagates outward.
#[derive(Debug)]
pub struct ResourceError {
    pub kind: ResourceErrorKind,
    pub path: String,
    pub source: Option<io::Error>,
}

impl ResourceError {
    pub fn new(kind: ResourceErrorKind, path: &str) -> Self {
        ResourceError {
            kind,
            path: path.to_string(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: io::Error) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ResourceErrorKind::*;
        match self.kind {
            NotFound => write!(f, "resource '{}' not found", self.path),
            Invalid => write!(f, "resource '{}' is invalid for this operation", self.path),
            FileExpected => write!(f, "path '{}' should be a file", self.path),
            DirectoryExpected => write!(f, "path '{}' should be a directory", self.path),
            FileExists => write!(f, "resource '{}' exists", self.path),
            DirectoryExists => write!(f, "directory '{}' exists", self.path),
            DirectoryNotEmpty => write!(f, "directory '{}' is not empty", self.path),
            DestinationExists => write!(f, "destination '{}' exists", self.path),
            Locked => write!(f, "resource '{}' is locked", self.path),
            ReadOnly => write!(f, "resource '{}' is read only", self.path),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

/// Why an operation could not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationErrorKind {
    Failed,
    Unsupported,
    PermissionDenied,
    RemoteConnection,
    InsufficientStorage,
    Timeout,
    RemoveRoot,
    IllegalDestination,
}

/// A failed operation, with the path it failed on when one applies.
#[derive(Debug)]
pub struct OperationError {
    pub kind: OperationErrorKind,
    pub path: Option<String>,
    pub source: Option<io::Error>,
}

impl OperationError {
    pub fn new(kind: OperationErrorKind) -> Self {
        OperationError {
            kind,
            path: None,
            source: None,
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_source(mut self, source: io::Error) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use OperationErrorKind::*;
        match (self.kind, self.path.as_deref()) {
            (Failed, Some(path)) => write!(f, "operation failed on '{path}'"),
            (Failed, None) => write!(f, "operation failed"),
            (Unsupported, _) => write!(f, "not supported"),
            (PermissionDenied, Some(path)) => write!(f, "permission denied on '{path}'"),
            (PermissionDenied, None) => write!(f, "permission denied"),
            (RemoteConnection, _) => write!(f, "remote connection error"),
            (InsufficientStorage, _) => write!(f, "insufficient storage space"),
            (Timeout, _) => write!(f, "operation timed out"),
            (RemoveRoot, _) => write!(f, "root directory may not be removed"),
            (IllegalDestination, Some(path)) => write!(f, "'{path}' is not a legal destination"),
            (IllegalDestination, None) => write!(f, "not a legal destination"),
        }
    }
}

impl std::error::Error for OperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

/// Raised when a mount point overlaps an existing mount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mount point '{path}' overlaps an existing mount")]
pub struct MountError {
    pub path: String,
}

/// Rewrite the path of a propagating resource error to `path`.
///
/// Used at every delegation crossing (wrappers, sub-directory scopes, mount
/// routing) so the path reported always matches the caller's coordinate
/// space rather than the delegate's.
pub fn unwrap_errors<T>(result: FsResult<T>, path: &str) -> FsResult<T> {
    result.map_err(|err| match err {
        FsError::Resource(mut inner) => {
            inner.path = path.to_string();
            FsError::Resource(inner)
        }
        other => other,
    })
}

/// Lookup-table form of [`unwrap_errors`] for operations with more than one
/// path (copy, move): each `(inner, outer)` pair maps a delegate-visible
/// path back to the caller-visible one.
pub fn unwrap_errors_map<T>(result: FsResult<T>, mapping: &[(&str, &str)]) -> FsResult<T> {
    result.map_err(|err| match err {
        FsError::Resource(mut inner) => {
            if let Some((_, outer)) = mapping.iter().find(|(from, _)| *from == inner.path) {
                inner.path = outer.to_string();
            }
            FsError::Resource(inner)
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_interpolate_fields() {
        assert_eq!(
            FsError::not_found("/foo/bar").to_string(),
            "resource '/foo/bar' not found"
        );
        assert_eq!(
            FsError::read_only("/archive.txt").to_string(),
            "resource '/archive.txt' is read only"
        );
        assert_eq!(
            FsError::remove_root("/").to_string(),
            "root directory may not be removed"
        );
        let err = FsError::Path(PathError::NoUrl {
            path: "/a".to_string(),
            purpose: "download".to_string(),
        });
        assert_eq!(err.to_string(), "path '/a' has no 'download' URL");
    }

    #[test]
    fn unwrap_errors_rewrites_resource_paths() {
        let inner: FsResult<()> = Err(FsError::not_found("/inner/file.txt"));
        let outer = unwrap_errors(inner, "/file.txt");
        match outer {
            Err(FsError::Resource(err)) => {
                assert_eq!(err.kind, ResourceErrorKind::NotFound);
                assert_eq!(err.path, "/file.txt");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unwrap_errors_leaves_other_branches_alone() {
        let inner: FsResult<()> = Err(FsError::Closed);
        assert!(matches!(unwrap_errors(inner, "/x"), Err(FsError::Closed)));
    }

    #[test]
    fn unwrap_errors_map_uses_lookup_table() {
        let inner: FsResult<()> = Err(FsError::destination_exists("/sub/b.txt"));
        let outer = unwrap_errors_map(inner, &[("/sub/a.txt", "/a.txt"), ("/sub/b.txt", "/b.txt")]);
        match outer {
            Err(FsError::Resource(err)) => assert_eq!(err.path, "/b.txt"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn create_failed_keeps_cause() {
        let cause = io::Error::new(io::ErrorKind::InvalidData, "bad archive header");
        let err = FsError::create_failed(cause);
        assert_eq!(
            err.to_string(),
            "unable to create filesystem, bad archive header"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
