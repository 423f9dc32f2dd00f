//! OS error translation.
//!
//! This is the single boundary where `std::io` failures become the typed
//! taxonomy in [`crate::errors`]; backends must not duplicate the mapping at
//! call sites. The key is `io::ErrorKind`, the portable normalized form of
//! the platform error code, with a directory-context table layered over the
//! file-context one and a single platform-specific raw code kept for the
//! Windows sharing violation.

use std::io;

use tracing::trace;

use crate::errors::{
    FsError, OperationError, OperationErrorKind, PathError, ResourceError, ResourceErrorKind,
};

/// Translate a raised `io::Error` into the typed taxonomy.
///
/// `op` names the operation for diagnostics; `path` is attached to the
/// produced error; `directory` selects the directory-context overrides
/// ("not a directory" → `DirectoryExpected`, "exists" → `DirectoryExists`,
/// "invalid input" → `DirectoryExpected`).
pub fn convert_os_errors(op: &str, path: &str, directory: bool, err: io::Error) -> FsError {
    use io::ErrorKind;

    trace!(op, path, directory, error = %err, "translating os error");

    #[cfg(windows)]
    {
        // ERROR_SHARING_VIOLATION: the file is open in another process.
        if err.raw_os_error() == Some(32) {
            return ResourceError::new(ResourceErrorKind::Locked, path)
                .with_source(err)
                .into();
        }
    }

    let resource = |kind: ResourceErrorKind, err: io::Error| -> FsError {
        ResourceError::new(kind, path).with_source(err).into()
    };
    let operation = |kind: OperationErrorKind, err: io::Error| -> FsError {
        OperationError::new(kind)
            .with_path(path)
            .with_source(err)
            .into()
    };

    match err.kind() {
        ErrorKind::NotFound => resource(ResourceErrorKind::NotFound, err),
        ErrorKind::NotADirectory if directory => {
            resource(ResourceErrorKind::DirectoryExpected, err)
        }
        // In file context a missing directory component reads as a missing
        // resource.
        ErrorKind::NotADirectory => resource(ResourceErrorKind::NotFound, err),
        ErrorKind::IsADirectory => resource(ResourceErrorKind::FileExpected, err),
        ErrorKind::AlreadyExists if directory => {
            resource(ResourceErrorKind::DirectoryExists, err)
        }
        ErrorKind::AlreadyExists => resource(ResourceErrorKind::FileExists, err),
        ErrorKind::DirectoryNotEmpty => resource(ResourceErrorKind::DirectoryNotEmpty, err),
        ErrorKind::InvalidInput if directory => {
            resource(ResourceErrorKind::DirectoryExpected, err)
        }
        ErrorKind::InvalidInput => resource(ResourceErrorKind::FileExpected, err),
        ErrorKind::ReadOnlyFilesystem => resource(ResourceErrorKind::ReadOnly, err),
        ErrorKind::InvalidFilename => PathError::Invalid {
            path: path.to_string(),
        }
        .into(),
        ErrorKind::PermissionDenied => operation(OperationErrorKind::PermissionDenied, err),
        ErrorKind::StorageFull => operation(OperationErrorKind::InsufficientStorage, err),
        ErrorKind::NetworkDown | ErrorKind::ConnectionReset => {
            operation(OperationErrorKind::RemoteConnection, err)
        }
        ErrorKind::TimedOut => operation(OperationErrorKind::Timeout, err),
        ErrorKind::Unsupported => operation(OperationErrorKind::Unsupported, err),
        _ => operation(OperationErrorKind::Failed, err),
    }
}

/// Result form of [`convert_os_errors`], for wrapping a backend call site.
pub fn convert_os_result<T>(
    result: io::Result<T>,
    op: &str,
    path: &str,
    directory: bool,
) -> crate::FsResult<T> {
    result.map_err(|err| convert_os_errors(op, path, directory, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn not_found_translates_with_path_and_cause() {
        let cause = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let err = convert_os_errors("stat", "/tmp/test", false, cause);
        match err {
            FsError::Resource(err) => {
                assert_eq!(err.kind, ResourceErrorKind::NotFound);
                assert_eq!(err.path, "/tmp/test");
                assert!(err.source().is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn name_too_long_is_a_path_error() {
        let cause = io::Error::new(io::ErrorKind::InvalidFilename, "file name too long");
        let err = convert_os_errors("stat", "/tmp/test", false, cause);
        assert!(matches!(
            err,
            FsError::Path(PathError::Invalid { ref path }) if path == "/tmp/test"
        ));
    }

    #[test]
    fn directory_context_overrides() {
        let exists = io::Error::new(io::ErrorKind::AlreadyExists, "exists");
        match convert_os_errors("makedir", "/d", true, exists) {
            FsError::Resource(err) => assert_eq!(err.kind, ResourceErrorKind::DirectoryExists),
            other => panic!("unexpected: {other:?}"),
        }

        let not_dir = io::Error::new(io::ErrorKind::NotADirectory, "not a directory");
        match convert_os_errors("listdir", "/d", true, not_dir) {
            FsError::Resource(err) => assert_eq!(err.kind, ResourceErrorKind::DirectoryExpected),
            other => panic!("unexpected: {other:?}"),
        }

        // Same kind in file context reads as a missing resource.
        let not_dir = io::Error::new(io::ErrorKind::NotADirectory, "not a directory");
        match convert_os_errors("open", "/d/f", false, not_dir) {
            FsError::Resource(err) => assert_eq!(err.kind, ResourceErrorKind::NotFound),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_kinds_become_operation_failed() {
        let cause = io::Error::new(io::ErrorKind::Interrupted, "interrupted");
        match convert_os_errors("lock", "/f", false, cause) {
            FsError::Operation(err) => {
                assert_eq!(err.kind, OperationErrorKind::Failed);
                assert!(err.source.is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
