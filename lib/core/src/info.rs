//! Resource metadata.
//!
//! Metadata is partitioned into namespaces so backends only pay for what a
//! caller asked for: `basic` (always populated), `details`, `access`, and a
//! backend-specific raw namespace (an archive backend, for example, exposes
//! its raw entry header there). Reading an attribute whose namespace was not
//! requested, or which the backend cannot provide, fails with
//! [`FsError::MissingNamespace`].

use std::time::SystemTime;

use serde::Serialize;

use crate::errors::{FsError, FsResult};

bitflags::bitflags! {
    /// Selector for the metadata namespaces a query should populate.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Namespaces: u32 {
        /// Name and directory flag. Always populated.
        const BASIC = 1;
        /// Size, resource type and timestamps.
        const DETAILS = 1 << 1;
        /// Ownership and permission bits.
        const ACCESS = 1 << 2;
        /// The backend's own namespace (raw entry attributes).
        const RAW = 1 << 3;
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Namespaces::BASIC
    }
}

/// The kind of a filesystem resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceType {
    Unknown,
    Directory,
    File,
    Character,
    BlockSpecial,
    Fifo,
    Socket,
    Symlink,
}

/// The `details` namespace.
#[derive(Debug, Clone, Serialize)]
pub struct Details {
    pub resource_type: ResourceType,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
    pub created: Option<SystemTime>,
}

/// The `access` namespace. `mode` holds raw permission bits as reported by
/// the backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Access {
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub mode: Option<u32>,
}

/// A backend-specific namespace: its name plus an opaque payload.
#[derive(Debug, Clone, Serialize)]
pub struct RawNamespace {
    pub namespace: &'static str,
    pub value: serde_json::Value,
}

/// Metadata for one resource, created per query and owned by the caller.
///
/// Only the namespaces requested at query time are guaranteed populated.
#[derive(Debug, Clone, Serialize)]
pub struct Info {
    name: String,
    is_dir: bool,
    details: Option<Details>,
    access: Option<Access>,
    raw: Option<RawNamespace>,
}

impl Info {
    pub fn new(name: impl Into<String>, is_dir: bool) -> Self {
        Info {
            name: name.into(),
            is_dir,
            details: None,
            access: None,
            raw: None,
        }
    }

    pub fn with_details(mut self, details: Details) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = Some(access);
        self
    }

    pub fn with_raw(mut self, namespace: &'static str, value: serde_json::Value) -> Self {
        self.raw = Some(RawNamespace { namespace, value });
        self
    }

    /// The resource name (empty for a filesystem root).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    /// The `details` namespace, if it was requested and available.
    pub fn details(&self) -> FsResult<&Details> {
        self.details.as_ref().ok_or(FsError::MissingNamespace {
            namespace: "details",
        })
    }

    /// The `access` namespace, if it was requested and available.
    pub fn access(&self) -> FsResult<&Access> {
        self.access.as_ref().ok_or(FsError::MissingNamespace {
            namespace: "access",
        })
    }

    /// The backend-specific raw namespace, if requested and available.
    pub fn raw(&self) -> FsResult<&RawNamespace> {
        self.raw
            .as_ref()
            .ok_or(FsError::MissingNamespace { namespace: "raw" })
    }

    pub fn size(&self) -> FsResult<u64> {
        Ok(self.details()?.size)
    }

    pub fn resource_type(&self) -> FsResult<ResourceType> {
        Ok(self.details()?.resource_type)
    }

    pub fn modified(&self) -> FsResult<Option<SystemTime>> {
        Ok(self.details()?.modified)
    }
}

/// Static capability sheet reported by [`getmeta`](crate::FileSystem::getmeta).
#[derive(Debug, Clone, Serialize)]
pub struct FsMeta {
    pub case_insensitive: bool,
    pub invalid_path_chars: &'static str,
    pub network: bool,
    pub read_only: bool,
    pub supports_rename: bool,
    /// Whether this handle may be used from several threads concurrently.
    /// The effective safety of a composed stack is the minimum over its
    /// components.
    pub thread_safe: bool,
    pub unicode_paths: bool,
    pub is_virtual: bool,
}

impl Default for FsMeta {
    fn default() -> Self {
        FsMeta {
            case_insensitive: false,
            invalid_path_chars: "\0",
            network: false,
            read_only: false,
            supports_rename: false,
            thread_safe: false,
            unicode_paths: true,
            is_virtual: false,
        }
    }
}

/// Raw info accepted by [`setinfo`](crate::FileSystem::setinfo). Only the
/// detail timestamps are settable across backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetInfo {
    pub accessed: Option<SystemTime>,
    pub modified: Option<SystemTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_namespace_is_always_available() {
        let info = Info::new("file.txt", false);
        assert_eq!(info.name(), "file.txt");
        assert!(info.is_file());
        assert!(!info.is_dir());
    }

    #[test]
    fn missing_namespace_is_an_error() {
        let info = Info::new("file.txt", false);
        match info.size() {
            Err(FsError::MissingNamespace { namespace }) => assert_eq!(namespace, "details"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            info.access(),
            Err(FsError::MissingNamespace { namespace: "access" })
        ));
    }

    #[test]
    fn details_accessors() {
        let info = Info::new("file.txt", false).with_details(Details {
            resource_type: ResourceType::File,
            size: 42,
            modified: Some(SystemTime::UNIX_EPOCH),
            accessed: None,
            created: None,
        });
        assert_eq!(info.size().unwrap(), 42);
        assert_eq!(info.resource_type().unwrap(), ResourceType::File);
        assert_eq!(info.modified().unwrap(), Some(SystemTime::UNIX_EPOCH));
    }
}
