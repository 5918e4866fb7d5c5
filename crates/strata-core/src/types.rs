//! # Domain Types
//!
//! Core types used by every endpoint backend.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Node       │   │ EndpointOptions │   │  EndpointInfo   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  path           │   │  browse_only    │   │  uri            │       │
//! │  │  uuid           │   │  normalization  │   │  normalization  │       │
//! │  │  etag           │   │  folders rescan │   │  folders rescan │       │
//! │  │  kind           │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  RemoteConfig   │   │ObjectStoreConfig│   │    Identity     │       │
//! │  │  url, user      │   │  host, keys     │   │  acting user    │       │
//! │  │  client id/sec  │   │  bucket, prefix │   │  for delegates  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nodes are transient: every backend builds them fresh on each call and
//! nothing in this layer caches them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::path;
use crate::{ETAG_RECOMPUTE, ETAG_TEMPORARY, SYSTEM_IDENTITY};

// =============================================================================
// Node
// =============================================================================

/// File-like versus directory-like node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// File-like node carrying content.
    #[default]
    Leaf,
    /// Directory-like node grouping other nodes.
    Collection,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Leaf => write!(f, "leaf"),
            NodeKind::Collection => write!(f, "collection"),
        }
    }
}

/// One entry of an endpoint's logical namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Node {
    /// Slash-delimited path, unique within one namespace.
    pub path: String,

    /// Stable identifier assigned by the backend ("" when unknown).
    #[serde(default)]
    pub uuid: String,

    /// Opaque content fingerprint.
    #[serde(default)]
    pub etag: String,

    /// Leaf or collection.
    pub kind: NodeKind,

    /// Content size in bytes (0 for collections).
    #[serde(default)]
    pub size: u64,

    /// Last modification time, when the backend knows it.
    #[serde(default)]
    pub mtime: Option<DateTime<Utc>>,

    /// Free-form backend metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl Node {
    /// Creates a leaf node at `path`.
    pub fn leaf(path: impl Into<String>) -> Self {
        Node {
            path: path.into(),
            kind: NodeKind::Leaf,
            ..Default::default()
        }
    }

    /// Creates a collection node at `path`.
    pub fn collection(path: impl Into<String>) -> Self {
        Node {
            path: path.into(),
            kind: NodeKind::Collection,
            etag: ETAG_RECOMPUTE.to_string(),
            ..Default::default()
        }
    }

    /// Sets the identifier.
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    /// Sets the etag.
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = etag.into();
        self
    }

    /// Sets the size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Sets the modification time.
    pub fn with_mtime(mut self, mtime: DateTime<Utc>) -> Self {
        self.mtime = Some(mtime);
        self
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    #[inline]
    pub fn is_collection(&self) -> bool {
        self.kind == NodeKind::Collection
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        path::base_name(&self.path)
    }

    /// True when this node is a collection's hidden marker leaf.
    pub fn is_hidden_marker(&self) -> bool {
        path::is_hidden_marker(&self.path)
    }

    /// True when the node is an upload still in flight.
    pub fn has_temporary_etag(&self) -> bool {
        self.etag == ETAG_TEMPORARY
    }

    /// Forces consumers to recompute this node's fingerprint.
    pub fn invalidate_etag(&mut self) {
        self.etag = ETAG_RECOMPUTE.to_string();
    }
}

// =============================================================================
// Endpoint Options & Info
// =============================================================================

/// Construction-time options of an endpoint. Immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndpointOptions {
    /// Disables every mutating operation.
    #[serde(default)]
    pub browse_only: bool,

    /// Names must be unicode-normalized before comparison.
    #[serde(default)]
    pub requires_normalization: bool,

    /// Folder signatures must be rescanned after changes.
    #[serde(default)]
    pub requires_folders_rescan: bool,
}

impl EndpointOptions {
    /// Options of a browse-only endpoint.
    pub fn browse_only() -> Self {
        EndpointOptions {
            browse_only: true,
            ..Default::default()
        }
    }
}

/// Identity and requirement flags exposed for capability negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// URI-shaped identity string, e.g. `router://ws/personal`.
    pub uri: String,
    pub requires_normalization: bool,
    pub requires_folders_rescan: bool,
}

impl EndpointInfo {
    /// Info with both requirement flags off.
    pub fn plain(uri: impl Into<String>) -> Self {
        EndpointInfo {
            uri: uri.into(),
            requires_normalization: false,
            requires_folders_rescan: false,
        }
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Identity under which a delegate call is performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// A named user identity.
    pub fn user(name: impl Into<String>) -> Self {
        Identity(name.into())
    }

    /// The fixed system identity.
    pub fn system() -> Self {
        Identity(SYSTEM_IDENTITY.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_IDENTITY
    }
}

impl Default for Identity {
    fn default() -> Self {
        Identity::system()
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Remote Tree-Service Credentials
// =============================================================================

/// Credentials for a remote tree service. Built once per endpoint, never
/// mutated.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// `scheme://host[:port]` of the service.
    pub url: String,
    pub user: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
}

impl RemoteConfig {
    /// Checks that every mandatory field is present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::required("url"));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ValidationError::invalid_value("url", "must be an http(s) address"));
        }
        if self.user.is_empty() {
            return Err(ValidationError::required("user"));
        }
        if self.client_id.is_empty() {
            return Err(ValidationError::required("client_id"));
        }
        if self.client_secret.is_empty() {
            return Err(ValidationError::required("client_secret"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Object Storage Credentials
// =============================================================================

/// Connection parameters for an object-storage endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// `host[:port]` of the storage service.
    pub host: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// Key prefix all logical paths live under ("" for the bucket root).
    #[serde(default)]
    pub root_prefix: String,
    /// Server expects unicode-normalized names.
    #[serde(default)]
    pub normalize: bool,
}

impl ObjectStoreConfig {
    /// Checks that every mandatory field is present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::required("host"));
        }
        if self.access_key.is_empty() {
            return Err(ValidationError::required("access_key"));
        }
        if self.bucket.is_empty() {
            return Err(ValidationError::required("bucket"));
        }
        path::ensure_contained(&self.root_prefix)
    }
}

impl std::fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("host", &self.host)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("root_prefix", &self.root_prefix)
            .field("normalize", &self.normalize)
            .finish()
    }
}
