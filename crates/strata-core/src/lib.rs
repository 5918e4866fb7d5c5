//! # strata-core: Pure Types for the Strata Endpoint Layer
//!
//! This crate holds the data model every storage backend speaks. It has zero
//! I/O dependencies: nothing in here touches a disk, a socket or a runtime.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Strata Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Synchronizer (external, computes changesets)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Endpoint contract                      │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   strata-endpoint: fs │ db │ router │ http(s) │ s3               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ strata-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                  │   │
//! │  │   │   types   │  │   path    │  │   error   │                  │   │
//! │  │   │   Node    │  │  rooting  │  │ validation│                  │   │
//! │  │   │  Options  │  │  markers  │  │           │                  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • PURE FUNCTIONS                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - `Node`, `EndpointOptions`, `EndpointInfo`, credentials
//! - [`path`] - Slash-delimited path arithmetic and namespace rooting
//! - [`error`] - Validation errors
//!
//! ## Example Usage
//!
//! ```rust
//! use strata_core::path::NamespaceRoot;
//!
//! let root = NamespaceRoot::new("workspace/personal");
//! assert_eq!(root.rooted("docs/a.txt"), "workspace/personal/docs/a.txt");
//! assert_eq!(root.unrooted("workspace/personal/docs/a.txt"), "docs/a.txt");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod path;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::ValidationError;
pub use path::NamespaceRoot;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Reserved per-collection file name used for collection bookkeeping.
///
/// It is a real leaf in every backend, but it never shows up in logical
/// listings and it is created and deleted together with its collection.
pub const HIDDEN_MARKER: &str = ".strata";

/// Etag sentinel telling consumers to recompute the fingerprint themselves.
///
/// Every collection is reported with this value because collections have no
/// native content hash.
pub const ETAG_RECOMPUTE: &str = "-1";

/// Etag carried by leaves whose upload is still in flight.
pub const ETAG_TEMPORARY: &str = "temporary";

/// Identity injected into delegate calls when the caller supplies none.
pub const SYSTEM_IDENTITY: &str = "system";

/// Client identifier used for remote tree services when the URI has no `clientId`.
pub const DEFAULT_CLIENT_ID: &str = "strata-front";
