//! # strata-endpoint: Uniform Access to Heterogeneous Storage
//!
//! One capability contract ([`Endpoint`]) implemented by every storage
//! backend, the factory that turns a connection URI into a backend, and the
//! adapter that exposes a hierarchical tree service through the contract.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        strata-endpoint                                  │
//! │                                                                         │
//! │   "s3://key:secret@host/bucket/prefix"                                  │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │   ┌─────────────────────────┐                                           │
//! │   │     EndpointFactory     │  parse, validate, dispatch on scheme      │
//! │   └────────────┬────────────┘                                           │
//! │                ▼                                                        │
//! │   ┌─────────────────────────────────────────────────────────────────┐   │
//! │   │  AnyEndpoint (closed variant set, implements Endpoint)          │   │
//! │   │                                                                 │   │
//! │   │   Fs         Memory      Router           Remote      S3        │   │
//! │   │   ─────────  ─────────   ──────────────   ──────────  ───────   │   │
//! │   │   tokio::fs  BTreeMap    dyn TreeRouter   Router      dyn       │   │
//! │   │   walkdir    broadcast   rooting          endpoint    Object    │   │
//! │   │              watch       recursive del.   as user     Store     │   │
//! │   └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │   Every call takes a CallContext (identity + cancellation).             │
//! │   Streamed writes report their outcome through NodeWriter::finish.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use strata_endpoint::{CallContext, Endpoint, EndpointFactory, ResolveOptions, WalkOptions};
//!
//! # async fn run() -> strata_endpoint::EndpointResult<()> {
//! let factory = EndpointFactory::default();
//! let endpoint = factory.resolve("db://", &ResolveOptions::default())?;
//! let nodes = endpoint.collect_nodes(&CallContext::new(), &WalkOptions::default()).await?;
//! println!("{} nodes", nodes.len());
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod any;
pub mod backends;
pub mod context;
pub mod contract;
pub mod error;
pub mod factory;
pub mod router;
pub mod stream;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use any::AnyEndpoint;
pub use context::{CallContext, ServiceContext};
pub use contract::{Capabilities, Endpoint, LoadOptions, WalkFn, WalkOptions, WatchEvent, WatchEventKind, WatchHandle};
pub use error::{EndpointError, EndpointResult};
pub use factory::{EndpointFactory, FactorySettings, ResolveOptions};
pub use router::{MemoryTreeRouter, NodeStream, RouterEndpoint, RouterSettings, TreeRouter};
pub use stream::{NodeReader, NodeWriter, DEFAULT_WRITER_BUFFER};
