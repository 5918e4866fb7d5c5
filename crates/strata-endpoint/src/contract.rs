//! # Endpoint Contract
//!
//! The capability set every storage backend satisfies so a synchronizer can
//! drive them uniformly.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Endpoint contract                              │
//! │                                                                         │
//! │  READ                     WRITE                    OPTIONAL             │
//! │  ────                     ─────                    ────────             │
//! │  load_node                create_node              watch                │
//! │  walk                     update_node              compute_checksum     │
//! │  get_reader_on            delete_node (idempotent)                      │
//! │  endpoint_info            move_node                                     │
//! │                           get_writer_on (size > 0)                      │
//! │                                                                         │
//! │  Optional capabilities fail with EndpointError::Unsupported and are    │
//! │  advertised through capabilities().                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No operation here is transactional. A multi-step operation such as a move
//! that fails halfway leaves its intermediate state visible; reconciling it is
//! the synchronizer's job.

use async_trait::async_trait;
use strata_core::{EndpointInfo, EndpointOptions, Node};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::CallContext;
use crate::error::{EndpointError, EndpointResult};
use crate::stream::{NodeReader, NodeWriter};

// =============================================================================
// Options
// =============================================================================

/// Options for [`Endpoint::load_node`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Caller already knows the node kind (`Some(true)` for a leaf). Backends
    /// may use it to skip a lookup; it never changes the result.
    pub leaf_hint: Option<bool>,
}

impl LoadOptions {
    pub fn leaf() -> Self {
        LoadOptions {
            leaf_hint: Some(true),
        }
    }
}

/// Options for [`Endpoint::walk`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkOptions {
    /// Start paths, walked in order. Empty means the namespace root.
    pub roots: Vec<String>,
}

impl WalkOptions {
    /// Walks a single subtree.
    pub fn at(path: impl Into<String>) -> Self {
        WalkOptions {
            roots: vec![path.into()],
        }
    }

    /// Start paths with the namespace-root default applied.
    pub fn start_paths(&self) -> Vec<&str> {
        if self.roots.is_empty() {
            vec![""]
        } else {
            self.roots.iter().map(String::as_str).collect()
        }
    }
}

/// Callback invoked once per walked entry. An error aborts the walk.
pub type WalkFn<'a> = dyn FnMut(&str, Node) -> EndpointResult<()> + Send + 'a;

/// Optional capabilities a backend implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub watch: bool,
    pub checksum: bool,
}

// =============================================================================
// Watching
// =============================================================================

/// What happened to a watched node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Updated,
    Deleted,
    Moved { from: String },
}

/// One live change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub kind: WatchEventKind,
    /// Node state after the change (absent for deletions).
    pub node: Option<Node>,
}

/// Subscription to live changes below a path. Dropping it stops the watch.
#[derive(Debug)]
pub struct WatchHandle {
    events: mpsc::Receiver<WatchEvent>,
    stop: CancellationToken,
}

impl WatchHandle {
    pub fn new(events: mpsc::Receiver<WatchEvent>, stop: CancellationToken) -> Self {
        WatchHandle { events, stop }
    }

    /// Next change, or `None` once the watch is closed.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Stops the watch; pending events are still drained by `next`.
    pub fn close(&self) {
        self.stop.cancel();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

// =============================================================================
// Endpoint Trait
// =============================================================================

/// A storage backend exposed through the uniform contract.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Identity string and requirement flags for capability negotiation.
    fn endpoint_info(&self) -> EndpointInfo;

    /// Optional capabilities this backend implements.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Resolves a logical path to its current node.
    ///
    /// Fails with a not-found error when nothing exists at `path`.
    async fn load_node(&self, ctx: &CallContext, path: &str, opts: LoadOptions) -> EndpointResult<Node>;

    /// Visits every node below the start paths, in backend order.
    ///
    /// Hidden markers are skipped and every collection is reported with the
    /// recompute etag sentinel.
    async fn walk(&self, ctx: &CallContext, opts: &WalkOptions, visit: &mut WalkFn<'_>) -> EndpointResult<()>;

    /// Subscribes to live changes below `path`.
    async fn watch(&self, _ctx: &CallContext, _path: &str) -> EndpointResult<WatchHandle> {
        Err(EndpointError::Unsupported { operation: "watch" })
    }

    /// (Re)computes the content fingerprint of `node` in place.
    async fn compute_checksum(&self, _ctx: &CallContext, _node: &mut Node) -> EndpointResult<()> {
        Err(EndpointError::Unsupported {
            operation: "compute_checksum",
        })
    }

    /// Creates `node`. The identifier is cleared first; the backend assigns
    /// its own.
    async fn create_node(&self, ctx: &CallContext, node: &Node, update_if_exists: bool) -> EndpointResult<()>;

    /// Upserts `node`, keeping its identifier.
    async fn update_node(&self, ctx: &CallContext, node: &Node) -> EndpointResult<()>;

    /// Removes a leaf, or a collection and everything below it.
    ///
    /// Deleting a path that does not exist succeeds.
    async fn delete_node(&self, ctx: &CallContext, path: &str) -> EndpointResult<()>;

    /// Renames `old_path` to `new_path`. Fails if the source does not exist.
    async fn move_node(&self, ctx: &CallContext, old_path: &str, new_path: &str) -> EndpointResult<()>;

    /// Opens a streamed writer for `expected_size` bytes. Zero is refused.
    async fn get_writer_on(&self, ctx: &CallContext, path: &str, expected_size: u64) -> EndpointResult<NodeWriter>;

    /// Opens a streamed reader on a leaf.
    async fn get_reader_on(&self, ctx: &CallContext, path: &str) -> EndpointResult<NodeReader>;

    /// Walks and collects every visited node.
    async fn collect_nodes(&self, ctx: &CallContext, opts: &WalkOptions) -> EndpointResult<Vec<Node>> {
        let mut nodes = Vec::new();
        self.walk(ctx, opts, &mut |_path: &str, node: Node| {
            nodes.push(node);
            Ok(())
        })
        .await?;
        Ok(nodes)
    }
}

// =============================================================================
// Shared Guards
// =============================================================================

/// Refuses mutations on browse-only endpoints.
pub(crate) fn ensure_writable(options: &EndpointOptions, operation: &'static str) -> EndpointResult<()> {
    if options.browse_only {
        return Err(EndpointError::ReadOnly { operation });
    }
    Ok(())
}

/// Refuses zero-byte writes.
pub(crate) fn ensure_non_empty(path: &str, expected_size: u64) -> EndpointResult<()> {
    if expected_size == 0 {
        return Err(EndpointError::EmptyWrite {
            path: path.to_string(),
        });
    }
    Ok(())
}
