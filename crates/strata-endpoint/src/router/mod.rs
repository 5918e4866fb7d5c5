//! # Tree-Router Delegation
//!
//! The [`TreeRouter`] seam is the hierarchical tree service the router and
//! remote endpoints delegate to. It speaks absolute paths and only knows how
//! to delete leaves; [`RouterEndpoint`] layers rooting and recursive deletion
//! on top of it.
//!
//! ```text
//! ┌──────────────────┐   rooted paths    ┌──────────────────────────────┐
//! │  RouterEndpoint  │ ────────────────► │  dyn TreeRouter               │
//! │  (Endpoint impl) │ ◄──────────────── │  MemoryTreeRouter │ remote    │
//! └──────────────────┘  unrooted nodes   └──────────────────────────────┘
//! ```

pub mod adapter;
pub mod memory;

pub use adapter::{RouterEndpoint, RouterSettings};
pub use memory::MemoryTreeRouter;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use strata_core::Node;

use crate::context::ServiceContext;
use crate::error::EndpointResult;
use crate::stream::NodeReader;

/// Streamed listing response. Entries arrive in service order.
pub type NodeStream = BoxStream<'static, EndpointResult<Node>>;

/// Hierarchical tree service addressed by absolute paths.
///
/// Failures carry the service's status code in `EndpointError::Delegate`;
/// a missing path is reported with code 404.
#[async_trait]
pub trait TreeRouter: Send + Sync {
    /// Reads the node at `path`.
    async fn read_node(&self, ctx: &ServiceContext, path: &str) -> EndpointResult<Node>;

    /// Lists the children of `path`, or its whole subtree when `recursive`.
    /// The node at `path` itself is not part of the listing.
    async fn list_nodes(&self, ctx: &ServiceContext, path: &str, recursive: bool) -> EndpointResult<NodeStream>;

    /// Creates or updates `node`. An empty uuid lets the service assign one.
    async fn create_node(&self, ctx: &ServiceContext, node: Node) -> EndpointResult<()>;

    /// Moves `from` to the location of `to`.
    async fn update_node(&self, ctx: &ServiceContext, from: &Node, to: &Node) -> EndpointResult<()>;

    /// Deletes a leaf. Deleting a collection's hidden marker removes the
    /// collection itself.
    async fn delete_node(&self, ctx: &ServiceContext, node: &Node) -> EndpointResult<()>;

    /// Stores `size` bytes read from `reader` as the content of `node`.
    async fn put_object(&self, ctx: &ServiceContext, node: &Node, reader: NodeReader, size: u64) -> EndpointResult<u64>;

    /// Opens the content of `node`.
    async fn get_object(&self, ctx: &ServiceContext, node: &Node) -> EndpointResult<NodeReader>;
}
