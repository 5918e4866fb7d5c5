//! Closed set of endpoint variants returned by the factory.

use async_trait::async_trait;
use strata_core::{EndpointInfo, Node};

use crate::backends::{FsEndpoint, MemoryEndpoint, RemoteEndpoint, S3Endpoint};
use crate::context::CallContext;
use crate::contract::{Capabilities, Endpoint, LoadOptions, WalkFn, WalkOptions, WatchHandle};
use crate::error::EndpointResult;
use crate::router::RouterEndpoint;
use crate::stream::{NodeReader, NodeWriter};

/// Every backend the factory can build.
#[derive(Debug)]
pub enum AnyEndpoint {
    Fs(FsEndpoint),
    Memory(MemoryEndpoint),
    Router(RouterEndpoint),
    Remote(RemoteEndpoint),
    ObjectStore(S3Endpoint),
}

macro_rules! dispatch {
    ($self:ident, $ep:ident => $call:expr) => {
        match $self {
            AnyEndpoint::Fs($ep) => $call,
            AnyEndpoint::Memory($ep) => $call,
            AnyEndpoint::Router($ep) => $call,
            AnyEndpoint::Remote($ep) => $call,
            AnyEndpoint::ObjectStore($ep) => $call,
        }
    };
}

impl AnyEndpoint {
    /// URI scheme family of this variant.
    pub fn scheme(&self) -> &'static str {
        match self {
            AnyEndpoint::Fs(_) => "fs",
            AnyEndpoint::Memory(_) => "db",
            AnyEndpoint::Router(_) => "router",
            AnyEndpoint::Remote(_) => "http",
            AnyEndpoint::ObjectStore(_) => "s3",
        }
    }
}

#[async_trait]
impl Endpoint for AnyEndpoint {
    fn endpoint_info(&self) -> EndpointInfo {
        dispatch!(self, ep => ep.endpoint_info())
    }

    fn capabilities(&self) -> Capabilities {
        dispatch!(self, ep => ep.capabilities())
    }

    async fn load_node(&self, ctx: &CallContext, p: &str, opts: LoadOptions) -> EndpointResult<Node> {
        dispatch!(self, ep => ep.load_node(ctx, p, opts).await)
    }

    async fn walk(&self, ctx: &CallContext, opts: &WalkOptions, visit: &mut WalkFn<'_>) -> EndpointResult<()> {
        dispatch!(self, ep => ep.walk(ctx, opts, visit).await)
    }

    async fn watch(&self, ctx: &CallContext, p: &str) -> EndpointResult<WatchHandle> {
        dispatch!(self, ep => ep.watch(ctx, p).await)
    }

    async fn compute_checksum(&self, ctx: &CallContext, node: &mut Node) -> EndpointResult<()> {
        dispatch!(self, ep => ep.compute_checksum(ctx, node).await)
    }

    async fn create_node(&self, ctx: &CallContext, node: &Node, update_if_exists: bool) -> EndpointResult<()> {
        dispatch!(self, ep => ep.create_node(ctx, node, update_if_exists).await)
    }

    async fn update_node(&self, ctx: &CallContext, node: &Node) -> EndpointResult<()> {
        dispatch!(self, ep => ep.update_node(ctx, node).await)
    }

    async fn delete_node(&self, ctx: &CallContext, p: &str) -> EndpointResult<()> {
        dispatch!(self, ep => ep.delete_node(ctx, p).await)
    }

    async fn move_node(&self, ctx: &CallContext, old_path: &str, new_path: &str) -> EndpointResult<()> {
        dispatch!(self, ep => ep.move_node(ctx, old_path, new_path).await)
    }

    async fn get_writer_on(&self, ctx: &CallContext, p: &str, expected_size: u64) -> EndpointResult<NodeWriter> {
        dispatch!(self, ep => ep.get_writer_on(ctx, p, expected_size).await)
    }

    async fn get_reader_on(&self, ctx: &CallContext, p: &str) -> EndpointResult<NodeReader> {
        dispatch!(self, ep => ep.get_reader_on(ctx, p).await)
    }
}
