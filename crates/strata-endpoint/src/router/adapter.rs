//! # Router Endpoint
//!
//! Endpoint contract over a [`TreeRouter`], rooted at a configured prefix.
//!
//! ## Recursive Delete
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     delete_node("docs")                                 │
//! │                                                                         │
//! │  read_node(root/docs) ── 404 ──► Ok (already gone)                      │
//! │         │                                                               │
//! │         ├── leaf ──────────────► delete_node(leaf)                      │
//! │         │                                                               │
//! │         └── collection                                                  │
//! │               list_nodes(root/docs, recursive)                          │
//! │               for child in listing order:                               │
//! │                  marker        → skipped                                │
//! │                  collection    → delete child/.strata                   │
//! │                  leaf          → delete child                           │
//! │                  first error   → return it, stop                        │
//! │               delete root/docs/.strata   (last)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Children are deleted one at a time. The delegate is not assumed to
//! tolerate concurrent deletes under one collection.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use strata_core::{path, EndpointInfo, EndpointOptions, Identity, NamespaceRoot, Node, NodeKind};
use tracing::{debug, error, info};

use super::TreeRouter;
use crate::context::{CallContext, ServiceContext};
use crate::contract::{ensure_non_empty, ensure_writable, Endpoint, LoadOptions, WalkFn, WalkOptions};
use crate::error::{EndpointError, EndpointResult};
use crate::stream::{NodeReader, NodeWriter, DEFAULT_WRITER_BUFFER};

// =============================================================================
// Settings
// =============================================================================

/// Construction-time settings of a [`RouterEndpoint`].
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub options: EndpointOptions,

    /// Clear collection identifiers on update so two trees served by the
    /// same service never share folder ids.
    pub renew_folder_ids: bool,

    /// Identity used when the caller's context carries none.
    pub identity: Identity,

    /// Pipe capacity of streamed writes.
    pub writer_buffer: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        RouterSettings {
            options: EndpointOptions::default(),
            renew_folder_ids: false,
            identity: Identity::system(),
            writer_buffer: DEFAULT_WRITER_BUFFER,
        }
    }
}

// =============================================================================
// Router Endpoint
// =============================================================================

/// Endpoint delegating every call to a tree service.
pub struct RouterEndpoint {
    router: Arc<dyn TreeRouter>,
    root: NamespaceRoot,
    settings: RouterSettings,
    info_uri: String,
}

impl RouterEndpoint {
    /// Creates an endpoint whose logical namespace starts at `root`.
    pub fn new(router: Arc<dyn TreeRouter>, root: &str, settings: RouterSettings) -> Self {
        let root = NamespaceRoot::new(root);
        let info_uri = format!("router://{}", root);
        RouterEndpoint {
            router,
            root,
            settings,
            info_uri,
        }
    }

    /// Overrides the identity string reported by `endpoint_info`.
    pub fn with_info_uri(mut self, uri: impl Into<String>) -> Self {
        self.info_uri = uri.into();
        self
    }

    pub fn root(&self) -> &NamespaceRoot {
        &self.root
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    fn service_ctx(&self, ctx: &CallContext) -> ServiceContext {
        ctx.resolve(&self.settings.identity)
    }

    /// Deletes one leaf found while emptying a collection.
    async fn delete_child(&self, svc: &ServiceContext, mut child: Node) -> EndpointResult<()> {
        if child.is_collection() {
            child.path = path::marker_path(&child.path);
            child.kind = NodeKind::Leaf;
        }
        debug!(path = %child.path, "Deleting child");
        svc.run(self.router.delete_node(svc, &child)).await.map_err(|e| {
            error!(path = %child.path, error = %e, "Failed to delete child, aborting");
            e
        })
    }
}

impl std::fmt::Debug for RouterEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterEndpoint")
            .field("root", &self.root)
            .field("settings", &self.settings)
            .field("info_uri", &self.info_uri)
            .finish()
    }
}

#[async_trait]
impl Endpoint for RouterEndpoint {
    fn endpoint_info(&self) -> EndpointInfo {
        EndpointInfo {
            uri: self.info_uri.clone(),
            requires_normalization: self.settings.options.requires_normalization,
            requires_folders_rescan: self.settings.options.requires_folders_rescan,
        }
    }

    async fn load_node(&self, ctx: &CallContext, p: &str, _opts: LoadOptions) -> EndpointResult<Node> {
        let svc = self.service_ctx(ctx);
        let mut node = svc.run(self.router.read_node(&svc, &self.root.rooted(p))).await?;
        node.path = self.root.unrooted(&node.path);
        Ok(node)
    }

    async fn walk(&self, ctx: &CallContext, opts: &WalkOptions, visit: &mut WalkFn<'_>) -> EndpointResult<()> {
        let svc = self.service_ctx(ctx);
        for start in opts.start_paths() {
            let rooted = self.root.rooted(start);
            info!(path = %rooted, "Walking router");

            let mut listing = svc.run(self.router.list_nodes(&svc, &rooted, true)).await?;
            while let Some(item) = listing.next().await {
                if svc.cancel.is_cancelled() {
                    return Err(EndpointError::Cancelled);
                }
                let mut node = item?;
                if node.has_temporary_etag() || node.is_hidden_marker() {
                    continue;
                }
                node.path = self.root.unrooted(&node.path);
                if node.is_collection() {
                    node.invalidate_etag();
                }
                let logical = node.path.clone();
                visit(&logical, node)?;
            }
        }
        Ok(())
    }

    /// The delegate upserts, so `update_if_exists` is always honored.
    async fn create_node(&self, ctx: &CallContext, node: &Node, _update_if_exists: bool) -> EndpointResult<()> {
        ensure_writable(&self.settings.options, "create")?;
        let svc = self.service_ctx(ctx);
        let mut n = node.clone();
        n.path = self.root.rooted(&n.path);
        n.uuid.clear();
        svc.run(self.router.create_node(&svc, n)).await
    }

    async fn update_node(&self, ctx: &CallContext, node: &Node) -> EndpointResult<()> {
        ensure_writable(&self.settings.options, "update")?;
        let svc = self.service_ctx(ctx);
        let mut n = node.clone();
        n.path = self.root.rooted(&n.path);
        if self.settings.renew_folder_ids && n.is_collection() {
            n.uuid.clear();
        }
        svc.run(self.router.create_node(&svc, n)).await
    }

    async fn delete_node(&self, ctx: &CallContext, p: &str) -> EndpointResult<()> {
        ensure_writable(&self.settings.options, "delete")?;
        let svc = self.service_ctx(ctx);
        let rooted = self.root.rooted(p);

        let node = match svc.run(self.router.read_node(&svc, &rooted)).await {
            Ok(node) => node,
            Err(e) if e.is_not_found() => {
                debug!(path = %rooted, "Node already absent, nothing to delete");
                return Ok(());
            }
            Err(e) => {
                error!(path = %rooted, error = %e, "Cannot resolve node to delete");
                return Err(e);
            }
        };

        if node.is_leaf() {
            info!(path = %node.path, "Deleting leaf");
            return svc.run(self.router.delete_node(&svc, &node)).await;
        }

        info!(path = %node.path, "Deleting collection");
        let marker = path::marker_path(&node.path);
        let mut children = svc.run(self.router.list_nodes(&svc, &node.path, true)).await?;
        while let Some(item) = children.next().await {
            let child = item?;
            if child.is_hidden_marker() {
                continue;
            }
            self.delete_child(&svc, child).await?;
        }

        info!(path = %marker, "Deleting collection marker");
        svc.run(self.router.delete_node(&svc, &Node::leaf(marker))).await
    }

    async fn move_node(&self, ctx: &CallContext, old_path: &str, new_path: &str) -> EndpointResult<()> {
        ensure_writable(&self.settings.options, "move")?;
        let mut from = self.load_node(ctx, old_path, LoadOptions::default()).await?;
        let mut to = from.clone();
        to.path = self.root.rooted(new_path);
        from.path = self.root.rooted(&from.path);

        let svc = self.service_ctx(ctx);
        svc.run(self.router.update_node(&svc, &from, &to)).await
    }

    async fn get_writer_on(&self, ctx: &CallContext, p: &str, expected_size: u64) -> EndpointResult<NodeWriter> {
        ensure_non_empty(p, expected_size)?;
        ensure_writable(&self.settings.options, "write")?;
        if path::is_hidden_marker(p) {
            return Ok(NodeWriter::discard(p));
        }

        let svc = self.service_ctx(ctx);
        let router = Arc::clone(&self.router);
        let target = Node::leaf(self.root.rooted(p));
        let cancel = svc.cancel.clone();
        Ok(NodeWriter::spawn(p, self.settings.writer_buffer, cancel, move |reader| async move {
            router
                .put_object(&svc, &target, reader, expected_size)
                .await
                .map(|_| ())
        }))
    }

    async fn get_reader_on(&self, ctx: &CallContext, p: &str) -> EndpointResult<NodeReader> {
        let svc = self.service_ctx(ctx);
        let target = Node::leaf(self.root.rooted(p));
        svc.run(self.router.get_object(&svc, &target)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{MemoryTreeRouter, NodeStream};
    use parking_lot::Mutex;
    use strata_core::{ETAG_RECOMPUTE, ETAG_TEMPORARY};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Wraps the memory router, recording deletes and failing on demand.
    #[derive(Default)]
    struct RecordingRouter {
        inner: MemoryTreeRouter,
        deletes: Mutex<Vec<String>>,
        fail_delete_on: Option<String>,
    }

    #[async_trait]
    impl TreeRouter for RecordingRouter {
        async fn read_node(&self, ctx: &ServiceContext, p: &str) -> EndpointResult<Node> {
            self.inner.read_node(ctx, p).await
        }

        async fn list_nodes(&self, ctx: &ServiceContext, p: &str, recursive: bool) -> EndpointResult<NodeStream> {
            self.inner.list_nodes(ctx, p, recursive).await
        }

        async fn create_node(&self, ctx: &ServiceContext, node: Node) -> EndpointResult<()> {
            self.inner.create_node(ctx, node).await
        }

        async fn update_node(&self, ctx: &ServiceContext, from: &Node, to: &Node) -> EndpointResult<()> {
            self.inner.update_node(ctx, from, to).await
        }

        async fn delete_node(&self, ctx: &ServiceContext, node: &Node) -> EndpointResult<()> {
            self.deletes.lock().push(node.path.clone());
            if self.fail_delete_on.as_deref() == Some(node.path.as_str()) {
                return Err(EndpointError::delegate(500, "disk on fire"));
            }
            self.inner.delete_node(ctx, node).await
        }

        async fn put_object(&self, ctx: &ServiceContext, node: &Node, reader: NodeReader, size: u64) -> EndpointResult<u64> {
            self.inner.put_object(ctx, node, reader, size).await
        }

        async fn get_object(&self, ctx: &ServiceContext, node: &Node) -> EndpointResult<NodeReader> {
            self.inner.get_object(ctx, node).await
        }
    }

    async fn seeded(router: RecordingRouter) -> (Arc<RecordingRouter>, RouterEndpoint) {
        let ctx = ServiceContext::system();
        router.inner.create_node(&ctx, Node::collection("ws")).await.unwrap();
        router.inner.create_node(&ctx, Node::collection("ws/docs").with_etag("abc")).await.unwrap();
        router.inner.create_node(&ctx, Node::leaf("ws/docs/a.txt")).await.unwrap();
        router.inner.create_node(&ctx, Node::collection("ws/docs/sub")).await.unwrap();
        router.inner.create_node(&ctx, Node::leaf("ws/docs/sub/b.txt")).await.unwrap();

        let router = Arc::new(router);
        let endpoint = RouterEndpoint::new(router.clone(), "/ws", RouterSettings::default());
        (router, endpoint)
    }

    #[tokio::test]
    async fn test_load_node_is_unrooted() {
        let (_, endpoint) = seeded(RecordingRouter::default()).await;
        let node = endpoint
            .load_node(&CallContext::new(), "docs/a.txt", LoadOptions::leaf())
            .await
            .unwrap();
        assert_eq!(node.path, "docs/a.txt");
        assert_eq!(endpoint.endpoint_info().uri, "router://ws");
    }

    #[tokio::test]
    async fn test_walk_filters_and_invalidates_collections() {
        let (router, endpoint) = seeded(RecordingRouter::default()).await;
        router
            .inner
            .create_node(&ServiceContext::system(), Node::leaf("ws/upload.part").with_etag(ETAG_TEMPORARY))
            .await
            .unwrap();

        let nodes = endpoint
            .collect_nodes(&CallContext::new(), &WalkOptions::default())
            .await
            .unwrap();
        let paths: Vec<&str> = nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["docs", "docs/a.txt", "docs/sub", "docs/sub/b.txt"]);
        assert!(nodes
            .iter()
            .filter(|n| n.is_collection())
            .all(|n| n.etag == ETAG_RECOMPUTE));
    }

    #[tokio::test]
    async fn test_absolute_root_behaves_like_relative_root() {
        let router = Arc::new(MemoryTreeRouter::new());
        let svc = ServiceContext::system();
        router.create_node(&svc, Node::collection("ws")).await.unwrap();
        router.create_node(&svc, Node::leaf("ws/a.txt")).await.unwrap();

        let endpoint = RouterEndpoint::new(router.clone(), "/ws", RouterSettings::default());
        assert_eq!(endpoint.root().as_str(), "ws");
        assert_eq!(endpoint.endpoint_info().uri, "router://ws");

        let ctx = CallContext::new();
        let node = endpoint.load_node(&ctx, "a.txt", LoadOptions::leaf()).await.unwrap();
        assert_eq!(node.path, "a.txt");

        let nodes = endpoint.collect_nodes(&ctx, &WalkOptions::default()).await.unwrap();
        let paths: Vec<&str> = nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_factory_resolved_endpoint_load_walk_delete() {
        use crate::factory::{EndpointFactory, FactorySettings, ResolveOptions};

        let router = Arc::new(RecordingRouter::default());
        let svc = ServiceContext::system();
        for node in [
            Node::collection("ws"),
            Node::collection("ws/personal"),
            Node::collection("ws/personal/docs"),
            Node::leaf("ws/personal/docs/a.txt"),
            Node::leaf("ws/personal/docs/b.txt"),
            Node::leaf("ws/other.txt"),
        ] {
            router.inner.create_node(&svc, node).await.unwrap();
        }

        let factory = EndpointFactory::new(FactorySettings::default()).with_router(router.clone());
        let endpoint = factory
            .resolve("router:///ws/personal", &ResolveOptions::default())
            .unwrap();
        assert_eq!(endpoint.endpoint_info().uri, "router://ws/personal");

        let ctx = CallContext::new();
        let node = endpoint.load_node(&ctx, "docs/b.txt", LoadOptions::leaf()).await.unwrap();
        assert_eq!(node.path, "docs/b.txt");

        let nodes = endpoint.collect_nodes(&ctx, &WalkOptions::default()).await.unwrap();
        let paths: Vec<&str> = nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["docs", "docs/a.txt", "docs/b.txt"]);

        endpoint.delete_node(&ctx, "docs").await.unwrap();
        assert_eq!(
            *router.deletes.lock(),
            vec![
                "ws/personal/docs/a.txt",
                "ws/personal/docs/b.txt",
                "ws/personal/docs/.strata",
            ]
        );
        assert!(!router.inner.contains("ws/personal/docs"));
        assert!(router.inner.contains("ws/other.txt"));
    }

    #[tokio::test]
    async fn test_walk_callback_error_aborts() {
        let (_, endpoint) = seeded(RecordingRouter::default()).await;
        let mut seen = 0;
        let result = endpoint
            .walk(&CallContext::new(), &WalkOptions::at("docs"), &mut |_p: &str, _n: Node| {
                seen += 1;
                Err(EndpointError::Internal("stop".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_idempotent() {
        let (router, endpoint) = seeded(RecordingRouter::default()).await;
        let ctx = CallContext::new();
        endpoint.delete_node(&ctx, "never/existed").await.unwrap();
        endpoint.delete_node(&ctx, "docs/a.txt").await.unwrap();
        endpoint.delete_node(&ctx, "docs/a.txt").await.unwrap();
        assert_eq!(*router.deletes.lock(), vec!["ws/docs/a.txt"]);
    }

    #[tokio::test]
    async fn test_delete_collection_in_listing_order_marker_last() {
        let (router, endpoint) = seeded(RecordingRouter::default()).await;
        endpoint.delete_node(&CallContext::new(), "docs").await.unwrap();

        assert_eq!(
            *router.deletes.lock(),
            vec![
                "ws/docs/a.txt",
                "ws/docs/sub/.strata",
                "ws/docs/sub/b.txt",
                "ws/docs/.strata",
            ]
        );
        assert!(!router.inner.contains("ws/docs"));
        assert!(router.inner.contains("ws"));
    }

    #[tokio::test]
    async fn test_delete_aborts_on_first_child_failure() {
        let failing = RecordingRouter {
            fail_delete_on: Some("ws/docs/sub/.strata".into()),
            ..Default::default()
        };
        let (router, endpoint) = seeded(failing).await;
        let err = endpoint.delete_node(&CallContext::new(), "docs").await.unwrap_err();

        assert!(matches!(err, EndpointError::Delegate { code: Some(500), .. }));
        assert_eq!(
            *router.deletes.lock(),
            vec!["ws/docs/a.txt", "ws/docs/sub/.strata"]
        );
        assert!(router.inner.contains("ws/docs/.strata"));
    }

    #[tokio::test]
    async fn test_zero_size_writer_rejected_everywhere() {
        let (_, endpoint) = seeded(RecordingRouter::default()).await;
        let ctx = CallContext::new();
        for p in ["a.txt", "docs/.strata", ""] {
            let err = endpoint.get_writer_on(&ctx, p, 0).await.unwrap_err();
            assert!(matches!(err, EndpointError::EmptyWrite { .. }));
        }
    }

    #[tokio::test]
    async fn test_marker_writer_discards() {
        let (router, endpoint) = seeded(RecordingRouter::default()).await;
        let mut writer = endpoint
            .get_writer_on(&CallContext::new(), "new/.strata", 4)
            .await
            .unwrap();
        assert!(writer.is_discard());
        writer.write_all(b"uuid").await.unwrap();
        writer.finish().await.unwrap();
        assert!(!router.inner.contains("ws/new/.strata"));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (_, endpoint) = seeded(RecordingRouter::default()).await;
        let ctx = CallContext::new();
        let mut writer = endpoint.get_writer_on(&ctx, "docs/c.txt", 5).await.unwrap();
        writer.write_all(b"hello").await.unwrap();
        writer.finish().await.unwrap();

        let mut data = Vec::new();
        endpoint
            .get_reader_on(&ctx, "docs/c.txt")
            .await
            .unwrap()
            .read_to_end(&mut data)
            .await
            .unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_writer_surfaces_delegate_failure() {
        let (_, endpoint) = seeded(RecordingRouter::default()).await;
        let mut writer = endpoint
            .get_writer_on(&CallContext::new(), "docs/short.txt", 10)
            .await
            .unwrap();
        writer.write_all(b"abc").await.unwrap();
        let err = writer.finish().await.unwrap_err();
        assert!(matches!(err, EndpointError::Delegate { code: Some(400), .. }));
    }

    #[tokio::test]
    async fn test_identity_injection() {
        let (router, endpoint) = seeded(RecordingRouter::default()).await;
        endpoint
            .load_node(&CallContext::new(), "docs", LoadOptions::default())
            .await
            .unwrap();
        assert_eq!(router.inner.last_identity(), Some(Identity::system()));

        let ctx = CallContext::new().with_identity(Identity::user("alice"));
        endpoint.load_node(&ctx, "docs", LoadOptions::default()).await.unwrap();
        assert_eq!(router.inner.last_identity(), Some(Identity::user("alice")));
    }

    #[tokio::test]
    async fn test_move_node() {
        let (router, endpoint) = seeded(RecordingRouter::default()).await;
        let ctx = CallContext::new();
        endpoint.move_node(&ctx, "docs/a.txt", "docs/z.txt").await.unwrap();
        assert!(router.inner.contains("ws/docs/z.txt"));
        assert!(!router.inner.contains("ws/docs/a.txt"));

        let err = endpoint.move_node(&ctx, "docs/a.txt", "docs/y.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_clears_uuid_and_update_renews_folders() {
        let router = Arc::new(MemoryTreeRouter::new());
        let ctx = CallContext::new();

        let plain = RouterEndpoint::new(router.clone(), "ws", RouterSettings::default());
        plain.create_node(&ctx, &Node::leaf("a.txt").with_uuid("fixed"), true).await.unwrap();
        let created = plain.load_node(&ctx, "a.txt", LoadOptions::leaf()).await.unwrap();
        assert_ne!(created.uuid, "fixed");

        plain.update_node(&ctx, &Node::collection("kept").with_uuid("fixed")).await.unwrap();
        assert_eq!(plain.load_node(&ctx, "kept", LoadOptions::default()).await.unwrap().uuid, "fixed");

        let renewing = RouterEndpoint::new(
            router.clone(),
            "ws",
            RouterSettings {
                renew_folder_ids: true,
                ..Default::default()
            },
        );
        renewing.update_node(&ctx, &Node::collection("fresh").with_uuid("fixed")).await.unwrap();
        assert_ne!(renewing.load_node(&ctx, "fresh", LoadOptions::default()).await.unwrap().uuid, "fixed");
    }

    #[tokio::test]
    async fn test_browse_only_and_unsupported() {
        let endpoint = RouterEndpoint::new(
            Arc::new(MemoryTreeRouter::new()),
            "ws",
            RouterSettings {
                options: EndpointOptions::browse_only(),
                ..Default::default()
            },
        );
        let ctx = CallContext::new();
        let err = endpoint.delete_node(&ctx, "x").await.unwrap_err();
        assert!(matches!(err, EndpointError::ReadOnly { .. }));

        assert!(endpoint.watch(&ctx, "").await.unwrap_err().is_unsupported());
        let mut node = Node::leaf("x");
        assert!(endpoint.compute_checksum(&ctx, &mut node).await.unwrap_err().is_unsupported());
        assert_eq!(endpoint.capabilities(), crate::contract::Capabilities::default());
    }
}
