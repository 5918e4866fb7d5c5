//! # Object-Storage Endpoint
//!
//! Backend of the `s3` scheme. Object stores have no directories, so
//! collections are derived from keys:
//!
//! ```text
//! bucket/
//!   <prefix>/docs/.strata       marker object, content = collection uuid
//!   <prefix>/docs/a.txt         leaf
//!   <prefix>/pics/b.png         leaf; "pics" is an implied collection
//! ```
//!
//! With `normalize` set, every key is composed to NFC before it reaches the
//! store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use strata_core::{path, EndpointInfo, EndpointOptions, NamespaceRoot, Node, ObjectStoreConfig};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;

use super::object_store::{ObjectInfo, ObjectStore};
use crate::context::CallContext;
use crate::contract::{ensure_non_empty, ensure_writable, Capabilities, Endpoint, LoadOptions, WalkFn, WalkOptions};
use crate::error::{EndpointError, EndpointResult};
use crate::stream::{reader_from_bytes, NodeReader, NodeWriter, DEFAULT_WRITER_BUFFER};

/// Endpoint over one bucket of an object store.
pub struct S3Endpoint {
    store: Arc<dyn ObjectStore>,
    config: ObjectStoreConfig,
    root: NamespaceRoot,
    options: EndpointOptions,
    writer_buffer: usize,
}

impl S3Endpoint {
    pub fn new(store: Arc<dyn ObjectStore>, config: ObjectStoreConfig, options: EndpointOptions) -> Self {
        let root = NamespaceRoot::new(&config.root_prefix);
        S3Endpoint {
            store,
            config,
            root,
            options,
            writer_buffer: DEFAULT_WRITER_BUFFER,
        }
    }

    pub fn with_writer_buffer(mut self, writer_buffer: usize) -> Self {
        self.writer_buffer = writer_buffer;
        self
    }

    pub fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }

    /// Store key of a logical path.
    fn key(&self, p: &str) -> String {
        let logical = if self.config.normalize {
            p.nfc().collect::<String>()
        } else {
            p.to_string()
        };
        self.root.rooted(&logical).trim_start_matches('/').to_string()
    }

    /// Listing prefix covering everything below a logical path.
    fn prefix(&self, p: &str) -> String {
        let key = self.key(p);
        if key.is_empty() {
            key
        } else {
            format!("{}/", key)
        }
    }

    fn logical(&self, key: &str) -> String {
        self.root.unrooted(key)
    }

    fn leaf_node(&self, info: &ObjectInfo) -> Node {
        let mut node = Node::leaf(self.logical(&info.key))
            .with_etag(info.etag.clone())
            .with_size(info.size);
        node.mtime = info.last_modified;
        node
    }

    async fn read_marker_uuid(&self, collection: &str) -> Option<String> {
        let mut reader = self.store.get(&self.key(&path::marker_path(collection))).await.ok()?;
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw).await.ok()?;
        String::from_utf8(raw).ok()
    }

    async fn put_marker(&self, ctx: &CallContext, collection: &str, uuid: &str) -> EndpointResult<()> {
        let uuid = if uuid.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            uuid.to_string()
        };
        let key = self.key(&path::marker_path(collection));
        let size = uuid.len() as u64;
        ctx.run(self.store.put(&key, reader_from_bytes(uuid.into_bytes()), size))
            .await
            .map(|_| ())
    }

    async fn ensure_leaf(&self, ctx: &CallContext, p: &str) -> EndpointResult<()> {
        let key = self.key(p);
        match ctx.run(self.store.stat(&key)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => ctx
                .run(self.store.put(&key, reader_from_bytes(Vec::new()), 0))
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for S3Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Endpoint")
            .field("config", &self.config)
            .field("options", &self.options)
            .finish()
    }
}

#[async_trait]
impl Endpoint for S3Endpoint {
    fn endpoint_info(&self) -> EndpointInfo {
        let mut uri = format!("s3://{}/{}", self.config.host, self.config.bucket);
        if !self.root.as_str().is_empty() {
            uri = format!("{}/{}", uri, self.root.as_str().trim_start_matches('/'));
        }
        EndpointInfo {
            uri,
            requires_normalization: self.config.normalize || self.options.requires_normalization,
            requires_folders_rescan: self.options.requires_folders_rescan,
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            watch: false,
            checksum: true,
        }
    }

    async fn load_node(&self, ctx: &CallContext, p: &str, opts: LoadOptions) -> EndpointResult<Node> {
        let cleaned = path::clean(p);
        let logical = cleaned.trim_start_matches('/');
        if logical.is_empty() {
            return Ok(Node::collection(""));
        }

        if opts.leaf_hint != Some(false) {
            match ctx.run(self.store.stat(&self.key(logical))).await {
                Ok(info) => return Ok(self.leaf_node(&info)),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let below = ctx.run(self.store.list(&self.prefix(logical))).await?;
        if below.is_empty() {
            return Err(EndpointError::not_found(logical));
        }
        let uuid = self.read_marker_uuid(logical).await.unwrap_or_default();
        Ok(Node::collection(logical).with_uuid(uuid))
    }

    async fn walk(&self, ctx: &CallContext, opts: &WalkOptions, visit: &mut WalkFn<'_>) -> EndpointResult<()> {
        for start in opts.start_paths() {
            let start = path::clean(start).trim_start_matches('/').to_string();
            let prefix = self.prefix(&start);
            info!(bucket = %self.config.bucket, prefix = %prefix, "Walking object store");

            let objects = ctx.run(self.store.list(&prefix)).await?;
            if objects.is_empty() && !start.is_empty() {
                return Err(EndpointError::not_found(start));
            }

            let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
            for object in &objects {
                let leaf = self.leaf_node(object);
                let mut dir = path::parent(&leaf.path).to_string();
                while !dir.is_empty() && dir != start && path::is_within(&dir, &start) {
                    nodes
                        .entry(dir.clone())
                        .or_insert_with(|| Node::collection(dir.clone()));
                    dir = path::parent(&dir).to_string();
                }
                nodes.insert(leaf.path.clone(), leaf);
            }

            for (p, mut node) in nodes {
                if ctx.is_cancelled() {
                    return Err(EndpointError::Cancelled);
                }
                if node.is_hidden_marker() || node.has_temporary_etag() {
                    continue;
                }
                if node.is_collection() {
                    node.invalidate_etag();
                }
                visit(&p, node)?;
            }
        }
        Ok(())
    }

    async fn compute_checksum(&self, ctx: &CallContext, node: &mut Node) -> EndpointResult<()> {
        if node.is_collection() {
            node.invalidate_etag();
            return Ok(());
        }
        let info = ctx.run(self.store.stat(&self.key(&node.path))).await?;
        node.etag = info.etag;
        Ok(())
    }

    async fn create_node(&self, ctx: &CallContext, node: &Node, update_if_exists: bool) -> EndpointResult<()> {
        ensure_writable(&self.options, "create")?;
        if node.is_collection() {
            return self.put_marker(ctx, &node.path, "").await;
        }
        if update_if_exists {
            self.ensure_leaf(ctx, &node.path).await
        } else {
            match ctx.run(self.store.stat(&self.key(&node.path))).await {
                Ok(_) => Ok(()),
                Err(e) if e.is_not_found() => self.ensure_leaf(ctx, &node.path).await,
                Err(e) => Err(e),
            }
        }
    }

    async fn update_node(&self, ctx: &CallContext, node: &Node) -> EndpointResult<()> {
        ensure_writable(&self.options, "update")?;
        if node.is_collection() {
            self.put_marker(ctx, &node.path, &node.uuid).await
        } else {
            self.ensure_leaf(ctx, &node.path).await
        }
    }

    async fn delete_node(&self, ctx: &CallContext, p: &str) -> EndpointResult<()> {
        ensure_writable(&self.options, "delete")?;
        let key = self.key(p);
        match ctx.run(self.store.stat(&key)).await {
            Ok(_) => {
                info!(key = %key, "Deleting object");
                return ctx.run(self.store.remove(&key)).await;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let marker = self.key(&path::marker_path(p));
        let below = ctx.run(self.store.list(&self.prefix(p))).await?;
        if below.is_empty() {
            debug!(key = %key, "Nothing to delete");
            return Ok(());
        }
        info!(key = %key, objects = below.len(), "Deleting prefix");
        for object in below.iter().filter(|o| o.key != marker) {
            ctx.run(self.store.remove(&object.key)).await?;
        }
        ctx.run(self.store.remove(&marker)).await
    }

    async fn move_node(&self, ctx: &CallContext, old_path: &str, new_path: &str) -> EndpointResult<()> {
        ensure_writable(&self.options, "move")?;
        let from = self.key(old_path);
        let to = self.key(new_path);

        let objects = match ctx.run(self.store.stat(&from)).await {
            Ok(info) => vec![info],
            Err(e) if e.is_not_found() => ctx.run(self.store.list(&self.prefix(old_path))).await?,
            Err(e) => return Err(e),
        };
        if objects.is_empty() {
            return Err(EndpointError::not_found(old_path));
        }

        for object in objects {
            let target = format!("{}{}", to, &object.key[from.len()..]);
            ctx.run(self.store.copy(&object.key, &target)).await?;
            ctx.run(self.store.remove(&object.key)).await?;
        }
        Ok(())
    }

    async fn get_writer_on(&self, ctx: &CallContext, p: &str, expected_size: u64) -> EndpointResult<NodeWriter> {
        ensure_non_empty(p, expected_size)?;
        ensure_writable(&self.options, "write")?;
        let store = Arc::clone(&self.store);
        let key = self.key(p);
        Ok(NodeWriter::spawn(
            p,
            self.writer_buffer,
            ctx.cancellation().clone(),
            move |reader| async move { store.put(&key, reader, expected_size).await.map(|_| ()) },
        ))
    }

    async fn get_reader_on(&self, ctx: &CallContext, p: &str) -> EndpointResult<NodeReader> {
        ctx.run(self.store.get(&self.key(p))).await
    }
}
