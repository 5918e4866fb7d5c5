//! In-process tree service with the delegate's semantics.
//!
//! - collections always carry a hidden marker leaf
//! - only leaves can be deleted; deleting a marker removes its collection
//! - missing paths fail with a 404 delegate error
//!
//! Listings are snapshots taken under the read lock, sorted by path.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use strata_core::{path, Identity, Node, NodeKind};
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::{NodeStream, TreeRouter};
use crate::backends::content_etag;
use crate::context::ServiceContext;
use crate::error::{EndpointError, EndpointResult};
use crate::stream::{reader_from_bytes, NodeReader};

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    content: Vec<u8>,
}

/// Tree service held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryTreeRouter {
    entries: RwLock<BTreeMap<String, Entry>>,
    last_identity: Mutex<Option<Identity>>,
}

fn key(p: &str) -> String {
    path::clean(p).trim_start_matches('/').to_string()
}

fn missing(p: &str) -> EndpointError {
    EndpointError::delegate(404, format!("node not found: {}", p))
}

impl MemoryTreeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes, markers included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// True when a node is stored at `p`.
    pub fn contains(&self, p: &str) -> bool {
        self.entries.read().contains_key(&key(p))
    }

    /// Identity of the most recent call.
    pub fn last_identity(&self) -> Option<Identity> {
        self.last_identity.lock().clone()
    }

    fn record(&self, ctx: &ServiceContext) {
        *self.last_identity.lock() = Some(ctx.identity.clone());
    }

    fn insert_marker(entries: &mut BTreeMap<String, Entry>, collection: &Node) {
        let marker = path::marker_path(&collection.path);
        if entries.contains_key(&marker) {
            return;
        }
        let content = collection.uuid.clone().into_bytes();
        let node = Node::leaf(marker.clone())
            .with_uuid(uuid::Uuid::new_v4().to_string())
            .with_etag(content_etag(&content))
            .with_size(content.len() as u64)
            .with_mtime(Utc::now());
        entries.insert(marker, Entry { node, content });
    }
}

#[async_trait]
impl TreeRouter for MemoryTreeRouter {
    async fn read_node(&self, ctx: &ServiceContext, p: &str) -> EndpointResult<Node> {
        self.record(ctx);
        let k = key(p);
        if k.is_empty() {
            return Ok(Node::collection(""));
        }
        self.entries
            .read()
            .get(&k)
            .map(|e| e.node.clone())
            .ok_or_else(|| missing(&k))
    }

    async fn list_nodes(&self, ctx: &ServiceContext, p: &str, recursive: bool) -> EndpointResult<NodeStream> {
        self.record(ctx);
        let k = key(p);
        let entries = self.entries.read();
        if !k.is_empty() && !entries.contains_key(&k) {
            return Err(missing(&k));
        }

        let listed: Vec<EndpointResult<Node>> = entries
            .iter()
            .filter(|(child, _)| child.as_str() != k && path::is_within(child, &k))
            .filter(|(child, _)| recursive || path::parent(child) == k)
            .map(|(_, e)| Ok(e.node.clone()))
            .collect();
        Ok(stream::iter(listed).boxed())
    }

    async fn create_node(&self, ctx: &ServiceContext, mut node: Node) -> EndpointResult<()> {
        self.record(ctx);
        let k = key(&node.path);
        if k.is_empty() {
            return Err(EndpointError::delegate(400, "cannot create the root node"));
        }
        node.path = k.clone();

        let mut entries = self.entries.write();
        if let Some(existing) = entries.get_mut(&k) {
            if existing.node.kind != node.kind {
                return Err(EndpointError::delegate(
                    409,
                    format!("{} exists as a {}", k, existing.node.kind),
                ));
            }
            if node.uuid.is_empty() {
                node.uuid = existing.node.uuid.clone();
            }
            debug!(path = %k, "Updating node");
            existing.node = node;
            return Ok(());
        }

        if node.uuid.is_empty() {
            node.uuid = uuid::Uuid::new_v4().to_string();
        }
        node.mtime = Some(Utc::now());
        if node.kind == NodeKind::Collection {
            Self::insert_marker(&mut entries, &node);
        } else if node.etag.is_empty() {
            node.etag = content_etag(&[]);
        }
        debug!(path = %k, kind = %node.kind, "Creating node");
        entries.insert(k, Entry { node, content: Vec::new() });
        Ok(())
    }

    async fn update_node(&self, ctx: &ServiceContext, from: &Node, to: &Node) -> EndpointResult<()> {
        self.record(ctx);
        let from_key = key(&from.path);
        let to_key = key(&to.path);
        let mut entries = self.entries.write();
        if from_key.is_empty() || !entries.contains_key(&from_key) {
            return Err(missing(&from_key));
        }
        if entries.contains_key(&to_key) {
            return Err(EndpointError::delegate(409, format!("{} already exists", to_key)));
        }

        let moved: Vec<String> = entries
            .keys()
            .filter(|k| path::is_within(k, &from_key))
            .cloned()
            .collect();
        for old in moved {
            if let Some(mut entry) = entries.remove(&old) {
                let rest = &old[from_key.len()..];
                entry.node.path = format!("{}{}", to_key, rest);
                entries.insert(entry.node.path.clone(), entry);
            }
        }
        debug!(from = %from_key, to = %to_key, "Moved node");
        Ok(())
    }

    async fn delete_node(&self, ctx: &ServiceContext, node: &Node) -> EndpointResult<()> {
        self.record(ctx);
        let k = key(&node.path);
        let mut entries = self.entries.write();
        match entries.get(&k) {
            None => return Err(missing(&k)),
            Some(e) if e.node.is_collection() => {
                return Err(EndpointError::delegate(
                    400,
                    format!("{} is a collection, delete its marker instead", k),
                ));
            }
            Some(_) => {}
        }

        entries.remove(&k);
        if path::is_hidden_marker(&k) {
            let owner = path::parent(&k).to_string();
            if entries.get(&owner).is_some_and(|e| e.node.is_collection()) {
                entries.remove(&owner);
                debug!(path = %owner, "Collection removed with its marker");
            }
        }
        Ok(())
    }

    async fn put_object(&self, ctx: &ServiceContext, node: &Node, mut reader: NodeReader, size: u64) -> EndpointResult<u64> {
        self.record(ctx);
        let k = key(&node.path);
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await?;
        if content.len() as u64 != size {
            return Err(EndpointError::delegate(
                400,
                format!("{}: expected {} bytes, received {}", k, size, content.len()),
            ));
        }

        let mut entries = self.entries.write();
        if entries.get(&k).is_some_and(|e| e.node.is_collection()) {
            return Err(EndpointError::delegate(409, format!("{} is a collection", k)));
        }
        let uuid = entries
            .get(&k)
            .map(|e| e.node.uuid.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let stored = Node::leaf(k.clone())
            .with_uuid(uuid)
            .with_etag(content_etag(&content))
            .with_size(size)
            .with_mtime(Utc::now());
        entries.insert(k, Entry { node: stored, content });
        Ok(size)
    }

    async fn get_object(&self, ctx: &ServiceContext, node: &Node) -> EndpointResult<NodeReader> {
        self.record(ctx);
        let k = key(&node.path);
        let entries = self.entries.read();
        match entries.get(&k) {
            None => Err(missing(&k)),
            Some(e) if e.node.is_collection() => {
                Err(EndpointError::delegate(400, format!("{} is a collection", k)))
            }
            Some(e) => Ok(reader_from_bytes(e.content.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    async fn paths(router: &MemoryTreeRouter, p: &str, recursive: bool) -> Vec<String> {
        let stream = router.list_nodes(&ServiceContext::system(), p, recursive).await.unwrap();
        let nodes: Vec<Node> = stream.try_collect().await.unwrap();
        nodes.into_iter().map(|n| n.path).collect()
    }

    #[tokio::test]
    async fn test_collection_gets_marker() {
        let router = MemoryTreeRouter::new();
        let ctx = ServiceContext::system();
        router.create_node(&ctx, Node::collection("ws/docs")).await.unwrap();
        assert!(router.contains("ws/docs"));
        assert!(router.contains("ws/docs/.strata"));
        assert_eq!(router.last_identity(), Some(Identity::system()));
    }

    #[tokio::test]
    async fn test_listing_recursive_and_flat() {
        let router = MemoryTreeRouter::new();
        let ctx = ServiceContext::system();
        router.create_node(&ctx, Node::collection("ws")).await.unwrap();
        router.create_node(&ctx, Node::collection("ws/sub")).await.unwrap();
        router.create_node(&ctx, Node::leaf("ws/sub/a.txt")).await.unwrap();

        assert_eq!(paths(&router, "ws", false).await, vec!["ws/.strata", "ws/sub"]);
        assert_eq!(
            paths(&router, "ws", true).await,
            vec!["ws/.strata", "ws/sub", "ws/sub/.strata", "ws/sub/a.txt"]
        );
        assert!(router.list_nodes(&ctx, "nope", true).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let router = MemoryTreeRouter::new();
        let ctx = ServiceContext::system();
        router.create_node(&ctx, Node::collection("ws")).await.unwrap();

        let err = router.delete_node(&ctx, &Node::collection("ws")).await.unwrap_err();
        assert!(matches!(err, EndpointError::Delegate { code: Some(400), .. }));

        router.delete_node(&ctx, &Node::leaf("ws/.strata")).await.unwrap();
        assert!(router.is_empty());

        let err = router.delete_node(&ctx, &Node::leaf("ws/.strata")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_put_get_and_move() {
        let router = MemoryTreeRouter::new();
        let ctx = ServiceContext::system();
        let node = Node::leaf("ws/a.txt");
        router.put_object(&ctx, &node, reader_from_bytes(b"abc".to_vec()), 3).await.unwrap();

        let stored = router.read_node(&ctx, "ws/a.txt").await.unwrap();
        assert_eq!(stored.size, 3);
        assert_eq!(stored.etag, content_etag(b"abc"));

        router
            .update_node(&ctx, &stored, &Node::leaf("ws/b.txt"))
            .await
            .unwrap();
        assert!(!router.contains("ws/a.txt"));

        let mut data = Vec::new();
        router
            .get_object(&ctx, &Node::leaf("ws/b.txt"))
            .await
            .unwrap()
            .read_to_end(&mut data)
            .await
            .unwrap();
        assert_eq!(data, b"abc");
    }

    #[tokio::test]
    async fn test_put_size_mismatch() {
        let router = MemoryTreeRouter::new();
        let result = router
            .put_object(&ServiceContext::system(), &Node::leaf("a"), reader_from_bytes(b"ab".to_vec()), 5)
            .await;
        assert!(matches!(result, Err(EndpointError::Delegate { code: Some(400), .. })));
    }
}
