//! # In-Memory Endpoint
//!
//! Backend of the `db` scheme: an ordered map behind a `parking_lot` lock,
//! with live change events. Nothing is persisted.
//!
//! ```text
//! mutation ──► BTreeMap<path, Entry> ──► broadcast::Sender<WatchEvent>
//!                                              │ per watch task
//!                                              ▼ (prefix filter)
//!                                        mpsc ──► WatchHandle
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use strata_core::{path, EndpointInfo, EndpointOptions, Node};
use tokio::io::AsyncReadExt;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::content_etag;
use crate::context::CallContext;
use crate::contract::{
    ensure_non_empty, ensure_writable, Capabilities, Endpoint, LoadOptions, WalkFn, WalkOptions,
    WatchEvent, WatchEventKind, WatchHandle,
};
use crate::error::{EndpointError, EndpointResult};
use crate::stream::{reader_from_bytes, NodeReader, NodeWriter, DEFAULT_WRITER_BUFFER};

const EVENT_CAPACITY: usize = 256;
const WATCH_QUEUE: usize = 64;

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    content: Vec<u8>,
}

#[derive(Debug)]
struct State {
    entries: RwLock<BTreeMap<String, Entry>>,
    events: broadcast::Sender<WatchEvent>,
}

impl State {
    fn emit(&self, path: &str, kind: WatchEventKind, node: Option<Node>) {
        // No watcher is not an error.
        let _ = self.events.send(WatchEvent {
            path: path.to_string(),
            kind,
            node,
        });
    }

    fn store_leaf(&self, p: &str, content: Vec<u8>) -> Node {
        let mut entries = self.entries.write();
        let uuid = entries
            .get(p)
            .map(|e| e.node.uuid.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let node = Node::leaf(p)
            .with_uuid(uuid)
            .with_etag(content_etag(&content))
            .with_size(content.len() as u64)
            .with_mtime(Utc::now());
        entries.insert(p.to_string(), Entry { node: node.clone(), content });
        node
    }
}

fn key(p: &str) -> String {
    path::clean(p).trim_start_matches('/').to_string()
}

/// In-memory endpoint for tests and dry runs.
#[derive(Debug, Clone)]
pub struct MemoryEndpoint {
    state: Arc<State>,
    options: EndpointOptions,
    writer_buffer: usize,
}

impl Default for MemoryEndpoint {
    fn default() -> Self {
        Self::new(EndpointOptions::default())
    }
}

impl MemoryEndpoint {
    pub fn new(options: EndpointOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        MemoryEndpoint {
            state: Arc::new(State {
                entries: RwLock::new(BTreeMap::new()),
                events,
            }),
            options,
            writer_buffer: DEFAULT_WRITER_BUFFER,
        }
    }

    pub fn with_writer_buffer(mut self, writer_buffer: usize) -> Self {
        self.writer_buffer = writer_buffer;
        self
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.state.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.entries.read().is_empty()
    }

    fn snapshot_below(&self, k: &str) -> EndpointResult<Vec<Node>> {
        let entries = self.state.entries.read();
        if !k.is_empty() && !entries.contains_key(k) {
            return Err(EndpointError::not_found(k));
        }
        Ok(entries
            .iter()
            .filter(|(p, _)| p.as_str() != k && path::is_within(p, k))
            .map(|(_, e)| e.node.clone())
            .collect())
    }

    fn upsert(&self, mut node: Node, update_if_exists: bool) {
        let k = key(&node.path);
        node.path = k.clone();
        let mut entries = self.state.entries.write();
        let kind = match entries.get_mut(&k) {
            Some(_) if !update_if_exists => return,
            Some(existing) => {
                if node.uuid.is_empty() {
                    node.uuid = existing.node.uuid.clone();
                }
                if node.is_leaf() && node.etag.is_empty() {
                    node.etag = existing.node.etag.clone();
                }
                existing.node = node.clone();
                WatchEventKind::Updated
            }
            None => {
                if node.uuid.is_empty() {
                    node.uuid = uuid::Uuid::new_v4().to_string();
                }
                if node.is_leaf() && node.etag.is_empty() {
                    node.etag = content_etag(&[]);
                }
                entries.insert(
                    k.clone(),
                    Entry {
                        node: node.clone(),
                        content: Vec::new(),
                    },
                );
                WatchEventKind::Created
            }
        };
        drop(entries);
        self.state.emit(&k, kind, Some(node));
    }
}

#[async_trait]
impl Endpoint for MemoryEndpoint {
    fn endpoint_info(&self) -> EndpointInfo {
        EndpointInfo {
            uri: "db://".to_string(),
            requires_normalization: self.options.requires_normalization,
            requires_folders_rescan: self.options.requires_folders_rescan,
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            watch: true,
            checksum: true,
        }
    }

    async fn load_node(&self, _ctx: &CallContext, p: &str, _opts: LoadOptions) -> EndpointResult<Node> {
        let k = key(p);
        if k.is_empty() {
            return Ok(Node::collection(""));
        }
        self.state
            .entries
            .read()
            .get(&k)
            .map(|e| e.node.clone())
            .ok_or_else(|| EndpointError::not_found(k))
    }

    async fn walk(&self, ctx: &CallContext, opts: &WalkOptions, visit: &mut WalkFn<'_>) -> EndpointResult<()> {
        for start in opts.start_paths() {
            for mut node in self.snapshot_below(&key(start))? {
                if ctx.is_cancelled() {
                    return Err(EndpointError::Cancelled);
                }
                if node.is_hidden_marker() || node.has_temporary_etag() {
                    continue;
                }
                if node.is_collection() {
                    node.invalidate_etag();
                }
                let p = node.path.clone();
                visit(&p, node)?;
            }
        }
        Ok(())
    }

    async fn watch(&self, ctx: &CallContext, p: &str) -> EndpointResult<WatchHandle> {
        let prefix = key(p);
        let mut events = self.state.events.subscribe();
        let (tx, rx) = mpsc::channel(WATCH_QUEUE);
        let stop = ctx.cancellation().child_token();
        let task_stop = stop.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = task_stop.cancelled() => break,
                    received = events.recv() => received,
                };
                match event {
                    Ok(event) if path::is_within(&event.path, &prefix) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(prefix = %prefix, missed = n, "Watcher lagging, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(prefix = %prefix, "Watch stopped");
        });

        Ok(WatchHandle::new(rx, stop))
    }

    async fn compute_checksum(&self, _ctx: &CallContext, node: &mut Node) -> EndpointResult<()> {
        let entries = self.state.entries.read();
        let entry = entries
            .get(&key(&node.path))
            .ok_or_else(|| EndpointError::not_found(node.path.clone()))?;
        if entry.node.is_collection() {
            node.invalidate_etag();
        } else {
            node.etag = content_etag(&entry.content);
        }
        Ok(())
    }

    async fn create_node(&self, _ctx: &CallContext, node: &Node, update_if_exists: bool) -> EndpointResult<()> {
        ensure_writable(&self.options, "create")?;
        let mut n = node.clone();
        n.uuid.clear();
        self.upsert(n, update_if_exists);
        Ok(())
    }

    async fn update_node(&self, _ctx: &CallContext, node: &Node) -> EndpointResult<()> {
        ensure_writable(&self.options, "update")?;
        self.upsert(node.clone(), true);
        Ok(())
    }

    async fn delete_node(&self, _ctx: &CallContext, p: &str) -> EndpointResult<()> {
        ensure_writable(&self.options, "delete")?;
        let k = key(p);
        if k.is_empty() {
            return Err(EndpointError::invalid_node(k, "cannot delete the namespace root"));
        }
        let removed = {
            let mut entries = self.state.entries.write();
            let before = entries.len();
            entries.retain(|existing, _| !path::is_within(existing, &k));
            before - entries.len()
        };
        if removed > 0 {
            debug!(path = %k, removed, "Deleted nodes");
            self.state.emit(&k, WatchEventKind::Deleted, None);
        }
        Ok(())
    }

    async fn move_node(&self, _ctx: &CallContext, old_path: &str, new_path: &str) -> EndpointResult<()> {
        ensure_writable(&self.options, "move")?;
        let from = key(old_path);
        let to = key(new_path);
        let moved = {
            let mut entries = self.state.entries.write();
            if from.is_empty() || !entries.contains_key(&from) {
                return Err(EndpointError::not_found(from));
            }
            let keys: Vec<String> = entries
                .keys()
                .filter(|k| path::is_within(k, &from))
                .cloned()
                .collect();
            for old in keys {
                if let Some(mut entry) = entries.remove(&old) {
                    entry.node.path = format!("{}{}", to, &old[from.len()..]);
                    entries.insert(entry.node.path.clone(), entry);
                }
            }
            entries.get(&to).map(|e| e.node.clone())
        };
        self.state.emit(&to, WatchEventKind::Moved { from }, moved);
        Ok(())
    }

    async fn get_writer_on(&self, ctx: &CallContext, p: &str, expected_size: u64) -> EndpointResult<NodeWriter> {
        ensure_non_empty(p, expected_size)?;
        ensure_writable(&self.options, "write")?;
        let k = key(p);
        if k.is_empty() {
            return Err(EndpointError::invalid_node(k, "cannot write to the namespace root"));
        }
        let state = Arc::clone(&self.state);
        let cancel = ctx.cancellation().clone();
        Ok(NodeWriter::spawn(p, self.writer_buffer, cancel, move |mut reader| async move {
            let mut content = Vec::new();
            reader.read_to_end(&mut content).await?;
            if content.len() as u64 != expected_size {
                return Err(EndpointError::invalid_node(
                    k,
                    format!("expected {} bytes, received {}", expected_size, content.len()),
                ));
            }
            let node = state.store_leaf(&k, content);
            state.emit(&k, WatchEventKind::Updated, Some(node));
            Ok(())
        }))
    }

    async fn get_reader_on(&self, _ctx: &CallContext, p: &str) -> EndpointResult<NodeReader> {
        let k = key(p);
        let entries = self.state.entries.read();
        match entries.get(&k) {
            None => Err(EndpointError::not_found(k)),
            Some(e) if e.node.is_collection() => Err(EndpointError::invalid_node(k, "not a leaf")),
            Some(e) => Ok(reader_from_bytes(e.content.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn write(endpoint: &MemoryEndpoint, p: &str, data: &[u8]) {
        let mut writer = endpoint
            .get_writer_on(&CallContext::new(), p, data.len() as u64)
            .await
            .unwrap();
        writer.write_all(data).await.unwrap();
        writer.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_load_and_checksum() {
        let endpoint = MemoryEndpoint::default();
        let ctx = CallContext::new();
        write(&endpoint, "docs/a.txt", b"hello").await;

        let mut node = endpoint.load_node(&ctx, "docs/a.txt", LoadOptions::leaf()).await.unwrap();
        assert_eq!(node.size, 5);
        let etag = node.etag.clone();
        node.etag.clear();
        endpoint.compute_checksum(&ctx, &mut node).await.unwrap();
        assert_eq!(node.etag, etag);
    }

    #[tokio::test]
    async fn test_walk_and_recursive_delete() {
        let endpoint = MemoryEndpoint::default();
        let ctx = CallContext::new();
        endpoint.create_node(&ctx, &Node::collection("docs"), false).await.unwrap();
        write(&endpoint, "docs/a.txt", b"a").await;
        write(&endpoint, "docs/.strata", b"marker").await;
        write(&endpoint, "other.txt", b"o").await;

        let nodes = endpoint.collect_nodes(&ctx, &WalkOptions::default()).await.unwrap();
        let paths: Vec<&str> = nodes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["docs", "docs/a.txt", "other.txt"]);

        endpoint.delete_node(&ctx, "docs").await.unwrap();
        endpoint.delete_node(&ctx, "docs").await.unwrap();
        assert_eq!(endpoint.len(), 1);
    }

    #[tokio::test]
    async fn test_short_write_is_not_committed() {
        let endpoint = MemoryEndpoint::default();
        let mut writer = endpoint
            .get_writer_on(&CallContext::new(), "a.txt", 10)
            .await
            .unwrap();
        writer.write_all(b"abc").await.unwrap();
        assert!(matches!(
            writer.finish().await,
            Err(EndpointError::InvalidNode { .. })
        ));
        assert!(endpoint.is_empty());
    }

    #[tokio::test]
    async fn test_namespace_root_cannot_be_deleted_or_written() {
        let endpoint = MemoryEndpoint::default();
        let ctx = CallContext::new();
        write(&endpoint, "docs/a.txt", b"a").await;
        write(&endpoint, "other.txt", b"o").await;
        let before = endpoint.len();

        for p in ["", "/", "docs/.."] {
            assert!(matches!(
                endpoint.delete_node(&ctx, p).await,
                Err(EndpointError::InvalidNode { .. })
            ));
            assert!(matches!(
                endpoint.get_writer_on(&ctx, p, 1).await,
                Err(EndpointError::InvalidNode { .. })
            ));
        }
        assert_eq!(endpoint.len(), before);
    }

    #[tokio::test]
    async fn test_move_missing_fails() {
        let endpoint = MemoryEndpoint::default();
        let err = endpoint
            .move_node(&CallContext::new(), "nope", "there")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_watch_filters_by_prefix() {
        let endpoint = MemoryEndpoint::default();
        let ctx = CallContext::new();
        let mut handle = endpoint.watch(&ctx, "docs").await.unwrap();

        endpoint.create_node(&ctx, &Node::leaf("elsewhere.txt"), false).await.unwrap();
        endpoint.create_node(&ctx, &Node::leaf("docs/a.txt"), false).await.unwrap();

        let event = handle.next().await.unwrap();
        assert_eq!(event.path, "docs/a.txt");
        assert_eq!(event.kind, WatchEventKind::Created);

        handle.close();
    }

    #[tokio::test]
    async fn test_zero_size_and_browse_only() {
        let endpoint = MemoryEndpoint::new(EndpointOptions::browse_only());
        let ctx = CallContext::new();
        assert!(matches!(
            endpoint.get_writer_on(&ctx, "a", 0).await.unwrap_err(),
            EndpointError::EmptyWrite { .. }
        ));
        assert!(matches!(
            endpoint.get_writer_on(&ctx, "a", 1).await.unwrap_err(),
            EndpointError::ReadOnly { .. }
        ));
    }
}
