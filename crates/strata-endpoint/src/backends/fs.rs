//! # Filesystem Endpoint
//!
//! Backend of the `fs` scheme: a real directory tree under a root folder.
//!
//! ## Layout
//! ```text
//! <root>/
//! ├── docs/
//! │   ├── .strata              {"uuid": "..."}  collection identifier
//! │   ├── a.txt                leaf, etag = BLAKE3 of content
//! │   └── .b.txt.strata-part   in-flight write, reported as temporary
//! └── other.txt
//! ```
//!
//! Writes land in a hidden sibling first and are renamed into place once the
//! expected number of bytes has been received.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_core::{path, EndpointInfo, EndpointOptions, Node, ETAG_TEMPORARY, HIDDEN_MARKER};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::context::CallContext;
use crate::contract::{ensure_non_empty, ensure_writable, Capabilities, Endpoint, LoadOptions, WalkFn, WalkOptions};
use crate::error::{EndpointError, EndpointResult};
use crate::stream::{NodeReader, NodeWriter, DEFAULT_WRITER_BUFFER};

/// Suffix of files still being written.
pub const TEMP_SUFFIX: &str = ".strata-part";

/// Content of a collection's marker file.
#[derive(Debug, Serialize, Deserialize)]
struct MarkerPayload {
    uuid: String,
}

// =============================================================================
// Helpers
// =============================================================================

/// Reinterprets a URI path such as `/E/sync/left` as a drive-letter path
/// (`E:\sync\left`).
pub fn drive_letter_path(uri_path: &str) -> String {
    let Some(letter) = uri_path.get(1..2) else {
        return uri_path.to_string();
    };
    let mut out = format!("{}:\\", letter);
    if let Some(rest) = uri_path.get(3..) {
        out.push_str(&rest.trim_matches('/').replace('/', "\\"));
    }
    out
}

fn not_found_or_io(p: &str, err: io::Error) -> EndpointError {
    if err.kind() == io::ErrorKind::NotFound {
        EndpointError::not_found(p)
    } else {
        EndpointError::Io(err)
    }
}

fn join_error(err: tokio::task::JoinError) -> EndpointError {
    EndpointError::Internal(format!("filesystem task failed: {}", err))
}

fn hash_file_sync(file: &Path) -> io::Result<String> {
    let mut reader = std::fs::File::open(file)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn read_marker_sync(dir: &Path) -> Option<String> {
    let raw = std::fs::read(dir.join(HIDDEN_MARKER)).ok()?;
    serde_json::from_slice::<MarkerPayload>(&raw).ok().map(|m| m.uuid)
}

fn modified(meta: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

fn is_temporary(file: &Path) -> bool {
    file.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(TEMP_SUFFIX))
}

fn relative(root: &Path, full: &Path) -> String {
    full.strip_prefix(root)
        .unwrap_or(full)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Builds the node for one on-disk entry.
fn describe_sync(root: &Path, full: &Path, meta: &std::fs::Metadata) -> io::Result<Node> {
    let rel = relative(root, full);
    let mut node = if meta.is_dir() {
        Node::collection(rel).with_uuid(read_marker_sync(full).unwrap_or_default())
    } else {
        let etag = if is_temporary(full) {
            ETAG_TEMPORARY.to_string()
        } else {
            hash_file_sync(full)?
        };
        Node::leaf(rel).with_etag(etag).with_size(meta.len())
    };
    node.mtime = modified(meta);
    Ok(node)
}

fn scan_sync(root: &Path, base: &Path, start: &str) -> EndpointResult<Vec<Node>> {
    if !base.exists() {
        return Err(EndpointError::not_found(start));
    }
    let mut nodes = Vec::new();
    for entry in WalkDir::new(base).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_dir() && !entry.file_type().is_file() {
            continue;
        }
        let meta = entry.metadata()?;
        nodes.push(describe_sync(root, entry.path(), &meta)?);
    }
    Ok(nodes)
}

// =============================================================================
// Filesystem Endpoint
// =============================================================================

/// Endpoint over a local directory.
#[derive(Debug, Clone)]
pub struct FsEndpoint {
    root: PathBuf,
    options: EndpointOptions,
    writer_buffer: usize,
}

impl FsEndpoint {
    /// Creates an endpoint rooted at `root`. The folder is not required to
    /// exist yet.
    pub fn new(root: impl Into<PathBuf>, options: EndpointOptions) -> Self {
        FsEndpoint {
            root: root.into(),
            options,
            writer_buffer: DEFAULT_WRITER_BUFFER,
        }
    }

    pub fn with_writer_buffer(mut self, writer_buffer: usize) -> Self {
        self.writer_buffer = writer_buffer;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &EndpointOptions {
        &self.options
    }

    /// Maps a logical path below the root, refusing paths that escape it.
    fn abs(&self, p: &str) -> EndpointResult<PathBuf> {
        path::ensure_contained(p)?;
        let cleaned = path::clean(p);
        let rel = cleaned.trim_start_matches('/');
        if rel.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(rel))
        }
    }

    async fn write_marker(&self, dir: &Path, uuid: &str) -> EndpointResult<()> {
        let payload = serde_json::to_vec(&MarkerPayload {
            uuid: uuid.to_string(),
        })?;
        tokio::fs::write(dir.join(HIDDEN_MARKER), payload).await?;
        Ok(())
    }

    async fn ensure_collection(&self, dir: &Path, uuid: &str, overwrite: bool) -> EndpointResult<()> {
        tokio::fs::create_dir_all(dir).await?;
        let has_marker = tokio::fs::try_exists(dir.join(HIDDEN_MARKER)).await?;
        if !has_marker || overwrite {
            let uuid = if uuid.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                uuid.to_string()
            };
            self.write_marker(dir, &uuid).await?;
        }
        Ok(())
    }

    async fn ensure_leaf(&self, file: &Path) -> EndpointResult<()> {
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if !tokio::fs::try_exists(file).await? {
            tokio::fs::File::create(file).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Endpoint for FsEndpoint {
    fn endpoint_info(&self) -> EndpointInfo {
        EndpointInfo {
            uri: format!("fs://{}", self.root.display()),
            requires_normalization: cfg!(target_os = "macos") || self.options.requires_normalization,
            requires_folders_rescan: self.options.requires_folders_rescan,
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            watch: false,
            checksum: true,
        }
    }

    async fn load_node(&self, _ctx: &CallContext, p: &str, _opts: LoadOptions) -> EndpointResult<Node> {
        let full = self.abs(p)?;
        let root = self.root.clone();
        let logical = p.to_string();
        tokio::task::spawn_blocking(move || -> EndpointResult<Node> {
            let meta = std::fs::metadata(&full).map_err(|e| not_found_or_io(&logical, e))?;
            Ok(describe_sync(&root, &full, &meta)?)
        })
        .await
        .map_err(join_error)?
    }

    async fn walk(&self, ctx: &CallContext, opts: &WalkOptions, visit: &mut WalkFn<'_>) -> EndpointResult<()> {
        for start in opts.start_paths() {
            let base = self.abs(start)?;
            let root = self.root.clone();
            let start_owned = start.to_string();
            info!(path = %base.display(), "Walking filesystem");

            let nodes = tokio::task::spawn_blocking(move || scan_sync(&root, &base, &start_owned))
                .await
                .map_err(join_error)??;
            for mut node in nodes {
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

    async fn compute_checksum(&self, _ctx: &CallContext, node: &mut Node) -> EndpointResult<()> {
        let full = self.abs(&node.path)?;
        let logical = node.path.clone();
        let etag = tokio::task::spawn_blocking(move || -> EndpointResult<Option<String>> {
            let meta = std::fs::metadata(&full).map_err(|e| not_found_or_io(&logical, e))?;
            if meta.is_dir() {
                return Ok(None);
            }
            Ok(Some(hash_file_sync(&full)?))
        })
        .await
        .map_err(join_error)??;
        match etag {
            Some(etag) => node.etag = etag,
            None => node.invalidate_etag(),
        }
        Ok(())
    }

    async fn create_node(&self, _ctx: &CallContext, node: &Node, update_if_exists: bool) -> EndpointResult<()> {
        ensure_writable(&self.options, "create")?;
        let full = self.abs(&node.path)?;
        if node.is_collection() {
            self.ensure_collection(&full, "", false).await?;
        } else if update_if_exists || !tokio::fs::try_exists(&full).await? {
            self.ensure_leaf(&full).await?;
        }
        debug!(path = %node.path, kind = %node.kind, "Created node");
        Ok(())
    }

    async fn update_node(&self, _ctx: &CallContext, node: &Node) -> EndpointResult<()> {
        ensure_writable(&self.options, "update")?;
        let full = self.abs(&node.path)?;
        if node.is_collection() {
            self.ensure_collection(&full, &node.uuid, !node.uuid.is_empty()).await
        } else {
            self.ensure_leaf(&full).await
        }
    }

    async fn delete_node(&self, _ctx: &CallContext, p: &str) -> EndpointResult<()> {
        ensure_writable(&self.options, "delete")?;
        let full = self.abs(p)?;
        let meta = match tokio::fs::metadata(&full).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let removed = if meta.is_dir() {
            tokio::fs::remove_dir_all(&full).await
        } else {
            tokio::fs::remove_file(&full).await
        };
        match removed {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => {
                info!(path = %p, "Deleted node");
                Ok(())
            }
        }
    }

    async fn move_node(&self, _ctx: &CallContext, old_path: &str, new_path: &str) -> EndpointResult<()> {
        ensure_writable(&self.options, "move")?;
        let from = self.abs(old_path)?;
        let to = self.abs(new_path)?;
        tokio::fs::metadata(&from)
            .await
            .map_err(|e| not_found_or_io(old_path, e))?;
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&from, &to).await?;
        Ok(())
    }

    async fn get_writer_on(&self, ctx: &CallContext, p: &str, expected_size: u64) -> EndpointResult<NodeWriter> {
        ensure_non_empty(p, expected_size)?;
        ensure_writable(&self.options, "write")?;
        let target = self.abs(p)?;
        if target == self.root {
            return Err(EndpointError::invalid_node(p, "cannot write to the namespace root"));
        }
        if tokio::fs::metadata(&target).await.is_ok_and(|meta| meta.is_dir()) {
            return Err(EndpointError::invalid_node(p, "not a leaf"));
        }
        let name = path::base_name(&path::clean(p)).to_string();
        let tmp = target.with_file_name(format!(".{}{}", name, TEMP_SUFFIX));
        let logical = p.to_string();

        Ok(NodeWriter::spawn(
            p,
            self.writer_buffer,
            ctx.cancellation().clone(),
            move |mut reader| async move {
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let mut file = tokio::fs::File::create(&tmp).await?;
                let written = tokio::io::copy(&mut reader, &mut file).await?;
                file.sync_all().await?;
                drop(file);

                if written != expected_size {
                    let _ = tokio::fs::remove_file(&tmp).await;
                    return Err(EndpointError::invalid_node(
                        logical,
                        format!("expected {} bytes, received {}", expected_size, written),
                    ));
                }
                tokio::fs::rename(&tmp, &target).await?;
                Ok(())
            },
        ))
    }

    async fn get_reader_on(&self, _ctx: &CallContext, p: &str) -> EndpointResult<NodeReader> {
        let full = self.abs(p)?;
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| not_found_or_io(p, e))?;
        if meta.is_dir() {
            return Err(EndpointError::invalid_node(p, "not a leaf"));
        }
        let file = tokio::fs::File::open(&full).await?;
        Ok(Box::new(file))
    }
}
