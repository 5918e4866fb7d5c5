//! Remote tree-service endpoint (`http` / `https`).
//!
//! The service speaks the same tree protocol as the local router, so this
//! endpoint is a [`RouterEndpoint`] over a connection obtained from a
//! [`RemoteConnector`], acting as the configured remote user.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use strata_core::{EndpointInfo, Identity, Node, RemoteConfig};

use crate::context::CallContext;
use crate::contract::{Capabilities, Endpoint, LoadOptions, WalkFn, WalkOptions, WatchHandle};
use crate::error::EndpointResult;
use crate::router::{MemoryTreeRouter, RouterEndpoint, RouterSettings, TreeRouter};
use crate::stream::{NodeReader, NodeWriter};

/// Opens tree-service connections from remote credentials.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, config: &RemoteConfig) -> EndpointResult<Arc<dyn TreeRouter>>;
}

/// Connector serving one in-memory tree per service URL.
#[derive(Debug, Default)]
pub struct MemoryRemoteConnector {
    services: Mutex<HashMap<String, Arc<MemoryTreeRouter>>>,
}

impl MemoryRemoteConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tree behind `url`, if a connection created it.
    pub fn service(&self, url: &str) -> Option<Arc<MemoryTreeRouter>> {
        self.services.lock().get(url).cloned()
    }
}

impl RemoteConnector for MemoryRemoteConnector {
    fn connect(&self, config: &RemoteConfig) -> EndpointResult<Arc<dyn TreeRouter>> {
        config.validate()?;
        let router: Arc<dyn TreeRouter> = self
            .services
            .lock()
            .entry(config.url.clone())
            .or_default()
            .clone();
        Ok(router)
    }
}

/// Endpoint over a remote tree service.
#[derive(Debug)]
pub struct RemoteEndpoint {
    config: RemoteConfig,
    inner: RouterEndpoint,
}

impl RemoteEndpoint {
    /// Calls without an explicit identity run as `config.user`.
    pub fn new(router: Arc<dyn TreeRouter>, config: RemoteConfig, root: &str, mut settings: RouterSettings) -> Self {
        settings.identity = Identity::user(config.user.clone());
        let inner = RouterEndpoint::new(router, root, settings);
        let info_uri = format!("{}/{}", config.url, inner.root());
        RemoteEndpoint {
            config,
            inner: inner.with_info_uri(info_uri),
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }
}

#[async_trait]
impl Endpoint for RemoteEndpoint {
    fn endpoint_info(&self) -> EndpointInfo {
        self.inner.endpoint_info()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn load_node(&self, ctx: &CallContext, p: &str, opts: LoadOptions) -> EndpointResult<Node> {
        self.inner.load_node(ctx, p, opts).await
    }

    async fn walk(&self, ctx: &CallContext, opts: &WalkOptions, visit: &mut WalkFn<'_>) -> EndpointResult<()> {
        self.inner.walk(ctx, opts, visit).await
    }

    async fn watch(&self, ctx: &CallContext, p: &str) -> EndpointResult<WatchHandle> {
        self.inner.watch(ctx, p).await
    }

    async fn compute_checksum(&self, ctx: &CallContext, node: &mut Node) -> EndpointResult<()> {
        self.inner.compute_checksum(ctx, node).await
    }

    async fn create_node(&self, ctx: &CallContext, node: &Node, update_if_exists: bool) -> EndpointResult<()> {
        self.inner.create_node(ctx, node, update_if_exists).await
    }

    async fn update_node(&self, ctx: &CallContext, node: &Node) -> EndpointResult<()> {
        self.inner.update_node(ctx, node).await
    }

    async fn delete_node(&self, ctx: &CallContext, p: &str) -> EndpointResult<()> {
        self.inner.delete_node(ctx, p).await
    }

    async fn move_node(&self, ctx: &CallContext, old_path: &str, new_path: &str) -> EndpointResult<()> {
        self.inner.move_node(ctx, old_path, new_path).await
    }

    async fn get_writer_on(&self, ctx: &CallContext, p: &str, expected_size: u64) -> EndpointResult<NodeWriter> {
        self.inner.get_writer_on(ctx, p, expected_size).await
    }

    async fn get_reader_on(&self, ctx: &CallContext, p: &str) -> EndpointResult<NodeReader> {
        self.inner.get_reader_on(ctx, p).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RemoteConfig {
        RemoteConfig {
            url: "https://cloud.example".into(),
            user: "alice".into(),
            password: "pw".into(),
            client_id: "strata-front".into(),
            client_secret: "abc".into(),
        }
    }

    #[tokio::test]
    async fn test_calls_run_as_remote_user() {
        let connector = MemoryRemoteConnector::new();
        let router = connector.connect(&config()).unwrap();
        let endpoint = RemoteEndpoint::new(router, config(), "personal", RouterSettings::default());

        assert_eq!(endpoint.endpoint_info().uri, "https://cloud.example/personal");

        let ctx = CallContext::new();
        endpoint.create_node(&ctx, &Node::collection("docs"), true).await.unwrap();
        let service = connector.service("https://cloud.example").unwrap();
        assert!(service.contains("personal/docs/.strata"));
        assert_eq!(service.last_identity(), Some(Identity::user("alice")));
    }

    #[test]
    fn test_connector_validates_config() {
        let mut bad = config();
        bad.client_secret.clear();
        assert!(MemoryRemoteConnector::new().connect(&bad).is_err());
    }
}
