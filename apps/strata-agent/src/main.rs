//! # Strata Agent
//!
//! Resolves every configured sync target through the endpoint factory, runs
//! one supervisor per target, and turns operator input into bus commands.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Strata Agent                                   │
//! │                                                                         │
//! │  stdin ──► parse_line ──► ControlBus ──┬──► Supervisor "docs"           │
//! │  Ctrl-C ──► Halt ─────────────┘        └──► Supervisor "photos"         │
//! │                                              │        │                 │
//! │                                           left     right (AnyEndpoint)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod console;
mod error;
mod supervisor;

use std::sync::Arc;

use strata_control::{CommandMessage, ControlBus, Topic};
use strata_core::Node;
use strata_endpoint::backends::{MemoryObjectStoreConnector, MemoryRemoteConnector};
use strata_endpoint::{AnyEndpoint, EndpointFactory, MemoryTreeRouter, ResolveOptions, ServiceContext, TreeRouter};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::AgentConfig;
use crate::error::AgentResult;
use crate::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,strata=debug")),
        )
        .with_target(true)
        .init();

    info!("Starting Strata agent...");

    let config = AgentConfig::load(None)?;
    info!(targets = config.targets.len(), bus_capacity = config.bus_capacity, "Configuration loaded");

    let bus = ControlBus::new(config.bus_config())?;
    let router = Arc::new(MemoryTreeRouter::new());
    let factory = EndpointFactory::new(config.factory_settings())
        .with_router(router.clone())
        .with_remote_connector(Arc::new(MemoryRemoteConnector::new()))
        .with_object_store_connector(Arc::new(MemoryObjectStoreConnector::new()));

    let mut supervisors = Vec::new();
    for target in &config.targets {
        let left_opts = ResolveOptions {
            peer_uri: Some(target.right.clone()),
            browse_only: target.browse_only,
        };
        let left = factory.resolve(&target.left, &left_opts)?;
        let right = factory.resolve(&target.right, &ResolveOptions::default().with_peer(&target.left))?;
        for endpoint in [&left, &right] {
            seed_router_root(&router, endpoint).await?;
        }

        let supervisor = Supervisor::new(&target.id, left, right);
        let subscription = bus.subscribe(&supervisor.topics());
        info!(target_id = %supervisor.id(), "Supervisor registered");
        supervisors.push(tokio::spawn(supervisor.run(subscription)));
    }

    read_commands(&bus).await;

    for handle in supervisors {
        match handle.await {
            Ok(state) => info!(state = %state, "Supervisor finished"),
            Err(e) => error!(error = %e, "Supervisor task failed"),
        }
    }
    info!("Agent shutdown complete");
    Ok(())
}

/// Creates the namespace root of a router endpoint in the in-process tree.
async fn seed_router_root(router: &MemoryTreeRouter, endpoint: &AnyEndpoint) -> AgentResult<()> {
    if let AnyEndpoint::Router(ep) = endpoint {
        let root = ep.root().as_str();
        if !root.is_empty() {
            router
                .create_node(&ServiceContext::system(), Node::collection(root))
                .await?;
        }
    }
    Ok(())
}

/// Publishes operator commands until Halt is issued or input ends.
async fn read_commands(bus: &ControlBus) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Input closed");
                break;
            }
            Err(e) => {
                error!(error = %e, "Failed to read input");
                break;
            }
        };

        match console::parse_line(&line) {
            Ok(Some((topic, message))) => {
                let reached = bus.publish(&topic, message);
                info!(topic = %topic, message = %message, reached, "Command published");
                if message == CommandMessage::Halt && topic == Topic::Global {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) if e.is_user_error() => warn!(input = %line.trim(), "{}", e),
            Err(e) => error!(input = %line.trim(), error = %e, "Failed to handle command"),
        }
    }
    bus.publish(&Topic::Global, CommandMessage::Halt);
}
