//! # Sync Supervisor
//!
//! One supervisor per configured target. It owns the target's two endpoints
//! and reacts to bus commands.
//!
//! ```text
//!            Pause               Disable
//!  Running ─────────► Paused ──────────────► Disabled
//!     ▲  ◄─────────     │                       │
//!     │     Resume      └──── Disable ──────────┤
//!     └──────────────────── Enable ─────────────┘
//!
//!  Halt from any state ──► Halted (terminal)
//! ```
//!
//! Resync, ResyncDry and SyncLoop run a pass only while Running.

use std::fmt;

use strata_control::{CommandMessage, Subscription, Topic};
use strata_endpoint::{AnyEndpoint, CallContext, Endpoint, EndpointResult, WalkOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    Paused,
    Disabled,
    Halted,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Running => "running",
            SupervisorState::Paused => "paused",
            SupervisorState::Disabled => "disabled",
            SupervisorState::Halted => "halted",
        };
        f.write_str(s)
    }
}

/// Node counts observed by one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub left_nodes: usize,
    pub right_nodes: usize,
    pub dry_run: bool,
}

pub struct Supervisor {
    id: String,
    left: AnyEndpoint,
    right: AnyEndpoint,
    state: SupervisorState,
    passes: u64,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(id: impl Into<String>, left: AnyEndpoint, right: AnyEndpoint) -> Self {
        Supervisor {
            id: id.into(),
            left,
            right,
            state: SupervisorState::Running,
            passes: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Topics this supervisor listens on.
    pub fn topics(&self) -> Vec<Topic> {
        vec![Topic::Global, Topic::SyncAll, Topic::sync(&self.id)]
    }

    /// Consumes bus deliveries until halted or the bus goes away.
    pub async fn run(mut self, mut subscription: Subscription) -> SupervisorState {
        info!(target_id = %self.id, left = %self.left.endpoint_info().uri, right = %self.right.endpoint_info().uri, "Supervisor started");
        while let Some(delivery) = subscription.recv().await {
            debug!(target_id = %self.id, topic = %delivery.topic, message = %delivery.message, "Command received");
            if let Some(report) = self.handle(delivery.message).await {
                info!(
                    target_id = %self.id,
                    left_nodes = report.left_nodes,
                    right_nodes = report.right_nodes,
                    dry_run = report.dry_run,
                    "Sync pass complete"
                );
            }
            if self.state() == SupervisorState::Halted {
                break;
            }
        }
        info!(target_id = %self.id, passes = self.passes(), dropped = subscription.dropped(), "Supervisor stopped");
        self.state()
    }

    /// Applies one command. Returns the report of the pass it ran, if any.
    pub async fn handle(&mut self, message: CommandMessage) -> Option<PassReport> {
        use CommandMessage::*;
        use SupervisorState::*;

        if self.state == Halted {
            return None;
        }

        match (message, self.state) {
            (Halt, _) => {
                self.cancel.cancel();
                self.state = Halted;
            }
            (Restart, _) => {
                info!(target_id = %self.id, "Restarting");
                self.state = Running;
            }
            (Pause, Running) => self.state = Paused,
            (Resume, Paused) => self.state = Running,
            (Disable, Running | Paused) => self.state = Disabled,
            (Enable, Disabled) => self.state = Running,
            (Resync | ResyncDry | SyncLoop, Running) => {
                return self.pass(message == ResyncDry).await;
            }
            (PublishState, state) => {
                info!(target_id = %self.id, state = %state, passes = self.passes, "State snapshot");
            }
            (message, state) => {
                debug!(target_id = %self.id, message = %message, state = %state, "Command ignored in current state");
            }
        }
        None
    }

    async fn pass(&mut self, dry_run: bool) -> Option<PassReport> {
        let ctx = CallContext::new().with_cancellation(self.cancel.child_token());
        match self.count_both(&ctx).await {
            Ok((left_nodes, right_nodes)) => {
                self.passes += 1;
                Some(PassReport {
                    left_nodes,
                    right_nodes,
                    dry_run,
                })
            }
            Err(e) => {
                error!(target_id = %self.id, error = %e, "Sync pass failed");
                None
            }
        }
    }

    async fn count_both(&self, ctx: &CallContext) -> EndpointResult<(usize, usize)> {
        let opts = WalkOptions::default();
        let left = self.left.collect_nodes(ctx, &opts).await?;
        let right = self.right.collect_nodes(ctx, &opts).await?;
        Ok((left.len(), right.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strata_control::ControlBus;
    use strata_core::Node;
    use strata_endpoint::{EndpointFactory, FactorySettings, MemoryTreeRouter, ResolveOptions};

    async fn supervisor() -> Supervisor {
        let factory = EndpointFactory::new(FactorySettings::default())
            .with_router(Arc::new(MemoryTreeRouter::new()));
        let left = factory.resolve("db://", &ResolveOptions::default()).unwrap();
        let right = factory.resolve("router:///", &ResolveOptions::default()).unwrap();

        let ctx = CallContext::new();
        left.create_node(&ctx, &Node::collection("docs"), false).await.unwrap();
        left.create_node(&ctx, &Node::leaf("docs/a.txt"), false).await.unwrap();
        right.create_node(&ctx, &Node::leaf("b.txt"), false).await.unwrap();
        Supervisor::new("docs", left, right)
    }

    #[tokio::test]
    async fn test_resync_counts_both_sides() {
        let mut sup = supervisor().await;
        let report = sup.handle(CommandMessage::Resync).await.unwrap();
        assert_eq!(report.left_nodes, 2);
        assert_eq!(report.right_nodes, 1);
        assert!(!report.dry_run);
        assert!(sup.handle(CommandMessage::ResyncDry).await.unwrap().dry_run);
        assert_eq!(sup.passes(), 2);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let mut sup = supervisor().await;
        sup.handle(CommandMessage::Pause).await;
        assert_eq!(sup.state(), SupervisorState::Paused);
        assert!(sup.handle(CommandMessage::SyncLoop).await.is_none());

        sup.handle(CommandMessage::Enable).await;
        assert_eq!(sup.state(), SupervisorState::Paused);
        sup.handle(CommandMessage::Resume).await;
        assert_eq!(sup.state(), SupervisorState::Running);

        sup.handle(CommandMessage::Disable).await;
        assert_eq!(sup.state(), SupervisorState::Disabled);
        sup.handle(CommandMessage::Resume).await;
        assert_eq!(sup.state(), SupervisorState::Disabled);
        sup.handle(CommandMessage::Enable).await;
        assert_eq!(sup.state(), SupervisorState::Running);

        sup.handle(CommandMessage::Halt).await;
        assert_eq!(sup.state(), SupervisorState::Halted);
        sup.handle(CommandMessage::Restart).await;
        assert_eq!(sup.state(), SupervisorState::Halted);
    }

    #[tokio::test]
    async fn test_run_stops_on_global_halt() {
        let bus = ControlBus::default();
        let sup = supervisor().await;
        let subscription = bus.subscribe(&sup.topics());
        let task = tokio::spawn(sup.run(subscription));

        assert_eq!(bus.publish(&Topic::sync("docs"), CommandMessage::Pause), 1);
        assert_eq!(bus.publish(&Topic::sync("other"), CommandMessage::Resume), 0);
        assert_eq!(bus.publish(&Topic::Global, CommandMessage::Halt), 1);

        assert_eq!(task.await.unwrap(), SupervisorState::Halted);
    }
}
