//! # Call Context
//!
//! Explicit per-call state threaded through every endpoint operation: who is
//! acting, and the signal that aborts long-running work.
//!
//! ```text
//! caller ──► CallContext { identity: Option<Identity>, cancel }
//!                 │
//!                 │ resolve(default identity)
//!                 ▼
//!            ServiceContext { identity: Identity, cancel } ──► delegate service
//! ```

use std::future::Future;

use strata_core::Identity;
use tokio_util::sync::CancellationToken;

use crate::error::{EndpointError, EndpointResult};

// =============================================================================
// Call Context
// =============================================================================

/// Context supplied by the caller of an endpoint operation.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    identity: Option<Identity>,
    cancel: CancellationToken,
}

impl CallContext {
    /// A context with no identity and a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acts as `identity` instead of the endpoint's default identity.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Uses an existing cancellation token (e.g. a child of a sync loop's).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fills in `default` when the caller did not choose an identity.
    pub fn resolve(&self, default: &Identity) -> ServiceContext {
        ServiceContext {
            identity: self.identity.clone().unwrap_or_else(|| default.clone()),
            cancel: self.cancel.clone(),
        }
    }

    /// Runs `fut` unless the context is cancelled first.
    pub async fn run<T, F>(&self, fut: F) -> EndpointResult<T>
    where
        F: Future<Output = EndpointResult<T>>,
    {
        guarded(&self.cancel, fut).await
    }
}

// =============================================================================
// Service Context
// =============================================================================

/// Context handed to delegate services. The identity is always set.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub identity: Identity,
    pub cancel: CancellationToken,
}

impl ServiceContext {
    /// A system-identity context that is never cancelled.
    pub fn system() -> Self {
        ServiceContext {
            identity: Identity::system(),
            cancel: CancellationToken::new(),
        }
    }

    /// Runs `fut` unless the context is cancelled first.
    pub async fn run<T, F>(&self, fut: F) -> EndpointResult<T>
    where
        F: Future<Output = EndpointResult<T>>,
    {
        guarded(&self.cancel, fut).await
    }
}

async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> EndpointResult<T>
where
    F: Future<Output = EndpointResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(EndpointError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EndpointError::Cancelled),
        result = fut => result,
    }
}
