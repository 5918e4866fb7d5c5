//! Agent error types.

use strata_control::ControlError;
use strata_endpoint::EndpointError;
use thiserror::Error;

pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),
}
