//! Error types for the live portfolio agent.
//!
//! Only failures the agent cannot route around become an [`AgentError`].
//! A single strategy misbehaving (panicking internals aside) or an
//! optimizer returning a degenerate result is logged as a warning and
//! handled with a safe default (keep previous weights, skip the tick) —
//! see [`crate::agent::LiveAgent`] — rather than aborting the whole agent.

use portfolio_broker::BrokerError;

/// Errors that can abort the agent's control loop or a persistence operation.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Bad agent configuration supplied by the caller (empty roster,
    /// non-positive target volatility, ...). Caught at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The broker façade returned an error the agent couldn't treat as
    /// transient (e.g. failed to connect at startup).
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Reading or writing the persisted agent state failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    /// The persisted state file was present but not valid JSON for the
    /// expected shape.
    #[error("corrupt state file: {0}")]
    CorruptState(#[from] serde_json::Error),

    /// An unrecoverable condition that should stop the agent rather than
    /// be retried — distinct from `Broker`/`Persistence` because it isn't
    /// tied to a specific subsystem (e.g. a startup flatten left a
    /// non-zero position the caller asked to treat as fatal).
    #[error("fatal agent error: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
