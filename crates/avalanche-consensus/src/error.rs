//! Error types for consensus.

use avalanche_ids::{Id, NodeId};
use thiserror::Error;

/// Result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Errors that can occur during consensus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// Invalid consensus parameters
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Instance used before `initialize`
    #[error("consensus instance not initialized")]
    NotInitialized,

    /// Item was already accepted or rejected
    #[error("{0} has already been decided")]
    AlreadyDecided(Id),

    /// Item is already processing
    #[error("{0} was already added")]
    DuplicateAdd(Id),

    /// Block whose parent is neither processing nor decided
    #[error("parent {parent} of block {id} is unknown")]
    UnknownParent { id: Id, parent: Id },

    /// Vertex or transaction dependency that was never issued
    #[error("dependency {dependency} of {id} is unknown")]
    UnknownDependency { id: Id, dependency: Id },

    /// Block not found
    #[error("block not found: {0}")]
    BlockNotFound(Id),

    /// Invalid block
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// Accept or reject callback on a decided item failed
    #[error("failed to {action} {id}: {reason}")]
    Decision {
        action: &'static str,
        id: Id,
        reason: String,
    },

    /// An acceptor rejected a notification
    #[error("acceptor {name} failed on {id}: {reason}")]
    Acceptor {
        name: String,
        id: Id,
        reason: String,
    },

    /// Engine not in correct state
    #[error("invalid engine state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Not enough validators to sample
    #[error("insufficient validators: need {needed}, have {have}")]
    InsufficientValidators { needed: usize, have: usize },

    /// A bootstrap dependency could not be fetched
    #[error("bootstrapping abandoned {dropped} job(s) waiting on {dependency}")]
    BootstrapAbandoned { dependency: Id, dropped: usize },

    /// Response from a peer that was not asked
    #[error("unexpected response from {node} for request {request_id}")]
    UnexpectedResponse { node: NodeId, request_id: u32 },

    /// Work was cancelled before it could be applied
    #[error("operation cancelled")]
    Cancelled,

    /// VM error
    #[error("vm error: {0}")]
    Vm(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConsensusError {
    /// Fatal errors leave the chain in a state that cannot safely make
    /// progress; the handler halts the engine when it sees one.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Decision { .. }
                | Self::Acceptor { .. }
                | Self::BootstrapAbandoned { .. }
                | Self::Internal(_)
        )
    }
}
