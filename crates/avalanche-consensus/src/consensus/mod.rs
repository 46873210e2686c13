//! Consensus protocols.
//!
//! - [`snowball`]: repeated-sampling decision over a set of choices
//! - [`snowman`]: linear chain of blocks, one snowball per parent
//! - [`snowstorm`]: conflict graph over transactions
//! - [`avalanche`]: DAG of vertices batching snowstorm transactions

pub mod avalanche;
pub mod snowball;
pub mod snowman;
pub mod snowstorm;

use std::fmt;

use avalanche_ids::Id;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A choice that can be decided upon.
pub trait Decidable: Send + Sync {
    /// Returns the unique identifier for this choice.
    fn id(&self) -> Id;

    /// Returns the status of this choice.
    fn status(&self) -> Status;

    /// Accepts this choice as finalized.
    fn accept(&mut self) -> Result<()>;

    /// Rejects this choice.
    fn reject(&mut self) -> Result<()>;
}

/// Status of a decidable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    /// Not known locally
    #[default]
    Unknown,
    /// Being processed
    Processing,
    /// Accepted and finalized
    Accepted,
    /// Rejected
    Rejected,
}

impl Status {
    /// Returns true if decided (accepted or rejected).
    pub fn decided(&self) -> bool {
        matches!(self, Status::Accepted | Status::Rejected)
    }

    /// Returns true if the item was accepted.
    pub fn accepted(&self) -> bool {
        matches!(self, Status::Accepted)
    }

    /// Returns true if the item was fetched, whatever its outcome.
    pub fn fetched(&self) -> bool {
        !matches!(self, Status::Unknown)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Unknown => write!(f, "Unknown"),
            Status::Processing => write!(f, "Processing"),
            Status::Accepted => write!(f, "Accepted"),
            Status::Rejected => write!(f, "Rejected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status() {
        assert!(!Status::Processing.decided());
        assert!(Status::Accepted.decided());
        assert!(Status::Rejected.decided());
        assert!(Status::Accepted.accepted());
        assert!(!Status::Rejected.accepted());
        assert!(!Status::Unknown.fetched());
        assert!(Status::Processing.fetched());
    }
}
