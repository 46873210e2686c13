//! Poll lifecycle: collecting one round of votes from a sample of validators.

mod early_term;
mod set;

use std::fmt;

use avalanche_ids::{Id, NodeId};
use avalanche_utils::Bag;

pub use early_term::{EarlyTermPoll, NoEarlyTermPoll};
pub use set::PollSet;

/// One round of votes.
pub trait Poll: fmt::Debug + Send + Sync {
    /// Records `node`'s vote. A node that answers twice keeps its last vote;
    /// nodes that were not polled are ignored.
    fn vote(&mut self, node: &NodeId, vote: Id);

    /// Records that `node` will not answer. A vote already received is kept.
    fn drop_vote(&mut self, node: &NodeId);

    fn finished(&self) -> bool;

    /// Votes received so far, each weighted by how often its voter was sampled.
    fn result(&self) -> Bag<Id>;
}

/// Builds the polls for a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollFactory {
    /// Finish as soon as the outcome can no longer change.
    EarlyTerm { alpha: usize },
    /// Wait for every polled node.
    NoEarlyTerm,
}

impl PollFactory {
    pub fn new(alpha: usize, early_termination: bool) -> Self {
        if early_termination {
            Self::EarlyTerm { alpha }
        } else {
            Self::NoEarlyTerm
        }
    }

    pub fn new_poll(&self, polled: Bag<NodeId>) -> Box<dyn Poll> {
        match *self {
            Self::EarlyTerm { alpha } => Box::new(EarlyTermPoll::new(alpha, polled)),
            Self::NoEarlyTerm => Box::new(NoEarlyTermPoll::new(polled)),
        }
    }
}
