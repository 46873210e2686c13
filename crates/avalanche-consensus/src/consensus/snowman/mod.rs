//! Snowman: consensus on a linear chain of blocks.

mod topological;

use avalanche_ids::Id;
use avalanche_utils::Bag;
use chrono::{DateTime, Utc};

use super::Decidable;
use crate::health::HealthCheck;
use crate::{ConsensusContext, Parameters, Result};

pub use topological::Topological;

/// A block in a linear chain.
pub trait Block: Decidable {
    /// ID of the parent block.
    fn parent(&self) -> Id;

    /// Height of this block; one more than its parent's.
    fn height(&self) -> u64;

    fn timestamp(&self) -> DateTime<Utc>;

    /// Wire representation.
    fn bytes(&self) -> &[u8];

    /// Checks the block against its parent's state.
    fn verify(&self) -> Result<()>;
}

/// A Snowman consensus instance.
pub trait Consensus: HealthCheck + Send + Sync {
    /// Prepares the instance to build on `last_accepted`.
    fn initialize(
        &mut self,
        ctx: ConsensusContext,
        params: Parameters,
        last_accepted_id: Id,
        last_accepted_height: u64,
        last_accepted_time: DateTime<Utc>,
    ) -> Result<()>;

    /// Number of blocks added but not yet decided.
    fn num_processing(&self) -> usize;

    /// Adds a block whose parent is processing, last accepted or decided.
    /// A block whose parent was rejected is rejected immediately.
    fn add(&mut self, block: Box<dyn Block>) -> Result<()>;

    /// True if the block was accepted or rejected.
    fn decided(&self, block: &dyn Block) -> bool;

    /// True if the block is currently being decided.
    fn processing(&self, id: &Id) -> bool;

    /// True if the block is on the preferred chain.
    fn is_preferred(&self, id: &Id) -> bool;

    fn last_accepted(&self) -> (Id, u64);

    /// Tip of the preferred chain.
    fn preference(&self) -> Id;

    /// A processing block.
    fn get(&self, id: &Id) -> Option<&dyn Block>;

    /// Applies the votes of a successful poll, accepting and rejecting
    /// blocks as their decisions finalize.
    fn record_poll(&mut self, votes: &Bag<Id>) -> Result<()>;

    /// Resets the confidence of every processing decision.
    fn record_unsuccessful_poll(&mut self);

    /// True when no block is processing.
    fn finalized(&self) -> bool;
}
