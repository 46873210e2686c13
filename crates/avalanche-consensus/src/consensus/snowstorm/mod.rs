//! Snowstorm: consensus on a graph of conflicting transactions.

mod directed;

use avalanche_ids::Id;

use super::Decidable;
use crate::Result;

pub use directed::Directed;

/// A transaction. Two transactions conflict when their inputs overlap.
pub trait Tx: Decidable {
    /// Transactions that must be accepted before this one.
    fn dependencies(&self) -> Vec<Id>;

    /// State this transaction consumes.
    fn input_ids(&self) -> Vec<Id>;

    fn bytes(&self) -> &[u8];

    fn verify(&self) -> Result<()>;
}
