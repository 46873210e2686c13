//! Avalanche: consensus on a DAG of vertices, each batching transactions.
//!
//! Transaction conflicts are decided by a [`Directed`](super::snowstorm::Directed)
//! graph; a vertex is accepted once its parents and all of its transactions
//! are accepted, and rejected as soon as any of them is rejected.

mod topological;

use avalanche_ids::Id;

use super::snowstorm::Tx;
use super::Decidable;

pub use topological::Topological;

/// A DAG vertex.
pub trait Vertex: Decidable {
    fn parents(&self) -> Vec<Id>;

    /// One more than the highest parent.
    fn height(&self) -> u64;

    fn txs(&self) -> Vec<Box<dyn Tx>>;

    fn bytes(&self) -> &[u8];
}
