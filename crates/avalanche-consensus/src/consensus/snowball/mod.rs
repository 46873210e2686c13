//! Snowball consensus.
//!
//! Snowball repeatedly samples `k` validators and counts a poll as
//! successful when at least `alpha` of them prefer the same choice. A choice
//! is finalized after `beta` consecutive successful polls in its favour.
//!
//! - [`UnarySnowball`], [`BinarySnowball`], [`NnarySnowball`]: the counters
//! - [`Flat`]: one n-ary counter over every choice
//! - [`Tree`]: a trie of unary and binary counters over the choice bits

mod binary;
mod flat;
mod nnary;
mod tree;
mod unary;

use std::fmt;

use avalanche_ids::Id;
use avalanche_utils::Bag;
use serde::{Deserialize, Serialize};

use crate::Parameters;

pub use binary::BinarySnowball;
pub use flat::Flat;
pub use nnary::NnarySnowball;
pub use tree::Tree;
pub use unary::UnarySnowball;

/// A snowball instance deciding among a growing set of choices.
pub trait Consensus: fmt::Debug + Send + Sync {
    /// Adds a new choice. Adding a known choice is a no-op.
    fn add(&mut self, choice: Id);

    /// Currently preferred choice.
    fn preference(&self) -> Id;

    /// Applies a poll. Returns true if some choice reached `alpha` votes.
    ///
    /// `votes` should only name choices that were added.
    fn record_poll(&mut self, votes: &Bag<Id>) -> bool;

    /// Resets the confidence built so far.
    fn record_unsuccessful_poll(&mut self);

    /// True once the preference can no longer change.
    fn finalized(&self) -> bool;
}

/// Which snowball variant decides between siblings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factory {
    Flat,
    #[default]
    Tree,
}

impl Factory {
    /// Creates an instance whose only choice is `choice`.
    pub fn new_consensus(&self, params: &Parameters, choice: Id) -> Box<dyn Consensus> {
        match self {
            Factory::Flat => Box::new(Flat::new(params, choice)),
            Factory::Tree => Box::new(Tree::new(params, choice)),
        }
    }
}
