//! Avalanche consensus (Snow family).
//!
//! This crate provides the leaderless consensus protocols used by Avalanche
//! chains and the machinery that drives them.
//!
//! # Architecture
//!
//! - **Snowball**: repeated-sampling decision counters (unary, binary, n-ary, tree)
//! - **Snowman**: linear chain consensus, one snowball per parent block
//! - **Snowstorm / Avalanche**: transaction conflict graph under a vertex DAG
//! - **Poll**: vote aggregation with early termination
//! - **Engine / Handler**: per-chain message loop issuing blocks and polls
//! - **Benchlist**: temporarily skips validators that keep failing
//! - **Bootstrapper**: catches a chain up through a dependency-ordered job queue
//!
//! # Example
//!
//! ```
//! use avalanche_consensus::consensus::snowball::{Consensus, Factory};
//! use avalanche_consensus::Parameters;
//! use avalanche_ids::Id;
//! use avalanche_utils::Bag;
//!
//! let params = Parameters::new(1, 1, 1, 1);
//! let choice = Id::EMPTY.prefix(&[0]);
//! let mut snowball = Factory::Tree.new_consensus(&params, choice);
//! snowball.record_poll(&Bag::of([choice]));
//! assert!(snowball.finalized());
//! ```

pub mod benchlist;
pub mod bootstrapper;
mod config;
pub mod consensus;
mod context;
pub mod engine;
mod error;
pub mod handler;
pub mod health;
mod parameters;
pub mod poll;
pub mod queue;
pub mod sender;
pub mod timeout;
pub mod validators;
pub mod vm;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use benchlist::{Benchable, Benchlist, BenchlistConfig};
pub use bootstrapper::{BootstrapConfig, BootstrapPhase, Bootstrapper};
pub use config::{ConfigError, EngineConfig};
pub use consensus::{Decidable, Status};
pub use context::{Acceptor, ConsensusContext};
pub use engine::{EngineState, Transitive};
pub use error::{ConsensusError, Result};
pub use handler::{Handler, InboundMessage};
pub use health::{HealthCheck, HealthReport};
pub use parameters::Parameters;
pub use validators::{Validator, ValidatorSet, ValidatorState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_default() {
        let params = Parameters::default();
        assert!(params.k > 0);
        assert!(params.alpha > params.k / 2);
        assert!(params.alpha <= params.k);
        assert!(params.validate().is_ok());
    }
}
