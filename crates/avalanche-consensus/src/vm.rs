//! VM traits for consensus integration.
//!
//! The engine drives a chain VM through [`ChainVm`]: it parses blocks
//! received from peers, asks for new blocks when transactions are pending,
//! and reports the preferred tip after every poll.

use async_trait::async_trait;

use avalanche_ids::Id;

use crate::consensus::snowman::Block;
use crate::health::HealthReport;
use crate::Result;

/// Messages a VM sends to its engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmMessage {
    /// Transactions are waiting to be included in a block.
    PendingTxs,
}

/// Linear chain VM (Snowman).
#[async_trait]
pub trait ChainVm: Send + Sync {
    /// Parses a block from its wire representation.
    async fn parse_block(&self, bytes: &[u8]) -> Result<Box<dyn Block>>;

    /// Builds a block on top of the current preference.
    async fn build_block(&self) -> Result<Box<dyn Block>>;

    /// Gets a block the VM already stores, decided or not.
    async fn get_block(&self, id: Id) -> Result<Option<Box<dyn Block>>>;

    /// Sets the block new blocks should be built on.
    async fn set_preference(&self, id: Id) -> Result<()>;

    /// Returns the last accepted block ID.
    async fn last_accepted(&self) -> Result<Id>;

    /// Performs a health check.
    async fn health_check(&self) -> Result<HealthReport> {
        Ok(HealthReport::healthy())
    }
}
