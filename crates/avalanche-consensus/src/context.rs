//! Per-chain context shared by the consensus components.

use std::fmt;
use std::sync::Arc;

use avalanche_ids::{Id, NodeId};
use avalanche_utils::Clock;
use parking_lot::RwLock;
use tracing::warn;

use crate::{ConsensusError, Result};

/// Receives every accepted container, in acceptance order.
pub trait Acceptor: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    fn accept(&self, chain_id: Id, container_id: Id, bytes: &[u8]) -> Result<()>;
}

/// Identity of the chain plus the hooks consensus calls on decisions.
#[derive(Clone)]
pub struct ConsensusContext {
    pub chain_id: Id,
    pub subnet_id: Id,
    pub node_id: NodeId,
    pub clock: Clock,
    acceptors: Arc<RwLock<Vec<Arc<dyn Acceptor>>>>,
}

impl ConsensusContext {
    pub fn new(chain_id: Id, subnet_id: Id, node_id: NodeId) -> Self {
        Self {
            chain_id,
            subnet_id,
            node_id,
            clock: Clock::new(),
            acceptors: Arc::new(RwLock::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Registers an acceptor. Clones of this context share the registration.
    pub fn register_acceptor(&self, acceptor: Arc<dyn Acceptor>) {
        self.acceptors.write().push(acceptor);
    }

    /// Notifies every registered acceptor of an accepted container.
    ///
    /// A failing acceptor is fatal: the container is already accepted and
    /// the acceptor's view can no longer be reconciled.
    pub fn notify_accepted(&self, container_id: Id, bytes: &[u8]) -> Result<()> {
        let acceptors = self.acceptors.read().clone();
        for acceptor in acceptors {
            if let Err(e) = acceptor.accept(self.chain_id, container_id, bytes) {
                warn!(
                    acceptor = acceptor.name(),
                    %container_id,
                    error = %e,
                    "acceptor failed"
                );
                return Err(ConsensusError::Acceptor {
                    name: acceptor.name().to_string(),
                    id: container_id,
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ConsensusContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsensusContext")
            .field("chain_id", &self.chain_id)
            .field("subnet_id", &self.subnet_id)
            .field("node_id", &self.node_id)
            .field("acceptors", &self.acceptors.read().len())
            .finish_non_exhaustive()
    }
}
