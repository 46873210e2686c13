//! Per-chain inbound message loop.
//!
//! Every message for a chain, whether a peer answer, a synthetic timeout or
//! a VM notification, goes through one queue. The handler applies them one
//! at a time while holding the engine lock, so consensus state is only ever
//! mutated by a single task.

use std::sync::Arc;
use std::time::Duration;

use avalanche_ids::{Id, NodeId};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::engine::Transitive;
use crate::vm::VmMessage;
use crate::{ConsensusError, Result};

/// Messages delivered to a chain's engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    PullQuery {
        node: NodeId,
        request_id: u32,
        block_id: Id,
    },
    PushQuery {
        node: NodeId,
        request_id: u32,
        block: Vec<u8>,
    },
    Chits {
        node: NodeId,
        request_id: u32,
        preferred: Id,
        accepted: Id,
    },
    QueryFailed {
        node: NodeId,
        request_id: u32,
    },
    Get {
        node: NodeId,
        request_id: u32,
        block_id: Id,
    },
    Put {
        node: NodeId,
        request_id: u32,
        block: Vec<u8>,
    },
    GetFailed {
        node: NodeId,
        request_id: u32,
    },
    GetAncestors {
        node: NodeId,
        request_id: u32,
        block_id: Id,
    },
    Ancestors {
        node: NodeId,
        request_id: u32,
        blocks: Vec<Vec<u8>>,
    },
    GetAncestorsFailed {
        node: NodeId,
        request_id: u32,
    },
    GetAcceptedFrontier {
        node: NodeId,
        request_id: u32,
    },
    AcceptedFrontier {
        node: NodeId,
        request_id: u32,
        container_id: Id,
    },
    GetAcceptedFrontierFailed {
        node: NodeId,
        request_id: u32,
    },
    GetAccepted {
        node: NodeId,
        request_id: u32,
        container_ids: Vec<Id>,
    },
    Accepted {
        node: NodeId,
        request_id: u32,
        container_ids: Vec<Id>,
    },
    GetAcceptedFailed {
        node: NodeId,
        request_id: u32,
    },
    /// Periodic tick to gossip the last accepted block.
    Gossip,
    /// Notification from the chain's own VM.
    Vm(VmMessage),
}

impl InboundMessage {
    /// Peer the message came from; `None` for VM notifications.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::PullQuery { node, .. }
            | Self::PushQuery { node, .. }
            | Self::Chits { node, .. }
            | Self::QueryFailed { node, .. }
            | Self::Get { node, .. }
            | Self::Put { node, .. }
            | Self::GetFailed { node, .. }
            | Self::GetAncestors { node, .. }
            | Self::Ancestors { node, .. }
            | Self::GetAncestorsFailed { node, .. }
            | Self::GetAcceptedFrontier { node, .. }
            | Self::AcceptedFrontier { node, .. }
            | Self::GetAcceptedFrontierFailed { node, .. }
            | Self::GetAccepted { node, .. }
            | Self::Accepted { node, .. }
            | Self::GetAcceptedFailed { node, .. } => Some(*node),
            Self::Gossip | Self::Vm(_) => None,
        }
    }

    /// Short name for logs.
    pub fn op(&self) -> &'static str {
        match self {
            Self::PullQuery { .. } => "pull_query",
            Self::PushQuery { .. } => "push_query",
            Self::Chits { .. } => "chits",
            Self::QueryFailed { .. } => "query_failed",
            Self::Get { .. } => "get",
            Self::Put { .. } => "put",
            Self::GetFailed { .. } => "get_failed",
            Self::GetAncestors { .. } => "get_ancestors",
            Self::Ancestors { .. } => "ancestors",
            Self::GetAncestorsFailed { .. } => "get_ancestors_failed",
            Self::GetAcceptedFrontier { .. } => "get_accepted_frontier",
            Self::AcceptedFrontier { .. } => "accepted_frontier",
            Self::GetAcceptedFrontierFailed { .. } => "get_accepted_frontier_failed",
            Self::GetAccepted { .. } => "get_accepted",
            Self::Accepted { .. } => "accepted",
            Self::GetAcceptedFailed { .. } => "get_accepted_failed",
            Self::Gossip => "gossip",
            Self::Vm(_) => "vm",
        }
    }
}

pub struct Handler {
    engine: Arc<Mutex<Transitive>>,
    inbound: mpsc::Receiver<InboundMessage>,
    cancel: CancellationToken,
    gossip_frequency: Option<Duration>,
}

impl Handler {
    pub fn new(
        engine: Arc<Mutex<Transitive>>,
        inbound: mpsc::Receiver<InboundMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            inbound,
            cancel,
            gossip_frequency: None,
        }
    }

    /// Injects [`InboundMessage::Gossip`] every `every`. Zero disables it.
    #[must_use]
    pub fn with_gossip_frequency(mut self, every: Duration) -> Self {
        self.gossip_frequency = (!every.is_zero()).then_some(every);
        self
    }

    /// Applies inbound messages until cancelled or the queue closes.
    ///
    /// A fatal error halts the engine, cancels the chain and is returned.
    pub async fn run(mut self) -> Result<()> {
        info!("chain handler started");
        let mut gossip = self.gossip_frequency.map(|every| {
            let mut ticker = time::interval_at(time::Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        loop {
            let msg = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                msg = self.inbound.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
                () = tick(&mut gossip) => InboundMessage::Gossip,
            };

            let op = msg.op();
            let node = msg.node();
            trace!(op, node_id = ?node, "handling message");

            let mut engine = self.engine.lock().await;
            if self.cancel.is_cancelled() {
                break;
            }
            match engine.handle(msg).await {
                Ok(()) => {}
                Err(ConsensusError::Cancelled) => break,
                Err(err) if err.is_fatal() => {
                    error!(op, node_id = ?node, error = %err, "fatal error, halting chain");
                    engine.halt();
                    self.cancel.cancel();
                    return Err(err);
                }
                Err(err) => debug!(op, node_id = ?node, error = %err, "failed to handle message"),
            }
        }
        info!("chain handler stopped");
        Ok(())
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
