//! Outbound messages.

use std::collections::HashSet;

use avalanche_ids::{Id, NodeId};

/// Messages consensus sends to peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Ask for a vote on a block the peer is expected to know.
    PullQuery { request_id: u32, block_id: Id },
    /// Ask for a vote, shipping the block along.
    PushQuery { request_id: u32, block: Vec<u8> },
    /// Answer to a query: our preferred tip and last accepted block.
    Chits {
        request_id: u32,
        preferred: Id,
        accepted: Id,
    },
    Get { request_id: u32, block_id: Id },
    Put { request_id: u32, block: Vec<u8> },
    GetAncestors { request_id: u32, block_id: Id },
    /// A block followed by its ancestors, newest first.
    Ancestors { request_id: u32, blocks: Vec<Vec<u8>> },
    GetAcceptedFrontier { request_id: u32 },
    AcceptedFrontier { request_id: u32, container_id: Id },
    GetAccepted {
        request_id: u32,
        container_ids: Vec<Id>,
    },
    Accepted {
        request_id: u32,
        container_ids: Vec<Id>,
    },
}

impl OutboundMessage {
    /// Short name for logs.
    pub fn op(&self) -> &'static str {
        match self {
            Self::PullQuery { .. } => "pull_query",
            Self::PushQuery { .. } => "push_query",
            Self::Chits { .. } => "chits",
            Self::Get { .. } => "get",
            Self::Put { .. } => "put",
            Self::GetAncestors { .. } => "get_ancestors",
            Self::Ancestors { .. } => "ancestors",
            Self::GetAcceptedFrontier { .. } => "get_accepted_frontier",
            Self::AcceptedFrontier { .. } => "accepted_frontier",
            Self::GetAccepted { .. } => "get_accepted",
            Self::Accepted { .. } => "accepted",
        }
    }
}

/// Delivers messages to peers of this chain's subnet.
pub trait Sender: Send + Sync {
    /// Sends `msg` to each of `nodes`, returning the nodes it was handed to.
    /// Nodes missing from the result must be treated as failed responders.
    fn send(&self, msg: OutboundMessage, nodes: &HashSet<NodeId>) -> HashSet<NodeId>;

    /// Sends `msg` to up to `num_peers` random peers.
    fn gossip(&self, msg: OutboundMessage, num_peers: usize);

    /// Convenience for a single recipient.
    fn send_to(&self, msg: OutboundMessage, node: NodeId) -> bool {
        self.send(msg, &HashSet::from([node])).contains(&node)
    }
}
