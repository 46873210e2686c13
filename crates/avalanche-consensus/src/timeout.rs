//! Request deadlines.
//!
//! Every request sent to a peer is registered here. If no answer arrives
//! before the deadline, a synthetic failure message is pushed into the
//! chain's inbound queue, so the engine handles a timeout exactly like a
//! failed response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use avalanche_ids::NodeId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::handler::InboundMessage;

/// Kind of request awaiting an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestOp {
    Query,
    Get,
    GetAncestors,
    GetAcceptedFrontier,
    GetAccepted,
}

impl RequestOp {
    /// The message delivered when a request of this kind fails.
    pub fn failed(self, node: NodeId, request_id: u32) -> InboundMessage {
        match self {
            Self::Query => InboundMessage::QueryFailed { node, request_id },
            Self::Get => InboundMessage::GetFailed { node, request_id },
            Self::GetAncestors => InboundMessage::GetAncestorsFailed { node, request_id },
            Self::GetAcceptedFrontier => {
                InboundMessage::GetAcceptedFrontierFailed { node, request_id }
            }
            Self::GetAccepted => InboundMessage::GetAcceptedFailed { node, request_id },
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutManager {
    timeout: Duration,
    inbound: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
    pending: Arc<Mutex<HashMap<(NodeId, u32), CancellationToken>>>,
}

impl TimeoutManager {
    /// Deadlines fire `timeout` after registration into `inbound`, until
    /// `cancel` is cancelled.
    pub fn new(
        timeout: Duration,
        inbound: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            timeout,
            inbound,
            cancel,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Starts the deadline for `request_id` sent to `node`. Re-registering
    /// the same pair restarts it.
    pub fn register(&self, node: NodeId, request_id: u32, op: RequestOp) {
        if self.cancel.is_cancelled() {
            return;
        }
        let key = (node, request_id);
        let token = self.cancel.child_token();
        if let Some(previous) = self.pending.lock().insert(key, token.clone()) {
            previous.cancel();
        }

        let timeout = self.timeout;
        let inbound = self.inbound.clone();
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    let expired = {
                        let mut pending = pending.lock();
                        match pending.get(&key) {
                            Some(current) if !current.is_cancelled() => pending.remove(&key).is_some(),
                            _ => false,
                        }
                    };
                    if !expired {
                        return;
                    }
                    trace!(node_id = %node, request_id, ?op, "request timed out");
                    if inbound.send(op.failed(node, request_id)).await.is_err() {
                        debug!(node_id = %node, request_id, "inbound queue closed, dropping timeout");
                    }
                }
            }
        });
    }

    /// Reports `request_id` to `node` as failed right away, through the
    /// inbound queue like any other failure. Used for undeliverable requests.
    pub fn fail(&self, node: NodeId, request_id: u32, op: RequestOp) {
        if self.cancel.is_cancelled() {
            return;
        }
        let inbound = self.inbound.clone();
        tokio::spawn(async move {
            if inbound.send(op.failed(node, request_id)).await.is_err() {
                debug!(node_id = %node, request_id, "inbound queue closed, dropping failure");
            }
        });
    }

    /// Clears the deadline of an answered request. Returns false if the
    /// request was not outstanding.
    pub fn remove(&self, node: &NodeId, request_id: u32) -> bool {
        match self.pending.lock().remove(&(*node, request_id)) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Cancels every deadline; later registrations are ignored.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.pending.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_node_id;

    fn manager() -> (TimeoutManager, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let timeouts = TimeoutManager::new(Duration::from_secs(2), tx, CancellationToken::new());
        (timeouts, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_request_reports_failure() {
        let (timeouts, mut rx) = manager();
        timeouts.register(make_node_id(1), 7, RequestOp::Query);
        assert_eq!(timeouts.len(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            InboundMessage::QueryFailed {
                node: make_node_id(1),
                request_id: 7
            }
        );
        assert!(timeouts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_request_never_fires() {
        let (timeouts, mut rx) = manager();
        timeouts.register(make_node_id(1), 7, RequestOp::GetAncestors);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(timeouts.remove(&make_node_id(1), 7));
        assert!(!timeouts.remove(&make_node_id(1), 7));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fail_reports_immediately() {
        let (timeouts, mut rx) = manager();
        timeouts.fail(make_node_id(4), 9, RequestOp::GetAccepted);
        assert_eq!(
            rx.recv().await,
            Some(InboundMessage::GetAcceptedFailed {
                node: make_node_id(4),
                request_id: 9
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_everything() {
        let (timeouts, mut rx) = manager();
        timeouts.register(make_node_id(1), 1, RequestOp::Get);
        timeouts.register(make_node_id(2), 2, RequestOp::GetAccepted);
        timeouts.shutdown();
        timeouts.register(make_node_id(3), 3, RequestOp::Query);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert!(timeouts.is_empty());
    }
}
