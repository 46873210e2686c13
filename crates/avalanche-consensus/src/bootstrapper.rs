//! Chain bootstrapper.
//!
//! Brings a chain from its last accepted block up to the network's accepted
//! frontier before consensus starts:
//! 1. Ask a sample of validators for their accepted frontier.
//! 2. Ask the same validators which of those blocks they accepted; keep the
//!    blocks at least `frontier_alpha` of them vouch for.
//! 3. Fetch the missing blocks and their ancestors with `GetAncestors`.
//! 4. Execute (verify and accept) fetched blocks oldest first through the
//!    job queue, then hand off to the consensus engine.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use avalanche_ids::{Id, NodeId};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConfigError;
use crate::consensus::snowman::Block;
use crate::queue::{Job, Jobs};
use crate::sender::{OutboundMessage, Sender};
use crate::timeout::{RequestOp, TimeoutManager};
use crate::validators::ValidatorState;
use crate::vm::ChainVm;
use crate::{ConsensusContext, ConsensusError, Result, Status};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Validators asked for their accepted frontier.
    pub frontier_sample_size: usize,
    /// Sampled validators that must report a block accepted before it is
    /// fetched. Capped at the number of validators actually sampled.
    pub frontier_alpha: usize,
    /// Most blocks returned in one `Ancestors` answer.
    pub max_ancestors: usize,
    /// `GetAncestors` requests in flight at once.
    pub max_outstanding_requests: usize,
    /// Attempts per block, and per frontier or accepted round that nobody
    /// answers, before bootstrapping gives up.
    pub max_retries: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            frontier_sample_size: 20,
            frontier_alpha: 14,
            max_ancestors: 2048,
            max_outstanding_requests: 32,
            max_retries: 3,
        }
    }
}

impl BootstrapConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.frontier_sample_size == 0 {
            return Err(ConfigError::Invalid(
                "bootstrap frontier_sample_size must be positive".into(),
            ));
        }
        if self.frontier_alpha == 0 || self.frontier_alpha > self.frontier_sample_size {
            return Err(ConfigError::Invalid(format!(
                "bootstrap frontier_alpha must be in [1, {}], got {}",
                self.frontier_sample_size, self.frontier_alpha
            )));
        }
        if self.max_ancestors == 0 || self.max_outstanding_requests == 0 || self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "bootstrap max_ancestors, max_outstanding_requests and max_retries must be positive"
                    .into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Idle,
    FetchingFrontier,
    FetchingAccepted,
    FetchingAncestors,
    Complete,
    Failed,
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::FetchingFrontier => "fetching_frontier",
            Self::FetchingAccepted => "fetching_accepted",
            Self::FetchingAncestors => "fetching_ancestors",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Verifies and accepts a fetched block once its parent is accepted.
pub struct BlockJob {
    ctx: ConsensusContext,
    block: Box<dyn Block>,
}

impl BlockJob {
    pub fn new(ctx: ConsensusContext, block: Box<dyn Block>) -> Self {
        Self { ctx, block }
    }
}

impl Job for BlockJob {
    fn id(&self) -> Id {
        self.block.id()
    }

    fn dependencies(&self) -> Vec<Id> {
        vec![self.block.parent()]
    }

    fn execute(&mut self) -> Result<()> {
        let id = self.block.id();
        if self.block.status() == Status::Accepted {
            return Ok(());
        }
        self.block.verify()?;
        self.block.accept().map_err(|e| ConsensusError::Decision {
            action: "accept",
            id,
            reason: e.to_string(),
        })?;
        debug!(block = %id, height = self.block.height(), "bootstrapped block");
        self.ctx.notify_accepted(id, self.block.bytes())
    }
}

#[derive(Debug, Clone, Copy)]
struct Fetch {
    node: NodeId,
    block_id: Id,
    attempts: usize,
}

/// Called with the last accepted block once bootstrapping completes.
pub type OnBootstrapped = Box<dyn FnOnce(Id) + Send + Sync>;

pub struct Bootstrapper {
    config: BootstrapConfig,
    ctx: ConsensusContext,
    vm: Arc<dyn ChainVm>,
    sender: Arc<dyn Sender>,
    validators: Arc<dyn ValidatorState>,
    timeouts: TimeoutManager,
    cancel: CancellationToken,
    on_bootstrapped: Option<OnBootstrapped>,

    phase: BootstrapPhase,
    next_request_id: u32,
    /// Request ID of the current frontier or accepted round.
    round: u32,
    /// Rounds of the current phase that ended without a single answer.
    failed_rounds: usize,
    /// Peers that answered the current round.
    responded: usize,
    last_accepted: Id,
    peers: Vec<NodeId>,
    awaiting: HashSet<NodeId>,
    frontier: HashSet<Id>,
    accepted_votes: HashMap<Id, usize>,
    fetching: HashMap<u32, Fetch>,
    to_fetch: VecDeque<(Id, usize)>,
    jobs: Jobs,
    started_at: Option<Instant>,
}

impl Bootstrapper {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BootstrapConfig,
        ctx: ConsensusContext,
        vm: Arc<dyn ChainVm>,
        sender: Arc<dyn Sender>,
        validators: Arc<dyn ValidatorState>,
        timeouts: TimeoutManager,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            ctx,
            vm,
            sender,
            validators,
            timeouts,
            cancel,
            on_bootstrapped: None,
            phase: BootstrapPhase::Idle,
            next_request_id: 0,
            round: 0,
            failed_rounds: 0,
            responded: 0,
            last_accepted: Id::EMPTY,
            peers: Vec::new(),
            awaiting: HashSet::new(),
            frontier: HashSet::new(),
            accepted_votes: HashMap::new(),
            fetching: HashMap::new(),
            to_fetch: VecDeque::new(),
            jobs: Jobs::new(),
            started_at: None,
        }
    }

    pub fn on_bootstrapped(&mut self, callback: OnBootstrapped) {
        self.on_bootstrapped = Some(callback);
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    pub fn is_bootstrapping(&self) -> bool {
        !matches!(
            self.phase,
            BootstrapPhase::Idle | BootstrapPhase::Complete | BootstrapPhase::Failed
        )
    }

    /// Blocks executed so far.
    pub fn executed(&self) -> usize {
        self.jobs.num_executed()
    }

    /// First request ID not used by the bootstrapper.
    pub fn next_request_id(&self) -> u32 {
        self.next_request_id
    }

    pub async fn start(&mut self) -> Result<()> {
        self.ensure_running()?;
        if self.phase != BootstrapPhase::Idle {
            return Err(ConsensusError::InvalidState {
                expected: BootstrapPhase::Idle.to_string(),
                actual: self.phase.to_string(),
            });
        }
        self.started_at = Some(self.ctx.clock.now());

        self.last_accepted = self.vm.last_accepted().await?;
        self.jobs.fulfill(self.last_accepted)?;

        self.sample_peers()?;
        info!(peers = self.peers.len(), "starting bootstrap");
        if self.peers.is_empty() {
            return self.finish().await;
        }

        self.phase = BootstrapPhase::FetchingFrontier;
        self.send_phase_round();
        self.advance().await
    }

    pub async fn accepted_frontier(
        &mut self,
        node: NodeId,
        request_id: u32,
        container_id: Id,
    ) -> Result<()> {
        self.ensure_running()?;
        if !self.answer_round(BootstrapPhase::FetchingFrontier, node, request_id) {
            return Ok(());
        }
        self.responded += 1;
        self.frontier.insert(container_id);
        self.advance().await
    }

    pub async fn get_accepted_frontier_failed(&mut self, node: NodeId, request_id: u32) -> Result<()> {
        self.ensure_running()?;
        if !self.answer_round(BootstrapPhase::FetchingFrontier, node, request_id) {
            return Ok(());
        }
        self.advance().await
    }

    pub async fn accepted(
        &mut self,
        node: NodeId,
        request_id: u32,
        container_ids: Vec<Id>,
    ) -> Result<()> {
        self.ensure_running()?;
        if !self.answer_round(BootstrapPhase::FetchingAccepted, node, request_id) {
            return Ok(());
        }
        self.responded += 1;
        let unique: HashSet<Id> = container_ids.into_iter().collect();
        for id in unique.into_iter().filter(|id| self.frontier.contains(id)) {
            *self.accepted_votes.entry(id).or_insert(0) += 1;
        }
        self.advance().await
    }

    pub async fn get_accepted_failed(&mut self, node: NodeId, request_id: u32) -> Result<()> {
        self.ensure_running()?;
        if !self.answer_round(BootstrapPhase::FetchingAccepted, node, request_id) {
            return Ok(());
        }
        self.advance().await
    }

    /// Handles a block and its ancestors, newest first.
    pub async fn ancestors(
        &mut self,
        node: NodeId,
        request_id: u32,
        blocks: Vec<Vec<u8>>,
    ) -> Result<()> {
        self.ensure_running()?;
        let Some(fetch) = self.take_fetch(node, request_id) else {
            return Ok(());
        };

        let mut expected = fetch.block_id;
        let mut parsed = 0;
        for bytes in blocks.iter().take(self.config.max_ancestors) {
            let block = match self.vm.parse_block(bytes).await {
                Ok(block) => block,
                Err(err) => {
                    debug!(node_id = %node, error = %err, "dropping unparsable ancestor");
                    break;
                }
            };
            let id = block.id();
            if id != expected {
                debug!(node_id = %node, block = %id, expected = %expected, "ancestors out of order");
                break;
            }
            parsed += 1;
            expected = block.parent();
            if self.jobs.is_satisfied(&id) || self.jobs.is_queued(&id) {
                break;
            }
            if block.status() == Status::Accepted {
                self.jobs.fulfill(id)?;
                break;
            }
            self.jobs.push(Box::new(BlockJob::new(self.ctx.clone(), block)))?;
        }

        if parsed == 0 {
            return self.retry(fetch);
        }
        self.advance().await
    }

    pub async fn get_ancestors_failed(&mut self, node: NodeId, request_id: u32) -> Result<()> {
        self.ensure_running()?;
        let Some(fetch) = self.take_fetch(node, request_id) else {
            return Ok(());
        };
        self.retry(fetch)?;
        self.advance().await
    }

    fn ensure_running(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ConsensusError::Cancelled);
        }
        Ok(())
    }

    fn new_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    fn sample_peers(&mut self) -> Result<()> {
        let available = self.validators.node_ids().len();
        let sample_size = self.config.frontier_sample_size.min(available);
        self.peers = self.validators.sample(sample_size)?;
        self.peers.sort();
        Ok(())
    }

    /// Sends the request of the current frontier or accepted phase to every
    /// sampled peer.
    fn send_phase_round(&mut self) {
        let request_id = self.new_request_id();
        match self.phase {
            BootstrapPhase::FetchingFrontier => self.send_round(
                OutboundMessage::GetAcceptedFrontier { request_id },
                RequestOp::GetAcceptedFrontier,
            ),
            BootstrapPhase::FetchingAccepted => {
                let mut container_ids: Vec<Id> = self.frontier.iter().copied().collect();
                container_ids.sort();
                self.send_round(
                    OutboundMessage::GetAccepted {
                        request_id,
                        container_ids,
                    },
                    RequestOp::GetAccepted,
                );
            }
            _ => {}
        }
    }

    /// Re-sends a round nobody answered to a fresh sample, giving up after
    /// `max_retries` silent rounds.
    fn retry_round(&mut self) -> Result<()> {
        self.failed_rounds += 1;
        if self.failed_rounds >= self.config.max_retries {
            warn!(
                phase = %self.phase,
                rounds = self.failed_rounds,
                "no peer answered, giving up on bootstrap"
            );
            self.phase = BootstrapPhase::Failed;
            return Err(ConsensusError::BootstrapAbandoned {
                dependency: self.last_accepted,
                dropped: self.jobs.num_queued(),
            });
        }
        debug!(phase = %self.phase, rounds = self.failed_rounds, "no peer answered, retrying round");
        self.sample_peers()?;
        self.send_phase_round();
        Ok(())
    }

    fn send_round(&mut self, msg: OutboundMessage, op: RequestOp) {
        self.round = self.next_request_id.wrapping_sub(1);
        self.responded = 0;
        let peers: HashSet<NodeId> = self.peers.iter().copied().collect();
        let delivered = self.sender.send(msg, &peers);
        for node in &delivered {
            self.timeouts.register(*node, self.round, op);
        }
        self.awaiting = delivered;
    }

    /// Records that `node` answered the current round. False for stale or
    /// unexpected answers.
    fn answer_round(&mut self, phase: BootstrapPhase, node: NodeId, request_id: u32) -> bool {
        if self.phase != phase || request_id != self.round || !self.awaiting.remove(&node) {
            debug!(node_id = %node, request_id, phase = %self.phase, "dropping unexpected bootstrap answer");
            return false;
        }
        self.timeouts.remove(&node, request_id);
        true
    }

    fn take_fetch(&mut self, node: NodeId, request_id: u32) -> Option<Fetch> {
        match self.fetching.get(&request_id) {
            Some(fetch) if fetch.node == node => {
                self.timeouts.remove(&node, request_id);
                self.fetching.remove(&request_id)
            }
            _ => {
                debug!(node_id = %node, request_id, "dropping unexpected ancestors answer");
                None
            }
        }
    }

    fn retry(&mut self, fetch: Fetch) -> Result<()> {
        let attempts = fetch.attempts + 1;
        if attempts < self.config.max_retries {
            self.to_fetch.push_back((fetch.block_id, attempts));
            return Ok(());
        }
        self.phase = BootstrapPhase::Failed;
        let dependency = fetch.block_id;
        let err = self
            .jobs
            .abandon(dependency)
            .err()
            .unwrap_or(ConsensusError::BootstrapAbandoned {
                dependency,
                dropped: 0,
            });
        warn!(block = %dependency, attempts, "giving up on bootstrap block");
        Err(err)
    }

    /// Moves through the phases until one is waiting on answers.
    async fn advance(&mut self) -> Result<()> {
        loop {
            match self.phase {
                BootstrapPhase::FetchingFrontier | BootstrapPhase::FetchingAccepted
                    if self.awaiting.is_empty() && self.responded == 0 =>
                {
                    self.retry_round()?;
                }
                BootstrapPhase::FetchingFrontier if self.awaiting.is_empty() => {
                    self.phase = BootstrapPhase::FetchingAccepted;
                    self.failed_rounds = 0;
                    self.send_phase_round();
                }
                BootstrapPhase::FetchingAccepted if self.awaiting.is_empty() => {
                    let threshold = self.config.frontier_alpha.min(self.peers.len());
                    let mut accepted: Vec<Id> = self
                        .accepted_votes
                        .iter()
                        .filter(|(_, votes)| **votes >= threshold)
                        .map(|(id, _)| *id)
                        .collect();
                    accepted.sort();
                    info!(accepted = accepted.len(), "fetched accepted frontier");

                    self.phase = BootstrapPhase::FetchingAncestors;
                    for id in accepted {
                        let known = match self.vm.get_block(id).await? {
                            Some(block) => block.status() == Status::Accepted,
                            None => false,
                        };
                        if known {
                            self.jobs.fulfill(id)?;
                        } else {
                            self.to_fetch.push_back((id, 0));
                        }
                    }
                }
                BootstrapPhase::FetchingAncestors => {
                    for id in self.jobs.missing_ids() {
                        let queued = self.to_fetch.iter().any(|(q, _)| *q == id)
                            || self.fetching.values().any(|f| f.block_id == id);
                        if !queued {
                            self.to_fetch.push_back((id, 0));
                        }
                    }
                    self.fetch_next()?;
                    if self.fetching.is_empty() && self.to_fetch.is_empty() {
                        return self.finish().await;
                    }
                    return Ok(());
                }
                _ => return Ok(()),
            }
        }
    }

    fn fetch_next(&mut self) -> Result<()> {
        while self.fetching.len() < self.config.max_outstanding_requests {
            let Some((block_id, attempts)) = self.to_fetch.pop_front() else {
                break;
            };
            if self.jobs.is_satisfied(&block_id) || self.jobs.is_queued(&block_id) {
                continue;
            }
            let Some(node) = self.peers.choose(&mut rand::thread_rng()).copied() else {
                break;
            };
            let request_id = self.new_request_id();
            let fetch = Fetch {
                node,
                block_id,
                attempts,
            };
            if self
                .sender
                .send_to(OutboundMessage::GetAncestors { request_id, block_id }, node)
            {
                self.timeouts.register(node, request_id, RequestOp::GetAncestors);
                self.fetching.insert(request_id, fetch);
            } else {
                self.retry(fetch)?;
            }
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let last_accepted = self.vm.last_accepted().await?;
        self.phase = BootstrapPhase::Complete;
        let elapsed = self
            .started_at
            .map(|t| self.ctx.clock.now().saturating_duration_since(t))
            .unwrap_or_default();
        info!(
            last_accepted = %last_accepted,
            executed = self.jobs.num_executed(),
            elapsed = ?elapsed,
            "bootstrapping finished"
        );
        if let Some(callback) = self.on_bootstrapped.take() {
            callback(last_accepted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;
    use crate::testing::{
        make_id, make_node_id, validator_set, DecisionLog, RecordingSender, TestBlock, TestVm,
    };
    use crate::Decidable;

    struct Setup {
        boot: Bootstrapper,
        sender: Arc<RecordingSender>,
        chain: Vec<TestBlock>,
        log: DecisionLog,
        cancel: CancellationToken,
        _rx: mpsc::Receiver<crate::handler::InboundMessage>,
    }

    /// Genesis accepted locally; blocks 1..=3 only known to peers.
    fn setup(validators: u8) -> Setup {
        let log = DecisionLog::default();
        let genesis = TestBlock::genesis(make_id(0)).with_log(log.clone());
        let mut chain = vec![genesis.clone()];
        for i in 1..=3 {
            let next = chain[chain.len() - 1].child(make_id(i));
            chain.push(next);
        }
        let vm = Arc::new(TestVm::new(&genesis));
        for block in &chain[1..] {
            vm.insert(block);
        }

        let sender = Arc::new(RecordingSender::new());
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let timeouts = TimeoutManager::new(std::time::Duration::from_secs(60), tx, cancel.clone());
        let config = BootstrapConfig {
            frontier_alpha: 2,
            max_retries: 2,
            ..BootstrapConfig::default()
        };
        let ctx = ConsensusContext::new(make_id(100), make_id(101), make_node_id(100));
        let boot = Bootstrapper::new(
            config,
            ctx,
            vm,
            sender.clone(),
            validator_set(validators, 1),
            timeouts,
            cancel.clone(),
        );
        Setup {
            boot,
            sender,
            chain,
            log,
            cancel,
            _rx: rx,
        }
    }

    fn last_request(sender: &RecordingSender) -> (OutboundMessage, HashSet<NodeId>) {
        sender.take().pop().unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(BootstrapConfig::default().validate().is_ok());
        let bad = BootstrapConfig {
            frontier_alpha: 21,
            ..BootstrapConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_bootstrap_fetches_missing_chain() {
        let mut s = setup(2);
        let done = Arc::new(Mutex::new(None));
        {
            let done = done.clone();
            s.boot
                .on_bootstrapped(Box::new(move |id| *done.lock() = Some(id)));
        }
        let (n1, n2) = (make_node_id(1), make_node_id(2));
        let tip = s.chain[3].id();

        s.boot.start().await.unwrap();
        assert_eq!(s.boot.phase(), BootstrapPhase::FetchingFrontier);
        let (msg, to) = last_request(&s.sender);
        assert_eq!(msg, OutboundMessage::GetAcceptedFrontier { request_id: 0 });
        assert_eq!(to, HashSet::from([n1, n2]));

        s.boot.accepted_frontier(n1, 0, tip).await.unwrap();
        // Stale round and repeated answers are ignored.
        s.boot.accepted_frontier(n1, 0, make_id(9)).await.unwrap();
        s.boot.accepted_frontier(n2, 5, make_id(9)).await.unwrap();
        s.boot.accepted_frontier(n2, 0, tip).await.unwrap();
        assert_eq!(s.boot.phase(), BootstrapPhase::FetchingAccepted);
        let (msg, _) = last_request(&s.sender);
        assert_eq!(
            msg,
            OutboundMessage::GetAccepted {
                request_id: 1,
                container_ids: vec![tip]
            }
        );

        s.boot.accepted(n1, 1, vec![tip]).await.unwrap();
        s.boot.accepted(n2, 1, vec![tip]).await.unwrap();
        assert_eq!(s.boot.phase(), BootstrapPhase::FetchingAncestors);
        let (msg, to) = last_request(&s.sender);
        assert_eq!(
            msg,
            OutboundMessage::GetAncestors {
                request_id: 2,
                block_id: tip
            }
        );
        let peer = *to.iter().next().unwrap();

        let bytes = |i: usize| s.chain[i].id().as_bytes().to_vec();
        s.boot.ancestors(peer, 2, vec![bytes(3), bytes(2)]).await.unwrap();
        assert!(s.log.lock().is_empty(), "block 1 still missing");
        let (msg, to) = last_request(&s.sender);
        assert_eq!(
            msg,
            OutboundMessage::GetAncestors {
                request_id: 3,
                block_id: s.chain[1].id()
            }
        );
        let peer = *to.iter().next().unwrap();

        s.boot.ancestors(peer, 3, vec![bytes(1)]).await.unwrap();
        assert_eq!(s.boot.phase(), BootstrapPhase::Complete);
        assert_eq!(s.boot.executed(), 3);
        let order: Vec<Id> = s.log.lock().iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![s.chain[1].id(), s.chain[2].id(), s.chain[3].id()]);
        assert_eq!(*done.lock(), Some(tip));
        assert_eq!(s.boot.next_request_id(), 4);
    }

    #[tokio::test]
    async fn test_no_validators_finishes_immediately() {
        let mut s = setup(0);
        s.boot.start().await.unwrap();
        assert_eq!(s.boot.phase(), BootstrapPhase::Complete);
        assert!(s.sender.take().is_empty());
    }

    #[tokio::test]
    async fn test_frontier_already_accepted() {
        let mut s = setup(1);
        let genesis = s.chain[0].id();
        s.boot.start().await.unwrap();
        s.boot
            .accepted_frontier(make_node_id(1), 0, genesis)
            .await
            .unwrap();
        s.boot.accepted(make_node_id(1), 1, vec![genesis]).await.unwrap();
        assert_eq!(s.boot.phase(), BootstrapPhase::Complete);
        assert_eq!(s.boot.executed(), 0);
    }

    #[tokio::test]
    async fn test_repeated_failures_abandon() {
        let mut s = setup(1);
        let node = make_node_id(1);
        let tip = s.chain[3].id();
        s.boot.start().await.unwrap();
        s.boot.accepted_frontier(node, 0, tip).await.unwrap();
        s.boot.accepted(node, 1, vec![tip]).await.unwrap();

        s.boot.get_ancestors_failed(node, 2).await.unwrap();
        assert!(s.boot.is_bootstrapping());
        let err = s.boot.get_ancestors_failed(node, 3).await.unwrap_err();
        assert_eq!(
            err,
            ConsensusError::BootstrapAbandoned {
                dependency: tip,
                dropped: 0
            }
        );
        assert!(err.is_fatal());
        assert_eq!(s.boot.phase(), BootstrapPhase::Failed);
    }

    #[tokio::test]
    async fn test_silent_frontier_round_is_retried_then_abandoned() {
        let mut s = setup(2);
        let (n1, n2) = (make_node_id(1), make_node_id(2));
        s.boot.start().await.unwrap();
        s.sender.take();

        s.boot.get_accepted_frontier_failed(n1, 0).await.unwrap();
        s.boot.get_accepted_frontier_failed(n2, 0).await.unwrap();
        assert_eq!(s.boot.phase(), BootstrapPhase::FetchingFrontier);
        let (msg, to) = last_request(&s.sender);
        assert_eq!(msg, OutboundMessage::GetAcceptedFrontier { request_id: 1 });
        assert_eq!(to, HashSet::from([n1, n2]));

        s.boot.get_accepted_frontier_failed(n1, 1).await.unwrap();
        let err = s.boot.get_accepted_frontier_failed(n2, 1).await.unwrap_err();
        assert_eq!(
            err,
            ConsensusError::BootstrapAbandoned {
                dependency: s.chain[0].id(),
                dropped: 0
            }
        );
        assert!(err.is_fatal());
        assert_eq!(s.boot.phase(), BootstrapPhase::Failed);
        assert_eq!(s.boot.executed(), 0);
    }

    #[tokio::test]
    async fn test_silent_accepted_round_is_retried() {
        let mut s = setup(2);
        let (n1, n2) = (make_node_id(1), make_node_id(2));
        let tip = s.chain[3].id();
        s.boot.start().await.unwrap();
        s.boot.accepted_frontier(n1, 0, tip).await.unwrap();
        s.boot.accepted_frontier(n2, 0, tip).await.unwrap();

        s.boot.get_accepted_failed(n1, 1).await.unwrap();
        s.boot.get_accepted_failed(n2, 1).await.unwrap();
        assert_eq!(s.boot.phase(), BootstrapPhase::FetchingAccepted);
        let (msg, _) = last_request(&s.sender);
        assert_eq!(
            msg,
            OutboundMessage::GetAccepted {
                request_id: 2,
                container_ids: vec![tip]
            }
        );

        s.boot.accepted(n1, 2, vec![tip]).await.unwrap();
        s.boot.accepted(n2, 2, vec![tip]).await.unwrap();
        assert_eq!(s.boot.phase(), BootstrapPhase::FetchingAncestors);
        let (msg, _) = last_request(&s.sender);
        assert_eq!(
            msg,
            OutboundMessage::GetAncestors {
                request_id: 3,
                block_id: tip
            }
        );
    }

    #[tokio::test]
    async fn test_silent_accepted_rounds_abandon() {
        let mut s = setup(2);
        let (n1, n2) = (make_node_id(1), make_node_id(2));
        let tip = s.chain[3].id();
        s.boot.start().await.unwrap();
        s.boot.accepted_frontier(n1, 0, tip).await.unwrap();
        s.boot.accepted_frontier(n2, 0, tip).await.unwrap();

        s.boot.get_accepted_failed(n1, 1).await.unwrap();
        s.boot.get_accepted_failed(n2, 1).await.unwrap();
        s.boot.get_accepted_failed(n1, 2).await.unwrap();
        let err = s.boot.get_accepted_failed(n2, 2).await.unwrap_err();
        assert!(matches!(err, ConsensusError::BootstrapAbandoned { .. }));
        assert_eq!(s.boot.phase(), BootstrapPhase::Failed);
        assert_eq!(s.boot.executed(), 0);
    }

    #[tokio::test]
    async fn test_cancelled() {
        let mut s = setup(1);
        s.cancel.cancel();
        assert_eq!(s.boot.start().await, Err(ConsensusError::Cancelled));
    }
}
