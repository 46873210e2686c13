//! Snowman consensus engine.
//!
//! [`Transitive`] ties the pieces of a chain together: it bootstraps, then
//! issues blocks into Snowman consensus, polls validators about the
//! preferred tip and applies the finished polls. Blocks whose parent is
//! missing are held back until the parent has been fetched and issued.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use avalanche_ids::{Id, NodeId};
use avalanche_utils::Bag;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::benchlist::Benchlist;
use crate::bootstrapper::{BootstrapPhase, Bootstrapper, OnBootstrapped};
use crate::consensus::snowman::{Block, Consensus, Topological};
use crate::handler::InboundMessage;
use crate::health::{HealthCheck, HealthReport};
use crate::poll::{PollFactory, PollSet};
use crate::sender::{OutboundMessage, Sender};
use crate::timeout::{RequestOp, TimeoutManager};
use crate::validators::{sample_for_poll, ValidatorState};
use crate::vm::{ChainVm, VmMessage};
use crate::{ConsensusContext, ConsensusError, EngineConfig, Result};

/// Request ID carried by unsolicited `Put`s.
pub const GOSSIP_REQUEST_ID: u32 = u32::MAX;

/// Applies one finished poll. The poll is successful only if a single block
/// got at least `alpha` votes; otherwise every confidence streak is broken.
pub fn apply_poll<C: Consensus + ?Sized>(
    consensus: &mut C,
    votes: &Bag<Id>,
    alpha: usize,
) -> Result<bool> {
    let successful = votes.mode().is_some_and(|(_, count)| count >= alpha);
    if successful {
        consensus.record_poll(votes)?;
    } else {
        trace!(votes = votes.len(), "unsuccessful poll");
        consensus.record_unsuccessful_poll();
    }
    Ok(successful)
}

/// State of the consensus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Initial state, not yet started
    Initializing,
    /// Bootstrapping from network
    Bootstrapping,
    /// Normal consensus operation
    Consensus,
    /// Engine is halted
    Halted,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Initializing => write!(f, "Initializing"),
            EngineState::Bootstrapping => write!(f, "Bootstrapping"),
            EngineState::Consensus => write!(f, "Consensus"),
            EngineState::Halted => write!(f, "Halted"),
        }
    }
}

/// Snowman engine for one chain.
pub struct Transitive {
    config: EngineConfig,
    ctx: ConsensusContext,
    vm: Arc<dyn ChainVm>,
    sender: Arc<dyn Sender>,
    validators: Arc<dyn ValidatorState>,
    benchlist: Option<Arc<Benchlist>>,
    timeouts: TimeoutManager,
    cancel: CancellationToken,

    state: EngineState,
    bootstrapper: Bootstrapper,
    consensus: Topological,
    polls: PollSet,
    next_request_id: u32,
    /// Preference last reported to the VM.
    reported_preference: Option<Id>,

    /// Blocks waiting for their parent, keyed by parent ID.
    blocked: HashMap<Id, Vec<Box<dyn Block>>>,
    blocked_ids: HashSet<Id>,
    /// Outstanding `Get` requests.
    gets: HashMap<u32, (NodeId, Id)>,
    fetching: HashSet<Id>,
    /// Heights of blocks that failed verification. Dropped once the
    /// last accepted height reaches them.
    failed: HashMap<Id, u64>,
    pending_txs: bool,
}

impl Transitive {
    /// Creates an engine whose request deadlines report into `inbound`,
    /// the queue its handler reads from.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        ctx: ConsensusContext,
        vm: Arc<dyn ChainVm>,
        sender: Arc<dyn Sender>,
        validators: Arc<dyn ValidatorState>,
        inbound: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ConsensusError::InvalidParameters(e.to_string()))?;

        let timeouts = TimeoutManager::new(config.query_timeout, inbound, cancel.child_token());
        let bootstrapper = Bootstrapper::new(
            config.bootstrap.clone(),
            ctx.clone(),
            Arc::clone(&vm),
            Arc::clone(&sender),
            Arc::clone(&validators),
            timeouts.clone(),
            cancel.clone(),
        );
        let polls = PollSet::new(
            PollFactory::new(config.params.alpha, config.early_termination),
            ctx.clock.clone(),
        );

        Ok(Self {
            consensus: Topological::new(config.factory),
            config,
            ctx,
            vm,
            sender,
            validators,
            benchlist: None,
            timeouts,
            cancel,
            state: EngineState::Initializing,
            bootstrapper,
            polls,
            next_request_id: 0,
            reported_preference: None,
            blocked: HashMap::new(),
            blocked_ids: HashSet::new(),
            gets: HashMap::new(),
            fetching: HashSet::new(),
            failed: HashMap::new(),
            pending_txs: false,
        })
    }

    /// Skips benched validators when sampling and reports query outcomes.
    #[must_use]
    pub fn with_benchlist(mut self, benchlist: Arc<Benchlist>) -> Self {
        self.benchlist = Some(benchlist);
        self
    }

    /// Registers a hook called once bootstrapping finishes.
    pub fn on_bootstrapped(&mut self, callback: OnBootstrapped) {
        self.bootstrapper.on_bootstrapped(callback);
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn consensus(&self) -> &dyn Consensus {
        &self.consensus
    }

    /// Number of polls awaiting answers.
    pub fn outstanding_polls(&self) -> usize {
        self.polls.len()
    }

    /// Number of blocks waiting for a missing ancestor.
    pub fn num_blocked(&self) -> usize {
        self.blocked_ids.len()
    }

    /// Transitions to a new state.
    fn transition(&mut self, new_state: EngineState) -> Result<()> {
        let current = self.state;
        let valid = matches!(
            (current, new_state),
            (EngineState::Initializing, EngineState::Bootstrapping)
                | (EngineState::Initializing, EngineState::Consensus)
                | (EngineState::Bootstrapping, EngineState::Consensus)
                | (EngineState::Consensus, EngineState::Halted)
                | (EngineState::Bootstrapping, EngineState::Halted)
        );
        if !valid {
            return Err(ConsensusError::InvalidState {
                expected: format!("valid transition from {current}"),
                actual: format!("{current} -> {new_state}"),
            });
        }
        debug!(from = %current, to = %new_state, "engine state transition");
        self.state = new_state;
        Ok(())
    }

    /// Starts bootstrapping; consensus begins once the chain caught up.
    pub async fn start(&mut self) -> Result<()> {
        self.transition(EngineState::Bootstrapping)?;
        self.bootstrapper.start().await?;
        self.check_bootstrapped().await
    }

    /// Stops the engine. Outstanding deadlines are dropped and later
    /// messages are ignored.
    pub fn halt(&mut self) {
        if self.state == EngineState::Halted {
            return;
        }
        if self.transition(EngineState::Halted).is_err() {
            self.state = EngineState::Halted;
        }
        self.timeouts.shutdown();
        info!(chain_id = %self.ctx.chain_id, "engine halted");
    }

    pub async fn handle(&mut self, msg: InboundMessage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ConsensusError::Cancelled);
        }
        match msg {
            // Served in every state.
            InboundMessage::Get {
                node,
                request_id,
                block_id,
            } => return self.get(node, request_id, block_id).await,
            InboundMessage::GetAncestors {
                node,
                request_id,
                block_id,
            } => return self.get_ancestors(node, request_id, block_id).await,
            InboundMessage::GetAcceptedFrontier { node, request_id } => {
                return self.get_accepted_frontier(node, request_id).await
            }
            InboundMessage::GetAccepted {
                node,
                request_id,
                container_ids,
            } => return self.get_accepted(node, request_id, container_ids).await,
            InboundMessage::Vm(VmMessage::PendingTxs) => self.pending_txs = true,
            msg => match self.state {
                EngineState::Bootstrapping => return self.handle_bootstrapping(msg).await,
                EngineState::Consensus => self.handle_consensus(msg).await?,
                EngineState::Initializing | EngineState::Halted => {
                    debug!(op = msg.op(), state = %self.state, "dropping message");
                    return Ok(());
                }
            },
        }
        if self.state == EngineState::Consensus {
            self.settle().await?;
        }
        Ok(())
    }

    async fn handle_bootstrapping(&mut self, msg: InboundMessage) -> Result<()> {
        let boot = &mut self.bootstrapper;
        match msg {
            InboundMessage::AcceptedFrontier {
                node,
                request_id,
                container_id,
            } => boot.accepted_frontier(node, request_id, container_id).await?,
            InboundMessage::GetAcceptedFrontierFailed { node, request_id } => {
                boot.get_accepted_frontier_failed(node, request_id).await?
            }
            InboundMessage::Accepted {
                node,
                request_id,
                container_ids,
            } => boot.accepted(node, request_id, container_ids).await?,
            InboundMessage::GetAcceptedFailed { node, request_id } => {
                boot.get_accepted_failed(node, request_id).await?
            }
            InboundMessage::Ancestors {
                node,
                request_id,
                blocks,
            } => boot.ancestors(node, request_id, blocks).await?,
            InboundMessage::GetAncestorsFailed { node, request_id } => {
                boot.get_ancestors_failed(node, request_id).await?
            }
            msg => {
                debug!(op = msg.op(), "dropping message while bootstrapping");
                return Ok(());
            }
        }
        self.check_bootstrapped().await
    }

    async fn check_bootstrapped(&mut self) -> Result<()> {
        if self.bootstrapper.phase() != BootstrapPhase::Complete {
            return Ok(());
        }
        let last_accepted = self.vm.last_accepted().await?;
        let block = self
            .vm
            .get_block(last_accepted)
            .await?
            .ok_or(ConsensusError::BlockNotFound(last_accepted))?;
        self.consensus.initialize(
            self.ctx.clone(),
            self.config.params,
            last_accepted,
            block.height(),
            block.timestamp(),
        )?;
        self.next_request_id = self.bootstrapper.next_request_id();
        self.transition(EngineState::Consensus)?;
        info!(
            last_accepted = %last_accepted,
            height = block.height(),
            "starting consensus"
        );
        self.settle().await
    }

    async fn handle_consensus(&mut self, msg: InboundMessage) -> Result<()> {
        match msg {
            InboundMessage::PullQuery {
                node,
                request_id,
                block_id,
            } => self.pull_query(node, request_id, block_id).await,
            InboundMessage::PushQuery {
                node,
                request_id,
                block,
            } => self.push_query(node, request_id, &block).await,
            InboundMessage::Chits {
                node,
                request_id,
                preferred,
                accepted,
            } => self.chits(node, request_id, preferred, accepted).await,
            InboundMessage::QueryFailed { node, request_id } => {
                self.query_failed(node, request_id)
            }
            InboundMessage::Put {
                node,
                request_id,
                block,
            } => self.put(node, request_id, &block).await,
            InboundMessage::GetFailed { node, request_id } => {
                self.get_failed(node, request_id);
                Ok(())
            }
            InboundMessage::Gossip => self.gossip().await,
            msg => {
                trace!(op = msg.op(), "dropping bootstrap message during consensus");
                Ok(())
            }
        }
    }

    async fn get(&self, node: NodeId, request_id: u32, block_id: Id) -> Result<()> {
        match self.vm.get_block(block_id).await? {
            Some(block) => {
                self.sender.send_to(
                    OutboundMessage::Put {
                        request_id,
                        block: block.bytes().to_vec(),
                    },
                    node,
                );
            }
            None => debug!(node_id = %node, block = %block_id, "get for unknown block"),
        }
        Ok(())
    }

    async fn get_ancestors(&self, node: NodeId, request_id: u32, block_id: Id) -> Result<()> {
        let mut blocks = Vec::new();
        let mut next = block_id;
        while blocks.len() < self.config.bootstrap.max_ancestors {
            let Some(block) = self.vm.get_block(next).await? else {
                break;
            };
            blocks.push(block.bytes().to_vec());
            if block.height() == 0 {
                break;
            }
            next = block.parent();
        }
        if blocks.is_empty() {
            debug!(node_id = %node, block = %block_id, "get_ancestors for unknown block");
            return Ok(());
        }
        self.sender
            .send_to(OutboundMessage::Ancestors { request_id, blocks }, node);
        Ok(())
    }

    async fn get_accepted_frontier(&self, node: NodeId, request_id: u32) -> Result<()> {
        let container_id = self.vm.last_accepted().await?;
        self.sender.send_to(
            OutboundMessage::AcceptedFrontier {
                request_id,
                container_id,
            },
            node,
        );
        Ok(())
    }

    async fn get_accepted(&self, node: NodeId, request_id: u32, container_ids: Vec<Id>) -> Result<()> {
        let mut accepted = Vec::new();
        for id in container_ids {
            if let Some(block) = self.vm.get_block(id).await? {
                if block.status().accepted() {
                    accepted.push(id);
                }
            }
        }
        self.sender.send_to(
            OutboundMessage::Accepted {
                request_id,
                container_ids: accepted,
            },
            node,
        );
        Ok(())
    }

    async fn pull_query(&mut self, node: NodeId, request_id: u32, block_id: Id) -> Result<()> {
        self.send_chits(node, request_id);
        self.issue_by_id(node, block_id).await
    }

    async fn push_query(&mut self, node: NodeId, request_id: u32, bytes: &[u8]) -> Result<()> {
        self.send_chits(node, request_id);
        match self.vm.parse_block(bytes).await {
            Ok(block) => self.issue_from(node, block).await,
            Err(err) => {
                debug!(node_id = %node, error = %err, "dropping unparsable pushed block");
                Ok(())
            }
        }
    }

    /// Pushes the last accepted block to a few random peers.
    async fn gossip(&self) -> Result<()> {
        let (last_accepted, _) = self.consensus.last_accepted();
        let Some(block) = self.vm.get_block(last_accepted).await? else {
            warn!(block = %last_accepted, "last accepted block missing from vm");
            return Ok(());
        };
        trace!(block = %last_accepted, peers = self.config.gossip_size, "gossiping accepted tip");
        self.sender.gossip(
            OutboundMessage::Put {
                request_id: GOSSIP_REQUEST_ID,
                block: block.bytes().to_vec(),
            },
            self.config.gossip_size,
        );
        Ok(())
    }

    fn send_chits(&self, node: NodeId, request_id: u32) {
        let msg = OutboundMessage::Chits {
            request_id,
            preferred: self.consensus.preference(),
            accepted: self.consensus.last_accepted().0,
        };
        if !self.sender.send_to(msg, node) {
            trace!(node_id = %node, request_id, "failed to send chits");
        }
    }

    async fn chits(
        &mut self,
        node: NodeId,
        request_id: u32,
        preferred: Id,
        accepted: Id,
    ) -> Result<()> {
        if !self.polls.contains(request_id) {
            debug!(node_id = %node, request_id, "dropping chits for unknown poll");
            return Ok(());
        }
        self.timeouts.remove(&node, request_id);
        if let Some(benchlist) = &self.benchlist {
            benchlist.register_response(&node);
        }
        trace!(node_id = %node, request_id, %preferred, %accepted, "received chits");

        self.issue_by_id(node, preferred).await?;
        let finished = self.polls.vote(request_id, &node, preferred);
        self.apply_polls(finished)
    }

    fn query_failed(&mut self, node: NodeId, request_id: u32) -> Result<()> {
        if !self.polls.contains(request_id) {
            trace!(node_id = %node, request_id, "dropping failure for unknown poll");
            return Ok(());
        }
        self.timeouts.remove(&node, request_id);
        if let Some(benchlist) = &self.benchlist {
            benchlist.register_failure(node);
        }
        let finished = self.polls.drop_vote(request_id, &node);
        self.apply_polls(finished)
    }

    async fn put(&mut self, node: NodeId, request_id: u32, bytes: &[u8]) -> Result<()> {
        let requested = match self.gets.get(&request_id) {
            Some((from, block_id)) if *from == node => Some(*block_id),
            _ => None,
        };
        if let Some(block_id) = requested {
            self.timeouts.remove(&node, request_id);
            self.gets.remove(&request_id);
            self.fetching.remove(&block_id);
        }

        let block = match self.vm.parse_block(bytes).await {
            Ok(block) => block,
            Err(err) => {
                debug!(node_id = %node, request_id, error = %err, "dropping unparsable block");
                if let Some(block_id) = requested {
                    self.abandon(block_id);
                }
                return Ok(());
            }
        };
        if let Some(block_id) = requested {
            if block.id() != block_id {
                debug!(node_id = %node, expected = %block_id, got = %block.id(), "put returned another block");
                self.abandon(block_id);
            }
        }
        self.issue_from(node, block).await
    }

    fn get_failed(&mut self, node: NodeId, request_id: u32) {
        let Some((from, block_id)) = self.gets.get(&request_id).copied() else {
            return;
        };
        if from != node {
            return;
        }
        self.timeouts.remove(&node, request_id);
        self.gets.remove(&request_id);
        self.fetching.remove(&block_id);
        debug!(node_id = %node, block = %block_id, "failed to fetch block");
        self.abandon(block_id);
    }

    /// Drops every block waiting on `block_id`, directly or through other
    /// waiting blocks.
    fn abandon(&mut self, block_id: Id) {
        let mut stack = vec![block_id];
        let mut dropped = 0;
        while let Some(id) = stack.pop() {
            for child in self.blocked.remove(&id).unwrap_or_default() {
                let child_id = child.id();
                self.blocked_ids.remove(&child_id);
                stack.push(child_id);
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(block = %block_id, dropped, "dropped blocks waiting on missing ancestor");
        }
    }

    fn next_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    fn fetch(&mut self, node: NodeId, block_id: Id) {
        if !self.fetching.insert(block_id) {
            return;
        }
        let request_id = self.next_request_id();
        self.gets.insert(request_id, (node, block_id));
        if self
            .sender
            .send_to(OutboundMessage::Get { request_id, block_id }, node)
        {
            self.timeouts.register(node, request_id, RequestOp::Get);
        } else {
            self.timeouts.fail(node, request_id, RequestOp::Get);
        }
    }

    /// True if consensus already has, decided or is waiting on the block.
    fn known(&self, block: &dyn Block) -> bool {
        let id = block.id();
        self.consensus.processing(&id)
            || self.consensus.decided(block)
            || self.blocked_ids.contains(&id)
            || self.failed.contains_key(&id)
    }

    async fn issue_by_id(&mut self, node: NodeId, block_id: Id) -> Result<()> {
        if self.consensus.processing(&block_id)
            || self.blocked_ids.contains(&block_id)
            || self.fetching.contains(&block_id)
        {
            return Ok(());
        }
        match self.vm.get_block(block_id).await? {
            Some(block) => self.issue_from(node, block).await,
            None => {
                self.fetch(node, block_id);
                Ok(())
            }
        }
    }

    /// Issues `block`, first walking up to an ancestor consensus can take.
    /// Blocks above a missing ancestor wait until it has been fetched.
    async fn issue_from(&mut self, node: NodeId, block: Box<dyn Block>) -> Result<()> {
        let mut block = block;
        loop {
            if self.known(block.as_ref()) {
                return Ok(());
            }
            let parent = block.parent();
            let (last_accepted, last_accepted_height) = self.consensus.last_accepted();
            let parent_ready = parent == last_accepted
                || self.consensus.processing(&parent)
                || block.height() <= last_accepted_height + 1;
            if parent_ready {
                return self.issue(block);
            }

            trace!(block = %block.id(), parent = %parent, "block waiting on parent");
            self.blocked_ids.insert(block.id());
            self.blocked.entry(parent).or_default().push(block);
            if self.blocked_ids.contains(&parent) || self.fetching.contains(&parent) {
                return Ok(());
            }
            match self.vm.get_block(parent).await? {
                Some(parent_block) if !parent_block.status().decided() => block = parent_block,
                _ => {
                    self.fetch(node, parent);
                    return Ok(());
                }
            }
        }
    }

    /// Adds a block whose parent is ready, then every block that was
    /// waiting on it.
    fn issue(&mut self, block: Box<dyn Block>) -> Result<()> {
        let mut ready = vec![block];
        while let Some(block) = ready.pop() {
            let id = block.id();
            self.blocked_ids.remove(&id);
            if let Err(err) = block.verify() {
                debug!(block = %id, error = %err, "dropping block that failed verification");
                self.failed.insert(id, block.height());
                self.abandon(id);
                continue;
            }

            self.consensus.add(block)?;
            if !self.consensus.processing(&id) {
                // Rejected on arrival.
                self.abandon(id);
                continue;
            }
            if let Some(children) = self.blocked.remove(&id) {
                ready.extend(children);
            }
            if self.consensus.is_preferred(&id) {
                self.send_query(id);
            }
        }
        Ok(())
    }

    fn send_query(&mut self, block_id: Id) {
        let excluded = self
            .benchlist
            .as_ref()
            .map(|b| b.benched())
            .unwrap_or_default();
        let sample = match sample_for_poll(self.validators.as_ref(), self.config.params.k, &excluded) {
            Ok(sample) => sample,
            Err(err) => {
                warn!(block = %block_id, error = %err, "dropping query");
                return;
            }
        };

        let request_id = self.next_request_id();
        if !self.polls.add(request_id, sample.clone()) {
            return;
        }
        let nodes: HashSet<NodeId> = sample.list().into_iter().collect();
        let msg = match self.consensus.get(&block_id) {
            Some(block) => OutboundMessage::PushQuery {
                request_id,
                block: block.bytes().to_vec(),
            },
            None => OutboundMessage::PullQuery {
                request_id,
                block_id,
            },
        };
        let delivered = self.sender.send(msg, &nodes);
        for node in nodes {
            if delivered.contains(&node) {
                self.timeouts.register(node, request_id, RequestOp::Query);
            } else {
                self.timeouts.fail(node, request_id, RequestOp::Query);
            }
        }
        trace!(block = %block_id, request_id, sampled = sample.len(), "sent query");
    }

    /// Applies finished polls. A poll counts as successful only when one
    /// block received at least alpha votes.
    fn apply_polls(&mut self, finished: Vec<Bag<Id>>) -> Result<()> {
        for votes in finished {
            if self.cancel.is_cancelled() {
                return Err(ConsensusError::Cancelled);
            }
            apply_poll(&mut self.consensus, &votes, self.config.params.alpha)?;
        }
        Ok(())
    }

    /// Builds blocks while below the target, reports the preference to the
    /// VM and keeps enough polls running.
    async fn settle(&mut self) -> Result<()> {
        let (_, last_accepted_height) = self.consensus.last_accepted();
        self.failed.retain(|_, height| *height > last_accepted_height);

        while self.pending_txs
            && self.consensus.num_processing() < self.config.params.optimal_processing
        {
            let block = match self.vm.build_block().await {
                Ok(block) => block,
                Err(err) => {
                    debug!(error = %err, "no block built");
                    self.pending_txs = false;
                    break;
                }
            };
            if self.known(block.as_ref()) {
                warn!(block = %block.id(), "vm built a known block");
                self.pending_txs = false;
                break;
            }
            debug!(block = %block.id(), height = block.height(), "built block");
            self.issue_from(self.ctx.node_id, block).await?;
        }

        let preference = self.consensus.preference();
        if self.reported_preference != Some(preference) {
            self.vm.set_preference(preference).await?;
            self.reported_preference = Some(preference);
        }

        if !self.consensus.finalized() {
            for _ in self.polls.len()..self.config.params.concurrent_repolls {
                self.send_query(preference);
            }
        }
        Ok(())
    }

    /// Health of the engine and everything it drives, VM included.
    pub async fn health(&self) -> Result<HealthReport> {
        let mut report = self.health_check();
        report.merge("vm", self.vm.health_check().await?);
        Ok(report)
    }
}

impl HealthCheck for Transitive {
    fn health_check(&self) -> HealthReport {
        let mut report = HealthReport::healthy()
            .detail("state", self.state.to_string())
            .detail("blocked", self.blocked_ids.len())
            .detail("outstanding_requests", self.timeouts.len());
        match self.state {
            EngineState::Consensus => {
                report.merge("consensus", self.consensus.health_check());
                report.merge("polls", self.polls.health_check());
            }
            EngineState::Bootstrapping => {
                report = report
                    .detail("bootstrap_phase", self.bootstrapper.phase().to_string())
                    .detail("bootstrapped_blocks", self.bootstrapper.executed());
            }
            EngineState::Halted => report.fail("engine halted"),
            EngineState::Initializing => {}
        }
        if let Some(benchlist) = &self.benchlist {
            report.merge("benchlist", benchlist.health_check());
        }
        report
    }
}
