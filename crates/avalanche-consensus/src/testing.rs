//! In-memory blocks, transactions, vertices and collaborators for tests.
//!
//! Test items share their status through an `Arc`, so a test can keep a
//! clone of an item after handing a boxed copy to consensus and still
//! observe the decision.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use avalanche_ids::{Id, NodeId};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::benchlist::Benchable;
use crate::consensus::avalanche::Vertex;
use crate::consensus::snowman::Block;
use crate::consensus::snowstorm::Tx;
use crate::context::Acceptor;
use crate::sender::{OutboundMessage, Sender};
use crate::validators::{Validator, ValidatorSet};
use crate::vm::ChainVm;
use crate::{ConsensusError, Decidable, Result, Status};

/// Decisions in the order they were applied.
pub type DecisionLog = Arc<Mutex<Vec<(Id, Status)>>>;

pub fn make_id(byte: u8) -> Id {
    Id::from_bytes([byte; 32])
}

pub fn make_node_id(byte: u8) -> NodeId {
    NodeId::from_bytes([byte; 20])
}

/// `count` validators of weight `weight`, node IDs `1..=count`.
pub fn validator_set(count: u8, weight: u64) -> Arc<ValidatorSet> {
    let set = ValidatorSet::new(Id::EMPTY);
    for i in 1..=count {
        // IDs are distinct by construction.
        let _ = set.add(Validator::new(make_node_id(i), weight));
    }
    Arc::new(set)
}

#[derive(Debug, Clone)]
struct Shared {
    status: Arc<Mutex<Status>>,
    log: Option<DecisionLog>,
    accept_error: Option<ConsensusError>,
}

impl Shared {
    fn new(status: Status) -> Self {
        Self {
            status: Arc::new(Mutex::new(status)),
            log: None,
            accept_error: None,
        }
    }

    fn decide(&self, id: Id, status: Status) -> Result<()> {
        if status == Status::Accepted {
            if let Some(err) = &self.accept_error {
                return Err(err.clone());
            }
        }
        let current = *self.status.lock();
        if current.decided() {
            return Err(ConsensusError::Internal(format!(
                "{id} decided twice: {current} then {status}"
            )));
        }
        *self.status.lock() = status;
        if let Some(log) = &self.log {
            log.lock().push((id, status));
        }
        Ok(())
    }
}

/// A block whose bytes are its ID.
#[derive(Debug, Clone)]
pub struct TestBlock {
    id: Id,
    parent: Id,
    height: u64,
    timestamp: DateTime<Utc>,
    bytes: Vec<u8>,
    verify_error: Option<ConsensusError>,
    shared: Shared,
}

impl TestBlock {
    pub fn new(id: Id, parent: Id, height: u64) -> Self {
        Self {
            id,
            parent,
            height,
            timestamp: Utc.timestamp_opt(height as i64, 0).single().unwrap_or_default(),
            bytes: id.as_bytes().to_vec(),
            verify_error: None,
            shared: Shared::new(Status::Processing),
        }
    }

    /// An accepted block at height zero.
    pub fn genesis(id: Id) -> Self {
        let block = Self::new(id, Id::EMPTY, 0);
        *block.shared.status.lock() = Status::Accepted;
        block
    }

    pub fn child(&self, id: Id) -> Self {
        let mut block = Self::new(id, self.id, self.height + 1);
        block.shared.log = self.shared.log.clone();
        block
    }

    #[must_use]
    pub fn with_log(mut self, log: DecisionLog) -> Self {
        self.shared.log = Some(log);
        self
    }

    #[must_use]
    pub fn with_verify_error(mut self, err: ConsensusError) -> Self {
        self.verify_error = Some(err);
        self
    }

    #[must_use]
    pub fn with_accept_error(mut self, err: ConsensusError) -> Self {
        self.shared.accept_error = Some(err);
        self
    }

    pub fn current_status(&self) -> Status {
        *self.shared.status.lock()
    }

    pub fn boxed(&self) -> Box<dyn Block> {
        Box::new(self.clone())
    }
}

impl Decidable for TestBlock {
    fn id(&self) -> Id {
        self.id
    }

    fn status(&self) -> Status {
        self.current_status()
    }

    fn accept(&mut self) -> Result<()> {
        self.shared.decide(self.id, Status::Accepted)
    }

    fn reject(&mut self) -> Result<()> {
        self.shared.decide(self.id, Status::Rejected)
    }
}

impl Block for TestBlock {
    fn parent(&self) -> Id {
        self.parent
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn verify(&self) -> Result<()> {
        match &self.verify_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// A transaction spending `inputs` after `dependencies` are accepted.
#[derive(Debug, Clone)]
pub struct TestTx {
    id: Id,
    dependencies: Vec<Id>,
    inputs: Vec<Id>,
    bytes: Vec<u8>,
    shared: Shared,
}

impl TestTx {
    pub fn new(id: Id, inputs: &[Id]) -> Self {
        Self {
            id,
            dependencies: Vec::new(),
            inputs: inputs.to_vec(),
            bytes: id.as_bytes().to_vec(),
            shared: Shared::new(Status::Processing),
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: &[Id]) -> Self {
        self.dependencies = dependencies.to_vec();
        self
    }

    #[must_use]
    pub fn with_log(mut self, log: DecisionLog) -> Self {
        self.shared.log = Some(log);
        self
    }

    pub fn current_status(&self) -> Status {
        *self.shared.status.lock()
    }

    pub fn boxed(&self) -> Box<dyn Tx> {
        Box::new(self.clone())
    }
}

impl Decidable for TestTx {
    fn id(&self) -> Id {
        self.id
    }

    fn status(&self) -> Status {
        self.current_status()
    }

    fn accept(&mut self) -> Result<()> {
        self.shared.decide(self.id, Status::Accepted)
    }

    fn reject(&mut self) -> Result<()> {
        self.shared.decide(self.id, Status::Rejected)
    }
}

impl Tx for TestTx {
    fn dependencies(&self) -> Vec<Id> {
        self.dependencies.clone()
    }

    fn input_ids(&self) -> Vec<Id> {
        self.inputs.clone()
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn verify(&self) -> Result<()> {
        Ok(())
    }
}

/// A vertex batching [`TestTx`]s.
#[derive(Debug, Clone)]
pub struct TestVertex {
    id: Id,
    parents: Vec<Id>,
    height: u64,
    txs: Vec<TestTx>,
    bytes: Vec<u8>,
    shared: Shared,
}

impl TestVertex {
    pub fn new(id: Id, parents: &[Id], height: u64, txs: &[TestTx]) -> Self {
        Self {
            id,
            parents: parents.to_vec(),
            height,
            txs: txs.to_vec(),
            bytes: id.as_bytes().to_vec(),
            shared: Shared::new(Status::Processing),
        }
    }

    #[must_use]
    pub fn with_log(mut self, log: DecisionLog) -> Self {
        self.shared.log = Some(log);
        self
    }

    pub fn current_status(&self) -> Status {
        *self.shared.status.lock()
    }

    pub fn boxed(&self) -> Box<dyn Vertex> {
        Box::new(self.clone())
    }
}

impl Decidable for TestVertex {
    fn id(&self) -> Id {
        self.id
    }

    fn status(&self) -> Status {
        self.current_status()
    }

    fn accept(&mut self) -> Result<()> {
        self.shared.decide(self.id, Status::Accepted)
    }

    fn reject(&mut self) -> Result<()> {
        self.shared.decide(self.id, Status::Rejected)
    }
}

impl Vertex for TestVertex {
    fn parents(&self) -> Vec<Id> {
        self.parents.clone()
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn txs(&self) -> Vec<Box<dyn Tx>> {
        self.txs.iter().map(TestTx::boxed).collect()
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Chain VM over a fixed set of [`TestBlock`]s.
#[derive(Debug, Default)]
pub struct TestVm {
    blocks: Mutex<HashMap<Id, TestBlock>>,
    buildable: Mutex<VecDeque<TestBlock>>,
    preferences: Mutex<Vec<Id>>,
}

impl TestVm {
    pub fn new(genesis: &TestBlock) -> Self {
        let vm = Self::default();
        vm.insert(genesis);
        vm
    }

    /// Makes `block` parseable and gettable.
    pub fn insert(&self, block: &TestBlock) {
        self.blocks.lock().insert(block.id, block.clone());
    }

    /// Queues `block` to be returned by the next `build_block`.
    pub fn push_buildable(&self, block: &TestBlock) {
        self.insert(block);
        self.buildable.lock().push_back(block.clone());
    }

    /// Every preference the engine reported, oldest first.
    pub fn preferences(&self) -> Vec<Id> {
        self.preferences.lock().clone()
    }
}

#[async_trait]
impl ChainVm for TestVm {
    async fn parse_block(&self, bytes: &[u8]) -> Result<Box<dyn Block>> {
        let id = Id::from_slice(bytes).map_err(|e| ConsensusError::InvalidBlock(e.to_string()))?;
        self.blocks
            .lock()
            .get(&id)
            .map(TestBlock::boxed)
            .ok_or_else(|| ConsensusError::InvalidBlock(format!("unknown block {id}")))
    }

    async fn build_block(&self) -> Result<Box<dyn Block>> {
        self.buildable
            .lock()
            .pop_front()
            .map(|b| b.boxed())
            .ok_or_else(|| ConsensusError::Vm("no pending transactions".into()))
    }

    async fn get_block(&self, id: Id) -> Result<Option<Box<dyn Block>>> {
        Ok(self.blocks.lock().get(&id).map(TestBlock::boxed))
    }

    async fn set_preference(&self, id: Id) -> Result<()> {
        self.preferences.lock().push(id);
        Ok(())
    }

    async fn last_accepted(&self) -> Result<Id> {
        self.blocks
            .lock()
            .values()
            .filter(|b| b.current_status() == Status::Accepted)
            .max_by_key(|b| b.height)
            .map(|b| b.id)
            .ok_or_else(|| ConsensusError::Vm("no accepted block".into()))
    }
}

/// Records every outbound message; sends to `unreachable` nodes fail.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(OutboundMessage, HashSet<NodeId>)>>,
    gossiped: Mutex<Vec<OutboundMessage>>,
    unreachable: Mutex<HashSet<NodeId>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, node: NodeId) {
        self.unreachable.lock().insert(node);
    }

    /// Drains the recorded messages.
    pub fn take(&self) -> Vec<(OutboundMessage, HashSet<NodeId>)> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn gossiped(&self) -> Vec<OutboundMessage> {
        self.gossiped.lock().clone()
    }
}

impl Sender for RecordingSender {
    fn send(&self, msg: OutboundMessage, nodes: &HashSet<NodeId>) -> HashSet<NodeId> {
        let unreachable = self.unreachable.lock();
        let delivered: HashSet<NodeId> = nodes
            .iter()
            .filter(|n| !unreachable.contains(n))
            .copied()
            .collect();
        self.sent.lock().push((msg, nodes.clone()));
        delivered
    }

    fn gossip(&self, msg: OutboundMessage, _num_peers: usize) {
        self.gossiped.lock().push(msg);
    }
}

/// Records bench and unbench notifications.
#[derive(Debug, Default)]
pub struct RecordingBenchable {
    pub benched: Mutex<Vec<NodeId>>,
    pub unbenched: Mutex<Vec<NodeId>>,
}

impl Benchable for RecordingBenchable {
    fn benched(&self, _chain_id: Id, node_id: NodeId) {
        self.benched.lock().push(node_id);
    }

    fn unbenched(&self, _chain_id: Id, node_id: NodeId) {
        self.unbenched.lock().push(node_id);
    }
}

/// Records accepted container IDs.
#[derive(Debug, Default)]
pub struct RecordingAcceptor {
    pub accepted: Mutex<Vec<Id>>,
}

impl Acceptor for RecordingAcceptor {
    fn name(&self) -> &str {
        "recording"
    }

    fn accept(&self, _chain_id: Id, container_id: Id, _bytes: &[u8]) -> Result<()> {
        self.accepted.lock().push(container_id);
        Ok(())
    }
}
