//! Snowman consensus over a tree of processing blocks.
//!
//! Every block that has processing children owns a snowball instance that
//! decides between those children. A vote for a block is also a vote for
//! each of its processing ancestors, so a poll is applied top-down starting
//! at the last accepted block.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use avalanche_ids::Id;
use avalanche_utils::Bag;
use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use super::{Block, Consensus};
use crate::consensus::snowball::{self, Factory};
use crate::health::{duration_millis, HealthCheck, HealthReport};
use crate::{ConsensusContext, ConsensusError, Parameters, Result};

/// A block known to consensus: the last accepted block or a processing one.
struct Node {
    /// `None` for the last accepted block, which is already decided.
    block: Option<Box<dyn Block>>,
    parent: Id,
    height: u64,
    children: Vec<Id>,
    /// Decides between `children`; created with the first child.
    snowball: Option<Box<dyn snowball::Consensus>>,
    added_at: Instant,
}

/// Snowman consensus keyed by block ID.
pub struct Topological {
    factory: Factory,
    params: Parameters,
    ctx: Option<ConsensusContext>,
    blocks: HashMap<Id, Node>,
    last_accepted: Id,
    last_accepted_height: u64,
    last_accepted_time: Option<DateTime<Utc>>,
    /// Local clock reading when `last_accepted` was decided.
    last_accepted_at: Option<Instant>,
    /// Tip of the preferred chain.
    tail: Id,
    /// Processing blocks on the preferred chain.
    preferred: HashSet<Id>,
}

impl Topological {
    pub fn new(factory: Factory) -> Self {
        Self {
            factory,
            params: Parameters::default(),
            ctx: None,
            blocks: HashMap::new(),
            last_accepted: Id::EMPTY,
            last_accepted_height: 0,
            last_accepted_time: None,
            last_accepted_at: None,
            tail: Id::EMPTY,
            preferred: HashSet::new(),
        }
    }

    fn ctx(&self) -> Result<&ConsensusContext> {
        self.ctx.as_ref().ok_or(ConsensusError::NotInitialized)
    }

    /// Timestamp of the last accepted block.
    pub fn last_accepted_time(&self) -> Option<DateTime<Utc>> {
        self.last_accepted_time
    }

    /// Splits `votes` per deciding parent, counting each vote for every
    /// processing ancestor of the block it names.
    fn transitive_votes(&self, votes: &Bag<Id>) -> Result<HashMap<Id, Bag<Id>>> {
        let mut per_parent: HashMap<Id, Bag<Id>> = HashMap::new();
        for (&voted, count) in votes.iter() {
            if !self.processing(&voted) {
                trace!(block = %voted, "dropping vote for block that is not processing");
                continue;
            }
            let mut current = voted;
            while current != self.last_accepted {
                let node = self.blocks.get(&current).ok_or_else(|| {
                    ConsensusError::Internal(format!("processing block {current} has no ancestry"))
                })?;
                per_parent
                    .entry(node.parent)
                    .or_default()
                    .add_count(current, count);
                current = node.parent;
            }
        }
        Ok(per_parent)
    }

    /// Accepts preferred children for as long as the last accepted block's
    /// decision is finalized.
    fn accept_finalized(&mut self) -> Result<()> {
        loop {
            let Some(root) = self.blocks.get(&self.last_accepted) else {
                return Err(ConsensusError::Internal(
                    "last accepted block is not tracked".into(),
                ));
            };
            let Some(snowball) = root.snowball.as_ref() else {
                return Ok(());
            };
            if !snowball.finalized() {
                return Ok(());
            }
            let child = snowball.preference();
            self.accept(child)?;
        }
    }

    /// Accepts `id`, a child of the last accepted block, and rejects its
    /// siblings along with their descendants.
    fn accept(&mut self, id: Id) -> Result<()> {
        let parent = self
            .blocks
            .remove(&self.last_accepted)
            .ok_or_else(|| ConsensusError::Internal("last accepted block is not tracked".into()))?;

        let siblings = parent.children.into_iter().filter(|c| *c != id);
        self.reject_transitively(siblings.collect())?;

        let node = self.blocks.get_mut(&id).ok_or_else(|| {
            ConsensusError::Internal(format!("finalized block {id} is not tracked"))
        })?;
        let Some(mut block) = node.block.take() else {
            return Err(ConsensusError::Internal(format!("{id} already accepted")));
        };
        let height = node.height;

        block.accept().map_err(|e| ConsensusError::Decision {
            action: "accept",
            id,
            reason: e.to_string(),
        })?;
        self.last_accepted = id;
        self.last_accepted_height = height;
        self.last_accepted_time = Some(block.timestamp());
        self.last_accepted_at = Some(self.ctx()?.clock.now());
        self.preferred.remove(&id);
        info!(block = %id, height, "accepted block");

        self.ctx()?.notify_accepted(id, block.bytes())
    }

    fn reject_transitively(&mut self, mut pending: Vec<Id>) -> Result<()> {
        while let Some(id) = pending.pop() {
            let Some(node) = self.blocks.remove(&id) else {
                continue;
            };
            self.preferred.remove(&id);
            if let Some(mut block) = node.block {
                block.reject().map_err(|e| ConsensusError::Decision {
                    action: "reject",
                    id,
                    reason: e.to_string(),
                })?;
                debug!(block = %id, height = node.height, "rejected block");
            }
            pending.extend(node.children);
        }
        Ok(())
    }

    /// Recomputes the preferred chain from the last accepted block.
    fn update_preferences(&mut self) {
        self.preferred.clear();
        let mut tail = self.last_accepted;
        while let Some(snowball) = self.blocks.get(&tail).and_then(|n| n.snowball.as_ref()) {
            tail = snowball.preference();
            self.preferred.insert(tail);
        }
        self.tail = tail;
    }
}

impl Consensus for Topological {
    fn initialize(
        &mut self,
        ctx: ConsensusContext,
        params: Parameters,
        last_accepted_id: Id,
        last_accepted_height: u64,
        last_accepted_time: DateTime<Utc>,
    ) -> Result<()> {
        params.validate()?;

        self.blocks.clear();
        self.blocks.insert(
            last_accepted_id,
            Node {
                block: None,
                parent: Id::EMPTY,
                height: last_accepted_height,
                children: Vec::new(),
                snowball: None,
                added_at: ctx.clock.now(),
            },
        );
        self.last_accepted_at = Some(ctx.clock.now());
        self.params = params;
        self.ctx = Some(ctx);
        self.last_accepted = last_accepted_id;
        self.last_accepted_height = last_accepted_height;
        self.last_accepted_time = Some(last_accepted_time);
        self.tail = last_accepted_id;
        self.preferred.clear();
        Ok(())
    }

    fn num_processing(&self) -> usize {
        self.blocks.len().saturating_sub(1)
    }

    fn add(&mut self, mut block: Box<dyn Block>) -> Result<()> {
        let now = self.ctx()?.clock.now();
        let id = block.id();
        let parent_id = block.parent();
        let height = block.height();

        if self.blocks.contains_key(&id) {
            return Err(if id == self.last_accepted {
                ConsensusError::AlreadyDecided(id)
            } else {
                ConsensusError::DuplicateAdd(id)
            });
        }
        if self.decided(block.as_ref()) {
            return Err(ConsensusError::AlreadyDecided(id));
        }

        let Some(parent) = self.blocks.get_mut(&parent_id) else {
            if height <= self.last_accepted_height + 1 {
                // The parent is decided but is not the last accepted block,
                // so it was rejected.
                block.reject().map_err(|e| ConsensusError::Decision {
                    action: "reject",
                    id,
                    reason: e.to_string(),
                })?;
                debug!(block = %id, parent = %parent_id, "rejected block with rejected parent");
                return Ok(());
            }
            return Err(ConsensusError::UnknownParent {
                id,
                parent: parent_id,
            });
        };

        parent.children.push(id);
        match parent.snowball.as_mut() {
            Some(snowball) => snowball.add(id),
            None => parent.snowball = Some(self.factory.new_consensus(&self.params, id)),
        }

        self.blocks.insert(
            id,
            Node {
                block: Some(block),
                parent: parent_id,
                height,
                children: Vec::new(),
                snowball: None,
                added_at: now,
            },
        );

        if self.tail == parent_id {
            self.tail = id;
            self.preferred.insert(id);
        }
        debug!(block = %id, parent = %parent_id, height, "added block");
        Ok(())
    }

    fn decided(&self, block: &dyn Block) -> bool {
        if self.processing(&block.id()) {
            return false;
        }
        block.status().decided() || block.height() <= self.last_accepted_height
    }

    fn processing(&self, id: &Id) -> bool {
        *id != self.last_accepted && self.blocks.contains_key(id)
    }

    fn is_preferred(&self, id: &Id) -> bool {
        *id == self.last_accepted || self.preferred.contains(id)
    }

    fn last_accepted(&self) -> (Id, u64) {
        (self.last_accepted, self.last_accepted_height)
    }

    fn preference(&self) -> Id {
        self.tail
    }

    fn get(&self, id: &Id) -> Option<&dyn Block> {
        self.blocks.get(id).and_then(|n| n.block.as_deref())
    }

    fn record_poll(&mut self, votes: &Bag<Id>) -> Result<()> {
        self.ctx()?;
        let mut per_parent = self.transitive_votes(votes)?;

        // Only children of a decision that polled successfully can poll
        // successfully themselves.
        let mut polled = HashSet::new();
        let mut queue = VecDeque::from([self.last_accepted]);
        while let Some(parent) = queue.pop_front() {
            let Some(votes) = per_parent.remove(&parent) else {
                continue;
            };
            let Some(snowball) = self.blocks.get_mut(&parent).and_then(|n| n.snowball.as_mut())
            else {
                continue;
            };
            polled.insert(parent);
            if snowball.record_poll(&votes) {
                queue.extend(votes.list());
            }
        }

        for (id, node) in &mut self.blocks {
            if let Some(snowball) = node.snowball.as_mut() {
                if !polled.contains(id) {
                    snowball.record_unsuccessful_poll();
                }
            }
        }

        self.accept_finalized()?;
        self.update_preferences();
        Ok(())
    }

    fn record_unsuccessful_poll(&mut self) {
        for node in self.blocks.values_mut() {
            if let Some(snowball) = node.snowball.as_mut() {
                snowball.record_unsuccessful_poll();
            }
        }
    }

    fn finalized(&self) -> bool {
        self.num_processing() == 0
    }
}

impl HealthCheck for Topological {
    fn health_check(&self) -> HealthReport {
        let now = self
            .ctx
            .as_ref()
            .map_or_else(Instant::now, |ctx| ctx.clock.now());
        let longest = self
            .blocks
            .iter()
            .filter(|(id, _)| **id != self.last_accepted)
            .map(|(_, node)| now.saturating_duration_since(node.added_at))
            .max()
            .unwrap_or(Duration::ZERO);
        let processing = self.num_processing();

        let mut report = HealthReport::healthy()
            .detail("num_processing", processing)
            .detail("longest_processing", duration_millis(longest))
            .detail("last_accepted", self.last_accepted.to_string())
            .detail("last_accepted_height", self.last_accepted_height);
        if let Some(at) = self.last_accepted_at {
            report = report.detail(
                "last_accepted_age",
                duration_millis(now.saturating_duration_since(at)),
            );
        }

        if processing > self.params.max_outstanding_items {
            report.fail(format!(
                "{processing} processing blocks exceeds the limit of {}",
                self.params.max_outstanding_items
            ));
        }
        if longest > self.params.max_item_processing_time {
            report.fail(format!(
                "block processing for {longest:?} exceeds {:?}",
                self.params.max_item_processing_time
            ));
        }
        report
    }
}
