use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use avalanche_ids::Id;
use avalanche_utils::Bag;
use tracing::{debug, info, trace};

use super::Tx;
use crate::health::{duration_millis, HealthCheck, HealthReport};
use crate::{ConsensusContext, ConsensusError, Parameters, Result, Status};

struct TxNode {
    tx: Box<dyn Tx>,
    /// Set once the transaction ever conflicted with another.
    rogue: bool,
    num_successful_polls: usize,
    confidence: usize,
    last_vote: u64,
    /// Reached its beta; accepted as soon as its dependencies are.
    pending_accept: bool,
    /// Conflicting transactions preferred over this one.
    ins: HashSet<Id>,
    /// Conflicting transactions this one is preferred over.
    outs: HashSet<Id>,
    added_at: Instant,
}

/// Conflict graph with preference edges.
///
/// An edge `a -> b` means `a` is preferred over `b`; a transaction is
/// preferred when it has no incoming edge. Edges are redirected when a
/// transaction gathers strictly more successful polls than a conflict
/// preferred over it.
pub struct Directed {
    ctx: ConsensusContext,
    params: Parameters,
    txs: HashMap<Id, TxNode>,
    /// Processing transactions by consumed input.
    spenders: HashMap<Id, HashSet<Id>>,
    /// Processing transactions by processing dependency.
    dependents: HashMap<Id, HashSet<Id>>,
    preferences: HashSet<Id>,
    virtuous: HashSet<Id>,
    decided: HashMap<Id, Status>,
    current_vote: u64,
}

impl Directed {
    pub fn new(ctx: ConsensusContext, params: Parameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            ctx,
            params,
            txs: HashMap::new(),
            spenders: HashMap::new(),
            dependents: HashMap::new(),
            preferences: HashSet::new(),
            virtuous: HashSet::new(),
            decided: HashMap::new(),
            current_vote: 0,
        })
    }

    /// Processing transactions that currently conflict with `tx`.
    pub fn conflicts(&self, tx: &dyn Tx) -> HashSet<Id> {
        let id = tx.id();
        tx.input_ids()
            .iter()
            .filter_map(|input| self.spenders.get(input))
            .flatten()
            .filter(|other| **other != id)
            .copied()
            .collect()
    }

    /// True if no processing transaction conflicts with `tx`.
    pub fn is_virtuous(&self, tx: &dyn Tx) -> bool {
        self.conflicts(tx).is_empty()
    }

    /// True if the transaction is processing or was decided here.
    pub fn issued(&self, id: &Id) -> bool {
        self.txs.contains_key(id) || self.decided.contains_key(id)
    }

    pub fn processing(&self, id: &Id) -> bool {
        self.txs.contains_key(id)
    }

    pub fn status(&self, id: &Id) -> Status {
        if self.txs.contains_key(id) {
            return Status::Processing;
        }
        self.decided.get(id).copied().unwrap_or(Status::Unknown)
    }

    /// Processing transactions that are preferred over all their conflicts.
    pub fn preferences(&self) -> &HashSet<Id> {
        &self.preferences
    }

    /// Processing transactions without conflicts.
    pub fn virtuous(&self) -> &HashSet<Id> {
        &self.virtuous
    }

    pub fn is_preferred(&self, id: &Id) -> bool {
        self.preferences.contains(id)
    }

    /// Consecutive successful polls up to the latest one.
    pub fn confidence(&self, id: &Id) -> usize {
        match self.txs.get(id) {
            Some(node) if node.last_vote == self.current_vote => node.confidence,
            _ => 0,
        }
    }

    pub fn num_processing(&self) -> usize {
        self.txs.len()
    }

    pub fn finalized(&self) -> bool {
        self.txs.is_empty()
    }

    /// Adds a transaction. Adding a processing transaction is a no-op; a
    /// transaction depending on a rejected one is rejected immediately.
    pub fn add(&mut self, mut tx: Box<dyn Tx>) -> Result<()> {
        let id = tx.id();
        if self.txs.contains_key(&id) {
            return Ok(());
        }
        if tx.status().decided() || self.decided.contains_key(&id) {
            return Err(ConsensusError::AlreadyDecided(id));
        }

        let dependencies = tx.dependencies();
        if dependencies
            .iter()
            .any(|dep| self.decided.get(dep) == Some(&Status::Rejected))
        {
            tx.reject().map_err(|e| ConsensusError::Decision {
                action: "reject",
                id,
                reason: e.to_string(),
            })?;
            self.decided.insert(id, Status::Rejected);
            debug!(tx = %id, "rejected transaction with rejected dependency");
            return Ok(());
        }

        let conflicts = self.conflicts(tx.as_ref());
        for other in &conflicts {
            if let Some(node) = self.txs.get_mut(other) {
                node.outs.insert(id);
                node.rogue = true;
            }
            self.virtuous.remove(other);
        }
        if conflicts.is_empty() {
            self.virtuous.insert(id);
            self.preferences.insert(id);
        }

        for input in tx.input_ids() {
            self.spenders.entry(input).or_default().insert(id);
        }
        for dep in dependencies.iter().filter(|d| self.txs.contains_key(d)) {
            self.dependents.entry(*dep).or_default().insert(id);
        }

        trace!(tx = %id, conflicts = conflicts.len(), "added transaction");
        self.txs.insert(
            id,
            TxNode {
                tx,
                rogue: !conflicts.is_empty(),
                num_successful_polls: 0,
                confidence: 0,
                last_vote: 0,
                pending_accept: false,
                ins: conflicts,
                outs: HashSet::new(),
                added_at: self.ctx.clock.now(),
            },
        );
        Ok(())
    }

    /// Applies one poll: every transaction with at least `alpha` votes gets
    /// a successful poll. Returns true if any transaction was decided.
    pub fn record_poll(&mut self, votes: &Bag<Id>) -> Result<bool> {
        self.current_vote += 1;

        let mut successful: Vec<Id> = votes
            .iter()
            .filter(|(id, count)| *count >= self.params.alpha && self.txs.contains_key(id))
            .map(|(id, _)| *id)
            .collect();
        successful.sort();

        for id in successful {
            self.record_successful_poll(id);
        }

        self.accept_ready()
    }

    /// Breaks every confidence streak.
    pub fn record_unsuccessful_poll(&mut self) {
        self.current_vote += 1;
    }

    fn record_successful_poll(&mut self, id: Id) {
        let current_vote = self.current_vote;
        let Some(node) = self.txs.get_mut(&id) else {
            return;
        };
        node.num_successful_polls += 1;
        let streak = node.last_vote + 1 == current_vote;
        node.last_vote = current_vote;

        self.redirect_edges(id);

        let Some(node) = self.txs.get_mut(&id) else {
            return;
        };
        if !node.ins.is_empty() {
            node.confidence = 0;
            return;
        }
        node.confidence = if streak { node.confidence + 1 } else { 1 };

        let beta = if node.rogue {
            self.params.beta_rogue
        } else {
            self.params.beta_virtuous
        };
        if !node.pending_accept && node.confidence >= beta {
            node.pending_accept = true;
            trace!(tx = %id, confidence = node.confidence, "transaction pending acceptance");
        }
    }

    /// Flips every incoming edge from a conflict with fewer successful polls.
    fn redirect_edges(&mut self, id: Id) {
        let Some(node) = self.txs.get(&id) else {
            return;
        };
        let polls = node.num_successful_polls;
        let flipped: Vec<Id> = node
            .ins
            .iter()
            .filter(|other| {
                self.txs
                    .get(other)
                    .is_some_and(|o| o.num_successful_polls < polls)
            })
            .copied()
            .collect();

        for other in &flipped {
            if let Some(o) = self.txs.get_mut(other) {
                o.outs.remove(&id);
                o.ins.insert(id);
                o.confidence = 0;
            }
            self.preferences.remove(other);
        }
        if let Some(node) = self.txs.get_mut(&id) {
            for other in flipped {
                node.ins.remove(&other);
                node.outs.insert(other);
            }
            if node.ins.is_empty() {
                self.preferences.insert(id);
            }
        }
    }

    /// Accepts pending transactions whose dependencies are all accepted.
    fn accept_ready(&mut self) -> Result<bool> {
        let mut changed = false;
        loop {
            let mut ready: Vec<Id> = self
                .txs
                .iter()
                .filter(|(_, node)| {
                    node.pending_accept
                        && node
                            .tx
                            .dependencies()
                            .iter()
                            .all(|dep| !self.txs.contains_key(dep))
                })
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                return Ok(changed);
            }
            ready.sort();
            for id in ready {
                if self.txs.contains_key(&id) {
                    self.accept(id)?;
                    changed = true;
                }
            }
        }
    }

    fn accept(&mut self, id: Id) -> Result<()> {
        let Some(mut node) = self.txs.remove(&id) else {
            return Ok(());
        };
        self.forget(id, node.tx.as_ref());

        node.tx.accept().map_err(|e| ConsensusError::Decision {
            action: "accept",
            id,
            reason: e.to_string(),
        })?;
        self.decided.insert(id, Status::Accepted);
        info!(tx = %id, "accepted transaction");

        let conflicts: Vec<Id> = node.ins.union(&node.outs).copied().collect();
        self.reject_transitively(conflicts)?;
        self.ctx.notify_accepted(id, node.tx.bytes())
    }

    fn reject_transitively(&mut self, mut pending: Vec<Id>) -> Result<()> {
        while let Some(id) = pending.pop() {
            let Some(mut node) = self.txs.remove(&id) else {
                continue;
            };
            self.forget(id, node.tx.as_ref());
            node.tx.reject().map_err(|e| ConsensusError::Decision {
                action: "reject",
                id,
                reason: e.to_string(),
            })?;
            self.decided.insert(id, Status::Rejected);
            debug!(tx = %id, "rejected transaction");

            for other in node.ins.union(&node.outs) {
                if let Some(o) = self.txs.get_mut(other) {
                    o.ins.remove(&id);
                    o.outs.remove(&id);
                    if o.ins.is_empty() {
                        self.preferences.insert(*other);
                    }
                    if o.ins.is_empty() && o.outs.is_empty() {
                        self.virtuous.insert(*other);
                    }
                }
            }
            if let Some(dependents) = self.dependents.remove(&id) {
                pending.extend(dependents);
            }
        }
        Ok(())
    }

    /// Drops the indexes pointing at a transaction leaving the graph.
    fn forget(&mut self, id: Id, tx: &dyn Tx) {
        self.preferences.remove(&id);
        self.virtuous.remove(&id);
        for input in tx.input_ids() {
            if let Some(spenders) = self.spenders.get_mut(&input) {
                spenders.remove(&id);
                if spenders.is_empty() {
                    self.spenders.remove(&input);
                }
            }
        }
        for dep in tx.dependencies() {
            if let Some(dependents) = self.dependents.get_mut(&dep) {
                dependents.remove(&id);
                if dependents.is_empty() {
                    self.dependents.remove(&dep);
                }
            }
        }
    }
}

impl HealthCheck for Directed {
    fn health_check(&self) -> HealthReport {
        let now = self.ctx.clock.now();
        let longest = self
            .txs
            .values()
            .map(|node| now.saturating_duration_since(node.added_at))
            .max()
            .unwrap_or(Duration::ZERO);

        let mut report = HealthReport::healthy()
            .detail("num_processing", self.txs.len())
            .detail("virtuous", self.virtuous.len())
            .detail("longest_processing", duration_millis(longest));
        if self.txs.len() > self.params.max_outstanding_items {
            report.fail(format!(
                "{} processing transactions exceeds the limit of {}",
                self.txs.len(),
                self.params.max_outstanding_items
            ));
        }
        if longest > self.params.max_item_processing_time {
            report.fail(format!("transaction processing for {longest:?}"));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::testing::{make_id, make_node_id, DecisionLog, TestTx};
    use crate::Decidable;

    fn directed(params: Parameters) -> Directed {
        let ctx = ConsensusContext::new(make_id(100), make_id(101), make_node_id(1));
        Directed::new(ctx, params).unwrap()
    }

    fn params() -> Parameters {
        Parameters::new(2, 2, 1, 2)
    }

    #[test]
    fn test_virtuous_tx_accepted() {
        let mut graph = directed(params());
        let tx = TestTx::new(make_id(1), &[make_id(50)]);
        graph.add(tx.boxed()).unwrap();
        assert!(graph.virtuous().contains(&tx.id()));
        assert!(graph.is_preferred(&tx.id()));

        assert!(!graph.record_poll(&Bag::of([tx.id()])).unwrap(), "below alpha");
        assert!(graph.record_poll(&Bag::of([tx.id(), tx.id()])).unwrap());
        assert_eq!(tx.current_status(), Status::Accepted);
        assert!(graph.finalized());
        assert_eq!(graph.status(&tx.id()), Status::Accepted);
    }

    #[test]
    fn test_conflict_flips_preference_on_more_polls() {
        let mut graph = directed(params());
        let red = TestTx::new(make_id(1), &[make_id(50)]);
        let blue = TestTx::new(make_id(2), &[make_id(50)]);
        graph.add(red.boxed()).unwrap();
        graph.add(blue.boxed()).unwrap();

        assert!(graph.is_preferred(&red.id()));
        assert!(!graph.is_preferred(&blue.id()));
        assert!(graph.virtuous().is_empty());
        assert_eq!(graph.conflicts(&red), HashSet::from([blue.id()]));

        let blue_votes = Bag::of([blue.id(), blue.id()]);
        graph.record_poll(&blue_votes).unwrap();
        assert!(graph.is_preferred(&blue.id()));
        assert!(!graph.is_preferred(&red.id()));
        assert_eq!(graph.confidence(&blue.id()), 1);

        graph.record_poll(&blue_votes).unwrap();
        assert_eq!(blue.current_status(), Status::Accepted);
        assert_eq!(red.current_status(), Status::Rejected);
    }

    #[test]
    fn test_pending_accept_survives_losing_preference() {
        let mut graph = directed(params());
        let dep = TestTx::new(make_id(1), &[make_id(60)]);
        let red = TestTx::new(make_id(2), &[make_id(50)]).with_dependencies(&[dep.id()]);
        let blue = TestTx::new(make_id(3), &[make_id(50)]);
        graph.add(dep.boxed()).unwrap();
        graph.add(red.boxed()).unwrap();
        graph.add(blue.boxed()).unwrap();

        let red_votes = Bag::of([red.id(), red.id()]);
        graph.record_poll(&red_votes).unwrap();
        graph.record_poll(&red_votes).unwrap();
        assert_eq!(red.current_status(), Status::Processing, "waits on its dependency");

        let blue_votes = Bag::of([blue.id(), blue.id()]);
        for _ in 0..3 {
            graph.record_poll(&blue_votes).unwrap();
        }
        assert!(graph.is_preferred(&blue.id()));
        assert!(!graph.is_preferred(&red.id()));
        assert_eq!(blue.current_status(), Status::Processing);

        // Red already finalized its streak; it is accepted once unblocked.
        graph.record_poll(&Bag::of([dep.id(), dep.id()])).unwrap();
        assert_eq!(dep.current_status(), Status::Accepted);
        assert_eq!(red.current_status(), Status::Accepted);
        assert_eq!(blue.current_status(), Status::Rejected);
    }

    #[test]
    fn test_tie_keeps_first_preference() {
        let mut graph = directed(params());
        let red = TestTx::new(make_id(1), &[make_id(50)]);
        let blue = TestTx::new(make_id(2), &[make_id(50)]);
        graph.add(red.boxed()).unwrap();
        graph.add(blue.boxed()).unwrap();

        graph.record_poll(&Bag::of([red.id(), red.id()])).unwrap();
        graph.record_poll(&Bag::of([blue.id(), blue.id()])).unwrap();
        assert!(graph.is_preferred(&red.id()), "equal polls do not flip");
        assert_eq!(graph.confidence(&red.id()), 0);
    }

    #[test]
    fn test_unsuccessful_poll_breaks_streak() {
        let mut graph = directed(params());
        let red = TestTx::new(make_id(1), &[make_id(50)]);
        let blue = TestTx::new(make_id(2), &[make_id(50)]);
        graph.add(red.boxed()).unwrap();
        graph.add(blue.boxed()).unwrap();

        let red_votes = Bag::of([red.id(), red.id()]);
        graph.record_poll(&red_votes).unwrap();
        graph.record_unsuccessful_poll();
        assert_eq!(graph.confidence(&red.id()), 0);
        graph.record_poll(&red_votes).unwrap();
        assert_eq!(red.current_status(), Status::Processing);
        graph.record_poll(&red_votes).unwrap();
        assert_eq!(red.current_status(), Status::Accepted);
        assert_eq!(blue.current_status(), Status::Rejected);
    }

    #[test]
    fn test_dependencies_accepted_first() {
        let log: DecisionLog = Arc::new(Mutex::new(Vec::new()));
        let mut graph = directed(params());
        let parent = TestTx::new(make_id(1), &[make_id(50)]).with_log(log.clone());
        let child = TestTx::new(make_id(2), &[make_id(51)])
            .with_dependencies(&[parent.id()])
            .with_log(log.clone());
        graph.add(parent.boxed()).unwrap();
        graph.add(child.boxed()).unwrap();

        graph.record_poll(&Bag::of([child.id(), child.id()])).unwrap();
        assert_eq!(child.current_status(), Status::Processing, "waits on its dependency");

        graph.record_poll(&Bag::of([parent.id(), parent.id()])).unwrap();
        assert_eq!(
            *log.lock(),
            vec![(parent.id(), Status::Accepted), (child.id(), Status::Accepted)]
        );
    }

    #[test]
    fn test_rejection_cascades_to_dependents() {
        let mut graph = directed(params());
        let spent = TestTx::new(make_id(1), &[make_id(50)]);
        let double_spend = TestTx::new(make_id(2), &[make_id(50)]);
        let dependent = TestTx::new(make_id(3), &[make_id(51)]).with_dependencies(&[spent.id()]);
        graph.add(spent.boxed()).unwrap();
        graph.add(double_spend.boxed()).unwrap();
        graph.add(dependent.boxed()).unwrap();

        let votes = Bag::of([double_spend.id(), double_spend.id()]);
        graph.record_poll(&votes).unwrap();
        graph.record_poll(&votes).unwrap();

        assert_eq!(double_spend.current_status(), Status::Accepted);
        assert_eq!(spent.current_status(), Status::Rejected);
        assert_eq!(dependent.current_status(), Status::Rejected);
        assert!(graph.finalized());

        let late = TestTx::new(make_id(4), &[make_id(52)]).with_dependencies(&[spent.id()]);
        graph.add(late.boxed()).unwrap();
        assert_eq!(late.current_status(), Status::Rejected);
    }

    #[test]
    fn test_rejecting_conflict_restores_virtuous() {
        let mut graph = directed(params());
        let a = TestTx::new(make_id(1), &[make_id(50)]);
        let b = TestTx::new(make_id(2), &[make_id(50), make_id(51)]);
        let c = TestTx::new(make_id(3), &[make_id(51)]);
        graph.add(a.boxed()).unwrap();
        graph.add(b.boxed()).unwrap();
        graph.add(c.boxed()).unwrap();
        assert!(graph.virtuous().is_empty());

        let votes = Bag::of([a.id(), a.id()]);
        graph.record_poll(&votes).unwrap();
        graph.record_poll(&votes).unwrap();

        assert_eq!(b.current_status(), Status::Rejected);
        assert!(graph.virtuous().contains(&c.id()));
        assert!(graph.is_preferred(&c.id()));
    }

    #[test]
    fn test_decided_tx_cannot_be_added() {
        let mut graph = directed(Parameters::new(1, 1, 1, 1));
        let tx = TestTx::new(make_id(1), &[make_id(50)]);
        graph.add(tx.boxed()).unwrap();
        graph.record_poll(&Bag::of([tx.id()])).unwrap();

        assert_eq!(
            graph.add(tx.boxed()),
            Err(ConsensusError::AlreadyDecided(tx.id()))
        );
    }
}
