use std::collections::{HashMap, HashSet};

use avalanche_ids::Id;
use avalanche_utils::UniqueBag;
use tracing::{debug, info};

use super::Vertex;
use crate::consensus::snowstorm::{Directed, Tx};
use crate::health::{HealthCheck, HealthReport};
use crate::{ConsensusContext, ConsensusError, Parameters, Result, Status};

struct VertexNode {
    vertex: Box<dyn Vertex>,
    parents: Vec<Id>,
    txs: Vec<Id>,
    height: u64,
}

/// Avalanche consensus over processing vertices.
pub struct Topological {
    ctx: ConsensusContext,
    conflicts: Directed,
    vertices: HashMap<Id, VertexNode>,
    /// Every vertex decided by this instance, plus the initial frontier.
    decided: HashMap<Id, Status>,
    /// Accepted vertices without accepted children.
    frontier: HashSet<Id>,
    /// Processing vertices whose transactions and parents are all preferred.
    preferred: HashSet<Id>,
    /// Preferred vertices with no preferred child.
    preferred_frontier: HashSet<Id>,
    /// Processing vertices whose transactions and parents are all virtuous.
    virtuous: HashSet<Id>,
    orphans: HashSet<Id>,
}

impl Topological {
    /// Builds an instance on top of the accepted `frontier`.
    pub fn new(ctx: ConsensusContext, params: Parameters, frontier: &[Id]) -> Result<Self> {
        let conflicts = Directed::new(ctx.clone(), params)?;
        Ok(Self {
            ctx,
            conflicts,
            vertices: HashMap::new(),
            decided: frontier.iter().map(|id| (*id, Status::Accepted)).collect(),
            frontier: frontier.iter().copied().collect(),
            preferred: HashSet::new(),
            preferred_frontier: HashSet::new(),
            virtuous: HashSet::new(),
            orphans: HashSet::new(),
        })
    }

    pub fn num_processing(&self) -> usize {
        self.vertices.len()
    }

    /// True if `tx` conflicts with no processing transaction.
    pub fn is_virtuous(&self, tx: &dyn Tx) -> bool {
        self.conflicts.is_virtuous(tx)
    }

    pub fn vertex_issued(&self, id: &Id) -> bool {
        self.vertices.contains_key(id) || self.decided.contains_key(id)
    }

    pub fn tx_issued(&self, id: &Id) -> bool {
        self.conflicts.issued(id)
    }

    pub fn vertex_status(&self, id: &Id) -> Status {
        if self.vertices.contains_key(id) {
            return Status::Processing;
        }
        self.decided.get(id).copied().unwrap_or(Status::Unknown)
    }

    pub fn tx_status(&self, id: &Id) -> Status {
        self.conflicts.status(id)
    }

    /// Virtuous transactions not contained in any preferred vertex; they
    /// have to be issued again in a new vertex.
    pub fn orphans(&self) -> &HashSet<Id> {
        &self.orphans
    }

    /// Processing vertices that are virtuous.
    pub fn virtuous(&self) -> &HashSet<Id> {
        &self.virtuous
    }

    /// Preferred vertices with no preferred child.
    pub fn preferences(&self) -> &HashSet<Id> {
        &self.preferred_frontier
    }

    pub fn accepted_frontier(&self) -> &HashSet<Id> {
        &self.frontier
    }

    /// False while a virtuous vertex is still processing. Polling only
    /// rogue vertices cannot make progress, so the engine may stop.
    pub fn quiesce(&self) -> bool {
        self.virtuous.is_empty()
    }

    pub fn finalized(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Adds a vertex whose parents are processing or accepted, issuing its
    /// transactions into the conflict graph.
    pub fn add(&mut self, mut vertex: Box<dyn Vertex>) -> Result<()> {
        let id = vertex.id();
        if self.vertices.contains_key(&id) {
            return Ok(());
        }
        if vertex.status().decided() || self.decided.contains_key(&id) {
            return Err(ConsensusError::AlreadyDecided(id));
        }

        let parents = vertex.parents();
        for parent in &parents {
            if self.vertices.contains_key(parent) {
                continue;
            }
            match self.decided.get(parent) {
                Some(Status::Accepted) => {}
                Some(_) => return self.reject_now(id, vertex.as_mut()),
                None => {
                    return Err(ConsensusError::UnknownDependency {
                        id,
                        dependency: *parent,
                    })
                }
            }
        }

        let mut tx_ids = Vec::new();
        for tx in vertex.txs() {
            let tx_id = tx.id();
            if !self.conflicts.issued(&tx_id) {
                self.conflicts.add(tx)?;
            }
            tx_ids.push(tx_id);
        }

        debug!(vertex = %id, txs = tx_ids.len(), "added vertex");
        let height = vertex.height();
        self.vertices.insert(
            id,
            VertexNode {
                vertex,
                parents,
                txs: tx_ids,
                height,
            },
        );
        self.update()
    }

    /// Applies one poll. Each voter's vote for a vertex also counts for
    /// every processing ancestor, once per voter.
    pub fn record_poll(&mut self, votes: &UniqueBag<Id>) -> Result<()> {
        let mut voters: HashMap<Id, HashSet<usize>> = votes
            .iter()
            .filter(|(id, _)| self.vertices.contains_key(*id))
            .map(|(id, set)| (*id, set.clone()))
            .collect();

        for id in self.by_height().into_iter().rev() {
            let Some(set) = voters.get(&id).cloned() else {
                continue;
            };
            let Some(node) = self.vertices.get(&id) else {
                continue;
            };
            for parent in node.parents.iter().filter(|p| self.vertices.contains_key(*p)) {
                voters.entry(*parent).or_default().extend(set.iter().copied());
            }
        }

        let mut tx_votes = UniqueBag::new();
        for (id, set) in &voters {
            if let Some(node) = self.vertices.get(id) {
                for tx in &node.txs {
                    tx_votes.union_set(*tx, set);
                }
            }
        }

        self.conflicts.record_poll(&tx_votes.bag())?;
        self.update()
    }

    pub fn record_unsuccessful_poll(&mut self) {
        self.conflicts.record_unsuccessful_poll();
    }

    /// Processing vertex IDs, lowest height first.
    fn by_height(&self) -> Vec<Id> {
        let mut ids: Vec<(u64, Id)> = self
            .vertices
            .iter()
            .map(|(id, node)| (node.height, *id))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Decides every vertex whose outcome is now known, then recomputes the
    /// preferred, virtuous and orphan sets.
    fn update(&mut self) -> Result<()> {
        loop {
            let mut changed = false;
            for id in self.by_height() {
                let Some(node) = self.vertices.get(&id) else {
                    continue;
                };
                let parents: Vec<Status> =
                    node.parents.iter().map(|p| self.vertex_status(p)).collect();
                let txs: Vec<Status> = node.txs.iter().map(|t| self.conflicts.status(t)).collect();

                if parents.contains(&Status::Rejected) || txs.contains(&Status::Rejected) {
                    self.reject(id)?;
                    changed = true;
                } else if parents.iter().all(Status::accepted) && txs.iter().all(Status::accepted) {
                    self.accept(id)?;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        self.update_sets();
        Ok(())
    }

    fn accept(&mut self, id: Id) -> Result<()> {
        let Some(mut node) = self.vertices.remove(&id) else {
            return Ok(());
        };
        node.vertex.accept().map_err(|e| ConsensusError::Decision {
            action: "accept",
            id,
            reason: e.to_string(),
        })?;
        self.decided.insert(id, Status::Accepted);
        for parent in &node.parents {
            self.frontier.remove(parent);
        }
        self.frontier.insert(id);
        info!(vertex = %id, height = node.height, "accepted vertex");
        self.ctx.notify_accepted(id, node.vertex.bytes())
    }

    fn reject(&mut self, id: Id) -> Result<()> {
        let Some(mut node) = self.vertices.remove(&id) else {
            return Ok(());
        };
        self.reject_now(id, node.vertex.as_mut())
    }

    fn reject_now(&mut self, id: Id, vertex: &mut dyn Vertex) -> Result<()> {
        vertex.reject().map_err(|e| ConsensusError::Decision {
            action: "reject",
            id,
            reason: e.to_string(),
        })?;
        self.decided.insert(id, Status::Rejected);
        debug!(vertex = %id, "rejected vertex");
        Ok(())
    }

    fn update_sets(&mut self) {
        self.preferred.clear();
        self.virtuous.clear();
        let mut has_preferred_child = HashSet::new();

        for id in self.by_height() {
            let Some(node) = self.vertices.get(&id) else {
                continue;
            };
            let accepted = |t: &Id| self.conflicts.status(t) == Status::Accepted;

            let parents_preferred = node
                .parents
                .iter()
                .all(|p| !self.vertices.contains_key(p) || self.preferred.contains(p));
            if parents_preferred
                && node
                    .txs
                    .iter()
                    .all(|t| self.conflicts.is_preferred(t) || accepted(t))
            {
                self.preferred.insert(id);
                has_preferred_child.extend(node.parents.iter().copied());
            }

            let parents_virtuous = node
                .parents
                .iter()
                .all(|p| !self.vertices.contains_key(p) || self.virtuous.contains(p));
            if parents_virtuous
                && node
                    .txs
                    .iter()
                    .all(|t| self.conflicts.virtuous().contains(t) || accepted(t))
            {
                self.virtuous.insert(id);
            }
        }

        self.preferred_frontier = self
            .preferred
            .iter()
            .filter(|id| !has_preferred_child.contains(*id))
            .copied()
            .collect();

        let covered: HashSet<Id> = self
            .preferred
            .iter()
            .filter_map(|id| self.vertices.get(id))
            .flat_map(|node| node.txs.iter().copied())
            .collect();
        self.orphans = self
            .conflicts
            .virtuous()
            .iter()
            .filter(|t| !covered.contains(*t))
            .copied()
            .collect();
    }
}

impl HealthCheck for Topological {
    fn health_check(&self) -> HealthReport {
        let mut report = HealthReport::healthy()
            .detail("processing_vertices", self.vertices.len())
            .detail("orphans", self.orphans.len());
        report.merge("transactions", self.conflicts.health_check());
        report
    }
}
