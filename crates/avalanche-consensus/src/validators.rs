//! Validator sets and stake-weighted sampling.

use std::collections::{HashMap, HashSet};

use avalanche_ids::{Id, NodeId};
use avalanche_utils::Bag;
use parking_lot::RwLock;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use tracing::warn;

use crate::{ConsensusError, Result};

/// A validator in the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub node_id: NodeId,
    /// Stake weight.
    pub weight: u64,
}

impl Validator {
    pub fn new(node_id: NodeId, weight: u64) -> Self {
        Self { node_id, weight }
    }
}

/// Read access to the validators of one subnet.
///
/// Weights are opaque: consensus only compares and sums them.
pub trait ValidatorState: Send + Sync {
    fn subnet_id(&self) -> Id;

    /// Zero for nodes that are not validators.
    fn weight(&self, node_id: &NodeId) -> u64;

    fn total_weight(&self) -> u64;

    fn node_ids(&self) -> Vec<NodeId>;

    /// Combined weight of `nodes`; non-validators count zero.
    fn subset_weight(&self, nodes: &HashSet<NodeId>) -> u64 {
        nodes
            .iter()
            .fold(0u64, |sum, node| sum.saturating_add(self.weight(node)))
    }

    /// Samples `k` distinct validators, weighted by stake.
    fn sample(&self, k: usize) -> Result<Vec<NodeId>> {
        self.sample_excluding(k, &HashSet::new())
    }

    /// Like [`sample`](Self::sample), never returning a node in `excluded`.
    fn sample_excluding(&self, k: usize, excluded: &HashSet<NodeId>) -> Result<Vec<NodeId>>;
}

/// A set of validators with weights.
#[derive(Debug)]
pub struct ValidatorSet {
    subnet_id: Id,
    validators: RwLock<HashMap<NodeId, u64>>,
}

impl ValidatorSet {
    pub fn new(subnet_id: Id) -> Self {
        Self {
            subnet_id,
            validators: RwLock::new(HashMap::new()),
        }
    }

    pub fn add(&self, validator: Validator) -> Result<()> {
        let mut validators = self.validators.write();
        if validators.contains_key(&validator.node_id) {
            return Err(ConsensusError::Internal(format!(
                "validator {} already exists",
                validator.node_id
            )));
        }
        validators.insert(validator.node_id, validator.weight);
        Ok(())
    }

    pub fn remove(&self, node_id: &NodeId) -> Result<()> {
        match self.validators.write().remove(node_id) {
            Some(_) => Ok(()),
            None => Err(ConsensusError::Internal(format!(
                "validator {node_id} not found"
            ))),
        }
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.validators.read().contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.validators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.read().is_empty()
    }

    pub fn validators(&self) -> Vec<Validator> {
        let mut list: Vec<Validator> = self
            .validators
            .read()
            .iter()
            .map(|(node_id, weight)| Validator::new(*node_id, *weight))
            .collect();
        list.sort_by_key(|v| v.node_id);
        list
    }

    fn eligible(&self, excluded: &HashSet<NodeId>) -> Vec<(NodeId, u64)> {
        let mut eligible: Vec<(NodeId, u64)> = self
            .validators
            .read()
            .iter()
            .filter(|(node_id, weight)| **weight > 0 && !excluded.contains(*node_id))
            .map(|(node_id, weight)| (*node_id, *weight))
            .collect();
        eligible.sort();
        eligible
    }
}

impl ValidatorState for ValidatorSet {
    fn subnet_id(&self) -> Id {
        self.subnet_id
    }

    fn weight(&self, node_id: &NodeId) -> u64 {
        self.validators.read().get(node_id).copied().unwrap_or(0)
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.validators.read().keys().copied().collect()
    }

    fn total_weight(&self) -> u64 {
        self.validators
            .read()
            .values()
            .fold(0u64, |sum, weight| sum.saturating_add(*weight))
    }

    fn sample_excluding(&self, k: usize, excluded: &HashSet<NodeId>) -> Result<Vec<NodeId>> {
        let eligible = self.eligible(excluded);
        if eligible.len() < k {
            return Err(ConsensusError::InsufficientValidators {
                needed: k,
                have: eligible.len(),
            });
        }
        let mut rng = rand::thread_rng();
        let sampled = eligible
            .choose_multiple_weighted(&mut rng, k, |(_, weight)| *weight as f64)
            .map_err(|e| ConsensusError::Internal(format!("weighted sampling failed: {e}")))?;
        Ok(sampled.map(|(node_id, _)| *node_id).collect())
    }
}

/// Samples `k` validators for a poll, skipping `excluded` nodes.
///
/// When fewer than `k` eligible validators exist the sample is drawn with
/// replacement, so a node may appear more than once in the returned bag.
/// Benched nodes are only queried when no other validator has stake.
pub fn sample_for_poll(
    validators: &dyn ValidatorState,
    k: usize,
    excluded: &HashSet<NodeId>,
) -> Result<Bag<NodeId>> {
    let eligible = |excluded: &HashSet<NodeId>| -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = validators
            .node_ids()
            .into_iter()
            .filter(|n| !excluded.contains(n) && validators.weight(n) > 0)
            .collect();
        nodes.sort();
        nodes
    };

    let none = HashSet::new();
    let mut excluded = excluded;
    let mut nodes = eligible(excluded);
    if nodes.is_empty() && !excluded.is_empty() {
        warn!(k, benched = excluded.len(), "every validator is benched");
        excluded = &none;
        nodes = eligible(excluded);
    }
    if nodes.is_empty() {
        return Err(ConsensusError::InsufficientValidators { needed: k, have: 0 });
    }
    if nodes.len() >= k {
        return validators.sample_excluding(k, excluded).map(Bag::of);
    }

    warn!(k, have = nodes.len(), "too few validators to sample without replacement");
    let weights: Vec<u64> = nodes.iter().map(|n| validators.weight(n)).collect();
    let dist = WeightedIndex::new(&weights)
        .map_err(|e| ConsensusError::Internal(format!("weighted sampling failed: {e}")))?;
    let mut rng = rand::thread_rng();
    Ok(Bag::of((0..k).map(|_| nodes[dist.sample(&mut rng)])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{make_node_id, validator_set};

    #[test]
    fn test_add_remove() {
        let set = ValidatorSet::new(Id::EMPTY);
        set.add(Validator::new(make_node_id(1), 100)).unwrap();
        set.add(Validator::new(make_node_id(2), 200)).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.total_weight(), 300);
        assert_eq!(set.weight(&make_node_id(2)), 200);
        assert_eq!(set.weight(&make_node_id(3)), 0);

        assert!(set.add(Validator::new(make_node_id(1), 5)).is_err());
        set.remove(&make_node_id(1)).unwrap();
        assert!(set.remove(&make_node_id(1)).is_err());
        assert_eq!(set.total_weight(), 200);
        assert_eq!(set.validators(), vec![Validator::new(make_node_id(2), 200)]);
    }

    #[test]
    fn test_subset_weight() {
        let set = validator_set(3, 10);
        let nodes = HashSet::from([make_node_id(1), make_node_id(3), make_node_id(9)]);
        assert_eq!(set.subset_weight(&nodes), 20);
    }

    #[test]
    fn test_sample_distinct() {
        let set = validator_set(10, 100);
        let sample = set.sample(5).unwrap();
        assert_eq!(sample.len(), 5);
        assert_eq!(sample.iter().collect::<HashSet<_>>().len(), 5);

        assert_eq!(
            set.sample(11),
            Err(ConsensusError::InsufficientValidators { needed: 11, have: 10 })
        );
    }

    #[test]
    fn test_sample_skips_excluded_and_zero_weight() {
        let set = validator_set(3, 1);
        set.add(Validator::new(make_node_id(4), 0)).unwrap();
        let excluded = HashSet::from([make_node_id(1)]);

        for _ in 0..20 {
            let sample = set.sample_excluding(2, &excluded).unwrap();
            let sample: HashSet<_> = sample.into_iter().collect();
            assert_eq!(sample, HashSet::from([make_node_id(2), make_node_id(3)]));
        }
    }

    #[test]
    fn test_sample_for_poll_with_replacement() {
        let set = validator_set(2, 1);
        let bag = sample_for_poll(set.as_ref(), 5, &HashSet::new()).unwrap();
        assert_eq!(bag.len(), 5);
        for (node, _) in bag.iter() {
            assert!(set.contains(node));
        }
    }

    #[test]
    fn test_sample_for_poll_everyone_benched() {
        let set = validator_set(2, 1);
        let excluded = HashSet::from([make_node_id(1), make_node_id(2)]);
        let bag = sample_for_poll(set.as_ref(), 2, &excluded).unwrap();
        assert_eq!(bag.count(&make_node_id(1)), 1);
        assert_eq!(bag.count(&make_node_id(2)), 1);
    }

    #[test]
    fn test_sample_for_poll_empty_set() {
        let set = ValidatorSet::new(Id::EMPTY);
        assert!(matches!(
            sample_for_poll(&set, 1, &HashSet::new()),
            Err(ConsensusError::InsufficientValidators { .. })
        ));
    }
}
