//! Elements mapped to the set of distinct voters that reported them.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::Bag;

/// Maps each element to the set of voter indices that voted for it.
///
/// Used for transitive DAG votes: a voter that reaches the same ancestor
/// through two different vertices must only count once for it.
#[derive(Debug, Clone)]
pub struct UniqueBag<T: Eq + Hash + Clone> {
    voters: HashMap<T, HashSet<usize>>,
}

impl<T: Eq + Hash + Clone> Default for UniqueBag<T> {
    fn default() -> Self {
        Self {
            voters: HashMap::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> UniqueBag<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `voter` voted for `item`.
    pub fn add(&mut self, voter: usize, item: T) {
        self.voters.entry(item).or_default().insert(voter);
    }

    /// Adds every voter in `voters` to `item`'s set.
    pub fn union_set(&mut self, item: T, voters: &HashSet<usize>) {
        if voters.is_empty() {
            return;
        }
        self.voters.entry(item).or_default().extend(voters.iter().copied());
    }

    /// Voters recorded for `item`.
    #[must_use]
    pub fn get(&self, item: &T) -> Option<&HashSet<usize>> {
        self.voters.get(item)
    }

    pub fn remove(&mut self, item: &T) -> Option<HashSet<usize>> {
        self.voters.remove(item)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, &HashSet<usize>)> {
        self.voters.iter()
    }

    #[must_use]
    pub fn list(&self) -> Vec<T> {
        self.voters.keys().cloned().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }

    /// Collapses to a [`Bag`] where each element counts its distinct voters.
    #[must_use]
    pub fn bag(&self) -> Bag<T> {
        let mut bag = Bag::new();
        for (item, voters) in &self.voters {
            bag.add_count(item.clone(), voters.len());
        }
        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voter_counted_once() {
        let mut votes = UniqueBag::new();
        votes.add(0, "a");
        votes.add(0, "a");
        votes.add(1, "a");
        votes.add(1, "b");

        let bag = votes.bag();
        assert_eq!(bag.count(&"a"), 2);
        assert_eq!(bag.count(&"b"), 1);
    }

    #[test]
    fn test_union_set() {
        let mut votes = UniqueBag::new();
        votes.add(0, 'x');
        votes.union_set('x', &HashSet::from([0, 2, 3]));
        votes.union_set('y', &HashSet::new());

        assert_eq!(votes.get(&'x').map(HashSet::len), Some(3));
        assert!(votes.get(&'y').is_none());
    }
}
