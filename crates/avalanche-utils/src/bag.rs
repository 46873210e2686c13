//! Multiset of votes.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// A multiset counting how many times each element was added.
///
/// A poll round collects its votes into a `Bag`; the threshold set tracks
/// which choices already reached alpha without rescanning the counts.
///
/// ```
/// use avalanche_utils::Bag;
///
/// let mut votes = Bag::new();
/// votes.set_threshold(2);
/// votes.add("red");
/// votes.add("red");
/// votes.add("blue");
///
/// assert_eq!(votes.count(&"red"), 2);
/// assert_eq!(votes.mode(), Some(("red", 2)));
/// assert!(votes.threshold().contains(&"red"));
/// assert!(!votes.threshold().contains(&"blue"));
/// ```
#[derive(Clone)]
pub struct Bag<T: Eq + Hash + Clone> {
    counts: HashMap<T, usize>,
    size: usize,
    threshold: usize,
    met_threshold: HashSet<T>,
}

impl<T: Eq + Hash + Clone> Default for Bag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> Bag<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            size: 0,
            threshold: 0,
            met_threshold: HashSet::new(),
        }
    }

    /// Builds a bag holding each yielded element once per occurrence.
    pub fn of<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut bag = Self::new();
        bag.extend(iter);
        bag
    }

    /// Sets the count an element needs to enter the threshold set.
    /// A threshold of zero disables tracking.
    pub fn set_threshold(&mut self, threshold: usize) {
        if self.threshold == threshold {
            return;
        }
        self.threshold = threshold;
        self.met_threshold = if threshold == 0 {
            HashSet::new()
        } else {
            self.counts
                .iter()
                .filter(|(_, &count)| count >= threshold)
                .map(|(item, _)| item.clone())
                .collect()
        };
    }

    pub fn add(&mut self, item: T) {
        self.add_count(item, 1);
    }

    /// Adds `count` occurrences of `item`. Zero is a no-op.
    pub fn add_count(&mut self, item: T, count: usize) {
        if count == 0 {
            return;
        }
        let total = self.counts.entry(item.clone()).or_insert(0);
        *total += count;
        self.size += count;
        if self.threshold > 0 && *total >= self.threshold {
            self.met_threshold.insert(item);
        }
    }

    #[must_use]
    pub fn count(&self, item: &T) -> usize {
        self.counts.get(item).copied().unwrap_or(0)
    }

    /// Total number of occurrences, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Distinct elements in unspecified order.
    #[must_use]
    pub fn list(&self) -> Vec<T> {
        self.counts.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, usize)> {
        self.counts.iter().map(|(item, &count)| (item, count))
    }

    /// Most frequent element and its count. Ties are broken arbitrarily;
    /// callers that compare against a strict majority never observe a tie.
    #[must_use]
    pub fn mode(&self) -> Option<(T, usize)> {
        self.counts
            .iter()
            .max_by_key(|(_, &count)| count)
            .map(|(item, &count)| (item.clone(), count))
    }

    /// Elements whose count reached the configured threshold.
    #[must_use]
    pub fn threshold(&self) -> &HashSet<T> {
        &self.met_threshold
    }

    /// Copy of this bag restricted to elements accepted by `keep`.
    #[must_use]
    pub fn filter<F: Fn(&T) -> bool>(&self, keep: F) -> Self {
        let mut out = Self::new();
        for (item, &count) in &self.counts {
            if keep(item) {
                out.add_count(item.clone(), count);
            }
        }
        out
    }

    /// Partitions the bag by `side`, returning `[false side, true side]`.
    #[must_use]
    pub fn split<F: Fn(&T) -> bool>(&self, side: F) -> [Self; 2] {
        let mut halves = [Self::new(), Self::new()];
        for (item, &count) in &self.counts {
            halves[usize::from(side(item))].add_count(item.clone(), count);
        }
        halves
    }

    /// Removes every occurrence of `item`.
    pub fn remove(&mut self, item: &T) {
        if let Some(count) = self.counts.remove(item) {
            self.size -= count;
            self.met_threshold.remove(item);
        }
    }
}

impl<T: Eq + Hash + Clone> Extend<T> for Bag<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.add(item);
        }
    }
}

impl<T: Eq + Hash + Clone> FromIterator<T> for Bag<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::of(iter)
    }
}

impl<T: Eq + Hash + Clone> PartialEq for Bag<T> {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.counts == other.counts
    }
}

impl<T: Eq + Hash + Clone + fmt::Debug> fmt::Debug for Bag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.counts.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_len() {
        let mut bag = Bag::new();
        bag.add(1);
        bag.add_count(2, 3);
        bag.add_count(3, 0);

        assert_eq!(bag.count(&1), 1);
        assert_eq!(bag.count(&2), 3);
        assert_eq!(bag.count(&3), 0);
        assert_eq!(bag.len(), 4);
        assert_eq!(bag.list().len(), 2);
    }

    #[test]
    fn test_threshold_set_after_adds() {
        let mut bag = Bag::of([1, 1, 1, 2, 2, 3]);
        bag.set_threshold(2);
        assert!(bag.threshold().contains(&1));
        assert!(bag.threshold().contains(&2));
        assert!(!bag.threshold().contains(&3));
    }

    #[test]
    fn test_threshold_tracks_new_votes() {
        let mut bag = Bag::new();
        bag.set_threshold(2);
        bag.add('a');
        assert!(bag.threshold().is_empty());
        bag.add('a');
        assert!(bag.threshold().contains(&'a'));
    }

    #[test]
    fn test_mode() {
        let bag = Bag::of([1, 2, 2, 3, 3, 3]);
        assert_eq!(bag.mode(), Some((3, 3)));
        assert_eq!(Bag::<u8>::new().mode(), None);
    }

    #[test]
    fn test_split_and_filter() {
        let bag = Bag::of([1, 2, 3, 4, 5, 5]);
        let [odd, even] = bag.split(|x| x % 2 == 0);
        assert_eq!(odd.len(), 4);
        assert_eq!(even.len(), 2);

        let big = bag.filter(|&x| x >= 4);
        assert_eq!(big.len(), 3);
        assert_eq!(big.count(&5), 2);
    }

    #[test]
    fn test_remove() {
        let mut bag = Bag::of([1, 1, 2]);
        bag.set_threshold(2);
        bag.remove(&1);
        assert_eq!(bag.len(), 1);
        assert!(bag.threshold().is_empty());
    }

    #[test]
    fn test_equality_ignores_threshold() {
        let mut a = Bag::of(['x', 'y', 'y']);
        let b: Bag<char> = ['y', 'x', 'y'].into_iter().collect();
        a.set_threshold(2);
        assert_eq!(a, b);
    }
}
