use std::collections::{HashMap, HashSet};

use avalanche_ids::{Id, NodeId};
use avalanche_utils::Bag;

use super::Poll;

/// Votes and drops shared by both poll kinds.
#[derive(Debug)]
struct Tally {
    polled: Bag<NodeId>,
    votes: HashMap<NodeId, Id>,
    dropped: HashSet<NodeId>,
}

impl Tally {
    fn new(polled: Bag<NodeId>) -> Self {
        Self {
            polled,
            votes: HashMap::new(),
            dropped: HashSet::new(),
        }
    }

    fn vote(&mut self, node: &NodeId, vote: Id) {
        if self.polled.count(node) == 0 {
            return;
        }
        self.dropped.remove(node);
        self.votes.insert(*node, vote);
    }

    fn drop_vote(&mut self, node: &NodeId) {
        if self.polled.count(node) == 0 || self.votes.contains_key(node) {
            return;
        }
        self.dropped.insert(*node);
    }

    /// Sample slots still waiting for an answer.
    fn outstanding(&self) -> usize {
        self.polled
            .iter()
            .filter(|(node, _)| !self.votes.contains_key(*node) && !self.dropped.contains(*node))
            .map(|(_, count)| count)
            .sum()
    }

    fn result(&self) -> Bag<Id> {
        let mut bag = Bag::new();
        for (node, vote) in &self.votes {
            bag.add_count(*vote, self.polled.count(node));
        }
        bag
    }
}

/// Finishes once every polled node answered.
#[derive(Debug)]
pub struct NoEarlyTermPoll {
    tally: Tally,
}

impl NoEarlyTermPoll {
    pub fn new(polled: Bag<NodeId>) -> Self {
        Self {
            tally: Tally::new(polled),
        }
    }
}

impl Poll for NoEarlyTermPoll {
    fn vote(&mut self, node: &NodeId, vote: Id) {
        self.tally.vote(node, vote);
    }

    fn drop_vote(&mut self, node: &NodeId) {
        self.tally.drop_vote(node);
    }

    fn finished(&self) -> bool {
        self.tally.outstanding() == 0
    }

    fn result(&self) -> Bag<Id> {
        self.tally.result()
    }
}

/// Finishes once every polled node answered, once a choice holds `alpha`
/// votes, or once no choice can reach `alpha` with the answers still
/// outstanding.
#[derive(Debug)]
pub struct EarlyTermPoll {
    alpha: usize,
    tally: Tally,
}

impl EarlyTermPoll {
    pub fn new(alpha: usize, polled: Bag<NodeId>) -> Self {
        Self {
            alpha,
            tally: Tally::new(polled),
        }
    }
}

impl Poll for EarlyTermPoll {
    fn vote(&mut self, node: &NodeId, vote: Id) {
        self.tally.vote(node, vote);
    }

    fn drop_vote(&mut self, node: &NodeId) {
        self.tally.drop_vote(node);
    }

    fn finished(&self) -> bool {
        let outstanding = self.tally.outstanding();
        if outstanding == 0 {
            return true;
        }
        let leading = self.tally.result().mode().map_or(0, |(_, count)| count);
        leading >= self.alpha || leading + outstanding < self.alpha
    }

    fn result(&self) -> Bag<Id> {
        self.tally.result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{make_id, make_node_id};

    fn polled(nodes: &[u8]) -> Bag<NodeId> {
        nodes.iter().map(|n| make_node_id(*n)).collect()
    }

    #[test]
    fn test_no_early_term_waits_for_everyone() {
        let mut poll = NoEarlyTermPoll::new(polled(&[1, 2]));
        poll.vote(&make_node_id(1), make_id(7));
        assert!(!poll.finished());

        poll.vote(&make_node_id(9), make_id(7));
        assert!(!poll.finished(), "unpolled voter ignored");

        poll.drop_vote(&make_node_id(2));
        assert!(poll.finished());
        assert_eq!(poll.result(), Bag::of([make_id(7)]));
    }

    #[test]
    fn test_duplicate_vote_replaces() {
        let mut poll = NoEarlyTermPoll::new(polled(&[1, 2]));
        poll.vote(&make_node_id(1), make_id(7));
        poll.vote(&make_node_id(1), make_id(8));
        assert_eq!(poll.result(), Bag::of([make_id(8)]));
    }

    #[test]
    fn test_drop_keeps_vote() {
        let mut poll = NoEarlyTermPoll::new(polled(&[1]));
        poll.vote(&make_node_id(1), make_id(7));
        poll.drop_vote(&make_node_id(1));
        assert!(poll.finished());
        assert_eq!(poll.result().count(&make_id(7)), 1);
    }

    #[test]
    fn test_resampled_node_counts_twice() {
        let mut poll = NoEarlyTermPoll::new(polled(&[1, 1, 2]));
        poll.vote(&make_node_id(1), make_id(7));
        assert!(!poll.finished());
        poll.vote(&make_node_id(2), make_id(8));
        assert!(poll.finished());

        let result = poll.result();
        assert_eq!(result.count(&make_id(7)), 2);
        assert_eq!(result.count(&make_id(8)), 1);
    }

    #[test]
    fn test_early_term_on_alpha() {
        let mut poll = EarlyTermPoll::new(2, polled(&[1, 2, 3, 4, 5]));
        poll.vote(&make_node_id(1), make_id(7));
        assert!(!poll.finished());
        poll.vote(&make_node_id(2), make_id(7));
        assert!(poll.finished());
        assert_eq!(poll.result().count(&make_id(7)), 2);
    }

    #[test]
    fn test_early_term_when_alpha_unreachable() {
        let mut poll = EarlyTermPoll::new(3, polled(&[1, 2, 3, 4]));
        poll.drop_vote(&make_node_id(1));
        assert!(!poll.finished());
        poll.vote(&make_node_id(2), make_id(7));
        poll.vote(&make_node_id(3), make_id(8));
        // 7 holds one vote with one answer outstanding.
        assert!(poll.finished());
    }
}
