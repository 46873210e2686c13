//! Snowball over a binary trie of choice IDs.
//!
//! Choices are split on the first bit where they differ. Runs of bits shared
//! by every choice below a point collapse into a single unary node; every
//! split point is a binary node. A poll walks the trie from the root,
//! counting at each split only the votes that agree with the bits above it.
//! Once a node finalizes it is pruned and its preferred child takes its place.

use std::mem;

use avalanche_ids::Id;
use avalanche_utils::Bag;

use super::{BinarySnowball, Consensus, UnarySnowball};
use crate::Parameters;

/// Snowball instance shaped as a trie over the bits of the choices.
#[derive(Debug, Clone)]
pub struct Tree {
    alpha: usize,
    beta_virtuous: usize,
    beta_rogue: usize,
    root: Node,
    /// Set by an unsuccessful poll; pushed down the trie on the next poll.
    should_reset: bool,
}

#[derive(Debug, Clone)]
enum Node {
    Unary(UnaryNode),
    Binary(BinaryNode),
}

/// Bits in `[decided_prefix, common_prefix)` are shared by every choice in
/// this subtree.
#[derive(Debug, Clone)]
struct UnaryNode {
    preference: Id,
    decided_prefix: usize,
    common_prefix: usize,
    snowball: UnarySnowball,
    should_reset: bool,
    /// Split at bit `common_prefix`; `None` when the range reaches the last bit.
    child: Option<Box<Node>>,
}

#[derive(Debug, Clone)]
struct BinaryNode {
    bit: usize,
    preferences: [Id; 2],
    snowball: BinarySnowball,
    should_reset: [bool; 2],
    children: [Option<Box<Node>>; 2],
}

impl Tree {
    pub fn new(params: &Parameters, choice: Id) -> Self {
        Self {
            alpha: params.alpha,
            beta_virtuous: params.beta_virtuous,
            beta_rogue: params.beta_rogue,
            root: Node::Unary(UnaryNode::leaf(choice, 0, params.beta_virtuous)),
            should_reset: false,
        }
    }

    fn take_root(&mut self) -> Node {
        mem::replace(&mut self.root, Node::Unary(UnaryNode::leaf(Id::EMPTY, 0, 0)))
    }
}

impl Consensus for Tree {
    fn add(&mut self, choice: Id) {
        let prefix = self.root.decided_prefix();
        if !self.root.preference().equal_subset(&choice, 0, prefix) {
            // Conflicts with a bit that was already decided.
            return;
        }
        let root = self.take_root();
        self.root = root.add(choice, self.beta_virtuous, self.beta_rogue);
    }

    fn preference(&self) -> Id {
        self.root.preference()
    }

    fn record_poll(&mut self, votes: &Bag<Id>) -> bool {
        let prefix = self.root.decided_prefix();
        let preference = self.root.preference();
        let votes = votes.filter(|id| preference.equal_subset(id, 0, prefix));

        let reset = mem::take(&mut self.should_reset);
        let root = self.take_root();
        let (root, successful) = root.record_poll(votes, reset, self.alpha);
        self.root = root;
        successful
    }

    fn record_unsuccessful_poll(&mut self) {
        self.should_reset = true;
    }

    fn finalized(&self) -> bool {
        self.root.finalized()
    }
}

impl Node {
    fn preference(&self) -> Id {
        match self {
            Node::Unary(u) => u.preference,
            Node::Binary(b) => b.preferences[b.snowball.preference()],
        }
    }

    fn decided_prefix(&self) -> usize {
        match self {
            Node::Unary(u) => u.decided_prefix,
            Node::Binary(b) => b.bit,
        }
    }

    fn finalized(&self) -> bool {
        match self {
            Node::Unary(u) => u.snowball.finalized(),
            Node::Binary(b) => b.snowball.finalized(),
        }
    }

    fn add(self, choice: Id, beta_virtuous: usize, beta_rogue: usize) -> Node {
        match self {
            Node::Unary(u) => u.add(choice, beta_virtuous, beta_rogue),
            Node::Binary(b) => b.add(choice, beta_virtuous, beta_rogue),
        }
    }

    fn record_poll(self, votes: Bag<Id>, reset: bool, alpha: usize) -> (Node, bool) {
        match self {
            Node::Unary(u) => u.record_poll(votes, reset, alpha),
            Node::Binary(b) => b.record_poll(votes, reset, alpha),
        }
    }
}

impl UnaryNode {
    fn leaf(preference: Id, decided_prefix: usize, beta: usize) -> Self {
        Self {
            preference,
            decided_prefix,
            common_prefix: Id::NUM_BITS,
            snowball: UnarySnowball::new(beta),
            should_reset: false,
            child: None,
        }
    }

    fn add(mut self, choice: Id, beta_virtuous: usize, beta_rogue: usize) -> Node {
        if self.snowball.finalized() {
            return Node::Unary(self);
        }

        let Some(index) =
            self.preference
                .first_difference(&choice, self.decided_prefix, self.common_prefix)
        else {
            // Same bits over this range: the split, if any, happens below.
            if let Some(child) = self.child.take() {
                self.child = Some(Box::new(child.add(choice, beta_virtuous, beta_rogue)));
            }
            return Node::Unary(self);
        };

        let bit = self.preference.bit(index);
        let mut preferences = [Id::EMPTY; 2];
        preferences[bit] = self.preference;
        preferences[1 - bit] = choice;

        let new_child = (index + 1 < Id::NUM_BITS)
            .then(|| Box::new(Node::Unary(UnaryNode::leaf(choice, index + 1, beta_virtuous))));
        let mut split = BinaryNode {
            bit: index,
            preferences,
            snowball: self.snowball.extend(beta_rogue, bit),
            should_reset: [self.should_reset; 2],
            children: [None, None],
        };
        split.children[1 - bit] = new_child;

        if self.decided_prefix + 1 == self.common_prefix {
            // This node covered exactly the differing bit.
            split.children[bit] = self.child.take();
            Node::Binary(split)
        } else if index == self.decided_prefix {
            // Split on the first bit: this node moves below the split.
            self.decided_prefix += 1;
            split.children[bit] = Some(Box::new(Node::Unary(self)));
            Node::Binary(split)
        } else if index + 1 == self.common_prefix {
            // Split on the last bit: the split becomes this node's child.
            self.common_prefix -= 1;
            split.children[bit] = self.child.take();
            self.child = Some(Box::new(Node::Binary(split)));
            Node::Unary(self)
        } else {
            // Split on an interior bit: the range is cut in two around it.
            let upper = UnaryNode {
                preference: self.preference,
                decided_prefix: self.decided_prefix,
                common_prefix: index,
                snowball: self.snowball.clone(),
                should_reset: false,
                child: None,
            };
            self.decided_prefix = index + 1;
            split.children[bit] = Some(Box::new(Node::Unary(self)));
            Node::Unary(UnaryNode {
                child: Some(Box::new(Node::Binary(split))),
                ..upper
            })
        }
    }

    fn record_poll(mut self, votes: Bag<Id>, reset: bool, alpha: usize) -> (Node, bool) {
        if reset {
            self.snowball.record_unsuccessful_poll();
            self.should_reset = true;
        }

        if votes.len() < alpha {
            self.snowball.record_unsuccessful_poll();
            self.should_reset = true;
            return (Node::Unary(self), false);
        }

        self.snowball.record_successful_poll();

        if let Some(child) = self.child.take() {
            let preference = self.preference;
            let (from, to) = (self.decided_prefix, self.common_prefix);
            let votes = votes.filter(|id| preference.equal_subset(id, from, to));

            let (child, _) = child.record_poll(votes, self.should_reset, alpha);
            if self.snowball.finalized() {
                // Every choice below agrees on this range; drop the node.
                return (child, true);
            }
            self.preference = child.preference();
            self.child = Some(Box::new(child));
        }

        self.should_reset = false;
        (Node::Unary(self), true)
    }
}

impl BinaryNode {
    fn add(mut self, choice: Id, beta_virtuous: usize, beta_rogue: usize) -> Node {
        let bit = choice.bit(self.bit);
        if let Some(child) = self.children[bit].take() {
            let child = if self.preferences[bit].equal_subset(
                &choice,
                self.bit + 1,
                child.decided_prefix(),
            ) {
                child.add(choice, beta_virtuous, beta_rogue)
            } else {
                *child
            };
            self.children[bit] = Some(Box::new(child));
        }
        Node::Binary(self)
    }

    fn record_poll(mut self, votes: Bag<Id>, reset: bool, alpha: usize) -> (Node, bool) {
        let index = self.bit;
        let split = votes.split(|id| id.bit(index) == 1);
        let bit = usize::from(split[1].len() >= alpha);

        if reset {
            self.snowball.record_unsuccessful_poll();
            self.should_reset[bit] = true;
        }
        self.should_reset[1 - bit] = true;

        let [zeros, ones] = split;
        let votes = if bit == 1 { ones } else { zeros };
        if votes.len() < alpha {
            self.snowball.record_unsuccessful_poll();
            self.should_reset[bit] = true;
            return (Node::Binary(self), false);
        }

        self.snowball.record_successful_poll(bit);

        if let Some(child) = self.children[bit].take() {
            let preference = self.preferences[bit];
            let to = child.decided_prefix();
            let votes = votes.filter(|id| preference.equal_subset(id, index + 1, to));

            let (child, _) = child.record_poll(votes, self.should_reset[bit], alpha);
            if self.snowball.finalized() {
                return (child, true);
            }
            self.preferences[bit] = child.preference();
            self.children[bit] = Some(Box::new(child));
        }

        self.should_reset[bit] = false;
        (Node::Binary(self), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red() -> Id {
        Id::EMPTY.prefix(&[0])
    }

    fn blue() -> Id {
        Id::EMPTY.prefix(&[1])
    }

    fn green() -> Id {
        Id::EMPTY.prefix(&[2])
    }

    /// An ID equal to `base` except for `bit`.
    fn flip(base: Id, bit: usize) -> Id {
        let mut bytes = *base.as_bytes();
        bytes[bit / 8] ^= 1 << (bit % 8);
        Id::from_bytes(bytes)
    }

    #[test]
    fn test_tree_singleton() {
        let params = Parameters::new(1, 1, 2, 5);
        let mut tree = Tree::new(&params, red());
        assert!(!tree.finalized());

        assert!(tree.record_poll(&Bag::of([red()])));
        assert!(!tree.finalized());

        assert!(!tree.record_poll(&Bag::new()));
        assert!(!tree.finalized());

        assert!(tree.record_poll(&Bag::of([red()])));
        assert!(!tree.finalized());

        assert!(tree.record_poll(&Bag::of([red()])));
        assert!(tree.finalized());
        assert_eq!(tree.preference(), red());

        tree.add(blue());
        assert!(tree.finalized());
        assert_eq!(tree.preference(), red());
    }

    #[test]
    fn test_tree_binary_flip() {
        let params = Parameters::new(1, 1, 1, 2);
        let mut tree = Tree::new(&params, red());
        tree.add(blue());
        assert_eq!(tree.preference(), red());

        assert!(tree.record_poll(&Bag::of([blue()])));
        assert_eq!(tree.preference(), blue());
        assert!(!tree.finalized());

        assert!(tree.record_poll(&Bag::of([blue()])));
        assert!(!tree.finalized());

        assert!(tree.record_poll(&Bag::of([blue()])));
        assert_eq!(tree.preference(), blue());
        assert!(tree.finalized());
    }

    #[test]
    fn test_tree_duplicate_add_is_noop() {
        let params = Parameters::new(1, 1, 1, 2);
        let mut tree = Tree::new(&params, red());
        tree.add(red());

        assert!(tree.record_poll(&Bag::of([red()])));
        assert!(tree.finalized(), "a lone choice stays virtuous");
    }

    #[test]
    fn test_tree_three_way() {
        let params = Parameters::new(1, 1, 1, 2);
        let mut tree = Tree::new(&params, red());
        tree.add(blue());
        tree.add(green());

        for _ in 0..10 {
            if tree.finalized() {
                break;
            }
            assert!(tree.record_poll(&Bag::of([green()])));
        }
        assert!(tree.finalized());
        assert_eq!(tree.preference(), green());
    }

    #[test]
    fn test_tree_split_on_last_bit() {
        let last = Id::NUM_BITS - 1;
        let a = Id::EMPTY;
        let b = flip(a, last);

        let params = Parameters::new(1, 1, 1, 1);
        let mut tree = Tree::new(&params, a);
        tree.add(b);

        assert!(tree.record_poll(&Bag::of([b])));
        assert_eq!(tree.preference(), b);
        assert!(!tree.finalized(), "the vote that moves the preference starts no streak");

        assert!(tree.record_poll(&Bag::of([b])));
        assert!(tree.finalized());
        assert_eq!(tree.preference(), b);
    }

    #[test]
    fn test_tree_split_on_first_bit() {
        let a = Id::EMPTY;
        let b = flip(a, 0);
        let c = flip(b, 100);

        let params = Parameters::new(1, 1, 1, 1);
        let mut tree = Tree::new(&params, a);
        tree.add(b);
        tree.add(c);

        for _ in 0..10 {
            if tree.finalized() {
                break;
            }
            tree.record_poll(&Bag::of([c]));
        }
        assert!(tree.finalized());
        assert_eq!(tree.preference(), c);
    }

    #[test]
    fn test_tree_interior_split_keeps_votes_flowing() {
        let a = Id::EMPTY;
        let b = flip(a, 40);
        let c = flip(a, 200);

        let params = Parameters::new(3, 2, 1, 3);
        let mut tree = Tree::new(&params, a);
        tree.add(b);
        tree.add(c);

        for _ in 0..20 {
            if tree.finalized() {
                break;
            }
            assert!(tree.record_poll(&Bag::of([c, c, b])));
        }
        assert!(tree.finalized());
        assert_eq!(tree.preference(), c);
    }

    #[test]
    fn test_tree_unsuccessful_poll_resets_lazily() {
        let params = Parameters::new(1, 1, 2, 2);
        let mut tree = Tree::new(&params, red());

        assert!(tree.record_poll(&Bag::of([red()])));
        tree.record_unsuccessful_poll();
        assert!(tree.record_poll(&Bag::of([red()])));
        assert!(!tree.finalized());
        assert!(tree.record_poll(&Bag::of([red()])));
        assert!(tree.finalized());
    }

    #[test]
    fn test_tree_rejected_prefix_ignored() {
        let a = Id::EMPTY;
        let b = flip(a, 0);
        let c = flip(a, 8);

        let params = Parameters::new(1, 1, 1, 1);
        let mut tree = Tree::new(&params, a);
        tree.add(c);

        while !tree.finalized() {
            tree.record_poll(&Bag::of([a]));
        }
        tree.add(b);
        assert!(!tree.record_poll(&Bag::of([b])));
        assert_eq!(tree.preference(), a);
    }
}
