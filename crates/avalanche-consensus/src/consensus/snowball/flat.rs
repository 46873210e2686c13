use std::collections::HashSet;

use avalanche_ids::Id;
use avalanche_utils::Bag;

use super::{Consensus, NnarySnowball};
use crate::Parameters;

/// Decides between choices with a single n-ary snowball.
#[derive(Debug, Clone)]
pub struct Flat {
    alpha: usize,
    choices: HashSet<Id>,
    snowball: NnarySnowball,
}

impl Flat {
    pub fn new(params: &Parameters, choice: Id) -> Self {
        Self {
            alpha: params.alpha,
            choices: HashSet::from([choice]),
            snowball: NnarySnowball::new(params.beta_virtuous, params.beta_rogue, choice),
        }
    }
}

impl Consensus for Flat {
    fn add(&mut self, choice: Id) {
        if self.choices.insert(choice) {
            self.snowball.add(choice);
        }
    }

    fn preference(&self) -> Id {
        self.snowball.preference()
    }

    fn record_poll(&mut self, votes: &Bag<Id>) -> bool {
        let known = votes.filter(|id| self.choices.contains(id));
        match known.mode() {
            Some((choice, count)) if count >= self.alpha => {
                self.snowball.record_successful_poll(choice);
                true
            }
            _ => {
                self.snowball.record_unsuccessful_poll();
                false
            }
        }
    }

    fn record_unsuccessful_poll(&mut self) {
        self.snowball.record_unsuccessful_poll();
    }

    fn finalized(&self) -> bool {
        self.snowball.finalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_votes_for_unknown_choices_dropped() {
        let red = Id::EMPTY.prefix(&[0]);
        let blue = Id::EMPTY.prefix(&[1]);
        let params = Parameters::new(2, 2, 1, 2);
        let mut sb = Flat::new(&params, red);

        assert!(!sb.record_poll(&Bag::of([blue, blue])));
        assert_eq!(sb.preference(), red);

        assert!(sb.record_poll(&Bag::of([red, red])));
        assert!(sb.finalized());
    }

    #[test]
    fn test_flat_below_alpha_is_unsuccessful() {
        let red = Id::EMPTY.prefix(&[0]);
        let blue = Id::EMPTY.prefix(&[1]);
        let params = Parameters::new(3, 2, 2, 2);
        let mut sb = Flat::new(&params, red);
        sb.add(blue);

        assert!(sb.record_poll(&Bag::of([blue, blue, red])));
        assert_eq!(sb.preference(), blue);
        assert!(!sb.record_poll(&Bag::of([blue, red])));
        assert!(sb.record_poll(&Bag::of([blue, blue])));
        assert!(!sb.finalized());
        assert!(sb.record_poll(&Bag::of([blue, blue])));
        assert!(sb.finalized());
    }
}
