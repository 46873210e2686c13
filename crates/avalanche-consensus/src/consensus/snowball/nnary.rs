use std::collections::HashMap;

use avalanche_ids::Id;

/// Snowball over any number of choices.
///
/// Uses `beta_virtuous` while only one choice is known and `beta_rogue`
/// once a second choice is added.
#[derive(Debug, Clone)]
pub struct NnarySnowball {
    beta_virtuous: usize,
    beta_rogue: usize,
    rogue: bool,
    preference: Id,
    num_successful_polls: HashMap<Id, usize>,
    confidence: usize,
    finalized: bool,
}

impl NnarySnowball {
    pub fn new(beta_virtuous: usize, beta_rogue: usize, choice: Id) -> Self {
        Self {
            beta_virtuous,
            beta_rogue,
            rogue: false,
            preference: choice,
            num_successful_polls: HashMap::new(),
            confidence: 0,
            finalized: false,
        }
    }

    pub fn add(&mut self, choice: Id) {
        self.rogue = self.rogue || choice != self.preference;
    }

    pub fn preference(&self) -> Id {
        self.preference
    }

    pub fn confidence(&self) -> usize {
        self.confidence
    }

    pub fn finalized(&self) -> bool {
        self.finalized
    }

    fn beta(&self) -> usize {
        if self.rogue {
            self.beta_rogue
        } else {
            self.beta_virtuous
        }
    }

    pub fn record_successful_poll(&mut self, choice: Id) {
        if self.finalized {
            return;
        }
        let count = {
            let count = self.num_successful_polls.entry(choice).or_insert(0);
            *count += 1;
            *count
        };
        if choice == self.preference {
            self.confidence += 1;
        } else {
            self.confidence = 0;
            let preferred = self
                .num_successful_polls
                .get(&self.preference)
                .copied()
                .unwrap_or(0);
            if count > preferred {
                self.preference = choice;
            }
        }
        self.finalized = self.confidence >= self.beta();
    }

    pub fn record_unsuccessful_poll(&mut self) {
        self.confidence = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> (Id, Id, Id) {
        (
            Id::EMPTY.prefix(&[0]),
            Id::EMPTY.prefix(&[1]),
            Id::EMPTY.prefix(&[2]),
        )
    }

    #[test]
    fn test_virtuous_uses_lower_beta() {
        let (red, _, _) = colors();
        let mut sb = NnarySnowball::new(1, 3, red);
        sb.record_successful_poll(red);
        assert!(sb.finalized());
    }

    #[test]
    fn test_rogue_uses_higher_beta() {
        let (red, blue, green) = colors();
        let mut sb = NnarySnowball::new(1, 2, red);
        sb.add(blue);
        sb.add(green);

        sb.record_successful_poll(blue);
        assert_eq!(sb.preference(), blue);
        assert!(!sb.finalized());

        sb.record_successful_poll(red);
        assert_eq!(sb.preference(), blue);
        assert_eq!(sb.confidence(), 0);

        sb.record_successful_poll(blue);
        sb.record_successful_poll(blue);
        assert!(sb.finalized());
        assert_eq!(sb.preference(), blue);
    }

    #[test]
    fn test_adding_same_choice_stays_virtuous() {
        let (red, _, _) = colors();
        let mut sb = NnarySnowball::new(1, 5, red);
        sb.add(red);
        sb.record_successful_poll(red);
        assert!(sb.finalized());
    }
}
