/// Snowball over the two values of a single bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySnowball {
    beta: usize,
    preference: usize,
    num_successful_polls: [usize; 2],
    confidence: usize,
    finalized: bool,
}

impl BinarySnowball {
    pub fn new(beta: usize, choice: usize) -> Self {
        Self::from_parts(beta, choice, [0; 2], 0, false)
    }

    pub(super) fn from_parts(
        beta: usize,
        preference: usize,
        num_successful_polls: [usize; 2],
        confidence: usize,
        finalized: bool,
    ) -> Self {
        Self {
            beta,
            preference,
            num_successful_polls,
            confidence,
            finalized,
        }
    }

    pub fn preference(&self) -> usize {
        self.preference
    }

    pub fn confidence(&self) -> usize {
        self.confidence
    }

    pub fn num_successful_polls(&self, choice: usize) -> usize {
        self.num_successful_polls[choice]
    }

    pub fn finalized(&self) -> bool {
        self.finalized
    }

    /// Records an alpha-majority for `choice`.
    ///
    /// A vote for the current preference extends the streak. Any other vote
    /// breaks it, and moves the preference only once `choice` has strictly
    /// more successful polls than the current preference.
    pub fn record_successful_poll(&mut self, choice: usize) {
        if self.finalized {
            return;
        }
        self.num_successful_polls[choice] += 1;
        if choice == self.preference {
            self.confidence += 1;
        } else {
            self.confidence = 0;
            if self.num_successful_polls[choice] > self.num_successful_polls[self.preference] {
                self.preference = choice;
            }
        }
        self.finalized = self.confidence >= self.beta;
    }

    pub fn record_unsuccessful_poll(&mut self) {
        self.confidence = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: usize = 0;
    const BLUE: usize = 1;

    #[test]
    fn test_disagreement_resets_confidence() {
        let mut sb = BinarySnowball::new(3, RED);

        sb.record_successful_poll(RED);
        sb.record_successful_poll(RED);
        assert_eq!(sb.confidence(), 2);

        sb.record_successful_poll(BLUE);
        assert_eq!(sb.confidence(), 0);
        assert_eq!(sb.preference(), RED);

        sb.record_successful_poll(RED);
        sb.record_successful_poll(RED);
        assert_eq!(sb.preference(), RED);
        assert_eq!(sb.confidence(), 2);
        assert!(!sb.finalized());
    }

    #[test]
    fn test_tie_keeps_preference() {
        let mut sb = BinarySnowball::new(2, RED);

        sb.record_successful_poll(RED);
        sb.record_successful_poll(BLUE);
        assert_eq!(sb.num_successful_polls(RED), 1);
        assert_eq!(sb.num_successful_polls(BLUE), 1);
        assert_eq!(sb.preference(), RED);

        sb.record_successful_poll(BLUE);
        assert_eq!(sb.preference(), BLUE);
        assert_eq!(sb.confidence(), 0);

        sb.record_successful_poll(BLUE);
        sb.record_successful_poll(BLUE);
        assert!(sb.finalized());
        assert_eq!(sb.preference(), BLUE);
    }

    #[test]
    fn test_finalized_ignores_votes() {
        let mut sb = BinarySnowball::new(1, BLUE);
        sb.record_successful_poll(BLUE);
        assert!(sb.finalized());

        sb.record_successful_poll(RED);
        sb.record_successful_poll(RED);
        assert_eq!(sb.preference(), BLUE);
        assert!(sb.finalized());
    }
}
