use super::BinarySnowball;

/// Snowball over a single choice: only counts consecutive successes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnarySnowball {
    beta: usize,
    num_successful_polls: usize,
    confidence: usize,
    finalized: bool,
}

impl UnarySnowball {
    pub fn new(beta: usize) -> Self {
        Self {
            beta,
            ..Self::default()
        }
    }

    pub fn record_successful_poll(&mut self) {
        self.num_successful_polls += 1;
        self.confidence += 1;
        self.finalized = self.finalized || self.confidence >= self.beta;
    }

    pub fn record_unsuccessful_poll(&mut self) {
        self.confidence = 0;
    }

    pub fn finalized(&self) -> bool {
        self.finalized
    }

    pub fn confidence(&self) -> usize {
        self.confidence
    }

    pub fn num_successful_polls(&self) -> usize {
        self.num_successful_polls
    }

    /// Turns this instance into a binary one where `choice` is the side
    /// that inherits the successes gathered so far.
    pub fn extend(&self, beta: usize, choice: usize) -> BinarySnowball {
        let mut num_successful_polls = [0; 2];
        num_successful_polls[choice] = self.num_successful_polls;
        BinarySnowball::from_parts(
            beta,
            choice,
            num_successful_polls,
            self.confidence,
            self.finalized,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unary_snowball() {
        let mut sb = UnarySnowball::new(2);

        sb.record_successful_poll();
        assert!(!sb.finalized());
        assert_eq!(sb.confidence(), 1);

        sb.record_unsuccessful_poll();
        assert_eq!(sb.confidence(), 0);

        sb.record_successful_poll();
        sb.record_successful_poll();
        assert!(sb.finalized());

        sb.record_unsuccessful_poll();
        assert!(sb.finalized(), "finalization is permanent");
    }

    #[test]
    fn test_extend_keeps_progress() {
        let mut sb = UnarySnowball::new(3);
        sb.record_successful_poll();
        sb.record_successful_poll();

        let binary = sb.extend(5, 1);
        assert_eq!(binary.preference(), 1);
        assert_eq!(binary.confidence(), 2);
        assert_eq!(binary.num_successful_polls(1), 2);
        assert_eq!(binary.num_successful_polls(0), 0);
        assert!(!binary.finalized());
    }
}
