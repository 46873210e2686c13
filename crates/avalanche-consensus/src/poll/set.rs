use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use avalanche_ids::{Id, NodeId};
use avalanche_utils::{Bag, Clock};
use tracing::{debug, trace};

use super::{Poll, PollFactory};
use crate::health::{duration_millis, HealthCheck, HealthReport};

#[derive(Debug)]
struct Outstanding {
    poll: Box<dyn Poll>,
    started: Instant,
}

/// Outstanding polls keyed by request ID.
///
/// Finished polls are released in the order they were added, so a fast
/// later poll never overtakes a slow earlier one.
#[derive(Debug)]
pub struct PollSet {
    factory: PollFactory,
    clock: Clock,
    polls: HashMap<u32, Outstanding>,
    order: VecDeque<u32>,
}

impl PollSet {
    pub fn new(factory: PollFactory, clock: Clock) -> Self {
        Self {
            factory,
            clock,
            polls: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Starts a poll of `polled`. Returns false if `request_id` is taken.
    pub fn add(&mut self, request_id: u32, polled: Bag<NodeId>) -> bool {
        if self.polls.contains_key(&request_id) {
            debug!(request_id, "dropping poll with duplicate request id");
            return false;
        }
        trace!(request_id, sampled = polled.len(), "poll started");
        self.polls.insert(
            request_id,
            Outstanding {
                poll: self.factory.new_poll(polled),
                started: self.clock.now(),
            },
        );
        self.order.push_back(request_id);
        true
    }

    /// Records a vote and returns the results of every poll that can now
    /// be released.
    pub fn vote(&mut self, request_id: u32, node: &NodeId, vote: Id) -> Vec<Bag<Id>> {
        let Some(outstanding) = self.polls.get_mut(&request_id) else {
            debug!(request_id, node_id = %node, "dropping vote for unknown poll");
            return Vec::new();
        };
        outstanding.poll.vote(node, vote);
        self.release()
    }

    /// Records that `node` failed to answer.
    pub fn drop_vote(&mut self, request_id: u32, node: &NodeId) -> Vec<Bag<Id>> {
        let Some(outstanding) = self.polls.get_mut(&request_id) else {
            debug!(request_id, node_id = %node, "dropping failure for unknown poll");
            return Vec::new();
        };
        outstanding.poll.drop_vote(node);
        self.release()
    }

    pub fn contains(&self, request_id: u32) -> bool {
        self.polls.contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }

    /// Age of the oldest outstanding poll.
    pub fn longest_outstanding(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.polls
            .values()
            .map(|o| now.saturating_duration_since(o.started))
            .max()
    }

    fn release(&mut self) -> Vec<Bag<Id>> {
        let mut results = Vec::new();
        while let Some(request_id) = self.order.front().copied() {
            match self.polls.get(&request_id) {
                Some(outstanding) if outstanding.poll.finished() => {
                    if let Some(done) = self.polls.remove(&request_id) {
                        trace!(request_id, "poll finished");
                        results.push(done.poll.result());
                    }
                }
                Some(_) => break,
                None => {}
            }
            if !self.polls.contains_key(&request_id) {
                self.order.pop_front();
            }
        }
        results
    }
}

impl HealthCheck for PollSet {
    fn health_check(&self) -> HealthReport {
        let longest = self.longest_outstanding().unwrap_or(Duration::ZERO);
        HealthReport::healthy()
            .detail("outstanding_polls", self.polls.len())
            .detail("longest_outstanding_poll", duration_millis(longest))
    }
}
