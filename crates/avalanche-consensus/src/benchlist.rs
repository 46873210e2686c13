//! Benchlist: temporarily stop querying validators that keep failing.
//!
//! A validator that fails `threshold` queries in a row, over at least
//! `min_failing_duration`, is benched for a random duration in
//! `[duration / 2, duration]`. Benching is refused when it would put more
//! than `max_portion` of the total stake on the bench.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use avalanche_ids::{Id, NodeId};
use avalanche_utils::timer::Timer;
use avalanche_utils::Clock;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{duration_ms, ConfigError};
use crate::health::{HealthCheck, HealthReport};
use crate::validators::ValidatorState;

/// Notified when a node enters or leaves the bench.
pub trait Benchable: Send + Sync {
    fn benched(&self, chain_id: Id, node_id: NodeId);
    fn unbenched(&self, chain_id: Id, node_id: NodeId);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchlistConfig {
    /// Consecutive failures before a node can be benched.
    pub threshold: usize,
    #[serde(rename = "min_failing_duration_ms", with = "duration_ms")]
    pub min_failing_duration: Duration,
    /// Upper bound of the bench duration.
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    /// Largest share of total stake that may be benched at once.
    pub max_portion: f64,
}

impl Default for BenchlistConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            min_failing_duration: Duration::from_secs(150),
            duration: Duration::from_secs(15 * 60),
            max_portion: 0.08,
        }
    }
}

impl BenchlistConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold == 0 {
            return Err(ConfigError::Invalid(
                "benchlist threshold must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.max_portion) {
            return Err(ConfigError::Invalid(format!(
                "benchlist max_portion must be in [0, 1), got {}",
                self.max_portion
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct FailureStreak {
    consecutive: usize,
    first_failure: Instant,
}

#[derive(Debug, Default)]
struct BenchState {
    benched: HashMap<NodeId, Instant>,
    /// Bench expiries, earliest first.
    expiries: BinaryHeap<Reverse<(Instant, NodeId)>>,
}

pub struct Benchlist {
    chain_id: Id,
    config: BenchlistConfig,
    validators: Arc<dyn ValidatorState>,
    benchable: Arc<dyn Benchable>,
    clock: Clock,
    state: RwLock<BenchState>,
    /// Only ever taken on its own or while holding `state`.
    streaks: Mutex<HashMap<NodeId, FailureStreak>>,
    timer: Timer,
}

impl Benchlist {
    pub fn new(
        chain_id: Id,
        config: BenchlistConfig,
        validators: Arc<dyn ValidatorState>,
        benchable: Arc<dyn Benchable>,
        clock: Clock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            chain_id,
            config,
            validators,
            benchable,
            clock,
            state: RwLock::new(BenchState::default()),
            streaks: Mutex::new(HashMap::new()),
            timer: Timer::new(),
        })
    }

    pub fn is_benched(&self, node_id: &NodeId) -> bool {
        self.state.read().benched.contains_key(node_id)
    }

    pub fn benched(&self) -> HashSet<NodeId> {
        self.state.read().benched.keys().copied().collect()
    }

    /// Clears `node_id`'s failure streak. A benched node stays benched.
    pub fn register_response(&self, node_id: &NodeId) {
        self.streaks.lock().remove(node_id);
    }

    pub fn register_failure(&self, node_id: NodeId) {
        if self.is_benched(&node_id) {
            return;
        }

        let now = self.clock.now();
        let ready = {
            let mut streaks = self.streaks.lock();
            let streak = streaks.entry(node_id).or_insert(FailureStreak {
                consecutive: 0,
                first_failure: now,
            });
            streak.consecutive += 1;
            streak.consecutive >= self.config.threshold
                && now >= streak.first_failure + self.config.min_failing_duration
        };

        if ready {
            self.bench(node_id, now);
        }
    }

    fn bench(&self, node_id: NodeId, now: Instant) {
        {
            let mut state = self.state.write();
            if state.benched.contains_key(&node_id) {
                return;
            }

            let weight = self.validators.weight(&node_id);
            if weight == 0 {
                debug!(node_id = %node_id, "not benching non-validator");
                self.streaks.lock().remove(&node_id);
                return;
            }

            let benched: HashSet<NodeId> = state.benched.keys().copied().collect();
            let benched_weight = self.validators.subset_weight(&benched).saturating_add(weight);
            let max_weight = self.validators.total_weight() as f64 * self.config.max_portion;
            if benched_weight as f64 > max_weight {
                debug!(
                    node_id = %node_id,
                    benched_weight,
                    max_weight,
                    "not benching node, too much stake would be benched"
                );
                return;
            }

            let max = self.config.duration;
            let bench_for = rand::thread_rng().gen_range(max / 2..=max);
            let until = now + bench_for;
            self.streaks.lock().remove(&node_id);
            state.benched.insert(node_id, until);
            state.expiries.push(Reverse((until, node_id)));
            info!(node_id = %node_id, duration = ?bench_for, "benching node");
        }

        self.benchable.benched(self.chain_id, node_id);
        self.arm_timer(now);
    }

    /// Unbenches every node whose bench window has closed.
    pub fn update(&self) {
        let now = self.clock.now();
        let mut released = Vec::new();
        {
            let mut state = self.state.write();
            while let Some(Reverse((until, node_id))) = state.expiries.peek().copied() {
                if until > now {
                    break;
                }
                state.expiries.pop();
                state.benched.remove(&node_id);
                released.push(node_id);
            }
        }

        for node_id in released {
            info!(node_id = %node_id, "unbenching node");
            self.benchable.unbenched(self.chain_id, node_id);
        }
        self.arm_timer(now);
    }

    fn arm_timer(&self, now: Instant) {
        let earliest = self
            .state
            .read()
            .expiries
            .peek()
            .map(|Reverse((until, _))| *until);
        match earliest {
            Some(at) => self.timer.set_timeout_in(at.saturating_duration_since(now)),
            None => self.timer.cancel(),
        }
    }

    /// Runs [`update`](Self::update) whenever a bench window closes, until
    /// [`shutdown`](Self::shutdown) is called or the benchlist is dropped.
    pub fn spawn_unbench_timer(self: &Arc<Self>) -> JoinHandle<()> {
        let timer = self.timer.clone();
        let benchlist: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            timer
                .dispatch(move || {
                    if let Some(benchlist) = benchlist.upgrade() {
                        benchlist.update();
                    }
                })
                .await;
        })
    }

    pub fn shutdown(&self) {
        self.timer.stop();
    }
}

impl Drop for Benchlist {
    fn drop(&mut self) {
        self.timer.stop();
    }
}

impl HealthCheck for Benchlist {
    fn health_check(&self) -> HealthReport {
        let benched = self.benched();
        let benched_weight = self.validators.subset_weight(&benched);
        HealthReport::healthy()
            .detail("benched", benched.len())
            .detail("benched_weight", benched_weight)
    }
}
