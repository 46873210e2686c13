//! Bootstrap job queue.
//!
//! Jobs wait until every dependency has been executed or fulfilled, and a
//! job is always executed after all of its dependencies.

use std::collections::{HashMap, HashSet};
use std::fmt;

use avalanche_ids::Id;
use tracing::{debug, trace, warn};

use crate::{ConsensusError, Result};

/// A unit of bootstrap work.
pub trait Job: Send + Sync {
    fn id(&self) -> Id;

    /// Items that must be executed first.
    fn dependencies(&self) -> Vec<Id>;

    fn execute(&mut self) -> Result<()>;
}

struct Blocked {
    job: Box<dyn Job>,
    missing: HashSet<Id>,
}

/// Jobs blocked on missing dependencies.
#[derive(Default)]
pub struct Jobs {
    /// Executed jobs and dependencies fulfilled from outside.
    satisfied: HashSet<Id>,
    blocked: HashMap<Id, Blocked>,
    /// Dependency -> jobs waiting on it.
    waiting: HashMap<Id, HashSet<Id>>,
    /// Jobs with every dependency satisfied, popped from the back.
    ready: Vec<Box<dyn Job>>,
    executed: usize,
}

impl fmt::Debug for Jobs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jobs")
            .field("satisfied", &self.satisfied.len())
            .field("blocked", &self.blocked.len())
            .field("ready", &self.ready.len())
            .field("executed", &self.executed)
            .finish()
    }
}

impl Jobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job, executing it and everything it unblocks if its
    /// dependencies are satisfied. Returns false for a job already known.
    pub fn push(&mut self, job: Box<dyn Job>) -> Result<bool> {
        let id = job.id();
        if self.satisfied.contains(&id) || self.is_queued(&id) {
            return Ok(false);
        }

        let missing: HashSet<Id> = job
            .dependencies()
            .into_iter()
            .filter(|dep| !self.satisfied.contains(dep))
            .collect();
        if missing.is_empty() {
            self.ready.push(job);
            self.execute()?;
            return Ok(true);
        }

        trace!(job = %id, missing = missing.len(), "job blocked");
        for dep in &missing {
            self.waiting.entry(*dep).or_default().insert(id);
        }
        self.blocked.insert(id, Blocked { job, missing });
        Ok(true)
    }

    /// Marks `dependency` as satisfied without a job, releasing every job
    /// that was only waiting on it.
    pub fn fulfill(&mut self, dependency: Id) -> Result<()> {
        if !self.satisfied.insert(dependency) {
            return Ok(());
        }
        let released = self.release(dependency);
        self.ready.extend(released.into_iter().rev());
        self.execute()
    }

    /// Executes every ready job and whatever it unblocks. A job that fails
    /// stays queued along with the jobs released before it, so a later call
    /// picks up where this one stopped.
    pub fn execute(&mut self) -> Result<()> {
        while let Some(mut job) = self.ready.pop() {
            let id = job.id();
            if let Err(err) = job.execute() {
                warn!(job = %id, error = %err, ready = self.ready.len(), "job failed to execute");
                self.ready.push(job);
                return Err(err);
            }
            self.executed += 1;
            self.satisfied.insert(id);
            debug!(job = %id, "executed job");
            let released = self.release(id);
            self.ready.extend(released.into_iter().rev());
        }
        Ok(())
    }

    /// Gives up on `dependency`: every job that transitively depends on it
    /// is dropped and can never run.
    pub fn abandon(&mut self, dependency: Id) -> Result<()> {
        let mut dropped = 0;
        let mut frontier = vec![dependency];
        while let Some(dep) = frontier.pop() {
            for waiter in self.waiting.remove(&dep).unwrap_or_default() {
                if let Some(blocked) = self.blocked.remove(&waiter) {
                    for other in blocked.missing.iter().filter(|d| **d != dep) {
                        if let Some(set) = self.waiting.get_mut(other) {
                            set.remove(&waiter);
                            if set.is_empty() {
                                self.waiting.remove(other);
                            }
                        }
                    }
                    dropped += 1;
                    frontier.push(waiter);
                }
            }
        }

        if dropped == 0 {
            return Ok(());
        }
        warn!(dependency = %dependency, dropped, "abandoned bootstrap dependency");
        Err(ConsensusError::BootstrapAbandoned {
            dependency,
            dropped,
        })
    }

    /// Dependencies that are neither satisfied nor queued as jobs. These
    /// have to be fetched before the queue can drain.
    pub fn missing_ids(&self) -> HashSet<Id> {
        self.waiting
            .keys()
            .filter(|dep| !self.blocked.contains_key(*dep))
            .copied()
            .collect()
    }

    pub fn is_satisfied(&self, id: &Id) -> bool {
        self.satisfied.contains(id)
    }

    /// True if `id` is queued and has not executed yet.
    pub fn is_queued(&self, id: &Id) -> bool {
        self.blocked.contains_key(id) || self.ready.iter().any(|job| job.id() == *id)
    }

    /// Jobs queued and not executed yet, blocked or ready.
    pub fn num_queued(&self) -> usize {
        self.blocked.len() + self.ready.len()
    }

    /// Jobs that could run now but have not, after an execution error.
    pub fn num_ready(&self) -> usize {
        self.ready.len()
    }

    pub fn num_executed(&self) -> usize {
        self.executed
    }

    /// Removes `dependency` from every waiting job, returning the jobs that
    /// have nothing left to wait for.
    fn release(&mut self, dependency: Id) -> Vec<Box<dyn Job>> {
        let mut unblocked: Vec<Id> = Vec::new();
        for waiter in self.waiting.remove(&dependency).unwrap_or_default() {
            if let Some(blocked) = self.blocked.get_mut(&waiter) {
                blocked.missing.remove(&dependency);
                if blocked.missing.is_empty() {
                    unblocked.push(waiter);
                }
            }
        }
        unblocked.sort();
        unblocked
            .into_iter()
            .filter_map(|id| self.blocked.remove(&id))
            .map(|blocked| blocked.job)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::testing::make_id;

    type Log = Arc<Mutex<Vec<Id>>>;

    struct TestJob {
        id: Id,
        deps: Vec<Id>,
        log: Log,
        fail: bool,
    }

    fn job(id: u8, deps: &[u8], log: &Log) -> Box<dyn Job> {
        Box::new(TestJob {
            id: make_id(id),
            deps: deps.iter().map(|d| make_id(*d)).collect(),
            log: log.clone(),
            fail: false,
        })
    }

    impl Job for TestJob {
        fn id(&self) -> Id {
            self.id
        }

        fn dependencies(&self) -> Vec<Id> {
            self.deps.clone()
        }

        fn execute(&mut self) -> Result<()> {
            if self.fail {
                return Err(ConsensusError::Vm("execution failed".into()));
            }
            self.log.lock().push(self.id);
            Ok(())
        }
    }

    #[test]
    fn test_dependencies_execute_first() {
        let log = Log::default();
        let mut jobs = Jobs::new();

        assert!(jobs.push(job(3, &[1, 2], &log)).unwrap());
        assert!(log.lock().is_empty());
        assert_eq!(jobs.missing_ids(), HashSet::from([make_id(1), make_id(2)]));

        jobs.push(job(1, &[], &log)).unwrap();
        assert_eq!(*log.lock(), vec![make_id(1)]);
        assert!(jobs.is_queued(&make_id(3)));

        jobs.push(job(2, &[], &log)).unwrap();
        assert_eq!(*log.lock(), vec![make_id(1), make_id(2), make_id(3)]);
        assert_eq!(jobs.num_queued(), 0);
        assert_eq!(jobs.num_executed(), 3);
    }

    #[test]
    fn test_cascade_through_chain() {
        let log = Log::default();
        let mut jobs = Jobs::new();
        jobs.push(job(4, &[3], &log)).unwrap();
        jobs.push(job(3, &[2], &log)).unwrap();
        jobs.push(job(2, &[1], &log)).unwrap();
        assert_eq!(jobs.missing_ids(), HashSet::from([make_id(1)]));

        jobs.fulfill(make_id(1)).unwrap();
        assert_eq!(*log.lock(), vec![make_id(2), make_id(3), make_id(4)]);
        assert!(jobs.is_satisfied(&make_id(4)));
    }

    #[test]
    fn test_duplicate_push() {
        let log = Log::default();
        let mut jobs = Jobs::new();
        assert!(jobs.push(job(1, &[], &log)).unwrap());
        assert!(!jobs.push(job(1, &[], &log)).unwrap());
        assert!(jobs.push(job(2, &[9], &log)).unwrap());
        assert!(!jobs.push(job(2, &[9], &log)).unwrap());
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_abandon_drops_dependents() {
        let log = Log::default();
        let mut jobs = Jobs::new();
        jobs.push(job(2, &[1], &log)).unwrap();
        jobs.push(job(3, &[2, 5], &log)).unwrap();
        jobs.push(job(4, &[5], &log)).unwrap();

        assert_eq!(
            jobs.abandon(make_id(1)),
            Err(ConsensusError::BootstrapAbandoned {
                dependency: make_id(1),
                dropped: 2
            })
        );
        assert!(!jobs.is_queued(&make_id(2)));
        assert!(!jobs.is_queued(&make_id(3)));
        assert!(jobs.is_queued(&make_id(4)));

        jobs.fulfill(make_id(5)).unwrap();
        assert_eq!(*log.lock(), vec![make_id(4)]);
        assert_eq!(jobs.abandon(make_id(7)), Ok(()));
    }

    #[test]
    fn test_abandon_forgets_orphaned_dependencies() {
        let log = Log::default();
        let mut jobs = Jobs::new();
        jobs.push(job(2, &[1], &log)).unwrap();
        jobs.push(job(3, &[2, 5], &log)).unwrap();
        assert_eq!(jobs.missing_ids(), HashSet::from([make_id(1), make_id(5)]));

        assert!(jobs.abandon(make_id(1)).is_err());
        assert!(jobs.missing_ids().is_empty());
        assert!(jobs.waiting.is_empty());
        assert_eq!(jobs.num_queued(), 0);
    }

    #[test]
    fn test_execution_error_keeps_released_jobs() {
        let log = Log::default();
        let mut jobs = Jobs::new();
        jobs.push(job(3, &[1], &log)).unwrap();
        jobs.push(Box::new(TestJob {
            id: make_id(2),
            deps: vec![make_id(1)],
            log: log.clone(),
            fail: true,
        }))
        .unwrap();
        jobs.push(job(4, &[3], &log)).unwrap();

        // 2 runs before 3 and fails.
        assert!(matches!(jobs.fulfill(make_id(1)), Err(ConsensusError::Vm(_))));
        assert!(log.lock().is_empty());
        assert_eq!(jobs.num_ready(), 2);
        assert!(jobs.is_queued(&make_id(2)));
        assert!(jobs.is_queued(&make_id(3)));
        assert!(jobs.is_queued(&make_id(4)));
        assert!(!jobs.push(job(3, &[1], &log)).unwrap());

        // The failing job is retried first and still fails.
        assert!(jobs.execute().is_err());
        assert_eq!(jobs.num_queued(), 3);
        assert_eq!(jobs.num_executed(), 0);
    }

    #[test]
    fn test_execute_resumes_after_error() {
        let log = Log::default();
        let mut jobs = Jobs::new();
        let flaky = Arc::new(Mutex::new(true));
        jobs.push(Box::new(FlakyJob {
            id: make_id(2),
            fail: flaky.clone(),
        }))
        .unwrap_err();
        jobs.push(job(3, &[2], &log)).unwrap();
        assert_eq!(jobs.num_ready(), 1);

        *flaky.lock() = false;
        jobs.execute().unwrap();
        assert_eq!(*log.lock(), vec![make_id(3)]);
        assert_eq!(jobs.num_executed(), 2);
        assert_eq!(jobs.num_queued(), 0);
    }

    struct FlakyJob {
        id: Id,
        fail: Arc<Mutex<bool>>,
    }

    impl Job for FlakyJob {
        fn id(&self) -> Id {
            self.id
        }

        fn dependencies(&self) -> Vec<Id> {
            Vec::new()
        }

        fn execute(&mut self) -> Result<()> {
            if *self.fail.lock() {
                return Err(ConsensusError::Vm("not yet".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_execution_error_propagates() {
        let log = Log::default();
        let mut jobs = Jobs::new();
        let failing = Box::new(TestJob {
            id: make_id(1),
            deps: Vec::new(),
            log: log.clone(),
            fail: true,
        });
        assert!(matches!(jobs.push(failing), Err(ConsensusError::Vm(_))));
        assert!(!jobs.is_satisfied(&make_id(1)));
    }
}
