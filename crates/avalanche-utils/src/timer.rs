//! Re-armable deadline driven by tokio.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct State {
    deadline: Option<Instant>,
    stopped: bool,
}

/// Fires a callback when its deadline passes.
///
/// The deadline can be moved or cancelled from any thread; the task running
/// [`Timer::dispatch`] wakes up and re-reads it. Used to unbench validators
/// exactly when their bench window closes.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

impl Timer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer to fire `after` from now, replacing any earlier deadline.
    pub fn set_timeout_in(&self, after: Duration) {
        self.state.lock().deadline = Some(Instant::now() + after);
        self.notify.notify_one();
    }

    /// Disarms the timer without stopping the dispatch loop.
    pub fn cancel(&self) {
        self.state.lock().deadline = None;
        self.notify.notify_one();
    }

    /// Ends the dispatch loop.
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.notify.notify_one();
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state.lock().deadline.is_some()
    }

    /// Runs until [`Timer::stop`] is called, invoking `on_fire` each time an
    /// armed deadline passes.
    pub async fn dispatch<F: FnMut()>(&self, mut on_fire: F) {
        loop {
            let deadline = {
                let state = self.state.lock();
                if state.stopped {
                    return;
                }
                state.deadline
            };

            match deadline {
                None => self.notify.notified().await,
                Some(at) => {
                    tokio::select! {
                        () = tokio::time::sleep_until(at) => {
                            let fire = {
                                let mut state = self.state.lock();
                                if state.deadline == Some(at) && !state.stopped {
                                    state.deadline = None;
                                    true
                                } else {
                                    false
                                }
                            };
                            if fire {
                                on_fire();
                            }
                        }
                        () = self.notify.notified() => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_per_arm() {
        let timer = Timer::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = {
            let timer = timer.clone();
            let fired = Arc::clone(&fired);
            tokio::spawn(async move {
                timer
                    .dispatch(move || {
                        fired.fetch_add(1, Ordering::SeqCst);
                    })
                    .await;
            })
        };

        timer.set_timeout_in(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());

        timer.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let timer = Timer::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = {
            let timer = timer.clone();
            let fired = Arc::clone(&fired);
            tokio::spawn(async move {
                timer
                    .dispatch(move || {
                        fired.fetch_add(1, Ordering::SeqCst);
                    })
                    .await;
            })
        };

        timer.set_timeout_in(Duration::from_secs(1));
        timer.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        timer.stop();
        handle.await.unwrap();
    }
}
