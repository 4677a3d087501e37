//! Keyed work queue with de-duplication, delayed wakes, and per-key backoff.
//!
//! A key is handed to at most one worker at a time. Adding a key that is
//! already queued is a no-op; adding a key that is being processed marks it
//! dirty so it is queued again once the worker calls [`WorkQueue::done`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, sleep_until};

#[derive(Debug, Default)]
struct QueueState {
    /// Keys ready to be handed out, in arrival order.
    ready: VecDeque<String>,
    /// Membership of `ready`.
    queued: HashSet<String>,
    /// Keys currently held by a worker.
    processing: HashSet<String>,
    /// Keys added while being processed.
    dirty: HashSet<String>,
    /// One pending wake per key.
    delayed: HashMap<String, Instant>,
    /// Consecutive failures per key.
    failures: HashMap<String, u32>,
    shutting_down: bool,
}

impl QueueState {
    /// Returns `true` if a worker should be woken.
    fn push(&mut self, key: &str) -> bool {
        if self.processing.contains(key) {
            self.dirty.insert(key.to_string());
            return false;
        }
        if self.queued.insert(key.to_string()) {
            self.ready.push_back(key.to_string());
            return true;
        }
        false
    }

    fn promote_due(&mut self, now: Instant) {
        let due: Vec<String> = self
            .delayed
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in due {
            self.delayed.remove(&key);
            self.push(&key);
        }
    }
}

/// Work queue shared by the watch forwarder, the scheduler, and the workers.
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl WorkQueue {
    /// Creates a queue whose failure backoff starts at `base_backoff`,
    /// doubles per consecutive failure, and never exceeds `max_backoff`.
    pub fn new(base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            base_backoff,
            max_backoff,
        }
    }

    /// Queues `key` for immediate processing.
    ///
    /// Supersedes any pending delayed wake for the key.
    pub async fn add(&self, key: &str) {
        let mut state = self.state.lock().await;
        if state.shutting_down {
            return;
        }
        state.delayed.remove(key);
        if state.push(key) {
            self.notify.notify_one();
        }
    }

    /// Queues `key` because its record changed.
    ///
    /// Same as [`WorkQueue::add`], except that a key backing off from
    /// failures keeps its scheduled retry. Status writes made while a key
    /// is failing would otherwise cut every backoff short.
    pub async fn add_change(&self, key: &str) {
        let mut state = self.state.lock().await;
        if state.shutting_down {
            return;
        }
        let backing_off = state.delayed.contains_key(key)
            && state.failures.get(key).is_some_and(|failures| *failures > 0);
        if backing_off {
            return;
        }
        state.delayed.remove(key);
        if state.push(key) {
            self.notify.notify_one();
        }
    }

    /// Schedules `key` after `delay`, replacing any earlier pending wake.
    pub async fn add_after(&self, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(key).await;
            return;
        }

        let mut state = self.state.lock().await;
        if state.shutting_down || state.queued.contains(key) {
            return;
        }
        state.delayed.insert(key.to_string(), Instant::now() + delay);
        drop(state);
        // Sleeping workers recompute their next deadline.
        self.notify.notify_waiters();
    }

    /// Records a failure for `key` and schedules it after the backoff.
    ///
    /// Returns the chosen delay.
    pub async fn add_rate_limited(&self, key: &str) -> Duration {
        let failures = {
            let mut state = self.state.lock().await;
            let failures = state.failures.entry(key.to_string()).or_insert(0);
            *failures = failures.saturating_add(1);
            *failures
        };

        let delay = self.backoff(failures);
        self.add_after(key, delay).await;
        delay
    }

    /// Clears the failure history of `key`.
    pub async fn forget(&self, key: &str) {
        self.state.lock().await.failures.remove(key);
    }

    /// Consecutive failures recorded for `key`.
    pub async fn num_requeues(&self, key: &str) -> u32 {
        self.state
            .lock()
            .await
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Backoff for the `failures`-th consecutive failure.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Waits for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_deadline = {
                let mut state = self.state.lock().await;
                if state.shutting_down {
                    return None;
                }
                state.promote_due(Instant::now());
                if let Some(key) = state.ready.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                state.delayed.values().min().copied()
            };

            match next_deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Releases `key` after processing.
    pub async fn done(&self, key: &str) {
        let mut state = self.state.lock().await;
        state.processing.remove(key);
        if state.dirty.remove(key) && !state.shutting_down && state.push(key) {
            self.notify.notify_one();
        }
    }

    /// Stops handing out keys and drops all pending work.
    pub async fn shut_down(&self) {
        let mut state = self.state.lock().await;
        state.shutting_down = true;
        state.ready.clear();
        state.queued.clear();
        state.delayed.clear();
        state.dirty.clear();
        drop(state);
        self.notify.notify_waiters();
    }

    /// Keys ready for processing.
    pub async fn len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Whether no key is ready.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// When the pending delayed wake of `key` fires, if any.
    pub async fn scheduled_at(&self, key: &str) -> Option<Instant> {
        self.state.lock().await.delayed.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn queue() -> WorkQueue {
        WorkQueue::new(Duration::from_millis(100), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_duplicate_adds_coalesce() {
        let queue = queue();
        queue.add("alice").await;
        queue.add("alice").await;
        queue.add("bob").await;
        assert_eq!(queue.len().await, 2);

        assert_eq!(queue.get().await.as_deref(), Some("alice"));
        assert_eq!(queue.get().await.as_deref(), Some("bob"));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_key_added_while_processing_is_requeued_on_done() {
        let queue = queue();
        queue.add("alice").await;
        let key = queue.get().await.unwrap();

        queue.add("alice").await;
        assert!(queue.is_empty().await, "in-flight key must not be handed out twice");

        queue.done(&key).await;
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.get().await.as_deref(), Some("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_key_is_released_after_delay() {
        let queue = Arc::new(queue());
        let start = Instant::now();
        queue.add_after("alice", Duration::from_secs(30)).await;

        let key = queue.get().await.unwrap();
        assert_eq!(key, "alice");
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_replaces_pending_wake() {
        let queue = queue();
        queue.add_after("alice", Duration::from_secs(600)).await;
        queue.add_after("alice", Duration::from_secs(60)).await;

        let start = Instant::now();
        assert_eq!(queue.get().await.as_deref(), Some("alice"));
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(60) && waited < Duration::from_secs(600));
        assert!(queue.scheduled_at("alice").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_add_supersedes_delay() {
        let queue = queue();
        queue.add_after("alice", Duration::from_secs(600)).await;
        queue.add("alice").await;

        assert_eq!(queue.get().await.as_deref(), Some("alice"));
        assert!(queue.scheduled_at("alice").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_during_failure_backoff_keeps_retry() {
        let queue = queue();
        queue.add("alice").await;
        let key = queue.get().await.unwrap();

        // A failed pass writes the record while the key is still in flight.
        let delay = queue.add_rate_limited(&key).await;
        let retry_at = queue.scheduled_at("alice").await;
        queue.add_change("alice").await;
        queue.done(&key).await;

        assert!(queue.is_empty().await);
        assert_eq!(queue.scheduled_at("alice").await, retry_at);

        queue.add_change("alice").await;
        assert!(queue.is_empty().await);

        let start = Instant::now();
        assert_eq!(queue.get().await.as_deref(), Some("alice"));
        assert!(start.elapsed() >= delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_without_failures_supersedes_delay() {
        let queue = queue();
        queue.add_after("alice", Duration::from_secs(600)).await;
        queue.add_change("alice").await;

        assert_eq!(queue.len().await, 1);
        assert!(queue.scheduled_at("alice").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_worker_picks_up_new_key() {
        let queue = Arc::new(queue());
        let worker = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::task::yield_now().await;

        queue.add("alice").await;
        assert_eq!(worker.await.unwrap().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_backoff_doubles_and_caps() {
        let queue = queue();
        assert_eq!(queue.backoff(1), Duration::from_millis(100));
        assert_eq!(queue.backoff(2), Duration::from_millis(200));
        assert_eq!(queue.backoff(4), Duration::from_millis(800));
        assert_eq!(queue.backoff(10), Duration::from_secs(5));
        assert_eq!(queue.backoff(u32::MAX), Duration::from_secs(5));

        assert_eq!(queue.add_rate_limited("alice").await, Duration::from_millis(100));
        assert_eq!(queue.add_rate_limited("alice").await, Duration::from_millis(200));
        assert_eq!(queue.num_requeues("alice").await, 2);

        queue.forget("alice").await;
        assert_eq!(queue.num_requeues("alice").await, 0);
    }

    #[tokio::test]
    async fn test_shut_down_releases_waiters() {
        let queue = Arc::new(queue());
        let worker = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::task::yield_now().await;

        queue.shut_down().await;
        assert_eq!(worker.await.unwrap(), None);

        queue.add("alice").await;
        assert!(queue.is_empty().await);
    }
}
