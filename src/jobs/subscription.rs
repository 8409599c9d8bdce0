//! Bounded per-subscriber event queue.
//!
//! `tokio::sync::mpsc` blocks (or errors) a full sender instead of evicting
//! the oldest entry, which is the wrong shape for a slow WebSocket consumer
//! of progress updates: we want the *latest* state, not backpressure on the
//! job itself. So this is a small ring buffer guarded by a mutex and a
//! `Notify`, capacity 32 per `spec.md` §4.8.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Notify;

use super::JobEvent;

const CAPACITY: usize = 32;

#[derive(Clone)]
pub(crate) struct JobSender {
    queue: Arc<std::sync::Mutex<VecDeque<JobEvent>>>,
    notify: Arc<Notify>,
}

impl JobSender {
    pub(crate) fn new() -> (Self, JobSubscription) {
        let queue = Arc::new(std::sync::Mutex::new(VecDeque::with_capacity(CAPACITY)));
        let notify = Arc::new(Notify::new());
        let sender = Self {
            queue: queue.clone(),
            notify: notify.clone(),
        };
        let subscription = JobSubscription { queue, notify };
        (sender, subscription)
    }

    /// Pushes an event, dropping the oldest queued event if full.
    pub(crate) fn send(&self, event: JobEvent) {
        let mut queue = self.queue.lock().expect("job event queue poisoned");
        if queue.len() >= CAPACITY {
            queue.pop_front();
            tracing::warn!("job event queue full, dropping oldest event");
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
    }
}

/// Consumer handle returned by `JobStore::subscribe`.
pub struct JobSubscription {
    queue: Arc<std::sync::Mutex<VecDeque<JobEvent>>>,
    notify: Arc<Notify>,
}

impl JobSubscription {
    /// Waits for and returns the next event. Never returns `None`: a
    /// subscription lives exactly as long as the caller holds it.
    pub async fn recv(&mut self) -> JobEvent {
        loop {
            if let Some(event) = self.queue.lock().expect("job event queue poisoned").pop_front() {
                return event;
            }
            self.notify.notified().await;
        }
    }
}
