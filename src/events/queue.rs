//! Priority event queue
//!
//! A min-heap keyed on `(priority rank, arrival sequence)`: events drain in
//! strictly non-decreasing rank order, FIFO within the same rank. Consumers
//! block on [`PriorityEventQueue::pop_timeout`] instead of spinning.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::types::Event;

struct QueuedEvent {
    rank: u8,
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        (self.rank, self.seq) == (other.rank, other.seq)
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    // Reversed so the std max-heap yields the lowest (rank, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.rank, other.seq).cmp(&(self.rank, self.seq))
    }
}

struct QueueState {
    heap: BinaryHeap<QueuedEvent>,
    next_seq: u64,
}

/// Shared priority queue between the intake and the dispatcher.
pub struct PriorityEventQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl PriorityEventQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue an event at the rank derived from its priority.
    pub fn push(&self, event: Event) {
        let rank = event.priority().rank();
        {
            let mut state = self.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(QueuedEvent { rank, seq, event });
        }
        self.notify.notify_one();
    }

    /// Remove and return the highest-priority event, if any.
    pub fn try_pop(&self) -> Option<Event> {
        self.lock().heap.pop().map(|q| q.event)
    }

    /// Wait up to `timeout` for an event.
    ///
    /// Returns `None` on timeout. Waiters park on a notifier rather than
    /// polling, so an empty queue costs one timer per call.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<Event> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register for wakeups before checking, so a push between the
            // check and the await is not lost.
            let notified = self.notify.notified();
            if let Some(event) = self.try_pop() {
                return Some(event);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PriorityEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    fn event(id: &str, alarm: &str, state: &str) -> Event {
        Event {
            id: id.to_string(),
            time: String::new(),
            source: "test".to_string(),
            detail_type: String::new(),
            detail: json!({"alarmName": alarm, "state": {"value": state}}),
        }
    }

    #[test]
    fn test_strict_rank_order() {
        let queue = PriorityEventQueue::new();
        queue.push(event("m", "steady", "OK")); // MEDIUM
        queue.push(event("h", "cpu-high", "ALARM")); // HIGH
        queue.push(event("c", "pod-oom", "ALARM")); // CRITICAL

        assert_eq!(queue.try_pop().unwrap().id, "c");
        assert_eq!(queue.try_pop().unwrap().id, "h");
        assert_eq!(queue.try_pop().unwrap().id, "m");
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_fifo_within_rank() {
        let queue = PriorityEventQueue::new();
        for id in ["a", "b", "c"] {
            queue.push(event(id, "cpu-high", "ALARM"));
        }
        assert_eq!(queue.try_pop().unwrap().id, "a");
        assert_eq!(queue.try_pop().unwrap().id, "b");
        assert_eq!(queue.try_pop().unwrap().id, "c");
    }

    #[tokio::test]
    async fn test_pop_timeout_on_empty_queue_waits() {
        let queue = PriorityEventQueue::new();
        let start = Instant::now();
        let popped = queue.pop_timeout(Duration::from_millis(100)).await;
        assert!(popped.is_none());
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_pop_timeout_wakes_on_push() {
        let queue = std::sync::Arc::new(PriorityEventQueue::new());
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(event("late", "cpu-high", "ALARM"));
        });

        let popped = queue.pop_timeout(Duration::from_secs(5)).await;
        assert_eq!(popped.unwrap().id, "late");
    }
}
