//! In-process frontier implementation
//!
//! Mirrors the broker's delivery protocol (unacked tracking, requeue on
//! nack, redelivered flag) without durability. Used by tests and for
//! single-process crawls.

use crate::frontier::{
    CrawlTask, DeliveryTag, Frontier, FrontierError, FrontierMessage, FrontierResult,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

/// Session id used for every delivery tag handed out by this frontier
const MEMORY_SESSION: u64 = 0;

/// A task that was moved to the dead-letter sink
#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    pub task: CrawlTask,
    pub reason: String,
}

#[derive(Debug)]
struct Queued {
    task: CrawlTask,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct MemoryQueue {
    ready: VecDeque<Queued>,
    unacked: HashMap<u64, Queued>,
    dead_letters: Vec<DeadLetterEntry>,
    next_tag: u64,
    pushed: u64,
    closed: bool,
}

/// In-memory frontier
#[derive(Debug, Default)]
pub struct MemoryFrontier {
    queue: Mutex<MemoryQueue>,
    notify: Notify,
}

impl MemoryFrontier {
    /// Creates an empty frontier
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryQueue> {
        // A poisoned lock only means a test panicked mid-operation; the queue
        // itself is still consistent.
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of messages waiting to be pulled
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    /// Returns true if no messages are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pulled messages not yet acked or nacked
    pub fn unacked_count(&self) -> usize {
        self.lock().unacked.len()
    }

    /// Total number of push calls
    pub fn pushed_count(&self) -> u64 {
        self.lock().pushed
    }

    /// Tasks waiting to be pulled, in queue order
    pub fn pending_tasks(&self) -> Vec<CrawlTask> {
        self.lock().ready.iter().map(|q| q.task.clone()).collect()
    }

    /// Everything moved to the dead-letter sink so far
    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.lock().dead_letters.clone()
    }

    fn try_pop(&self) -> FrontierResult<Option<FrontierMessage>> {
        let mut queue = self.lock();
        if queue.closed {
            return Err(FrontierError::Closed);
        }

        let Some(queued) = queue.ready.pop_front() else {
            return Ok(None);
        };

        queue.next_tag += 1;
        let tag = queue.next_tag;
        let message = FrontierMessage {
            task: queued.task.clone(),
            delivery_tag: DeliveryTag::new(MEMORY_SESSION, tag),
            redelivered: queued.redelivered,
        };
        queue.unacked.insert(tag, queued);
        Ok(Some(message))
    }

    fn take_unacked(&self, tag: DeliveryTag) -> FrontierResult<Queued> {
        if tag.session != MEMORY_SESSION {
            return Err(FrontierError::UnknownDelivery(tag));
        }
        self.lock()
            .unacked
            .remove(&tag.tag)
            .ok_or(FrontierError::UnknownDelivery(tag))
    }
}

#[async_trait]
impl Frontier for MemoryFrontier {
    async fn push(&self, task: &CrawlTask) -> FrontierResult<()> {
        {
            let mut queue = self.lock();
            if queue.closed {
                return Err(FrontierError::Closed);
            }
            queue.ready.push_back(Queued {
                task: task.clone(),
                redelivered: false,
            });
            queue.pushed += 1;
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn pull(&self, timeout: Duration) -> FrontierResult<Option<FrontierMessage>> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so a concurrent push can't
            // slip between the check and the wait.
            let notified = self.notify.notified();

            if let Some(message) = self.try_pop()? {
                return Ok(Some(message));
            }

            if timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    async fn ack(&self, tag: DeliveryTag) -> FrontierResult<()> {
        self.take_unacked(tag).map(|_| ())
    }

    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> FrontierResult<()> {
        let mut queued = self.take_unacked(tag)?;
        if requeue {
            queued.redelivered = true;
            self.lock().ready.push_back(queued);
            self.notify.notify_one();
        }
        Ok(())
    }

    async fn dead_letter(&self, task: &CrawlTask, reason: &str) -> FrontierResult<()> {
        self.lock().dead_letters.push(DeadLetterEntry {
            task: task.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn close(&self) -> FrontierResult<()> {
        let mut queue = self.lock();
        queue.closed = true;
        // Unacked messages go back to the queue, as they would on a broker
        let tags: Vec<u64> = queue.unacked.keys().copied().collect();
        for tag in tags {
            if let Some(mut queued) = queue.unacked.remove(&tag) {
                queued.redelivered = true;
                queue.ready.push_back(queued);
            }
        }
        Ok(())
    }
}
