//! Frontier module: the durable work queue of URLs awaiting crawl
//!
//! The frontier is an at-least-once queue. A consumer that pulls a message
//! owns it until it acks or nacks the delivery tag; a consumer that dies in
//! between gets the message redelivered to someone else. Processing must
//! therefore be idempotent, which the visited set guarantees.
//!
//! Backends:
//! - `AmqpFrontier`: a durable RabbitMQ queue (multi-process)
//! - `MemoryFrontier`: an in-process queue (tests, single process)

mod amqp;
pub mod codec;
mod memory;
mod task;

pub use amqp::{amqp_uri, AmqpFrontier};
pub use codec::CodecError;
pub use memory::{DeadLetterEntry, MemoryFrontier};
pub use task::CrawlTask;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Opaque handle used to acknowledge a pulled message
///
/// Tags are scoped to the transport session that produced them; a tag from a
/// session that has since been replaced is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryTag {
    pub(crate) session: u64,
    pub(crate) tag: u64,
}

impl DeliveryTag {
    pub(crate) fn new(session: u64, tag: u64) -> Self {
        Self { session, tag }
    }
}

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.session, self.tag)
    }
}

/// A task pulled from the frontier, together with its delivery handle
#[derive(Debug, Clone)]
pub struct FrontierMessage {
    pub task: CrawlTask,
    pub delivery_tag: DeliveryTag,
    /// True if the transport has delivered this message before
    pub redelivered: bool,
}

/// Errors that can occur during frontier operations
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Queue transport unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },

    #[error("Publish of {url} was rejected by the broker")]
    NotConfirmed { url: String },

    #[error("Invalid queue URI: {0}")]
    InvalidUri(String),

    #[error("Unknown delivery tag {0}")]
    UnknownDelivery(DeliveryTag),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Frontier is closed")]
    Closed,
}

/// Result type for frontier operations
pub type FrontierResult<T> = Result<T, FrontierError>;

/// A durable, at-least-once queue of crawl tasks
#[async_trait]
pub trait Frontier: Send + Sync {
    /// Publishes a task
    async fn push(&self, task: &CrawlTask) -> FrontierResult<()>;

    /// Waits up to `timeout` for the next task; `None` if none arrived
    async fn pull(&self, timeout: Duration) -> FrontierResult<Option<FrontierMessage>>;

    /// Acknowledges a pulled message, removing it from the queue for good
    async fn ack(&self, tag: DeliveryTag) -> FrontierResult<()>;

    /// Rejects a pulled message, optionally returning it to the queue
    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> FrontierResult<()>;

    /// Moves a task to the dead-letter sink
    async fn dead_letter(&self, task: &CrawlTask, reason: &str) -> FrontierResult<()>;

    /// Releases transport resources; unacked messages become redeliverable
    async fn close(&self) -> FrontierResult<()> {
        Ok(())
    }
}
