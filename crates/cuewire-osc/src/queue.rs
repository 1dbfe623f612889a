//! Inbound message queue shared by the receive thread and the dispatcher

use crate::types::OscMessage;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// How the queue behaves when the consumer falls behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// Grow without limit
    #[default]
    Unbounded,
    /// Hold at most `capacity` messages; newer messages are dropped when full
    DropNewest { capacity: usize },
}

impl QueuePolicy {
    /// Policy from a capacity where zero means unbounded
    pub fn from_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            Self::Unbounded
        } else {
            Self::DropNewest { capacity }
        }
    }
}

/// FIFO of decoded messages.
///
/// Cloning shares the same underlying channel. Pushing and popping never block.
#[derive(Debug, Clone)]
pub struct MessageQueue {
    tx: Sender<OscMessage>,
    rx: Receiver<OscMessage>,
    dropped: Arc<AtomicU64>,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new(QueuePolicy::Unbounded)
    }
}

impl MessageQueue {
    /// Create a queue with the given overflow policy
    pub fn new(policy: QueuePolicy) -> Self {
        let (tx, rx) = match policy {
            QueuePolicy::Unbounded => unbounded(),
            QueuePolicy::DropNewest { capacity } => bounded(capacity.max(1)),
        };
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue a message. Returns `false` if it was dropped because the queue is full.
    pub fn push(&self, message: OscMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Inbound queue full, dropping message for {} ({} dropped so far)",
                    message.address, total
                );
                false
            }
            // Both ends live in `self`, so the channel cannot disconnect
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Dequeue the oldest message, if any
    pub fn pop(&self) -> Option<OscMessage> {
        self.rx.try_recv().ok()
    }

    /// Dequeue everything currently queued, oldest first
    pub fn drain(&self) -> Vec<OscMessage> {
        self.rx.try_iter().collect()
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Messages dropped by the overflow policy
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
