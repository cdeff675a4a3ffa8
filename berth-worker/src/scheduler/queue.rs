//! Inbound message queue
//!
//! A bounded tokio channel whose receiving side is shared by every worker.
//! Receivers take turns on the channel behind an async mutex, so each
//! message is delivered to exactly one worker.

use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Creates a queue buffering up to `capacity` messages
pub fn channel(capacity: usize) -> (MessageSender, MessageQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        MessageSender { tx },
        MessageQueue {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer side of the queue
///
/// The queue closes once every sender has been dropped.
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::Sender<String>,
}

impl MessageSender {
    /// Enqueues a serialized message, waiting while the queue is full
    pub async fn send(&self, message: String) -> Result<(), QueueClosed> {
        self.tx
            .send(message)
            .await
            .map_err(|mpsc::error::SendError(message)| QueueClosed(message))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the queue, cloned into every worker
#[derive(Debug, Clone)]
pub struct MessageQueue {
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl MessageQueue {
    /// Waits for the next message
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

/// The queue no longer accepts messages; carries the rejected message back
#[derive(Debug, thiserror::Error)]
#[error("message queue is closed")]
pub struct QueueClosed(pub String);
