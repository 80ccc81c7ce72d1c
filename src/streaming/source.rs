//! Request sources for bidirectional streaming
//!
//! A request source is an ordered sequence of JSON items supplied by the
//! caller. `next` suspends until an item is available and returns `None`
//! once the source is closed.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::core::{EngineError, EngineResult};

/// Default buffer size for request queues
pub const REQUEST_QUEUE_SIZE: usize = 64;

/// An ordered source of streamed request items
#[async_trait]
pub trait RequestSource: Send + Sync {
    /// Wait for the next item
    ///
    /// `Ok(None)` means the source is closed. Implementations must be
    /// cancel-safe: dropping the future must not lose an item.
    async fn next(&self) -> EngineResult<Option<Value>>;
}

#[async_trait]
impl<S: RequestSource + ?Sized> RequestSource for Box<S> {
    async fn next(&self) -> EngineResult<Option<Value>> {
        (**self).next().await
    }
}

/// Sender half of a request queue
pub type RequestSender = mpsc::Sender<Value>;

/// Request source backed by a tokio mpsc channel
#[derive(Debug)]
pub struct ChannelRequestSource {
    rx: Mutex<mpsc::Receiver<Value>>,
}

impl ChannelRequestSource {
    pub fn new(rx: mpsc::Receiver<Value>) -> Self {
        Self { rx: Mutex::new(rx) }
    }
}

#[async_trait]
impl RequestSource for ChannelRequestSource {
    async fn next(&self) -> EngineResult<Option<Value>> {
        Ok(self.rx.lock().await.recv().await)
    }
}

/// Create a new request queue
///
/// Returns (sender, source). Dropping every sender closes the source.
pub fn create_request_queue() -> (RequestSender, ChannelRequestSource) {
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE_SIZE);
    (tx, ChannelRequestSource::new(rx))
}

/// Push an item onto a request queue
pub async fn send_request(tx: &RequestSender, item: Value) -> EngineResult<()> {
    tx.send(item).await.map_err(|_| EngineError::ChannelClosed)
}
