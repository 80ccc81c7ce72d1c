//! Bidirectional streaming plumbing
//!
//! - `RequestSource` - ordered source of caller-supplied request items
//! - `ChannelRequestSource` - mpsc-backed source
//! - `ConfigInjectingQueue` - injects the run configuration into the first item

mod queue;
mod source;

use std::pin::Pin;

use futures::stream::Stream;
use serde_json::Value;

use crate::core::EngineResult;

pub use queue::{ConfigInjectingQueue, InjectionState, RUN_CONFIG_KEY};
pub use source::{
    create_request_queue, send_request, ChannelRequestSource, RequestSender, RequestSource,
    REQUEST_QUEUE_SIZE,
};

/// Stream of output events produced by a bidi session
pub type EventStream = Pin<Box<dyn Stream<Item = EngineResult<Value>> + Send>>;
