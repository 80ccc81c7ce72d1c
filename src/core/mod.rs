//! Core types for the agent engine
//!
//! This module provides the fundamental types used throughout the crate:
//! - `AgentEvent` - Output events streamed from live sessions
//! - `EngineError` - Error types

pub mod error;
pub mod event;

pub use error::{EngineError, EngineResult};
pub use event::AgentEvent;
