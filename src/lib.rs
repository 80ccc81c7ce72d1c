pub mod agent;
pub mod config;
pub mod core;
pub mod engine;
pub mod feedback;
pub mod logging;
pub mod platform;
pub mod services;
pub mod streaming;
pub mod tools;

pub use engine::AgentEngineApp;
