//! Tool system for the agent
//!
//! This module provides:
//! - `Tool` trait - Interface for implementing tools
//! - `ToolResult` - Result type for tool execution
//! - `ToolRegistry` - Registry for managing available tools
//! - `GetWeatherTool` - The agent's weather lookup

mod registry;
mod tool;
mod weather;

pub use registry::ToolRegistry;
pub use tool::{FunctionDeclaration, Tool, ToolResult};
pub use weather::{get_weather, GetWeatherTool};
