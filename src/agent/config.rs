//! Agent definition
//!
//! An `Agent` binds an instruction and a set of tools to a hosted model.
//! An `App` bundles the root agent under the name the session backend
//! correlates sessions by.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tools::{FunctionDeclaration, ToolRegistry};

/// Retry policy declared to the model client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Total attempts, including the first
    pub attempts: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self { attempts: 1 }
    }
}

/// Sampling parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Hosted model binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier
    pub model: String,
    pub retry: RetryOptions,
    pub generation: GenerationConfig,
}

impl ModelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            retry: RetryOptions::default(),
            generation: GenerationConfig::default(),
        }
    }

    /// Set the number of attempts for transient failures
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry = RetryOptions {
            attempts: attempts.max(1),
        };
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.generation.temperature = Some(temperature);
        self
    }
}

/// A conversational agent
///
/// ```ignore
/// let agent = Agent::new("root_agent", ModelConfig::new("gemini-live-2.5-flash-native-audio"))
///     .with_instruction("You are a helpful assistant.")
///     .with_tools(Arc::new(tools));
/// ```
#[derive(Debug, Clone)]
pub struct Agent {
    name: String,
    model: ModelConfig,
    instruction: String,
    tools: Arc<ToolRegistry>,
}

impl Agent {
    pub fn new(name: impl Into<String>, model: ModelConfig) -> Self {
        Self {
            name: name.into(),
            model,
            instruction: String::new(),
            tools: Arc::new(ToolRegistry::new()),
        }
    }

    /// Set the system instruction
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Set the tool registry
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Function declarations for the model (empty if no tools)
    pub fn tool_declarations(&self) -> Vec<FunctionDeclaration> {
        self.tools.declarations()
    }
}

/// Application bundle handed to the deployment adapter
#[derive(Debug, Clone)]
pub struct App {
    name: String,
    root_agent: Arc<Agent>,
}

impl App {
    pub fn new(name: impl Into<String>, root_agent: Agent) -> Self {
        Self {
            name: name.into(),
            root_agent: Arc::new(root_agent),
        }
    }

    /// Name sessions are filed under
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_agent(&self) -> &Arc<Agent> {
        &self.root_agent
    }

    /// Replace the advertised name
    ///
    /// Used once at startup to match the platform-assigned engine ID.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
