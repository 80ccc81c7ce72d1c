//! The voice agent
//!
//! One root agent with a weather tool, bound to a native-audio live model,
//! plus the run configuration that gives it a replicated voice.

mod config;
mod run_config;

use std::sync::Arc;

pub use config::{Agent, App, GenerationConfig, ModelConfig, RetryOptions};
pub use run_config::{
    Modality, PrebuiltVoiceConfig, ReplicatedVoiceConfig, RunConfig, SpeechConfig, VoiceConfig,
    VOICE_SAMPLE_MIME_TYPE,
};

use crate::tools::{GetWeatherTool, ToolRegistry};

/// Name of the root agent
pub const ROOT_AGENT_NAME: &str = "root_agent";

/// Default application name (replaced by the engine ID in managed mode)
pub const APP_NAME: &str = "app";

/// Live model serving the agent
pub const MODEL_ID: &str = "gemini-live-2.5-flash-native-audio";

/// Attempts for transient model failures
pub const MODEL_RETRY_ATTEMPTS: u32 = 3;

pub const MODEL_TEMPERATURE: f32 = 0.7;

pub const INSTRUCTION: &str =
    "You are a helpful AI assistant designed to provide accurate and useful information.";

/// Build the root agent
pub fn build_root_agent() -> Agent {
    let mut tools = ToolRegistry::new();
    tools.register(GetWeatherTool::new());

    let model = ModelConfig::new(MODEL_ID)
        .with_retry_attempts(MODEL_RETRY_ATTEMPTS)
        .with_temperature(MODEL_TEMPERATURE);

    Agent::new(ROOT_AGENT_NAME, model)
        .with_instruction(INSTRUCTION)
        .with_tools(Arc::new(tools))
}

/// Build the application bundle
pub fn build_app() -> App {
    App::new(APP_NAME, build_root_agent())
}
