//! Deployment preflight
//!
//! Resolves the startup configuration exactly as the deployed engine does
//! (environment, voice sample, backend selection) and prints the deployment
//! descriptor the hosting platform's router consumes.

use bidi_agent_engine::agent::{build_app, RunConfig};
use bidi_agent_engine::config::EngineConfig;
use bidi_agent_engine::engine::register_operations;
use bidi_agent_engine::logging;
use bidi_agent_engine::platform::adk_default_operations;
use bidi_agent_engine::services::{ArtifactBackend, SessionBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;

    // Initialize logging system
    let _guard = logging::init_logging(&config.logging);

    tracing::info!("=== Agent Engine Preflight ===");

    // Missing or malformed voice sample is fatal
    let run_config = RunConfig::from_voice_sample(&config.voice_sample_path)?;

    let session_backend = SessionBackend::select(&config);
    let artifact_backend = ArtifactBackend::select(&config);

    let app = session_backend.bind_app(build_app());

    let agent = app.root_agent();
    let descriptor = serde_json::json!({
        "app_name": app.name(),
        "agent": {
            "name": agent.name(),
            "model": agent.model(),
            "tools": agent.tool_declarations(),
        },
        "response_modalities": run_config.response_modalities,
        "session_backend": session_backend,
        "artifact_backend": artifact_backend,
        "operations": register_operations(adk_default_operations()),
    });

    println!("{}", serde_json::to_string_pretty(&descriptor)?);

    tracing::info!("=== Preflight Complete ===");

    Ok(())
}
