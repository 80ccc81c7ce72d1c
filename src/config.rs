//! Engine configuration
//!
//! All environment state is read once at startup into an `EngineConfig`,
//! which is then passed to the components that need it.
//!
//! ```ignore
//! let config = EngineConfig::from_env()?;
//! let engine = AgentEngineApp::initialize(config, app, run_config, platform).await?;
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::{EngineError, EngineResult};

/// Cloud project identifier
pub const ENV_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
/// Cloud region
pub const ENV_LOCATION: &str = "GOOGLE_CLOUD_LOCATION";
/// Platform-assigned engine ID, present only inside the managed runtime
pub const ENV_AGENT_ENGINE_ID: &str = "GOOGLE_CLOUD_AGENT_ENGINE_ID";
/// Bucket for artifacts and logs
pub const ENV_LOGS_BUCKET: &str = "LOGS_BUCKET_NAME";
/// Path of the replicated voice sample
pub const ENV_VOICE_SAMPLE: &str = "VOICE_SAMPLE_PATH";
/// Static OAuth access token for local development
pub const ENV_ACCESS_TOKEN: &str = "GOOGLE_CLOUD_ACCESS_TOKEN";
/// Log output format (`json` or `pretty`)
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
/// Directory for rolling log files
pub const ENV_LOG_DIR: &str = "LOG_DIR";
/// Opt-in for recording message content in telemetry
pub const ENV_CAPTURE_CONTENT: &str = "OTEL_INSTRUMENTATION_GENAI_CAPTURE_MESSAGE_CONTENT";

/// Region used when none is configured
pub const DEFAULT_LOCATION: &str = "us-central1";

/// Voice sample path used when none is configured
pub const DEFAULT_VOICE_SAMPLE: &str = "voice_sample.wav";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format for stderr
    pub format: LogFormat,

    /// Optional directory for daily-rolling log files
    pub log_dir: Option<PathBuf>,
}

/// Telemetry settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Record prompt and response content in traces (off unless enabled)
    pub capture_message_content: bool,
}

/// Snapshot of the environment taken at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cloud project ID
    pub project: String,

    /// Cloud region
    pub location: String,

    /// Engine ID assigned by the hosting platform (managed mode)
    pub agent_engine_id: Option<String>,

    /// Bucket name for managed artifact storage
    pub logs_bucket_name: Option<String>,

    /// Path of the voice sample embedded in the run configuration
    pub voice_sample_path: PathBuf,

    /// Static access token for managed services
    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    /// Logging setup
    pub logging: LoggingConfig,

    /// Telemetry setup
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl EngineConfig {
    /// Create a config for the given project with defaults everywhere else
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            location: DEFAULT_LOCATION.to_string(),
            agent_engine_id: None,
            logs_bucket_name: None,
            voice_sample_path: PathBuf::from(DEFAULT_VOICE_SAMPLE),
            access_token: None,
            logging: LoggingConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Load from the process environment (and `.env` if present)
    pub fn from_env() -> EngineResult<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let project = get(ENV_PROJECT).ok_or_else(|| EngineError::MissingEnv(ENV_PROJECT.into()))?;

        let format = match get(ENV_LOG_FORMAT).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(EngineError::InvalidConfig(format!(
                    "{} must be 'json' or 'pretty', got '{}'",
                    ENV_LOG_FORMAT, other
                )))
            }
        };

        let capture_message_content = match get(ENV_CAPTURE_CONTENT)
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => {
                return Err(EngineError::InvalidConfig(format!(
                    "{} must be 'true' or 'false', got '{}'",
                    ENV_CAPTURE_CONTENT, other
                )))
            }
        };

        Ok(Self {
            project,
            location: get(ENV_LOCATION).unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            agent_engine_id: get(ENV_AGENT_ENGINE_ID),
            logs_bucket_name: get(ENV_LOGS_BUCKET),
            voice_sample_path: get(ENV_VOICE_SAMPLE)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VOICE_SAMPLE)),
            access_token: get(ENV_ACCESS_TOKEN),
            logging: LoggingConfig {
                format,
                log_dir: get(ENV_LOG_DIR).map(PathBuf::from),
            },
            telemetry: TelemetryConfig {
                capture_message_content,
            },
        })
    }

    /// Set the engine ID (enables managed sessions)
    pub fn with_agent_engine_id(mut self, id: impl Into<String>) -> Self {
        self.agent_engine_id = Some(id.into());
        self
    }

    /// Set the artifact bucket (enables managed artifacts)
    pub fn with_logs_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.logs_bucket_name = Some(bucket.into());
        self
    }

    /// Set the region
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Whether the process runs inside the managed hosting environment
    pub fn is_managed(&self) -> bool {
        self.agent_engine_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[(ENV_PROJECT, "my-project")])).unwrap();
        assert_eq!(config.project, "my-project");
        assert_eq!(config.location, DEFAULT_LOCATION);
        assert!(config.agent_engine_id.is_none());
        assert!(config.logs_bucket_name.is_none());
        assert_eq!(config.voice_sample_path, PathBuf::from(DEFAULT_VOICE_SAMPLE));
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.telemetry.capture_message_content);
        assert!(!config.is_managed());
    }

    #[test]
    fn test_capture_content_flag() {
        let config =
            EngineConfig::from_lookup(lookup(&[(ENV_PROJECT, "p"), (ENV_CAPTURE_CONTENT, "TRUE")]))
                .unwrap();
        assert!(config.telemetry.capture_message_content);

        let err =
            EngineConfig::from_lookup(lookup(&[(ENV_PROJECT, "p"), (ENV_CAPTURE_CONTENT, "maybe")]))
                .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(ref m) if m.contains(ENV_CAPTURE_CONTENT)));
    }

    #[test]
    fn test_missing_project_is_fatal() {
        let err = EngineConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, EngineError::MissingEnv(ref k) if k == ENV_PROJECT));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_PROJECT, "p"),
            (ENV_AGENT_ENGINE_ID, ""),
            (ENV_LOGS_BUCKET, "  "),
        ]))
        .unwrap();
        assert!(config.agent_engine_id.is_none());
        assert!(config.logs_bucket_name.is_none());
    }

    #[test]
    fn test_managed_values() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_PROJECT, "p"),
            (ENV_LOCATION, "europe-west4"),
            (ENV_AGENT_ENGINE_ID, "123456"),
            (ENV_LOGS_BUCKET, "my-bucket"),
            (ENV_LOG_FORMAT, "json"),
        ]))
        .unwrap();
        assert_eq!(config.location, "europe-west4");
        assert_eq!(config.agent_engine_id.as_deref(), Some("123456"));
        assert_eq!(config.logs_bucket_name.as_deref(), Some("my-bucket"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.is_managed());
    }

    #[test]
    fn test_invalid_log_format() {
        let err = EngineConfig::from_lookup(lookup(&[(ENV_PROJECT, "p"), (ENV_LOG_FORMAT, "xml")]))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }
}
