//! User feedback records
//!
//! Feedback is validated against a fixed schema and written once to a
//! structured log sink. It is never read back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::core::{EngineError, EngineResult};

/// Record type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    #[default]
    Feedback,
}

/// Service that produced the interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceName {
    #[default]
    #[serde(rename = "bidi-demo")]
    BidiDemo,
}

fn default_text() -> Option<String> {
    Some(String::new())
}

/// Feedback on a prior interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Rating (integer or float)
    pub score: Number,

    #[serde(default = "default_text")]
    pub text: Option<String>,

    /// Invocation the feedback refers to
    pub invocation_id: String,

    #[serde(default)]
    pub log_type: LogType,

    #[serde(default)]
    pub service_name: ServiceName,

    #[serde(default)]
    pub user_id: String,
}

impl Feedback {
    /// Validate an untyped payload
    ///
    /// Unknown fields are ignored; missing or mistyped required fields fail.
    pub fn validate(payload: Value) -> EngineResult<Self> {
        if !payload.is_object() {
            return Err(EngineError::Validation(
                "feedback payload must be an object".into(),
            ));
        }
        serde_json::from_value(payload).map_err(|e| EngineError::Validation(e.to_string()))
    }
}

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// Destination for structured log entries
pub trait StructuredLogSink: Send + Sync {
    fn log_struct(&self, payload: &Value, severity: Severity);
}

/// Writes entries as `tracing` events under a fixed logger name
#[derive(Debug, Clone)]
pub struct TracingLogSink {
    logger: String,
}

impl TracingLogSink {
    pub fn new(logger: impl Into<String>) -> Self {
        Self {
            logger: logger.into(),
        }
    }

    pub fn logger(&self) -> &str {
        &self.logger
    }
}

impl StructuredLogSink for TracingLogSink {
    fn log_struct(&self, payload: &Value, severity: Severity) {
        let logger = self.logger.as_str();
        let severity_name = severity.as_str();
        match severity {
            Severity::Debug => {
                tracing::debug!(logger, severity = severity_name, payload = %payload, "structured log")
            }
            Severity::Info => {
                tracing::info!(logger, severity = severity_name, payload = %payload, "structured log")
            }
            Severity::Warning => {
                tracing::warn!(logger, severity = severity_name, payload = %payload, "structured log")
            }
            Severity::Error => {
                tracing::error!(logger, severity = severity_name, payload = %payload, "structured log")
            }
        }
    }
}

/// Validates feedback and forwards it to a sink
#[derive(Clone)]
pub struct FeedbackLogger {
    sink: Arc<dyn StructuredLogSink>,
}

impl FeedbackLogger {
    pub fn new(sink: Arc<dyn StructuredLogSink>) -> Self {
        Self { sink }
    }

    /// Validate and log; nothing is written when validation fails
    pub fn register(&self, payload: Value) -> EngineResult<Feedback> {
        let feedback = Feedback::validate(payload)?;
        self.sink
            .log_struct(&serde_json::to_value(&feedback)?, Severity::Info);
        Ok(feedback)
    }
}

impl std::fmt::Debug for FeedbackLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackLogger").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Sink that records every entry
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub entries: Mutex<Vec<(Value, Severity)>>,
    }

    impl StructuredLogSink for RecordingSink {
        fn log_struct(&self, payload: &Value, severity: Severity) {
            self.entries
                .lock()
                .unwrap()
                .push((payload.clone(), severity));
        }
    }

    #[test]
    fn test_validate_minimal_payload() {
        let feedback = Feedback::validate(json!({"score": 5, "invocation_id": "inv-1"})).unwrap();
        assert_eq!(feedback.score, Number::from(5));
        assert_eq!(feedback.text.as_deref(), Some(""));
        assert_eq!(feedback.log_type, LogType::Feedback);
        assert_eq!(feedback.service_name, ServiceName::BidiDemo);
        assert_eq!(feedback.user_id, "");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let err = Feedback::validate(json!({"score": 5})).unwrap_err();
        assert!(matches!(err, EngineError::Validation(ref m) if m.contains("invocation_id")));

        let err = Feedback::validate(json!({"invocation_id": "x"})).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_mistyped_fields() {
        let err = Feedback::validate(json!({"score": "great", "invocation_id": "x"})).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = Feedback::validate(json!({
            "score": 1,
            "invocation_id": "x",
            "log_type": "other"
        }))
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = Feedback::validate(json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let feedback = Feedback::validate(json!({
            "score": 4.5,
            "invocation_id": "x",
            "extra": true
        }))
        .unwrap();
        assert_eq!(feedback.score.as_f64(), Some(4.5));
    }

    #[test]
    fn test_logger_writes_valid_feedback() {
        let sink = Arc::new(RecordingSink::default());
        let logger = FeedbackLogger::new(sink.clone());

        logger
            .register(json!({"score": 1, "invocation_id": "inv", "text": "good"}))
            .unwrap();

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, Severity::Info);
        assert_eq!(entries[0].0["text"], "good");
        assert_eq!(entries[0].0["log_type"], "feedback");
        assert_eq!(entries[0].0["service_name"], "bidi-demo");
    }

    #[test]
    fn test_logger_skips_invalid_feedback() {
        let sink = Arc::new(RecordingSink::default());
        let logger = FeedbackLogger::new(sink.clone());

        assert!(logger.register(json!({"text": "no score"})).is_err());
        assert!(sink.entries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingLogSink::new("bidi_agent_engine::engine").log_struct(&json!({"a": 1}), Severity::Info);
    }
}
