//! Run configuration for live sessions
//!
//! Describes the desired response modality and voice. Serialized with serde
//! into the plain JSON form that is injected into the first streamed request.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{EngineError, EngineResult};

/// MIME type of the replicated voice sample
pub const VOICE_SAMPLE_MIME_TYPE: &str = "audio/pcm;rate=24000";

/// Response modality requested from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Audio,
    Text,
}

/// Voice cloned from a reference sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedVoiceConfig {
    pub mime_type: String,
    /// Base64-encoded sample audio
    pub voice_sample_audio: String,
}

/// One of the platform's built-in voices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prebuilt_voice_config: Option<PrebuiltVoiceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicated_voice_config: Option<ReplicatedVoiceConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_config: Option<VoiceConfig>,
}

/// Run configuration for a live invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub response_modalities: Vec<Modality>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

impl RunConfig {
    /// Audio responses spoken in the voice of the given sample
    pub fn with_replicated_voice(sample: &[u8]) -> Self {
        Self {
            response_modalities: vec![Modality::Audio],
            speech_config: Some(SpeechConfig {
                voice_config: Some(VoiceConfig {
                    prebuilt_voice_config: None,
                    replicated_voice_config: Some(ReplicatedVoiceConfig {
                        mime_type: VOICE_SAMPLE_MIME_TYPE.to_string(),
                        voice_sample_audio: BASE64.encode(sample),
                    }),
                }),
            }),
        }
    }

    /// Build from a WAV file on disk
    ///
    /// A missing, empty or non-WAV file is a fatal configuration error.
    pub fn from_voice_sample(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| {
            EngineError::VoiceSample(format!("cannot read {}: {}", path.display(), e))
        })?;

        if data.is_empty() {
            return Err(EngineError::VoiceSample(format!(
                "{} is empty",
                path.display()
            )));
        }
        if !is_wav(&data) {
            return Err(EngineError::VoiceSample(format!(
                "{} is not a RIFF/WAVE file",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), bytes = data.len(), "Loaded voice sample");
        Ok(Self::with_replicated_voice(&data))
    }

    /// Whether audio output was requested
    pub fn wants_audio(&self) -> bool {
        self.response_modalities.contains(&Modality::Audio)
    }

    /// Plain nested-value form
    pub fn to_value(&self) -> EngineResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn is_wav(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn test_wav() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"RIFF");
        data.extend_from_slice(&36u32.to_le_bytes());
        data.extend_from_slice(b"WAVE");
        data.extend_from_slice(b"fmt ");
        data.extend_from_slice(&[0u8; 24]);
        data
    }

    #[test]
    fn test_from_voice_sample() {
        let wav = test_wav();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&wav).unwrap();

        let config = RunConfig::from_voice_sample(file.path()).unwrap();
        assert!(config.wants_audio());

        let replicated = config
            .speech_config
            .unwrap()
            .voice_config
            .unwrap()
            .replicated_voice_config
            .unwrap();
        assert_eq!(replicated.mime_type, VOICE_SAMPLE_MIME_TYPE);
        assert_eq!(BASE64.decode(replicated.voice_sample_audio).unwrap(), wav);
    }

    #[test]
    fn test_missing_sample_is_fatal() {
        let err = RunConfig::from_voice_sample("/nonexistent/voice.wav").unwrap_err();
        assert!(matches!(err, EngineError::VoiceSample(_)));
    }

    #[test]
    fn test_empty_sample_is_fatal() {
        let file = NamedTempFile::new().unwrap();
        let err = RunConfig::from_voice_sample(file.path()).unwrap_err();
        assert!(matches!(err, EngineError::VoiceSample(ref m) if m.contains("empty")));
    }

    #[test]
    fn test_non_wav_sample_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"definitely not audio").unwrap();
        let err = RunConfig::from_voice_sample(file.path()).unwrap_err();
        assert!(matches!(err, EngineError::VoiceSample(ref m) if m.contains("RIFF")));
    }

    #[test]
    fn test_serialized_shape() {
        let value = RunConfig::with_replicated_voice(b"abc").to_value().unwrap();
        assert_eq!(value["response_modalities"], serde_json::json!(["AUDIO"]));
        assert_eq!(
            value["speech_config"]["voice_config"]["replicated_voice_config"]["voice_sample_audio"],
            "YWJj"
        );
        assert!(value["speech_config"]["voice_config"]
            .get("prebuilt_voice_config")
            .is_none());

        let parsed: RunConfig = serde_json::from_value(value).unwrap();
        assert!(parsed.wants_audio());
    }
}
