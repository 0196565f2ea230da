//! Request validation for the TTS protocol.
//!
//! Incoming synthesis requests carry loosely typed configuration (strings and
//! numbers straight from JSON). This module resolves them against the server
//! defaults into a [`SynthesisConfig`] and rejects anything outside the
//! supported ranges before the engine is touched.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::tts::{SynthesisConfig, TOKENS_PER_FRAME};

use super::messages::{SynthesisOptions, SynthesisRequestData};

/// Accepted playback speed multipliers.
pub const SPEED_RANGE: RangeInclusive<f32> = 0.5..=2.0;

/// Upper bound for sampling temperature. Zero is rejected separately.
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Upper bound for the per-request token budget.
pub const MAX_TOKENS: u32 = 4096;

/// Upper bound for `chunk_size` and `lookback_frames`.
pub const MAX_WINDOW_FRAMES: u32 = MAX_TOKENS / TOKENS_PER_FRAME;

/// Validation failures for synthesis requests.
///
/// The `Display` text is sent verbatim to the client in the `message` field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("No text provided")]
    MissingText,
    #[error("Text too large: {size} bytes (max {max})")]
    TextTooLarge { size: usize, max: usize },
    #[error("Unsupported language: {value}. Supported languages: {supported}")]
    UnsupportedLanguage { value: String, supported: String },
    #[error("Unsupported emotion: {value}. Supported emotions: {supported}")]
    UnsupportedEmotion { value: String, supported: String },
    #[error("Invalid {field}: {value} (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("Invalid reference audio: {0}")]
    InvalidReferenceAudio(String),
}

/// Languages the model can be asked to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Spanish,
    English,
    French,
    German,
    Italian,
    Portuguese,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Spanish,
        Language::English,
        Language::French,
        Language::German,
        Language::Italian,
        Language::Portuguese,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Language::Spanish => "spanish",
            Language::English => "english",
            Language::French => "french",
            Language::German => "german",
            Language::Italian => "italian",
            Language::Portuguese => "portuguese",
        }
    }

    fn supported() -> String {
        Self::ALL.map(|l| l.as_str()).join(", ")
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnsupportedLanguage {
                value: s.to_string(),
                supported: Self::supported(),
            })
    }
}

/// Emotional tone applied to the generated speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Friendly,
    Happy,
    Excited,
    Calm,
    Sad,
    Angry,
    Professional,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Neutral,
        Emotion::Friendly,
        Emotion::Happy,
        Emotion::Excited,
        Emotion::Calm,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Professional,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Friendly => "friendly",
            Emotion::Happy => "happy",
            Emotion::Excited => "excited",
            Emotion::Calm => "calm",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Professional => "professional",
        }
    }

    fn supported() -> String {
        Self::ALL.map(|e| e.as_str()).join(", ")
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnsupportedEmotion {
                value: s.to_string(),
                supported: Self::supported(),
            })
    }
}

/// A synthesis request that passed validation and is ready for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub text: String,
    pub reference_audio: Option<Vec<u8>>,
    pub config: SynthesisConfig,
}

impl SynthesisRequestData {
    /// Validate the request and resolve its configuration over `defaults`.
    ///
    /// Text is checked first so an empty request always yields
    /// "No text provided" regardless of what else is wrong with it.
    pub fn validate(
        &self,
        defaults: &SynthesisConfig,
        max_text_length: usize,
    ) -> Result<ValidatedRequest, ValidationError> {
        if self.text.trim().is_empty() {
            return Err(ValidationError::MissingText);
        }
        if self.text.len() > max_text_length {
            return Err(ValidationError::TextTooLarge {
                size: self.text.len(),
                max: max_text_length,
            });
        }

        let config = self.config.resolve(defaults)?;

        let reference_audio = match self.reference_audio.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(encoded) => Some(
                BASE64_STANDARD
                    .decode(encoded)
                    .map_err(|e| ValidationError::InvalidReferenceAudio(e.to_string()))?,
            ),
        };

        Ok(ValidatedRequest {
            text: self.text.clone(),
            reference_audio,
            config,
        })
    }
}

impl SynthesisOptions {
    /// Resolve wire options over `defaults`. Missing fields inherit the
    /// default, present fields are parsed and range checked.
    pub fn resolve(&self, defaults: &SynthesisConfig) -> Result<SynthesisConfig, ValidationError> {
        let mut config = defaults.clone();

        if let Some(language) = &self.language {
            config.language = language.parse()?;
        }
        if let Some(emotion) = &self.emotion {
            config.emotion = emotion.parse()?;
        }
        if let Some(speed) = self.speed {
            config.speed = speed;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(top_p) = self.top_p {
            config.top_p = top_p;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(lookback_frames) = self.lookback_frames {
            config.lookback_frames = lookback_frames;
        }
        if let Some(voice_id) = &self.voice_id
            && !voice_id.trim().is_empty()
        {
            config.voice_id = voice_id.trim().to_string();
        }

        validate_synthesis_config(&config)?;
        Ok(config)
    }
}

/// Range checks shared by request validation and server config validation.
pub fn validate_synthesis_config(config: &SynthesisConfig) -> Result<(), ValidationError> {
    if !config.speed.is_finite() || !SPEED_RANGE.contains(&config.speed) {
        return Err(ValidationError::OutOfRange {
            field: "speed",
            value: config.speed.to_string(),
            expected: "a value between 0.5 and 2.0",
        });
    }
    if !config.temperature.is_finite()
        || config.temperature <= 0.0
        || config.temperature > MAX_TEMPERATURE
    {
        return Err(ValidationError::OutOfRange {
            field: "temperature",
            value: config.temperature.to_string(),
            expected: "a value greater than 0.0 and at most 2.0",
        });
    }
    if !config.top_p.is_finite() || config.top_p <= 0.0 || config.top_p > 1.0 {
        return Err(ValidationError::OutOfRange {
            field: "top_p",
            value: config.top_p.to_string(),
            expected: "a value greater than 0.0 and at most 1.0",
        });
    }
    if config.max_tokens == 0 || config.max_tokens > MAX_TOKENS {
        return Err(ValidationError::OutOfRange {
            field: "max_tokens",
            value: config.max_tokens.to_string(),
            expected: "a value between 1 and 4096",
        });
    }
    if config.chunk_size == 0 || config.chunk_size > MAX_WINDOW_FRAMES {
        return Err(ValidationError::OutOfRange {
            field: "chunk_size",
            value: config.chunk_size.to_string(),
            expected: "between 1 and 1024 frames",
        });
    }
    if config.lookback_frames > MAX_WINDOW_FRAMES {
        return Err(ValidationError::OutOfRange {
            field: "lookback_frames",
            value: config.lookback_frames.to_string(),
            expected: "at most 1024 frames",
        });
    }
    Ok(())
}
