//! Built-in tone engine.
//!
//! A deterministic stand-in for the neural model: every character of the
//! input becomes one codec frame carrying a pitch and an amplitude, and the
//! frame decoder renders a sine tone that glides from the previous frame's
//! pitch. Pitch is keyed by language, loudness by emotion, and the frame count
//! shrinks with higher speed. Because a frame only depends on its predecessor,
//! windowed decoding with any lookback of one or more frames reproduces the
//! one-shot output exactly.

use std::f32::consts::PI;

use async_trait::async_trait;
use tracing::debug;

use crate::protocol::{Emotion, Language};

use super::base::{
    AudioChunk, AudioChunkStream, AudioFormat, SynthesisConfig, SynthesizedAudio, Synthesizer,
    TTSError, TTSResult,
};
use super::window::{FrameDecoder, FrameWindow};

/// Portion of each frame spent gliding from the previous frame.
const GLIDE_FRACTION: usize = 4;

/// Semitone steps cycled through by consecutive character classes.
const SCALE_STEPS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneFrame {
    pub frequency_hz: f32,
    pub amplitude: f32,
}

fn base_frequency(language: Language) -> f32 {
    match language {
        Language::Spanish => 220.0,
        Language::English => 196.0,
        Language::French => 246.9,
        Language::German => 174.6,
        Language::Italian => 261.6,
        Language::Portuguese => 233.1,
    }
}

fn emotion_amplitude(emotion: Emotion) -> f32 {
    match emotion {
        Emotion::Neutral => 0.30,
        Emotion::Friendly => 0.32,
        Emotion::Happy => 0.36,
        Emotion::Excited => 0.42,
        Emotion::Calm => 0.22,
        Emotion::Sad => 0.20,
        Emotion::Angry => 0.45,
        Emotion::Professional => 0.28,
    }
}

/// Number of frames generated for `char_count` characters.
fn frame_count(char_count: usize, config: &SynthesisConfig) -> usize {
    let scaled = (char_count as f32 / config.speed).ceil() as usize;
    scaled.clamp(1, config.max_frames())
}

/// Expand text into codec frames.
pub fn plan_frames(text: &str, config: &SynthesisConfig) -> Vec<ToneFrame> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let base = base_frequency(config.language);
    let amplitude = emotion_amplitude(config.emotion);

    (0..frame_count(chars.len(), config))
        .map(|i| {
            let index = ((i as f32 * config.speed) as usize).min(chars.len() - 1);
            let c = chars[index];
            if c.is_whitespace() || c.is_ascii_punctuation() {
                ToneFrame {
                    frequency_hz: base,
                    amplitude: 0.0,
                }
            } else {
                let step = (c.to_lowercase().next().unwrap_or(c) as u32) % SCALE_STEPS;
                ToneFrame {
                    frequency_hz: base * 2f32.powf(step as f32 / SCALE_STEPS as f32),
                    amplitude,
                }
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct ToneDecoder {
    format: AudioFormat,
}

impl ToneDecoder {
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }
}

impl FrameDecoder for ToneDecoder {
    type Frame = ToneFrame;

    fn samples_per_frame(&self) -> usize {
        self.format.samples_per_frame() * self.format.channels.max(1) as usize
    }

    fn decode(&self, first_index: usize, frames: &[ToneFrame]) -> Vec<i16> {
        let per_channel = self.format.samples_per_frame();
        let channels = self.format.channels.max(1) as usize;
        let glide = (per_channel / GLIDE_FRACTION).max(1);
        let sample_rate = self.format.sample_rate as f64;

        let mut out = Vec::with_capacity(frames.len() * per_channel * channels);
        for (i, frame) in frames.iter().enumerate() {
            let prev = if i > 0 { frames[i - 1] } else { *frame };
            let frame_start = (first_index + i) * per_channel;

            for n in 0..per_channel {
                let (frequency, amplitude) = if n < glide {
                    let t = n as f32 / glide as f32;
                    (
                        prev.frequency_hz + (frame.frequency_hz - prev.frequency_hz) * t,
                        prev.amplitude + (frame.amplitude - prev.amplitude) * t,
                    )
                } else {
                    (frame.frequency_hz, frame.amplitude)
                };

                // Phase from the absolute sample position keeps windows aligned.
                let seconds = ((frame_start + n) as f64 / sample_rate).fract() as f32;
                let value = amplitude * (2.0 * PI * frequency * seconds).sin();
                let sample = (value * i16::MAX as f32) as i16;
                for _ in 0..channels {
                    out.push(sample);
                }
            }
        }
        out
    }
}

/// Engine that renders text as tones, used when no model server is configured.
#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    format: AudioFormat,
}

impl ToneSynthesizer {
    pub fn new(format: AudioFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl Synthesizer for ToneSynthesizer {
    fn name(&self) -> &'static str {
        "tone"
    }

    fn audio_format(&self) -> AudioFormat {
        self.format
    }

    async fn synthesize(
        &self,
        text: &str,
        config: &SynthesisConfig,
        reference_audio: Option<&[u8]>,
    ) -> TTSResult<SynthesizedAudio> {
        if let Some(reference) = reference_audio {
            debug!(
                bytes = reference.len(),
                "Tone engine ignores reference audio"
            );
        }

        let frames = plan_frames(text, config);
        let frame_count = frames.len();
        let decoder = ToneDecoder::new(self.format);
        let samples = tokio::task::spawn_blocking(move || decoder.decode(0, &frames))
            .await
            .map_err(|e| TTSError::GenerationFailed(format!("Tone rendering aborted: {e}")))?;
        debug!(
            frames = frame_count,
            samples = samples.len(),
            "Tone synthesis complete"
        );

        Ok(SynthesizedAudio {
            samples,
            format: self.format,
        })
    }

    async fn synthesize_stream(
        &self,
        text: &str,
        config: &SynthesisConfig,
        reference_audio: Option<&[u8]>,
    ) -> TTSResult<AudioChunkStream> {
        if let Some(reference) = reference_audio {
            debug!(
                bytes = reference.len(),
                "Tone engine ignores reference audio"
            );
        }

        let frames = plan_frames(text, config);
        let format = self.format;
        let mut window = FrameWindow::new(
            ToneDecoder::new(format),
            config.chunk_size as usize,
            config.lookback_frames as usize,
        );

        let stream = async_stream::stream! {
            for frame in frames {
                if let Some(samples) = window.push(frame) {
                    yield Ok(AudioChunk { samples, format });
                    tokio::task::yield_now().await;
                }
            }
            if let Some(samples) = window.finish() {
                yield Ok(AudioChunk { samples, format });
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_frame_count_scales_with_speed() {
        let config = SynthesisConfig::default();
        assert_eq!(plan_frames("Hola mundo", &config).len(), 10);

        let fast = SynthesisConfig {
            speed: 2.0,
            ..Default::default()
        };
        assert_eq!(plan_frames("Hola mundo", &fast).len(), 5);

        let slow = SynthesisConfig {
            speed: 0.5,
            ..Default::default()
        };
        assert_eq!(plan_frames("Hola mundo", &slow).len(), 20);
    }

    #[test]
    fn test_frame_count_capped_by_tokens() {
        let config = SynthesisConfig {
            max_tokens: 8,
            ..Default::default()
        };
        assert_eq!(plan_frames("a much longer sentence", &config).len(), 2);
    }

    #[test]
    fn test_whitespace_is_silent() {
        let frames = plan_frames("a b", &SynthesisConfig::default());
        assert!(frames[0].amplitude > 0.0);
        assert_eq!(frames[1].amplitude, 0.0);
    }

    #[test]
    fn test_language_changes_pitch() {
        let spanish = plan_frames("a", &SynthesisConfig::default());
        let english = plan_frames(
            "a",
            &SynthesisConfig {
                language: Language::English,
                ..Default::default()
            },
        );
        assert_ne!(spanish[0].frequency_hz, english[0].frequency_hz);
    }

    #[tokio::test]
    async fn test_full_synthesis_length() {
        let engine = ToneSynthesizer::new(AudioFormat::default());
        let audio = engine
            .synthesize("Hola", &SynthesisConfig::default(), None)
            .await
            .unwrap();
        assert_eq!(audio.samples.len(), 4 * 1764);
        assert!(audio.samples.iter().any(|s| *s != 0));
        assert!((audio.duration() - 0.32).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stream_matches_full_synthesis() {
        let engine = ToneSynthesizer::new(AudioFormat::default());
        let config = SynthesisConfig {
            chunk_size: 3,
            lookback_frames: 2,
            ..Default::default()
        };
        let text = "Hola, ¿cómo estás?";

        let full = engine.synthesize(text, &config, None).await.unwrap();
        let chunks: Vec<AudioChunk> = engine
            .synthesize_stream(text, &config, None)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert!(chunks.len() > 1);
        assert!(
            chunks[..chunks.len() - 1]
                .iter()
                .all(|c| c.samples.len() == 3 * 1764)
        );
        let streamed: Vec<i16> = chunks.into_iter().flat_map(|c| c.samples).collect();
        assert_eq!(streamed, full.samples);
    }
}
