//! Remote model engine.
//!
//! Talks to a model server over HTTP:
//!
//! - `POST {url}/synthesize` returns the whole utterance as raw little-endian
//!   int16 PCM.
//! - `POST {url}/synthesize/stream` returns the same PCM as a chunked body,
//!   which is regrouped here into windows of `chunk_size` frames.
//!
//! Both endpoints take the same JSON body describing the text and the
//! synthesis parameters.

use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;
use zeroize::Zeroizing;

use super::base::{
    AudioChunk, AudioChunkStream, AudioFormat, EngineOptions, SynthesisConfig, SynthesizedAudio,
    Synthesizer, TTSError, TTSResult,
};
use super::wav::pcm_from_le_bytes;

const SYNTHESIZE_PATH: &str = "synthesize";
const STREAM_PATH: &str = "synthesize/stream";

/// Engine backed by a model server reachable over HTTP.
pub struct HttpSynthesizer {
    client: Client,
    base_url: Url,
    api_key: Option<Zeroizing<String>>,
    request_timeout: Duration,
    format: AudioFormat,
}

impl HttpSynthesizer {
    pub fn new(options: EngineOptions) -> TTSResult<Self> {
        let raw_url = options.url.as_deref().ok_or_else(|| {
            TTSError::InvalidConfiguration("HTTP engine requires an engine URL".to_string())
        })?;

        let mut base_url = Url::parse(raw_url).map_err(|e| {
            TTSError::InvalidConfiguration(format!("Invalid engine URL '{raw_url}': {e}"))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(TTSError::InvalidConfiguration(format!(
                "Engine URL must use http or https, got '{}'",
                base_url.scheme()
            )));
        }
        // Url::join replaces the last segment unless the path ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = Client::builder();
        if !options.request_timeout.is_zero() {
            builder = builder.connect_timeout(options.request_timeout);
        }
        let client = builder
            .build()
            .map_err(|e| {
                TTSError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url,
            api_key: options.api_key,
            request_timeout: options.request_timeout,
            format: options.format,
        })
    }

    fn endpoint(&self, path: &str) -> TTSResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| TTSError::InvalidConfiguration(format!("Invalid engine path: {e}")))
    }

    fn request_body(
        &self,
        text: &str,
        config: &SynthesisConfig,
        reference_audio: Option<&[u8]>,
    ) -> Value {
        let mut body = json!({
            "text": text,
            "language": config.language.as_str(),
            "emotion": config.emotion.as_str(),
            "speed": config.speed,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "max_tokens": config.max_tokens,
            "chunk_size": config.chunk_size,
            "lookback_frames": config.lookback_frames,
            "voice_id": config.voice_id,
            "sample_rate": self.format.sample_rate,
        });
        if let Some(reference) = reference_audio {
            body["reference_audio"] = json!(BASE64_STANDARD.encode(reference));
        }
        body
    }

    async fn post(
        &self,
        path: &str,
        body: &Value,
        timeout: Option<Duration>,
    ) -> TTSResult<Response> {
        let url = self.endpoint(path)?;
        let mut request = self.client.post(url).json(body);
        if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
            request = request.timeout(timeout);
        }
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TTSError::Timeout(format!("Engine request timed out: {e}"))
            } else {
                TTSError::NetworkError(format!("Engine request failed: {e}"))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TTSError::GenerationFailed(format!(
                "Engine returned status {status}: {body}"
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    fn name(&self) -> &'static str {
        "http"
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
        let body = self.request_body(text, config, reference_audio);
        let response = self
            .post(SYNTHESIZE_PATH, &body, Some(self.request_timeout))
            .await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TTSError::NetworkError(format!("Failed to read engine audio: {e}")))?;
        if bytes.len() % 2 != 0 {
            warn!(len = bytes.len(), "Engine returned an odd number of PCM bytes");
        }

        let samples = pcm_from_le_bytes(&bytes);
        if samples.is_empty() {
            return Err(TTSError::GenerationFailed(
                "Engine returned no audio".to_string(),
            ));
        }

        debug!(samples = samples.len(), "Engine synthesis complete");
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
        let body = self.request_body(text, config, reference_audio);
        let response = self.post(STREAM_PATH, &body, None).await?;

        let format = self.format;
        let window_bytes = (config.chunk_size.max(1) as usize)
            .saturating_mul(format.samples_per_frame() * format.bytes_per_frame());
        let mut body_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(item) = body_stream.next().await {
                match item {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        while buffer.len() >= window_bytes {
                            let rest = buffer.split_off(window_bytes);
                            let window = std::mem::replace(&mut buffer, rest);
                            yield Ok(AudioChunk { samples: pcm_from_le_bytes(&window), format });
                        }
                    }
                    Err(e) => {
                        yield Err(TTSError::NetworkError(format!("Engine stream interrupted: {e}")));
                        return;
                    }
                }
            }
            if buffer.len() % 2 != 0 {
                warn!(len = buffer.len(), "Engine stream ended on a partial sample");
            }
            let samples = pcm_from_le_bytes(&buffer);
            if !samples.is_empty() {
                yield Ok(AudioChunk { samples, format });
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(url: Option<&str>) -> EngineOptions {
        EngineOptions {
            url: url.map(str::to_string),
            api_key: None,
            request_timeout: Duration::from_secs(5),
            format: AudioFormat::default(),
        }
    }

    #[test]
    fn test_requires_url() {
        let err = HttpSynthesizer::new(options(None)).err().unwrap();
        assert!(matches!(err, TTSError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let err = HttpSynthesizer::new(options(Some("ftp://model.local")))
            .err()
            .unwrap();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_endpoint_preserves_base_path() {
        let engine = HttpSynthesizer::new(options(Some("http://model.local:9000/v1"))).unwrap();
        assert_eq!(
            engine.endpoint(STREAM_PATH).unwrap().as_str(),
            "http://model.local:9000/v1/synthesize/stream"
        );
    }

    #[test]
    fn test_request_body_fields() {
        let engine = HttpSynthesizer::new(options(Some("http://model.local"))).unwrap();
        let body = engine.request_body("Hola", &SynthesisConfig::default(), Some(&[1, 2, 3]));
        assert_eq!(body["text"], "Hola");
        assert_eq!(body["language"], "spanish");
        assert_eq!(body["max_tokens"], 1200);
        assert_eq!(body["sample_rate"], 22050);
        assert_eq!(body["reference_audio"], "AQID");
    }
}
