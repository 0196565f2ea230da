//! Shared helpers for gateway integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use kani_tts_gateway::{
    ServerConfig,
    core::tts::{
        AudioChunk, AudioChunkStream, AudioFormat, SynthesisConfig, SynthesizedAudio, Synthesizer,
        TTSError, TTSResult,
    },
    routes,
    state::AppState,
};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default configuration bound to loopback.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config
}

/// Start the gateway with the engine named in `config`.
pub async fn spawn_gateway(config: ServerConfig) -> (SocketAddr, Arc<AppState>) {
    let state = AppState::new(config).expect("engine should initialize");
    (serve(Arc::clone(&state)).await, state)
}

/// Start the gateway around a custom engine.
pub async fn spawn_gateway_with(
    config: ServerConfig,
    synthesizer: Arc<dyn Synthesizer>,
) -> (SocketAddr, Arc<AppState>) {
    let state = AppState::with_synthesizer(config, synthesizer);
    (serve(Arc::clone(&state)).await, state)
}

async fn serve(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();
    let app = routes::create_app(state);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

pub fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{addr}/")
}

pub async fn connect(addr: SocketAddr) -> WsStream {
    let (ws, _) = connect_async(ws_url(addr))
        .await
        .expect("WebSocket handshake should succeed");
    ws
}

pub async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send should succeed");
}

pub async fn send_raw(ws: &mut WsStream, text: &str) {
    ws.send(Message::Text(text.to_string().into()))
        .await
        .expect("send should succeed");
}

/// Next JSON text message, skipping control frames.
pub async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed")
            .expect("WebSocket error");
        match frame {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("server sent invalid JSON");
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

pub fn tts_request(text: &str, config: Value) -> Value {
    serde_json::json!({
        "type": "tts_request",
        "data": { "text": text, "config": config }
    })
}

pub fn stream_request(text: &str, config: Value) -> Value {
    serde_json::json!({
        "type": "tts_stream_request",
        "data": { "text": text, "config": config }
    })
}

pub fn ping_request() -> Value {
    serde_json::json!({ "type": "ping", "data": {} })
}

/// Engine that always fails full synthesis and breaks streams after one chunk.
pub struct FailingSynthesizer;

#[async_trait]
impl Synthesizer for FailingSynthesizer {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn audio_format(&self) -> AudioFormat {
        AudioFormat::default()
    }

    async fn synthesize(
        &self,
        _text: &str,
        _config: &SynthesisConfig,
        _reference_audio: Option<&[u8]>,
    ) -> TTSResult<SynthesizedAudio> {
        Err(TTSError::GenerationFailed("model crashed".to_string()))
    }

    async fn synthesize_stream(
        &self,
        _text: &str,
        _config: &SynthesisConfig,
        _reference_audio: Option<&[u8]>,
    ) -> TTSResult<AudioChunkStream> {
        let items = vec![
            Ok(silence(441)),
            Err(TTSError::GenerationFailed("model crashed".to_string())),
        ];
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Engine whose stream yields one chunk and then never finishes.
pub struct StallingSynthesizer;

#[async_trait]
impl Synthesizer for StallingSynthesizer {
    fn name(&self) -> &'static str {
        "stalling"
    }

    fn audio_format(&self) -> AudioFormat {
        AudioFormat::default()
    }

    async fn synthesize(
        &self,
        _text: &str,
        _config: &SynthesisConfig,
        _reference_audio: Option<&[u8]>,
    ) -> TTSResult<SynthesizedAudio> {
        Ok(SynthesizedAudio {
            samples: vec![0; 441],
            format: AudioFormat::default(),
        })
    }

    async fn synthesize_stream(
        &self,
        _text: &str,
        _config: &SynthesisConfig,
        _reference_audio: Option<&[u8]>,
    ) -> TTSResult<AudioChunkStream> {
        let first = futures::stream::iter(vec![Ok::<_, TTSError>(silence(441))]);
        Ok(Box::pin(first.chain(futures::stream::pending())))
    }
}

/// Engine that returns more audio than fits in one `tts_response` frame.
pub struct LongAudioSynthesizer;

#[async_trait]
impl Synthesizer for LongAudioSynthesizer {
    fn name(&self) -> &'static str {
        "long_audio"
    }

    fn audio_format(&self) -> AudioFormat {
        AudioFormat::default()
    }

    async fn synthesize(
        &self,
        _text: &str,
        _config: &SynthesisConfig,
        _reference_audio: Option<&[u8]>,
    ) -> TTSResult<SynthesizedAudio> {
        // 14 MB of PCM grows past 16 MB once base64 encoded.
        Ok(SynthesizedAudio {
            samples: vec![0; 7_000_000],
            format: AudioFormat::default(),
        })
    }

    async fn synthesize_stream(
        &self,
        _text: &str,
        _config: &SynthesisConfig,
        _reference_audio: Option<&[u8]>,
    ) -> TTSResult<AudioChunkStream> {
        Ok(Box::pin(futures::stream::iter(vec![Ok(silence(441))])))
    }
}

fn silence(samples: usize) -> AudioChunk {
    AudioChunk {
        samples: vec![0; samples],
        format: AudioFormat::default(),
    }
}
