//! WebSocket protocol tests against an in-process gateway.

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite};

use kani_tts_gateway::core::tts::wav::{decode_wav, pcm_from_le_bytes};

use common::{
    FailingSynthesizer, LongAudioSynthesizer, StallingSynthesizer, connect, ping_request,
    recv_json, send_json, send_raw, spawn_gateway, spawn_gateway_with, stream_request,
    test_config, tts_request, ws_url,
};

fn decode_audio(message: &Value) -> Vec<u8> {
    BASE64_STANDARD
        .decode(message["data"]["audio"].as_str().unwrap())
        .unwrap()
}

/// Collect `tts_stream_chunk` messages until the terminal message.
async fn collect_stream(ws: &mut common::WsStream) -> (Vec<Value>, Value) {
    let mut chunks = Vec::new();
    loop {
        let message = recv_json(ws).await;
        if message["type"] == "tts_stream_chunk" {
            chunks.push(message);
        } else {
            return (chunks, message);
        }
    }
}

#[tokio::test]
async fn test_full_synthesis_returns_wav() {
    let (addr, _) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(
        &mut ws,
        tts_request(
            "Hola",
            json!({"language": "spanish", "emotion": "friendly", "speed": 1.0}),
        ),
    )
    .await;
    let response = recv_json(&mut ws).await;

    assert_eq!(response["type"], "tts_response");
    assert_eq!(response["data"]["status"], "success");
    assert_eq!(response["data"]["message"], "Audio generated successfully");

    let metadata = &response["data"]["metadata"];
    assert_eq!(metadata["language"], "spanish");
    assert_eq!(metadata["emotion"], "friendly");
    assert_eq!(metadata["sample_rate"], 22050);
    assert_eq!(metadata["channels"], 1);
    assert!(metadata["duration"].as_f64().unwrap() > 0.0);

    let wav = decode_audio(&response);
    assert!(!wav.is_empty());
    let (samples, format) = decode_wav(&wav).unwrap();
    assert!(!samples.is_empty());
    assert_eq!(format.sample_rate, 22050);
}

#[tokio::test]
async fn test_case_insensitive_enumerations_echo_canonical_names() {
    let (addr, _) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(
        &mut ws,
        tts_request("Hello", json!({"language": "English", "emotion": "HAPPY"})),
    )
    .await;
    let response = recv_json(&mut ws).await;

    assert_eq!(response["data"]["status"], "success");
    assert_eq!(response["data"]["metadata"]["language"], "english");
    assert_eq!(response["data"]["metadata"]["emotion"], "happy");
}

#[tokio::test]
async fn test_empty_text_is_rejected() {
    let (addr, _) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, tts_request("   ", json!({}))).await;
    let response = recv_json(&mut ws).await;

    assert_eq!(response["type"], "tts_response");
    assert_eq!(response["data"]["status"], "error");
    assert_eq!(response["data"]["message"], "No text provided");
    assert_eq!(response["data"]["audio"], "");
}

#[tokio::test]
async fn test_invalid_language_keeps_connection_usable() {
    let (addr, _) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, tts_request("Hola", json!({"language": "klingon"}))).await;
    let response = recv_json(&mut ws).await;
    assert_eq!(response["data"]["status"], "error");
    assert!(
        response["data"]["message"]
            .as_str()
            .unwrap()
            .contains("klingon")
    );

    send_json(&mut ws, ping_request()).await;
    let pong = recv_json(&mut ws).await;
    assert_eq!(pong["type"], "pong");
    assert_eq!(pong["data"]["status"], "alive");
    assert_eq!(pong["data"]["tts_initialized"], true);
}

#[tokio::test]
async fn test_invalid_emotion_and_speed() {
    let (addr, _) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, tts_request("Hola", json!({"emotion": "bored"}))).await;
    let response = recv_json(&mut ws).await;
    assert_eq!(response["data"]["status"], "error");

    send_json(&mut ws, tts_request("Hola", json!({"speed": 3.5}))).await;
    let response = recv_json(&mut ws).await;
    assert_eq!(response["data"]["status"], "error");
    assert!(response["data"]["message"].as_str().unwrap().contains("speed"));
}

#[tokio::test]
async fn test_generation_budget_is_capped() {
    let (addr, _) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, tts_request("Hola", json!({"max_tokens": 100000000}))).await;
    let response = recv_json(&mut ws).await;
    assert_eq!(response["data"]["status"], "error");
    assert!(
        response["data"]["message"]
            .as_str()
            .unwrap()
            .contains("max_tokens")
    );

    send_json(&mut ws, stream_request("Hola", json!({"chunk_size": 4294967295u32}))).await;
    let response = recv_json(&mut ws).await;
    assert_eq!(response["type"], "tts_response");
    assert!(
        response["data"]["message"]
            .as_str()
            .unwrap()
            .contains("chunk_size")
    );

    send_json(&mut ws, ping_request()).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");
}

#[tokio::test]
async fn test_response_too_large_for_one_frame() {
    let (addr, _) = spawn_gateway_with(test_config(), Arc::new(LongAudioSynthesizer)).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, tts_request("Hola", json!({}))).await;
    let response = recv_json(&mut ws).await;
    assert_eq!(response["type"], "tts_response");
    assert_eq!(response["data"]["status"], "error");
    let message = response["data"]["message"].as_str().unwrap();
    assert!(message.contains("too large"), "{message}");

    send_json(&mut ws, ping_request()).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");
}

#[tokio::test]
async fn test_unresponsive_client_is_disconnected() {
    use futures_util::StreamExt;

    let mut config = test_config();
    config.ws_ping_interval_secs = 1;
    config.ws_ping_timeout_secs = 1;
    let (addr, state) = spawn_gateway(config).await;

    let mut ws = connect(addr).await;
    assert_eq!(state.ws_connection_count(), 1);

    // Not reading means the client never answers the keepalive ping.
    tokio::time::sleep(Duration::from_secs(3)).await;

    let mut closed = false;
    for _ in 0..10 {
        match tokio::time::timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(tungstenite::Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => {
                closed = true;
                break;
            }
            Ok(Some(Ok(_))) => continue,
            Err(_) => break,
        }
    }
    assert!(closed, "server should close a connection that never pongs");

    let mut released = false;
    for _ in 0..50 {
        if state.ws_connection_count() == 0 {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(released, "slot should be released after the keepalive timeout");
}

#[tokio::test]
async fn test_invalid_json_and_unknown_type() {
    let (addr, _) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    send_raw(&mut ws, "this is not json").await;
    let response = recv_json(&mut ws).await;
    assert_eq!(response["type"], "tts_response");
    assert_eq!(response["data"]["message"], "Invalid JSON format");

    send_json(&mut ws, json!({"type": "voice_clone", "data": {}})).await;
    let response = recv_json(&mut ws).await;
    assert_eq!(response["data"]["status"], "error");
    assert_eq!(
        response["data"]["message"],
        "Unknown message type: voice_clone"
    );
}

#[tokio::test]
async fn test_stream_is_ordered_and_matches_full_output() {
    let (addr, _) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;
    let text = "Hola, esto es una prueba de streaming con varias ventanas.";
    let config = json!({"language": "spanish", "emotion": "calm"});

    send_json(&mut ws, stream_request(text, config.clone())).await;
    let (chunks, complete) = collect_stream(&mut ws).await;

    assert!(chunks.len() > 1, "expected several windows");
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk["data"]["status"], "streaming");
        assert_eq!(chunk["data"]["metadata"]["chunk_index"], i as u64);
    }

    assert_eq!(complete["type"], "tts_stream_complete");
    assert_eq!(complete["data"]["status"], "completed");
    assert_eq!(complete["data"]["message"], "Audio streaming completed");
    assert_eq!(complete["data"]["metadata"]["chunks"], chunks.len() as u64);

    // Exactly one terminal message: the next reply answers the next request
    send_json(&mut ws, ping_request()).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");

    let streamed: Vec<i16> = chunks
        .iter()
        .flat_map(|chunk| pcm_from_le_bytes(&decode_audio(chunk)))
        .collect();

    send_json(&mut ws, tts_request(text, config)).await;
    let full = recv_json(&mut ws).await;
    let (samples, _) = decode_wav(&decode_audio(&full)).unwrap();

    assert_eq!(streamed, samples);
}

#[tokio::test]
async fn test_oversize_chunks_are_split() {
    let mut config = test_config();
    config.ws_max_chunk_size = 1000;
    let (addr, _) = spawn_gateway(config).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, stream_request("Hola", json!({}))).await;
    let (chunks, complete) = collect_stream(&mut ws).await;

    // Four frames of 1764 samples, 500 samples per message
    assert_eq!(chunks.len(), 15);
    for (i, chunk) in chunks.iter().enumerate() {
        let metadata = &chunk["data"]["metadata"];
        assert_eq!(metadata["chunk_index"], i as u64);
        assert!(metadata["chunk_size"].as_u64().unwrap() <= 1000);
        assert_eq!(
            decode_audio(chunk).len() as u64,
            metadata["chunk_size"].as_u64().unwrap()
        );
    }
    assert_eq!(complete["data"]["metadata"]["chunks"], 15);
}

#[tokio::test]
async fn test_engine_failure_is_reported() {
    let (addr, _) = spawn_gateway_with(test_config(), Arc::new(FailingSynthesizer)).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, tts_request("Hola", json!({}))).await;
    let response = recv_json(&mut ws).await;
    assert_eq!(response["data"]["status"], "error");
    let message = response["data"]["message"].as_str().unwrap();
    assert!(message.starts_with("Generation error:"), "{message}");
    assert!(message.contains("model crashed"));

    // A stream that breaks midway ends with an error and no completion
    send_json(&mut ws, stream_request("Hola", json!({}))).await;
    let (chunks, terminal) = collect_stream(&mut ws).await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(terminal["type"], "tts_response");
    assert_eq!(terminal["data"]["status"], "error");

    send_json(&mut ws, ping_request()).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");
}

#[tokio::test]
async fn test_stalled_stream_times_out() {
    let mut config = test_config();
    config.ws_chunk_timeout_secs = 1;
    let (addr, _) = spawn_gateway_with(config, Arc::new(StallingSynthesizer)).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, stream_request("Hola", json!({}))).await;
    let (chunks, terminal) = collect_stream(&mut ws).await;

    assert_eq!(chunks.len(), 1);
    assert_eq!(terminal["data"]["status"], "error");
    assert_eq!(terminal["data"]["message"], "Generation timeout");
}

#[tokio::test]
async fn test_binary_frames_are_answered_with_error() {
    use futures_util::SinkExt;

    let (addr, _) = spawn_gateway(test_config()).await;
    let mut ws = connect(addr).await;

    ws.send(tungstenite::Message::Binary(vec![1u8, 2, 3].into()))
        .await
        .unwrap();
    let response = recv_json(&mut ws).await;
    assert_eq!(response["data"]["status"], "error");

    send_json(&mut ws, ping_request()).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");
}

#[tokio::test]
async fn test_ws_alias_route() {
    let (addr, _) = spawn_gateway(test_config()).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    send_json(&mut ws, ping_request()).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");
}

#[tokio::test]
async fn test_per_ip_connection_limit() {
    let mut config = test_config();
    config.max_connections_per_ip = 1;
    let (addr, state) = spawn_gateway(config).await;

    let _first = connect(addr).await;
    assert_eq!(state.ws_connection_count(), 1);

    match connect_async(ws_url(addr)).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 429),
        Err(e) => panic!("expected HTTP 429, got {e}"),
        Ok(_) => panic!("second connection should be refused"),
    }
}

#[tokio::test]
async fn test_global_connection_limit() {
    let mut config = test_config();
    config.max_websocket_connections = Some(1);
    let (addr, _) = spawn_gateway(config).await;

    let _first = connect(addr).await;

    match connect_async(ws_url(addr)).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 503),
        Err(e) => panic!("expected HTTP 503, got {e}"),
        Ok(_) => panic!("second connection should be refused"),
    }
}

#[tokio::test]
async fn test_connection_slot_released_on_close() {
    let mut config = test_config();
    config.max_connections_per_ip = 1;
    let (addr, state) = spawn_gateway(config).await;

    let mut first = connect(addr).await;
    first.close(None).await.unwrap();
    drop(first);

    let mut released = false;
    for _ in 0..50 {
        if state.ws_connection_count() == 0 {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(released, "slot should be released after the socket ends");

    let mut second = connect(addr).await;
    send_json(&mut second, ping_request()).await;
    assert_eq!(recv_json(&mut second).await["type"], "pong");
}
