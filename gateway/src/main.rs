use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use tokio::net::{TcpListener, lookup_host};
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kani_tts_gateway::{
    ServerConfig,
    client::{AssistantVoice, ClientConfig, TtsClient, config::DEFAULT_URL},
    core::tts::{AudioFormat, wav::encode_wav},
    protocol::{Emotion, Language, SynthesisOptions},
    routes,
    state::AppState,
};

/// Kani TTS Gateway - WebSocket text-to-speech server
#[derive(Parser, Debug)]
#[command(name = "kani-tts-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway
    Serve,

    /// Check that a gateway answers pings
    Ping {
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },

    /// Synthesize text through a running gateway
    Speak {
        #[arg(short, long)]
        text: String,

        /// Stream chunks instead of waiting for the full file
        #[arg(long)]
        stream: bool,

        /// Where to write the WAV file
        #[arg(short, long, default_value = "tts_output.wav")]
        output: PathBuf,

        #[arg(long)]
        language: Option<Language>,

        #[arg(long)]
        emotion: Option<Emotion>,

        #[arg(long)]
        speed: Option<f32>,

        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Needed before any TLS connection, server or client side
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.config).await,
        Commands::Ping { url } => ping(url).await,
        Commands::Speak {
            text,
            stream,
            output,
            language,
            emotion,
            speed,
            url,
        } => {
            let mut overrides = SynthesisOptions::default();
            if let Some(language) = language {
                overrides = overrides.with_language(language);
            }
            if let Some(emotion) = emotion {
                overrides = overrides.with_emotion(emotion);
            }
            if let Some(speed) = speed {
                overrides = overrides.with_speed(speed);
            }
            speak(url, &text, &overrides, stream, output).await
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = if let Some(config_path) = config_path {
        info!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    let address = config.address();
    let tls_config = config.tls.clone();
    let rate_limit_rps = config.rate_limit_requests_per_second;
    let rate_limit_burst = config.rate_limit_burst_size;

    let app_state =
        AppState::new(config).map_err(|e| anyhow!("Failed to initialize TTS engine: {}", e))?;

    // Rate limiting is off when the rate is 0
    let governor_layer = if rate_limit_rps > 0 {
        let governor_config = GovernorConfigBuilder::default()
            .per_second(rate_limit_rps as u64)
            .burst_size(rate_limit_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow!("Invalid rate limit configuration"))?;
        Some(GovernorLayer::new(governor_config))
    } else {
        info!("Rate limiting disabled");
        None
    };

    let app = routes::create_app(Arc::clone(&app_state))
        .layer(tower::util::option_layer(governor_layer));

    let socket_addr = lookup_host(address.as_str())
        .await
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?
        .next()
        .ok_or_else(|| anyhow!("Server address '{}' did not resolve", address))?;

    if let Some(tls) = tls_config {
        let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to load TLS certificates from {} and {}: {}",
                    tls.cert_path.display(),
                    tls.key_path.display(),
                    e
                )
            })?;

        info!("TTS gateway listening on wss://{}", socket_addr);

        axum_server::bind_rustls(socket_addr, rustls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| anyhow!("TLS server error: {}", e))?;
    } else {
        info!("TTS gateway listening on ws://{}", socket_addr);

        let listener = TcpListener::bind(&socket_addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    }

    info!("TTS gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn ping(url: String) -> anyhow::Result<()> {
    let mut client = TtsClient::new(ClientConfig::with_url(url.clone()));
    client.connect().await?;
    let pong = client.ping().await?;
    client.disconnect().await;

    println!(
        "{} is alive (tts_initialized: {})",
        url, pong.tts_initialized
    );
    Ok(())
}

async fn speak(
    url: String,
    text: &str,
    overrides: &SynthesisOptions,
    stream: bool,
    output: PathBuf,
) -> anyhow::Result<()> {
    let mut voice = AssistantVoice::new(ClientConfig::with_url(url));

    let result = if stream {
        let mut samples = Vec::new();
        let mut format = None;
        let outcome = voice
            .stream_speech(text, overrides, |chunk| {
                println!(
                    "chunk {}: {} bytes, {:.2}s",
                    chunk.index, chunk.metadata.chunk_size, chunk.metadata.duration
                );
                format.get_or_insert_with(|| chunk.format());
                samples.extend(chunk.samples());
            })
            .await;

        match outcome {
            Ok(outcome) => {
                println!(
                    "{} chunks, {} bytes, {:.2}s of audio",
                    outcome.chunks, outcome.total_bytes, outcome.duration
                );
                write_stream_output(&output, &samples, format.unwrap_or_default())
            }
            Err(e) => Err(e.into()),
        }
    } else {
        match voice.generate_speech(text, overrides).await {
            Ok(speech) => {
                if let Some(metadata) = &speech.metadata {
                    println!(
                        "{:.2}s at {} Hz ({}, {})",
                        metadata.duration, metadata.sample_rate, metadata.language, metadata.emotion
                    );
                }
                std::fs::write(&output, &speech.audio)
                    .map_err(|e| anyhow!("Failed to write {}: {}", output.display(), e))
            }
            Err(e) => Err(e.into()),
        }
    };

    voice.disconnect().await;
    result?;
    println!("Audio written to {}", output.display());
    Ok(())
}

/// Streamed chunks carry no header, so the file takes the layout reported in
/// the first chunk's metadata.
fn write_stream_output(output: &Path, samples: &[i16], format: AudioFormat) -> anyhow::Result<()> {
    let wav = encode_wav(samples, format)?;
    std::fs::write(output, wav).map_err(|e| anyhow!("Failed to write {}: {}", output.display(), e))
}
