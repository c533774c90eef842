//! # Voxlate Backend
//!
//! HTTP backend for speech-to-text transcription, text translation, and live
//! microphone recording, serving its own web frontend.
//!
//! Layout:
//! - **config**: TOML + environment configuration
//! - **state**: shared application state and request metrics
//! - **logsink**: bounded in-memory log ring behind `/get_logs`
//! - **transcription**: Whisper speech-to-text engine
//! - **translation**: Marian translation pipelines and dispatch
//! - **recording**: live microphone capture sessions
//! - **handlers**: HTTP endpoints
//! - **middleware**: request logging and metrics
//! - **error**: error types mapped to HTTP responses

mod config;
mod error;
mod handlers;
mod health;
mod logsink;
mod middleware;
mod recording;
mod state;
mod transcription;
mod translation;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use candle_core::Device;
use config::AppConfig;
use logsink::{LogBuffer, MemoryLogLayer};
use recording::{AudioSource, CpalAudioSource, RecordingService, SourceFactory};
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::{SpeechToText, WhisperEngine};
use translation::{LanguagePair, MarianTranslator, TranslationDispatcher, TranslatorRegistry};

static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Configuration has to come first: the log ring capacity is part of it.
    let config = AppConfig::load()?;
    config.validate()?;

    let log_buffer = LogBuffer::new(config.logging.buffer_capacity);
    init_tracing(log_buffer.clone())?;

    info!("Starting voxlate-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}",
        config.server.host, config.server.port
    );

    let device = Device::Cpu;

    // All translation models load eagerly; a missing checkpoint is a startup
    // failure rather than a surprise mid-request.
    let mut registry = TranslatorRegistry::new();
    for pair_name in &config.models.translation_pairs {
        let pair: LanguagePair = pair_name.parse()?;
        let translator = MarianTranslator::load(pair.clone(), device.clone())?;
        registry.insert(pair, Box::new(translator));
    }
    info!("Loaded {} translation pipelines", registry.len());

    let translator = Arc::new(TranslationDispatcher::new(
        Arc::new(registry),
        Duration::from_secs(config.performance.inference_timeout_secs),
    ));

    let transcriber: Arc<dyn SpeechToText> = Arc::new(WhisperEngine::new(device));

    let source_factory: SourceFactory =
        Box::new(|| Ok(Box::new(CpalAudioSource::new()?) as Box<dyn AudioSource>));
    let recorder = Arc::new(RecordingService::new(
        Arc::clone(&transcriber),
        source_factory,
        config.performance.record_window_secs,
    ));

    let app_state = AppState::new(
        config.clone(),
        log_buffer,
        translator,
        transcriber,
        recorder,
    );
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::RequestTrace)
            .route("/", web::get().to(handlers::pages::index))
            .route("/logs", web::get().to(handlers::pages::logs_page))
            .route("/acerca-de", web::get().to(handlers::pages::acerca_de))
            .route(
                "/uso-herramienta",
                web::get().to(handlers::pages::uso_herramienta),
            )
            .route("/get_logs", web::get().to(handlers::logs::get_logs))
            .route(
                "/translate",
                web::post().to(handlers::translate::translate_text),
            )
            .route(
                "/transcribe",
                web::post().to(handlers::transcribe::transcribe_file),
            )
            .route("/record", web::post().to(handlers::record::start_record))
            .route(
                "/get_transcription",
                web::get().to(handlers::record::get_transcription),
            )
            .route(
                "/stop_record",
                web::post().to(handlers::record::stop_record),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            // Catch-all static file route, registered last.
            .route(
                "/{path:.*}",
                web::get().to(handlers::pages::static_proxy),
            )
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Console logging plus the in-memory layer backing `/get_logs`.
fn init_tracing(log_buffer: LogBuffer) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxlate_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(MemoryLogLayer::new(log_buffer))
        .init();

    Ok(())
}

fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
