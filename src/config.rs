//! # Configuration Management
//!
//! Loads application configuration from three sources, lowest priority first:
//! 1. Built-in defaults
//! 2. Configuration file (`config.toml`)
//! 3. Environment variables (`APP_SERVER_HOST`, `APP_SERVER_PORT`, ...)
//!
//! `HOST` and `PORT` are honored without the `APP_` prefix because deployment
//! platforms commonly inject them that way.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub storage: StorageConfig,
    pub performance: PerformanceConfig,
    pub logging: LoggingConfig,
}

/// Server bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Model selection: the default Whisper size used when a request does not
/// name one, and the translation pairs loaded at startup.
///
/// Each pair is a `src-tgt` string ("en-es"). The registry is built from this
/// list once during startup and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub default_whisper_model: String,
    pub translation_pairs: Vec<String>,
}

/// Filesystem locations.
///
/// `uploads_dir` holds transcription uploads for the duration of one request.
/// `frontend_dir` is the root the static/template server reads from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub uploads_dir: String,
    pub frontend_dir: String,
}

/// Inference scheduling knobs.
///
/// Model calls run on the blocking thread pool so a slow inference never
/// stalls the HTTP workers; `inference_timeout_secs` bounds how long a single
/// request may occupy a blocking thread. `record_window_secs` is the amount
/// of captured audio accumulated before the recording worker transcribes a
/// segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub inference_timeout_secs: u64,
    pub record_window_secs: u64,
}

/// In-memory log sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Maximum number of lines retained by the in-memory ring; the oldest
    /// lines are dropped once the buffer is full.
    pub buffer_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
            },
            models: ModelsConfig {
                default_whisper_model: "tiny".to_string(),
                translation_pairs: vec![
                    "en-es".to_string(),
                    "ru-es".to_string(),
                    "fr-es".to_string(),
                    "es-en".to_string(),
                    "es-ru".to_string(),
                    "es-fr".to_string(),
                    "fr-en".to_string(),
                    "en-ru".to_string(),
                    "ru-en".to_string(),
                    "fr-ru".to_string(),
                ],
            },
            storage: StorageConfig {
                uploads_dir: "uploads".to_string(),
                frontend_dir: "frontend".to_string(),
            },
            performance: PerformanceConfig {
                inference_timeout_secs: 300,
                record_window_secs: 5,
            },
            logging: LoggingConfig {
                buffer_capacity: 10_000,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml`, and the environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly set bare HOST/PORT.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations that cannot work before the server starts.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.performance.inference_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Inference timeout must be greater than 0"));
        }

        if self.performance.record_window_secs == 0 {
            return Err(anyhow::anyhow!("Record window must be greater than 0"));
        }

        if self.logging.buffer_capacity == 0 {
            return Err(anyhow::anyhow!(
                "Log buffer capacity must be greater than 0"
            ));
        }

        for pair in &self.models.translation_pairs {
            if pair.split('-').count() != 2 {
                return Err(anyhow::anyhow!("Invalid translation pair: {}", pair));
            }
        }

        Ok(())
    }
}
