//! # Application State
//!
//! Shared state handed to every HTTP handler through `web::Data`. The
//! engines sit behind trait objects so handler tests can swap in stubs
//! without loading any model weights.

use crate::config::AppConfig;
use crate::logsink::LogBuffer;
use crate::recording::RecordingService;
use crate::transcription::SpeechToText;
use crate::translation::TranslationDispatcher;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// State shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub start_time: Instant,
    /// In-memory ring of recent log lines, served by `/get_logs`.
    pub logs: LogBuffer,
    pub translator: Arc<TranslationDispatcher>,
    pub transcriber: Arc<dyn SpeechToText>,
    pub recorder: Arc<RecordingService>,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    /// 1 while a recording session is running, 0 otherwise.
    pub active_sessions: u32,
    /// Per-endpoint statistics keyed by "METHOD /path".
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        logs: LogBuffer,
        translator: Arc<TranslationDispatcher>,
        transcriber: Arc<dyn SpeechToText>,
        recorder: Arc<RecordingService>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
            logs,
            translator,
            transcriber,
            recorder,
        }
    }

    /// Copy of the current configuration; cloning keeps the lock short.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn set_recording_active(&self, active: bool) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions = if active { 1 } else { 0 };
    }

    /// Snapshot for the metrics endpoint; clones so no lock is held while
    /// the response is serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_sessions: metrics.active_sessions,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
