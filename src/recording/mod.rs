//! # Recording Sessions
//!
//! Live microphone transcription. At most one session runs at a time: a
//! worker thread drains the audio source, accumulates a fixed window of
//! samples, transcribes the window, and pushes the text onto a queue that
//! HTTP polling drains. The queue outlives the session so text produced
//! near the end of a recording can still be fetched after stopping.

pub mod source;

pub use source::{AudioSource, CpalAudioSource, CAPTURE_SAMPLE_RATE};

use crate::error::{AppError, AppResult};
use crate::transcription::{SpeechToText, TranscribeOptions};
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use uuid::Uuid;

/// Builds the capture backend for a new session.
///
/// Injected so tests can substitute a scripted source for the microphone.
pub type SourceFactory = Box<dyn Fn() -> Result<Box<dyn AudioSource>> + Send + Sync>;

/// How often the worker polls the source for fresh samples.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct ActiveSession {
    id: Uuid,
    started_at: std::time::Instant,
    stop_flag: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

/// Single-session recording controller.
pub struct RecordingService {
    engine: Arc<dyn SpeechToText>,
    make_source: SourceFactory,
    window_secs: u64,
    session: Mutex<Option<ActiveSession>>,
    segments: Arc<Mutex<VecDeque<String>>>,
}

impl RecordingService {
    pub fn new(engine: Arc<dyn SpeechToText>, make_source: SourceFactory, window_secs: u64) -> Self {
        Self {
            engine,
            make_source,
            window_secs,
            session: Mutex::new(None),
            segments: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Whether a recording session is currently running.
    pub fn is_active(&self) -> bool {
        self.session
            .lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    /// Start a new session, returning its identifier.
    ///
    /// Fails with 400 when a session is already running. Any text queued by
    /// a previous session is discarded.
    pub fn start(&self, options: TranscribeOptions) -> AppResult<Uuid> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| AppError::Internal("Recording session lock poisoned".into()))?;

        if session.is_some() {
            return Err(AppError::BadRequest(
                "A recording session is already in progress".into(),
            ));
        }

        let source = (self.make_source)()
            .map_err(|e| AppError::Internal(format!("Failed to open audio source: {}", e)))?;

        if let Ok(mut queue) = self.segments.lock() {
            queue.clear();
        }

        let id = Uuid::new_v4();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let worker = spawn_worker(
            source,
            Arc::clone(&self.engine),
            options,
            self.window_secs,
            Arc::clone(&stop_flag),
            Arc::clone(&self.segments),
        );

        tracing::info!(session_id = %id, "Recording session started");
        *session = Some(ActiveSession {
            id,
            started_at: std::time::Instant::now(),
            stop_flag,
            worker,
        });
        Ok(id)
    }

    /// Stop the running session, if any. Idempotent.
    pub fn stop(&self) -> AppResult<()> {
        let active = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| AppError::Internal("Recording session lock poisoned".into()))?;
            session.take()
        };

        if let Some(active) = active {
            active.stop_flag.store(true, Ordering::SeqCst);
            if active.worker.join().is_err() {
                tracing::error!(session_id = %active.id, "Recording worker panicked");
            } else {
                tracing::info!(
                    session_id = %active.id,
                    "Recording session stopped after {:.1}s",
                    active.started_at.elapsed().as_secs_f64()
                );
            }
        }
        Ok(())
    }

    /// Pop the oldest queued transcript segment without blocking.
    pub fn try_next_segment(&self) -> Option<String> {
        self.segments.lock().ok().and_then(|mut q| q.pop_front())
    }
}

/// Worker loop: drain the source, transcribe each full window, queue the
/// text. The trailing partial window is transcribed after stop is requested.
fn spawn_worker(
    mut source: Box<dyn AudioSource>,
    engine: Arc<dyn SpeechToText>,
    options: TranscribeOptions,
    window_secs: u64,
    stop_flag: Arc<AtomicBool>,
    segments: Arc<Mutex<VecDeque<String>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        if let Err(e) = source.start() {
            tracing::error!("Failed to start audio capture: {}", e);
            return;
        }

        let window_len = window_secs as usize * CAPTURE_SAMPLE_RATE as usize;
        let mut pending: Vec<i16> = Vec::with_capacity(window_len);

        loop {
            let stopping = stop_flag.load(Ordering::SeqCst);

            match source.read_samples() {
                Ok(samples) => pending.extend(samples),
                Err(e) => {
                    tracing::error!("Audio capture read failed: {}", e);
                    break;
                }
            }

            while pending.len() >= window_len {
                let window: Vec<i16> = pending.drain(..window_len).collect();
                transcribe_window(&engine, &options, &window, &segments);
            }

            if stopping {
                if !pending.is_empty() {
                    transcribe_window(&engine, &options, &pending, &segments);
                }
                break;
            }

            std::thread::sleep(POLL_INTERVAL);
        }

        if let Err(e) = source.stop() {
            tracing::warn!("Failed to stop audio capture: {}", e);
        }
    })
}

fn transcribe_window(
    engine: &Arc<dyn SpeechToText>,
    options: &TranscribeOptions,
    window: &[i16],
    segments: &Arc<Mutex<VecDeque<String>>>,
) {
    let pcm: Vec<f32> = window.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
    match engine.transcribe_pcm(&pcm, options) {
        Ok(transcript) if !transcript.text.is_empty() => {
            if let Ok(mut queue) = segments.lock() {
                queue.push_back(transcript.text);
            }
        }
        Ok(_) => {}
        Err(e) => tracing::error!("Live transcription failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::{Transcript, TranscribeOptions};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    /// Emits one window of samples per read until the shared budget runs
    /// out, then silence.
    struct ScriptedSource {
        reads_left: Arc<AtomicUsize>,
        window_len: usize,
    }

    impl AudioSource for ScriptedSource {
        fn start(&mut self) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            Ok(())
        }

        fn read_samples(&mut self) -> Result<Vec<i16>> {
            let taken = self
                .reads_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if taken {
                Ok(vec![1000; self.window_len])
            } else {
                Ok(Vec::new())
            }
        }
    }

    struct CountingEngine {
        calls: AtomicUsize,
    }

    impl SpeechToText for CountingEngine {
        fn transcribe_file(&self, _: &Path, _: &TranscribeOptions) -> Result<Transcript> {
            unreachable!("recording never transcribes files")
        }

        fn transcribe_pcm(&self, _: &[f32], _: &TranscribeOptions) -> Result<Transcript> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Transcript::plain(format!("segment {}", n)))
        }
    }

    fn options() -> TranscribeOptions {
        TranscribeOptions {
            model: crate::transcription::ModelSize::Tiny,
            language: None,
            include_timestamps: false,
        }
    }

    fn make_service(reads: usize) -> (RecordingService, Arc<CountingEngine>) {
        let engine = Arc::new(CountingEngine {
            calls: AtomicUsize::new(0),
        });
        let window_len = CAPTURE_SAMPLE_RATE as usize;
        let reads_left = Arc::new(AtomicUsize::new(reads));
        let factory: SourceFactory = Box::new(move || {
            Ok(Box::new(ScriptedSource {
                reads_left: Arc::clone(&reads_left),
                window_len,
            }) as Box<dyn AudioSource>)
        });
        let service = RecordingService::new(
            Arc::clone(&engine) as Arc<dyn SpeechToText>,
            factory,
            1,
        );
        (service, engine)
    }

    #[test]
    fn test_double_start_is_rejected() {
        let (service, _) = make_service(1000);
        service.start(options()).unwrap();
        let second = service.start(options());
        assert!(matches!(second, Err(AppError::BadRequest(_))));
        service.stop().unwrap();
    }

    #[test]
    fn test_stop_without_session_is_idempotent() {
        let (service, _) = make_service(0);
        service.stop().unwrap();
        service.stop().unwrap();
        assert!(!service.is_active());
    }

    #[test]
    fn test_session_produces_segments_in_order() {
        let (service, engine) = make_service(3);
        service.start(options()).unwrap();
        assert!(service.is_active());

        // Three one-second windows arrive within the first few polls.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.calls.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }

        service.stop().unwrap();
        assert!(!service.is_active());

        assert_eq!(service.try_next_segment().as_deref(), Some("segment 0"));
        assert_eq!(service.try_next_segment().as_deref(), Some("segment 1"));
        assert_eq!(service.try_next_segment().as_deref(), Some("segment 2"));
        assert_eq!(service.try_next_segment(), None);
    }

    #[test]
    fn test_segments_survive_stop_until_drained() {
        let (service, engine) = make_service(1);
        service.start(options()).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.calls.load(Ordering::SeqCst) < 1 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        service.stop().unwrap();

        assert!(service.try_next_segment().is_some());
        assert_eq!(service.try_next_segment(), None);
    }

    #[test]
    fn test_new_session_discards_stale_segments() {
        let (service, engine) = make_service(1);
        service.start(options()).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.calls.load(Ordering::SeqCst) < 1 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        service.stop().unwrap();

        // Leftover text from the first session is dropped on restart; the
        // scripted source emits nothing in the second session.
        service.start(options()).unwrap();
        service.stop().unwrap();
        assert_eq!(service.try_next_segment(), None);
    }
}
