//! # In-Memory Log Sink
//!
//! Captures every tracing event that passes the global filter into a
//! process-wide buffer so the `/get_logs` endpoint can return the service's
//! own log output. Lines are formatted as
//! `<timestamp> - <LEVEL> - <message>`.
//!
//! The buffer is a bounded ring: once `capacity` lines are held, the oldest
//! line is dropped for each new one. This keeps the sink's memory use flat
//! over the process lifetime.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Shared, bounded, append-only log line buffer.
///
/// Clones share the same underlying ring. Appends from concurrent requests
/// are serialized by the mutex.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    /// Append one formatted line, dropping the oldest line when full.
    pub fn push(&self, line: String) {
        let mut lines = match self.inner.lock() {
            Ok(guard) => guard,
            // A poisoned lock only means a panic happened mid-append; the
            // buffer contents are still plain strings, so keep logging.
            Err(poisoned) => poisoned.into_inner(),
        };
        if lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Snapshot of all retained lines, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        match self.inner.lock() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tracing layer feeding the [`LogBuffer`].
pub struct MemoryLogLayer {
    buffer: LogBuffer,
}

impl MemoryLogLayer {
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S: Subscriber> Layer<S> for MemoryLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let line = format!(
            "{} - {} - {}",
            chrono::Utc::now().to_rfc3339(),
            event.metadata().level(),
            visitor.rendered()
        );
        self.buffer.push(line);
    }
}

/// Collects the `message` field plus any structured fields as `key=value`.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: Vec<String>,
}

impl LineVisitor {
    fn rendered(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.join(" ")
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}
