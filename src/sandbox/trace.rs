//! Append-only trace of everything a script does inside a session.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The kind of interaction a trace event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    /// A property was read from a virtual object.
    PropertyAccess,
    /// A property was written on a virtual object.
    PropertySet,
    /// The script called its `print` builtin.
    PrintOutput,
    /// A host instance was destroyed.
    InstanceDestroy,
    /// Anything else; the payload carries an `event` name.
    Custom,
}

/// A single timestamped record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Time since the session started.
    #[serde(with = "duration_secs")]
    pub relative_time: Duration,
    /// What happened.
    pub kind: TraceKind,
    /// Structured details.
    pub payload: Value,
}

/// Records trace events against a single session clock.
#[derive(Debug)]
pub struct TraceRecorder {
    start: Instant,
    events: Vec<TraceEvent>,
}

impl TraceRecorder {
    /// Create an empty recorder whose clock starts now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            events: Vec::new(),
        }
    }

    /// Append an event and return the stored copy.
    pub fn record(&mut self, kind: TraceKind, payload: Value) -> &TraceEvent {
        let event = TraceEvent {
            relative_time: self.start.elapsed(),
            kind,
            payload,
        };
        let index = self.events.len();
        self.events.push(event);
        &self.events[index]
    }

    /// Append a `Custom` event named `event`.
    pub fn record_custom(&mut self, event: &str, details: Value) -> &TraceEvent {
        self.record(TraceKind::Custom, json!({ "event": event, "details": details }))
    }

    /// Clear the log and restart the clock.
    pub fn reset(&mut self) {
        self.events.clear();
        self.start = Instant::now();
    }

    /// Time elapsed since the clock started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events of the given kind.
    pub fn count(&self, kind: TraceKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle to a session's recorder that can cross into the VM thread.
///
/// Only one side writes at a time: the VM thread while the script runs, the
/// supervisor before and after.
#[derive(Clone, Debug, Default)]
pub struct SharedTrace {
    inner: Arc<Mutex<TraceRecorder>>,
}

impl SharedTrace {
    pub fn new(recorder: TraceRecorder) -> Self {
        Self {
            inner: Arc::new(Mutex::new(recorder)),
        }
    }

    /// Lock the recorder, recovering from a poisoned lock.
    pub fn lock(&self) -> MutexGuard<'_, TraceRecorder> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event.
    pub fn record(&self, kind: TraceKind, payload: Value) {
        self.lock().record(kind, payload);
    }

    /// Copy of the events recorded so far.
    pub fn snapshot(&self) -> Vec<TraceEvent> {
        self.lock().events().to_vec()
    }
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::try_from_secs_f64(secs).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_returns_stored_event() {
        let mut recorder = TraceRecorder::new();
        let event = recorder.record(TraceKind::PrintOutput, json!({ "message": "hi" }));
        assert_eq!(event.kind, TraceKind::PrintOutput);
        assert_eq!(event.payload["message"], "hi");
        assert_eq!(recorder.len(), 1);

        let event = recorder.record_custom("second", json!(2));
        assert_eq!(event.kind, TraceKind::Custom);
        assert_eq!(event.payload["event"], "second");
        assert_eq!(recorder.len(), 2);
    }

    #[test]
    fn test_events_are_monotonic() {
        let mut recorder = TraceRecorder::new();
        for i in 0..50 {
            recorder.record(TraceKind::Custom, json!({ "i": i }));
        }
        let times: Vec<_> = recorder.events().iter().map(|e| e.relative_time).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_reset_clears_log() {
        let mut recorder = TraceRecorder::new();
        recorder.record(TraceKind::PropertyAccess, json!({}));
        recorder.reset();
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_serialization_shape() {
        let mut recorder = TraceRecorder::new();
        recorder.record_custom("script_error", json!("boom"));
        let json = serde_json::to_value(recorder.events()).unwrap();

        assert_eq!(json[0]["kind"], "custom");
        assert_eq!(json[0]["payload"]["event"], "script_error");
        assert!(json[0]["relative_time"].is_f64());
    }

    #[test]
    fn test_shared_trace_sees_writes_from_clones() {
        let shared = SharedTrace::default();
        let writer = shared.clone();
        std::thread::spawn(move || writer.record(TraceKind::PrintOutput, json!({})))
            .join()
            .unwrap();
        assert_eq!(shared.snapshot().len(), 1);
    }
}
