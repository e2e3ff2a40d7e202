//! Context-scoped operation tracking.
//!
//! The tracker is a cross-cutting observer: components open a scope around
//! an operation, the scope emits a `start` event immediately and an `end`
//! event with elapsed duration and outcome when it finishes (or is
//! dropped). Events flow through `tracing`; an optional channel sink makes
//! emission observable in tests.
//!
//! Tracking never participates in control flow. Sink failures are
//! swallowed and only counted as degraded telemetry; they cannot abort
//! the operation being tracked.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::info;

/// Phase of a tracked operation's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    /// Scope entered.
    Start,
    /// Scope exited.
    End,
}

/// Outcome reported when a scope ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation completed normally.
    Success,
    /// The operation failed.
    Failure,
    /// The scope was dropped without an explicit outcome.
    Abandoned,
}

impl Outcome {
    /// Returns the string form used in log output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Abandoned => "abandoned",
        }
    }
}

/// One emitted tracking record. Append-only; never mutated after emission.
#[derive(Debug, Clone)]
pub struct LogEvent {
    /// Operation name.
    pub operation: String,
    /// Start or end.
    pub phase: EventPhase,
    /// Outcome, present on end events.
    pub outcome: Option<Outcome>,
    /// Elapsed duration, present on end events.
    pub duration: Option<Duration>,
    /// Context key-value pairs (department, document title, ...).
    pub context: Vec<(String, String)>,
}

/// Emits scoped start/end events for operations.
///
/// Cheap to clone; clones share the degraded-telemetry counter and the
/// optional sink.
#[derive(Debug, Clone, Default)]
pub struct OperationTracker {
    sink: Option<mpsc::UnboundedSender<LogEvent>>,
    degraded: Arc<AtomicUsize>,
}

impl OperationTracker {
    /// Creates a tracker that emits through `tracing` only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker that additionally forwards events to a channel.
    /// Used by tests to observe emission.
    #[must_use]
    pub fn with_sink(sink: mpsc::UnboundedSender<LogEvent>) -> Self {
        Self {
            sink: Some(sink),
            degraded: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of events that could not be delivered to the sink.
    #[must_use]
    pub fn degraded_events(&self) -> usize {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Opens a scope around an operation, emitting its `start` event.
    ///
    /// The scope emits the matching `end` event on [`OperationScope::finish`]
    /// or, as a fallback, when dropped.
    #[must_use]
    pub fn scoped(
        &self,
        operation: &str,
        context: impl IntoIterator<Item = (String, String)>,
    ) -> OperationScope {
        let context: Vec<(String, String)> = context.into_iter().collect();
        self.emit(&LogEvent {
            operation: operation.to_string(),
            phase: EventPhase::Start,
            outcome: None,
            duration: None,
            context: context.clone(),
        });

        OperationScope {
            tracker: self.clone(),
            operation: operation.to_string(),
            context,
            started: Instant::now(),
            finished: false,
        }
    }

    fn emit(&self, event: &LogEvent) {
        let context = event
            .context
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");

        match event.phase {
            EventPhase::Start => {
                info!(operation = %event.operation, %context, "operation started");
            }
            EventPhase::End => {
                let outcome = event.outcome.unwrap_or(Outcome::Abandoned);
                let duration_ms = event.duration.unwrap_or_default().as_millis() as u64;
                info!(
                    operation = %event.operation,
                    %context,
                    outcome = outcome.as_str(),
                    duration_ms,
                    "operation finished"
                );
            }
        }

        if let Some(sink) = &self.sink {
            if sink.send(event.clone()).is_err() {
                self.degraded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Live tracking scope for one operation.
#[derive(Debug)]
pub struct OperationScope {
    tracker: OperationTracker,
    operation: String,
    context: Vec<(String, String)>,
    started: Instant,
    finished: bool,
}

impl OperationScope {
    /// Ends the scope with an explicit outcome, emitting the `end` event.
    pub fn finish(mut self, outcome: Outcome) {
        self.emit_end(outcome);
    }

    /// Convenience for [`Outcome::Success`].
    pub fn finish_ok(self) {
        self.finish(Outcome::Success);
    }

    /// Convenience for [`Outcome::Failure`].
    pub fn finish_err(self) {
        self.finish(Outcome::Failure);
    }

    fn emit_end(&mut self, outcome: Outcome) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.tracker.emit(&LogEvent {
            operation: self.operation.clone(),
            phase: EventPhase::End,
            outcome: Some(outcome),
            duration: Some(self.started.elapsed()),
            context: std::mem::take(&mut self.context),
        });
    }
}

impl Drop for OperationScope {
    fn drop(&mut self) {
        self.emit_end(Outcome::Abandoned);
    }
}

/// Builds a context pair list for department-scoped operations.
#[must_use]
pub fn department_context(department: &str) -> Vec<(String, String)> {
    vec![("department".to_string(), department.to_string())]
}

/// Builds a context pair list for document-scoped operations.
#[must_use]
pub fn document_context(department: &str, title: &str) -> Vec<(String, String)> {
    vec![
        ("department".to_string(), department.to_string()),
        ("document_title".to_string(), title.to_string()),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tracked() -> (OperationTracker, mpsc::UnboundedReceiver<LogEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (OperationTracker::with_sink(tx), rx)
    }

    #[test]
    fn test_scope_emits_start_and_end_with_duration() {
        let (tracker, mut rx) = tracked();

        let scope = tracker.scoped("download_document", document_context("Sales", "менеджера"));
        scope.finish_ok();

        let start = rx.try_recv().unwrap();
        assert_eq!(start.phase, EventPhase::Start);
        assert_eq!(start.operation, "download_document");
        assert!(start.duration.is_none());
        assert!(
            start
                .context
                .iter()
                .any(|(k, v)| k == "document_title" && v == "менеджера")
        );

        let end = rx.try_recv().unwrap();
        assert_eq!(end.phase, EventPhase::End);
        assert_eq!(end.outcome, Some(Outcome::Success));
        assert!(end.duration.is_some());
    }

    #[test]
    fn test_scope_failure_outcome() {
        let (tracker, mut rx) = tracked();

        tracker
            .scoped("cloud_upload", department_context("Sales"))
            .finish_err();

        let _start = rx.try_recv().unwrap();
        let end = rx.try_recv().unwrap();
        assert_eq!(end.outcome, Some(Outcome::Failure));
    }

    #[test]
    fn test_dropped_scope_emits_abandoned_end() {
        let (tracker, mut rx) = tracked();

        {
            let _scope = tracker.scoped("resolve_documents", department_context("HR"));
        }

        let _start = rx.try_recv().unwrap();
        let end = rx.try_recv().unwrap();
        assert_eq!(end.outcome, Some(Outcome::Abandoned));
    }

    #[test]
    fn test_closed_sink_degrades_without_failing() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let tracker = OperationTracker::with_sink(tx);

        // Must not panic or error even though the sink is gone
        tracker.scoped("download_document", Vec::new()).finish_ok();

        assert_eq!(tracker.degraded_events(), 2);
    }

    #[test]
    fn test_finish_emits_exactly_one_end() {
        let (tracker, mut rx) = tracked();

        tracker.scoped("op", Vec::new()).finish_ok();

        let _start = rx.try_recv().unwrap();
        let _end = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err(), "no extra event after finish+drop");
    }
}
