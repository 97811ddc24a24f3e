//! Scoped timer for one network attempt.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::diagnostics::{AttemptKind, AttemptLog, AttemptRecord, DiagnosticsSink};
use crate::node::Node;

/// Brackets a single network attempt.
///
/// The clock starts on construction. When the timer is dropped it appends
/// exactly one [`AttemptRecord`] to the call's log (and forwards it to the
/// sink, if any). A timer dropped without [`AttemptTimer::finish`] (an early
/// return, or the whole call future being cancelled) records a failure with
/// no status.
#[must_use = "the attempt is recorded when the timer is dropped"]
pub struct AttemptTimer {
    kind: AttemptKind,
    node: Node,
    path: String,
    started_on: DateTime<Utc>,
    started: Instant,
    success: bool,
    status: Option<u16>,
    log: AttemptLog,
    sink: Option<Arc<dyn DiagnosticsSink>>,
}

impl AttemptTimer {
    pub fn start(
        kind: AttemptKind,
        node: Node,
        path: impl Into<String>,
        log: AttemptLog,
        sink: Option<Arc<dyn DiagnosticsSink>>,
    ) -> Self {
        Self {
            kind,
            node,
            path: path.into(),
            started_on: Utc::now(),
            started: Instant::now(),
            success: false,
            status: None,
            log,
            sink,
        }
    }

    /// Set the outcome reported when the timer is released. May be called
    /// more than once; the last call wins.
    pub fn finish(&mut self, success: bool, status: Option<u16>) {
        self.success = success;
        self.status = status;
    }

    pub fn kind(&self) -> AttemptKind {
        self.kind
    }

    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl Drop for AttemptTimer {
    fn drop(&mut self) {
        let record = AttemptRecord {
            started_on: self.started_on,
            node: self.node.clone(),
            path: std::mem::take(&mut self.path),
            kind: self.kind,
            elapsed: self.started.elapsed(),
            success: self.success,
            status: self.status,
        };
        if let Some(sink) = &self.sink {
            sink.record(&record);
        }
        self.log.push(record);
    }
}

impl std::fmt::Debug for AttemptTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptTimer")
            .field("kind", &self.kind)
            .field("node", &self.node)
            .field("path", &self.path)
            .finish()
    }
}
