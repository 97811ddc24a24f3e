//! Per-attempt records and per-call diagnostics.
//!
//! Every network attempt (primary request, ping or sniff) produces exactly one
//! [`AttemptRecord`]. Records for one logical call accumulate in that call's
//! [`AttemptLog`] and are optionally forwarded to a process-wide
//! [`DiagnosticsSink`] injected through the transport settings.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use url::Url;

use crate::error::CallError;
use crate::node::Node;
use crate::request::HttpMethod;

/// What a network attempt was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    /// The caller's own request.
    Primary,
    /// Liveness check against a candidate node.
    Ping,
    /// Topology refresh.
    Sniff,
}

impl std::fmt::Display for AttemptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Ping => write!(f, "ping"),
            Self::Sniff => write!(f, "sniff"),
        }
    }
}

/// Timing and outcome of one network attempt. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub started_on: DateTime<Utc>,
    pub node: Node,
    /// Path and query string actually requested on `node`.
    pub path: String,
    pub kind: AttemptKind,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub success: bool,
    pub status: Option<u16>,
}

/// Receives every attempt record as it is produced, across all calls.
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, record: &AttemptRecord);
}

/// Sink that turns attempt records into `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn record(&self, record: &AttemptRecord) {
        tracing::debug!(
            kind = %record.kind,
            node = %record.node,
            path = %record.path,
            elapsed_ms = record.elapsed.as_millis() as u64,
            success = record.success,
            status = record.status,
            "attempt finished"
        );
    }
}

/// Append-only attempt list shared by every timer of one logical call.
#[derive(Debug, Clone, Default)]
pub struct AttemptLog {
    records: Arc<Mutex<Vec<AttemptRecord>>>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, record: AttemptRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the records in attempt order.
    pub fn snapshot(&self) -> Vec<AttemptRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Nodes touched by a logical call, in attempt order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeTrail {
    pub seen: Vec<Node>,
    pub pinged: Vec<Node>,
    pub sniffed: Vec<Node>,
}

/// Timing summary of one logical call.
#[derive(Debug, Clone, Serialize)]
pub struct CallMetrics {
    /// Call path including request-level query parameters.
    pub path: String,
    #[serde(rename = "serialization_ms", serialize_with = "as_millis")]
    pub serialization: Duration,
    #[serde(rename = "network_ms", serialize_with = "as_millis")]
    pub network: Duration,
    #[serde(rename = "deserialization_ms", serialize_with = "as_millis")]
    pub deserialization: Duration,
    pub started_on: DateTime<Utc>,
    pub completed_on: DateTime<Utc>,
    pub requests: Vec<AttemptRecord>,
}

impl CallMetrics {
    /// Attempt records of one kind, in attempt order.
    pub fn requests_of(&self, kind: AttemptKind) -> impl Iterator<Item = &AttemptRecord> {
        self.requests.iter().filter(move |r| r.kind == kind)
    }
}

/// Everything known about a finished logical call except its payload.
///
/// Shared (`Arc`) between the result envelope, the status handler and any
/// payload that asked for a back-reference.
#[derive(Debug, Clone)]
pub struct CallDiagnostics {
    pub method: HttpMethod,
    /// URI of the final attempt, if any attempt was made.
    pub uri: Option<Url>,
    pub success: bool,
    pub status: Option<u16>,
    pub retries: usize,
    pub error: Option<CallError>,
    pub nodes: NodeTrail,
    pub metrics: CallMetrics,
}

impl CallDiagnostics {
    /// Total wall-clock time of the call.
    pub fn elapsed(&self) -> Duration {
        (self.metrics.completed_on - self.metrics.started_on)
            .to_std()
            .unwrap_or_default()
    }
}

impl std::fmt::Display for CallDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let outcome = if self.success { "succeeded" } else { "failed" };
        write!(f, "{} {}", self.method, self.metrics.path)?;
        write!(f, " {outcome}")?;
        if let Some(status) = self.status {
            write!(f, " with status {status}")?;
        }
        write!(f, " after {} retries", self.retries)?;
        if let Some(err) = &self.error {
            write!(f, ": {err}")?;
        }
        for r in &self.metrics.requests {
            write!(
                f,
                "\n  - [{}] {}{} {}ms ",
                r.kind,
                r.node.authority(),
                r.path,
                r.elapsed.as_millis()
            )?;
            match r.status {
                Some(status) => write!(f, "status={status}")?,
                None => write!(f, "status=none")?,
            }
        }
        Ok(())
    }
}

/// Callback invoked once per finished logical call.
pub type StatusHandler = Arc<dyn Fn(&CallDiagnostics) + Send + Sync>;

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
