//! Per-call state: node visits, path resolution, phase timings and the
//! attempt log shared by every timer of the call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use url::{form_urlencoded, Url};

use crate::diagnostics::{AttemptKind, AttemptLog, NodeTrail};
use crate::error::CallError;
use crate::node::Node;
use crate::request::{HttpMethod, RequestOptions};
use crate::settings::TransportSettings;
use crate::timer::AttemptTimer;

/// Final outcome of a logical call, latched once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOutcome {
    pub success: bool,
    pub status: Option<u16>,
}

/// Serialization, network and deserialization durations of one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    pub serialization: Duration,
    pub network: Duration,
    pub deserialization: Duration,
}

/// Bookkeeping for one logical call across all of its attempts.
///
/// Owned by the failover loop for the lifetime of the call and consumed by
/// [`crate::envelope::assemble`].
#[derive(Debug)]
pub struct CallContext {
    settings: Arc<TransportSettings>,
    options: RequestOptions,
    method: HttpMethod,
    path: String,
    started_on: DateTime<Utc>,
    clock: Instant,
    body: Option<Bytes>,
    serialized_at: Option<Duration>,
    network_done_at: Option<Duration>,
    deserialized_at: Option<Duration>,
    seen: Vec<Node>,
    pinged: Vec<Node>,
    sniffed: Vec<Node>,
    last_uri: Option<Url>,
    attempts: AttemptLog,
    outcome: Option<CallOutcome>,
}

impl CallContext {
    /// Open a call. Request-level query parameters are folded into the path
    /// here; global parameters are added at resolution time.
    pub fn new(
        settings: Arc<TransportSettings>,
        options: RequestOptions,
        method: HttpMethod,
        path: &str,
    ) -> Self {
        let path = append_query(path, &options.query);
        Self {
            settings,
            options,
            method,
            path,
            started_on: Utc::now(),
            clock: Instant::now(),
            body: None,
            serialized_at: None,
            network_done_at: None,
            deserialized_at: None,
            seen: Vec::new(),
            pinged: Vec::new(),
            sniffed: Vec::new(),
            last_uri: None,
            attempts: AttemptLog::new(),
            outcome: None,
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Call path including request-level query parameters.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn forced_node(&self) -> Option<&Node> {
        self.options.force_node.as_ref()
    }

    /// The node the next attempt goes to: the forced node if configured,
    /// otherwise the most recently visited one.
    pub fn current_node(&self) -> Result<&Node, CallError> {
        self.forced_node()
            .or_else(|| self.seen.last())
            .ok_or(CallError::NoNodeAvailable)
    }

    /// Record a visit to `node` and make it current.
    pub fn advance_to_node(&mut self, node: Node) {
        self.seen.push(node);
    }

    /// Number of failovers so far. Always 0 when a node is forced, since the
    /// target never varies.
    pub fn retry_count(&self) -> usize {
        if self.forced_node().is_some() {
            return 0;
        }
        self.seen.len().saturating_sub(1)
    }

    /// Number of nodes visited, forced or not.
    pub fn visits(&self) -> usize {
        self.seen.len()
    }

    /// Note that the current node was pinged.
    pub fn record_ping(&mut self) {
        if let Some(node) = self.current_node().ok().cloned() {
            self.pinged.push(node);
        }
    }

    /// Note that the current node was sniffed.
    pub fn record_sniff(&mut self) {
        if let Some(node) = self.current_node().ok().cloned() {
            self.sniffed.push(node);
        }
    }

    /// Note that `node` was sniffed; sniffs may target nodes other than the
    /// current one.
    pub fn record_sniff_on(&mut self, node: &Node) {
        self.sniffed.push(node.clone());
    }

    /// Resolve the call path (or `override_path`) on the current node.
    pub fn resolved_path(&self, override_path: Option<&str>) -> Result<Url, CallError> {
        let node = self.current_node()?;
        self.resolved_path_on(node, override_path)
    }

    /// Resolve the call path (or `override_path`) on `node`, appending the
    /// global query-string parameters. Identical inputs give identical URIs.
    pub fn resolved_path_on(
        &self,
        node: &Node,
        override_path: Option<&str>,
    ) -> Result<Url, CallError> {
        let path = override_path.unwrap_or(&self.path);
        let mut uri = node.join(path).map_err(|e| {
            CallError::InvalidRequest(format!("cannot resolve `{path}` on {node}: {e}"))
        })?;
        if !self.settings.global_query.is_empty() {
            uri.query_pairs_mut()
                .extend_pairs(self.settings.global_query.iter());
        }
        Ok(uri)
    }

    /// Store the encoded body (re-sent on every retry) and note how long
    /// serialization took.
    pub fn mark_serialized(&mut self, body: Bytes) {
        self.body = Some(body);
        self.serialized_at = Some(self.clock.elapsed());
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn mark_network_complete(&mut self) {
        self.network_done_at = Some(self.clock.elapsed());
    }

    pub fn mark_deserialized(&mut self) {
        self.deserialized_at = Some(self.clock.elapsed());
    }

    /// Start timing a primary attempt on the current node.
    pub fn begin_attempt(&mut self, kind: AttemptKind) -> Result<AttemptTimer, CallError> {
        let node = self.current_node()?.clone();
        let uri = self.resolved_path(None)?;
        if kind == AttemptKind::Primary {
            self.last_uri = Some(uri.clone());
        }
        Ok(self.begin_attempt_at(kind, node, &uri))
    }

    /// Start timing an attempt against an explicit node and URI (pings and
    /// sniffs). The timer appends to this call's attempt log.
    pub fn begin_attempt_at(&self, kind: AttemptKind, node: Node, uri: &Url) -> AttemptTimer {
        let path = match uri.query() {
            Some(query) => format!("{}?{}", uri.path(), query),
            None => uri.path().to_string(),
        };
        AttemptTimer::start(
            kind,
            node,
            path,
            self.attempts.clone(),
            self.settings.diagnostics_sink.clone(),
        )
    }

    pub fn attempts(&self) -> &AttemptLog {
        &self.attempts
    }

    /// Latch the call's overall outcome. Only the first call takes effect.
    pub fn finish(&mut self, success: bool, status: Option<u16>) {
        if self.outcome.is_none() {
            self.outcome = Some(CallOutcome { success, status });
        }
    }

    pub fn outcome(&self) -> Option<CallOutcome> {
        self.outcome
    }

    /// URI of the last primary attempt.
    pub fn last_uri(&self) -> Option<&Url> {
        self.last_uri.as_ref()
    }

    pub fn started_on(&self) -> DateTime<Utc> {
        self.started_on
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Per-attempt timeout, narrowed by the call deadline if one was given.
    /// `None` once the deadline has passed.
    pub fn attempt_timeout(&self, base: Duration) -> Option<Duration> {
        self.within_deadline(self.options.request_timeout.unwrap_or(base))
    }

    /// `timeout` narrowed by the call deadline; `None` once it has passed.
    /// Ping and sniff attempts use this with the ping timeout.
    pub fn within_deadline(&self, timeout: Duration) -> Option<Duration> {
        match self.options.deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                (!left.is_zero()).then(|| timeout.min(left))
            }
            None => Some(timeout),
        }
    }

    pub fn node_trail(&self) -> NodeTrail {
        NodeTrail {
            seen: self.seen.clone(),
            pinged: self.pinged.clone(),
            sniffed: self.sniffed.clone(),
        }
    }

    pub fn phase_timings(&self) -> PhaseTimings {
        let serialized = self.serialized_at.unwrap_or_default();
        let network_done = self.network_done_at.unwrap_or(serialized);
        let deserialized = self.deserialized_at.unwrap_or(network_done);
        PhaseTimings {
            serialization: serialized,
            network: network_done.saturating_sub(serialized),
            deserialization: deserialized.saturating_sub(network_done),
        }
    }
}

fn append_query(path: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter())
        .finish();
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{encoded}")
}
