//! The retry / ping / sniff decision loop.
//!
//! ```text
//! SelectNode → SendAttempt → Success            (terminal)
//!                          → FatalFailure       (terminal)
//!                          → RetryableFailure → [sniff] → SelectNode
//!                                             → Exhausted (terminal)
//! ```
//!
//! Exhaustion: a call tries each node at most once per pool epoch. A reseed
//! starts a new epoch and clears the tried set, except for the node that
//! failed last. Independently, at most `max_retries + 1` primary attempts
//! are made.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::connection::{Connection, WireRequest, WireResponse};
use crate::context::CallContext;
use crate::diagnostics::AttemptKind;
use crate::envelope::{assemble, Completion, ResponsePayload, ResultEnvelope};
use crate::error::{CallError, TransportError};
use crate::node::Node;
use crate::policy::RetryPolicy;
use crate::pool::NodePool;
use crate::request::{HttpMethod, LogicalCall, RequestBody};
use crate::serializer::{JsonSerializer, Serializer};
use crate::settings::TransportSettings;
use crate::sniff;

enum Verdict {
    Success(WireResponse),
    Retry(CallError),
    Fatal(CallError),
}

/// Drives logical calls through the node pool until success, exhaustion or a
/// non-retryable error.
///
/// One controller serves any number of concurrent calls; each call owns its
/// own [`CallContext`].
pub struct FailoverController<S: Serializer = JsonSerializer> {
    pool: Arc<dyn NodePool>,
    connection: Arc<dyn Connection>,
    serializer: S,
    settings: Arc<TransportSettings>,
    retry: RetryPolicy,
    startup_sniffed: AtomicBool,
    created: Instant,
}

impl FailoverController<JsonSerializer> {
    pub fn new(
        pool: Arc<dyn NodePool>,
        connection: Arc<dyn Connection>,
        settings: TransportSettings,
    ) -> Self {
        Self::with_serializer(pool, connection, settings, JsonSerializer::default())
    }
}

impl<S: Serializer> FailoverController<S> {
    pub fn with_serializer(
        pool: Arc<dyn NodePool>,
        connection: Arc<dyn Connection>,
        settings: TransportSettings,
        serializer: S,
    ) -> Self {
        let retry = RetryPolicy::new(settings.retry.clone());
        Self {
            pool,
            connection,
            serializer,
            settings: Arc::new(settings),
            retry,
            startup_sniffed: AtomicBool::new(false),
            created: Instant::now(),
        }
    }

    pub fn pool(&self) -> &Arc<dyn NodePool> {
        &self.pool
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Execute one logical call. Never fails: every outcome, including
    /// "no node at all", comes back as a [`ResultEnvelope`].
    pub async fn call<T: ResponsePayload>(&self, call: LogicalCall) -> ResultEnvelope<T> {
        let LogicalCall {
            method,
            path,
            body,
            mut options,
        } = call;
        if options.force_node.is_none() {
            options.force_node = self.pool.forced_node();
        }
        let mut ctx = CallContext::new(Arc::clone(&self.settings), options, method, &path);

        if let Some(body) = body {
            let encoded = match body {
                RequestBody::Json(value) => self.serializer.serialize(&value),
                RequestBody::Raw(bytes) => Ok(bytes),
            };
            match encoded {
                Ok(bytes) => ctx.mark_serialized(bytes),
                Err(e) => {
                    ctx.finish(false, None);
                    let error = CallError::Serialization(e.to_string());
                    return assemble(ctx, Completion::failed(error));
                }
            }
        }

        if ctx.forced_node().is_none() && self.sniff_due() {
            self.sniff(&mut ctx).await;
        }

        let completion = match self.drive(&mut ctx).await {
            Ok(response) => self.decode(&mut ctx, response),
            Err(error) => {
                ctx.finish(false, error.status());
                Completion::failed(error)
            }
        };
        assemble(ctx, completion)
    }

    async fn drive(&self, ctx: &mut CallContext) -> Result<WireResponse, CallError> {
        let forced = ctx.forced_node().cloned();
        let max_retries = ctx
            .options()
            .max_retries
            .or(self.settings.max_retries)
            .unwrap_or_else(|| self.pool.len().saturating_sub(1) as u32);
        let ceiling = max_retries.saturating_add(1);

        let mut epoch = self.pool.current_epoch();
        let mut tried: Vec<Node> = Vec::new();
        let mut last_failure: Option<CallError> = None;
        let mut attempts = 0u32;
        let mut sniffed = false;

        loop {
            if attempts >= ceiling {
                tracing::warn!(attempts, ceiling, "retry ceiling reached");
                return Err(exhausted(attempts, last_failure));
            }

            let current_epoch = self.pool.current_epoch();
            if current_epoch != epoch {
                epoch = current_epoch;
                let previous = ctx.current_node().ok().cloned();
                tried.retain(|n| Some(n) == previous.as_ref());
            }

            let node = match &forced {
                Some(node) => node.clone(),
                None => match self.select(epoch, &tried) {
                    Some(node) => node,
                    None if attempts == 0 && last_failure.is_none() => {
                        return Err(CallError::NoNodeAvailable)
                    }
                    None => {
                        tracing::warn!(attempts, epoch, "no untried node left in pool");
                        return Err(exhausted(attempts, last_failure));
                    }
                },
            };

            let Some(timeout) = ctx.attempt_timeout(self.settings.request_timeout) else {
                tracing::warn!(attempts, "call deadline passed");
                let timed_out = CallError::Transport {
                    node,
                    source: TransportError::Timeout { ms: 0 },
                };
                return Err(match last_failure {
                    Some(last) => CallError::Exhausted {
                        attempts,
                        last: Box::new(last),
                    },
                    None => timed_out,
                });
            };

            ctx.advance_to_node(node.clone());
            tried.push(node.clone());

            if attempts > 0 {
                if forced.is_none() && self.settings.ping_enabled && !self.ping(ctx, &node).await {
                    self.pool.report_failure(&node);
                    continue;
                }
                let delay = self.retry.delay_for(attempts);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            attempts += 1;
            match self.attempt(ctx, &node, attempts, timeout).await {
                Verdict::Success(response) => {
                    self.pool.report_success(&node);
                    return Ok(response);
                }
                Verdict::Fatal(err) => {
                    if err.status().is_some() {
                        // The node answered; it is healthy even if the request was not.
                        self.pool.report_success(&node);
                    }
                    return Err(err);
                }
                Verdict::Retry(err) => {
                    self.pool.report_failure(&node);
                    tracing::warn!(
                        node = %node,
                        attempt = attempts,
                        error = %err,
                        "attempt failed; failing over"
                    );
                    let connection_level = matches!(err, CallError::Transport { .. });
                    last_failure = Some(err);

                    let wants_sniff = (connection_level
                        && self.settings.sniff_on_connection_failure)
                        || self.pool.is_stale();
                    if !sniffed
                        && forced.is_none()
                        && wants_sniff
                        && self.pool.supports_reseeding()
                    {
                        sniffed = true;
                        self.sniff(ctx).await;
                    }
                }
            }
        }
    }

    /// Next candidate not yet tried in this epoch. The pool's rotation is
    /// consulted first; if concurrent callers keep handing us tried nodes,
    /// fall back to any untried node the pool knows.
    fn select(&self, epoch: u64, tried: &[Node]) -> Option<Node> {
        let bound = self.pool.len().max(1);
        let mut offered = false;
        for _ in 0..bound {
            match self.pool.next_candidate(epoch) {
                Some(node) if !tried.contains(&node) => return Some(node),
                Some(_) => offered = true,
                None => break,
            }
        }
        if !offered {
            return None;
        }
        self.pool.nodes().into_iter().find(|n| !tried.contains(n))
    }

    async fn attempt(
        &self,
        ctx: &mut CallContext,
        node: &Node,
        attempt: u32,
        timeout: Duration,
    ) -> Verdict {
        let uri = match ctx.resolved_path(None) {
            Ok(uri) => uri,
            Err(e) => return Verdict::Fatal(e),
        };
        let mut timer = match ctx.begin_attempt(AttemptKind::Primary) {
            Ok(timer) => timer,
            Err(e) => return Verdict::Fatal(e),
        };
        tracing::debug!(method = %ctx.method(), uri = %uri, attempt, "sending request");

        let request = WireRequest {
            node: node.clone(),
            method: ctx.method(),
            uri,
            body: ctx.body().cloned(),
            timeout,
        };
        let verdict = classify(
            node,
            self.send_bounded(request).await,
            &ctx.options().allowed_status_codes,
        );
        match &verdict {
            Verdict::Success(response) => timer.finish(true, Some(response.status)),
            Verdict::Retry(err) | Verdict::Fatal(err) => timer.finish(false, err.status()),
        }
        drop(timer);
        ctx.mark_network_complete();
        verdict
    }

    /// HEAD `/` on `node`. Failures are logged and swallowed.
    async fn ping(&self, ctx: &mut CallContext, node: &Node) -> bool {
        let Some(timeout) = ctx.within_deadline(self.settings.ping_timeout) else {
            tracing::warn!(node = %node, "call deadline passed before ping");
            return false;
        };
        ctx.record_ping();
        let uri = match ctx.resolved_path_on(node, Some("/")) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(node = %node, error = %e, "cannot build ping URI");
                return false;
            }
        };
        let mut timer = ctx.begin_attempt_at(AttemptKind::Ping, node.clone(), &uri);
        let request = WireRequest {
            node: node.clone(),
            method: HttpMethod::Head,
            uri,
            body: None,
            timeout,
        };
        match self.send_bounded(request).await {
            Ok(response) => {
                let alive = response.status < 500;
                timer.finish(alive, Some(response.status));
                if !alive {
                    tracing::warn!(
                        node = %node,
                        status = response.status,
                        "ping answered with server error"
                    );
                }
                alive
            }
            Err(e) => {
                timer.finish(false, None);
                tracing::warn!(node = %node, error = %e, "ping failed");
                false
            }
        }
    }

    fn sniff_due(&self) -> bool {
        if !self.pool.supports_reseeding() {
            return false;
        }
        if self.settings.sniff_on_startup && !self.startup_sniffed.swap(true, Ordering::AcqRel) {
            return true;
        }
        match (self.settings.sniff_lifespan, self.pool.last_reseed()) {
            (Some(lifespan), Some(at)) => at.elapsed() >= lifespan,
            (Some(lifespan), None) => self.created.elapsed() >= lifespan,
            (None, _) => false,
        }
    }

    /// Ask the cluster for its nodes and reseed the pool. Tries every known
    /// node (the current one last) until one answers with a usable list.
    /// Failures are logged and swallowed.
    async fn sniff(&self, ctx: &mut CallContext) -> bool {
        let current = ctx.current_node().ok().cloned();
        let mut candidates = self.pool.nodes();
        candidates.sort_by_key(|n| Some(n) == current.as_ref());

        for node in candidates {
            let Some(timeout) = ctx.within_deadline(self.settings.ping_timeout) else {
                tracing::warn!(node = %node, "call deadline passed before sniff");
                break;
            };
            ctx.record_sniff_on(&node);
            let uri = match ctx.resolved_path_on(&node, Some(&self.settings.sniff_path)) {
                Ok(uri) => uri,
                Err(e) => {
                    tracing::warn!(node = %node, error = %e, "cannot build sniff URI");
                    continue;
                }
            };
            let mut timer = ctx.begin_attempt_at(AttemptKind::Sniff, node.clone(), &uri);
            let request = WireRequest {
                node: node.clone(),
                method: HttpMethod::Get,
                uri,
                body: None,
                timeout,
            };
            let response = match self.send_bounded(request).await {
                Ok(response) if response.is_success() => response,
                Ok(response) => {
                    timer.finish(false, Some(response.status));
                    tracing::warn!(node = %node, status = response.status, "sniff rejected");
                    continue;
                }
                Err(e) => {
                    timer.finish(false, None);
                    tracing::warn!(node = %node, error = %e, "sniff failed");
                    continue;
                }
            };
            match sniff::parse_nodes(&response.body, node.uri().scheme()) {
                Ok(nodes) if !nodes.is_empty() => {
                    timer.finish(true, Some(response.status));
                    drop(timer);
                    tracing::info!(via = %node, discovered = nodes.len(), "sniff succeeded");
                    self.pool.reseed(nodes);
                    return true;
                }
                Ok(_) => {
                    timer.finish(false, Some(response.status));
                    tracing::warn!(node = %node, "sniff returned no HTTP nodes");
                }
                Err(e) => {
                    timer.finish(false, Some(response.status));
                    tracing::warn!(node = %node, error = %e, "unusable sniff response");
                }
            }
        }
        false
    }

    /// Decode the body of a successful response, including one whose status
    /// was accepted through `allowed_status_codes`.
    fn decode<T: ResponsePayload>(
        &self,
        ctx: &mut CallContext,
        response: WireResponse,
    ) -> Completion<T> {
        let WireResponse { status, body } = response;
        ctx.finish(true, Some(status));
        let decodable = ctx.method() != HttpMethod::Head && !body.is_empty();
        let completion = if !decodable {
            Completion {
                payload: None,
                error: None,
                raw: Some(body),
            }
        } else {
            match self.serializer.deserialize::<T>(&body) {
                Ok(payload) => Completion {
                    payload: Some(payload),
                    error: None,
                    raw: Some(body),
                },
                Err(e) => Completion {
                    payload: None,
                    error: Some(CallError::Deserialization {
                        status,
                        message: e.to_string(),
                    }),
                    raw: Some(body),
                },
            }
        };
        ctx.mark_deserialized();
        completion
    }

    /// Send with the attempt timeout enforced on our side as well.
    async fn send_bounded(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let timeout = request.timeout;
        tokio::time::timeout(timeout, self.connection.send(request))
            .await
            .map_err(|_| TransportError::Timeout {
                ms: timeout.as_millis() as u64,
            })?
    }
}

fn classify(
    node: &Node,
    result: Result<WireResponse, TransportError>,
    allowed: &[u16],
) -> Verdict {
    match result {
        Err(source) => {
            let retryable = source.is_retryable();
            let err = CallError::Transport {
                node: node.clone(),
                source,
            };
            if retryable {
                Verdict::Retry(err)
            } else {
                Verdict::Fatal(err)
            }
        }
        Ok(response) if response.is_success() || allowed.contains(&response.status) => {
            Verdict::Success(response)
        }
        Ok(response) if is_server_error(response.status) => Verdict::Retry(CallError::Server {
            node: node.clone(),
            status: response.status,
            body: response.body_text(),
        }),
        Ok(response) => Verdict::Fatal(CallError::Client {
            node: node.clone(),
            status: response.status,
            body: response.body_text(),
        }),
    }
}

/// 5xx, request timeout and throttling are worth another node.
fn is_server_error(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

fn exhausted(attempts: u32, last: Option<CallError>) -> CallError {
    match last {
        Some(last) => CallError::Exhausted {
            attempts,
            last: Box::new(last),
        },
        None => CallError::NoNodeAvailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node::parse("http://a:9200").unwrap()
    }

    #[test]
    fn classify_statuses() {
        let ok = classify(&node(), Ok(WireResponse::new(201, "{}")), &[]);
        assert!(matches!(ok, Verdict::Success(_)));

        let allowed = classify(&node(), Ok(WireResponse::new(404, "{}")), &[404]);
        assert!(matches!(allowed, Verdict::Success(_)));

        let bad = classify(&node(), Ok(WireResponse::new(400, "bad")), &[]);
        assert!(matches!(bad, Verdict::Fatal(CallError::Client { status: 400, .. })));

        let busy = classify(&node(), Ok(WireResponse::new(503, "busy")), &[]);
        assert!(matches!(busy, Verdict::Retry(CallError::Server { status: 503, .. })));

        let throttled = classify(&node(), Ok(WireResponse::new(429, "")), &[]);
        assert!(matches!(throttled, Verdict::Retry(_)));
    }

    #[test]
    fn classify_transport_errors() {
        let refused = classify(&node(), Err(TransportError::Connect("refused".into())), &[]);
        assert!(matches!(refused, Verdict::Retry(CallError::Transport { .. })));

        let invalid = classify(
            &node(),
            Err(TransportError::InvalidRequest("header".into())),
            &[],
        );
        assert!(matches!(invalid, Verdict::Fatal(CallError::Transport { .. })));
    }

    #[test]
    fn exhausted_without_failure_is_no_node() {
        assert_eq!(exhausted(0, None), CallError::NoNodeAvailable);
    }
}
