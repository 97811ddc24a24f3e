//! Result envelopes and the assembly step that ends a logical call.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::CallContext;
use crate::diagnostics::{CallDiagnostics, CallMetrics};
use crate::error::CallError;

/// Back-reference from a payload to the diagnostics of the call that
/// produced it.
pub type DiagnosticsSlot = Option<Arc<CallDiagnostics>>;

/// A response type the transport can decode into.
///
/// Payloads that want the call diagnostics attached opt in by returning
/// their slot from [`ResponsePayload::diagnostics_slot`].
pub trait ResponsePayload: DeserializeOwned + Send + 'static {
    fn diagnostics_slot(&mut self) -> Option<&mut DiagnosticsSlot> {
        None
    }
}

impl ResponsePayload for Value {}

impl ResponsePayload for String {}

/// `{"acknowledged": true}`, returned by index, alias, mapping and
/// repository management endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcknowledgedResponse {
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(skip)]
    pub diagnostics: DiagnosticsSlot,
}

impl ResponsePayload for AcknowledgedResponse {
    fn diagnostics_slot(&mut self) -> Option<&mut DiagnosticsSlot> {
        Some(&mut self.diagnostics)
    }
}

/// Immutable outcome of one logical call: payload (if any) plus the full
/// diagnostics trail.
#[derive(Debug, Clone)]
pub struct ResultEnvelope<T> {
    diagnostics: Arc<CallDiagnostics>,
    payload: Option<T>,
    raw: Option<Bytes>,
}

impl<T> ResultEnvelope<T> {
    /// `true` when the final exchange succeeded at the transport level (a
    /// decode failure still counts as success; see [`Self::error`]).
    pub fn success(&self) -> bool {
        self.diagnostics.success
    }

    pub fn status(&self) -> Option<u16> {
        self.diagnostics.status
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<T> {
        self.payload
    }

    pub fn error(&self) -> Option<&CallError> {
        self.diagnostics.error.as_ref()
    }

    pub fn retries(&self) -> usize {
        self.diagnostics.retries
    }

    pub fn metrics(&self) -> &CallMetrics {
        &self.diagnostics.metrics
    }

    pub fn diagnostics(&self) -> &Arc<CallDiagnostics> {
        &self.diagnostics
    }

    /// Raw response bytes, kept only when `expose_raw_response` is set.
    pub fn raw_response(&self) -> Option<&Bytes> {
        self.raw.as_ref()
    }

    /// Collapse into a `Result`, dropping the diagnostics.
    pub fn into_result(self) -> Result<Option<T>, CallError> {
        match self.diagnostics.error.clone() {
            Some(err) => Err(err),
            None => Ok(self.payload),
        }
    }
}

/// What the failover loop hands over for assembly.
#[derive(Debug)]
pub struct Completion<T> {
    pub payload: Option<T>,
    pub error: Option<CallError>,
    pub raw: Option<Bytes>,
}

impl<T> Completion<T> {
    pub fn failed(error: CallError) -> Self {
        Self {
            payload: None,
            error: Some(error),
            raw: None,
        }
    }
}

/// Finalize `ctx` into a [`ResultEnvelope`]: freeze diagnostics, attach the
/// back-reference if the payload wants it and fire the status handler.
/// This is where the logical call ends.
pub fn assemble<T: ResponsePayload>(
    ctx: CallContext,
    completion: Completion<T>,
) -> ResultEnvelope<T> {
    let outcome = ctx.outcome().unwrap_or(crate::context::CallOutcome {
        success: false,
        status: None,
    });
    let phases = ctx.phase_timings();
    let diagnostics = Arc::new(CallDiagnostics {
        method: ctx.method(),
        uri: ctx.last_uri().cloned(),
        success: outcome.success,
        status: outcome.status,
        retries: ctx.retry_count(),
        error: completion.error,
        nodes: ctx.node_trail(),
        metrics: CallMetrics {
            path: ctx.path().to_string(),
            serialization: phases.serialization,
            network: phases.network,
            deserialization: phases.deserialization,
            started_on: ctx.started_on(),
            completed_on: Utc::now(),
            requests: ctx.attempts().snapshot(),
        },
    });

    let mut payload = completion.payload;
    if let Some(slot) = payload.as_mut().and_then(ResponsePayload::diagnostics_slot) {
        *slot = Some(Arc::clone(&diagnostics));
    }

    if let Some(handler) = &ctx.settings().status_handler {
        if catch_unwind(AssertUnwindSafe(|| handler(&diagnostics))).is_err() {
            tracing::warn!(path = %diagnostics.metrics.path, "status handler panicked; ignoring");
        }
    }

    let uri = diagnostics
        .uri
        .as_ref()
        .map_or_else(|| ctx.path().to_string(), |u| u.to_string());
    let elapsed_ms = ctx.elapsed().as_millis() as u64;
    if diagnostics.success && diagnostics.error.is_none() {
        tracing::debug!(
            method = %diagnostics.method,
            uri = %uri,
            status = diagnostics.status,
            retries = diagnostics.retries,
            elapsed_ms,
            "call completed"
        );
    } else {
        tracing::warn!(
            method = %diagnostics.method,
            uri = %uri,
            status = diagnostics.status,
            retries = diagnostics.retries,
            elapsed_ms,
            error = diagnostics.error.as_ref().map(tracing::field::display),
            "call failed"
        );
    }

    let raw = if ctx.settings().expose_raw_response {
        completion.raw
    } else {
        None
    };

    ResultEnvelope {
        diagnostics,
        payload,
        raw,
    }
}
