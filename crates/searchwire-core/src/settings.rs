//! Transport-wide configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::diagnostics::{CallDiagnostics, DiagnosticsSink, StatusHandler};
use crate::policy::RetryConfig;

/// Configuration shared by every call made through one controller.
#[derive(Clone)]
pub struct TransportSettings {
    /// Timeout per primary attempt.
    pub request_timeout: Duration,
    /// Timeout per ping and sniff attempt.
    pub ping_timeout: Duration,
    /// Failover ceiling; `None` means "pool size − 1".
    pub max_retries: Option<u32>,
    /// Delay between consecutive primary attempts.
    pub retry: RetryConfig,
    /// Ping a failover candidate before sending the request to it.
    pub ping_enabled: bool,
    /// Sniff once per call after a connection-level failure.
    pub sniff_on_connection_failure: bool,
    /// Sniff before the first call if the pool was never reseeded.
    pub sniff_on_startup: bool,
    /// Sniff before a call once the last reseed is older than this.
    pub sniff_lifespan: Option<Duration>,
    /// Endpoint returning the cluster's nodes document.
    pub sniff_path: String,
    /// Query-string parameters added to every resolved URI.
    pub global_query: Vec<(String, String)>,
    /// Keep the raw response bytes on the result envelope.
    pub expose_raw_response: bool,
    /// Called once per finished call.
    pub status_handler: Option<StatusHandler>,
    /// Receives every attempt record.
    pub diagnostics_sink: Option<Arc<dyn DiagnosticsSink>>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(2),
            max_retries: None,
            retry: RetryConfig::default(),
            ping_enabled: false,
            sniff_on_connection_failure: true,
            sniff_on_startup: false,
            sniff_lifespan: None,
            sniff_path: "/_nodes/_all/clear".into(),
            global_query: Vec::new(),
            expose_raw_response: false,
            status_handler: None,
            diagnostics_sink: None,
        }
    }
}

impl TransportSettings {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_ping(mut self, enabled: bool) -> Self {
        self.ping_enabled = enabled;
        self
    }

    pub fn with_sniff_on_connection_failure(mut self, enabled: bool) -> Self {
        self.sniff_on_connection_failure = enabled;
        self
    }

    pub fn with_sniff_on_startup(mut self, enabled: bool) -> Self {
        self.sniff_on_startup = enabled;
        self
    }

    pub fn with_sniff_lifespan(mut self, lifespan: Duration) -> Self {
        self.sniff_lifespan = Some(lifespan);
        self
    }

    pub fn with_global_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.global_query.push((key.into(), value.into()));
        self
    }

    pub fn with_raw_response(mut self, expose: bool) -> Self {
        self.expose_raw_response = expose;
        self
    }

    pub fn with_status_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CallDiagnostics) + Send + Sync + 'static,
    {
        self.status_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_diagnostics_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics_sink = Some(sink);
        self
    }
}

impl std::fmt::Debug for TransportSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSettings")
            .field("request_timeout", &self.request_timeout)
            .field("ping_timeout", &self.ping_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry", &self.retry)
            .field("ping_enabled", &self.ping_enabled)
            .field("sniff_on_connection_failure", &self.sniff_on_connection_failure)
            .field("sniff_on_startup", &self.sniff_on_startup)
            .field("sniff_lifespan", &self.sniff_lifespan)
            .field("sniff_path", &self.sniff_path)
            .field("global_query", &self.global_query)
            .field("expose_raw_response", &self.expose_raw_response)
            .field("status_handler", &self.status_handler.is_some())
            .field("diagnostics_sink", &self.diagnostics_sink.is_some())
            .finish()
    }
}
