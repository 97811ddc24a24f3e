//! Logical request types handed to the failover controller.

use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::Node;

/// HTTP verbs used by the cluster API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            other => Err(format!("unsupported HTTP method: {other}")),
        }
    }
}

/// Request payload before it hits the serializer.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// A document to be encoded by the configured serializer.
    Json(Value),
    /// Pre-encoded bytes (bulk bodies, raw passthrough); sent as-is.
    Raw(Bytes),
}

/// Per-call overrides of the transport settings.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Pin every attempt to this node, bypassing pool rotation.
    pub force_node: Option<Node>,
    /// Overrides [`crate::TransportSettings::max_retries`] for this call.
    pub max_retries: Option<u32>,
    /// Overrides the per-attempt timeout for this call.
    pub request_timeout: Option<Duration>,
    /// Non-2xx statuses this operation treats as success (e.g. 404 for exists).
    pub allowed_status_codes: Vec<u16>,
    /// Query-string parameters appended to the call path.
    pub query: Vec<(String, String)>,
    /// Wall-clock bound on the whole call, threaded into every attempt.
    pub deadline: Option<Instant>,
}

impl RequestOptions {
    pub fn force_node(mut self, node: Node) -> Self {
        self.force_node = Some(node);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn allow_status(mut self, status: u16) -> Self {
        self.allowed_status_codes.push(status);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// One caller-initiated operation: method, path template, optional body and
/// options. Immutable once handed to the controller.
#[derive(Debug, Clone)]
pub struct LogicalCall {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<RequestBody>,
    pub options: RequestOptions,
}

impl LogicalCall {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            options: RequestOptions::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Head, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn with_raw_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Raw(body.into()));
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}
