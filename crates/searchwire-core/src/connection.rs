//! The `Connection` trait: the opaque send-bytes/receive-bytes step.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::TransportError;
use crate::node::Node;
use crate::request::HttpMethod;

/// One HTTP exchange as handed to the wire.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub node: Node,
    pub method: HttpMethod,
    /// Fully resolved URI on `node`.
    pub uri: Url,
    pub body: Option<Bytes>,
    pub timeout: Duration,
}

/// Status and body of a completed exchange. Non-2xx statuses are not errors
/// at this level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub body: Bytes,
}

impl WireResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, for error messages.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The async trait every wire implementation provides.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; one connection serves every call.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn Connection>`.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Perform one exchange. Implementations should honour `request.timeout`;
    /// the controller enforces it as well.
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        assert!(WireResponse::new(200, "").is_success());
        assert!(WireResponse::new(204, "").is_success());
        assert!(!WireResponse::new(404, "").is_success());
        assert!(!WireResponse::new(503, "").is_success());
    }

    #[test]
    fn body_text_is_lossy() {
        let resp = WireResponse::new(500, vec![b'o', b'k', 0xff]);
        assert_eq!(resp.body_text(), "ok\u{fffd}");
    }
}
