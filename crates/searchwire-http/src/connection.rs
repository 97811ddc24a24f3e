//! `reqwest`-backed implementation of the wire exchange.
//!
//! Non-2xx statuses come back as ordinary responses; classifying them is the
//! failover controller's job. Only failures to complete the exchange at all
//! become [`TransportError`]s.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};

use searchwire_core::connection::{Connection, WireRequest, WireResponse};
use searchwire_core::error::TransportError;
use searchwire_core::request::HttpMethod;

/// Configuration for [`HttpConnection`].
#[derive(Debug, Clone)]
pub struct HttpConnectionConfig {
    /// Timeout for establishing a TCP/TLS connection.
    pub connect_timeout: Duration,
    /// How long an idle pooled connection is kept.
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections kept per node.
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
    /// Headers sent with every request.
    pub headers: Vec<(String, String)>,
}

impl Default for HttpConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 16,
            user_agent: concat!("searchwire/", env!("CARGO_PKG_VERSION")).into(),
            headers: Vec::new(),
        }
    }
}

/// HTTP connection shared by every node and every call.
#[derive(Debug, Clone)]
pub struct HttpConnection {
    http: reqwest::Client,
}

impl HttpConnection {
    /// Build the underlying client. Fails on malformed headers or if the TLS
    /// backend cannot be initialised.
    pub fn new(config: HttpConnectionConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::with_capacity(config.headers.len());
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(format!("header name `{name}`: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidRequest(format!("header `{name}`: {e}")))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent)
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }

    /// Wrap an existing client, e.g. one configured with custom TLS roots.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let WireRequest {
            node,
            method,
            uri,
            body,
            timeout,
        } = request;

        let mut builder = self
            .http
            .request(to_reqwest(method), uri.as_str())
            .timeout(timeout);
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body);
        }

        tracing::trace!(node = %node, method = %method, uri = %uri, "HTTP exchange");
        let resp = builder
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| classify(e, timeout))?;
        Ok(WireResponse::new(status, body))
    }
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout {
            ms: timeout.as_millis() as u64,
        }
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else {
        TransportError::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use searchwire_core::Node;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use url::Url;

    /// Serve one canned response and hand back the raw request head.
    async fn serve_once(response: &'static str) -> (Node, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&buf[..n]).into_owned());
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        (Node::parse(&format!("http://{addr}")).unwrap(), rx)
    }

    fn request(
        node: &Node,
        method: HttpMethod,
        path: &str,
        body: Option<&'static str>,
    ) -> WireRequest {
        WireRequest {
            node: node.clone(),
            method,
            uri: node.join(path).unwrap(),
            body: body.map(|s| Bytes::from_static(s.as_bytes())),
            timeout: Duration::from_secs(5),
        }
    }

    fn connection() -> HttpConnection {
        HttpConnection::new(HttpConnectionConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn returns_status_and_body() {
        let (node, head) = serve_once(
            "HTTP/1.1 201 Created\r\ncontent-length: 15\r\nconnection: close\r\n\r\n\
             {\"result\":\"ok\"}",
        )
        .await;

        let resp = connection()
            .send(request(&node, HttpMethod::Put, "/logs/_doc/1", Some("{\"a\":1}")))
            .await
            .unwrap();

        assert_eq!(resp.status, 201);
        assert_eq!(resp.body.as_ref(), b"{\"result\":\"ok\"}");
        let head = head.await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("put /logs/_doc/1 http/1.1"));
        assert!(head.contains("content-type: application/json"));
    }

    #[tokio::test]
    async fn error_status_is_not_a_transport_error() {
        let (node, _head) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;

        let resp = connection()
            .send(request(&node, HttpMethod::Get, "/", None))
            .await
            .unwrap();

        assert_eq!(resp.status, 503);
        assert!(resp.body.is_empty());
    }

    #[tokio::test]
    async fn refused_connection_maps_to_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let node = Node::new(Url::parse(&format!("http://{addr}")).unwrap());

        let err = connection()
            .send(request(&node, HttpMethod::Get, "/", None))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Connect(_)), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn silent_node_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let node = Node::parse(&format!("http://{addr}")).unwrap();
        let mut req = request(&node, HttpMethod::Get, "/", None);
        req.timeout = Duration::from_millis(100);

        let err = connection().send(req).await.unwrap_err();

        assert_eq!(err, TransportError::Timeout { ms: 100 });
    }

    #[test]
    fn bad_header_is_rejected() {
        let config = HttpConnectionConfig {
            headers: vec![("bad header".into(), "x".into())],
            ..Default::default()
        };
        assert!(matches!(
            HttpConnection::new(config),
            Err(TransportError::InvalidRequest(_))
        ));
    }
}
