//! Parsing of the cluster nodes document returned by a sniff.

use serde_json::Value;
use thiserror::Error;

use crate::node::Node;

#[derive(Debug, Error)]
pub enum SniffError {
    #[error("sniff response is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sniff response has no `nodes` object")]
    MissingNodes,
}

/// Extract HTTP-enabled nodes from a `_nodes` response.
///
/// Accepts both `"http_address": "inet[host/10.0.0.1:9200]"` and
/// `"http": {"publish_address": "10.0.0.1:9200"}`. Nodes without an HTTP
/// address (client-less data nodes) are skipped. `scheme` is taken from the
/// node that answered the sniff.
pub fn parse_nodes(body: &[u8], scheme: &str) -> Result<Vec<Node>, SniffError> {
    let doc: Value = serde_json::from_slice(body)?;
    let nodes = doc
        .get("nodes")
        .and_then(Value::as_object)
        .ok_or(SniffError::MissingNodes)?;

    let mut found = Vec::with_capacity(nodes.len());
    for (id, info) in nodes {
        let address = info
            .get("http_address")
            .and_then(Value::as_str)
            .or_else(|| info.pointer("/http/publish_address").and_then(Value::as_str));
        let Some(address) = address.and_then(host_port) else {
            tracing::debug!(node_id = %id, "sniffed node has no HTTP address; skipping");
            continue;
        };
        match Node::parse(&format!("{scheme}://{address}")) {
            Ok(node) if !found.contains(&node) => found.push(node),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(node_id = %id, address, error = %e, "unparseable sniffed address")
            }
        }
    }
    Ok(found)
}

/// `inet[host/1.2.3.4:9200]` → `1.2.3.4:9200`; `host/1.2.3.4:9200` →
/// `1.2.3.4:9200`; `1.2.3.4:9200` unchanged.
fn host_port(raw: &str) -> Option<&str> {
    let inner = raw
        .strip_prefix("inet[")
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(raw);
    let address = match inner.rsplit_once('/') {
        Some((_, addr)) => addr,
        None => inner,
    };
    (!address.is_empty()).then_some(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inet_addresses() {
        let body = br#"{
            "cluster_name": "es",
            "nodes": {
                "n1": {"name": "one", "http_address": "inet[/10.0.0.1:9200]"},
                "n2": {"name": "two", "http_address": "inet[es-2/10.0.0.2:9200]"},
                "n3": {"name": "data-only"}
            }
        }"#;
        let nodes = parse_nodes(body, "http").unwrap();
        let uris: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
        assert_eq!(uris, vec!["http://10.0.0.1:9200/", "http://10.0.0.2:9200/"]);
    }

    #[test]
    fn parses_publish_address() {
        let body = br#"{"nodes": {"x": {"http": {"publish_address": "192.168.1.5:9201"}}}}"#;
        let nodes = parse_nodes(body, "https").unwrap();
        assert_eq!(nodes[0].to_string(), "https://192.168.1.5:9201/");
    }

    #[test]
    fn missing_nodes_object() {
        assert!(matches!(parse_nodes(b"{}", "http"), Err(SniffError::MissingNodes)));
        assert!(matches!(parse_nodes(b"<html>", "http"), Err(SniffError::Json(_))));
    }

    #[test]
    fn host_port_forms() {
        assert_eq!(host_port("inet[/1.2.3.4:9200]"), Some("1.2.3.4:9200"));
        assert_eq!(host_port("host/1.2.3.4:9200"), Some("1.2.3.4:9200"));
        assert_eq!(host_port("1.2.3.4:9200"), Some("1.2.3.4:9200"));
        assert_eq!(host_port("inet[]"), None);
    }
}
