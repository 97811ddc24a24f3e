//! Cluster node identity.

use serde::{Deserialize, Serialize};
use url::Url;

/// One HTTP endpoint of the cluster, identified by its base URI.
///
/// The base path always ends in `/` so that request paths are appended to it
/// rather than replacing its last segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Url", into = "Url")]
pub struct Node {
    uri: Url,
}

impl Node {
    pub fn new(mut uri: Url) -> Self {
        if !uri.path().ends_with('/') {
            let path = format!("{}/", uri.path());
            uri.set_path(&path);
        }
        uri.set_query(None);
        uri.set_fragment(None);
        Self { uri }
    }

    /// Parse a node from a string such as `http://localhost:9200`.
    pub fn parse(uri: &str) -> Result<Self, url::ParseError> {
        Url::parse(uri).map(Self::new)
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// `host:port` of this node, for log fields and metric labels.
    pub fn authority(&self) -> String {
        match (self.uri.host_str(), self.uri.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => self.uri.to_string(),
        }
    }

    /// Append `path` to this node's base URI.
    ///
    /// Leading slashes are ignored so that `/_search` and `_search` resolve to
    /// the same URI. A first segment containing `:` (`remote:logs`) stays a
    /// path segment and is never read as a scheme.
    pub fn join(&self, path: &str) -> Result<Url, url::ParseError> {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            return Ok(self.uri.clone());
        }
        self.uri.join(&format!("./{relative}"))
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uri)
    }
}

impl std::str::FromStr for Node {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Url> for Node {
    fn from(uri: Url) -> Self {
        Self::new(uri)
    }
}

impl From<Node> for Url {
    fn from(node: Node) -> Self {
        node.uri
    }
}
