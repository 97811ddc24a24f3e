//! searchwire-http: HTTP [`Connection`](searchwire_core::Connection)
//! backed by `reqwest`.
//!
//! One [`HttpConnection`] holds a pooled `reqwest::Client` and serves every
//! node of a cluster; the failover controller decides where each request
//! goes.

pub mod connection;

pub use connection::{HttpConnection, HttpConnectionConfig};
