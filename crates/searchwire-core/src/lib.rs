//! searchwire-core: failover transport core for clustered search services.
//!
//! # Overview
//!
//! One logical call (method, path, body) is driven across a pool of
//! interchangeable nodes until it succeeds, fails fatally or runs out of
//! candidates. Every network attempt is timed and recorded, and the call
//! ends in a single immutable [`ResultEnvelope`]. The crate defines:
//!
//! - [`FailoverController`]: the retry / ping / sniff loop
//! - [`CallContext`]: per-call bookkeeping and path resolution
//! - [`AttemptTimer`]: scoped timer that records exactly one attempt
//! - [`Connection`]: the async trait a wire transport implements
//! - [`NodePool`]: node selection, health and reseeding
//! - [`CallError`] / [`TransportError`]: structured errors
//! - [`policy`] module: node health and failover backoff

pub mod connection;
pub mod context;
pub mod diagnostics;
pub mod envelope;
pub mod error;
pub mod failover;
pub mod node;
pub mod policy;
pub mod pool;
pub mod request;
pub mod serializer;
pub mod settings;
pub mod sniff;
pub mod timer;

pub use connection::{Connection, WireRequest, WireResponse};
pub use context::{CallContext, CallOutcome, PhaseTimings};
pub use diagnostics::{
    AttemptKind, AttemptLog, AttemptRecord, CallDiagnostics, CallMetrics, DiagnosticsSink,
    NodeTrail, StatusHandler, TracingSink,
};
pub use envelope::{AcknowledgedResponse, ResponsePayload, ResultEnvelope};
pub use error::{CallError, ErrorKind, TransportError};
pub use failover::FailoverController;
pub use node::Node;
pub use pool::{NodePool, NodePoolConfig, SingleNodePool, StaticNodePool};
pub use request::{HttpMethod, LogicalCall, RequestBody, RequestOptions};
pub use serializer::{CodecError, JsonSerializer, Serializer};
pub use settings::TransportSettings;
pub use timer::AttemptTimer;
