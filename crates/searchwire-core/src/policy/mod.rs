//! Reliability policies consulted by the failover loop and the node pool.
//!
//! ```text
//! Call → [FailoverController] → select node (pool + NodeHealth)
//!                             → failover delay (RetryPolicy) → wire
//! ```

pub mod node_health;
pub mod retry;

pub use node_health::{NodeHealth, NodeHealthConfig, NodeState};
pub use retry::{RetryConfig, RetryPolicy};
