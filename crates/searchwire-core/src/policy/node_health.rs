//! Per-node liveness: Alive → Dead → Resurrected.
//!
//! State transitions:
//! - `Alive` → `Dead`:        consecutive failures reach `failure_threshold`
//! - `Dead` → `Resurrected`:  the dead timeout has elapsed
//! - `Resurrected` → `Alive`: a request succeeds
//! - `Resurrected` → `Dead`:  a request fails (with a longer timeout)
//!
//! The dead timeout grows as `dead_timeout × 2^(failures − 1)`, capped at
//! `max_dead_timeout`.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Node liveness as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Serving requests normally.
    Alive,
    /// Skipped by selection until its timeout elapses.
    Dead,
    /// Timeout elapsed; offered again on probation.
    Resurrected,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alive => write!(f, "alive"),
            Self::Dead => write!(f, "dead"),
            Self::Resurrected => write!(f, "resurrected"),
        }
    }
}

/// Configuration for node health tracking.
#[derive(Debug, Clone)]
pub struct NodeHealthConfig {
    /// Consecutive failures before a node is marked dead.
    pub failure_threshold: u32,
    /// Base time a dead node is skipped for.
    pub dead_timeout: Duration,
    /// Upper bound on the backoff-grown dead timeout.
    pub max_dead_timeout: Duration,
}

impl Default for NodeHealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 1,
            dead_timeout: Duration::from_secs(60),
            max_dead_timeout: Duration::from_secs(30 * 60),
        }
    }
}

struct HealthInner {
    state: NodeState,
    failures: u32,
    dead_until: Option<Instant>,
}

/// Thread-safe liveness tracker for one node.
pub struct NodeHealth {
    config: NodeHealthConfig,
    inner: Mutex<HealthInner>,
}

impl NodeHealth {
    /// Create a tracker in the `Alive` state.
    pub fn new(config: NodeHealthConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(HealthInner {
                state: NodeState::Alive,
                failures: 0,
                dead_until: None,
            }),
        }
    }

    /// Current state, moving Dead → Resurrected once the timeout has elapsed.
    pub fn state(&self) -> NodeState {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.state == NodeState::Dead {
            if let Some(until) = inner.dead_until {
                if Instant::now() >= until {
                    inner.state = NodeState::Resurrected;
                    tracing::info!(failures = inner.failures, "node resurrected");
                }
            }
        }
        inner.state
    }

    /// Returns `true` unless the node is currently dead.
    pub fn is_alive(&self) -> bool {
        self.state() != NodeState::Dead
    }

    /// When a dead node becomes eligible again; `None` if not dead.
    pub fn dead_until(&self) -> Option<Instant> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.state {
            NodeState::Dead => inner.dead_until,
            _ => None,
        }
    }

    pub fn failures(&self) -> u32 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).failures
    }

    /// Record a successful exchange.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.state != NodeState::Alive {
            tracing::info!("node back alive");
        }
        inner.state = NodeState::Alive;
        inner.failures = 0;
        inner.dead_until = None;
    }

    /// Record a failed exchange.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.failures = inner.failures.saturating_add(1);
        if inner.failures < self.config.failure_threshold && inner.state == NodeState::Alive {
            return;
        }
        let timeout = self.dead_timeout_for(inner.failures);
        inner.state = NodeState::Dead;
        inner.dead_until = Some(Instant::now() + timeout);
        tracing::warn!(
            failures = inner.failures,
            dead_for_ms = timeout.as_millis() as u64,
            "node marked dead"
        );
    }

    fn dead_timeout_for(&self, failures: u32) -> Duration {
        let over = failures.saturating_sub(self.config.failure_threshold).min(16);
        self.config
            .dead_timeout
            .saturating_mul(1u32 << over)
            .min(self.config.max_dead_timeout)
    }
}

impl std::fmt::Debug for NodeHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHealth")
            .field("state", &self.state())
            .finish()
    }
}
