//! Node pools: candidate selection, health bookkeeping and reseeding.
//!
//! The failover controller only talks to [`NodePool`]. Pools are shared by
//! every in-flight call and must tolerate concurrent selection and reporting.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use crate::node::Node;
use crate::policy::{NodeHealth, NodeHealthConfig, NodeState};

/// Candidate source and health ledger shared by all calls.
pub trait NodePool: Send + Sync {
    /// Next node to try, or `None` when the pool has nothing to offer.
    ///
    /// `epoch` is the generation the caller last observed; pools may use it
    /// to detect callers racing a reseed.
    fn next_candidate(&self, epoch: u64) -> Option<Node>;

    fn report_failure(&self, node: &Node);

    fn report_success(&self, node: &Node);

    /// Generation counter, bumped by every reseed.
    fn current_epoch(&self) -> u64;

    /// A node every call must use, bypassing rotation.
    fn forced_node(&self) -> Option<Node> {
        None
    }

    /// Number of known nodes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all known nodes, alive or not.
    fn nodes(&self) -> Vec<Node>;

    /// Whether sniff results may replace the node list.
    fn supports_reseeding(&self) -> bool {
        false
    }

    /// Replace the known nodes with a sniffed list and bump the epoch.
    fn reseed(&self, _nodes: Vec<Node>) {}

    /// When the node list was last replaced by a sniff.
    fn last_reseed(&self) -> Option<Instant> {
        None
    }

    /// Returns `true` when health bookkeeping suggests the known node set is
    /// out of date (every node currently dead).
    fn is_stale(&self) -> bool {
        false
    }
}

/// Configuration for [`StaticNodePool`].
#[derive(Debug, Clone, Default)]
pub struct NodePoolConfig {
    /// Health tracking shared across all nodes.
    pub health: NodeHealthConfig,
}

struct NodeSlot {
    node: Node,
    health: NodeHealth,
}

/// Round-robin pool with per-node health tracking.
///
/// Dead nodes are skipped. If every node is dead, the one whose dead
/// timeout expires first is offered anyway so a client never wedges.
pub struct StaticNodePool {
    slots: RwLock<Vec<Arc<NodeSlot>>>,
    cursor: AtomicUsize,
    epoch: AtomicU64,
    reseedable: bool,
    last_reseed: Mutex<Option<Instant>>,
    config: NodePoolConfig,
}

impl StaticNodePool {
    /// A fixed pool: sniff results are ignored.
    pub fn new(nodes: Vec<Node>, config: NodePoolConfig) -> Self {
        Self::build(nodes, config, false)
    }

    /// A pool whose node list is replaced by sniff results.
    pub fn sniffing(nodes: Vec<Node>, config: NodePoolConfig) -> Self {
        Self::build(nodes, config, true)
    }

    fn build(nodes: Vec<Node>, config: NodePoolConfig, reseedable: bool) -> Self {
        let slots = Self::dedup(nodes)
            .into_iter()
            .map(|node| Self::slot(node, &config))
            .collect();
        Self {
            slots: RwLock::new(slots),
            cursor: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
            reseedable,
            last_reseed: Mutex::new(None),
            config,
        }
    }

    fn slot(node: Node, config: &NodePoolConfig) -> Arc<NodeSlot> {
        Arc::new(NodeSlot {
            node,
            health: NodeHealth::new(config.health.clone()),
        })
    }

    fn dedup(nodes: Vec<Node>) -> Vec<Node> {
        let mut unique: Vec<Node> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if !unique.contains(&node) {
                unique.push(node);
            }
        }
        unique
    }

    fn snapshot(&self) -> Vec<Arc<NodeSlot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn find(&self, node: &Node) -> Option<Arc<NodeSlot>> {
        self.snapshot().into_iter().find(|s| &s.node == node)
    }

    /// Node, state and consecutive failure count for every known node.
    pub fn health_summary(&self) -> Vec<(Node, NodeState, u32)> {
        self.snapshot()
            .iter()
            .map(|s| (s.node.clone(), s.health.state(), s.health.failures()))
            .collect()
    }
}

impl NodePool for StaticNodePool {
    fn next_candidate(&self, _epoch: u64) -> Option<Node> {
        let slots = self.snapshot();
        if slots.is_empty() {
            return None;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % slots.len();
        for i in 0..slots.len() {
            let slot = &slots[(start + i) % slots.len()];
            if slot.health.is_alive() {
                return Some(slot.node.clone());
            }
        }
        // Everything is dead: offer the node closest to resurrection.
        slots
            .iter()
            .min_by_key(|s| s.health.dead_until())
            .map(|s| s.node.clone())
    }

    fn report_failure(&self, node: &Node) {
        if let Some(slot) = self.find(node) {
            slot.health.record_failure();
        }
    }

    fn report_success(&self, node: &Node) {
        if let Some(slot) = self.find(node) {
            slot.health.record_success();
        }
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn nodes(&self) -> Vec<Node> {
        self.snapshot().iter().map(|s| s.node.clone()).collect()
    }

    fn supports_reseeding(&self) -> bool {
        self.reseedable
    }

    fn reseed(&self, nodes: Vec<Node>) {
        if !self.reseedable || nodes.is_empty() {
            return;
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        // Nodes that survive the reseed keep their health history.
        let next: Vec<Arc<NodeSlot>> = Self::dedup(nodes)
            .into_iter()
            .map(|node| {
                slots
                    .iter()
                    .find(|s| s.node == node)
                    .cloned()
                    .unwrap_or_else(|| Self::slot(node, &self.config))
            })
            .collect();
        let count = next.len();
        *slots = next;
        self.cursor.store(0, Ordering::Relaxed);
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        *self.last_reseed.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        tracing::info!(nodes = count, epoch, "node pool reseeded");
    }

    fn last_reseed(&self) -> Option<Instant> {
        *self.last_reseed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stale(&self) -> bool {
        let slots = self.snapshot();
        !slots.is_empty() && slots.iter().all(|s| !s.health.is_alive())
    }
}

/// Pool of exactly one node; every call is pinned to it.
#[derive(Debug, Clone)]
pub struct SingleNodePool {
    node: Node,
}

impl SingleNodePool {
    pub fn new(node: Node) -> Self {
        Self { node }
    }
}

impl NodePool for SingleNodePool {
    fn next_candidate(&self, _epoch: u64) -> Option<Node> {
        Some(self.node.clone())
    }

    fn report_failure(&self, _node: &Node) {}

    fn report_success(&self, _node: &Node) {}

    fn current_epoch(&self) -> u64 {
        0
    }

    fn forced_node(&self) -> Option<Node> {
        Some(self.node.clone())
    }

    fn len(&self) -> usize {
        1
    }

    fn nodes(&self) -> Vec<Node> {
        vec![self.node.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn node(uri: &str) -> Node {
        Node::parse(uri).unwrap()
    }

    fn pool(uris: &[&str]) -> StaticNodePool {
        StaticNodePool::new(uris.iter().map(|u| node(u)).collect(), NodePoolConfig::default())
    }

    #[test]
    fn round_robin_rotates() {
        let p = pool(&["http://a:9200", "http://b:9200", "http://c:9200"]);
        let picks: Vec<String> = (0..4)
            .map(|_| p.next_candidate(0).unwrap().authority())
            .collect();
        assert_eq!(picks, vec!["a:9200", "b:9200", "c:9200", "a:9200"]);
    }

    #[test]
    fn dead_nodes_are_skipped() {
        let p = pool(&["http://a:9200", "http://b:9200"]);
        p.report_failure(&node("http://a:9200"));
        for _ in 0..4 {
            assert_eq!(p.next_candidate(0).unwrap(), node("http://b:9200"));
        }
        assert!(!p.is_stale());
    }

    #[test]
    fn all_dead_still_offers_a_node() {
        let p = pool(&["http://a:9200", "http://b:9200"]);
        p.report_failure(&node("http://a:9200"));
        p.report_failure(&node("http://b:9200"));
        assert!(p.is_stale());
        assert!(p.next_candidate(0).is_some());
    }

    #[test]
    fn empty_pool_has_no_candidate() {
        let p = pool(&[]);
        assert!(p.is_empty());
        assert!(p.next_candidate(0).is_none());
    }

    #[test]
    fn duplicates_collapse() {
        let p = pool(&["http://a:9200", "http://a:9200/"]);
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn static_pool_ignores_reseed() {
        let p = pool(&["http://a:9200"]);
        p.reseed(vec![node("http://b:9200")]);
        assert_eq!(p.current_epoch(), 0);
        assert_eq!(p.nodes(), vec![node("http://a:9200")]);
        assert!(p.last_reseed().is_none());
    }

    #[test]
    fn reseed_bumps_epoch_and_keeps_health() {
        let p = StaticNodePool::sniffing(
            vec![node("http://a:9200"), node("http://b:9200")],
            NodePoolConfig {
                health: NodeHealthConfig {
                    dead_timeout: Duration::from_secs(60),
                    ..Default::default()
                },
            },
        );
        p.report_failure(&node("http://a:9200"));
        p.reseed(vec![node("http://a:9200"), node("http://c:9200")]);
        assert_eq!(p.current_epoch(), 1);
        assert!(p.last_reseed().is_some());
        let summary = p.health_summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].1, NodeState::Dead);
        assert_eq!(summary[1].1, NodeState::Alive);
    }

    #[test]
    fn reseed_with_nothing_is_ignored() {
        let p = StaticNodePool::sniffing(vec![node("http://a:9200")], NodePoolConfig::default());
        p.reseed(vec![]);
        assert_eq!(p.current_epoch(), 0);
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn single_node_pool_forces_its_node() {
        let p = SingleNodePool::new(node("http://a:9200"));
        assert_eq!(p.forced_node(), Some(node("http://a:9200")));
        assert_eq!(p.next_candidate(7), Some(node("http://a:9200")));
    }
}
