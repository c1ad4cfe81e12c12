use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::monitor::{StoreEvent, StoreMonitor};
use crate::runtime::StoreId;

/// Adjacency of observed stores, with an instance count per edge so that two
/// subscriptions between the same pair each own one edge.
type Edges = HashMap<StoreId, HashMap<StoreId, usize>>;

/// Directed "observer → observed" relation between stores.
#[derive(Default)]
pub struct ObservationGraph {
    edges: Mutex<Edges>,
}

static SHARED: Lazy<ObservationGraph> = Lazy::new(ObservationGraph::default);

impl ObservationGraph {
    pub fn shared() -> &'static ObservationGraph {
        &SHARED
    }

    /// Add `from → to`, reporting and refusing it when `to` already reaches
    /// `from`.
    pub fn record_edge(&self, from: StoreId, to: StoreId) -> StoreResult<()> {
        let result = self.try_add_edge(from, to);
        if let Err(error) = &result {
            tracing::warn!(%from, %to, "cyclic observation refused");
            let monitor = StoreMonitor::shared();
            monitor.record(|| StoreEvent::CyclicObserve { from, to });
            monitor.fatal(error.clone());
        }
        result
    }

    /// Add `from → to` without reporting a refusal.
    pub fn try_add_edge(&self, from: StoreId, to: StoreId) -> StoreResult<()> {
        let mut edges = self.edges.lock();
        if from == to || reachable(&edges, to, from) {
            return Err(StoreError::CyclicObserve { from, to });
        }
        *edges.entry(from).or_default().entry(to).or_insert(0) += 1;
        Ok(())
    }

    /// Remove one instance of `from → to`. Returns whether one existed.
    pub fn remove_edge(&self, from: StoreId, to: StoreId) -> bool {
        let mut edges = self.edges.lock();
        let Some(targets) = edges.get_mut(&from) else {
            return false;
        };
        let Some(count) = targets.get_mut(&to) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            targets.remove(&to);
            if targets.is_empty() {
                edges.remove(&from);
            }
        }
        true
    }

    /// Whether `from` observes `to`, directly or through other stores.
    pub fn observes(&self, from: StoreId, to: StoreId) -> bool {
        reachable(&self.edges.lock(), from, to)
    }

    /// Number of live `from → to` edge instances.
    pub fn edge_count(&self, from: StoreId, to: StoreId) -> usize {
        self.edges
            .lock()
            .get(&from)
            .and_then(|targets| targets.get(&to))
            .copied()
            .unwrap_or(0)
    }
}

fn reachable(edges: &Edges, start: StoreId, target: StoreId) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        if let Some(targets) = edges.get(&node) {
            for &next in targets.keys() {
                if next == target {
                    return true;
                }
                stack.push(next);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<const N: usize>() -> [StoreId; N] {
        std::array::from_fn(|_| StoreId::next())
    }

    #[test]
    fn direct_cycle_is_refused_both_ways() {
        let graph = ObservationGraph::default();
        let [a, b] = ids::<2>();
        graph.try_add_edge(a, b).unwrap();
        assert_eq!(
            graph.try_add_edge(b, a),
            Err(StoreError::CyclicObserve { from: b, to: a })
        );

        let graph = ObservationGraph::default();
        graph.try_add_edge(b, a).unwrap();
        assert!(graph.try_add_edge(a, b).is_err());
    }

    #[test]
    fn self_observation_is_a_cycle() {
        let graph = ObservationGraph::default();
        let [a] = ids::<1>();
        assert!(graph.try_add_edge(a, a).is_err());
    }

    #[test]
    fn transitive_cycle_and_recovery() {
        let graph = ObservationGraph::default();
        let [a, b, c] = ids::<3>();
        graph.try_add_edge(a, b).unwrap();
        graph.try_add_edge(b, c).unwrap();
        assert!(graph.observes(a, c));
        assert!(graph.try_add_edge(c, a).is_err());

        assert!(graph.remove_edge(a, b));
        assert!(!graph.observes(a, c));
        graph.try_add_edge(c, a).unwrap();
    }

    #[test]
    fn diamond_terminates() {
        let graph = ObservationGraph::default();
        let [top, left, right, bottom] = ids::<4>();
        graph.try_add_edge(top, left).unwrap();
        graph.try_add_edge(top, right).unwrap();
        graph.try_add_edge(left, bottom).unwrap();
        graph.try_add_edge(right, bottom).unwrap();
        assert!(graph.observes(top, bottom));
        assert!(!graph.observes(bottom, top));
        assert!(graph.try_add_edge(bottom, top).is_err());
    }

    #[test]
    fn edges_are_counted() {
        let graph = ObservationGraph::default();
        let [a, b] = ids::<2>();
        graph.try_add_edge(a, b).unwrap();
        graph.try_add_edge(a, b).unwrap();
        assert_eq!(graph.edge_count(a, b), 2);
        assert!(graph.remove_edge(a, b));
        assert!(graph.observes(a, b));
        assert!(graph.remove_edge(a, b));
        assert!(!graph.observes(a, b));
        assert!(!graph.remove_edge(a, b));
    }
}
