//! Fixed-degree adjacency storage for proximity graphs.
//!
//! The frozen [`AdjacencyGraph`] keeps all neighbor lists in one flat
//! `u32` buffer of `n * (R + 1)` slots: slot 0 of each vertex holds the
//! current out-degree and slots `1..=degree` hold neighbor ids. One
//! allocation, one cache line fetch per small neighborhood.
//!
//! Construction happens on the mutable, lockable [`GraphBuilder`] instead,
//! whose per-vertex `RwLock`s let the builder update neighbor lists from
//! many threads, then `freeze` validates the invariants and packs the flat
//! form.

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Immutable fixed-degree out-neighbor storage.
#[derive(Debug)]
pub struct AdjacencyGraph {
    max_degree: usize,
    slots: Vec<u32>,
    n: usize,
}

impl AdjacencyGraph {
    /// Allocates an edgeless graph of `n` vertices with out-degree bound
    /// `max_degree`.
    #[must_use]
    pub fn new(max_degree: usize, n: usize) -> Self {
        Self {
            max_degree,
            slots: vec![0; n * (max_degree + 1)],
            n,
        }
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Returns true if the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Out-degree bound (R).
    #[must_use]
    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Current out-degree of vertex `v`.
    #[inline]
    #[must_use]
    pub fn degree(&self, v: u32) -> usize {
        self.slots[v as usize * (self.max_degree + 1)] as usize
    }

    /// Out-neighbors of vertex `v`.
    #[inline]
    #[must_use]
    pub fn neighbors(&self, v: u32) -> &[u32] {
        let base = v as usize * (self.max_degree + 1);
        let degree = self.slots[base] as usize;
        &self.slots[base + 1..base + 1 + degree]
    }

    /// Replaces the out-neighbors of vertex `v`.
    ///
    /// # Panics
    ///
    /// Panics if `list` exceeds the degree bound.
    pub fn set_neighbors(&mut self, v: u32, list: &[u32]) {
        assert!(
            list.len() <= self.max_degree,
            "neighbor list of {} exceeds max degree {}",
            list.len(),
            self.max_degree
        );
        let base = v as usize * (self.max_degree + 1);
        self.slots[base] = list.len() as u32;
        self.slots[base + 1..base + 1 + list.len()].copy_from_slice(list);
    }

    /// Mean out-degree across all vertices.
    #[must_use]
    pub fn average_degree(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let total: usize = (0..self.n).map(|v| self.degree(v as u32)).sum();
        total as f64 / self.n as f64
    }
}

/// Concurrent adjacency under construction.
///
/// Per-vertex locks serialize neighbor-list updates; readers clone the list
/// they need so no lock outlives a single access.
pub struct GraphBuilder {
    max_degree: usize,
    adjacency: Vec<RwLock<Vec<u32>>>,
}

impl GraphBuilder {
    /// Creates an edgeless builder for `n` vertices.
    #[must_use]
    pub fn new(max_degree: usize, n: usize) -> Self {
        Self {
            max_degree,
            adjacency: (0..n).map(|_| RwLock::new(Vec::new())).collect(),
        }
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    /// Returns true if the builder has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Out-degree bound (R).
    #[must_use]
    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Snapshot of the out-neighbors of vertex `v`.
    #[must_use]
    pub fn neighbors(&self, v: u32) -> Vec<u32> {
        self.adjacency[v as usize].read().clone()
    }

    /// Replaces the out-neighbors of vertex `v`.
    pub fn set_neighbors(&self, v: u32, list: Vec<u32>) {
        *self.adjacency[v as usize].write() = list;
    }

    /// Runs `f` on the locked neighbor list of vertex `v`.
    pub fn update_neighbors<R>(&self, v: u32, f: impl FnOnce(&mut Vec<u32>) -> R) -> R {
        f(&mut self.adjacency[v as usize].write())
    }

    /// Validates the graph invariants and packs the flat immutable form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Build`] on a degree overflow, a self loop, or a
    /// duplicate edge.
    pub fn freeze(self) -> Result<AdjacencyGraph> {
        let mut graph = AdjacencyGraph::new(self.max_degree, self.adjacency.len());

        for (v, lock) in self.adjacency.iter().enumerate() {
            let list = lock.read();
            if list.len() > self.max_degree {
                return Err(Error::Build(format!(
                    "vertex {v} has degree {} above bound {}",
                    list.len(),
                    self.max_degree
                )));
            }
            let mut sorted = list.clone();
            sorted.sort_unstable();
            if sorted.windows(2).any(|w| w[0] == w[1]) {
                return Err(Error::Build(format!("vertex {v} has a duplicate edge")));
            }
            if list.contains(&(v as u32)) {
                return Err(Error::Build(format!("vertex {v} has a self loop")));
            }
            graph.set_neighbors(v as u32, &list);
        }

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_storage_round_trip() {
        let mut graph = AdjacencyGraph::new(4, 3);
        assert_eq!(graph.degree(1), 0);

        graph.set_neighbors(1, &[0, 2]);
        assert_eq!(graph.neighbors(1), &[0, 2]);
        assert_eq!(graph.degree(1), 2);
        assert_eq!(graph.neighbors(0), &[] as &[u32]);

        graph.set_neighbors(1, &[2]);
        assert_eq!(graph.neighbors(1), &[2]);
    }

    #[test]
    #[should_panic(expected = "exceeds max degree")]
    fn test_degree_bound_is_enforced() {
        let mut graph = AdjacencyGraph::new(2, 3);
        graph.set_neighbors(0, &[1, 2, 1]);
    }

    #[test]
    fn test_builder_freeze() {
        let builder = GraphBuilder::new(3, 4);
        builder.set_neighbors(0, vec![1, 2]);
        builder.update_neighbors(2, |list| list.push(3));

        let graph = builder.freeze().unwrap();
        assert_eq!(graph.neighbors(0), &[1, 2]);
        assert_eq!(graph.neighbors(2), &[3]);
        assert!((graph.average_degree() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_freeze_rejects_self_loop() {
        let builder = GraphBuilder::new(3, 2);
        builder.set_neighbors(1, vec![1]);
        let err = builder.freeze().unwrap_err();
        assert_eq!(err.code(), "STRATA-004");
    }

    #[test]
    fn test_freeze_rejects_duplicate_edge() {
        let builder = GraphBuilder::new(3, 2);
        builder.set_neighbors(0, vec![1, 1]);
        assert!(builder.freeze().is_err());
    }

    #[test]
    fn test_freeze_rejects_degree_overflow() {
        let builder = GraphBuilder::new(1, 3);
        builder.set_neighbors(0, vec![1, 2]);
        assert!(builder.freeze().is_err());
    }
}
