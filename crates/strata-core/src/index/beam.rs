//! Greedy beam search over a proximity graph.
//!
//! The search keeps a distance-sorted frontier capped at the beam width and
//! repeatedly expands the closest unexpanded frontier vertex. The `cut`
//! parameter lets the frontier keep expanding slightly past local optimality
//! and `limit` caps the total number of distance comparisons.

use rustc_hash::FxHashSet;
use std::cmp::Ordering;

use crate::config::QueryParams;
use crate::distance::l2_squared_aligned;
use crate::index::adjacency::{AdjacencyGraph, GraphBuilder};
use crate::points::SubsetPoints;

/// A graph candidate: local vertex id plus its distance to the query.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    /// Local vertex id within the searched subset.
    pub id: u32,
    /// Squared L2 distance to the query.
    pub dist: f32,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        // total_cmp gives IEEE 754 total order, so NaN cannot corrupt the
        // frontier; equal distances break toward the lower id.
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Anything beam search can walk: a frozen graph or one under construction.
pub trait NeighborSource {
    /// Appends up to `limit` out-neighbors of `v` to `out`.
    fn copy_neighbors(&self, v: u32, limit: usize, out: &mut Vec<u32>);
}

impl NeighborSource for AdjacencyGraph {
    fn copy_neighbors(&self, v: u32, limit: usize, out: &mut Vec<u32>) {
        let neighbors = self.neighbors(v);
        out.extend_from_slice(&neighbors[..neighbors.len().min(limit)]);
    }
}

impl NeighborSource for GraphBuilder {
    fn copy_neighbors(&self, v: u32, limit: usize, out: &mut Vec<u32>) {
        let neighbors = self.neighbors(v);
        out.extend_from_slice(&neighbors[..neighbors.len().min(limit)]);
    }
}

/// Outcome of one beam search.
pub struct BeamResult {
    /// Final frontier, ascending by distance, at most `beam_width` long.
    pub frontier: Vec<Neighbor>,
    /// Every expanded vertex in expansion order; the candidate pool graph
    /// construction prunes.
    pub visited: Vec<Neighbor>,
    /// Total distance comparisons performed.
    pub dist_cmps: usize,
}

impl BeamResult {
    /// The first `k` frontier entries.
    #[must_use]
    pub fn top_k(&self, k: usize) -> &[Neighbor] {
        &self.frontier[..self.frontier.len().min(k)]
    }
}

/// Runs beam search for `query` over `graph`, starting at `entry`.
///
/// # Panics
///
/// Panics if the subset is empty or `entry` is out of bounds.
#[must_use]
pub fn beam_search<G: NeighborSource>(
    query: &[f32],
    graph: &G,
    points: &SubsetPoints,
    entry: u32,
    params: &QueryParams,
) -> BeamResult {
    let mut frontier = vec![Neighbor {
        id: entry,
        dist: l2_squared_aligned(query, points.point(entry)),
    }];
    let mut dist_cmps = 1;

    let mut seen = FxHashSet::default();
    seen.insert(entry);
    let mut expanded = FxHashSet::default();
    let mut visited = Vec::new();
    let mut fanout = Vec::with_capacity(params.degree_limit);

    loop {
        // The search keeps going while some unexpanded frontier vertex sits
        // within `cut` of the current k-th best distance.
        let kth = frontier[frontier.len().min(params.k) - 1].dist;
        let bound = params.cut * kth;
        let Some(current) = frontier
            .iter()
            .find(|c| !expanded.contains(&c.id) && c.dist <= bound)
            .copied()
        else {
            break;
        };

        expanded.insert(current.id);
        visited.push(current);

        if dist_cmps >= params.limit {
            break;
        }

        fanout.clear();
        graph.copy_neighbors(current.id, params.degree_limit, &mut fanout);
        for &u in &fanout {
            if !seen.insert(u) {
                continue;
            }
            let candidate = Neighbor {
                id: u,
                dist: l2_squared_aligned(query, points.point(u)),
            };
            dist_cmps += 1;

            if frontier.len() < params.beam_width
                || candidate < *frontier.last().expect("frontier is never empty")
            {
                let at = frontier.partition_point(|c| c < &candidate);
                frontier.insert(at, candidate);
                if frontier.len() > params.beam_width {
                    frontier.pop();
                }
            }
        }
    }

    BeamResult {
        frontier,
        visited,
        dist_cmps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::PointRange;
    use std::sync::Arc;

    fn line_subset(positions: &[f32]) -> SubsetPoints {
        let rows: Vec<Vec<f32>> = positions
            .iter()
            .map(|&p| {
                let mut row = vec![0.0; 16];
                row[0] = p;
                row
            })
            .collect();
        let ids: Vec<u32> = (0..positions.len() as u32).collect();
        SubsetPoints::new(Arc::new(PointRange::from_rows(&rows, 16)), ids)
    }

    fn params(k: usize, beam: usize) -> QueryParams {
        QueryParams {
            k,
            beam_width: beam,
            cut: 1.35,
            limit: 10_000,
            degree_limit: 8,
        }
    }

    fn query_at(p: f32) -> Vec<f32> {
        let mut q = vec![0.0; 16];
        q[0] = p;
        q
    }

    #[test]
    fn test_walks_a_chain_to_the_optimum() {
        // 0 -> 1 -> 2 -> 3 -> 4 at positions 0, 10, 20, 30, 40
        let subset = line_subset(&[0.0, 10.0, 20.0, 30.0, 40.0]);
        let mut graph = AdjacencyGraph::new(2, 5);
        for v in 0..4u32 {
            graph.set_neighbors(v, &[v + 1]);
        }

        let result = beam_search(&query_at(38.0), &graph, &subset, 0, &params(2, 3));
        assert_eq!(result.top_k(2)[0].id, 4);
        assert_eq!(result.top_k(2)[1].id, 3);
        assert!(result.dist_cmps >= 5);
    }

    #[test]
    fn test_ties_break_toward_lower_id() {
        // vertices 1 and 2 are equidistant from the query
        let subset = line_subset(&[0.0, -5.0, 5.0, 7.0]);
        let mut graph = AdjacencyGraph::new(3, 4);
        graph.set_neighbors(0, &[1, 2, 3]);
        graph.set_neighbors(2, &[3]);

        let result = beam_search(&query_at(0.0), &graph, &subset, 0, &params(3, 4));
        let ids: Vec<u32> = result.top_k(3).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_comparison_limit_stops_expansion() {
        let subset = line_subset(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut graph = AdjacencyGraph::new(2, 6);
        for v in 0..5u32 {
            graph.set_neighbors(v, &[v + 1]);
        }

        let mut qp = params(1, 2);
        qp.limit = 1; // only the entry comparison is allowed
        let result = beam_search(&query_at(5.0), &graph, &subset, 0, &qp);
        assert_eq!(result.dist_cmps, 1);
        assert_eq!(result.visited.len(), 1);
    }

    #[test]
    fn test_frontier_respects_beam_cap() {
        let subset = line_subset(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let mut graph = AdjacencyGraph::new(7, 8);
        graph.set_neighbors(0, &[1, 2, 3, 4, 5, 6, 7]);

        let result = beam_search(&query_at(0.0), &graph, &subset, 0, &params(2, 3));
        assert_eq!(result.frontier.len(), 3);
        assert_eq!(result.frontier[0].id, 0);
    }

    #[test]
    fn test_single_vertex_subset() {
        let subset = line_subset(&[2.0]);
        let graph = AdjacencyGraph::new(2, 1);
        let result = beam_search(&query_at(2.0), &graph, &subset, 0, &params(1, 2));
        assert_eq!(result.frontier.len(), 1);
        assert_eq!(result.frontier[0].dist, 0.0);
    }
}
