//! Pruned proximity-graph construction.
//!
//! The builder makes two full passes over a deterministically shuffled
//! vertex order. Per vertex it beam-searches the graph built so far from the
//! medoid, prunes the expanded candidates under the alpha rule, installs the
//! pruned list, and mirrors each accepted edge back onto its target
//! (re-pruning targets that overflow the degree bound). The first pass
//! prunes at alpha = 1.0; the second at the configured relaxation, which
//! keeps longer shortcut edges alive.
//!
//! Insertion is batched: every vertex in a batch searches the pre-batch
//! graph in parallel, then updates are applied in two phases (forward lists,
//! then reverse edges grouped by target), so the result is reproducible.

use rayon::prelude::*;

use crate::config::{BuildParams, QueryParams};
use crate::distance::l2_squared_aligned;
use crate::error::Result;
use crate::index::adjacency::{AdjacencyGraph, GraphBuilder};
use crate::index::beam::{beam_search, Neighbor};
use crate::points::SubsetPoints;

/// Fixed shuffle seed: builds are reproducible run to run.
const SHUFFLE_SEED: u64 = 0x5DEE_CE66_D1A4_B5B5;

/// Insertion batches double from 1 up to this cap, so early vertices wire
/// up a navigable core before the bulk inserts in parallel.
const MAX_BATCH: usize = 4096;

/// Medoid selection works on at most this many sampled points.
const MEDOID_SAMPLE: usize = 1000;

/// SplitMix64, enough randomness for a shuffle without an RNG dependency.
struct SplitMix64(u64);

impl SplitMix64 {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound as u64) as usize
    }
}

/// Builds the pruned graph over `points`; returns the graph and the medoid
/// (the entry vertex for every later search).
///
/// # Errors
///
/// Returns [`crate::error::Error::Build`] if the finished graph violates a
/// degree or edge invariant.
pub fn build_graph(points: &SubsetPoints, params: &BuildParams) -> Result<(AdjacencyGraph, u32)> {
    let n = points.len();
    if n == 0 {
        return Ok((AdjacencyGraph::new(params.max_degree, 0), 0));
    }

    let medoid = find_medoid(points);
    let builder = GraphBuilder::new(params.max_degree, n);

    let mut order: Vec<u32> = (0..n as u32).collect();
    shuffle(&mut order);

    let search_params = QueryParams {
        k: params.beam_width,
        beam_width: params.beam_width,
        cut: 1.0,
        limit: usize::MAX,
        degree_limit: params.max_degree,
    };

    for alpha in [1.0, params.alpha] {
        let mut start = 0;
        let mut batch = 1;
        while start < order.len() {
            let end = (start + batch).min(order.len());
            insert_batch(
                points,
                &builder,
                &order[start..end],
                medoid,
                alpha,
                params,
                &search_params,
            );
            start = end;
            batch = (batch * 2).min(MAX_BATCH);
        }
    }

    let graph = builder.freeze()?;
    tracing::debug!(
        vertices = n,
        avg_degree = graph.average_degree(),
        "graph build finished"
    );
    Ok((graph, medoid))
}

fn shuffle(order: &mut [u32]) {
    let mut rng = SplitMix64(SHUFFLE_SEED);
    for i in (1..order.len()).rev() {
        order.swap(i, rng.below(i + 1));
    }
}

/// Medoid approximation: the sampled point minimizing summed distance to
/// the sample.
fn find_medoid(points: &SubsetPoints) -> u32 {
    let n = points.len();
    let sample = n.min(MEDOID_SAMPLE);
    // evenly strided sample, no need for randomness here
    let picks: Vec<u32> = (0..sample).map(|i| (i * n / sample) as u32).collect();

    let (best, _) = picks
        .par_iter()
        .map(|&candidate| {
            let total: f64 = picks
                .iter()
                .map(|&other| {
                    f64::from(l2_squared_aligned(points.point(candidate), points.point(other)))
                })
                .sum();
            (candidate, total)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
        .expect("sample is non-empty");

    best
}

#[allow(clippy::too_many_arguments)]
fn insert_batch(
    points: &SubsetPoints,
    builder: &GraphBuilder,
    batch: &[u32],
    medoid: u32,
    alpha: f32,
    params: &BuildParams,
    search_params: &QueryParams,
) {
    // Phase 1: every vertex searches the pre-batch graph and prunes its
    // candidate pool. No writes happen yet.
    let pruned: Vec<(u32, Vec<u32>)> = batch
        .par_iter()
        .map(|&v| {
            let result = beam_search(points.point(v), builder, points, medoid, search_params);

            let mut candidates = result.visited;
            for id in builder.neighbors(v) {
                candidates.push(Neighbor {
                    id,
                    dist: l2_squared_aligned(points.point(v), points.point(id)),
                });
            }

            (v, robust_prune(points, v, candidates, alpha, params.max_degree))
        })
        .collect();

    // Phase 2: install the forward lists; each vertex appears once per batch.
    pruned
        .par_iter()
        .for_each(|(v, list)| builder.set_neighbors(*v, list.clone()));

    // Phase 3: mirror edges, grouped by target so every target is touched by
    // exactly one task.
    let mut reverse: Vec<(u32, u32)> = pruned
        .iter()
        .flat_map(|(v, list)| list.iter().map(|&c| (c, *v)))
        .collect();
    reverse.sort_unstable();

    let groups: Vec<&[(u32, u32)]> = reverse.chunk_by(|a, b| a.0 == b.0).collect();
    groups.par_iter().for_each(|group| {
        let target = group[0].0;
        let overflow = builder.update_neighbors(target, |list| {
            for &(_, v) in *group {
                if v != target && !list.contains(&v) {
                    list.push(v);
                }
            }
            list.len() > params.max_degree
        });

        if overflow {
            let current = builder.neighbors(target);
            let candidates = current
                .iter()
                .map(|&id| Neighbor {
                    id,
                    dist: l2_squared_aligned(points.point(target), points.point(id)),
                })
                .collect();
            let kept = robust_prune(points, target, candidates, alpha, params.max_degree);
            builder.set_neighbors(target, kept);
        }
    });
}

/// Alpha-rule pruning: walking candidates by ascending distance to `v`, a
/// candidate `c` is admitted only if every already-admitted `r` satisfies
/// `alpha * d(c, r) > d(v, c)`.
fn robust_prune(
    points: &SubsetPoints,
    v: u32,
    mut candidates: Vec<Neighbor>,
    alpha: f32,
    max_degree: usize,
) -> Vec<u32> {
    candidates.sort_unstable();
    candidates.dedup_by_key(|c| c.id);

    let mut kept: Vec<u32> = Vec::with_capacity(max_degree);
    for candidate in &candidates {
        if candidate.id == v {
            continue;
        }
        if kept.len() == max_degree {
            break;
        }

        let dominated = kept.iter().any(|&r| {
            let between = l2_squared_aligned(points.point(candidate.id), points.point(r));
            alpha * between <= candidate.dist
        });
        if !dominated {
            kept.push(candidate.id);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::PointRange;
    use std::sync::Arc;

    fn grid_subset(n: usize) -> SubsetPoints {
        // deterministic pseudo-random cloud in 16 dims
        let rows: Vec<Vec<f32>> = (0..n)
            .map(|i| {
                (0..16)
                    .map(|j| {
                        if j == 0 {
                            i as f32
                        } else {
                            (((i * 31 + j * 17) % 97) as f32) / 97.0
                        }
                    })
                    .collect()
            })
            .collect();
        let ids: Vec<u32> = (0..n as u32).collect();
        SubsetPoints::new(Arc::new(PointRange::from_rows(&rows, 16)), ids)
    }

    fn small_params() -> BuildParams {
        BuildParams {
            max_degree: 8,
            beam_width: 32,
            alpha: 1.175,
        }
    }

    #[test]
    fn test_shuffle_is_deterministic_permutation() {
        let mut a: Vec<u32> = (0..100).collect();
        let mut b: Vec<u32> = (0..100).collect();
        shuffle(&mut a);
        shuffle(&mut b);
        assert_eq!(a, b);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<u32>>());
        assert_ne!(a, sorted);
    }

    #[test]
    fn test_build_respects_graph_invariants() {
        let subset = grid_subset(200);
        let params = small_params();
        let (graph, medoid) = build_graph(&subset, &params).unwrap();

        assert_eq!(graph.len(), 200);
        assert!((medoid as usize) < 200);
        for v in 0..200u32 {
            let neighbors = graph.neighbors(v);
            assert!(neighbors.len() <= params.max_degree);
            assert!(!neighbors.contains(&v));
            let mut sorted = neighbors.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), neighbors.len());
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let subset = grid_subset(120);
        let params = small_params();
        let (a, medoid_a) = build_graph(&subset, &params).unwrap();
        let (b, medoid_b) = build_graph(&subset, &params).unwrap();

        assert_eq!(medoid_a, medoid_b);
        for v in 0..120u32 {
            assert_eq!(a.neighbors(v), b.neighbors(v));
        }
    }

    #[test]
    fn test_searchable_after_build() {
        let subset = grid_subset(150);
        let params = small_params();
        let (graph, medoid) = build_graph(&subset, &params).unwrap();

        let qp = QueryParams {
            k: 5,
            beam_width: 32,
            cut: 1.35,
            limit: 100_000,
            degree_limit: 8,
        };
        // every point should find itself
        for v in (0..150u32).step_by(10) {
            let result = beam_search(subset.point(v), &graph, &subset, medoid, &qp);
            assert!(
                result.top_k(5).iter().any(|n| n.id == v),
                "vertex {v} not reachable from the medoid"
            );
        }
    }

    #[test]
    fn test_tiny_inputs() {
        let params = small_params();

        let one = grid_subset(1);
        let (graph, medoid) = build_graph(&one, &params).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(medoid, 0);
        assert_eq!(graph.degree(0), 0);

        let two = grid_subset(2);
        let (graph, _) = build_graph(&two, &params).unwrap();
        assert_eq!(graph.neighbors(0), &[1]);
        assert_eq!(graph.neighbors(1), &[0]);
    }

    #[test]
    fn test_robust_prune_drops_dominated_candidates() {
        // three collinear points: the far one is dominated by the near one
        let rows = vec![
            vec![0.0; 16],
            {
                let mut r = vec![0.0; 16];
                r[0] = 1.0;
                r
            },
            {
                let mut r = vec![0.0; 16];
                r[0] = 2.0;
                r
            },
        ];
        let subset = SubsetPoints::new(Arc::new(PointRange::from_rows(&rows, 16)), vec![0, 1, 2]);

        let candidates = vec![
            Neighbor { id: 1, dist: 1.0 },
            Neighbor { id: 2, dist: 4.0 },
        ];
        let kept = robust_prune(&subset, 0, candidates, 1.0, 8);
        // d(1, 2) = 1, alpha * 1 <= 4 so vertex 2 is pruned
        assert_eq!(kept, vec![1]);

        // with room for doubt (large alpha) the long edge survives
        let candidates = vec![
            Neighbor { id: 1, dist: 1.0 },
            Neighbor { id: 2, dist: 4.0 },
        ];
        let kept = robust_prune(&subset, 0, candidates, 5.0, 8);
        assert_eq!(kept, vec![1, 2]);
    }
}
