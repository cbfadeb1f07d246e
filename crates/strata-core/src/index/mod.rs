//! Index substrates and the common operation surface.
//!
//! Two substrates answer every query: [`FlatIndex`] scans small subsets
//! exhaustively, [`GraphIndex`] beam-searches a pruned proximity graph.
//! [`Index`] is the tagged union the dispatcher stores by value and routes
//! through, so per-query dispatch costs a match, not a virtual call.

pub mod adjacency;
pub mod beam;
pub mod flat;
pub mod graph;
pub mod vamana;

pub use adjacency::{AdjacencyGraph, GraphBuilder};
pub use beam::{beam_search, BeamResult, Neighbor};
pub use flat::FlatIndex;
pub use graph::GraphIndex;

use graph::fill_stripe;

use crate::points::PointId;

/// A label or window index: exhaustive below the routing cutoff, graph
/// above it.
#[derive(Debug)]
pub enum Index {
    /// Exhaustive scan substrate.
    Flat(FlatIndex),
    /// Proximity-graph substrate.
    Graph(GraphIndex),
}

impl Index {
    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(index) => index.len(),
            Self::Graph(index) => index.len(),
        }
    }

    /// Returns true if the index holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unfiltered top-k; global ids ascending by distance.
    #[must_use]
    pub fn knn(&self, query: &[f32], k: usize) -> Vec<PointId> {
        match self {
            Self::Flat(index) => index.knn(query, k),
            Self::Graph(index) => index.knn(query, k),
        }
    }

    /// Unfiltered top-k written into `stripe`; returns the fill count.
    pub fn knn_into(&self, query: &[f32], stripe: &mut [u32]) -> usize {
        fill_stripe(stripe, &self.knn(query, stripe.len()))
    }

    /// Range-filtered top-k written into `stripe`; returns the fill count.
    ///
    /// Ranges holding fewer than `stripe.len()` points fill partially and
    /// leave the tail zeroed; the shortfall is logged by the substrate.
    pub fn range_knn_into(&self, query: &[f32], lo: f32, hi: f32, stripe: &mut [u32]) -> usize {
        let k = stripe.len();
        match self {
            Self::Flat(index) => {
                let (start, end) = index.locate(lo, hi);
                let span = end - start;
                if span < k {
                    tracing::warn!(span, k, "range holds fewer points than requested");
                }
                let found = index.top_within(query, start, span, k);
                fill_stripe(stripe, &found.iter().map(|n| n.id).collect::<Vec<_>>())
            }
            Self::Graph(index) => fill_stripe(stripe, &index.range_knn(query, lo, hi, k)),
        }
    }

    /// Batched unfiltered top-k, one stripe per query.
    pub fn batch_knn(&self, queries: &[&[f32]], stripes: &mut [&mut [u32]], parallel: bool) {
        match self {
            Self::Flat(index) => {
                // exhaustive scans are already memory-bound; a plain loop
                // keeps the subset hot in cache across the label group
                for (stripe, query) in stripes.iter_mut().zip(queries.iter()) {
                    fill_stripe(stripe, &index.knn(query, stripe.len()));
                }
            }
            Self::Graph(index) => index.batch_knn(queries, stripes, parallel),
        }
    }
}
