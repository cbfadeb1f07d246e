//! Graph-backed index for large point sets.
//!
//! Wraps a [`FlatIndex`] (which keeps the subset timestamp-sorted) with a
//! pruned proximity graph over the same subset. Unfiltered queries run beam
//! search; range-filtered queries either fall back to the exhaustive path
//! (narrow ranges) or overretrieve on the graph and post-filter by
//! timestamp (wide ranges).

use rayon::prelude::*;

use crate::config::{EngineConfig, QueryParams};
use crate::error::Result;
use crate::index::adjacency::AdjacencyGraph;
use crate::index::beam::beam_search;
use crate::index::flat::FlatIndex;
use crate::index::vamana::build_graph;
use crate::points::PointId;

/// Beam-searchable index over a timestamp-sorted subset.
#[derive(Debug)]
pub struct GraphIndex {
    flat: FlatIndex,
    graph: AdjacencyGraph,
    medoid: u32,
    query_params: QueryParams,
    fallback_width: f32,
}

impl GraphIndex {
    /// Builds the proximity graph over an already-fitted flat index.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Build`] if graph construction breaks
    /// an invariant.
    pub fn fit(flat: FlatIndex, config: &EngineConfig) -> Result<Self> {
        let (graph, medoid) = build_graph(flat.subset(), &config.build)?;
        Ok(Self {
            flat,
            graph,
            medoid,
            query_params: config.query,
            fallback_width: config.routing.exhaustive_fallback_width,
        })
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flat.len()
    }

    /// Returns true if the index holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    /// The exhaustive view over the same subset.
    #[must_use]
    pub fn flat(&self) -> &FlatIndex {
        &self.flat
    }

    /// The adjacency graph (inspection and tests).
    #[must_use]
    pub fn graph(&self) -> &AdjacencyGraph {
        &self.graph
    }

    /// Unfiltered top-k via beam search; global ids ascending by distance.
    #[must_use]
    pub fn knn(&self, query: &[f32], k: usize) -> Vec<PointId> {
        let mut params = self.query_params;
        params.k = k;

        let result = beam_search(query, &self.graph, self.flat.subset(), self.medoid, &params);
        result
            .top_k(k)
            .iter()
            .map(|n| self.flat.subset().global_id(n.id))
            .collect()
    }

    /// Range-filtered top-k over the closed range `[lo, hi]`.
    ///
    /// Narrow ranges (normalized width under the fallback threshold) scan
    /// exhaustively; wide ranges overretrieve on the graph with the
    /// comparison budget scaled up by the selectivity estimate. May return
    /// fewer than `k` ids; the shortfall is logged, not fatal.
    #[must_use]
    pub fn range_knn(&self, query: &[f32], lo: f32, hi: f32, k: usize) -> Vec<PointId> {
        // assuming uniformly distributed timestamps, the width of the range
        // approximates its selectivity
        let time_range = hi - lo;
        if time_range < self.fallback_width {
            let (start, end) = self.flat.locate(lo, hi);
            let span = end - start;
            if span < k {
                tracing::warn!(span, k, "range holds fewer points than requested");
            }
            return self
                .flat
                .top_within(query, start, span, k)
                .into_iter()
                .map(|n| n.id)
                .collect();
        }

        let mut params = self.query_params;
        params.k = params.beam_width;
        params.limit = (params.limit as f32 / time_range) as usize;
        let found = self.overretrieve(query, lo, hi, k, &params);
        if found.len() < k {
            tracing::warn!(
                found = found.len(),
                k,
                "overretrieval recovered fewer points than requested"
            );
        }
        found
    }

    /// The overretrieval path with no fallback check and no budget scaling.
    ///
    /// Used by the window hierarchy, which has already matched the window
    /// to the queried range.
    #[must_use]
    pub fn overretrieval_range_knn(&self, query: &[f32], lo: f32, hi: f32, k: usize) -> Vec<PointId> {
        let mut params = self.query_params;
        params.k = params.beam_width;
        self.overretrieve(query, lo, hi, k, &params)
    }

    fn overretrieve(
        &self,
        query: &[f32],
        lo: f32,
        hi: f32,
        k: usize,
        params: &QueryParams,
    ) -> Vec<PointId> {
        let result = beam_search(query, &self.graph, self.flat.subset(), self.medoid, params);

        let timestamps = self.flat.timestamps();
        result
            .frontier
            .iter()
            .filter(|n| {
                let t = timestamps[n.id as usize];
                t >= lo && t <= hi
            })
            .take(k)
            .map(|n| self.flat.subset().global_id(n.id))
            .collect()
    }

    /// Runs `knn` for every query, writing each result into its stripe.
    pub fn batch_knn(&self, queries: &[&[f32]], stripes: &mut [&mut [u32]], parallel: bool) {
        debug_assert_eq!(queries.len(), stripes.len());

        if parallel {
            stripes
                .par_iter_mut()
                .zip(queries.par_iter())
                .for_each(|(stripe, query)| {
                    fill_stripe(stripe, &self.knn(query, stripe.len()));
                });
        } else {
            for (stripe, query) in stripes.iter_mut().zip(queries.iter()) {
                fill_stripe(stripe, &self.knn(query, stripe.len()));
            }
        }
    }
}

/// Copies `ids` into the front of `stripe`; the tail keeps its zeros.
pub(crate) fn fill_stripe(stripe: &mut [u32], ids: &[PointId]) -> usize {
    let count = ids.len().min(stripe.len());
    stripe[..count].copy_from_slice(&ids[..count]);
    count
}
