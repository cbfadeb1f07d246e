//! Exhaustive index over a timestamp-sorted subset.
//!
//! Small point sets are cheaper to scan than to graph-search, and keeping
//! the subset sorted by timestamp turns every range filter into two binary
//! searches plus a contiguous scan.

use std::sync::Arc;

use crate::distance::l2_squared_aligned;
use crate::error::{Error, Result};
use crate::index::beam::Neighbor;
use crate::points::{PointId, PointRange, SubsetPoints};

/// Exhaustive top-k index whose subset is sorted ascending by timestamp.
#[derive(Debug)]
pub struct FlatIndex {
    subset: SubsetPoints,
    timestamps: Vec<f32>,
}

impl FlatIndex {
    /// Builds the index over `ids`, sorting them by their timestamps.
    ///
    /// `timestamps` is indexed by global id.
    #[must_use]
    pub fn fit(points: &Arc<PointRange>, timestamps: &[f32], mut ids: Vec<PointId>) -> Self {
        ids.sort_unstable_by(|&a, &b| {
            timestamps[a as usize]
                .total_cmp(&timestamps[b as usize])
                .then_with(|| a.cmp(&b))
        });
        let sorted: Vec<f32> = ids.iter().map(|&id| timestamps[id as usize]).collect();

        Self {
            subset: SubsetPoints::new(Arc::clone(points), ids),
            timestamps: sorted,
        }
    }

    /// Adopts an already timestamp-sorted subset without copying ids.
    ///
    /// `timestamps[i]` must equal the timestamp of `subset.global_id(i)`.
    #[must_use]
    pub fn from_sorted(subset: SubsetPoints, timestamps: Vec<f32>) -> Self {
        debug_assert_eq!(subset.len(), timestamps.len());
        debug_assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
        Self { subset, timestamps }
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subset.len()
    }

    /// Returns true if the index holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subset.is_empty()
    }

    /// The searched subset.
    #[must_use]
    pub fn subset(&self) -> &SubsetPoints {
        &self.subset
    }

    /// The sorted timestamp per local id.
    #[must_use]
    pub fn timestamps(&self) -> &[f32] {
        &self.timestamps
    }

    /// Local index bounds `[start, end)` of the closed timestamp range
    /// `[lo, hi]`.
    #[must_use]
    pub fn locate(&self, lo: f32, hi: f32) -> (usize, usize) {
        let start = self.timestamps.partition_point(|&t| t < lo);
        let end = self.timestamps.partition_point(|&t| t <= hi);
        (start, end.max(start))
    }

    /// Exhaustive top-k over the local slice `[start, start + len)`.
    ///
    /// Returns at most `k` global-id candidates, ascending by distance with
    /// ties toward the lower global id.
    #[must_use]
    pub fn top_within(&self, query: &[f32], start: usize, len: usize, k: usize) -> Vec<Neighbor> {
        let mut distances: Vec<Neighbor> = (start..start + len)
            .map(|local| Neighbor {
                id: self.subset.global_id(local as u32),
                dist: l2_squared_aligned(query, self.subset.point(local as u32)),
            })
            .collect();

        // a full sort of the slice; slices here are small by routing policy
        distances.sort_unstable();
        distances.truncate(k);
        distances
    }

    /// Unfiltered top-k; global ids ascending by distance.
    #[must_use]
    pub fn knn(&self, query: &[f32], k: usize) -> Vec<PointId> {
        self.top_within(query, 0, self.len(), k)
            .into_iter()
            .map(|n| n.id)
            .collect()
    }

    /// Range-filtered top-k over the closed range `[lo, hi]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientRange`] if the range holds fewer than
    /// `k` points.
    pub fn range_knn(&self, query: &[f32], lo: f32, hi: f32, k: usize) -> Result<Vec<PointId>> {
        let (start, end) = self.locate(lo, hi);
        let span = end - start;
        if span < k {
            return Err(Error::InsufficientRange { span, k });
        }

        Ok(self
            .top_within(query, start, span, k)
            .into_iter()
            .map(|n| n.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> FlatIndex {
        // global ids 0..5 with scrambled timestamps
        let rows: Vec<Vec<f32>> = (0..5)
            .map(|i| {
                let mut row = vec![0.0; 16];
                row[0] = i as f32;
                row
            })
            .collect();
        let points = Arc::new(PointRange::from_rows(&rows, 16));
        let timestamps = vec![0.9, 0.1, 0.5, 0.3, 0.7];
        FlatIndex::fit(&points, &timestamps, vec![0, 1, 2, 3, 4])
    }

    fn query_at(p: f32) -> Vec<f32> {
        let mut q = vec![0.0; 16];
        q[0] = p;
        q
    }

    #[test]
    fn test_fit_sorts_by_timestamp() {
        let index = sample_index();
        assert_eq!(index.timestamps(), &[0.1, 0.3, 0.5, 0.7, 0.9]);
        assert_eq!(index.subset().ids(), &[1, 3, 2, 4, 0]);
    }

    #[test]
    fn test_knn_orders_by_distance() {
        let index = sample_index();
        assert_eq!(index.knn(&query_at(3.2), 3), vec![3, 4, 2]);
        // k above the population returns everything
        assert_eq!(index.knn(&query_at(0.0), 10).len(), 5);
    }

    #[test]
    fn test_locate_is_a_closed_interval() {
        let index = sample_index();
        assert_eq!(index.locate(0.3, 0.7), (1, 4));
        assert_eq!(index.locate(0.0, 1.0), (0, 5));
        assert_eq!(index.locate(0.31, 0.69), (2, 3));
        // zero-width range hits exact timestamps only
        assert_eq!(index.locate(0.5, 0.5), (2, 3));
        // empty range
        assert_eq!(index.locate(0.55, 0.56), (3, 3));
    }

    #[test]
    fn test_range_knn_filters_then_ranks() {
        let index = sample_index();
        // range [0.3, 0.9] keeps global ids 3, 2, 4, 0
        let result = index.range_knn(&query_at(4.2), 0.3, 0.9, 2).unwrap();
        assert_eq!(result, vec![4, 3]);
    }

    #[test]
    fn test_range_knn_rejects_short_ranges() {
        let index = sample_index();
        let err = index.range_knn(&query_at(0.0), 0.3, 0.7, 4).unwrap_err();
        match err {
            Error::InsufficientRange { span, k } => {
                assert_eq!(span, 3);
                assert_eq!(k, 4);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_zero_width_range() {
        let index = sample_index();
        let result = index.range_knn(&query_at(2.0), 0.5, 0.5, 1).unwrap();
        assert_eq!(result, vec![2]);
    }
}
