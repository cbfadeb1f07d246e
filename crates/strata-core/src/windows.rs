//! Dyadic window hierarchy for range-filtered queries.
//!
//! A range filter of normalized width `w` wants a graph whose population
//! is mostly inside the range, so overretrieval stays cheap. Level `L`
//! holds `2·2^L − 1` windows, each covering `1/2^L` of the timestamp-sorted
//! points and offset from its neighbor by half a window; any range of width
//! `≤ 1/2^L` fits entirely inside at least one window of level `L`, and the
//! window's selectivity for it is at least one half.
//!
//! Every window is a full [`GraphIndex`] over a shared slice of one
//! timestamp-sorted id order, so vectors and the order itself are stored
//! once; only graphs and window bookkeeping are per-window.

use std::sync::Arc;

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::index::{FlatIndex, GraphIndex};
use crate::points::{PointRange, SubsetPoints};

/// Ranges at least this wide are served by the level-0 (global) index.
const GLOBAL_WIDTH: f32 = 0.375;

/// Which substrate answers a range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The range holds at most `cutoff` points: scan the root exhaustively.
    Exhaustive,
    /// The range is wide: overretrieve on the global index.
    Global,
    /// Overretrieve on window `window` of `level`.
    Window {
        /// Hierarchy level (1-based; level 0 is the global index).
        level: usize,
        /// Window offset within the level.
        window: usize,
    },
}

/// Timestamp-ordered hierarchy of overlapping window indices.
#[derive(Debug)]
pub struct WindowHierarchy {
    /// `levels[i]` holds level `i + 1`; level 0 lives outside as the
    /// engine's global index.
    levels: Vec<Vec<GraphIndex>>,
    n: usize,
    cutoff: usize,
}

impl WindowHierarchy {
    /// Builds every level whose windows stay above the routing cutoff.
    ///
    /// `sorted_ids` and `sorted_timestamps` are the timestamp-ascending
    /// order of the whole dataset; windows share the id order, copying only
    /// their timestamp slice.
    ///
    /// # Errors
    ///
    /// Propagates graph-construction failures.
    pub fn build(
        points: &Arc<PointRange>,
        sorted_ids: &Arc<[u32]>,
        sorted_timestamps: &[f32],
        config: &EngineConfig,
    ) -> Result<Self> {
        let n = sorted_ids.len();
        let cutoff = config.routing.cutoff;

        let mut max_level = 0;
        while n / (1usize << (max_level + 1)) > cutoff {
            max_level += 1;
        }

        let mut levels = Vec::with_capacity(max_level);
        for level in 1..=max_level {
            let window_count = 2 * (1 << level) - 1;
            tracing::debug!(level, windows = window_count, "building window level");

            let windows: Vec<GraphIndex> = (0..window_count)
                .into_par_iter()
                .map(|j| {
                    let (start, end) = window_bounds(n, level, j);
                    let subset =
                        SubsetPoints::shared(Arc::clone(points), Arc::clone(sorted_ids), start..end);
                    let flat =
                        FlatIndex::from_sorted(subset, sorted_timestamps[start..end].to_vec());
                    GraphIndex::fit(flat, config)
                })
                .collect::<Result<_>>()?;

            levels.push(windows);
        }

        Ok(Self { levels, n, cutoff })
    }

    /// Number of built levels (level 0 excluded).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// The window index at `(level, window)`; level is 1-based.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of range.
    #[must_use]
    pub fn window(&self, level: usize, window: usize) -> &GraphIndex {
        &self.levels[level - 1][window]
    }

    /// Picks the substrate for the closed range `[lo, hi]`.
    #[must_use]
    pub fn route(&self, lo: f32, hi: f32) -> Route {
        let width = hi - lo;

        if width * self.n as f32 <= self.cutoff as f32 {
            return Route::Exhaustive;
        }
        if self.levels.is_empty() || width >= GLOBAL_WIDTH {
            return Route::Global;
        }

        let level = (((GLOBAL_WIDTH / width).log2().floor()) as usize + 1).min(self.levels.len());
        let window_count = 2 * (1 << level) - 1;
        let slots = (1usize << (level + 1)) as f32;
        let window = ((slots * lo.max(0.0)).floor() as usize).min(window_count - 1);

        Route::Window { level, window }
    }
}

/// Sorted-order bounds `[start, end)` of window `j` at `level`.
fn window_bounds(n: usize, level: usize, j: usize) -> (usize, usize) {
    let slots = 1usize << (level + 1);
    let start = j * n / slots;
    let end = ((j + 2) * n / slots).min(n);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn small_config(cutoff: usize) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.build.max_degree = 8;
        config.build.beam_width = 16;
        config.query.k = 4;
        config.query.beam_width = 16;
        config.query.degree_limit = 8;
        config.routing.cutoff = cutoff;
        config
    }

    fn build_hierarchy(n: usize, cutoff: usize) -> WindowHierarchy {
        let rows: Vec<Vec<f32>> = (0..n)
            .map(|i| {
                let mut row = vec![0.0; 16];
                row[0] = i as f32;
                row
            })
            .collect();
        let points = Arc::new(PointRange::from_rows(&rows, 16));
        let ids: Arc<[u32]> = (0..n as u32).collect::<Vec<_>>().into();
        let timestamps: Vec<f32> = (0..n).map(|i| i as f32 / n as f32).collect();

        WindowHierarchy::build(&points, &ids, &timestamps, &small_config(cutoff)).unwrap()
    }

    #[test]
    fn test_level_count_stops_at_cutoff() {
        // 256 / 2 = 128 > 32, 256 / 4 = 64 > 32, 256 / 8 = 32 is not
        let hierarchy = build_hierarchy(256, 32);
        assert_eq!(hierarchy.depth(), 2);
        assert_eq!(hierarchy.levels[0].len(), 3);
        assert_eq!(hierarchy.levels[1].len(), 7);
    }

    #[test]
    fn test_window_bounds_cover_and_overlap() {
        let n = 256;
        for level in 1..=2 {
            let window_count = 2 * (1 << level) - 1;
            let expected_len = n / (1 << level);

            for j in 0..window_count {
                let (start, end) = window_bounds(n, level, j);
                assert_eq!(end - start, expected_len, "level {level} window {j}");
            }

            // consecutive windows overlap by half a window
            let (a_start, a_end) = window_bounds(n, level, 0);
            let (b_start, _) = window_bounds(n, level, 1);
            assert_eq!(b_start - a_start, expected_len / 2);
            assert!(b_start < a_end);

            // the level tiles the whole order
            let (last_start, last_end) = window_bounds(n, level, window_count - 1);
            assert_eq!(last_end, n);
            assert!(last_start < last_end);
        }
    }

    #[test]
    fn test_route_mapping() {
        let hierarchy = build_hierarchy(256, 32);

        // width 0.2 from 0.1: level floor(log2(0.375 / 0.2)) + 1 = 1,
        // window floor(4 * 0.1) = 0
        assert_eq!(
            hierarchy.route(0.1, 0.3),
            Route::Window { level: 1, window: 0 }
        );

        // wide ranges go global
        assert_eq!(hierarchy.route(0.0, 0.5), Route::Global);
        assert_eq!(hierarchy.route(0.2, 0.95), Route::Global);

        // tiny absolute population routes to the exhaustive root:
        // width * n = 0.05 * 256 = 12.8 <= 32
        assert_eq!(hierarchy.route(0.4, 0.45), Route::Exhaustive);
        assert_eq!(hierarchy.route(0.5, 0.5), Route::Exhaustive);

        // the deepest level picks up the narrowest graph-worthy ranges:
        // width 0.15 gives floor(log2(0.375 / 0.15)) + 1 = 2
        assert_eq!(
            hierarchy.route(0.5, 0.65),
            Route::Window { level: 2, window: 4 }
        );
    }

    #[test]
    fn test_route_clamps_window_offset() {
        let hierarchy = build_hierarchy(256, 32);

        // lo close to 1.0 would index past the last window without a clamp
        match hierarchy.route(0.97, 0.97 + 0.2) {
            Route::Window { level, window } => {
                assert_eq!(level, 1);
                assert_eq!(window, 2); // last window of level 1
            }
            other => panic!("expected a window route, got {other:?}"),
        }
    }

    #[test]
    fn test_windows_answer_range_queries() {
        let hierarchy = build_hierarchy(256, 32);

        let Route::Window { level, window } = hierarchy.route(0.1, 0.3) else {
            panic!("expected a window route");
        };
        let index = hierarchy.window(level, window);

        let mut query = vec![0.0; 16];
        query[0] = 40.0; // timestamp 40/256 = 0.156, inside [0.1, 0.3]
        let found = index.overretrieval_range_knn(&query, 0.1, 0.3, 4);
        assert_eq!(found.len(), 4);
        assert_eq!(found[0], 40);
    }
}
