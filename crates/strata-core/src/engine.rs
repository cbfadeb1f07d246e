//! The engine: build pipeline and batch query dispatcher.
//!
//! Build buckets points by label, gives every label its own index (graph
//! above the routing cutoff, exhaustive below), sorts the whole dataset by
//! timestamp, and builds the global graph index plus the window hierarchy
//! over that order.
//!
//! Querying sorts the batch by `(kind, label, t_start, t_end, id)` so each
//! kind forms one contiguous block and kind-1 queries group by label, then
//! dispatches every block to its substrate. Results land in disjoint
//! `k`-wide stripes of one output buffer, indexed by each query's original
//! position, so the parallel writers never share a byte.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::index::graph::fill_stripe;
use crate::index::{FlatIndex, GraphIndex, Index};
use crate::io::Dataset;
use crate::points::PointRange;
use crate::query::{QueryBatch, QueryKind, QueryMeta};
use crate::windows::{Route, WindowHierarchy};

/// Per-kind query accounting for the timing report.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryStats {
    /// Queries answered, per kind.
    pub counts: [usize; 4],
    /// Wall-clock seconds spent, per kind.
    pub seconds: [f64; 4],
}

impl QueryStats {
    /// Queries per second for `kind`; zero when the kind was absent.
    #[must_use]
    pub fn qps(&self, kind: usize) -> f64 {
        if self.counts[kind] == 0 || self.seconds[kind] <= 0.0 {
            return 0.0;
        }
        self.counts[kind] as f64 / self.seconds[kind]
    }

    /// Total query seconds across kinds.
    #[must_use]
    pub fn total_seconds(&self) -> f64 {
        self.seconds.iter().sum()
    }
}

/// The built index set: per-label indices, the global graph index, and the
/// window hierarchy. Immutable once built.
#[derive(Debug)]
pub struct StrataIndex {
    points: Arc<PointRange>,
    max_label: u32,
    by_label: Vec<Option<Index>>,
    global: GraphIndex,
    hierarchy: WindowHierarchy,
    config: EngineConfig,
}

impl StrataIndex {
    /// Builds every index over the dataset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] for an empty dataset, [`Error::Config`]
    /// for an invalid configuration, and [`Error::Build`] if graph
    /// construction fails an invariant.
    pub fn build(dataset: Dataset, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let Dataset {
            points,
            labels,
            timestamps,
        } = dataset;
        let n = points.len();
        if n == 0 {
            return Err(Error::Format("dataset holds no points".into()));
        }

        let started = Instant::now();
        let max_label = *labels.iter().max().expect("dataset is non-empty");

        // Per-label indices.
        let buckets = bucket_by_label(&labels, max_label);
        let by_label: Vec<Option<Index>> = buckets
            .into_par_iter()
            .map(|ids| {
                if ids.is_empty() {
                    return Ok(None);
                }
                let flat = FlatIndex::fit(&points, &timestamps, ids);
                let index = if flat.len() > config.routing.cutoff {
                    Index::Graph(GraphIndex::fit(flat, &config)?)
                } else {
                    Index::Flat(flat)
                };
                Ok(Some(index))
            })
            .collect::<Result<_>>()?;
        tracing::debug!(
            labels = by_label.iter().filter(|b| b.is_some()).count(),
            "label indices built"
        );

        // Timestamp order shared by the global index and every window.
        let mut order: Vec<u32> = (0..n as u32).collect();
        order.par_sort_unstable_by(|&a, &b| {
            timestamps[a as usize]
                .total_cmp(&timestamps[b as usize])
                .then_with(|| a.cmp(&b))
        });
        let sorted_timestamps: Vec<f32> =
            order.iter().map(|&id| timestamps[id as usize]).collect();
        let sorted_ids: Arc<[u32]> = order.into();

        let global_subset = crate::points::SubsetPoints::shared(
            Arc::clone(&points),
            Arc::clone(&sorted_ids),
            0..n,
        );
        let global = GraphIndex::fit(
            FlatIndex::from_sorted(global_subset, sorted_timestamps.clone()),
            &config,
        )?;

        let hierarchy = WindowHierarchy::build(&points, &sorted_ids, &sorted_timestamps, &config)?;

        tracing::info!(
            points = n,
            max_label,
            window_levels = hierarchy.depth(),
            elapsed = ?started.elapsed(),
            "index built"
        );

        Ok(Self {
            points,
            max_label,
            by_label,
            global,
            hierarchy,
            config,
        })
    }

    /// Number of indexed points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the index is empty (never: build rejects that).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The index serving `label`, if any point carries it.
    #[must_use]
    pub fn label_index(&self, label: u32) -> Option<&Index> {
        self.by_label.get(label as usize)?.as_ref()
    }

    /// The global graph index over all points.
    #[must_use]
    pub fn global(&self) -> &GraphIndex {
        &self.global
    }

    /// The window hierarchy.
    #[must_use]
    pub fn hierarchy(&self) -> &WindowHierarchy {
        &self.hierarchy
    }

    /// The configuration the index was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Answers a whole batch; returns the `Q x k` output buffer (row =
    /// original query position) and per-kind timings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLabel`] if a label-filtered query names a
    /// label no point carries.
    pub fn run_queries(&self, batch: &QueryBatch, k: usize) -> Result<(Vec<u32>, QueryStats)> {
        // Label validity is fatal; check the whole batch up front.
        for meta in &batch.metas {
            if matches!(meta.kind, QueryKind::Label | QueryKind::LabelTimestamp)
                && self.label_index(meta.label).is_none()
            {
                return Err(Error::UnknownLabel {
                    label: meta.label,
                    max: self.max_label,
                });
            }
        }

        let mut sorted: Vec<QueryMeta> = batch.metas.clone();
        sorted.sort_unstable_by_key(QueryMeta::sort_key);

        let mut out = vec![0u32; batch.len() * k];
        let mut stats = QueryStats::default();

        {
            // Claim each query's disjoint output stripe, in sorted order.
            let mut pool: Vec<Option<&mut [u32]>> = out.chunks_mut(k).map(Some).collect();
            let mut stripes: Vec<&mut [u32]> = sorted
                .iter()
                .map(|meta| {
                    pool[meta.original_index as usize]
                        .take()
                        .expect("original indices are unique")
                })
                .collect();

            let mut cursor = 0;
            for kind in QueryKind::ALL {
                let block_len = sorted[cursor..]
                    .iter()
                    .take_while(|meta| meta.kind == kind)
                    .count();
                let block = cursor..cursor + block_len;
                cursor += block_len;

                if block_len == 0 {
                    continue;
                }

                let timer = Instant::now();
                match kind {
                    QueryKind::Unfiltered => {
                        self.dispatch_unfiltered(batch, &sorted[block.clone()], &mut stripes[block]);
                    }
                    QueryKind::Label => {
                        self.dispatch_label(batch, &sorted[block.clone()], &mut stripes[block]);
                    }
                    QueryKind::Timestamp => {
                        self.dispatch_timestamp(batch, &sorted[block.clone()], &mut stripes[block]);
                    }
                    QueryKind::LabelTimestamp => {
                        self.dispatch_label_timestamp(
                            batch,
                            &sorted[block.clone()],
                            &mut stripes[block],
                        );
                    }
                }
                stats.counts[kind as usize] = block_len;
                stats.seconds[kind as usize] = timer.elapsed().as_secs_f64();
            }
        }

        Ok((out, stats))
    }

    fn dispatch_unfiltered(
        &self,
        batch: &QueryBatch,
        metas: &[QueryMeta],
        stripes: &mut [&mut [u32]],
    ) {
        let queries: Vec<&[f32]> = metas
            .iter()
            .map(|meta| batch.vectors.point(meta.original_index))
            .collect();
        self.global.batch_knn(&queries, stripes, true);
    }

    fn dispatch_label(&self, batch: &QueryBatch, metas: &[QueryMeta], stripes: &mut [&mut [u32]]) {
        // One contiguous group per label; handing the whole group to one
        // index keeps that index's subset hot in cache.
        let mut start = 0;
        while start < metas.len() {
            let label = metas[start].label;
            let len = metas[start..]
                .iter()
                .take_while(|meta| meta.label == label)
                .count();

            let index = self
                .label_index(label)
                .expect("labels were validated before dispatch");
            let queries: Vec<&[f32]> = metas[start..start + len]
                .iter()
                .map(|meta| batch.vectors.point(meta.original_index))
                .collect();
            index.batch_knn(&queries, &mut stripes[start..start + len], true);

            start += len;
        }
    }

    fn dispatch_timestamp(
        &self,
        batch: &QueryBatch,
        metas: &[QueryMeta],
        stripes: &mut [&mut [u32]],
    ) {
        stripes
            .par_iter_mut()
            .zip(metas.par_iter())
            .for_each(|(stripe, meta)| {
                let query = batch.vectors.point(meta.original_index);
                let k = stripe.len();
                let overretrieved = match self.hierarchy.route(meta.t_start, meta.t_end) {
                    Route::Exhaustive => None,
                    Route::Global => Some(self.global.overretrieval_range_knn(
                        query,
                        meta.t_start,
                        meta.t_end,
                        k,
                    )),
                    Route::Window { level, window } => {
                        Some(self.hierarchy.window(level, window).overretrieval_range_knn(
                            query,
                            meta.t_start,
                            meta.t_end,
                            k,
                        ))
                    }
                };

                match overretrieved {
                    None => self.exhaustive_range_into(query, meta.t_start, meta.t_end, stripe),
                    Some(found) => {
                        if found.len() < k {
                            tracing::warn!(
                                found = found.len(),
                                k,
                                "window overretrieval recovered fewer points than requested"
                            );
                        }
                        fill_stripe(stripe, &found);
                    }
                }
            });
    }

    fn dispatch_label_timestamp(
        &self,
        batch: &QueryBatch,
        metas: &[QueryMeta],
        stripes: &mut [&mut [u32]],
    ) {
        stripes
            .par_iter_mut()
            .zip(metas.par_iter())
            .for_each(|(stripe, meta)| {
                let index = self
                    .label_index(meta.label)
                    .expect("labels were validated before dispatch");
                let query = batch.vectors.point(meta.original_index);
                index.range_knn_into(query, meta.t_start, meta.t_end, stripe);
            });
    }

    /// Root exhaustive scan for ranges too small to be worth any graph.
    fn exhaustive_range_into(&self, query: &[f32], lo: f32, hi: f32, stripe: &mut [u32]) {
        let flat = self.global.flat();
        let (start, end) = flat.locate(lo, hi);
        let span = end - start;
        if span < stripe.len() {
            tracing::warn!(span, k = stripe.len(), "range holds fewer points than requested");
        }
        let found = flat.top_within(query, start, span, stripe.len());
        fill_stripe(stripe, &found.iter().map(|n| n.id).collect::<Vec<_>>());
    }
}

/// Buckets point ids by label: thread-local bucket arrays merged in order.
fn bucket_by_label(labels: &[u32], max_label: u32) -> Vec<Vec<u32>> {
    let width = max_label as usize + 1;
    labels
        .par_iter()
        .enumerate()
        .fold(
            || vec![Vec::new(); width],
            |mut acc, (i, &label)| {
                acc[label as usize].push(i as u32);
                acc
            },
        )
        .reduce(
            || vec![Vec::new(); width],
            |mut left, right| {
                for (dst, src) in left.iter_mut().zip(right) {
                    dst.extend(src);
                }
                left
            },
        )
}
