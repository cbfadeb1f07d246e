//! Vector storage: an aligned point buffer and subset views over it.
//!
//! [`PointRange`] owns one cache-line-aligned `f32` allocation holding every
//! vector at a fixed stride. The stride rounds the logical dimension up to a
//! multiple of 16 lanes (one 64-byte cache line) and the padding lanes stay
//! zero, which lets the distance kernel run full-width SIMD chunks.
//!
//! [`SubsetPoints`] is the view an index actually searches: a shared
//! `PointRange` plus an ordered id list mapping local vertex ids back to
//! global point ids.

use std::alloc::{self, Layout};
use std::ops::Range;
use std::ptr::NonNull;
use std::sync::Arc;

/// Global point identifier, an index into the full dataset.
pub type PointId = u32;

/// Cache-line alignment for the vector buffer, in bytes.
const BUFFER_ALIGN: usize = 64;

/// Rounds a dimension up to a whole number of 64-byte cache lines of `f32`.
#[must_use]
pub const fn aligned_dim(dim: usize) -> usize {
    dim.div_ceil(16) * 16
}

/// A zero-initialized, 64-byte-aligned `f32` buffer.
#[derive(Debug)]
struct AlignedBuf {
    ptr: NonNull<f32>,
    len: usize,
}

// SAFETY: the buffer is a plain owned allocation of f32 with unique
// provenance; sharing references across threads is no different from &[f32].
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

impl AlignedBuf {
    fn zeroed(len: usize) -> Self {
        if len == 0 {
            return Self {
                ptr: NonNull::dangling(),
                len: 0,
            };
        }
        let layout = Layout::from_size_align(len * std::mem::size_of::<f32>(), BUFFER_ALIGN)
            .expect("buffer layout overflow");
        // SAFETY: layout has non-zero size (len > 0) and valid alignment.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw.cast::<f32>()) else {
            alloc::handle_alloc_error(layout)
        };
        Self { ptr, len }
    }

    fn as_slice(&self) -> &[f32] {
        // SAFETY: ptr covers len initialized f32 values for the buffer's
        // whole lifetime.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [f32] {
        // SAFETY: as above, plus &mut self guarantees uniqueness.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        let layout =
            Layout::from_size_align(self.len * std::mem::size_of::<f32>(), BUFFER_ALIGN)
                .expect("buffer layout overflow");
        // SAFETY: ptr was allocated with exactly this layout in `zeroed`.
        unsafe { alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), layout) };
    }
}

/// Read-only storage for `n` vectors at an aligned stride.
#[derive(Debug)]
pub struct PointRange {
    values: AlignedBuf,
    n: usize,
    dim: usize,
    stride: usize,
}

impl PointRange {
    /// Allocates zeroed storage for `n` vectors of logical dimension `dim`.
    #[must_use]
    pub fn zeroed(n: usize, dim: usize) -> Self {
        let stride = aligned_dim(dim);
        Self {
            values: AlignedBuf::zeroed(n * stride),
            n,
            dim,
            stride,
        }
    }

    /// Builds a range from plain rows, padding each to the aligned stride.
    ///
    /// # Panics
    ///
    /// Panics if any row's length differs from `dim`.
    #[must_use]
    pub fn from_rows(rows: &[Vec<f32>], dim: usize) -> Self {
        let mut range = Self::zeroed(rows.len(), dim);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.len(), dim, "row {i} has the wrong dimension");
            range.row_mut(i)[..dim].copy_from_slice(row);
        }
        range
    }

    /// Number of vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Returns true if the range holds no vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Logical dimension of each vector.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Storage stride per vector (logical dimension rounded up).
    #[must_use]
    pub fn aligned_dim(&self) -> usize {
        self.stride
    }

    /// Full aligned row for vector `i`, padding included.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    #[inline]
    #[must_use]
    pub fn point(&self, i: PointId) -> &[f32] {
        let start = i as usize * self.stride;
        &self.values.as_slice()[start..start + self.stride]
    }

    /// Mutable aligned row for vector `i`, used only while loading.
    pub(crate) fn row_mut(&mut self, i: usize) -> &mut [f32] {
        let stride = self.stride;
        let start = i * stride;
        &mut self.values.as_mut_slice()[start..start + stride]
    }

    /// The whole backing buffer, used by the parallel dataset decoder.
    pub(crate) fn values_mut(&mut self) -> &mut [f32] {
        self.values.as_mut_slice()
    }
}

/// An ordered subset of a shared [`PointRange`].
///
/// Local id `i` denotes the vector at global id `ids[offset + i]`. The id
/// list is either owned by this subset or a shared slice of a larger order
/// (the window hierarchy shares one timestamp-sorted order across all
/// windows).
#[derive(Clone)]
#[derive(Debug)]
pub struct SubsetPoints {
    points: Arc<PointRange>,
    ids: Arc<[PointId]>,
    offset: usize,
    len: usize,
}

impl SubsetPoints {
    /// Creates a subset owning its id list.
    #[must_use]
    pub fn new(points: Arc<PointRange>, ids: Vec<PointId>) -> Self {
        let len = ids.len();
        Self {
            points,
            ids: ids.into(),
            offset: 0,
            len,
        }
    }

    /// Creates a subset viewing `range` of a shared id list without copying.
    ///
    /// # Panics
    ///
    /// Panics if `range` exceeds the id list.
    #[must_use]
    pub fn shared(points: Arc<PointRange>, ids: Arc<[PointId]>, range: Range<usize>) -> Self {
        assert!(range.end <= ids.len(), "subset range out of bounds");
        Self {
            points,
            offset: range.start,
            len: range.end - range.start,
            ids,
        }
    }

    /// Number of points in the subset.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the subset is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Logical dimension of the underlying vectors.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.points.dim()
    }

    /// Aligned stride of the underlying vectors.
    #[must_use]
    pub fn aligned_dim(&self) -> usize {
        self.points.aligned_dim()
    }

    /// Aligned vector for local id `local`.
    #[inline]
    #[must_use]
    pub fn point(&self, local: u32) -> &[f32] {
        self.points.point(self.global_id(local))
    }

    /// Global id for local id `local`.
    #[inline]
    #[must_use]
    pub fn global_id(&self, local: u32) -> PointId {
        self.ids[self.offset + local as usize]
    }

    /// The local-to-global id slice.
    #[must_use]
    pub fn ids(&self) -> &[PointId] {
        &self.ids[self.offset..self.offset + self.len]
    }

    /// The shared backing range.
    #[must_use]
    pub fn points(&self) -> &Arc<PointRange> {
        &self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_dim_rounds_to_cache_line() {
        assert_eq!(aligned_dim(100), 112);
        assert_eq!(aligned_dim(112), 112);
        assert_eq!(aligned_dim(1), 16);
        assert_eq!(aligned_dim(0), 0);
    }

    #[test]
    fn test_rows_are_padded_with_zeros() {
        let range = PointRange::from_rows(&[vec![1.0; 100], vec![2.0; 100]], 100);
        assert_eq!(range.len(), 2);
        assert_eq!(range.aligned_dim(), 112);

        let row = range.point(1);
        assert_eq!(row.len(), 112);
        assert!(row[..100].iter().all(|&v| v == 2.0));
        assert!(row[100..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_buffer_is_cache_line_aligned() {
        let range = PointRange::zeroed(3, 100);
        let addr = range.point(0).as_ptr() as usize;
        assert_eq!(addr % BUFFER_ALIGN, 0);
    }

    #[test]
    fn test_empty_range() {
        let range = PointRange::zeroed(0, 100);
        assert!(range.is_empty());
    }

    #[test]
    fn test_subset_maps_local_to_global() {
        let rows: Vec<Vec<f32>> = (0..5).map(|i| vec![i as f32; 4]).collect();
        let points = Arc::new(PointRange::from_rows(&rows, 4));

        let subset = SubsetPoints::new(Arc::clone(&points), vec![4, 2, 0]);
        assert_eq!(subset.len(), 3);
        assert_eq!(subset.global_id(0), 4);
        assert_eq!(subset.global_id(2), 0);
        assert_eq!(subset.point(0)[0], 4.0);
    }

    #[test]
    fn test_shared_subset_views_a_window() {
        let rows: Vec<Vec<f32>> = (0..6).map(|i| vec![i as f32; 4]).collect();
        let points = Arc::new(PointRange::from_rows(&rows, 4));
        let order: Arc<[u32]> = vec![5, 4, 3, 2, 1, 0].into();

        let window = SubsetPoints::shared(points, Arc::clone(&order), 2..5);
        assert_eq!(window.len(), 3);
        assert_eq!(window.ids(), &[3, 2, 1]);
        assert_eq!(window.global_id(1), 2);
    }
}
