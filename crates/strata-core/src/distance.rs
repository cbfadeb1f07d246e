//! SIMD squared-L2 distance for aligned vectors.
//!
//! Every vector in the engine is stored at a stride that is a multiple of
//! eight `f32` lanes with zeroed padding, so the kernel runs pure 8-wide
//! chunks with no scalar remainder. Padding lanes are zero on both sides and
//! contribute nothing to the sum.
//!
//! The `wide` crate picks the best instruction set per platform (AVX2/SSE on
//! `x86_64`, NEON on `aarch64`, scalar elsewhere) without code changes.

use wide::f32x8;

/// Computes squared L2 distance over two equally-sized aligned buffers.
///
/// Avoids the square root: only the ranking matters to every caller.
///
/// # Panics
///
/// Debug builds assert that both slices have the same 8-divisible length.
#[inline]
#[must_use]
pub fn l2_squared_aligned(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vector strides must match");
    debug_assert_eq!(a.len() % 8, 0, "stride must be a multiple of 8 lanes");

    let mut sum = f32x8::ZERO;

    for (ca, cb) in a.chunks_exact(8).zip(b.chunks_exact(8)) {
        let va = f32x8::from(ca);
        let vb = f32x8::from(cb);
        let diff = va - vb;
        sum = diff.mul_add(diff, sum); // FMA: sum = (diff * diff) + sum
    }

    sum.reduce_add()
}
