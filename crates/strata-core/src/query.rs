//! Query records.
//!
//! A query batch keeps its metadata separate from its vectors: the vectors
//! live in their own aligned [`PointRange`] so the distance kernel sees the
//! same layout as the dataset, while the metadata records are what the
//! dispatcher sorts and routes.

use crate::error::{Error, Result};
use crate::points::PointRange;

/// The four supported query kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum QueryKind {
    /// Unfiltered top-k.
    Unfiltered = 0,
    /// Label-equality filter + top-k.
    Label = 1,
    /// Timestamp-range filter + top-k.
    Timestamp = 2,
    /// Label-equality AND timestamp-range filter + top-k.
    LabelTimestamp = 3,
}

impl QueryKind {
    /// All kinds in dispatch order.
    pub const ALL: [Self; 4] = [
        Self::Unfiltered,
        Self::Label,
        Self::Timestamp,
        Self::LabelTimestamp,
    ];
}

impl TryFrom<u32> for QueryKind {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Unfiltered),
            1 => Ok(Self::Label),
            2 => Ok(Self::Timestamp),
            3 => Ok(Self::LabelTimestamp),
            other => Err(Error::Format(format!(
                "query kind {other} is outside 0..=3"
            ))),
        }
    }
}

/// Metadata for one query; the vector lives in the batch's point range at
/// row `original_index`.
#[derive(Debug, Clone, Copy)]
pub struct QueryMeta {
    /// Which filter combination applies.
    pub kind: QueryKind,
    /// Label filter operand (meaningful for kinds 1 and 3).
    pub label: u32,
    /// Range filter lower bound (meaningful for kinds 2 and 3).
    pub t_start: f32,
    /// Range filter upper bound (meaningful for kinds 2 and 3).
    pub t_end: f32,
    /// Position of this query in the input file; results land at
    /// `out[original_index * k ..]`.
    pub original_index: u32,
}

impl QueryMeta {
    /// Lexicographic dispatch key: `(kind, label, t_start, t_end, index)`.
    ///
    /// Groups kind-1 queries by label and keeps each kind contiguous so the
    /// dispatcher can hand whole blocks to one index.
    #[must_use]
    pub fn sort_key(&self) -> (u8, u32, [u8; 4], [u8; 4], u32) {
        (
            self.kind as u8,
            self.label,
            total_order_bytes(self.t_start),
            total_order_bytes(self.t_end),
            self.original_index,
        )
    }
}

/// Monotone byte encoding of an f32 under IEEE total order, so float fields
/// can participate in a plain `Ord` sort key.
fn total_order_bytes(v: f32) -> [u8; 4] {
    let bits = v.to_bits();
    let key = if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    };
    key.to_be_bytes()
}

/// A parsed query file: metadata plus the aligned query vectors.
#[derive(Debug)]
pub struct QueryBatch {
    /// One record per query, in file order.
    pub metas: Vec<QueryMeta>,
    /// Query vectors, row `i` = query `i`.
    pub vectors: PointRange,
}

impl QueryBatch {
    /// Number of queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    /// Returns true if the batch holds no queries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!(QueryKind::try_from(0).unwrap(), QueryKind::Unfiltered);
        assert_eq!(QueryKind::try_from(3).unwrap(), QueryKind::LabelTimestamp);
        let err = QueryKind::try_from(4).unwrap_err();
        assert_eq!(err.code(), "STRATA-002");
    }

    #[test]
    fn test_total_order_bytes_is_monotone() {
        let samples = [-3.5f32, -0.0, 0.0, 0.1, 0.1000001, 1.0, 1e9];
        for pair in samples.windows(2) {
            assert!(
                total_order_bytes(pair[0]) <= total_order_bytes(pair[1]),
                "{} vs {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_sort_key_groups_by_kind_then_label() {
        let make = |kind, label, t0| QueryMeta {
            kind,
            label,
            t_start: t0,
            t_end: 1.0,
            original_index: 0,
        };

        let a = make(QueryKind::Unfiltered, 7, 0.9);
        let b = make(QueryKind::Label, 0, 0.0);
        let c = make(QueryKind::Label, 1, 0.0);

        assert!(a.sort_key() < b.sort_key());
        assert!(b.sort_key() < c.sort_key());
    }
}
