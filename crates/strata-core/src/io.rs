//! Binary dataset, query, and result file codecs.
//!
//! All files are little-endian. The dataset file is `u32 N` followed by `N`
//! records of `f32 label, f32 timestamp, f32 vector[100]`; the query file is
//! `u32 Q` followed by `Q` records of `f32 kind, f32 label, f32 t_start,
//! f32 t_end, f32 vector[100]`; the result file is `Q x k` little-endian
//! `u32` ids, row-major.
//!
//! Input files are memory-mapped and decoded in parallel straight into the
//! aligned point buffer.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::points::{PointRange, SubsetPoints};
use crate::query::{QueryBatch, QueryKind, QueryMeta};

/// Logical vector dimension of every dataset and query file.
pub const DIM: usize = 100;

/// A loaded dataset: aligned vectors plus per-point attributes.
#[derive(Debug)]
pub struct Dataset {
    /// The vectors, shared with every index built over them.
    pub points: Arc<PointRange>,
    /// Categorical label per point, indexed by global id.
    pub labels: Vec<u32>,
    /// Timestamp per point, indexed by global id.
    pub timestamps: Vec<f32>,
}

impl Dataset {
    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the dataset holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// A subset view over the given global ids.
    #[must_use]
    pub fn subset(&self, ids: Vec<u32>) -> SubsetPoints {
        SubsetPoints::new(Arc::clone(&self.points), ids)
    }
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    // SAFETY: the map is read-only and input files are not mutated while
    // the engine runs.
    unsafe { Mmap::map(&file) }.map_err(|e| Error::io(path, e))
}

fn read_le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(bytes[..4].try_into().expect("4-byte slice"))
}

fn read_le_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes(bytes[..4].try_into().expect("4-byte slice"))
}

fn decode_vector(record: &[u8], row: &mut [f32]) {
    for (lane, chunk) in row[..DIM].iter_mut().zip(record.chunks_exact(4)) {
        *lane = read_le_f32(chunk);
    }
}

/// Reads a dataset file.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be opened or mapped, and
/// [`Error::Format`] if its size does not match the declared point count.
pub fn read_dataset(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let mmap = map_file(path)?;
    let bytes: &[u8] = &mmap;

    if bytes.len() < 4 {
        return Err(Error::Format(format!(
            "{}: missing point count header",
            path.display()
        )));
    }

    let n = read_le_u32(bytes) as usize;
    let record_len = (2 + DIM) * 4;
    let expected = 4 + n * record_len;
    if bytes.len() != expected {
        return Err(Error::Format(format!(
            "{}: {} bytes, expected {} for {} points",
            path.display(),
            bytes.len(),
            expected,
            n
        )));
    }

    tracing::info!(points = n, dim = DIM, "loading dataset");

    let mut points = PointRange::zeroed(n, DIM);
    let stride = points.aligned_dim();
    let mut labels = vec![0u32; n];
    let mut timestamps = vec![0.0f32; n];
    let body = &bytes[4..];

    labels
        .par_iter_mut()
        .zip(timestamps.par_iter_mut())
        .zip(points.values_mut().par_chunks_mut(stride))
        .enumerate()
        .for_each(|(i, ((label, timestamp), row))| {
            let record = &body[i * record_len..(i + 1) * record_len];
            *label = read_le_f32(record) as u32;
            *timestamp = read_le_f32(&record[4..]);
            decode_vector(&record[8..], row);
        });

    Ok(Dataset {
        points: Arc::new(points),
        labels,
        timestamps,
    })
}

/// Reads a query file.
///
/// # Errors
///
/// Returns [`Error::Io`] on open/map failures, and [`Error::Format`] on a
/// size mismatch or a query kind outside `0..=3`.
pub fn read_queries(path: impl AsRef<Path>) -> Result<QueryBatch> {
    let path = path.as_ref();
    let mmap = map_file(path)?;
    let bytes: &[u8] = &mmap;

    if bytes.len() < 4 {
        return Err(Error::Format(format!(
            "{}: missing query count header",
            path.display()
        )));
    }

    let q = read_le_u32(bytes) as usize;
    let record_len = (4 + DIM) * 4;
    let expected = 4 + q * record_len;
    if bytes.len() != expected {
        return Err(Error::Format(format!(
            "{}: {} bytes, expected {} for {} queries",
            path.display(),
            bytes.len(),
            expected,
            q
        )));
    }

    tracing::info!(queries = q, "loading queries");

    let body = &bytes[4..];
    let mut metas = Vec::with_capacity(q);
    for i in 0..q {
        let record = &body[i * record_len..];
        let kind = QueryKind::try_from(read_le_f32(record) as u32)?;
        metas.push(QueryMeta {
            kind,
            label: read_le_f32(&record[4..]) as u32,
            t_start: read_le_f32(&record[8..]),
            t_end: read_le_f32(&record[12..]),
            original_index: i as u32,
        });
    }

    let mut vectors = PointRange::zeroed(q, DIM);
    let stride = vectors.aligned_dim();
    vectors
        .values_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(i, row)| {
            decode_vector(&body[i * record_len + 16..(i + 1) * record_len], row);
        });

    Ok(QueryBatch { metas, vectors })
}

/// Writes a result buffer as little-endian `u32` ids.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be created or written.
pub fn write_results(path: impl AsRef<Path>, results: &[u32]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let encoded: Vec<u8> = results.iter().flat_map(|v| v.to_le_bytes()).collect();
    writer
        .write_all(&encoded)
        .and_then(|()| writer.flush())
        .map_err(|e| Error::io(path, e))
}

/// Reads a result file back into ids.
///
/// # Errors
///
/// Returns [`Error::Io`] on read failures and [`Error::Format`] if the file
/// length is not a multiple of four bytes.
pub fn read_results(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(|e| Error::io(path, e))?;

    if bytes.len() % 4 != 0 {
        return Err(Error::Format(format!(
            "{}: length {} is not a whole number of u32 ids",
            path.display(),
            bytes.len()
        )));
    }

    Ok(bytes.chunks_exact(4).map(read_le_u32).collect())
}
