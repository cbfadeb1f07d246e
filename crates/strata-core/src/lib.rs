//! # Strata Core
//!
//! Hybrid approximate nearest-neighbor search over vectors annotated with a
//! categorical label and a continuous timestamp.
//!
//! The engine answers four query kinds over 100-dimensional vectors:
//! unfiltered top-k, label-equality top-k, timestamp-range top-k, and
//! label-plus-range top-k. Large point populations get a pruned proximity
//! graph searched by beam search; small ones get an exhaustive scan; range
//! filters route through a dyadic hierarchy of timestamp windows so the
//! searched graph is always well-matched to the filter.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata_core::{io, EngineConfig, StrataIndex};
//!
//! let dataset = io::read_dataset("points.bin")?;
//! let index = StrataIndex::build(dataset, EngineConfig::load()?)?;
//!
//! let queries = io::read_queries("queries.bin")?;
//! let (results, stats) = index.run_queries(&queries, 100)?;
//! io::write_results("out.bin", &results)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod config;
pub mod distance;
pub mod engine;
pub mod error;
pub mod index;
pub mod io;
pub mod points;
pub mod query;
pub mod windows;

pub use config::{BuildParams, EngineConfig, QueryParams, RoutingConfig};
pub use engine::{QueryStats, StrataIndex};
pub use error::{Error, Result};
pub use index::{FlatIndex, GraphIndex, Index};
pub use points::{PointId, PointRange, SubsetPoints};
pub use query::{QueryBatch, QueryKind, QueryMeta};
