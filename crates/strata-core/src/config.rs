//! Engine configuration.
//!
//! All tunables live in one explicit [`EngineConfig`] record that is threaded
//! through every constructor. The record can be loaded from `strata.toml` and
//! `STRATA_*` environment variables, or built in code.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`STRATA_*`)
//! 2. Configuration file (`strata.toml`)
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Graph construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildParams {
    /// Maximum out-degree per vertex (R). Higher = better recall, more
    /// memory, slower build.
    pub max_degree: usize,
    /// Beam width used while locating candidate neighborhoods (L).
    pub beam_width: usize,
    /// Prune relaxation factor. 1.0 keeps only locally-closest edges;
    /// values above 1.0 admit longer shortcut edges.
    pub alpha: f32,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            max_degree: 64,
            beam_width: 500,
            alpha: 1.175,
        }
    }
}

/// Search parameters for one beam-search invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    /// Number of neighbors to return.
    pub k: usize,
    /// Frontier capacity. Higher = better recall, slower search.
    pub beam_width: usize,
    /// Relative slack on the k-th frontier distance that keeps the search
    /// expanding. 1.0 stops as soon as the frontier is locally optimal.
    pub cut: f32,
    /// Hard cap on distance comparisons per search.
    pub limit: usize,
    /// Maximum neighbors fetched per expanded vertex.
    pub degree_limit: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            k: 100,
            beam_width: 500,
            cut: 1.35,
            limit: 10_000_000,
            degree_limit: 100,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Graph construction parameters.
    pub build: BuildParams,
    /// Default search parameters.
    pub query: QueryParams,
    /// Routing parameters.
    pub routing: RoutingConfig,
}

/// Parameters that decide which index substrate answers a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Point-count threshold separating exhaustive from graph-backed
    /// indices, for label buckets and window sizing alike.
    pub cutoff: usize,
    /// Normalized timestamp width below which a range query falls back to
    /// an exhaustive scan instead of overretrieving on the graph.
    pub exhaustive_fallback_width: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            cutoff: 50_000,
            exhaustive_fallback_width: 0.25,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < `strata.toml` < `STRATA_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from_path("strata.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if parsing or validation fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("STRATA_").split("_").lowercase(false));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration from a TOML string, on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if parsing or validation fails.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML, e.g. to seed a `strata.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if !(1..=1024).contains(&self.build.max_degree) {
            return Err(Error::Config(format!(
                "build.max_degree {} is out of range [1, 1024]",
                self.build.max_degree
            )));
        }

        if self.build.beam_width == 0 {
            return Err(Error::Config("build.beam_width must be positive".into()));
        }

        if self.build.alpha < 1.0 {
            return Err(Error::Config(format!(
                "build.alpha {} must be >= 1.0",
                self.build.alpha
            )));
        }

        if self.query.beam_width < self.query.k {
            return Err(Error::Config(format!(
                "query.beam_width {} must be >= query.k {}",
                self.query.beam_width, self.query.k
            )));
        }

        if self.query.cut < 1.0 {
            return Err(Error::Config(format!(
                "query.cut {} must be >= 1.0",
                self.query.cut
            )));
        }

        if self.routing.cutoff == 0 {
            return Err(Error::Config("routing.cutoff must be positive".into()));
        }

        if !(0.0..=1.0).contains(&self.routing.exhaustive_fallback_width) {
            return Err(Error::Config(format!(
                "routing.exhaustive_fallback_width {} is out of range [0.0, 1.0]",
                self.routing.exhaustive_fallback_width
            )));
        }

        Ok(())
    }
}
