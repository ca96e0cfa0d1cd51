//! Hierarchical tariff aggregation and weighting.
//!
//! Tariff vectors indexed by a product classification are import-weighted per country, then
//! aggregated into the layered NIPA categories. Tariffs can also be edited at section, chapter or
//! HS4 level and propagated through the classification hierarchy.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cli;
pub mod data_source;
pub mod hierarchy;
pub mod id;
pub mod import_weights;
pub mod input;
pub mod log;
pub mod nipa;
pub mod output;
pub mod scenario;
pub mod settings;
pub mod tariff;
pub mod vector;
pub mod weighting;

#[cfg(test)]
mod fixture;

/// Get the directory where the program's configuration files are stored.
///
/// Falls back to the current directory if the platform has no standard config directory.
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_default().join("tariff-engine")
}
