//! Common routines for handling input data.
use anyhow::{Context, Result};
use itertools::Itertools;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::fs;
use std::hash::Hash;
use std::path::Path;

/// Format an error message to include the file path.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Parse a JSON document, naming the data key it came from in any error.
pub fn parse_json<T: DeserializeOwned, K: Display>(json: &str, key: K) -> Result<T> {
    serde_json::from_str(json).with_context(|| format!("Error parsing JSON data from {key}"))
}

/// Check whether a sequence contains no repeated values
pub fn is_unique<T, I>(iter: I) -> bool
where
    T: Eq + Hash,
    I: IntoIterator<Item = T>,
{
    iter.into_iter().all_unique()
}
