//! The opaque key-value data source from which reference tables are fetched.
//!
//! Keys are plain strings (usually file names). The engine never interprets them beyond passing
//! them to [`DataSource::fetch`].
use crate::input::{input_err_msg, parse_json};
use anyhow::{Context, Result};
use log::debug;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Something which can fetch a document by key
pub trait DataSource {
    /// Fetch the raw contents of the document stored under `key`
    fn fetch(&self, key: &str) -> Result<String>;
}

/// Fetch the document stored under `key` and parse it as JSON
pub fn fetch_json<T: DeserializeOwned>(source: &dyn DataSource, key: &str) -> Result<T> {
    let json = source.fetch(key)?;
    parse_json(&json, key)
}

/// A data source backed by files in a directory
#[derive(Debug, Clone)]
pub struct DirectoryDataSource {
    root: PathBuf,
}

impl DirectoryDataSource {
    /// Create a data source whose keys are file names relative to `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The directory keys are resolved against
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DataSource for DirectoryDataSource {
    fn fetch(&self, key: &str) -> Result<String> {
        let file_path = self.root.join(key);
        debug!("Fetching {}", file_path.display());
        fs::read_to_string(&file_path).with_context(|| input_err_msg(&file_path))
    }
}

/// A data source holding its documents in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDataSource(HashMap<String, String>);

impl MemoryDataSource {
    /// Create a new, empty data source
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document under `key`, replacing any existing one
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, document: V) {
        self.0.insert(key.into(), document.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemoryDataSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, document)| (key.into(), document.into()))
                .collect(),
        )
    }
}

impl DataSource for MemoryDataSource {
    fn fetch(&self, key: &str) -> Result<String> {
        self.0
            .get(key)
            .cloned()
            .with_context(|| format!("No data found for key {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_directory_data_source() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join("values.json")).unwrap();
            write!(file, "[1, 2, 3]").unwrap();
        }

        let source = DirectoryDataSource::new(dir.path());
        let values: Vec<u32> = fetch_json(&source, "values.json").unwrap();
        assert_eq!(values, [1, 2, 3]);
        assert!(source.fetch("missing.json").is_err());
    }

    #[test]
    fn test_memory_data_source() {
        let mut source: MemoryDataSource = [("a", "1")].into_iter().collect();
        source.insert("b", "\"two\"");

        assert_eq!(fetch_json::<u32>(&source, "a").unwrap(), 1);
        assert_eq!(fetch_json::<String>(&source, "b").unwrap(), "two");
        assert_error!(source.fetch("c"), "No data found for key c");
    }
}
