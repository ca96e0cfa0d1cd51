//! Per-country import composition, used to weight tariff vectors by trade exposure.
use crate::data_source::{DataSource, fetch_json};
use crate::id::{ClassificationCode, CountryCode};
use crate::vector::{ClassificationVector, equal_weights};
use anyhow::{Result, ensure};
use log::{debug, error, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::rc::Rc;

/// Import shares for a single country, keyed by classification code
pub type CountryShares = HashMap<ClassificationCode, f64>;

/// The import-share table for all countries.
///
/// Shares lie in [0, 1] but need not sum to one across codes.
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct ImportWeightTable {
    /// Shares keyed by country, then classification code
    #[serde(default)]
    pub direct: HashMap<CountryCode, CountryShares>,
}

impl ImportWeightTable {
    /// Check that every share is a proportion
    pub fn validate(&self) -> Result<()> {
        for (country, shares) in &self.direct {
            for (code, share) in shares {
                ensure!(
                    (0.0..=1.0).contains(share),
                    "Import share for country {country}, code {code} is not between 0 and 1 \
                    (got {share})"
                );
            }
        }

        Ok(())
    }

    /// Remove every share which is not a proportion, logging each one.
    ///
    /// Other shares for the same country are kept. Returns the number of shares removed.
    pub fn drop_invalid_shares(&mut self) -> usize {
        let mut count = 0;
        for (country, shares) in &mut self.direct {
            shares.retain(|code, share| {
                let valid = (0.0..=1.0).contains(share);
                if !valid {
                    warn!(
                        "Ignoring import share for country {country}, code {code}: {share} is \
                        not between 0 and 1"
                    );
                    count += 1;
                }
                valid
            });
        }

        count
    }

    /// Build an import-weight vector for `country` in the given classification order.
    ///
    /// Codes the country has no share for get 0. A country with no entry at all gets the
    /// [`equal_weights`] prior instead.
    pub fn ordered_vector(
        &self,
        country: &CountryCode,
        order: &[ClassificationCode],
    ) -> ClassificationVector {
        let Some(shares) = self.direct.get(country) else {
            debug!("No import weights for {country}; using equal weights");
            return equal_weights(order.len());
        };

        order
            .iter()
            .map(|code| shares.get(code).copied().unwrap_or(0.0))
            .collect()
    }
}

/// Loads the import-weight table once and keeps it until [`clear_cache`] is called.
///
/// [`clear_cache`]: ImportWeightProvider::clear_cache
pub struct ImportWeightProvider {
    source: Rc<dyn DataSource>,
    key: String,
    cache: Option<Rc<ImportWeightTable>>,
}

impl ImportWeightProvider {
    /// Create a provider which fetches the table stored under `key`
    pub fn new(source: Rc<dyn DataSource>, key: &str) -> Self {
        Self {
            source,
            key: key.to_string(),
            cache: None,
        }
    }

    fn fetch_table(&self) -> Result<ImportWeightTable> {
        let mut table: ImportWeightTable = fetch_json(self.source.as_ref(), &self.key)?;
        let dropped = table.drop_invalid_shares();
        if dropped > 0 {
            warn!("Ignored {dropped} invalid import shares in {}", self.key);
        }

        Ok(table)
    }

    /// Get the import-weight table, fetching it on first use.
    ///
    /// Returns `None` (and logs the reason) if the fetch fails. A failed fetch is not cached.
    pub fn load(&mut self) -> Option<Rc<ImportWeightTable>> {
        if let Some(table) = &self.cache {
            return Some(Rc::clone(table));
        }

        match self.fetch_table() {
            Ok(table) => {
                let table = Rc::new(table);
                self.cache = Some(Rc::clone(&table));
                Some(table)
            }
            Err(err) => {
                error!("Failed to load import weights: {err:#}");
                None
            }
        }
    }

    /// Build the ordered import-weight vector for `country`.
    ///
    /// If the table cannot be loaded, the country is treated as having no data.
    pub fn ordered_vector(
        &mut self,
        country: &CountryCode,
        order: &[ClassificationCode],
    ) -> ClassificationVector {
        match self.load() {
            Some(table) => table.ordered_vector(country, order),
            None => equal_weights(order.len()),
        }
    }

    /// Whether the table is currently cached
    pub fn is_loaded(&self) -> bool {
        self.cache.is_some()
    }

    /// Drop the cached table so the next call fetches it again
    pub fn clear_cache(&mut self) {
        self.cache = None;
    }
}
