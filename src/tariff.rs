//! Resolution of effective and original tariff values for countries and hierarchy keys.
//!
//! The current value for a key is read from the [`TariffStore`] if present. Otherwise the value
//! for the key's section is taken from source bilateral data and seeded into the store, so that a
//! key which has been read once always has a baseline to compare edits against.
use crate::hierarchy::HierarchyKey;
use crate::id::{CountryCode, SectionID};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

pub mod propagation;
pub mod store;
use store::{BaselineOrigin, CellOrigin, OriginalStore, TariffCell, TariffStore};

/// Tariffs for one sector in one year
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SectorTariff {
    /// Tariff applied by the US to imports from the country
    pub us_to_country: f64,
    /// Tariff applied by the country to imports from the US
    #[serde(default)]
    pub country_to_us: Option<f64>,
}

/// Source bilateral tariff data for a single country
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BilateralEntry {
    /// Sector tariffs keyed by year, then section name
    #[serde(default)]
    pub sector_data: HashMap<String, HashMap<String, SectorTariff>>,
}

/// Source bilateral tariff data for every country
pub type BilateralTariffs = HashMap<CountryCode, BilateralEntry>;

/// A resolved tariff value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffRecord {
    /// The key the value was found under
    pub code: HierarchyKey,
    /// Tariff percentage
    pub us_tariff: f64,
}

/// Translates between section IDs and the section names used by source data
pub trait ClassificationResolver {
    /// The display name for a section
    fn section_name(&self, section: &SectionID) -> Option<&str>;

    /// The section with the given display name
    fn section_for_name(&self, name: &str) -> Option<SectionID>;

    /// Every known section, in order
    fn section_ids(&self) -> Vec<SectionID>;
}

/// A [`ClassificationResolver`] backed by a table of section names
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct SectionNameMap(IndexMap<SectionID, String>);

impl FromIterator<(SectionID, String)> for SectionNameMap {
    fn from_iter<I: IntoIterator<Item = (SectionID, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl ClassificationResolver for SectionNameMap {
    fn section_name(&self, section: &SectionID) -> Option<&str> {
        self.0.get(section).map(String::as_str)
    }

    fn section_for_name(&self, name: &str) -> Option<SectionID> {
        self.0
            .iter()
            .find(|(_, section_name)| *section_name == name)
            .map(|(section, _)| section.clone())
    }

    fn section_ids(&self) -> Vec<SectionID> {
        self.0.keys().cloned().collect()
    }
}

/// Reads and writes tariff values for the selected data year
pub struct TariffAccessor {
    bilateral: Rc<BilateralTariffs>,
    resolver: Rc<dyn ClassificationResolver>,
    year: String,
    current: TariffStore,
    originals: OriginalStore,
}

impl TariffAccessor {
    /// Create an accessor over `bilateral` data for `year`, with empty stores
    pub fn new(
        bilateral: Rc<BilateralTariffs>,
        resolver: Rc<dyn ClassificationResolver>,
        year: &str,
    ) -> Self {
        Self {
            bilateral,
            resolver,
            year: year.to_string(),
            current: TariffStore::new(),
            originals: OriginalStore::new(),
        }
    }

    /// The store of current values
    pub fn current_store(&self) -> &TariffStore {
        &self.current
    }

    /// The store of original values
    pub fn original_store(&self) -> &OriginalStore {
        &self.originals
    }

    /// The section resolver
    pub fn resolver(&self) -> &dyn ClassificationResolver {
        self.resolver.as_ref()
    }

    /// Look up the tariff for a section directly from source data
    pub fn source_tariff(&self, country: &CountryCode, section: &SectionID) -> Result<f64> {
        let entry = self
            .bilateral
            .get(country)
            .with_context(|| format!("No bilateral tariff data for {country}"))?;
        let name = self
            .resolver
            .section_name(section)
            .with_context(|| format!("No name found for section {section}"))?;
        let sector = entry
            .sector_data
            .get(&self.year)
            .with_context(|| format!("No tariff data for {country} in {}", self.year))?
            .get(name)
            .with_context(|| {
                format!("No tariff data for {country}, sector '{name}' in {}", self.year)
            })?;

        Ok(sector.us_to_country)
    }

    /// Resolve the tariff currently in effect.
    ///
    /// Looks for `key` in the current store, then the plain section. Failing both, the section's
    /// value is read from source data and seeded into the current store as pristine.
    ///
    /// Returns `None` (and logs the reason) if there is no source data for the section.
    pub fn get_effective_tariff(
        &mut self,
        country: &CountryCode,
        section: &SectionID,
        key: Option<&HierarchyKey>,
    ) -> Option<TariffRecord> {
        if let Some(key) = key
            && let Some(cell) = self.current.get(country, key)
        {
            return Some(TariffRecord {
                code: key.clone(),
                us_tariff: cell.value,
            });
        }

        let section_key = HierarchyKey::Section(section.clone());
        if let Some(cell) = self.current.get(country, &section_key) {
            return Some(TariffRecord {
                code: section_key,
                us_tariff: cell.value,
            });
        }

        match self.source_tariff(country, section) {
            Ok(value) => {
                debug!("Seeding tariff for {country}, section {section} with {value}");
                self.current.seed(country, section_key.clone(), value);
                Some(TariffRecord {
                    code: section_key,
                    us_tariff: value,
                })
            }
            Err(err) => {
                warn!("Cannot resolve tariff: {err:#}");
                None
            }
        }
    }

    /// Resolve the original tariff for a section.
    ///
    /// A baseline in the original store takes precedence over source data.
    pub fn get_original_tariff(
        &self,
        country: &CountryCode,
        section: &SectionID,
    ) -> Option<TariffRecord> {
        let us_tariff = match self.originals.get(country, section) {
            Some(baseline) => baseline.value,
            None => match self.source_tariff(country, section) {
                Ok(value) => value,
                Err(err) => {
                    debug!("No original tariff: {err:#}");
                    return None;
                }
            },
        };

        Some(TariffRecord {
            code: HierarchyKey::Section(section.clone()),
            us_tariff,
        })
    }

    /// Snapshot the original tariff for every section for `country`.
    ///
    /// Does nothing if the country has already been captured. Returns whether a snapshot was
    /// taken.
    pub fn capture_originals_for_country(&mut self, country: &CountryCode) -> bool {
        if self.originals.is_captured(country) {
            return false;
        }

        let values: Vec<_> = self
            .resolver
            .section_ids()
            .into_iter()
            .filter_map(|section| {
                let record = self.get_original_tariff(country, &section)?;
                Some((section, record.us_tariff))
            })
            .collect();
        debug!("Captured {} original tariffs for {country}", values.len());
        self.originals.capture(country, values);

        true
    }

    /// Set the current tariff for `key`, marking it as overridden
    pub fn set_tariff(&mut self, country: &CountryCode, key: HierarchyKey, value: f64) {
        self.current.set(country, key, value);
    }

    /// Set the original tariff for a section, marking it as modified
    pub fn set_original(&mut self, country: &CountryCode, section: SectionID, value: f64) {
        self.originals.set_modified(country, section, value);
    }

    /// The current cell for `key`, if any
    pub fn cell(&self, country: &CountryCode, key: &HierarchyKey) -> Option<&TariffCell> {
        self.current.get(country, key)
    }

    /// Whether `key` has been set by an edit
    pub fn is_overridden(&self, country: &CountryCode, key: &HierarchyKey) -> bool {
        self.cell(country, key)
            .is_some_and(|cell| cell.origin == CellOrigin::Overridden)
    }

    /// Whether the original tariff for a section has been edited
    pub fn is_original_modified(&self, country: &CountryCode, section: &SectionID) -> bool {
        self.originals
            .get(country, section)
            .is_some_and(|baseline| baseline.origin == BaselineOrigin::Modified)
    }

    /// Percentage change of the effective section tariff relative to the original.
    ///
    /// Returns `None` if either value is unavailable or the original is zero.
    pub fn percent_change(&mut self, country: &CountryCode, section: &SectionID) -> Option<f64> {
        let original = self.get_original_tariff(country, section)?.us_tariff;
        let effective = self.get_effective_tariff(country, section, None)?.us_tariff;
        if original == 0.0 {
            return None;
        }

        Some((effective - original) / original * 100.0)
    }
}
