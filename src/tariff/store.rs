//! Per-country stores of current and original tariff values.
use crate::hierarchy::HierarchyKey;
use crate::id::{CountryCode, SectionID};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Where a current tariff value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CellOrigin {
    /// Seeded from source bilateral data on first read
    Pristine,
    /// Set explicitly by an edit
    Overridden,
    /// Recalculated from the values below it after an edit
    Derived,
}

/// The current tariff for one country and hierarchy key
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TariffCell {
    /// Tariff percentage
    pub value: f64,
    /// How the value was set
    pub origin: CellOrigin,
}

/// Current tariff values, by country and hierarchy key.
///
/// A cell is created once, either by seeding or by an edit. Seeding never replaces an existing
/// cell. When a cell is first derived, the value it held before is kept as its base, which is
/// what nodes below it inherit.
#[derive(Debug, Default)]
pub struct TariffStore {
    cells: HashMap<CountryCode, IndexMap<HierarchyKey, TariffCell>>,
    bases: HashMap<CountryCode, HashMap<HierarchyKey, f64>>,
}

impl TariffStore {
    /// Create a new, empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve the cell for `key`
    pub fn get(&self, country: &CountryCode, key: &HierarchyKey) -> Option<&TariffCell> {
        self.cells.get(country)?.get(key)
    }

    /// The value nodes below `key` inherit from it.
    ///
    /// A derived cell passes on its base rather than its own value, or nothing if it never had
    /// one.
    pub fn inherited(&self, country: &CountryCode, key: &HierarchyKey) -> Option<f64> {
        let cell = self.get(country, key)?;
        if cell.origin == CellOrigin::Derived {
            return self.bases.get(country)?.get(key).copied();
        }

        Some(cell.value)
    }

    /// Store a pristine value if no cell exists yet.
    ///
    /// Returns whether a cell was created.
    pub fn seed(&mut self, country: &CountryCode, key: HierarchyKey, value: f64) -> bool {
        let cells = self.cells.entry(country.clone()).or_default();
        if cells.contains_key(&key) {
            return false;
        }

        cells.insert(
            key,
            TariffCell {
                value,
                origin: CellOrigin::Pristine,
            },
        );
        true
    }

    /// Store an edited value, replacing any existing cell
    pub fn set(&mut self, country: &CountryCode, key: HierarchyKey, value: f64) {
        if let Some(bases) = self.bases.get_mut(country) {
            bases.remove(&key);
        }
        self.cells.entry(country.clone()).or_default().insert(
            key,
            TariffCell {
                value,
                origin: CellOrigin::Overridden,
            },
        );
    }

    /// Store a recalculated value, keeping the replaced value as the base if there isn't one
    pub fn derive(&mut self, country: &CountryCode, key: HierarchyKey, value: f64) {
        let cells = self.cells.entry(country.clone()).or_default();
        if let Some(cell) = cells.get(&key)
            && cell.origin != CellOrigin::Derived
        {
            self.bases
                .entry(country.clone())
                .or_default()
                .insert(key.clone(), cell.value);
        }

        cells.insert(
            key,
            TariffCell {
                value,
                origin: CellOrigin::Derived,
            },
        );
    }

    /// All cells for a country, in the order they were created
    pub fn cells(&self, country: &CountryCode) -> Option<&IndexMap<HierarchyKey, TariffCell>> {
        self.cells.get(country)
    }
}

/// Where an original (baseline) tariff value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BaselineOrigin {
    /// Copied from source bilateral data
    Source,
    /// Edited by the user
    Modified,
}

/// An original tariff value used as the baseline for deltas
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Baseline {
    /// Tariff percentage
    pub value: f64,
    /// How the value was set
    pub origin: BaselineOrigin,
}

/// Original tariff values, by country and section
#[derive(Debug, Default)]
pub struct OriginalStore {
    baselines: HashMap<CountryCode, IndexMap<SectionID, Baseline>>,
    captured: HashSet<CountryCode>,
}

impl OriginalStore {
    /// Create a new, empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve the baseline for a section
    pub fn get(&self, country: &CountryCode, section: &SectionID) -> Option<&Baseline> {
        self.baselines.get(country)?.get(section)
    }

    /// Whether a full snapshot has been taken for `country`
    pub fn is_captured(&self, country: &CountryCode) -> bool {
        self.captured.contains(country)
    }

    /// Record a snapshot of source values for `country`.
    ///
    /// Sections which already have a baseline keep it.
    pub fn capture<I>(&mut self, country: &CountryCode, values: I)
    where
        I: IntoIterator<Item = (SectionID, f64)>,
    {
        let baselines = self.baselines.entry(country.clone()).or_default();
        for (section, value) in values {
            baselines.entry(section).or_insert(Baseline {
                value,
                origin: BaselineOrigin::Source,
            });
        }
        self.captured.insert(country.clone());
    }

    /// Store a user-edited baseline
    pub fn set_modified(&mut self, country: &CountryCode, section: SectionID, value: f64) {
        self.baselines.entry(country.clone()).or_default().insert(
            section,
            Baseline {
                value,
                origin: BaselineOrigin::Modified,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_write_once() {
        let mut store = TariffStore::new();
        let can = CountryCode::new("CAN");
        let key = HierarchyKey::Section("S1".into());

        assert!(store.seed(&can, key.clone(), 10.0));
        assert!(!store.seed(&can, key.clone(), 20.0));
        assert_eq!(
            store.get(&can, &key),
            Some(&TariffCell {
                value: 10.0,
                origin: CellOrigin::Pristine
            })
        );

        store.set(&can, key.clone(), 25.0);
        assert_eq!(store.get(&can, &key).unwrap().origin, CellOrigin::Overridden);
        assert!(!store.seed(&can, key.clone(), 10.0));
        assert_eq!(store.get(&can, &key).unwrap().value, 25.0);
    }

    #[test]
    fn test_derive_keeps_base() {
        let mut store = TariffStore::new();
        let can = CountryCode::new("CAN");
        let key = HierarchyKey::Section("S1".into());

        // Nothing to inherit from a derived cell with no earlier value
        store.derive(&can, key.clone(), 12.0);
        assert_eq!(store.inherited(&can, &key), None);

        let key = HierarchyKey::Section("S2".into());
        store.seed(&can, key.clone(), 10.0);
        store.derive(&can, key.clone(), 16.0);
        store.derive(&can, key.clone(), 18.0);
        assert_eq!(store.get(&can, &key).unwrap().origin, CellOrigin::Derived);
        assert_eq!(store.get(&can, &key).unwrap().value, 18.0);
        assert_eq!(store.inherited(&can, &key), Some(10.0));

        // An edit replaces the base
        store.set(&can, key.clone(), 5.0);
        assert_eq!(store.inherited(&can, &key), Some(5.0));
        store.derive(&can, key.clone(), 7.0);
        assert_eq!(store.inherited(&can, &key), Some(5.0));
    }

    #[test]
    fn test_capture_keeps_modified() {
        let mut store = OriginalStore::new();
        let can = CountryCode::new("CAN");
        store.set_modified(&can, "S1".into(), 3.0);
        assert!(!store.is_captured(&can));

        store.capture(&can, [("S1".into(), 10.0), ("S2".into(), 5.0)]);
        assert!(store.is_captured(&can));
        assert_eq!(
            store.get(&can, &"S1".into()).unwrap().origin,
            BaselineOrigin::Modified
        );
        assert_eq!(
            store.get(&can, &"S2".into()),
            Some(&Baseline {
                value: 5.0,
                origin: BaselineOrigin::Source
            })
        );
    }

    #[test]
    fn test_origin_display() {
        assert_eq!(CellOrigin::Overridden.to_string(), "overridden");
        assert_eq!(CellOrigin::Derived.to_string(), "derived");
        assert_eq!(BaselineOrigin::Source.to_string(), "source");
    }
}
