//! A scenario is a directory of reference data plus a `scenario.toml` describing it.
use crate::data_source::{DataSource, DirectoryDataSource, fetch_json};
use crate::hierarchy::HsHierarchy;
use crate::hierarchy::weights::SectionWeightTable;
use crate::import_weights::{ImportWeightProvider, ImportWeightTable};
use crate::input::{input_err_msg, is_unique, read_toml};
use crate::nipa::{
    AggregationOptions, DEFAULT_ADJUSTMENT_LAYERS, Layer, NipaAggregator, NipaMapping,
    check_mapping_indices,
};
use crate::tariff::{BilateralTariffs, ClassificationResolver, SectionNameMap, TariffAccessor};
use crate::vector::ClassificationOrder;
use crate::weighting::{TariffBatch, TradeWeighter};
use anyhow::{Context, Result, ensure};
use log::warn;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::rc::Rc;

const SCENARIO_FILE_NAME: &str = "scenario.toml";

macro_rules! define_file_name_default {
    ($name:ident, $value: expr) => {
        fn $name() -> String {
            $value.to_string()
        }
    };
}

define_file_name_default!(default_import_weights, "import_weights.json");
define_file_name_default!(default_nipa_mapping, "nipa_layers.json");
define_file_name_default!(default_bilateral_tariffs, "bilateral_tariffs.json");
define_file_name_default!(default_hierarchy, "section_to_hs4_mapping.json");
define_file_name_default!(default_section_weights, "section_weights.json");
define_file_name_default!(default_section_names, "section_names.json");
define_file_name_default!(default_classification_order, "classification_order.json");
define_file_name_default!(default_tariff_vectors, "tariff_vectors.json");

fn default_adjustment_layers() -> Vec<Layer> {
    DEFAULT_ADJUSTMENT_LAYERS.to_vec()
}

fn default_add_adjustment() -> bool {
    true
}

/// Read a year given either as a number or a string
fn deserialise_year<'de, D>(deserialiser: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Year {
        Number(u32),
        Text(String),
    }

    Ok(match Year::deserialize(deserialiser)? {
        Year::Number(year) => year.to_string(),
        Year::Text(year) => year,
    })
}

/// The names of the data files within a scenario directory
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DataFiles {
    /// Import-share table
    #[serde(default = "default_import_weights")]
    pub import_weights: String,
    /// Classification code to NIPA layer mapping
    #[serde(default = "default_nipa_mapping")]
    pub nipa_mapping: String,
    /// Source bilateral tariffs
    #[serde(default = "default_bilateral_tariffs")]
    pub bilateral_tariffs: String,
    /// Section → chapter → HS4 tree
    #[serde(default = "default_hierarchy")]
    pub hierarchy: String,
    /// Per-country section weight table
    #[serde(default = "default_section_weights")]
    pub section_weights: String,
    /// Section display names
    #[serde(default = "default_section_names")]
    pub section_names: String,
    /// The classification order giving vector positions their meaning
    #[serde(default = "default_classification_order")]
    pub classification_order: String,
    /// Tariff vectors to aggregate
    #[serde(default = "default_tariff_vectors")]
    pub tariff_vectors: String,
}

impl Default for DataFiles {
    fn default() -> Self {
        Self {
            import_weights: default_import_weights(),
            nipa_mapping: default_nipa_mapping(),
            bilateral_tariffs: default_bilateral_tariffs(),
            hierarchy: default_hierarchy(),
            section_weights: default_section_weights(),
            section_names: default_section_names(),
            classification_order: default_classification_order(),
            tariff_vectors: default_tariff_vectors(),
        }
    }
}

/// Represents the contents of `scenario.toml`
#[derive(Debug, Deserialize, PartialEq)]
pub struct ScenarioParameters {
    /// The year of bilateral tariff data to use
    #[serde(deserialize_with = "deserialise_year")]
    pub year: String,
    /// Whether to reconcile NIPA layers to the input total
    #[serde(default = "default_add_adjustment")]
    pub add_adjustment: bool,
    /// Which NIPA layers to reconcile
    #[serde(default = "default_adjustment_layers")]
    pub adjustment_layers: Vec<Layer>,
    /// Data file names
    #[serde(default)]
    pub data_files: DataFiles,
}

impl ScenarioParameters {
    /// Read `scenario.toml` from the specified directory
    pub fn from_path<P: AsRef<Path>>(data_dir: P) -> Result<ScenarioParameters> {
        let file_path = data_dir.as_ref().join(SCENARIO_FILE_NAME);
        let parameters: ScenarioParameters = read_toml(&file_path)?;

        parameters
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(parameters)
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        ensure!(!self.year.trim().is_empty(), "`year` cannot be empty");
        ensure!(
            is_unique(&self.adjustment_layers),
            "`adjustment_layers` must not contain duplicates"
        );

        Ok(())
    }

    /// The aggregation options described by these parameters
    pub fn aggregation_options(&self) -> AggregationOptions {
        AggregationOptions {
            add_adjustment: self.add_adjustment,
            adjustment_layers: self.adjustment_layers.clone(),
        }
    }
}

/// A scenario directory and the engine components reading from it
#[derive(Debug)]
pub struct Scenario {
    /// The directory containing the scenario's data files
    pub data_dir: PathBuf,
    /// The contents of `scenario.toml`
    pub parameters: ScenarioParameters,
    source: Rc<DirectoryDataSource>,
}

impl Scenario {
    /// Read the scenario in `data_dir`
    pub fn from_path<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let parameters = ScenarioParameters::from_path(&data_dir)?;
        let source = Rc::new(DirectoryDataSource::new(&data_dir));

        Ok(Self {
            data_dir,
            parameters,
            source,
        })
    }

    fn files(&self) -> &DataFiles {
        &self.parameters.data_files
    }

    fn fetch<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        fetch_json(self.source.as_ref(), key)
    }

    /// The scenario's data source
    pub fn source(&self) -> Rc<dyn DataSource> {
        Rc::clone(&self.source) as Rc<dyn DataSource>
    }

    /// The classification order
    pub fn classification_order(&self) -> Result<ClassificationOrder> {
        self.fetch(&self.files().classification_order)
    }

    /// The tariff vectors to aggregate
    pub fn tariff_batch(&self) -> Result<TariffBatch> {
        self.fetch(&self.files().tariff_vectors)
    }

    /// The classification hierarchy
    pub fn hierarchy(&self) -> Result<HsHierarchy> {
        self.fetch(&self.files().hierarchy)
    }

    /// The section weight table
    pub fn section_weights(&self) -> Result<SectionWeightTable> {
        self.fetch(&self.files().section_weights)
    }

    /// The section display names
    pub fn section_names(&self) -> Result<SectionNameMap> {
        self.fetch(&self.files().section_names)
    }

    /// A trade weighter using the scenario's import weights
    pub fn trade_weighter(&self) -> TradeWeighter {
        TradeWeighter::new(ImportWeightProvider::new(
            self.source(),
            &self.files().import_weights,
        ))
    }

    /// A NIPA aggregator using the scenario's mapping
    pub fn nipa_aggregator(&self) -> NipaAggregator {
        NipaAggregator::new(self.source(), &self.files().nipa_mapping)
    }

    /// A tariff accessor over the scenario's bilateral data
    pub fn tariff_accessor(&self) -> Result<TariffAccessor> {
        let bilateral: BilateralTariffs = self.fetch(&self.files().bilateral_tariffs)?;
        let names = self.section_names()?;

        Ok(TariffAccessor::new(
            Rc::new(bilateral),
            Rc::new(names),
            &self.parameters.year,
        ))
    }

    /// Check that every data file can be read and that the files are consistent with each other
    pub fn validate(&self) -> Result<()> {
        let order = self.classification_order()?;
        ensure!(!order.is_empty(), "Classification order is empty");
        ensure!(is_unique(&order), "Classification order contains duplicate codes");

        let batch = self.tariff_batch()?;
        ensure!(
            batch.countries.len() == batch.vectors.len(),
            "Tariff vectors file has {} countries but {} vectors",
            batch.countries.len(),
            batch.vectors.len()
        );
        for (country, vector) in batch.countries.iter().zip(&batch.vectors) {
            ensure!(
                vector.len() == order.len(),
                "Tariff vector for {country} has length {} but classification order has {} codes",
                vector.len(),
                order.len()
            );
        }

        let mapping: NipaMapping = self.fetch(&self.files().nipa_mapping)?;
        check_mapping_indices(&mapping, order.len())
            .with_context(|| format!("Invalid NIPA mapping in {}", self.files().nipa_mapping))?;

        let import_weights: ImportWeightTable = self.fetch(&self.files().import_weights)?;
        import_weights.validate()?;

        let names = self.section_names()?;
        let hierarchy = self.hierarchy()?;
        for section in hierarchy.keys() {
            ensure!(
                names.section_name(section).is_some(),
                "Section {section} in {} has no name in {}",
                self.files().hierarchy,
                self.files().section_names
            );
        }

        self.section_weights()?;

        let bilateral: BilateralTariffs = self.fetch(&self.files().bilateral_tariffs)?;
        for (country, entry) in &bilateral {
            let Some(sectors) = entry.sector_data.get(&self.parameters.year) else {
                warn!("No bilateral tariff data for {country} in {}", self.parameters.year);
                continue;
            };
            for name in sectors.keys() {
                if names.section_for_name(name).is_none() {
                    warn!("Sector '{name}' for {country} does not match any section");
                }
            }
        }

        Ok(())
    }
}
