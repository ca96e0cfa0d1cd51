//! The module responsible for writing output data to disk.
use crate::hierarchy::HsHierarchy;
use crate::hierarchy::weights::WeightCache;
use crate::id::{ChapterID, CountryCode, Hs4Code, SectionID};
use crate::nipa::{ItemCode, Layer, LayerAggregations, LayerSummary};
use anyhow::{Context, Result, ensure};
use serde::Serialize;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

/// The root folder in which scenario-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "tariff_engine_results";

/// The output file name for layer summaries
const LAYER_SUMMARY_FILE_NAME: &str = "layer_summary.csv";

/// The output file name for layer items
const LAYER_ITEMS_FILE_NAME: &str = "layer_items.csv";

/// The output file name for HS4 weights
const HS4_WEIGHTS_FILE_NAME: &str = "hs4_weights.csv";

/// Get the default output directory for the scenario at `data_dir`
pub fn get_output_dir(data_dir: &Path) -> Result<PathBuf> {
    let data_dir = data_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to scenario")?;

    let scenario_name = data_dir
        .file_name()
        .context("Scenario cannot be in root folder")?
        .to_str()
        .context("Invalid chars in scenario dir name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, scenario_name].iter().collect())
}

/// Create a new output directory.
///
/// An existing, non-empty directory is only replaced if `allow_overwrite` is set.
///
/// # Returns
///
/// Whether an existing directory was overwritten
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if output_dir.is_dir() {
        if output_dir.read_dir()?.next().is_none() {
            // Already exists and is empty
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Use --overwrite to replace it."
        );
        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Represents a row in the layer summary CSV file
#[derive(Serialize, Debug, PartialEq)]
struct LayerSummaryRow<'a> {
    country: &'a CountryCode,
    layer: Layer,
    original_sum: f64,
    adjustment: f64,
    total_sum: f64,
    vector_sum: f64,
    percent_of_total: &'a str,
}

/// Represents a row in the layer items CSV file
#[derive(Serialize, Debug, PartialEq)]
struct LayerItemRow<'a> {
    country: &'a CountryCode,
    layer: Layer,
    code: &'a ItemCode,
    name: &'a str,
    sum: f64,
}

/// Represents a row in the HS4 weights CSV file
#[derive(Serialize, Debug, PartialEq)]
struct Hs4WeightRow<'a> {
    country: &'a CountryCode,
    section: &'a SectionID,
    chapter: &'a ChapterID,
    hs4: &'a Hs4Code,
    relative_weight: f64,
    total_weight: f64,
}

/// An object for writing layer aggregations to file
pub struct LayerWriter {
    summary_writer: csv::Writer<File>,
    items_writer: csv::Writer<File>,
}

impl LayerWriter {
    /// Open CSV files to write layer data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    pub fn create(output_path: &Path) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(file_path)
        };

        Ok(Self {
            summary_writer: new_writer(LAYER_SUMMARY_FILE_NAME)?,
            items_writer: new_writer(LAYER_ITEMS_FILE_NAME)?,
        })
    }

    /// Write one country's layer summaries and items
    pub fn write(
        &mut self,
        country: &CountryCode,
        aggregations: &LayerAggregations,
        summaries: &std::collections::BTreeMap<Layer, LayerSummary>,
    ) -> Result<()> {
        for (layer, summary) in summaries {
            self.summary_writer.serialize(LayerSummaryRow {
                country,
                layer: *layer,
                original_sum: summary.original_sum,
                adjustment: summary.adjustment,
                total_sum: summary.total_sum,
                vector_sum: summary.vector_sum,
                percent_of_total: &summary.percent_of_total,
            })?;
        }

        for (layer, aggregation) in aggregations {
            for item in &aggregation.items {
                self.items_writer.serialize(LayerItemRow {
                    country,
                    layer: *layer,
                    code: &item.code,
                    name: &item.name,
                    sum: item.sum,
                })?;
            }
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.summary_writer.flush()?;
        self.items_writer.flush()?;

        Ok(())
    }
}

/// Write the cached HS4 weights for `country` to file, in hierarchy order.
///
/// Chapters missing from `cache` are skipped.
pub fn write_hs4_weights(
    output_path: &Path,
    country: &CountryCode,
    hierarchy: &HsHierarchy,
    cache: &WeightCache,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path.join(HS4_WEIGHTS_FILE_NAME))?;
    for (section_id, section) in hierarchy {
        for chapter_id in section.chapters.keys() {
            let Some(weights) = cache.get(country, section_id, chapter_id) else {
                continue;
            };
            for (hs4, relative_weight) in &weights.hs4_relative_weights {
                writer.serialize(Hs4WeightRow {
                    country,
                    section: section_id,
                    chapter: chapter_id,
                    hs4,
                    relative_weight: *relative_weight,
                    total_weight: weights.total_weight,
                })?;
            }
        }
    }
    writer.flush()?;

    Ok(())
}
