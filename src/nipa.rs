//! Aggregation of classification vectors into NIPA layers.
//!
//! A NIPA mapping assigns each classification code to a layer, a display name and the vector
//! positions it aggregates. Each layer is aggregated independently. Within a layer, a vector
//! position is claimed by the first code (in mapping order) that lists it; later claims on the
//! same position are skipped.
//!
//! Layers can optionally be reconciled to the grand total of the input vector. The difference
//! between the input total and what the layer's codes claimed is reported as a synthetic
//! "Adjustment" item and folded into the layer's reconstructed vector.
use crate::data_source::{DataSource, fetch_json};
use crate::id::ClassificationCode;
use crate::vector::{ClassificationVector, vector_sum};
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::rc::Rc;

/// A NIPA layer number
pub type Layer = u32;

/// The layers which are reconciled to the input total by default
pub const DEFAULT_ADJUSTMENT_LAYERS: [Layer; 5] = [0, 1, 2, 3, 4];

/// The display name given to the synthetic reconciliation item
pub const ADJUSTMENT_NAME: &str = "Adjustment";

/// The layer, name and vector positions for a single classification code
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NipaEntry {
    /// Display name
    pub name: String,
    /// Which layer the code belongs to
    pub layer: Layer,
    /// The vector positions this code aggregates
    #[serde(default)]
    pub indices: Vec<usize>,
}

/// Classification code to NIPA layer mapping, in source order
pub type NipaMapping = IndexMap<ClassificationCode, NipaEntry>;

/// Options controlling layer aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationOptions {
    /// Whether to reconcile layers to the input total
    pub add_adjustment: bool,
    /// Which layers to reconcile
    pub adjustment_layers: Vec<Layer>,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            add_adjustment: true,
            adjustment_layers: DEFAULT_ADJUSTMENT_LAYERS.to_vec(),
        }
    }
}

impl AggregationOptions {
    /// No reconciliation on any layer
    pub fn without_adjustment() -> Self {
        Self {
            add_adjustment: false,
            adjustment_layers: Vec::new(),
        }
    }

    /// Whether `layer` should be reconciled to the input total
    pub fn adjusts(&self, layer: Layer) -> bool {
        self.add_adjustment && self.adjustment_layers.contains(&layer)
    }
}

/// Identifies an aggregated item: either a real classification code or the adjustment
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ItemCode {
    /// A code from the mapping
    #[display("{_0}")]
    Code(ClassificationCode),
    /// The synthetic reconciliation item
    #[display("-1")]
    Adjustment,
}

impl Serialize for ItemCode {
    fn serialize<S>(&self, serialiser: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialiser.collect_str(self)
    }
}

/// A single named item within a layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerItem {
    /// The code this item aggregates
    pub code: ItemCode,
    /// Display name
    pub name: String,
    /// Sum of the input values at `indices`
    pub sum: f64,
    /// The vector positions this item claimed
    pub indices: Vec<usize>,
}

impl LayerItem {
    /// The synthetic item carrying a layer's reconciliation residual
    pub fn adjustment(sum: f64) -> Self {
        Self {
            code: ItemCode::Adjustment,
            name: ADJUSTMENT_NAME.to_string(),
            sum,
            indices: Vec::new(),
        }
    }

    /// Whether this is the synthetic reconciliation item
    pub fn is_adjustment(&self) -> bool {
        self.code == ItemCode::Adjustment
    }
}

/// The result of aggregating one layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerAggregation {
    /// The items in the layer, in mapping order, with any adjustment last
    pub items: Vec<LayerItem>,
    /// Sum over all items, including any adjustment
    pub sum: f64,
    /// A vector the same length as the input containing only this layer's claimed values (plus
    /// any adjustment)
    pub vector: ClassificationVector,
}

/// Aggregations for every layer in a mapping
pub type LayerAggregations = BTreeMap<Layer, LayerAggregation>;

/// Reconciliation figures for a single layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    /// Sum of the layer's items, excluding the adjustment
    pub original_sum: f64,
    /// The adjustment item's value (zero if none)
    pub adjustment: f64,
    /// The layer's reported sum
    pub total_sum: f64,
    /// Sum of the layer's reconstructed vector
    pub vector_sum: f64,
    /// `total_sum` as a percentage of the input total, formatted to two decimal places
    pub percent_of_total: String,
}

/// The outputs handed to renderers
#[derive(Debug, Clone, PartialEq)]
pub struct FullAggregation {
    /// Items and sums per layer
    pub layer_aggregations: LayerAggregations,
    /// Just the reconstructed vector for each layer
    pub layer_vectors: BTreeMap<Layer, ClassificationVector>,
}

/// Group the mapping's codes by layer, preserving mapping order within each layer
pub fn group_codes_by_layer(mapping: &NipaMapping) -> BTreeMap<Layer, Vec<ClassificationCode>> {
    let mut layers: BTreeMap<Layer, Vec<ClassificationCode>> = BTreeMap::new();
    for (code, entry) in mapping {
        layers.entry(entry.layer).or_default().push(code.clone());
    }

    layers
}

/// Add a reconciliation residual to a layer vector.
///
/// The residual goes to the first non-zero position, or position 0 if every value is zero. An
/// empty vector is left untouched.
pub fn place_residual(vector: &mut [f64], residual: f64) {
    let position = vector.iter().position(|value| *value != 0.0).unwrap_or(0);
    if let Some(value) = vector.get_mut(position) {
        *value += residual;
    }
}

/// Walk the codes of one layer, letting each claim its vector positions.
///
/// Positions already claimed by an earlier code, or beyond the end of `vector`, are skipped.
fn claim_layer(
    vector: &[f64],
    mapping: &NipaMapping,
    codes: &[ClassificationCode],
) -> (Vec<LayerItem>, ClassificationVector) {
    let mut claimed = vec![false; vector.len()];
    let mut layer_vector = vec![0.0; vector.len()];
    let mut items = Vec::with_capacity(codes.len());

    for code in codes {
        let Some(entry) = mapping.get(code) else {
            continue;
        };

        let mut indices = Vec::with_capacity(entry.indices.len());
        let mut sum = 0.0;
        for &index in &entry.indices {
            let Some(&value) = vector.get(index) else {
                continue;
            };
            if claimed[index] {
                debug!("Position {index} already claimed in layer; skipping for code {code}");
                continue;
            }

            claimed[index] = true;
            layer_vector[index] = value;
            indices.push(index);
            sum += value;
        }

        items.push(LayerItem {
            code: ItemCode::Code(code.clone()),
            name: entry.name.clone(),
            sum,
            indices,
        });
    }

    (items, layer_vector)
}

/// The codes belonging to `layer`, in mapping order
fn layer_codes(mapping: &NipaMapping, layer: Layer) -> Vec<ClassificationCode> {
    mapping
        .iter()
        .filter(|(_, entry)| entry.layer == layer)
        .map(|(code, _)| code.clone())
        .collect()
}

/// Reconstruct the vector for a single layer.
///
/// The output holds the input value at every position claimed by one of the layer's codes and
/// zero elsewhere. If `options` reconciles this layer, the difference between the input total and
/// the claimed total is added using [`place_residual`].
pub fn build_layer_vector(
    vector: &[f64],
    mapping: &NipaMapping,
    layer: Layer,
    options: &AggregationOptions,
) -> ClassificationVector {
    let (_, mut layer_vector) = claim_layer(vector, mapping, &layer_codes(mapping, layer));
    if options.adjusts(layer) {
        let residual = vector_sum(vector) - vector_sum(&layer_vector);
        place_residual(&mut layer_vector, residual);
    }

    layer_vector
}

/// Aggregate `vector` into every layer of `mapping`
pub fn aggregate(
    vector: &[f64],
    mapping: &NipaMapping,
    options: &AggregationOptions,
) -> LayerAggregations {
    let total = vector_sum(vector);

    group_codes_by_layer(mapping)
        .into_iter()
        .map(|(layer, codes)| {
            let (mut items, mut layer_vector) = claim_layer(vector, mapping, &codes);
            let layer_sum: f64 = items.iter().map(|item| item.sum).sum();

            let mut sum = layer_sum;
            if options.adjusts(layer) {
                let adjustment = total - layer_sum;
                place_residual(&mut layer_vector, adjustment);
                items.push(LayerItem::adjustment(adjustment));
                sum = layer_sum + adjustment;
            }

            let aggregation = LayerAggregation {
                items,
                sum,
                vector: layer_vector,
            };
            (layer, aggregation)
        })
        .collect()
}

/// Format `value` as a percentage of `total` to two decimal places.
///
/// A zero total has no meaningful percentage, so "n/a" is returned.
pub fn format_percent_of_total(value: f64, total: f64) -> String {
    if total == 0.0 {
        warn!("Input total is zero; percentage of total is not available");
        return "n/a".to_string();
    }

    format!("{:.2}%", value / total * 100.0)
}

/// Summarise how each layer reconciles to `total_input_sum`
pub fn summarize(
    layer_aggregations: &LayerAggregations,
    total_input_sum: f64,
) -> BTreeMap<Layer, LayerSummary> {
    layer_aggregations
        .iter()
        .map(|(layer, aggregation)| {
            let (adjustments, items): (Vec<_>, Vec<_>) = aggregation
                .items
                .iter()
                .partition(|item| item.is_adjustment());

            let summary = LayerSummary {
                original_sum: items.iter().map(|item| item.sum).sum(),
                adjustment: adjustments.iter().map(|item| item.sum).sum(),
                total_sum: aggregation.sum,
                vector_sum: vector_sum(&aggregation.vector),
                percent_of_total: format_percent_of_total(aggregation.sum, total_input_sum),
            };
            (*layer, summary)
        })
        .collect()
}

/// Check that every index in the mapping falls inside a vector of length `vector_len`
pub fn check_mapping_indices(mapping: &NipaMapping, vector_len: usize) -> Result<()> {
    for (code, entry) in mapping {
        for &index in &entry.indices {
            ensure!(
                index < vector_len,
                "Index {index} for code {code} is out of range for vectors of length {vector_len}"
            );
        }
    }

    Ok(())
}

/// Loads the NIPA mapping once and aggregates vectors against it.
///
/// The mapping is static reference data: once loaded it is kept for the aggregator's lifetime.
pub struct NipaAggregator {
    source: Rc<dyn DataSource>,
    key: String,
    mapping: Option<Rc<NipaMapping>>,
}

impl NipaAggregator {
    /// Create an aggregator which fetches the mapping stored under `key`
    pub fn new(source: Rc<dyn DataSource>, key: &str) -> Self {
        Self {
            source,
            key: key.to_string(),
            mapping: None,
        }
    }

    /// Get the mapping, fetching it on first use
    pub fn load_mapping(&mut self) -> Result<Rc<NipaMapping>> {
        if let Some(mapping) = &self.mapping {
            return Ok(Rc::clone(mapping));
        }

        let mapping: Rc<NipaMapping> = Rc::new(fetch_json(self.source.as_ref(), &self.key)?);
        debug!("Loaded NIPA mapping with {} codes", mapping.len());
        self.mapping = Some(Rc::clone(&mapping));
        Ok(mapping)
    }

    /// Load the mapping and aggregate `vector` against it.
    ///
    /// Returns `None` (and logs the reason) if the mapping cannot be loaded.
    pub fn aggregate_full(
        &mut self,
        vector: &[f64],
        options: &AggregationOptions,
    ) -> Option<FullAggregation> {
        let mapping = match self.load_mapping() {
            Ok(mapping) => mapping,
            Err(err) => {
                error!("Failed to load NIPA mapping: {err:#}");
                return None;
            }
        };

        let layer_aggregations = aggregate(vector, &mapping, options);
        let layer_vectors = layer_aggregations
            .iter()
            .map(|(layer, aggregation)| (*layer, aggregation.vector.clone()))
            .collect();

        Some(FullAggregation {
            layer_aggregations,
            layer_vectors,
        })
    }
}
