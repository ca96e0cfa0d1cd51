//! Trade weighting: scaling tariff vectors by each country's import composition.
use crate::id::{ClassificationCode, CountryCode};
use crate::import_weights::ImportWeightProvider;
use crate::vector::{ClassificationVector, check_conformable};
use anyhow::{Context, Result};
use log::{error, warn};
use serde::{Deserialize, Serialize};

/// Tariff vectors for a list of countries, index-aligned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TariffBatch {
    /// The countries, in the same order as `vectors`
    pub countries: Vec<CountryCode>,
    /// One tariff vector per country
    pub vectors: Vec<ClassificationVector>,
    /// Whether import weights have already been applied to `vectors`
    #[serde(default, rename = "importWeighted")]
    pub import_weighted: bool,
}

/// Multiply a tariff vector by an import-weight vector element-wise
pub fn apply_weights(tariffs: &[f64], weights: &[f64]) -> Result<ClassificationVector> {
    check_conformable(tariffs, weights)?;

    Ok(tariffs
        .iter()
        .zip(weights)
        .map(|(tariff, weight)| tariff * weight)
        .collect())
}

/// Applies import weights to tariff vectors
pub struct TradeWeighter {
    provider: ImportWeightProvider,
}

impl TradeWeighter {
    /// Create a weighter drawing import shares from `provider`
    pub fn new(provider: ImportWeightProvider) -> Self {
        Self { provider }
    }

    /// The underlying import-weight provider
    pub fn provider_mut(&mut self) -> &mut ImportWeightProvider {
        &mut self.provider
    }

    /// Weight a single country's tariff vector by its import shares.
    ///
    /// If the tariff vector and import-weight vector differ in length, the problem is logged and
    /// the tariff vector is returned unweighted.
    pub fn weight_vector(
        &mut self,
        country: &CountryCode,
        tariffs: &[f64],
        order: &[ClassificationCode],
    ) -> ClassificationVector {
        let weights = self.provider.ordered_vector(country, order);
        match apply_weights(tariffs, &weights)
            .with_context(|| format!("Cannot apply import weights for {country}"))
        {
            Ok(weighted) => weighted,
            Err(err) => {
                error!("{err:#}");
                tariffs.to_vec()
            }
        }
    }

    /// Weight every vector in a batch, preserving country order.
    ///
    /// The returned batch is flagged as import-weighted. A batch which is already flagged, or whose
    /// country and vector lists differ in length, is returned unchanged.
    pub fn weight_batch(
        &mut self,
        batch: TariffBatch,
        order: &[ClassificationCode],
    ) -> TariffBatch {
        if batch.import_weighted {
            warn!("Tariff vectors have already been import-weighted; not weighting again");
            return batch;
        }

        if batch.countries.len() != batch.vectors.len() {
            error!(
                "Tariff batch has {} countries but {} vectors; not weighting",
                batch.countries.len(),
                batch.vectors.len()
            );
            return batch;
        }

        let vectors = batch
            .countries
            .iter()
            .zip(&batch.vectors)
            .map(|(country, vector)| self.weight_vector(country, vector, order))
            .collect();

        TariffBatch {
            countries: batch.countries,
            vectors,
            import_weighted: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::MemoryDataSource;
    use crate::fixture::{classification_order, import_weight_json};
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};
    use std::rc::Rc;

    #[fixture]
    fn weighter(import_weight_json: &str) -> TradeWeighter {
        let source: MemoryDataSource = [("weights.json", import_weight_json)]
            .into_iter()
            .collect();
        TradeWeighter::new(ImportWeightProvider::new(
            Rc::new(source),
            "weights.json",
        ))
    }

    #[rstest]
    fn test_weight_vector(
        mut weighter: TradeWeighter,
        classification_order: Vec<ClassificationCode>,
    ) {
        let weighted =
            weighter.weight_vector(&"CAN".into(), &[10.0, 10.0, 10.0, 10.0], &classification_order);
        let expected = [5.0, 3.0, 0.0, 2.0];
        for (actual, expected) in weighted.iter().zip(expected) {
            assert_approx_eq!(f64, *actual, expected);
        }
    }

    #[rstest]
    fn test_weight_vector_unknown_country(
        mut weighter: TradeWeighter,
        classification_order: Vec<ClassificationCode>,
    ) {
        let weighted =
            weighter.weight_vector(&"ZZZ".into(), &[4.0, 8.0, 12.0, 16.0], &classification_order);
        let expected = [1.0, 2.0, 3.0, 4.0];
        for (actual, expected) in weighted.iter().zip(expected) {
            assert_approx_eq!(f64, *actual, expected);
        }
    }

    #[rstest]
    fn test_weight_vector_not_conformable(
        mut weighter: TradeWeighter,
        classification_order: Vec<ClassificationCode>,
    ) {
        let tariffs = [1.0, 2.0, 3.0];
        let weighted = weighter.weight_vector(&"CAN".into(), &tariffs, &classification_order);
        assert_eq!(weighted, tariffs);
    }

    #[rstest]
    fn test_weight_batch(
        mut weighter: TradeWeighter,
        classification_order: Vec<ClassificationCode>,
    ) {
        let batch = TariffBatch {
            countries: vec!["ZZZ".into(), "CAN".into()],
            vectors: vec![vec![4.0; 4], vec![10.0; 4]],
            import_weighted: false,
        };

        let weighted = weighter.weight_batch(batch, &classification_order);
        assert!(weighted.import_weighted);
        assert_eq!(
            weighted.countries,
            [CountryCode::new("ZZZ"), CountryCode::new("CAN")]
        );
        assert_eq!(weighted.vectors.len(), 2);
        assert_approx_eq!(f64, weighted.vectors[0][0], 1.0);
        assert_approx_eq!(f64, weighted.vectors[1][0], 5.0);
    }

    #[rstest]
    fn test_weight_batch_already_weighted(
        mut weighter: TradeWeighter,
        classification_order: Vec<ClassificationCode>,
    ) {
        let batch = TariffBatch {
            countries: vec!["CAN".into()],
            vectors: vec![vec![10.0; 4]],
            import_weighted: true,
        };
        assert_eq!(
            weighter.weight_batch(batch.clone(), &classification_order),
            batch
        );
    }

    #[rstest]
    fn test_weight_batch_misaligned(
        mut weighter: TradeWeighter,
        classification_order: Vec<ClassificationCode>,
    ) {
        let batch = TariffBatch {
            countries: vec!["CAN".into(), "MEX".into()],
            vectors: vec![vec![10.0; 4]],
            import_weighted: false,
        };
        assert_eq!(
            weighter.weight_batch(batch.clone(), &classification_order),
            batch
        );
    }

    #[test]
    fn test_apply_weights() {
        assert_eq!(apply_weights(&[2.0, 3.0], &[0.5, 0.0]).unwrap(), [1.0, 0.0]);
        assert!(apply_weights(&[2.0, 3.0], &[0.5]).is_err());
    }
}
