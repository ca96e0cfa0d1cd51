//! Classification vectors: one value per detailed commodity code, in a fixed caller-defined order.
use crate::id::ClassificationCode;
use anyhow::{Result, ensure};

/// A vector of values indexed by position in a [`ClassificationOrder`]
pub type ClassificationVector = Vec<f64>;

/// The fixed order of classification codes that gives each vector position its meaning
pub type ClassificationOrder = Vec<ClassificationCode>;

/// The neutral prior used when a country has no import composition data.
///
/// Every position gets `1 / len`. An empty order gives an empty vector.
pub fn equal_weights(len: usize) -> ClassificationVector {
    if len == 0 {
        return ClassificationVector::new();
    }

    vec![1.0 / len as f64; len]
}

/// Check that two vectors have the same length
pub fn check_conformable(lhs: &[f64], rhs: &[f64]) -> Result<()> {
    ensure!(
        lhs.len() == rhs.len(),
        "Vector lengths do not match ({} vs {})",
        lhs.len(),
        rhs.len()
    );

    Ok(())
}

/// Sum of all values in a vector
pub fn vector_sum(vector: &[f64]) -> f64 {
    vector.iter().sum()
}
