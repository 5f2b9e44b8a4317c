//! Experiment definitions and the variant selection walk.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ExperimentError, ExperimentResult};

/// Allowed distance of a weight vector's sum from 1.
pub const WEIGHT_TOLERANCE: f64 = 0.01;

/// An A/B/n experiment: a unique name and an ordered, non-empty set of
/// unique variant labels with optional selection weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExperimentDef")]
pub struct Experiment {
    name: String,
    variants: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    weights: Option<Vec<f64>>,
}

#[derive(Deserialize)]
struct ExperimentDef {
    name: String,
    variants: Vec<String>,
    #[serde(default)]
    weights: Option<Vec<f64>>,
}

impl TryFrom<ExperimentDef> for Experiment {
    type Error = ExperimentError;

    fn try_from(def: ExperimentDef) -> Result<Self, Self::Error> {
        Experiment::new(def.name, def.variants, def.weights)
    }
}

impl Experiment {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        variants: impl IntoIterator<Item = S>,
        weights: Option<Vec<f64>>,
    ) -> ExperimentResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ExperimentError::EmptyName);
        }
        let variants: Vec<String> = variants.into_iter().map(Into::into).collect();
        if variants.is_empty() {
            return Err(ExperimentError::NoVariants(name));
        }
        let mut seen = HashSet::new();
        for variant in &variants {
            if !seen.insert(variant.as_str()) {
                return Err(ExperimentError::DuplicateVariant {
                    experiment: name.clone(),
                    variant: variant.clone(),
                });
            }
        }
        Ok(Self {
            name,
            variants,
            weights,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn has_variant(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }

    /// The configured weights if they form a usable distribution. Malformed
    /// weights fall back to uniform selection.
    pub fn effective_weights(&self) -> Option<&[f64]> {
        let weights = self.weights.as_deref()?;
        if weights.len() != self.variants.len() {
            warn!(
                experiment = %self.name,
                weights = weights.len(),
                variants = self.variants.len(),
                "weight count does not match variants, using uniform selection"
            );
            return None;
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            warn!(experiment = %self.name, "invalid weight value, using uniform selection");
            return None;
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            warn!(experiment = %self.name, sum, "weights do not sum to 1, using uniform selection");
            return None;
        }
        Some(weights)
    }
}

/// Pick a variant for the uniform draw `r` in `[0, 1)`.
///
/// Weighted experiments return the first variant whose cumulative weight
/// reaches `r`, falling back to the first variant when rounding leaves none.
/// Unweighted experiments map `r` onto a uniformly chosen index.
pub fn select_variant(experiment: &Experiment, r: f64) -> &str {
    let variants = experiment.variants();

    if let Some(weights) = experiment.effective_weights() {
        let mut cumulative = 0.0;
        for (variant, weight) in variants.iter().zip(weights) {
            cumulative += weight;
            if r <= cumulative {
                return variant;
            }
        }
        return &variants[0];
    }

    let index = ((r * variants.len() as f64).floor() as usize).min(variants.len() - 1);
    &variants[index]
}
