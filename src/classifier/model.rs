use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::error::{InferenceFailure, TrainingFailure};
use crate::features::FeatureVector;

/// Probabilistic binary classifier over encoded feature vectors.
pub trait Classifier: Send + Sync + fmt::Debug {
    /// Name of the classifier family (for audit/debugging).
    fn name(&self) -> &str;

    /// Returns `P(unsafe)` in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an `InferenceFailure` if the vector does not fit the model
    /// or the output is not a probability.
    fn predict_unsafe(&self, features: &FeatureVector) -> Result<f64, InferenceFailure>;

    /// Serializable parameters, if this classifier can be persisted.
    fn snapshot(&self) -> Option<ModelSnapshot> {
        None
    }
}

/// Serializable classifier parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelSnapshot {
    /// Parameters of a [`LogisticModel`].
    Logistic(LogisticModel),
}

impl ModelSnapshot {
    /// Rebuilds a classifier from its parameters.
    #[must_use]
    pub fn into_classifier(self) -> Arc<dyn Classifier> {
        match self {
            Self::Logistic(model) => Arc::new(model),
        }
    }

    /// Checks deserialized parameters against the expected input dimension.
    pub(crate) fn check(&self, dimension: usize) -> Result<(), String> {
        match self {
            Self::Logistic(model) => model.check(dimension),
        }
    }
}

/// Why a fit did not produce a model.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FitError {
    Failed(TrainingFailure),
    Cancelled,
}

/// Standardised L2-regularised logistic regression.
///
/// Inputs are standardised with the training means and deviations stored
/// in the model, so raw encoder output can be passed at inference time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    weights: Vec<f64>,
    bias: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl LogisticModel {
    /// Name reported by [`Classifier::name`].
    pub const NAME: &'static str = "logistic_regression";

    /// Builds a model from explicit parameters. Scales of zero are treated
    /// as one.
    ///
    /// # Panics
    ///
    /// Panics if the parameter vectors differ in length.
    #[must_use]
    pub fn from_parameters(weights: Vec<f64>, bias: f64, means: Vec<f64>, scales: Vec<f64>) -> Self {
        assert_eq!(weights.len(), means.len(), "weights/means length mismatch");
        assert_eq!(weights.len(), scales.len(), "weights/scales length mismatch");
        let scales = scales
            .into_iter()
            .map(|s| if s.abs() < f64::EPSILON { 1.0 } else { s })
            .collect();
        Self {
            weights,
            bias,
            means,
            scales,
        }
    }

    /// Number of input features.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.weights.len()
    }

    /// Parameters read back from storage skip [`LogisticModel::from_parameters`],
    /// so lengths and scales are checked here.
    fn check(&self, dimension: usize) -> Result<(), String> {
        for (name, len) in [
            ("weights", self.weights.len()),
            ("means", self.means.len()),
            ("scales", self.scales.len()),
        ] {
            if len != dimension {
                return Err(format!(
                    "model has {len} {name} but schema has {dimension} columns"
                ));
            }
        }
        if !self.bias.is_finite()
            || self.weights.iter().chain(&self.means).any(|v| !v.is_finite())
        {
            return Err("model parameters are not finite".to_string());
        }
        if let Some(scale) = self.scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(format!("model scale {scale} is not a positive number"));
        }
        Ok(())
    }

    /// Fits the model with full-batch gradient descent.
    ///
    /// Unsafe examples are weighted by `positive_class_weight` to
    /// counter the heavy class imbalance. `should_stop` is polled once per
    /// epoch.
    pub(crate) fn fit(
        rows: &[&FeatureVector],
        labels: &[bool],
        config: &TrainingConfig,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<Self, FitError> {
        let dim = rows.first().map_or(0, |r| r.len());
        if rows.is_empty() || dim == 0 {
            return Err(FitError::Failed(TrainingFailure::EmptyFeatureMatrix));
        }
        #[allow(clippy::cast_precision_loss)]
        let n = rows.len() as f64;

        let mut means = vec![0.0; dim];
        for row in rows {
            for (m, x) in means.iter_mut().zip(row.as_slice()) {
                *m += x / n;
            }
        }
        let mut scales = vec![0.0; dim];
        for row in rows {
            for ((s, x), m) in scales.iter_mut().zip(row.as_slice()).zip(&means) {
                *s += (x - m).powi(2) / n;
            }
        }
        let scales: Vec<f64> = scales
            .into_iter()
            .map(|v| if v.sqrt() < f64::EPSILON { 1.0 } else { v.sqrt() })
            .collect();

        let standardised: Vec<Vec<f64>> = rows
            .iter()
            .map(|row| standardise(row.as_slice(), &means, &scales))
            .collect();
        let sample_weights: Vec<f64> = labels
            .iter()
            .map(|&y| if y { config.positive_class_weight } else { 1.0 })
            .collect();
        let total_weight: f64 = sample_weights.iter().sum();

        let mut weights = vec![0.0; dim];
        let mut bias = 0.0;
        for epoch in 0..config.epochs {
            if should_stop() {
                return Err(FitError::Cancelled);
            }

            let mut grad_w = vec![0.0; dim];
            let mut grad_b = 0.0;
            let mut loss = 0.0;
            for ((x, &y), &sw) in standardised.iter().zip(labels).zip(&sample_weights) {
                let p = sigmoid(dot(&weights, x) + bias);
                let target = if y { 1.0 } else { 0.0 };
                let err = sw * (p - target);
                for (g, xi) in grad_w.iter_mut().zip(x) {
                    *g += err * xi;
                }
                grad_b += err;
                let p = p.clamp(1e-12, 1.0 - 1e-12);
                loss -= sw * (target * p.ln() + (1.0 - target) * (1.0 - p).ln());
            }

            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= config.learning_rate * (g / total_weight + config.l2 * *w);
            }
            bias -= config.learning_rate * grad_b / total_weight;

            if !loss.is_finite() || !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
                return Err(FitError::Failed(TrainingFailure::FitDiverged {
                    epoch,
                    reason: "non-finite loss or parameters".to_string(),
                }));
            }
        }

        Ok(Self {
            weights,
            bias,
            means,
            scales,
        })
    }
}

impl Classifier for LogisticModel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn predict_unsafe(&self, features: &FeatureVector) -> Result<f64, InferenceFailure> {
        if features.len() != self.weights.len() {
            return Err(InferenceFailure::DimensionMismatch {
                expected: self.weights.len(),
                actual: features.len(),
            });
        }
        let x = standardise(features.as_slice(), &self.means, &self.scales);
        let p = sigmoid(dot(&self.weights, &x) + self.bias);
        if p.is_finite() {
            Ok(p)
        } else {
            Err(InferenceFailure::NonFiniteOutput)
        }
    }

    fn snapshot(&self) -> Option<ModelSnapshot> {
        Some(ModelSnapshot::Logistic(self.clone()))
    }
}

fn standardise(x: &[f64], means: &[f64], scales: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(means)
        .zip(scales)
        .map(|((v, m), s)| (v - m) / s)
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn never() -> bool {
        false
    }

    fn toy_data() -> (Vec<FeatureVector>, Vec<bool>) {
        // Label is driven by the first feature; the second is noise.
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let unsafe_row = i % 4 == 0;
            let x0 = if unsafe_row { 1.0 } else { 0.0 };
            rows.push(FeatureVector::from(vec![x0, f64::from(i % 7)]));
            labels.push(unsafe_row);
        }
        (rows, labels)
    }

    #[test]
    fn learns_separable_signal() {
        let (rows, labels) = toy_data();
        let refs: Vec<&FeatureVector> = rows.iter().collect();
        let config = TrainingConfig {
            positive_class_weight: 3.0,
            ..TrainingConfig::default()
        };
        let model = LogisticModel::fit(&refs, &labels, &config, &never).unwrap();

        let unsafe_p = model
            .predict_unsafe(&FeatureVector::from(vec![1.0, 3.0]))
            .unwrap();
        let safe_p = model
            .predict_unsafe(&FeatureVector::from(vec![0.0, 3.0]))
            .unwrap();
        assert!(unsafe_p > 0.5, "unsafe_p = {unsafe_p}");
        assert!(safe_p < 0.5, "safe_p = {safe_p}");
    }

    #[test]
    fn dimension_mismatch_is_inference_failure() {
        let model = LogisticModel::from_parameters(vec![1.0, 2.0], 0.0, vec![0.0; 2], vec![1.0; 2]);
        let err = model
            .predict_unsafe(&FeatureVector::from(vec![1.0]))
            .unwrap_err();
        assert_eq!(
            err,
            InferenceFailure::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn nan_input_is_non_finite_output() {
        let model = LogisticModel::from_parameters(vec![1.0], 0.0, vec![0.0], vec![1.0]);
        let err = model
            .predict_unsafe(&FeatureVector::from(vec![f64::NAN]))
            .unwrap_err();
        assert_eq!(err, InferenceFailure::NonFiniteOutput);
    }

    #[test]
    fn fit_stops_when_cancelled() {
        let (rows, labels) = toy_data();
        let refs: Vec<&FeatureVector> = rows.iter().collect();
        let err = LogisticModel::fit(&refs, &labels, &TrainingConfig::default(), &|| true).unwrap_err();
        assert_eq!(err, FitError::Cancelled);
    }

    #[test]
    fn fit_reports_divergence() {
        let rows = [
            FeatureVector::from(vec![1.0]),
            FeatureVector::from(vec![-1.0]),
        ];
        let refs: Vec<&FeatureVector> = rows.iter().collect();
        let config = TrainingConfig {
            learning_rate: 1.0e308,
            ..TrainingConfig::default()
        };
        let err = LogisticModel::fit(&refs, &[true, false], &config, &never).unwrap_err();
        assert!(matches!(
            err,
            FitError::Failed(TrainingFailure::FitDiverged { .. })
        ));
    }

    #[test]
    fn snapshot_rebuilds_equivalent_classifier() {
        let model = LogisticModel::from_parameters(vec![0.5, -0.25], 0.1, vec![1.0, 2.0], vec![2.0, 0.0]);
        let rebuilt = model.snapshot().unwrap().into_classifier();
        let x = FeatureVector::from(vec![3.0, 1.0]);
        assert_eq!(
            rebuilt.predict_unsafe(&x).unwrap(),
            model.predict_unsafe(&x).unwrap()
        );
        assert_eq!(rebuilt.name(), LogisticModel::NAME);
    }
}
