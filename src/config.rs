//! Agent configuration.
//!
//! Every section has a `Default` matching the behavior the agent ships
//! with, so a host only needs a config file to deviate from it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rules::KeywordMatcher;

/// Probability thresholds applied to `P(unsafe)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    /// Model predicts unsafe at or above this probability.
    pub decision_boundary: f64,
    /// Probabilities above this are escalated even below the boundary,
    /// and rate HIGH risk.
    pub high_confidence: f64,
    /// Probabilities above this rate CRITICAL risk.
    pub critical: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            decision_boundary: 0.5,
            high_confidence: 0.7,
            critical: 0.9,
        }
    }
}

/// Parameters for the classifier trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of each class held out for evaluation.
    pub test_fraction: f64,
    /// Seed for the stratified split shuffle.
    pub seed: u64,
    /// Full-batch gradient descent epochs.
    pub epochs: usize,
    /// Gradient descent step size.
    pub learning_rate: f64,
    /// L2 penalty on the weights (not the bias).
    pub l2: f64,
    /// Loss weight of unsafe examples relative to safe ones.
    pub positive_class_weight: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            epochs: 300,
            learning_rate: 0.1,
            l2: 1e-3,
            positive_class_weight: 50.0,
        }
    }
}

/// Keyword and condition vocabularies used by the hard rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Ingredient keywords per allergen tag. The entry for `shellfish_tag`
    /// feeds the shellfish rule, the entry for `gluten_tag` the celiac rule.
    pub ingredient_keywords: BTreeMap<String, Vec<String>>,
    /// Substring identifying celiac-type health conditions.
    pub celiac_marker: String,
    /// Allergen tag for gluten.
    pub gluten_tag: String,
    /// Allergy/allergen tag for shellfish.
    pub shellfish_tag: String,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            ingredient_keywords: default_ingredient_keywords(),
            celiac_marker: "celiac".to_string(),
            gluten_tag: "gluten".to_string(),
            shellfish_tag: "shellfish".to_string(),
        }
    }
}

fn default_ingredient_keywords() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 7] = [
        (
            "shellfish",
            &[
                "shrimp", "prawn", "crab", "lobster", "mussel", "clam", "oyster", "seafood",
                "anchovies", "sardines",
            ],
        ),
        (
            "gluten",
            &[
                "wheat", "barley", "rye", "bread", "pasta", "flour", "semolina", "soy sauce",
                "malt",
            ],
        ),
        (
            "dairy",
            &["milk", "cheese", "butter", "cream", "yogurt", "whey", "casein"],
        ),
        ("egg", &["egg", "omelet", "mayonnaise", "custard"]),
        ("peanut", &["peanut", "groundnut", "arachis"]),
        (
            "tree_nuts",
            &[
                "almond", "walnut", "cashew", "hazelnut", "pecan", "pistachio", "macadamia",
            ],
        ),
        ("soy", &["soy", "tofu", "tempeh", "edamame", "miso"]),
    ];
    table
        .into_iter()
        .map(|(tag, keywords)| {
            (
                tag.to_string(),
                keywords.iter().map(|k| (*k).to_string()).collect(),
            )
        })
        .collect()
}

/// Top-level safety agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Probability thresholds.
    pub decision: DecisionThresholds,
    /// Trainer parameters.
    pub training: TrainingConfig,
    /// Rule vocabularies.
    pub rules: RuleConfig,
}

impl SafetyConfig {
    /// Parses and validates a JSON configuration. Missing sections and
    /// fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` on malformed JSON, or a validation error.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`SafetyConfig::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks threshold ranges and ordering, training parameters and keywords.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.decision;
        for (name, value) in [
            ("decision_boundary", d.decision_boundary),
            ("high_confidence", d.high_confidence),
            ("critical", d.critical),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if d.high_confidence > d.critical {
            return Err(ConfigError::ThresholdOrder {
                reason: format!(
                    "high_confidence ({}) must not exceed critical ({})",
                    d.high_confidence, d.critical
                ),
            });
        }

        let t = &self.training;
        if !(t.test_fraction > 0.0 && t.test_fraction < 1.0) {
            return Err(ConfigError::InvalidTrainingParameter {
                name: "test_fraction",
                reason: format!("{} is not in (0, 1)", t.test_fraction),
            });
        }
        if t.epochs == 0 {
            return Err(ConfigError::InvalidTrainingParameter {
                name: "epochs",
                reason: "must be at least 1".to_string(),
            });
        }
        for (name, value) in [
            ("learning_rate", t.learning_rate),
            ("positive_class_weight", t.positive_class_weight),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidTrainingParameter {
                    name,
                    reason: format!("{value} is not a positive number"),
                });
            }
        }
        if !(t.l2.is_finite() && t.l2 >= 0.0) {
            return Err(ConfigError::InvalidTrainingParameter {
                name: "l2",
                reason: format!("{} is not a non-negative number", t.l2),
            });
        }

        for (tag, keywords) in &self.rules.ingredient_keywords {
            if tag.trim().is_empty() {
                return Err(ConfigError::InvalidKeyword {
                    keyword: tag.clone(),
                    reason: "allergen tag is blank".to_string(),
                });
            }
            for keyword in keywords {
                if keyword.trim().is_empty() {
                    return Err(ConfigError::InvalidKeyword {
                        keyword: keyword.clone(),
                        reason: format!("keyword for '{tag}' is blank"),
                    });
                }
            }
            KeywordMatcher::new(keywords)?;
        }
        Ok(())
    }
}
