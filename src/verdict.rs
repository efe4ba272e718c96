//! Verdicts: the structured answer returned for every (user, item) pair.
//!
//! A verdict always says which layer produced it and whether a hard rule
//! overrode the classifier, so the host can show the reason verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered risk rating. `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// No known risk.
    Low,
    /// Model suspicion below the high-confidence threshold.
    Medium,
    /// Missing allergen information or a confident model.
    High,
    /// Hard rule conflict or a very confident model.
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Stable machine-readable reason identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Item allergens are unknown or empty.
    MissingAllergenInfo,
    /// A user allergy is a declared item allergen.
    DirectAllergenMatch,
    /// Celiac-type condition and gluten.
    CeliacGlutenConflict,
    /// Shellfish allergy and shellfish or seafood.
    ShellfishSeafoodConflict,
    /// Ingredient text names one of the user's allergies.
    IngredientKeywordMatch,
    /// The classifier predicted unsafe.
    ModelPredictedUnsafe,
    /// The classifier predicted safe.
    ModelPredictedSafe,
    /// Rules only, and none fired.
    FallbackNoConflict,
}

impl ReasonCode {
    /// Returns the stable identifier as it appears on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingAllergenInfo => "MISSING_ALLERGEN_INFO",
            Self::DirectAllergenMatch => "DIRECT_ALLERGEN_MATCH",
            Self::CeliacGlutenConflict => "CELIAC_GLUTEN_CONFLICT",
            Self::ShellfishSeafoodConflict => "SHELLFISH_SEAFOOD_CONFLICT",
            Self::IngredientKeywordMatch => "INGREDIENT_KEYWORD_MATCH",
            Self::ModelPredictedUnsafe => "MODEL_PREDICTED_UNSAFE",
            Self::ModelPredictedSafe => "MODEL_PREDICTED_SAFE",
            Self::FallbackNoConflict => "FALLBACK_NO_CONFLICT",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which layer produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionLayer {
    /// A deterministic rule.
    Rule,
    /// The classifier.
    Model,
}

/// Classifier state the decision was taken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionMode {
    /// No usable classifier; rules only.
    Fallback,
    /// Classifier consulted, rules applied on top.
    ModelBacked,
    /// Classifier usable but failed for this call; rules only.
    Degraded,
}

/// Why the verdict came out the way it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    /// Stable machine-readable code.
    pub code: ReasonCode,
    /// Layer that decided.
    pub layer: DecisionLayer,
    /// True when a rule contradicted or escalated the classifier.
    pub overrides_model: bool,
    /// Human-readable explanation.
    pub text: String,
}

/// The answer for a single (user, item) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the item may be recommended.
    pub safe: bool,
    /// Why.
    pub reason: Reason,
    /// Severity of the risk.
    pub risk_level: RiskLevel,

    /// Classifier output reported with the verdict. Absent for rule-only
    /// decisions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_confidence: Option<f64>,

    /// Every rule that fired, in evaluation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fired_rules: Vec<ReasonCode>,

    /// Classifier state the decision was taken in.
    pub mode: DecisionMode,
}

impl Verdict {
    /// Returns true if a hard rule overrode or escalated the classifier.
    #[must_use]
    pub const fn is_override(&self) -> bool {
        self.reason.overrides_model
    }

    /// Returns true if the verdict was produced without the classifier.
    #[must_use]
    pub const fn is_rule_only(&self) -> bool {
        self.model_confidence.is_none()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.safe { "SAFE" } else { "UNSAFE" };
        write!(f, "{label} [{}] {}: {}", self.risk_level, self.reason.code, self.reason.text)
    }
}
