use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::{Classifier, EvaluationMetrics};
use crate::error::TrainingFailure;
use crate::features::FeatureSchema;

/// Size of the population a classifier was trained on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationSummary {
    /// Users seen.
    pub users: usize,
    /// Items seen.
    pub items: usize,
    /// Items dropped because their restaurant was not supplied.
    pub skipped_items: usize,
    /// Labelled user × item pairs.
    pub examples: usize,
    /// Pairs labelled unsafe.
    pub unsafe_examples: usize,
}

/// A usable classifier together with the schema it was trained on.
#[derive(Debug, Clone)]
pub struct FittedClassifier {
    /// Identifier of the training run.
    pub run_id: Uuid,
    /// When training finished.
    pub trained_at: DateTime<Utc>,
    /// Authoritative column order for every inference call.
    pub schema: FeatureSchema,
    /// The fitted model.
    pub model: Arc<dyn Classifier>,
    /// Held-out metrics, when a split was possible.
    pub metrics: Option<EvaluationMetrics>,
    /// Training population counts.
    pub population: PopulationSummary,
}

/// Tagged result of a training run.
#[derive(Debug, Clone)]
pub enum TrainingOutcome {
    /// A usable classifier was fitted.
    Fitted(FittedClassifier),
    /// Training failed; the agent runs on rules only.
    Fallback(TrainingFailure),
}

/// Process-wide classifier state read by every decision.
#[derive(Debug, Clone)]
pub enum ClassifierState {
    /// Rules only.
    Fallback {
        /// Why training fell back; `None` before the first training run.
        cause: Option<TrainingFailure>,
    },
    /// Classifier consulted, rules applied on top.
    ModelBacked(FittedClassifier),
}

impl ClassifierState {
    /// State before any training run.
    #[must_use]
    pub const fn untrained() -> Self {
        Self::Fallback { cause: None }
    }

    /// Returns true if a classifier is fitted.
    #[must_use]
    pub const fn fitted(&self) -> bool {
        matches!(self, Self::ModelBacked(_))
    }

    /// Returns true if decisions are rule-only.
    #[must_use]
    pub const fn fallback_active(&self) -> bool {
        !self.fitted()
    }

    /// Training schema, when a classifier is fitted.
    #[must_use]
    pub fn feature_schema(&self) -> Option<&FeatureSchema> {
        match self {
            Self::ModelBacked(fitted) => Some(&fitted.schema),
            Self::Fallback { .. } => None,
        }
    }

    /// The fitted classifier, if any.
    #[must_use]
    pub fn classifier(&self) -> Option<&FittedClassifier> {
        match self {
            Self::ModelBacked(fitted) => Some(fitted),
            Self::Fallback { .. } => None,
        }
    }

    /// Why the state is rule-only, if it is.
    #[must_use]
    pub fn fallback_cause(&self) -> Option<&TrainingFailure> {
        match self {
            Self::Fallback { cause } => cause.as_ref(),
            Self::ModelBacked(_) => None,
        }
    }
}

impl Default for ClassifierState {
    fn default() -> Self {
        Self::untrained()
    }
}

impl From<TrainingOutcome> for ClassifierState {
    fn from(outcome: TrainingOutcome) -> Self {
        match outcome {
            TrainingOutcome::Fitted(fitted) => Self::ModelBacked(fitted),
            TrainingOutcome::Fallback(cause) => Self::Fallback { cause: Some(cause) },
        }
    }
}
