//! The safety agent: the single entry point a host calls.
//!
//! The agent owns the rule engine, the decision tables and the current
//! [`ClassifierState`]. State is published as immutable `Arc` snapshots:
//! `evaluate` clones the current snapshot under a short read lock, and
//! `train` computes a new state outside the lock and swaps it in under a
//! write lock, so in-flight decisions keep the snapshot they started with.

mod background;

pub use background::TrainingHandle;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::{
    CancelToken, ClassifierState, EvaluationMetrics, FittedClassifier, LabelingFunction,
    PopulationSummary, Trainer, TrainingOutcome,
};
use crate::config::SafetyConfig;
use crate::decision::DecisionTable;
use crate::error::{ConfigError, DataError, InferenceFailure};
use crate::features::encode;
use crate::profile::{ItemId, MenuItem, Restaurant, RestaurantId, UserProfile};
use crate::rules::RuleEngine;
use crate::verdict::{DecisionMode, Verdict};

/// What a `train` call did to the agent state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainingReport {
    /// A classifier was fitted and published.
    ModelBacked {
        /// Identifier of the training run.
        run_id: Uuid,
        /// Population the classifier was trained on.
        population: PopulationSummary,
        /// Held-out evaluation, when a test partition existed.
        metrics: Option<EvaluationMetrics>,
    },
    /// Training failed; rule-only state was published.
    Fallback {
        /// Human-readable failure cause.
        cause: String,
    },
    /// Training was cancelled; the previous state is untouched.
    Cancelled,
}

impl TrainingReport {
    /// Returns true if a classifier was published.
    #[must_use]
    pub const fn is_model_backed(&self) -> bool {
        matches!(self, Self::ModelBacked { .. })
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    fn from_outcome(outcome: &TrainingOutcome) -> Self {
        match outcome {
            TrainingOutcome::Fitted(fitted) => Self::ModelBacked {
                run_id: fitted.run_id,
                population: fitted.population,
                metrics: fitted.metrics.clone(),
            },
            TrainingOutcome::Fallback(cause) => Self::Fallback {
                cause: cause.to_string(),
            },
        }
    }
}

/// Per-item result of [`SafetyAgent::screen_menu`].
pub type ScreenedItem = (ItemId, Result<Verdict, DataError>);

/// Food-safety agent combining deterministic rules with a learned
/// classifier.
#[derive(Debug)]
pub struct SafetyAgent {
    config: SafetyConfig,
    rules: RuleEngine,
    table: DecisionTable,
    trainer: Trainer,
    state: RwLock<Arc<ClassifierState>>,
    training: Mutex<()>,
}

impl SafetyAgent {
    /// Creates an untrained agent. Decisions are rule-only until the first
    /// successful `train`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configuration fails validation.
    pub fn new(config: SafetyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rules = RuleEngine::new(config.rules.clone())?;
        Ok(Self {
            table: DecisionTable::new(config.decision),
            trainer: Trainer::new(&config),
            rules,
            config,
            state: RwLock::new(Arc::new(ClassifierState::untrained())),
            training: Mutex::new(()),
        })
    }

    /// Replaces the labeling function used by future training runs.
    #[must_use]
    pub fn with_labeler(mut self, labeler: Arc<dyn LabelingFunction>) -> Self {
        self.trainer = self.trainer.with_labeler(labeler);
        self
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Current classifier state snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn state(&self) -> Arc<ClassifierState> {
        Arc::clone(&self.state.read().expect("classifier state lock poisoned"))
    }

    /// Publishes `state`, replacing the current one atomically.
    ///
    /// Used to restore a persisted classifier without retraining.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    pub fn install_state(&self, state: ClassifierState) {
        let state = Arc::new(state);
        *self.state.write().expect("classifier state lock poisoned") = state;
    }

    /// Trains the classifier on the full user × item population and
    /// publishes the result.
    ///
    /// Never fails: degenerate data or a failed fit publish rule-only
    /// state, and the report says why. Calls are serialised; a second
    /// caller waits for the first to finish.
    ///
    /// # Panics
    ///
    /// Panics if the training lock is poisoned.
    pub fn train(
        &self,
        users: &[UserProfile],
        items: &[MenuItem],
        restaurants: &[Restaurant],
    ) -> TrainingReport {
        self.train_with_cancel(users, items, restaurants, &CancelToken::new())
    }

    pub(crate) fn train_with_cancel(
        &self,
        users: &[UserProfile],
        items: &[MenuItem],
        restaurants: &[Restaurant],
        cancel: &CancelToken,
    ) -> TrainingReport {
        let _guard = self.training.lock().expect("training lock poisoned");
        match self.trainer.train(users, items, restaurants, cancel) {
            Ok(outcome) => {
                let report = TrainingReport::from_outcome(&outcome);
                self.install_state(outcome.into());
                report
            }
            Err(cancelled) => {
                info!(error = %cancelled, "Keeping previous classifier state");
                TrainingReport::Cancelled
            }
        }
    }

    /// Decides whether `item` is safe for `user`.
    ///
    /// Never fails. When the classifier cannot score this triple the call
    /// degrades to the rule-only table and the verdict reports
    /// [`DecisionMode::Degraded`].
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn evaluate(&self, user: &UserProfile, item: &MenuItem, restaurant: &Restaurant) -> Verdict {
        let state = self.state();
        self.decide(&state, user, item, restaurant)
    }

    /// Evaluates every item of a menu for `user` against one state
    /// snapshot, in input order.
    ///
    /// Items whose restaurant is not in `restaurants` yield
    /// `DataError::UnknownRestaurant`.
    ///
    /// # Panics
    ///
    /// Panics if the state lock is poisoned.
    #[must_use]
    pub fn screen_menu(
        &self,
        user: &UserProfile,
        items: &[MenuItem],
        restaurants: &[Restaurant],
    ) -> Vec<ScreenedItem> {
        let state = self.state();
        let by_id: HashMap<&RestaurantId, &Restaurant> =
            restaurants.iter().map(|r| (&r.id, r)).collect();
        items
            .iter()
            .map(|item| {
                let verdict = by_id
                    .get(&item.restaurant_id)
                    .map(|restaurant| self.decide(&state, user, item, restaurant))
                    .ok_or_else(|| DataError::UnknownRestaurant {
                        item: item.id.clone(),
                        restaurant: item.restaurant_id.clone(),
                    });
                (item.id.clone(), verdict)
            })
            .collect()
    }

    fn decide(
        &self,
        state: &ClassifierState,
        user: &UserProfile,
        item: &MenuItem,
        restaurant: &Restaurant,
    ) -> Verdict {
        let findings = self.rules.findings(user, item);
        let ClassifierState::ModelBacked(fitted) = state else {
            return self.table.fallback(&findings, DecisionMode::Fallback);
        };
        match infer(fitted, user, item, restaurant) {
            Ok(probability) => self.table.model_backed(&findings, probability),
            Err(e) => {
                warn!(
                    user = %user.id,
                    item = %item.id,
                    error = %e,
                    "Classifier failed for this call; using rule-only decision"
                );
                self.table.fallback(&findings, DecisionMode::Degraded)
            }
        }
    }
}

impl Default for SafetyAgent {
    fn default() -> Self {
        Self::new(SafetyConfig::default()).expect("default config is valid")
    }
}

fn infer(
    fitted: &FittedClassifier,
    user: &UserProfile,
    item: &MenuItem,
    restaurant: &Restaurant,
) -> Result<f64, InferenceFailure> {
    let features = encode(user, item, restaurant, &fitted.schema)?;
    let probability = fitted.model.predict_unsafe(&features)?;
    if !probability.is_finite() {
        return Err(InferenceFailure::NonFiniteOutput);
    }
    if !(0.0..=1.0).contains(&probability) {
        return Err(InferenceFailure::ProbabilityOutOfRange { value: probability });
    }
    Ok(probability)
}
