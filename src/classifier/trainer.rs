use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::model::{FitError, LogisticModel};
use crate::classifier::split::stratified_split;
use crate::classifier::{
    Classifier, EvaluationMetrics, FittedClassifier, LabelingFunction, PopulationSummary,
    TrainingOutcome, WeakSupervisionLabeler,
};
use crate::config::{DecisionThresholds, SafetyConfig, TrainingConfig};
use crate::error::{TrainingCancelled, TrainingFailure};
use crate::features::{encode, FeatureSchema, FeatureVector};
use crate::profile::{MenuItem, Restaurant, RestaurantId, UserProfile};

/// Cooperative cancellation flag shared with a training run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One encoded (user, item) pair with its proxy label.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    /// Encoded pair.
    pub features: FeatureVector,
    /// Weak label.
    pub unsafe_label: bool,
}

/// Fits the safety classifier on the user × item cross-product.
///
/// Every user is paired with every item so the model learns
/// allergen/condition/price interactions rather than per-user answers.
#[derive(Clone)]
pub struct Trainer {
    config: TrainingConfig,
    thresholds: DecisionThresholds,
    labeler: Arc<dyn LabelingFunction>,
}

impl std::fmt::Debug for Trainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("config", &self.config)
            .field("thresholds", &self.thresholds)
            .field("labeler", &self.labeler.name())
            .finish()
    }
}

impl Trainer {
    /// Creates a trainer with the default weak-supervision labels.
    #[must_use]
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            config: config.training.clone(),
            thresholds: config.decision,
            labeler: Arc::new(WeakSupervisionLabeler::new(&config.rules)),
        }
    }

    /// Replaces the labeling function.
    #[must_use]
    pub fn with_labeler(mut self, labeler: Arc<dyn LabelingFunction>) -> Self {
        self.labeler = labeler;
        self
    }

    /// Name of the labeling function in use.
    #[must_use]
    pub fn labeler_name(&self) -> &str {
        self.labeler.name()
    }

    /// Trains a classifier.
    ///
    /// Degenerate inputs and fit failures produce
    /// [`TrainingOutcome::Fallback`]; they are never returned as errors.
    ///
    /// # Errors
    ///
    /// Returns `TrainingCancelled` if `cancel` fires before the run
    /// finishes. Nothing is published in that case.
    pub fn train(
        &self,
        users: &[UserProfile],
        items: &[MenuItem],
        restaurants: &[Restaurant],
        cancel: &CancelToken,
    ) -> Result<TrainingOutcome, TrainingCancelled> {
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            users = users.len(),
            items = items.len(),
            restaurants = restaurants.len(),
            labeler = self.labeler.name(),
            "Training safety classifier"
        );

        let by_id: HashMap<&RestaurantId, &Restaurant> =
            restaurants.iter().map(|r| (&r.id, r)).collect();
        let mut joined: Vec<(&MenuItem, &Restaurant)> = Vec::with_capacity(items.len());
        for item in items {
            match by_id.get(&item.restaurant_id) {
                Some(restaurant) => joined.push((item, restaurant)),
                None => warn!(
                    item = %item.id,
                    restaurant = %item.restaurant_id,
                    "Skipping menu item with unknown restaurant"
                ),
            }
        }

        let mut population = PopulationSummary {
            users: users.len(),
            items: joined.len(),
            skipped_items: items.len() - joined.len(),
            ..PopulationSummary::default()
        };
        if users.is_empty() || joined.is_empty() {
            return Ok(fallback(TrainingFailure::EmptyPopulation));
        }

        let joined_items: Vec<&MenuItem> = joined.iter().map(|(item, _)| *item).collect();
        let mut used: Vec<&Restaurant> = joined.iter().map(|(_, r)| *r).collect();
        used.sort_by(|a, b| a.id.cmp(&b.id));
        used.dedup_by(|a, b| a.id == b.id);
        let schema = FeatureSchema::fit(users, &joined_items, &used);
        if schema.is_empty() {
            return Ok(fallback(TrainingFailure::EmptyFeatureMatrix));
        }

        let mut examples = Vec::with_capacity(users.len() * joined.len());
        for user in users {
            if cancel.is_cancelled() {
                return Err(TrainingCancelled);
            }
            for (item, restaurant) in &joined {
                let features = match encode(user, item, restaurant, &schema) {
                    Ok(features) => features,
                    Err(e) => return Ok(fallback(e.into())),
                };
                examples.push(TrainingExample {
                    features,
                    unsafe_label: self.labeler.is_unsafe(user, item),
                });
            }
        }

        population.examples = examples.len();
        population.unsafe_examples = examples.iter().filter(|e| e.unsafe_label).count();
        info!(
            %run_id,
            examples = population.examples,
            unsafe_examples = population.unsafe_examples,
            columns = schema.len(),
            "Training population built"
        );
        if population.unsafe_examples == 0 || population.unsafe_examples == population.examples {
            return Ok(fallback(TrainingFailure::SingleLabel {
                positives: population.unsafe_examples,
                total: population.examples,
            }));
        }

        let labels: Vec<bool> = examples.iter().map(|e| e.unsafe_label).collect();
        let split = stratified_split(&labels, self.config.test_fraction, self.config.seed);
        debug!(
            train = split.train.len(),
            test = split.test.len(),
            "Stratified split"
        );

        let train_rows: Vec<&FeatureVector> = split.train.iter().map(|&i| &examples[i].features).collect();
        let train_labels: Vec<bool> = split.train.iter().map(|&i| labels[i]).collect();
        let model = match LogisticModel::fit(&train_rows, &train_labels, &self.config, &|| {
            cancel.is_cancelled()
        }) {
            Ok(model) => model,
            Err(FitError::Cancelled) => return Err(TrainingCancelled),
            Err(FitError::Failed(cause)) => return Ok(fallback(cause)),
        };

        let metrics = self.evaluate(&model, &examples, &split.test);
        if let Some(m) = &metrics {
            info!(
                %run_id,
                precision = m.precision,
                recall = m.recall,
                f1 = m.f1,
                accuracy = m.accuracy,
                roc_auc = ?m.roc_auc,
                tp = m.confusion.true_positives,
                fp = m.confusion.false_positives,
                tn = m.confusion.true_negatives,
                fn_ = m.confusion.false_negatives,
                "Safety classifier evaluation"
            );
        }

        if cancel.is_cancelled() {
            return Err(TrainingCancelled);
        }
        info!(%run_id, "Safety classifier training completed");
        Ok(TrainingOutcome::Fitted(FittedClassifier {
            run_id,
            trained_at: Utc::now(),
            schema,
            model: Arc::new(model),
            metrics,
            population,
        }))
    }

    fn evaluate(
        &self,
        model: &LogisticModel,
        examples: &[TrainingExample],
        test: &[usize],
    ) -> Option<EvaluationMetrics> {
        if test.is_empty() {
            return None;
        }
        let mut probabilities = Vec::with_capacity(test.len());
        let mut labels = Vec::with_capacity(test.len());
        for &i in test {
            match model.predict_unsafe(&examples[i].features) {
                Ok(p) => {
                    probabilities.push(p);
                    labels.push(examples[i].unsafe_label);
                }
                Err(e) => {
                    warn!(error = %e, "Evaluation prediction failed; metrics skipped");
                    return None;
                }
            }
        }
        Some(EvaluationMetrics::compute(
            &probabilities,
            &labels,
            &self.thresholds,
        ))
    }
}

fn fallback(cause: TrainingFailure) -> TrainingOutcome {
    warn!(cause = %cause, "Falling back to rule-based safety checks only");
    TrainingOutcome::Fallback(cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{BudgetRange, SafetyStatus};

    fn budget() -> BudgetRange {
        BudgetRange::new(20, 60).unwrap()
    }

    fn users() -> Vec<UserProfile> {
        vec![
            UserProfile::new("U1", budget()).with_allergies(["shellfish"]),
            UserProfile::new("U2", budget()).with_allergies(["peanut"]),
            UserProfile::new("U3", budget()).with_conditions(["celiac"]),
            UserProfile::new("U4", budget()),
            UserProfile::new("U5", budget()).with_allergies(["dairy"]),
        ]
    }

    fn items() -> Vec<MenuItem> {
        vec![
            MenuItem::new("M1", "R1", 25).with_allergens(["shellfish"]),
            MenuItem::new("M2", "R1", 15).with_allergens(["gluten"]),
            MenuItem::new("M3", "R2", 30).with_allergens(["soy"]),
            MenuItem::new("M4", "R2", 22).with_allergens(["dairy"]),
            MenuItem::new("M5", "R2", 18)
                .with_allergens(["egg"])
                .with_status(SafetyStatus::Verified),
            MenuItem::new("M6", "R1", 40).with_allergens(["peanut"]),
        ]
    }

    fn restaurants() -> Vec<Restaurant> {
        vec![
            Restaurant::new("R1", "malay", true),
            Restaurant::new("R2", "chinese", false),
        ]
    }

    fn trainer() -> Trainer {
        Trainer::new(&SafetyConfig::default())
    }

    #[test]
    fn fits_on_mixed_labels() {
        let outcome = trainer()
            .train(&users(), &items(), &restaurants(), &CancelToken::new())
            .unwrap();
        let TrainingOutcome::Fitted(fitted) = outcome else {
            panic!("expected a fitted classifier");
        };
        assert_eq!(fitted.population.examples, 30);
        assert_eq!(fitted.population.unsafe_examples, 4);
        assert_eq!(fitted.model.name(), LogisticModel::NAME);
        assert!(fitted.metrics.is_some());
        assert_eq!(fitted.schema.columns().last().map(String::as_str), Some("missing_allergen_info"));
    }

    #[test]
    fn single_label_falls_back() {
        let users = vec![UserProfile::new("U1", budget())];
        let outcome = trainer()
            .train(&users, &items(), &restaurants(), &CancelToken::new())
            .unwrap();
        assert!(matches!(
            outcome,
            TrainingOutcome::Fallback(TrainingFailure::SingleLabel { positives: 0, total: 6 })
        ));
    }

    #[test]
    fn empty_population_falls_back() {
        let outcome = trainer()
            .train(&[], &items(), &restaurants(), &CancelToken::new())
            .unwrap();
        assert!(matches!(
            outcome,
            TrainingOutcome::Fallback(TrainingFailure::EmptyPopulation)
        ));
    }

    #[test]
    fn items_without_restaurant_are_skipped() {
        let mut items = items();
        items.push(MenuItem::new("M7", "R99", 10).with_allergens(["egg"]));
        let outcome = trainer()
            .train(&users(), &items, &restaurants(), &CancelToken::new())
            .unwrap();
        let TrainingOutcome::Fitted(fitted) = outcome else {
            panic!("expected a fitted classifier");
        };
        assert_eq!(fitted.population.skipped_items, 1);
        assert_eq!(fitted.population.items, 6);
    }

    #[test]
    fn cancelled_run_reports_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = trainer().train(&users(), &items(), &restaurants(), &cancel);
        assert_eq!(result.unwrap_err(), TrainingCancelled);
    }

    struct EverythingUnsafe;

    impl LabelingFunction for EverythingUnsafe {
        fn name(&self) -> &str {
            "everything_unsafe"
        }

        fn is_unsafe(&self, _user: &UserProfile, _item: &MenuItem) -> bool {
            true
        }
    }

    #[test]
    fn labeler_is_pluggable() {
        let trainer = trainer().with_labeler(Arc::new(EverythingUnsafe));
        assert_eq!(trainer.labeler_name(), "everything_unsafe");
        let outcome = trainer
            .train(&users(), &items(), &restaurants(), &CancelToken::new())
            .unwrap();
        assert!(matches!(
            outcome,
            TrainingOutcome::Fallback(TrainingFailure::SingleLabel { positives: 30, total: 30 })
        ));
    }
}
