//! # palate-safety - Food-safety decisions for menu recommendations
//!
//! Decides whether a menu item is safe for a user given their allergies and
//! health conditions. Deterministic rules and a learned classifier are
//! combined, and the rules always win where they apply.
//!
//! ## Core Concepts
//!
//! - **Feature Encoder**: turns a (user, item, restaurant) triple into a
//!   vector in the column order fixed at training time
//! - **Classifier Trainer**: fits `P(unsafe)` on weakly-labelled user × item
//!   pairs, or falls back to rules when the data is degenerate
//! - **Rule Engine**: hard allergen, celiac/gluten, shellfish/seafood and
//!   ingredient-keyword checks, plus the missing-allergen-information signal
//! - **Decision Orchestrator**: merges both into a [`Verdict`] that always
//!   says which layer decided and whether a rule overrode the model
//!
//! ## Usage
//!
//! ```rust,ignore
//! use palate_safety::{BudgetRange, MenuItem, Restaurant, SafetyAgent, UserProfile};
//!
//! let agent = SafetyAgent::default();
//! let report = agent.train(&users, &items, &restaurants);
//!
//! let user = UserProfile::new("U1", BudgetRange::new(20, 60).unwrap())
//!     .with_allergies(["dairy"]);
//! let item = MenuItem::new("M1", "R1", 18).with_allergens(["dairy", "egg"]);
//! let restaurant = Restaurant::new("R1", "malay", true);
//!
//! let verdict = agent.evaluate(&user, &item, &restaurant);
//! assert!(!verdict.safe);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Records and configuration
pub mod config;
pub mod error;
pub mod profile;
pub mod record;
pub mod verdict;

// Components
pub mod agent;
pub mod classifier;
pub mod decision;
pub mod features;
pub mod rules;

#[cfg(feature = "persistent")]
pub mod persistence;

pub use agent::{SafetyAgent, ScreenedItem, TrainingHandle, TrainingReport};
pub use classifier::{
    CancelToken, Classifier, ClassifierState, EvaluationMetrics, FittedClassifier,
    LabelingFunction, LogisticModel, ModelSnapshot, PopulationSummary, Trainer, TrainingOutcome,
    WeakSupervisionLabeler,
};
pub use config::{DecisionThresholds, RuleConfig, SafetyConfig, TrainingConfig};
pub use decision::{DecisionTable, ModelSignal};
pub use error::{
    BackgroundError, ConfigError, DataError, EncodingError, InferenceFailure, PersistenceError,
    SafetyError, SafetyResult, TrainingCancelled, TrainingFailure,
};
pub use features::{encode, FeatureSchema, FeatureVector, OTHER_CUISINE_INDEX};
pub use profile::{
    AllergenInfo, BudgetRange, ItemId, MenuItem, Restaurant, RestaurantId, SafetyStatus, TagSet,
    UserId, UserProfile,
};
pub use record::{MenuRecord, RestaurantRecord, UserRecord};
pub use rules::{KeywordMatcher, RuleEngine, RuleFinding, SafetyRule};
pub use verdict::{DecisionLayer, DecisionMode, Reason, ReasonCode, RiskLevel, Verdict};
