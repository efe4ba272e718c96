//! Safety classifier: proxy labels, training, evaluation and the
//! process-wide classifier state.

mod labeling;
mod metrics;
mod model;
mod split;
mod state;
mod trainer;

pub use labeling::{LabelingFunction, WeakSupervisionLabeler};
pub use metrics::{ConfusionMatrix, EvaluationMetrics};
pub use model::{Classifier, LogisticModel, ModelSnapshot};
pub use state::{ClassifierState, FittedClassifier, PopulationSummary, TrainingOutcome};
pub use trainer::{CancelToken, Trainer, TrainingExample};
