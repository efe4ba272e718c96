use serde::{Deserialize, Serialize};

use crate::config::DecisionThresholds;
use crate::decision::ModelSignal;

/// Counts of predictions against labels, unsafe = positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Unsafe predicted unsafe.
    pub true_positives: usize,
    /// Safe predicted unsafe.
    pub false_positives: usize,
    /// Safe predicted safe.
    pub true_negatives: usize,
    /// Unsafe predicted safe.
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    /// Total number of evaluated examples.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }
}

/// Held-out evaluation of a fitted classifier.
///
/// Recorded for observability only; it never gates whether the model is
/// used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// Counts at the decision threshold.
    pub confusion: ConfusionMatrix,
    /// Unsafe-class precision.
    pub precision: f64,
    /// Unsafe-class recall.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Fraction of correct predictions.
    pub accuracy: f64,
    /// ROC AUC; absent when the evaluation set holds a single class.
    pub roc_auc: Option<f64>,
    /// Thresholds used for the confusion matrix, the same ones live
    /// decisions apply.
    pub thresholds: DecisionThresholds,
}

impl EvaluationMetrics {
    /// Computes metrics from unsafe probabilities and labels. A probability
    /// counts as an unsafe prediction exactly when [`ModelSignal::classify`]
    /// says so.
    #[must_use]
    pub fn compute(probabilities: &[f64], labels: &[bool], thresholds: &DecisionThresholds) -> Self {
        let mut confusion = ConfusionMatrix::default();
        for (&p, &y) in probabilities.iter().zip(labels) {
            match (ModelSignal::classify(p, thresholds).predicts_unsafe, y) {
                (true, true) => confusion.true_positives += 1,
                (true, false) => confusion.false_positives += 1,
                (false, false) => confusion.true_negatives += 1,
                (false, true) => confusion.false_negatives += 1,
            }
        }

        let precision = ratio(
            confusion.true_positives,
            confusion.true_positives + confusion.false_positives,
        );
        let recall = ratio(
            confusion.true_positives,
            confusion.true_positives + confusion.false_negatives,
        );
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let accuracy = ratio(
            confusion.true_positives + confusion.true_negatives,
            confusion.total(),
        );

        Self {
            confusion,
            precision,
            recall,
            f1,
            accuracy,
            roc_auc: roc_auc(probabilities, labels),
            thresholds: *thresholds,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Rank-based (Mann-Whitney) ROC AUC with averaged ranks for ties.
#[allow(clippy::cast_precision_loss)]
fn roc_auc(probabilities: &[f64], labels: &[bool]) -> Option<f64> {
    let n = probabilities.len().min(labels.len());
    let positives = labels[..n].iter().filter(|&&y| y).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| probabilities[a].total_cmp(&probabilities[b]));

    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < n {
        let mut end = start;
        while end + 1 < n && probabilities[order[end + 1]] == probabilities[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; tied entries share the mean rank.
        let mean_rank = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            if labels[idx] {
                rank_sum += mean_rank;
            }
        }
        start = end + 1;
    }

    let p = positives as f64;
    let q = negatives as f64;
    Some((rank_sum - p * (p + 1.0) / 2.0) / (p * q))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> DecisionThresholds {
        DecisionThresholds::default()
    }

    #[test]
    fn perfect_ranking_has_unit_auc() {
        let m = EvaluationMetrics::compute(&[0.9, 0.8, 0.2, 0.1], &[true, true, false, false], &defaults());
        assert_eq!(m.roc_auc, Some(1.0));
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.accuracy, 1.0);
    }

    #[test]
    fn inverted_ranking_has_zero_auc() {
        let m = EvaluationMetrics::compute(&[0.1, 0.9], &[true, false], &defaults());
        assert_eq!(m.roc_auc, Some(0.0));
        assert_eq!(m.confusion.false_positives, 1);
        assert_eq!(m.confusion.false_negatives, 1);
    }

    #[test]
    fn ties_count_half() {
        let m = EvaluationMetrics::compute(&[0.5, 0.5], &[true, false], &defaults());
        assert_eq!(m.roc_auc, Some(0.5));
    }

    #[test]
    fn single_class_has_no_auc() {
        let m = EvaluationMetrics::compute(&[0.2, 0.3], &[false, false], &defaults());
        assert_eq!(m.roc_auc, None);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.confusion.true_negatives, 2);
    }

    #[test]
    fn high_confidence_counts_as_unsafe_below_boundary() {
        let thresholds = DecisionThresholds {
            decision_boundary: 0.8,
            high_confidence: 0.7,
            critical: 0.9,
        };
        let m = EvaluationMetrics::compute(&[0.75, 0.6], &[true, false], &thresholds);
        assert_eq!(m.confusion.true_positives, 1);
        assert_eq!(m.confusion.true_negatives, 1);
        assert_eq!(m.thresholds, thresholds);
    }
}
