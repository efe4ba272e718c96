use tracing::debug;

use crate::config::DecisionThresholds;
use crate::rules::RuleFinding;
use crate::verdict::{DecisionLayer, DecisionMode, Reason, ReasonCode, RiskLevel, Verdict};

/// The classifier's opinion on one pair, after thresholds are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSignal {
    /// Raw `P(unsafe)`.
    pub probability: f64,
    /// At or above the decision boundary, or above the high-confidence
    /// threshold.
    pub predicts_unsafe: bool,
    /// Risk the model alone would assign if it predicts unsafe.
    pub risk: RiskLevel,
}

impl ModelSignal {
    /// Applies `thresholds` to a probability.
    #[must_use]
    pub fn classify(probability: f64, thresholds: &DecisionThresholds) -> Self {
        let predicts_unsafe = probability >= thresholds.decision_boundary
            || probability > thresholds.high_confidence;
        let risk = if probability > thresholds.critical {
            RiskLevel::Critical
        } else if probability > thresholds.high_confidence {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        };
        Self {
            probability,
            predicts_unsafe,
            risk,
        }
    }
}

struct DecisionInput<'a> {
    findings: &'a [RuleFinding],
    mode: DecisionMode,
    model: Option<ModelSignal>,
}

impl DecisionInput<'_> {
    fn fired(&self) -> Vec<ReasonCode> {
        self.findings.iter().map(RuleFinding::code).collect()
    }

    fn hard_finding(&self) -> Option<&RuleFinding> {
        self.findings.iter().find(|f| f.rule.is_hard())
    }

    /// Most severe finding; the earlier rule wins a tie.
    fn most_severe(&self) -> Option<&RuleFinding> {
        self.findings
            .iter()
            .rev()
            .max_by_key(|f| f.risk)
    }

    fn verdict(&self, safe: bool, risk_level: RiskLevel, reason: Reason, confidence: Option<f64>) -> Verdict {
        Verdict {
            safe,
            reason,
            risk_level,
            model_confidence: confidence,
            fired_rules: self.fired(),
            mode: self.mode,
        }
    }
}

/// One row of a decision table: returns a verdict if its predicate holds.
struct DecisionRow {
    name: &'static str,
    apply: fn(&DecisionInput<'_>) -> Option<Verdict>,
}

/// Rule-only table, used in FALLBACK and DEGRADED mode.
const FALLBACK_ROWS: &[DecisionRow] = &[DecisionRow {
    name: "rule_fired",
    apply: rule_fired,
}];

/// Table used when the classifier produced a probability.
const MODEL_BACKED_ROWS: &[DecisionRow] = &[
    DecisionRow {
        name: "hard_rule_confirms_unsafe",
        apply: hard_rule_confirms_unsafe,
    },
    DecisionRow {
        name: "hard_rule_vetoes_safe",
        apply: hard_rule_vetoes_safe,
    },
    DecisionRow {
        name: "missing_allergen_info",
        apply: missing_allergen_info,
    },
    DecisionRow {
        name: "model_unsafe",
        apply: model_unsafe,
    },
];

/// Merges rule findings and the classifier's probability into a verdict.
///
/// Rows are evaluated top-down and the first that applies wins. Hard rules
/// veto the classifier in both directions: they escalate an unsafe
/// prediction to CRITICAL and overturn a safe one.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DecisionTable {
    thresholds: DecisionThresholds,
}

impl DecisionTable {
    /// Creates a table with the given probability thresholds.
    #[must_use]
    pub const fn new(thresholds: DecisionThresholds) -> Self {
        Self { thresholds }
    }

    /// Thresholds in use.
    #[must_use]
    pub const fn thresholds(&self) -> &DecisionThresholds {
        &self.thresholds
    }

    /// Rule-only decision. `mode` is [`DecisionMode::Fallback`] when no
    /// classifier is fitted and [`DecisionMode::Degraded`] when it failed for
    /// this call.
    #[must_use]
    pub fn fallback(&self, findings: &[RuleFinding], mode: DecisionMode) -> Verdict {
        let input = DecisionInput {
            findings,
            mode,
            model: None,
        };
        run(FALLBACK_ROWS, &input, no_conflict)
    }

    /// Decision with the classifier's `P(unsafe)`.
    #[must_use]
    pub fn model_backed(&self, findings: &[RuleFinding], probability: f64) -> Verdict {
        let input = DecisionInput {
            findings,
            mode: DecisionMode::ModelBacked,
            model: Some(ModelSignal::classify(probability, &self.thresholds)),
        };
        run(MODEL_BACKED_ROWS, &input, model_safe)
    }
}

fn run(rows: &[DecisionRow], input: &DecisionInput<'_>, default: fn(&DecisionInput<'_>) -> Verdict) -> Verdict {
    for row in rows {
        if let Some(verdict) = (row.apply)(input) {
            debug!(
                row = row.name,
                code = %verdict.reason.code,
                risk = %verdict.risk_level,
                overrides_model = verdict.reason.overrides_model,
                "Decision row applied"
            );
            return verdict;
        }
    }
    default(input)
}

fn rule_fired(input: &DecisionInput<'_>) -> Option<Verdict> {
    let finding = input.most_severe()?;
    let reason = Reason {
        code: finding.code(),
        layer: DecisionLayer::Rule,
        overrides_model: false,
        text: format!("Rule layer ({}): {}", mode_note(input.mode), finding.detail),
    };
    Some(input.verdict(false, finding.risk, reason, None))
}

fn no_conflict(input: &DecisionInput<'_>) -> Verdict {
    let reason = Reason {
        code: ReasonCode::FallbackNoConflict,
        layer: DecisionLayer::Rule,
        overrides_model: false,
        text: format!("No rule conflict found ({})", mode_note(input.mode)),
    };
    input.verdict(true, RiskLevel::Low, reason, None)
}

fn hard_rule_confirms_unsafe(input: &DecisionInput<'_>) -> Option<Verdict> {
    let model = input.model?;
    let finding = input.hard_finding()?;
    if !model.predicts_unsafe {
        return None;
    }
    let reason = Reason {
        code: finding.code(),
        layer: DecisionLayer::Rule,
        overrides_model: true,
        text: format!(
            "Rule layer overrode classifier (P(unsafe)={:.3}, {}): {}",
            model.probability, model.risk, finding.detail
        ),
    };
    Some(input.verdict(false, RiskLevel::Critical, reason, Some(model.probability)))
}

fn hard_rule_vetoes_safe(input: &DecisionInput<'_>) -> Option<Verdict> {
    let model = input.model?;
    let finding = input.hard_finding()?;
    if model.predicts_unsafe {
        return None;
    }
    let reason = Reason {
        code: finding.code(),
        layer: DecisionLayer::Rule,
        overrides_model: true,
        text: format!(
            "Rule layer overrode classifier's safe prediction (P(unsafe)={:.3}): {}",
            model.probability, finding.detail
        ),
    };
    Some(input.verdict(false, RiskLevel::Critical, reason, Some(model.probability)))
}

fn missing_allergen_info(input: &DecisionInput<'_>) -> Option<Verdict> {
    let model = input.model?;
    let finding = input
        .findings
        .iter()
        .find(|f| f.code() == ReasonCode::MissingAllergenInfo)?;
    let risk = if model.predicts_unsafe {
        finding.risk.max(model.risk)
    } else {
        finding.risk
    };
    let overrides_model = !model.predicts_unsafe || risk != model.risk;
    let text = if overrides_model {
        format!(
            "Rule layer overrode classifier (P(unsafe)={:.3}): {}",
            model.probability, finding.detail
        )
    } else {
        format!(
            "Rule layer agrees with classifier (P(unsafe)={:.3}): {}",
            model.probability, finding.detail
        )
    };
    let reason = Reason {
        code: finding.code(),
        layer: DecisionLayer::Rule,
        overrides_model,
        text,
    };
    Some(input.verdict(false, risk, reason, Some(model.probability)))
}

fn model_unsafe(input: &DecisionInput<'_>) -> Option<Verdict> {
    let model = input.model?;
    if !model.predicts_unsafe {
        return None;
    }
    let reason = Reason {
        code: ReasonCode::ModelPredictedUnsafe,
        layer: DecisionLayer::Model,
        overrides_model: false,
        text: format!(
            "Classifier predicted unsafe (P(unsafe)={:.3}); no rule conflict found",
            model.probability
        ),
    };
    Some(input.verdict(false, model.risk, reason, Some(model.probability)))
}

fn model_safe(input: &DecisionInput<'_>) -> Verdict {
    let Some(model) = input.model else {
        return no_conflict(input);
    };
    let reason = Reason {
        code: ReasonCode::ModelPredictedSafe,
        layer: DecisionLayer::Model,
        overrides_model: false,
        text: format!(
            "Classifier predicted safe (P(unsafe)={:.3}); no rule conflict found",
            model.probability
        ),
    };
    input.verdict(true, RiskLevel::Low, reason, Some(1.0 - model.probability))
}

const fn mode_note(mode: DecisionMode) -> &'static str {
    match mode {
        DecisionMode::Degraded => "classifier failed for this call",
        DecisionMode::Fallback | DecisionMode::ModelBacked => "classifier unavailable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{BudgetRange, MenuItem, UserProfile};
    use crate::rules::RuleEngine;

    fn findings(user: &UserProfile, item: &MenuItem) -> Vec<RuleFinding> {
        RuleEngine::default().findings(user, item)
    }

    fn user() -> UserProfile {
        UserProfile::new("U1", BudgetRange::new(10, 50).unwrap())
    }

    #[test]
    fn signal_thresholds() {
        let t = DecisionThresholds::default();
        let low = ModelSignal::classify(0.3, &t);
        assert!(!low.predicts_unsafe);
        let boundary = ModelSignal::classify(0.5, &t);
        assert!(boundary.predicts_unsafe);
        assert_eq!(boundary.risk, RiskLevel::Medium);
        assert_eq!(ModelSignal::classify(0.8, &t).risk, RiskLevel::High);
        assert_eq!(ModelSignal::classify(0.95, &t).risk, RiskLevel::Critical);
    }

    #[test]
    fn high_confidence_threshold_escalates_below_boundary() {
        let t = DecisionThresholds {
            decision_boundary: 0.8,
            high_confidence: 0.7,
            critical: 0.9,
        };
        let signal = ModelSignal::classify(0.75, &t);
        assert!(signal.predicts_unsafe);
        assert_eq!(signal.risk, RiskLevel::High);
    }

    #[test]
    fn fallback_without_findings_is_safe() {
        let v = DecisionTable::default().fallback(&[], DecisionMode::Fallback);
        assert!(v.safe);
        assert_eq!(v.risk_level, RiskLevel::Low);
        assert_eq!(v.reason.code, ReasonCode::FallbackNoConflict);
        assert!(v.is_rule_only());
    }

    #[test]
    fn fallback_prefers_critical_over_missing_info() {
        let user = user().with_allergies(["shellfish"]);
        let item = MenuItem::new("M1", "R1", 20)
            .with_allergens(Vec::<&str>::new())
            .with_ingredients("fried shrimp");
        let found = findings(&user, &item);
        assert_eq!(found.len(), 2);
        let v = DecisionTable::default().fallback(&found, DecisionMode::Fallback);
        assert!(!v.safe);
        assert_eq!(v.risk_level, RiskLevel::Critical);
        assert_eq!(v.reason.code, ReasonCode::ShellfishSeafoodConflict);
        assert_eq!(
            v.fired_rules,
            vec![ReasonCode::MissingAllergenInfo, ReasonCode::ShellfishSeafoodConflict]
        );
    }

    #[test]
    fn fallback_ties_break_by_rule_order() {
        let user = user().with_allergies(["gluten"]).with_conditions(["celiac"]);
        let item = MenuItem::new("M1", "R1", 20).with_allergens(["gluten"]);
        let v = DecisionTable::default().fallback(&findings(&user, &item), DecisionMode::Fallback);
        assert_eq!(v.reason.code, ReasonCode::DirectAllergenMatch);
    }

    #[test]
    fn hard_rule_vetoes_safe_prediction() {
        let user = user().with_allergies(["dairy"]);
        let item = MenuItem::new("M1", "R1", 20).with_allergens(["dairy"]);
        let v = DecisionTable::default().model_backed(&findings(&user, &item), 0.05);
        assert!(!v.safe);
        assert_eq!(v.risk_level, RiskLevel::Critical);
        assert!(v.is_override());
        assert_eq!(v.model_confidence, Some(0.05));
        assert_eq!(v.mode, DecisionMode::ModelBacked);
    }

    #[test]
    fn hard_rule_escalates_unsafe_prediction() {
        let user = user().with_conditions(["celiac_disease"]);
        let item = MenuItem::new("M1", "R1", 20).with_allergens(["gluten"]);
        let v = DecisionTable::default().model_backed(&findings(&user, &item), 0.6);
        assert_eq!(v.risk_level, RiskLevel::Critical);
        assert_eq!(v.reason.code, ReasonCode::CeliacGlutenConflict);
        assert!(v.reason.text.contains("overrode"));
    }

    #[test]
    fn missing_info_is_at_least_high() {
        let item = MenuItem::new("M1", "R1", 20);
        let found = findings(&user(), &item);
        let safe_model = DecisionTable::default().model_backed(&found, 0.1);
        assert_eq!(safe_model.risk_level, RiskLevel::High);
        assert!(safe_model.is_override());
        let medium_model = DecisionTable::default().model_backed(&found, 0.55);
        assert_eq!(medium_model.risk_level, RiskLevel::High);
        let critical_model = DecisionTable::default().model_backed(&found, 0.95);
        assert_eq!(critical_model.risk_level, RiskLevel::Critical);
        assert!(!critical_model.is_override());
    }

    #[test]
    fn model_alone_decides_without_findings() {
        let table = DecisionTable::default();
        let unsafe_v = table.model_backed(&[], 0.82);
        assert!(!unsafe_v.safe);
        assert_eq!(unsafe_v.risk_level, RiskLevel::High);
        assert_eq!(unsafe_v.reason.layer, DecisionLayer::Model);

        let safe_v = table.model_backed(&[], 0.05);
        assert!(safe_v.safe);
        assert_eq!(safe_v.reason.code, ReasonCode::ModelPredictedSafe);
        assert!((safe_v.model_confidence.unwrap() - 0.95).abs() < 1e-12);
    }

    #[test]
    fn degraded_mode_is_reported() {
        let v = DecisionTable::default().fallback(&[], DecisionMode::Degraded);
        assert_eq!(v.mode, DecisionMode::Degraded);
        assert!(v.reason.text.contains("failed"));
    }
}
