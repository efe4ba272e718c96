use crate::config::RuleConfig;
use crate::profile::{MenuItem, SafetyStatus, UserProfile};

/// Produces the training label for a (user, item) pair.
///
/// No confirmed unsafe incidents exist to learn from, so labels are a
/// heuristic proxy (weak supervision). Hosts with real outcome data can
/// substitute their own implementation.
pub trait LabelingFunction: Send + Sync {
    /// Name of the labeling function (for audit/debugging).
    fn name(&self) -> &str;

    /// Returns true if the pair should be treated as unsafe.
    fn is_unsafe(&self, user: &UserProfile, item: &MenuItem) -> bool;
}

/// Default proxy labels.
///
/// A pair is unsafe iff a user allergy is a declared allergen, or the user
/// has a celiac-type condition and the item declares gluten, or the item
/// is externally flagged `POTENTIAL_RISK`.
#[derive(Debug, Clone)]
pub struct WeakSupervisionLabeler {
    celiac_marker: String,
    gluten_tag: String,
}

impl WeakSupervisionLabeler {
    /// Builds the labeler from the rule vocabularies.
    #[must_use]
    pub fn new(rules: &RuleConfig) -> Self {
        Self {
            celiac_marker: rules.celiac_marker.clone(),
            gluten_tag: rules.gluten_tag.clone(),
        }
    }
}

impl Default for WeakSupervisionLabeler {
    fn default() -> Self {
        Self::new(&RuleConfig::default())
    }
}

impl LabelingFunction for WeakSupervisionLabeler {
    fn name(&self) -> &str {
        "weak_supervision_v1"
    }

    fn is_unsafe(&self, user: &UserProfile, item: &MenuItem) -> bool {
        let allergens = item.allergens.tags();
        !user.allergies.intersection(allergens).is_empty()
            || (user.health_conditions.any_contains(&self.celiac_marker)
                && allergens.contains(&self.gluten_tag))
            || item.safety_status == SafetyStatus::PotentialRisk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::BudgetRange;

    fn user() -> UserProfile {
        UserProfile::new("U1", BudgetRange::new(0, 100).unwrap())
    }

    #[test]
    fn allergen_overlap_is_unsafe() {
        let labeler = WeakSupervisionLabeler::default();
        let user = user().with_allergies(["dairy"]);
        let item = MenuItem::new("M1", "R1", 10).with_allergens(["dairy", "egg"]);
        assert!(labeler.is_unsafe(&user, &item));
    }

    #[test]
    fn celiac_gluten_is_unsafe() {
        let labeler = WeakSupervisionLabeler::default();
        let user = user().with_conditions(["celiac"]);
        let item = MenuItem::new("M1", "R1", 10).with_allergens(["gluten"]);
        assert!(labeler.is_unsafe(&user, &item));
    }

    #[test]
    fn potential_risk_status_is_unsafe() {
        let labeler = WeakSupervisionLabeler::default();
        let item = MenuItem::new("M1", "R1", 10)
            .with_allergens(["soy"])
            .with_status(SafetyStatus::PotentialRisk);
        assert!(labeler.is_unsafe(&user(), &item));
    }

    #[test]
    fn unrelated_pair_is_safe() {
        let labeler = WeakSupervisionLabeler::default();
        let user = user().with_allergies(["peanut"]);
        let item = MenuItem::new("M1", "R1", 10)
            .with_allergens(["dairy"])
            .with_status(SafetyStatus::Verified);
        assert!(!labeler.is_unsafe(&user, &item));
    }

    #[test]
    fn missing_allergens_are_not_labelled_unsafe() {
        let labeler = WeakSupervisionLabeler::default();
        let user = user().with_allergies(["peanut"]);
        let item = MenuItem::new("M1", "R1", 10);
        assert!(!labeler.is_unsafe(&user, &item));
    }
}
