use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::RuleConfig;
use crate::error::ConfigError;
use crate::profile::{MenuItem, TagSet, UserProfile};
use crate::rules::KeywordMatcher;
use crate::verdict::{ReasonCode, RiskLevel};

/// The hard-coded safety predicates, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyRule {
    /// Allergen information is unknown or empty.
    MissingAllergenInfo,
    /// A user allergy is a declared item allergen.
    DirectAllergenMatch,
    /// Celiac-type condition and a gluten allergen or gluten ingredient.
    CeliacGluten,
    /// Shellfish allergy and a shellfish allergen or seafood ingredient.
    ShellfishSeafood,
    /// Any other user allergy named by an ingredient keyword.
    IngredientKeywordMatch,
}

impl SafetyRule {
    /// All rules, in evaluation order.
    pub const ORDER: [Self; 5] = [
        Self::MissingAllergenInfo,
        Self::DirectAllergenMatch,
        Self::CeliacGluten,
        Self::ShellfishSeafood,
        Self::IngredientKeywordMatch,
    ];

    /// Reason code the rule reports.
    #[must_use]
    pub const fn code(self) -> ReasonCode {
        match self {
            Self::MissingAllergenInfo => ReasonCode::MissingAllergenInfo,
            Self::DirectAllergenMatch => ReasonCode::DirectAllergenMatch,
            Self::CeliacGluten => ReasonCode::CeliacGlutenConflict,
            Self::ShellfishSeafood => ReasonCode::ShellfishSeafoodConflict,
            Self::IngredientKeywordMatch => ReasonCode::IngredientKeywordMatch,
        }
    }

    /// Risk the rule assigns when it fires.
    #[must_use]
    pub const fn risk(self) -> RiskLevel {
        match self {
            Self::MissingAllergenInfo => RiskLevel::High,
            Self::DirectAllergenMatch
            | Self::CeliacGluten
            | Self::ShellfishSeafood
            | Self::IngredientKeywordMatch => RiskLevel::Critical,
        }
    }

    /// Hard rules veto the classifier in both directions. The missing-data
    /// rule is structural rather than a hard conflict.
    #[must_use]
    pub const fn is_hard(self) -> bool {
        !matches!(self, Self::MissingAllergenInfo)
    }
}

/// A rule that fired for a (user, item) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFinding {
    /// Rule that fired.
    pub rule: SafetyRule,
    /// Severity assigned by the rule.
    pub risk: RiskLevel,
    /// Human-readable detail, e.g. the intersecting tags.
    pub detail: String,
}

impl RuleFinding {
    fn new(rule: SafetyRule, detail: String) -> Self {
        Self {
            rule,
            risk: rule.risk(),
            detail,
        }
    }

    /// Reason code of the rule that fired.
    #[must_use]
    pub const fn code(&self) -> ReasonCode {
        self.rule.code()
    }
}

/// Evaluates [`SafetyRule`]s against raw records.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    config: RuleConfig,
    keywords: BTreeMap<String, KeywordMatcher>,
}

impl RuleEngine {
    /// Builds an engine from the rule vocabularies, compiling one keyword
    /// matcher per allergen tag. Tags are normalized like profile tags.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidKeyword` if a keyword list does not
    /// compile.
    pub fn new(config: RuleConfig) -> Result<Self, ConfigError> {
        let mut keywords = BTreeMap::new();
        for (tag, list) in &config.ingredient_keywords {
            if let Some(tag) = TagSet::normalize(tag) {
                keywords.insert(tag, KeywordMatcher::new(list)?);
            }
        }
        Ok(Self { config, keywords })
    }

    /// First ingredient keyword of `tag` found in `ingredients`.
    fn ingredient_mention(&self, tag: &str, ingredients: &str) -> Option<String> {
        let tag = TagSet::normalize(tag)?;
        self.keywords.get(&tag)?.find(ingredients)
    }

    /// Checks a single rule.
    #[must_use]
    pub fn check(&self, rule: SafetyRule, user: &UserProfile, item: &MenuItem) -> Option<RuleFinding> {
        let detail = match rule {
            SafetyRule::MissingAllergenInfo => {
                if !item.allergens.is_missing() {
                    return None;
                }
                format!("allergen information missing for item {}", item.id)
            }
            SafetyRule::DirectAllergenMatch => {
                let shared = user.allergies.intersection(item.allergens.tags());
                if shared.is_empty() {
                    return None;
                }
                format!("item {} declares allergens {{{}}}", item.id, shared.join(", "))
            }
            SafetyRule::CeliacGluten => {
                if !self.has_celiac_condition(user) {
                    return None;
                }
                if item.allergens.contains(&self.config.gluten_tag) {
                    format!("item {} contains gluten, unsafe for celiac disease", item.id)
                } else if let Some(keyword) =
                    self.ingredient_mention(&self.config.gluten_tag, &item.ingredients)
                {
                    format!(
                        "ingredients of item {} mention '{keyword}', unsafe for celiac disease",
                        item.id
                    )
                } else {
                    return None;
                }
            }
            SafetyRule::ShellfishSeafood => {
                if !user.allergies.contains(&self.config.shellfish_tag) {
                    return None;
                }
                if item.allergens.contains(&self.config.shellfish_tag) {
                    format!("item {} declares shellfish", item.id)
                } else if let Some(keyword) =
                    self.ingredient_mention(&self.config.shellfish_tag, &item.ingredients)
                {
                    format!("ingredients of item {} mention '{keyword}'", item.id)
                } else {
                    return None;
                }
            }
            SafetyRule::IngredientKeywordMatch => {
                let shellfish = TagSet::normalize(&self.config.shellfish_tag);
                let (allergy, keyword) = user
                    .allergies
                    .iter()
                    .filter(|a| shellfish.as_deref() != Some(*a))
                    .find_map(|a| {
                        self.keywords
                            .get(a)?
                            .find(&item.ingredients)
                            .map(|k| (a, k))
                    })?;
                format!(
                    "ingredients of item {} mention '{keyword}', related to {allergy}",
                    item.id
                )
            }
        };
        Some(RuleFinding::new(rule, detail))
    }

    /// First rule that fires, in [`SafetyRule::ORDER`].
    #[must_use]
    pub fn evaluate(&self, user: &UserProfile, item: &MenuItem) -> Option<RuleFinding> {
        SafetyRule::ORDER
            .iter()
            .find_map(|rule| self.check(*rule, user, item))
    }

    /// Every rule that fires, in [`SafetyRule::ORDER`].
    #[must_use]
    pub fn findings(&self, user: &UserProfile, item: &MenuItem) -> Vec<RuleFinding> {
        SafetyRule::ORDER
            .iter()
            .filter_map(|rule| self.check(*rule, user, item))
            .collect()
    }

    /// Returns true if the user has a celiac-type condition.
    #[must_use]
    pub fn has_celiac_condition(&self, user: &UserProfile) -> bool {
        user.health_conditions.any_contains(&self.config.celiac_marker)
    }

    /// Rule vocabularies in use.
    #[must_use]
    pub fn config(&self) -> &RuleConfig {
        &self.config
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(RuleConfig::default()).expect("default ingredient keywords compile")
    }
}
