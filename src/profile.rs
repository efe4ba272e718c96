//! Typed domain records consumed by the safety agent.
//!
//! Profiles, menu items and restaurants come from external stores. They are
//! immutable for the duration of a decision; parsing from the stores'
//! string-encoded rows lives in [`crate::record`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from its external representation.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a user profile.
    UserId
);
string_id!(
    /// Identifier of a menu item.
    ItemId
);
string_id!(
    /// Identifier of a restaurant.
    RestaurantId
);

/// A normalized set of tags (allergens, conditions, restrictions).
///
/// Tags are trimmed and lower-cased on insertion, including when a set is
/// deserialized. Iteration order is sorted, which keeps reason strings and
/// encoder vocabularies stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<String>);

impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tags = Vec::<String>::deserialize(deserializer)?;
        Ok(tags.into_iter().collect())
    }
}

impl TagSet {
    /// Creates an empty tag set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes a single tag. Returns `None` for blank input.
    #[must_use]
    pub fn normalize(tag: &str) -> Option<String> {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            None
        } else {
            Some(tag)
        }
    }

    /// Inserts a tag after normalization.
    pub fn insert(&mut self, tag: &str) -> bool {
        match Self::normalize(tag) {
            Some(tag) => self.0.insert(tag),
            None => false,
        }
    }

    /// Returns true if the normalized tag is present.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        Self::normalize(tag).is_some_and(|t| self.0.contains(&t))
    }

    /// Returns true if any tag contains `fragment` as a substring.
    #[must_use]
    pub fn any_contains(&self, fragment: &str) -> bool {
        self.0.iter().any(|t| t.contains(fragment))
    }

    /// Tags present in both sets, sorted.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Vec<String> {
        self.0.intersection(&other.0).cloned().collect()
    }

    /// Number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates tags in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for tag in iter {
            set.insert(tag.as_ref());
        }
        set
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.iter().collect();
        write!(f, "{{{}}}", tags.join(", "))
    }
}

/// Allergen information declared for a menu item.
///
/// `Unknown` is a safety-relevant state of its own: the kitchen never
/// declared anything, which must not be confused with "declared free of
/// allergens".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "tags", rename_all = "snake_case")]
pub enum AllergenInfo {
    /// No allergen information available.
    Unknown,
    /// Declared allergen tags.
    Listed(TagSet),
}

impl AllergenInfo {
    /// Declared tags, or an empty set when unknown.
    #[must_use]
    pub fn tags(&self) -> &TagSet {
        static EMPTY: std::sync::OnceLock<TagSet> = std::sync::OnceLock::new();
        match self {
            Self::Unknown => EMPTY.get_or_init(TagSet::new),
            Self::Listed(tags) => tags,
        }
    }

    /// True when the item cannot be screened: unknown or an empty list.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Unknown => true,
            Self::Listed(tags) => tags.is_empty(),
        }
    }

    /// Returns true if the tag is declared.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.tags().contains(tag)
    }
}

/// Externally assigned safety status of a menu item.
///
/// Used only as an auxiliary training signal, never as a verdict input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyStatus {
    /// Verified by the restaurant or a reviewer.
    Verified,
    /// Flagged as a potential risk.
    PotentialRisk,
    /// No status assigned.
    #[default]
    Unknown,
}

impl SafetyStatus {
    /// Parses the store encoding. Anything unrecognised is `Unknown`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "VERIFIED" => Self::Verified,
            "POTENTIAL_RISK" => Self::PotentialRisk,
            _ => Self::Unknown,
        }
    }
}

/// Closed budget interval in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BudgetRange {
    min: u32,
    max: u32,
}

impl BudgetRange {
    /// Creates a budget range. Returns `None` when `min > max`.
    #[must_use]
    pub const fn new(min: u32, max: u32) -> Option<Self> {
        if min > max {
            None
        } else {
            Some(Self { min, max })
        }
    }

    /// Lower bound.
    #[must_use]
    pub const fn min(&self) -> u32 {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }
}

/// A diner's safety-relevant profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Profile identifier.
    pub id: UserId,
    /// Declared allergies.
    pub allergies: TagSet,
    /// Declared health conditions, e.g. `celiac`.
    pub health_conditions: TagSet,
    /// Spending range. Never consulted by safety decisions.
    pub budget: BudgetRange,
    /// Dietary restrictions such as `halal`.
    pub dietary_restrictions: TagSet,
}

impl UserProfile {
    /// Creates a profile with no allergies, conditions or restrictions.
    #[must_use]
    pub fn new(id: impl Into<String>, budget: BudgetRange) -> Self {
        Self {
            id: UserId::new(id),
            allergies: TagSet::new(),
            health_conditions: TagSet::new(),
            budget,
            dietary_restrictions: TagSet::new(),
        }
    }

    /// Sets the allergy tags.
    #[must_use]
    pub fn with_allergies<S: AsRef<str>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.allergies = tags.into_iter().collect();
        self
    }

    /// Sets the health condition tags.
    #[must_use]
    pub fn with_conditions<S: AsRef<str>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.health_conditions = tags.into_iter().collect();
        self
    }

    /// Sets the dietary restriction tags.
    #[must_use]
    pub fn with_restrictions<S: AsRef<str>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.dietary_restrictions = tags.into_iter().collect();
        self
    }
}

/// A dish on a restaurant menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    /// Item identifier.
    pub id: ItemId,
    /// Restaurant serving the item.
    pub restaurant_id: RestaurantId,
    /// Declared allergens, or unknown.
    pub allergens: AllergenInfo,
    /// Free-text ingredient list.
    pub ingredients: String,
    /// Price in whole currency units.
    pub price: u32,
    /// External safety status.
    pub safety_status: SafetyStatus,
}

impl MenuItem {
    /// Creates an item with unknown allergens and no ingredient text.
    #[must_use]
    pub fn new(id: impl Into<String>, restaurant_id: impl Into<String>, price: u32) -> Self {
        Self {
            id: ItemId::new(id),
            restaurant_id: RestaurantId::new(restaurant_id),
            allergens: AllergenInfo::Unknown,
            ingredients: String::new(),
            price,
            safety_status: SafetyStatus::Unknown,
        }
    }

    /// Declares the allergen tags. An empty iterator declares an empty list.
    #[must_use]
    pub fn with_allergens<S: AsRef<str>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.allergens = AllergenInfo::Listed(tags.into_iter().collect());
        self
    }

    /// Sets the free-text ingredient list.
    #[must_use]
    pub fn with_ingredients(mut self, ingredients: impl Into<String>) -> Self {
        self.ingredients = ingredients.into();
        self
    }

    /// Sets the external safety status.
    #[must_use]
    pub fn with_status(mut self, status: SafetyStatus) -> Self {
        self.safety_status = status;
        self
    }
}

/// A restaurant a menu item belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    /// Restaurant identifier.
    pub id: RestaurantId,
    /// Lower-cased cuisine name.
    #[serde(deserialize_with = "deserialize_cuisine")]
    pub cuisine_type: String,
    /// Halal certification flag.
    pub halal_certified: bool,
}

impl Restaurant {
    /// Creates a restaurant record. The cuisine is normalized to lower case.
    #[must_use]
    pub fn new(id: impl Into<String>, cuisine_type: &str, halal_certified: bool) -> Self {
        Self {
            id: RestaurantId::new(id),
            cuisine_type: normalize_cuisine(cuisine_type),
            halal_certified,
        }
    }
}

/// Canonical form of a cuisine name: trimmed and lower-cased.
pub(crate) fn normalize_cuisine(cuisine: &str) -> String {
    cuisine.trim().to_lowercase()
}

fn deserialize_cuisine<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(normalize_cuisine(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_set_normalizes_and_sorts() {
        let tags: TagSet = ["  Shellfish", "dairy", "", "DAIRY"].into_iter().collect();
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("shellfish"));
        assert!(tags.contains("Dairy "));
        assert_eq!(tags.to_string(), "{dairy, shellfish}");
    }

    #[test]
    fn intersection_is_sorted() {
        let a: TagSet = ["peanut", "egg", "soy"].into_iter().collect();
        let b: TagSet = ["soy", "egg"].into_iter().collect();
        assert_eq!(a.intersection(&b), vec!["egg".to_string(), "soy".to_string()]);
    }

    #[test]
    fn unknown_and_empty_allergens_are_missing() {
        assert!(AllergenInfo::Unknown.is_missing());
        assert!(AllergenInfo::Listed(TagSet::new()).is_missing());
        let listed = AllergenInfo::Listed(["gluten"].into_iter().collect());
        assert!(!listed.is_missing());
        assert!(listed.contains("gluten"));
        assert_ne!(AllergenInfo::Unknown, AllergenInfo::Listed(TagSet::new()));
    }

    #[test]
    fn budget_rejects_inverted_interval() {
        assert!(BudgetRange::new(55, 30).is_none());
        let budget = BudgetRange::new(30, 55).unwrap();
        assert_eq!((budget.min(), budget.max()), (30, 55));
    }

    #[test]
    fn deserialized_profiles_are_normalized() {
        let user: UserProfile = serde_json::from_str(
            r#"{"id":"U1","allergies":["Peanut"," DAIRY ",""],"health_conditions":["Celiac"],
                "budget":{"min":10,"max":40},"dietary_restrictions":[]}"#,
        )
        .unwrap();
        assert_eq!(user.allergies.iter().collect::<Vec<_>>(), vec!["dairy", "peanut"]);
        assert!(user.health_conditions.any_contains("celiac"));

        let item = MenuItem::new("M1", "R1", 12).with_allergens(["peanut"]);
        assert_eq!(user.allergies.intersection(item.allergens.tags()), vec!["peanut".to_string()]);

        let item: MenuItem = serde_json::from_str(
            r#"{"id":"M2","restaurant_id":"R1","allergens":{"state":"listed","tags":["Gluten"]},
                "ingredients":"","price":9,"safety_status":"UNKNOWN"}"#,
        )
        .unwrap();
        assert!(item.allergens.tags().iter().any(|t| t == "gluten"));

        let restaurant: Restaurant =
            serde_json::from_str(r#"{"id":"R1","cuisine_type":" Malay","halal_certified":true}"#)
                .unwrap();
        assert_eq!(restaurant.cuisine_type, "malay");
    }

    #[test]
    fn safety_status_parse() {
        assert_eq!(SafetyStatus::parse("potential_risk"), SafetyStatus::PotentialRisk);
        assert_eq!(SafetyStatus::parse("VERIFIED"), SafetyStatus::Verified);
        assert_eq!(SafetyStatus::parse("pending"), SafetyStatus::Unknown);
    }
}
