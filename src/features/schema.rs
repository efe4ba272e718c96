use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::profile::{normalize_cuisine, MenuItem, Restaurant, UserProfile};

/// Column prefix for user allergy indicators.
pub(crate) const ALLERGY_PREFIX: &str = "allergy:";
/// Column prefix for item allergen indicators.
pub(crate) const ALLERGEN_PREFIX: &str = "allergen:";
/// Column prefix for user health condition indicators.
pub(crate) const CONDITION_PREFIX: &str = "condition:";

pub(crate) const CUISINE_COLUMN: &str = "cuisine_encoded";
pub(crate) const BUDGET_MIN_COLUMN: &str = "budget_min";
pub(crate) const BUDGET_MAX_COLUMN: &str = "budget_max";
pub(crate) const PRICE_COLUMN: &str = "price";
pub(crate) const MISSING_ALLERGEN_COLUMN: &str = "missing_allergen_info";

/// Cuisine index reserved for cuisines never seen during training.
pub const OTHER_CUISINE_INDEX: u32 = 0;

/// The ordered column list and categorical vocabulary captured at training.
///
/// Column order: user allergy indicators, item allergen indicators, health
/// condition indicators (each family sorted by tag), then
/// `cuisine_encoded`, `budget_min`, `budget_max`, `price`,
/// `missing_allergen_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: Vec<String>,
    cuisines: Vec<String>,
    fingerprint: String,

    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl FeatureSchema {
    /// Fits the schema on the training population.
    ///
    /// Every distinct allergy, allergen and condition tag gets its own
    /// indicator column. Known cuisines are numbered `1..=n` in sorted
    /// order; index `0` is reserved for unseen cuisines.
    #[must_use]
    pub fn fit(users: &[UserProfile], items: &[&MenuItem], restaurants: &[&Restaurant]) -> Self {
        let allergies: BTreeSet<&str> = users.iter().flat_map(|u| u.allergies.iter()).collect();
        let allergens: BTreeSet<&str> = items.iter().flat_map(|i| i.allergens.tags().iter()).collect();
        let conditions: BTreeSet<&str> = users
            .iter()
            .flat_map(|u| u.health_conditions.iter())
            .collect();
        let cuisines: Vec<String> = restaurants
            .iter()
            .map(|r| normalize_cuisine(&r.cuisine_type))
            .collect();

        let mut columns: Vec<String> =
            Vec::with_capacity(allergies.len() + allergens.len() + conditions.len() + 5);
        columns.extend(allergies.iter().map(|t| format!("{ALLERGY_PREFIX}{t}")));
        columns.extend(allergens.iter().map(|t| format!("{ALLERGEN_PREFIX}{t}")));
        columns.extend(conditions.iter().map(|t| format!("{CONDITION_PREFIX}{t}")));
        columns.extend(
            [
                CUISINE_COLUMN,
                BUDGET_MIN_COLUMN,
                BUDGET_MAX_COLUMN,
                PRICE_COLUMN,
                MISSING_ALLERGEN_COLUMN,
            ]
            .into_iter()
            .map(str::to_string),
        );

        Self::from_parts(columns, cuisines)
    }

    /// Assembles a schema from an explicit column list and cuisine vocabulary.
    /// The vocabulary is normalized, sorted and deduplicated.
    #[must_use]
    pub fn from_parts(columns: Vec<String>, cuisines: Vec<String>) -> Self {
        let mut cuisines: Vec<String> = cuisines.iter().map(|c| normalize_cuisine(c)).collect();
        cuisines.sort();
        cuisines.dedup();
        let fingerprint = compute_fingerprint(&columns, &cuisines);
        let mut schema = Self {
            columns,
            cuisines,
            fingerprint,
            index: HashMap::new(),
        };
        schema.rebuild_index();
        schema
    }

    /// Rebuilds the column lookup after deserialization.
    pub(crate) fn rebuild_index(&mut self) {
        self.index = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
    }

    /// Ordered column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column, if present.
    #[must_use]
    pub fn position(&self, column: &str) -> Option<usize> {
        if self.index.len() == self.columns.len() {
            self.index.get(column).copied()
        } else {
            self.columns.iter().position(|c| c == column)
        }
    }

    /// Categorical index for a cuisine; unseen cuisines map to
    /// [`OTHER_CUISINE_INDEX`].
    #[must_use]
    pub fn cuisine_index(&self, cuisine: &str) -> u32 {
        let cuisine = normalize_cuisine(cuisine);
        self.cuisines
            .binary_search(&cuisine)
            .map_or(OTHER_CUISINE_INDEX, |i| u32::try_from(i + 1).unwrap_or(u32::MAX))
    }

    /// Known cuisines in index order (index 1 first).
    #[must_use]
    pub fn cuisines(&self) -> &[String] {
        &self.cuisines
    }

    /// Hex blake3 digest of the column list and cuisine vocabulary.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Recomputes the fingerprint and compares it with the stored one.
    #[must_use]
    pub fn verify_fingerprint(&self) -> Option<String> {
        let computed = compute_fingerprint(&self.columns, &self.cuisines);
        if computed == self.fingerprint {
            None
        } else {
            Some(computed)
        }
    }
}

impl PartialEq for FeatureSchema {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.columns == other.columns
            && self.cuisines == other.cuisines
    }
}

impl Eq for FeatureSchema {}

fn compute_fingerprint(columns: &[String], cuisines: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"columns\n");
    for column in columns {
        hasher.update(column.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(b"cuisines\n");
    for cuisine in cuisines {
        hasher.update(cuisine.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::BudgetRange;

    fn population() -> (Vec<UserProfile>, Vec<MenuItem>, Vec<Restaurant>) {
        let budget = BudgetRange::new(10, 40).unwrap();
        let users = vec![
            UserProfile::new("U1", budget).with_allergies(["shellfish"]),
            UserProfile::new("U2", budget)
                .with_allergies(["peanut"])
                .with_conditions(["celiac"]),
        ];
        let items = vec![
            MenuItem::new("M1", "R1", 12).with_allergens(["gluten", "dairy"]),
            MenuItem::new("M2", "R2", 30),
        ];
        let restaurants = vec![
            Restaurant::new("R1", "Malay", true),
            Restaurant::new("R2", "Chinese", false),
        ];
        (users, items, restaurants)
    }

    #[test]
    fn columns_follow_family_order() {
        let (users, items, restaurants) = population();
        let refs: Vec<&Restaurant> = restaurants.iter().collect();
        let items: Vec<&MenuItem> = items.iter().collect();
        let schema = FeatureSchema::fit(&users, &items, &refs);
        assert_eq!(
            schema.columns(),
            &[
                "allergy:peanut",
                "allergy:shellfish",
                "allergen:dairy",
                "allergen:gluten",
                "condition:celiac",
                "cuisine_encoded",
                "budget_min",
                "budget_max",
                "price",
                "missing_allergen_info",
            ]
        );
    }

    #[test]
    fn unseen_cuisine_maps_to_other() {
        let (users, items, restaurants) = population();
        let refs: Vec<&Restaurant> = restaurants.iter().collect();
        let items: Vec<&MenuItem> = items.iter().collect();
        let schema = FeatureSchema::fit(&users, &items, &refs);
        assert_eq!(schema.cuisine_index("chinese"), 1);
        assert_eq!(schema.cuisine_index("Malay"), 2);
        assert_eq!(schema.cuisine_index("thai"), OTHER_CUISINE_INDEX);
    }

    #[test]
    fn raw_cuisine_names_are_normalized_when_fitting() {
        let (users, items, _) = population();
        let items: Vec<&MenuItem> = items.iter().collect();
        let restaurant = Restaurant {
            id: crate::profile::RestaurantId::new("R9"),
            cuisine_type: " Malay ".to_string(),
            halal_certified: true,
        };
        let schema = FeatureSchema::fit(&users, &items, &[&restaurant]);
        assert_eq!(schema.cuisines(), &["malay".to_string()]);
        assert_eq!(schema.cuisine_index("MALAY"), 1);
    }

    #[test]
    fn fingerprint_tracks_columns() {
        let a = FeatureSchema::from_parts(vec!["a".into(), "b".into()], vec![]);
        let b = FeatureSchema::from_parts(vec!["b".into(), "a".into()], vec![]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert!(a.verify_fingerprint().is_none());
    }

    #[test]
    fn position_survives_serde_roundtrip() {
        let (users, items, restaurants) = population();
        let refs: Vec<&Restaurant> = restaurants.iter().collect();
        let items: Vec<&MenuItem> = items.iter().collect();
        let schema = FeatureSchema::fit(&users, &items, &refs);
        let json = serde_json::to_string(&schema).unwrap();
        let restored: FeatureSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.position("price"), schema.position("price"));
        assert_eq!(restored, schema);
    }
}
