use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EncodingError;
use crate::features::schema::{
    ALLERGEN_PREFIX, ALLERGY_PREFIX, BUDGET_MAX_COLUMN, BUDGET_MIN_COLUMN, CONDITION_PREFIX,
    CUISINE_COLUMN, MISSING_ALLERGEN_COLUMN, PRICE_COLUMN,
};
use crate::features::FeatureSchema;
use crate::profile::{MenuItem, Restaurant, UserProfile};

/// Dense feature row aligned to a [`FeatureSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    /// Values in schema column order.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the vector is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Encodes a (user, item, restaurant) triple onto `schema`.
///
/// The triple is first expanded into its own named columns, then reindexed
/// to the schema: columns the triple does not produce are zero, and
/// columns the schema does not know (tags unseen at training) are dropped.
/// The output length always equals `schema.len()`.
///
/// # Errors
///
/// - `EncodingError::RestaurantMismatch` if `item` does not belong to `restaurant`.
/// - `EncodingError::EmptySchema` if the schema has no columns.
pub fn encode(
    user: &UserProfile,
    item: &MenuItem,
    restaurant: &Restaurant,
    schema: &FeatureSchema,
) -> Result<FeatureVector, EncodingError> {
    if item.restaurant_id != restaurant.id {
        return Err(EncodingError::RestaurantMismatch {
            expected: item.restaurant_id.clone(),
            actual: restaurant.id.clone(),
        });
    }
    if schema.is_empty() {
        return Err(EncodingError::EmptySchema);
    }

    let expanded = expand(user, item, restaurant, schema);
    let values = schema
        .columns()
        .iter()
        .map(|column| expanded.get(column.as_str()).copied().unwrap_or(0.0))
        .collect();
    Ok(FeatureVector(values))
}

fn expand(
    user: &UserProfile,
    item: &MenuItem,
    restaurant: &Restaurant,
    schema: &FeatureSchema,
) -> HashMap<String, f64> {
    let mut columns = HashMap::new();
    for tag in user.allergies.iter() {
        columns.insert(format!("{ALLERGY_PREFIX}{tag}"), 1.0);
    }
    for tag in item.allergens.tags().iter() {
        columns.insert(format!("{ALLERGEN_PREFIX}{tag}"), 1.0);
    }
    for tag in user.health_conditions.iter() {
        columns.insert(format!("{CONDITION_PREFIX}{tag}"), 1.0);
    }

    let missing = if item.allergens.is_missing() { 1.0 } else { 0.0 };
    columns.insert(
        CUISINE_COLUMN.to_string(),
        f64::from(schema.cuisine_index(&restaurant.cuisine_type)),
    );
    columns.insert(BUDGET_MIN_COLUMN.to_string(), f64::from(user.budget.min()));
    columns.insert(BUDGET_MAX_COLUMN.to_string(), f64::from(user.budget.max()));
    columns.insert(PRICE_COLUMN.to_string(), f64::from(item.price));
    columns.insert(MISSING_ALLERGEN_COLUMN.to_string(), missing);
    columns
}
