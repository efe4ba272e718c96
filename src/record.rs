//! Parsing boundary for collaborator store rows.
//!
//! Profile and menu stores hand over string-typed rows: tag lists are
//! `_`-delimited, `none` is a sentinel for "no entries", and budgets are
//! encoded as `min-max`. This module turns those rows into the typed
//! records of [`crate::profile`], or a [`DataError`] when a required field
//! is structurally missing.

use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::profile::{
    AllergenInfo, BudgetRange, ItemId, MenuItem, Restaurant, RestaurantId, SafetyStatus, TagSet,
    UserId, UserProfile,
};

/// Sentinel used by the stores for an explicitly empty list.
pub const NONE_SENTINEL: &str = "none";

/// Separator between tags in store encodings.
pub const TAG_SEPARATOR: char = '_';

/// A user row as exported by the profile store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// `user_id` column.
    pub user_id: Option<String>,
    /// `_`-delimited allergies, or `none`.
    pub allergies: Option<String>,
    /// `_`-delimited conditions, or `none`.
    pub health_conditions: Option<String>,
    /// Budget as `min-max`.
    pub budget_range_myr: Option<String>,
    /// `_`-delimited restrictions, or `none`.
    pub dietary_restrictions: Option<String>,
}

/// A menu row as exported by the menu store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuRecord {
    /// `menu_id` column.
    pub menu_id: Option<String>,
    /// Owning restaurant.
    pub restaurant_id: Option<String>,
    /// `_`-delimited allergens, `none`, or absent when undeclared.
    pub allergens: Option<String>,
    /// Cleaned ingredient text.
    pub ingredients_clean: Option<String>,
    /// Price.
    pub price_myr: Option<u32>,
    /// `VERIFIED`, `POTENTIAL_RISK` or anything else.
    pub safety_status: Option<String>,
}

/// A restaurant row as exported by the restaurant store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantRecord {
    /// Owning restaurant.
    pub restaurant_id: Option<String>,
    /// Cuisine name.
    pub cuisine_type: Option<String>,
    /// Halal certification flag.
    pub halal_certified: Option<bool>,
}

/// Splits a store-encoded tag list.
///
/// Absent, blank and `none` values all yield an empty set. Multi-word tags
/// such as `celiac_disease` cannot be told apart from two tags, so the
/// stores are expected to use single-word tags; condition matching works
/// on substrings to compensate.
#[must_use]
pub fn split_tags(raw: Option<&str>) -> TagSet {
    match raw.map(str::trim) {
        None | Some("") => TagSet::new(),
        Some(s) if s.eq_ignore_ascii_case(NONE_SENTINEL) => TagSet::new(),
        Some(s) => s.split(TAG_SEPARATOR).collect(),
    }
}

/// Parses item allergens. Absent, blank and `none` are all `Unknown`.
#[must_use]
pub fn parse_allergens(raw: Option<&str>) -> AllergenInfo {
    let tags = split_tags(raw);
    if tags.is_empty() {
        AllergenInfo::Unknown
    } else {
        AllergenInfo::Listed(tags)
    }
}

/// Parses a `min-max` budget string.
///
/// # Errors
///
/// Returns `DataError::MalformedBudget` if the string is not two
/// non-negative integers joined by `-`, and `DataError::InvertedBudget`
/// if `min > max`.
pub fn parse_budget(raw: &str) -> Result<BudgetRange, DataError> {
    let malformed = || DataError::MalformedBudget {
        raw: raw.to_string(),
    };
    let (min, max) = raw.trim().split_once('-').ok_or_else(malformed)?;
    let min: u32 = min.trim().parse().map_err(|_| malformed())?;
    let max: u32 = max.trim().parse().map_err(|_| malformed())?;
    BudgetRange::new(min, max).ok_or(DataError::InvertedBudget { min, max })
}

fn required<'a>(
    value: Option<&'a str>,
    record: &'static str,
    field: &'static str,
) -> Result<&'a str, DataError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DataError::MissingField { record, field }),
    }
}

impl TryFrom<&UserRecord> for UserProfile {
    type Error = DataError;

    fn try_from(record: &UserRecord) -> Result<Self, Self::Error> {
        let id = required(record.user_id.as_deref(), "user", "user_id")?;
        let budget = required(record.budget_range_myr.as_deref(), "user", "budget_range_myr")?;
        Ok(Self {
            id: UserId::new(id),
            allergies: split_tags(record.allergies.as_deref()),
            health_conditions: split_tags(record.health_conditions.as_deref()),
            budget: parse_budget(budget)?,
            dietary_restrictions: split_tags(record.dietary_restrictions.as_deref()),
        })
    }
}

impl TryFrom<&MenuRecord> for MenuItem {
    type Error = DataError;

    fn try_from(record: &MenuRecord) -> Result<Self, Self::Error> {
        let id = required(record.menu_id.as_deref(), "menu", "menu_id")?;
        let restaurant = required(record.restaurant_id.as_deref(), "menu", "restaurant_id")?;
        let price = record.price_myr.ok_or(DataError::MissingField {
            record: "menu",
            field: "price_myr",
        })?;
        Ok(Self {
            id: ItemId::new(id),
            restaurant_id: RestaurantId::new(restaurant),
            allergens: parse_allergens(record.allergens.as_deref()),
            ingredients: record.ingredients_clean.clone().unwrap_or_default(),
            price,
            safety_status: record
                .safety_status
                .as_deref()
                .map_or(SafetyStatus::Unknown, SafetyStatus::parse),
        })
    }
}

impl TryFrom<&RestaurantRecord> for Restaurant {
    type Error = DataError;

    fn try_from(record: &RestaurantRecord) -> Result<Self, Self::Error> {
        let id = required(record.restaurant_id.as_deref(), "restaurant", "restaurant_id")?;
        let cuisine = required(record.cuisine_type.as_deref(), "restaurant", "cuisine_type")?;
        Ok(Self::new(id, cuisine, record.halal_certified.unwrap_or(false)))
    }
}
