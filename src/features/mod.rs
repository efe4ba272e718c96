//! Feature encoding shared by training and inference.
//!
//! The [`FeatureSchema`] fixed at training time is the single source of
//! column order. Inference re-expands each record triple and reindexes it
//! onto that schema, so column drift between the two call sites cannot
//! happen.

mod encoder;
mod schema;

pub use encoder::{encode, FeatureVector};
pub use schema::{FeatureSchema, OTHER_CUISINE_INDEX};
