//! Decision orchestration.
//!
//! A decision is taken in one of two states: `FALLBACK` (no usable
//! classifier, rules only) or `MODEL_BACKED` (classifier probability merged
//! with the rules). Both are explicit ordered tables of predicate/outcome
//! rows. A single-call classifier failure re-runs the fallback table in
//! `DEGRADED` mode.

mod table;

pub use table::{DecisionTable, ModelSignal};
