//! Deterministic safety rules.
//!
//! Rules read the raw profile and item attributes, never the encoded
//! feature vector, and never look at the classifier. A rule that does not
//! fire is evidence of "no conflict", not a verdict of "safe".

mod keywords;
mod predicates;

pub use keywords::KeywordMatcher;
pub use predicates::{RuleEngine, RuleFinding, SafetyRule};
