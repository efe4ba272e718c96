use regex::{Regex, RegexBuilder};

use crate::error::ConfigError;

/// Case-insensitive keyword search over free-text ingredients.
///
/// One matcher is compiled per allergen tag. Keywords match at the start
/// of a word, so `prawn` also catches `prawns` but `clam` does not fire
/// inside `reclaimed`.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    pattern: Option<Regex>,
}

impl KeywordMatcher {
    /// Compiles the keyword list. An empty list never matches.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidKeyword` if the combined pattern cannot
    /// be compiled.
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self, ConfigError> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Ok(Self { pattern: None });
        }

        let source = format!(r"\b(?:{})", alternatives.join("|"));
        let pattern = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::InvalidKeyword {
                keyword: alternatives.join(", "),
                reason: e.to_string(),
            })?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    /// Returns the first keyword found in `text`, lower-cased.
    #[must_use]
    pub fn find(&self, text: &str) -> Option<String> {
        self.pattern
            .as_ref()?
            .find(text)
            .map(|m| m.as_str().to_lowercase())
    }

    /// Returns true if `text` mentions any keyword.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(text))
    }
}
