//! Rule set configuration.
//!
//! Rules are pure configuration: the engine in
//! [`crate::classification::rules`] only compiles and evaluates them.

use crate::classification::PrivacyCategory;
use serde::{Deserialize, Serialize};

/// One pattern → category rule.
///
/// Patterns are regular expressions evaluated against the normalized
/// (lowercase, unquoted) column name and declared type, so a plain word acts
/// as a substring match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Unique rule name, reported with rule-sourced results
    pub name: String,
    /// Pattern matched against the normalized column name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_pattern: Option<String>,
    /// Pattern matched against the normalized declared type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_pattern: Option<String>,
    /// Category assigned on match
    pub category: PrivacyCategory,
    /// Confidence assigned on match; must reach the high-confidence threshold
    pub confidence: f64,
}

impl RuleDefinition {
    /// Creates a rule matching on column name only.
    pub fn name_rule(
        name: impl Into<String>,
        pattern: impl Into<String>,
        category: PrivacyCategory,
        confidence: f64,
    ) -> Self {
        Self {
            name: name.into(),
            name_pattern: Some(pattern.into()),
            type_pattern: None,
            category,
            confidence,
        }
    }

    /// Builder method to add a declared type constraint.
    pub fn with_type_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.type_pattern = Some(pattern.into());
        self
    }
}

/// Rule engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Minimum confidence every rule must carry
    pub high_confidence_threshold: f64,
    /// Ordered rules; first match wins
    #[serde(rename = "rule")]
    pub rules: Vec<RuleDefinition>,
}

/// Textual column types; keeps name rules from firing on e.g. `email_verified_at`.
const TEXTUAL_TYPES: &str = "char|text|string|clob";

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 0.9,
            rules: vec![
                RuleDefinition::name_rule(
                    "email",
                    r"e_?mail",
                    PrivacyCategory::DirectIdentifier,
                    0.95,
                )
                .with_type_pattern(TEXTUAL_TYPES),
                RuleDefinition::name_rule(
                    "ssn",
                    r"(^|_)ssn($|_)|social_?security",
                    PrivacyCategory::DirectIdentifier,
                    0.95,
                ),
                RuleDefinition::name_rule(
                    "phone",
                    r"phone|telephone|mobile_?(no|num|number)",
                    PrivacyCategory::DirectIdentifier,
                    0.9,
                )
                .with_type_pattern(TEXTUAL_TYPES),
            ],
        }
    }
}

impl RulesConfig {
    /// Creates an empty rule set with the default threshold.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            ..Self::default()
        }
    }

    /// Builder method to set the high-confidence threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.high_confidence_threshold = threshold;
        self
    }

    /// Appends a rule after the existing ones.
    pub fn add_rule(mut self, rule: RuleDefinition) -> Self {
        self.rules.push(rule);
        self
    }
}
