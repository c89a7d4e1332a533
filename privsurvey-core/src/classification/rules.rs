//! Rule Engine: deterministic first pass over column names and types.
//!
//! Rules are precision-first. A match always carries a confidence at or
//! above the configured high-confidence threshold; anything weaker is left
//! to the remote classifier rather than guessed here.

use super::{ClassificationResult, Confidence, PrivacyCategory};
use crate::config::{RuleDefinition, RulesConfig};
use crate::error::RuleEngineError;
use crate::models::ColumnDescriptor;
use regex::Regex;
use std::collections::HashSet;

/// A validated rule with compiled patterns.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    name: String,
    name_pattern: Option<Regex>,
    type_pattern: Option<Regex>,
    category: PrivacyCategory,
    confidence: Confidence,
}

impl CompiledRule {
    fn compile(
        index: usize,
        definition: &RuleDefinition,
        threshold: f64,
    ) -> Result<Self, RuleEngineError> {
        let name = definition.name.trim();
        if name.is_empty() {
            return Err(RuleEngineError::EmptyName { index });
        }

        if definition.name_pattern.is_none() && definition.type_pattern.is_none() {
            return Err(RuleEngineError::MissingPattern {
                rule: name.to_string(),
            });
        }

        if definition.category == PrivacyCategory::Unknown {
            return Err(RuleEngineError::UnknownCategory {
                rule: name.to_string(),
            });
        }

        let confidence = Confidence::new(definition.confidence)
            .ok()
            .filter(|c| c.value() >= threshold)
            .ok_or_else(|| RuleEngineError::ConfidenceTooLow {
                rule: name.to_string(),
                confidence: definition.confidence,
                threshold,
            })?;

        Ok(Self {
            name: name.to_string(),
            name_pattern: compile_pattern(name, "name", definition.name_pattern.as_deref())?,
            type_pattern: compile_pattern(name, "type", definition.type_pattern.as_deref())?,
            category: definition.category,
            confidence,
        })
    }

    fn matches(&self, normalized_name: &str, normalized_type: &str) -> bool {
        let name_ok = self
            .name_pattern
            .as_ref()
            .is_none_or(|p| p.is_match(normalized_name));
        let type_ok = self
            .type_pattern
            .as_ref()
            .is_none_or(|p| p.is_match(normalized_type));
        name_ok && type_ok
    }

    /// Rule name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Category assigned on match.
    pub fn category(&self) -> PrivacyCategory {
        self.category
    }

    /// Confidence assigned on match.
    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// Source of the name pattern, if any.
    pub fn name_pattern(&self) -> Option<&str> {
        self.name_pattern.as_ref().map(Regex::as_str)
    }

    /// Source of the type pattern, if any.
    pub fn type_pattern(&self) -> Option<&str> {
        self.type_pattern.as_ref().map(Regex::as_str)
    }
}

fn compile_pattern(
    rule: &str,
    field: &'static str,
    pattern: Option<&str>,
) -> Result<Option<Regex>, RuleEngineError> {
    pattern
        .map(|p| {
            Regex::new(p).map_err(|source| RuleEngineError::InvalidPattern {
                rule: rule.to_string(),
                field,
                source,
            })
        })
        .transpose()
}

/// Ordered, compiled ruleset.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
    threshold: f64,
}

impl RuleEngine {
    /// Compiles and validates a ruleset.
    ///
    /// # Errors
    /// Returns [`RuleEngineError`] for any malformed rule; callers must abort
    /// the run before classification starts.
    pub fn new(config: &RulesConfig) -> Result<Self, RuleEngineError> {
        let threshold = config.high_confidence_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(RuleEngineError::InvalidThreshold(threshold));
        }

        let mut names = HashSet::new();
        let mut rules = Vec::with_capacity(config.rules.len());
        for (index, definition) in config.rules.iter().enumerate() {
            let rule = CompiledRule::compile(index, definition, threshold)?;
            if !names.insert(rule.name.clone()) {
                return Err(RuleEngineError::DuplicateName { rule: rule.name });
            }
            rules.push(rule);
        }

        tracing::debug!("Compiled {} classification rules", rules.len());
        Ok(Self { rules, threshold })
    }

    /// Classifies a column, or returns `None` when no rule matches.
    pub fn classify(&self, column: &ColumnDescriptor) -> Option<ClassificationResult> {
        let name = column.normalized_name();
        let declared_type = column.normalized_type();

        self.rules
            .iter()
            .find(|rule| rule.matches(&name, &declared_type))
            .map(|rule| {
                tracing::trace!("Column {} matched rule '{}'", column.id(), rule.name);
                ClassificationResult::from_rule(
                    column.id().clone(),
                    rule.category,
                    rule.confidence,
                    rule.name.clone(),
                )
            })
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Configured high-confidence threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}
