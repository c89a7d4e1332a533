//! Classification result types.

use crate::models::ColumnId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Privacy-data-category assigned to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyCategory {
    /// Identifies a person on its own (email, national id, phone)
    DirectIdentifier,
    /// Identifies a person when combined with other data
    QuasiIdentifier,
    /// Special-category or otherwise sensitive personal data
    SensitiveAttribute,
    /// Not personal data
    NonPersonal,
    /// Could not be classified; needs manual review
    Unknown,
}

impl PrivacyCategory {
    /// All categories in report order.
    pub const ALL: [PrivacyCategory; 5] = [
        PrivacyCategory::DirectIdentifier,
        PrivacyCategory::QuasiIdentifier,
        PrivacyCategory::SensitiveAttribute,
        PrivacyCategory::NonPersonal,
        PrivacyCategory::Unknown,
    ];

    /// Stable label used in configuration, reports and the remote protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyCategory::DirectIdentifier => "direct_identifier",
            PrivacyCategory::QuasiIdentifier => "quasi_identifier",
            PrivacyCategory::SensitiveAttribute => "sensitive_attribute",
            PrivacyCategory::NonPersonal => "non_personal",
            PrivacyCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PrivacyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label that is not part of the category set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown privacy category label '{0}'")]
pub struct UnknownCategoryLabel(pub String);

impl FromStr for PrivacyCategory {
    type Err = UnknownCategoryLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = label_key(s);
        PrivacyCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == label)
            .ok_or_else(|| UnknownCategoryLabel(s.to_string()))
    }
}

/// Confidence score in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

/// Score outside `[0, 1]` or not a number.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Confidence {0} is outside [0.0, 1.0]")]
pub struct InvalidConfidence(pub f64);

impl Confidence {
    /// Zero confidence used for failure results.
    pub const ZERO: Confidence = Confidence(0.0);

    /// Creates a validated confidence.
    pub fn new(value: f64) -> Result<Self, InvalidConfidence> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidConfidence(value))
        }
    }

    /// Returns the raw score.
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = InvalidConfidence;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(confidence: Confidence) -> Self {
        confidence.0
    }
}

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    /// Deterministic rule match
    Rule,
    /// Remote AI classifier (fresh or served from cache)
    Ai,
}

impl std::fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassificationSource::Rule => f.write_str("rule"),
            ClassificationSource::Ai => f.write_str("ai"),
        }
    }
}

/// Annotation value outside its allowed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognized annotation value '{0}'")]
pub struct UnrecognizedAnnotation(pub String);

fn label_key(s: &str) -> String {
    s.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Fixed-vocabulary annotation enums: snake_case on the wire, lenient parsing.
macro_rules! annotation_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// All values in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Stable label used in reports and the remote protocol.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnrecognizedAnnotation;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let key = label_key(s);
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == key)
                    .ok_or_else(|| UnrecognizedAnnotation(s.to_string()))
            }
        }
    };
}

annotation_enum!(
    /// Whether the application requires the field.
    FieldRequirement {
        Required => "required",
        Optional => "optional",
    }
);

annotation_enum!(
    /// How the stored value is obtained.
    CollectionMethod {
        /// Entered by the data subject
        UserProvided => "user_provided",
        /// Produced by the subject's use of the system
        UserUsageGenerated => "user_usage_generated",
        /// Produced by the system while serving the subject
        SystemUsageGenerated => "system_usage_generated",
        /// Set by the system or an operator
        SystemSet => "system_set",
        /// Obtained from another party
        ThirdParty => "third_party",
    }
);

annotation_enum!(
    /// Whose data the column holds.
    DataSource {
        All => "all",
        Visitors => "visitors",
        RegisteredUsers => "registered_users",
        ThirdParty => "third_party",
    }
);

/// Privacy documentation hints returned by the AI classifier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrivacyAnnotations {
    /// What the column stores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Required or optional for the application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<FieldRequirement>,
    /// How the value is obtained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_method: Option<CollectionMethod>,
    /// Whose data the column holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
    /// Why the data is gathered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    /// Lawful basis for processing, as free text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_basis: Option<String>,
    /// Personal data under GDPR Article 4
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_data: Option<bool>,
    /// Personal information under POPIA Chapter 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_information: Option<bool>,
}

impl PrivacyAnnotations {
    /// True when no hint is present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Final, immutable classification of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    column: ColumnId,
    category: PrivacyCategory,
    confidence: Confidence,
    source: ClassificationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    annotations: Option<PrivacyAnnotations>,
}

impl ClassificationResult {
    /// Creates a rule-sourced result.
    pub fn from_rule(
        column: ColumnId,
        category: PrivacyCategory,
        confidence: Confidence,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            column,
            category,
            confidence,
            source: ClassificationSource::Rule,
            rule: Some(rule.into()),
            annotations: None,
        }
    }

    /// Creates an AI-sourced result.
    pub fn from_ai(
        column: ColumnId,
        category: PrivacyCategory,
        confidence: Confidence,
        annotations: Option<PrivacyAnnotations>,
    ) -> Self {
        Self {
            column,
            category,
            confidence,
            source: ClassificationSource::Ai,
            rule: None,
            annotations: annotations.filter(|a| !a.is_empty()),
        }
    }

    /// Creates the conservative `unknown` / 0 / `ai` result used on failure.
    pub fn unknown(column: ColumnId) -> Self {
        Self::from_ai(column, PrivacyCategory::Unknown, Confidence::ZERO, None)
    }

    /// Returns a copy of this result attributed to another column.
    ///
    /// Used when a cached classification is served for a column with the same
    /// fingerprint.
    pub fn for_column(&self, column: ColumnId) -> Self {
        Self {
            column,
            ..self.clone()
        }
    }

    /// Column this result belongs to.
    pub fn column(&self) -> &ColumnId {
        &self.column
    }

    /// Assigned category.
    pub fn category(&self) -> PrivacyCategory {
        self.category
    }

    /// Confidence score.
    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// Source tag.
    pub fn source(&self) -> ClassificationSource {
        self.source
    }

    /// Name of the matching rule for rule-sourced results.
    pub fn rule(&self) -> Option<&str> {
        self.rule.as_deref()
    }

    /// AI privacy annotations, if any.
    pub fn annotations(&self) -> Option<&PrivacyAnnotations> {
        self.annotations.as_ref()
    }

    /// True when the column needs manual review.
    pub fn is_unknown(&self) -> bool {
        self.category == PrivacyCategory::Unknown
    }
}
