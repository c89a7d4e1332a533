//! Remote classifier capability.
//!
//! The adapter only talks to a [`RemoteClassifier`]; the HTTP client in
//! [`super::gemini`] is one implementation and tests supply fakes.

use crate::error::ClassifierError;
use crate::models::ColumnDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Column features sent to the remote classifier.
///
/// Never carries raw row data: only catalog metadata (name, declared type,
/// comment, key flags) and the sample shape digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureTuple {
    /// Correlation id echoed back in the response (the column fingerprint)
    #[serde(rename = "ref")]
    pub reference: String,
    /// Normalized column name
    pub name: String,
    /// Normalized declared type
    #[serde(rename = "type")]
    pub declared_type: String,
    /// Shape digest of sampled values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_digest: Option<String>,
    /// Catalog comment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_primary_key: bool,
    /// Primary key or single-column unique constraint
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_unique: bool,
}

impl FeatureTuple {
    /// Builds the tuple for a column under the given correlation id.
    pub fn for_column(reference: impl Into<String>, column: &ColumnDescriptor) -> Self {
        Self {
            reference: reference.into(),
            name: column.normalized_name(),
            declared_type: column.normalized_type(),
            sample_digest: column.sample_digest().map(|d| d.as_str().to_string()),
            comment: column.comment().map(str::to_string),
            is_primary_key: column.is_primary_key(),
            is_unique: column.is_unique(),
        }
    }
}

/// One classification as returned by the remote service.
///
/// Labels and confidences are unvalidated; the adapter checks them per
/// column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteLabel {
    /// Echo of [`FeatureTuple::reference`]
    #[serde(rename = "ref")]
    pub reference: String,
    /// Category label, parsed by the adapter
    pub category: String,
    /// Expected in `[0, 1]`; checked by the adapter
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `required` or `optional`
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
    /// One of the [`CollectionMethod`](super::CollectionMethod) labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_method: Option<String>,
    /// One of the [`DataSource`](super::DataSource) labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_basis: Option<String>,
    /// GDPR personal data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_data: Option<bool>,
    /// POPIA personal information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_information: Option<bool>,
}

impl RemoteLabel {
    /// Creates a label without annotations.
    pub fn new(reference: impl Into<String>, category: impl Into<String>, confidence: f64) -> Self {
        Self {
            reference: reference.into(),
            category: category.into(),
            confidence,
            description: None,
            requirement: None,
            collection_method: None,
            data_source: None,
            purpose: None,
            legal_basis: None,
            personal_data: None,
            personal_information: None,
        }
    }
}

/// Batch classification capability.
#[async_trait]
pub trait RemoteClassifier: Send + Sync {
    /// Classifies a batch of columns.
    ///
    /// The response may be partial or contain entries for unknown references;
    /// callers match entries to requests by `reference`.
    async fn classify(&self, batch: &[FeatureTuple]) -> Result<Vec<RemoteLabel>, ClassifierError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Classifier used when no remote service is configured.
///
/// Every call fails permanently, so unresolved columns become `unknown`.
#[derive(Debug, Clone)]
pub struct DisabledClassifier {
    reason: String,
}

impl DisabledClassifier {
    /// Creates a classifier that fails every call with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RemoteClassifier for DisabledClassifier {
    async fn classify(&self, _batch: &[FeatureTuple]) -> Result<Vec<RemoteLabel>, ClassifierError> {
        Err(ClassifierError::Disabled(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_tuple_wire_names() {
        let tuple = FeatureTuple {
            reference: "abc".into(),
            name: "nickname".into(),
            declared_type: "text".into(),
            ..FeatureTuple::default()
        };
        let json = serde_json::to_value(&tuple).unwrap();
        assert_eq!(json["ref"], "abc");
        assert_eq!(json["type"], "text");
        assert!(json.get("sample_digest").is_none());
        assert!(json.get("comment").is_none());
        assert!(json.get("is_primary_key").is_none());
    }

    #[test]
    fn test_feature_tuple_for_column_carries_catalog_context() {
        let column = ColumnDescriptor::new(
            crate::models::ColumnId::new("Users", " Login "),
            "VARCHAR(64)",
            false,
            2,
            None,
        )
        .with_comment(Some("Sign-in name".to_string()))
        .with_key_flags(false, true);

        let tuple = FeatureTuple::for_column("fp", &column);
        assert_eq!(tuple.name, "login");
        assert_eq!(tuple.declared_type, "varchar(64)");
        assert_eq!(tuple.comment.as_deref(), Some("Sign-in name"));
        assert!(tuple.is_unique);
        assert!(!tuple.is_primary_key);
        let json = serde_json::to_value(&tuple).unwrap();
        assert_eq!(json["is_unique"], true);
    }

    #[test]
    fn test_remote_label_optional_fields() {
        let label: RemoteLabel =
            serde_json::from_str(r#"{"ref":"abc","category":"non_personal","confidence":0.7}"#)
                .unwrap();
        assert_eq!(label, RemoteLabel::new("abc", "non_personal", 0.7));

        let annotated: RemoteLabel = serde_json::from_str(
            r#"{"ref":"abc","category":"quasi_identifier","confidence":0.6,
                "type":"Optional","collection_method":"USER_PROVIDED",
                "personal_information":true}"#,
        )
        .unwrap();
        assert_eq!(annotated.requirement.as_deref(), Some("Optional"));
        assert_eq!(annotated.collection_method.as_deref(), Some("USER_PROVIDED"));
        assert_eq!(annotated.personal_information, Some(true));
    }

    #[tokio::test]
    async fn test_disabled_classifier_fails_permanently() {
        let classifier = DisabledClassifier::new("GEMINI_API_KEY not set");
        let error = classifier.classify(&[]).await.unwrap_err();
        assert!(!error.is_transient());
        assert!(error.to_string().contains("GEMINI_API_KEY"));
        assert_eq!(classifier.name(), "disabled");
    }
}
