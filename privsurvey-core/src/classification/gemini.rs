//! Generative Language API client.
//!
//! Sends one `generateContent` request per batch and asks the model for a
//! JSON array with one entry per column. Only feature tuples leave the
//! process; the API key travels in a header and never appears in logs or
//! errors.

use super::{CollectionMethod, DataSource, FieldRequirement, PrivacyCategory};
use super::remote::{FeatureTuple, RemoteClassifier, RemoteLabel};
use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

/// HTTPS client for Gemini models.
pub struct GeminiClassifier {
    client: Client,
    url: String,
    api_key: Zeroizing<String>,
    timeout_ms: u64,
}

impl std::fmt::Debug for GeminiClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClassifier")
            .field("url", &self.url)
            .field("api_key", &"****")
            .finish()
    }
}

impl GeminiClassifier {
    /// Creates a client for the configured endpoint and model.
    pub fn new(config: &ClassifierConfig, api_key: Zeroizing<String>) -> Result<Self, ClassifierError> {
        if api_key.trim().is_empty() {
            return Err(ClassifierError::Disabled("API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClassifierError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            config.endpoint.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client,
            url,
            api_key,
            timeout_ms: config.request_timeout_secs.saturating_mul(1000),
        })
    }

    fn map_transport_error(&self, error: reqwest::Error) -> ClassifierError {
        if error.is_timeout() {
            ClassifierError::Timeout(self.timeout_ms)
        } else {
            ClassifierError::Connection(error.without_url().to_string())
        }
    }
}

/// Maps a non-success HTTP status onto the classifier error taxonomy.
fn status_error(status: StatusCode) -> ClassifierError {
    let code = status.as_u16();
    match status {
        StatusCode::TOO_MANY_REQUESTS => ClassifierError::RateLimited,
        StatusCode::REQUEST_TIMEOUT => ClassifierError::Timeout(0),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ClassifierError::Authentication { status: code }
        }
        s if s.is_server_error() => ClassifierError::Server { status: code },
        _ => ClassifierError::Rejected { status: code },
    }
}

/// Builds the classification prompt for one batch.
pub fn build_prompt(batch: &[FeatureTuple]) -> Result<String, ClassifierError> {
    let columns = serde_json::to_string_pretty(batch)
        .map_err(|e| ClassifierError::Protocol(format!("Failed to encode batch: {}", e)))?;
    let categories = labels(PrivacyCategory::ALL.iter().map(PrivacyCategory::as_str));
    let requirements = labels(FieldRequirement::ALL.iter().map(FieldRequirement::as_str));
    let methods = labels(CollectionMethod::ALL.iter().map(CollectionMethod::as_str));
    let sources = labels(DataSource::ALL.iter().map(DataSource::as_str));

    Ok(format!(
        "You are a data protection analyst familiar with GDPR Article 4 and POPIA Chapter 1.\n\
         Classify each database column below by the kind of personal data it most likely stores.\n\
         You see the column name, its declared type, the catalog comment and key flags when\n\
         present, and a hash of the shapes of a few sample values; never actual values. Consider\n\
         common CMS/LMS schemas such as WordPress and Moodle, and prefer \"unknown\" over guessing.\n\
         \n\
         Allowed categories: {categories}\n\
         \n\
         Respond with a JSON array only. One object per column, in any order:\n\
         {{\"ref\": <ref from input>, \"category\": <allowed category>, \"confidence\": <0.0-1.0>,\n\
          \"description\": <what the column stores, max 30 words>,\n\
          \"requirement\": <one of {requirements}>,\n\
          \"collection_method\": <one of {methods}>,\n\
          \"data_source\": <one of {sources}>,\n\
          \"purpose\": <why the data is gathered, max 30 words>,\n\
          \"legal_basis\": <relevant GDPR/POPIA basis, max 20 words>,\n\
          \"personal_data\": <true|false, GDPR personal data>,\n\
          \"personal_information\": <true|false, POPIA personal information>}}\n\
         \n\
         Columns:\n{columns}\n"
    ))
}

fn labels<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values.collect::<Vec<_>>().join(", ")
}

/// Extracts labels from the model's text output.
///
/// Accepts a bare JSON array or one wrapped in a Markdown code fence. Entries
/// that do not decode are skipped; the adapter reports their columns as
/// unresolved.
pub fn parse_labels(text: &str) -> Result<Vec<RemoteLabel>, ClassifierError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let entries: Vec<serde_json::Value> = serde_json::from_str(body)
        .map_err(|e| ClassifierError::Protocol(format!("Response is not a JSON array: {}", e)))?;

    let total = entries.len();
    let labels: Vec<RemoteLabel> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    if labels.len() < total {
        tracing::debug!(
            "Skipped {} undecodable entries in classifier response",
            total - labels.len()
        );
    }
    Ok(labels)
}

#[async_trait]
impl RemoteClassifier for GeminiClassifier {
    async fn classify(&self, batch: &[FeatureTuple]) -> Result<Vec<RemoteLabel>, ClassifierError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(build_prompt(batch)?),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.0,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout(self.timeout_ms)
            } else {
                ClassifierError::Protocol(format!("Invalid response body: {}", e.without_url()))
            }
        })?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .ok_or_else(|| ClassifierError::Protocol("Response has no candidates".to_string()))?;

        parse_labels(&text)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(reference: &str, name: &str) -> FeatureTuple {
        FeatureTuple {
            reference: reference.into(),
            name: name.into(),
            declared_type: "text".into(),
            sample_digest: Some("d".into()),
            ..FeatureTuple::default()
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS),
            ClassifierError::RateLimited
        );
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED),
            ClassifierError::Authentication { status: 401 }
        );
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST),
            ClassifierError::Rejected { status: 400 }
        );
        assert!(!status_error(StatusCode::NOT_FOUND).is_transient());
    }

    #[test]
    fn test_prompt_contains_features_not_values() {
        let prompt = build_prompt(&[tuple("fp1", "nickname")]).unwrap();
        assert!(prompt.contains("\"ref\": \"fp1\""));
        assert!(prompt.contains("nickname"));
        assert!(prompt.contains("direct_identifier"));
        assert!(prompt.contains("non_personal"));
        assert!(prompt.contains("user_usage_generated"));
        assert!(prompt.contains("registered_users"));
        assert!(prompt.contains("personal_information"));
    }

    #[test]
    fn test_prompt_carries_comment_and_key_flags() {
        let batch = [FeatureTuple {
            comment: Some("Login handle".into()),
            is_unique: true,
            ..tuple("fp2", "handle")
        }];
        let prompt = build_prompt(&batch).unwrap();
        assert!(prompt.contains("\"comment\": \"Login handle\""));
        assert!(prompt.contains("\"is_unique\": true"));
        assert!(!prompt.contains("is_primary_key"));
    }

    #[test]
    fn test_parse_labels_plain_and_fenced() {
        let plain = r#"[{"ref":"a","category":"non_personal","confidence":0.8}]"#;
        assert_eq!(parse_labels(plain).unwrap().len(), 1);

        let fenced = "```json\n[{\"ref\":\"a\",\"category\":\"non_personal\",\"confidence\":0.8}]\n```";
        assert_eq!(parse_labels(fenced).unwrap()[0].reference, "a");
    }

    #[test]
    fn test_parse_labels_skips_bad_entries() {
        let text = r#"[
            {"ref":"a","category":"non_personal","confidence":0.8},
            {"ref":"b","category":"quasi_identifier"},
            "junk"
        ]"#;
        let labels = parse_labels(text).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].reference, "a");
    }

    #[test]
    fn test_parse_labels_rejects_non_array() {
        assert!(matches!(
            parse_labels("Column: email"),
            Err(ClassifierError::Protocol(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let classifier = GeminiClassifier::new(
            &ClassifierConfig::default(),
            Zeroizing::new("super-secret".to_string()),
        )
        .unwrap();
        let debug = format!("{:?}", classifier);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("gemini-1.5-flash:generateContent"));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let result = GeminiClassifier::new(&ClassifierConfig::default(), Zeroizing::new(" ".into()));
        assert!(matches!(result, Err(ClassifierError::Disabled(_))));
    }
}
