//! Report sinks.
//!
//! A sink serializes a finished [`Report`] to a file. The JSON sink validates
//! the report against the embedded JSON Schema and the credential scan before
//! anything touches the disk.

use askama::Template;
use async_trait::async_trait;
use privsurvey_core::report::ColumnReport;
use privsurvey_core::{PrivSurveyError, Report, Result, validate_report_output};
use std::path::{Path, PathBuf};
use tracing::info;

/// Output format for the classification report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    /// Machine-readable JSON
    Json,
    /// Human-readable Markdown
    Markdown,
}

impl ReportFormat {
    /// Picks a format from the output file extension; JSON by default.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown") => {
                Self::Markdown
            }
            _ => Self::Json,
        }
    }
}

/// Destination for a finished report.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Writes the report.
    ///
    /// # Errors
    /// Returns an error if the report fails validation, cannot be rendered or
    /// cannot be written.
    async fn write(&self, report: &Report) -> Result<()>;

    /// Where the report goes.
    fn destination(&self) -> &Path;
}

/// Creates the sink for `format` writing to `path`.
pub fn create_sink(format: ReportFormat, path: impl Into<PathBuf>) -> Box<dyn ReportSink> {
    let path = path.into();
    match format {
        ReportFormat::Json => Box::new(JsonReportSink::new(path)),
        ReportFormat::Markdown => Box::new(MarkdownReportSink::new(path)),
    }
}

/// Writes the report as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    /// Sink writing pretty-printed JSON to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Serializes and validates the report.
    ///
    /// # Errors
    /// Returns a serialization or validation error.
    pub fn render(report: &Report) -> Result<String> {
        let json_value = serde_json::to_value(report).map_err(|e| PrivSurveyError::Serialization {
            context: "Failed to serialize report".to_string(),
            source: e,
        })?;

        validate_report_output(&json_value)?;
        info!("Output validation passed");

        serde_json::to_string_pretty(&json_value).map_err(|e| PrivSurveyError::Serialization {
            context: "Failed to serialize report".to_string(),
            source: e,
        })
    }
}

#[async_trait]
impl ReportSink for JsonReportSink {
    async fn write(&self, report: &Report) -> Result<()> {
        let json_data = Self::render(report)?;
        write_file(&self.path, json_data).await
    }

    fn destination(&self) -> &Path {
        &self.path
    }
}

struct ColumnRow {
    name: String,
    declared_type: String,
    category: String,
    confidence: String,
    source: String,
    notes: String,
    review: &'static str,
}

struct TableView {
    name: String,
    rows: Vec<ColumnRow>,
}

#[derive(Template)]
#[template(path = "report.md", escape = "none")]
struct MarkdownReport<'a> {
    report: &'a Report,
    generated_at: String,
    categories: Vec<(String, usize)>,
    tables: Vec<TableView>,
    review: Vec<String>,
}

/// Markdown table cells cannot contain raw pipes or newlines.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn column_notes(column: &ColumnReport) -> Vec<String> {
    let result = &column.classification;
    let mut notes: Vec<String> = Vec::new();
    if column.is_primary_key {
        notes.push("primary key".to_string());
    } else if column.is_unique {
        notes.push("unique".to_string());
    }
    if let Some(rule) = result.rule() {
        notes.push(format!("rule `{}`", rule));
    }
    if let Some(comment) = &column.comment {
        notes.push(format!("Comment: {}", comment));
    }
    if let Some(annotations) = result.annotations() {
        if let Some(description) = &annotations.description {
            notes.push(description.clone());
        }
        if let Some(requirement) = annotations.requirement {
            notes.push(format!("Type: {}", requirement));
        }
        if let Some(method) = annotations.collection_method {
            notes.push(format!("Collected: {}", method));
        }
        if let Some(source) = annotations.data_source {
            notes.push(format!("Source: {}", source));
        }
        if let Some(purpose) = &annotations.purpose {
            notes.push(format!("Purpose: {}", purpose));
        }
        if let Some(basis) = &annotations.legal_basis {
            notes.push(format!("Basis: {}", basis));
        }
        if let Some(flag) = annotations.personal_data {
            notes.push(format!("GDPR personal data: {}", yes_no(flag)));
        }
        if let Some(flag) = annotations.personal_information {
            notes.push(format!("POPIA personal information: {}", yes_no(flag)));
        }
    }
    notes
}

impl<'a> MarkdownReport<'a> {
    fn new(report: &'a Report) -> Self {
        let tables = report
            .tables
            .iter()
            .map(|table| TableView {
                name: cell(&table.table_name),
                rows: table
                    .columns
                    .iter()
                    .map(|column| {
                        let result = &column.classification;
                        let notes = column_notes(column);
                        ColumnRow {
                            name: cell(&column.column),
                            declared_type: cell(&column.declared_type),
                            category: result.category().as_str().to_string(),
                            confidence: format!("{:.2}", result.confidence().value()),
                            source: result.source().to_string(),
                            notes: cell(&notes.join("; ")),
                            review: if column.needs_review { "yes" } else { "" },
                        }
                    })
                    .collect(),
            })
            .collect();

        Self {
            report,
            generated_at: report.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            categories: report
                .summary
                .by_category
                .iter()
                .map(|(category, count)| (category.clone(), *count))
                .collect(),
            tables,
            review: report.needs_review().map(ToString::to_string).collect(),
        }
    }
}

/// Renders the report as Markdown documentation.
#[derive(Debug, Clone)]
pub struct MarkdownReportSink {
    path: PathBuf,
}

impl MarkdownReportSink {
    /// Sink writing Markdown to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Renders the report to a Markdown string.
    ///
    /// # Errors
    /// Returns a report error if the template fails to render.
    pub fn render(report: &Report) -> Result<String> {
        MarkdownReport::new(report)
            .render()
            .map_err(|e| PrivSurveyError::report(format!("Failed to render Markdown report: {}", e)))
    }
}

#[async_trait]
impl ReportSink for MarkdownReportSink {
    async fn write(&self, report: &Report) -> Result<()> {
        let markdown = Self::render(report)?;
        write_file(&self.path, markdown).await
    }

    fn destination(&self) -> &Path {
        &self.path
    }
}

async fn write_file(path: &Path, contents: String) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            PrivSurveyError::io(format!("Failed to create {}", parent.display()), e)
        })?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| PrivSurveyError::io(format!("Failed to write to {}", path.display()), e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use privsurvey_core::classification::{
        ClassificationResult, CollectionMethod, Confidence, DataSource, FieldRequirement,
        PrivacyAnnotations, PrivacyCategory,
    };
    use privsurvey_core::models::{ColumnDescriptor, ColumnId};
    use privsurvey_core::report::{ColumnReport, RunCounters, TableSection};

    fn sample_report() -> Report {
        let email = ColumnDescriptor::new(ColumnId::new("users", "email"), "text", false, 1, None)
            .with_comment(Some("Login address".to_string()))
            .with_key_flags(false, true);
        let bio = ColumnDescriptor::new(ColumnId::new("users", "bio"), "text", true, 2, None);
        let login =
            ColumnDescriptor::new(ColumnId::new("users", "last_login"), "timestamp", true, 3, None);
        Report::new(
            "app",
            vec![TableSection {
                table_name: "users".into(),
                columns: vec![
                    ColumnReport::new(
                        &email,
                        ClassificationResult::from_rule(
                            email.id().clone(),
                            PrivacyCategory::DirectIdentifier,
                            Confidence::new(0.95).unwrap(),
                            "email",
                        ),
                    ),
                    ColumnReport::new(
                        &bio,
                        ClassificationResult::from_ai(
                            bio.id().clone(),
                            PrivacyCategory::SensitiveAttribute,
                            Confidence::new(0.6).unwrap(),
                            Some(PrivacyAnnotations {
                                description: Some("Free text | may mention health".into()),
                                requirement: Some(FieldRequirement::Optional),
                                collection_method: Some(CollectionMethod::UserProvided),
                                data_source: Some(DataSource::RegisteredUsers),
                                purpose: Some("Profile display".into()),
                                legal_basis: Some("GDPR Art. 9".into()),
                                personal_data: Some(true),
                                personal_information: Some(true),
                            }),
                        ),
                    ),
                    ColumnReport::new(&login, ClassificationResult::unknown(login.id().clone())),
                ],
            }],
            Vec::new(),
            RunCounters::default(),
        )
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ReportFormat::from_path(Path::new("out.md")), ReportFormat::Markdown);
        assert_eq!(ReportFormat::from_path(Path::new("out.JSON")), ReportFormat::Json);
        assert_eq!(ReportFormat::from_path(Path::new("out")), ReportFormat::Json);
    }

    #[test]
    fn test_markdown_render() {
        let markdown = MarkdownReportSink::render(&sample_report()).unwrap();
        assert!(markdown.contains("# Privacy classification: app"));
        assert!(markdown.contains("## users"));
        assert!(markdown.contains("| email | text | direct_identifier | 0.95 | rule |"));
        assert!(markdown.contains("Free text \\| may mention health"));
        assert!(markdown.contains("GDPR Art. 9"));
        assert!(markdown.contains("unique; rule `email`; Comment: Login address"));
        assert!(markdown.contains("Type: optional"));
        assert!(markdown.contains("Collected: user_provided"));
        assert!(markdown.contains("Source: registered_users"));
        assert!(markdown.contains("Purpose: Profile display"));
        assert!(markdown.contains("GDPR personal data: yes"));
        assert!(markdown.contains("POPIA personal information: yes"));
        assert!(markdown.contains("- `users.last_login`"));
    }

    #[test]
    fn test_json_render_validates() {
        let json = JsonReportSink::render(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["format_version"], "1.0");
        assert_eq!(value["summary"]["total_columns"], 3);
    }

    #[tokio::test]
    async fn test_file_sinks_write() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();

        let json_path = dir.path().join("nested").join("report.json");
        let sink = create_sink(ReportFormat::Json, &json_path);
        sink.write(&report).await.unwrap();
        assert_eq!(sink.destination(), json_path.as_path());
        assert!(json_path.exists());

        let md_path = dir.path().join("report.md");
        create_sink(ReportFormat::Markdown, &md_path)
            .write(&report)
            .await
            .unwrap();
        let contents = std::fs::read_to_string(&md_path).unwrap();
        assert!(contents.contains("## Needs review"));
    }
}
