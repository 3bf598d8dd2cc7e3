//! Stage result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Stage;

/// Body of a section: either one block of text or a list of paragraphs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionContent {
    /// A single block of text.
    Text(String),
    /// Ordered paragraphs.
    Paragraphs(Vec<String>),
}

impl Default for SectionContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl SectionContent {
    /// Returns the content as paragraphs.
    #[must_use]
    pub fn paragraphs(&self) -> Vec<&str> {
        match self {
            Self::Text(text) => vec![text.as_str()],
            Self::Paragraphs(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// A labelled figure extracted by the formatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric name.
    pub label: String,
    /// Value as reported.
    pub value: String,
    /// Unit of measurement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// One titled section of a formatted result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Section heading.
    pub title: String,
    /// Section body.
    #[serde(default)]
    pub content: SectionContent,
    /// Section-level highlights.
    #[serde(default, alias = "keyPoints", skip_serializing_if = "Vec::is_empty")]
    pub key_points: Vec<String>,
    /// Figures mentioned in the section.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<Metric>,
}

impl Section {
    /// Creates a section with text content.
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: SectionContent::Text(content.into()),
            key_points: Vec::new(),
            metrics: Vec::new(),
        }
    }
}

/// Structured, presentation-ready form of a stage's raw output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormattedResult {
    /// Ordered sections.
    #[serde(default)]
    pub sections: Vec<Section>,
    /// Result-level highlights.
    #[serde(
        default,
        rename = "keyPoints",
        alias = "key_points",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub key_points: Vec<String>,
    /// Suggested next actions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
}

impl FormattedResult {
    /// Creates a result from sections.
    #[must_use]
    pub fn new(sections: Vec<Section>) -> Self {
        Self {
            sections,
            ..Default::default()
        }
    }

    /// Sets the key points.
    #[must_use]
    pub fn with_key_points(mut self, points: Vec<String>) -> Self {
        self.key_points = points;
        self
    }

    /// Sets the recommendations.
    #[must_use]
    pub fn with_recommendations(mut self, recommendations: Vec<String>) -> Self {
        self.recommendations = recommendations;
        self
    }

    /// Decodes whatever the formatting backend returned.
    ///
    /// Accepts the structure directly or as a JSON-encoded string. Text that
    /// is not a JSON object becomes a single "Raw Output" section, and an
    /// object without `sections` becomes a single "Analysis" section holding
    /// the pretty-printed payload.
    #[must_use]
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => match serde_json::from_str(&text) {
                Ok(parsed @ serde_json::Value::Object(_)) => Self::from_object(parsed),
                _ => Self::new(vec![Section::new("Raw Output", text)]),
            },
            other => Self::from_object(other),
        }
    }

    fn from_object(value: serde_json::Value) -> Self {
        if value.get("sections").is_some() {
            if let Ok(parsed) = serde_json::from_value::<Self>(value.clone()) {
                return parsed;
            }
        }
        let body = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        Self::new(vec![Section::new("Analysis", body)])
    }

    /// Returns the section titles in order.
    #[must_use]
    pub fn titles(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.title.as_str()).collect()
    }
}

/// The stored outcome of one completed stage.
///
/// Created once when the stage's pipeline succeeds and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage this result belongs to.
    pub stage: Stage,
    /// Raw process output. Absent when the stage completed through polling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    /// Structured output.
    pub formatted: FormattedResult,
    /// When the result was stored.
    pub completed_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a result stamped with the current time.
    #[must_use]
    pub fn new(stage: Stage, raw: Option<serde_json::Value>, formatted: FormattedResult) -> Self {
        Self {
            stage,
            raw,
            formatted,
            completed_at: Utc::now(),
        }
    }
}
