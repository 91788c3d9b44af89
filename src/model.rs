//! Core data model: documents, columns, extracted cells and the result table.
//!
//! A table is the cross product of user-selected documents (rows) and
//! user-defined columns. Each (document, column) pair owns at most one
//! [`ExtractionCell`]; re-extraction overwrites it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// MIME type used when the caller does not know the file type.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// How a document's bytes reach the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentPayload {
    /// Base64 content embedded in every request.
    Inline { data: String },
    /// A file previously registered with a remote store.
    Reference { uri: String },
}

/// A file selected by the user, ready to be sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub payload: DocumentPayload,
    /// Plain text recovered locally from Word documents, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

impl Document {
    /// Build an inline document with a fresh identifier.
    pub fn inline(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            mime_type: mime_type.into(),
            payload: DocumentPayload::Inline { data: data.into() },
            extracted_text: None,
        }
    }

    /// Build a by-reference document with a fresh identifier.
    pub fn reference(name: impl Into<String>, mime_type: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            mime_type: mime_type.into(),
            payload: DocumentPayload::Reference { uri: uri.into() },
            extracted_text: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == "application/pdf"
    }
}

/// Declared type of a column; selects the format instruction in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Date,
    Boolean,
    Number,
    List,
    /// Free text. Unknown type names deserialize to this variant.
    #[default]
    #[serde(other)]
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Date => "date",
            ColumnType::Boolean => "boolean",
            ColumnType::Number => "number",
            ColumnType::List => "list",
        }
    }
}

impl std::str::FromStr for ColumnType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "date" => ColumnType::Date,
            "boolean" | "bool" => ColumnType::Boolean,
            "number" => ColumnType::Number,
            "list" => ColumnType::List,
            _ => ColumnType::Text,
        })
    }
}

/// A user-defined field to extract from every document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
    /// Natural-language extraction instruction.
    #[serde(default)]
    pub prompt: String,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, prompt: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            column_type,
            prompt: prompt.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Self-reported reliability of an extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

impl Confidence {
    /// Case-insensitive parse; `None` for anything outside the three levels.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }
}

/// Human review state of a cell. Only `NeedsReview` is produced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    NeedsReview,
    Verified,
}

/// The result of applying one column's instruction to one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionCell {
    pub value: String,
    pub confidence: Confidence,
    pub quote: String,
    pub page: u32,
    pub reasoning: String,
    pub status: ReviewStatus,
}

impl Default for ExtractionCell {
    fn default() -> Self {
        Self {
            value: String::new(),
            confidence: Confidence::Low,
            quote: String::new(),
            page: 1,
            reasoning: String::new(),
            status: ReviewStatus::NeedsReview,
        }
    }
}

/// The full table: document id → column id → cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionResult(HashMap<String, HashMap<String, ExtractionCell>>);

impl ExtractionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the cell for a (document, column) pair.
    pub fn insert(
        &mut self,
        document_id: impl Into<String>,
        column_id: impl Into<String>,
        cell: ExtractionCell,
    ) -> Option<ExtractionCell> {
        self.0
            .entry(document_id.into())
            .or_default()
            .insert(column_id.into(), cell)
    }

    pub fn get(&self, document_id: &str, column_id: &str) -> Option<&ExtractionCell> {
        self.0.get(document_id).and_then(|row| row.get(column_id))
    }

    /// Drop every cell belonging to a removed document.
    pub fn remove_document(&mut self, document_id: &str) {
        self.0.remove(document_id);
    }

    /// Number of cells across all rows.
    pub fn len(&self) -> usize {
        self.0.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior message in the analysis chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_column_type_is_text() {
        let col: Column =
            serde_json::from_str(r#"{"id":"c","name":"Notes","type":"currency","prompt":"x"}"#)
                .unwrap();
        assert_eq!(col.column_type, ColumnType::Text);

        let known: ColumnType = serde_json::from_str(r#""text""#).unwrap();
        assert_eq!(known, ColumnType::Text);
        assert_eq!(serde_json::to_value(ColumnType::Text).unwrap(), "text");
        assert_eq!(serde_json::to_value(ColumnType::List).unwrap(), "list");
    }

    #[test]
    fn column_type_round_names() {
        let col: Column =
            serde_json::from_str(r#"{"id":"c","name":"Due","type":"date"}"#).unwrap();
        assert_eq!(col.column_type, ColumnType::Date);
        assert_eq!(col.prompt, "");
        assert_eq!("BOOLEAN".parse::<ColumnType>().unwrap(), ColumnType::Boolean);
    }

    #[test]
    fn confidence_parse_is_case_insensitive() {
        assert_eq!(Confidence::parse("high"), Some(Confidence::High));
        assert_eq!(Confidence::parse(" Medium "), Some(Confidence::Medium));
        assert_eq!(Confidence::parse("certain"), None);
    }

    #[test]
    fn default_cell_needs_review() {
        let cell = ExtractionCell::default();
        assert_eq!(cell.value, "");
        assert_eq!(cell.confidence, Confidence::Low);
        assert_eq!(cell.page, 1);
        assert_eq!(cell.status, ReviewStatus::NeedsReview);
        let json = serde_json::to_value(&cell).unwrap();
        assert_eq!(json["status"], "needs_review");
        assert_eq!(json["confidence"], "Low");
    }

    #[test]
    fn result_insert_overwrites() {
        let mut table = ExtractionResult::new();
        table.insert("d1", "c1", ExtractionCell::default());
        let prev = table.insert(
            "d1",
            "c1",
            ExtractionCell {
                value: "42".into(),
                ..Default::default()
            },
        );
        assert!(prev.is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("d1", "c1").unwrap().value, "42");
        assert!(table.get("d1", "c2").is_none());

        table.remove_document("d1");
        assert!(table.is_empty());
    }

    #[test]
    fn document_kind_helpers() {
        let pdf = Document::inline("a.pdf", "application/pdf", "AAAA");
        let png = Document::inline("a.png", "image/png", "AAAA");
        assert!(pdf.is_pdf() && !pdf.is_image());
        assert!(png.is_image() && !png.is_pdf());
        assert_ne!(pdf.id, png.id);
    }
}
