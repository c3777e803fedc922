use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token/cost accounting for one or more generation calls.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
}

impl Usage {
    pub fn absorb(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        self.cost += other.cost;
    }
}

/// One structural unit of parsed chapter content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockKind {
    Heading1,
    Heading2,
    Heading3,
    Paragraph,
    Quote,
    UnorderedList,
    OrderedList,
}

/// A flat content block. Inline bold/italic is encoded with `**`/`*`
/// markers in `text`; renderers re-expand them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub text: String,
}

impl Block {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Block {
            kind,
            text: text.into(),
        }
    }
}

/// Chapter as sent over the wire for export and sharing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterPayload {
    pub title: String,
    pub content: String,
    pub order: u32,
}

/// Book as sent over the wire for export and sharing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookPayload {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub chapters: Vec<ChapterPayload>,
}

/// A published share-link entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedBook {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub chapters: Vec<ChapterPayload>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A standalone writing project (single body of text).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An ordered chapter inside a book. `order` is unique and contiguous
/// within its book; the library renumbers on delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub content: String,
    pub order: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A multi-chapter book.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub chapters: Vec<Chapter>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One prompt/response exchange recorded in a project's memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub response: String,
    pub tokens: u64,
    pub cost: f64,
}

/// Rolling per-project log of past exchanges, used to build follow-up
/// context. Capped at 50 entries, oldest evicted first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMemory {
    pub project_id: String,
    pub conversations: Vec<Conversation>,
    pub context: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditUsage {
    pub tokens: u64,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

/// Scores returned by the quality-check model, 0-100 each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub coherence: u32,
    pub syntax: u32,
    pub readability: u32,
    pub suggestions: Vec<String>,
}

/// Content-type profile selector for guided generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Article,
    Essay,
    Blog,
    Story,
}
