//! Attribute: the unit of accumulation
//!
//! An attribute holds the canonical, consolidated `data` for one field of
//! one entity plus a `buffer` of raw fragments appended since the last
//! consolidation. `data` only changes through [`Attribute::consolidate`],
//! which is all-or-nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Semantic type of an attribute's `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum AttributeKind {
    /// Markdown-formatted free text
    Text,
    /// One value out of a fixed set of options
    Choice(Vec<String>),
    /// Ordered list of distinct items
    List,
}

impl AttributeKind {
    /// Short label shown to the agent in operation descriptors.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Choice(_) => "choice",
            Self::List => "list",
        }
    }

    /// Whether `value` has the shape this kind requires.
    pub fn accepts(&self, value: &AttributeValue) -> bool {
        match (self, value) {
            (Self::Text, AttributeValue::Text(_)) => true,
            (Self::List, AttributeValue::List(_)) => true,
            (Self::Choice(options), AttributeValue::Text(s)) => options.iter().any(|o| o == s),
            _ => false,
        }
    }

    /// Whether a single buffered fragment is acceptable for this kind.
    pub fn accepts_fragment(&self, fragment: &str) -> bool {
        match self {
            Self::Choice(options) => options.iter().any(|o| o == fragment),
            Self::Text | Self::List => true,
        }
    }
}

/// How buffered fragments are folded into `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Rewrite via the consolidation agent
    Agent,
    /// Append buffered items to a list, skipping ones already present
    Union,
    /// The last buffered fragment replaces the data
    Latest,
}

impl MergeStrategy {
    pub fn needs_agent(&self) -> bool {
        matches!(self, Self::Agent)
    }
}

/// Canonical value of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    List(Vec<String>),
}

impl AttributeValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn empty_list() -> Self {
        Self::List(Vec::new())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            Self::Text(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::List(items) => items.is_empty(),
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::List(items) => write!(f, "{}", items.join("; ")),
        }
    }
}

/// Why a consolidation did not commit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsolidationError {
    #[error("merge failed: {0}")]
    MergeFailed(String),

    #[error("merged value does not match attribute kind '{expected}'")]
    KindMismatch { expected: &'static str },
}

/// One named field of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    kind: AttributeKind,
    description: String,
    #[serde(default)]
    update_prompt: String,
    default: AttributeValue,
    update_every_n_insertions: u32,
    merge: MergeStrategy,
    data: AttributeValue,
    #[serde(default)]
    buffer: Vec<String>,
    #[serde(default)]
    pending_count: u32,
    #[serde(default)]
    last_consolidated_at: Option<DateTime<Utc>>,
}

impl Attribute {
    /// Create an attribute holding its default value and an empty buffer.
    ///
    /// A cadence of zero is clamped to one.
    pub fn new(
        name: impl Into<String>,
        kind: AttributeKind,
        description: impl Into<String>,
        default: AttributeValue,
        update_every_n_insertions: u32,
        merge: MergeStrategy,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            update_prompt: String::new(),
            data: default.clone(),
            default,
            update_every_n_insertions: update_every_n_insertions.max(1),
            merge,
            buffer: Vec::new(),
            pending_count: 0,
            last_consolidated_at: None,
        }
    }

    pub fn with_update_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.update_prompt = prompt.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn update_prompt(&self) -> &str {
        &self.update_prompt
    }

    pub fn default_value(&self) -> &AttributeValue {
        &self.default
    }

    pub fn update_every_n_insertions(&self) -> u32 {
        self.update_every_n_insertions
    }

    pub fn merge_strategy(&self) -> MergeStrategy {
        self.merge
    }

    pub fn data(&self) -> &AttributeValue {
        &self.data
    }

    pub fn buffer(&self) -> &[String] {
        &self.buffer
    }

    pub fn pending_count(&self) -> u32 {
        self.pending_count
    }

    pub fn last_consolidated_at(&self) -> Option<DateTime<Utc>> {
        self.last_consolidated_at
    }

    /// Append a raw fragment. Never fails; returns whether consolidation is now due.
    pub fn append_to_buffer(&mut self, fragment: impl Into<String>) -> bool {
        self.buffer.push(fragment.into());
        self.pending_count += 1;
        self.consolidation_due()
    }

    pub fn consolidation_due(&self) -> bool {
        self.pending_count >= self.update_every_n_insertions
    }

    /// Fold the buffer into `data` using `merge(data, buffer)`.
    ///
    /// Commits only if `merge` succeeds and returns a value of the right
    /// kind; otherwise `data`, `buffer` and `pending_count` are untouched.
    pub fn consolidate<F, E>(&mut self, merge: F) -> Result<(), ConsolidationError>
    where
        F: FnOnce(&AttributeValue, &[String]) -> Result<AttributeValue, E>,
        E: std::fmt::Display,
    {
        let merged = merge(&self.data, &self.buffer)
            .map_err(|e| ConsolidationError::MergeFailed(e.to_string()))?;

        if !self.kind.accepts(&merged) {
            return Err(ConsolidationError::KindMismatch {
                expected: self.kind.label(),
            });
        }

        self.data = merged;
        self.buffer.clear();
        self.pending_count = 0;
        self.last_consolidated_at = Some(Utc::now());
        Ok(())
    }

    /// Merge locally for strategies that need no agent.
    ///
    /// Returns `None` for [`MergeStrategy::Agent`].
    pub fn local_merge(&self) -> Option<Result<AttributeValue, ConsolidationError>> {
        match self.merge {
            MergeStrategy::Agent => None,
            MergeStrategy::Union => Some(union_merge(&self.data, &self.buffer)),
            MergeStrategy::Latest => Some(Ok(latest_merge(&self.kind, &self.data, &self.buffer))),
        }
    }

    /// Replace `data` wholesale, used when importing rendered pages.
    pub(crate) fn restore_data(&mut self, value: AttributeValue) -> Result<(), ConsolidationError> {
        if !self.kind.accepts(&value) && value != self.default {
            return Err(ConsolidationError::KindMismatch {
                expected: self.kind.label(),
            });
        }
        self.data = value;
        Ok(())
    }

    /// Override the cadence, clamped to at least one.
    pub(crate) fn set_cadence(&mut self, n: u32) {
        self.update_every_n_insertions = n.max(1);
    }
}

fn union_merge(
    data: &AttributeValue,
    buffer: &[String],
) -> Result<AttributeValue, ConsolidationError> {
    let mut items = match data {
        AttributeValue::List(items) => items.clone(),
        AttributeValue::Text(_) => {
            return Err(ConsolidationError::KindMismatch { expected: "list" });
        }
    };
    for fragment in buffer {
        let item = fragment.trim();
        if item.is_empty() || items.iter().any(|existing| existing == item) {
            continue;
        }
        items.push(item.to_string());
    }
    Ok(AttributeValue::List(items))
}

fn latest_merge(kind: &AttributeKind, data: &AttributeValue, buffer: &[String]) -> AttributeValue {
    buffer
        .iter()
        .rev()
        .map(|f| f.trim())
        .find(|f| !f.is_empty() && kind.accepts_fragment(f))
        .map(AttributeValue::text)
        .unwrap_or_else(|| data.clone())
}
