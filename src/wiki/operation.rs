//! Legal operations: what the extraction agent may ask the tree to do
//!
//! Operations are enumerated from section templates into an
//! [`OperationTable`]. The agent answers with [`OperationCall`]s, which
//! the tree validates against the table before applying.

use super::attribute::AttributeKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Name of the global operation carrying the chunk summary.
pub const CHUNK_SUMMARY_OP: &str = "generate_chunk_summary";
/// Name of the global no-op (index pages, tables of contents).
pub const NOOP_OP: &str = "do_nothing";

/// Address of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityPath {
    pub section: String,
    pub entity: String,
}

impl std::fmt::Display for EntityPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.section, self.entity)
    }
}

/// Address of one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributePath {
    pub section: String,
    pub entity: String,
    pub attribute: String,
}

impl AttributePath {
    pub fn new(
        section: impl Into<String>,
        entity: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            section: section.into(),
            entity: entity.into(),
            attribute: attribute.into(),
        }
    }

    pub fn entity_path(&self) -> EntityPath {
        EntityPath {
            section: self.section.clone(),
            entity: self.entity.clone(),
        }
    }
}

impl std::fmt::Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.section, self.entity, self.attribute)
    }
}

/// What a section-level operation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionAction {
    AddEntity,
    Append { attribute: String },
}

/// Where an operation name dispatches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationTarget {
    Section { section: String, action: SectionAction },
    ChunkSummary,
    Noop,
}

/// Schema-described action exposed to the extraction agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_type: Option<AttributeKind>,
    pub description: String,
    pub parameters: Value,
    #[serde(skip)]
    pub target: OperationTarget,
}

impl OperationDescriptor {
    pub(crate) fn add_entity(section: &str, label: &str, description: &str) -> Self {
        let name_description = format!("Full name or alias of the {}", label);
        Self {
            name: format!("add_{}", label),
            section: Some(section.to_string()),
            attribute: None,
            attribute_type: None,
            description: description.to_string(),
            parameters: object_schema(
                json!({ "name": { "type": "string", "description": name_description } }),
                &["name"],
            ),
            target: OperationTarget::Section {
                section: section.to_string(),
                action: SectionAction::AddEntity,
            },
        }
    }

    pub(crate) fn append(
        section: &str,
        label: &str,
        attribute: &str,
        kind: &AttributeKind,
        description: &str,
    ) -> Self {
        let content_description = format!("Content to add to the {}'s {}", label, attribute);
        let mut content = json!({ "type": "string", "description": content_description });
        if let AttributeKind::Choice(options) = kind {
            content["enum"] = json!(options);
        }
        Self {
            name: format!("add_to_{}_{}", label, attribute),
            section: Some(section.to_string()),
            attribute: Some(attribute.to_string()),
            attribute_type: Some(kind.clone()),
            description: description.to_string(),
            parameters: object_schema(
                json!({
                    "name": { "type": "string", "description": format!("Name of the {}", label) },
                    "content": content,
                }),
                &["name", "content"],
            ),
            target: OperationTarget::Section {
                section: section.to_string(),
                action: SectionAction::Append {
                    attribute: attribute.to_string(),
                },
            },
        }
    }

    fn chunk_summary() -> Self {
        Self {
            name: CHUNK_SUMMARY_OP.to_string(),
            section: None,
            attribute: None,
            attribute_type: None,
            description: "Summarize the current chunk (about 500 words, markdown). Track the plot, \
                          ongoing events, characters present and the current setting. The summary \
                          is shown with the following chunks."
                .to_string(),
            parameters: object_schema(json!({ "summary": { "type": "string" } }), &["summary"]),
            target: OperationTarget::ChunkSummary,
        }
    }

    fn noop() -> Self {
        Self {
            name: NOOP_OP.to_string(),
            section: None,
            attribute: None,
            attribute_type: None,
            description: "Use this if the current chunk holds no relevant information, \
                          e.g. a table of contents."
                .to_string(),
            parameters: object_schema(json!({}), &[]),
            target: OperationTarget::Noop,
        }
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// One operation invocation returned by the extraction agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OperationCall {
    /// Name of a legal operation
    pub name: String,
    /// Arguments matching the operation's parameter schema
    #[serde(default)]
    pub args: Value,
}

impl OperationCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Read a required string argument.
    pub fn str_arg(&self, key: &str) -> Result<&str, SchemaViolation> {
        self.args
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaViolation::MissingArgument {
                operation: self.name.clone(),
                argument: key.to_string(),
            })
    }
}

/// The extraction agent's full answer for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionEnvelope {
    /// Operations in narrative order
    #[serde(default)]
    pub calls: Vec<OperationCall>,
}

/// Result of successfully applying one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedOperation {
    EntityResolved { path: EntityPath, created: bool },
    Appended { path: AttributePath, due: bool },
    ChunkSummary(String),
    Noop,
}

/// An agent-issued operation that does not fit the schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaViolation {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("unknown section '{0}'")]
    UnknownSection(String),

    #[error("section '{section}' has no attribute '{attribute}'")]
    UnknownAttribute { section: String, attribute: String },

    #[error("operation '{operation}' is missing argument '{argument}'")]
    MissingArgument { operation: String, argument: String },

    #[error("operation '{operation}' got an invalid entity name '{name}'")]
    InvalidEntityName { operation: String, name: String },

    #[error("'{value}' is not a valid {expected} value for '{attribute}'")]
    InvalidValue {
        attribute: String,
        value: String,
        expected: &'static str,
    },
}

/// Two descriptors share an operation name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation '{name}' is defined more than once")]
pub struct DuplicateOperation {
    pub name: String,
}

/// Every legal operation of a tree, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct OperationTable {
    descriptors: Vec<OperationDescriptor>,
    by_name: HashMap<String, usize>,
}

impl OperationTable {
    /// Build a table from section descriptors plus the global operations.
    ///
    /// Names must be unique across the whole table.
    pub fn new(
        section_ops: impl IntoIterator<Item = OperationDescriptor>,
    ) -> Result<Self, DuplicateOperation> {
        let mut table = Self::default();
        for op in section_ops
            .into_iter()
            .chain([OperationDescriptor::chunk_summary(), OperationDescriptor::noop()])
        {
            if table.by_name.contains_key(&op.name) {
                return Err(DuplicateOperation { name: op.name });
            }
            table.by_name.insert(op.name.clone(), table.descriptors.len());
            table.descriptors.push(op);
        }
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&OperationDescriptor> {
        self.by_name.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn descriptors(&self) -> &[OperationDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// JSON schema for the extraction response: the envelope shape plus
    /// the catalogue of legal operations.
    pub fn response_schema(&self) -> Value {
        let envelope = schemars::schema_for!(ExtractionEnvelope);
        json!({
            "envelope": envelope,
            "operations": self.descriptors,
        })
    }
}
