//! KnowledgeTree: the root aggregate of sections

use super::attribute::Attribute;
use super::entity::Entity;
use super::operation::{
    AppliedOperation, AttributePath, DuplicateOperation, OperationCall, OperationDescriptor,
    OperationTable, OperationTarget, SchemaViolation,
};
use super::section::Section;
use super::template::SectionKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when shaping a tree
#[derive(Debug, Error)]
pub enum WikiError {
    #[error("section already exists: {0}")]
    DuplicateSection(String),

    #[error("section '{section}' repeats kind {kind}, already used by '{existing}'")]
    DuplicateKind {
        kind: SectionKind,
        existing: String,
        section: String,
    },

    #[error(transparent)]
    DuplicateOperation(#[from] DuplicateOperation),

    #[error("section not found: {0}")]
    SectionNotFound(String),

    #[error("attribute not found: {0}")]
    AttributeNotFound(AttributePath),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for tree operations
pub type WikiResult<T> = Result<T, WikiError>;

/// The whole knowledge base: an ordered list of sections with unique
/// names and unique kinds.
///
/// Operation names derive from the section kind, so one section per kind
/// keeps every operation addressable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TreeParts")]
pub struct KnowledgeTree {
    pub name: String,
    sections: Vec<Section>,
}

/// Serialized shape of a tree, checked through [`KnowledgeTree::add_section`]
/// on the way in.
#[derive(Deserialize)]
struct TreeParts {
    name: String,
    sections: Vec<Section>,
}

impl TryFrom<TreeParts> for KnowledgeTree {
    type Error = WikiError;

    fn try_from(parts: TreeParts) -> WikiResult<Self> {
        let mut tree = KnowledgeTree::new(parts.name);
        for section in parts.sections {
            tree.add_section(section)?;
        }
        Ok(tree)
    }
}

impl KnowledgeTree {
    /// Create an empty tree
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sections: Vec::new(),
        }
    }

    /// Builder-style [`KnowledgeTree::add_section`]
    pub fn with_section(mut self, section: Section) -> WikiResult<Self> {
        self.add_section(section)?;
        Ok(self)
    }

    /// Append a section; names and kinds must be unique.
    pub fn add_section(&mut self, section: Section) -> WikiResult<()> {
        if self.section(section.name()).is_some() {
            return Err(WikiError::DuplicateSection(section.name().to_string()));
        }
        if let Some(existing) = self.sections.iter().find(|s| s.kind() == section.kind()) {
            return Err(WikiError::DuplicateKind {
                kind: section.kind(),
                existing: existing.name().to_string(),
                section: section.name().to_string(),
            });
        }
        self.sections.push(section);
        Ok(())
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name() == name)
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.name() == name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn sections_mut(&mut self) -> impl Iterator<Item = &mut Section> {
        self.sections.iter_mut()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Look up or create an entity in a section.
    pub fn resolve_entity(&mut self, section: &str, entity: &str) -> WikiResult<&mut Entity> {
        let section = self
            .section_mut(section)
            .ok_or_else(|| WikiError::SectionNotFound(section.to_string()))?;
        Ok(section.resolve_entity(entity).0)
    }

    /// Legal operations for one section.
    pub fn legal_operations(&self, section: &str) -> WikiResult<Vec<OperationDescriptor>> {
        self.section(section)
            .map(Section::legal_operations)
            .ok_or_else(|| WikiError::SectionNotFound(section.to_string()))
    }

    /// Every legal operation across all sections, plus the global ones.
    pub fn operation_table(&self) -> WikiResult<OperationTable> {
        let ops = self.sections.iter().flat_map(Section::legal_operations);
        Ok(OperationTable::new(ops)?)
    }

    /// Validate an agent-issued call against `table` and apply it.
    ///
    /// A rejected call leaves the tree untouched.
    pub fn apply_operation(
        &mut self,
        table: &OperationTable,
        call: &OperationCall,
    ) -> Result<AppliedOperation, SchemaViolation> {
        let descriptor = table
            .get(&call.name)
            .ok_or_else(|| SchemaViolation::UnknownOperation(call.name.clone()))?;

        match &descriptor.target {
            OperationTarget::Section { section, action } => {
                let section = self
                    .section_mut(section)
                    .ok_or_else(|| SchemaViolation::UnknownSection(section.clone()))?;
                section.apply_operation(action, call)
            }
            OperationTarget::ChunkSummary => {
                let summary = call.str_arg("summary")?.trim();
                Ok(AppliedOperation::ChunkSummary(summary.to_string()))
            }
            OperationTarget::Noop => Ok(AppliedOperation::Noop),
        }
    }

    /// Append a fragment by path, creating the entity if needed.
    pub fn append(
        &mut self,
        path: &AttributePath,
        fragment: impl Into<String>,
    ) -> Result<AttributePath, SchemaViolation> {
        let section = self
            .section_mut(&path.section)
            .ok_or_else(|| SchemaViolation::UnknownSection(path.section.clone()))?;
        section.append(&path.entity, &path.attribute, fragment)
    }

    pub fn attribute(&self, path: &AttributePath) -> Option<&Attribute> {
        self.section(&path.section)?
            .entity(&path.entity)?
            .attribute(&path.attribute)
    }

    pub fn attribute_mut(&mut self, path: &AttributePath) -> Option<&mut Attribute> {
        self.section_mut(&path.section)?
            .entity_mut(&path.entity)?
            .attribute_mut(&path.attribute)
    }

    /// Paths of every attribute holding unconsolidated fragments, in tree order.
    pub fn pending_paths(&self) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        for section in &self.sections {
            for entity in section.entities() {
                for attr in entity.attributes() {
                    if !attr.buffer().is_empty() {
                        paths.push(AttributePath::new(section.name(), entity.name(), attr.name()));
                    }
                }
            }
        }
        paths
    }

    pub fn entity_count(&self) -> usize {
        self.sections.iter().map(Section::entity_count).sum()
    }
}
