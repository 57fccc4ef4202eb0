//! Core knowledge tree data structures

mod attribute;
mod entity;
mod operation;
pub mod render;
mod section;
mod template;
mod tree;


pub use attribute::{Attribute, AttributeKind, AttributeValue, ConsolidationError, MergeStrategy};
pub use entity::Entity;
pub use operation::{
    AppliedOperation, AttributePath, DuplicateOperation, EntityPath, ExtractionEnvelope,
    OperationCall, OperationDescriptor, OperationTable, OperationTarget, SchemaViolation,
    SectionAction, CHUNK_SUMMARY_OP, NOOP_OP,
};
pub use section::Section;
pub use template::SectionKind;
pub use tree::{KnowledgeTree, WikiError, WikiResult};
