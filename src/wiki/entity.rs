//! Entity: a named owner of attributes within a section

use super::attribute::Attribute;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named entity (a character, a setting, ...).
///
/// The attribute set is fixed at creation time from the owning
/// section's template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    name: String,
    attributes: Vec<Attribute>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity {
    pub(crate) fn from_template(name: impl Into<String>, template: &[Attribute]) -> Self {
        Self {
            name: name.into(),
            attributes: template.to_vec(),
            created_at: Some(Utc::now()),
        }
    }

    /// Reassemble a stored entity.
    pub(crate) fn from_parts(
        name: String,
        attributes: Vec<Attribute>,
        created_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            name,
            attributes,
            created_at,
        }
    }

    /// The entity's name, fixed at creation.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.name() == name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    pub fn attributes_mut(&mut self) -> impl Iterator<Item = &mut Attribute> {
        self.attributes.iter_mut()
    }

    /// Total fragments waiting across all attributes.
    pub fn pending_total(&self) -> u32 {
        self.attributes.iter().map(|a| a.pending_count()).sum()
    }
}
