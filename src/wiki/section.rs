//! Section: a named category of entities sharing one attribute template

use super::attribute::Attribute;
use super::entity::Entity;
use super::operation::{
    AppliedOperation, AttributePath, EntityPath, OperationCall, OperationDescriptor,
    SchemaViolation, SectionAction,
};
use super::template::SectionKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A category of entities (e.g. "Characters").
///
/// Entities keep insertion order. Identity is the exact entity name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    name: String,
    kind: SectionKind,
    template: Vec<Attribute>,
    #[serde(default)]
    entities: Vec<Entity>,
}

impl Section {
    /// Create an empty section using the kind's default template.
    pub fn new(name: impl Into<String>, kind: SectionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            template: kind.template(),
            entities: Vec::new(),
        }
    }

    /// Reassemble a stored section.
    pub(crate) fn from_parts(
        name: String,
        kind: SectionKind,
        template: Vec<Attribute>,
        entities: Vec<Entity>,
    ) -> Self {
        Self {
            name,
            kind,
            template,
            entities,
        }
    }

    /// Override the consolidation cadence of a template attribute.
    ///
    /// Only affects entities created afterwards. Unknown attribute names
    /// are ignored; configuration validates them beforehand.
    pub fn with_cadence(mut self, attribute: &str, n: u32) -> Self {
        if let Some(attr) = self.template.iter_mut().find(|a| a.name() == attribute) {
            attr.set_cadence(n);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    pub fn template(&self) -> &[Attribute] {
        &self.template
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.template.iter().any(|a| a.name() == attribute)
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name() == name)
    }

    pub fn entity_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.name() == name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Look up an entity, creating it from the template on first mention.
    ///
    /// Returns the entity and whether it was created by this call.
    pub fn resolve_entity(&mut self, name: &str) -> (&mut Entity, bool) {
        match self.entities.iter().position(|e| e.name() == name) {
            Some(idx) => (&mut self.entities[idx], false),
            None => {
                debug!(section = %self.name, entity = name, "creating entity");
                self.entities.push(Entity::from_template(name, &self.template));
                let last = self.entities.len() - 1;
                (&mut self.entities[last], true)
            }
        }
    }

    /// Operations the extraction agent may invoke for this section.
    pub fn legal_operations(&self) -> Vec<OperationDescriptor> {
        let label = self.kind.entity_label();
        let mut ops = Vec::with_capacity(self.template.len() + 1);
        ops.push(OperationDescriptor::add_entity(
            &self.name,
            label,
            self.kind.add_entity_description(),
        ));
        for attr in &self.template {
            ops.push(OperationDescriptor::append(
                &self.name,
                label,
                attr.name(),
                attr.kind(),
                attr.description(),
            ));
        }
        ops
    }

    /// Validate and apply one section-level operation.
    ///
    /// Nothing is mutated when validation fails.
    pub fn apply_operation(
        &mut self,
        action: &SectionAction,
        call: &OperationCall,
    ) -> Result<AppliedOperation, SchemaViolation> {
        let entity_name = entity_name(call)?;

        match action {
            SectionAction::AddEntity => {
                let (_, created) = self.resolve_entity(&entity_name);
                Ok(AppliedOperation::EntityResolved {
                    path: EntityPath {
                        section: self.name.clone(),
                        entity: entity_name,
                    },
                    created,
                })
            }
            SectionAction::Append { attribute } => {
                let fragments = self.validated_fragments(attribute, call)?;
                let (path, due) = self.append_fragments(&entity_name, attribute, fragments)?;
                Ok(AppliedOperation::Appended { path, due })
            }
        }
    }

    /// Append directly by attribute name, bypassing the operation table.
    pub fn append(
        &mut self,
        entity: &str,
        attribute: &str,
        fragment: impl Into<String>,
    ) -> Result<AttributePath, SchemaViolation> {
        let call = OperationCall::new(
            format!("add_to_{}_{}", self.kind.entity_label(), attribute),
            serde_json::json!({ "name": entity, "content": fragment.into() }),
        );
        let entity_name = entity_name(&call)?;
        let fragments = self.validated_fragments(attribute, &call)?;
        let (path, _) = self.append_fragments(&entity_name, attribute, fragments)?;
        Ok(path)
    }

    fn append_fragments(
        &mut self,
        entity_name: &str,
        attribute: &str,
        fragments: Vec<String>,
    ) -> Result<(AttributePath, bool), SchemaViolation> {
        let section_name = self.name.clone();
        let (entity, _) = self.resolve_entity(entity_name);
        let attr = entity
            .attribute_mut(attribute)
            .ok_or_else(|| SchemaViolation::UnknownAttribute {
                section: section_name.clone(),
                attribute: attribute.to_string(),
            })?;
        let mut due = false;
        for fragment in fragments {
            due = attr.append_to_buffer(fragment);
        }
        Ok((AttributePath::new(section_name, entity_name, attribute), due))
    }

    /// Check the attribute exists and every fragment fits its kind.
    fn validated_fragments(
        &self,
        attribute: &str,
        call: &OperationCall,
    ) -> Result<Vec<String>, SchemaViolation> {
        let template = self
            .template
            .iter()
            .find(|a| a.name() == attribute)
            .ok_or_else(|| SchemaViolation::UnknownAttribute {
                section: self.name.clone(),
                attribute: attribute.to_string(),
            })?;

        let fragments: Vec<String> = match call.args.get("content") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) if items.iter().all(Value::is_string) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => {
                return Err(SchemaViolation::MissingArgument {
                    operation: call.name.clone(),
                    argument: "content".to_string(),
                })
            }
        };

        if fragments.is_empty() {
            return Err(SchemaViolation::MissingArgument {
                operation: call.name.clone(),
                argument: "content".to_string(),
            });
        }

        if let Some(bad) = fragments.iter().find(|f| !template.kind().accepts_fragment(f)) {
            return Err(SchemaViolation::InvalidValue {
                attribute: attribute.to_string(),
                value: bad.clone(),
                expected: template.kind().label(),
            });
        }

        Ok(fragments)
    }
}

fn entity_name(call: &OperationCall) -> Result<String, SchemaViolation> {
    let raw = call.str_arg("name")?;
    let name = raw.trim();
    if name.is_empty() || name.contains('\n') {
        return Err(SchemaViolation::InvalidEntityName {
            operation: call.name.clone(),
            name: raw.to_string(),
        });
    }
    Ok(name.to_string())
}
