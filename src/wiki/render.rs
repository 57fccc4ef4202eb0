//! Markdown rendering of attribute data, and page export/import
//!
//! Layout on disk mirrors the tree:
//! `<root>/sections/<section>/entities/<entity>/<attribute>.md`

use super::attribute::{Attribute, AttributeKind, AttributeValue};
use super::tree::KnowledgeTree;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no rendered pages under {0}")]
    NotFound(PathBuf),
}

/// Render an attribute's canonical data as a markdown page body.
pub fn render_attribute(attr: &Attribute) -> String {
    match attr.data() {
        AttributeValue::Text(s) => s.clone(),
        AttributeValue::List(items) => items
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Parse a page body back into a value of the attribute's kind.
pub fn parse_attribute(kind: &AttributeKind, content: &str) -> AttributeValue {
    match kind {
        AttributeKind::Text | AttributeKind::Choice(_) => {
            AttributeValue::Text(content.trim().to_string())
        }
        AttributeKind::List => AttributeValue::List(list_items(content)),
    }
}

/// Collect the text of top-level list items.
fn list_items(content: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<String> = None;

    for event in Parser::new(content) {
        match event {
            Event::Start(Tag::Item) => {
                depth += 1;
                if depth == 1 {
                    current = Some(String::new());
                }
            }
            Event::End(TagEnd::Item) => {
                if depth == 1 {
                    if let Some(item) = current.take() {
                        let item = item.trim().to_string();
                        if !item.is_empty() {
                            items.push(item);
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(text) | Event::Code(text) if depth >= 1 => {
                if let Some(item) = current.as_mut() {
                    item.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak if depth >= 1 => {
                if let Some(item) = current.as_mut() {
                    item.push(' ');
                }
            }
            _ => {}
        }
    }
    items
}

/// Make a name safe for use as a file or directory name.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' '))
        .collect::<String>()
        .trim()
        .replace(' ', "_")
}

/// Holds an entity's exact name inside its exported directory.
const NAME_FILE: &str = "_name";

/// Directory names for `names`, in order.
///
/// Each is the sanitized name, or `<fallback>-<n>` when nothing survives
/// sanitizing; clashes (compared case-insensitively) get a `-2`, `-3`, ...
/// suffix.
fn unique_dir_names<'a>(names: impl IntoIterator<Item = &'a str>, fallback: &str) -> Vec<String> {
    let mut taken = HashSet::new();
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let mut base = sanitize_filename(name);
            if base.is_empty() {
                base = format!("{}-{}", fallback, i + 1);
            }
            let mut candidate = base.clone();
            let mut n = 2;
            while !taken.insert(candidate.to_lowercase()) {
                candidate = format!("{}-{}", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

fn section_dirs(tree: &KnowledgeTree) -> Vec<String> {
    unique_dir_names(tree.sections().map(|s| s.name()), "section")
}

/// Write every attribute's data as a markdown page.
///
/// Each entity directory also carries a `_name` file with the entity's
/// exact name, so names that sanitize alike survive a round trip.
/// Returns the number of pages written.
pub fn export_markdown(tree: &KnowledgeTree, root: &Path) -> Result<usize, RenderError> {
    let mut written = 0;
    for (section, section_dir) in tree.sections().zip(section_dirs(tree)) {
        let entities_dir = root.join("sections").join(section_dir).join("entities");
        let entity_dirs = unique_dir_names(section.entities().map(|e| e.name()), "entity");
        for (entity, entity_dir) in section.entities().zip(entity_dirs) {
            let dir = entities_dir.join(entity_dir);
            std::fs::create_dir_all(&dir)?;
            std::fs::write(dir.join(NAME_FILE), entity.name())?;
            for attr in entity.attributes() {
                let file = dir.join(format!("{}.md", sanitize_filename(attr.name())));
                std::fs::write(&file, render_attribute(attr))?;
                written += 1;
            }
        }
    }
    debug!(pages = written, root = %root.display(), "exported markdown");
    Ok(written)
}

/// Restore attribute data from pages written by [`export_markdown`].
///
/// An entity directory names its entity through its `_name` file. Without
/// one, the directory is matched by sanitized name against the section's
/// entities, falling back to the directory name itself. Unknown entities
/// are created. Missing pages keep their current data.
pub fn import_markdown(tree: &mut KnowledgeTree, root: &Path) -> Result<usize, RenderError> {
    let sections_dir = root.join("sections");
    if !sections_dir.is_dir() {
        return Err(RenderError::NotFound(sections_dir));
    }

    let dir_names = section_dirs(tree);
    let mut restored = 0;
    for (section, section_dir) in tree.sections_mut().zip(dir_names) {
        let entities_dir = sections_dir.join(section_dir).join("entities");
        if !entities_dir.is_dir() {
            continue;
        }

        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&entities_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let name_file = dir.join(NAME_FILE);
            let entity_name = if name_file.is_file() {
                std::fs::read_to_string(&name_file)?
            } else {
                let dir_name = match dir.file_name().and_then(|n| n.to_str()) {
                    Some(n) => n.to_string(),
                    None => continue,
                };
                section
                    .entities()
                    .find(|e| sanitize_filename(e.name()) == dir_name)
                    .map(|e| e.name().to_string())
                    .unwrap_or_else(|| dir_name.replace('_', " "))
            };
            if entity_name.trim().is_empty() {
                warn!(dir = %dir.display(), "skipping entity with an empty name");
                continue;
            }

            let (entity, _) = section.resolve_entity(&entity_name);
            for attr in entity.attributes_mut() {
                let file = dir.join(format!("{}.md", sanitize_filename(attr.name())));
                if !file.is_file() {
                    continue;
                }
                let content = std::fs::read_to_string(&file)?;
                let value = parse_attribute(attr.kind(), &content);
                match attr.restore_data(value) {
                    Ok(()) => restored += 1,
                    Err(e) => warn!(file = %file.display(), error = %e, "skipping page"),
                }
            }
        }
    }
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::{AttributePath, Section, SectionKind};

    #[test]
    fn list_pages_parse_back_to_items() {
        let content = "- The Fool\n- Mr. `Z`\n\n- Klein Moretti\n";
        assert_eq!(
            parse_attribute(&AttributeKind::List, content),
            AttributeValue::List(vec!["The Fool".into(), "Mr. Z".into(), "Klein Moretti".into()])
        );
    }

    #[test]
    fn text_pages_are_trimmed() {
        assert_eq!(
            parse_attribute(&AttributeKind::Text, "\n  Calm and *careful*.\n"),
            AttributeValue::text("Calm and *careful*.")
        );
    }

    #[test]
    fn sanitize_strips_punctuation() {
        assert_eq!(sanitize_filename(" Klein Moretti! "), "Klein_Moretti");
        assert_eq!(sanitize_filename("Tingen/City"), "TingenCity");
    }

    #[test]
    fn export_then_import_restores_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = KnowledgeTree::new("lotm")
            .with_section(Section::new("Characters", SectionKind::Characters))
            .unwrap();

        let aliases = AttributePath::new("Characters", "Klein Moretti", "aliases");
        tree.append(&aliases, "The Fool").unwrap();
        tree.append(&aliases, "Sherlock Moriarty").unwrap();
        let attr = tree.attribute_mut(&aliases).unwrap();
        let merged = attr.local_merge().unwrap().unwrap();
        attr.consolidate(|_, _| Ok::<_, String>(merged)).unwrap();

        let pages = export_markdown(&tree, dir.path()).unwrap();
        assert_eq!(pages, SectionKind::Characters.template().len());

        let mut fresh = KnowledgeTree::new("lotm")
            .with_section(Section::new("Characters", SectionKind::Characters))
            .unwrap();
        import_markdown(&mut fresh, dir.path()).unwrap();

        assert_eq!(
            fresh.attribute(&aliases).unwrap().data(),
            &AttributeValue::List(vec!["The Fool".into(), "Sherlock Moriarty".into()])
        );
    }

    #[test]
    fn dir_names_are_unique_and_never_empty() {
        let names = unique_dir_names(["克莱恩", "Amon!", "Amon", "amon", "Amon-2"], "entity");
        assert_eq!(names, vec!["entity-1", "Amon", "Amon-2", "amon-3", "Amon-2-2"]);
    }

    #[test]
    fn names_that_sanitize_alike_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let characters = || {
            KnowledgeTree::new("lotm")
                .with_section(Section::new("Characters", SectionKind::Characters))
                .unwrap()
        };
        let mut tree = characters();
        for name in ["克莱恩", "Amon!", "Amon"] {
            let path = AttributePath::new("Characters", name, "personality");
            tree.append(&path, format!("{} is here", name)).unwrap();
            tree.attribute_mut(&path)
                .unwrap()
                .consolidate(|_, buffer| Ok::<_, String>(AttributeValue::text(buffer.join(" "))))
                .unwrap();
        }

        let pages = export_markdown(&tree, dir.path()).unwrap();
        assert_eq!(pages, 3 * SectionKind::Characters.template().len());

        let mut fresh = characters();
        let restored = import_markdown(&mut fresh, dir.path()).unwrap();
        assert_eq!(restored, pages);

        let section = fresh.section("Characters").unwrap();
        let names: Vec<&str> = section.entities().map(|e| e.name()).collect();
        assert_eq!(names.len(), 3);
        for name in ["克莱恩", "Amon!", "Amon"] {
            assert!(names.contains(&name), "missing {}", name);
            let path = AttributePath::new("Characters", name, "personality");
            assert_eq!(
                fresh.attribute(&path).unwrap().data(),
                &AttributeValue::text(format!("{} is here", name))
            );
        }
    }

    #[test]
    fn import_without_pages_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = KnowledgeTree::new("empty");
        assert!(matches!(import_markdown(&mut tree, dir.path()), Err(RenderError::NotFound(_))));
    }
}
