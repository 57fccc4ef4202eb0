//! Prompt construction for the three agent tasks

use crate::context::RunningContext;
use crate::processor::Chunk;
use crate::wiki::{Attribute, AttributePath};

pub const EXTRACTION_SYSTEM: &str = "You are reading a book series chapter by chapter in order to \
build a comprehensive wiki. Record every relevant fact in the `Current chunk` by calling the \
operations you are given, as many times as needed. Use the `Summary of previous chunks` only to \
stay consistent with what is already known. Call `generate_chunk_summary` once with a short \
summary of the current chunk. If the chunk holds nothing but an index or table of contents, call \
`do_nothing`. Reply with a single JSON object matching the response schema.";

pub const CONSOLIDATION_SYSTEM: &str = "You maintain a comprehensive fan wiki for a book series. \
Fold the new information from the buffer into the existing content, following the update \
instructions. Write markdown in the style of popular fan wikis. Never invent missing facts; \
leave them out. If there is no information at all, answer with \"...\". Reply with a single JSON \
object matching the response schema.";

pub const SUMMARY_SYSTEM: &str = "You keep a running summary of a book series for a wiki editor. \
Summarize the current chunk in a few sentences so the next chunk can be read in context. Reply \
with a single JSON object matching the response schema.";

/// Extraction prompt: prior summaries, then the chunk itself.
pub fn extraction_prompt(chunk: &Chunk, context: &RunningContext) -> String {
    format!(
        "# Summary of previous chunks:\n\n{}# Current chunk ({}):\n\n{}",
        context.render(),
        chunk.id(),
        chunk.text
    )
}

/// Consolidation prompt for one attribute.
pub fn consolidation_prompt(path: &AttributePath, attr: &Attribute) -> String {
    let buffer = attr
        .buffer()
        .iter()
        .map(|f| format!("- {}", f))
        .collect::<Vec<_>>()
        .join("\n");

    let mut out = format!(
        "Rewrite {} '{}''s {} by combining the existing information with the new \
         information from the buffer.\n\n",
        path.section, path.entity, path.attribute
    );
    out.push_str(&format!(
        "Description of {}: \"\"\"{}\"\"\"\n\n",
        attr.name(),
        attr.description()
    ));
    if !attr.update_prompt().is_empty() {
        out.push_str(&format!("Update instructions: \"\"\"{}\"\"\"\n\n", attr.update_prompt()));
    }
    out.push_str(&format!("Existing {} information: \"\"\"{}\"\"\"\n\n", attr.name(), attr.data()));
    out.push_str(&format!(
        "New information from the {} buffer:\n\"\"\"\n{}\n\"\"\"\n",
        attr.name(),
        buffer
    ));
    out
}

/// Context-update prompt used when extraction emitted no chunk summary.
pub fn summary_prompt(chunk: &Chunk, context: &RunningContext, touched: &[String]) -> String {
    let mut out = format!("# Summary of previous chunks:\n\n{}", context.render());
    if !touched.is_empty() {
        out.push_str(&format!("# Entities mentioned: {}\n\n", touched.join(", ")));
    }
    out.push_str(&format!("# Current chunk ({}):\n\n{}", chunk.id(), chunk.text));
    out
}
