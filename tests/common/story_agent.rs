//! A rule-based agent for integration tests
//!
//! Chunk text is one instruction per line:
//!
//! ```text
//! character Klein Moretti                       -> add_character
//! character Klein Moretti | personality | calm  -> add_to_character_personality
//! setting Tingen | history | old                -> add_to_setting_history
//! summary | Klein wakes up                      -> generate_chunk_summary
//! index                                         -> do_nothing
//! ```
//!
//! Consolidation joins existing data and buffer with "; ". Summaries
//! echo the first line of the chunk.

use lorebook::{AgentError, AgentRequest, AgentTask, MockAgent};
use serde_json::{json, Value};

#[derive(Debug, Clone, Default)]
pub struct StoryAgentOptions {
    /// Extraction fails for chunks containing this text
    pub fail_extract_on: Option<String>,
    /// Consolidation fails for this attribute name
    pub fail_consolidate_for: Option<String>,
}

pub fn story_agent() -> MockAgent {
    story_agent_with(StoryAgentOptions::default())
}

pub fn story_agent_failing_on(marker: &str) -> MockAgent {
    story_agent_with(StoryAgentOptions {
        fail_extract_on: Some(marker.to_string()),
        ..StoryAgentOptions::default()
    })
}

pub fn story_agent_with(options: StoryAgentOptions) -> MockAgent {
    let fail_extract_on = options.fail_extract_on.clone();
    let fail_consolidate_for = options.fail_consolidate_for;

    MockAgent::new()
        .with_responder(AgentTask::Extract, move |req| {
            let text = current_chunk(req);
            if let Some(marker) = &fail_extract_on {
                if text.contains(marker.as_str()) {
                    return Err(AgentError::CallFailed(format!("refusing chunk with '{}'", marker)));
                }
            }
            Ok(json!({ "calls": calls_for(text) }).to_string())
        })
        .with_responder(AgentTask::Consolidate, move |req| {
            if let Some(attr) = &fail_consolidate_for {
                if req.prompt.contains(&format!("'s {} by", attr)) {
                    return Err(AgentError::CallFailed(format!("cannot merge {}", attr)));
                }
            }
            Ok(json!({ "data": merged(&req.prompt) }).to_string())
        })
        .with_responder(AgentTask::Summarize, |req| {
            let first = current_chunk(req).lines().next().unwrap_or_default();
            Ok(json!({ "summary": format!("Summary: {}", first) }).to_string())
        })
}

/// The chunk text at the end of an extraction or summary prompt.
pub fn current_chunk(req: &AgentRequest) -> &str {
    req.prompt
        .rfind("# Current chunk")
        .and_then(|at| req.prompt[at..].split_once("\n\n"))
        .map(|(_, text)| text)
        .unwrap_or_default()
}

fn calls_for(text: &str) -> Vec<Value> {
    let mut calls = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parts: Vec<&str> = line.split(" | ").map(str::trim).collect();
        let (head, rest) = parts[0].split_once(' ').unwrap_or((parts[0], ""));

        match (head, parts.len()) {
            ("summary", 2) => calls.push(json!({
                "name": "generate_chunk_summary",
                "args": { "summary": parts[1] }
            })),
            ("index", 1) => calls.push(json!({ "name": "do_nothing" })),
            ("character" | "setting", 1) => {
                calls.push(json!({ "name": format!("add_{}", head), "args": { "name": rest } }))
            }
            ("character" | "setting", 3) => calls.push(json!({
                "name": format!("add_to_{}_{}", head, parts[1]),
                "args": { "name": rest, "content": parts[2] },
            })),
            _ => {}
        }
    }
    calls
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    Some(&text[from..from + len])
}

fn merged(prompt: &str) -> String {
    let existing = prompt
        .find("information: \"\"\"")
        .and_then(|at| between(&prompt[at..], "information: \"\"\"", "\"\"\""))
        .unwrap_or_default()
        .trim()
        .to_string();
    let buffer: Vec<&str> = prompt
        .find("buffer:\n\"\"\"\n")
        .and_then(|at| between(&prompt[at..], "buffer:\n\"\"\"\n", "\n\"\"\""))
        .unwrap_or_default()
        .lines()
        .filter_map(|l| l.strip_prefix("- "))
        .collect();

    let mut parts: Vec<&str> = Vec::new();
    if !existing.is_empty() {
        parts.push(&existing);
    }
    parts.extend(buffer);
    parts.join("; ")
}
