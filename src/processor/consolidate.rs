//! Folding attribute buffers into canonical data
//!
//! Local strategies merge in place. Agent-backed attributes send the
//! existing data and buffer to the consolidation agent; the response is
//! committed only if it arrives and has the attribute's kind, so each
//! attribute ends up either fully consolidated or untouched.

use tracing::{debug, warn};

use super::cancel::CancellationToken;
use super::retry::{call_with_retry, RetryPolicy};
use crate::agent::{
    decode, response_schema, AgentClient, AgentRequest, AgentTask, ConsolidationResponse,
};
use crate::prompt;
use crate::wiki::{AttributePath, ConsolidationError, KnowledgeTree};

/// Consolidate one attribute.
pub async fn consolidate_attribute(
    tree: &mut KnowledgeTree,
    path: &AttributePath,
    agent: &dyn AgentClient,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<(), ConsolidationError> {
    let attr = tree
        .attribute(path)
        .ok_or_else(|| ConsolidationError::MergeFailed(format!("no attribute at {}", path)))?;

    let merged = match attr.local_merge() {
        Some(result) => result?,
        None => {
            let request = AgentRequest {
                task: AgentTask::Consolidate,
                system: prompt::CONSOLIDATION_SYSTEM.to_string(),
                prompt: prompt::consolidation_prompt(path, attr),
                schema: response_schema::<ConsolidationResponse>(),
            };
            let parse = |text: &str| decode::<ConsolidationResponse>(text)?.into_value();
            call_with_retry(agent, &request, policy, cancel, parse)
                .await
                .map_err(|e| ConsolidationError::MergeFailed(e.to_string()))?
                .value
        }
    };

    let attr = tree
        .attribute_mut(path)
        .ok_or_else(|| ConsolidationError::MergeFailed(format!("no attribute at {}", path)))?;
    attr.consolidate(|_, _| Ok::<_, ConsolidationError>(merged))?;
    debug!(attribute = %path, "consolidated");
    Ok(())
}

/// Outcome of consolidating a batch of attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidationReport {
    pub consolidated: Vec<AttributePath>,
    pub failures: Vec<(AttributePath, ConsolidationError)>,
}

impl ConsolidationReport {
    pub fn merge(&mut self, other: ConsolidationReport) {
        self.consolidated.extend(other.consolidated);
        self.failures.extend(other.failures);
    }
}

/// Consolidate each path in order, isolating failures per attribute.
///
/// Without `force` only attributes whose cadence is reached are touched.
/// With `force` every attribute holding buffered fragments is.
pub async fn consolidate_paths(
    tree: &mut KnowledgeTree,
    paths: &[AttributePath],
    force: bool,
    agent: &dyn AgentClient,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> ConsolidationReport {
    let mut report = ConsolidationReport::default();

    for path in paths {
        let ready = tree.attribute(path).is_some_and(|a| {
            if force {
                !a.buffer().is_empty()
            } else {
                a.consolidation_due()
            }
        });
        if !ready {
            continue;
        }

        match consolidate_attribute(tree, path, agent, policy, cancel).await {
            Ok(()) => report.consolidated.push(path.clone()),
            Err(e) => {
                warn!(attribute = %path, error = %e, "consolidation failed, keeping buffer");
                report.failures.push((path.clone(), e));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentError, MockAgent};
    use crate::wiki::{AttributeValue, Section, SectionKind};

    fn tree() -> KnowledgeTree {
        KnowledgeTree::new("lotm")
            .with_section(Section::new("Characters", SectionKind::Characters))
            .unwrap()
    }

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn agent_merge_commits_response() {
        let mut tree = tree();
        let path = AttributePath::new("Characters", "Klein", "personality");
        tree.append(&path, "calm").unwrap();

        let response = r#"{"data": "Calm and careful."}"#;
        let agent = MockAgent::new().with_response(AgentTask::Consolidate, response);
        consolidate_attribute(&mut tree, &path, &agent, &quick(), &CancellationToken::new())
            .await
            .unwrap();

        let attr = tree.attribute(&path).unwrap();
        assert_eq!(attr.data(), &AttributeValue::text("Calm and careful."));
        assert_eq!(attr.pending_count(), 0);
        assert!(attr.last_consolidated_at().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn local_merges_skip_the_agent() {
        let mut tree = tree();
        let path = AttributePath::new("Characters", "Klein", "aliases");
        tree.append(&path, "The Fool").unwrap();

        let agent = MockAgent::new();
        consolidate_attribute(&mut tree, &path, &agent, &quick(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(agent.requests().is_empty());
        assert_eq!(
            tree.attribute(&path).unwrap().data(),
            &AttributeValue::List(vec!["The Fool".into()])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_isolated_per_attribute() {
        let mut tree = tree();
        let personality = AttributePath::new("Characters", "Klein", "personality");
        let aliases = AttributePath::new("Characters", "Klein", "aliases");
        for fragment in ["calm", "strict about water", "hidden temper"] {
            tree.append(&personality, fragment).unwrap();
        }
        tree.append(&aliases, "The Fool").unwrap();
        let before = tree.attribute(&personality).unwrap().clone();

        let agent = MockAgent::new()
            .with_responder(AgentTask::Consolidate, |_| Err(AgentError::CallFailed("down".into())));
        let report = consolidate_paths(
            &mut tree,
            &[personality.clone(), aliases.clone()],
            false,
            &agent,
            &quick(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(report.consolidated, vec![aliases]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, personality);
        assert_eq!(tree.attribute(&personality).unwrap(), &before);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_kind_from_agent_is_rejected() {
        let mut tree = tree();
        let path = AttributePath::new("Characters", "Klein", "trivia");
        tree.append(&path, "likes coffee").unwrap();

        let response = r#"{"data": ["a", "b"]}"#;
        let agent = MockAgent::new().with_response(AgentTask::Consolidate, response);
        let cancel = CancellationToken::new();
        let err = consolidate_attribute(&mut tree, &path, &agent, &quick(), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, ConsolidationError::KindMismatch { expected: "text" });
        assert_eq!(tree.attribute(&path).unwrap().pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn force_consolidates_below_cadence() {
        let mut tree = tree();
        let path = AttributePath::new("Characters", "Klein", "personality");
        tree.append(&path, "calm").unwrap();

        let agent = MockAgent::new().with_response(AgentTask::Consolidate, r#"{"data": "Calm."}"#);
        let cancel = CancellationToken::new();
        let paths = [path.clone()];
        let lazy = consolidate_paths(&mut tree, &paths, false, &agent, &quick(), &cancel).await;
        assert!(lazy.consolidated.is_empty());

        let forced = consolidate_paths(&mut tree, &paths, true, &agent, &quick(), &cancel).await;
        assert_eq!(forced.consolidated, vec![path]);
    }
}
