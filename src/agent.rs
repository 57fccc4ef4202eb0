//! Agent client: the text-generation collaborator behind extraction,
//! consolidation and context updates
//!
//! Every call is fallible and non-deterministic. The client trait only
//! moves text; [`decode`] turns a response into a typed value and maps
//! shape errors to [`AgentError::Malformed`].
//!
//! Two implementations:
//! - `CommandAgent`: runs an external command, request JSON on stdin,
//!   response on stdout (production)
//! - `MockAgent`: scripted responses and a request log (testing)

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::wiki::AttributeValue;

/// Which job an agent call performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTask {
    Extract,
    Consolidate,
    Summarize,
}

impl std::fmt::Display for AgentTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Extract => "extract",
            Self::Consolidate => "consolidate",
            Self::Summarize => "summarize",
        };
        write!(f, "{}", s)
    }
}

/// One request to the agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRequest {
    pub task: AgentTask,
    /// System instructions
    pub system: String,
    /// User prompt
    pub prompt: String,
    /// JSON schema the response must satisfy
    pub schema: Value,
}

/// Errors from agent calls. All of them are retryable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("agent not available: {0}")]
    Unavailable(String),
    #[error("agent call failed: {0}")]
    CallFailed(String),
    #[error("agent call timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed agent response: {0}")]
    Malformed(String),
}

/// Client trait for calling the agent.
///
/// Abstracts over transport (subprocess, HTTP, mock) so the chunk
/// processor doesn't depend on how the agent is reached.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Send one request and return the raw response text.
    async fn call(&self, request: &AgentRequest) -> Result<String, AgentError>;
}

/// Consolidation answer: the rewritten attribute data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsolidationResponse {
    /// Markdown text, or a list of strings for list attributes
    pub data: Value,
}

impl ConsolidationResponse {
    pub fn into_value(self) -> Result<AttributeValue, AgentError> {
        serde_json::from_value(self.data)
            .map_err(|e| {
                AgentError::Malformed(format!("data must be a string or list of strings: {}", e))
            })
    }
}

/// Context-update answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SummaryResponse {
    /// Markdown summary of the chunk in light of the prior context
    pub summary: String,
}

/// JSON schema of a response type, as sent in requests.
pub fn response_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}

/// Extract a JSON object from agent response text.
///
/// Agents sometimes wrap JSON in markdown code fences or add explanation text.
/// This function tries, in order:
/// 1. Direct parse (response is pure JSON)
/// 2. Extract from ```json ... ``` or ``` ... ``` fenced block
/// 3. Find the first `{` to last `}` span and parse that
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() {
            return Some(v);
        }
    }

    let fenced = if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        after.find("```").map(|end| &after[..end])
    } else if let Some(start) = trimmed.find("```\n") {
        let after = &trimmed[start + 4..];
        after.find("```").map(|end| &after[..end])
    } else {
        None
    };

    if let Some(block) = fenced {
        if let Ok(v) = serde_json::from_str::<Value>(block.trim()) {
            if v.is_object() {
                return Some(v);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                if v.is_object() {
                    return Some(v);
                }
            }
        }
    }

    None
}

/// Decode a response into `T`, treating any shape problem as malformed.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, AgentError> {
    let value = extract_json(text).ok_or_else(|| {
        let preview: String = text.chars().take(200).collect();
        AgentError::Malformed(format!("no JSON object in response: {}", preview))
    })?;
    serde_json::from_value(value).map_err(|e| AgentError::Malformed(e.to_string()))
}

/// Runs an external command per call.
///
/// The serialized [`AgentRequest`] is written to the command's stdin; its
/// stdout is the response text. A non-zero exit status is a failed call.
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
}

impl CommandAgent {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl AgentClient for CommandAgent {
    async fn call(&self, request: &AgentRequest) -> Result<String, AgentError> {
        let payload =
            serde_json::to_vec(request).map_err(|e| AgentError::CallFailed(e.to_string()))?;

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentError::Unavailable(format!("cannot start '{}': {}", self.program, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| AgentError::CallFailed(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AgentError::CallFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::CallFailed(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|e| AgentError::Malformed(e.to_string()))
    }
}

type Responder = Box<dyn Fn(&AgentRequest) -> Result<String, AgentError> + Send + Sync>;

/// Mock agent for testing.
///
/// Scripted responses are consumed first, per task, in order. When a
/// task's script is empty its responder (if any) answers. Every request
/// is recorded.
#[derive(Default)]
pub struct MockAgent {
    scripts: Mutex<HashMap<AgentTask, VecDeque<Result<String, AgentError>>>>,
    responders: HashMap<AgentTask, Responder>,
    log: Mutex<Vec<AgentRequest>>,
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response for a task.
    pub fn with_response(self, task: AgentTask, response: impl Into<String>) -> Self {
        self.push(task, Ok(response.into()));
        self
    }

    /// Queue a failure for a task.
    pub fn with_failure(self, task: AgentTask, error: AgentError) -> Self {
        self.push(task, Err(error));
        self
    }

    /// Answer a task with a closure once its script runs out.
    pub fn with_responder<F>(mut self, task: AgentTask, responder: F) -> Self
    where
        F: Fn(&AgentRequest) -> Result<String, AgentError> + Send + Sync + 'static,
    {
        self.responders.insert(task, Box::new(responder));
        self
    }

    /// Queue a response after construction.
    pub fn push(&self, task: AgentTask, response: Result<String, AgentError>) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(task)
            .or_default()
            .push_back(response);
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Requests received for one task.
    pub fn requests_for(&self, task: AgentTask) -> Vec<AgentRequest> {
        self.requests().into_iter().filter(|r| r.task == task).collect()
    }
}

#[async_trait]
impl AgentClient for MockAgent {
    async fn call(&self, request: &AgentRequest) -> Result<String, AgentError> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let scripted = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&request.task)
            .and_then(VecDeque::pop_front);

        match scripted {
            Some(response) => response,
            None => match self.responders.get(&request.task) {
                Some(responder) => responder(request),
                None => Err(AgentError::Unavailable(format!(
                    "no mock response for task '{}'",
                    request.task
                ))),
            },
        }
    }
}
