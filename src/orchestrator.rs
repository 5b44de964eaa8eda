//! Query orchestration: the two-phase tool protocol.
//!
//! Each query walks an explicit state machine:
//!
//! ```text
//! Compose ──▶ AwaitingToolDecision ──(plain answer)──▶ Finalize
//!                     │
//!               (tool request)
//!                     ▼
//!                 Dispatch ──▶ Synthesizing ──▶ Finalize
//! ```
//!
//! The first model call carries tool schemas; if the model requests tools,
//! every invocation is dispatched through the registry and the extended
//! conversation is resent **without** schemas, forcing a final synthesis.
//! Exactly one dispatch round is performed; a model that requests tools
//! again after the second call is not accommodated.
//!
//! Finalize drains the registry's last-sources buffer exactly once per
//! query — read-and-clear happens atomically, and clearing happens even
//! when a model call fails, so sources can never leak into an unrelated
//! answer. A registry-level mutex serializes the whole call sequence across
//! concurrent queries; retrieval reads themselves stay concurrent.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::llm::{ChatMessage, ContentBlock, ModelClient};
use crate::session::SessionStore;
use crate::sources::Source;
use crate::store::RetrievalStore;
use crate::tools::{CourseSearchTool, ToolRegistry};

/// Where a query currently stands in the two-phase protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    /// First model call: tool schemas attached, the model may answer
    /// directly or request a search.
    AwaitingToolDecision,
    /// Second model call: tool results are in the conversation and schemas
    /// are withheld, so the model must produce a final answer.
    Synthesizing,
}

/// The answer to one query, with its attributed sources.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub session_id: String,
}

const SYSTEM_PROMPT: &str = "\
You are an AI assistant specialized in course materials. You have access to \
a search tool over the course content.

- Use the search tool only when a question concerns specific course content; \
answer general questions from your own knowledge.
- One search per question at most. Synthesize the returned excerpts into a \
direct, accurate answer and do not mention the search process itself.
- If the search reports no matching content, say so plainly.";

pub struct Orchestrator {
    model: Box<dyn ModelClient>,
    registry: ToolRegistry,
    sessions: SessionStore,
    /// Serializes the first-call → dispatch → finalize sequence. Global
    /// rather than per-session: the last-sources buffer is registry-wide,
    /// so per-session locking could still leak sources across sessions.
    query_lock: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(config: &Config, store: Arc<RetrievalStore>, model: Box<dyn ModelClient>) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CourseSearchTool::new(store)));

        Self {
            model,
            registry,
            sessions: SessionStore::new(config.session.max_history),
            query_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Answer one query, optionally continuing an existing session.
    ///
    /// Only model-service faults propagate as errors; retrieval and
    /// tool-dispatch faults surface inside the answer text instead.
    pub async fn query(&self, query: &str, session_id: Option<&str>) -> Result<QueryResponse> {
        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => self.sessions.create(),
        };

        let _guard = self.query_lock.lock().await;

        // Compose: fold prior history into the system prompt.
        let system = match self.sessions.history(&session_id) {
            Some(history) => format!("{}\n\nPrevious conversation:\n{}", SYSTEM_PROMPT, history),
            None => SYSTEM_PROMPT.to_string(),
        };
        let messages = vec![ChatMessage::user_text(format!(
            "Answer this question about course materials: {}",
            query
        ))];

        let result = self.run_phases(&system, messages).await;

        // Finalize. Drain before inspecting the result: even when a model
        // call failed mid-protocol, the buffer must be empty for the next
        // query.
        let sources = self.registry.take_last_sources();
        let answer = result?;

        self.sessions.add_exchange(&session_id, query, &answer);

        Ok(QueryResponse {
            answer,
            sources,
            session_id,
        })
    }

    async fn run_phases(&self, system: &str, mut messages: Vec<ChatMessage>) -> Result<String> {
        let mut phase = QueryPhase::AwaitingToolDecision;

        loop {
            match phase {
                QueryPhase::AwaitingToolDecision => {
                    let response = self
                        .model
                        .complete(system, &messages, &self.registry.definitions())
                        .await?;

                    if !response.wants_tools() {
                        return Ok(response.text());
                    }

                    // Dispatch: the model may request several invocations in
                    // one turn; each result is tagged with its invocation id.
                    let mut results = Vec::new();
                    for (id, name, input) in response.tool_uses() {
                        let content = self.registry.execute(name, input).await;
                        results.push(ContentBlock::ToolResult {
                            tool_use_id: id.to_string(),
                            content,
                        });
                    }

                    messages.push(ChatMessage::assistant(response.content.clone()));
                    messages.push(ChatMessage::user_blocks(results));
                    phase = QueryPhase::Synthesizing;
                }
                QueryPhase::Synthesizing => {
                    // Schemas withheld: the model cannot recurse into tools.
                    let response = self.model.complete(system, &messages, &[]).await?;
                    return Ok(response.text());
                }
            }
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}
