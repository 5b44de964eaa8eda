//! Tools the model may invoke mid-conversation, and their registry.
//!
//! A [`Tool`] is a named, schema-described capability dispatched by name.
//! Execution is infallible from the registry's point of view: anything that
//! goes wrong (unknown tool, malformed arguments, store failure) becomes the
//! tool-result text, letting the model's second call explain the failure to
//! the user instead of crashing the pipeline.
//!
//! The registry also owns the cross-call "last sources" buffer. Any tool may
//! populate it — the registry does not track which one did. Only one tool is
//! expected to produce sources per query in the current design; that is a
//! documented assumption, not an enforced contract. The orchestrator drains
//! the buffer exactly once per query via [`ToolRegistry::take_last_sources`].

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::llm::ToolDefinition;
use crate::models::SearchOutcome;
use crate::sources::Source;
use crate::store::RetrievalStore;

/// What one tool invocation produced: the text shown to the model, plus the
/// sources backing it.
pub struct ToolOutcome {
    pub text: String,
    pub sources: Vec<Source>,
}

impl ToolOutcome {
    fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Schema advertised to the model in the first call of each query.
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. Errors are reported in the outcome text, never as `Err`.
    async fn execute(&self, args: &Value) -> ToolOutcome;
}

/// Holds the available tools and the registry-wide last-sources buffer.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    last_sources: Mutex<Vec<Source>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            last_sources: Mutex::new(Vec::new()),
        }
    }

    /// Add a tool, keyed by its declared name. Duplicate names overwrite:
    /// last registration wins.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Schemas of all registered tools, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Dispatch an invocation by name and record its sources.
    ///
    /// An unknown name returns an error string as the tool-result text so
    /// orchestration can relay it into the model's second call.
    pub async fn execute(&self, name: &str, args: &Value) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            return format!("Tool '{}' not found", name);
        };

        let outcome = tool.execute(args).await;
        *self
            .last_sources
            .lock()
            .expect("last-sources lock poisoned") = outcome.sources;
        outcome.text
    }

    /// Peek at the buffer without clearing it. Idempotent.
    pub fn last_sources(&self) -> Vec<Source> {
        self.last_sources
            .lock()
            .expect("last-sources lock poisoned")
            .clone()
    }

    pub fn reset_sources(&self) {
        self.last_sources
            .lock()
            .expect("last-sources lock poisoned")
            .clear();
    }

    /// Read and clear in one lock acquisition, so a concurrent dispatch can
    /// never observe a half-drained buffer.
    pub fn take_last_sources(&self) -> Vec<Source> {
        std::mem::take(
            &mut *self
                .last_sources
                .lock()
                .expect("last-sources lock poisoned"),
        )
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Course search tool ============

/// Searches course materials, with optional course-name and lesson filters.
pub struct CourseSearchTool {
    store: Arc<RetrievalStore>,
}

impl CourseSearchTool {
    pub const NAME: &'static str = "search_course_content";

    pub fn new(store: Arc<RetrievalStore>) -> Self {
        Self { store }
    }

    fn heading(course_title: &str, lesson_number: Option<u32>) -> String {
        match lesson_number {
            Some(n) => format!("{} - Lesson {}", course_title, n),
            None => course_title.to_string(),
        }
    }
}

#[async_trait]
impl Tool for CourseSearchTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Search course materials with smart course name matching and \
                          lesson filtering"
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for in course content"
                    },
                    "course_name": {
                        "type": "string",
                        "description": "Course title (partial matches work, e.g. 'MCP', 'Intro')"
                    },
                    "lesson_number": {
                        "type": "integer",
                        "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, args: &Value) -> ToolOutcome {
        let Some(query) = args.get("query").and_then(|q| q.as_str()) else {
            return ToolOutcome::text_only("Missing required argument: query");
        };
        let course_name = args.get("course_name").and_then(|c| c.as_str());
        let lesson_number = args
            .get("lesson_number")
            .and_then(|n| n.as_u64())
            .map(|n| n as u32);

        let outcome = self
            .store
            .search(query, course_name, lesson_number, None)
            .await;

        let hits = match outcome {
            SearchOutcome::Failed(message) => return ToolOutcome::text_only(message),
            SearchOutcome::CourseNotFound(name) => {
                return ToolOutcome::text_only(format!("No course found matching '{}'", name));
            }
            SearchOutcome::Hits(hits) => hits,
        };

        if hits.is_empty() {
            let mut text = String::from("No relevant content found");
            if let Some(name) = course_name {
                text.push_str(&format!(" in course '{}'", name));
            }
            if let Some(n) = lesson_number {
                text.push_str(&format!(" in lesson {}", n));
            }
            text.push('.');
            return ToolOutcome::text_only(text);
        }

        let mut blocks = Vec::with_capacity(hits.len());
        let mut sources = Vec::with_capacity(hits.len());

        for hit in &hits {
            let heading = Self::heading(&hit.course_title, hit.lesson_number);
            blocks.push(format!("[{}]\n{}", heading, hit.content));

            let link = match hit.lesson_number {
                Some(n) => self.store.get_lesson_link(&hit.course_title, n).await,
                None => self.store.get_course_link(&hit.course_title).await,
            };
            // Source::new downgrades disallowed URL schemes to no-link.
            sources.push(Source::new(heading, link));
        }

        ToolOutcome {
            text: blocks.join("\n\n"),
            sources,
        }
    }
}
