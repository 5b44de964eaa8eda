//! End-to-end orchestration tests: real temporary store, real ingestion,
//! scripted model client. Exercises the two-phase protocol, source
//! attribution, the drain invariant, and session behavior.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use lectern::config::Config;
use lectern::ingest::run_ingest;
use lectern::llm::{ChatMessage, ContentBlock, ModelClient, ModelResponse, ToolDefinition};
use lectern::models::{Course, CourseChunk};
use lectern::orchestrator::Orchestrator;
use lectern::store::RetrievalStore;
use lectern::tools::{CourseSearchTool, Tool};

/// Replays a fixed sequence of responses and records what each call looked
/// like: how many tool schemas were attached, and any tool-result blocks
/// present in the conversation.
struct ScriptedModel {
    responses: Mutex<VecDeque<ModelResponse>>,
    tools_per_call: Mutex<Vec<usize>>,
    seen_tool_results: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            tools_per_call: Mutex::new(Vec::new()),
            seen_tool_results: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(
        &self,
        _system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse> {
        self.tools_per_call.lock().unwrap().push(tools.len());
        for message in messages {
            for block in &message.content {
                if let ContentBlock::ToolResult { content, .. } = block {
                    self.seen_tool_results.lock().unwrap().push(content.clone());
                }
            }
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("model service unavailable"))
    }
}

fn answer(text: &str) -> ModelResponse {
    ModelResponse {
        content: vec![ContentBlock::Text {
            text: text.to_string(),
        }],
        stop_reason: Some("end_turn".to_string()),
    }
}

fn search_request(input: serde_json::Value) -> ModelResponse {
    tool_request("search_course_content", input)
}

fn tool_request(name: &str, input: serde_json::Value) -> ModelResponse {
    ModelResponse {
        content: vec![ContentBlock::ToolUse {
            id: "tu_1".to_string(),
            name: name.to_string(),
            input,
        }],
        stop_reason: Some("tool_use".to_string()),
    }
}

const RETRIEVAL_COURSE: &str = "\
Course Title: Intro to Retrieval
Course Link: https://example.com/retrieval
Course Instructor: Grace

Lesson 0: Welcome
Lesson Link: https://example.com/retrieval/lesson0
Lesson zero introduces embeddings and explains how similarity search works.

Lesson 1: Chunking
Chunking splits long lesson text into overlapping windows before embedding.
";

const COOKING_COURSE: &str = "\
Course Title: Weeknight Cooking
Course Link: https://example.com/cooking
Course Instructor: Julia

Lesson 0: Pantry Basics
A stocked pantry makes fast dinners possible on busy evenings.
";

/// Ingest the fixture courses into a fresh temp store and wire an
/// orchestrator around the given script.
async fn setup(
    tmp: &TempDir,
    responses: Vec<ModelResponse>,
) -> (Arc<Orchestrator>, Arc<ScriptedModel>) {
    let mut config = Config::minimal();
    config.db.path = tmp.path().join("lectern.sqlite");

    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    std::fs::write(docs.join("retrieval.txt"), RETRIEVAL_COURSE).unwrap();
    std::fs::write(docs.join("cooking.txt"), COOKING_COURSE).unwrap();

    let store = Arc::new(RetrievalStore::open(&config).await.unwrap());
    run_ingest(&config, &store, &docs, false).await.unwrap();

    let model = Arc::new(ScriptedModel::new(responses));
    let orchestrator = Arc::new(Orchestrator::new(&config, store, Box::new(ScriptedShared(model.clone()))));
    (orchestrator, model)
}

/// Lets tests keep a handle on the scripted model after the orchestrator
/// takes ownership of its client.
struct ScriptedShared(Arc<ScriptedModel>);

#[async_trait]
impl ModelClient for ScriptedShared {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse> {
        self.0.complete(system, messages, tools).await
    }
}

#[tokio::test]
async fn test_search_query_returns_answer_with_sources() {
    let tmp = TempDir::new().unwrap();
    let (orchestrator, model) = setup(
        &tmp,
        vec![
            search_request(serde_json::json!({
                "query": "how does similarity search work",
                "course_name": "Retrieval",
                "lesson_number": 0
            })),
            answer("Lesson 0 explains similarity search over embeddings."),
        ],
    )
    .await;

    let response = orchestrator
        .query("How does similarity search work?", None)
        .await
        .unwrap();

    assert_eq!(
        response.answer,
        "Lesson 0 explains similarity search over embeddings."
    );
    assert!(!response.sources.is_empty());
    assert_eq!(response.sources[0].display_text, "Intro to Retrieval - Lesson 0");
    assert_eq!(
        response.sources[0].link.as_deref(),
        Some("https://example.com/retrieval/lesson0")
    );

    // First call advertised the search tool; the synthesis call withheld it.
    assert_eq!(*model.tools_per_call.lock().unwrap(), vec![1, 0]);
}

#[tokio::test]
async fn test_direct_answer_skips_dispatch_and_has_no_sources() {
    let tmp = TempDir::new().unwrap();
    let (orchestrator, model) = setup(&tmp, vec![answer("Hello! Ask me about a course.")]).await;

    let response = orchestrator.query("Hi there", None).await.unwrap();

    assert_eq!(response.answer, "Hello! Ask me about a course.");
    assert!(response.sources.is_empty());
    assert_eq!(*model.tools_per_call.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_unmatched_course_reports_not_found_to_model() {
    let tmp = TempDir::new().unwrap();
    let (orchestrator, model) = setup(
        &tmp,
        vec![
            search_request(serde_json::json!({
                "query": "anything",
                "course_name": "Quantum Basketweaving 9000"
            })),
            answer("I could not find that course."),
        ],
    )
    .await;

    let response = orchestrator.query("Tell me about basketweaving", None).await.unwrap();

    assert_eq!(response.answer, "I could not find that course.");
    assert!(response.sources.is_empty());
    let results = model.seen_tool_results.lock().unwrap();
    assert!(results
        .iter()
        .any(|r| r == "No course found matching 'Quantum Basketweaving 9000'"));
}

#[tokio::test]
async fn test_zero_matches_is_distinct_from_course_not_found() {
    let tmp = TempDir::new().unwrap();
    let (orchestrator, model) = setup(
        &tmp,
        vec![
            search_request(serde_json::json!({
                "query": "anything",
                "course_name": "Retrieval",
                "lesson_number": 42
            })),
            answer("That lesson has no content."),
        ],
    )
    .await;

    let response = orchestrator.query("What is in lesson 42?", None).await.unwrap();

    assert!(response.sources.is_empty());
    let results = model.seen_tool_results.lock().unwrap();
    assert!(results
        .iter()
        .any(|r| r == "No relevant content found in course 'Retrieval' in lesson 42."));
}

#[tokio::test]
async fn test_unknown_tool_request_is_relayed_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let (orchestrator, model) = setup(
        &tmp,
        vec![
            tool_request("web_search", serde_json::json!({"query": "anything"})),
            answer("I only have access to course materials."),
        ],
    )
    .await;

    let response = orchestrator.query("Search the web for this", None).await.unwrap();

    assert_eq!(response.answer, "I only have access to course materials.");
    let results = model.seen_tool_results.lock().unwrap();
    assert!(results.iter().any(|r| r == "Tool 'web_search' not found"));
}

// ============ Drain invariant ============

#[tokio::test]
async fn test_sources_do_not_leak_into_the_next_query() {
    let tmp = TempDir::new().unwrap();
    let (orchestrator, _model) = setup(
        &tmp,
        vec![
            search_request(serde_json::json!({"query": "embeddings"})),
            answer("Embeddings are covered in lesson 0."),
            answer("You're welcome!"),
        ],
    )
    .await;

    let first = orchestrator.query("What are embeddings?", None).await.unwrap();
    assert!(!first.sources.is_empty());
    assert!(orchestrator.registry().last_sources().is_empty());

    // The follow-up never searched, so it must carry no sources.
    let second = orchestrator.query("Thanks!", None).await.unwrap();
    assert!(second.sources.is_empty());
}

#[tokio::test]
async fn test_buffer_is_drained_even_when_synthesis_fails() {
    let tmp = TempDir::new().unwrap();
    // One scripted response: the dispatch succeeds, then the synthesis call
    // finds the script exhausted and errors.
    let (orchestrator, _model) = setup(
        &tmp,
        vec![search_request(serde_json::json!({"query": "embeddings"}))],
    )
    .await;

    let result = orchestrator.query("What are embeddings?", None).await;
    assert!(result.is_err());
    assert!(
        orchestrator.registry().last_sources().is_empty(),
        "a failed query must not leave sources behind"
    );
}

// ============ Sessions ============

#[tokio::test]
async fn test_session_continuity_and_truncation() {
    let tmp = TempDir::new().unwrap();
    let (orchestrator, _model) = setup(
        &tmp,
        vec![answer("a0"), answer("a1"), answer("a2")],
    )
    .await;

    let first = orchestrator.query("q0", None).await.unwrap();
    let id = first.session_id.clone();
    orchestrator.query("q1", Some(&id)).await.unwrap();
    orchestrator.query("q2", Some(&id)).await.unwrap();

    // max_history defaults to 2 pairs; the oldest exchange is gone.
    assert_eq!(orchestrator.sessions().turn_count(&id), 4);
    let history = orchestrator.sessions().history(&id).unwrap();
    assert!(!history.contains("q0"));
    assert!(history.contains("User: q1"));
    assert!(history.contains("Assistant: a2"));
}

#[tokio::test]
async fn test_concurrent_queries_serialize_without_source_leaks() {
    let tmp = TempDir::new().unwrap();
    // Two identical request/answer pairs: whichever query wins the lock
    // consumes a full pair, so the outcome is order-insensitive.
    let (orchestrator, _model) = setup(
        &tmp,
        vec![
            search_request(serde_json::json!({"query": "embeddings", "course_name": "Retrieval"})),
            answer("Covered in lesson 0."),
            search_request(serde_json::json!({"query": "embeddings", "course_name": "Retrieval"})),
            answer("Covered in lesson 0."),
        ],
    )
    .await;

    let id = {
        let a = orchestrator.clone();
        let b = orchestrator.clone();
        let session = a.sessions().create();
        let sid_a = session.clone();
        let sid_b = session.clone();
        let (ra, rb) = tokio::join!(
            async move { a.query("What are embeddings?", Some(&sid_a)).await },
            async move { b.query("What are embeddings?", Some(&sid_b)).await },
        );
        let ra = ra.unwrap();
        let rb = rb.unwrap();

        // Each query drained exactly its own sources.
        assert!(!ra.sources.is_empty());
        assert!(!rb.sources.is_empty());
        assert_eq!(ra.sources, rb.sources);
        session
    };

    assert!(orchestrator.registry().last_sources().is_empty());
    // Both exchanges recorded, pairs kept intact.
    assert_eq!(orchestrator.sessions().turn_count(&id), 4);
    let history = orchestrator.sessions().history(&id).unwrap();
    let user_positions: Vec<_> = history.match_indices("User:").map(|(i, _)| i).collect();
    let assistant_positions: Vec<_> =
        history.match_indices("Assistant:").map(|(i, _)| i).collect();
    assert_eq!(user_positions.len(), 2);
    assert_eq!(assistant_positions.len(), 2);
    assert!(user_positions[0] < assistant_positions[0]);
    assert!(assistant_positions[0] < user_positions[1]);
}

#[tokio::test]
async fn test_source_has_no_link_when_lesson_link_is_missing() {
    let tmp = TempDir::new().unwrap();
    // The cooking course's lesson 0 declares no Lesson Link line, so its
    // source must come back link-free rather than borrowing another URL.
    let (orchestrator, _model) = setup(
        &tmp,
        vec![
            search_request(serde_json::json!({
                "query": "stocked pantry fast dinners busy evenings",
                "course_name": "Cooking"
            })),
            answer("Keep a stocked pantry."),
        ],
    )
    .await;

    let response = orchestrator.query("How do I cook faster?", None).await.unwrap();

    assert!(!response.sources.is_empty());
    assert_eq!(
        response.sources[0].display_text,
        "Weeknight Cooking - Lesson 0"
    );
    // Lesson 0 of the cooking course has no lesson link in the document.
    assert_eq!(response.sources[0].link, None);
}

#[tokio::test]
async fn test_lessonless_chunk_source_falls_back_to_course_link() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal();
    config.db.path = tmp.path().join("lectern.sqlite");

    // A chunk with no lesson tag, as an external loader may produce for
    // course-level preamble text.
    let store = Arc::new(RetrievalStore::open(&config).await.unwrap());
    store
        .upsert_course(&Course {
            title: "Field Notes".to_string(),
            course_link: Some("https://example.com/field-notes".to_string()),
            instructor: None,
            lessons: Vec::new(),
        })
        .await
        .unwrap();
    store
        .embed_and_store(&[CourseChunk {
            content: "General overview text that belongs to no lesson.".to_string(),
            course_title: "Field Notes".to_string(),
            lesson_number: None,
            chunk_index: 0,
        }])
        .await
        .unwrap();

    let tool = CourseSearchTool::new(store);
    let outcome = tool
        .execute(&serde_json::json!({"query": "general overview text"}))
        .await;

    assert!(outcome.text.starts_with("[Field Notes]\n"));
    assert_eq!(outcome.sources.len(), 1);
    assert_eq!(outcome.sources[0].display_text, "Field Notes");
    assert_eq!(
        outcome.sources[0].link.as_deref(),
        Some("https://example.com/field-notes")
    );
}
