//! # Lectern
//!
//! A retrieval-augmented question answering system for course materials.
//!
//! Lectern ingests structured course documents, chunks and embeds them into
//! SQLite, and answers natural-language questions by letting a language
//! model decide — at runtime — whether to search the indexed content before
//! composing an answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────┐
//! │ Documents │──▶│   Pipeline    │──▶│  SQLite    │
//! │ (courses) │   │ Chunk+Embed  │   │ catalog+vec│
//! └───────────┘   └──────────────┘   └─────┬─────┘
//!                                          │
//!                          ┌───────────────┘
//!                          ▼
//!                  ┌──────────────┐   ┌──────────────┐
//!                  │ Search Tool  │◀──│ Orchestrator  │◀── query
//!                  │ + Registry   │   │ (two-phase)   │──▶ answer+sources
//!                  └──────────────┘   └──────┬───────┘
//!                                            ▼
//!                                     ┌──────────────┐
//!                                     │ Model client │
//!                                     └──────────────┘
//! ```
//!
//! ## Query flow
//!
//! A query (plus optional session id) enters the [`orchestrator`]; prior
//! history is folded into the prompt; the first model call carries tool
//! schemas. If the model requests a search, the [`tools`] registry
//! dispatches to the search tool, which queries the [`store`]; results go
//! back to the model in a second call with schemas withheld, forcing a
//! final answer. The orchestrator then drains the registry's last-sources
//! buffer and returns the answer with its sources.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`document`] | Course document parsing |
//! | [`chunk`] | Overlapping-window text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Retrieval store: catalog + filtered similarity search |
//! | [`fuzzy`] | Course-title fuzzy matching |
//! | [`sources`] | Source attribution and link safety |
//! | [`session`] | Bounded conversation history |
//! | [`llm`] | Model-client boundary (messages API) |
//! | [`tools`] | Tool trait, search tool, registry |
//! | [`orchestrator`] | Two-phase query protocol |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod document;
pub mod embedding;
pub mod fuzzy;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod session;
pub mod sources;
pub mod store;
pub mod tools;
