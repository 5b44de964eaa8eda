//! Core data models used throughout Lectern.
//!
//! These types represent the courses, lessons, and chunks that flow through
//! the ingestion and retrieval pipeline, plus the result types produced by
//! the search engine.

use serde::{Deserialize, Serialize};

/// A single lesson within a course.
///
/// Serialized into the course catalog's `lessons_json` column, so the field
/// names here are also the stored JSON keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub lesson_number: u32,
    pub title: String,
    pub lesson_link: Option<String>,
}

/// Catalog metadata for one course document.
///
/// The title acts as the primary key: courses are created once at ingestion
/// time and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Course {
    pub title: String,
    pub course_link: Option<String>,
    pub instructor: Option<String>,
    pub lessons: Vec<Lesson>,
}

/// A chunk of lesson text ready for embedding and storage.
///
/// `chunk_index` increases monotonically across lesson boundaries within one
/// course, so document order can be reconstructed downstream. The stable
/// chunk id is derived from `course_title` and `chunk_index`.
#[derive(Debug, Clone)]
pub struct CourseChunk {
    pub content: String,
    pub course_title: String,
    pub lesson_number: Option<u32>,
    pub chunk_index: i64,
}

impl CourseChunk {
    /// Stable identifier used as the chunk's primary key.
    pub fn id(&self) -> String {
        format!("{}::{}", self.course_title, self.chunk_index)
    }
}

/// One ranked result from a similarity search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub content: String,
    pub course_title: String,
    pub lesson_number: Option<u32>,
    /// `1 - cosine similarity`; lower is closer.
    pub distance: f64,
}

/// Outcome of a retrieval-store search.
///
/// An unresolvable course-name filter is reported separately from a search
/// that matched nothing, and store failures are absorbed into `Failed` so a
/// bad query cannot abort the orchestration pipeline.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// Ranked hits; may be empty (zero matches).
    Hits(Vec<SearchHit>),
    /// The `course_name` filter did not resolve to any catalog entry.
    CourseNotFound(String),
    /// The underlying store or embedding call failed.
    Failed(String),
}

/// Catalog summary returned by the `courses` command.
#[derive(Debug, Clone, Serialize)]
pub struct CourseAnalytics {
    pub total_courses: i64,
    pub course_titles: Vec<String>,
}
