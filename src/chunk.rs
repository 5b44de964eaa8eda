//! Fixed-window overlapping text chunker.
//!
//! Splits lesson text into windows of `chunk_size` characters with a
//! backward overlap of `chunk_overlap` characters, so adjacent chunks share
//! a trailing/leading span. The overlap preserves local context across a cut
//! sentence for retrieval.
//!
//! Windows are measured in characters, not bytes, so multi-byte UTF-8 is
//! never split mid-codepoint.
//!
//! # Guarantees
//!
//! - Concatenating the chunks with the overlap removed reconstructs the
//!   input text exactly.
//! - A text shorter than one window yields exactly one chunk.
//! - Empty text yields zero chunks.
//! - Chunk indices assigned by [`chunk_document`] are strictly increasing
//!   across lesson boundaries within one course, starting at 0.

use crate::document::ParsedDocument;
use crate::models::CourseChunk;

/// Split one lesson body into overlapping character windows.
///
/// Window starts advance by `chunk_size - chunk_overlap` characters; the
/// final window may be shorter. `chunk_overlap` must be smaller than
/// `chunk_size` (validated at config load).
pub fn chunk_lesson(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let char_starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total_chars = char_starts.len();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(total_chars);
        let byte_start = char_starts[start];
        let byte_end = if end == total_chars {
            text.len()
        } else {
            char_starts[end]
        };
        chunks.push(text[byte_start..byte_end].to_string());

        if end == total_chars {
            break;
        }
        start += step;
    }

    chunks
}

/// Chunk every lesson of a parsed document, stamping course and lesson
/// metadata.
///
/// The `chunk_index` counter continues across lesson boundaries so the
/// course's full chunk sequence can be reconstructed in document order.
pub fn chunk_document(
    doc: &ParsedDocument,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<CourseChunk> {
    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;

    for lesson in &doc.lessons {
        for content in chunk_lesson(&lesson.body, chunk_size, chunk_overlap) {
            chunks.push(CourseChunk {
                content,
                course_title: doc.course.title.clone(),
                lesson_number: Some(lesson.lesson_number),
                chunk_index,
            });
            chunk_index += 1;
        }
    }

    chunks
}
