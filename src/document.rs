//! Course document parsing.
//!
//! A course document is plain text with a header block followed by one or
//! more lesson blocks:
//!
//! ```text
//! Course Title: Building Towards Computer Use
//! Course Link: https://example.com/course
//! Course Instructor: Colt Steele
//!
//! Lesson 0: Introduction
//! Lesson Link: https://example.com/lesson0
//! Body text of the first lesson...
//!
//! Lesson 1: Getting Set Up
//! More body text...
//! ```
//!
//! The title is required; link and instructor are optional. A malformed
//! header fails ingestion for that document only, so one bad file cannot
//! abort a batch load.

use anyhow::{bail, Result};

use crate::models::{Course, Lesson};

/// The body text of one lesson, paired with its number for chunk stamping.
#[derive(Debug, Clone)]
pub struct LessonBody {
    pub lesson_number: u32,
    pub body: String,
}

/// A fully parsed course document: catalog metadata plus lesson bodies.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub course: Course,
    pub lessons: Vec<LessonBody>,
}

/// Parse a course document from raw text.
///
/// # Errors
///
/// Returns an error if the header block has no `Course Title:` line.
pub fn parse_course_document(text: &str) -> Result<ParsedDocument> {
    let mut title: Option<String> = None;
    let mut course_link: Option<String> = None;
    let mut instructor: Option<String> = None;

    let mut lessons: Vec<Lesson> = Vec::new();
    let mut bodies: Vec<LessonBody> = Vec::new();

    // Current lesson block being accumulated.
    let mut current: Option<(u32, String, Option<String>, Vec<String>)> = None;
    let mut in_header = true;

    for line in text.lines() {
        if let Some((number, lesson_title)) = parse_lesson_marker(line) {
            in_header = false;
            if let Some(block) = current.take() {
                push_lesson(&mut lessons, &mut bodies, block);
            }
            current = Some((number, lesson_title, None, Vec::new()));
            continue;
        }

        if in_header {
            if let Some(value) = header_value(line, "Course Title:") {
                title = Some(value);
            } else if let Some(value) = header_value(line, "Course Link:") {
                course_link = Some(value);
            } else if let Some(value) = header_value(line, "Course Instructor:") {
                instructor = Some(value);
            }
            // Other leading lines are ignored.
            continue;
        }

        if let Some(block) = current.as_mut() {
            if block.2.is_none() && block.3.is_empty() {
                if let Some(value) = header_value(line, "Lesson Link:") {
                    block.2 = Some(value);
                    continue;
                }
            }
            block.3.push(line.to_string());
        }
    }

    if let Some(block) = current.take() {
        push_lesson(&mut lessons, &mut bodies, block);
    }

    let Some(title) = title else {
        bail!("Malformed course document: missing 'Course Title:' header line");
    };

    Ok(ParsedDocument {
        course: Course {
            title,
            course_link,
            instructor,
            lessons,
        },
        lessons: bodies,
    })
}

fn push_lesson(
    lessons: &mut Vec<Lesson>,
    bodies: &mut Vec<LessonBody>,
    (number, title, link, lines): (u32, String, Option<String>, Vec<String>),
) {
    lessons.push(Lesson {
        lesson_number: number,
        title,
        lesson_link: link,
    });
    bodies.push(LessonBody {
        lesson_number: number,
        body: lines.join("\n").trim().to_string(),
    });
}

/// Match a `Lesson N: title` marker line.
fn parse_lesson_marker(line: &str) -> Option<(u32, String)> {
    let rest = line.trim_start().strip_prefix("Lesson ")?;
    let colon = rest.find(':')?;
    let number: u32 = rest[..colon].trim().parse().ok()?;
    let title = rest[colon + 1..].trim().to_string();
    Some((number, title))
}

/// Extract the value of a `Prefix: value` header line, case-insensitively.
fn header_value(line: &str, prefix: &str) -> Option<String> {
    let trimmed = line.trim_start();
    if trimmed.len() >= prefix.len() && trimmed[..prefix.len()].eq_ignore_ascii_case(prefix) {
        let value = trimmed[prefix.len()..].trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    } else {
        None
    }
}
