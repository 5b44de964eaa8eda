//! Source attribution and link safety.
//!
//! A [`Source`] attributes part of an answer to a specific course/lesson.
//! Links travel to a frontend that renders them as anchors, so only `http`
//! and `https` URLs are allowed through; anything else (including case- or
//! whitespace-obscured schemes like `JaVaScRiPt:` or `java\tscript:`) is
//! silently downgraded to "no link". A rejected scheme is a defense, not a
//! user-facing error.

use serde::Serialize;

/// A `{display_text, link}` pair attributing an answer to course material.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub display_text: String,
    pub link: Option<String>,
}

impl Source {
    pub fn new(display_text: impl Into<String>, link: Option<String>) -> Self {
        Self {
            display_text: display_text.into(),
            link: link.filter(|l| is_safe_url(l)),
        }
    }
}

/// Scheme allow-list check: accept only `http://` and `https://` URLs.
///
/// Whitespace and control characters are stripped before the check so that
/// obscured schemes (`"jav\tascript:..."`) cannot sneak through, and the
/// scheme comparison is case-insensitive.
pub fn is_safe_url(url: &str) -> bool {
    let cleaned: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    let lowered = cleaned.to_lowercase();

    for scheme in ["http://", "https://"] {
        if let Some(rest) = lowered.strip_prefix(scheme) {
            return !rest.is_empty();
        }
    }
    false
}
