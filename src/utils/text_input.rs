//! Free-text fields (names, complaints, notes, justifications).
//!
//! Every piece of free text that reaches the database goes through
//! [`TextInput`], which guarantees that it is:
//! - trimmed and non-empty
//! - within the length limit of its form
//! - free of control characters and HTML
//! - NFKC normalized

use ammonia::is_html;
use anyhow::{bail, Context, Result};
use std::fmt;
use unicode_normalization::UnicodeNormalization;
use validator::ValidateNonControlCharacter;

/// Maximum length for long-form content (notes, descriptions)
pub const MAX_LONG_TEXT_LENGTH: usize = 2_000;
/// Maximum length for short-form content (names, titles, locations)
pub const MAX_SHORT_TEXT_LENGTH: usize = 250;

/// Validated free text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextInput {
    text_content: String,
}

impl TextInput {
    /// Long-form content such as clinical notes or a dispatch description.
    pub fn new_long_form(content: &str) -> Result<Self> {
        Self::new(content, MAX_LONG_TEXT_LENGTH).context("Failed to create long-form content")
    }

    /// Short-form content such as a name or a facility.
    pub fn new_short_form(content: &str) -> Result<Self> {
        Self::new(content, MAX_SHORT_TEXT_LENGTH).context("Failed to create short-form content")
    }

    fn new(content: &str, max_length: usize) -> Result<Self> {
        let trimmed = content.trim();

        if trimmed.is_empty() {
            bail!("Content cannot be empty");
        }

        if trimmed.chars().count() > max_length {
            bail!("Content exceeds maximum length of {} characters", max_length);
        }

        // Line breaks are allowed in long-form notes, every other control character is not
        let without_breaks: String = trimmed.chars().filter(|c| !matches!(c, '\n' | '\r' | '\t')).collect();
        if !without_breaks.validate_non_control_character() {
            bail!("Content contains invalid control characters");
        }

        if is_html(trimmed) {
            bail!("Content cannot contain HTML");
        }

        let normalized = trimmed.nfkc().collect::<String>();

        Ok(Self {
            text_content: normalized,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text_content
    }

    pub fn into_inner(self) -> String {
        self.text_content
    }
}

impl fmt::Display for TextInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text_content)
    }
}

impl AsRef<str> for TextInput {
    fn as_ref(&self) -> &str {
        &self.text_content
    }
}
