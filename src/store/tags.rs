//! Descriptive tags attached to uploaded objects.
//!
//! S3 restricts tag values to letters, digits, whitespace and `+ - = . _ : / @`,
//! at most 256 characters. Values are filtered and shortened to fit rather
//! than rejected, since the tags are informational.

use crate::pipeline::channel::TransferCommand;

/// Namespace used for tag keys when none is configured.
pub const DEFAULT_TAG_PREFIX: &str = "media";

/// Longest value kept as-is.
const MAX_TAG_VALUE_LEN: usize = 254;

/// Length a too-long value is cut to before the ellipsis.
const TRUNCATED_TAG_VALUE_LEN: usize = 250;

/// Ordered key/value tags for one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectTags {
    tags: Vec<(String, String)>,
}

impl ObjectTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the tag set for a command: the source URL plus every field of its
    /// tag bundle. Returns `None` when the command carries no bundle.
    pub fn for_command(prefix: &str, cmd: &TransferCommand) -> Option<Self> {
        let bundle = cmd.tags.as_ref()?;
        let mut tags = Self::new();
        tags.push(prefix, "original", &cmd.source_url);
        tags.push(prefix, "id", &bundle.id);
        tags.push(prefix, "title", &bundle.title);
        tags.push(prefix, "description", &bundle.description);
        tags.push(prefix, "author", &bundle.author);
        tags.push(prefix, "credit", &bundle.credit);
        tags.push(prefix, "copyright", &bundle.copyright);
        Some(tags)
    }

    /// Append `prefix:name = sanitized(value)`.
    pub fn push(&mut self, prefix: &str, name: &str, value: &str) {
        self.tags
            .push((format!("{prefix}:{name}"), sanitize_value(value)));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

fn allowed_in_value(c: char) -> bool {
    c.is_alphabetic()
        || c.is_numeric()
        || c.is_whitespace()
        || matches!(c, '+' | '-' | '=' | '.' | '_' | ':' | '/' | '@')
}

/// Drop disallowed characters and cap the length.
pub fn sanitize_value(value: &str) -> String {
    let filtered: String = value.chars().filter(|c| allowed_in_value(*c)).collect();
    if filtered.len() <= MAX_TAG_VALUE_LEN {
        return filtered;
    }

    let mut cut = TRUNCATED_TAG_VALUE_LEN;
    while !filtered.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &filtered[..cut])
}
