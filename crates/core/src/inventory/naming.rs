//! File naming convention for downloaded documents.
//!
//! `<agency-slug>_<YYYY-MM-DD>_<title-slug>_<remote_id>.<ext>`; parts without
//! data are left out, the remote id is always last.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::discovery::RemoteDocumentRecord;

/// Suffix of files still being written.
pub const PARTIAL_SUFFIX: &str = "part";

const MAX_SLUG_LEN: usize = 60;

const MAX_COPY_COUNTER_DIGITS: usize = 3;

/// How sure we are that a filename token is a remote id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Alphanumeric token with at least one digit, 8+ characters.
    #[default]
    Weak,
    /// Shaped like a content document id: `069` prefix, 15 or 18 characters.
    Strong,
}

/// A remote id read back from a filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredId {
    pub remote_id: String,
    pub confidence: Confidence,
}

/// Infer the remote id encoded in a file name.
///
/// Returns `None` when the trailing token of the stem does not look like an
/// identifier at all.
pub fn infer_remote_id(file_name: &str) -> Option<InferredId> {
    let stem = Path::new(file_name).file_stem()?.to_str()?;
    // `name (1).pdf`, `name-2.pdf`: copy counters are not ids
    let token = stem
        .rsplit(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .find(|t| !is_copy_counter(t))?;

    let strong = Regex::new(r"^069[0-9A-Za-z]{12}(?:[0-9A-Za-z]{3})?$").ok()?;
    if strong.is_match(token) {
        return Some(InferredId {
            remote_id: token.to_string(),
            confidence: Confidence::Strong,
        });
    }

    if token.len() >= 8 && token.chars().any(|c| c.is_ascii_digit()) {
        return Some(InferredId {
            remote_id: token.to_string(),
            confidence: Confidence::Weak,
        });
    }

    None
}

fn is_copy_counter(token: &str) -> bool {
    token.len() <= MAX_COPY_COUNTER_DIGITS && token.chars().all(|c| c.is_ascii_digit())
}

/// Lowercase ASCII slug, at most 60 characters.
pub fn slugify(s: &str) -> String {
    let lowered = s.to_ascii_lowercase();
    let slug = match Regex::new(r"[^a-z0-9]+") {
        Ok(re) => re.replace_all(&lowered, "-").into_owned(),
        Err(_) => lowered,
    };
    let slug = slug.trim_matches('-');
    let mut out: String = slug.chars().take(MAX_SLUG_LEN).collect();
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Parse the API's creation timestamp into a calendar date.
pub fn parse_created_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ") {
        return Some(dt.date());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

/// Deterministic local file name for a record.
pub fn document_filename(record: &RemoteDocumentRecord) -> String {
    let mut parts = Vec::with_capacity(4);

    let agency = slugify(&record.agency_name);
    if !agency.is_empty() {
        parts.push(agency);
    }
    if let Some(date) = record.created_date.as_deref().and_then(parse_created_date) {
        parts.push(date.format("%Y-%m-%d").to_string());
    }
    let title = slugify(&record.title);
    if !title.is_empty() {
        parts.push(title);
    }
    parts.push(record.remote_id.replace(['/', '\\'], "-"));

    format!("{}.{}", parts.join("_"), extension(record))
}

fn extension(record: &RemoteDocumentRecord) -> String {
    let ext: String = record
        .file_extension
        .as_deref()
        .unwrap_or_default()
        .trim()
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    if ext.is_empty() {
        "pdf".to_string()
    } else {
        ext
    }
}
