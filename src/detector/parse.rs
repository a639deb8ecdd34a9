//! Pure extraction helpers for scraped case topics.
//!
//! Everything here is plain string work so it can be tested without a
//! browser: docket numbers from titles, applicant/officer names from the
//! application form, timestamps, and media-link normalization.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use chrono::DateTime;
use regex::Regex;
use url::Url;

use crate::session::RawMediaRefs;

/// Name given to a participant the form never identified.
pub const UNKNOWN_PARTICIPANT: &str = "Citizen";

static CASE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)").expect("case number pattern is valid"));

/// The forum-declared docket number: the first digit run in the topic title.
pub fn extract_case_number(title: &str) -> Option<String> {
    CASE_NUMBER
        .captures(title)
        .map(|caps| caps[1].to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participants {
    pub applicant: String,
    pub officer: String,
}

/// Pull the applicant and officer names out of the application form.
///
/// The form numbers its fields: a line starting `1)` names the applicant, a
/// line starting `2)` names the officer, with the value after the first
/// colon. Anything the form does not declare defaults to "Citizen".
pub fn parse_participants(text: &str) -> Participants {
    let mut applicant: Option<String> = None;
    let mut officer: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if applicant.is_none() && line.starts_with("1)") {
            applicant = value_after_colon(line);
        }
        if officer.is_none() && line.starts_with("2)") {
            officer = value_after_colon(line);
        }
        if applicant.is_some() && officer.is_some() {
            break;
        }
    }

    Participants {
        applicant: applicant.unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string()),
        officer: officer.unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string()),
    }
}

fn value_after_colon(line: &str) -> Option<String> {
    let (_, value) = line.split_once(':')?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Format a post's ISO-8601 publication timestamp for display. An
/// unparsable value is kept as-is rather than dropped.
pub fn format_publication_time(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.format("%H:%M - %d.%m.%Y").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Turn raw media references from a post into a deduplicated, sorted list of
/// absolute URLs.
///
/// Fragment-only anchors, mailto:/tel: links, and data: URIs are dropped;
/// relative links resolve against the topic URL; embedded-media widgets map
/// to their canonical imgur/youtube URLs; anything on the ignore list
/// (compared case-insensitively) is skipped.
pub fn normalize_media_links(
    media: &RawMediaRefs,
    base: &Url,
    ignored: &HashSet<String>,
) -> Vec<String> {
    let mut links = BTreeSet::new();
    let mut push = |candidate: &str| {
        let candidate = candidate.trim();
        if candidate.is_empty()
            || candidate.contains('#')
            || candidate.starts_with("mailto:")
            || candidate.starts_with("tel:")
            || candidate.starts_with("data:")
        {
            return;
        }
        let absolute = if candidate.starts_with("http://") || candidate.starts_with("https://") {
            candidate.to_string()
        } else {
            match base.join(candidate) {
                Ok(url) => url.to_string(),
                Err(_) => return,
            }
        };
        if ignored.contains(&absolute.to_lowercase()) {
            return;
        }
        links.insert(absolute);
    };

    for anchor in &media.anchors {
        push(anchor);
    }
    for image in &media.images {
        push(image);
    }
    for wrapper in &media.wrappers {
        push(wrapper);
    }
    for widget in &media.widgets {
        if widget.key.is_empty() {
            continue;
        }
        match widget.site.as_str() {
            "imgur" => push(&format!("https://imgur.com/{}", widget.key.trim_start_matches('/'))),
            "youtube" => push(&format!("https://www.youtube.com/watch?v={}", widget.key)),
            _ => {}
        }
    }

    links.into_iter().collect()
}
