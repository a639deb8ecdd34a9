//! The single shared browser session and everything that drives it.
//!
//! The forum exposes no API, so every interaction — signing in, posting a
//! reply, pinning or closing a thread, scraping the intake listing — is a
//! scripted walk through its markup. One Chromium instance serves the whole
//! process; the worker queue in [`worker`] guarantees that no two automation
//! sequences ever interleave on it.

pub mod browser;
pub mod selectors;
pub mod sequence;
pub mod worker;

use serde::Deserialize;

pub use browser::{BrowserSettings, ForumSession};
pub use sequence::{
    AutomationSteps, Credentials, OwnerFollowup, PublishJob, ThreadAction, run_publish,
};
pub use worker::{SessionHandle, SessionWorker};

/// One row of the intake listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    pub title: String,
    /// Absolute URL of the thread.
    pub url: String,
    pub locked: bool,
}

/// An embedded-media widget found in a post (imgur, youtube, ...).
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct MediaWidget {
    pub site: String,
    pub key: String,
}

/// Raw media references harvested from the first post, before URL
/// normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMediaRefs {
    pub anchors: Vec<String>,
    pub images: Vec<String>,
    pub widgets: Vec<MediaWidget>,
    pub wrappers: Vec<String>,
}

/// Everything scraped from a case topic's first post.
#[derive(Debug, Clone, Default)]
pub struct TopicDetails {
    /// Raw ISO-8601 publication timestamp, if the post carries one.
    pub published_at: Option<String>,
    pub body_text: Option<String>,
    pub media: RawMediaRefs,
    pub screenshot_png: Option<Vec<u8>>,
}

/// A reply-count snapshot of a tracked thread.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReplySnapshot {
    pub post_count: i64,
    pub transcript: String,
}

/// The trailing fragment of a reply body used to confirm the post rendered.
/// Character-based, since bodies are routinely non-ASCII.
pub(crate) fn trailing_fragment(body: &str, max_chars: usize) -> &str {
    let char_count = body.chars().count();
    if char_count <= max_chars {
        return body;
    }
    let skip = char_count - max_chars;
    match body.char_indices().nth(skip) {
        Some((idx, _)) => &body[idx..],
        None => body,
    }
}
