//! Forum change detection.
//!
//! An unbounded poll loop reloads the case-intake listing at a fixed
//! interval, ingests newly appeared topics (at most one per iteration, to
//! keep pressure off the shared browser session), and — on a slower cadence
//! — re-visits awaiting-rebuttal cases to detect new replies by comparing
//! post counts. Edits to existing replies are invisible to it by design.
//!
//! No failure terminates the loop: a bad iteration is logged and the loop
//! continues after its normal interval.

pub mod parse;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::GavelConfig;
use crate::notify::{Notify, NotifyKind};
use crate::session::worker::SessionDriver;
use crate::session::ThreadSummary;
use crate::store::{CaseStatus, DbHandle, NewCase};

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub interval: Duration,
    /// Run the reply scan once every N intake iterations. Zero disables it.
    pub reply_scan_every: u64,
    pub screenshot_dir: PathBuf,
    /// Lowercased media URLs to drop during ingestion.
    pub ignored_media: HashSet<String>,
}

impl DetectorSettings {
    pub fn from_config(config: &GavelConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.poll.interval_secs),
            reply_scan_every: config.poll.reply_scan_every,
            screenshot_dir: config.storage.screenshot_dir.clone(),
            ignored_media: config
                .session
                .ignored_media
                .iter()
                .map(|u| u.to_lowercase())
                .collect(),
        }
    }
}

pub struct Detector {
    store: DbHandle,
    session: Arc<dyn SessionDriver>,
    notifier: Arc<dyn Notify>,
    settings: DetectorSettings,
}

impl Detector {
    pub fn new(
        store: DbHandle,
        session: Arc<dyn SessionDriver>,
        notifier: Arc<dyn Notify>,
        settings: DetectorSettings,
    ) -> Self {
        Self {
            store,
            session,
            notifier,
            settings,
        }
    }

    /// Poll until the process ends. Never returns on its own.
    pub async fn run(self) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            reply_scan_every = self.settings.reply_scan_every,
            "detector started"
        );
        let mut iteration: u64 = 0;
        loop {
            iteration += 1;
            if let Err(e) = self.poll_once().await {
                error!(iteration, error = %e, "intake poll iteration failed");
            }
            if self.settings.reply_scan_every > 0 && iteration % self.settings.reply_scan_every == 0
            {
                if let Err(e) = self.scan_replies_once().await {
                    error!(iteration, error = %e, "reply scan failed");
                }
            }
            tokio::time::sleep(self.settings.interval).await;
        }
    }

    /// One intake iteration: reload the listing, ingest at most one new
    /// topic. Public so embedding surfaces (and tests) can drive the cadence
    /// themselves.
    pub async fn poll_once(&self) -> Result<()> {
        let threads = self.session.scan_intake().await?;
        let known = self.store.call(|store| store.known_topic_links()).await?;

        let Some(fresh) = first_new_thread(&threads, &known) else {
            debug!(seen = threads.len(), "no new topics");
            return Ok(());
        };
        self.ingest(fresh).await
    }

    async fn ingest(&self, thread: &ThreadSummary) -> Result<()> {
        info!(title = %thread.title, url = %thread.url, "ingesting new case topic");

        let details = self.session.scrape_topic(&thread.url).await?;

        let participants = details
            .body_text
            .as_deref()
            .map(parse::parse_participants)
            .unwrap_or_else(|| parse::Participants {
                applicant: parse::UNKNOWN_PARTICIPANT.to_string(),
                officer: parse::UNKNOWN_PARTICIPANT.to_string(),
            });

        let base = Url::parse(&thread.url)
            .with_context(|| format!("topic URL '{}' is not a valid URL", thread.url))?;
        let media =
            parse::normalize_media_links(&details.media, &base, &self.settings.ignored_media);

        let new_case = NewCase {
            topic_link: thread.url.clone(),
            topic_title: thread.title.clone(),
            case_num: parse::extract_case_number(&thread.title),
            applicant_name: participants.applicant,
            officer_name: participants.officer,
            full_text: details.body_text.clone(),
            media_references: media,
            publication_time: details
                .published_at
                .as_deref()
                .map(parse::format_publication_time),
        };

        let inserted = self
            .store
            .call(move |store| store.insert_case(&new_case))
            .await?;
        let Some(case) = inserted else {
            // Someone else ingested it between the diff and the insert; the
            // unique constraint makes this a harmless no-op.
            info!(url = %thread.url, "topic already ingested, skipping");
            return Ok(());
        };
        info!(case_id = case.id, title = %case.topic_title, "case ingested");

        if let Some(png) = &details.screenshot_png {
            if let Err(e) = self.save_screenshot(case.id, png).await {
                warn!(case_id = case.id, error = %e, "failed to store first-post screenshot");
            }
        }

        self.notifier
            .notify(NotifyKind::NewCase, &case.topic_title, case.id, None)
            .await;
        Ok(())
    }

    async fn save_screenshot(&self, case_id: i64, png: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.settings.screenshot_dir)
            .await
            .context("Failed to create screenshot directory")?;
        let path = self
            .settings
            .screenshot_dir
            .join(format!("case_{}.png", case_id));
        tokio::fs::write(&path, png)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        let stored = path.to_string_lossy().to_string();
        self.store
            .call(move |store| store.set_screenshot_path(case_id, &stored))
            .await?;
        Ok(())
    }

    /// Re-visit every awaiting-rebuttal case and compare reply counts. An
    /// increase persists the fresh transcript and notifies the assigned
    /// judge exactly once, however many replies arrived.
    pub async fn scan_replies_once(&self) -> Result<()> {
        let tracked = self
            .store
            .call(|store| store.list_by_status(CaseStatus::AwaitingRebuttal))
            .await?;
        debug!(tracked = tracked.len(), "scanning tracked cases for replies");

        for case in tracked {
            let snapshot = match self.session.count_replies(&case.topic_link).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(case_id = case.id, error = %e, "reply scan failed for case");
                    continue;
                }
            };
            if snapshot.post_count <= case.post_count {
                continue;
            }
            info!(
                case_id = case.id,
                stored = case.post_count,
                observed = snapshot.post_count,
                "new replies detected"
            );
            let (id, count, transcript) = (case.id, snapshot.post_count, snapshot.transcript);
            self.store
                .call(move |store| store.update_replies(id, count, &transcript))
                .await?;
            self.notifier
                .notify(
                    NotifyKind::NewReply,
                    &case.topic_title,
                    case.id,
                    case.current_judge.as_deref(),
                )
                .await;
        }
        Ok(())
    }
}

/// The first visible, non-locked thread the store has never seen.
fn first_new_thread<'a>(
    threads: &'a [ThreadSummary],
    known: &HashSet<String>,
) -> Option<&'a ThreadSummary> {
    threads
        .iter()
        .find(|thread| !thread.locked && !known.contains(&thread.url))
}
