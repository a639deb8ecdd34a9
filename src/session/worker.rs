//! Single-worker ownership of the browser session.
//!
//! The browser is a process-wide, stateful resource that is unsafe for
//! concurrent use: correctness depends on knowing exactly which identity is
//! signed in. One worker task owns the `ForumSession`; everyone else holds a
//! cloneable `SessionHandle` and submits jobs over a channel. Each job runs
//! to completion before the next starts, so the detector's scraping and a
//! judge's decision can never interleave their steps.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use super::browser::{BrowserSettings, ForumSession};
use super::sequence::{AutomationSteps, PublishJob, run_publish};
use super::{ReplySnapshot, ThreadSummary, TopicDetails};
use crate::errors::{SessionAction, SessionError, StepFailure};

/// Depth of the job queue. Jobs are long (tens of seconds); anything beyond
/// a small backlog means the poll interval is set too aggressively.
const QUEUE_DEPTH: usize = 16;

enum SessionJob {
    Publish {
        job: Box<PublishJob>,
        reply: oneshot::Sender<Result<(), StepFailure>>,
    },
    ScanIntake {
        reply: oneshot::Sender<Result<Vec<ThreadSummary>, SessionError>>,
    },
    ScrapeTopic {
        url: String,
        reply: oneshot::Sender<Result<TopicDetails, SessionError>>,
    },
    CountReplies {
        url: String,
        reply: oneshot::Sender<Result<ReplySnapshot, SessionError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// The session surface the rest of the system programs against.
/// `SessionHandle` is the production implementation; tests substitute their
/// own.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    async fn publish(&self, job: PublishJob) -> Result<(), StepFailure>;
    async fn scan_intake(&self) -> Result<Vec<ThreadSummary>, SessionError>;
    async fn scrape_topic(&self, url: &str) -> Result<TopicDetails, SessionError>;
    async fn count_replies(&self, url: &str) -> Result<ReplySnapshot, SessionError>;
}

#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionJob>,
}

impl SessionHandle {
    async fn submit<T>(
        &self,
        job: SessionJob,
        rx: oneshot::Receiver<Result<T, SessionError>>,
    ) -> Result<T, SessionError> {
        if self.tx.send(job).await.is_err() {
            return Err(SessionError::Closed);
        }
        rx.await.unwrap_or(Err(SessionError::Closed))
    }

    /// Ask the worker to close the browser and exit. Safe to call more than
    /// once; later calls are no-ops.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(SessionJob::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

#[async_trait]
impl SessionDriver for SessionHandle {
    async fn publish(&self, job: PublishJob) -> Result<(), StepFailure> {
        let (reply, rx) = oneshot::channel();
        let job = SessionJob::Publish {
            job: Box::new(job),
            reply,
        };
        if self.tx.send(job).await.is_err() {
            return Err(StepFailure::new(SessionAction::Dispatch, SessionError::Closed));
        }
        rx.await
            .unwrap_or(Err(StepFailure::new(SessionAction::Dispatch, SessionError::Closed)))
    }

    async fn scan_intake(&self) -> Result<Vec<ThreadSummary>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.submit(SessionJob::ScanIntake { reply }, rx).await
    }

    async fn scrape_topic(&self, url: &str) -> Result<TopicDetails, SessionError> {
        let (reply, rx) = oneshot::channel();
        let job = SessionJob::ScrapeTopic {
            url: url.to_string(),
            reply,
        };
        self.submit(job, rx).await
    }

    async fn count_replies(&self, url: &str) -> Result<ReplySnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        let job = SessionJob::CountReplies {
            url: url.to_string(),
            reply,
        };
        self.submit(job, rx).await
    }
}

pub struct SessionWorker;

impl SessionWorker {
    /// Launch the browser and the worker task that owns it.
    pub async fn spawn(
        settings: BrowserSettings,
    ) -> Result<(SessionHandle, tokio::task::JoinHandle<()>), SessionError> {
        let session = ForumSession::launch(settings).await?;
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let task = tokio::spawn(run_worker(session, rx));
        Ok((SessionHandle { tx }, task))
    }
}

async fn run_worker(mut session: ForumSession, mut rx: mpsc::Receiver<SessionJob>) {
    while let Some(job) = rx.recv().await {
        match job {
            SessionJob::Publish { job, reply } => {
                let result = run_publish(&mut session, &job).await;
                if let Err(failure) = &result {
                    error!(error = %failure, thread = %job.thread_url, "publication failed");
                }
                let _ = reply.send(result);
            }
            SessionJob::ScanIntake { reply } => {
                let _ = reply.send(session.scan_intake().await);
            }
            SessionJob::ScrapeTopic { url, reply } => {
                let _ = reply.send(session.scrape_topic(&url).await);
            }
            SessionJob::CountReplies { url, reply } => {
                let _ = reply.send(session.count_replies(&url).await);
            }
            SessionJob::Shutdown { reply } => {
                session.shutdown().await;
                let _ = reply.send(());
                info!("session worker stopped");
                return;
            }
        }
    }
    // Every handle dropped without an explicit shutdown; close the browser
    // anyway so no orphan Chromium lingers.
    session.shutdown().await;
    info!("session worker stopped (all handles dropped)");
}
