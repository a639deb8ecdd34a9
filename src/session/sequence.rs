//! The decision publication sequence.
//!
//! A judge decision turns into one fixed walk through the forum: sign in as
//! the judge, post the rendered reply, sign out; then, when the outcome calls
//! for it, sign in as the owner, open the thread, pin or close it, sign out.
//! The walk short-circuits on the first failed step and reports which step
//! failed. Nothing here retries: a reply that may or may not have landed must
//! never be posted twice.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::errors::{SessionAction, SessionError, StepFailure};

/// One forum identity, secret already decrypted.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub nickname: String,
    pub secret: String,
}

/// What the owner session does to the thread after the judge's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadAction {
    Pin,
    /// Close the thread, then wait out the settle delay before signing out
    /// (the forum briefly overlays a status banner after closing).
    Close { settle: Duration },
}

#[derive(Debug, Clone)]
pub struct OwnerFollowup {
    pub credentials: Credentials,
    pub action: ThreadAction,
}

/// One complete decision publication.
#[derive(Debug, Clone)]
pub struct PublishJob {
    pub thread_url: String,
    pub body: String,
    pub judge: Credentials,
    pub owner: Option<OwnerFollowup>,
}

/// The browser-step surface a publication runs against. `ForumSession` is
/// the real implementation; tests substitute a scripted one.
#[async_trait]
pub trait AutomationSteps: Send {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), SessionError>;
    async fn deauthenticate(&mut self) -> Result<(), SessionError>;
    async fn post_reply(&mut self, thread_url: &str, body: &str) -> Result<(), SessionError>;
    async fn pin(&mut self) -> Result<(), SessionError>;
    async fn close(&mut self) -> Result<(), SessionError>;
    async fn goto(&mut self, url: &str) -> Result<(), SessionError>;
}

/// Run one decision publication against the session.
///
/// A failed sign-out is logged and tolerated: the next sign-in starts from
/// the login page anyway, and aborting a decision whose reply already landed
/// would leave more to clean up, not less.
pub async fn run_publish<S: AutomationSteps + ?Sized>(
    session: &mut S,
    job: &PublishJob,
) -> Result<(), StepFailure> {
    session
        .authenticate(&job.judge)
        .await
        .map_err(|e| StepFailure::new(SessionAction::JudgeSignIn, e))?;

    session
        .post_reply(&job.thread_url, &job.body)
        .await
        .map_err(|e| StepFailure::new(SessionAction::PostReply, e))?;

    if let Err(e) = session.deauthenticate().await {
        warn!(error = %e, "judge sign-out failed, continuing");
    }

    let Some(owner) = &job.owner else {
        return Ok(());
    };

    session
        .authenticate(&owner.credentials)
        .await
        .map_err(|e| StepFailure::new(SessionAction::OwnerSignIn, e))?;

    session
        .goto(&job.thread_url)
        .await
        .map_err(|e| StepFailure::new(SessionAction::OpenThread, e))?;

    match owner.action {
        ThreadAction::Pin => {
            session
                .pin()
                .await
                .map_err(|e| StepFailure::new(SessionAction::PinThread, e))?;
        }
        ThreadAction::Close { settle } => {
            session
                .close()
                .await
                .map_err(|e| StepFailure::new(SessionAction::CloseThread, e))?;
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }
        }
    }

    if let Err(e) = session.deauthenticate().await {
        warn!(error = %e, "owner sign-out failed, continuing");
    }
    Ok(())
}
