//! Typed error hierarchy for the gavel clerk.
//!
//! Three top-level enums cover the three subsystems:
//! - `SessionError` — browser automation step failures
//! - `WorkflowError` — judge decision workflow failures
//! - `HandlerError` — external rebuttal handler failures

use thiserror::Error;

/// A single named step inside a decision's browser sequence.
///
/// Carried alongside a `SessionError` so that a failure report tells the
/// operator exactly which step broke, not just what broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Dispatch,
    JudgeSignIn,
    PostReply,
    SignOut,
    OwnerSignIn,
    OpenThread,
    PinThread,
    CloseThread,
}

impl std::fmt::Display for SessionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionAction::Dispatch => "dispatching the browser job",
            SessionAction::JudgeSignIn => "signing in as the judge",
            SessionAction::PostReply => "posting the reply",
            SessionAction::SignOut => "signing out",
            SessionAction::OwnerSignIn => "signing in as the owner",
            SessionAction::OpenThread => "opening the case thread",
            SessionAction::PinThread => "pinning the thread",
            SessionAction::CloseThread => "closing the thread",
        };
        write!(f, "{}", label)
    }
}

/// Errors from the browser automation primitive.
///
/// Every automation step converts whatever went wrong underneath (a missing
/// element, a CDP error, a dead channel) into one of these values. Nothing
/// else escapes the session boundary.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("timed out after {waited_secs}s waiting for {what}")]
    Timeout { what: String, waited_secs: u64 },

    #[error("forum rejected the sign-in for '{nickname}': {detail}")]
    LoginRejected { nickname: String, detail: String },

    #[error("browser driver error: {0}")]
    Driver(String),

    #[error("browser session worker is no longer running")]
    Closed,
}

impl SessionError {
    pub fn driver(err: impl std::fmt::Display) -> Self {
        SessionError::Driver(err.to_string())
    }
}

/// A session step failure with the step's context attached.
#[derive(Debug, Error)]
#[error("{action} failed: {source}")]
pub struct StepFailure {
    pub action: SessionAction,
    #[source]
    pub source: SessionError,
}

impl StepFailure {
    pub fn new(action: SessionAction, source: SessionError) -> Self {
        Self { action, source }
    }
}

/// Errors from the decision workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("case {id} not found")]
    CaseNotFound { id: i64 },

    #[error("case {id} is in status '{status}', which does not permit this action")]
    InvalidStatus { id: i64, status: String },

    #[error("case {id} is assigned to '{assigned}', not '{acting}'")]
    NotAssignedJudge {
        id: i64,
        assigned: String,
        acting: String,
    },

    #[error("'{nickname}' is not on the judge whitelist")]
    NotWhitelisted { nickname: String },

    #[error("no reply template stored for outcome '{kind}'")]
    TemplateMissing { kind: String },

    #[error("no forum identity stored for '{nickname}'")]
    IdentityMissing { nickname: String },

    #[error("no owner identity is configured")]
    OwnerMissing,

    #[error("failed to decrypt the secret for '{nickname}': {detail}")]
    DecryptFailed { nickname: String, detail: String },

    #[error(transparent)]
    Session(#[from] StepFailure),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from invoking the external rebuttal handler process.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("no rebuttal handler command is configured")]
    NotConfigured,

    #[error("failed to spawn rebuttal handler '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("rebuttal handler exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("rebuttal handler produced malformed output: {raw}")]
    MalformedOutput { raw: String },

    #[error("rebuttal handler reported status {status_code}: {message}")]
    Api { status_code: u16, message: String },
}
