//! Invocation of the external rebuttal handler.
//!
//! Once a case enters the awaiting-rebuttal state, the judge picks a penalty
//! category and the clerk hands the request to an out-of-process handler (the
//! shipped `penalty-handler` binary by default). The handler's contract is
//! narrow: it prints a single JSON object `{"status_code": ..., "message":
//! ...}` on stdout, and 200 means success. Anything else — a non-zero exit,
//! malformed output, another status code — is a reportable, non-fatal
//! failure that never touches case state.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::info;

use crate::errors::HandlerError;

/// Everything the handler needs to file one penalty request.
#[derive(Debug, Clone)]
pub struct RebuttalRequest {
    pub thread_url: String,
    pub officer_name: String,
    pub judge_name: String,
    pub category: String,
    /// Identifier under which the external system knows the judge.
    pub external_judge_id: String,
}

#[derive(Debug, Deserialize)]
struct HandlerOutput {
    status_code: u16,
    message: String,
}

#[async_trait]
pub trait RebuttalHandler: Send + Sync {
    /// Submit the request; returns the handler's success message.
    async fn submit(&self, request: &RebuttalRequest) -> Result<String, HandlerError>;
}

/// Runs the configured handler command with the request appended as five
/// positional arguments.
pub struct CommandHandler {
    command: Vec<String>,
}

impl CommandHandler {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl RebuttalHandler for CommandHandler {
    async fn submit(&self, request: &RebuttalRequest) -> Result<String, HandlerError> {
        let program = self.command.first().ok_or(HandlerError::NotConfigured)?;

        info!(
            command = %program,
            category = %request.category,
            thread = %request.thread_url,
            "invoking rebuttal handler"
        );

        let output = Command::new(program)
            .args(&self.command[1..])
            .arg(&request.thread_url)
            .arg(&request.officer_name)
            .arg(&request.judge_name)
            .arg(&request.category)
            .arg(&request.external_judge_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| HandlerError::Spawn {
                command: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(HandlerError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: HandlerOutput =
            serde_json::from_str(stdout.trim()).map_err(|_| HandlerError::MalformedOutput {
                raw: stdout.trim().to_string(),
            })?;

        if parsed.status_code == 200 {
            Ok(parsed.message)
        } else {
            Err(HandlerError::Api {
                status_code: parsed.status_code,
                message: parsed.message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RebuttalRequest {
        RebuttalRequest {
            thread_url: "https://board.test/threads/41/".to_string(),
            officer_name: "John_Law".to_string(),
            judge_name: "Themis".to_string(),
            category: "arrest".to_string(),
            external_judge_id: "j-1".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_command_is_not_configured() {
        let handler = CommandHandler::new(vec![]);
        assert!(matches!(
            handler.submit(&request()).await,
            Err(HandlerError::NotConfigured)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_output_yields_message() {
        let handler = CommandHandler::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"echo '{"status_code": 200, "message": "penalty filed"}'"#.to_string(),
            "sh".to_string(),
        ]);
        let message = handler.submit(&request()).await.unwrap();
        assert_eq!(message, "penalty filed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_200_status_is_an_api_error() {
        let handler = CommandHandler::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"echo '{"status_code": 403, "message": "token expired"}'"#.to_string(),
            "sh".to_string(),
        ]);
        match handler.submit(&request()).await {
            Err(HandlerError::Api {
                status_code,
                message,
            }) => {
                assert_eq!(status_code, 403);
                assert_eq!(message, "token expired");
            }
            other => panic!("Expected Api error, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn malformed_output_is_surfaced_verbatim() {
        let handler = CommandHandler::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo not-json".to_string(),
            "sh".to_string(),
        ]);
        match handler.submit(&request()).await {
            Err(HandlerError::MalformedOutput { raw }) => assert_eq!(raw, "not-json"),
            other => panic!("Expected MalformedOutput, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let handler = CommandHandler::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo boom >&2; exit 3".to_string(),
            "sh".to_string(),
        ]);
        match handler.submit(&request()).await {
            Err(HandlerError::NonZeroExit { code, stderr }) => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("Expected NonZeroExit, got {:?}", other.map(|_| ())),
        }
    }
}
