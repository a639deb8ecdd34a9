//! Credential decryption seam.
//!
//! Forum secrets are stored as opaque encrypted blobs; how they were
//! encrypted is none of the clerk's business. Deployments plug in whatever
//! mechanism guards their credentials by pointing `[secrets].decrypt_command`
//! at a decryption tool, or supply their own `SecretCipher` when embedding
//! the library.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::SecretsConfig;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("no decrypt command is configured")]
    NotConfigured,

    #[error("failed to run decrypt command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("decrypt command exited with code {code}")]
    NonZeroExit { code: i32 },

    #[error("decrypt command produced non-UTF-8 output")]
    BadOutput,
}

#[async_trait]
pub trait SecretCipher: Send + Sync {
    async fn decrypt(&self, encrypted: &str) -> Result<String, CipherError>;
}

/// Pass-through cipher: secrets are stored and used verbatim. The default
/// when no decrypt command is configured.
pub struct PlainSecrets;

#[async_trait]
impl SecretCipher for PlainSecrets {
    async fn decrypt(&self, encrypted: &str) -> Result<String, CipherError> {
        Ok(encrypted.to_string())
    }
}

/// Cipher that shells out to a configured command. The encrypted blob is
/// passed as the final argument; the plaintext is read from stdout with
/// trailing whitespace trimmed.
pub struct CommandCipher {
    command: Vec<String>,
}

impl CommandCipher {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl SecretCipher for CommandCipher {
    async fn decrypt(&self, encrypted: &str) -> Result<String, CipherError> {
        let program = self.command.first().ok_or(CipherError::NotConfigured)?;
        let output = Command::new(program)
            .args(&self.command[1..])
            .arg(encrypted)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| CipherError::Spawn {
                command: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CipherError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
            });
        }
        let plaintext = String::from_utf8(output.stdout).map_err(|_| CipherError::BadOutput)?;
        Ok(plaintext.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Build the cipher the configuration asks for.
pub fn cipher_from_config(config: &SecretsConfig) -> Arc<dyn SecretCipher> {
    if config.decrypt_command.is_empty() {
        Arc::new(PlainSecrets)
    } else {
        Arc::new(CommandCipher::new(config.decrypt_command.clone()))
    }
}
