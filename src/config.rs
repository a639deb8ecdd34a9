//! Configuration for the gavel clerk, read from `gavel.toml`.
//!
//! Layered: file → environment → CLI flags. Every field has a default so an
//! empty (or missing) file is a valid configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [forum]
//! base_url = "https://forum.example.com/"
//! intake_url = "https://forum.example.com/forums/cases/"
//! login_url = "https://forum.example.com/login/"
//!
//! [poll]
//! interval_secs = 5
//! reply_scan_every = 12
//!
//! [storage]
//! db_path = "gavel.db"
//! screenshot_dir = "screenshots"
//!
//! [session]
//! headless = true
//! ignored_media = ["https://i.imgur.com/form-header.png"]
//!
//! [notify]
//! webhook_url = "https://hooks.example.com/tribunal"
//!
//! [handler]
//! command = ["penalty-handler"]
//!
//! [secrets]
//! decrypt_command = []
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "gavel.toml";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/100.0.4896.127 Safari/537.36";

/// Forum endpoints. The intake URL is the listing the detector polls; the
/// login URL is where the session primitive authenticates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForumConfig {
    pub base_url: String,
    pub intake_url: String,
    pub login_url: String,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: "https://forum.example.com/".to_string(),
            intake_url: "https://forum.example.com/forums/cases/".to_string(),
            login_url: "https://forum.example.com/login/".to_string(),
        }
    }
}

/// Poll cadence for the change detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Seconds between intake-listing polls.
    pub interval_secs: u64,
    /// Run the reply-count scan once every N intake iterations.
    pub reply_scan_every: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            reply_scan_every: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub screenshot_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("gavel.db"),
            screenshot_dir: PathBuf::from("screenshots"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub headless: bool,
    pub user_agent: String,
    /// Media URLs to drop during ingestion (form decorations and the like).
    pub ignored_media: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            ignored_media: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook endpoint for case/reply notifications. Empty disables them.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Command (argv prefix) for the external rebuttal handler. The request
    /// arguments are appended. Empty disables rebuttal submission.
    pub command: Vec<String>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            command: vec!["penalty-handler".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Command (argv prefix) that decrypts one secret: the encrypted blob is
    /// passed as the final argument, the plaintext is read from stdout.
    /// Empty means secrets are stored as-is and used verbatim.
    pub decrypt_command: Vec<String>,
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GavelConfig {
    pub forum: ForumConfig,
    pub poll: PollConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub notify: NotifyConfig,
    pub handler: HandlerConfig,
    pub secrets: SecretsConfig,
}

impl GavelConfig {
    /// Load configuration from the given file, or `gavel.toml` in the current
    /// directory. A missing file yields the defaults; a malformed file is an
    /// error. Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Environment overrides, applied on top of the file values.
    fn apply_env(&mut self) {
        if let Ok(db) = std::env::var("GAVEL_DB_PATH") {
            self.storage.db_path = PathBuf::from(db);
        }
        if let Ok(url) = std::env::var("GAVEL_WEBHOOK_URL") {
            self.notify.webhook_url = if url.is_empty() { None } else { Some(url) };
        }
        if let Ok(headless) = std::env::var("GAVEL_HEADLESS") {
            self.session.headless = headless != "0" && !headless.eq_ignore_ascii_case("false");
        }
    }
}
