//! Reference rebuttal handler.
//!
//! Files one penalty request with the game-side API: first resolves the
//! officer's faction (falling back to a default when the lookup fails), then
//! posts the penalty request with a bounded retry. The contract with the
//! clerk is a single JSON object on stdout: `{"status_code": ..., "message":
//! ...}`, where 200 means the request was accepted.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

const DEFAULT_API_BASE: &str = "https://penalty-api.example.com";
const DEFAULT_FACTION: &str = "Ministry of Justice";
const DEFAULT_SERVER_ID: u32 = 7;

/// One attempt, then two retries with fixed backoff.
const RETRY_DELAYS: [Duration; 2] = [Duration::from_secs(5), Duration::from_secs(10)];

#[derive(Parser)]
#[command(name = "penalty-handler")]
#[command(version, about = "File a penalty request for a tribunal rebuttal")]
struct Args {
    /// Forum thread of the case
    thread_url: String,
    /// Officer the penalty targets
    officer_name: String,
    /// Judge who requested the rebuttal
    judge_name: String,
    /// Penalty category chosen by the judge
    category: String,
    /// Identifier the penalty API knows the judge by
    external_judge_id: String,

    /// Penalty API base URL
    #[arg(long, env = "PENALTY_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Bearer token for the penalty API
    #[arg(long, env = "PENALTY_API_TOKEN")]
    token: String,

    /// Game server the officer plays on
    #[arg(long, env = "PENALTY_SERVER_ID", default_value_t = DEFAULT_SERVER_ID)]
    server_id: u32,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args).await {
        Ok(output) => {
            // The clerk reads exactly this line.
            println!("{}", output);
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("penalty-handler: {:#}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .context("Failed to build HTTP client")?;

    let faction = resolve_faction(&client, args).await;

    let payload = json!({
        "forum_link": args.thread_url,
        "player_fraction": faction,
        "player_nick": args.officer_name,
        "rebuttal_type": args.category,
        "user_id": args.external_judge_id,
    });
    let url = format!("{}/method/lead.rebuttal", args.api_base.trim_end_matches('/'));

    let mut last_error: Option<anyhow::Error> = None;
    for attempt in 0..=RETRY_DELAYS.len() {
        if attempt > 0 {
            let delay = RETRY_DELAYS[attempt - 1];
            warn!(attempt, delay_secs = delay.as_secs(), "retrying penalty request");
            tokio::time::sleep(delay).await;
        }
        match submit_once(&client, &url, &args.token, &payload).await {
            Ok(output) => return Ok(output),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("penalty request failed with no recorded error")))
}

/// Ask the API which faction the officer belongs to. Failures fall back to
/// the default label; the penalty request matters more than its metadata.
async fn resolve_faction(client: &reqwest::Client, args: &Args) -> String {
    let url = format!("{}/method/info.fraction", args.api_base.trim_end_matches('/'));
    let response = client
        .get(&url)
        .bearer_auth(&args.token)
        .query(&[
            ("nickname", args.officer_name.as_str()),
            ("server_id", &args.server_id.to_string()),
        ])
        .timeout(Duration::from_secs(10))
        .send()
        .await;

    let body: serde_json::Value = match response.and_then(|r| r.error_for_status()) {
        Ok(r) => match r.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "faction lookup returned unreadable JSON, using default");
                return DEFAULT_FACTION.to_string();
            }
        },
        Err(e) => {
            warn!(error = %e, "faction lookup failed, using default");
            return DEFAULT_FACTION.to_string();
        }
    };

    match body["response"]["data"][0]["fraction_label"].as_str() {
        Some(label) if body["success"].as_bool().unwrap_or(false) => {
            info!(officer = %args.officer_name, faction = %label, "faction resolved");
            label.to_string()
        }
        _ => {
            warn!(officer = %args.officer_name, "faction missing from the response, using default");
            DEFAULT_FACTION.to_string()
        }
    }
}

async fn submit_once(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    payload: &serde_json::Value,
) -> Result<String> {
    let response = client
        .post(url)
        .bearer_auth(token)
        .json(payload)
        .send()
        .await
        .context("Penalty request failed")?
        .error_for_status()
        .context("Penalty API rejected the request")?;

    let status_code = response.status().as_u16();
    let body: serde_json::Value = response
        .json()
        .await
        .context("Penalty API returned unreadable JSON")?;
    let message = body["response"]["message"]
        .as_str()
        .unwrap_or("No message in the response.");

    info!(status_code, message, "penalty request accepted");
    Ok(serde_json::to_string(&json!({
        "status_code": status_code,
        "message": message,
    }))
    .context("Failed to encode the result")?)
}
