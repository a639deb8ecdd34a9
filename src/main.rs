use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

use gavel::config::GavelConfig;

#[derive(Parser)]
#[command(name = "gavel")]
#[command(version, about = "Forum tribunal clerk - case intake, judge decisions, scripted forum actions")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to gavel.toml. Defaults to ./gavel.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the clerk daemon: browser session plus change detector
    Run,
    /// List cases available for review
    List,
    /// Show one case in detail
    Show { id: i64 },
    /// Show the audit log of a case
    Log { id: i64 },
    /// Take an open case into review
    Claim {
        id: i64,
        #[arg(long)]
        judge: String,
    },
    /// Hand a claimed case back to the pool
    Release {
        id: i64,
        #[arg(long)]
        judge: String,
    },
    /// Close a case without forum-side actions
    Resolve {
        id: i64,
        #[arg(long)]
        judge: String,
    },
    /// Execute a judge decision against the forum
    Decide {
        id: i64,
        #[arg(long)]
        judge: String,
        /// Reject the case: wrong-number, malformed, or off-system
        #[arg(long)]
        reject: Option<String>,
        /// Request a rebuttal from the officer
        #[arg(long)]
        rebuttal: bool,
        /// Post a custom reply with the given body
        #[arg(long)]
        reply: Option<String>,
        /// Make the custom reply a final verdict (closes the thread)
        #[arg(long = "final")]
        final_reply: bool,
    },
    /// Submit the rebuttal penalty category for a case
    Rebuttal {
        id: i64,
        #[arg(long)]
        judge: String,
        #[arg(long)]
        category: String,
    },
    /// Manage the judge whitelist
    Judges {
        #[command(subcommand)]
        command: Option<JudgesCommand>,
    },
    /// Manage forum identities
    Identity {
        #[command(subcommand)]
        command: Option<IdentityCommand>,
    },
    /// Show or set the next expected docket number
    Counter { number: Option<String> },
    /// Manage reply templates
    Template {
        #[command(subcommand)]
        command: Option<TemplateCommand>,
    },
    /// Force-set case fields, bypassing workflow validation
    Override {
        id: i64,
        /// New status code (a..g)
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        judge: Option<String>,
        #[arg(long)]
        clear_judge: bool,
    },
}

#[derive(Subcommand)]
pub enum JudgesCommand {
    /// Add a nickname to the whitelist
    Add { nickname: String },
    /// Remove a nickname from the whitelist
    Remove { nickname: String },
}

#[derive(Subcommand)]
pub enum IdentityCommand {
    /// Store (or replace) a forum identity
    Set {
        nickname: String,
        /// The encrypted secret blob, as produced by your credential store
        encrypted_secret: String,
        /// Identifier the external rebuttal handler knows this judge by
        #[arg(long)]
        external_id: Option<String>,
        /// Mark this identity as the system owner
        #[arg(long)]
        owner: bool,
    },
    /// Remove a stored identity
    Remove { nickname: String },
}

#[derive(Subcommand)]
pub enum TemplateCommand {
    /// Store a reply template body for an outcome kind
    Set { kind: String, body: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _log_guard = init_tracing(cli.verbose, matches!(cli.command, Commands::Run));

    let config = GavelConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => cmd::cmd_run(config).await,
        Commands::List => cmd::cmd_list(&config).await,
        Commands::Show { id } => cmd::cmd_show(&config, id).await,
        Commands::Log { id } => cmd::cmd_log(&config, id).await,
        Commands::Claim { id, judge } => cmd::cmd_claim(&config, id, &judge).await,
        Commands::Release { id, judge } => cmd::cmd_release(&config, id, &judge).await,
        Commands::Resolve { id, judge } => cmd::cmd_resolve(&config, id, &judge).await,
        Commands::Decide {
            id,
            judge,
            reject,
            rebuttal,
            reply,
            final_reply,
        } => {
            let decision =
                cmd::parse_decision(reject.as_deref(), rebuttal, reply.as_deref(), final_reply)?;
            cmd::cmd_decide(
                &config,
                cmd::DecideArgs {
                    id,
                    judge,
                    decision,
                },
            )
            .await
        }
        Commands::Rebuttal {
            id,
            judge,
            category,
        } => cmd::cmd_rebuttal(&config, id, &judge, &category).await,
        Commands::Judges { command } => match command {
            None => cmd::cmd_judges(&config).await,
            Some(JudgesCommand::Add { nickname }) => cmd::cmd_judges_add(&config, &nickname).await,
            Some(JudgesCommand::Remove { nickname }) => {
                cmd::cmd_judges_remove(&config, &nickname).await
            }
        },
        Commands::Identity { command } => match command {
            None => cmd::cmd_identity(&config).await,
            Some(IdentityCommand::Set {
                nickname,
                encrypted_secret,
                external_id,
                owner,
            }) => {
                cmd::cmd_identity_set(
                    &config,
                    &nickname,
                    &encrypted_secret,
                    external_id.as_deref(),
                    owner,
                )
                .await
            }
            Some(IdentityCommand::Remove { nickname }) => {
                cmd::cmd_identity_remove(&config, &nickname).await
            }
        },
        Commands::Counter { number } => cmd::cmd_counter(&config, number.as_deref()).await,
        Commands::Template { command } => match command {
            None => cmd::cmd_template(&config).await,
            Some(TemplateCommand::Set { kind, body }) => {
                cmd::cmd_template_set(&config, &kind, &body).await
            }
        },
        Commands::Override {
            id,
            status,
            judge,
            clear_judge,
        } => cmd::cmd_override(&config, id, status.as_deref(), judge.as_deref(), clear_judge).await,
    }
}

/// Install the tracing subscriber. The daemon also logs to a daily-rolling
/// file; the returned guard must stay alive for the file writer to flush.
fn init_tracing(verbose: bool, with_file: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let default_filter = if verbose { "gavel=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if with_file {
        let appender = tracing_appender::rolling::daily("logs", "gavel.log");
        let (file_writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .with(fmt::layer().with_writer(file_writer).with_ansi(false))
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
        None
    }
}
