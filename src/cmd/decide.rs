//! Judge-facing case operations — claiming, releasing, and executing
//! decisions against the forum.
//!
//! Decision commands launch their own one-shot browser session, run the
//! single decision sequence, and tear the session down again. Run them while
//! the daemon is stopped (or pointed at another forum account): the browser
//! session is a per-process resource and the forum tolerates only one active
//! sign-in per account.

use std::sync::Arc;

use anyhow::Result;
use console::style;

use super::open_store;
use gavel::config::GavelConfig;
use gavel::rebuttal::CommandHandler;
use gavel::secrets::cipher_from_config;
use gavel::session::{BrowserSettings, SessionWorker};
use gavel::store::RejectReason;
use gavel::workflow::{ClaimOutcome, Decision, DecisionOutcome, Orchestrator, ReplyKind};

pub async fn cmd_claim(config: &GavelConfig, id: i64, judge: &str) -> Result<()> {
    let orchestrator = store_only_orchestrator(config)?;
    match orchestrator.claim(id, judge).await? {
        ClaimOutcome::Claimed(case) => {
            println!(
                "{} Case No. {} is now in review by {}.",
                style("✔").green(),
                case.docket_display(),
                judge
            );
        }
        ClaimOutcome::AlreadyYours(case) => {
            println!(
                "Case No. {} is already yours; reopening it.",
                case.docket_display()
            );
        }
        ClaimOutcome::TakenBy(holder) => {
            println!(
                "{} This case is already in review by {}.",
                style("✘").red(),
                holder
            );
        }
    }
    Ok(())
}

pub async fn cmd_release(config: &GavelConfig, id: i64, judge: &str) -> Result<()> {
    let orchestrator = store_only_orchestrator(config)?;
    orchestrator.release(id, judge).await?;
    println!(
        "{} Case {} released back to the pool.",
        style("✔").green(),
        id
    );
    Ok(())
}

pub async fn cmd_resolve(config: &GavelConfig, id: i64, judge: &str) -> Result<()> {
    let orchestrator = store_only_orchestrator(config)?;
    orchestrator.resolve(id, judge).await?;
    println!("{} Case {} closed.", style("✔").green(), id);
    Ok(())
}

pub struct DecideArgs {
    pub id: i64,
    pub judge: String,
    pub decision: Decision,
}

pub async fn cmd_decide(config: &GavelConfig, args: DecideArgs) -> Result<()> {
    let store = open_store(config)?;
    let (session, worker_task) = SessionWorker::spawn(BrowserSettings::from_config(config))
        .await
        .map_err(anyhow::Error::from)?;

    let orchestrator = Orchestrator::new(
        store,
        Arc::new(session.clone()),
        cipher_from_config(&config.secrets),
        Arc::new(CommandHandler::new(config.handler.command.clone())),
    );

    let result = orchestrator
        .decide(args.id, &args.judge, args.decision)
        .await;

    session.shutdown().await;
    let _ = worker_task.await;

    match result {
        Ok(DecisionOutcome::Completed) => {
            println!(
                "{} Decision for case {} executed on the forum.",
                style("✔").green(),
                args.id
            );
            Ok(())
        }
        Ok(DecisionOutcome::AwaitingRebuttalCategory) => {
            println!(
                "{} Rebuttal requested and thread pinned for case {}.",
                style("✔").green(),
                args.id
            );
            println!(
                "Now submit the penalty category:\n  gavel rebuttal {} --judge {} --category <category>",
                args.id, args.judge
            );
            Ok(())
        }
        Err(e) => {
            // The committed status change stays in place; the operator
            // inspects the thread and recovers by hand.
            eprintln!(
                "{} {}\nCheck the forum thread and the case state manually before retrying anything.",
                style("✘").red(),
                e
            );
            Err(e.into())
        }
    }
}

pub async fn cmd_rebuttal(
    config: &GavelConfig,
    id: i64,
    judge: &str,
    category: &str,
) -> Result<()> {
    let orchestrator = store_only_orchestrator(config)?;
    match orchestrator.submit_rebuttal_category(id, judge, category).await {
        Ok(message) => {
            println!(
                "{} Rebuttal '{}' filed for case {}.\nHandler says: {}",
                style("✔").green(),
                category,
                id,
                message
            );
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "{} {}\nThe case state is unchanged; fix the handler side and resubmit.",
                style("✘").red(),
                e
            );
            Err(e.into())
        }
    }
}

/// Parse the CLI decision flags into a `Decision`.
pub fn parse_decision(
    reject: Option<&str>,
    rebuttal: bool,
    reply: Option<&str>,
    final_reply: bool,
) -> Result<Decision> {
    match (reject, rebuttal, reply) {
        (Some(reason), false, None) => {
            let reason: RejectReason = reason.parse().map_err(anyhow::Error::msg)?;
            Ok(Decision::Reject { reason })
        }
        (None, true, None) => Ok(Decision::RequestRebuttal),
        (None, false, Some(body)) => Ok(Decision::Reply {
            body: body.to_string(),
            kind: if final_reply {
                ReplyKind::Final
            } else {
                ReplyKind::Intermediate
            },
        }),
        _ => anyhow::bail!(
            "Pick exactly one of --reject <reason>, --rebuttal, or --reply <body>"
        ),
    }
}

/// Orchestrator for operations that never touch the browser. The session
/// slot is filled with a driver that refuses everything, which is fine:
/// claim/release/resolve/rebuttal never publish.
fn store_only_orchestrator(config: &GavelConfig) -> Result<Orchestrator> {
    use async_trait::async_trait;

    use gavel::errors::{SessionAction, SessionError, StepFailure};
    use gavel::session::worker::SessionDriver;
    use gavel::session::{PublishJob, ReplySnapshot, ThreadSummary, TopicDetails};

    struct NoSession;

    #[async_trait]
    impl SessionDriver for NoSession {
        async fn publish(&self, _job: PublishJob) -> Result<(), StepFailure> {
            Err(StepFailure::new(SessionAction::Dispatch, SessionError::Closed))
        }
        async fn scan_intake(&self) -> Result<Vec<ThreadSummary>, SessionError> {
            Err(SessionError::Closed)
        }
        async fn scrape_topic(&self, _url: &str) -> Result<TopicDetails, SessionError> {
            Err(SessionError::Closed)
        }
        async fn count_replies(&self, _url: &str) -> Result<ReplySnapshot, SessionError> {
            Err(SessionError::Closed)
        }
    }

    Ok(Orchestrator::new(
        open_store(config)?,
        Arc::new(NoSession),
        cipher_from_config(&config.secrets),
        Arc::new(CommandHandler::new(config.handler.command.clone())),
    ))
}
