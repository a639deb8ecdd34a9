//! The judge decision workflow.
//!
//! Every decision follows one skeleton: validate, preflight the data the
//! decision needs (template, identities, secrets), commit the status change
//! and exactly one audit entry, attempt counter reconciliation where the path
//! calls for it, render the reply, then hand the browser work to the session
//! worker as a single job.
//!
//! A failed browser step is reported with its step context and the committed
//! status change is left in place. That is deliberate: the forum-side action
//! is not safely retryable — a retry risks a duplicate public post — so the
//! policy favors visible partial state plus manual recovery over silent
//! auto-retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::WorkflowError;
use crate::rebuttal::{RebuttalHandler, RebuttalRequest};
use crate::secrets::SecretCipher;
use crate::session::worker::SessionDriver;
use crate::session::{Credentials, OwnerFollowup, PublishJob, ThreadAction};
use crate::store::{Case, CaseStatus, DbHandle, RejectReason, TemplateKind};
use crate::templates::{self, RenderContext};

/// Settle delay after closing a thread on a final verdict, while the forum's
/// status banner clears.
const FINAL_CLOSE_SETTLE: Duration = Duration::from_secs(5);

/// How much of a custom reply is quoted into the audit log.
const NOTE_SNIPPET_CHARS: usize = 70;

/// External-judge id handed to the rebuttal handler when none is stored.
const UNSET_EXTERNAL_ID: &str = "unset";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Intermediate,
    Final,
}

/// The four decisions a judge can take on a case under review.
#[derive(Debug, Clone)]
pub enum Decision {
    Reject { reason: RejectReason },
    RequestRebuttal,
    Reply { body: String, kind: ReplyKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Completed,
    /// The rebuttal request went out; the judge must now pick a penalty
    /// category and submit it via [`Orchestrator::submit_rebuttal_category`].
    AwaitingRebuttalCategory,
}

#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(Case),
    /// The judge already holds this case; nothing changed.
    AlreadyYours(Case),
    TakenBy(String),
}

pub struct Orchestrator {
    store: DbHandle,
    session: Arc<dyn SessionDriver>,
    cipher: Arc<dyn SecretCipher>,
    handler: Arc<dyn RebuttalHandler>,
}

/// Everything one decision path needs, resolved before anything is written.
struct DecisionPlan {
    status: CaseStatus,
    template: TemplateKind,
    note: String,
    owner_action: Option<ThreadAction>,
    reconcile_counter: bool,
    custom_text: Option<String>,
}

impl DecisionPlan {
    fn build(decision: &Decision, judge: &str) -> Self {
        match decision {
            Decision::Reject { reason } => Self {
                status: reason.status(),
                template: reason.template(),
                note: format!("Rejected by judge {} ({})", judge, reason.as_str()),
                owner_action: Some(ThreadAction::Close {
                    settle: Duration::ZERO,
                }),
                reconcile_counter: false,
                custom_text: None,
            },
            Decision::RequestRebuttal => Self {
                status: CaseStatus::AwaitingRebuttal,
                template: TemplateKind::RebuttalRequest,
                note: format!("Rebuttal requested by judge {}", judge),
                owner_action: Some(ThreadAction::Pin),
                reconcile_counter: true,
                custom_text: None,
            },
            Decision::Reply { body, kind } => {
                let snippet = snippet(body, NOTE_SNIPPET_CHARS);
                match kind {
                    ReplyKind::Intermediate => Self {
                        status: CaseStatus::AwaitingRebuttal,
                        template: TemplateKind::CustomIntermediate,
                        note: format!(
                            "Intermediate reply posted by judge {}: \"{}\"",
                            judge, snippet
                        ),
                        owner_action: None,
                        reconcile_counter: false,
                        custom_text: Some(body.clone()),
                    },
                    ReplyKind::Final => Self {
                        status: CaseStatus::Closed,
                        template: TemplateKind::CustomFinal,
                        note: format!("Final verdict posted by judge {}: \"{}\"", judge, snippet),
                        owner_action: Some(ThreadAction::Close {
                            settle: FINAL_CLOSE_SETTLE,
                        }),
                        reconcile_counter: true,
                        custom_text: Some(body.clone()),
                    },
                }
            }
        }
    }
}

impl Orchestrator {
    pub fn new(
        store: DbHandle,
        session: Arc<dyn SessionDriver>,
        cipher: Arc<dyn SecretCipher>,
        handler: Arc<dyn RebuttalHandler>,
    ) -> Self {
        Self {
            store,
            session,
            cipher,
            handler,
        }
    }

    // ── Case management (no browser involvement) ──────────────────────

    /// Take an open case into review.
    pub async fn claim(&self, case_id: i64, judge: &str) -> Result<ClaimOutcome, WorkflowError> {
        self.ensure_whitelisted(judge).await?;
        let case = self.load_case(case_id).await?;

        match case.status {
            CaseStatus::Open => {
                let (id, acting) = (case.id, judge.to_string());
                self.store
                    .call(move |store| {
                        store.update_status_and_judge(id, CaseStatus::InReview, Some(&acting))?;
                        store.append_note(id, &format!("Taken into review by judge {}", acting))
                    })
                    .await?;
                let claimed = self.load_case(case_id).await?;
                info!(case_id, judge, "case claimed");
                Ok(ClaimOutcome::Claimed(claimed))
            }
            CaseStatus::InReview | CaseStatus::AwaitingRebuttal => match &case.current_judge {
                Some(assigned) if !assigned.eq_ignore_ascii_case(judge) => {
                    Ok(ClaimOutcome::TakenBy(assigned.clone()))
                }
                _ => Ok(ClaimOutcome::AlreadyYours(case)),
            },
            _ => Err(WorkflowError::InvalidStatus {
                id: case.id,
                status: case.status.as_str().to_string(),
            }),
        }
    }

    /// Hand a claimed case back to the pool.
    pub async fn release(&self, case_id: i64, judge: &str) -> Result<(), WorkflowError> {
        self.ensure_whitelisted(judge).await?;
        let case = self.load_case(case_id).await?;
        if !case.status.accepts_decisions() {
            return Err(WorkflowError::InvalidStatus {
                id: case.id,
                status: case.status.as_str().to_string(),
            });
        }
        ensure_assigned(&case, judge)?;

        let (id, acting) = (case.id, judge.to_string());
        self.store
            .call(move |store| {
                store.update_status_and_judge(id, CaseStatus::Open, None)?;
                store.append_note(id, &format!("Released back to the pool by judge {}", acting))
            })
            .await?;
        info!(case_id, judge, "case released");
        Ok(())
    }

    /// Close a case as bookkeeping only, with no forum-side actions.
    pub async fn resolve(&self, case_id: i64, judge: &str) -> Result<(), WorkflowError> {
        self.ensure_whitelisted(judge).await?;
        let case = self.load_case(case_id).await?;
        if !case.status.accepts_decisions() {
            return Err(WorkflowError::InvalidStatus {
                id: case.id,
                status: case.status.as_str().to_string(),
            });
        }
        ensure_assigned(&case, judge)?;

        let (id, acting) = (case.id, judge.to_string());
        self.store
            .call(move |store| {
                store.update_status(id, CaseStatus::Closed)?;
                store.append_note(id, &format!("Closed without forum actions by judge {}", acting))
            })
            .await?;
        info!(case_id, judge, "case resolved without forum actions");
        Ok(())
    }

    // ── Decisions (browser involvement) ───────────────────────────────

    /// Execute one judge decision end to end.
    pub async fn decide(
        &self,
        case_id: i64,
        judge: &str,
        decision: Decision,
    ) -> Result<DecisionOutcome, WorkflowError> {
        self.ensure_whitelisted(judge).await?;
        let case = self.load_case(case_id).await?;
        if !case.status.accepts_decisions() {
            return Err(WorkflowError::InvalidStatus {
                id: case.id,
                status: case.status.as_str().to_string(),
            });
        }
        ensure_assigned(&case, judge)?;

        let plan = DecisionPlan::build(&decision, judge);

        // Preflight every lookup that can fail on missing data, so a broken
        // configuration skips the decision instead of half-applying it.
        let template = self.require_template(plan.template).await?;
        let judge_credentials = self.credentials_for(judge).await?;
        let owner = match plan.owner_action {
            Some(action) => Some(OwnerFollowup {
                credentials: self.owner_credentials().await?,
                action,
            }),
            None => None,
        };

        // Commit the status change and its single audit entry before any
        // browser action. From here on, failures leave this state in place.
        let (id, status, note) = (case.id, plan.status, plan.note.clone());
        self.store
            .call(move |store| {
                store.update_status(id, status)?;
                store.append_note(id, &note)
            })
            .await?;
        info!(case_id, judge, status = status.as_str(), "decision committed");

        if plan.reconcile_counter {
            self.reconcile_counter(&case).await;
        }

        let next_case_num = self.store.call(|store| store.expected_case_num()).await?;
        let body = templates::render(
            &template,
            chrono::Local::now().date_naive(),
            &RenderContext {
                applicant: Some(case.applicant_name.clone()),
                officer: Some(case.officer_name.clone()),
                judge: Some(judge.to_string()),
                custom_text: plan.custom_text,
                case_num: case.case_num.clone(),
                next_case_num,
            },
        );

        self.session
            .publish(PublishJob {
                thread_url: case.topic_link.clone(),
                body,
                judge: judge_credentials,
                owner,
            })
            .await?;

        info!(case_id, judge, "decision published");
        Ok(match decision {
            Decision::RequestRebuttal => DecisionOutcome::AwaitingRebuttalCategory,
            _ => DecisionOutcome::Completed,
        })
    }

    /// Submit the judge's chosen penalty category to the external rebuttal
    /// handler. The handler's answer is surfaced verbatim and never mutates
    /// case state.
    pub async fn submit_rebuttal_category(
        &self,
        case_id: i64,
        judge: &str,
        category: &str,
    ) -> Result<String, WorkflowError> {
        self.ensure_whitelisted(judge).await?;
        let case = self.load_case(case_id).await?;

        let nickname = judge.to_string();
        let identity = self
            .store
            .call(move |store| store.get_identity(&nickname))
            .await?;
        let external_judge_id = identity
            .and_then(|i| i.external_id)
            .unwrap_or_else(|| UNSET_EXTERNAL_ID.to_string());

        let request = RebuttalRequest {
            thread_url: case.topic_link.clone(),
            officer_name: case.officer_name.clone(),
            judge_name: judge.to_string(),
            category: category.to_string(),
            external_judge_id,
        };
        let message = self.handler.submit(&request).await?;
        info!(case_id, judge, category, "rebuttal handler accepted the request");
        Ok(message)
    }

    // ── Lookups ───────────────────────────────────────────────────────

    async fn load_case(&self, case_id: i64) -> Result<Case, WorkflowError> {
        self.store
            .call(move |store| store.get_case(case_id))
            .await?
            .ok_or(WorkflowError::CaseNotFound { id: case_id })
    }

    async fn ensure_whitelisted(&self, judge: &str) -> Result<(), WorkflowError> {
        let nickname = judge.to_string();
        let listed = self
            .store
            .call(move |store| store.is_whitelisted(&nickname))
            .await?;
        if listed {
            Ok(())
        } else {
            Err(WorkflowError::NotWhitelisted {
                nickname: judge.to_string(),
            })
        }
    }

    async fn require_template(&self, kind: TemplateKind) -> Result<String, WorkflowError> {
        self.store
            .call(move |store| store.get_template(kind))
            .await?
            .ok_or(WorkflowError::TemplateMissing {
                kind: kind.as_str().to_string(),
            })
    }

    async fn credentials_for(&self, nickname: &str) -> Result<Credentials, WorkflowError> {
        let wanted = nickname.to_string();
        let identity = self
            .store
            .call(move |store| store.get_identity(&wanted))
            .await?
            .ok_or(WorkflowError::IdentityMissing {
                nickname: nickname.to_string(),
            })?;
        self.decrypt(identity.nickname, &identity.encrypted_secret)
            .await
    }

    async fn owner_credentials(&self) -> Result<Credentials, WorkflowError> {
        let identity = self
            .store
            .call(|store| store.owner_identity())
            .await?
            .ok_or(WorkflowError::OwnerMissing)?;
        self.decrypt(identity.nickname, &identity.encrypted_secret)
            .await
    }

    async fn decrypt(
        &self,
        nickname: String,
        encrypted: &str,
    ) -> Result<Credentials, WorkflowError> {
        let secret =
            self.cipher
                .decrypt(encrypted)
                .await
                .map_err(|e| WorkflowError::DecryptFailed {
                    nickname: nickname.clone(),
                    detail: e.to_string(),
                })?;
        Ok(Credentials { nickname, secret })
    }

    /// Advance the expected docket number if this case's declared number
    /// matches it. A mismatch only logs; the counter is self-healing, not
    /// authoritative.
    async fn reconcile_counter(&self, case: &Case) {
        let Some(declared) = case.case_num.clone() else {
            warn!(case_id = case.id, "case has no docket number, counter untouched");
            return;
        };
        let shown = declared.clone();
        match self
            .store
            .call(move |store| store.reconcile_expected_number(&declared))
            .await
        {
            Ok(true) => info!(case_id = case.id, declared = %shown, "expected docket number advanced"),
            Ok(false) => info!(
                case_id = case.id,
                declared = %shown,
                "declared docket number does not match the expected one, counter untouched"
            ),
            Err(e) => warn!(case_id = case.id, error = %e, "counter reconciliation failed"),
        }
    }
}

fn ensure_assigned(case: &Case, judge: &str) -> Result<(), WorkflowError> {
    match &case.current_judge {
        Some(assigned) if assigned.eq_ignore_ascii_case(judge) => Ok(()),
        Some(assigned) => Err(WorkflowError::NotAssignedJudge {
            id: case.id,
            assigned: assigned.clone(),
            acting: judge.to_string(),
        }),
        None => Err(WorkflowError::NotAssignedJudge {
            id: case.id,
            assigned: "nobody".to_string(),
            acting: judge.to_string(),
        }),
    }
}

/// First `max_chars` characters of a reply, elided for the audit log.
fn snippet(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let cut: String = body.chars().take(max_chars).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::errors::{HandlerError, SessionAction, SessionError, StepFailure};
    use crate::secrets::PlainSecrets;
    use crate::session::{ReplySnapshot, ThreadSummary, TopicDetails};
    use crate::store::{CaseStore, Identity, NewCase};

    /// Records publish jobs; optionally fails the first one.
    #[derive(Default)]
    struct RecordingDriver {
        jobs: Mutex<Vec<PublishJob>>,
        fail_post: bool,
    }

    #[async_trait]
    impl SessionDriver for RecordingDriver {
        async fn publish(&self, job: PublishJob) -> Result<(), StepFailure> {
            self.jobs.lock().unwrap().push(job);
            if self.fail_post {
                Err(StepFailure::new(
                    SessionAction::PostReply,
                    SessionError::Timeout {
                        what: "posted reply confirmation".to_string(),
                        waited_secs: 20,
                    },
                ))
            } else {
                Ok(())
            }
        }
        async fn scan_intake(&self) -> Result<Vec<ThreadSummary>, SessionError> {
            Ok(vec![])
        }
        async fn scrape_topic(&self, _url: &str) -> Result<TopicDetails, SessionError> {
            Ok(TopicDetails::default())
        }
        async fn count_replies(&self, _url: &str) -> Result<ReplySnapshot, SessionError> {
            Err(SessionError::Closed)
        }
    }

    struct ScriptedHandler {
        result: Result<String, u16>,
    }

    #[async_trait]
    impl RebuttalHandler for ScriptedHandler {
        async fn submit(&self, _request: &RebuttalRequest) -> Result<String, HandlerError> {
            match &self.result {
                Ok(message) => Ok(message.clone()),
                Err(code) => Err(HandlerError::Api {
                    status_code: *code,
                    message: "refused".to_string(),
                }),
            }
        }
    }

    struct Fixture {
        store: DbHandle,
        driver: Arc<RecordingDriver>,
        orchestrator: Orchestrator,
        case_id: i64,
    }

    async fn fixture_with(fail_post: bool, handler_result: Result<String, u16>) -> Fixture {
        let store = DbHandle::new(CaseStore::open_in_memory().unwrap());
        let case_id = store
            .call(|s| {
                s.add_judge("Themis")?;
                s.upsert_identity(&Identity {
                    nickname: "Themis".to_string(),
                    encrypted_secret: "themis-secret".to_string(),
                    external_id: Some("j-17".to_string()),
                    is_owner: false,
                })?;
                s.upsert_identity(&Identity {
                    nickname: "Clerk".to_string(),
                    encrypted_secret: "clerk-secret".to_string(),
                    external_id: None,
                    is_owner: true,
                })?;
                for kind in TemplateKind::all() {
                    s.set_template(kind, &format!("{}: data1 vs data2, No. data5, next data6, text data4", kind.as_str()))?;
                }
                s.set_expected_case_num("41")?;
                let case = s
                    .insert_case(&NewCase {
                        topic_link: "https://board.test/threads/41/".to_string(),
                        topic_title: "Case No. 41".to_string(),
                        case_num: Some("41".to_string()),
                        applicant_name: "Ivan_Petrov".to_string(),
                        officer_name: "John_Law".to_string(),
                        full_text: None,
                        media_references: vec![],
                        publication_time: None,
                    })?
                    .unwrap();
                s.update_status_and_judge(case.id, CaseStatus::InReview, Some("Themis"))?;
                Ok(case.id)
            })
            .await
            .unwrap();

        let driver = Arc::new(RecordingDriver {
            jobs: Mutex::new(vec![]),
            fail_post,
        });
        let orchestrator = Orchestrator::new(
            store.clone(),
            driver.clone(),
            Arc::new(PlainSecrets),
            Arc::new(ScriptedHandler {
                result: handler_result,
            }),
        );
        Fixture {
            store,
            driver,
            orchestrator,
            case_id,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(false, Ok("penalty filed".to_string())).await
    }

    async fn case_of(f: &Fixture) -> Case {
        let id = f.case_id;
        f.store
            .call(move |s| s.get_case(id).map(|c| c.unwrap()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn claim_assigns_judge_and_appends_one_note() {
        let f = fixture().await;
        let open_id = f
            .store
            .call(|s| {
                let case = s
                    .insert_case(&NewCase {
                        topic_link: "https://board.test/threads/42/".to_string(),
                        topic_title: "Case No. 42".to_string(),
                        case_num: Some("42".to_string()),
                        applicant_name: "Citizen".to_string(),
                        officer_name: "Citizen".to_string(),
                        full_text: None,
                        media_references: vec![],
                        publication_time: None,
                    })?
                    .unwrap();
                Ok(case.id)
            })
            .await
            .unwrap();

        match f.orchestrator.claim(open_id, "Themis").await.unwrap() {
            ClaimOutcome::Claimed(case) => {
                assert_eq!(case.status, CaseStatus::InReview);
                assert_eq!(case.current_judge.as_deref(), Some("Themis"));
                assert_eq!(case.notes.lines().count(), 1);
            }
            other => panic!("Expected Claimed, got {:?}", other),
        }

        // Claiming again is a no-op view of the same case.
        assert!(matches!(
            f.orchestrator.claim(open_id, "Themis").await.unwrap(),
            ClaimOutcome::AlreadyYours(_)
        ));
    }

    #[tokio::test]
    async fn claim_of_anothers_case_is_refused() {
        let f = fixture().await;
        f.store.call(|s| s.add_judge("Minos")).await.unwrap();
        match f.orchestrator.claim(f.case_id, "Minos").await.unwrap() {
            ClaimOutcome::TakenBy(judge) => assert_eq!(judge, "Themis"),
            other => panic!("Expected TakenBy, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn reject_commits_status_and_closes_under_owner() {
        let f = fixture().await;
        let notes_before = case_of(&f).await.notes.lines().count();

        let outcome = f
            .orchestrator
            .decide(
                f.case_id,
                "Themis",
                Decision::Reject {
                    reason: RejectReason::Malformed,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::Completed);

        let case = case_of(&f).await;
        assert_eq!(case.status, CaseStatus::RejectedMalformed);
        assert_eq!(case.notes.lines().count(), notes_before + 1, "exactly one audit entry");

        let jobs = f.driver.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].judge.nickname, "Themis");
        assert_eq!(jobs[0].judge.secret, "themis-secret");
        let owner = jobs[0].owner.as_ref().expect("owner follow-up expected");
        assert_eq!(owner.credentials.nickname, "Clerk");
        assert_eq!(
            owner.action,
            ThreadAction::Close {
                settle: Duration::ZERO
            }
        );
        assert!(jobs[0].body.contains("Ivan_Petrov"));
        assert!(jobs[0].body.contains("No. 41"));
    }

    #[tokio::test]
    async fn failed_post_reports_step_and_keeps_committed_status() {
        let f = fixture_with(true, Ok(String::new())).await;
        let err = f
            .orchestrator
            .decide(
                f.case_id,
                "Themis",
                Decision::Reject {
                    reason: RejectReason::WrongNumber,
                },
            )
            .await
            .unwrap_err();
        match err {
            WorkflowError::Session(failure) => {
                assert_eq!(failure.action, SessionAction::PostReply)
            }
            other => panic!("Expected Session error, got {:?}", other),
        }
        // Deliberately not rolled back: visible partial state over a
        // duplicate public post.
        assert_eq!(case_of(&f).await.status, CaseStatus::RejectedWrongNumber);
    }

    #[tokio::test]
    async fn missing_template_skips_the_decision_entirely() {
        let f = fixture().await;
        f.store
            .call(|s| s.delete_template(TemplateKind::RejectMalformed).map(|_| ()))
            .await
            .unwrap();

        let err = f
            .orchestrator
            .decide(
                f.case_id,
                "Themis",
                Decision::Reject {
                    reason: RejectReason::Malformed,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::TemplateMissing { .. }));

        // No partial write and no browser contact.
        assert_eq!(case_of(&f).await.status, CaseStatus::InReview);
        assert!(f.driver.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rebuttal_request_pins_reconciles_and_asks_for_category() {
        let f = fixture().await;
        let outcome = f
            .orchestrator
            .decide(f.case_id, "Themis", Decision::RequestRebuttal)
            .await
            .unwrap();
        assert_eq!(outcome, DecisionOutcome::AwaitingRebuttalCategory);

        let case = case_of(&f).await;
        assert_eq!(case.status, CaseStatus::AwaitingRebuttal);

        // Counter matched "41" and advanced; the template rendered after
        // reconciliation sees the new value.
        let expected = f
            .store
            .call(|s| s.expected_case_num())
            .await
            .unwrap();
        assert_eq!(expected.as_deref(), Some("42"));

        let jobs = f.driver.jobs.lock().unwrap();
        assert_eq!(jobs[0].owner.as_ref().unwrap().action, ThreadAction::Pin);
        assert!(jobs[0].body.contains("next 42"));
    }

    #[tokio::test]
    async fn intermediate_reply_posts_without_owner_session() {
        let f = fixture().await;
        f.orchestrator
            .decide(
                f.case_id,
                "Themis",
                Decision::Reply {
                    body: "Provide the patrol footage.".to_string(),
                    kind: ReplyKind::Intermediate,
                },
            )
            .await
            .unwrap();

        let case = case_of(&f).await;
        assert_eq!(case.status, CaseStatus::AwaitingRebuttal);
        assert!(case.notes.contains("Provide the patrol footage."));

        let jobs = f.driver.jobs.lock().unwrap();
        assert!(jobs[0].owner.is_none());
        assert!(jobs[0].body.contains("text Provide the patrol footage."));
    }

    #[tokio::test]
    async fn final_verdict_closes_with_settle_delay() {
        let f = fixture().await;
        f.orchestrator
            .decide(
                f.case_id,
                "Themis",
                Decision::Reply {
                    body: "The court rules in favor of the applicant.".to_string(),
                    kind: ReplyKind::Final,
                },
            )
            .await
            .unwrap();

        assert_eq!(case_of(&f).await.status, CaseStatus::Closed);

        let jobs = f.driver.jobs.lock().unwrap();
        assert_eq!(
            jobs[0].owner.as_ref().unwrap().action,
            ThreadAction::Close {
                settle: FINAL_CLOSE_SETTLE
            }
        );
    }

    #[tokio::test]
    async fn decisions_from_the_wrong_judge_or_status_are_refused() {
        let f = fixture().await;
        f.store.call(|s| s.add_judge("Minos")).await.unwrap();
        assert!(matches!(
            f.orchestrator
                .decide(f.case_id, "Minos", Decision::RequestRebuttal)
                .await
                .unwrap_err(),
            WorkflowError::NotAssignedJudge { .. }
        ));

        assert!(matches!(
            f.orchestrator
                .decide(f.case_id, "Impostor", Decision::RequestRebuttal)
                .await
                .unwrap_err(),
            WorkflowError::NotWhitelisted { .. }
        ));

        let id = f.case_id;
        f.store
            .call(move |s| s.update_status(id, CaseStatus::Closed))
            .await
            .unwrap();
        assert!(matches!(
            f.orchestrator
                .decide(f.case_id, "Themis", Decision::RequestRebuttal)
                .await
                .unwrap_err(),
            WorkflowError::InvalidStatus { .. }
        ));
    }

    #[tokio::test]
    async fn release_returns_the_case_to_the_pool() {
        let f = fixture().await;
        f.orchestrator.release(f.case_id, "Themis").await.unwrap();
        let case = case_of(&f).await;
        assert_eq!(case.status, CaseStatus::Open);
        assert!(case.current_judge.is_none());
    }

    #[tokio::test]
    async fn rebuttal_category_surfaces_handler_message() {
        let f = fixture().await;
        let message = f
            .orchestrator
            .submit_rebuttal_category(f.case_id, "Themis", "arrest")
            .await
            .unwrap();
        assert_eq!(message, "penalty filed");
    }

    #[tokio::test]
    async fn rebuttal_handler_failure_leaves_status_alone() {
        let f = fixture_with(false, Err(403)).await;
        let id = f.case_id;
        f.store
            .call(move |s| s.update_status(id, CaseStatus::AwaitingRebuttal))
            .await
            .unwrap();

        let err = f
            .orchestrator
            .submit_rebuttal_category(f.case_id, "Themis", "arrest")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Handler(HandlerError::Api {
                status_code: 403,
                ..
            })
        ));
        assert_eq!(case_of(&f).await.status, CaseStatus::AwaitingRebuttal);
    }

    #[test]
    fn snippet_elides_long_bodies() {
        assert_eq!(snippet("short", 70), "short");
        let long: String = std::iter::repeat('x').take(100).collect();
        let s = snippet(&long, 70);
        assert_eq!(s.chars().count(), 73);
        assert!(s.ends_with("..."));
    }
}
