//! Full case lifecycle through the library API, with the browser replaced by
//! a scripted session driver: ingestion by the detector, claiming, a
//! rebuttal request, reply tracking, and the final verdict.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use gavel::detector::{Detector, DetectorSettings};
use gavel::errors::{HandlerError, SessionError, StepFailure};
use gavel::notify::{Notify, NotifyKind};
use gavel::rebuttal::{RebuttalHandler, RebuttalRequest};
use gavel::secrets::PlainSecrets;
use gavel::session::worker::SessionDriver;
use gavel::session::{
    PublishJob, RawMediaRefs, ReplySnapshot, ThreadAction, ThreadSummary, TopicDetails,
};
use gavel::store::{CaseStatus, CaseStore, DbHandle, Identity, TemplateKind};
use gavel::workflow::{ClaimOutcome, Decision, DecisionOutcome, Orchestrator, ReplyKind};

const TOPIC: &str = "https://board.test/threads/case-41.77/";

/// Scripted stand-in for the browser session: a fixed intake listing, a
/// scripted first post, a tunable reply count, and a record of publications.
struct ScriptedSession {
    reply_count: Mutex<i64>,
    published: Mutex<Vec<PublishJob>>,
}

#[async_trait]
impl SessionDriver for ScriptedSession {
    async fn publish(&self, job: PublishJob) -> Result<(), StepFailure> {
        self.published.lock().unwrap().push(job);
        Ok(())
    }

    async fn scan_intake(&self) -> Result<Vec<ThreadSummary>, SessionError> {
        Ok(vec![ThreadSummary {
            title: "Case No. 41 - unlawful detention".to_string(),
            url: TOPIC.to_string(),
            locked: false,
        }])
    }

    async fn scrape_topic(&self, _url: &str) -> Result<TopicDetails, SessionError> {
        Ok(TopicDetails {
            published_at: Some("2026-08-01T14:05:00+03:00".to_string()),
            body_text: Some(
                "To the district court\n1) Your nickname: Ivan_Petrov\n2) Officer who detained you: John_Law\n3) Evidence: https://imgur.com/abc"
                    .to_string(),
            ),
            media: RawMediaRefs {
                anchors: vec!["https://imgur.com/abc".to_string()],
                ..Default::default()
            },
            screenshot_png: Some(vec![0x89, b'P', b'N', b'G']),
        })
    }

    async fn count_replies(&self, _url: &str) -> Result<ReplySnapshot, SessionError> {
        Ok(ReplySnapshot {
            post_count: *self.reply_count.lock().unwrap(),
            transcript: "application\n\n---\n\nofficer's rebuttal".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<(NotifyKind, i64, Option<String>)>>,
}

#[async_trait]
impl Notify for RecordingNotifier {
    async fn notify(&self, kind: NotifyKind, _title: &str, case_id: i64, target: Option<&str>) {
        self.events
            .lock()
            .unwrap()
            .push((kind, case_id, target.map(str::to_string)));
    }
}

struct AcceptingHandler;

#[async_trait]
impl RebuttalHandler for AcceptingHandler {
    async fn submit(&self, request: &RebuttalRequest) -> Result<String, HandlerError> {
        Ok(format!("{} penalty filed for {}", request.category, request.officer_name))
    }
}

async fn seeded_store() -> DbHandle {
    let store = DbHandle::new(CaseStore::open_in_memory().unwrap());
    store
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
            s.set_expected_case_num("41")?;
            s.set_template(
                TemplateKind::RebuttalRequest,
                "Dear data2, case data5 requires your rebuttal. Judge data3, data0.",
            )?;
            s.set_template(
                TemplateKind::CustomFinal,
                "Verdict in case data5: data4, signed by judge data3 on data0. Next case: data6.",
            )?;
            Ok(())
        })
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn case_flows_from_ingestion_to_verdict() {
    let store = seeded_store().await;
    let session = Arc::new(ScriptedSession {
        reply_count: Mutex::new(1),
        published: Mutex::new(vec![]),
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let screenshot_dir = tempfile::tempdir().unwrap();

    let detector = Detector::new(
        store.clone(),
        session.clone(),
        notifier.clone(),
        DetectorSettings {
            interval: Duration::from_secs(5),
            reply_scan_every: 1,
            screenshot_dir: PathBuf::from(screenshot_dir.path()),
            ignored_media: HashSet::new(),
        },
    );
    let orchestrator = Orchestrator::new(
        store.clone(),
        session.clone(),
        Arc::new(PlainSecrets),
        Arc::new(AcceptingHandler),
    );

    // ── Ingestion ─────────────────────────────────────────────────────
    detector.poll_once().await.unwrap();

    let cases = store.call(|s| s.list_available()).await.unwrap();
    assert_eq!(cases.len(), 1);
    let case_id = cases[0].id;
    assert_eq!(cases[0].status, CaseStatus::Open);
    assert_eq!(cases[0].applicant_name, "Ivan_Petrov");
    assert_eq!(cases[0].officer_name, "John_Law");
    assert_eq!(cases[0].case_num.as_deref(), Some("41"));
    assert_eq!(cases[0].media_references, vec!["https://imgur.com/abc"]);
    assert!(
        cases[0]
            .screenshot_path
            .as_deref()
            .is_some_and(|p| p.ends_with(&format!("case_{}.png", case_id)))
    );

    // Re-running the tick must not duplicate the case.
    detector.poll_once().await.unwrap();
    assert_eq!(store.call(|s| s.list_available()).await.unwrap().len(), 1);

    // ── Claim ─────────────────────────────────────────────────────────
    match orchestrator.claim(case_id, "Themis").await.unwrap() {
        ClaimOutcome::Claimed(case) => assert_eq!(case.status, CaseStatus::InReview),
        other => panic!("Expected Claimed, got {:?}", other),
    }

    // ── Rebuttal request ──────────────────────────────────────────────
    let outcome = orchestrator
        .decide(case_id, "Themis", Decision::RequestRebuttal)
        .await
        .unwrap();
    assert_eq!(outcome, DecisionOutcome::AwaitingRebuttalCategory);

    {
        let published = session.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].judge.nickname, "Themis");
        assert_eq!(
            published[0].owner.as_ref().unwrap().action,
            ThreadAction::Pin
        );
        assert!(published[0].body.contains("Dear John_Law"));
    }

    // The declared number matched the counter, which advanced.
    assert_eq!(
        store.call(|s| s.expected_case_num()).await.unwrap().as_deref(),
        Some("42")
    );

    let message = orchestrator
        .submit_rebuttal_category(case_id, "Themis", "arrest")
        .await
        .unwrap();
    assert_eq!(message, "arrest penalty filed for John_Law");

    // ── Reply tracking ────────────────────────────────────────────────
    *session.reply_count.lock().unwrap() = 2;
    detector.scan_replies_once().await.unwrap();

    let tracked = store
        .call(move |s| s.get_case(case_id).map(|c| c.unwrap()))
        .await
        .unwrap();
    assert_eq!(tracked.post_count, 2);
    assert!(tracked.full_text.as_deref().unwrap().contains("rebuttal"));

    let reply_events: Vec<_> = notifier
        .events
        .lock()
        .unwrap()
        .iter()
        .filter(|(kind, _, _)| *kind == NotifyKind::NewReply)
        .cloned()
        .collect();
    assert_eq!(reply_events.len(), 1, "one notification per increase");
    assert_eq!(reply_events[0].2.as_deref(), Some("Themis"));

    // A second scan with no new replies stays quiet.
    detector.scan_replies_once().await.unwrap();
    assert_eq!(
        notifier
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _, _)| *kind == NotifyKind::NewReply)
            .count(),
        1
    );

    // ── Final verdict ─────────────────────────────────────────────────
    orchestrator
        .decide(
            case_id,
            "Themis",
            Decision::Reply {
                body: "The detention was unlawful; the record is expunged.".to_string(),
                kind: ReplyKind::Final,
            },
        )
        .await
        .unwrap();

    let closed = store
        .call(move |s| s.get_case(case_id).map(|c| c.unwrap()))
        .await
        .unwrap();
    assert_eq!(closed.status, CaseStatus::Closed);

    let published = session.published.lock().unwrap();
    assert_eq!(published.len(), 2);
    assert!(matches!(
        published[1].owner.as_ref().unwrap().action,
        ThreadAction::Close { .. }
    ));
    assert!(published[1].body.contains("unlawful"));

    // The audit log tells the whole story in order.
    let notes = closed.notes;
    let positions: Vec<usize> = [
        "Taken into review",
        "Rebuttal requested",
        "Final verdict posted",
    ]
    .iter()
    .map(|needle| notes.find(needle).expect(needle))
    .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}
