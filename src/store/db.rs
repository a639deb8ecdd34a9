use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use super::models::*;

/// Async-safe handle to the case database.
///
/// Wraps `CaseStore` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<CaseStore>>,
}

impl DbHandle {
    pub fn new(store: CaseStore) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(store)),
        }
    }

    /// Run a closure with access to the store on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&CaseStore) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("store task panicked")?
    }

    /// Acquire the store mutex synchronously. For startup wiring and tests;
    /// must not be called from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, CaseStore>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))
    }
}

const CASE_COLUMNS: &str = "id, case_num, topic_link, topic_title, applicant_name, officer_name, \
     current_judge, status, full_text, media_references, notes, post_count, \
     screenshot_path, publication_time, scraped_at";

/// Settings key holding the next expected docket number.
const EXPECTED_CASE_NUM_KEY: &str = "expected_case_num";

pub struct CaseStore {
    conn: Connection,
}

impl CaseStore {
    /// Open (or create) a SQLite database at the given path and run
    /// migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS cases (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    case_num TEXT,
                    topic_link TEXT NOT NULL UNIQUE,
                    topic_title TEXT NOT NULL DEFAULT '',
                    applicant_name TEXT NOT NULL DEFAULT 'Citizen',
                    officer_name TEXT NOT NULL DEFAULT 'Citizen',
                    current_judge TEXT,
                    status TEXT NOT NULL DEFAULT 'a',
                    full_text TEXT,
                    media_references TEXT NOT NULL DEFAULT '[]',
                    notes TEXT NOT NULL DEFAULT '',
                    publication_time TEXT,
                    scraped_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS judges (
                    nickname TEXT PRIMARY KEY
                );

                CREATE TABLE IF NOT EXISTS identities (
                    nickname TEXT PRIMARY KEY,
                    encrypted_secret TEXT NOT NULL,
                    external_id TEXT,
                    is_owner INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS templates (
                    kind TEXT PRIMARY KEY,
                    body TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(status);
                ",
            )
            .context("Failed to create tables")?;

        // Additive migrations (columns are nullable or defaulted, safe to
        // re-run). We only ignore "duplicate column" errors — any other
        // error is propagated.
        match self
            .conn
            .execute("ALTER TABLE cases ADD COLUMN post_count INTEGER NOT NULL DEFAULT 1", [])
        {
            Ok(_) => {}
            Err(e) if e.to_string().contains("duplicate column") => {}
            Err(e) => return Err(anyhow::anyhow!("Failed to add post_count column: {}", e)),
        }
        match self
            .conn
            .execute("ALTER TABLE cases ADD COLUMN screenshot_path TEXT", [])
        {
            Ok(_) => {}
            Err(e) if e.to_string().contains("duplicate column") => {}
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to add screenshot_path column: {}",
                    e
                ));
            }
        }

        Ok(())
    }

    // ── Cases ─────────────────────────────────────────────────────────

    /// Insert a freshly scraped case with status `a`.
    ///
    /// Returns `None` when a case with the same topic_link already exists:
    /// the unique constraint makes re-ingestion a harmless no-op even when
    /// two pollers race.
    pub fn insert_case(&self, new: &NewCase) -> Result<Option<Case>> {
        let media_json = serde_json::to_string(&new.media_references)
            .context("Failed to serialize media references")?;
        let inserted = self.conn.execute(
            "INSERT INTO cases (case_num, topic_link, topic_title, applicant_name, officer_name, \
             full_text, media_references, publication_time) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.case_num,
                new.topic_link,
                new.topic_title,
                new.applicant_name,
                new.officer_name,
                new.full_text,
                media_json,
                new.publication_time,
            ],
        );
        match inserted {
            Ok(_) => {
                let id = self.conn.last_insert_rowid();
                Ok(self.get_case(id)?)
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to insert case"),
        }
    }

    pub fn get_case(&self, id: i64) -> Result<Option<Case>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM cases WHERE id = ?1", CASE_COLUMNS))
            .context("Failed to prepare get_case")?;
        let mut rows = stmt
            .query_map(params![id], CaseRow::from_row)
            .context("Failed to query case")?;
        match rows.next() {
            Some(row) => {
                let r = row.context("Failed to read case row")?;
                Ok(Some(r.into_case()?))
            }
            None => Ok(None),
        }
    }

    /// Cases visible in the "available to review" listing: open, in review,
    /// or awaiting rebuttal.
    pub fn list_available(&self) -> Result<Vec<Case>> {
        self.query_cases(
            &format!(
                "SELECT {} FROM cases WHERE status IN ('a', 'b', 'f') ORDER BY id ASC",
                CASE_COLUMNS
            ),
            params![],
        )
    }

    pub fn list_by_status(&self, status: CaseStatus) -> Result<Vec<Case>> {
        self.query_cases(
            &format!(
                "SELECT {} FROM cases WHERE status = ?1 ORDER BY id ASC",
                CASE_COLUMNS
            ),
            params![status.as_str()],
        )
    }

    fn query_cases(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Case>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare case query")?;
        let rows = stmt
            .query_map(args, CaseRow::from_row)
            .context("Failed to query cases")?;
        let mut cases = Vec::new();
        for row in rows {
            let r = row.context("Failed to read case row")?;
            cases.push(r.into_case()?);
        }
        Ok(cases)
    }

    /// Every topic_link the store has ever ingested, for change detection.
    pub fn known_topic_links(&self) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT topic_link FROM cases")
            .context("Failed to prepare known_topic_links")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to query topic links")?;
        let mut links = HashSet::new();
        for row in rows {
            links.insert(row.context("Failed to read topic link")?);
        }
        Ok(links)
    }

    pub fn update_status(&self, id: i64, status: CaseStatus) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cases SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update case status")?;
        Ok(())
    }

    pub fn update_status_and_judge(
        &self,
        id: i64,
        status: CaseStatus,
        judge: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cases SET status = ?1, current_judge = ?2 WHERE id = ?3",
                params![status.as_str(), judge, id],
            )
            .context("Failed to update case status and judge")?;
        Ok(())
    }

    pub fn set_judge(&self, id: i64, judge: Option<&str>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cases SET current_judge = ?1 WHERE id = ?2",
                params![judge, id],
            )
            .context("Failed to update case judge")?;
        Ok(())
    }

    /// Append one timestamped entry to the case's audit log. Existing entries
    /// are never rewritten.
    pub fn append_note(&self, id: i64, text: &str) -> Result<()> {
        let current: String = self
            .conn
            .query_row("SELECT notes FROM cases WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .context("Failed to read case notes")?;
        let timestamp = chrono::Local::now().format("%d.%m.%Y %H:%M:%S");
        let entry = format!("[{}] {}", timestamp, text);
        let updated = if current.is_empty() {
            entry
        } else {
            format!("{}\n{}", current, entry)
        };
        self.conn
            .execute(
                "UPDATE cases SET notes = ?1 WHERE id = ?2",
                params![updated, id],
            )
            .context("Failed to append case note")?;
        Ok(())
    }

    pub fn set_screenshot_path(&self, id: i64, path: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cases SET screenshot_path = ?1 WHERE id = ?2",
                params![path, id],
            )
            .context("Failed to update screenshot path")?;
        Ok(())
    }

    /// Persist a fresh reply scan: the observed post count and the
    /// re-scraped thread transcript.
    pub fn update_replies(&self, id: i64, post_count: i64, transcript: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE cases SET post_count = ?1, full_text = ?2 WHERE id = ?3",
                params![post_count, transcript, id],
            )
            .context("Failed to update reply snapshot")?;
        Ok(())
    }

    // ── Expected docket number counter ────────────────────────────────

    pub fn expected_case_num(&self) -> Result<Option<String>> {
        self.get_setting(EXPECTED_CASE_NUM_KEY)
    }

    pub fn set_expected_case_num(&self, value: &str) -> Result<()> {
        self.set_setting(EXPECTED_CASE_NUM_KEY, value)
    }

    /// Advance the expected docket number when (and only when) the declared
    /// number textually matches it.
    ///
    /// The counter is self-healing rather than authoritative: a mismatch is
    /// logged by the caller and leaves the counter untouched, so a skipped or
    /// misdeclared case never wedges it.
    pub fn reconcile_expected_number(&self, declared: &str) -> Result<bool> {
        let expected = match self.expected_case_num()? {
            Some(v) => v,
            None => return Ok(false),
        };
        let declared = declared.trim();
        let expected = expected.trim().to_string();
        if declared != expected {
            return Ok(false);
        }
        let next: i64 = expected
            .parse()
            .with_context(|| format!("expected docket number '{}' is not numeric", expected))?;
        self.set_expected_case_num(&(next + 1).to_string())?;
        Ok(true)
    }

    // ── Templates ─────────────────────────────────────────────────────

    pub fn get_template(&self, kind: TemplateKind) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM templates WHERE kind = ?1")
            .context("Failed to prepare get_template")?;
        let mut rows = stmt
            .query_map(params![kind.as_str()], |row| row.get::<_, String>(0))
            .context("Failed to query template")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read template")?)),
            None => Ok(None),
        }
    }

    pub fn set_template(&self, kind: TemplateKind, body: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO templates (kind, body) VALUES (?1, ?2)
                 ON CONFLICT(kind) DO UPDATE SET body = excluded.body",
                params![kind.as_str(), body],
            )
            .context("Failed to upsert template")?;
        Ok(())
    }

    pub fn delete_template(&self, kind: TemplateKind) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM templates WHERE kind = ?1",
                params![kind.as_str()],
            )
            .context("Failed to delete template")?;
        Ok(count > 0)
    }

    pub fn list_templates(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, body FROM templates ORDER BY kind")
            .context("Failed to prepare list_templates")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .context("Failed to query templates")?;
        let mut templates = Vec::new();
        for row in rows {
            templates.push(row.context("Failed to read template row")?);
        }
        Ok(templates)
    }

    // ── Judge whitelist ───────────────────────────────────────────────

    /// Add a nickname to the whitelist. Returns false if it was already
    /// present.
    pub fn add_judge(&self, nickname: &str) -> Result<bool> {
        match self.conn.execute(
            "INSERT INTO judges (nickname) VALUES (?1)",
            params![nickname],
        ) {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to insert judge"),
        }
    }

    pub fn remove_judge(&self, nickname: &str) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM judges WHERE nickname = ?1", params![nickname])
            .context("Failed to delete judge")?;
        Ok(count > 0)
    }

    pub fn is_whitelisted(&self, nickname: &str) -> Result<bool> {
        let found: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM judges WHERE nickname = ?1",
                params![nickname],
                |row| row.get(0),
            )
            .context("Failed to check judge whitelist")?;
        Ok(found)
    }

    pub fn list_judges(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT nickname FROM judges ORDER BY nickname")
            .context("Failed to prepare list_judges")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to query judges")?;
        let mut judges = Vec::new();
        for row in rows {
            judges.push(row.context("Failed to read judge row")?);
        }
        Ok(judges)
    }

    // ── Identities ────────────────────────────────────────────────────

    pub fn upsert_identity(&self, identity: &Identity) -> Result<()> {
        if identity.is_owner {
            // At most one owner identity; demote any previous one.
            self.conn
                .execute("UPDATE identities SET is_owner = 0 WHERE is_owner = 1", [])
                .context("Failed to demote previous owner identity")?;
        }
        self.conn
            .execute(
                "INSERT INTO identities (nickname, encrypted_secret, external_id, is_owner)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(nickname) DO UPDATE SET
                    encrypted_secret = excluded.encrypted_secret,
                    external_id = excluded.external_id,
                    is_owner = excluded.is_owner",
                params![
                    identity.nickname,
                    identity.encrypted_secret,
                    identity.external_id,
                    identity.is_owner as i64,
                ],
            )
            .context("Failed to upsert identity")?;
        Ok(())
    }

    pub fn get_identity(&self, nickname: &str) -> Result<Option<Identity>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT nickname, encrypted_secret, external_id, is_owner \
                 FROM identities WHERE nickname = ?1",
            )
            .context("Failed to prepare get_identity")?;
        let mut rows = stmt
            .query_map(params![nickname], identity_from_row)
            .context("Failed to query identity")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read identity row")?)),
            None => Ok(None),
        }
    }

    pub fn owner_identity(&self) -> Result<Option<Identity>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT nickname, encrypted_secret, external_id, is_owner \
                 FROM identities WHERE is_owner = 1 LIMIT 1",
            )
            .context("Failed to prepare owner_identity")?;
        let mut rows = stmt
            .query_map([], identity_from_row)
            .context("Failed to query owner identity")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read identity row")?)),
            None => Ok(None),
        }
    }

    pub fn remove_identity(&self, nickname: &str) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM identities WHERE nickname = ?1",
                params![nickname],
            )
            .context("Failed to delete identity")?;
        Ok(count > 0)
    }

    pub fn list_identities(&self) -> Result<Vec<Identity>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT nickname, encrypted_secret, external_id, is_owner \
                 FROM identities ORDER BY nickname",
            )
            .context("Failed to prepare list_identities")?;
        let rows = stmt
            .query_map([], identity_from_row)
            .context("Failed to query identities")?;
        let mut identities = Vec::new();
        for row in rows {
            identities.push(row.context("Failed to read identity row")?);
        }
        Ok(identities)
    }

    // ── Settings ──────────────────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM settings WHERE key = ?1")
            .context("Failed to prepare get_setting")?;
        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .context("Failed to query setting")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read setting")?)),
            None => Ok(None),
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                params![key, value],
            )
            .context("Failed to upsert setting")?;
        Ok(())
    }
}

fn identity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Identity> {
    Ok(Identity {
        nickname: row.get(0)?,
        encrypted_secret: row.get(1)?,
        external_id: row.get(2)?,
        is_owner: row.get::<_, i64>(3)? != 0,
    })
}

// ── Internal row helpers ──────────────────────────────────────────────

/// Intermediate row struct for reading cases from SQLite before converting
/// the status code and media JSON into typed values.
struct CaseRow {
    id: i64,
    case_num: Option<String>,
    topic_link: String,
    topic_title: String,
    applicant_name: String,
    officer_name: String,
    current_judge: Option<String>,
    status: String,
    full_text: Option<String>,
    media_references: String,
    notes: String,
    post_count: i64,
    screenshot_path: Option<String>,
    publication_time: Option<String>,
    scraped_at: String,
}

impl CaseRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(CaseRow {
            id: row.get(0)?,
            case_num: row.get(1)?,
            topic_link: row.get(2)?,
            topic_title: row.get(3)?,
            applicant_name: row.get(4)?,
            officer_name: row.get(5)?,
            current_judge: row.get(6)?,
            status: row.get(7)?,
            full_text: row.get(8)?,
            media_references: row.get(9)?,
            notes: row.get(10)?,
            post_count: row.get(11)?,
            screenshot_path: row.get(12)?,
            publication_time: row.get(13)?,
            scraped_at: row.get(14)?,
        })
    }

    fn into_case(self) -> Result<Case> {
        let status = CaseStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse case status")?;
        let media_references: Vec<String> = serde_json::from_str(&self.media_references)
            .context("Failed to parse media references JSON")?;
        Ok(Case {
            id: self.id,
            case_num: self.case_num,
            topic_link: self.topic_link,
            topic_title: self.topic_title,
            applicant_name: self.applicant_name,
            officer_name: self.officer_name,
            current_judge: self.current_judge,
            status,
            full_text: self.full_text,
            media_references,
            notes: self.notes,
            post_count: self.post_count,
            screenshot_path: self.screenshot_path,
            publication_time: self.publication_time,
            scraped_at: self.scraped_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn new_case(link: &str) -> NewCase {
        NewCase {
            topic_link: link.to_string(),
            topic_title: format!("Case No. 41 - {}", link),
            case_num: Some("41".to_string()),
            applicant_name: "Ivan_Petrov".to_string(),
            officer_name: "John_Law".to_string(),
            full_text: Some("1) Name: Ivan_Petrov\n2) Officer: John_Law".to_string()),
            media_references: vec!["https://imgur.com/abc".to_string()],
            publication_time: Some("14:05 - 01.08.2026".to_string()),
        }
    }

    #[test]
    fn test_migrations_create_tables() -> Result<()> {
        let store = CaseStore::open_in_memory()?;
        let table_count: i32 = store.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' \
             AND name IN ('cases', 'judges', 'identities', 'templates', 'settings')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 5, "Expected 5 tables to exist");
        Ok(())
    }

    #[test]
    fn test_insert_and_get_case() -> Result<()> {
        let store = CaseStore::open_in_memory()?;
        let case = store
            .insert_case(&new_case("https://board.test/threads/41/"))?
            .expect("first insert should produce a case");
        assert!(case.id > 0);
        assert_eq!(case.status, CaseStatus::Open);
        assert_eq!(case.case_num.as_deref(), Some("41"));
        assert_eq!(case.post_count, 1);
        assert_eq!(case.media_references, vec!["https://imgur.com/abc"]);

        let fetched = store.get_case(case.id)?.expect("case should exist");
        assert_eq!(fetched.topic_link, "https://board.test/threads/41/");
        Ok(())
    }

    #[test]
    fn test_duplicate_topic_link_is_a_noop() -> Result<()> {
        let store = CaseStore::open_in_memory()?;
        let link = "https://board.test/threads/41/";
        let first = store.insert_case(&new_case(link))?;
        assert!(first.is_some());
        let second = store.insert_case(&new_case(link))?;
        assert!(second.is_none(), "duplicate insert must be a no-op");

        let count: i64 =
            store
                .conn
                .query_row("SELECT COUNT(*) FROM cases", [], |row| row.get(0))?;
        assert_eq!(count, 1, "exactly one row for the topic link");
        Ok(())
    }

    #[test]
    fn test_available_listing_filters_statuses() -> Result<()> {
        let store = CaseStore::open_in_memory()?;
        let statuses = [
            CaseStatus::Open,
            CaseStatus::InReview,
            CaseStatus::RejectedWrongNumber,
            CaseStatus::RejectedMalformed,
            CaseStatus::RejectedOffSystem,
            CaseStatus::AwaitingRebuttal,
            CaseStatus::Closed,
        ];
        for (i, status) in statuses.iter().enumerate() {
            let case = store
                .insert_case(&new_case(&format!("https://board.test/threads/{}/", i)))?
                .unwrap();
            store.update_status(case.id, *status)?;
        }
        let available = store.list_available()?;
        let codes: Vec<&str> = available.iter().map(|c| c.status.as_str()).collect();
        assert_eq!(codes, vec!["a", "b", "f"]);
        Ok(())
    }

    #[test]
    fn test_append_note_accumulates_entries() -> Result<()> {
        let store = CaseStore::open_in_memory()?;
        let case = store
            .insert_case(&new_case("https://board.test/threads/41/"))?
            .unwrap();
        store.append_note(case.id, "Taken into review by Themis")?;
        store.append_note(case.id, "Rejected: malformed form")?;

        let fetched = store.get_case(case.id)?.unwrap();
        let lines: Vec<&str> = fetched.notes.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Taken into review by Themis"));
        assert!(lines[1].contains("Rejected: malformed form"));
        assert!(lines[0].starts_with('['), "entries are timestamped");
        Ok(())
    }

    #[test]
    fn test_counter_reconciliation_advances_only_on_match() -> Result<()> {
        let store = CaseStore::open_in_memory()?;
        store.set_expected_case_num("41")?;

        assert!(!store.reconcile_expected_number("40")?);
        assert_eq!(store.expected_case_num()?.as_deref(), Some("41"));

        assert!(store.reconcile_expected_number(" 41 ")?);
        assert_eq!(store.expected_case_num()?.as_deref(), Some("42"));
        Ok(())
    }

    #[test]
    fn test_counter_reconciliation_without_counter_is_noop() -> Result<()> {
        let store = CaseStore::open_in_memory()?;
        assert!(!store.reconcile_expected_number("41")?);
        assert!(store.expected_case_num()?.is_none());
        Ok(())
    }

    #[test]
    fn test_update_replies_persists_count_and_transcript() -> Result<()> {
        let store = CaseStore::open_in_memory()?;
        let case = store
            .insert_case(&new_case("https://board.test/threads/41/"))?
            .unwrap();
        store.update_replies(case.id, 5, "first post\n\nsecond post")?;
        let fetched = store.get_case(case.id)?.unwrap();
        assert_eq!(fetched.post_count, 5);
        assert_eq!(fetched.full_text.as_deref(), Some("first post\n\nsecond post"));
        Ok(())
    }

    #[test]
    fn test_judge_whitelist() -> Result<()> {
        let store = CaseStore::open_in_memory()?;
        assert!(store.add_judge("Themis")?);
        assert!(!store.add_judge("Themis")?, "second add reports duplicate");
        assert!(store.is_whitelisted("Themis")?);
        assert!(!store.is_whitelisted("Impostor")?);
        assert!(store.remove_judge("Themis")?);
        assert!(!store.is_whitelisted("Themis")?);
        Ok(())
    }

    #[test]
    fn test_owner_identity_is_unique() -> Result<()> {
        let store = CaseStore::open_in_memory()?;
        store.upsert_identity(&Identity {
            nickname: "Themis".to_string(),
            encrypted_secret: "enc-a".to_string(),
            external_id: Some("j-1".to_string()),
            is_owner: false,
        })?;
        store.upsert_identity(&Identity {
            nickname: "Clerk".to_string(),
            encrypted_secret: "enc-b".to_string(),
            external_id: None,
            is_owner: true,
        })?;
        store.upsert_identity(&Identity {
            nickname: "Clerk2".to_string(),
            encrypted_secret: "enc-c".to_string(),
            external_id: None,
            is_owner: true,
        })?;

        let owner = store.owner_identity()?.expect("owner should exist");
        assert_eq!(owner.nickname, "Clerk2");
        let owners: i64 = store.conn.query_row(
            "SELECT COUNT(*) FROM identities WHERE is_owner = 1",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(owners, 1);
        Ok(())
    }

    #[test]
    fn test_templates_round_trip() -> Result<()> {
        let store = CaseStore::open_in_memory()?;
        assert!(store.get_template(TemplateKind::RebuttalRequest)?.is_none());
        store.set_template(TemplateKind::RebuttalRequest, "Dear data1, respond by data0")?;
        assert_eq!(
            store.get_template(TemplateKind::RebuttalRequest)?.as_deref(),
            Some("Dear data1, respond by data0")
        );
        store.set_template(TemplateKind::RebuttalRequest, "updated")?;
        assert_eq!(
            store.get_template(TemplateKind::RebuttalRequest)?.as_deref(),
            Some("updated")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_runs_on_blocking_pool() -> Result<()> {
        let handle = DbHandle::new(CaseStore::open_in_memory()?);
        let case = handle
            .call(|store| {
                store
                    .insert_case(&new_case("https://board.test/threads/1/"))
                    .map(|c| c.unwrap())
            })
            .await?;
        let fetched = handle.call(move |store| store.get_case(case.id)).await?;
        assert!(fetched.is_some());
        Ok(())
    }
}
