//! Persisted state: cases, the judge whitelist, forum identities, reply
//! templates, and the expected-docket-number counter.

pub mod db;
pub mod models;

pub use db::{CaseStore, DbHandle};
pub use models::{Case, CaseStatus, Identity, NewCase, RejectReason, TemplateKind};
