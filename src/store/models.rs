use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a case. Persisted as the single-letter codes the
/// tribunal has always used, so existing databases keep working.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// `a` — open, waiting for a judge to claim it.
    Open,
    /// `b` — claimed, under review.
    InReview,
    /// `c` — rejected: wrong docket number.
    RejectedWrongNumber,
    /// `d` — rejected: malformed application form.
    RejectedMalformed,
    /// `e` — rejected: off-system complaint.
    RejectedOffSystem,
    /// `f` — reply posted, awaiting the officer's rebuttal.
    AwaitingRebuttal,
    /// `g` — closed with a final verdict.
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "a",
            Self::InReview => "b",
            Self::RejectedWrongNumber => "c",
            Self::RejectedMalformed => "d",
            Self::RejectedOffSystem => "e",
            Self::AwaitingRebuttal => "f",
            Self::Closed => "g",
        }
    }

    /// Human-readable label for listings.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InReview => "in review",
            Self::RejectedWrongNumber => "rejected: wrong docket number",
            Self::RejectedMalformed => "rejected: malformed form",
            Self::RejectedOffSystem => "rejected: off-system",
            Self::AwaitingRebuttal => "awaiting rebuttal",
            Self::Closed => "closed",
        }
    }

    /// Whether the case shows up in the "available to review" listing.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Open | Self::InReview | Self::AwaitingRebuttal)
    }

    /// Whether a judge decision may still be taken on the case.
    pub fn accepts_decisions(&self) -> bool {
        matches!(self, Self::InReview | Self::AwaitingRebuttal)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RejectedWrongNumber
                | Self::RejectedMalformed
                | Self::RejectedOffSystem
                | Self::Closed
        )
    }
}

impl FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" => Ok(Self::Open),
            "b" => Ok(Self::InReview),
            "c" => Ok(Self::RejectedWrongNumber),
            "d" => Ok(Self::RejectedMalformed),
            "e" => Ok(Self::RejectedOffSystem),
            "f" => Ok(Self::AwaitingRebuttal),
            "g" => Ok(Self::Closed),
            _ => Err(format!("Invalid case status: {}", s)),
        }
    }
}

/// Why a case was rejected. Each reason maps to one terminal status code and
/// one reply template.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    WrongNumber,
    Malformed,
    OffSystem,
}

impl RejectReason {
    pub fn status(&self) -> CaseStatus {
        match self {
            Self::WrongNumber => CaseStatus::RejectedWrongNumber,
            Self::Malformed => CaseStatus::RejectedMalformed,
            Self::OffSystem => CaseStatus::RejectedOffSystem,
        }
    }

    pub fn template(&self) -> TemplateKind {
        match self {
            Self::WrongNumber => TemplateKind::RejectWrongNumber,
            Self::Malformed => TemplateKind::RejectMalformed,
            Self::OffSystem => TemplateKind::RejectOffSystem,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrongNumber => "wrong-number",
            Self::Malformed => "malformed",
            Self::OffSystem => "off-system",
        }
    }
}

impl FromStr for RejectReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wrong-number" => Ok(Self::WrongNumber),
            "malformed" => Ok(Self::Malformed),
            "off-system" => Ok(Self::OffSystem),
            _ => Err(format!(
                "Invalid reject reason '{}'. Valid values: wrong-number, malformed, off-system",
                s
            )),
        }
    }
}

/// Which canned reply text a decision resolves to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateKind {
    RejectWrongNumber,
    RejectMalformed,
    RejectOffSystem,
    RebuttalRequest,
    CustomIntermediate,
    CustomFinal,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RejectWrongNumber => "reject-wrong-number",
            Self::RejectMalformed => "reject-malformed",
            Self::RejectOffSystem => "reject-off-system",
            Self::RebuttalRequest => "rebuttal-request",
            Self::CustomIntermediate => "custom-intermediate",
            Self::CustomFinal => "custom-final",
        }
    }

    pub fn all() -> [TemplateKind; 6] {
        [
            Self::RejectWrongNumber,
            Self::RejectMalformed,
            Self::RejectOffSystem,
            Self::RebuttalRequest,
            Self::CustomIntermediate,
            Self::CustomFinal,
        ]
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject-wrong-number" => Ok(Self::RejectWrongNumber),
            "reject-malformed" => Ok(Self::RejectMalformed),
            "reject-off-system" => Ok(Self::RejectOffSystem),
            "rebuttal-request" => Ok(Self::RebuttalRequest),
            "custom-intermediate" => Ok(Self::CustomIntermediate),
            "custom-final" => Ok(Self::CustomFinal),
            _ => Err(format!("Invalid template kind: {}", s)),
        }
    }
}

/// A case thread as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: i64,
    /// Forum-declared docket number, distinct from `id`. May be absent.
    pub case_num: Option<String>,
    /// Globally unique key for a case thread.
    pub topic_link: String,
    pub topic_title: String,
    pub applicant_name: String,
    pub officer_name: String,
    pub current_judge: Option<String>,
    pub status: CaseStatus,
    pub full_text: Option<String>,
    pub media_references: Vec<String>,
    /// Append-only audit log, one timestamped line per entry.
    pub notes: String,
    pub post_count: i64,
    pub screenshot_path: Option<String>,
    pub publication_time: Option<String>,
    pub scraped_at: String,
}

impl Case {
    /// Docket number for display, falling back when the forum never declared
    /// one.
    pub fn docket_display(&self) -> &str {
        match self.case_num.as_deref() {
            Some(n) if !n.trim().is_empty() => n,
            _ => "unnumbered",
        }
    }
}

/// Fields the detector supplies when ingesting a freshly scraped topic.
#[derive(Debug, Clone)]
pub struct NewCase {
    pub topic_link: String,
    pub topic_title: String,
    pub case_num: Option<String>,
    pub applicant_name: String,
    pub officer_name: String,
    pub full_text: Option<String>,
    pub media_references: Vec<String>,
    pub publication_time: Option<String>,
}

/// A forum login identity: a judge or the system owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub nickname: String,
    /// Opaque encrypted secret; decryption is the cipher collaborator's job.
    pub encrypted_secret: String,
    /// Identifier under which the external rebuttal handler knows this judge.
    pub external_id: Option<String>,
    pub is_owner: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for code in ["a", "b", "c", "d", "e", "f", "g"] {
            let status = CaseStatus::from_str(code).unwrap();
            assert_eq!(status.as_str(), code);
        }
        assert!(CaseStatus::from_str("z").is_err());
    }

    #[test]
    fn only_open_in_review_and_awaiting_are_available() {
        let available: Vec<&str> = ["a", "b", "c", "d", "e", "f", "g"]
            .into_iter()
            .filter(|c| CaseStatus::from_str(c).unwrap().is_available())
            .collect();
        assert_eq!(available, vec!["a", "b", "f"]);
    }

    #[test]
    fn reject_reasons_map_to_status_and_template() {
        assert_eq!(
            RejectReason::Malformed.status(),
            CaseStatus::RejectedMalformed
        );
        assert_eq!(
            RejectReason::WrongNumber.template(),
            TemplateKind::RejectWrongNumber
        );
        assert_eq!(
            RejectReason::from_str("off-system").unwrap(),
            RejectReason::OffSystem
        );
    }

    #[test]
    fn docket_display_falls_back_when_blank() {
        let mut case = Case {
            id: 1,
            case_num: Some("  ".to_string()),
            topic_link: "https://board.test/threads/1/".to_string(),
            topic_title: "Case".to_string(),
            applicant_name: "Citizen".to_string(),
            officer_name: "Citizen".to_string(),
            current_judge: None,
            status: CaseStatus::Open,
            full_text: None,
            media_references: vec![],
            notes: String::new(),
            post_count: 1,
            screenshot_path: None,
            publication_time: None,
            scraped_at: String::new(),
        };
        assert_eq!(case.docket_display(), "unnumbered");
        case.case_num = Some("41".to_string());
        assert_eq!(case.docket_display(), "41");
    }
}
