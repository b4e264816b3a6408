use serde::{Deserialize, Serialize};

/// Strings the grader puts into feedback when a tier is cleared and a token is minted.
/// Only consulted when the verdict carries no explicit `completed` flag.
pub const COMPLETION_MARKERS: &[&str] = &["🏆", "축하합니다", "SBT"];

/// A single graded question. Replaced wholesale when the next one loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: i64,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictResult {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
}

impl VerdictResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

/// Response of `POST /quests/{id}/submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionVerdict {
    pub result: VerdictResult,
    #[serde(default)]
    pub feedback: String,
    /// Structured completion flag. Older backends omit it and signal completion
    /// through `feedback` text instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl SubmissionVerdict {
    pub fn is_pass(&self) -> bool {
        self.result == VerdictResult::Pass
    }

    /// True when this verdict means a credential was issued.
    pub fn grants_credential(&self) -> bool {
        if !self.is_pass() {
            return false;
        }
        self.completed
            .unwrap_or_else(|| contains_completion_marker(&self.feedback))
    }
}

pub fn contains_completion_marker(feedback: &str) -> bool {
    COMPLETION_MARKERS
        .iter()
        .any(|marker| feedback.contains(marker))
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswerRequest<'a> {
    pub user_answer: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TalkRequest<'a> {
    pub message: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TalkResponse {
    pub reply: String,
}
