use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// L1 tokens needed before level 2 unlocks.
pub const L2_REQUIRED_L1_TOKENS: u32 = 3;

/// Learner summary shown by the progress panel (`GET /users/me`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[serde(default)]
    pub name: Option<String>,
    /// Absent while the backend is still provisioning the wallet
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub l1_token_count: u32,
    #[serde(default)]
    pub etherscan_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct QuestLevel(u8);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown quest level `{0}`; available levels are 1 and 2")]
pub struct LevelError(pub String);

/// A tier start refused client-side because prerequisites are missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("🔒 Level {level} quests need at least {required} L1 tokens (you have {held})")]
pub struct TierLocked {
    pub level: QuestLevel,
    pub required: u32,
    pub held: u32,
}

impl QuestLevel {
    pub const ONE: QuestLevel = QuestLevel(1);
    pub const TWO: QuestLevel = QuestLevel(2);
    pub const ALL: [QuestLevel; 2] = [Self::ONE, Self::TWO];

    pub fn new(level: u32) -> Result<Self, LevelError> {
        match level {
            1 => Ok(Self::ONE),
            2 => Ok(Self::TWO),
            other => Err(LevelError(other.to_string())),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// L1 tokens required before this level may be started.
    pub fn required_tokens(self) -> u32 {
        match self.0 {
            1 => 0,
            _ => L2_REQUIRED_L1_TOKENS,
        }
    }

    /// Eligibility check against the panel's last known summary. A summary that has
    /// not loaded yet counts as zero tokens.
    pub fn check_unlocked(self, summary: Option<&UserSummary>) -> Result<(), TierLocked> {
        let held = summary.map_or(0, |s| s.l1_token_count);
        let required = self.required_tokens();
        if held >= required {
            Ok(())
        } else {
            Err(TierLocked {
                level: self,
                required,
                held,
            })
        }
    }
}

impl fmt::Display for QuestLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for QuestLevel {
    type Err = LevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let level = raw
            .trim_start_matches(['L', 'l'])
            .parse::<u32>()
            .map_err(|_| LevelError(raw.to_string()))?;
        Self::new(level).map_err(|_| LevelError(raw.to_string()))
    }
}

/// Lock state of one tier as rendered by the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStatus {
    pub level: QuestLevel,
    pub unlocked: bool,
    pub required_tokens: u32,
}

pub fn tier_statuses(summary: Option<&UserSummary>) -> Vec<TierStatus> {
    QuestLevel::ALL
        .iter()
        .map(|level| TierStatus {
            level: *level,
            unlocked: level.check_unlocked(summary).is_ok(),
            required_tokens: level.required_tokens(),
        })
        .collect()
}
