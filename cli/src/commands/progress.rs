use serde_json::{Value, json};
use verilingua_core::progress::{QuestLevel, TierStatus, UserSummary};

use crate::orchestrator::{Orchestrator, StartError};
use crate::session::QuestSession;
use crate::util::print_json;

pub fn panel_json(summary: Option<&UserSummary>, tiers: &[TierStatus]) -> Value {
    json!({
        "user": summary,
        "tiers": tiers,
    })
}

pub async fn me(orchestrator: &mut Orchestrator) -> Result<(), Box<dyn std::error::Error>> {
    orchestrator.refresh_progress().await?;
    print_json(&panel_json(orchestrator.summary(), &orchestrator.tiers()))?;
    Ok(())
}

/// Start a tier and print the quest the backend handed out.
pub async fn quest_start(
    orchestrator: &mut Orchestrator,
    level: QuestLevel,
) -> Result<(), Box<dyn std::error::Error>> {
    orchestrator.refresh_progress().await?;
    match orchestrator.start_level(level).await {
        Ok(()) => {}
        Err(StartError::Locked(locked)) => {
            print_json(&json!({ "status": "locked", "message": locked.to_string() }))?;
            return Ok(());
        }
        Err(StartError::Backend(e)) => return Err(e.into()),
    }
    orchestrator.settle().await;

    print_json(&quest_json(level, orchestrator.session()))?;
    Ok(())
}

fn quest_json(level: QuestLevel, session: &QuestSession) -> Value {
    match session.current_quest() {
        Some(quest) => json!({
            "status": "started",
            "level": level,
            "quest": quest,
        }),
        None => json!({
            "status": "no_quest",
            "level": level,
            "message": session.messages().last().map(|m| m.text.as_str()),
        }),
    }
}
