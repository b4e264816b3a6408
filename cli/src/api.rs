use async_trait::async_trait;
use verilingua_core::progress::{QuestLevel, UserSummary};
use verilingua_core::quests::{
    Quest, SubmissionVerdict, SubmitAnswerRequest, TalkRequest, TalkResponse,
};

use crate::client::{ApiRequest, AuthenticatedClient, ClientError};

/// Backend operations the tutoring session and progress panel depend on.
#[async_trait]
pub trait QuestBackend: Send + Sync {
    /// `GET /users/me`
    async fn current_user(&self) -> Result<UserSummary, ClientError>;

    /// `GET /quests/current`; `None` when no quest is active.
    async fn current_quest(&self) -> Result<Option<Quest>, ClientError>;

    /// `POST /quests/start/{level}`
    async fn start_level(&self, level: QuestLevel) -> Result<(), ClientError>;

    /// `POST /quests/{id}/submit`
    async fn submit_answer(
        &self,
        quest_id: i64,
        answer: &str,
    ) -> Result<SubmissionVerdict, ClientError>;

    /// `POST /chat/talk`
    async fn talk(&self, message: &str) -> Result<String, ClientError>;
}

#[async_trait]
impl QuestBackend for AuthenticatedClient {
    async fn current_user(&self) -> Result<UserSummary, ClientError> {
        self.send(&ApiRequest::get("/users/me")).await?.json()
    }

    async fn current_quest(&self) -> Result<Option<Quest>, ClientError> {
        self.send(&ApiRequest::get("/quests/current"))
            .await?
            .json_opt()
    }

    async fn start_level(&self, level: QuestLevel) -> Result<(), ClientError> {
        self.send(&ApiRequest::post(format!("/quests/start/{level}")))
            .await?;
        Ok(())
    }

    async fn submit_answer(
        &self,
        quest_id: i64,
        answer: &str,
    ) -> Result<SubmissionVerdict, ClientError> {
        let request = ApiRequest::post(format!("/quests/{quest_id}/submit"))
            .with_json(&SubmitAnswerRequest { user_answer: answer })?;
        self.send(&request).await?.json()
    }

    async fn talk(&self, message: &str) -> Result<String, ClientError> {
        let request = ApiRequest::post("/chat/talk").with_json(&TalkRequest { message })?;
        let reply: TalkResponse = self.send(&request).await?.json()?;
        Ok(reply.reply)
    }
}
