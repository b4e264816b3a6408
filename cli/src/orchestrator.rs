use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use verilingua_core::progress::{QuestLevel, TierLocked, TierStatus, UserSummary, tier_statuses};

use crate::api::QuestBackend;
use crate::client::ClientError;
use crate::session::{CompletionListener, InputRejected, QuestSession, QuestTimings, SessionRuntime};

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Locked(#[from] TierLocked),
    #[error("could not start the quest: {0}")]
    Backend(#[source] ClientError),
}

/// Refresh counter the progress panel watches; every bump means "re-fetch".
#[derive(Debug)]
pub struct PanelRefresh {
    tx: watch::Sender<u64>,
}

impl PanelRefresh {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl Default for PanelRefresh {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionListener for PanelRefresh {
    fn credential_granted(&self) {
        self.tx.send_modify(|key| *key += 1);
        tracing::info!(refresh_key = *self.tx.borrow(), "progress panel refresh requested");
    }
}

/// Glue between the tutoring session and the progress panel.
pub struct Orchestrator {
    backend: Arc<dyn QuestBackend>,
    runtime: SessionRuntime,
    refresh: Arc<PanelRefresh>,
    summary: Option<UserSummary>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn QuestBackend>, timings: QuestTimings) -> Self {
        let refresh = Arc::new(PanelRefresh::new());
        let runtime = SessionRuntime::new(backend.clone(), refresh.clone(), timings);
        Self {
            backend,
            runtime,
            refresh,
            summary: None,
        }
    }

    pub fn session(&self) -> &QuestSession {
        self.runtime.session()
    }

    pub fn summary(&self) -> Option<&UserSummary> {
        self.summary.as_ref()
    }

    pub fn tiers(&self) -> Vec<TierStatus> {
        tier_statuses(self.summary.as_ref())
    }

    pub fn refresh_key(&self) -> u64 {
        self.refresh.current()
    }

    pub fn subscribe_refresh(&self) -> watch::Receiver<u64> {
        self.refresh.subscribe()
    }

    /// Re-fetch `/users/me` into the panel.
    pub async fn refresh_progress(&mut self) -> Result<&UserSummary, ClientError> {
        let summary = self.backend.current_user().await?;
        tracing::debug!(l1_tokens = summary.l1_token_count, "progress summary loaded");
        Ok(self.summary.insert(summary))
    }

    /// Panel request to begin a tier. Locked tiers are refused without touching the
    /// network; the session only enters quest mode once the backend acknowledged.
    pub async fn start_level(&mut self, level: QuestLevel) -> Result<(), StartError> {
        if let Err(locked) = level.check_unlocked(self.summary.as_ref()) {
            tracing::debug!(%level, held = locked.held, "tier start blocked client-side");
            return Err(StartError::Locked(locked));
        }

        self.backend
            .start_level(level)
            .await
            .map_err(StartError::Backend)?;
        tracing::info!(%level, "quest tier started");
        self.runtime.start_quest();
        Ok(())
    }

    pub fn switch_to_talk(&mut self) {
        self.runtime.switch_to_talk();
    }

    pub fn submit(&mut self, input: &str) -> Result<(), InputRejected> {
        self.runtime.submit(input)
    }

    pub fn has_pending_work(&self) -> bool {
        self.runtime.has_pending_tasks()
    }

    pub async fn next_event(&mut self) -> bool {
        self.runtime.next_event().await
    }

    pub async fn settle(&mut self) {
        self.runtime.settle().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;
    use verilingua_core::auth::Credential;
    use verilingua_core::quests::VerdictResult;

    use super::*;
    use crate::client::AuthenticatedClient;
    use crate::config::ClientConfig;
    use crate::credentials::{CredentialStore, MemoryCredentialStore};
    use crate::session::Mode;
    use crate::test_support::{CountingRedirect, FakeBackend, FakeServer, quest, verdict};

    #[tokio::test]
    async fn level_two_blocked_below_three_tokens() {
        let backend = Arc::new(FakeBackend::with_tokens(2));
        let mut orchestrator = Orchestrator::new(backend.clone(), QuestTimings::default());
        orchestrator.refresh_progress().await.unwrap();

        let err = orchestrator.start_level(QuestLevel::TWO).await.unwrap_err();
        match err {
            StartError::Locked(locked) => {
                assert_eq!(locked.required, 3);
                assert_eq!(locked.held, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(backend.started_levels().is_empty());
        assert_eq!(backend.user_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.session().mode(), Mode::Talk);
        assert!(!orchestrator.has_pending_work());
    }

    #[tokio::test]
    async fn level_two_accepted_at_three_tokens() {
        let backend = Arc::new(FakeBackend::with_tokens(3));
        backend.push_quest(Some(quest(11, "Idioms")));
        let mut orchestrator = Orchestrator::new(backend.clone(), QuestTimings::default());
        orchestrator.refresh_progress().await.unwrap();

        orchestrator.start_level(QuestLevel::TWO).await.unwrap();
        orchestrator.settle().await;

        assert_eq!(backend.started_levels(), vec![2]);
        assert_eq!(orchestrator.session().current_quest().unwrap().id, 11);
    }

    #[tokio::test]
    async fn unloaded_summary_blocks_level_two_but_not_level_one() {
        let backend = Arc::new(FakeBackend::with_tokens(5));
        let mut orchestrator = Orchestrator::new(backend.clone(), QuestTimings::default());

        assert!(matches!(
            orchestrator.start_level(QuestLevel::TWO).await,
            Err(StartError::Locked(_))
        ));
        orchestrator.start_level(QuestLevel::ONE).await.unwrap();
        assert_eq!(backend.started_levels(), vec![1]);
    }

    #[tokio::test]
    async fn failed_start_leaves_session_in_talk() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .start_failures
            .lock()
            .unwrap()
            .push_back("down".to_string());
        let mut orchestrator = Orchestrator::new(backend.clone(), QuestTimings::default());

        let err = orchestrator.start_level(QuestLevel::ONE).await.unwrap_err();
        assert!(matches!(err, StartError::Backend(_)));
        assert_eq!(orchestrator.session().mode(), Mode::Talk);
        assert_eq!(backend.quest_fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_bumps_refresh_key_exactly_once() {
        let backend = Arc::new(FakeBackend::with_tokens(2));
        backend.push_quest(Some(quest(7, "Past tense")));
        backend.push_verdict(verdict(VerdictResult::Pass, "Great job! 🏆"));
        let mut orchestrator = Orchestrator::new(backend.clone(), QuestTimings::default());
        let mut watcher = orchestrator.subscribe_refresh();

        orchestrator.start_level(QuestLevel::ONE).await.unwrap();
        orchestrator.settle().await;
        orchestrator.submit("42").unwrap();
        orchestrator.settle().await;

        assert_eq!(orchestrator.refresh_key(), 1);
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), 1);
        assert_eq!(orchestrator.session().mode(), Mode::Talk);
    }

    #[tokio::test]
    async fn expired_credential_mid_quest_is_renewed_and_answer_graded() {
        let server = FakeServer::start().await;
        let store = Arc::new(MemoryCredentialStore::with_credential("good-token"));
        let redirect = Arc::new(CountingRedirect::default());
        let client = AuthenticatedClient::new(
            &ClientConfig::new(server.base_url()),
            store.clone(),
            redirect.clone(),
        )
        .unwrap();
        let mut orchestrator = Orchestrator::new(Arc::new(client), QuestTimings::default());

        orchestrator.start_level(QuestLevel::ONE).await.unwrap();
        orchestrator.settle().await;
        assert_eq!(orchestrator.session().current_quest().unwrap().id, 7);

        // the access token lapses while the learner is thinking
        store.set(&Credential::new("stale-token").unwrap()).unwrap();
        orchestrator.submit("42").unwrap();
        assert!(orchestrator.next_event().await);

        assert_eq!(server.state.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            server.state.last_submission(),
            Some((7, json!({"user_answer": "42"})))
        );
        assert_eq!(store.get().unwrap().unwrap().as_str(), "good-token");
        assert_eq!(redirect.count(), 0);
        let last = orchestrator.session().messages().last().unwrap();
        assert_eq!(last.text, "[PASS] Correct!");
    }
}
