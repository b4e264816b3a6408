use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;

use super::{CompletionListener, Effect, InputRejected, QuestSession, QuestTimings, SessionEvent};
use crate::api::QuestBackend;

/// Drives a `QuestSession`: performs its effects as tasks and applies each result
/// back to the session, one event at a time.
pub struct SessionRuntime {
    session: QuestSession,
    backend: Arc<dyn QuestBackend>,
    listener: Arc<dyn CompletionListener>,
    tasks: JoinSet<SessionEvent>,
}

impl SessionRuntime {
    pub fn new(
        backend: Arc<dyn QuestBackend>,
        listener: Arc<dyn CompletionListener>,
        timings: QuestTimings,
    ) -> Self {
        Self {
            session: QuestSession::new(timings),
            backend,
            listener,
            tasks: JoinSet::new(),
        }
    }

    pub fn session(&self) -> &QuestSession {
        &self.session
    }

    /// Outstanding network calls and timers.
    pub fn has_pending_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn start_quest(&mut self) {
        let effects = self.session.start_quest();
        self.run(effects);
    }

    pub fn switch_to_talk(&mut self) {
        let effects = self.session.switch_to_talk();
        self.run(effects);
    }

    pub fn submit(&mut self, input: &str) -> Result<(), InputRejected> {
        let effects = self.session.submit_input(input)?;
        self.run(effects);
        Ok(())
    }

    /// Wait for the next task to finish and apply its result. Returns `false` when
    /// nothing is outstanding. Cancel safe.
    pub async fn next_event(&mut self) -> bool {
        loop {
            match self.tasks.join_next().await {
                None => return false,
                Some(Ok(event)) => {
                    let effects = self.session.apply(event);
                    self.run(effects);
                    return true;
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "session task did not complete");
                }
            }
        }
    }

    /// Process events until no task is left.
    pub async fn settle(&mut self) {
        while self.next_event().await {}
    }

    fn run(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::FetchQuest { generation } => {
                    let backend = self.backend.clone();
                    self.spawn(async move {
                        let result = backend.current_quest().await.map_err(|e| e.to_string());
                        SessionEvent::QuestLoaded { generation, result }
                    });
                }
                Effect::SubmitAnswer {
                    generation,
                    quest_id,
                    answer,
                } => {
                    let backend = self.backend.clone();
                    self.spawn(async move {
                        let result = backend
                            .submit_answer(quest_id, &answer)
                            .await
                            .map_err(|e| e.to_string());
                        SessionEvent::VerdictReceived { generation, result }
                    });
                }
                Effect::SendTalk { message } => {
                    let backend = self.backend.clone();
                    self.spawn(async move {
                        let result = backend.talk(&message).await.map_err(|e| e.to_string());
                        SessionEvent::ReplyReceived { result }
                    });
                }
                Effect::Schedule {
                    generation,
                    timer,
                    delay,
                } => {
                    self.spawn(async move {
                        tokio::time::sleep(delay).await;
                        SessionEvent::TimerElapsed { generation, timer }
                    });
                }
                Effect::CredentialGranted => {
                    self.listener.credential_granted();
                }
            }
        }
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = SessionEvent> + Send + 'static,
    {
        self.tasks.spawn(task);
    }
}
