//! Conversation and quest state machine.
//!
//! `QuestSession` is synchronous: commands and completed side effects go in, a list
//! of `Effect`s comes out. `SessionRuntime` performs those effects (HTTP calls,
//! timers) and feeds the results back one at a time.

mod runtime;

use std::time::Duration;

use thiserror::Error;
use verilingua_core::chat::{Message, MessageStatus, Transcript};
use verilingua_core::quests::{Quest, SubmissionVerdict};

pub use runtime::SessionRuntime;

pub const GREETING: &str =
    "Hi! I'm VeriBot. 👋\nChat freely, or pick a quest level to take on a challenge!";
pub const TALK_MODE_NOTICE: &str = "💬 [Free talk mode] Let's chat in English, no pressure!";
pub const NO_QUEST_NOTICE: &str = "There is no quest waiting for you right now.";
pub const QUEST_LOAD_FAILED: &str = "⚠️ Could not load the quest. Please try again in a moment.";
pub const REQUEST_FAILED: &str = "⚠️ Something went wrong. Please try again in a moment.";
pub const COMPLETION_CLOSING: &str =
    "🎉 All quests complete! Your reward has been issued.\nBack to free talk mode.";
pub const ATTEMPT_FAILED: &str = "🚫 Wrong answer! This level's attempt is over.";

/// Receives the single "a credential was granted" hand-off.
pub trait CompletionListener: Send + Sync {
    fn credential_granted(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Talk,
    Quest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Talk,
    QuestLoading,
    QuestActive { quest: Quest },
    Submitting { quest: Quest },
    Completed,
}

impl SessionState {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Talk => Mode::Talk,
            _ => Mode::Quest,
        }
    }

    pub fn quest(&self) -> Option<&Quest> {
        match self {
            Self::QuestActive { quest } | Self::Submitting { quest } => Some(quest),
            _ => None,
        }
    }
}

/// Bumped on every manual mode change. Effects and their results carry the
/// generation they were issued under; results from an older one are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// After a completion: closing message, back to talk.
    CloseCompletion,
    /// After a PASS: load the next question.
    AdvanceQuest,
    /// After a FAIL: failure message, back to talk.
    EndAttempt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestTimings {
    pub completion_close: Duration,
    pub advance: Duration,
    pub fail_close: Duration,
}

impl Default for QuestTimings {
    fn default() -> Self {
        Self {
            completion_close: Duration::from_secs(3),
            advance: Duration::from_millis(1500),
            fail_close: Duration::from_secs(1),
        }
    }
}

impl QuestTimings {
    fn delay(&self, timer: Timer) -> Duration {
        match timer {
            Timer::CloseCompletion => self.completion_close,
            Timer::AdvanceQuest => self.advance,
            Timer::EndAttempt => self.fail_close,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchQuest {
        generation: Generation,
    },
    SubmitAnswer {
        generation: Generation,
        quest_id: i64,
        answer: String,
    },
    SendTalk {
        message: String,
    },
    Schedule {
        generation: Generation,
        timer: Timer,
        delay: Duration,
    },
    CredentialGranted,
}

/// Results of effects, delivered back to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    QuestLoaded {
        generation: Generation,
        result: Result<Option<Quest>, String>,
    },
    VerdictReceived {
        generation: Generation,
        result: Result<SubmissionVerdict, String>,
    },
    ReplyReceived {
        result: Result<String, String>,
    },
    TimerElapsed {
        generation: Generation,
        timer: Timer,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputRejected {
    #[error("nothing to send")]
    Empty,
    #[error("still waiting for the previous answer")]
    Busy,
    #[error("no question is open for an answer yet")]
    NoActiveQuest,
}

#[derive(Debug)]
pub struct QuestSession {
    state: SessionState,
    transcript: Transcript,
    generation: Generation,
    /// Delayed transition scheduled under the current generation, if any.
    pending: Option<Timer>,
    awaiting_reply: bool,
    timings: QuestTimings,
}

impl Default for QuestSession {
    fn default() -> Self {
        Self::new(QuestTimings::default())
    }
}

impl QuestSession {
    pub fn new(timings: QuestTimings) -> Self {
        let mut transcript = Transcript::new();
        transcript.push_agent(GREETING, MessageStatus::Normal);
        Self {
            state: SessionState::Talk,
            transcript,
            generation: Generation::default(),
            pending: None,
            awaiting_reply: false,
            timings,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode()
    }

    pub fn current_quest(&self) -> Option<&Quest> {
        self.state.quest()
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn pending_timer(&self) -> Option<Timer> {
        self.pending
    }

    /// Enter quest mode and load the current question. Valid from any state: the
    /// panel only calls this after the backend acknowledged a tier start.
    pub fn start_quest(&mut self) -> Vec<Effect> {
        self.begin_generation();
        self.state = SessionState::QuestLoading;
        tracing::debug!(generation = self.generation.0, "quest mode requested");
        vec![Effect::FetchQuest {
            generation: self.generation,
        }]
    }

    /// Manual switch back to free talk.
    pub fn switch_to_talk(&mut self) -> Vec<Effect> {
        self.begin_generation();
        self.state = SessionState::Talk;
        self.transcript.push_agent(TALK_MODE_NOTICE, MessageStatus::Normal);
        Vec::new()
    }

    fn begin_generation(&mut self) {
        self.generation = self.generation.next();
        self.pending = None;
    }

    pub fn submit_input(&mut self, input: &str) -> Result<Vec<Effect>, InputRejected> {
        let text = input.trim();
        if text.is_empty() {
            return Err(InputRejected::Empty);
        }

        match &self.state {
            SessionState::Talk => {
                if self.awaiting_reply {
                    return Err(InputRejected::Busy);
                }
                self.transcript.push_user(text);
                self.awaiting_reply = true;
                Ok(vec![Effect::SendTalk {
                    message: text.to_string(),
                }])
            }
            SessionState::QuestActive { quest } => {
                if self.pending.is_some() {
                    return Err(InputRejected::Busy);
                }
                let quest = quest.clone();
                let quest_id = quest.id;
                self.transcript.push_user(text);
                self.state = SessionState::Submitting { quest };
                Ok(vec![Effect::SubmitAnswer {
                    generation: self.generation,
                    quest_id,
                    answer: text.to_string(),
                }])
            }
            SessionState::Submitting { .. } => Err(InputRejected::Busy),
            SessionState::QuestLoading | SessionState::Completed => {
                Err(InputRejected::NoActiveQuest)
            }
        }
    }

    pub fn apply(&mut self, event: SessionEvent) -> Vec<Effect> {
        match event {
            SessionEvent::QuestLoaded { generation, result } => {
                self.on_quest_loaded(generation, result)
            }
            SessionEvent::VerdictReceived { generation, result } => {
                self.on_verdict(generation, result)
            }
            SessionEvent::ReplyReceived { result } => {
                self.awaiting_reply = false;
                match result {
                    Ok(reply) => {
                        self.transcript.push_agent(reply, MessageStatus::Normal);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "talk turn failed");
                        self.transcript.push_agent(REQUEST_FAILED, MessageStatus::Error);
                    }
                }
                Vec::new()
            }
            SessionEvent::TimerElapsed { generation, timer } => {
                self.on_timer(generation, timer)
            }
        }
    }

    fn on_quest_loaded(
        &mut self,
        generation: Generation,
        result: Result<Option<Quest>, String>,
    ) -> Vec<Effect> {
        if generation != self.generation || self.state != SessionState::QuestLoading {
            tracing::debug!(generation = generation.0, "discarding stale quest load");
            return Vec::new();
        }

        match result {
            Ok(Some(quest)) => {
                self.transcript.push_agent(
                    format!("📝 [{}]\n\n{}", quest.title, quest.content),
                    MessageStatus::Normal,
                );
                self.state = SessionState::QuestActive { quest };
            }
            Ok(None) => {
                self.transcript.push_agent(NO_QUEST_NOTICE, MessageStatus::Normal);
                self.state = SessionState::Talk;
            }
            Err(e) => {
                tracing::warn!(error = %e, "quest load failed");
                self.transcript.push_agent(QUEST_LOAD_FAILED, MessageStatus::Error);
                self.state = SessionState::Talk;
            }
        }
        Vec::new()
    }

    fn on_verdict(
        &mut self,
        generation: Generation,
        result: Result<SubmissionVerdict, String>,
    ) -> Vec<Effect> {
        let quest = match &self.state {
            SessionState::Submitting { quest } if generation == self.generation => quest.clone(),
            _ => return self.on_stale_verdict(generation, result),
        };

        let verdict = match result {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(quest_id = quest.id, error = %e, "submission failed");
                self.transcript.push_agent(REQUEST_FAILED, MessageStatus::Error);
                self.state = SessionState::QuestActive { quest };
                return Vec::new();
            }
        };

        self.record_verdict(&verdict);

        if verdict.grants_credential() {
            tracing::info!(quest_id = quest.id, "quest tier completed; credential granted");
            self.state = SessionState::Completed;
            vec![Effect::CredentialGranted, self.schedule(Timer::CloseCompletion)]
        } else if verdict.is_pass() {
            self.state = SessionState::QuestActive { quest };
            vec![self.schedule(Timer::AdvanceQuest)]
        } else {
            self.state = SessionState::QuestActive { quest };
            vec![self.schedule(Timer::EndAttempt)]
        }
    }

    /// The user left quest mode while the answer was being graded. The grade still
    /// happened server-side, so it is recorded, but it no longer drives the mode.
    fn on_stale_verdict(
        &mut self,
        generation: Generation,
        result: Result<SubmissionVerdict, String>,
    ) -> Vec<Effect> {
        tracing::debug!(generation = generation.0, "verdict arrived after a mode change");
        match result {
            Ok(verdict) => {
                self.record_verdict(&verdict);
                if verdict.grants_credential() {
                    vec![Effect::CredentialGranted]
                } else {
                    Vec::new()
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "stale submission failed; nothing to record");
                Vec::new()
            }
        }
    }

    fn record_verdict(&mut self, verdict: &SubmissionVerdict) {
        let status = if verdict.is_pass() {
            MessageStatus::Success
        } else {
            MessageStatus::Fail
        };
        self.transcript.push_agent(
            format!("[{}] {}", verdict.result.as_str(), verdict.feedback),
            status,
        );
    }

    fn schedule(&mut self, timer: Timer) -> Effect {
        self.pending = Some(timer);
        Effect::Schedule {
            generation: self.generation,
            timer,
            delay: self.timings.delay(timer),
        }
    }

    fn on_timer(&mut self, generation: Generation, timer: Timer) -> Vec<Effect> {
        if generation != self.generation || self.pending != Some(timer) {
            tracing::debug!(generation = generation.0, ?timer, "discarding stale timer");
            return Vec::new();
        }
        self.pending = None;

        match timer {
            Timer::CloseCompletion => {
                self.transcript.push_agent(COMPLETION_CLOSING, MessageStatus::Success);
                self.state = SessionState::Talk;
                Vec::new()
            }
            Timer::AdvanceQuest => {
                self.state = SessionState::QuestLoading;
                vec![Effect::FetchQuest {
                    generation: self.generation,
                }]
            }
            Timer::EndAttempt => {
                self.transcript.push_agent(ATTEMPT_FAILED, MessageStatus::Fail);
                self.state = SessionState::Talk;
                Vec::new()
            }
        }
    }
}
