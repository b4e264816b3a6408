use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use verilingua_core::chat::{Message, MessageStatus, Sender};
use verilingua_core::progress::{LevelError, QuestLevel};

use crate::orchestrator::{Orchestrator, StartError};
use crate::session::{InputRejected, Mode};
use crate::util::TerminalRedirect;

const HELP: &str = "\
Commands:
  /quest <level>  start a quest tier (1 or 2)
  /talk           leave quest mode and chat freely
  /me             show your progress
  /help           show this help
  /quit           leave
Anything else is sent as a message (or as your answer while a quest is open).";

const SESSION_EXPIRED: &str = "Session expired. Run `verilingua login` again.";

#[derive(Debug, PartialEq, Eq)]
enum ChatCommand {
    Say(String),
    Quest(Result<QuestLevel, String>),
    Talk,
    Progress,
    Help,
    Quit,
    Unknown(String),
}

fn parse_line(line: &str) -> ChatCommand {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return ChatCommand::Say(line.to_string());
    };
    let mut parts = rest.split_whitespace();
    match parts.next().unwrap_or_default() {
        "quest" => ChatCommand::Quest(match parts.next() {
            Some(arg) => arg.parse().map_err(|e: LevelError| e.to_string()),
            None => Err("usage: /quest <level>".to_string()),
        }),
        "talk" => ChatCommand::Talk,
        "me" => ChatCommand::Progress,
        "help" => ChatCommand::Help,
        "quit" | "exit" => ChatCommand::Quit,
        other => ChatCommand::Unknown(other.to_string()),
    }
}

fn render(message: &Message) -> String {
    let who = match message.sender {
        Sender::User => "you",
        Sender::Agent => "bot",
    };
    let tag = match message.status {
        MessageStatus::Normal => "",
        MessageStatus::Success => " ✔",
        MessageStatus::Fail => " ✘",
        MessageStatus::Error => " !",
    };
    format!("[{who}{tag}] {}", message.text)
}

fn prompt(mode: Mode) -> &'static str {
    match mode {
        Mode::Talk => "talk> ",
        Mode::Quest => "quest> ",
    }
}

fn print_panel(orchestrator: &Orchestrator) {
    let tokens = orchestrator.summary().map_or(0, |s| s.l1_token_count);
    let name = orchestrator
        .summary()
        .and_then(|s| s.name.as_deref())
        .unwrap_or("learner");
    println!("── progress: {name}, {tokens} L1 token(s)");
    for tier in orchestrator.tiers() {
        let state = if tier.unlocked { "open" } else { "locked" };
        println!("   level {}: {state}", tier.level);
    }
}

/// Only a refresh that could not be recovered ends the loop; every other failure
/// already landed in the transcript.
fn ensure_session(redirect: &TerminalRedirect) -> Result<(), Box<dyn std::error::Error>> {
    if redirect.session_expired() {
        return Err(SESSION_EXPIRED.into());
    }
    Ok(())
}

/// Interactive transcript. Returns when stdin closes, on `/quit`, or once the
/// session expired.
pub async fn run(
    mut orchestrator: Orchestrator,
    redirect: Arc<TerminalRedirect>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut refresh = orchestrator.subscribe_refresh();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_seen = 0;

    if let Err(e) = orchestrator.refresh_progress().await {
        tracing::warn!(error = %e, "could not load progress");
    } else {
        print_panel(&orchestrator);
    }
    println!("{HELP}");

    loop {
        for message in orchestrator.session().transcript().since(last_seen) {
            if message.sender == Sender::Agent {
                println!("{}", render(message));
            }
            last_seen = message.id;
        }
        ensure_session(&redirect)?;
        if !orchestrator.has_pending_work() {
            print!("{}", prompt(orchestrator.session().mode()));
            std::io::stdout().flush()?;
        }

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    ChatCommand::Say(text) => match orchestrator.submit(&text) {
                        Ok(()) => {}
                        Err(InputRejected::Empty) => {}
                        Err(rejected) => println!("(not sent: {rejected})"),
                    },
                    ChatCommand::Quest(Ok(level)) => match orchestrator.start_level(level).await {
                        Ok(()) => {}
                        Err(StartError::Locked(locked)) => println!("{locked}"),
                        Err(StartError::Backend(e)) => println!("(could not start: {e})"),
                    },
                    ChatCommand::Quest(Err(message)) => println!("{message}"),
                    ChatCommand::Talk => orchestrator.switch_to_talk(),
                    ChatCommand::Progress => match orchestrator.refresh_progress().await {
                        Ok(_) => print_panel(&orchestrator),
                        Err(e) => println!("(could not load progress: {e})"),
                    },
                    ChatCommand::Help => println!("{HELP}"),
                    ChatCommand::Quit => break,
                    ChatCommand::Unknown(name) => println!("unknown command /{name}; try /help"),
                }
            }
            _ = orchestrator.next_event(), if orchestrator.has_pending_work() => {}
            changed = refresh.changed() => {
                if changed.is_err() {
                    break;
                }
                match orchestrator.refresh_progress().await {
                    Ok(_) => print_panel(&orchestrator),
                    Err(e) => tracing::warn!(error = %e, "progress refresh failed"),
                }
            }
        }
    }

    Ok(())
}
