//! Terminal client for the VeriLingua tutoring backend: credential handling, the
//! refreshing HTTP client, the quest session state machine and the CLI commands.

pub mod api;
pub mod client;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod orchestrator;
pub mod session;
pub mod util;

#[cfg(test)]
mod test_support;
