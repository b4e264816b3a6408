use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use verilingua_core::auth::Credential;

use crate::client::{ClientError, LoginRedirect};
use crate::config::ClientConfig;
use crate::credentials::{CredentialStore, FileCredentialStore};

const DEFAULT_LOG_FILTER: &str = "verilingua_cli=warn,verilingua_core=warn";

/// Print a structured error to stderr and exit.
pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    let rendered = serde_json::to_string_pretty(&err).unwrap_or_else(|_| message.to_string());
    eprintln!("{rendered}");
    std::process::exit(1);
}

pub fn print_json(value: &serde_json::Value) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (text_layer, json_layer) = if json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        )
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .init();
}

pub fn credential_store(config: &ClientConfig) -> Arc<dyn CredentialStore> {
    Arc::new(FileCredentialStore::new(config.credentials_file.clone()))
}

/// Gate for the protected commands: without a stored credential the user is sent
/// to `login` before anything touches the network.
pub fn require_credential(store: &dyn CredentialStore) -> Credential {
    match store.get() {
        Ok(Some(credential)) => credential,
        Ok(None) => exit_error(
            "Not logged in.",
            Some("Run `verilingua login` or `verilingua login --token <TOKEN>`."),
        ),
        Err(e) => exit_error(&e.to_string(), None),
    }
}

/// Login redirect for terminal sessions: remembers that the session expired so the
/// interactive loop can stop and point the user at `login`.
#[derive(Debug, Default)]
pub struct TerminalRedirect {
    expired: AtomicBool,
}

impl TerminalRedirect {
    pub fn session_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }
}

impl LoginRedirect for TerminalRedirect {
    fn redirect_to_login(&self) {
        if !self.expired.swap(true, Ordering::SeqCst) {
            tracing::warn!("session expired; run `verilingua login` again");
        }
    }
}

/// Exit message for a backend failure, with a login hint once the session is gone.
pub fn exit_client_error(err: &ClientError) -> ! {
    if err.is_session_expired() {
        exit_error(
            &err.to_string(),
            Some("Session expired. Run `verilingua login` again."),
        );
    }
    match err {
        ClientError::Transport(_) => exit_error(
            &err.to_string(),
            Some("Is the API server running? Check VERILINGUA_API_URL."),
        ),
        _ => exit_error(&err.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    #[test]
    fn terminal_redirect_latches_expiry() {
        let redirect = TerminalRedirect::default();
        assert!(!redirect.session_expired());
        redirect.redirect_to_login();
        redirect.redirect_to_login();
        assert!(redirect.session_expired());
    }

    #[test]
    fn require_credential_returns_stored_value() {
        let store = MemoryCredentialStore::with_credential("abc123");
        assert_eq!(require_credential(&store).as_str(), "abc123");
    }
}
