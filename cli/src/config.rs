use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use verilingua_core::auth::RefreshIdentity;

use crate::credentials::default_credentials_path;
use crate::session::QuestTimings;

/// Connection settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Backend base address
    #[arg(long, env = "VERILINGUA_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Path prefix every API route lives under
    #[arg(long, env = "VERILINGUA_API_PREFIX", default_value = "/api")]
    pub api_prefix: String,

    /// Where the bearer credential is persisted
    #[arg(long, env = "VERILINGUA_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    /// Identity sent to /auth/refresh when the credential expires
    #[arg(long, env = "VERILINGUA_REFRESH_EMAIL")]
    pub refresh_email: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "VERILINGUA_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_prefix: String,
    pub credentials_file: PathBuf,
    pub refresh_identity: RefreshIdentity,
    pub request_timeout: Duration,
    pub timings: QuestTimings,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_prefix: "/api".to_string(),
            credentials_file: default_credentials_path(),
            refresh_identity: RefreshIdentity::default(),
            request_timeout: Duration::from_secs(30),
            timings: QuestTimings::default(),
        }
    }

    /// `<base address><prefix>` without a trailing slash.
    pub fn api_base(&self) -> String {
        let base = self.api_url.trim_end_matches('/');
        let prefix = self.api_prefix.trim_matches('/');
        if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{prefix}")
        }
    }
}

impl From<&ConnectionArgs> for ClientConfig {
    fn from(args: &ConnectionArgs) -> Self {
        Self {
            api_url: args.api_url.clone(),
            api_prefix: args.api_prefix.clone(),
            credentials_file: args
                .credentials_file
                .clone()
                .unwrap_or_else(default_credentials_path),
            refresh_identity: args
                .refresh_email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(RefreshIdentity::email)
                .unwrap_or_default(),
            request_timeout: Duration::from_secs(args.timeout_secs.max(1)),
            timings: QuestTimings::default(),
        }
    }
}
