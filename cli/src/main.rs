use std::sync::Arc;

use clap::{Parser, Subcommand};
use verilingua_cli::client::{AuthenticatedClient, ClientError, LoginRedirect};
use verilingua_cli::commands;
use verilingua_cli::config::{ClientConfig, ConnectionArgs};
use verilingua_cli::orchestrator::Orchestrator;
use verilingua_cli::util::{
    TerminalRedirect, credential_store, exit_client_error, exit_error, init_tracing,
    require_credential,
};
use verilingua_core::progress::QuestLevel;

#[derive(Parser)]
#[command(
    name = "verilingua",
    version,
    about = "VeriLingua CLI: English tutoring chat and quests that earn on-chain credentials"
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Emit logs as JSON lines on stderr
    #[arg(long, env = "VERILINGUA_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the access token
    Login {
        /// Store this token directly instead of opening the browser
        #[arg(long)]
        token: Option<String>,
        /// Sign-in page to open (defaults to the backend's OAuth entry point)
        #[arg(long)]
        login_url: Option<String>,
    },
    /// Forget the stored access token
    Logout,
    /// Show progress: L1 tokens and which quest tiers are open
    Me,
    /// Quest operations
    Quest {
        #[command(subcommand)]
        command: QuestCommands,
    },
    /// Interactive tutoring chat (default)
    Chat,
}

#[derive(Subcommand)]
enum QuestCommands {
    /// Start a quest tier and print its first question
    Start {
        /// Tier to start (1 or 2)
        level: QuestLevel,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = ClientConfig::from(&cli.connection);
    let store = credential_store(&config);

    let command = cli.command.unwrap_or(Commands::Chat);
    let result = match command {
        Commands::Login { token, login_url } => {
            commands::auth::login(&config.api_url, store.as_ref(), token, login_url).await
        }
        Commands::Logout => commands::auth::logout(store.as_ref()),
        protected => {
            require_credential(store.as_ref());
            let redirect = Arc::new(TerminalRedirect::default());
            let client = AuthenticatedClient::new(
                &config,
                store.clone(),
                redirect.clone() as Arc<dyn LoginRedirect>,
            )
            .unwrap_or_else(|e| exit_client_error(&e));
            let mut orchestrator = Orchestrator::new(Arc::new(client), config.timings);

            match protected {
                Commands::Me => commands::progress::me(&mut orchestrator).await,
                Commands::Quest {
                    command: QuestCommands::Start { level },
                } => commands::progress::quest_start(&mut orchestrator, level).await,
                _ => commands::chat::run(orchestrator, redirect).await,
            }
        }
    };

    if let Err(e) = result {
        if let Some(client_error) = e.downcast_ref::<ClientError>() {
            exit_client_error(client_error);
        }
        exit_error(&e.to_string(), None);
    }
}
