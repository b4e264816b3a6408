use std::time::Duration;

use serde_json::json;
use verilingua_core::auth::Credential;

use crate::credentials::{CREDENTIAL_KEY, CredentialStore};
use crate::util::print_json;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_LOGIN_PATH: &str = "/oauth2/authorization/google";

pub async fn login(
    api_url: &str,
    store: &dyn CredentialStore,
    token: Option<String>,
    login_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let credential = match token {
        Some(raw) => Credential::new(raw).ok_or("Token must not be empty.")?,
        None => browser_login(api_url, login_url.as_deref()).await?,
    };

    store.set(&credential)?;
    tracing::info!(token = %credential.preview(), "credential stored");

    print_json(&json!({
        "status": "authenticated",
        "token_preview": credential.preview(),
    }))?;
    Ok(())
}

async fn browser_login(
    api_url: &str,
    login_url: Option<&str>,
) -> Result<Credential, Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let redirect_uri = format!("http://127.0.0.1:{port}/login");

    let base = match login_url {
        Some(url) => url.to_string(),
        None => format!("{}{DEFAULT_LOGIN_PATH}", api_url.trim_end_matches('/')),
    };
    let mut authorize_url = url::Url::parse(&base)?;
    authorize_url
        .query_pairs_mut()
        .append_pair("redirect_uri", &redirect_uri);

    eprintln!("Opening browser for sign-in...");
    eprintln!("If the browser doesn't open, visit: {authorize_url}");
    let _ = open::that(authorize_url.as_str());

    tokio::select! {
        result = wait_for_callback(listener) => result,
        _ = tokio::time::sleep(LOGIN_TIMEOUT) => {
            Err("Login timed out after 5 minutes.".into())
        }
    }
}

/// Accept the single redirect carrying `?accessToken=...`.
async fn wait_for_callback(
    listener: tokio::net::TcpListener,
) -> Result<Credential, Box<dyn std::error::Error>> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (mut stream, _) = listener.accept().await?;
    let mut buf = vec![0u8; 4096];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let credential = credential_from_request_line(&request);

    let page = if credential.is_some() {
        "<html><body><h1>Signed in!</h1><p>You can close this tab.</p></body></html>"
    } else {
        "<html><body><h1>Sign-in failed</h1><p>No access token was returned.</p></body></html>"
    };
    let response = format!("HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n{page}");
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;

    credential.ok_or_else(|| format!("No '{CREDENTIAL_KEY}' parameter in callback").into())
}

fn credential_from_request_line(request: &str) -> Option<Credential> {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))?;
    let url = url::Url::parse(&format!("http://localhost{path}")).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == CREDENTIAL_KEY)
        .and_then(|(_, v)| Credential::new(v.into_owned()))
}

pub fn logout(store: &dyn CredentialStore) -> Result<(), Box<dyn std::error::Error>> {
    store.clear()?;
    print_json(&json!({ "status": "logged_out" }))?;
    Ok(())
}
