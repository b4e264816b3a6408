use serde::Deserialize;

/// Error body the backend returns on non-2xx responses.
///
/// Every field is optional: the framework default shape (`{status, error, message,
/// path}`) and hand-written handlers both land here.
#[derive(Debug, Default, Deserialize)]
pub struct ApiError {
    /// Short reason phrase or machine code (e.g. "Unauthorized")
    #[serde(default)]
    pub error: Option<String>,
    /// Human-readable description
    #[serde(default)]
    pub message: Option<String>,
    /// Request path the server saw
    #[serde(default)]
    pub path: Option<String>,
}

impl ApiError {
    /// Best message available from a raw response body.
    pub fn describe(body: &[u8]) -> String {
        if let Ok(parsed) = serde_json::from_slice::<ApiError>(body) {
            if let Some(message) = parsed.message.filter(|m| !m.trim().is_empty()) {
                return message;
            }
            if let Some(error) = parsed.error.filter(|e| !e.trim().is_empty()) {
                return error;
            }
        }
        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        if text.is_empty() {
            "no response body".to_string()
        } else {
            text.chars().take(200).collect()
        }
    }
}
