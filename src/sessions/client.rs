use reqwest::Client;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use super::Session;

/// Errors from fetching or decoding a course's sessions
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not authenticated. Check the API token.")]
    NotAuthenticated,

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Course not found: {0}")]
    NotFound(String),

    #[error("Server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Client for the platform's live-session endpoints
#[derive(Debug, Clone)]
pub struct SessionClient {
    base_url: String,
    token: Option<String>,
    http: Client,
}

impl SessionClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http: Client::new(),
        }
    }

    /// Fetch every session of a course.
    ///
    /// Calls `GET /live-sessions/course/{course_id}`.
    pub async fn course_sessions(&self, course_id: &str) -> Result<Vec<Session>, ClientError> {
        let url = format!("{}/live-sessions/course/{}", self.base_url, course_id);
        debug!(%url, "fetching course sessions");

        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status().as_u16();
        match status {
            200..=299 => {
                let body: Value = response.json().await?;
                Ok(parse_sessions_body(body))
            }
            401 => Err(ClientError::NotAuthenticated),
            403 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::Forbidden(text))
            }
            404 => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::NotFound(text))
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(ClientError::ServerError { status, body: text })
            }
        }
    }
}

/// Read sessions from a JSON file holding any of the shapes the API returns
pub async fn load_sessions_file(path: &Path) -> Result<Vec<Session>, ClientError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ClientError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let body: Value = serde_json::from_str(&content)?;
    Ok(parse_sessions_body(body))
}

/// Pull the session list out of a response body.
///
/// Accepts `{ data: { sessions: [..] } }`, `{ sessions: [..] }`, `{ data: [..] }` or a bare
/// array. Records that do not decode are skipped.
pub fn parse_sessions_body(body: Value) -> Vec<Session> {
    let records = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let data = map.remove("data");
            match data {
                Some(Value::Object(mut inner)) => match inner.remove("sessions") {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                },
                Some(Value::Array(items)) => items,
                _ => match map.remove("sessions") {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                },
            }
        }
        _ => Vec::new(),
    };

    records
        .into_iter()
        .filter_map(|mut record| {
            if let Value::Object(map) = &mut record {
                // Mongo documents carry `_id`; virtuals may add `id` as well
                if !map.contains_key("id") {
                    if let Some(object_id) = map.get("_id").cloned() {
                        map.insert("id".to_string(), object_id);
                    }
                }
            }
            match serde_json::from_value::<Session>(record) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable session record");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> Value {
        json!({ "_id": id, "title": "T", "scheduledTime": "2024-01-01T10:00:00Z", "duration": 60 })
    }

    #[test]
    fn test_nested_envelope() {
        let body = json!({ "success": true, "data": { "sessions": [record("a"), record("b")] } });
        let sessions = parse_sessions_body(body);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "a");
    }

    #[test]
    fn test_flat_envelopes() {
        assert_eq!(parse_sessions_body(json!({ "sessions": [record("a")] })).len(), 1);
        assert_eq!(parse_sessions_body(json!({ "data": [record("a")] })).len(), 1);
        assert_eq!(parse_sessions_body(json!([record("a"), record("b")])).len(), 2);
    }

    #[test]
    fn test_out_of_range_records_do_not_break_evaluation() {
        let max_ms = chrono::DateTime::<chrono::Utc>::MAX_UTC.timestamp_millis();
        let body = json!([
            { "_id": "huge", "title": "T", "scheduledTime": "2024-01-01T10:00:00Z", "duration": 1e12 },
            { "_id": "absurd", "title": "T", "scheduledTime": "2024-01-01T10:00:00Z", "duration": 1e300 },
            { "_id": "edge", "title": "T", "scheduledTime": max_ms, "duration": 60 },
            record("ok"),
        ]);
        let sessions = parse_sessions_body(body);
        assert_eq!(sessions.len(), 4);

        let now = chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2024, 1, 1, 10, 30, 0).unwrap();
        let eval = crate::sessions::evaluate(&sessions, "c1", now).unwrap();
        assert_eq!(eval.session.id, "ok");
        assert_eq!(eval.state, crate::sessions::RelevanceState::Live);
    }

    #[test]
    fn test_unexpected_shapes_are_empty() {
        assert!(parse_sessions_body(json!({ "success": false })).is_empty());
        assert!(parse_sessions_body(json!({ "data": { "items": [] } })).is_empty());
        assert!(parse_sessions_body(json!("nope")).is_empty());
        assert!(parse_sessions_body(Value::Null).is_empty());
    }

    #[test]
    fn test_prefers_explicit_id() {
        let body = json!([{ "_id": "mongo", "id": "virtual", "title": "T" }]);
        assert_eq!(parse_sessions_body(body)[0].id, "virtual");
    }

    #[test]
    fn test_bad_records_are_skipped() {
        let body = json!([record("a"), 42, { "title": ["not", "a", "string"] }, record("b")]);
        let ids: Vec<String> = parse_sessions_body(body).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = SessionClient::new("https://api.example/api/", None);
        assert_eq!(client.base_url, "https://api.example/api");
    }

    #[tokio::test]
    async fn test_load_sessions_file() {
        let path = std::env::temp_dir().join(format!("session-beacon-{}.json", std::process::id()));
        tokio::fs::write(&path, json!({ "data": { "sessions": [record("f")] } }).to_string())
            .await
            .unwrap();

        let sessions = load_sessions_file(&path).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "f");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = load_sessions_file(Path::new("/definitely/not/here.json")).await.unwrap_err();
        assert!(matches!(err, ClientError::Io { .. }));
    }
}
