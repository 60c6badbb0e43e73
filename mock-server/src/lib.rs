use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// What the server saw for one request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordedRequest {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Lowercased names, in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub type Log = Arc<RwLock<Vec<RecordedRequest>>>;

pub fn app() -> Router {
    let log: Log = Arc::new(RwLock::new(Vec::new()));
    Router::new()
        .route("/echo", any(echo))
        .route("/status/{code}", any(status))
        .route("/delay/{ms}", any(delay))
        .route("/requests", get(list_requests))
        .with_state(log)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn record(log: &Log, method: Method, uri: &Uri, headers: &HeaderMap, body: String) -> RecordedRequest {
    let request = RecordedRequest {
        id: Uuid::new_v4(),
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
        body,
    };
    tracing::info!(id = %request.id, method = %request.method, path = %request.path, "recorded request");
    log.write().await.push(request.clone());
    request
}

async fn echo(
    State(log): State<Log>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Json<RecordedRequest> {
    Json(record(&log, method, &uri, &headers, body).await)
}

async fn status(
    State(log): State<Log>,
    Path(code): Path<u16>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, String), StatusCode> {
    let code = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    record(&log, method, &uri, &headers, body).await;
    Ok((code, format!("status {}", code.as_u16())))
}

async fn delay(
    State(log): State<Log>,
    Path(ms): Path<u64>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Json<RecordedRequest> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(record(&log, method, &uri, &headers, body).await)
}

async fn list_requests(State(log): State<Log>) -> Json<Vec<RecordedRequest>> {
    Json(log.read().await.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordedRequest {
        RecordedRequest {
            id: Uuid::nil(),
            method: "POST".to_string(),
            path: "/echo".to_string(),
            query: Some("a=1".to_string()),
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: "hi".to_string(),
        }
    }

    #[test]
    fn recorded_request_serializes_to_json() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["method"], "POST");
        assert_eq!(json["query"], "a=1");
        assert_eq!(json["headers"][0][0], "content-type");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let request = sample();
        assert_eq!(request.header("Content-Type"), Some("text/plain"));
        assert_eq!(request.header("accept"), None);
    }

    #[test]
    fn recorded_request_roundtrips_through_json() {
        let json = serde_json::to_string(&sample()).unwrap();
        let back: RecordedRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }
}
