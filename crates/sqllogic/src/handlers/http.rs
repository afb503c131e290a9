//! HTTP query protocol handler.
//!
//! The transport is stateless, so session stickiness works by echo: every
//! response carries the server's view of the session (current database,
//! session variables such as the timezone), and the handler replays that
//! object on the next request. A `SET` executed through this handler is
//! therefore visible to every later statement on the same handler, matching
//! the connection-scoped behavior of the MySQL adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AsyncHandler, BackendConfig, BackendKind, HandlerError};
use crate::value::RawValue;

/// A backend speaking the HTTP query protocol.
pub struct HttpHandler {
    client: reqwest::Client,
    endpoint: String,
    user: String,
    password: String,
    session: Option<serde_json::Value>,
    label: String,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    sql: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a serde_json::Value>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    affected_rows: Option<u64>,
    #[serde(default)]
    error: Option<ServerError>,
    #[serde(default)]
    session: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ServerError {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

impl HttpHandler {
    /// Build a client for the given backend parameters. The connection is
    /// established lazily on the first request.
    pub async fn connect(config: &BackendConfig) -> Result<Self, HandlerError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| HandlerError::Connection(e.to_string()))?;
        tracing::debug!(label = %config.label, host = %config.host, port = config.port, "http backend configured");
        Ok(Self {
            client,
            endpoint: format!("http://{}:{}/v1/query", config.host, config.port),
            user: config.user.clone(),
            password: config.password.clone(),
            session: None,
            label: config.label.clone(),
        })
    }

    async fn post(&mut self, sql: &str) -> Result<QueryResponse, HandlerError> {
        let body = QueryRequest { sql, session: self.session.as_ref() };
        let mut request = self.client.post(&self.endpoint).json(&body);
        if !self.user.is_empty() {
            request = request.basic_auth(&self.user, Some(&self.password));
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(HandlerError::Connection(format!("server returned {status}")));
        }
        let payload: QueryResponse = response
            .json()
            .await
            .map_err(|e| HandlerError::Connection(format!("malformed response: {e}")))?;

        if let Some(session) = &payload.session {
            self.session = Some(session.clone());
        }
        if let Some(error) = payload.error {
            return Err(HandlerError::Execution {
                code: error.code.map(|c| c.to_string()),
                message: error.message,
            });
        }
        if !status.is_success() {
            return Err(HandlerError::Execution {
                code: Some(status.as_u16().to_string()),
                message: format!("server returned {status}"),
            });
        }
        Ok(payload)
    }
}

#[async_trait]
impl AsyncHandler for HttpHandler {
    async fn execute_statement(&mut self, sql: &str) -> Result<u64, HandlerError> {
        let response = self.post(sql).await?;
        Ok(response.affected_rows.unwrap_or(0))
    }

    async fn execute_query(&mut self, sql: &str) -> Result<Vec<Vec<RawValue>>, HandlerError> {
        let response = self.post(sql).await?;
        Ok(response
            .data
            .into_iter()
            .map(|row| row.into_iter().map(RawValue::from).collect())
            .collect())
    }

    async fn close(&mut self) {
        // Dropping the client tears down pooled connections; the session
        // object dies with the handler.
        self.session = None;
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Http
    }
}

fn map_reqwest_error(e: reqwest::Error) -> HandlerError {
    HandlerError::Connection(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parses_rows_and_session() {
        let payload: QueryResponse = serde_json::from_str(
            r#"{
                "data": [[1, true, null], ["x", 2.5, "2024-03-01 08:00:00"]],
                "session": {"settings": {"timezone": "Asia/Shanghai"}}
            }"#,
        )
        .expect("valid payload");
        assert!(payload.error.is_none());
        assert_eq!(payload.data.len(), 2);
        assert!(payload.session.is_some());

        let row: Vec<RawValue> = payload.data[0].iter().cloned().map(RawValue::from).collect();
        assert_eq!(row, vec![RawValue::Int(1), RawValue::Bool(true), RawValue::Null]);
    }

    #[test]
    fn response_parses_error_body() {
        let payload: QueryResponse = serde_json::from_str(
            r#"{"error": {"code": 1025, "message": "no such table: t9"}}"#,
        )
        .expect("valid payload");
        let error = payload.error.expect("error body");
        assert_eq!(error.code, Some(1025));
        assert_eq!(error.message, "no such table: t9");
    }
}
