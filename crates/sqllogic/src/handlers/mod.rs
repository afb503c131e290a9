//! Backend handler adapters.
//!
//! A handler owns one persistent connection to a backend and executes
//! statements and queries on it. Session-level settings applied on the
//! connection stay in effect for every subsequent call until the connection
//! is closed; the executor relies on this and never interleaves two
//! operations on one handler.

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use crate::value::RawValue;

pub mod http;
pub mod mysql;

pub use self::http::HttpHandler;
pub use self::mysql::MysqlHandler;

/// Which wire protocol a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Mysql,
    Http,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Mysql => write!(f, "mysql"),
            BackendKind::Http => write!(f, "http"),
        }
    }
}

/// Connection parameters for one configured backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// The label fixture records refer to (`label(...)`, `---- <label>`).
    pub label: String,
    pub protocol: BackendKind,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: Option<String>,
}

/// The error type of handler operations.
///
/// Connection failures are kept distinct from execution errors: an execution
/// error is the expected outcome of a `statement error` record, a connection
/// failure never is.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HandlerError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("{}", display_execution(.code, .message))]
    Execution {
        /// Backend-native error code, when the protocol carries one.
        code: Option<String>,
        message: String,
    },
}

fn display_execution(code: &Option<String>, message: &String) -> String {
    match code {
        Some(code) => format!("ERROR {code}: {message}"),
        None => message.clone(),
    }
}

impl HandlerError {
    /// Whether the backend itself became unreachable, as opposed to
    /// rejecting a statement.
    pub fn is_connection(&self) -> bool {
        matches!(self, HandlerError::Connection(_))
    }
}

/// A connected backend, polymorphic over the wire protocol.
#[async_trait]
pub trait AsyncHandler: Send {
    /// Execute a statement that returns no rows. Returns the number of
    /// affected rows.
    async fn execute_statement(&mut self, sql: &str) -> Result<u64, HandlerError>;

    /// Execute a query and return its rows in backend order.
    async fn execute_query(&mut self, sql: &str) -> Result<Vec<Vec<RawValue>>, HandlerError>;

    /// Shut the connection down gracefully.
    async fn close(&mut self);

    /// The configured label of this backend.
    fn label(&self) -> &str;

    /// The wire protocol of this backend.
    fn kind(&self) -> BackendKind;
}

/// Open a connection to the backend described by `config`.
pub async fn connect(config: &BackendConfig) -> Result<Box<dyn AsyncHandler>, HandlerError> {
    match config.protocol {
        BackendKind::Mysql => Ok(Box::new(MysqlHandler::connect(config).await?)),
        BackendKind::Http => Ok(Box::new(HttpHandler::connect(config).await?)),
    }
}

/// A factory opening connections to one backend. The executor uses it for
/// the initial connection's replacement when a reconnect is attempted.
#[async_trait]
pub trait MakeHandler: Send {
    async fn make(&self) -> Result<Box<dyn AsyncHandler>, HandlerError>;
}

#[async_trait]
impl MakeHandler for BackendConfig {
    async fn make(&self) -> Result<Box<dyn AsyncHandler>, HandlerError> {
        connect(self).await
    }
}
