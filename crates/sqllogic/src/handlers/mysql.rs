//! MySQL wire protocol handler.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::{ConnectOptions, Connection, Executor, Row, TypeInfo, ValueRef};

use super::{AsyncHandler, BackendConfig, BackendKind, HandlerError};
use crate::value::RawValue;

/// A backend speaking the MySQL wire protocol, driven over one persistent
/// connection. Session settings (`SET time_zone = ...`) applied through
/// [`AsyncHandler::execute_statement`] stay in effect for the lifetime of
/// the connection.
pub struct MysqlHandler {
    conn: Option<MySqlConnection>,
    label: String,
}

impl MysqlHandler {
    /// Open a connection with the given backend parameters.
    pub async fn connect(config: &BackendConfig) -> Result<Self, HandlerError> {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user);
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        if let Some(database) = &config.database {
            options = options.database(database);
        }
        let conn = options.connect().await.map_err(map_sqlx_error)?;
        tracing::debug!(label = %config.label, host = %config.host, port = config.port, "mysql backend connected");
        Ok(Self { conn: Some(conn), label: config.label.clone() })
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection, HandlerError> {
        self.conn
            .as_mut()
            .ok_or_else(|| HandlerError::Connection("connection already closed".to_string()))
    }
}

#[async_trait]
impl AsyncHandler for MysqlHandler {
    async fn execute_statement(&mut self, sql: &str) -> Result<u64, HandlerError> {
        let result = self.conn()?.execute(sql).await.map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn execute_query(&mut self, sql: &str) -> Result<Vec<Vec<RawValue>>, HandlerError> {
        let rows = self.conn()?.fetch_all(sql).await.map_err(map_sqlx_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::warn!(label = %self.label, error = %e, "error closing mysql connection");
            }
        }
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Mysql
    }
}

fn map_sqlx_error(e: sqlx::Error) -> HandlerError {
    match e {
        sqlx::Error::Database(db) => {
            let code = db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(|e| e.number().to_string())
                .or_else(|| db.code().map(|c| c.into_owned()));
            HandlerError::Execution { code, message: db.message().to_string() }
        }
        // Anything below the SQL layer (refused, reset, TLS, protocol) means
        // the backend is unreachable, not that the statement was rejected.
        other => HandlerError::Connection(other.to_string()),
    }
}

fn decode_row(row: &MySqlRow) -> Result<Vec<RawValue>, HandlerError> {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

/// Decode one cell into a [`RawValue`], dispatching on the column's MySQL
/// type so that booleans and temporal values keep their identity until
/// normalization.
fn decode_value(row: &MySqlRow, index: usize) -> Result<RawValue, HandlerError> {
    let (is_null, type_name) = {
        let raw = row.try_get_raw(index).map_err(map_sqlx_error)?;
        (raw.is_null(), raw.type_info().name().to_string())
    };
    if is_null {
        return Ok(RawValue::Null);
    }

    let value = match type_name.as_str() {
        "BOOLEAN" => RawValue::Bool(get(row, index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            RawValue::Int(get::<i64>(row, index)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => RawValue::UInt(get::<u64>(row, index)?),
        "FLOAT" => RawValue::Float(get::<f32>(row, index)? as f64),
        "DOUBLE" => RawValue::Float(get::<f64>(row, index)?),
        "DATE" => {
            let date: chrono::NaiveDate = get(row, index)?;
            RawValue::Text(date.format("%Y-%m-%d").to_string())
        }
        "TIME" => {
            let time: chrono::NaiveTime = get(row, index)?;
            RawValue::Text(time.format("%H:%M:%S%.f").to_string())
        }
        "DATETIME" => {
            let dt: chrono::NaiveDateTime = get(row, index)?;
            RawValue::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        "TIMESTAMP" => {
            let dt: chrono::DateTime<chrono::Utc> = get(row, index)?;
            RawValue::Text(dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        // CHAR/VARCHAR/TEXT/DECIMAL/ENUM and everything else: the textual
        // form is already what comparison wants.
        _ => RawValue::Text(get::<String>(row, index)?),
    };
    Ok(value)
}

fn get<'r, T>(row: &'r MySqlRow, index: usize) -> Result<T, HandlerError>
where
    T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    row.try_get::<T, _>(index).map_err(map_sqlx_error)
}
