//! Per-backend record execution.

use std::time::Duration;

use crate::error_handling::{RecordKind, TestError, TestErrorKind};
use crate::handlers::{self, AsyncHandler, BackendConfig, HandlerError, MakeHandler};
use crate::parser::{Location, QueryExpect, Record, StatementExpect};
use crate::value::RawValue;
use crate::DefaultColumnType;

use super::validator;

/// Why a (record, backend) pair was not executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The record's fixture file is on the skip list.
    FileSkipListed,
    /// The record's label set does not include this backend.
    NotInLabelSet,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::FileSkipListed => write!(f, "file on skip list"),
            SkipReason::NotInLabelSet => write!(f, "backend not in label set"),
        }
    }
}

/// Terminal state of one (record, backend) pair.
///
/// A pair starts pending, enters execution, and lands in exactly one of
/// these states; only terminal states are observable outside the executor.
#[derive(Debug, Clone)]
pub enum RecordStatus {
    /// The record's expectation held.
    Passed,
    /// The expectation did not hold (wrong rows, wrong error, unexpected
    /// success or failure, timeout). The run continues.
    Failed(TestError),
    /// The backend became unusable; this and all remaining records on the
    /// backend cannot produce a verdict.
    Error(TestError),
    Skipped(SkipReason),
}

impl RecordStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, RecordStatus::Passed | RecordStatus::Skipped(_))
    }
}

/// Outcome of one (record, backend) pair.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub loc: Location,
    pub backend: String,
    pub status: RecordStatus,
}

enum OpOutput {
    Affected(u64),
    Rows(Vec<Vec<RawValue>>),
}

enum StepError {
    Timeout,
    Handler(HandlerError),
}

/// Executes one suite's records against one backend, strictly sequentially,
/// over one persistent connection.
pub struct BackendExecutor {
    handler: Box<dyn AsyncHandler>,
    maker: Box<dyn MakeHandler>,
    label: String,
    timeout: Duration,
    /// Set once the connection is lost and could not be re-established;
    /// every remaining record then reports an error without touching the
    /// wire.
    dead: Option<String>,
}

impl BackendExecutor {
    /// Connect to the backend. A failure here is a [`HandlerError::Connection`]
    /// and should fail the backend for the whole run.
    pub async fn connect(config: BackendConfig, timeout: Duration) -> Result<Self, HandlerError> {
        let handler = handlers::connect(&config).await?;
        let label = config.label.clone();
        Ok(Self { handler, maker: Box::new(config), label, timeout, dead: None })
    }

    /// Build an executor over an already-connected handler and a factory for
    /// reconnects. Lets embedders and tests substitute in-process handlers.
    pub fn with_handler(
        handler: Box<dyn AsyncHandler>,
        maker: Box<dyn MakeHandler>,
        timeout: Duration,
    ) -> Self {
        let label = handler.label().to_string();
        Self { handler, maker, label, timeout, dead: None }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run a single record. Comments and blank lines produce no outcome.
    pub async fn run_record(&mut self, record: &Record<DefaultColumnType>) -> Option<RecordOutcome> {
        tracing::debug!(backend = %self.label(), ?record, "testing");
        match record {
            Record::Comment(_) | Record::Newline => None,
            Record::Statement { loc, sql, expected } => {
                let status = self.run_statement(loc, sql, expected).await;
                Some(self.outcome(loc, status))
            }
            Record::Query { loc, sql, types, labels, expected } => {
                if !labels.is_empty() && !labels.iter().any(|l| l == self.label()) {
                    tracing::debug!(backend = %self.label(), at = %loc, "record restricted to other labels");
                    return Some(self.outcome(loc, RecordStatus::Skipped(SkipReason::NotInLabelSet)));
                }
                let status = self.run_query(loc, sql, types, expected).await;
                Some(self.outcome(loc, status))
            }
        }
    }

    /// Close the backend connection.
    pub async fn shutdown(&mut self) {
        tracing::debug!(backend = %self.label(), "shutting down executor");
        self.handler.close().await;
    }

    fn outcome(&self, loc: &Location, status: RecordStatus) -> RecordOutcome {
        RecordOutcome {
            loc: loc.clone(),
            backend: self.label().to_string(),
            status,
        }
    }

    async fn run_statement(
        &mut self,
        loc: &Location,
        sql: &str,
        expected: &StatementExpect,
    ) -> RecordStatus {
        let result = self.execute_op(sql, RecordKind::Statement).await;
        match (result, expected) {
            (Ok(_), StatementExpect::Ok) => RecordStatus::Passed,
            (Ok(_), StatementExpect::Error(_)) => RecordStatus::Failed(
                TestErrorKind::UnexpectedSuccess {
                    sql: sql.to_string(),
                    kind: RecordKind::Statement,
                }
                .at(loc.clone()),
            ),
            (Err(step), expected) => self.step_failure(loc, sql, step, RecordKind::Statement, Some(expected)),
        }
    }

    async fn run_query(
        &mut self,
        loc: &Location,
        sql: &str,
        types: &[DefaultColumnType],
        expected: &QueryExpect,
    ) -> RecordStatus {
        let rows = match self.execute_op(sql, RecordKind::Query).await {
            Ok(OpOutput::Rows(rows)) => rows,
            Ok(OpOutput::Affected(_)) => vec![],
            Err(step) => return self.step_failure(loc, sql, step, RecordKind::Query, None),
        };

        let Some(expected_rows) = expected.rows_for(self.label()) else {
            // Wildcard, or labeled blocks none of which apply here: success
            // is all that is required.
            return RecordStatus::Passed;
        };
        match validator::check_rows(sql, types, expected_rows, &rows, self.handler.kind()) {
            Ok(()) => RecordStatus::Passed,
            Err(kind) => RecordStatus::Failed(kind.at(loc.clone())),
        }
    }

    /// Map a failed execution step to a record status, handling the expected
    /// error case of `statement error` records.
    fn step_failure(
        &mut self,
        loc: &Location,
        sql: &str,
        step: StepError,
        kind: RecordKind,
        expected: Option<&StatementExpect>,
    ) -> RecordStatus {
        match step {
            StepError::Timeout => RecordStatus::Failed(
                TestErrorKind::Timeout { sql: sql.to_string(), after: self.timeout, kind }
                    .at(loc.clone()),
            ),
            StepError::Handler(err) if err.is_connection() => {
                self.dead = Some(err.to_string());
                RecordStatus::Error(
                    TestErrorKind::ConnectionLost { message: err.to_string() }.at(loc.clone()),
                )
            }
            StepError::Handler(err) => match expected {
                Some(StatementExpect::Error(pattern)) => {
                    if pattern.is_match(&err.to_string()) {
                        RecordStatus::Passed
                    } else {
                        RecordStatus::Failed(
                            TestErrorKind::ErrorMismatch {
                                sql: sql.to_string(),
                                err,
                                expected_err: pattern.to_string(),
                                kind,
                            }
                            .at(loc.clone()),
                        )
                    }
                }
                _ => RecordStatus::Failed(
                    TestErrorKind::Fail { sql: sql.to_string(), err, kind }.at(loc.clone()),
                ),
            },
        }
    }

    /// Execute one operation with the per-record timeout. A connection
    /// failure triggers one reconnect attempt and one re-execution; if
    /// either fails with another connection error, the caller marks the
    /// backend dead.
    async fn execute_op(&mut self, sql: &str, kind: RecordKind) -> Result<OpOutput, StepError> {
        if let Some(message) = &self.dead {
            return Err(StepError::Handler(HandlerError::Connection(message.clone())));
        }
        match self.execute_once(sql, kind).await {
            Err(StepError::Handler(err)) if err.is_connection() => {
                tracing::warn!(backend = %self.label(), error = %err, "connection failure, attempting reconnect");
                match self.maker.make().await {
                    Ok(handler) => {
                        self.handler = handler;
                        self.execute_once(sql, kind).await
                    }
                    Err(reconnect_err) => Err(StepError::Handler(reconnect_err)),
                }
            }
            other => other,
        }
    }

    async fn execute_once(&mut self, sql: &str, kind: RecordKind) -> Result<OpOutput, StepError> {
        let timeout = self.timeout;
        let op = async {
            match kind {
                RecordKind::Statement => {
                    self.handler.execute_statement(sql).await.map(OpOutput::Affected)
                }
                RecordKind::Query => self.handler.execute_query(sql).await.map(OpOutput::Rows),
            }
        };
        match tokio::time::timeout(timeout, op).await {
            Err(_elapsed) => Err(StepError::Timeout),
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(StepError::Handler(err)),
        }
    }
}
