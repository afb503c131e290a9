//! Error types and formatting for test execution.

use std::fmt::Display;
use std::time::Duration;

use itertools::Itertools;
use owo_colors::OwoColorize;
use similar::{Change, ChangeTag, TextDiff};

use crate::handlers::HandlerError;
use crate::parser::{Location, ParseErrorKind};

/// The error produced by one (record, backend) execution.
///
/// For colored output, use `self.display(true)`.
#[derive(thiserror::Error, Clone)]
#[error("{kind}\nat {loc}\n")]
pub struct TestError {
    kind: TestErrorKind,
    loc: Location,
}

impl TestError {
    /// Returns the corresponding [`TestErrorKind`] for this error.
    pub fn kind(&self) -> TestErrorKind {
        self.kind.clone()
    }

    /// Returns the location from which the error originated.
    pub fn location(&self) -> Location {
        self.loc.clone()
    }

    pub fn display(&self, colorize: bool) -> TestErrorDisplay<'_> {
        TestErrorDisplay { err: self, colorize }
    }
}

impl std::fmt::Debug for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// Overrides the `Display` implementation of [`TestError`] to support
/// controlling colorization.
pub struct TestErrorDisplay<'a> {
    err: &'a TestError,
    colorize: bool,
}

impl Display for TestErrorDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\nat {}\n", self.err.kind.display(self.colorize), self.err.loc)
    }
}

/// Which directive flavor an error belongs to.
#[derive(Debug, Clone, Copy)]
pub enum RecordKind {
    Statement,
    Query,
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Statement => write!(f, "statement"),
            RecordKind::Query => write!(f, "query"),
        }
    }
}

/// The first mismatching cell of a query result comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellMismatch {
    /// Row index, 0-based, in the expected block.
    pub row: usize,
    /// Column index, 0-based.
    pub col: usize,
    pub expected: String,
    pub actual: String,
}

impl Display for CellMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "first mismatch at row {}, column {}: expected {:?}, actual {:?}",
            self.row, self.col, self.expected, self.actual
        )
    }
}

/// The error kind for one (record, backend) execution.
///
/// For colored output, use `self.display(true)`.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum TestErrorKind {
    #[error("parse error: {0}")]
    ParseError(ParseErrorKind),
    #[error("{kind} is expected to fail, but actually succeeded:\n[SQL] {sql}")]
    UnexpectedSuccess { sql: String, kind: RecordKind },
    #[error("{kind} failed: {err}\n[SQL] {sql}")]
    Fail {
        sql: String,
        err: HandlerError,
        kind: RecordKind,
    },
    // Remember to also update [`TestErrorKindDisplay`] if this message is changed.
    #[error("{kind} is expected to fail with error:\n\t{expected_err}\nbut got error:\n\t{err}\n[SQL] {sql}")]
    ErrorMismatch {
        sql: String,
        err: HandlerError,
        expected_err: String,
        kind: RecordKind,
    },
    // Remember to also update [`TestErrorKindDisplay`] if this message is changed.
    #[error(
        "query result mismatch:\n[SQL] {sql}\n{}[Diff] (-expected|+actual)\n{}",
        .mismatch.as_ref().map(|m| format!("[{m}]\n")).unwrap_or_default(),
        TextDiff::from_lines(.expected, .actual).iter_all_changes().format_with("\n", |diff, f| format_diff(&diff, f, false))
    )]
    QueryResultMismatch {
        sql: String,
        expected: String,
        actual: String,
        mismatch: Option<CellMismatch>,
    },
    #[error("{kind} timed out after {after:?}\n[SQL] {sql}")]
    Timeout {
        sql: String,
        after: Duration,
        kind: RecordKind,
    },
    #[error("backend connection lost: {message}")]
    ConnectionLost { message: String },
}

impl TestErrorKind {
    pub fn at(self, loc: Location) -> TestError {
        TestError { kind: self, loc }
    }

    pub fn display(&self, colorize: bool) -> TestErrorKindDisplay<'_> {
        TestErrorKindDisplay { error: self, colorize }
    }
}

impl From<crate::parser::ParseError> for TestError {
    fn from(e: crate::parser::ParseError) -> Self {
        TestError {
            kind: TestErrorKind::ParseError(e.kind()),
            loc: e.location(),
        }
    }
}

/// Overrides the `Display` implementation of [`TestErrorKind`] to support
/// controlling colorization.
pub struct TestErrorKindDisplay<'a> {
    error: &'a TestErrorKind,
    colorize: bool,
}

impl Display for TestErrorKindDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.colorize {
            return write!(f, "{}", self.error);
        }
        match self.error {
            TestErrorKind::ErrorMismatch { sql, err, expected_err, kind } => write!(
                f,
                "{kind} is expected to fail with error:\n\t{}\nbut got error:\n\t{}\n[SQL] {sql}",
                expected_err.bright_green(),
                err.bright_red(),
            ),
            TestErrorKind::QueryResultMismatch { sql, expected, actual, mismatch } => write!(
                f,
                "query result mismatch:\n[SQL] {sql}\n{}[Diff] ({}|{})\n{}",
                mismatch.as_ref().map(|m| format!("[{m}]\n")).unwrap_or_default(),
                "-expected".bright_red(),
                "+actual".bright_green(),
                TextDiff::from_lines(expected, actual)
                    .iter_all_changes()
                    .format_with("\n", |diff, f| format_diff(&diff, f, true))
            ),
            _ => write!(f, "{}", self.error),
        }
    }
}

pub fn format_diff(
    diff: &Change<&str>,
    f: &mut dyn FnMut(&dyn Display) -> std::fmt::Result,
    colorize: bool,
) -> std::fmt::Result {
    match diff.tag() {
        ChangeTag::Equal => f(&diff
            .value()
            .lines()
            .format_with("\n", |line, f| f(&format_args!("    {line}")))),
        ChangeTag::Insert => f(&diff.value().lines().format_with("\n", |line, f| {
            if colorize {
                f(&format_args!("+   {line}").bright_green())
            } else {
                f(&format_args!("+   {line}"))
            }
        })),
        ChangeTag::Delete => f(&diff.value().lines().format_with("\n", |line, f| {
            if colorize {
                f(&format_args!("-   {line}").bright_red())
            } else {
                f(&format_args!("-   {line}"))
            }
        })),
    }
}
