//! Parsing of directive bodies: SQL lines and result blocks.

use std::fmt;
use std::iter::Peekable;

use itertools::Itertools;

use crate::ColumnType;

use super::directive_parser::{is_delimiter_line, is_directive_line, RESULTS_DELIMITER};
use super::error_parser::ExpectedError;
use super::location::Location;
use super::{ParseError, ParseErrorKind};

/// Expectation for a `statement ok` / `statement error` directive.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementExpect {
    /// Statement should succeed.
    Ok,
    /// Statement should fail with an error message matching the pattern.
    Error(ExpectedError),
}

/// Expected results of a `statement query` directive.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpect {
    /// No result block: the query must succeed, rows are not compared.
    Wildcard,
    /// One unlabeled block shared by every applicable backend.
    Shared(Vec<String>),
    /// Labeled blocks, one per backend label, in file order.
    PerLabel(Vec<(String, Vec<String>)>),
}

impl QueryExpect {
    /// The expected rows applicable to the given backend label, or `None`
    /// when the query only needs to succeed for that backend.
    pub fn rows_for(&self, label: &str) -> Option<&[String]> {
        match self {
            QueryExpect::Wildcard => None,
            QueryExpect::Shared(rows) => Some(rows),
            QueryExpect::PerLabel(blocks) => blocks
                .iter()
                .find(|(block_label, _)| block_label == label)
                .map(|(_, rows)| rows.as_slice()),
        }
    }
}

/// How a directive's SQL body ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SqlEnd {
    /// A blank line terminated the body. The blank line is consumed.
    Blank,
    /// End of file.
    Eof,
    /// A `----` line follows the body directly, with no blank line between.
    /// The delimiter line is not consumed.
    Delimiter,
}

/// Parse a directive's SQL body: one or more lines up to a blank line or end
/// of file. A directive keyword on the next line without a separating blank
/// line is a fatal error, never silently absorbed into the SQL.
pub(crate) fn parse_sql_lines<'a>(
    lines: &mut Peekable<impl Iterator<Item = (usize, &'a str)>>,
    loc: &Location,
) -> Result<(String, SqlEnd), ParseError> {
    let mut out: String = match lines.next() {
        Some((_, line)) => line.into(),
        None => return Err(ParseErrorKind::UnexpectedEOF.at(loc.clone().next_line())),
    };

    loop {
        let next_line = match lines.peek() {
            Some((_, line)) => *line,
            None => return Ok((out, SqlEnd::Eof)),
        };
        if next_line.is_empty() {
            lines.next();
            return Ok((out, SqlEnd::Blank));
        }
        if is_delimiter_line(next_line) {
            return Ok((out, SqlEnd::Delimiter));
        }
        if is_directive_line(next_line) {
            return Err(ParseErrorKind::MissingBlankLine.at(loc.clone()));
        }
        let (_, line) = lines.next().expect("peeked line");
        out += "\n";
        out += line;
    }
}

/// How a result block's rows ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowsEnd {
    /// A blank line terminated the rows. The blank line is consumed.
    Blank,
    /// End of file.
    Eof,
}

/// Parse the rows of one result block: every line up to a blank line or end
/// of file, kept verbatim. Cell splitting happens at comparison time, where
/// the declared column types are known.
pub(crate) fn parse_result_rows<'a>(
    lines: &mut Peekable<impl Iterator<Item = (usize, &'a str)>>,
) -> (Vec<String>, RowsEnd) {
    let mut rows = vec![];
    loop {
        match lines.next() {
            None => return (rows, RowsEnd::Eof),
            Some((_, "")) => return (rows, RowsEnd::Blank),
            Some((_, line)) => rows.push(line.to_string()),
        }
    }
}

// Format functions for unparsing records.

/// Unparse a statement record.
pub(crate) fn fmt_statement(
    f: &mut fmt::Formatter<'_>,
    sql: &str,
    expected: &StatementExpect,
) -> fmt::Result {
    write!(f, "statement ")?;
    match expected {
        StatementExpect::Ok => write!(f, "ok")?,
        StatementExpect::Error(err) => err.fmt_inline(f)?,
    }
    write!(f, "\n{sql}")
}

/// Unparse a query record.
pub(crate) fn fmt_query<T: ColumnType>(
    f: &mut fmt::Formatter<'_>,
    sql: &str,
    types: &[T],
    labels: &[String],
    expected: &QueryExpect,
) -> fmt::Result {
    write!(f, "statement query {}", types.iter().map(|c| c.to_char()).join(""))?;
    if !labels.is_empty() {
        write!(f, " label({})", labels.iter().join(","))?;
    }
    write!(f, "\n{sql}")?;

    let mut fmt_block = |label: Option<&str>, rows: &[String]| -> fmt::Result {
        write!(f, "\n\n{RESULTS_DELIMITER}")?;
        if let Some(label) = label {
            write!(f, " {label}")?;
        }
        for row in rows {
            write!(f, "\n{row}")?;
        }
        Ok(())
    };

    match expected {
        QueryExpect::Wildcard => Ok(()),
        QueryExpect::Shared(rows) => fmt_block(None, rows),
        QueryExpect::PerLabel(blocks) => {
            for (label, rows) in blocks {
                fmt_block(Some(label.as_str()), rows)?;
            }
            Ok(())
        }
    }
}
