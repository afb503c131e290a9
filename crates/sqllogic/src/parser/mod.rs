//! Fixture file parser.
//!
//! A fixture file is a sequence of directives separated by blank lines:
//!
//! ```text
//! statement ok
//! SET time_zone = '+08:00';
//!
//! statement error .*no such table.*
//! SELECT * FROM missing;
//!
//! statement query IB label(mysql,http)
//! SELECT 1, 1 = 1;
//!
//! ---- mysql
//! 1 1
//!
//! ---- http
//! 1 true
//! ```
//!
//! Parsing preserves comments and blank lines so that a parsed file can be
//! re-serialized byte-identically (see [`unparse_records`]).

use std::collections::HashSet;
use std::path::Path;

pub mod directive_parser;
pub mod error_parser;
pub mod location;
pub mod record_parser;
pub mod records;

pub use self::error_parser::ExpectedError;
pub use self::location::Location;
pub use self::record_parser::{QueryExpect, StatementExpect};
pub use self::records::{unparse_records, Record};

use self::directive_parser::{is_comment_line, is_delimiter_line, parse_block_label, parse_label_list};
use self::record_parser::{parse_result_rows, parse_sql_lines, RowsEnd, SqlEnd};
use crate::ColumnType;

/// The error type for parsing fixture files.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
#[error("parse error at {loc}: {kind}")]
pub struct ParseError {
    kind: ParseErrorKind,
    loc: Location,
}

impl ParseError {
    /// Returns the corresponding [`ParseErrorKind`] for this error.
    pub fn kind(&self) -> ParseErrorKind {
        self.kind.clone()
    }

    /// Returns the location from which the error originated.
    pub fn location(&self) -> Location {
        self.loc.clone()
    }
}

/// The error kind for parsing fixture files.
#[derive(thiserror::Error, Debug, Eq, PartialEq, Clone)]
#[non_exhaustive]
pub enum ParseErrorKind {
    #[error("unexpected token: {0:?}")]
    UnexpectedToken(String),
    #[error("unexpected EOF")]
    UnexpectedEOF,
    #[error("invalid line: {0:?}")]
    InvalidLine(String),
    #[error("invalid type character: {0:?} in type string")]
    InvalidType(char),
    #[error("invalid error pattern: {0:?}")]
    InvalidErrorPattern(String),
    #[error("invalid label list: {0:?}")]
    InvalidLabelList(String),
    #[error("label {0:?} does not name a configured backend")]
    UndeclaredLabel(String),
    #[error("missing blank line before the next directive")]
    MissingBlankLine,
    #[error("statement should have no result block, use `statement query` instead")]
    StatementHasResults,
    #[error("labeled and unlabeled result blocks in one record")]
    MixedResultBlocks,
    #[error("more than one unlabeled result block")]
    MultipleSharedBlocks,
    #[error("duplicate result block for label {0:?}")]
    DuplicateLabelBlock(String),
    #[error("no such file")]
    FileNotFound,
}

impl ParseErrorKind {
    pub(crate) fn at(self, loc: Location) -> ParseError {
        ParseError { kind: self, loc }
    }
}

/// Parse a fixture script into a list of records.
pub fn parse<T: ColumnType>(script: &str) -> Result<Vec<Record<T>>, ParseError> {
    parse_inner(&Location::new("<unknown>", 0), script)
}

/// Parse a fixture script into a list of records with a given script name.
pub fn parse_with_name<T: ColumnType>(
    script: &str,
    name: impl Into<std::sync::Arc<str>>,
) -> Result<Vec<Record<T>>, ParseError> {
    parse_inner(&Location::new(name, 0), script)
}

/// Parse a fixture file.
pub fn parse_file<T: ColumnType>(filename: impl AsRef<Path>) -> Result<Vec<Record<T>>, ParseError> {
    let path = filename.as_ref();
    let loc = Location::new(path.to_string_lossy().to_string(), 0);
    if !path.exists() {
        return Err(ParseErrorKind::FileNotFound.at(loc));
    }
    let script = std::fs::read_to_string(path)
        .map_err(|_| ParseErrorKind::FileNotFound.at(loc.clone()))?;
    parse_inner(&loc, &script)
}

/// Check that every `label(...)` name and every `---- <label>` block in the
/// records names a configured backend. Fatal for the whole file, like any
/// other parse error.
pub fn validate_labels<T: ColumnType>(
    records: &[Record<T>],
    declared: &HashSet<String>,
) -> Result<(), ParseError> {
    for record in records {
        let Record::Query { loc, labels, expected, .. } = record else {
            continue;
        };
        for label in labels {
            if !declared.contains(label) {
                return Err(ParseErrorKind::UndeclaredLabel(label.clone()).at(loc.clone()));
            }
        }
        if let QueryExpect::PerLabel(blocks) = expected {
            for (label, _) in blocks {
                if !declared.contains(label) {
                    return Err(ParseErrorKind::UndeclaredLabel(label.clone()).at(loc.clone()));
                }
            }
        }
    }
    Ok(())
}

fn parse_inner<T: ColumnType>(loc: &Location, script: &str) -> Result<Vec<Record<T>>, ParseError> {
    let mut lines = script.lines().enumerate().peekable();
    let mut records = vec![];
    let mut comments: Vec<String> = vec![];

    while let Some((num, line)) = lines.next() {
        if is_comment_line(line) {
            comments.push(line["--".len()..].to_string());
            continue;
        }
        if !comments.is_empty() {
            records.push(Record::Comment(std::mem::take(&mut comments)));
        }

        if line.is_empty() {
            records.push(Record::Newline);
            continue;
        }

        let mut loc = loc.clone();
        loc.line = num as u32 + 1;

        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["statement", "ok"] => {
                let expected = StatementExpect::Ok;
                parse_statement(&mut lines, &mut records, loc, expected)?;
            }
            ["statement", "error", pattern @ ..] => {
                let error = ExpectedError::parse_inline_tokens(pattern)
                    .map_err(|e| e.at(loc.clone()))?;
                parse_statement(&mut lines, &mut records, loc, StatementExpect::Error(error))?;
            }
            ["statement", "query", type_str, rest @ ..] => {
                let types = type_str
                    .chars()
                    .map(|ch| {
                        T::from_char(ch)
                            .ok_or_else(|| ParseErrorKind::InvalidType(ch).at(loc.clone()))
                    })
                    .collect::<Result<Vec<T>, ParseError>>()?;
                let labels = match rest {
                    [] => vec![],
                    [label_token] => {
                        parse_label_list(label_token).map_err(|e| e.at(loc.clone()))?
                    }
                    [_, extra, ..] => {
                        return Err(ParseErrorKind::UnexpectedToken(extra.to_string()).at(loc))
                    }
                };
                parse_query(&mut lines, &mut records, loc, types, labels)?;
            }
            _ => return Err(ParseErrorKind::InvalidLine(line.into()).at(loc)),
        }
    }
    if !comments.is_empty() {
        records.push(Record::Comment(comments));
    }
    Ok(records)
}

/// Parse the body of a `statement ok` / `statement error` directive.
fn parse_statement<'a, T: ColumnType>(
    lines: &mut std::iter::Peekable<impl Iterator<Item = (usize, &'a str)>>,
    records: &mut Vec<Record<T>>,
    loc: Location,
    expected: StatementExpect,
) -> Result<(), ParseError> {
    let (sql, end) = parse_sql_lines(lines, &loc)?;
    if end == SqlEnd::Delimiter {
        return Err(ParseErrorKind::StatementHasResults.at(loc));
    }
    // A result block after the terminating blank line is just as fatal.
    if end == SqlEnd::Blank {
        if let Some((_, next)) = lines.peek() {
            if is_delimiter_line(next) {
                return Err(ParseErrorKind::StatementHasResults.at(loc));
            }
        }
    }
    records.push(Record::Statement { loc, sql, expected });
    if end == SqlEnd::Blank {
        records.push(Record::Newline);
    }
    Ok(())
}

/// Parse the body of a `statement query` directive: SQL, then result blocks.
fn parse_query<'a, T: ColumnType>(
    lines: &mut std::iter::Peekable<impl Iterator<Item = (usize, &'a str)>>,
    records: &mut Vec<Record<T>>,
    loc: Location,
    types: Vec<T>,
    labels: Vec<String>,
) -> Result<(), ParseError> {
    let (sql, end) = parse_sql_lines(lines, &loc)?;
    if end == SqlEnd::Delimiter {
        return Err(ParseErrorKind::MissingBlankLine.at(loc));
    }

    let mut blocks: Vec<(Option<String>, Vec<String>)> = vec![];
    let mut trailing_newline = false;
    if end == SqlEnd::Blank {
        loop {
            let at_block = matches!(lines.peek(), Some((_, l)) if is_delimiter_line(l));
            if !at_block {
                trailing_newline = true;
                break;
            }
            let (_, delimiter) = lines.next().expect("peeked delimiter");
            let label = parse_block_label(delimiter).map_err(|e| e.at(loc.clone()))?;
            let (rows, rows_end) = parse_result_rows(lines);
            blocks.push((label, rows));
            if rows_end == RowsEnd::Eof {
                break;
            }
        }
    }

    let expected = build_query_expect(blocks, &loc)?;
    records.push(Record::Query { loc, sql, types, labels, expected });
    if trailing_newline {
        records.push(Record::Newline);
    }
    Ok(())
}

fn build_query_expect(
    blocks: Vec<(Option<String>, Vec<String>)>,
    loc: &Location,
) -> Result<QueryExpect, ParseError> {
    if blocks.is_empty() {
        return Ok(QueryExpect::Wildcard);
    }
    let labeled = blocks.iter().filter(|(label, _)| label.is_some()).count();
    if labeled == 0 {
        if blocks.len() > 1 {
            return Err(ParseErrorKind::MultipleSharedBlocks.at(loc.clone()));
        }
        let (_, rows) = blocks.into_iter().next().expect("one block");
        return Ok(QueryExpect::Shared(rows));
    }
    if labeled != blocks.len() {
        return Err(ParseErrorKind::MixedResultBlocks.at(loc.clone()));
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(blocks.len());
    for (label, rows) in blocks {
        let label = label.expect("labeled block");
        if !seen.insert(label.clone()) {
            return Err(ParseErrorKind::DuplicateLabelBlock(label).at(loc.clone()));
        }
        out.push((label, rows));
    }
    Ok(QueryExpect::PerLabel(out))
}
