//! Record type definitions for fixture files.

use std::fmt;

use crate::ColumnType;

use super::location::Location;
use super::record_parser::{fmt_query, fmt_statement, QueryExpect, StatementExpect};

/// A single directive in a fixture file.
#[derive(Debug, Clone, PartialEq)]
pub enum Record<T: ColumnType> {
    /// A `statement ok` or `statement error` directive: a SQL command from
    /// which only success or a matching failure is expected.
    Statement {
        loc: Location,
        /// The SQL command.
        sql: String,
        expected: StatementExpect,
    },
    /// A `statement query` directive: a SQL command from which result rows
    /// are expected. The expected rows may be shared across backends or
    /// declared per backend label.
    Query {
        loc: Location,
        /// The SQL command.
        sql: String,
        /// Declared column types, one tag per result column.
        types: Vec<T>,
        /// Backend labels this record is restricted to. Empty means the
        /// record applies to every configured backend.
        labels: Vec<String>,
        expected: QueryExpect,
    },
    /// Consecutive `--` comment lines between directives.
    Comment(Vec<String>),
    /// A blank line between directives.
    Newline,
}

impl<T: ColumnType> Record<T> {
    /// Unparses the record to its string representation in the fixture file.
    pub fn unparse(&self, w: &mut impl std::io::Write) -> std::io::Result<()> {
        write!(w, "{self}")
    }

    /// The source location of the record, if it has one.
    pub fn loc(&self) -> Option<&Location> {
        match self {
            Record::Statement { loc, .. } | Record::Query { loc, .. } => Some(loc),
            Record::Comment(_) | Record::Newline => None,
        }
    }
}

/// Produces exactly the text the record was parsed from, with no trailing
/// newline. Joining all of a file's records with `"\n"` reproduces the file.
impl<T: ColumnType> fmt::Display for Record<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Statement { loc: _, sql, expected } => fmt_statement(f, sql, expected),
            Record::Query { loc: _, sql, types, labels, expected } => {
                fmt_query(f, sql, types, labels, expected)
            }
            Record::Comment(comment) => {
                let mut iter = comment.iter();
                if let Some(line) = iter.next() {
                    write!(f, "--{line}")?;
                }
                for line in iter {
                    write!(f, "\n--{line}")?;
                }
                Ok(())
            }
            Record::Newline => Ok(()),
        }
    }
}

/// Serializes a parsed record sequence back to fixture-file text.
///
/// Inverse of [`super::parse`]: for any well-formed file,
/// `unparse_records(&parse(text)?) + "\n" == text`.
pub fn unparse_records<T: ColumnType>(records: &[Record<T>]) -> String {
    use itertools::Itertools;
    records.iter().map(|r| r.to_string()).join("\n")
}
