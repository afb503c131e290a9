//! Parsing and matching of expected error patterns.

use std::fmt;

use regex::Regex;

use super::ParseErrorKind;

/// Expected error pattern after `statement error`.
#[derive(Debug, Clone)]
pub enum ExpectedError {
    /// No pattern given.
    ///
    /// Any error message is considered a match.
    Empty,
    /// An inline regular expression after `error`.
    ///
    /// An actual error message matching the regex is considered a match.
    Inline(Regex),
}

impl ExpectedError {
    /// Parses the pattern from the tokens following `statement error`.
    pub(crate) fn parse_inline_tokens(tokens: &[&str]) -> Result<Self, ParseErrorKind> {
        Self::new_inline(tokens.join(" "))
    }

    /// Creates an inline expected error from a regex string.
    ///
    /// An empty string is considered [`ExpectedError::Empty`].
    fn new_inline(regex: String) -> Result<Self, ParseErrorKind> {
        if regex.is_empty() {
            Ok(Self::Empty)
        } else {
            let regex =
                Regex::new(&regex).map_err(|_| ParseErrorKind::InvalidErrorPattern(regex))?;
            Ok(Self::Inline(regex))
        }
    }

    /// Returns whether the given error message matches the expected pattern.
    pub fn is_match(&self, err: &str) -> bool {
        match self {
            Self::Empty => true,
            Self::Inline(regex) => regex.is_match(err),
        }
    }

    /// Unparses the pattern after the `error` keyword.
    pub(crate) fn fmt_inline(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error")?;
        if let Self::Inline(regex) = self {
            write!(f, " {regex}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ExpectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedError::Empty => write!(f, "(any)"),
            ExpectedError::Inline(regex) => write!(f, "(regex) {regex}"),
        }
    }
}

impl PartialEq for ExpectedError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Inline(l0), Self::Inline(r0)) => l0.as_str() == r0.as_str(),
            _ => false,
        }
    }
}
