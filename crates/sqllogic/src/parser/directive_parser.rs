//! Line classification and directive argument parsing.

use super::ParseErrorKind;

pub(crate) const RESULTS_DELIMITER: &str = "----";

/// Check if a line opens a result block (`----` or `---- <label>`).
pub(crate) fn is_delimiter_line(line: &str) -> bool {
    line.starts_with(RESULTS_DELIMITER)
}

/// Check if a line is a comment between directives. The `----` delimiter also
/// starts with `--`, so it is excluded explicitly.
pub(crate) fn is_comment_line(line: &str) -> bool {
    line.starts_with("--") && !is_delimiter_line(line)
}

/// Check if a line is likely a directive rather than SQL content. Used to
/// reject fixtures that omit the blank line between two directives.
pub(crate) fn is_directive_line(line: &str) -> bool {
    line.starts_with("statement ")
}

/// Parse the `label(<name>,...)` argument of a `statement query` directive.
pub(crate) fn parse_label_list(token: &str) -> Result<Vec<String>, ParseErrorKind> {
    let inner = token
        .strip_prefix("label(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| ParseErrorKind::InvalidLabelList(token.to_string()))?;

    let labels: Vec<String> = inner
        .split(',')
        .map(|name| name.trim().to_string())
        .collect();
    if labels.iter().any(|name| name.is_empty() || name.contains(char::is_whitespace)) {
        return Err(ParseErrorKind::InvalidLabelList(token.to_string()));
    }
    Ok(labels)
}

/// Parse the optional label of a `----` result block line.
pub(crate) fn parse_block_label(line: &str) -> Result<Option<String>, ParseErrorKind> {
    let rest = line.trim_start_matches('-');
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(None);
    }
    if rest.contains(char::is_whitespace) {
        return Err(ParseErrorKind::UnexpectedToken(rest.to_string()));
    }
    Ok(Some(rest.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_list_single_and_multiple() {
        assert_eq!(parse_label_list("label(mysql)").unwrap(), vec!["mysql"]);
        assert_eq!(parse_label_list("label(mysql,http)").unwrap(), vec!["mysql", "http"]);
    }

    #[test]
    fn label_list_rejects_malformed() {
        assert!(parse_label_list("label()").is_err());
        assert!(parse_label_list("label(mysql").is_err());
        assert!(parse_label_list("labels(mysql)").is_err());
    }

    #[test]
    fn block_label_parsing() {
        assert_eq!(parse_block_label("----").unwrap(), None);
        assert_eq!(parse_block_label("---- mysql").unwrap(), Some("mysql".to_string()));
        assert!(parse_block_label("---- two tokens").is_err());
    }

    #[test]
    fn delimiter_is_not_a_comment() {
        assert!(is_comment_line("-- a comment"));
        assert!(!is_comment_line("----"));
        assert!(!is_comment_line("---- mysql"));
    }
}
