//! Comparison of normalized query results against expected rows.

use itertools::Itertools;

use crate::error_handling::{CellMismatch, TestErrorKind};
use crate::handlers::BackendKind;
use crate::normalize::normalize_row;
use crate::value::RawValue;
use crate::DefaultColumnType;

/// Compare the backend's rows against the expected block, cell-wise after
/// normalization, order-sensitive. On mismatch the first diverging row/cell
/// is reported along with a full diff.
pub fn check_rows(
    sql: &str,
    types: &[DefaultColumnType],
    expected: &[String],
    actual: &[Vec<RawValue>],
    backend: BackendKind,
) -> Result<(), TestErrorKind> {
    let expected_rows: Vec<Vec<String>> = expected.iter().map(|line| split_row(line, types)).collect();
    let actual_rows: Vec<Vec<String>> =
        actual.iter().map(|row| normalize_row(row, types, backend)).collect();

    if expected_rows == actual_rows {
        return Ok(());
    }

    let mismatch = first_mismatch(&expected_rows, &actual_rows);
    Err(TestErrorKind::QueryResultMismatch {
        sql: sql.to_string(),
        expected: join_rows(&expected_rows),
        actual: join_rows(&actual_rows),
        mismatch,
    })
}

/// Split one expected line into cells. When the type spec declares a single
/// text column the whole line is one opaque cell, so multi-word text such as
/// `====CAST====` or `a b c` compares as-is.
fn split_row(line: &str, types: &[DefaultColumnType]) -> Vec<String> {
    if let [DefaultColumnType::Text] = types {
        vec![line.to_string()]
    } else {
        line.split_whitespace().map(|cell| cell.to_string()).collect()
    }
}

fn join_rows(rows: &[Vec<String>]) -> String {
    rows.iter().map(|row| row.iter().join(" ")).join("\n")
}

/// Locate the first diverging cell. A missing row or a short row reports the
/// first position only one side has.
fn first_mismatch(expected: &[Vec<String>], actual: &[Vec<String>]) -> Option<CellMismatch> {
    const ABSENT: &str = "<none>";
    for (i, (erow, arow)) in expected.iter().zip(actual.iter()).enumerate() {
        if erow == arow {
            continue;
        }
        let cols = erow.len().max(arow.len());
        for j in 0..cols {
            let e = erow.get(j);
            let a = arow.get(j);
            if e != a {
                return Some(CellMismatch {
                    row: i,
                    col: j,
                    expected: e.cloned().unwrap_or_else(|| ABSENT.to_string()),
                    actual: a.cloned().unwrap_or_else(|| ABSENT.to_string()),
                });
            }
        }
    }
    // Equal prefix: one side has extra rows.
    let i = expected.len().min(actual.len());
    if expected.len() != actual.len() {
        return Some(CellMismatch {
            row: i,
            col: 0,
            expected: expected.get(i).map(|r| r.iter().join(" ")).unwrap_or_else(|| ABSENT.to_string()),
            actual: actual.get(i).map(|r| r.iter().join(" ")).unwrap_or_else(|| ABSENT.to_string()),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefaultColumnType::{Boolean, Integer, Text};

    fn text_row(cells: &[&str]) -> Vec<RawValue> {
        cells.iter().map(|c| RawValue::Text(c.to_string())).collect()
    }

    #[test]
    fn equal_rows_pass() {
        let expected = vec!["1 one".to_string(), "2 two".to_string()];
        let actual = vec![
            vec![RawValue::Int(1), RawValue::Text("one".into())],
            vec![RawValue::Int(2), RawValue::Text("two".into())],
        ];
        check_rows("SELECT a, b FROM t1;", &[Integer, Text], &expected, &actual, BackendKind::Mysql)
            .unwrap();
    }

    #[test]
    fn first_cell_mismatch_is_reported() {
        let expected = vec!["1 one".to_string(), "2 two".to_string()];
        let actual = vec![text_row(&["1", "one"]), text_row(&["2", "deux"])];
        let err = check_rows("SELECT 1;", &[Integer, Text], &expected, &actual, BackendKind::Mysql)
            .unwrap_err();
        let TestErrorKind::QueryResultMismatch { mismatch: Some(m), .. } = err else {
            panic!("expected a result mismatch, got {err:?}");
        };
        assert_eq!((m.row, m.col), (1, 1));
        assert_eq!(m.expected, "two");
        assert_eq!(m.actual, "deux");
    }

    #[test]
    fn row_count_mismatch_fails() {
        let expected = vec!["1".to_string()];
        let actual = vec![text_row(&["1"]), text_row(&["2"])];
        let err =
            check_rows("SELECT 1;", &[Integer], &expected, &actual, BackendKind::Mysql).unwrap_err();
        let TestErrorKind::QueryResultMismatch { mismatch: Some(m), .. } = err else {
            panic!("expected a result mismatch, got {err:?}");
        };
        assert_eq!((m.row, m.col), (1, 0));
        assert_eq!(m.actual, "2");
    }

    #[test]
    fn single_text_column_is_one_opaque_cell() {
        let expected = vec!["====CAST====".to_string()];
        let actual = vec![vec![RawValue::Text("====CAST====".into())]];
        check_rows("SELECT x;", &[Text], &expected, &actual, BackendKind::Http).unwrap();

        // Multi-word text survives as one cell instead of splitting.
        let expected = vec!["hello logic test".to_string()];
        let actual = vec![vec![RawValue::Text("hello logic test".into())]];
        check_rows("SELECT y;", &[Text], &expected, &actual, BackendKind::Http).unwrap();
    }

    #[test]
    fn boolean_literals_are_backend_native() {
        let actual = vec![vec![RawValue::Bool(true)]];
        let expected_mysql = vec!["1".to_string()];
        let expected_http = vec!["true".to_string()];

        check_rows("SELECT 1 = 1;", &[Boolean], &expected_mysql, &actual, BackendKind::Mysql)
            .unwrap();
        check_rows("SELECT 1 = 1;", &[Boolean], &expected_http, &actual, BackendKind::Http)
            .unwrap();

        // An HTTP backend answering the MySQL literal must fail.
        let actual_text = vec![vec![RawValue::Text("1".into())]];
        check_rows("SELECT 1 = 1;", &[Boolean], &expected_http, &actual_text, BackendKind::Http)
            .unwrap_err();
    }

    #[test]
    fn null_compares_against_sentinel_only() {
        let actual = vec![vec![RawValue::Null, RawValue::Text(String::new())]];
        let expected = vec!["NULL (empty)".to_string()];
        check_rows("SELECT NULL, '';", &[Text, Text], &expected, &actual, BackendKind::Mysql)
            .unwrap();

        let swapped = vec!["(empty) NULL".to_string()];
        check_rows("SELECT NULL, '';", &[Text, Text], &swapped, &actual, BackendKind::Mysql)
            .unwrap_err();
    }
}
