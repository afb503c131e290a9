//! Aggregation of record outcomes into a run report.

use std::collections::BTreeMap;
use std::fmt::Display;

use crate::executor::{RecordOutcome, RecordStatus};
use crate::parser::ParseError;

/// Per-file outcome counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileStats {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

/// Aggregated outcomes of one run: per-file and total counters, parse
/// failures, and the failing (record, backend) pairs for diff output.
///
/// The report has a single writer: workers send outcomes over a channel and
/// one aggregation loop calls [`Report::record`].
#[derive(Debug)]
pub struct Report {
    files: BTreeMap<String, FileStats>,
    failures: Vec<RecordOutcome>,
    parse_errors: Vec<ParseError>,
    skipped_files: Vec<String>,
    /// How many failing diffs to print in full.
    max_diffs: usize,
}

impl Report {
    pub fn new(max_diffs: usize) -> Self {
        Self {
            files: BTreeMap::new(),
            failures: vec![],
            parse_errors: vec![],
            skipped_files: vec![],
            max_diffs,
        }
    }

    /// Record one (record, backend) outcome.
    pub fn record(&mut self, outcome: RecordOutcome) {
        let stats = self.files.entry(outcome.loc.file().to_string()).or_default();
        match &outcome.status {
            RecordStatus::Passed => stats.passed += 1,
            RecordStatus::Skipped(_) => stats.skipped += 1,
            RecordStatus::Failed(_) => {
                stats.failed += 1;
                self.failures.push(outcome);
            }
            RecordStatus::Error(_) => {
                stats.errored += 1;
                self.failures.push(outcome);
            }
        }
    }

    /// Record a fixture file that failed to parse.
    pub fn record_parse_error(&mut self, err: ParseError) {
        self.parse_errors.push(err);
    }

    /// Record a fixture file excluded by the skip list.
    pub fn record_skipped_file(&mut self, name: String) {
        self.skipped_files.push(name);
    }

    pub fn parse_errors(&self) -> &[ParseError] {
        &self.parse_errors
    }

    pub fn failures(&self) -> &[RecordOutcome] {
        &self.failures
    }

    /// Aggregate (passed, failed, errored, skipped) counts.
    pub fn totals(&self) -> FileStats {
        let mut totals = FileStats::default();
        for stats in self.files.values() {
            totals.passed += stats.passed;
            totals.failed += stats.failed;
            totals.errored += stats.errored;
            totals.skipped += stats.skipped;
        }
        totals
    }

    /// Whether the run passed: no failed or errored record and no parse
    /// error. Skips do not fail a run.
    pub fn success(&self) -> bool {
        let totals = self.totals();
        totals.failed == 0 && totals.errored == 0 && self.parse_errors.is_empty()
    }

    pub fn display(&self, colorize: bool) -> ReportDisplay<'_> {
        ReportDisplay { report: self, colorize }
    }
}

/// Renders the report; colorization applies to the embedded failure diffs.
pub struct ReportDisplay<'a> {
    report: &'a Report,
    colorize: bool,
}

impl Display for ReportDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let report = self.report;

        for (file, stats) in &report.files {
            writeln!(
                f,
                "{file}: {} passed, {} failed, {} errored, {} skipped",
                stats.passed, stats.failed, stats.errored, stats.skipped
            )?;
        }
        for file in &report.skipped_files {
            writeln!(f, "{file}: skipped (skip list)")?;
        }
        for err in &report.parse_errors {
            writeln!(f, "{err}")?;
        }

        let totals = report.totals();
        writeln!(
            f,
            "total: {} passed, {} failed, {} errored, {} skipped ({} parse error(s), {} file(s) skipped)",
            totals.passed,
            totals.failed,
            totals.errored,
            totals.skipped,
            report.parse_errors.len(),
            report.skipped_files.len()
        )?;

        for (i, outcome) in report.failures.iter().take(report.max_diffs).enumerate() {
            let err = match &outcome.status {
                RecordStatus::Failed(err) | RecordStatus::Error(err) => err,
                _ => continue,
            };
            writeln!(f, "\nfailure {} [backend {}]", i + 1, outcome.backend)?;
            writeln!(f, "{}", err.display(self.colorize))?;
        }
        let hidden = report.failures.len().saturating_sub(report.max_diffs);
        if hidden > 0 {
            writeln!(f, "\n... and {hidden} more failure(s)")?;
        }
        Ok(())
    }
}
