//! Suite discovery and orchestration across backends.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::executor::{BackendExecutor, RecordOutcome, RecordStatus};
use crate::handlers::BackendConfig;
use crate::parser::{parse_file, validate_labels, Location, Record};
use crate::report::Report;
use crate::error_handling::TestErrorKind;
use crate::DefaultColumnType;

/// What to do when a fixture file fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorPolicy {
    /// Stop the whole run at the first parse error.
    Abort,
    /// Record the parse error and continue with the next file.
    Skip,
}

/// Options of one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory containing the fixture files (searched recursively for
    /// `*.test`).
    pub root: PathBuf,
    /// Run only the fixture whose file name or stem matches.
    pub filter: Option<String>,
    /// Fixture identifiers to exclude: file name, stem, or root-relative
    /// path.
    pub skip_list: HashSet<String>,
    /// Per-record execution timeout.
    pub timeout: Duration,
    pub parse_error_policy: ParseErrorPolicy,
    /// How many failing diffs the report prints in full.
    pub max_diffs: usize,
}

impl RunOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            filter: None,
            skip_list: HashSet::new(),
            timeout: Duration::from_secs(30),
            parse_error_policy: ParseErrorPolicy::Abort,
            max_diffs: 10,
        }
    }
}

/// One parsed fixture file.
#[derive(Debug, Clone)]
pub struct Suite {
    /// Root-relative identifier used in the report.
    pub name: String,
    pub path: PathBuf,
    pub records: Vec<Record<DefaultColumnType>>,
}

/// The error type for setting a run up. Errors inside the run (parse,
/// connection, execution) land in the [`Report`] instead.
#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    #[error("invalid suite root {root}: {message}")]
    Discover { root: String, message: String },
    #[error("duplicate backend label {0:?}")]
    DuplicateLabel(String),
    #[error("no backends configured")]
    NoBackends,
}

/// Discovers fixture files, fans suites out to every configured backend, and
/// aggregates a [`Report`].
#[derive(Debug)]
pub struct Runner {
    options: RunOptions,
    backends: Vec<BackendConfig>,
}

impl Runner {
    pub fn new(options: RunOptions, backends: Vec<BackendConfig>) -> Result<Self, RunnerError> {
        if backends.is_empty() {
            return Err(RunnerError::NoBackends);
        }
        let mut labels = HashSet::new();
        for backend in &backends {
            if !labels.insert(backend.label.clone()) {
                return Err(RunnerError::DuplicateLabel(backend.label.clone()));
            }
        }
        Ok(Self { options, backends })
    }

    /// Discover fixture files under the root, sorted, with the single-file
    /// filter applied. Skip-listed files are kept here; the run records them
    /// as skipped.
    pub fn discover(&self) -> Result<Vec<PathBuf>, RunnerError> {
        let pattern = self.options.root.join("**").join("*.test");
        let pattern = pattern.to_string_lossy().into_owned();
        let paths = glob::glob(&pattern).map_err(|e| RunnerError::Discover {
            root: self.options.root.display().to_string(),
            message: e.to_string(),
        })?;

        let mut files: Vec<PathBuf> = vec![];
        for path in paths {
            let path = path.map_err(|e| RunnerError::Discover {
                root: self.options.root.display().to_string(),
                message: e.to_string(),
            })?;
            if let Some(filter) = &self.options.filter {
                if !matches_name(&path, filter) {
                    continue;
                }
            }
            files.push(path);
        }
        files.sort();
        Ok(files)
    }

    /// Run every discovered suite against every configured backend.
    pub async fn run(&self) -> Result<Report, RunnerError> {
        let mut report = Report::new(self.options.max_diffs);
        let suites = self.load_suites(&mut report)?;
        if suites.is_empty() {
            tracing::info!(root = %self.options.root.display(), "no fixture files to run");
            return Ok(report);
        }

        tracing::info!(suites = suites.len(), backends = self.backends.len(), "starting run");

        let suites = Arc::new(suites);
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel::<RecordOutcome>();

        for config in &self.backends {
            let config = config.clone();
            let suites = Arc::clone(&suites);
            let cancel = Arc::clone(&cancel);
            let tx = tx.clone();
            let timeout = self.options.timeout;
            tokio::spawn(async move {
                match BackendExecutor::connect(config.clone(), timeout).await {
                    Ok(executor) => run_backend_worker(executor, suites, tx, cancel).await,
                    Err(err) => {
                        tracing::error!(label = %config.label, error = %err, "backend unreachable at startup");
                        for suite in suites.iter() {
                            let outcome = RecordOutcome {
                                loc: Location::new(suite.name.clone(), 0),
                                backend: config.label.clone(),
                                status: RecordStatus::Error(
                                    TestErrorKind::ConnectionLost { message: err.to_string() }
                                        .at(Location::new(suite.name.clone(), 0)),
                                ),
                            };
                            if tx.send(outcome).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
        drop(tx);

        // Single aggregation point: one writer mutates the report.
        {
            let drain = async {
                while let Some(outcome) = rx.recv().await {
                    report.record(outcome);
                }
            };
            tokio::pin!(drain);

            let mut interrupted = false;
            tokio::select! {
                _ = &mut drain => {}
                _ = tokio::signal::ctrl_c() => {
                    interrupted = true;
                }
            }
            if interrupted {
                tracing::warn!("interrupt received, closing backend connections");
                cancel.store(true, Ordering::Relaxed);
                // Workers observe the flag between records, close their
                // connections, and drop their senders, ending the drain.
                drain.as_mut().await;
            }
        }

        Ok(report)
    }

    /// Parse every discovered file into a suite, honoring the skip list and
    /// the parse error policy.
    fn load_suites(&self, report: &mut Report) -> Result<Vec<Suite>, RunnerError> {
        let declared: HashSet<String> =
            self.backends.iter().map(|b| b.label.clone()).collect();

        let mut suites = vec![];
        for path in self.discover()? {
            let name = self.suite_name(&path);
            if self.is_skip_listed(&path, &name) {
                tracing::info!(suite = %name, "on skip list");
                report.record_skipped_file(name);
                continue;
            }
            let parsed = parse_file::<DefaultColumnType>(&path)
                .and_then(|records| validate_labels(&records, &declared).map(|()| records));
            match parsed {
                Ok(records) => suites.push(Suite { name, path, records }),
                Err(err) => {
                    tracing::error!(suite = %name, error = %err, "fixture failed to parse");
                    report.record_parse_error(err);
                    if self.options.parse_error_policy == ParseErrorPolicy::Abort {
                        break;
                    }
                }
            }
        }
        Ok(suites)
    }

    fn suite_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.options.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    fn is_skip_listed(&self, path: &Path, name: &str) -> bool {
        let skip = &self.options.skip_list;
        if skip.contains(name) {
            return true;
        }
        let file_name = path.file_name().map(|s| s.to_string_lossy());
        if file_name.is_some_and(|n| skip.contains(n.as_ref())) {
            return true;
        }
        let stem = path.file_stem().map(|s| s.to_string_lossy());
        stem.is_some_and(|s| skip.contains(s.as_ref()))
    }
}

/// Check a path against a `--filter` argument by file name or stem.
fn matches_name(path: &Path, filter: &str) -> bool {
    let by_name = path.file_name().is_some_and(|n| n.to_string_lossy() == filter);
    let by_stem = path.file_stem().is_some_and(|s| s.to_string_lossy() == filter);
    by_name || by_stem
}

/// Execute every suite's records on one backend, strictly sequentially on
/// its one connection, and stream the outcomes to the aggregator.
async fn run_backend_worker(
    mut executor: BackendExecutor,
    suites: Arc<Vec<Suite>>,
    tx: mpsc::UnboundedSender<RecordOutcome>,
    cancel: Arc<AtomicBool>,
) {
    'suites: for suite in suites.iter() {
        tracing::debug!(backend = %executor.label(), suite = %suite.name, "running suite");
        for record in &suite.records {
            if cancel.load(Ordering::Relaxed) {
                tracing::debug!(backend = %executor.label(), "cancelled");
                break 'suites;
            }
            if let Some(outcome) = executor.run_record(record).await {
                if tx.send(outcome).is_err() {
                    break 'suites;
                }
            }
        }
    }
    executor.shutdown().await;
}
