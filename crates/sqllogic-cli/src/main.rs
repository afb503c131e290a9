use std::collections::HashSet;
use std::path::PathBuf;

use clap::Parser;

mod config;

use config::BackendsFile;
use sqllogic::{ParseErrorPolicy, RunOptions, Runner};

#[derive(Parser, Debug)]
#[command(name = "sqllogic")]
#[command(version = "0.1.0")]
#[command(about = "Run SQL logic-test fixture suites against configured backends")]
#[command(long_about = "sqllogic - cross-handler SQL logic-test runner

Executes every *.test fixture under the suite root against each backend in
the configuration file, compares normalized results (shared or per-label
expected blocks), and prints a per-file and aggregate report.

EXAMPLES:
  # Run all suites against the configured backends
  sqllogic tests/suites --config backends.toml

  # One suite only, skipping known-broken files
  sqllogic tests/suites --config backends.toml --filter retention \\
      --skip-list skip.txt

  # Keep going past files that fail to parse
  sqllogic tests/suites --config backends.toml --on-parse-error skip

The process exits 0 when every record passed and non-zero otherwise.")]
struct Args {
    /// Directory containing the fixture files (searched recursively)
    #[arg(value_name = "ROOT")]
    root: PathBuf,

    /// Backend configuration file (TOML with [[backend]] tables)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// File listing fixtures to skip, one identifier per line
    #[arg(long, value_name = "FILE")]
    skip_list: Option<PathBuf>,

    /// Run only the fixture with this file name or stem
    #[arg(long, value_name = "NAME")]
    filter: Option<String>,

    /// Per-record execution timeout
    #[arg(long, value_name = "DURATION", default_value = "30s")]
    timeout: humantime::Duration,

    /// What to do when a fixture file fails to parse
    #[arg(long, value_enum, default_value_t = OnParseError::Abort)]
    on_parse_error: OnParseError,

    /// How many failing diffs to print in full
    #[arg(long, value_name = "N", default_value_t = 10)]
    max_diffs: usize,

    /// Disable colored diff output
    #[arg(long)]
    no_color: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OnParseError {
    /// Stop the whole run at the first parse error
    Abort,
    /// Record the parse error and continue with the next file
    Skip,
}

impl From<OnParseError> for ParseErrorPolicy {
    fn from(value: OnParseError) -> Self {
        match value {
            OnParseError::Abort => ParseErrorPolicy::Abort,
            OnParseError::Skip => ParseErrorPolicy::Skip,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let backends = BackendsFile::load(&args.config)?;
    let skip_list = match &args.skip_list {
        Some(path) => config::load_skip_list(path)?,
        None => HashSet::new(),
    };

    let mut options = RunOptions::new(&args.root);
    options.filter = args.filter.clone();
    options.skip_list = skip_list;
    options.timeout = args.timeout.into();
    options.parse_error_policy = args.on_parse_error.into();
    options.max_diffs = args.max_diffs;

    let runner = Runner::new(options, backends)?;
    let report = runner.run().await?;

    let colorize = !args.no_color && atty::is(atty::Stream::Stdout);
    print!("{}", report.display(colorize));

    if !report.success() {
        std::process::exit(1);
    }
    Ok(())
}
