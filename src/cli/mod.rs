use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use console::{style, Term};
use log::{debug, info, LevelFilter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::modules::base::{
    CaseStyle, JobOptions, RenameOptions, SpacesPolicy, DEFAULT_JOBS, MAX_JOBS,
};
use crate::modules::generator::{build_generators, DEFAULT_MODEL};
use crate::modules::renamer::{Renamer, RunSummary};
use crate::utils::{get_directory_from_user, CancelToken, Progress};

/// Ignored files listed per empty directory before the rest are elided.
const MAX_LISTED_IGNORED: usize = 10;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Give camera and screenshot images descriptive filenames using a vision model",
    long_about = None
)]
pub struct Cli {
    /// Image files or directories to process
    paths: Vec<PathBuf>,

    /// Process every image, not just ones with generic names
    #[arg(short, long)]
    all: bool,

    /// Print the new names without renaming anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Prefix names with the capture date from image metadata
    #[arg(long)]
    add_dates: bool,

    /// Allow spaces in new names (default)
    #[arg(long, overrides_with_all = ["no_spaces", "infer_spaces"])]
    allow_spaces: bool,

    /// Use hyphens instead of spaces
    #[arg(long, overrides_with_all = ["allow_spaces", "infer_spaces"])]
    no_spaces: bool,

    /// Use spaces only where the original name has them
    #[arg(long, overrides_with_all = ["allow_spaces", "no_spaces"])]
    infer_spaces: bool,

    /// Letter case of new names
    #[arg(long, value_enum, default_value_t = CaseArg::Sentence)]
    case: CaseArg,

    /// Number of images processed at once
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_JOBS as u16,
        value_parser = clap::value_parser!(u16).range(1..=MAX_JOBS as i64)
    )]
    jobs: u16,

    /// Vision model to use; repeat to add fallbacks, tried in order
    #[arg(long = "model", default_value = DEFAULT_MODEL)]
    models: Vec<String>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CaseArg {
    Upper,
    Lower,
    Sentence,
    Title,
    Infer,
}

impl From<CaseArg> for CaseStyle {
    fn from(case: CaseArg) -> Self {
        match case {
            CaseArg::Upper => CaseStyle::Upper,
            CaseArg::Lower => CaseStyle::Lower,
            CaseArg::Sentence => CaseStyle::Sentence,
            CaseArg::Title => CaseStyle::Title,
            CaseArg::Infer => CaseStyle::Infer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Error | LogLevel::Critical => LevelFilter::Error,
        }
    }
}

impl Cli {
    pub fn new() -> Result<Self> {
        Ok(Self::parse())
    }

    pub async fn run(self) -> Result<ExitCode> {
        init_logging(self.log_level.into());

        // Credentials are checked before any file is touched.
        let generators = build_generators(&self.models).context("Invalid model configuration")?;

        let mut paths = self.paths.clone();
        if paths.is_empty() {
            if !Term::stdout().is_term() {
                println!("No files to process");
                return Ok(ExitCode::SUCCESS);
            }
            paths.push(get_directory_from_user("Enter directory path")?);
        }

        let cancel = CancelToken::new();
        watch_interrupts(cancel.clone());

        let renamer = Renamer::new(generators, self.job_options(), self.rename_options(), cancel.clone())
            .context("Invalid model configuration")?
            .with_progress(Progress::new(cancel.clone()));

        info!("Processing {} input path(s)", paths.len());
        let summary = Arc::new(renamer).run(paths).await;
        debug!("{:?}", summary);

        if !cancel.is_cancelled() {
            print_summary(&summary);
        }

        Ok(if summary.is_clean() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    fn job_options(&self) -> JobOptions {
        JobOptions {
            dry_run: self.dry_run,
            process_all: self.all,
            recursive: self.recursive,
            ..JobOptions::default()
        }
        .with_concurrency(self.jobs as usize)
    }

    fn rename_options(&self) -> RenameOptions {
        let spaces = if self.no_spaces {
            SpacesPolicy::Deny
        } else if self.infer_spaces {
            SpacesPolicy::Infer
        } else {
            SpacesPolicy::Allow
        };
        RenameOptions {
            add_dates: self.add_dates,
            spaces,
            case_style: self.case.into(),
        }
    }
}

/// `RUST_LOG` wins when set. Otherwise only this crate logs below warn.
fn init_logging(level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    if std::env::var_os("RUST_LOG").is_some() {
        builder.parse_default_env();
    } else if level >= LevelFilter::Debug {
        builder.filter_level(level);
    } else {
        builder
            .filter_level(level.min(LevelFilter::Warn))
            .filter_module(env!("CARGO_CRATE_NAME"), level);
    }
    // A second init only happens in tests.
    let _ = builder.try_init();
}

/// First Ctrl-C cancels the run; the second exits at once.
fn watch_interrupts(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        cancel.cancel();
        eprintln!("{}", style("Cancelling... press Ctrl-C again to exit immediately").yellow());
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn print_summary(summary: &RunSummary) {
    for line in summary_lines(summary) {
        println!("{line}");
    }
}

/// End-of-run report, one entry per output line.
fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let mut lines = Vec::new();
    for empty in &summary.empty_directories {
        lines.push(
            style(format!("No files needing rename in {}", empty.path.display()))
                .yellow()
                .to_string(),
        );
        if empty.ignored_files.is_empty() {
            continue;
        }
        lines.push(format!("  Ignored {} image file(s):", empty.ignored_files.len()));
        for file in empty.ignored_files.iter().take(MAX_LISTED_IGNORED) {
            lines.push(format!("    {}", file.display()));
        }
        if empty.ignored_files.len() > MAX_LISTED_IGNORED {
            lines.push(format!(
                "    ... and {} more",
                empty.ignored_files.len() - MAX_LISTED_IGNORED
            ));
        }
    }
    if summary
        .empty_directories
        .iter()
        .any(|empty| !empty.ignored_files.is_empty())
    {
        lines.push(style("Run with --all to process these files").dim().to_string());
    }

    if summary.renamed + summary.skipped + summary.failed + summary.cancelled > 0 {
        lines.push(format!(
            "{} renamed, {} skipped, {} failed",
            style(summary.renamed).green(),
            style(summary.skipped).yellow(),
            style(summary.failed).red()
        ));
    }
    lines
}
