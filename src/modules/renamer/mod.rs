//! The rename pipeline: scan, describe, name, rename.

pub mod naming;

use chrono::NaiveDate;
use console::style;
use indicatif::ProgressBar;
use log::{debug, error, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;

use crate::modules::base::{file_name_of, JobOptions, RenameOptions};
use crate::modules::generator::{
    prompt_for_attempt, ConfigError, DescriptionGenerator, EncodedImage, GenerateError, MIME_JPEG,
    MIME_PNG, MIME_WEBP,
};
use crate::modules::image_loader::{load_for_upload, ImageLoadError};
use crate::modules::metadata::read_capture_date;
use crate::modules::rate_limiter::RateLimiter;
use crate::modules::scanner::{CandidateScanner, EmptyDirectory, ScanItem};
use crate::utils::{CancelToken, Progress};
use naming::{compose_filename, date_prefix, fits_length_budget};

/// Attempts at a name that fits before giving up on a file.
pub const MAX_NAME_ATTEMPTS: usize = 3;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A successful (or, in a dry run, planned) rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub original: PathBuf,
    pub new_name: String,
    pub dry_run: bool,
}

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("generated filename too long after {0} attempts")]
    TooLong(usize),
    #[error("target already exists: {}", .0.display())]
    TargetExists(PathBuf),
    #[error("model returned no usable description")]
    EmptyDescription,
    #[error(transparent)]
    Load(#[from] ImageLoadError),
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error("cannot rename {} to {}: {source}", .from.display(), .to.display())]
    Io {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("worker failed: {0}")]
    Worker(#[from] JoinError),
    #[error("cancelled")]
    Cancelled,
}

impl RenameError {
    /// Skips leave the file alone for a reason the user can act on.
    pub fn is_skip(&self) -> bool {
        matches!(self, RenameError::TooLong(_) | RenameError::TargetExists(_))
    }
}

pub type RenameResult = Result<Renamed, RenameError>;

#[derive(Debug, Default)]
pub struct RunSummary {
    pub renamed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub empty_directories: Vec<EmptyDirectory>,
}

impl RunSummary {
    fn record(&mut self, result: &RenameResult) {
        match result {
            Ok(_) => self.renamed += 1,
            Err(RenameError::Cancelled) => self.cancelled += 1,
            Err(e) if e.is_skip() => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }

    fn record_joined(&mut self, joined: Result<RenameResult, JoinError>) {
        match joined {
            Ok(result) => self.record(&result),
            Err(e) => {
                error!("Rename task failed: {}", e);
                self.failed += 1;
            }
        }
    }

    /// Whether every candidate was renamed (or would be, in a dry run).
    pub fn is_clean(&self) -> bool {
        self.skipped == 0 && self.failed == 0 && self.cancelled == 0
    }
}

/// Drives one run over a set of input paths.
pub struct Renamer {
    generators: Vec<Arc<dyn DescriptionGenerator>>,
    /// Image types every configured generator accepts.
    accepted: Vec<&'static str>,
    job: JobOptions,
    rename: RenameOptions,
    limiter: RateLimiter,
    progress: Progress,
    cancel: CancelToken,
    rename_lock: Mutex<()>,
}

impl Renamer {
    pub fn new(
        generators: Vec<Arc<dyn DescriptionGenerator>>,
        job: JobOptions,
        rename: RenameOptions,
        cancel: CancelToken,
    ) -> Result<Self, ConfigError> {
        if generators.is_empty() {
            return Err(ConfigError::NoModels);
        }
        let accepted: Vec<&'static str> = [MIME_JPEG, MIME_PNG, MIME_WEBP]
            .into_iter()
            .filter(|mime| generators.iter().all(|g| g.attachment_types().contains(mime)))
            .collect();
        if accepted.is_empty() {
            let names: Vec<&str> = generators.iter().map(|g| g.name()).collect();
            return Err(ConfigError::NoImageSupport(names.join(", ")));
        }

        Ok(Self {
            generators,
            accepted,
            job,
            rename,
            limiter: RateLimiter::new(),
            progress: Progress::hidden(cancel.clone()),
            cancel,
            rename_lock: Mutex::new(()),
        })
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Process every candidate under `paths`, at most `concurrency` at a time.
    pub async fn run(self: Arc<Self>, paths: Vec<PathBuf>) -> RunSummary {
        let (tx, mut rx) = mpsc::channel(self.job.concurrency * 2);
        let scanner = CandidateScanner::new(paths, &self.job);
        let cancel = self.cancel.clone();
        let producer = tokio::task::spawn_blocking(move || {
            for item in scanner {
                if cancel.is_cancelled() || tx.blocking_send(item).is_err() {
                    break;
                }
            }
        });

        let gate = Arc::new(Semaphore::new(self.job.concurrency));
        let mut tasks = JoinSet::new();
        let mut summary = RunSummary::default();

        while let Some(item) = rx.recv().await {
            match item {
                ScanItem::EmptyDirectory(empty) => summary.empty_directories.push(empty),
                ScanItem::Candidate(path) => {
                    let Ok(permit) = Arc::clone(&gate).acquire_owned().await else {
                        break;
                    };
                    let renamer = Arc::clone(&self);
                    tasks.spawn(async move {
                        let result = renamer.process(path).await;
                        drop(permit);
                        result
                    });
                }
            }
            while let Some(joined) = tasks.try_join_next() {
                summary.record_joined(joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            summary.record_joined(joined);
        }
        if let Err(e) = producer.await {
            error!("Scanner failed: {}", e);
        }
        self.progress.done();
        summary
    }

    async fn process(&self, path: PathBuf) -> RenameResult {
        self.checkpoint()?;
        let name = file_name_of(&path);
        let bar = self.progress.start(&name);
        let result = self.rename_one(&path, &name, &bar).await;
        self.progress.finish(&bar);
        self.report(&path, &name, &result);
        result
    }

    async fn rename_one(&self, path: &Path, name: &str, bar: &ProgressBar) -> RenameResult {
        let image = self.load(path).await?;
        let date = self.capture_date(path, name).await;
        let new_name = self.generate_name(name, &image, date, bar).await?;
        self.checkpoint()?;
        self.commit(path, new_name)
    }

    async fn load(&self, path: &Path) -> Result<EncodedImage, RenameError> {
        let path = path.to_path_buf();
        let accepted = self.accepted.clone();
        let image = tokio::task::spawn_blocking(move || load_for_upload(&path, &accepted)).await??;
        Ok(image)
    }

    /// Date for the prefix. Metadata is only read when dates were requested
    /// and the name has none of its own.
    async fn capture_date(&self, path: &Path, name: &str) -> Option<NaiveDate> {
        let from_name = date_prefix(name, None);
        if from_name.is_some() || !self.rename.add_dates {
            return from_name;
        }
        let path = path.to_path_buf();
        match tokio::task::spawn_blocking(move || read_capture_date(&path)).await {
            Ok(date) => date_prefix(name, date),
            Err(e) => {
                warn!("Metadata read failed for {}: {}", name, e);
                None
            }
        }
    }

    /// Ask the generators for a description until one yields a name that fits.
    ///
    /// Each attempt tries the generators in order with a terser prompt than
    /// the last.
    async fn generate_name(
        &self,
        name: &str,
        image: &EncodedImage,
        date: Option<NaiveDate>,
        bar: &ProgressBar,
    ) -> Result<String, RenameError> {
        let mut too_long = false;
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let prompt = prompt_for_attempt(attempt);
            let mut last_error = None;
            let mut answered = false;

            for generator in &self.generators {
                let description = match self.request(generator.as_ref(), image, &prompt, bar).await {
                    Ok(description) => description,
                    Err(RenameError::Cancelled) => return Err(RenameError::Cancelled),
                    Err(e) => {
                        warn!("{} failed on {}: {}", generator.name(), name, e);
                        last_error = Some(e);
                        continue;
                    }
                };
                answered = true;

                match compose_filename(name, &description, date, &self.rename) {
                    Some(new_name) if fits_length_budget(&new_name) => return Ok(new_name),
                    Some(new_name) => {
                        debug!(
                            "Attempt {} for {}: {} bytes is too long",
                            attempt + 1,
                            name,
                            new_name.len()
                        );
                        too_long = true;
                    }
                    None => debug!("Attempt {} for {}: empty description", attempt + 1, name),
                }
            }

            if !answered {
                return Err(last_error.unwrap_or(RenameError::EmptyDescription));
            }
        }

        if too_long {
            Err(RenameError::TooLong(MAX_NAME_ATTEMPTS))
        } else {
            Err(RenameError::EmptyDescription)
        }
    }

    /// One generator call. Rate-limit responses are retried after backoff for
    /// as long as the run is not cancelled.
    async fn request(
        &self,
        generator: &dyn DescriptionGenerator,
        image: &EncodedImage,
        prompt: &str,
        bar: &ProgressBar,
    ) -> Result<String, RenameError> {
        loop {
            self.checkpoint()?;
            tokio::select! {
                _ = self.limiter.before_request() => {}
                _ = self.cancel.cancelled() => return Err(RenameError::Cancelled),
            }

            match timeout(REQUEST_TIMEOUT, generator.generate(image, prompt)).await {
                Ok(Ok(description)) => {
                    self.limiter.on_success().await;
                    return Ok(description);
                }
                Ok(Err(e)) if e.is_rate_limit() => {
                    let backoff = self.limiter.on_rate_limit().await;
                    debug!("{} rate limited: {}", generator.name(), e);
                    self.progress.update(
                        bar,
                        format!("Rate limited, waiting {:.1}s...", backoff.as_secs_f64()),
                    );
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(GenerateError::Timeout(REQUEST_TIMEOUT).into()),
            }
        }
    }

    fn commit(&self, path: &Path, new_name: String) -> RenameResult {
        let target = path.with_file_name(&new_name);
        let renamed = Renamed {
            original: path.to_path_buf(),
            new_name,
            dry_run: self.job.dry_run,
        };
        if self.job.dry_run || target == path {
            return Ok(renamed);
        }

        // Held across the check and the rename so two tasks cannot claim
        // the same target.
        let _guard = self
            .rename_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if fs::symlink_metadata(&target).is_ok() {
            return Err(RenameError::TargetExists(target));
        }
        fs::rename(path, &target).map_err(|source| RenameError::Io {
            from: path.to_path_buf(),
            to: target.clone(),
            source,
        })?;
        Ok(renamed)
    }

    fn checkpoint(&self) -> Result<(), RenameError> {
        if self.cancel.is_cancelled() {
            Err(RenameError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn report(&self, path: &Path, name: &str, result: &RenameResult) {
        match result {
            Ok(renamed) => {
                let verb = if renamed.dry_run { "Would rename" } else { "Renamed" };
                self.progress.println(format!(
                    "{} {} → {}",
                    style(verb).green(),
                    name,
                    renamed.new_name
                ));
            }
            Err(RenameError::Cancelled) => {}
            Err(e) if e.is_skip() => {
                debug!("Skipped {}: {}", path.display(), e);
                self.progress
                    .println(style(format!("Skipped {}: {}", path.display(), e)).yellow().to_string());
            }
            Err(e) => {
                debug!("Error processing {}: {}", path.display(), e);
                self.progress
                    .println(style(format!("Error processing {}: {}", path.display(), e)).red().to_string());
            }
        }
    }
}
