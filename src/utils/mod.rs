mod progress;

pub use progress::Progress;

use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Input};
use indicatif::ProgressStyle;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "heic", "webp", "tiff", "tif",
];

pub const SPINNER_TICKS: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

pub fn is_heic(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("heic"))
        .unwrap_or(false)
}

pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .tick_chars(SPINNER_TICKS)
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn get_directory_from_user(prompt: &str) -> Result<PathBuf> {
    let path: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact_text()?;

    let path = PathBuf::from(path.trim());
    if !path.exists() {
        anyhow::bail!("Directory does not exist");
    }
    if !path.is_dir() {
        anyhow::bail!("Path is not a directory");
    }
    Ok(path)
}

/// Cooperative cancellation shared by every task of one run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            // Registered before the flag check so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
