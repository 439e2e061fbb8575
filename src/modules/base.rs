use std::path::Path;

/// Whether generated names may contain literal spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpacesPolicy {
    Allow,
    Deny,
    /// Copy the original filename's usage.
    Infer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStyle {
    Lower,
    Upper,
    Title,
    Sentence,
    /// Lowercase only when the original name has no uppercase letters.
    Infer,
}

/// Style preferences applied to every generated name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenameOptions {
    /// Prepend the capture date when the original name does not carry one.
    pub add_dates: bool,
    pub spaces: SpacesPolicy,
    pub case_style: CaseStyle,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            add_dates: false,
            spaces: SpacesPolicy::Allow,
            case_style: CaseStyle::Sentence,
        }
    }
}

impl RenameOptions {
    /// Resolve the spaces policy against the file being renamed.
    pub fn allows_spaces(&self, original_name: &str) -> bool {
        match self.spaces {
            SpacesPolicy::Allow => true,
            SpacesPolicy::Deny => false,
            SpacesPolicy::Infer => original_name.chars().any(char::is_whitespace),
        }
    }

    /// Separator placed between a date prefix and the description.
    pub fn separator(&self, original_name: &str) -> char {
        if self.allows_spaces(original_name) {
            ' '
        } else {
            '-'
        }
    }
}

pub const MAX_JOBS: usize = 20;
pub const DEFAULT_JOBS: usize = 10;

/// Run-level switches that are not about the shape of the new name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    pub dry_run: bool,
    /// Skip the needs-rename filter and process every recognized image.
    pub process_all: bool,
    pub recursive: bool,
    pub concurrency: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            process_all: false,
            recursive: false,
            concurrency: DEFAULT_JOBS,
        }
    }
}

impl JobOptions {
    pub fn with_concurrency(mut self, jobs: usize) -> Self {
        self.concurrency = jobs.clamp(1, MAX_JOBS);
        self
    }
}

/// File name of a path as a `String`, empty when the path has none.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_spaces_follows_original_name() {
        let options = RenameOptions {
            spaces: SpacesPolicy::Infer,
            ..RenameOptions::default()
        };
        assert!(options.allows_spaces("Screenshot 2024-01-01.png"));
        assert!(!options.allows_spaces("IMG_1234.jpg"));
        assert_eq!(options.separator("IMG_1234.jpg"), '-');
    }

    #[test]
    fn concurrency_is_clamped() {
        assert_eq!(JobOptions::default().with_concurrency(0).concurrency, 1);
        assert_eq!(JobOptions::default().with_concurrency(64).concurrency, MAX_JOBS);
        assert_eq!(JobOptions::default().with_concurrency(4).concurrency, 4);
    }
}
