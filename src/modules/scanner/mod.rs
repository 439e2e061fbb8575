use log::{debug, warn};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::modules::base::{file_name_of, JobOptions};
use crate::modules::classifier::needs_rename;
use crate::utils::is_image_file;

/// A directory that produced no candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyDirectory {
    pub path: PathBuf,
    /// Image files that were present but filtered out.
    pub ignored_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    Candidate(PathBuf),
    EmptyDirectory(EmptyDirectory),
}

/// Lazily walks the input paths and yields rename candidates.
///
/// Each directory is listed only when the walk reaches it. Within a directory,
/// eligible files come first (sorted), then subdirectories in sorted order.
pub struct CandidateScanner {
    inputs: VecDeque<PathBuf>,
    stack: Vec<DirFrame>,
    /// Canonical paths of directories already listed; guards symlink loops.
    visited: HashSet<PathBuf>,
    process_all: bool,
    recursive: bool,
}

struct DirFrame {
    path: PathBuf,
    eligible: VecDeque<PathBuf>,
    subdirs: VecDeque<PathBuf>,
    ignored: Vec<PathBuf>,
    found: bool,
    report_empty: bool,
}

impl CandidateScanner {
    pub fn new(inputs: Vec<PathBuf>, options: &JobOptions) -> Self {
        Self {
            inputs: inputs.into(),
            stack: Vec::new(),
            visited: HashSet::new(),
            process_all: options.process_all,
            recursive: options.recursive,
        }
    }

    fn is_eligible(&self, path: &Path) -> bool {
        is_image_file(path) && (self.process_all || needs_rename(&file_name_of(path)))
    }

    fn open_dir(&self, path: PathBuf, report_empty: bool) -> DirFrame {
        let mut eligible = VecDeque::new();
        let mut subdirs = VecDeque::new();
        let mut ignored = Vec::new();

        let entries = WalkDir::new(&path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read {}: {}", path.display(), e);
                    continue;
                }
            };
            // Follows symlinks; loops are caught by `first_visit`.
            let is_dir = entry.path().is_dir();
            let entry_path = entry.into_path();
            if is_dir {
                if self.recursive && !file_name_of(&entry_path).starts_with('.') {
                    subdirs.push_back(entry_path);
                }
            } else if is_image_file(&entry_path) {
                if self.is_eligible(&entry_path) {
                    eligible.push_back(entry_path);
                } else {
                    ignored.push(entry_path);
                }
            }
        }

        debug!(
            "Listed {}: {} eligible, {} ignored, {} subdirectories",
            path.display(),
            eligible.len(),
            ignored.len(),
            subdirs.len()
        );

        DirFrame {
            path,
            eligible,
            subdirs,
            ignored,
            found: false,
            report_empty,
        }
    }

    fn first_visit(&mut self, dir: &Path) -> bool {
        match dir.canonicalize() {
            Ok(real) => self.visited.insert(real),
            Err(e) => {
                warn!("Cannot resolve {}: {}", dir.display(), e);
                false
            }
        }
    }

    fn next_input(&mut self) -> Option<Option<ScanItem>> {
        let input = self.inputs.pop_front()?;

        if !input.exists() {
            warn!("File not found: {}", input.display());
            return Some(None);
        }
        if input.is_dir() {
            if !self.first_visit(&input) {
                debug!("Already scanned {}", input.display());
                return Some(None);
            }
            let frame = self.open_dir(input, true);
            self.stack.push(frame);
            return Some(None);
        }
        if !is_image_file(&input) {
            warn!("Not an image file: {}", input.display());
            return Some(None);
        }
        if !self.is_eligible(&input) {
            debug!("Skipping {}: name does not need renaming", input.display());
            return Some(None);
        }
        Some(Some(ScanItem::Candidate(input)))
    }
}

impl Iterator for CandidateScanner {
    type Item = ScanItem;

    fn next(&mut self) -> Option<ScanItem> {
        loop {
            match self.stack.last_mut() {
                Some(frame) => {
                    if let Some(file) = frame.eligible.pop_front() {
                        frame.found = true;
                        return Some(ScanItem::Candidate(file));
                    }
                    if let Some(subdir) = frame.subdirs.pop_front() {
                        if !self.first_visit(&subdir) {
                            debug!("Already scanned {}", subdir.display());
                            continue;
                        }
                        let child = self.open_dir(subdir, false);
                        self.stack.push(child);
                        continue;
                    }
                }
                None => match self.next_input()? {
                    Some(item) => return Some(item),
                    None => continue,
                },
            }

            let Some(done) = self.stack.pop() else {
                continue;
            };
            if let Some(parent) = self.stack.last_mut() {
                parent.found |= done.found;
            }
            if !done.found && done.report_empty {
                return Some(ScanItem::EmptyDirectory(EmptyDirectory {
                    path: done.path,
                    ignored_files: done.ignored,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap();
        path
    }

    fn candidates(items: &[ScanItem]) -> Vec<PathBuf> {
        items
            .iter()
            .filter_map(|item| match item {
                ScanItem::Candidate(path) => Some(path.clone()),
                ScanItem::EmptyDirectory(_) => None,
            })
            .collect()
    }

    #[test]
    fn yields_only_names_that_need_renaming() {
        let dir = tempdir().unwrap();
        let camera = touch(dir.path(), "IMG_0001.jpg");
        let shot = touch(dir.path(), "Screenshot 2024-01-01.png");
        touch(dir.path(), "sunset-over-bridge.jpg");
        touch(dir.path(), "IMG_0002.txt");

        let items: Vec<_> =
            CandidateScanner::new(vec![dir.path().to_path_buf()], &JobOptions::default()).collect();

        assert_eq!(candidates(&items), vec![camera, shot]);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn directory_without_candidates_reports_ignored_files() {
        let dir = tempdir().unwrap();
        let a = touch(dir.path(), "beach.jpg");
        let b = touch(dir.path(), "mountains.png");
        touch(dir.path(), "notes.txt");

        let items: Vec<_> =
            CandidateScanner::new(vec![dir.path().to_path_buf()], &JobOptions::default()).collect();

        assert_eq!(
            items,
            vec![ScanItem::EmptyDirectory(EmptyDirectory {
                path: dir.path().to_path_buf(),
                ignored_files: vec![a, b],
            })]
        );
    }

    #[test]
    fn process_all_disables_the_filter() {
        let dir = tempdir().unwrap();
        let a = touch(dir.path(), "beach.jpg");
        let options = JobOptions {
            process_all: true,
            ..JobOptions::default()
        };

        let items: Vec<_> = CandidateScanner::new(vec![dir.path().to_path_buf()], &options).collect();

        assert_eq!(items, vec![ScanItem::Candidate(a)]);
    }

    #[test]
    fn recursion_puts_files_before_subdirectories_and_skips_dot_dirs() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a-nested");
        let hidden = dir.path().join(".cache");
        fs::create_dir(&nested).unwrap();
        fs::create_dir(&hidden).unwrap();
        let inner = touch(&nested, "IMG_0002.jpg");
        touch(&hidden, "IMG_0003.jpg");
        let outer = touch(dir.path(), "z-IMG.jpg");
        let top = touch(dir.path(), "IMG_0001.jpg");
        let options = JobOptions {
            recursive: true,
            ..JobOptions::default()
        };

        let items: Vec<_> = CandidateScanner::new(vec![dir.path().to_path_buf()], &options).collect();

        assert_eq!(candidates(&items), vec![top, inner]);
        assert!(!candidates(&items).contains(&outer));
    }

    #[test]
    fn without_recursion_subdirectories_are_ignored() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        touch(&nested, "IMG_0002.jpg");

        let items: Vec<_> =
            CandidateScanner::new(vec![dir.path().to_path_buf()], &JobOptions::default()).collect();

        assert_eq!(
            items,
            vec![ScanItem::EmptyDirectory(EmptyDirectory {
                path: dir.path().to_path_buf(),
                ignored_files: Vec::new(),
            })]
        );
    }

    #[test]
    fn nested_candidates_keep_parent_from_being_empty() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        let quiet = dir.path().join("quiet");
        fs::create_dir(&nested).unwrap();
        fs::create_dir(&quiet).unwrap();
        touch(dir.path(), "beach.jpg");
        touch(&quiet, "lake.jpg");
        let inner = touch(&nested, "IMG_0002.jpg");
        let options = JobOptions {
            recursive: true,
            ..JobOptions::default()
        };

        let items: Vec<_> = CandidateScanner::new(vec![dir.path().to_path_buf()], &options).collect();

        assert_eq!(items, vec![ScanItem::Candidate(inner)]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_followed_once() {
        let dir = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        let linked = touch(elsewhere.path(), "IMG_0005.jpg");
        std::os::unix::fs::symlink(elsewhere.path(), dir.path().join("album")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();
        let options = JobOptions {
            recursive: true,
            ..JobOptions::default()
        };

        let items: Vec<_> = CandidateScanner::new(vec![dir.path().to_path_buf()], &options).collect();

        assert_eq!(
            candidates(&items),
            vec![dir.path().join("album").join(file_name_of(&linked))]
        );
    }

    #[test]
    fn top_level_files_and_missing_paths() {
        let dir = tempdir().unwrap();
        let camera = touch(dir.path(), "IMG_0001.heic");
        let named = touch(dir.path(), "beach.jpg");
        let text = touch(dir.path(), "IMG_0002.txt");
        let missing = dir.path().join("IMG_9999.jpg");

        let items: Vec<_> = CandidateScanner::new(
            vec![missing, text, named, camera.clone()],
            &JobOptions::default(),
        )
        .collect();

        assert_eq!(items, vec![ScanItem::Candidate(camera)]);
    }
}
