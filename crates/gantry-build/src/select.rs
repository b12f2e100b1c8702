use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Directories whose contents never enter a build context, regardless of
/// git tracking state.
const ALWAYS_EXCLUDED_DIRS: &[&str] = &[".git", "__pycache__"];

/// Inputs for one source selection.
#[derive(Debug, Clone)]
pub struct SelectionSpec {
    root: PathBuf,
    include: Vec<PathBuf>,
    exclude: Vec<PathBuf>,
    ignore_git: bool,
}

impl SelectionSpec {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            ignore_git: false,
        }
    }

    pub fn include<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.include.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.exclude.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn ignore_git(mut self, ignore_git: bool) -> Self {
        self.ignore_git = ignore_git;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Ordered set of relative leaf-file paths selected for a build context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    files: Vec<PathBuf>,
}

impl FileSet {
    pub fn paths(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.files.iter().any(|p| p == path.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter()
    }
}

impl IntoIterator for FileSet {
    type Item = PathBuf;
    type IntoIter = std::vec::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// Compute the authoritative set of files to include in a build context.
///
/// The base candidate set is the git tracked-files list; when git is
/// unavailable (or `ignore_git` is set) a full deterministic scan of the
/// root is used instead. `exclude` then prunes paths, and `include` re-adds
/// paths from the filesystem, winning over both gitignore state and the
/// always-excluded directories' siblings.
pub fn select(spec: &SelectionSpec) -> Result<FileSet, SelectError> {
    let overlap: Vec<&PathBuf> = spec
        .include
        .iter()
        .filter(|p| spec.exclude.contains(p))
        .collect();
    if !overlap.is_empty() {
        let overlap: BTreeSet<String> = overlap
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        return Err(SelectError::IncludeExcludeOverlap {
            overlap: overlap.into_iter().collect(),
        });
    }

    let mut from_git = false;
    let candidates = if spec.ignore_git {
        scan_all(&spec.root, &spec.root)?
    } else {
        match git_tracked_files(&spec.root) {
            Ok(tracked) => {
                from_git = true;
                let dirty = git_dirty_paths(&spec.root);
                if !dirty.is_empty() {
                    tracing::warn!(
                        "git repository has uncommitted changes to {}; \
                         the build context is taken from the tracked snapshot",
                        dirty.join(", ")
                    );
                }
                tracked
            }
            Err(err) => {
                tracing::warn!(error = %err, "unable to get git tracked files, scanning directory");
                scan_all(&spec.root, &spec.root)?
            }
        }
    };

    let mut files: Vec<PathBuf> = candidates
        .into_iter()
        .filter(|p| !always_excluded(p))
        .filter(|p| !spec.exclude.iter().any(|ex| p == ex || p.starts_with(ex)))
        .collect();

    for inc in &spec.include {
        let absolute = spec.root.join(inc);
        if absolute.is_dir() {
            for p in scan_all(&absolute, &spec.root)? {
                if !always_excluded(&p) && !files.contains(&p) {
                    files.push(p);
                }
            }
        } else if absolute.is_file() && !files.contains(inc) {
            files.push(inc.clone());
        }
    }

    if files.is_empty() && from_git && spec.include.is_empty() {
        return Err(SelectError::UntrackedWorkspace);
    }

    Ok(FileSet { files })
}

/// Returns the list of files tracked by git in the given directory,
/// relative to it.
pub fn git_tracked_files(root: &Path) -> Result<Vec<PathBuf>, SelectError> {
    let output = Command::new("git")
        .arg("ls-files")
        .current_dir(root)
        .output()
        .map_err(|e| SelectError::GitCommand {
            detail: "failed to execute git ls-files".to_owned(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SelectError::GitFailed {
            detail: format!(
                "git ls-files exited with {}: {}",
                output.status,
                stderr.trim()
            ),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Paths reported changed by `git status --porcelain`, without their
/// two-letter status prefix. Lookup failures count as clean; selection
/// already has a tracked snapshot at this point.
pub fn git_dirty_paths(root: &Path) -> Vec<String> {
    let Ok(output) = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(root)
        .output()
    else {
        return Vec::new();
    };
    if !output.status.success() {
        return Vec::new();
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.get(3..))
        .filter(|path| !path.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Recursively list every file under `dir`, relative to `root`, in
/// deterministic (name-sorted) order. `.git/` and `__pycache__/` trees are
/// never descended into.
fn scan_all(dir: &Path, root: &Path) -> Result<Vec<PathBuf>, SelectError> {
    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| ALWAYS_EXCLUDED_DIRS.contains(&name)))
        });

    for entry in walker {
        let entry = entry.map_err(|e| SelectError::Walk {
            dir: dir.to_path_buf(),
            source: e,
        })?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.push(relative);
        }
    }

    Ok(files)
}

fn always_excluded(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| ALWAYS_EXCLUDED_DIRS.contains(&name))
    })
}

#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("include and exclude must not have overlapping elements: {overlap:?}")]
    IncludeExcludeOverlap { overlap: Vec<String> },

    #[error(
        "Running inside a git repository, but no files in the current working \
         directory are tracked by git. Commit the files to include them in the \
         image or pass the --ignore-git flag to gantry build"
    )]
    UntrackedWorkspace,

    #[error("git command failed: {detail}")]
    GitCommand {
        detail: String,
        source: std::io::Error,
    },

    #[error("git failed: {detail}")]
    GitFailed { detail: String },

    #[error("failed to scan {dir}")]
    Walk {
        dir: PathBuf,
        source: walkdir::Error,
    },
}
