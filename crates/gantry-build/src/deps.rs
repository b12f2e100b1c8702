use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Canonical lock-file name a build context carries for pip-style projects.
pub const REQUIREMENTS_LOCK: &str = "requirements.lock.txt";
/// Canonical lock-file name a build context carries for conda-style projects.
pub const ENVIRONMENT_LOCK: &str = "environment.lock.yml";

/// Task pattern used when a project has a single, unpatterned set of
/// dependencies.
pub const DEFAULT_PATTERN: &str = "default";

/// One dependency declaration file and its lock counterpart, grouped under
/// a task pattern (`default` or a glob-like token such as `fit-*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGroup {
    pub task_pattern: String,
    pub declaration_file: PathBuf,
    pub lock_file: PathBuf,
}

impl DependencyGroup {
    /// The canonical name this group's lock file takes inside a build
    /// context.
    pub fn canonical_lock_name(&self) -> &'static str {
        if self
            .lock_file
            .to_str()
            .is_some_and(|name| name.starts_with("requirements"))
        {
            REQUIREMENTS_LOCK
        } else {
            ENVIRONMENT_LOCK
        }
    }
}

/// Fail fast when the project root carries no lock file of either kind.
/// Independent of pattern discovery; the pipeline calls this first.
pub fn check_lock_files_exist(root: &Path) -> Result<(), DepsError> {
    if !root.join(REQUIREMENTS_LOCK).exists() && !root.join(ENVIRONMENT_LOCK).exists() {
        return Err(DepsError::MissingLockFile);
    }
    Ok(())
}

/// Discover dependency lock files and map them to task patterns.
///
/// `requirements*.txt`/`requirements*.lock.txt` pairs are scanned first;
/// `environment*.yml`/`environment*.lock.yml` pairs are consulted only when
/// no requirements files exist at all — requirements shadow environment
/// files rather than merging with them.
pub fn discover(root: &Path) -> Result<BTreeMap<String, DependencyGroup>, DepsError> {
    let names = root_file_names(root)?;

    let groups = scan_kind(&names, "requirements", "txt")?;
    if !groups.is_empty() {
        return Ok(groups);
    }
    scan_kind(&names, "environment", "yml")
}

fn root_file_names(root: &Path) -> Result<Vec<String>, DepsError> {
    let entries = std::fs::read_dir(root).map_err(|e| DepsError::ReadDir {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DepsError::ReadDir {
            path: root.to_path_buf(),
            source: e,
        })?;
        if entry.path().is_file()
            && let Some(name) = entry.file_name().to_str()
        {
            names.push(name.to_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn scan_kind(
    names: &[String],
    prefix: &str,
    ext: &str,
) -> Result<BTreeMap<String, DependencyGroup>, DepsError> {
    let mut declarations: BTreeMap<String, String> = BTreeMap::new();
    let mut locks: BTreeMap<String, String> = BTreeMap::new();

    for name in names {
        if let Some((pattern, is_lock)) = parse_file_name(name, prefix, ext) {
            if is_lock {
                locks.insert(pattern, name.clone());
            } else {
                declarations.insert(pattern, name.clone());
            }
        }
    }

    // Every patterned declaration needs its lock counterpart; iterating a
    // half-locked project would silently skip patterns.
    for (pattern, declaration) in &declarations {
        if pattern != DEFAULT_PATTERN && !locks.contains_key(pattern) {
            return Err(DepsError::UnpairedTaskFiles {
                declaration: declaration.clone(),
                pattern: pattern.clone(),
            });
        }
    }

    let mut groups = BTreeMap::new();
    for (pattern, lock_name) in locks {
        let declaration = declarations
            .get(&pattern)
            .cloned()
            .unwrap_or_else(|| declaration_name(prefix, ext, &pattern));
        groups.insert(
            pattern.clone(),
            DependencyGroup {
                task_pattern: pattern,
                declaration_file: PathBuf::from(declaration),
                lock_file: PathBuf::from(lock_name),
            },
        );
    }
    Ok(groups)
}

/// Parse `requirements.fit-*.lock.txt` shapes into `(pattern, is_lock)`.
/// Returns `None` for unrelated file names.
fn parse_file_name(name: &str, prefix: &str, ext: &str) -> Option<(String, bool)> {
    let rest = name.strip_prefix(prefix)?;
    let rest = rest.strip_suffix(ext)?.strip_suffix('.')?;
    // rest is now "", "lock", "<pattern>", or "<pattern>.lock"
    let (rest, is_lock) = match rest.strip_suffix("lock") {
        Some(stripped) => match stripped.strip_suffix('.') {
            Some(pattern) => (pattern, true),
            None if stripped.is_empty() => ("", true),
            None => (rest, false), // a pattern that happens to end in "lock"
        },
        None => (rest, false),
    };

    let pattern = match rest.strip_prefix('.') {
        Some(pattern) if !pattern.is_empty() => pattern.to_owned(),
        Some(_) => return None,
        None if rest.is_empty() => DEFAULT_PATTERN.to_owned(),
        None => return None,
    };
    Some((pattern, is_lock))
}

fn declaration_name(prefix: &str, ext: &str, pattern: &str) -> String {
    if pattern == DEFAULT_PATTERN {
        format!("{prefix}.{ext}")
    } else {
        format!("{prefix}.{pattern}.{ext}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DepsError {
    #[error(
        "Expected requirements.lock.txt or environment.lock.yml at the root \
         directory, add one and try again.\n\n\
         pip: pip freeze > requirements.lock.txt\n\
         conda: conda env export --no-build --file environment.lock.yml"
    )]
    MissingLockFile,

    #[error(
        "found {declaration} but no lock file for task pattern '{pattern}'; \
         add the matching *.{pattern}.lock.* file and try again"
    )]
    UnpairedTaskFiles {
        declaration: String,
        pattern: String,
    },

    #[error("failed to read project root {path}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}
