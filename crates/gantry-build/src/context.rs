use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use gantry_core::{ImageConfig, ProjectMeta};

use crate::deps::DependencyGroup;
use crate::select::{self, SelectionSpec};

/// Subdirectory of `dist/` that carries prior local state (telemetry,
/// cached credentials) into the image. The Dockerfile copies it verbatim,
/// so it must exist even when the host has no state to merge.
pub const LOCAL_STATE_SUBDIR: &str = "gantry";

/// Archives above this size get a hygiene warning, not a failure.
const ARCHIVE_WARN_BYTES: u64 = 5 * 1024 * 1024;

/// A materialized build context, owned by exactly one pipeline iteration.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The `dist/` directory handed to the container builder.
    pub dist: PathBuf,
    /// The compressed source archive inside `dist/`.
    pub archive: PathBuf,
}

impl BuildContext {
    /// Remove the context from disk. Missing paths are fine; a halted
    /// pipeline may have cleaned up already.
    pub fn remove(&self) -> Result<(), PackageError> {
        if self.dist.exists() {
            std::fs::remove_dir_all(&self.dist).map_err(|e| PackageError::Io {
                path: self.dist.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Materialize the build context for one dependency group.
///
/// Projects with a `setup.py` manifest delegate to `python -m build --sdist`
/// and may only carry the default dependency group. Everything else gets the
/// git-aware copy: the selected FileSet lands in `dist/<name>/` with this
/// group's lock file renamed to its canonical name and every other group's
/// lock file excluded, then the staging directory is compressed into
/// `dist/<name>.tar.gz`.
pub fn package(
    root: &Path,
    meta: &ProjectMeta,
    image: &ImageConfig,
    group: &DependencyGroup,
    all_groups: &BTreeMap<String, DependencyGroup>,
    home_dir: Option<&Path>,
    ignore_git: bool,
) -> Result<BuildContext, PackageError> {
    let dist = root.join("dist");

    let archive = if root.join("setup.py").is_file() {
        package_sdist(root, meta, all_groups, &dist)?
    } else {
        package_tree(root, meta, image, group, all_groups, &dist, ignore_git)?
    };

    stage_local_state(home_dir, &dist)?;

    Ok(BuildContext { dist, archive })
}

fn package_sdist(
    root: &Path,
    meta: &ProjectMeta,
    all_groups: &BTreeMap<String, DependencyGroup>,
    dist: &Path,
) -> Result<PathBuf, PackageError> {
    if all_groups
        .keys()
        .any(|pattern| pattern != crate::deps::DEFAULT_PATTERN)
    {
        return Err(PackageError::AmbiguousLockFiles);
    }

    // A stale .egg-info can shadow MANIFEST.in updates
    remove_if_exists(dist)?;
    remove_if_exists(&root.join("build"))?;
    remove_if_exists(
        &root
            .join("src")
            .join(&meta.name)
            .join(format!("{}.egg-info", meta.name)),
    )?;

    tracing::info!("packaging source distribution");
    let output = Command::new("python")
        .args(["-m", "build", "--sdist"])
        .current_dir(root)
        .output()
        .map_err(|e| PackageError::SdistCommand { source: e })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PackageError::SdistFailed {
            detail: format!(
                "python -m build exited with {}: {}",
                output.status,
                stderr.trim()
            ),
        });
    }

    find_archive(dist)
}

fn package_tree(
    root: &Path,
    meta: &ProjectMeta,
    image: &ImageConfig,
    group: &DependencyGroup,
    all_groups: &BTreeMap<String, DependencyGroup>,
    dist: &Path,
    ignore_git: bool,
) -> Result<PathBuf, PackageError> {
    remove_if_exists(dist)?;
    let stage = dist.join(&meta.name);
    create_dir_all(&stage)?;

    // A context never leaks another task pattern's lock file
    let other_locks: Vec<PathBuf> = all_groups
        .values()
        .filter(|g| g.lock_file != group.lock_file)
        .map(|g| g.lock_file.clone())
        .collect();

    let spec = SelectionSpec::new(root)
        .include(image.include.iter().cloned())
        .exclude(image.exclude.iter().cloned())
        .exclude(other_locks)
        .ignore_git(ignore_git);
    let files = select::select(&spec)?;

    tracing::info!(files = files.len(), "packaging code");

    for relative in files.iter() {
        let src = root.join(relative);
        let dst = if relative == &group.lock_file {
            stage.join(group.canonical_lock_name())
        } else {
            stage.join(relative)
        };
        if let Some(parent) = dst.parent() {
            create_dir_all(parent)?;
        }
        std::fs::copy(&src, &dst).map_err(|e| PackageError::Io {
            path: src.clone(),
            source: e,
        })?;
    }

    let archive = dist.join(format!("{}.tar.gz", meta.name));
    compress_dir(&stage, &archive, &meta.name)?;
    Ok(archive)
}

/// Compress `dir` into a gzipped tarball at `archive`, entries rooted at
/// `arc_name/`. Oversized archives are a hygiene signal, not a failure.
pub fn compress_dir(dir: &Path, archive: &Path, arc_name: &str) -> Result<(), PackageError> {
    let file = std::fs::File::create(archive).map_err(|e| PackageError::Io {
        path: archive.to_path_buf(),
        source: e,
    })?;
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(arc_name, dir)
        .and_then(|()| builder.into_inner())
        .and_then(|encoder| encoder.finish())
        .map_err(|e| PackageError::Archive {
            path: archive.to_path_buf(),
            source: e,
        })?;

    let size = std::fs::metadata(archive)
        .map(|m| m.len())
        .unwrap_or_default();
    if size > ARCHIVE_WARN_BYTES {
        tracing::warn!(
            "The project's source code '{}' is larger than 5MB ({:.1}MB); \
             exclude large files to keep images small",
            archive.display(),
            size as f64 / (1024.0 * 1024.0),
        );
    }

    Ok(())
}

/// Merge the host's local state directory into `dist/gantry/`, or create an
/// empty placeholder so downstream `COPY dist/gantry` steps never fail.
pub fn stage_local_state(home_dir: Option<&Path>, dist: &Path) -> Result<(), PackageError> {
    let target = dist.join(LOCAL_STATE_SUBDIR);
    create_dir_all(&target)?;

    match home_dir {
        Some(home) if home.is_dir() => copy_dir_all(home, &target),
        Some(home) => {
            tracing::warn!(
                "local state directory {} not found; adding an empty placeholder",
                home.display()
            );
            Ok(())
        }
        None => Ok(()),
    }
}

/// Recursively copy `src` into `dst` (which must exist).
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<(), PackageError> {
    for entry in walkdir::WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(|e| PackageError::Walk {
            dir: src.to_path_buf(),
            source: e,
        })?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| PackageError::Io {
                path: entry.path().to_path_buf(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn find_archive(dist: &Path) -> Result<PathBuf, PackageError> {
    let entries = std::fs::read_dir(dist).map_err(|e| PackageError::Io {
        path: dist.to_path_buf(),
        source: e,
    })?;
    let mut archives: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.to_str().is_some_and(|s| s.ends_with(".tar.gz")))
        .collect();
    archives.sort();
    archives
        .into_iter()
        .next()
        .ok_or_else(|| PackageError::MissingSdistArchive {
            dist: dist.to_path_buf(),
        })
}

fn create_dir_all(path: &Path) -> Result<(), PackageError> {
    std::fs::create_dir_all(path).map_err(|e| PackageError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn remove_if_exists(path: &Path) -> Result<(), PackageError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| PackageError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error(
        "Multiple requirements.*.lock.txt or environment.*.lock.yml files found \
         along with setup.py. Keep either task-level lock files or the package \
         manifest in the project root, not both"
    )]
    AmbiguousLockFiles,

    #[error(transparent)]
    Select(#[from] crate::select::SelectError),

    #[error("failed to execute python -m build")]
    SdistCommand { source: std::io::Error },

    #[error("source distribution build failed: {detail}")]
    SdistFailed { detail: String },

    #[error("python -m build produced no .tar.gz archive in {dist}")]
    MissingSdistArchive { dist: PathBuf },

    #[error("failed to write archive {path}")]
    Archive {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to scan {dir}")]
    Walk {
        dir: PathBuf,
        source: walkdir::Error,
    },

    #[error("io error at {path}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
