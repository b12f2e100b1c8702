use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use flate2::read::GzDecoder;
use gantry_build::context::{LOCAL_STATE_SUBDIR, PackageError, compress_dir, package};
use gantry_build::deps::DependencyGroup;
use gantry_core::{GantryConfig, ImageConfig, ProjectMeta};
use tempfile::TempDir;

fn meta() -> ProjectMeta {
    let mut config = GantryConfig::default();
    config.project.name = Some("sample-project".to_owned());
    ProjectMeta::resolve(Path::new("."), &config).unwrap()
}

fn group(pattern: &str, declaration: &str, lock: &str) -> DependencyGroup {
    DependencyGroup {
        task_pattern: pattern.to_owned(),
        declaration_file: PathBuf::from(declaration),
        lock_file: PathBuf::from(lock),
    }
}

fn default_groups() -> BTreeMap<String, DependencyGroup> {
    let mut groups = BTreeMap::new();
    groups.insert(
        "default".to_owned(),
        group("default", "requirements.txt", "requirements.lock.txt"),
    );
    groups
}

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, "").unwrap();
}

fn archive_entries(archive: &Path) -> Vec<String> {
    let file = std::fs::File::open(archive).unwrap();
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    let mut names: Vec<String> = tar
        .entries()
        .unwrap()
        .map(|e| {
            e.unwrap()
                .path()
                .unwrap()
                .to_string_lossy()
                .trim_end_matches('/')
                .to_owned()
        })
        .collect();
    names.sort();
    names
}

#[test]
fn package_copies_fileset_and_renames_lock() {
    let tmp = TempDir::new().unwrap();
    touch(&tmp.path().join("pipeline.yaml"));
    touch(&tmp.path().join("tasks/clean.py"));
    std::fs::write(tmp.path().join("requirements.lock.txt"), "pandas==2.0").unwrap();

    let groups = default_groups();
    let ctx = package(
        tmp.path(),
        &meta(),
        &ImageConfig::default(),
        &groups["default"],
        &groups,
        None,
        true,
    )
    .unwrap();

    let stage = tmp.path().join("dist/sample-project");
    assert!(stage.join("pipeline.yaml").is_file());
    assert!(stage.join("tasks/clean.py").is_file());
    assert!(stage.join("requirements.lock.txt").is_file());
    assert!(ctx.archive.ends_with("sample-project.tar.gz"));
    assert!(ctx.archive.is_file());
}

#[test]
fn package_renames_patterned_lock_to_canonical_name() {
    let tmp = TempDir::new().unwrap();
    touch(&tmp.path().join("pipeline.yaml"));
    std::fs::write(tmp.path().join("requirements.fit-*.lock.txt"), "sklearn").unwrap();
    std::fs::write(tmp.path().join("requirements.lock.txt"), "pandas").unwrap();

    let mut groups = default_groups();
    groups.insert(
        "fit-*".to_owned(),
        group(
            "fit-*",
            "requirements.fit-*.txt",
            "requirements.fit-*.lock.txt",
        ),
    );

    package(
        tmp.path(),
        &meta(),
        &ImageConfig::default(),
        &groups["fit-*"],
        &groups,
        None,
        true,
    )
    .unwrap();

    let stage = tmp.path().join("dist/sample-project");
    let canonical = std::fs::read_to_string(stage.join("requirements.lock.txt")).unwrap();
    assert_eq!(canonical, "sklearn");
    // The raw patterned name never appears in the context
    assert!(!stage.join("requirements.fit-*.lock.txt").exists());
}

#[test]
fn package_excludes_other_groups_lock_files() {
    let tmp = TempDir::new().unwrap();
    touch(&tmp.path().join("pipeline.yaml"));
    std::fs::write(tmp.path().join("requirements.lock.txt"), "pandas").unwrap();
    std::fs::write(tmp.path().join("requirements.fit-*.lock.txt"), "sklearn").unwrap();

    let mut groups = default_groups();
    groups.insert(
        "fit-*".to_owned(),
        group(
            "fit-*",
            "requirements.fit-*.txt",
            "requirements.fit-*.lock.txt",
        ),
    );

    package(
        tmp.path(),
        &meta(),
        &ImageConfig::default(),
        &groups["default"],
        &groups,
        None,
        true,
    )
    .unwrap();

    let stage = tmp.path().join("dist/sample-project");
    let canonical = std::fs::read_to_string(stage.join("requirements.lock.txt")).unwrap();
    assert_eq!(canonical, "pandas");
    assert!(!stage.join("requirements.fit-*.lock.txt").exists());
}

#[test]
fn archive_is_rooted_at_the_project_name() {
    let tmp = TempDir::new().unwrap();
    touch(&tmp.path().join("pipeline.yaml"));
    std::fs::write(tmp.path().join("requirements.lock.txt"), "pandas").unwrap();

    let groups = default_groups();
    let ctx = package(
        tmp.path(),
        &meta(),
        &ImageConfig::default(),
        &groups["default"],
        &groups,
        None,
        true,
    )
    .unwrap();

    let entries = archive_entries(&ctx.archive);
    assert!(entries.contains(&"sample-project/pipeline.yaml".to_owned()));
    assert!(entries.contains(&"sample-project/requirements.lock.txt".to_owned()));
}

#[test]
fn local_state_is_merged_into_dist() {
    let tmp = TempDir::new().unwrap();
    touch(&tmp.path().join("pipeline.yaml"));
    std::fs::write(tmp.path().join("requirements.lock.txt"), "pandas").unwrap();

    let home = TempDir::new().unwrap();
    touch(&home.path().join("stats/usage.json"));

    let groups = default_groups();
    let ctx = package(
        tmp.path(),
        &meta(),
        &ImageConfig::default(),
        &groups["default"],
        &groups,
        Some(home.path()),
        true,
    )
    .unwrap();

    assert!(
        ctx.dist
            .join(LOCAL_STATE_SUBDIR)
            .join("stats/usage.json")
            .is_file()
    );
}

#[test]
fn missing_local_state_leaves_an_empty_placeholder() {
    let tmp = TempDir::new().unwrap();
    touch(&tmp.path().join("pipeline.yaml"));
    std::fs::write(tmp.path().join("requirements.lock.txt"), "pandas").unwrap();

    let groups = default_groups();
    let ctx = package(
        tmp.path(),
        &meta(),
        &ImageConfig::default(),
        &groups["default"],
        &groups,
        Some(Path::new("/nonexistent/gantry-home")),
        true,
    )
    .unwrap();

    let placeholder = ctx.dist.join(LOCAL_STATE_SUBDIR);
    assert!(placeholder.is_dir());
    assert_eq!(std::fs::read_dir(&placeholder).unwrap().count(), 0);
}

#[test]
fn setup_py_projects_take_the_sdist_path() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("setup.py"),
        "from setuptools import setup\n\nsetup(name=\"sample-project\", version=\"0.1\")\n",
    )
    .unwrap();
    std::fs::write(tmp.path().join("requirements.lock.txt"), "pandas").unwrap();
    touch(&tmp.path().join("pipeline.yaml"));

    let groups = default_groups();
    let result = package(
        tmp.path(),
        &meta(),
        &ImageConfig::default(),
        &groups["default"],
        &groups,
        None,
        true,
    );

    match result {
        Ok(ctx) => {
            assert!(ctx.archive.to_string_lossy().ends_with(".tar.gz"));
            assert!(ctx.dist.join(LOCAL_STATE_SUBDIR).is_dir());
        }
        // Hosts without python (or the build frontend) fail inside the
        // sdist invocation; either way this proves which branch ran
        Err(PackageError::SdistCommand { .. } | PackageError::SdistFailed { .. }) => {}
        Err(other) => panic!("expected the source-distribution branch, got {other}"),
    }

    // The tree-packaging branch would have staged the sources here
    assert!(!tmp.path().join("dist/sample-project/pipeline.yaml").exists());
}

#[test]
fn setup_py_with_multiple_patterns_is_ambiguous() {
    let tmp = TempDir::new().unwrap();
    touch(&tmp.path().join("setup.py"));
    std::fs::write(tmp.path().join("requirements.lock.txt"), "pandas").unwrap();
    std::fs::write(tmp.path().join("requirements.fit-*.lock.txt"), "sklearn").unwrap();

    let mut groups = default_groups();
    groups.insert(
        "fit-*".to_owned(),
        group(
            "fit-*",
            "requirements.fit-*.txt",
            "requirements.fit-*.lock.txt",
        ),
    );

    let err = package(
        tmp.path(),
        &meta(),
        &ImageConfig::default(),
        &groups["default"],
        &groups,
        None,
        true,
    )
    .unwrap_err();

    assert!(matches!(err, PackageError::AmbiguousLockFiles));
    assert!(err.to_string().contains("setup.py"));
}

#[test]
fn context_remove_deletes_dist() {
    let tmp = TempDir::new().unwrap();
    touch(&tmp.path().join("pipeline.yaml"));
    std::fs::write(tmp.path().join("requirements.lock.txt"), "pandas").unwrap();

    let groups = default_groups();
    let ctx = package(
        tmp.path(),
        &meta(),
        &ImageConfig::default(),
        &groups["default"],
        &groups,
        None,
        true,
    )
    .unwrap();

    assert!(ctx.dist.exists());
    ctx.remove().unwrap();
    assert!(!ctx.dist.exists());
    // Removing twice is fine
    ctx.remove().unwrap();
}

#[derive(Clone, Default)]
struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn oversized_archives_warn_but_still_package() {
    let tmp = TempDir::new().unwrap();
    touch(&tmp.path().join("pipeline.yaml"));
    std::fs::write(tmp.path().join("requirements.lock.txt"), "pandas").unwrap();

    // Pseudo-random payload so gzip cannot shrink it under the threshold
    let mut payload = vec![0u8; 8 * 1024 * 1024];
    let mut state = 0x9e3779b97f4a7c15u64;
    for chunk in payload.chunks_mut(8) {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        chunk.copy_from_slice(&state.to_le_bytes()[..chunk.len()]);
    }
    std::fs::write(tmp.path().join("weights.bin"), &payload).unwrap();

    let writer = CaptureWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer.clone())
        .finish();

    let groups = default_groups();
    let ctx = tracing::subscriber::with_default(subscriber, || {
        package(
            tmp.path(),
            &meta(),
            &ImageConfig::default(),
            &groups["default"],
            &groups,
            None,
            true,
        )
        .unwrap()
    });

    assert!(ctx.archive.is_file());
    let logs = String::from_utf8(writer.0.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("larger than 5MB"));
}

#[test]
fn compress_dir_round_trips() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("dist/project-name");
    touch(&dir.join("file"));

    let archive = tmp.path().join("dist/project-name.tar.gz");
    compress_dir(&dir, &archive, "project-name").unwrap();

    assert_eq!(archive_entries(&archive), vec!["project-name", "project-name/file"]);
}
