use std::path::Path;

use crate::GantryConfig;

/// Name and version stamped into image tags.
///
/// Resolved once per pipeline run: explicit `[project]` values win, the
/// project directory name fills in the name, and the version falls back to
/// `latest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMeta {
    pub name: String,
    pub version: String,
}

impl ProjectMeta {
    pub fn resolve(project_dir: &Path, config: &GantryConfig) -> crate::Result<Self> {
        let name = match &config.project.name {
            Some(name) => name.clone(),
            None => project_dir
                .canonicalize()
                .ok()
                .as_deref()
                .unwrap_or(project_dir)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| crate::Error::ProjectName {
                    path: project_dir.to_path_buf(),
                })?,
        };

        let version = config
            .project
            .version
            .clone()
            .unwrap_or_else(|| "latest".to_owned());

        tracing::debug!(name, version, "resolved project metadata");

        Ok(Self { name, version })
    }
}
