use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Repository value written by `gantry init`; builds are rejected until the
/// user replaces it.
pub const PLACEHOLDER_REPOSITORY: &str = "your-repository/name";

/// gantry.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GantryConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub image: ImageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (defaults to the project directory name)
    pub name: Option<String>,
    /// Image version component (defaults to `latest`)
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Target image repository. Pushed to only when set; the local tag is
    /// the published reference otherwise.
    pub repository: Option<String>,
    /// Paths forced into the build context, overriding git tracking state.
    #[serde(default)]
    pub include: Vec<PathBuf>,
    /// Paths dropped from the build context.
    #[serde(default)]
    pub exclude: Vec<PathBuf>,
}

impl GantryConfig {
    /// Load from gantry.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join("gantry.toml");
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })
        } else {
            Ok(Self::default())
        }
    }
}

impl ImageConfig {
    /// The configured repository, treating an empty string as unset.
    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref().filter(|r| !r.is_empty())
    }

    /// Reject the scaffolded placeholder before any build work starts.
    pub fn validate_repository(&self) -> crate::Result<()> {
        if self.repository() == Some(PLACEHOLDER_REPOSITORY) {
            return Err(crate::Error::InvalidRepository {
                repository: PLACEHOLDER_REPOSITORY.to_owned(),
            });
        }
        Ok(())
    }
}
