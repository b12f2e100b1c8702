use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid repository '{repository}' in gantry.toml, please add a valid value")]
    InvalidRepository { repository: String },

    #[error("cannot derive a project name from {path}; set [project].name in gantry.toml")]
    ProjectName { path: PathBuf },
}
