use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use gantry_build::context::{self, BuildContext, PackageError};
use gantry_build::deps::{self, DepsError};
use gantry_core::{GantryConfig, ProjectMeta};

use crate::client::DockerClient;
use crate::docker::DockerError;
use crate::executor::DockerExecutor;

/// Workflow-engine CLI shipped inside the images gantry builds. The status
/// check and capability probe are issued through it.
const WORKFLOW_CLI: &str = "flow";

/// Literal token substituted for `*` in image tags; docker tags reject
/// glob characters.
const WILDCARD_TOKEN: &str = "gantry";

/// Checkpoints at which the pipeline can be asked to halt successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPoint {
    /// After `docker build` (and image tests) for the current group.
    Build,
    /// After `docker push` for the current group.
    Push,
}

impl FromStr for StopPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(Self::Build),
            "push" => Ok(Self::Push),
            other => Err(format!(
                "invalid stop point '{other}' — expected 'build' or 'push'"
            )),
        }
    }
}

impl fmt::Display for StopPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Push => write!(f, "push"),
        }
    }
}

/// Per-run pipeline options, resolved by the caller.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Target environment directory (must hold a Dockerfile).
    pub env_name: String,
    /// Workflow entry point inside the image.
    pub entry_point: String,
    /// Halt successfully at this checkpoint instead of completing.
    pub until: Option<StopPoint>,
    /// Skip the status check and capability probe after building.
    pub skip_tests: bool,
    /// Select sources by scanning instead of from git tracking state.
    pub ignore_git: bool,
    /// Resolved local-state directory merged into every build context;
    /// `None` skips the merge but still creates the placeholder.
    pub home_dir: Option<PathBuf>,
}

impl PipelineOptions {
    pub fn new(env_name: impl Into<String>) -> Self {
        Self {
            env_name: env_name.into(),
            entry_point: "pipeline.yaml".to_owned(),
            until: None,
            skip_tests: false,
            ignore_git: false,
            home_dir: None,
        }
    }
}

/// How a pipeline run ended, short of an error.
///
/// `Halted` is a deliberate early success at a requested checkpoint; callers
/// branch on the variant instead of inspecting message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed {
        /// Resolved project name.
        name: String,
        /// Task pattern → published image reference (remote when pushed,
        /// local otherwise).
        images: BTreeMap<String, String>,
    },
    Halted {
        checkpoint: StopPoint,
        message: String,
    },
}

/// Drives packaging → build → test → tag → push, one image per dependency
/// group, strictly sequentially: every iteration owns the shared `dist/`
/// directory and the environment directory, so groups never run concurrently.
pub struct BuildPipeline<E: DockerExecutor> {
    client: DockerClient<E>,
    opts: PipelineOptions,
}

impl<E: DockerExecutor> BuildPipeline<E> {
    pub fn new(client: DockerClient<E>, opts: PipelineOptions) -> Self {
        Self { client, opts }
    }

    pub async fn run(
        &self,
        project_dir: &Path,
        config: &GantryConfig,
    ) -> Result<PipelineOutcome, PipelineError> {
        let env_dir = project_dir.join(&self.opts.env_name);
        if !env_dir.join("Dockerfile").is_file() {
            return Err(PipelineError::MissingDockerfile {
                env_name: self.opts.env_name.clone(),
            });
        }

        config.image.validate_repository()?;

        let meta = ProjectMeta::resolve(project_dir, config)?;

        deps::check_lock_files_exist(project_dir)?;
        let groups = deps::discover(project_dir)?;

        let mut images = BTreeMap::new();

        for (pattern, group) in &groups {
            tracing::info!(pattern, "building image for task pattern");

            // Staging leftovers from a halted or crashed run would be
            // swept into this group's context by the full scan.
            self.clean_env_dir(&env_dir)?;

            let ctx = context::package(
                project_dir,
                &meta,
                &config.image,
                group,
                &groups,
                self.opts.home_dir.as_deref(),
                self.opts.ignore_git,
            )?;

            self.stage_env_dir(project_dir, &env_dir, group, &ctx)?;

            let image_local = local_tag(&meta, pattern);
            self.client.build(&env_dir, &image_local).await?;

            if !self.opts.skip_tests {
                self.test_image(&env_dir, &image_local).await?;
            }

            if self.opts.until == Some(StopPoint::Build) {
                return Ok(PipelineOutcome::Halted {
                    checkpoint: StopPoint::Build,
                    message: "Done. Run \"docker images\" to see your image.".to_owned(),
                });
            }

            let image_target = match config.image.repository() {
                Some(repository) => {
                    let remote = remote_tag(repository, &meta.version, pattern);
                    self.client.tag(&env_dir, &image_local, &remote).await?;
                    self.client.push(&env_dir, &remote).await?;
                    remote
                }
                None => image_local,
            };

            if self.opts.until == Some(StopPoint::Push) {
                return Ok(PipelineOutcome::Halted {
                    checkpoint: StopPoint::Push,
                    message: "Done. Image pushed to repository.".to_owned(),
                });
            }

            images.insert(pattern.clone(), image_target);

            ctx.remove()?;
            self.clean_env_dir(&env_dir)?;
        }

        tracing::info!(?images, "images generated");

        Ok(PipelineOutcome::Completed {
            name: meta.name,
            images,
        })
    }

    /// Remove the staging artifacts the pipeline places inside the
    /// environment directory: the canonical lock copy and `dist/`. A stale
    /// canonical lock from one group would otherwise end up inside the
    /// next group's build context.
    fn clean_env_dir(&self, env_dir: &Path) -> Result<(), PipelineError> {
        for name in [deps::REQUIREMENTS_LOCK, deps::ENVIRONMENT_LOCK] {
            let lock = env_dir.join(name);
            if lock.is_file() {
                std::fs::remove_file(&lock).map_err(|e| PipelineError::Io {
                    path: lock.clone(),
                    source: e,
                })?;
            }
        }
        let env_dist = env_dir.join("dist");
        if env_dist.exists() {
            std::fs::remove_dir_all(&env_dist).map_err(|e| PipelineError::Io {
                path: env_dist,
                source: e,
            })?;
        }
        Ok(())
    }

    /// Copy the group's lock file (under its canonical name) and the packaged
    /// `dist/` directory into the environment directory. The directory was
    /// cleaned before packaging, so nothing is replaced here.
    fn stage_env_dir(
        &self,
        project_dir: &Path,
        env_dir: &Path,
        group: &deps::DependencyGroup,
        ctx: &BuildContext,
    ) -> Result<(), PipelineError> {
        let lock_src = project_dir.join(&group.lock_file);
        if lock_src.is_file() {
            let lock_dst = env_dir.join(group.canonical_lock_name());
            std::fs::copy(&lock_src, &lock_dst).map_err(|e| PipelineError::Io {
                path: lock_src,
                source: e,
            })?;
        }

        let env_dist = env_dir.join("dist");
        std::fs::create_dir_all(&env_dist).map_err(|e| PipelineError::Io {
            path: env_dist.clone(),
            source: e,
        })?;
        context::copy_dir_all(&ctx.dist, &env_dist)?;
        Ok(())
    }

    /// Run the built image twice: once asserting the workflow loads
    /// (`flow status`), once probing that an output client is bound
    /// (`flow inspect`, which must print the literal `True`). The two
    /// failures are distinct; a loadable workflow can still lack the client.
    async fn test_image(&self, env_dir: &Path, image: &str) -> Result<(), PipelineError> {
        let entry = self.opts.entry_point.as_str();

        self.client
            .run(
                env_dir,
                image,
                &[WORKFLOW_CLI, "status", "--entry-point", entry],
            )
            .await
            .map_err(|source| PipelineError::StatusCheck {
                image: image.to_owned(),
                source,
            })?;

        let probe = self
            .client
            .run_captured(
                env_dir,
                image,
                &[
                    WORKFLOW_CLI,
                    "inspect",
                    "--entry-point",
                    entry,
                    "--check",
                    "output-client",
                ],
            )
            .await;

        match probe {
            Ok(output) if output == "True\n" => Ok(()),
            Ok(_) => Err(PipelineError::MissingCapability {
                image: image.to_owned(),
                source: None,
            }),
            Err(source) => Err(PipelineError::MissingCapability {
                image: image.to_owned(),
                source: Some(source),
            }),
        }
    }
}

/// `{name}:{version}-{pattern}` with `*` rewritten for tag safety.
pub fn local_tag(meta: &ProjectMeta, pattern: &str) -> String {
    format!(
        "{}:{}-{}",
        meta.name,
        meta.version,
        normalize_pattern(pattern)
    )
}

/// The configured repository, versioned unless it already carries an
/// explicit `:tag` suffix.
pub fn remote_tag(repository: &str, version: &str, pattern: &str) -> String {
    if repository.contains(':') {
        repository.to_owned()
    } else {
        format!("{repository}:{version}-{}", normalize_pattern(pattern))
    }
}

pub fn normalize_pattern(pattern: &str) -> String {
    pattern.replace('*', WILDCARD_TOKEN)
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(
        "expected a Dockerfile in the '{env_name}' environment directory, \
         add one and try again"
    )]
    MissingDockerfile { env_name: String },

    #[error(transparent)]
    Config(#[from] gantry_core::Error),

    #[error(transparent)]
    Deps(#[from] DepsError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error(
        "error while testing the image {image} — use \"docker run -it {image} /bin/bash\" \
         to start an interactive session and debug it"
    )]
    StatusCheck { image: String, source: DockerError },

    #[error(
        "the workflow in {image} has no output client configured — run \
         \"docker run -it {image} /bin/bash\" to debug, and ensure an output \
         client is bound before building again"
    )]
    MissingCapability {
        image: String,
        #[source]
        source: Option<DockerError>,
    },

    #[error("io error at {path}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
