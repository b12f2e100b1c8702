use std::path::Path;

use crate::docker::DockerError;
use crate::executor::{DockerExecutor, RealExecutor};

/// Docker operations client, parameterized over the executor for
/// testability.
///
/// Argument shapes are fixed (`build . --tag`, `run <image> <cmd>...`,
/// `tag <local> <remote>`, `push <remote>`) for drop-in compatibility with
/// existing tooling that inspects the invocations.
pub struct DockerClient<E: DockerExecutor = RealExecutor> {
    executor: E,
}

impl DockerClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor,
        }
    }
}

impl Default for DockerClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DockerExecutor> DockerClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    /// `docker build . --tag <tag>`, run from inside `context_dir`.
    pub async fn build(&self, context_dir: &Path, tag: &str) -> Result<(), DockerError> {
        self.executor
            .exec_streaming(context_dir, &args(["build", ".", "--tag", tag]))
            .await
    }

    /// `docker run <image> <cmd>...`, streaming output.
    pub async fn run(&self, cwd: &Path, image: &str, cmd: &[&str]) -> Result<(), DockerError> {
        let mut full = vec!["run", image];
        full.extend_from_slice(cmd);
        self.executor.exec_streaming(cwd, &args_vec(&full)).await
    }

    /// `docker run <image> <cmd>...`, capturing stdout.
    pub async fn run_captured(
        &self,
        cwd: &Path,
        image: &str,
        cmd: &[&str],
    ) -> Result<String, DockerError> {
        let mut full = vec!["run", image];
        full.extend_from_slice(cmd);
        self.executor.exec(cwd, &args_vec(&full)).await
    }

    /// `docker tag <local> <remote>`.
    pub async fn tag(&self, cwd: &Path, local: &str, remote: &str) -> Result<(), DockerError> {
        self.executor
            .exec_streaming(cwd, &args(["tag", local, remote]))
            .await
    }

    /// `docker push <remote>`.
    pub async fn push(&self, cwd: &Path, remote: &str) -> Result<(), DockerError> {
        self.executor
            .exec_streaming(cwd, &args(["push", remote]))
            .await
    }
}

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}

fn args_vec(a: &[&str]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}
