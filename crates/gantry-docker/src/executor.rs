use std::path::Path;

use crate::docker::DockerError;

/// Abstraction over docker CLI execution for testability.
///
/// Production code uses [`RealExecutor`], tests use mockall-generated mocks.
/// Every invocation takes the working directory explicitly because
/// `docker build .` must run from inside the target environment directory.
#[allow(async_fn_in_trait)]
pub trait DockerExecutor: Send + Sync {
    /// Execute a docker command and capture stdout.
    async fn exec(&self, cwd: &Path, args: &[String]) -> Result<String, DockerError>;

    /// Execute a docker command, streaming output to the terminal.
    async fn exec_streaming(&self, cwd: &Path, args: &[String]) -> Result<(), DockerError>;
}

/// Real docker CLI executor.
pub struct RealExecutor;

impl DockerExecutor for RealExecutor {
    async fn exec(&self, cwd: &Path, args: &[String]) -> Result<String, DockerError> {
        use std::process::Stdio;

        let output = tokio::process::Command::new("docker")
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DockerError::NotFound { source: e })?;

        if output.status.success() {
            String::from_utf8(output.stdout).map_err(|e| DockerError::InvalidUtf8 { source: e })
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            Err(DockerError::CommandFailed {
                args: args.to_vec(),
                stderr,
            })
        }
    }

    async fn exec_streaming(&self, cwd: &Path, args: &[String]) -> Result<(), DockerError> {
        use std::process::Stdio;

        let status = tokio::process::Command::new("docker")
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| DockerError::NotFound { source: e })?;

        if status.success() {
            Ok(())
        } else {
            Err(DockerError::CommandFailed {
                args: args.to_vec(),
                stderr: format!("exit code: {status}"),
            })
        }
    }
}
