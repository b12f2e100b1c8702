//! Docker client and the multi-artifact image build pipeline.
//!
//! # Build pipeline
//!
//! ```text
//! gantry build <env>
//!   per dependency group (strictly sequential):
//!     1. Package   ── gantry_build::context::package() → dist/
//!     2. Build     ── docker build . --tag <name>:<version>-<pattern>
//!     3. Test      ── docker run <image> flow status ... (unless --skip-tests)
//!     4. Probe     ── docker run <image> flow inspect ... expects "True"
//!        ── checkpoint: --until build halts here ──
//!     5. Tag/Push  ── docker tag + docker push (when a repository is set)
//!        ── checkpoint: --until push halts here ──
//! ```
//!
//! Halting at a checkpoint is a deliberate early success
//! ([`PipelineOutcome::Halted`]), not an error.

pub mod client;
pub mod docker;
pub mod executor;
pub mod pipeline;

pub use client::DockerClient;
pub use docker::DockerError;
pub use executor::{DockerExecutor, RealExecutor};
pub use pipeline::{BuildPipeline, PipelineError, PipelineOptions, PipelineOutcome, StopPoint};
