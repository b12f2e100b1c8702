//! Core types and configuration for gantry.
//!
//! This crate defines the `gantry.toml` schema ([`GantryConfig`]),
//! project metadata resolution ([`ProjectMeta`]), and shared error types.

pub mod config;
pub mod error;
pub mod project;

pub use config::{GantryConfig, ImageConfig, PLACEHOLDER_REPOSITORY, ProjectConfig};
pub use error::{Error, Result};
pub use project::ProjectMeta;
