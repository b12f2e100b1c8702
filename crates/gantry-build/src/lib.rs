//! Source selection, dependency mapping, and build-context packaging.
//!
//! # Packaging pipeline
//!
//! ```text
//! gantry build <env>
//!   1. Lock files  ── deps::discover() → one DependencyGroup per task pattern
//!   2. Selection   ── select::select() → git-aware FileSet
//!   3. Context     ── context::package() → dist/<name>.tar.gz + dist/gantry/
//! ```
//!
//! # Selection strategy
//!
//! The build context mirrors the git repository state:
//! - Base set is `git ls-files` (tracked files only); uncommitted content is
//!   excluded, with a warning when the worktree is dirty
//! - Without a repository, a full deterministic scan is used instead
//! - `.git/` and `__pycache__/` are excluded unconditionally
//! - `exclude` prunes paths; `include` re-adds paths regardless of git state
//!   and must not overlap with `exclude`

pub mod context;
pub mod deps;
pub mod select;

pub use context::{BuildContext, PackageError};
pub use deps::{DependencyGroup, DepsError};
pub use select::{FileSet, SelectError, SelectionSpec};
