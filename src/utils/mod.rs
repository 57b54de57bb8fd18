//! Shared utilities.

pub mod dot_path;

pub use dot_path::{DotPath, DotPathError};
