//! Filesystem helpers: safe naming plus directory and symlink upkeep.

pub mod naming;
pub mod paths;

pub use naming::sanitize_title;
pub use paths::{create_symlink, ensure_dir};
