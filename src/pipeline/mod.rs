//! The mirror pipeline: sync, fetch, and download stages over bounded
//! channels, plus the per-run memos that keep repeated accounts cheap.

pub mod batch;
pub mod download;
mod fetch;
pub mod memo;
pub mod mirror;
mod sync;

#[cfg(test)]
pub(crate) mod testutil;

pub use batch::{mirror_accounts, PipelineOptions};
pub use download::{DownloadJob, FailedJob};
pub use memo::RunMemos;
pub use mirror::{mirror_list, mirror_user};
