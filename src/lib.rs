//! Tweet Mirror - mirror X/Twitter media timelines to local storage.
//!
//! This library keeps a local mirror of the media timelines of a set of
//! accounts (or the members of a list), tracking per-account sync state in a
//! SQLite database and maintaining a directory/symlink structure on disk.
//!
//! # Features
//!
//! - Concurrent three-stage download pipeline (sync / fetch / download)
//! - Adaptive per-endpoint rate limiting driven by response headers
//! - Per-account "latest release" watermarks so reruns only fetch new media
//! - List mirroring with per-list symlink directories
//! - Cooperative cancellation and per-worker panic isolation
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tweet_mirror::{mirror_user, Config, RunMemos, XApi};
//! use tweet_mirror::store::Db;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("config.toml"))?;
//!     let (api, me) = XApi::login(
//!         &config.account.cookie,
//!         &config.account.auth_token,
//!         &config.client_options(),
//!     )
//!     .await?;
//!     println!("logged in as @{me}");
//!
//!     let account = api.get_user_by_screen_name("NASA").await?;
//!     let failures = mirror_user(
//!         Arc::new(api),
//!         Db::open_default().await?,
//!         account,
//!         Path::new("mirror"),
//!         Arc::new(RunMemos::new()),
//!         CancellationToken::new(),
//!         &config.pipeline_options(),
//!     )
//!     .await?;
//!     println!("{} failed downloads", failures.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod output;
pub mod pipeline;
pub mod store;

// Re-exports for convenience
pub use api::{Account, ListSource, MediaItem, MediaSource, MemberSource, RateLimiter, XApi};
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{mirror_accounts, mirror_list, mirror_user, FailedJob, RunMemos};
