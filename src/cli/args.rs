//! Command-line argument definitions using clap.

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

/// Media timeline mirror CLI.
#[derive(Parser, Debug)]
#[command(
    name = "tweet-mirror",
    version,
    about = "Mirror the media timelines of accounts and lists",
    long_about = "Keeps a local directory tree in sync with the media timelines of\n\
                  accounts, lists, and follow graphs, downloading only what is new\n\
                  since the last run."
)]
pub struct Args {
    /// Account handle(s) to mirror.
    #[arg(short, long, num_args = 1..)]
    pub user: Option<Vec<String>>,

    /// List id(s) to mirror.
    #[arg(short, long, num_args = 1..)]
    pub list: Option<Vec<u64>>,

    /// Mirror everything these accounts follow.
    #[arg(long = "following-of", num_args = 1..)]
    pub following_of: Option<Vec<String>>,

    /// Base directory for the mirror.
    #[arg(short = 'd', long = "directory")]
    pub download_directory: Option<PathBuf>,

    /// Browser Cookie header (must include ct0).
    #[arg(long, env = "TWEET_MIRROR_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,

    /// API bearer token.
    #[arg(long = "auth-token", env = "TWEET_MIRROR_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Concurrent download workers.
    #[arg(long)]
    pub max_download_workers: Option<usize>,

    /// Retries for transient API request failures.
    #[arg(long)]
    pub retry_count: Option<u32>,

    /// Path to configuration file.
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Merge CLI arguments into an existing config, overriding where specified.
    pub fn merge_into_config(self, config: &mut Config) {
        if let Some(users) = self.user {
            config.targets.screen_names = users;
        }

        if let Some(lists) = self.list {
            config.targets.list_ids = lists;
        }

        if let Some(following_of) = self.following_of {
            config.targets.following_of = following_of;
        }

        if let Some(cookie) = self.cookie {
            config.account.cookie = cookie;
        }

        if let Some(auth_token) = self.auth_token {
            config.account.auth_token = auth_token;
        }

        if let Some(dir) = self.download_directory {
            config.options.download_directory = Some(dir);
        }

        if let Some(workers) = self.max_download_workers {
            config.options.max_download_workers = workers;
        }

        if let Some(retries) = self.retry_count {
            config.limits.retry_count = retries;
        }
    }
}
