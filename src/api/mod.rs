//! API interaction layer.
//!
//! Everything that talks to the platform: session headers, the rate-limited
//! HTTP client, response parsing, and the `MediaSource` seam the pipeline
//! consumes.

pub mod auth;
pub mod client;
pub mod list;
pub mod rate_limit;
pub mod source;
pub mod types;

pub use client::XClient;
pub use list::{ListSource, MemberSource};
pub use rate_limit::RateLimiter;
pub use source::{ClientOptions, MediaSource, XApi};
pub use types::{Account, ListInfo, MediaItem};
