//! Adaptive per-endpoint rate limiting.
//!
//! The platform only reveals an endpoint's quota through response headers, so
//! the first request on each URL path has to go out blind. This module elects
//! exactly one "prober" per path: the first caller claims the path and
//! proceeds ungated, every concurrent caller parks on the path's notifier
//! until the prober's response has been observed (or the prober fails and
//! hands its duty to a waiter). Once a quota is known, callers decrement it
//! locally and sleep through the reset window when it runs dry.
//!
//! Paths that never return quota headers are marked exempt and afterwards
//! cost a single map lookup per request. Media CDN hosts bypass the limiter
//! entirely.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;
use tokio::sync::Notify;
use url::Url;

/// Hosts serving static media; requests to them are never rate limited.
const MEDIA_CDN_SUFFIX: &str = "twimg.com";

/// Known quota for one endpoint path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: SystemTime,
}

impl Quota {
    /// Parse the quota from `x-rate-limit-*` response headers.
    ///
    /// Returns `None` when any of the three headers is missing or malformed,
    /// which marks the path as exempt.
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let get = |name: &str| headers.get(name)?.to_str().ok()?.parse::<u64>().ok();

        let limit = get("x-rate-limit-limit")?;
        let remaining = get("x-rate-limit-remaining")?;
        let reset_epoch = get("x-rate-limit-reset")?;

        Some(Quota {
            limit,
            remaining,
            reset_at: UNIX_EPOCH + Duration::from_secs(reset_epoch),
        })
    }
}

/// Lifecycle of one endpoint path.
#[derive(Debug)]
enum SlotState {
    /// Probe duty was relinquished; the next caller re-claims it.
    Vacant,
    /// A probe request is in flight; callers wait for its response.
    Probing,
    /// The path never returns quota headers; pass unconditionally.
    Exempt,
    /// Quota known; consume until the reserve floor, then wait out the reset.
    Ready(Quota),
}

struct PathSlot {
    state: SlotState,
    /// Consecutive failed probes; reset on any successful observation.
    probe_failures: u32,
    notify: Arc<Notify>,
}

impl PathSlot {
    fn probing() -> Self {
        PathSlot {
            state: SlotState::Probing,
            probe_failures: 0,
            notify: Arc::new(Notify::new()),
        }
    }
}

/// What `gate` decided while holding the map lock.
enum Decision {
    Proceed,
    Wait(Arc<Notify>),
    SleepUntil(SystemTime),
}

/// Tracks a request quota per API endpoint path and gates callers on it.
///
/// Shared by reference between all request sites of one client; constructed
/// per client rather than process-wide so independent runs (and tests) do not
/// cross-contaminate.
pub struct RateLimiter {
    paths: Mutex<HashMap<String, PathSlot>>,
    /// Fraction of the limit kept in reserve; at or below it callers sleep
    /// until the reset time instead of consuming the last requests.
    reserve_fraction: f64,
    /// After this many consecutive failed probes the path is marked exempt
    /// so waiters are never re-elected forever against a dead endpoint.
    probe_failure_limit: u32,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(0.01, 5)
    }
}

impl RateLimiter {
    pub fn new(reserve_fraction: f64, probe_failure_limit: u32) -> Self {
        RateLimiter {
            paths: Mutex::new(HashMap::new()),
            reserve_fraction,
            probe_failure_limit: probe_failure_limit.max(1),
        }
    }

    /// Whether requests to this URL are subject to rate limiting at all.
    pub fn should_limit(url: &Url) -> bool {
        url.host_str()
            .map(|host| !host.ends_with(MEDIA_CDN_SUFFIX))
            .unwrap_or(false)
    }

    /// Gate a request on the path's quota. Called before every attempt.
    ///
    /// Returns once the caller may issue the request. The very first caller
    /// on a path (and the first after a relinquish or an expired window)
    /// becomes the prober and passes immediately; it is then responsible for
    /// feeding the response to [`observe`](Self::observe) or reporting
    /// failure via [`relinquish`](Self::relinquish).
    pub async fn gate(&self, url: &Url) {
        if !Self::should_limit(url) {
            return;
        }
        let path = url.path();

        loop {
            let decision = self.decide(path);
            match decision {
                Decision::Proceed => return,
                Decision::SleepUntil(reset_at) => {
                    let pause = reset_at
                        .duration_since(SystemTime::now())
                        .unwrap_or_default();
                    tracing::info!("quota exhausted on {}, sleeping {:?}", path, pause);
                    tokio::time::sleep(pause).await;
                    // Re-enter: the first caller to see the expired window
                    // claims probe duty, the rest go back to waiting.
                }
                Decision::Wait(notify) => {
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    // Register before re-checking so a wakeup between the
                    // state check and the await is not lost.
                    notified.as_mut().enable();
                    if !self.still_probing(path) {
                        continue;
                    }
                    tracing::debug!("waiting for quota on {}", path);
                    notified.await;
                }
            }
        }
    }

    /// One state-machine step under the map lock.
    fn decide(&self, path: &str) -> Decision {
        let mut paths = self.paths.lock().unwrap();
        match paths.entry(path.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(PathSlot::probing());
                tracing::debug!("initial probe: {}", path);
                Decision::Proceed
            }
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                match &mut slot.state {
                    SlotState::Vacant => {
                        slot.state = SlotState::Probing;
                        tracing::debug!("inherited probe duty: {}", path);
                        Decision::Proceed
                    }
                    SlotState::Probing => Decision::Wait(slot.notify.clone()),
                    SlotState::Exempt => Decision::Proceed,
                    SlotState::Ready(quota) => {
                        if SystemTime::now() >= quota.reset_at {
                            slot.state = SlotState::Probing;
                            tracing::debug!("quota window expired, probing: {}", path);
                            return Decision::Proceed;
                        }
                        let floor = (quota.limit as f64 * self.reserve_fraction) as u64;
                        if quota.remaining > floor {
                            quota.remaining -= 1;
                            Decision::Proceed
                        } else {
                            Decision::SleepUntil(quota.reset_at)
                        }
                    }
                }
            }
        }
    }

    /// Re-check without claiming anything; used to confirm a wait is still
    /// warranted after registering on the notifier.
    fn still_probing(&self, path: &str) -> bool {
        let paths = self.paths.lock().unwrap();
        paths
            .get(path)
            .map(|slot| matches!(slot.state, SlotState::Probing))
            .unwrap_or(false)
    }

    /// Feed a received response back into the limiter. Called for every
    /// response, successful or not; only a path awaiting its probe result is
    /// updated. Missing quota headers permanently exempt the path.
    pub fn observe(&self, url: &Url, headers: &HeaderMap) {
        if !Self::should_limit(url) {
            return;
        }
        let path = url.path();

        let mut paths = self.paths.lock().unwrap();
        let Some(slot) = paths.get_mut(path) else {
            return;
        };
        match slot.state {
            SlotState::Probing | SlotState::Vacant => {
                slot.state = match Quota::from_headers(headers) {
                    Some(quota) => {
                        tracing::debug!(
                            "quota updated: {} {}/{} until {:?}",
                            path,
                            quota.remaining,
                            quota.limit,
                            quota.reset_at
                        );
                        SlotState::Ready(quota)
                    }
                    None => {
                        tracing::debug!("no quota headers, exempting: {}", path);
                        SlotState::Exempt
                    }
                };
                slot.probe_failures = 0;
                slot.notify.notify_waiters();
            }
            // A response while the quota is current carries nothing new.
            SlotState::Exempt | SlotState::Ready(_) => {}
        }
    }

    /// Release probe duty after a failed request so a waiter can re-claim it.
    ///
    /// After `probe_failure_limit` consecutive failures the path is marked
    /// exempt instead, releasing all waiters for good; otherwise a prober
    /// that never completes would leave them parked forever.
    pub fn relinquish(&self, url: &Url) {
        if !Self::should_limit(url) {
            return;
        }
        let path = url.path();

        let mut paths = self.paths.lock().unwrap();
        let Some(slot) = paths.get_mut(path) else {
            return;
        };
        match slot.state {
            SlotState::Exempt | SlotState::Ready(_) | SlotState::Vacant => {}
            SlotState::Probing => {
                slot.probe_failures += 1;
                if slot.probe_failures >= self.probe_failure_limit {
                    tracing::warn!(
                        "{} consecutive probe failures on {}, exempting path",
                        slot.probe_failures,
                        path
                    );
                    slot.state = SlotState::Exempt;
                } else {
                    slot.state = SlotState::Vacant;
                    tracing::debug!("probe duty released: {}", path);
                }
                slot.notify.notify_waiters();
            }
        }
    }
}
