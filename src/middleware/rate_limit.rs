//! Rate limiting middleware.
//!
//! In-memory admission control per client key using a token bucket. Each key
//! gets a bucket of `capacity` tokens that refills continuously at
//! `refill_per_sec`; a request spends one token or is rejected with 429.
//! Idle buckets are evicted by a background sweeper so the registry stays
//! bounded under churn of distinct clients.

use crate::middleware::rejection::GateRejection;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Burst size: a fresh client may issue this many requests back to back.
pub const DEFAULT_CAPACITY: u32 = 20;
/// Sustained rate: tokens added per second, continuously.
pub const DEFAULT_REFILL_PER_SEC: f64 = 10.0;
/// How often the sweeper looks for idle buckets.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Buckets not seen for longer than this are evicted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(180);

/// Configuration for rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum tokens a bucket can hold (burst size).
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_per_sec: f64,
    /// Period of the eviction sweep.
    pub sweep_interval: Duration,
    /// Idle time after which a bucket is evicted.
    pub idle_timeout: Duration,
    /// Derive the client key from `X-Forwarded-For` instead of the peer address.
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            refill_per_sec: DEFAULT_REFILL_PER_SEC,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            trust_proxy_headers: false,
        }
    }
}

#[derive(Debug, Clone)]
struct ClientBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl ClientBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    fn refill(&mut self, capacity: f64, refill_per_sec: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = self.last_refill.max(now);
    }
}

/// Per-client token bucket registry.
///
/// Cloning is cheap and every clone shares the same registry, so one instance
/// can be handed to the middleware and to the sweeper task.
#[derive(Clone)]
pub struct AdmissionController {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, ClientBucket>>>,
}

impl AdmissionController {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Spend one token for `client_key` if available.
    pub fn admit(&self, client_key: &str) -> bool {
        self.admit_at(client_key, Instant::now())
    }

    /// Same as [`admit`](Self::admit) with an explicit clock reading.
    pub fn admit_at(&self, client_key: &str, now: Instant) -> bool {
        let capacity = f64::from(self.config.capacity);
        let mut buckets = self.buckets.lock();

        // Lookup and insert happen under one lock, so two first sightings of
        // the same key always land on the same bucket.
        let bucket = buckets
            .entry(client_key.to_owned())
            .or_insert_with(|| ClientBucket::full(capacity, now));

        bucket.refill(capacity, self.config.refill_per_sec, now);
        bucket.last_seen = bucket.last_seen.max(now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens `client_key` would have available at `now`, without spending or
    /// recording anything. `None` if the key has no bucket.
    pub fn tokens_at(&self, client_key: &str, now: Instant) -> Option<f64> {
        let buckets = self.buckets.lock();
        buckets.get(client_key).map(|bucket| {
            let mut snapshot = bucket.clone();
            snapshot.refill(
                f64::from(self.config.capacity),
                self.config.refill_per_sec,
                now,
            );
            snapshot.tokens
        })
    }

    /// Number of tracked client keys.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Evict idle buckets. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let idle_timeout = self.config.idle_timeout;
        let mut buckets = self.buckets.lock();
        let before = buckets.len();

        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= idle_timeout);

        before - buckets.len()
    }

    /// Spawn the periodic eviction sweep. The task runs until
    /// [`SweeperHandle::stop`] is called or the handle is dropped.
    pub fn start_sweeper(&self) -> SweeperHandle {
        let limiter = self.clone();
        let period = self.config.sweep_interval;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        if evicted > 0 {
                            debug!(
                                evicted,
                                remaining = limiter.tracked_clients(),
                                "Evicted idle rate limit buckets"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        info!(
            period_secs = period.as_secs(),
            idle_secs = self.config.idle_timeout.as_secs(),
            "Rate limit sweeper started"
        );

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Client key for a request: the peer IP, or the first `X-Forwarded-For`
    /// hop when proxy headers are trusted.
    pub fn client_key(&self, peer: SocketAddr, headers: &HeaderMap) -> String {
        if self.config.trust_proxy_headers {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|hop| !hop.is_empty());

            if let Some(hop) = forwarded {
                return hop.to_string();
            }
        }

        peer.ip().to_string()
    }
}

/// Lifecycle handle for the sweeper task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to exit and wait for it.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Rate limit sweeper ended abnormally: {}", e);
        } else {
            info!("Rate limit sweeper stopped");
        }
    }
}

/// Rate limiting middleware function.
///
/// Runs before authentication; a rejected request never reaches credential
/// validation or a handler.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<AdmissionController>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = limiter.client_key(addr, request.headers());

    if limiter.admit(&client) {
        return next.run(request).await;
    }

    warn!(
        client = %client,
        path = %request.uri().path(),
        "Rate limit exceeded"
    );

    GateRejection::RateLimited.into_response()
}
