use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{AppState, errors::AppError};

pub type KeyedRateLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

// Requests without a known peer address share one bucket.
const SHARED_KEY: &str = "anonymous";

/// Build a keyed rate limiter allowing `per_minute` requests per client.
/// A zero quota is raised to one.
#[must_use]
pub fn build_rate_limiter(per_minute: u32) -> Arc<KeyedRateLimiter> {
    let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::keyed(quota))
}

/// Periodically drops client keys whose quota has fully replenished.
pub fn spawn_pruning(limiter: Arc<KeyedRateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            limiter.retain_recent();
            limiter.shrink_to_fit();
            tracing::debug!(clients = limiter.len(), "pruned rate limiter");
        }
    })
}

fn forwarded_client(req: &Request<Body>) -> Option<IpAddr> {
    req.headers()
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// The peer address of the connection, or the client named in
/// `X-Forwarded-For` when the peer is one of `trusted_proxies`.
fn client_key(req: &Request<Body>, trusted_proxies: &[IpAddr]) -> String {
    let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>() else {
        return SHARED_KEY.to_string();
    };
    let peer = peer.ip();

    if trusted_proxies.contains(&peer) {
        if let Some(client) = forwarded_client(req) {
            return client.to_string();
        }
    }
    peer.to_string()
}

/// Rejects requests once the calling client has used up its quota.
///
/// # Errors
/// Returns `RateLimited` when the quota for the client key is exhausted.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let key = client_key(&req, &state.config.trusted_proxies);
    if state.rate_limiter.check_key(&key).is_err() {
        tracing::warn!(client = %key, "rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    Ok(next.run(req).await)
}
