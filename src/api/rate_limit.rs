//! Per-client-IP request quota.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::config::RateLimitConfig;
use crate::error::ApiError;

pub type IpRateLimiter = Arc<DefaultKeyedRateLimiter<IpAddr>>;

/// Middleware state: the keyed limiter and how clients are identified.
#[derive(Clone)]
pub struct IpRateLimit {
    pub limiter: IpRateLimiter,
    pub trust_forwarded: bool,
}

impl IpRateLimit {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limiter: create_ip_rate_limiter(config),
            trust_forwarded: config.trust_forwarded,
        }
    }
}

/// `max_requests` per `window`, replenished evenly across the window.
pub fn create_ip_rate_limiter(config: &RateLimitConfig) -> IpRateLimiter {
    let burst = NonZeroU32::new(config.max_requests).unwrap_or(NonZeroU32::MIN);
    let period = config.window / burst.get();
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst);

    Arc::new(RateLimiter::keyed(quota))
}

/// Drop idle client entries every `every` until the limiter is gone.
pub fn spawn_limiter_cleanup(limiter: &IpRateLimiter, every: Duration) -> tokio::task::JoinHandle<()> {
    let weak: Weak<DefaultKeyedRateLimiter<IpAddr>> = Arc::downgrade(limiter);
    let every = every.max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(limiter) = weak.upgrade() else {
                break;
            };
            limiter.retain_recent();
            limiter.shrink_to_fit();
            tracing::debug!(tracked_clients = limiter.len(), "Pruned rate limiter");
        }
    })
}

/// Client IP used as the quota key.
///
/// The peer address, unless `trust_forwarded` is set and the request carries
/// a parsable first `X-Forwarded-For` entry.
pub fn client_ip(request: &Request, trust_forwarded: bool) -> Option<IpAddr> {
    let forwarded = trust_forwarded
        .then(|| {
            request
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        })
        .flatten();

    forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

pub async fn ip_rate_limit(
    State(rate_limit): State<IpRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(ip) = client_ip(&request, rate_limit.trust_forwarded) else {
        tracing::warn!("Could not determine IP for rate limiting");
        return Ok(next.run(request).await);
    };

    match rate_limit.limiter.check_key(&ip) {
        Ok(()) => Ok(next.run(request).await),
        Err(negative) => {
            let wait = negative.wait_time_from(DefaultClock::default().now());
            tracing::warn!(client = %ip, retry_after_secs = wait.as_secs(), "Rate limit exceeded");
            Err(ApiError::RateLimited {
                retry_after_secs: wait.as_secs().max(1),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request_with(forwarded: Option<&str>, peer: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/gemini");
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    fn quota_of(max_requests: u32) -> RateLimitConfig {
        RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
            ..RateLimitConfig::default()
        }
    }

    #[test]
    fn peer_address_is_the_default_key() {
        let request = request_with(Some("203.0.113.9, 10.0.0.1"), Some("127.0.0.1:5000"));
        assert_eq!(client_ip(&request, false), Some("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn forwarded_header_wins_when_trusted() {
        let request = request_with(Some("203.0.113.9, 10.0.0.1"), Some("127.0.0.1:5000"));
        assert_eq!(client_ip(&request, true), Some("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn unparsable_forwarded_header_falls_back_to_peer() {
        let request = request_with(Some("garbage"), Some("198.51.100.4:443"));
        assert_eq!(client_ip(&request, true), Some("198.51.100.4".parse().unwrap()));
    }

    #[test]
    fn unknown_client_yields_none() {
        assert_eq!(client_ip(&request_with(None, None), false), None);
        assert_eq!(client_ip(&request_with(Some("203.0.113.9"), None), false), None);
    }

    #[test]
    fn quota_is_per_ip() {
        let limiter = create_ip_rate_limiter(&quota_of(2));
        let a: IpAddr = "203.0.113.1".parse().unwrap();
        let b: IpAddr = "203.0.113.2".parse().unwrap();

        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_err());
        assert!(limiter.check_key(&b).is_ok());
    }

    #[test]
    fn zero_max_still_builds() {
        let limiter = create_ip_rate_limiter(&RateLimitConfig {
            max_requests: 0,
            window: Duration::ZERO,
            trust_forwarded: false,
        });
        let ip: IpAddr = "203.0.113.1".parse().unwrap();
        assert!(limiter.check_key(&ip).is_ok());
    }

    #[tokio::test]
    async fn rotating_forwarded_header_shares_the_peer_quota() {
        use axum::Router;
        use axum::http::StatusCode;
        use axum::routing::post;
        use tower::ServiceExt;

        let rate_limit = IpRateLimit::new(&quota_of(2));
        let app = Router::new()
            .route("/api/gemini", post(|| async { "ok" }))
            .route_layer(axum::middleware::from_fn_with_state(
                rate_limit.clone(),
                ip_rate_limit,
            ));

        let mut limited = 0;
        for i in 0..20 {
            let forwarded = format!("10.0.0.{i}");
            let mut request = request_with(Some(forwarded.as_str()), Some("192.0.2.7:40000"));
            *request.method_mut() = axum::http::Method::POST;
            let response = app.clone().oneshot(request).await.unwrap();
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                limited += 1;
            }
        }

        assert_eq!(limited, 18);
        assert_eq!(rate_limit.limiter.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_prunes_idle_clients_and_stops_with_limiter() {
        let limiter = create_ip_rate_limiter(&RateLimitConfig {
            max_requests: 1,
            window: Duration::from_secs(1),
            trust_forwarded: false,
        });
        for i in 0..10u8 {
            let ip = IpAddr::from([198, 51, 100, i]);
            assert!(limiter.check_key(&ip).is_ok());
        }
        assert_eq!(limiter.len(), 10);

        let task = spawn_limiter_cleanup(&limiter, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(limiter.len(), 0);

        drop(limiter);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(task.is_finished());
    }
}
