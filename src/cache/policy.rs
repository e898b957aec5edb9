//! Which upstream responses are worth keeping, and for how long.

use std::time::Duration;

use crate::http::{Method, StatusCode};

/// The caching verdict for one upstream response. Computed once, never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    DoNotCache,
    /// Absent artifacts: kept briefly so a later publish is not masked for long.
    CacheShort(Duration),
    /// Published artifacts: content at a key never changes.
    CacheLong(Duration),
}

impl Decision {
    /// Time-to-live for the stored entry, if anything should be stored.
    pub fn ttl(self) -> Option<Duration> {
        match self {
            Self::DoNotCache => None,
            Self::CacheShort(ttl) | Self::CacheLong(ttl) => Some(ttl),
        }
    }

    /// The `Cache-Control` value advertising this decision to downstream caches.
    pub fn cache_control(self) -> String {
        match self {
            Self::DoNotCache => "no-store".to_owned(),
            Self::CacheShort(ttl) => format!("public, max-age={}", ttl.as_secs()),
            Self::CacheLong(ttl) => format!("public, max-age={}, immutable", ttl.as_secs()),
        }
    }
}

/// Maps a request method and upstream status to a [`Decision`].
///
/// | Method | Status         | Decision     |
/// |--------|----------------|--------------|
/// | GET    | 200            | `CacheLong`  |
/// | GET    | 404            | `CacheShort` |
/// | GET    | anything else  | `DoNotCache` |
/// | HEAD   | any            | `DoNotCache` |
///
/// Transport failures never reach the policy and are never cached.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    long_ttl: Duration,
    short_ttl: Duration,
}

impl CachePolicy {
    pub fn new(long_ttl: Duration, short_ttl: Duration) -> Self {
        Self {
            long_ttl,
            short_ttl,
        }
    }

    /// Whether, and for how long, the response to this request may be stored.
    pub fn decide(&self, method: &Method, status: StatusCode) -> Decision {
        match (method, status) {
            (Method::Get, StatusCode::OK) => Decision::CacheLong(self.long_ttl),
            (Method::Get, StatusCode::NOT_FOUND) => Decision::CacheShort(self.short_ttl),
            _ => Decision::DoNotCache,
        }
    }

    /// The freshness a response with `status` advertises to clients.
    ///
    /// This describes the resource rather than the request, so a `HEAD`
    /// advertises what the matching `GET` would.
    pub fn freshness(&self, status: StatusCode) -> Decision {
        self.decide(&Method::Get, status)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(365 * 24 * 60 * 60), Duration::from_secs(60 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> StatusCode {
        StatusCode::from_u16(code).unwrap()
    }

    #[test]
    fn decision_table() {
        let policy = CachePolicy::new(Duration::from_secs(100), Duration::from_secs(10));
        let long = Decision::CacheLong(Duration::from_secs(100));
        let short = Decision::CacheShort(Duration::from_secs(10));

        assert_eq!(policy.decide(&Method::Get, status(200)), long);
        assert_eq!(policy.decide(&Method::Get, status(404)), short);
        for code in [206, 301, 400, 403, 410, 500, 502, 503] {
            assert_eq!(policy.decide(&Method::Get, status(code)), Decision::DoNotCache, "{code}");
        }
        for code in [200, 404, 500] {
            assert_eq!(policy.decide(&Method::Head, status(code)), Decision::DoNotCache);
        }
        assert_eq!(policy.decide(&Method::Post, status(200)), Decision::DoNotCache);
    }

    #[test]
    fn head_freshness_mirrors_get() {
        let policy = CachePolicy::default();
        assert_eq!(policy.freshness(status(200)), policy.decide(&Method::Get, status(200)));
    }

    #[test]
    fn cache_control_values() {
        let year = Duration::from_secs(31_536_000);
        assert_eq!(
            Decision::CacheLong(year).cache_control(),
            "public, max-age=31536000, immutable"
        );
        assert_eq!(
            Decision::CacheShort(Duration::from_secs(3600)).cache_control(),
            "public, max-age=3600"
        );
        assert_eq!(Decision::DoNotCache.cache_control(), "no-store");
        assert_eq!(Decision::DoNotCache.ttl(), None);
    }
}
