//! Fetch and cache [`AgentProfile`]s with HTTP cache semantics (§4.1).
//!
//! The cache is the gateway's only mutable cross-request structure (§5):
//! fresh hits are lock-free aside from an atomic recency bump, so
//! concurrent readers never block each other; inserts and evictions take
//! the writer lock. Recency is tracked as a logical clock on each entry
//! rather than a literal linked access list, which is what lets a fresh
//! hit avoid serializing against other fresh hits while keeping eviction
//! order correct (grounded on the teacher's `RateLimiter`'s
//! `Mutex<VecDeque<Instant>>` window, generalized here to a
//! `RwLock<HashMap<_, Arc<_>>>` plus per-entry atomics for the reader
//! concurrency §5 requires).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use ucp_core::AgentProfile;

/// Response body size limit for a profile fetch (§4.1).
pub const MAX_PROFILE_BYTES: usize = 1024 * 1024;

/// Default TTL used when neither `Cache-Control: max-age` nor `Expires`
/// is present on the response (§4.1).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Failure fetching or parsing an agent profile.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Upstream responded with a non-2xx, non-304 status.
    #[error("profile endpoint returned HTTP {0}")]
    Http(u16),
    /// Response body exceeded [`MAX_PROFILE_BYTES`].
    #[error("profile response exceeded {MAX_PROFILE_BYTES} bytes")]
    TooLarge,
    /// Response body was not valid JSON.
    #[error("invalid profile JSON: {0}")]
    Json(#[from] serde_json::Error),
}

struct CacheEntry {
    profile: AgentProfile,
    etag: Option<String>,
    expires_at: DateTime<Utc>,
    last_access: AtomicU64,
}

/// Process-local cache of fetched agent profiles.
pub struct ProfileCache {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    clock: AtomicU64,
    max_entries: usize,
    client: reqwest::Client,
}

impl ProfileCache {
    /// Create a cache backed by `client`, evicting at `max_entries`
    /// (default 1000 per §4.1).
    #[must_use]
    pub fn new(client: reqwest::Client, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            max_entries,
            client,
        }
    }

    /// Fetch the profile at `profile_url`, honoring the contract in §4.1:
    /// fresh cache hit returns immediately; a stale or missing entry
    /// triggers a conditional GET; a fetch failure with a prior entry
    /// falls back to the stale entry (no error surfaced); a fetch failure
    /// with no prior entry propagates as [`FetchError`].
    pub async fn fetch(&self, profile_url: &str) -> Result<AgentProfile, FetchError> {
        let now = Utc::now();

        if let Some(entry) = self.fresh_hit(profile_url, now).await {
            return Ok(entry.profile.clone());
        }

        let prior = self.get_any(profile_url).await;
        let etag = prior.as_ref().and_then(|e| e.etag.clone());

        match self.conditional_get(profile_url, etag.as_deref()).await {
            Ok(FetchOutcome::NotModified) => {
                if let Some(prior) = prior {
                    let ttl = DEFAULT_TTL;
                    self.insert(profile_url, prior.profile.clone(), prior.etag.clone(), now, ttl)
                        .await;
                    Ok(prior.profile.clone())
                } else {
                    Err(FetchError::Http(304))
                }
            }
            Ok(FetchOutcome::Fresh { profile, etag, ttl }) => {
                self.insert(profile_url, profile.clone(), etag, now, ttl).await;
                Ok(profile)
            }
            Err(err) => {
                if let Some(prior) = prior {
                    tracing::warn!(profile_url, error = %err, "profile fetch failed, serving stale entry");
                    Ok(prior.profile.clone())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Drop every cached entry. O(1) semantically: swaps in an empty map.
    pub async fn clear(&self) {
        let mut guard = self.entries.write().await;
        *guard = HashMap::new();
    }

    async fn fresh_hit(&self, profile_url: &str, now: DateTime<Utc>) -> Option<Arc<CacheEntry>> {
        let guard = self.entries.read().await;
        let entry = guard.get(profile_url)?;
        if entry.expires_at > now {
            entry.last_access.store(self.tick(), Ordering::Relaxed);
            Some(Arc::clone(entry))
        } else {
            None
        }
    }

    async fn get_any(&self, profile_url: &str) -> Option<Arc<CacheEntry>> {
        let guard = self.entries.read().await;
        guard.get(profile_url).map(Arc::clone)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    async fn insert(
        &self,
        profile_url: &str,
        profile: AgentProfile,
        etag: Option<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) {
        let expires_at = now
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));
        let entry = Arc::new(CacheEntry {
            profile,
            etag,
            expires_at,
            last_access: AtomicU64::new(self.tick()),
        });

        let mut guard = self.entries.write().await;
        if !guard.contains_key(profile_url) && guard.len() >= self.max_entries {
            if let Some(lru_key) = guard
                .iter()
                .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone())
            {
                guard.remove(&lru_key);
            }
        }
        guard.insert(profile_url.to_string(), entry);
    }

    async fn conditional_get(
        &self,
        profile_url: &str,
        etag: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        let mut req = self
            .client
            .get(profile_url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(etag) = etag {
            req = req.header(reqwest::header::IF_NONE_MATCH, etag);
        }

        let resp = req.send().await?;

        if resp.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if !resp.status().is_success() {
            return Err(FetchError::Http(resp.status().as_u16()));
        }

        if let Some(len) = resp.content_length() {
            if len as usize > MAX_PROFILE_BYTES {
                return Err(FetchError::TooLarge);
            }
        }

        let etag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let ttl = derive_ttl(resp.headers());

        let body = resp.bytes().await?;
        if body.len() > MAX_PROFILE_BYTES {
            return Err(FetchError::TooLarge);
        }
        let profile: AgentProfile = serde_json::from_slice(&body)?;

        Ok(FetchOutcome::Fresh { profile, etag, ttl })
    }
}

enum FetchOutcome {
    NotModified,
    Fresh {
        profile: AgentProfile,
        etag: Option<String>,
        ttl: Duration,
    },
}

/// TTL derivation order (§4.1): `Cache-Control: max-age=N` (first
/// `max-age=` directive, any position, nonnegative integer), then
/// `Expires` (absolute, converted to a positive duration), otherwise
/// [`DEFAULT_TTL`].
fn derive_ttl(headers: &reqwest::header::HeaderMap) -> Duration {
    if let Some(cc) = headers
        .get(reqwest::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(seconds) = parse_max_age(cc) {
            return Duration::from_secs(seconds);
        }
    }

    if let Some(expires) = headers
        .get(reqwest::header::EXPIRES)
        .and_then(|v| v.to_str().ok())
    {
        if let Ok(when) = DateTime::parse_from_rfc2822(expires) {
            let delta = when.with_timezone(&Utc) - Utc::now();
            if let Ok(std_duration) = delta.to_std() {
                return std_duration;
            }
        }
    }

    DEFAULT_TTL
}

fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').find_map(|directive| {
        let directive = directive.trim();
        let value = directive.strip_prefix("max-age=")?;
        value.trim().parse::<u64>().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_profile_json() -> serde_json::Value {
        serde_json::json!({"version": "2026-01-11", "capabilities": {}, "payment_handlers": {}})
    }

    #[test]
    fn parse_max_age_finds_first_directive_at_any_position() {
        assert_eq!(parse_max_age("no-cache, max-age=120, private"), Some(120));
        assert_eq!(parse_max_age("max-age=0"), Some(0));
        assert_eq!(parse_max_age("private"), None);
    }

    #[tokio::test]
    async fn fresh_hit_does_not_touch_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(test_profile_json())
                    .insert_header("Cache-Control", "max-age=3600"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = ProfileCache::new(reqwest::Client::new(), 1000);
        let url = format!("{}/profile", server.uri());
        cache.fetch(&url).await.unwrap();
        cache.fetch(&url).await.unwrap();
        // `.expect(1)` above is verified when `server` drops.
    }

    #[tokio::test]
    async fn not_modified_refreshes_and_reuses_cached_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(test_profile_json())
                    .insert_header("Cache-Control", "max-age=0")
                    .insert_header("ETag", "\"v1\""),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .and(header("If-None-Match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let cache = ProfileCache::new(reqwest::Client::new(), 1000);
        let url = format!("{}/profile", server.uri());
        let first = cache.fetch(&url).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        let second = cache.fetch(&url).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn stale_on_error_returns_cached_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(test_profile_json())
                    .insert_header("Cache-Control", "max-age=0"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cache = ProfileCache::new(reqwest::Client::new(), 1000);
        let url = format!("{}/profile", server.uri());
        let first = cache.fetch(&url).await.unwrap();
        let second = cache.fetch(&url).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn fetch_failure_with_no_prior_entry_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/profile"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cache = ProfileCache::new(reqwest::Client::new(), 1000);
        let url = format!("{}/profile", server.uri());
        assert!(cache.fetch(&url).await.is_err());
    }

    #[tokio::test]
    async fn lru_evicts_least_recently_accessed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(test_profile_json())
                    .insert_header("Cache-Control", "max-age=3600"),
            )
            .mount(&server)
            .await;

        let cache = ProfileCache::new(reqwest::Client::new(), 2);
        let url_a = format!("{}/a", server.uri());
        let url_b = format!("{}/b", server.uri());
        let url_c = format!("{}/c", server.uri());

        cache.fetch(&url_a).await.unwrap();
        cache.fetch(&url_b).await.unwrap();
        // Touch `a` so `b` becomes least-recently-used.
        cache.fetch(&url_a).await.unwrap();
        cache.fetch(&url_c).await.unwrap();

        let guard = cache.entries.read().await;
        assert!(guard.contains_key(&url_a));
        assert!(guard.contains_key(&url_c));
        assert!(!guard.contains_key(&url_b));
    }

    #[tokio::test]
    async fn clear_drops_all_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(test_profile_json())
                    .insert_header("Cache-Control", "max-age=3600"),
            )
            .mount(&server)
            .await;

        let cache = ProfileCache::new(reqwest::Client::new(), 1000);
        let url = format!("{}/profile", server.uri());
        cache.fetch(&url).await.unwrap();
        cache.clear().await;
        assert!(cache.entries.read().await.is_empty());
    }
}
