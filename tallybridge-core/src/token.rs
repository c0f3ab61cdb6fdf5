//! In-memory bearer token cache.
//!
//! One [`CachedToken`] per upstream [`ServiceId`], held in a [`TokenStore`]
//! that is created at process start and injected wherever a gateway is
//! built. Tokens are never persisted; a restart simply costs one extra
//! refresh call.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::model::ServiceId;
use crate::secret::Secret;

/// Safety margin in seconds: a token is treated as expired this long before
/// the upstream actually invalidates it.
pub const EXPIRY_MARGIN_SECS: i64 = 300;

/// A bearer token together with its local expiry deadline.
///
/// Replaced wholesale on every successful refresh; never partially updated.
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: Secret,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Build a token from an upstream grant, applying the expiry margin.
    ///
    /// `expires_at = now + max(expires_in, 1) - 300s`, floored at now so a
    /// short-lived grant is treated as immediately near-expiry rather than
    /// producing a deadline in the past.
    pub fn issue(access_token: impl Into<String>, expires_in: i64) -> Self {
        let ttl = (expires_in.max(1) - EXPIRY_MARGIN_SECS).max(0);
        Self {
            access_token: Secret::new(access_token),
            expires_at: Utc::now() + Duration::seconds(ttl),
        }
    }

    /// Build a token with an explicit expiry deadline.
    pub fn with_expiry(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            expires_at,
        }
    }

    /// A token is valid iff it is non-empty and its deadline is in the
    /// future.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && Utc::now() < self.expires_at
    }
}

/// Shared in-memory token cache, keyed by service identity.
///
/// Concurrent reconciliation calls may both observe an expired token and
/// both refresh; the cache ends up holding whichever refresh completed last.
/// That is correct because any valid token is usable and tokens are not
/// single-use. The lock only guarantees the (token, expiry) pair is read and
/// written consistently.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: RwLock<HashMap<ServiceId, CachedToken>>,
}

impl TokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached token for a service, valid or not.
    pub fn get(&self, service: &ServiceId) -> Option<CachedToken> {
        self.tokens.read().get(service).cloned()
    }

    /// Replace the cached token for a service.
    ///
    /// The previous token becomes unreachable; no upstream revocation is
    /// made, since the refresh grant does not invalidate earlier access
    /// tokens before their natural expiry.
    pub fn set(&self, service: &ServiceId, token: CachedToken) {
        tracing::debug!("Token updated for {}. Expires at: {}", service, token.expires_at);
        self.tokens.write().insert(service.clone(), token);
    }

    /// Whether the service currently holds a valid token.
    pub fn is_valid(&self, service: &ServiceId) -> bool {
        self.tokens
            .read()
            .get(service)
            .map(CachedToken::is_valid)
            .unwrap_or(false)
    }

    /// Drop the cached token for a service.
    pub fn clear(&self, service: &ServiceId) {
        self.tokens.write().remove(service);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ServiceId {
        ServiceId::new("accounting-primary")
    }

    #[test]
    fn test_store_empty_before_acquire() {
        let store = TokenStore::new();
        assert!(!store.is_valid(&service()));
        assert!(store.get(&service()).is_none());
    }

    #[test]
    fn test_issue_applies_margin() {
        let token = CachedToken::issue("tok", 3600);
        let remaining = token.expires_at - Utc::now();
        assert!(remaining <= Duration::seconds(3600 - EXPIRY_MARGIN_SECS));
        assert!(remaining > Duration::seconds(3600 - EXPIRY_MARGIN_SECS - 5));
        assert!(token.is_valid());
    }

    #[test]
    fn test_issue_short_ttl_is_immediately_near_expiry() {
        // expires_in at or under the margin floors to now instead of going
        // negative.
        let token = CachedToken::issue("tok", 120);
        assert!(token.expires_at >= Utc::now() - Duration::seconds(1));
        assert!(!token.is_valid());
    }

    #[test]
    fn test_validity_pinned_around_deadline() {
        // A deadline barely in the future is still valid; one barely in the
        // past is not. Together with test_issue_applies_margin this pins the
        // window to expires_in - 300 seconds.
        let before = CachedToken::with_expiry("tok", Utc::now() + Duration::milliseconds(500));
        assert!(before.is_valid());

        let after = CachedToken::with_expiry("tok", Utc::now() - Duration::milliseconds(1));
        assert!(!after.is_valid());
    }

    #[test]
    fn test_empty_token_never_valid() {
        let token = CachedToken::with_expiry("", Utc::now() + Duration::hours(1));
        assert!(!token.is_valid());
    }

    #[test]
    fn test_set_then_valid() {
        let store = TokenStore::new();
        store.set(
            &service(),
            CachedToken::with_expiry("tok", Utc::now() + Duration::hours(1)),
        );
        assert!(store.is_valid(&service()));
        assert_eq!(store.get(&service()).unwrap().access_token.expose(), "tok");
    }

    #[test]
    fn test_set_overwrites_wholesale() {
        let store = TokenStore::new();
        store.set(
            &service(),
            CachedToken::with_expiry("old", Utc::now() + Duration::hours(1)),
        );
        store.set(
            &service(),
            CachedToken::with_expiry("new", Utc::now() + Duration::hours(2)),
        );
        assert_eq!(store.get(&service()).unwrap().access_token.expose(), "new");
    }

    #[test]
    fn test_services_do_not_share_tokens() {
        let store = TokenStore::new();
        store.set(
            &ServiceId::new("accounting-secondary"),
            CachedToken::with_expiry("tok", Utc::now() + Duration::hours(1)),
        );
        assert!(!store.is_valid(&ServiceId::new("storage")));
    }

    #[test]
    fn test_expired_token_invalid() {
        let store = TokenStore::new();
        store.set(
            &service(),
            CachedToken::with_expiry("tok", Utc::now() - Duration::seconds(1)),
        );
        assert!(!store.is_valid(&service()));
    }
}
