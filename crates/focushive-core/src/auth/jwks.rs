//! JWKS fetch and per-`kid` decoding-key resolution, with a positive and a
//! negative TTL cache so repeated lookups for an unknown `kid` do not
//! hammer the authoritative endpoint.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::DecodingKey;
use serde::Deserialize;

use crate::error::{AuthenticationFailure, CoreError};
use crate::kernel::Clock;

use super::cache::Cache;

const POSITIVE_TTL: Duration = Duration::from_secs(3600);
const NEGATIVE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Clone)]
enum CacheSlot {
    Found(Arc<DecodingKey>),
    Missing,
}

/// Resolves a signing key by `kid`, fetching and caching the JWKS document
/// from `jwks_url` on miss. Concurrent misses for the same `kid` coalesce
/// through the underlying cache's single-flight guard.
pub struct JwksResolver {
    jwks_url: Option<String>,
    http: reqwest::Client,
    cache: Cache<String, CacheSlot>,
}

impl JwksResolver {
    pub fn new(jwks_url: Option<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            jwks_url,
            http: reqwest::Client::new(),
            cache: Cache::new(clock),
        }
    }

    pub async fn resolve(&self, kid: &str) -> Result<Arc<DecodingKey>, CoreError> {
        let Some(jwks_url) = self.jwks_url.clone() else {
            return Err(CoreError::Authentication(AuthenticationFailure::InvalidSignature));
        };

        let slot = self
            .cache
            .get_or_fetch_with_ttl(kid.to_string(), || {
                let jwks_url = jwks_url.clone();
                let http = self.http.clone();
                let kid = kid.to_string();
                async move {
                    let slot = Self::fetch_key(&http, &jwks_url, &kid).await?;
                    let ttl = match slot {
                        CacheSlot::Found(_) => POSITIVE_TTL,
                        CacheSlot::Missing => NEGATIVE_TTL,
                    };
                    Ok::<_, CoreError>((slot, ttl))
                }
            })
            .await?;

        match slot {
            CacheSlot::Found(key) => Ok(key),
            CacheSlot::Missing => Err(CoreError::Authentication(AuthenticationFailure::InvalidSignature)),
        }
    }

    async fn fetch_key(http: &reqwest::Client, jwks_url: &str, kid: &str) -> Result<CacheSlot, CoreError> {
        let response = http.get(jwks_url).send().await.map_err(|e| {
            CoreError::Transient(crate::error::TransientFailure::Retryable {
                dependency: "identity".to_string(),
                message: e.to_string(),
            })
        })?;
        let jwk_set: JwkSet = response.json().await.map_err(|e| {
            CoreError::Transient(crate::error::TransientFailure::Retryable {
                dependency: "identity".to_string(),
                message: e.to_string(),
            })
        })?;

        match jwk_set.keys.into_iter().find(|k| k.kid == kid) {
            Some(jwk) => {
                let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
                    .map_err(|_| CoreError::Authentication(AuthenticationFailure::InvalidSignature))?;
                Ok(CacheSlot::Found(Arc::new(key)))
            }
            None => Ok(CacheSlot::Missing),
        }
    }

    /// Note the negative-cache entry directly, skipping the positive TTL --
    /// used when this resolver already knows a `kid` is absent without an
    /// outbound fetch (e.g. replaying test fixtures).
    #[cfg(test)]
    pub fn seed_missing(&self, kid: &str) {
        self.cache.put(kid.to_string(), CacheSlot::Missing, NEGATIVE_TTL);
    }

    #[cfg(test)]
    pub fn seed_key(&self, kid: &str, key: DecodingKey) {
        self.cache
            .put(kid.to_string(), CacheSlot::Found(Arc::new(key)), POSITIVE_TTL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::FakeClock;

    fn resolver() -> (JwksResolver, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        (JwksResolver::new(Some("https://idp.example/.well-known/jwks.json".into()), clock.clone()), clock)
    }

    #[tokio::test]
    async fn a_seeded_key_resolves_without_any_fetch() {
        let (resolver, _clock) = resolver();
        let key = DecodingKey::from_rsa_components(
            "sXchr3Z3Z5y4y0r5k9w8",
            "AQAB",
        )
        .unwrap();
        resolver.seed_key("kid-1", key);

        assert!(resolver.resolve("kid-1").await.is_ok());
    }

    #[tokio::test]
    async fn a_seeded_negative_entry_rejects_as_invalid_signature() {
        let (resolver, _clock) = resolver();
        resolver.seed_missing("unknown-kid");

        let err = resolver.resolve("unknown-kid").await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Authentication(AuthenticationFailure::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn a_negative_entry_expires_after_its_ttl() {
        let (resolver, clock) = resolver();
        resolver.seed_missing("kid-2");
        clock.advance(chrono::Duration::from_std(NEGATIVE_TTL).unwrap() + chrono::Duration::seconds(1));

        // past the negative TTL the cache no longer short-circuits, so this
        // falls through to an outbound fetch against the configured URL and
        // fails as a transient error rather than the cached auth failure.
        let err = resolver.resolve("kid-2").await.unwrap_err();
        assert!(matches!(err, CoreError::Transient(_)));
    }

    #[tokio::test]
    async fn no_jwks_url_configured_is_an_immediate_authentication_failure() {
        let clock = Arc::new(FakeClock::new(chrono::Utc::now()));
        let resolver = JwksResolver::new(None, clock);
        let err = resolver.resolve("any-kid").await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Authentication(AuthenticationFailure::InvalidSignature)
        ));
    }
}
