//! Auth gateway: validates bearer credentials against a rotating JWKS key
//! set, consults a revocation set, and exposes a cached verdict.
//!
//! `verify(credential) -> {userRef, tokenId, exp} | fails<ExpiredToken |
//! InvalidSignature | Revoked | Malformed>`.

pub mod cache;
pub mod jwks;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::{AuthenticationFailure, CoreError};
use crate::kernel::{Clock, KeyValueStore};

use cache::Cache;
use jwks::JwksResolver;
pub use types::{Claims, Role, UserRef, VerifiedToken};

const MAX_VERDICT_TTL: Duration = Duration::from_secs(300);

fn hash_token(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    hex::encode(digest)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> CoreError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => {
            CoreError::Authentication(AuthenticationFailure::Expired { exp: Utc::now() })
        }
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidKeyFormat => {
            CoreError::Authentication(AuthenticationFailure::InvalidSignature)
        }
        _ => CoreError::Authentication(AuthenticationFailure::Malformed(err.to_string())),
    }
}

/// Auth gateway: one instance per process, constructor-wired with its
/// collaborators (the revocation key-value store and the clock).
pub struct AuthGateway {
    config: AuthConfig,
    jwks: JwksResolver,
    verdict_cache: Cache<String, VerifiedToken>,
    revocation_store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl AuthGateway {
    pub fn new(config: AuthConfig, revocation_store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            jwks: JwksResolver::new(config.jwks_url.clone(), clock.clone()),
            verdict_cache: Cache::new(clock.clone()),
            revocation_store,
            clock,
            config,
        }
    }

    /// Run the full verification pipeline, short-circuiting on a cached
    /// positive verdict.
    pub async fn verify(&self, credential: &str) -> Result<VerifiedToken, CoreError> {
        let token_hash = hash_token(credential);
        if let Some(verdict) = self.verdict_cache.get(&token_hash) {
            return Ok(verdict);
        }

        let header = jsonwebtoken::decode_header(credential)
            .map_err(|e| CoreError::Authentication(AuthenticationFailure::Malformed(e.to_string())))?;

        let (decoding_key, algorithm) = self.resolve_key(&header).await?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = self.config.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &self.config.jwt_issuer {
            validation.set_issuer(&[issuer]);
        }

        let token_data = jsonwebtoken::decode::<Claims>(credential, &decoding_key, &validation)
            .map_err(map_jwt_error)?;
        let claims = token_data.claims;

        let revoke_key = format!("revoke:{}", claims.jti);
        if self
            .revocation_store
            .get(&revoke_key)
            .await
            .map_err(CoreError::from)?
            .is_some()
        {
            warn!(jti = %claims.jti, "rejecting revoked token");
            return Err(CoreError::Authentication(AuthenticationFailure::Revoked {
                jti: claims.jti,
            }));
        }

        let user_ref = build_user_ref(&claims)?;
        let exp = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| CoreError::Authentication(AuthenticationFailure::Malformed("exp out of range".into())))?;

        let verdict = VerifiedToken {
            user_ref,
            token_id: claims.jti,
            exp,
        };

        let remaining = (exp - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        let ttl = remaining.min(MAX_VERDICT_TTL);
        self.verdict_cache.put(token_hash, verdict.clone(), ttl);

        debug!(user_id = %verdict.user_ref.user_id, "verified credential");
        Ok(verdict)
    }

    async fn resolve_key(
        &self,
        header: &jsonwebtoken::Header,
    ) -> Result<(DecodingKey, Algorithm), CoreError> {
        match header.alg {
            Algorithm::RS256 => {
                let kid = header
                    .kid
                    .clone()
                    .ok_or_else(|| CoreError::Authentication(AuthenticationFailure::Malformed("missing kid".into())))?;
                match self.jwks.resolve(&kid).await {
                    Ok(key) => Ok(((*key).clone(), Algorithm::RS256)),
                    Err(err) => {
                        if let Some(secret) = &self.config.legacy_secret {
                            warn!("JWKS resolution failed, falling back to legacy HMAC secret");
                            Ok((DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS512))
                        } else {
                            Err(err)
                        }
                    }
                }
            }
            Algorithm::HS512 => match &self.config.legacy_secret {
                Some(secret) => Ok((DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS512)),
                None => Err(CoreError::Authentication(AuthenticationFailure::InvalidSignature)),
            },
            _ => Err(CoreError::Authentication(AuthenticationFailure::Malformed(
                "unsupported algorithm".into(),
            ))),
        }
    }

    /// Invalidate any cached verdict and record `tokenId` as revoked until
    /// its natural expiry, so any subsequent `verify` call -- even one that
    /// would otherwise hit the positive-verdict cache -- re-runs the
    /// revocation check.
    pub async fn revoke(&self, credential: &str, token_id: &str, exp: DateTime<Utc>) -> Result<(), CoreError> {
        let ttl = (exp - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        self.revocation_store
            .set_with_ttl(&format!("revoke:{token_id}"), Vec::new(), ttl)
            .await
            .map_err(CoreError::from)?;
        self.verdict_cache.invalidate(&hash_token(credential));
        Ok(())
    }
}

fn build_user_ref(claims: &Claims) -> Result<UserRef, CoreError> {
    let user_id = crate::kernel::Identifier::parse(&claims.sub)
        .map_err(|_| CoreError::Authentication(AuthenticationFailure::Malformed("sub is not a valid id".into())))?;
    let roles: HashSet<Role> = claims
        .roles
        .iter()
        .filter_map(|r| match r.to_uppercase().as_str() {
            "USER" => Some(Role::User),
            "MODERATOR" => Some(Role::Moderator),
            "ADMIN" => Some(Role::Admin),
            "OWNER" => Some(Role::Owner),
            _ => None,
        })
        .collect();
    Ok(UserRef {
        user_id,
        display_name: claims.display_name.clone().unwrap_or_default(),
        roles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{FakeClock, InMemoryKvStore};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn gateway_with_secret(secret: &str, clock: Arc<dyn Clock>) -> AuthGateway {
        let config = AuthConfig {
            jwks_url: None,
            jwt_issuer: None,
            clock_skew: Duration::from_secs(30),
            legacy_secret: Some(secret.to_string()),
        };
        AuthGateway::new(config, Arc::new(InMemoryKvStore::new(clock.clone())), clock)
    }

    fn sign(secret: &str, user_id: crate::kernel::Identifier, jti: &str, exp: DateTime<Utc>) -> String {
        let mut header = Header::new(Algorithm::HS512);
        header.kid = None;
        let claims = Claims {
            sub: user_id.to_string(),
            jti: jti.to_string(),
            exp: exp.timestamp(),
            roles: vec!["USER".into()],
            persona_id: None,
            display_name: Some("Ada".into()),
        };
        encode(&header, &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn verifies_a_well_formed_legacy_hmac_token() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let gateway = gateway_with_secret("legacy-secret", clock.clone());
        let user_id = crate::kernel::Identifier::new();
        let token = sign("legacy-secret", user_id, "jti-1", clock.now() + chrono::Duration::hours(1));

        let verdict = gateway.verify(&token).await.unwrap();
        assert_eq!(verdict.user_ref.user_id, user_id);
        assert_eq!(verdict.token_id, "jti-1");
    }

    #[tokio::test]
    async fn revocation_is_checked_even_if_a_positive_verdict_was_cached() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let gateway = gateway_with_secret("legacy-secret", clock.clone());
        let user_id = crate::kernel::Identifier::new();
        let exp = clock.now() + chrono::Duration::hours(1);
        let token = sign("legacy-secret", user_id, "jti-2", exp);

        gateway.verify(&token).await.unwrap();
        gateway.revoke(&token, "jti-2", exp).await.unwrap();

        let err = gateway.verify(&token).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Authentication(AuthenticationFailure::Revoked { .. })
        ));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let gateway = gateway_with_secret("legacy-secret", clock.clone());
        let user_id = crate::kernel::Identifier::new();
        let token = sign("legacy-secret", user_id, "jti-3", clock.now() - chrono::Duration::hours(1));

        let err = gateway.verify(&token).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Authentication(AuthenticationFailure::Expired { .. })
        ));
    }
}
