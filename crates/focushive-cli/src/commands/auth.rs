//! Auth demo: signs a throwaway legacy-HMAC credential locally (standing in
//! for an identity provider) and runs it through `AuthGateway::verify`, then
//! revokes it and verifies again to show the revocation check overriding the
//! verdict cache.

use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;

use focushive_core::auth::types::Claims;
use focushive_core::config::AuthConfig;
use focushive_core::{AuthGateway, Identifier, InMemoryKvStore, SystemClock};

const DEMO_SECRET: &str = "focushive-cli-demo-secret";

#[derive(Subcommand)]
pub enum AuthAction {
    /// Sign a demo credential and verify it
    Verify,
    /// Sign, verify, revoke, then verify again -- the second verify must
    /// fail even though the positive verdict was cached
    Revoke,
}

#[derive(Serialize)]
struct VerdictSummary {
    user_id: String,
    display_name: String,
    roles: Vec<String>,
    token_id: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

fn sign(user_id: Identifier, jti: &str, exp: chrono::DateTime<chrono::Utc>) -> String {
    let header = Header::new(Algorithm::HS512);
    let claims = Claims {
        sub: user_id.to_string(),
        jti: jti.to_string(),
        exp: exp.timestamp(),
        roles: vec!["USER".to_string()],
        persona_id: None,
        display_name: Some("Demo User".to_string()),
    };
    encode(&header, &claims, &EncodingKey::from_secret(DEMO_SECRET.as_bytes())).expect("demo credential signs cleanly")
}

fn new_gateway() -> AuthGateway {
    let clock = Arc::new(SystemClock);
    let config = AuthConfig {
        jwks_url: None,
        jwt_issuer: None,
        clock_skew: Duration::from_secs(30),
        legacy_secret: Some(DEMO_SECRET.to_string()),
    };
    AuthGateway::new(config, Arc::new(InMemoryKvStore::new(clock.clone())), clock)
}

pub async fn run(action: AuthAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AuthAction::Verify => verify().await,
        AuthAction::Revoke => revoke().await,
    }
}

async fn verify() -> Result<(), Box<dyn std::error::Error>> {
    let gateway = new_gateway();
    let user_id = Identifier::new();
    let exp = chrono::Utc::now() + chrono::Duration::hours(1);
    let token = sign(user_id, "demo-jti-1", exp);

    let verdict = gateway.verify(&token).await?;
    let summary = VerdictSummary {
        user_id: verdict.user_ref.user_id.to_string(),
        display_name: verdict.user_ref.display_name.clone(),
        roles: verdict.user_ref.roles.iter().map(|r| format!("{r:?}")).collect(),
        token_id: verdict.token_id.clone(),
        expires_at: verdict.exp,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn revoke() -> Result<(), Box<dyn std::error::Error>> {
    let gateway = new_gateway();
    let user_id = Identifier::new();
    let exp = chrono::Utc::now() + chrono::Duration::hours(1);
    let token = sign(user_id, "demo-jti-2", exp);

    gateway.verify(&token).await?;
    println!("first verify: ok");

    gateway.revoke(&token, "demo-jti-2", exp).await?;
    println!("revoked");

    match gateway.verify(&token).await {
        Ok(_) => println!("second verify: unexpectedly succeeded"),
        Err(err) => println!("second verify correctly rejected: {err}"),
    }
    Ok(())
}
