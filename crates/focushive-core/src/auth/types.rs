use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::kernel::Identifier;

/// A role carried on the credential. Roles are re-derived per request from
/// the token's claims; nothing about a user is persisted beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Moderator,
    Admin,
    Owner,
}

/// The caller's identity and roles, re-derived per request from verified
/// claims. Never stored beyond the scope of handling one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub user_id: Identifier,
    pub display_name: String,
    pub roles: HashSet<Role>,
}

impl UserRef {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// JWT claims read from a verified credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub jti: String,
    pub exp: i64,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub persona_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// The result of a successful [`crate::auth::AuthGateway::verify`] call.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub user_ref: UserRef,
    pub token_id: String,
    pub exp: chrono::DateTime<chrono::Utc>,
}
