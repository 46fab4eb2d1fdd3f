//! Session tokens handed to the application.

use chrono::{DateTime, Utc};
use ory_client::{IdentityRecord, SessionRecord};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::keys::SigningKey;

/// Claims of a minted session token.
///
/// `iat` and `exp` mirror the session's own issue and expiry times so the
/// token never outlives the session it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Identity ID.
    pub sub: String,
    /// Public URL of the proxy.
    pub iss: String,
    /// Unique token ID.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    /// The session the token was minted from.
    pub session: SessionClaim,
}

/// Session snapshot embedded in [`SessionClaims`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaim {
    pub id: String,
    pub active: bool,
    pub schema_id: String,
    pub schema_url: String,
    pub traits: serde_json::Value,
    pub expires_at: DateTime<Utc>,
    pub authenticated_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub identity: IdentityRecord,
}

impl SessionClaims {
    /// Build claims for `session`, issued by `issuer`.
    pub fn from_session(session: &SessionRecord, issuer: &str) -> Self {
        Self {
            sub: session.identity.id.clone(),
            iss: issuer.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: session.issued_at.timestamp(),
            exp: session.expires_at.timestamp(),
            session: SessionClaim {
                id: session.id.clone(),
                active: session.active,
                schema_id: session.identity.schema_id.clone(),
                schema_url: session.identity.schema_url.clone(),
                traits: session.identity.traits.clone(),
                expires_at: session.expires_at,
                authenticated_at: session.authenticated_at,
                issued_at: session.issued_at,
                identity: session.identity.clone(),
            },
        }
    }
}

/// Mint a signed token for `session`.
pub fn mint(key: &SigningKey, session: &SessionRecord, issuer: &str) -> Result<String> {
    let claims = SessionClaims::from_session(session, issuer);
    let token = key.sign(&claims)?;
    tracing::debug!(
        session_id = %session.id,
        identity_id = %session.identity.id,
        kid = key.kid(),
        "Minted session token"
    );
    Ok(token)
}
