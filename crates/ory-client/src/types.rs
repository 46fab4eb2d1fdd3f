//! Wire types returned by the Ory frontend API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated browser session as returned by `/sessions/whoami`.
///
/// Only the fields the proxy relies on are modelled; anything else in the
/// platform's response is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session ID.
    pub id: String,
    /// Whether the platform still considers the session active.
    #[serde(default = "default_active")]
    pub active: bool,
    /// When the session expires.
    pub expires_at: DateTime<Utc>,
    /// When the user last authenticated.
    pub authenticated_at: DateTime<Utc>,
    /// When the session was issued.
    pub issued_at: DateTime<Utc>,
    /// The identity the session belongs to.
    pub identity: IdentityRecord,
}

fn default_active() -> bool {
    true
}

/// The identity part of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Identity ID.
    pub id: String,
    /// Identity schema ID.
    pub schema_id: String,
    /// URL of the identity schema.
    #[serde(default)]
    pub schema_url: String,
    /// Schema-validated traits (email, name, ...).
    #[serde(default)]
    pub traits: serde_json::Value,
}

impl SessionRecord {
    /// Whether the session can still be used at `now`.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at > now
    }
}
