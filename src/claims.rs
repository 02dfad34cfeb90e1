//! The JWS protected header and claim set of a provider token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::algorithm::Algorithm;
use crate::key::SigningKey;

/// `{"alg":"ES256","kid":"<key id>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub alg: Algorithm,
    pub kid: String,
}

impl ProtectedHeader {
    /// The header for tokens signed by `key`. `kid` is always the key's own id.
    pub fn for_key(key: &SigningKey) -> Self {
        Self {
            alg: key.algorithm(),
            kid: key.key_id().to_string(),
        }
    }
}

/// `{"iss":"<team id>","iat":<unix seconds>}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub iat: i64,
}

impl Claims {
    pub fn new(team_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            iss: team_id.to_string(),
            iat: now.timestamp(),
        }
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }
}
