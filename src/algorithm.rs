//! JWS signature algorithms supported for provider tokens.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A JWS `alg` value together with the parameters its signer needs.
///
/// APNs only accepts ES256 today. New curve/digest pairs are added as variants
/// and carry their own sizes, so callers never hard-code them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// ECDSA over NIST P-256 with SHA-256.
    #[default]
    #[serde(rename = "ES256")]
    Es256,
}

impl Algorithm {
    pub const fn name(self) -> &'static str {
        match self {
            Algorithm::Es256 => "ES256",
        }
    }

    /// Digest output length in bytes.
    pub const fn digest_len(self) -> usize {
        match self {
            Algorithm::Es256 => 32,
        }
    }

    /// Curve name as it appears in JWK `crv`.
    pub const fn curve(self) -> &'static str {
        match self {
            Algorithm::Es256 => "P-256",
        }
    }

    /// Width of the fixed-size `r || s` signature.
    pub const fn signature_len(self) -> usize {
        match self {
            Algorithm::Es256 => 64,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported JWS algorithm '{0}'")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ES256" => Ok(Algorithm::Es256),
            other => Err(UnknownAlgorithm(other.to_string())),
        }
    }
}
