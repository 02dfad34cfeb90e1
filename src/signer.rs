//! ES256 signing of the JWS signing input.
//!
//! The digest is SHA-256 of `b64u(header) "." b64u(claims)`, signed with ECDSA
//! over P-256 using RFC 6979 nonces. JWS wants the signature as the raw,
//! fixed-width `r || s` concatenation (64 bytes), not ASN.1 DER.

use p256::ecdsa::signature::hazmat::PrehashSigner;
use sha2::{Digest, Sha256};

use crate::algorithm::Algorithm;
use crate::claims::{Claims, ProtectedHeader};
use crate::compact::SigningInput;
use crate::key::SigningKey;

/// A fixed-width `r || s` ECDSA signature.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// The big-endian `r` scalar.
    pub fn r(&self) -> &[u8] {
        &self.0[..32]
    }

    /// The big-endian `s` scalar.
    pub fn s(&self) -> &[u8] {
        &self.0[32..]
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature(<{} bytes>)", self.0.len())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("could not encode header or claims as JSON")]
    ClaimEncoding(#[from] serde_json::Error),
    #[error("header declares {header} but the key signs with {key}")]
    AlgorithmMismatch { header: Algorithm, key: Algorithm },
    #[error("header kid '{header}' does not match key id '{key}'")]
    KeyIdMismatch { header: String, key: String },
    #[error("signing primitive failed")]
    Primitive(#[source] p256::ecdsa::Error),
}

/// Sign `header` and `claims` with `key`, returning the signing input the
/// signature covers along with the signature itself.
pub fn sign(
    header: &ProtectedHeader,
    claims: &Claims,
    key: &SigningKey,
) -> Result<(SigningInput, Signature), SignError> {
    if header.alg != key.algorithm() {
        return Err(SignError::AlgorithmMismatch {
            header: header.alg,
            key: key.algorithm(),
        });
    }
    if header.kid != key.key_id() {
        return Err(SignError::KeyIdMismatch {
            header: header.kid.clone(),
            key: key.key_id().to_string(),
        });
    }

    let input = SigningInput::new(header, claims)?;
    let signature = sign_input(&input, key)?;
    Ok((input, signature))
}

/// Sign an already-encoded signing input.
pub fn sign_input(input: &SigningInput, key: &SigningKey) -> Result<Signature, SignError> {
    match key.algorithm() {
        Algorithm::Es256 => {
            let digest = Sha256::digest(input.as_bytes());
            debug_assert_eq!(digest.len(), Algorithm::Es256.digest_len());

            let sig: p256::ecdsa::Signature = key
                .p256()
                .sign_prehash(&digest)
                .map_err(SignError::Primitive)?;

            let mut raw = [0u8; 64];
            raw.copy_from_slice(&sig.to_bytes());
            Ok(Signature(raw))
        }
    }
}
