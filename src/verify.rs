//! Checking a provider token against the public half of its signing key.

use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::VerifyingKey;
use p256::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};

use crate::algorithm::Algorithm;
use crate::claims::{Claims, ProtectedHeader};
use crate::compact::{CompactError, CompactParts};

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Compact(#[from] CompactError),
    #[error("token uses {found}, expected {expected}")]
    Algorithm { found: Algorithm, expected: Algorithm },
    #[error("signature does not verify")]
    Signature,
    #[error("invalid public key: {0}")]
    PublicKey(String),
}

/// Header and claims of a token whose signature checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub header: ProtectedHeader,
    pub claims: Claims,
}

/// Parse a SubjectPublicKeyInfo PEM (`-----BEGIN PUBLIC KEY-----`).
pub fn public_key_from_pem(pem: &str) -> Result<VerifyingKey, VerifyError> {
    VerifyingKey::from_public_key_pem(pem.trim()).map_err(|e| VerifyError::PublicKey(e.to_string()))
}

/// Verify the ES256 signature of `token`. Time claims are not checked; the
/// gateway applies its own validity window.
pub fn verify(token: &str, key: &VerifyingKey) -> Result<Verified, VerifyError> {
    let parts: CompactParts<ProtectedHeader, Claims> = CompactParts::parse(token)?;

    match parts.header.alg {
        Algorithm::Es256 => {
            let expected = Algorithm::Es256.signature_len();
            if parts.signature.len() != expected {
                return Err(CompactError::SignatureLength {
                    expected,
                    found: parts.signature.len(),
                }
                .into());
            }
            let signature = p256::ecdsa::Signature::from_slice(&parts.signature)
                .map_err(|_| VerifyError::Signature)?;
            let digest = Sha256::digest(parts.signing_input.as_bytes());
            key.verify_prehash(&digest, &signature)
                .map_err(|_| VerifyError::Signature)?;
        }
    }

    Ok(Verified {
        header: parts.header,
        claims: parts.claims,
    })
}
