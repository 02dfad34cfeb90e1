//! Loading the P-256 private key used to sign provider tokens.
//!
//! Apple hands out keys as `.p8` files: unencrypted PKCS#8 PEM. Keys that
//! were re-wrapped with a passphrase (`ENCRYPTED PRIVATE KEY`), SEC1
//! (`EC PRIVATE KEY`) PEM and bare PKCS#8 DER are accepted too.

use p256::ecdsa::VerifyingKey;
use p256::pkcs8::{EncodePublicKey, LineEnding};
use p256::NistP256;
use pkcs8::{AssociatedOid, EncryptedPrivateKeyInfo, PrivateKeyInfo, SecretDocument};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::algorithm::Algorithm;

/// Passphrase for an encrypted key. Wiped from memory on drop.
pub type Secret = Zeroizing<String>;

/// Where the private key material comes from.
#[derive(Clone)]
pub enum KeySource {
    /// A file on disk, PEM or DER.
    Path(PathBuf),
    /// PEM text held in memory.
    Pem(String),
    /// PKCS#8 DER bytes, plain or encrypted.
    Der(Vec<u8>),
}

impl KeySource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        KeySource::Path(path.into())
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Path(p) => f.debug_tuple("Path").field(p).finish(),
            KeySource::Pem(_) => f.write_str("Pem(<redacted>)"),
            KeySource::Der(bytes) => write!(f, "Der(<{} bytes>)", bytes.len()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("could not read key file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a valid private key encoding: {0}")]
    Malformed(String),
    #[error("key is not on curve P-256 (found {0})")]
    UnsupportedCurve(String),
    #[error("key is encrypted but no secret was supplied")]
    MissingSecret,
    #[error("could not decrypt key: wrong secret")]
    Decrypt,
    #[error("could not encode public key: {0}")]
    Encode(String),
}

/// What a key is allowed to be used for, as in JWK `use`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUse {
    Signature,
}

/// A P-256 private key tagged with the key identifier Apple assigned to it.
///
/// The `kid` of every header signed with this key comes from [`SigningKey::key_id`].
#[derive(Clone)]
pub struct SigningKey {
    inner: p256::ecdsa::SigningKey,
    key_id: String,
    usage: KeyUse,
    algorithm: Algorithm,
}

impl SigningKey {
    /// Wrap an already-decoded P-256 key.
    pub fn from_p256(inner: p256::ecdsa::SigningKey, key_id: impl Into<String>) -> Self {
        Self {
            inner,
            key_id: key_id.into(),
            usage: KeyUse::Signature,
            algorithm: Algorithm::Es256,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn usage(&self) -> KeyUse {
        self.usage
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        *self.inner.verifying_key()
    }

    /// SubjectPublicKeyInfo PEM of the public half, the form Apple and most
    /// JWT libraries expect for verification.
    pub fn public_key_pem(&self) -> Result<String, KeyError> {
        self.inner
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::Encode(e.to_string()))
    }

    pub(crate) fn p256(&self) -> &p256::ecdsa::SigningKey {
        &self.inner
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("usage", &self.usage)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Load a signing key from `source`, decrypting it with `secret` if needed.
///
/// A secret supplied for an unencrypted key is ignored. An empty secret is
/// still a secret: it is tried as the passphrase, never treated as absent.
pub fn load(source: &KeySource, secret: Option<&str>, key_id: &str) -> Result<SigningKey, KeyError> {
    let secret_key = match source {
        KeySource::Path(path) => {
            let bytes = read_key_file(path)?;
            decode(&bytes, secret)?
        }
        KeySource::Pem(pem) => decode_pem(pem, secret)?,
        KeySource::Der(der) => decode_der(der, secret)?,
    };

    debug!(key_id, "loaded P-256 signing key");
    Ok(SigningKey::from_p256(
        p256::ecdsa::SigningKey::from(secret_key),
        key_id,
    ))
}

fn read_key_file(path: &Path) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    std::fs::read(path)
        .map(Zeroizing::new)
        .map_err(|source| KeyError::Read {
            path: path.to_path_buf(),
            source,
        })
}

fn decode(bytes: &[u8], secret: Option<&str>) -> Result<p256::SecretKey, KeyError> {
    let trimmed = bytes.trim_ascii_start();
    if trimmed.starts_with(b"-----BEGIN") {
        let pem = std::str::from_utf8(trimmed)
            .map_err(|_| KeyError::Malformed("PEM is not valid UTF-8".into()))?;
        decode_pem(pem, secret)
    } else {
        decode_der(bytes, secret)
    }
}

fn decode_pem(pem: &str, secret: Option<&str>) -> Result<p256::SecretKey, KeyError> {
    let (label, doc) =
        SecretDocument::from_pem(pem.trim()).map_err(|e| KeyError::Malformed(e.to_string()))?;

    match label {
        "PRIVATE KEY" => {
            ignore_secret(secret);
            decode_pkcs8(doc.as_bytes())
        }
        "ENCRYPTED PRIVATE KEY" => decrypt_pkcs8(doc.as_bytes(), secret),
        "EC PRIVATE KEY" => {
            ignore_secret(secret);
            decode_sec1(doc.as_bytes())
        }
        other => Err(KeyError::Malformed(format!("unexpected PEM label '{other}'"))),
    }
}

fn decode_der(der: &[u8], secret: Option<&str>) -> Result<p256::SecretKey, KeyError> {
    if PrivateKeyInfo::try_from(der).is_ok() {
        ignore_secret(secret);
        return decode_pkcs8(der);
    }
    if EncryptedPrivateKeyInfo::try_from(der).is_ok() {
        return decrypt_pkcs8(der, secret);
    }
    Err(KeyError::Malformed(
        "neither PKCS#8 nor encrypted PKCS#8 DER".into(),
    ))
}

fn decode_pkcs8(der: &[u8]) -> Result<p256::SecretKey, KeyError> {
    let info = PrivateKeyInfo::try_from(der).map_err(|e| KeyError::Malformed(e.to_string()))?;

    if info.algorithm.oid != p256::elliptic_curve::ALGORITHM_OID {
        return Err(KeyError::UnsupportedCurve(format!(
            "non-EC algorithm {}",
            info.algorithm.oid
        )));
    }
    let curve = info
        .algorithm
        .parameters_oid()
        .map_err(|_| KeyError::Malformed("EC key without named curve".into()))?;
    if curve != NistP256::OID {
        return Err(KeyError::UnsupportedCurve(curve.to_string()));
    }

    p256::SecretKey::try_from(info).map_err(|e| KeyError::Malformed(e.to_string()))
}

fn decrypt_pkcs8(der: &[u8], secret: Option<&str>) -> Result<p256::SecretKey, KeyError> {
    let secret = secret.ok_or(KeyError::MissingSecret)?;
    let encrypted =
        EncryptedPrivateKeyInfo::try_from(der).map_err(|e| KeyError::Malformed(e.to_string()))?;
    let doc = encrypted
        .decrypt(secret.as_bytes())
        .map_err(|_| KeyError::Decrypt)?;

    // CBC padding can check out under a wrong passphrase; the plaintext then
    // fails to parse.
    decode_pkcs8(doc.as_bytes()).map_err(|e| match e {
        KeyError::UnsupportedCurve(curve) => KeyError::UnsupportedCurve(curve),
        _ => KeyError::Decrypt,
    })
}

fn decode_sec1(der: &[u8]) -> Result<p256::SecretKey, KeyError> {
    p256::SecretKey::from_sec1_der(der).map_err(|e| KeyError::Malformed(e.to_string()))
}

fn ignore_secret(secret: Option<&str>) {
    if secret.is_some() {
        warn!("private key is not encrypted; ignoring supplied secret");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use p256::pkcs8::EncodePrivateKey;

    /// A fixed key so signatures in tests are reproducible.
    pub(crate) fn fixed_key() -> p256::ecdsa::SigningKey {
        p256::ecdsa::SigningKey::from_bytes(&[7u8; 32].into()).unwrap()
    }

    pub(crate) fn fixed_pem() -> String {
        fixed_key().to_pkcs8_pem(LineEnding::LF).unwrap().to_string()
    }

    #[test]
    fn loads_pkcs8_pem() {
        let key = load(&KeySource::Pem(fixed_pem()), None, "ABC123DEFG").unwrap();
        assert_eq!(key.key_id(), "ABC123DEFG");
        assert_eq!(key.usage(), KeyUse::Signature);
        assert_eq!(key.algorithm(), Algorithm::Es256);
        assert_eq!(key.verifying_key(), *fixed_key().verifying_key());
    }

    #[test]
    fn loads_pkcs8_der() {
        let der = fixed_key().to_pkcs8_der().unwrap();
        let key = load(&KeySource::Der(der.as_bytes().to_vec()), None, "K").unwrap();
        assert_eq!(key.verifying_key(), *fixed_key().verifying_key());
    }

    #[test]
    fn loads_sec1_pem() {
        let secret = p256::SecretKey::from(&fixed_key());
        let pem = secret.to_sec1_pem(LineEnding::LF).unwrap();
        let key = load(&KeySource::Pem(pem.to_string()), None, "K").unwrap();
        assert_eq!(key.verifying_key(), *fixed_key().verifying_key());
    }

    #[test]
    fn unencrypted_key_ignores_secret() {
        let key = load(&KeySource::Pem(fixed_pem()), Some("unused"), "K").unwrap();
        assert_eq!(key.verifying_key(), *fixed_key().verifying_key());
    }

    #[test]
    fn garbage_is_malformed() {
        let err = load(&KeySource::Pem("not a key".into()), None, "K").unwrap_err();
        assert!(matches!(err, KeyError::Malformed(_)), "{err:?}");

        let err = load(&KeySource::Der(vec![0x30, 0x03, 0x02, 0x01]), None, "K").unwrap_err();
        assert!(matches!(err, KeyError::Malformed(_)), "{err:?}");
    }

    #[test]
    fn wrong_pem_label_is_malformed() {
        let pem = fixed_key()
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        let err = load(&KeySource::Pem(pem), None, "K").unwrap_err();
        assert!(matches!(err, KeyError::Malformed(_)), "{err:?}");
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load(&KeySource::path("/nonexistent/AuthKey.p8"), None, "K").unwrap_err();
        assert!(matches!(err, KeyError::Read { .. }), "{err:?}");
        assert!(err.to_string().contains("AuthKey.p8"));
    }

    #[test]
    fn public_key_pem_round_trips() {
        let key = SigningKey::from_p256(fixed_key(), "K");
        let pem = key.public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        use p256::pkcs8::DecodePublicKey;
        let parsed = VerifyingKey::from_public_key_pem(&pem).unwrap();
        assert_eq!(parsed, key.verifying_key());
    }

    #[test]
    fn debug_does_not_leak_material() {
        let pem = fixed_pem();
        let shown = format!("{:?}", KeySource::Pem(pem.clone()));
        assert!(!shown.contains("BEGIN"));
        let key = SigningKey::from_p256(fixed_key(), "K");
        assert!(format!("{key:?}").contains("key_id: \"K\""));
    }
}
