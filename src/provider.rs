//! Issues provider tokens and attaches them to outbound APNs requests.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use std::fmt;
use tracing::{debug, info};

use crate::claims::{Claims, ProtectedHeader};
use crate::compact::{self, Token};
use crate::error::{Error, Result};
use crate::key::{self, KeySource, Secret, SigningKey};
use crate::signer;

/// Header naming the app a notification is for.
pub const APNS_TOPIC: &str = "apns-topic";

/// Everything needed to issue tokens for one app.
#[derive(Clone)]
pub struct TokenProviderConfig {
    key_id: String,
    team_id: String,
    app_bundle_id: String,
    private_key: KeySource,
    private_key_secret: Option<Secret>,
}

impl TokenProviderConfig {
    pub fn new(
        key_id: impl Into<String>,
        team_id: impl Into<String>,
        app_bundle_id: impl Into<String>,
        private_key: KeySource,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            team_id: team_id.into(),
            app_bundle_id: app_bundle_id.into(),
            private_key,
            private_key_secret: None,
        }
    }

    /// Passphrase for an encrypted key. An empty string is a real passphrase.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.private_key_secret = Some(Secret::new(secret.into()));
        self
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    pub fn app_bundle_id(&self) -> &str {
        &self.app_bundle_id
    }

    pub fn private_key(&self) -> &KeySource {
        &self.private_key
    }

    pub fn private_key_secret(&self) -> Option<&str> {
        self.private_key_secret.as_deref().map(String::as_str)
    }

    /// Load the configured private key.
    pub fn load_key(&self) -> Result<SigningKey> {
        Ok(key::load(
            &self.private_key,
            self.private_key_secret(),
            &self.key_id,
        )?)
    }
}

impl fmt::Debug for TokenProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProviderConfig")
            .field("key_id", &self.key_id)
            .field("team_id", &self.team_id)
            .field("app_bundle_id", &self.app_bundle_id)
            .field("private_key", &self.private_key)
            .field("private_key_secret", &self.private_key_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// An outbound request that provider credentials can be attached to.
pub trait AuthenticateRequest {
    fn headers_mut(&mut self) -> &mut HeaderMap;
}

impl AuthenticateRequest for HeaderMap {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self
    }
}

impl AuthenticateRequest for reqwest::Request {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        reqwest::Request::headers_mut(self)
    }
}

/// Holds the current provider token for one app.
///
/// A provider is immutable once built and is `Send + Sync`, so `get` and
/// `authenticate_client` may be called from any number of threads. There is
/// no in-place refresh: build a new provider and swap it in. Hosts that share
/// one slot across threads must guard the swap themselves, for example with
/// `RwLock<TokenProvider>`.
pub struct TokenProvider {
    config: TokenProviderConfig,
    token: Token,
    issued_at: Option<DateTime<Utc>>,
    topic: HeaderValue,
    authorization: HeaderValue,
}

impl TokenProvider {
    /// Load the key, then sign a token issued now.
    pub fn create(config: TokenProviderConfig) -> Result<Self> {
        let key = config.load_key()?;
        Self::with_signing_key(config, &key)
    }

    /// Sign a token issued now with a key the caller already loaded.
    pub fn with_signing_key(config: TokenProviderConfig, key: &SigningKey) -> Result<Self> {
        Self::with_signing_key_at(config, key, Utc::now())
    }

    /// Sign a token whose `iat` is `now`.
    pub fn with_signing_key_at(
        config: TokenProviderConfig,
        key: &SigningKey,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if key.key_id() != config.key_id {
            return Err(Error::KeyIdMismatch {
                config: config.key_id.clone(),
                key: key.key_id().to_string(),
            });
        }

        let header = ProtectedHeader::for_key(key);
        let claims = Claims::new(&config.team_id, now);
        let (input, signature) = signer::sign(&header, &claims, key)?;
        let token = compact::serialize(&input, &signature);

        info!(
            key_id = %config.key_id,
            team_id = %config.team_id,
            iat = claims.iat,
            "issued provider token"
        );
        Self::assemble(config, token, claims.issued_at())
    }

    /// Adopt a token obtained elsewhere. The token is stored verbatim and
    /// never checked; the private key is not read.
    pub fn use_existing(token: impl Into<String>, config: TokenProviderConfig) -> Result<Self> {
        debug!(key_id = %config.key_id, "using existing provider token");
        Self::assemble(config, Token::from_string(token.into()), None)
    }

    fn assemble(
        config: TokenProviderConfig,
        token: Token,
        issued_at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let topic = HeaderValue::from_str(&config.app_bundle_id)
            .map_err(|_| Error::InvalidHeaderValue { field: APNS_TOPIC })?;
        let mut authorization = HeaderValue::from_str(&format!("bearer {token}"))
            .map_err(|_| Error::InvalidHeaderValue { field: "authorization" })?;
        authorization.set_sensitive(true);

        Ok(Self {
            config,
            token,
            issued_at,
            topic,
            authorization,
        })
    }

    /// The current token.
    pub fn get(&self) -> &str {
        self.token.as_str()
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// When the current token was issued. `None` for adopted tokens.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn config(&self) -> &TokenProviderConfig {
        &self.config
    }

    /// Set `apns-topic` and `authorization` on `request`. Other headers are
    /// left alone.
    pub fn authenticate_client<R: AuthenticateRequest + ?Sized>(&self, request: &mut R) {
        let headers = request.headers_mut();
        headers.insert(HeaderName::from_static(APNS_TOPIC), self.topic.clone());
        headers.insert(AUTHORIZATION, self.authorization.clone());
    }
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("config", &self.config)
            .field("token", &self.token)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::tests::{fixed_key, fixed_pem};
    use crate::verify::verify;

    fn config() -> TokenProviderConfig {
        TokenProviderConfig::new(
            "ABC123DEFG",
            "DEF123GHIJ",
            "com.example.app",
            KeySource::Pem(fixed_pem()),
        )
    }

    #[test]
    fn provider_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TokenProvider>();
    }

    #[test]
    fn create_issues_verifiable_token() {
        let provider = TokenProvider::create(config()).unwrap();
        let verified = verify(provider.get(), fixed_key().verifying_key()).unwrap();
        assert_eq!(verified.header.kid, "ABC123DEFG");
        assert_eq!(verified.claims.iss, "DEF123GHIJ");
        assert_eq!(
            provider.issued_at().unwrap().timestamp(),
            verified.claims.iat
        );
    }

    #[test]
    fn iat_comes_from_supplied_clock() {
        let key = config().load_key().unwrap();
        let now = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        let provider = TokenProvider::with_signing_key_at(config(), &key, now).unwrap();
        let verified = verify(provider.get(), &key.verifying_key()).unwrap();
        assert_eq!(verified.claims.iat, 1_600_000_000);
    }

    #[test]
    fn key_id_mismatch_is_rejected() {
        let key = SigningKey::from_p256(fixed_key(), "SOMEOTHER1");
        let err = TokenProvider::with_signing_key(config(), &key).unwrap_err();
        assert!(matches!(err, Error::KeyIdMismatch { .. }), "{err:?}");
    }

    #[test]
    fn use_existing_stores_verbatim() {
        let provider = TokenProvider::use_existing("abc.def.ghi", config()).unwrap();
        assert_eq!(provider.get(), "abc.def.ghi");
        assert!(provider.issued_at().is_none());
    }

    #[test]
    fn authenticate_sets_both_headers() {
        let provider = TokenProvider::use_existing("abc.def.ghi", config()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("apns-priority", HeaderValue::from_static("10"));

        provider.authenticate_client(&mut headers);

        assert_eq!(headers["apns-topic"], "com.example.app");
        assert_eq!(headers[AUTHORIZATION], "bearer abc.def.ghi");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert_eq!(headers["apns-priority"], "10");
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn authenticate_replaces_stale_values() {
        let provider = TokenProvider::use_existing("new", config()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer old"));
        provider.authenticate_client(&mut headers);
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(headers[AUTHORIZATION], "bearer new");
    }

    #[test]
    fn non_header_safe_inputs_are_rejected() {
        let err = TokenProvider::use_existing("line\nbreak", config()).unwrap_err();
        assert!(matches!(err, Error::InvalidHeaderValue { field: "authorization" }));

        let bad = TokenProviderConfig::new("K", "T", "com.example\r\n", KeySource::Pem(fixed_pem()));
        let err = TokenProvider::use_existing("abc", bad).unwrap_err();
        assert!(matches!(err, Error::InvalidHeaderValue { field: APNS_TOPIC }));
    }

    #[test]
    fn debug_hides_secret_and_token() {
        let provider =
            TokenProvider::use_existing("abc.def.ghi", config().with_secret("hunter2")).unwrap();
        let shown = format!("{provider:?}");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("abc.def.ghi"));
        assert!(shown.contains("com.example.app"));
    }
}
