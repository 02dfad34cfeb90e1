//! Provider authentication tokens for the Apple Push Notification service.
//!
//! APNs accepts a short-lived JWS signed with the team's ES256 key in place
//! of a TLS client certificate:
//!
//! ```text
//! b64u({"alg":"ES256","kid":"<key id>"}) . b64u({"iss":"<team id>","iat":<now>}) . b64u(r || s)
//! ```
//!
//! [`TokenProvider::create`] loads the `.p8` key, signs a token issued now and
//! keeps it; [`TokenProvider::authenticate_client`] attaches it to requests as
//! `authorization: bearer <token>` alongside `apns-topic`.
//!
//! ```no_run
//! use apns_token::{KeySource, TokenProvider, TokenProviderConfig};
//!
//! let config = TokenProviderConfig::new(
//!     "ABC123DEFG",
//!     "DEF123GHIJ",
//!     "com.example.app",
//!     KeySource::path("AuthKey_ABC123DEFG.p8"),
//! );
//! let provider = TokenProvider::create(config)?;
//! let mut headers = reqwest::header::HeaderMap::new();
//! provider.authenticate_client(&mut headers);
//! # Ok::<(), apns_token::Error>(())
//! ```
//!
//! Tokens are not refreshed automatically. Apple rejects tokens older than an
//! hour; build a new provider before then.

pub mod algorithm;
pub mod claims;
pub mod compact;
pub mod config;
pub mod error;
pub mod key;
pub mod provider;
pub mod signer;
pub mod verify;

pub use algorithm::Algorithm;
pub use claims::{Claims, ProtectedHeader};
pub use compact::{CompactError, CompactParts, SigningInput, Token};
pub use error::{Error, Result};
pub use key::{KeyError, KeySource, KeyUse, Secret, SigningKey};
pub use provider::{AuthenticateRequest, TokenProvider, TokenProviderConfig, APNS_TOPIC};
pub use signer::{SignError, Signature};
pub use verify::{Verified, VerifyError};
