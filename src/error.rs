//! Errors surfaced by [`TokenProvider`](crate::TokenProvider) construction.

use crate::key::KeyError;
use crate::signer::SignError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load signing key")]
    Key(#[from] KeyError),
    #[error("failed to sign token")]
    Sign(#[from] SignError),
    #[error("configured key id '{config}' does not match the signing key's id '{key}'")]
    KeyIdMismatch { config: String, key: String },
    #[error("{field} is not a valid HTTP header value")]
    InvalidHeaderValue { field: &'static str },
}
