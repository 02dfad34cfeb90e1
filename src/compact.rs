//! JWS compact serialization: `b64u(header) "." b64u(claims) "." b64u(signature)`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

use crate::signer::Signature;

/// The ASCII bytes the signature is computed over: the first two segments
/// of the token, joined by a dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningInput(String);

impl SigningInput {
    pub fn new<H: Serialize, C: Serialize>(header: &H, claims: &C) -> Result<Self, serde_json::Error> {
        let header = encode_json(header)?;
        let claims = encode_json(claims)?;

        let mut input = String::with_capacity(header.len() + 1 + claims.len());
        input.push_str(&header);
        input.push('.');
        input.push_str(&claims);
        Ok(Self(input))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// A serialized provider token.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// Wrap a token string obtained elsewhere. No validation is done.
    pub fn from_string(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Tokens are bearer credentials; keep them out of `{:?}` logs.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(<{} bytes>)", self.0.len())
    }
}

/// Append the signature segment to the signing input.
pub fn serialize(input: &SigningInput, signature: &Signature) -> Token {
    let sig = URL_SAFE_NO_PAD.encode(signature.as_bytes());

    let mut token = String::with_capacity(input.0.len() + 1 + sig.len());
    token.push_str(&input.0);
    token.push('.');
    token.push_str(&sig);
    Token(token)
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

#[derive(Debug, thiserror::Error)]
pub enum CompactError {
    #[error("expected 3 dot-separated segments, found {0}")]
    Segments(usize),
    #[error("segment {segment} is not unpadded base64url")]
    Base64 {
        segment: usize,
        #[source]
        source: base64::DecodeError,
    },
    #[error("segment {segment} is not the expected JSON")]
    Json {
        segment: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("signature must be {expected} bytes, found {found}")]
    SignatureLength { expected: usize, found: usize },
}

/// A compact token split back into its parts.
#[derive(Debug, Clone)]
pub struct CompactParts<H, C> {
    pub header: H,
    pub claims: C,
    pub signing_input: SigningInput,
    pub signature: Vec<u8>,
}

impl<H: DeserializeOwned, C: DeserializeOwned> CompactParts<H, C> {
    pub fn parse(token: &str) -> Result<Self, CompactError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header_b64, claims_b64, sig_b64] = segments[..] else {
            return Err(CompactError::Segments(segments.len()));
        };

        let header = decode_json(header_b64, 0)?;
        let claims = decode_json(claims_b64, 1)?;
        let signature = decode_segment(sig_b64, 2)?;

        let signing_input = SigningInput(format!("{header_b64}.{claims_b64}"));
        Ok(Self {
            header,
            claims,
            signing_input,
            signature,
        })
    }
}

fn decode_segment(segment: &str, index: usize) -> Result<Vec<u8>, CompactError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|source| CompactError::Base64 {
            segment: index,
            source,
        })
}

fn decode_json<T: DeserializeOwned>(segment: &str, index: usize) -> Result<T, CompactError> {
    let bytes = decode_segment(segment, index)?;
    serde_json::from_slice(&bytes).map_err(|source| CompactError::Json {
        segment: index,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{Claims, ProtectedHeader};
    use crate::Algorithm;

    fn header() -> ProtectedHeader {
        ProtectedHeader {
            alg: Algorithm::Es256,
            kid: "ABC123DEFG".into(),
        }
    }

    fn claims() -> Claims {
        Claims {
            iss: "DEF123GHIJ".into(),
            iat: 1_437_179_036,
        }
    }

    #[test]
    fn signing_input_matches_known_encoding() {
        let input = SigningInput::new(&header(), &claims()).unwrap();
        // base64url of {"alg":"ES256","kid":"ABC123DEFG"} and {"iss":"DEF123GHIJ","iat":1437179036}
        assert_eq!(
            input.as_str(),
            "eyJhbGciOiJFUzI1NiIsImtpZCI6IkFCQzEyM0RFRkcifQ.\
             eyJpc3MiOiJERUYxMjNHSElKIiwiaWF0IjoxNDM3MTc5MDM2fQ"
        );
    }

    #[test]
    fn serialized_token_has_three_unpadded_segments() {
        let input = SigningInput::new(&header(), &claims()).unwrap();
        let token = serialize(&input, &Signature::from_bytes([0xAB; 64]));
        let s = token.as_str();

        assert_eq!(s.matches('.').count(), 2);
        assert!(!s.contains('='));
        assert!(!s.contains(char::is_whitespace));
        assert!(s.split('.').all(|seg| !seg.is_empty()));
        assert!(s.starts_with(input.as_str()));
    }

    #[test]
    fn parse_recovers_parts() {
        let input = SigningInput::new(&header(), &claims()).unwrap();
        let token = serialize(&input, &Signature::from_bytes([1; 64]));

        let parts: CompactParts<ProtectedHeader, Claims> = CompactParts::parse(token.as_str()).unwrap();
        assert_eq!(parts.header, header());
        assert_eq!(parts.claims, claims());
        assert_eq!(parts.signing_input, input);
        assert_eq!(parts.signature, vec![1; 64]);
    }

    #[test]
    fn parse_rejects_wrong_segment_count() {
        let err = CompactParts::<ProtectedHeader, Claims>::parse("a.b").unwrap_err();
        assert!(matches!(err, CompactError::Segments(2)));
        let err = CompactParts::<ProtectedHeader, Claims>::parse("a.b.c.d").unwrap_err();
        assert!(matches!(err, CompactError::Segments(4)));
    }

    #[test]
    fn parse_rejects_padding_and_bad_json() {
        let err = CompactParts::<ProtectedHeader, Claims>::parse("e30=.e30.AA").unwrap_err();
        assert!(matches!(err, CompactError::Base64 { segment: 0, .. }), "{err:?}");

        // "{}" is valid JSON but not a header.
        let err = CompactParts::<ProtectedHeader, Claims>::parse("e30.e30.AA").unwrap_err();
        assert!(matches!(err, CompactError::Json { segment: 0, .. }), "{err:?}");
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = Token::from_string("secret.token.value".into());
        assert_eq!(format!("{token:?}"), "Token(<18 bytes>)");
        assert_eq!(token.to_string(), "secret.token.value");
    }
}
