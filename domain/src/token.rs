use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::user::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    Malformed(String),
    Expired,
    InvalidSubject,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed(msg) => write!(f, "Malformed token: {msg}"),
            TokenError::Expired => write!(f, "Token has expired"),
            TokenError::InvalidSubject => write!(f, "Token subject is not a user id"),
        }
    }
}

impl std::error::Error for TokenError {}

// `sub` is a JSON number when issued by the backend, tolerate the string form too
#[derive(Deserialize)]
#[serde(untagged)]
enum Subject {
    Number(i64),
    Text(String),
}

#[derive(Deserialize)]
struct Payload {
    sub: Subject,
}

/// Bearer credential returned by `POST /authentication/token`
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads the user id out of the token payload.
    ///
    /// The signature is not checked: only the backend holds the key, and it verifies
    /// the token on every authenticated call anyway.
    /// # Errors
    /// - `TokenError::Expired` when `exp` is in the past
    /// - `TokenError::Malformed` when the payload cannot be decoded
    /// - `TokenError::InvalidSubject` when `sub` is not a numeric id
    pub fn subject(&self) -> Result<UserId, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_aud = false;

        let payload = decode::<Payload>(&self.0, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed(e.to_string()),
            })?
            .claims;

        match payload.sub {
            Subject::Number(id) => Ok(id),
            Subject::Text(text) => text.parse().map_err(|_| TokenError::InvalidSubject),
        }
    }
}

// Keep tokens out of logs
impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}
