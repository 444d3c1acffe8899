use serde::{Deserialize, Serialize};
use validator::Validate;

pub type UserId = i64;

/// Account record as returned by `GET /users/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Body of `POST /authentication/token`
///
/// The backend only looks at `email` and `password`, `username` is always sent empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: String::new(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Body of `POST /authentication/user`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Registration {
    #[validate(length(min = 1, max = 100, message = "Username must be 1 to 100 characters"))]
    pub username: String,
    #[validate(
        email(message = "Email address is not valid"),
        length(max = 255, message = "Email must be at most 255 characters")
    )]
    pub email: String,
    #[validate(length(min = 8, max = 16, message = "Password must be 8 to 16 characters"))]
    pub password: String,
}
