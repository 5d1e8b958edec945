use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted proof of login: the Hackaru auth token cookie pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCredential {
    pub auth_token_id: String,
    pub auth_token_raw: String,
}

impl AuthCredential {
    pub fn new(auth_token_id: impl Into<String>, auth_token_raw: impl Into<String>) -> Self {
        Self {
            auth_token_id: auth_token_id.into(),
            auth_token_raw: auth_token_raw.into(),
        }
    }

    /// Value for the `cookie` request header
    pub fn cookie_header(&self) -> String {
        format!(
            "auth_token_id={}; auth_token_raw={}",
            self.auth_token_id, self.auth_token_raw
        )
    }
}

// Never print the raw token
impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredential")
            .field("auth_token_id", &self.auth_token_id)
            .field("auth_token_raw", &"<redacted>")
            .finish()
    }
}
