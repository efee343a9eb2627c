//! Device authorization and identity.

use serde::{Deserialize, Serialize};

/// Device code issued by the authorize endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceGrant {
    pub code: String,
    pub verification_uri: String,
}

/// Token poll result. `pending` stays true until the user approves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub pending: bool,
}

impl TokenResponse {
    /// The issued token, once the grant is approved.
    pub fn token(&self) -> Option<&str> {
        if self.pending || self.api_token.is_empty() {
            None
        } else {
            Some(&self.api_token)
        }
    }
}

/// The authenticated user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_token_is_not_ready() {
        let resp: TokenResponse = serde_json::from_str(r#"{"pending": true}"#).unwrap();
        assert!(resp.token().is_none());

        let ready: TokenResponse =
            serde_json::from_str(r#"{"api_token": "tok_123", "pending": false}"#).unwrap();
        assert_eq!(ready.token(), Some("tok_123"));
    }
}
