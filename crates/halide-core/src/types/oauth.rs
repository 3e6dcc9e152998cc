use serde::{Deserialize, Serialize};

/// Response of `POST /api/v1/oauth/token`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Bearer token value
    pub access_token: String,

    /// Token type, normally `Bearer`
    #[serde(default)]
    pub token_type: String,

    /// Lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}
