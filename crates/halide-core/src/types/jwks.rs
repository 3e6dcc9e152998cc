use serde::{Deserialize, Serialize};

/// A single JSON Web Key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Jwk {
    /// Key ID
    pub kid: String,

    /// Key type (`OKP`, `EC`, `RSA`)
    pub kty: String,

    /// Intended algorithm
    #[serde(skip_serializing_if = "String::is_empty")]
    pub alg: String,

    /// Intended use (`sig`)
    #[serde(rename = "use", skip_serializing_if = "String::is_empty")]
    pub key_use: String,

    /// Curve for OKP/EC keys
    #[serde(skip_serializing_if = "String::is_empty")]
    pub crv: String,

    /// Public key for OKP/EC keys
    #[serde(skip_serializing_if = "String::is_empty")]
    pub x: String,

    /// Modulus for RSA keys
    #[serde(skip_serializing_if = "String::is_empty")]
    pub n: String,

    /// Exponent for RSA keys
    #[serde(skip_serializing_if = "String::is_empty")]
    pub e: String,
}

/// A JSON Web Key Set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// Published keys
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Look up a key by ID
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}
