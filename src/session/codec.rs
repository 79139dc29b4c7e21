//! Session token codec.
//!
//! Tokens are JWT-shaped placeholders built locally from the stored identity:
//! `base64url(header).base64url(claims).signature`. The signature is a constant
//! and nothing here verifies it; "valid" only ever means "has three parts".

use super::identity::{Role, UserIdentity};
use base64ct::{Base64UrlUnpadded, Encoding};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub const TOKEN_TTL_SECONDS: i64 = 60 * 60 * 24;
pub const PLACEHOLDER_SIGNATURE: &str = "mock_signature_12345";

/// Claim names owned by the codec; extension entries never override them.
const RESERVED_CLAIMS: [&str; 8] = ["sub", "email", "role", "nom", "prenom", "name", "iat", "exp"];

/// Bearer credential. Token material is redacted from `Debug` output.
pub struct SessionToken(SecretString);

impl SessionToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        is_well_formed(Some(self.expose()))
    }
}

impl Clone for SessionToken {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl PartialEq for SessionToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("SessionToken([REDACTED])")
    }
}

/// Decoded payload segment.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub nom: String,
    #[serde(default)]
    pub prenom: String,
    #[serde(default)]
    pub name: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(flatten)]
    pub ext: Map<String, Value>,
}

impl TokenClaims {
    /// Builds claims from an identity. Role-specific attributes and extra
    /// identity fields land in `ext`; keys colliding with a reserved claim are
    /// dropped so the explicit identity fields always win.
    #[must_use]
    pub fn from_identity(identity: &UserIdentity, issued_at: i64) -> Self {
        let mut ext = Map::new();
        if let Some(matricule) = &identity.matricule {
            ext.insert("matricule".to_string(), Value::String(matricule.clone()));
        }
        if let Some(specialite) = &identity.specialite {
            ext.insert("specialite".to_string(), Value::String(specialite.clone()));
        }
        for (key, value) in identity.extra() {
            if !RESERVED_CLAIMS.contains(&key.as_str()) {
                ext.insert(key.clone(), value.clone());
            }
        }

        Self {
            sub: identity.id.to_string(),
            email: identity.email.clone(),
            role: identity.role,
            nom: identity.nom.clone(),
            prenom: identity.prenom.clone(),
            name: identity.display_name(),
            iat: issued_at,
            exp: issued_at + TOKEN_TTL_SECONDS,
            ext,
        }
    }

    /// JSON object for the payload segment. Built by hand so encoding cannot fail.
    fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (key, value) in &self.ext {
            if !RESERVED_CLAIMS.contains(&key.as_str()) {
                object.insert(key.clone(), value.clone());
            }
        }
        object.insert("sub".to_string(), Value::String(self.sub.clone()));
        if let Some(email) = &self.email {
            object.insert("email".to_string(), Value::String(email.clone()));
        }
        object.insert("role".to_string(), Value::String(self.role.as_str().to_string()));
        object.insert("nom".to_string(), Value::String(self.nom.clone()));
        object.insert("prenom".to_string(), Value::String(self.prenom.clone()));
        object.insert("name".to_string(), Value::String(self.name.clone()));
        object.insert("iat".to_string(), Value::from(self.iat));
        object.insert("exp".to_string(), Value::from(self.exp));
        Value::Object(object)
    }

    #[must_use]
    pub fn is_expired(&self, now_unix_seconds: i64) -> bool {
        self.exp <= now_unix_seconds
    }
}

/// Seconds since the Unix epoch; a clock before 1970 reads as 0.
#[must_use]
pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

/// Encodes a fresh token for `identity`, issued now.
#[must_use]
pub fn encode(identity: &UserIdentity) -> SessionToken {
    encode_at(identity, now_unix_seconds())
}

/// Encodes a token for `identity` issued at `issued_at` (Unix seconds).
#[must_use]
pub fn encode_at(identity: &UserIdentity, issued_at: i64) -> SessionToken {
    let header = json!({ "alg": "HS256", "typ": "JWT" });
    let claims = TokenClaims::from_identity(identity, issued_at);

    let header_b64 = b64e(&header);
    let claims_b64 = b64e(&claims.to_json());

    SessionToken::new(format!("{header_b64}.{claims_b64}.{PLACEHOLDER_SIGNATURE}"))
}

/// True iff the token splits on `.` into exactly three non-empty parts.
#[must_use]
pub fn is_well_formed(token: Option<&str>) -> bool {
    let Some(token) = token else {
        return false;
    };
    let parts: Vec<&str> = token.split('.').collect();
    parts.len() == 3 && parts.iter().all(|part| !part.is_empty())
}

/// Reads the payload segment back. Nothing is verified; any decoding problem
/// yields `None`.
#[must_use]
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    if !is_well_formed(Some(token)) {
        return None;
    }
    let claims_b64 = token.split('.').nth(1)?;
    let bytes = Base64UrlUnpadded::decode_vec(claims_b64).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn b64e(value: &Value) -> String {
    Base64UrlUnpadded::encode_string(value.to_string().as_bytes())
}
