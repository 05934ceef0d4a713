use std::time::Duration;

use http::HeaderMap;
use http::header;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

const MIN_SECRET_LEN: usize = 16;

/// Decoded payload of a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub tenant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

#[derive(Clone)]
pub struct VerifierConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub leeway: Duration,
    pub require_exp: bool,
}

impl std::fmt::Debug for VerifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway", &self.leeway)
            .field("require_exp", &self.require_exp)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub code: &'static str,
    pub message: String,
}

impl AuthError {
    fn malformed(message: &str) -> Self {
        AuthError {
            code: "ERR_AUTH_MALFORMED",
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AuthError {}

/// Verifies HS256 bearer tokens against a shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(config: VerifierConfig) -> Result<Self, AuthError> {
        if config.secret.len() < MIN_SECRET_LEN {
            return Err(AuthError {
                code: "ERR_INVALID_CONFIG",
                message: format!("jwt secret must be at least {} bytes", MIN_SECRET_LEN),
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway.as_secs();
        validation.validate_nbf = true;
        if config.require_exp {
            validation.set_required_spec_claims(&["exp"]);
        } else {
            validation.set_required_spec_claims::<&str>(&[]);
        }
        if let Some(issuer) = config.issuer.as_ref() {
            validation.set_issuer(std::slice::from_ref(issuer));
        }
        match config.audience.as_ref() {
            Some(audience) => validation.set_audience(std::slice::from_ref(audience)),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        })
    }

    /// Extracts the bearer credential from `headers` and verifies it.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Claims, AuthError> {
        let token = bearer_token(headers)?;
        self.verify(&token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "token is expired",
                    ErrorKind::ImmatureSignature => "token is not yet valid",
                    ErrorKind::InvalidSignature => "signature mismatch",
                    ErrorKind::InvalidIssuer => "unexpected issuer",
                    ErrorKind::InvalidAudience => "unexpected audience",
                    ErrorKind::InvalidAlgorithm => "unsupported algorithm",
                    ErrorKind::MissingRequiredClaim(_) => "missing required claim",
                    _ => "undecodable token",
                };
                AuthError {
                    code: "ERR_AUTH_INVALID",
                    message: format!("token is not valid or is expired ({})", reason),
                }
            })
    }
}

/// Returns the tenant carried by verified claims, exactly as issued.
pub fn resolve_tenant(claims: &Claims) -> Result<String, AuthError> {
    if claims.tenant.trim().is_empty() {
        return Err(AuthError {
            code: "ERR_TENANT_MISSING",
            message: "token does not carry a tenant claim".to_string(),
        });
    }

    Ok(claims.tenant.clone())
}

pub fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let authz = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AuthError {
            code: "ERR_AUTH_REQUIRED",
            message: "missing Authorization header".to_string(),
        })?
        .to_str()
        .map_err(|_| AuthError::malformed("Authorization header is not valid ASCII"))?
        .trim();

    if authz.is_empty() {
        return Err(AuthError::malformed("Authorization header is empty"));
    }

    let token = authz
        .strip_prefix("Bearer ")
        .or_else(|| authz.strip_prefix("bearer "))
        .ok_or_else(|| AuthError::malformed("Authorization must be a Bearer token"))?
        .trim();

    if token.is_empty() {
        return Err(AuthError::malformed("Bearer token is empty"));
    }

    Ok(token.to_string())
}
