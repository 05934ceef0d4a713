use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::HeaderMap;
use http::header;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use tenantry_auth::{TokenVerifier, VerifierConfig, resolve_tenant};

const SECRET: &str = "c0e18b6a-a204-4197-93f4-test-only";

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs()
}

fn verifier() -> TokenVerifier {
    TokenVerifier::new(VerifierConfig {
        secret: SECRET.to_string(),
        issuer: Some("https://issuer.example".to_string()),
        audience: None,
        leeway: Duration::from_secs(0),
        require_exp: true,
    })
    .expect("verifier init should succeed")
}

fn mint(claims: serde_json::Value, secret: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token encode should succeed")
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token)
            .parse()
            .expect("authorization header must parse"),
    );
    headers
}

#[test]
fn authenticate_decodes_claims_from_valid_token() {
    let token = mint(
        serde_json::json!({
            "iss": "https://issuer.example",
            "username": "ada",
            "tenant": "acme",
            "exp": now_secs() + 600,
        }),
        SECRET,
    );

    let claims = verifier()
        .authenticate(&bearer(&token))
        .expect("authenticate should succeed");

    assert_eq!(claims.username, "ada");
    assert_eq!(claims.tenant, "acme");
    assert_eq!(resolve_tenant(&claims).unwrap(), "acme");
}

#[test]
fn expired_token_is_invalid() {
    let token = mint(
        serde_json::json!({
            "iss": "https://issuer.example",
            "tenant": "acme",
            "exp": now_secs() - 3600,
        }),
        SECRET,
    );

    let err = verifier().verify(&token).unwrap_err();
    assert_eq!(err.code, "ERR_AUTH_INVALID");
    assert!(err.message.contains("not valid or is expired"));
    assert!(err.message.contains("expired"));
}

#[test]
fn premature_token_is_invalid() {
    let token = mint(
        serde_json::json!({
            "iss": "https://issuer.example",
            "tenant": "acme",
            "nbf": now_secs() + 3600,
            "exp": now_secs() + 7200,
        }),
        SECRET,
    );

    let err = verifier().verify(&token).unwrap_err();
    assert_eq!(err.code, "ERR_AUTH_INVALID");
    assert!(err.message.contains("not yet valid"));
}

#[test]
fn token_signed_with_other_secret_is_invalid() {
    let token = mint(
        serde_json::json!({
            "iss": "https://issuer.example",
            "tenant": "acme",
            "exp": now_secs() + 600,
        }),
        "a-completely-different-secret",
    );

    let err = verifier().verify(&token).unwrap_err();
    assert_eq!(err.code, "ERR_AUTH_INVALID");
}

#[test]
fn token_without_exp_is_rejected_when_required() {
    let token = mint(
        serde_json::json!({"iss": "https://issuer.example", "tenant": "acme"}),
        SECRET,
    );

    let err = verifier().verify(&token).unwrap_err();
    assert_eq!(err.code, "ERR_AUTH_INVALID");
}

#[test]
fn token_from_unexpected_issuer_is_rejected() {
    let token = mint(
        serde_json::json!({
            "iss": "https://someone-else.example",
            "tenant": "acme",
            "exp": now_secs() + 600,
        }),
        SECRET,
    );

    let err = verifier().verify(&token).unwrap_err();
    assert_eq!(err.code, "ERR_AUTH_INVALID");
}

#[test]
fn verified_token_without_tenant_fails_resolution() {
    let token = mint(
        serde_json::json!({
            "iss": "https://issuer.example",
            "username": "ada",
            "exp": now_secs() + 600,
        }),
        SECRET,
    );

    let claims = verifier().verify(&token).expect("signature is valid");
    let err = resolve_tenant(&claims).unwrap_err();
    assert_eq!(err.code, "ERR_TENANT_MISSING");
}

#[test]
fn garbage_token_is_invalid_not_malformed() {
    let err = verifier().authenticate(&bearer("not-a-jwt")).unwrap_err();
    assert_eq!(err.code, "ERR_AUTH_INVALID");
}
