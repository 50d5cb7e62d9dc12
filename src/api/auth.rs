//! Magic-link sign-in and JWT sessions.
//!
//! - Client submits an email to `/api/auth/magic-link`
//! - Server mints a single-use link token and logs the sign-in link
//!   (the link is also returned in dev mode)
//! - Client exchanges the token at `/api/auth/verify` for a JWT
//! - When `DEV_MODE=false`, protected endpoints require `Authorization: Bearer <jwt>`
//!
//! Link tokens are kept in memory as SHA-256 hashes and are lost on restart.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

use super::routes::AppState;
use crate::config::JWT_TTL_DAYS;
use super::types::{
    api_error, ApiError, CurrentUserResponse, MagicLinkRequest, MagicLinkResponse,
    SessionResponse, VerifyRequest,
};

/// Identity attached to every authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub email: String,
}

impl AuthUser {
    fn dev() -> Self {
        Self {
            email: "dev@localhost".to_string(),
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Claims {
    /// Signed-in email
    sub: String,
    /// Issued-at unix seconds
    iat: i64,
    /// Expiration unix seconds
    exp: i64,
}

fn issue_jwt(secret: &str, email: &str, ttl_days: i64) -> anyhow::Result<(String, i64)> {
    let now = Utc::now();
    let ttl_days = ttl_days.clamp(*JWT_TTL_DAYS.start(), *JWT_TTL_DAYS.end());
    let exp = now + Duration::days(ttl_days);
    let claims = Claims {
        sub: email.to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };
    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, claims.exp))
}

fn verify_jwt(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let validation = Validation::default();
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(token_data.claims)
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"))
}

/// Lower-case and validate an email address.
pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    email_re().is_match(&email).then_some(email)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

struct PendingLink {
    email: String,
    expires_at: DateTime<Utc>,
}

/// Outstanding sign-in links, keyed by token hash.
#[derive(Default)]
pub struct MagicLinks {
    pending: Mutex<HashMap<String, PendingLink>>,
}

impl MagicLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a token for `email`. Expired entries are pruned on the way.
    pub async fn issue(&self, email: &str, ttl: std::time::Duration) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let now = Utc::now();
        let ttl = Duration::from_std(ttl).unwrap_or_else(|_| Duration::minutes(15));
        let mut pending = self.pending.lock().await;
        pending.retain(|_, link| link.expires_at > now);
        pending.insert(
            hash_token(&token),
            PendingLink {
                email: email.to_string(),
                expires_at: now + ttl,
            },
        );
        token
    }

    /// Consume a token, returning its email if it was valid and unexpired.
    pub async fn consume(&self, token: &str) -> Option<String> {
        let link = self.pending.lock().await.remove(&hash_token(token.trim()))?;
        (link.expires_at > Utc::now()).then_some(link.email)
    }
}

/// Request a sign-in link.
///
/// Answers 202 whether or not the email is allowed, so the endpoint does not
/// reveal who has access.
pub async fn request_magic_link(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MagicLinkRequest>,
) -> Result<(StatusCode, Json<MagicLinkResponse>), ApiError> {
    let email = normalize_email(&req.email)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Invalid email address"))?;

    let mut link = None;
    if state.config.auth.email_allowed(&email) {
        let token = state
            .magic_links
            .issue(&email, state.config.auth.magic_link_ttl)
            .await;
        let url = format!("{}/login?token={}", state.config.auth.public_url, token);
        tracing::info!(email = %email, "Sign-in link issued: {}", url);
        if state.config.dev_mode {
            link = Some(url);
        }
    } else {
        tracing::warn!(email = %email, "Sign-in requested for email outside the allow-list");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MagicLinkResponse { sent: true, link }),
    ))
}

/// Exchange a sign-in token for a session JWT.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let secret = state.config.auth.jwt_secret.as_deref().ok_or_else(|| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "JWT_SECRET not configured",
        )
    })?;

    let email = state
        .magic_links
        .consume(&req.token)
        .await
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Invalid or expired sign-in link"))?;

    let (token, exp) = issue_jwt(secret, &email, state.config.auth.jwt_ttl_days)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    tracing::info!(email = %email, "Signed in");

    Ok(Json(SessionResponse { token, exp, email }))
}

/// Current session's user.
pub async fn session(Extension(user): Extension<AuthUser>) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse { email: user.email })
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // Dev mode => no auth checks.
    if state.config.dev_mode {
        req.extensions_mut().insert(AuthUser::dev());
        return next.run(req).await;
    }

    // If auth isn't configured, fail closed in non-dev mode.
    let secret = match state.config.auth.jwt_secret.as_deref() {
        Some(s) => s,
        None => {
            return api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "JWT_SECRET not configured",
            )
            .into_response();
        }
    };

    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .unwrap_or("");

    if token.is_empty() {
        return api_error(StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response();
    }

    match verify_jwt(token, secret) {
        Ok(claims) => {
            req.extensions_mut().insert(AuthUser { email: claims.sub });
            next.run(req).await
        }
        Err(_) => api_error(StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_round_trip_carries_email() {
        let (token, exp) = issue_jwt("secret", "ops@agency.io", 30).unwrap();
        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, "ops@agency.io");
        assert_eq!(claims.exp, exp);
        assert!(verify_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn test_jwt_ttl_is_clamped() {
        let (_, exp) = issue_jwt("secret", "ops@agency.io", i64::MAX).unwrap();
        let max = Utc::now() + Duration::days(*JWT_TTL_DAYS.end());
        assert!(exp <= max.timestamp());
        let (_, exp) = issue_jwt("secret", "ops@agency.io", -5).unwrap();
        assert!(exp > Utc::now().timestamp());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Ops@Agency.IO "),
            Some("ops@agency.io".to_string())
        );
        assert_eq!(normalize_email("not-an-email"), None);
        assert_eq!(normalize_email("a b@agency.io"), None);
        assert_eq!(normalize_email("ops@localhost"), None);
    }

    #[tokio::test]
    async fn test_magic_link_is_single_use() {
        let links = MagicLinks::new();
        let token = links
            .issue("ops@agency.io", std::time::Duration::from_secs(60))
            .await;
        assert_eq!(token.len(), 64);
        assert_eq!(links.consume(&token).await, Some("ops@agency.io".to_string()));
        assert_eq!(links.consume(&token).await, None);
        assert_eq!(links.consume("made-up").await, None);
    }

    #[tokio::test]
    async fn test_expired_magic_link_rejected() {
        let links = MagicLinks::new();
        let token = links.issue("ops@agency.io", std::time::Duration::ZERO).await;
        assert_eq!(links.consume(&token).await, None);
    }
}
