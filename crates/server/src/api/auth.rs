//! Authentication endpoints.
//!
//! Two entry points turn a Discord authorization code into a signed token:
//! - `POST /auth` takes `{code, redirectUri}` as JSON
//! - `GET /auth/callback` takes `code` and an optional `redirect_uri` as query parameters
//!
//! Both exist because deployed clients use either, and both must answer with the same
//! body shape. The remaining endpoints publish the login URL and the verification key,
//! and check tokens issued by this service.

use crate::AppState;
use crate::discord::DiscordUser;
use crate::error::{ApiError, ErrorResponse};
use crate::issuer::Claims;
use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, header::AUTHORIZATION},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Tag for OpenAPI documentation.
pub const AUTH_TAG: &str = "Authentication";

/// Body of `POST /auth`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    /// Authorization code returned by Discord
    pub code: String,
    /// Redirect URI the code was issued for
    pub redirect_uri: String,
}

/// Query of `GET /auth/callback`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    /// Authorization code returned by Discord
    pub code: String,
    /// Redirect URI the code was issued for; defaults to the configured one
    pub redirect_uri: Option<String>,
}

/// Successful answer of both code entry points.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    /// RS256-signed JWT
    pub token: String,
    pub user: DiscordUser,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub auth_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublicKeyResponse {
    /// SubjectPublicKeyInfo PEM
    pub public_key: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyResponse {
    pub valid: bool,
    pub claims: Claims,
}

/// Discord authorization URL.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/auth/login",
    tag = AUTH_TAG,
    operation_id = "Login URL",
    summary = "Discord authorization URL",
    description = "Returns the Discord OAuth2 authorization URL the user should visit. \
                   Built from configuration only, no call to Discord is made.",
    responses(
        (status = 200, description = "Authorization URL", body = LoginResponse)
    )
)]
pub async fn login(State(state): State<AppState>) -> Json<LoginResponse> {
    Json(LoginResponse {
        auth_url: state.discord.authorization_url(),
    })
}

/// Exchange a code sent as JSON.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/auth",
    tag = AUTH_TAG,
    operation_id = "Authenticate",
    summary = "Exchange a Discord code for a token",
    description = "Exchanges the Discord authorization code for an access token, resolves the \
                   Discord user and returns a signed token for it.",
    request_body(content = AuthRequest, description = "Authorization code and redirect URI"),
    responses(
        (status = 200, description = "Token issued", body = AuthResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Discord rejected the code or the user lookup failed", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
pub async fn authenticate(
    State(state): State<AppState>,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(payload) = payload?;
    require_non_empty("code", &payload.code)?;
    require_non_empty("redirectUri", &payload.redirect_uri)?;

    exchange_and_issue(&state, &payload.code, &payload.redirect_uri)
        .await
        .map(Json)
}

/// Exchange a code delivered to the OAuth callback.
#[tracing::instrument(skip(state, params))]
#[utoipa::path(
    get,
    path = "/auth/callback",
    tag = AUTH_TAG,
    operation_id = "Callback",
    summary = "OAuth2 callback",
    description = "Same as `POST /auth`, with the code taken from the query string. \
                   `redirect_uri` falls back to the configured default.",
    params(CallbackParams),
    responses(
        (status = 200, description = "Token issued", body = AuthResponse),
        (status = 400, description = "Missing code", body = ErrorResponse),
        (status = 401, description = "Discord rejected the code or the user lookup failed", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    )
)]
pub async fn callback(
    State(state): State<AppState>,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Query(params) = params?;
    require_non_empty("code", &params.code)?;

    let redirect_uri = params
        .redirect_uri
        .as_deref()
        .filter(|uri| !uri.is_empty())
        .unwrap_or_else(|| state.discord.default_redirect_uri());

    exchange_and_issue(&state, &params.code, redirect_uri)
        .await
        .map(Json)
}

/// Verification key.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/auth/public-key",
    tag = AUTH_TAG,
    operation_id = "Public Key",
    summary = "Token verification key",
    description = "Returns the RSA public key (SubjectPublicKeyInfo PEM) that verifies every token \
                   issued by this service.",
    responses(
        (status = 200, description = "PEM-encoded public key", body = PublicKeyResponse)
    )
)]
pub async fn public_key(State(state): State<AppState>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        public_key: state.issuer.export_public_key_pem().to_owned(),
    })
}

/// Check a token issued by this service.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    get,
    path = "/auth/verify",
    tag = AUTH_TAG,
    operation_id = "Verify",
    summary = "Verify a token",
    description = "Validates the signature and expiry of the bearer token and returns its claims.",
    responses(
        (status = 200, description = "Token is valid", body = VerifyResponse),
        (status = 401, description = "Missing, malformed, expired or foreign token", body = ErrorResponse)
    ),
    security(("Authorization" = []))
)]
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<VerifyResponse>, ApiError> {
    let token = bearer_token(&headers).ok_or_else(|| {
        ApiError::Authentication("Authorization header must carry a Bearer token".into())
    })?;
    let claims = state.issuer.verify(token)?;

    Ok(Json(VerifyResponse {
        valid: true,
        claims,
    }))
}

async fn exchange_and_issue(
    state: &AppState,
    code: &str,
    redirect_uri: &str,
) -> Result<AuthResponse, ApiError> {
    let user = state.discord.exchange(code, redirect_uri).await?;
    let token = state.issuer.issue(&user)?;
    tracing::info!(user_id = %user.id, "Issued token");

    Ok(AuthResponse { token, user })
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("`{field}` must not be empty")));
    }
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
