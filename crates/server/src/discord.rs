//! Discord OAuth2 client.
//!
//! Turns an authorization code into a Discord user in two sequential calls:
//! 1. `POST {api_base_url}/oauth2/token` trades the code for an access token
//! 2. `GET {api_base_url}/users/@me` resolves the access token to the user
//!
//! Nothing is retried or cached. Discord treats codes as single-use, a replayed code
//! simply fails at step 1.

use crate::config::DiscordConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

pub const TOKEN_PATH: &str = "/oauth2/token";
pub const CURRENT_USER_PATH: &str = "/users/@me";
/// Scope requested on the authorization URL. `identify` is enough for `/users/@me`.
pub const AUTHORIZE_SCOPE: &str = "identify";

/// Failure of the two-step code exchange. Every variant is an authentication failure
/// for the caller; the variant only tells which step broke.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Token exchange failed: {0}")]
    TokenRequest(String),
    #[error("No access token in response")]
    MissingAccessToken,
    #[error("User fetch failed: {0}")]
    UserRequest(String),
    #[error("No user id in response")]
    MissingUserId,
}

/// The identity Discord vouches for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DiscordUser {
    /// Discord user id (snowflake), never empty
    pub id: String,
    /// Discord username, if the provider returned one
    pub username: Option<String>,
}

impl DiscordUser {
    /// Pick the identity out of a `/users/@me` body.
    ///
    /// Snowflakes are strings on the wire; numeric ids are accepted and stringified.
    pub fn from_json(body: &Value) -> Option<Self> {
        let id = match body.get("id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let username = body
            .get("username")
            .and_then(Value::as_str)
            .map(str::to_owned);

        Some(Self { id, username })
    }
}

/// Client for the two Discord endpoints of the code exchange.
///
/// Not `Debug`: it holds the client secret.
#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    api_base_url: String,
    authorize_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl DiscordClient {
    pub fn new(config: &DiscordConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            authorize_url: config.authorize_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    /// Redirect target used when a caller does not supply one.
    pub fn default_redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// URL the user visits to grant access. Built from configuration only.
    pub fn authorization_url(&self) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}",
            self.authorize_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            AUTHORIZE_SCOPE
        )
    }

    /// Exchange `code` for the Discord user it was issued to.
    #[tracing::instrument(skip(self, code))]
    pub async fn exchange(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<DiscordUser, ExchangeError> {
        let access_token = self.request_access_token(code, redirect_uri).await?;
        let user = self.fetch_current_user(&access_token).await?;
        tracing::debug!(user_id = %user.id, "Resolved Discord user");
        Ok(user)
    }

    async fn request_access_token(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, ExchangeError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let body: Value = self
            .http
            .post(self.endpoint(TOKEN_PATH))
            .form(&params)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ExchangeError::TokenRequest(e.to_string()))?
            .json()
            .await
            .map_err(|e| ExchangeError::TokenRequest(e.to_string()))?;

        body.get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
            .ok_or(ExchangeError::MissingAccessToken)
    }

    async fn fetch_current_user(&self, access_token: &str) -> Result<DiscordUser, ExchangeError> {
        let body: Value = self
            .http
            .get(self.endpoint(CURRENT_USER_PATH))
            .bearer_auth(access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ExchangeError::UserRequest(e.to_string()))?
            .json()
            .await
            .map_err(|e| ExchangeError::UserRequest(e.to_string()))?;

        DiscordUser::from_json(&body).ok_or(ExchangeError::MissingUserId)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }
}
