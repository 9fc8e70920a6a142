//! Authentication broker for Discord logins.
//!
//! Exchanges a Discord OAuth2 authorization code for an RS256-signed identity token
//! and publishes the verification key, so other services can validate tokens without
//! calling back into this one.

use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::discord::DiscordClient;
use crate::issuer::TokenIssuer;

pub mod api;
pub mod config;
pub mod discord;
pub mod error;
pub mod issuer;
pub mod keys;

/// Shared, read-only state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub issuer: Arc<TokenIssuer>,
    pub discord: Arc<DiscordClient>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, issuer: TokenIssuer) -> Result<Self, reqwest::Error> {
        let discord = DiscordClient::new(&config.discord)?;
        Ok(Self {
            config: Arc::new(config),
            issuer: Arc::new(issuer),
            discord: Arc::new(discord),
            started_at: Instant::now(),
        })
    }
}
