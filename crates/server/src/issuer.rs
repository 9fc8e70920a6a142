//! Token issuance.
//!
//! Issued tokens are RS256 JWTs carrying exactly five claims:
//!
//! ```json
//! {"discordId": "…", "userId": "…", "username": "…", "iat": 0, "exp": 0}
//! ```
//!
//! `discordId` is the historical claim name and `userId` the current one. Both always
//! hold the same Discord id so consumers of either keep working.
//!
//! `iat` has one-second resolution and RS256 signatures are deterministic, so the issuer
//! keeps `iat` strictly increasing per Discord id: a second token for the same identity
//! within the same second is stamped one second later. `exp - iat` stays exactly
//! [`TOKEN_LIFETIME`].

use crate::discord::DiscordUser;
use crate::keys::{KeyLoadError, KeyStore, SigningKeys};
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;

/// Validity window of every issued token.
pub const TOKEN_LIFETIME: Duration = Duration::days(30);
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::RS256;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("Invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

/// Claims embedded in an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Claims {
    #[serde(rename = "discordId")]
    discord_id: String,
    #[serde(rename = "userId")]
    user_id: String,
    username: Option<String>,
    iat: i64,
    exp: i64,
}

impl Claims {
    pub fn new(user: &DiscordUser, issued_at: OffsetDateTime) -> Self {
        Self {
            discord_id: user.id.clone(),
            user_id: user.id.clone(),
            username: user.username.clone(),
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + TOKEN_LIFETIME).unix_timestamp(),
        }
    }

    pub fn discord_id(&self) -> &str {
        &self.discord_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Issued-at, Unix seconds.
    pub fn iat(&self) -> i64 {
        self.iat
    }

    /// Expiry, Unix seconds.
    pub fn exp(&self) -> i64 {
        self.exp
    }
}

/// Signs claims with the process-wide RSA key.
///
/// Built once at startup from [`SigningKeys`] and shared between requests.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key_pem: String,
    /// Last `iat` handed out per Discord id. Only entries at or ahead of the clock are kept.
    last_issued: DashMap<String, i64>,
}

impl TokenIssuer {
    pub fn new(keys: &SigningKeys) -> Result<Self, KeyLoadError> {
        let private_key_pem = keys.private_key_pem()?;
        let public_key_pem = keys.public_key_pem()?;

        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| KeyLoadError::Encoding(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| KeyLoadError::Encoding(e.to_string()))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            public_key_pem,
            last_issued: DashMap::new(),
        })
    }

    pub fn from_key_store(store: &KeyStore) -> Result<Self, KeyLoadError> {
        Self::new(&store.load()?)
    }

    /// Sign a token for `user`, issued now.
    ///
    /// Never returns the same token twice for one identity.
    pub fn issue(&self, user: &DiscordUser) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        let iat = self.next_issued_at(&user.id, now.unix_timestamp());
        self.issue_at(user, now + Duration::seconds(iat - now.unix_timestamp()))
    }

    fn next_issued_at(&self, user_id: &str, now: i64) -> i64 {
        let iat = {
            let mut last = self.last_issued.entry(user_id.to_owned()).or_insert(i64::MIN);
            let iat = if *last >= now { *last + 1 } else { now };
            *last = iat;
            iat
        };
        self.last_issued.retain(|_, last| *last >= now);
        iat
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub fn issue_at(
        &self,
        user: &DiscordUser,
        issued_at: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let claims = Claims::new(user, issued_at);
        encode(&Header::new(TOKEN_ALGORITHM), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    /// Check signature and expiry of a token issued with this key.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(TOKEN_ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }

    /// SubjectPublicKeyInfo PEM that relying parties verify tokens with.
    pub fn export_public_key_pem(&self) -> &str {
        &self.public_key_pem
    }
}
