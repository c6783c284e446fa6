//! Time-limited access tokens for live video channels.
//!
//! Tokens are HS256 JWTs minted server-side when a host goes live. A token
//! names exactly one channel and the strongest role it grants.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gudpals_types::media::ChannelRole;

/// `aud` of every channel token. Session JWTs carry no audience.
pub const CHANNEL_AUDIENCE: &str = "gudpals-channel";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelClaims {
    pub aud: String,
    pub channel: String,
    pub role: ChannelRole,
    pub exp: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("channel token expired")]
    Expired,

    #[error("channel token invalid")]
    Invalid,

    #[error("token is for channel '{0}'")]
    WrongChannel(String),

    #[error("failed to sign channel token")]
    Signing,
}

#[derive(Clone)]
pub struct ChannelTokens {
    secret: String,
    ttl_secs: i64,
}

impl ChannelTokens {
    pub fn new(secret: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs,
        }
    }

    pub fn mint(&self, channel: &str, role: ChannelRole) -> Result<String, TokenError> {
        let claims = ChannelClaims {
            aud: CHANNEL_AUDIENCE.to_string(),
            channel: channel.to_string(),
            role,
            exp: (Utc::now().timestamp() + self.ttl_secs) as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|_| TokenError::Signing)
    }

    /// Decode a token and check it belongs to `channel`.
    pub fn verify(&self, token: &str, channel: &str) -> Result<ChannelClaims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_audience(&[CHANNEL_AUDIENCE]);

        let data = decode::<ChannelClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })?;

        if data.claims.channel != channel {
            return Err(TokenError::WrongChannel(data.claims.channel));
        }
        Ok(data.claims)
    }
}
