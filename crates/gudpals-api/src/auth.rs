use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};

use gudpals_sync::LocalGateway;
use gudpals_types::api::Claims;

use crate::checkout::PaymentProcessor;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub gateway: LocalGateway,
    pub jwt_secret: String,
    /// `None` when no payment processor is configured; checkout answers 503
    pub payments: Option<Arc<dyn PaymentProcessor>>,
    /// Origin used to build checkout return URLs
    pub public_url: String,
}

/// Sign session claims for `user_id`. The identity provider's bridge uses
/// this after it has verified the user.
pub fn create_token(
    secret: &str,
    user_id: &str,
    name: &str,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id.to_string(),
        name: name.to_string(),
        exp: (Utc::now() + ttl).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
