//! Hosted checkout for store products.

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use gudpals_types::api::{CheckoutRequest, CheckoutResponse, Claims};
use gudpals_types::models::Order;

use crate::auth::AppState;
use crate::error::reject;

const STRIPE_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub name: String,
    pub unit_amount_cents: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub user_id: String,
    pub product_id: Uuid,
    pub line_items: Vec<LineItem>,
    pub success_url: String,
    pub cancel_url: String,
}

/// What the processor hands back: its session id and the page to send the user to.
#[derive(Debug, Clone, PartialEq)]
pub struct HostedCheckout {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("payment processor rejected the session ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("payment processor returned no checkout url")]
    MissingUrl,
}

pub trait PaymentProcessor: Send + Sync {
    fn create_checkout(&self, request: CheckoutSessionRequest) -> BoxFuture<'_, Result<HostedCheckout, PaymentError>>;
}

/// Stripe Checkout over its form-encoded REST API.
pub struct StripeCheckout {
    client: Client,
    secret_key: String,
}

impl StripeCheckout {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            secret_key: secret_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
}

fn stripe_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("client_reference_id".to_string(), request.user_id.clone()),
        ("metadata[user_id]".to_string(), request.user_id.clone()),
        ("metadata[product_id]".to_string(), request.product_id.to_string()),
    ];
    for (i, item) in request.line_items.iter().enumerate() {
        let key = |field: &str| format!("line_items[{}]{}", i, field);
        form.push((key("[price_data][currency]"), "usd".to_string()));
        form.push((key("[price_data][product_data][name]"), item.name.clone()));
        form.push((key("[price_data][unit_amount]"), item.unit_amount_cents.to_string()));
        form.push((key("[quantity]"), item.quantity.to_string()));
    }
    form
}

impl PaymentProcessor for StripeCheckout {
    fn create_checkout(&self, request: CheckoutSessionRequest) -> BoxFuture<'_, Result<HostedCheckout, PaymentError>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(STRIPE_SESSIONS_URL)
                .bearer_auth(&self.secret_key)
                .form(&stripe_form(&request))
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(PaymentError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            let session: StripeSession = resp.json().await?;
            let url = session.url.ok_or(PaymentError::MissingUrl)?;
            Ok(HostedCheckout {
                session_id: session.id,
                url,
            })
        })
    }
}

/// Create a hosted checkout for one product and record a pending order.
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.quantity == 0 {
        return Err(StatusCode::BAD_REQUEST);
    }
    let payments = state.payments.clone().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let product_id = req.product_id;
    let product = state
        .gateway
        .blocking(move |db| db.get_product(product_id))
        .await
        .map_err(reject)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let origin = state.public_url.trim_end_matches('/');
    let session = CheckoutSessionRequest {
        user_id: claims.sub.clone(),
        product_id,
        line_items: vec![LineItem {
            name: product.name.clone(),
            unit_amount_cents: product.price_cents,
            quantity: req.quantity,
        }],
        success_url: format!("{}/payment-success?session_id={{CHECKOUT_SESSION_ID}}", origin),
        cancel_url: format!("{}/payment-canceled", origin),
    };

    let hosted = payments.create_checkout(session).await.map_err(|e| {
        error!("Checkout for {} failed: {}", claims.sub, e);
        StatusCode::BAD_GATEWAY
    })?;

    let order = Order {
        id: Uuid::new_v4(),
        user_id: claims.sub.clone(),
        total_cents: product.price_cents * i64::from(req.quantity),
        checkout_session_id: hosted.session_id,
        status: "pending".into(),
        created_at: Utc::now(),
    };
    let order_id = order.id;
    state
        .gateway
        .blocking(move |db| db.insert_order(&order))
        .await
        .map_err(reject)?;

    info!("{} started checkout for {} (order {})", claims.sub, product.name, order_id);
    Ok(Json(CheckoutResponse {
        url: hosted.url,
        order_id,
    }))
}
