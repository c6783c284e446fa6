mod config;
mod reminders;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use gudpals_api::checkout::{PaymentProcessor, StripeCheckout};
use gudpals_api::{AppStateInner, router};
use gudpals_db::{Database, DbOptions};
use gudpals_realtime::dispatcher::Dispatcher;
use gudpals_realtime::tokens::ChannelTokens;
use gudpals_sync::LocalGateway;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gudpals=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init database
    let db = Database::open(
        &config.db_path,
        DbOptions {
            unique_registrations: config.unique_registrations,
        },
    )?;
    if !config.unique_registrations {
        info!("Registration uniqueness is enforced by check-then-insert only");
    }

    // Shared state
    let dispatcher = Dispatcher::new();
    let tokens = ChannelTokens::new(config.channel_token_secret.clone(), config.channel_token_ttl_secs);
    let gateway = LocalGateway::new(Arc::new(db), dispatcher, tokens);

    let payments = config.stripe_secret_key.as_ref().map(|key| {
        Arc::new(StripeCheckout::new(key.clone())) as Arc<dyn PaymentProcessor>
    });
    if payments.is_none() {
        warn!("STRIPE_SECRET_KEY not set, checkout is disabled");
    }

    // Background reminder sweep
    tokio::spawn(reminders::run_reminder_loop(
        gateway.clone(),
        config.reminder_interval_secs,
    ));

    let state = Arc::new(AppStateInner {
        gateway,
        jwt_secret: config.jwt_secret.clone(),
        payments,
        public_url: config.public_url.clone(),
    });

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("GUDPALS server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
