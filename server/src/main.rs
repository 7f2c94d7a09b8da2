use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use ticketing_server::clock::SystemClock;
use ticketing_server::config::Config;
use ticketing_server::payments::{
    HttpPaymentProvider, MockPaymentProvider, PaymentProvider, MOCK_PROVIDER_NAME,
};
use ticketing_server::routes::create_routes;
use ticketing_server::state::AppState;
use ticketing_server::store::PgStore;

const DEFAULT_LOG_FILTER: &str = "ticketing_server=info,tower_http=info";

fn payment_provider(
    config: &Config,
) -> Result<Arc<dyn PaymentProvider>, Box<dyn std::error::Error>> {
    match &config.payment_api {
        Some(api) => {
            tracing::info!(provider = %config.payment_provider, url = %api.url, "Using hosted payment provider");
            Ok(Arc::new(HttpPaymentProvider::new(
                config.payment_provider.clone(),
                api.url.clone(),
                api.key.clone(),
                config.payment_webhook_secret.clone(),
            )?))
        }
        None => {
            if config.production {
                tracing::warn!("Mock payment provider in use in production");
            }
            if config.payment_provider != MOCK_PROVIDER_NAME {
                tracing::warn!(
                    provider = %config.payment_provider,
                    "PAYMENT_API_URL/PAYMENT_API_KEY not set, callbacks are served under /payments/{}/",
                    MOCK_PROVIDER_NAME
                );
            }
            Ok(Arc::new(MockPaymentProvider::new(
                config.payment_webhook_secret.clone(),
            )))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Successfully connected to database");

    sqlx::migrate!().run(&pool).await?;

    tracing::info!("Migrations run successfully");

    let state = AppState::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(SystemClock),
        payment_provider(&config)?,
        config.payment_return_url.clone(),
        config.pending_order_ttl,
    );
    let app = create_routes(state, &config);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("🚀 Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
