use axum::{http::Method, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod automations;
mod config;
mod database;
mod error;
mod handlers;
mod services;

pub use error::{ApiError, ApiResult, AppError};

#[cfg(test)]
mod tests;

pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub dispatcher: automations::AutomationDispatcher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;
    database::migrate(&db_pool).await?;

    if !config.smtp.is_configured() {
        tracing::warn!("SMTP is not fully configured; send_email actions will fail until it is");
    }
    let mailer: Arc<dyn automations::MailSender> =
        Arc::new(services::EmailService::new(&config.smtp)?);

    let engine_store: Arc<dyn automations::EngineStore> =
        Arc::new(automations::PgEngineStore::new(db_pool.clone()));
    let crm_store: Arc<dyn automations::CrmStore> =
        Arc::new(automations::PgCrmStore::new(db_pool.clone()));
    let engine = Arc::new(automations::AutomationEngine::new(engine_store, crm_store, mailer));
    let dispatcher = automations::AutomationDispatcher::start(engine);

    let app_state = Arc::new(AppState { db_pool, dispatcher });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(|| async { "Cadence CRM API v1.0.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/automations", handlers::automation_routes())
        .nest("/api/v1/contacts", handlers::contact_routes())
        .nest("/api/v1/deals", handlers::deal_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
