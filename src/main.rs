use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use pet_safety_agent::AppState;
use pet_safety_agent::handlers::{ask_handler, health_check, root_handler};
use pet_safety_agent::init::app_init;

fn create_app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/ask", post(ask_handler))
        .route("/health", get(health_check))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("🚀 Starting pet food safety Q&A server...");
    let (config, state) = app_init()?;
    log::info!("✅ Application state initialized");
    let app = create_app_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("");
    log::info!("🎉 Server started!");
    log::info!("📍 http://{}", addr);
    log::info!("📡 Ask: http://{}/ask", addr);
    log::info!("❤️  Health: http://{}/health", addr);
    log::info!("🤖 Model: {}", config.upstream.params.model);
    log::info!("🔌 Endpoint: {}", config.upstream.base_url);
    log::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
