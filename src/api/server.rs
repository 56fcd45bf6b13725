use std::sync::{Arc, RwLock};

use anyhow::{Error, Result};
use axum::middleware;
use axum::{Router, extract::Request, response::Response};
use http::{HeaderValue, header};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::routes;
use crate::ai::prompt;
use crate::api::state::{AppState, spawn_session_sweeper};
use crate::core::AppConfig;
use crate::openai::{BoxedGateway, OpenAiGateway};

async fn set_static_cache_control(request: Request, next: middleware::Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

pub fn app(shared_state: Arc<RwLock<AppState>>) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        // API routes
        .nest("/api", routes::router())
        // Static server of the chat UI in ./web-ui
        .fallback_service(
            ServiceBuilder::new()
                .layer(middleware::from_fn(set_static_cache_control))
                .service(ServeDir::new("./web-ui/src")),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::clone(&shared_state))
}

// Run the server
pub async fn serve(host: String, port: String, config: AppConfig) -> Result<(), Error> {
    let system_prompt = prompt::system_prompt()?;
    let gateway: BoxedGateway = Arc::new(OpenAiGateway::from_config(&config));
    tracing::info!(
        "Using model {} at {}",
        config.llm_model,
        config.llm_api_hostname
    );

    let app_state = AppState::new(config, gateway, &system_prompt);
    let shared_state = Arc::new(RwLock::new(app_state));
    let app = app(Arc::clone(&shared_state));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;

    tracing::debug!("Server started. Listening on {}", listener.local_addr()?);

    // Clients can disappear without ending their session
    spawn_session_sweeper(Arc::clone(&shared_state));

    axum::serve(listener, app).await?;

    Ok(())
}
