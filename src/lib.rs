// src/lib.rs

// --- Модули ---
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod state;
pub mod upstream;

// --- Зависимости и пере-экспорты ---
use crate::middleware::bearer_auth_middleware;
use crate::routes::{
    chat_completions, embeddings, health_check, list_keys, list_models, revalidate_key,
};
use axum::{
    body::Body,
    http::{HeaderValue, Method, Request as AxumRequest},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::{path::PathBuf, sync::Arc, time::Duration, time::Instant};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

// Пере-экспорт ключевых типов для удобства использования
pub use config::AppConfig;
pub use error::{AppError, Result};
pub use state::AppState;

/// Создает основной роутер Axum для приложения.
///
/// Все защищённые маршруты доступны также под префиксом `/hf`.
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/embeddings", post(embeddings))
        .route("/v1/keys/list", get(list_keys))
        .route("/v1/keys/revalidate", post(revalidate_key))
        .route_layer(from_fn_with_state(state.clone(), bearer_auth_middleware));

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .merge(api_routes.clone())
        .nest("/hf", api_routes)
        .layer(cors_layer())
        .layer(from_fn(trace_requests))
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(Duration::from_secs(600))
}

/// Middleware для добавления Request ID и трассировки запросов.
async fn trace_requests(
    mut req: AxumRequest<Body>,
    next: axum::middleware::Next,
) -> impl IntoResponse {
    let request_id = Uuid::new_v4();
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        http.method = %method,
        url.path = %path,
    );

    // Добавляем request_id в расширения запроса для доступа в других обработчиках
    req.extensions_mut().insert(request_id);

    async move {
        let mut response = next.run(req).await;
        let elapsed = start_time.elapsed();

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("x-request-id", value);
        }

        info!(
            http.response.duration = ?elapsed,
            http.status_code = response.status().as_u16(),
            "Finished processing request"
        );

        response
    }
    .instrument(span)
    .await
}

/// Загружает конфигурацию, строит состояние и роутер.
pub async fn run(
    config_path_override: Option<PathBuf>,
    port_override: Option<u16>,
) -> Result<(Router, AppConfig)> {
    info!("Starting OpenAI API Key Rotation Proxy...");

    let mut app_config = setup_configuration(config_path_override)?;
    if let Some(port) = port_override {
        info!(server.port = port, "Overriding server port from command line");
        app_config.server.port = port;
    }

    let app_state = AppState::new(&app_config).map_err(|e| {
        error!(error = ?e, "Failed to initialize application state. Exiting.");
        e
    })?;
    info!("Application state initialized successfully.");

    Ok((create_router(Arc::new(app_state)), app_config))
}

/// Загружает, валидирует и логирует конфигурацию приложения.
fn setup_configuration(config_path_override: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = config_path_override.unwrap_or_else(|| {
        std::env::var("CONFIG_PATH").map_or_else(|_| PathBuf::from("config.yaml"), PathBuf::from)
    });

    let config_path_display = config_path.display().to_string();
    let app_config = config::load_config(&config_path).map_err(|e| {
        error!(
            config.path = %config_path_display,
            error = ?e,
            "Failed to load or validate configuration. Exiting."
        );
        e
    })?;

    info!(
        config.total_keys = app_config.api_keys.len(),
        config.available_models = app_config.available_models.len(),
        server.port = app_config.server.port,
        "Configuration loaded and validated successfully."
    );

    Ok(app_config)
}
