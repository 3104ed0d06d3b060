//! HTTP adapter that lets a browser front end hand snippets to the runner
//!
//! `POST /run` takes `{ "source": "...", "input": null }` and always answers
//! `200` with an execution result; failures live in its `error` field, the
//! same way the in-page runner reports them. `POST /validate` only applies
//! the denylist. The denylist is a deterrent, not a sandbox, so do not expose
//! this server to untrusted networks.
//!
//! A snippet that outlives its time budget keeps its interpreter thread. Keep
//! `runner.max_loop_iterations` finite (the default is one billion iterations
//! per loop) so repeated `while (true) {}` requests cannot pile up spinning
//! threads.

pub mod error;

pub use error::{Result, ServerError};

use axum::extract::{DefaultBodyLimit, Json as AxumJson, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, options, post};
use axum::{middleware, Router};
use codepad_core::config::ServerSettings;
use codepad_core::{CodeRunner, ExecutionRequest, ExecutionResult, ValidationResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub engine: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateRequest {
    pub source: String,
}

/// Configuration for the HTTP adapter.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable permissive CORS
    pub enable_cors: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Enable request logging
    pub enable_logging: bool,
}

impl ServerConfig {
    pub fn from_settings(settings: &ServerSettings) -> Result<Self> {
        let bind_addr = settings
            .socket_addr()
            .map_err(|e| ServerError::config_error(e.to_string()))?;
        Ok(Self {
            bind_addr,
            enable_cors: settings.enable_cors,
            ..Self::default()
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3030)),
            enable_cors: true,
            max_body_size: 1024 * 1024, // 1MB
            enable_logging: true,
        }
    }
}

#[derive(Clone)]
struct AppState {
    runner: Arc<CodeRunner>,
}

pub struct CodepadServer {
    runner: Arc<CodeRunner>,
    config: ServerConfig,
}

impl CodepadServer {
    pub fn new(runner: Arc<CodeRunner>) -> Self {
        Self::with_config(runner, ServerConfig::default())
    }

    pub fn with_config(runner: Arc<CodeRunner>, config: ServerConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            runner: self.runner.clone(),
        };

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/run", post(run_handler))
            .route("/validate", post(validate_handler))
            // CORS preflight
            .route("/run", options(|| async { StatusCode::OK }))
            .route("/validate", options(|| async { StatusCode::OK }))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>,
                 next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();
                    log::info!("Request {} {} {}", request_id, method, uri);

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    log::info!(
                        "Response {} {} completed in {:?}",
                        request_id,
                        response.status(),
                        start.elapsed()
                    );
                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Serve until `shutdown_signal` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!(
            "codepad server listening on {} ({} engine)",
            self.config.bind_addr,
            self.runner.engine_name()
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("codepad server shut down gracefully");
        Ok(())
    }
}

async fn health_handler(State(app_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        engine: app_state.runner.engine_name().to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn run_handler(
    State(app_state): State<AppState>,
    AxumJson(request): AxumJson<ExecutionRequest>,
) -> Json<ExecutionResult> {
    log::debug!("Running snippet of {} bytes", request.source.len());
    Json(app_state.runner.execute(request).await)
}

async fn validate_handler(
    State(app_state): State<AppState>,
    AxumJson(request): AxumJson<ValidateRequest>,
) -> Json<ValidationResult> {
    Json(app_state.runner.validate(&request.source))
}

/// Utility function to create a shutdown signal from Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use std::time::Duration;
    use tower::ServiceExt; // for `oneshot`

    fn app() -> Router {
        let runner = CodeRunner::embedded()
            .with_timeout(Duration::from_millis(300))
            .with_console_echo(false);
        let config = ServerConfig {
            enable_logging: false,
            ..ServerConfig::default()
        };
        CodepadServer::with_config(Arc::new(runner), config).build_router()
    }

    async fn post_json(uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["engine"], "boa");
    }

    #[tokio::test]
    async fn test_run_endpoint_returns_output() {
        let (status, body) = post_json("/run", serde_json::json!({ "source": "console.log(1+1)" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "2");
        assert!(body["error"].is_null());
        assert!(body["executionTime"].is_number());
    }

    #[tokio::test]
    async fn test_run_endpoint_reports_errors_in_body() {
        let (status, body) =
            post_json("/run", serde_json::json!({ "source": "throw new Error(\"boom\")" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "boom");
        assert_eq!(body["output"], "");

        let (status, body) = post_json("/run", serde_json::json!({ "source": "`hello`" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "Template literals are not allowed");
        assert!(body["executionTime"].is_null());
    }

    #[tokio::test]
    async fn test_validate_endpoint() {
        let (status, body) =
            post_json("/validate", serde_json::json!({ "source": "document.title = \"x\"" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isValid"], false);
        assert_eq!(body["error"], "Access to DOM and global objects is restricted");

        let (_, body) = post_json("/validate", serde_json::json!({ "source": "1 + 1" })).await;
        assert_eq!(body, serde_json::json!({ "isValid": true }));
    }

    #[tokio::test]
    async fn test_missing_source_is_rejected() {
        let (status, _) = post_json("/run", serde_json::json!({ "code": "1" })).await;
        assert!(status.is_client_error());
    }

    #[test]
    fn test_config_from_settings() {
        let settings = ServerSettings {
            bind_addr: "0.0.0.0:8080".to_string(),
            enable_cors: false,
        };
        let config = ServerConfig::from_settings(&settings).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert!(!config.enable_cors);

        let bad = ServerSettings {
            bind_addr: "nowhere".to_string(),
            enable_cors: true,
        };
        assert!(matches!(ServerConfig::from_settings(&bad), Err(ServerError::Config(_))));
    }
}
