//! Courier API Server with graceful shutdown

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::compression::CompressionLayer;

use courier_queue::{ConsoleTransport, JobStore, MailTransport, MemoryJobStore, WorkerPool};

use crate::config::{CourierConfig, SmtpSettings};
use crate::error::ApiError;
use crate::middleware::{
    body_limit_layer, cors_layer, request_id_middleware, timeout_layer, tracing_middleware,
};
use crate::retention::spawn_sweeper;
use crate::routes::api_router;
use crate::state::AppState;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server address
    pub addr: SocketAddr,
    /// Request timeout
    pub timeout: Duration,
    /// Max request body size (bytes)
    pub max_body_size: usize,
    /// Enable compression
    pub compression: bool,
    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            timeout: Duration::from_secs(35),
            max_body_size: 1024 * 1024, // 1MB
            compression: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Courier API Server
pub struct CourierServer {
    config: CourierConfig,
    app_state: AppState,
}

impl CourierServer {
    /// Create a server over an in-memory store and the configured transport
    pub fn new(config: CourierConfig) -> Result<Self, ApiError> {
        let transport = build_transport(config.smtp.as_ref(), config.worker.retry.send_timeout)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Create a server around an existing transport
    pub fn with_transport(config: CourierConfig, transport: Arc<dyn MailTransport>) -> Self {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let pool = Arc::new(WorkerPool::new(store.clone(), transport, config.worker));
        let app_state = AppState::new(store, pool, config.admission);
        Self { config, app_state }
    }

    pub fn state(&self) -> &AppState {
        &self.app_state
    }

    /// Get the configured router
    pub fn router(&self) -> Router {
        let server = &self.config.server;
        let mut app = api_router(self.app_state.clone());

        // Apply middleware layers (order matters - bottom to top execution)
        if server.compression {
            app = app.layer(CompressionLayer::new());
        }
        app.layer(body_limit_layer(server.max_body_size))
            .layer(timeout_layer(self.config.request_timeout()))
            .layer(cors_layer(&server.cors_origins))
            .layer(middleware::from_fn(tracing_middleware))
            // Request ID (outermost, so tracing sees it)
            .layer(middleware::from_fn(request_id_middleware))
    }

    /// Run the server with graceful shutdown
    ///
    /// On shutdown the worker pool stops handing out send slots: recipients
    /// still waiting are recorded as failed so every job reaches a terminal
    /// state.
    pub async fn run(self) -> Result<(), ApiError> {
        let app = self.router();
        let addr = self.config.server.addr;

        let sweeper = spawn_sweeper(self.app_state.store(), self.config.job_ttl);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        tracing::info!("Courier API listening on http://{}", addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ApiError::Internal(format!("Server error: {}", e)));

        self.app_state.pool().shutdown();
        sweeper.abort();

        served?;
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

fn build_transport(
    smtp: Option<&SmtpSettings>,
    send_timeout: Duration,
) -> Result<Arc<dyn MailTransport>, ApiError> {
    match smtp {
        #[cfg(feature = "smtp")]
        Some(settings) => {
            let transport = courier_queue::SmtpTransport::new(courier_queue::SmtpConfig {
                host: settings.host.clone(),
                port: settings.port,
                username: settings.username.clone(),
                password: settings.password.clone(),
                timeout: send_timeout,
            })
            .map_err(|e| ApiError::Internal(format!("SMTP init failed: {}", e)))?;
            Ok(Arc::new(transport))
        }
        #[cfg(not(feature = "smtp"))]
        Some(settings) => {
            let _ = send_timeout;
            tracing::warn!(
                host = %settings.host,
                "SMTP_HOST is set but the smtp feature is disabled. Using console transport."
            );
            Ok(Arc::new(ConsoleTransport))
        }
        None => {
            tracing::warn!("SMTP_HOST not set. Using console transport.");
            Ok(Arc::new(ConsoleTransport))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Initialize tracing subscriber
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,courier_api=debug,courier_queue=debug,tower_http=debug")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
