//! HTTP surface: routes, shared request state and server startup.

mod error;
mod handlers;

pub use error::ApiError;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::archive::{AllowList, BuildOptions};
use crate::mail::{MailRelay, SmtpConfig, SmtpRelay};

/// Default cap on build and inspect uploads (32 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 << 20;
/// Default cap on mail relay uploads (10 MiB).
pub const DEFAULT_MAX_MAIL_BYTES: usize = 10 << 20;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub max_upload_bytes: usize,
    pub max_mail_bytes: usize,
    pub build_options: BuildOptions,
    pub smtp: Option<SmtpConfig>,
}

/// Immutable per-process state handed to every request.
///
/// Each route reads its own policy; the two are never merged.
pub struct AppState {
    pub build_policy: AllowList,
    pub mail_policy: AllowList,
    pub build_options: BuildOptions,
    pub mail: Option<Arc<dyn MailRelay>>,
}

impl AppState {
    pub fn new(build_options: BuildOptions, mail: Option<Arc<dyn MailRelay>>) -> Self {
        Self {
            build_policy: AllowList::archive_build(),
            mail_policy: AllowList::mail_relay(),
            build_options,
            mail,
        }
    }
}

/// Build the application router with per-route upload limits.
pub fn router(state: AppState, max_upload_bytes: usize, max_mail_bytes: usize) -> Router {
    Router::new()
        .route(
            "/api/archive/files",
            post(handlers::create_archive).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/api/archive/information",
            post(handlers::archive_information).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/api/mail/file",
            post(handlers::send_file).layer(DefaultBodyLimit::max(max_mail_bytes)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind `config.listen` and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let mail: Option<Arc<dyn MailRelay>> = match &config.smtp {
        Some(smtp) => Some(Arc::new(SmtpRelay::new(smtp)?)),
        None => {
            tracing::warn!("SMTP_HOST not set, mail relay disabled");
            None
        }
    };

    let state = AppState::new(config.build_options, mail);
    let app = router(state, config.max_upload_bytes, config.max_mail_bytes);

    let listener = TcpListener::bind(config.listen).await?;
    info!(
        addr = %listener.local_addr()?,
        max_upload_mb = config.max_upload_bytes / 1024 / 1024,
        max_mail_mb = config.max_mail_bytes / 1024 / 1024,
        compression = ?config.build_options.compression,
        "Server ready and accepting connections"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on Ctrl+C (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }

    info!("Shutting down gracefully...");
}
