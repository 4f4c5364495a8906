//! HTTP Server
//!
//! axum application exposing the device flow and identity passthrough.

pub mod pages;
pub mod routes;

use std::sync::Arc;
use tokio::net::TcpListener;

use crate::core::{HttpTransport, ReqwestHttpTransport, SystemClock};
use crate::error::{DeviceAuthResult, NetworkError};
use crate::flows::{DeviceFlowService, DeviceFlowSettings};
use crate::identity::{IdentityPassthrough, IdentityProvider, IdentityToolkitClient};
use crate::providers::OAuthProviderExchange;
use crate::session::{spawn_sweeper, InMemorySessionStore, SessionStore};
use crate::telemetry::{
    DeviceAuthLogContext, DeviceAuthMetrics, Logger, NoOpMetrics, TracingLogger,
};
use crate::types::ServerConfig;

pub use pages::{escape_html, render_device_page};
pub use routes::build_router;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub device: Arc<DeviceFlowService>,
    pub identity: Arc<IdentityPassthrough>,
    pub store: Arc<dyn SessionStore>,
    pub identity_configured: bool,
    pub public_base_url: Option<String>,
}

impl AppState {
    /// Wire the services for `config` over `transport`.
    pub fn from_config<T: HttpTransport + 'static>(
        config: &ServerConfig,
        transport: Arc<T>,
        logger: Arc<dyn Logger>,
        metrics: Arc<dyn DeviceAuthMetrics>,
    ) -> Self {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::with_clock(
            Arc::new(SystemClock),
            config.session.completed_grace_secs,
        ));

        let toolkit = IdentityToolkitClient::new(
            config.identity.clone(),
            Arc::clone(&transport),
            config.timeout,
        );
        let identity_configured = toolkit.is_configured();
        let identity: Arc<dyn IdentityProvider> = Arc::new(toolkit);

        let exchange = Arc::new(OAuthProviderExchange::new(
            config.google.clone(),
            config.github.clone(),
            transport,
            Arc::clone(&identity),
            config.timeout,
        ));

        let settings = DeviceFlowSettings {
            ttl_secs: config.session.ttl_secs,
            poll_interval_secs: config.session.poll_interval_secs,
            route_prefix: config.route_prefix.clone(),
        };
        let device = DeviceFlowService::new(Arc::clone(&store), exchange, settings)
            .with_logger(Arc::clone(&logger))
            .with_metrics(Arc::clone(&metrics));

        Self {
            device: Arc::new(device),
            identity: Arc::new(IdentityPassthrough::new(identity, logger, metrics)),
            store,
            identity_configured,
            public_base_url: config.public_base_url.clone(),
        }
    }
}

/// Bind `config.bind_addr` and serve until Ctrl-C.
///
/// Metrics are discarded; embedders wanting them build [`AppState::from_config`]
/// with their own [`DeviceAuthMetrics`].
pub async fn run(config: ServerConfig) -> DeviceAuthResult<()> {
    let logger: Arc<dyn Logger> = Arc::new(TracingLogger);
    let metrics: Arc<dyn DeviceAuthMetrics> = Arc::new(NoOpMetrics);
    let transport = Arc::new(ReqwestHttpTransport::new()?);
    let state = AppState::from_config(&config, transport, Arc::clone(&logger), Arc::clone(&metrics));

    let configured: Vec<&str> = config
        .configured_providers()
        .iter()
        .map(|p| p.as_str())
        .collect();
    if configured.is_empty() {
        logger.warn(
            "No OAuth providers configured; device logins will be rejected",
            &DeviceAuthLogContext::new().operation("startup"),
        );
    }
    if !state.identity_configured {
        logger.warn(
            "Identity provider API key missing; logins cannot complete",
            &DeviceAuthLogContext::new().operation("startup"),
        );
    }

    let sweeper = config.session.sweep_interval.map(|period| {
        spawn_sweeper(
            Arc::clone(&state.store),
            period,
            Arc::clone(&logger),
            Arc::clone(&metrics),
        )
    });

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| NetworkError::ConnectionFailed {
            message: format!("failed to bind {}: {}", config.bind_addr, e),
        })?;

    logger.info(
        "Device authorization server listening",
        &DeviceAuthLogContext::new()
            .operation("startup")
            .extra("addr", config.bind_addr.to_string())
            .extra("route_prefix", config.route_prefix.clone())
            .extra("providers", configured.join(",")),
    );

    let app = build_router(state);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| NetworkError::ConnectionFailed {
            message: e.to_string(),
        });

    if let Some(handle) = sweeper {
        handle.abort();
    }
    logger.info(
        "Device authorization server stopped",
        &DeviceAuthLogContext::new().operation("shutdown"),
    );
    Ok(served?)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler; run until the process is killed.
        std::future::pending::<()>().await;
    }
}
