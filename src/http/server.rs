//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wire the breaker, token issuer and directory client into a login service
//! - Create the Axum router (login, version, admin)
//! - Wire up middleware (panic recovery, CORS, timeout, request ID, tracing)
//! - Serve on a listener until shutdown is signalled

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::auth::{AllowedCredentials, LoginService, TokenIssuer};
use crate::config::{AdminConfig, AppConfig};
use crate::directory::{DirectoryClient, DirectoryError};
use crate::http::handlers;
use crate::resilience::{BreakerConfig, CircuitBreaker};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub login: Arc<LoginService>,
    pub breaker: Arc<CircuitBreaker>,
    pub admin: AdminConfig,
}

/// HTTP server for the authentication gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Build every subsystem from configuration.
    pub fn new(config: AppConfig) -> Result<Self, DirectoryError> {
        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker.name.clone(),
            BreakerConfig::from_settings(&config.breaker),
        ));
        let tokens = Arc::new(TokenIssuer::from_config(&config.auth));
        let directory = DirectoryClient::from_config(&config.directory, breaker.clone(), tokens.clone())?;

        tracing::info!(
            directory = %config.directory.base_url,
            fallback = ?directory.policy(),
            breaker = %breaker.name(),
            "User directory client ready"
        );

        let login = LoginService::new(
            Arc::new(directory),
            AllowedCredentials::new(config.auth.allowed_credentials.iter().cloned()),
            tokens,
        );

        let state = AppState {
            login: Arc::new(login),
            breaker,
            admin: config.admin.clone(),
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/login", post(handlers::login))
            .route("/version", get(handlers::version))
            .with_state(state.clone());

        if config.admin.enabled {
            router = router.merge(admin::setup_admin_router(state));
        }

        router
            .layer(CatchPanicLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
