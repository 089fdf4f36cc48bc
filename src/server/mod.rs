//! Relay server
//!
//! Owns the axum router, the listen loop, and the background expiry task.

pub mod config;
pub mod http;

use std::sync::{Arc, Mutex};

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

pub use config::ServerConfig;

use crate::coordinator::Coordinator;
use crate::error::{Result, ServerError};
use crate::room::RoomToken;
use crate::storage::ObjectStorage;

use http::AppState;

/// Chat relay server
pub struct RelayServer<S: ObjectStorage> {
    config: Arc<ServerConfig>,
    coordinator: Arc<Coordinator<S>>,
    // Taken once by whichever run method starts the expiry task.
    expired_rx: Mutex<Option<mpsc::UnboundedReceiver<RoomToken>>>,
}

impl<S: ObjectStorage> RelayServer<S> {
    /// Create a new server with the given configuration and storage client
    pub fn new(config: ServerConfig, storage: S) -> Self {
        let (coordinator, expired_rx) = Coordinator::new(storage, config.relay.clone());

        Self {
            config: Arc::new(config),
            coordinator: Arc::new(coordinator),
            expired_rx: Mutex::new(Some(expired_rx)),
        }
    }

    /// Get a reference to the coordinator
    pub fn coordinator(&self) -> &Arc<Coordinator<S>> {
        &self.coordinator
    }

    /// Build the application router
    pub fn router(&self) -> Result<Router> {
        let origin = self
            .config
            .cors_origin
            .parse::<HeaderValue>()
            .map_err(|_| ServerError::Config {
                key: "CORS_ORIGIN".into(),
                reason: format!("not a valid origin: {}", self.config.cors_origin),
            })?;

        let cors = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST]);

        let state = AppState {
            coordinator: Arc::clone(&self.coordinator),
            config: Arc::clone(&self.config),
        };

        Ok(Router::new()
            .route("/create-chat", get(http::create_chat::<S>))
            .route("/upload", post(http::upload::<S>))
            .route("/ws", get(http::ws_handler::<S>))
            .layer(cors)
            .with_state(state))
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let router = self.router()?;
        let _expiry_handle = self.spawn_expiry_task();

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Chat relay listening");

        axum::serve(listener, router.into_make_service()).await?;
        Ok(())
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let router = self.router()?;
        let expiry_handle = self.spawn_expiry_task();

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Chat relay listening");

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = axum::serve(listener, router.into_make_service()) => {
                result.map_err(ServerError::from)
            }
        };

        if let Some(handle) = expiry_handle {
            handle.abort();
        }

        result
    }

    fn spawn_expiry_task(&self) -> Option<tokio::task::JoinHandle<()>> {
        let expired_rx = self
            .expired_rx
            .lock()
            .expect("expiry receiver lock poisoned")
            .take()?;
        Some(self.coordinator.spawn_expiry_task(expired_rx))
    }
}
