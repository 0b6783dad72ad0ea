//! Warden web server
//!
//! Binds the listener, runs the periodic maintenance sweep and serves until
//! Ctrl-C.

use crate::auth::reset::{LogMailer, Mailer};
use crate::{create_app, AppState};
use axum::serve;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};
use warden_core::{WardenConfig, WardenError, WardenResult};

/// Main Warden web server
pub struct WardenServer {
    state: AppState,
}

impl WardenServer {
    pub async fn new(config: WardenConfig) -> WardenResult<Self> {
        let state = AppState::new(config).await?;
        Ok(Self { state })
    }

    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn start(self) -> WardenResult<()> {
        let address = self.state.config.server.address();
        let listener = TcpListener::bind(&address).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> WardenResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr()?;
        info!("Server listening on http://{}", local);
        info!("Development mode: {}", self.state.config.server.dev_mode);

        let sweeper = spawn_sweeper(self.state.clone());
        let app = create_app(self.state.clone());

        let result = serve(listener, app).with_graceful_shutdown(shutdown).await;
        sweeper.abort();

        if let Err(e) = result {
            error!("Server error: {}", e);
            return Err(WardenError::Io(e));
        }

        info!("Server stopped");
        Ok(())
    }

    /// Get application state
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Periodically drop expired tokens, sessions and reset codes
fn spawn_sweeper(state: AppState) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.auth.sweep_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(err) = state.run_sweep(Utc::now()).await {
                error!("Maintenance sweep failed: {}", err);
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Builder for WardenServer
pub struct WardenServerBuilder {
    config: WardenConfig,
    mailer: Arc<dyn Mailer>,
}

impl WardenServerBuilder {
    pub fn new() -> Self {
        Self::from_config(WardenConfig::default())
    }

    pub fn from_config(config: WardenConfig) -> Self {
        Self {
            config,
            mailer: Arc::new(LogMailer),
        }
    }

    /// Set the server host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.server.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Enable development mode
    pub fn dev_mode(mut self, dev_mode: bool) -> Self {
        self.config.server.dev_mode = dev_mode;
        self
    }

    /// Set database URL
    pub fn database_url<S: Into<String>>(mut self, database_url: S) -> Self {
        self.config.database.url = database_url.into();
        self
    }

    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    /// Build the server
    pub async fn build(self) -> WardenResult<WardenServer> {
        let state = AppState::with_mailer(self.config, self.mailer).await?;
        Ok(WardenServer::from_state(state))
    }
}

impl Default for WardenServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_builder() {
        let builder = WardenServerBuilder::new()
            .host("localhost")
            .port(3000)
            .dev_mode(true)
            .database_url("sqlite::memory:");

        assert_eq!(builder.config.server.host, "localhost");
        assert_eq!(builder.config.server.port, 3000);
        assert!(builder.config.server.dev_mode);
        assert!(builder.config.database.is_memory());
    }

    #[tokio::test]
    async fn test_build_requires_secret_outside_dev_mode() {
        assert!(WardenServerBuilder::new().build().await.is_err());
        assert!(WardenServerBuilder::new().dev_mode(true).build().await.is_ok());
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let server = WardenServerBuilder::new().dev_mode(true).build().await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(server.serve_on(listener, async {
            rx.await.ok();
        }));
        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
