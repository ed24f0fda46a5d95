//! Server implementation

use crate::config::ServerConfig;
use crate::fixture::Fixture;
use crate::http;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use treeql_core::{Error, Result};
use treeql_engine::MemoryEngine;
use treeql_query::{CoercionRegistry, QueryFactory};

/// TreeQL HTTP server
pub struct Server {
    /// Server configuration
    config: ServerConfig,

    /// Query pipeline shared by all requests
    factory: QueryFactory<MemoryEngine>,

    /// Running state
    running: AtomicBool,

    /// HTTP server handle
    http_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Create a server, loading the configured fixture
    pub fn new(config: ServerConfig) -> Result<Self> {
        let fixture = match &config.fixture {
            Some(path) => {
                info!("Loading fixture from {:?}", path);
                Fixture::from_file(path)?
            }
            None => {
                warn!("No fixture configured, serving an empty schema");
                Fixture::default()
            }
        };
        let factory = fixture.into_factory(CoercionRegistry::default())?;
        Ok(Self::with_factory(config, factory))
    }

    /// Create a server around an existing factory
    pub fn with_factory(config: ServerConfig, factory: QueryFactory<MemoryEngine>) -> Self {
        Self {
            config,
            factory,
            running: AtomicBool::new(false),
            http_handle: Mutex::new(None),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the query factory
    pub fn factory(&self) -> &QueryFactory<MemoryEngine> {
        &self.factory
    }

    /// Check if server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bind the listener and start serving; returns the bound address
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.is_running() {
            return Err(Error::Configuration("Server already running".to_string()));
        }

        info!("Starting TreeQL server...");
        let router = http::create_router(self.factory.clone());
        let listener = tokio::net::TcpListener::bind(self.config.address()).await?;
        let addr = listener.local_addr()?;
        info!("HTTP server listening on {}", addr);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                warn!("HTTP server error: {}", e);
            }
        });

        *self
            .http_handle
            .lock()
            .map_err(|_| Error::Configuration("server handle lock poisoned".to_string()))? =
            Some(handle);
        self.running.store(true, Ordering::SeqCst);

        info!("TreeQL server started successfully");
        Ok(addr)
    }

    /// Stop serving
    pub async fn stop(&self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::Configuration("Server not running".to_string()));
        }

        info!("Stopping TreeQL server...");
        let handle = self
            .http_handle
            .lock()
            .map_err(|_| Error::Configuration("server handle lock poisoned".to_string()))?
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }

        self.running.store(false, Ordering::SeqCst);
        info!("TreeQL server stopped");
        Ok(())
    }

    /// Get server version
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
