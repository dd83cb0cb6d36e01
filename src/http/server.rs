//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use super::{router, AppState};
use crate::error::Result;
use crate::ratelimit::RateLimiter;

/// Default cap on buffered request bodies.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// HTTP server for the admission service.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// State shared with every handler
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server around a rate limiter.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            addr,
            state: AppState::new(rate_limiter, DEFAULT_MAX_BODY_BYTES),
        }
    }

    /// Set the largest request body the server will buffer.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.state.max_body_bytes = max_body_bytes;
        self
    }

    /// Bind the configured address and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Starting HTTP server with graceful shutdown");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}
