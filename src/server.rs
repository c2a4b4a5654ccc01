//! Admission Controller
//!
//! Owns the listening socket's accept loop. Every accepted connection must
//! win a worker permit within [`ADMISSION_WAIT`]; admitted connections get
//! their own session task, the rest get a single NoWorkers reply and are
//! closed.
//!
//! ## Lifecycle
//!
//! ```text
//! run_until()
//!   ├─ start TTL reaper
//!   ├─ accept loop ─────────────┬─ permit  → spawn Session (owns permit)
//!   │   (until limit/shutdown)  └─ timeout → NoWorkers reply, close
//!   ├─ stop + join TTL reaper
//!   └─ wait until every permit is back in the pool
//! ```

use crate::commands::CommandHandler;
use crate::config::{NodeConfig, ADMISSION_WAIT};
use crate::connection::{handle_connection, ConnectionStats};
use crate::protocol::{encode_response, Response};
use crate::storage::{ExpirySweeper, StorageEngine};
use crate::workers::WorkerPool;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

/// The identity every connection is mapped to.
pub const FIXED_IDENTITY: &str = "user";

/// Fatal server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),
}

/// A storage node: shared storage, worker pool, and the accept loop.
#[derive(Debug)]
pub struct Server {
    config: NodeConfig,
    storage: Arc<StorageEngine>,
    pool: WorkerPool,
    stats: Arc<ConnectionStats>,
}

impl Server {
    pub fn new(config: NodeConfig) -> Self {
        let storage = Arc::new(StorageEngine::new(config.default_ttl));
        let pool = WorkerPool::new(config.workers);

        Self {
            config,
            storage,
            pool,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn storage(&self) -> Arc<StorageEngine> {
        Arc::clone(&self.storage)
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Binds the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.bind_address();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Resolves the identity of a new connection.
    ///
    /// There is no real authentication: every peer is the fixed identity,
    /// whose keyspace is created on first use.
    pub fn authenticate(&self, _peer: SocketAddr) -> String {
        self.storage.open_keyspace(FIXED_IDENTITY);
        FIXED_IDENTITY.to_string()
    }

    /// Serves until the accept limit (if any) is reached.
    pub async fn run(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.run_until(listener, std::future::pending()).await
    }

    /// Serves until the accept limit is reached or `shutdown` resolves.
    ///
    /// Returns only after the reaper has stopped and every session has
    /// returned its permit.
    pub async fn run_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, workers = self.pool.capacity(), "Listening");
        }

        let sweeper = ExpirySweeper::start(Arc::clone(&self.storage), self.config.sweep_interval);

        let result = self.accept_loop(&listener, shutdown).await;
        drop(listener);

        sweeper.stop().await;

        info!(
            active = self.pool.in_use(),
            "Waiting for sessions to finish"
        );
        self.pool.wait_idle().await;

        let storage = self.storage.stats();
        info!(
            accepted = self.stats.connections_accepted.load(Ordering::Relaxed),
            rejected = self.stats.connections_rejected.load(Ordering::Relaxed),
            commands = self.stats.commands_processed.load(Ordering::Relaxed),
            entries = storage.entries,
            expired = storage.expired,
            "Server shutdown complete"
        );

        result
    }

    /// Accepts connections until the limit is reached or shutdown fires.
    async fn accept_loop<F>(&self, listener: &TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut accepted = 0usize;

        loop {
            if self.config.accept_limit.is_some_and(|limit| accepted >= limit) {
                info!(accepted = accepted, "Accept limit reached");
                return Ok(());
            }

            let (stream, addr) = tokio::select! {
                result = listener.accept() => result.map_err(ServerError::Accept)?,
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting");
                    return Ok(());
                }
            };
            accepted += 1;

            self.admit(stream, addr).await;
        }
    }

    /// Hands the connection to a new session, or rejects it.
    async fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        match self.pool.acquire(ADMISSION_WAIT).await {
            Ok(permit) => {
                let user = self.authenticate(addr);
                let handler = CommandHandler::new(Arc::clone(&self.storage));
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    user,
                    handler,
                    permit,
                    self.config.idle_timeout,
                    Arc::clone(&self.stats),
                ));
            }
            Err(e) => {
                warn!(client = %addr, error = %e, "Rejecting connection");
                self.stats.connection_rejected();
                reject(stream, addr).await;
            }
        }
    }
}

/// Sends the NoWorkers reply and closes the connection.
async fn reject(mut stream: TcpStream, addr: SocketAddr) {
    let bytes = encode_response(&Response::no_workers());

    if let Err(e) = stream.write_all(&bytes).await {
        error!(client = %addr, error = %e, "Failed to send rejection");
    }
    if let Err(e) = stream.shutdown().await {
        error!(client = %addr, error = %e, "Failed to close rejected connection");
    }
}
