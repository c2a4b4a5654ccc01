//! Session Handler
//!
//! This module handles one admitted client connection. Each session runs in
//! its own task, reading commands and sending responses until the client
//! goes away or stays quiet for too long.
//!
//! ## Session Lifecycle
//!
//! ```text
//! 1. Connection admitted with a worker permit
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  reset idle deadline         │
//!    │  read until one command      │
//!    │  execute command             │
//!    │  send response               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 3. Disconnect / malformed payload / idle timeout
//!        │
//!        ▼
//! 4. Connection closed, permit returned to the pool
//! ```
//!
//! ## Buffer Management
//!
//! Commands arrive back to back with no framing, so we accumulate incoming
//! bytes in a `BytesMut` and let the decoder find where each command ends.
//! A read may hold half a command or several of them.

use crate::commands::CommandHandler;
use crate::protocol::{encode_response, Command, CommandDecoder, DecodeError, Response};
use crate::workers::WorkerPermit;
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Maximum bytes buffered while waiting for one command to complete (4 MiB)
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections admitted
    pub connections_accepted: AtomicU64,
    /// Connections turned away because no worker was free
    pub connections_rejected: AtomicU64,
    /// Currently active sessions
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single admitted client connection.
///
/// The session owns its worker permit; dropping the session at the end of
/// [`Session::run`] hands the permit back to the pool.
pub struct Session<S> {
    /// The client stream
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Identity every command of this session runs as
    user: String,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared across sessions)
    command_handler: CommandHandler,

    decoder: CommandDecoder,

    /// How long to wait for the next command
    idle_timeout: Duration,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    _permit: WorkerPermit,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new session.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream
    /// * `addr` - The client's socket address
    /// * `user` - The identity resolved for this connection
    /// * `command_handler` - The command handler for executing commands
    /// * `permit` - The worker permit this session holds until it ends
    /// * `idle_timeout` - Maximum wait for each command
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        user: impl Into<String>,
        command_handler: CommandHandler,
        permit: WorkerPermit,
        idle_timeout: Duration,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            user: user.into(),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            decoder: CommandDecoder::new(),
            idle_timeout,
            stats,
            _permit: permit,
        }
    }

    /// Runs the session until the client leaves, then closes the stream.
    ///
    /// Always ends with an error describing why the session stopped.
    pub async fn run(mut self) -> ConnectionError {
        info!(client = %self.addr, user = %self.user, "Session started");

        let reason = self.main_loop().await;

        match &reason {
            ConnectionError::ClientDisconnected => {
                info!(client = %self.addr, "Client disconnected")
            }
            ConnectionError::IdleTimeout(_) => {
                info!(client = %self.addr, "Session idle, closing")
            }
            ConnectionError::IoError(io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            e => warn!(client = %self.addr, error = %e, "Session ended with error"),
        }

        if let Err(e) = self.stream.shutdown().await {
            trace!(client = %self.addr, error = %e, "Shutdown after session end failed");
        }
        self.stats.connection_closed();
        reason
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> ConnectionError {
        loop {
            let deadline = Instant::now() + self.idle_timeout;

            let command = match self.read_command(deadline).await {
                Ok(command) => command,
                Err(e) => return e,
            };

            let response = self.command_handler.execute(&self.user, &command);
            self.stats.command_processed();
            trace!(
                client = %self.addr,
                command = %command.name,
                code = response.code,
                "Executed command"
            );

            if let Err(e) = self.send_response(&response).await {
                return e;
            }
        }
    }

    /// Reads until one full command is buffered or the deadline passes.
    async fn read_command(&mut self, deadline: Instant) -> Result<Command, ConnectionError> {
        loop {
            if let Some(command) = self.try_decode_command()? {
                return Ok(command);
            }

            match tokio::time::timeout_at(deadline, self.read_more_data()).await {
                Ok(result) => result?,
                Err(_) => return Err(ConnectionError::IdleTimeout(self.idle_timeout)),
            }
        }
    }

    /// Attempts to decode a command from the buffer.
    fn try_decode_command(&mut self) -> Result<Option<Command>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.decoder.decode(&self.buffer) {
            Ok(Some((command, consumed))) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Decoded command"
                );
                Ok(Some(command))
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete command, need more data"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Malformed command");
                Err(ConnectionError::Decode(e))
            }
        }
    }

    /// Reads more data from the stream into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_FRAME_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Frame size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            // Whitespace between commands does not count as a partial command
            if self.buffer.iter().all(u8::is_ascii_whitespace) {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let bytes = encode_response(response);
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Reasons a session stops.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The client sent something that is not a command
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// A single command outgrew the frame size limit
    #[error("Frame size limit exceeded")]
    BufferFull,

    /// No command arrived within the idle timeout
    #[error("no command within {0:?}")]
    IdleTimeout(Duration),
}

/// Runs a session to completion.
///
/// This is a convenience function that creates a [`Session`] and runs it,
/// discarding the end reason after it has been logged.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    user: String,
    command_handler: CommandHandler,
    permit: WorkerPermit,
    idle_timeout: Duration,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let session = Session::new(
        stream,
        addr,
        user,
        command_handler,
        permit,
        idle_timeout,
        stats,
    );
    let reason = session.run().await;
    debug!(client = %addr, reason = %reason, "Session finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_command, Status};
    use crate::storage::StorageEngine;
    use crate::workers::WorkerPool;
    use tokio::net::{TcpListener, TcpStream};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    fn response_bytes(response: Response) -> Vec<u8> {
        encode_response(&response)
    }

    fn new_session<S>(stream: S, pool: &WorkerPool, stats: &Arc<ConnectionStats>) -> Session<S>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let storage = Arc::new(StorageEngine::new(Duration::from_secs(60)));
        Session::new(
            stream,
            test_addr(),
            "user",
            CommandHandler::new(storage),
            pool.try_acquire().unwrap(),
            Duration::from_secs(5),
            Arc::clone(stats),
        )
    }

    #[tokio::test]
    async fn test_set_get_over_mock_stream() {
        let stream = tokio_test::io::Builder::new()
            .read(&encode_command(&Command::new("set", ["name", "Ariz"])))
            .write(&response_bytes(Response::ok()))
            .read(&encode_command(&Command::new("get", ["name"])))
            .write(&response_bytes(Response::value("Ariz")))
            .build();

        let pool = WorkerPool::new(1);
        let stats = Arc::new(ConnectionStats::new());
        let reason = new_session(stream, &pool, &stats).run().await;

        assert!(matches!(reason, ConnectionError::ClientDisconnected));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_command_split_across_reads() {
        let bytes = encode_command(&Command::new("keys", Vec::<String>::new()));
        let (head, tail) = bytes.split_at(7);

        let stream = tokio_test::io::Builder::new()
            .read(head)
            .read(tail)
            .write(&response_bytes(Response::value("")))
            .build();

        let pool = WorkerPool::new(1);
        let stats = Arc::new(ConnectionStats::new());
        let reason = new_session(stream, &pool, &stats).run().await;

        assert!(matches!(reason, ConnectionError::ClientDisconnected));
    }

    #[tokio::test]
    async fn test_pipelined_commands_in_one_read() {
        let mut batch = encode_command(&Command::new("lpush", ["l", "a"]));
        batch.extend(encode_command(&Command::new("lpush", ["l", "b"])));
        batch.extend(encode_command(&Command::new("lget", ["l", "1"])));

        let stream = tokio_test::io::Builder::new()
            .read(&batch)
            .write(&response_bytes(Response::ok()))
            .write(&response_bytes(Response::ok()))
            .write(&response_bytes(Response::value("b")))
            .build();

        let pool = WorkerPool::new(1);
        let stats = Arc::new(ConnectionStats::new());
        new_session(stream, &pool, &stats).run().await;

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_errors_do_not_end_session() {
        let stream = tokio_test::io::Builder::new()
            .read(&encode_command(&Command::new("get", ["missing"])))
            .write(&response_bytes(Response::status(Status::NoKey)))
            .read(&encode_command(&Command::new("nonsense", ["x"])))
            .write(&response_bytes(Response::status(Status::UnknownCommand)))
            .read(&encode_command(&Command::new("set", ["k"])))
            .write(&response_bytes(Response::status(Status::WrongArguments)))
            .build();

        let pool = WorkerPool::new(1);
        let stats = Arc::new(ConnectionStats::new());
        let reason = new_session(stream, &pool, &stats).run().await;

        assert!(matches!(reason, ConnectionError::ClientDisconnected));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_malformed_payload_ends_session() {
        let stream = tokio_test::io::Builder::new()
            .read(b"this is not json")
            .build();

        let pool = WorkerPool::new(1);
        let stats = Arc::new(ConnectionStats::new());
        let reason = new_session(stream, &pool, &stats).run().await;

        assert!(matches!(reason, ConnectionError::Decode(_)));
        assert_eq!(pool.available(), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_partial_command_then_eof() {
        let stream = tokio_test::io::Builder::new()
            .read(br#"{"Name":"get","Argu"#)
            .build();

        let pool = WorkerPool::new(1);
        let stats = Arc::new(ConnectionStats::new());
        let reason = new_session(stream, &pool, &stats).run().await;

        assert!(matches!(reason, ConnectionError::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        let (server_side, peer) = listener.accept().await.unwrap();

        let pool = WorkerPool::new(1);
        let stats = Arc::new(ConnectionStats::new());
        let storage = Arc::new(StorageEngine::default());
        let session = Session::new(
            server_side,
            peer,
            "user",
            CommandHandler::new(storage),
            pool.try_acquire().unwrap(),
            Duration::from_millis(100),
            Arc::clone(&stats),
        );
        let task = tokio::spawn(session.run());

        // One command resets the deadline and gets its answer
        client
            .write_all(&encode_command(&Command::new("set", ["k", "v"])))
            .await
            .unwrap();
        let mut buf = vec![0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        let response: Response = serde_json::from_slice(&buf[..n]).unwrap();
        assert!(response.is_ok());
        assert_eq!(pool.available(), 0);

        // Then silence: the server closes the connection
        let reason = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(reason, ConnectionError::IdleTimeout(_)));
        assert_eq!(pool.available(), 1);

        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
