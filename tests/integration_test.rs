use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use potatokv::protocol::encode_command;
use potatokv::{Command, NodeConfig, Response, Server, ServerError, Status, FIXED_IDENTITY};

/// Helper: a client speaking the JSON protocol over one connection.
struct Client {
    stream: BufReader<TcpStream>,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            stream: BufReader::new(stream),
        }
    }

    async fn send(&mut self, command: Command) -> Response {
        self.stream
            .get_mut()
            .write_all(&encode_command(&command))
            .await
            .unwrap();
        self.read_response().await
    }

    async fn run(&mut self, name: &str, args: &[&str]) -> Response {
        self.send(Command::new(name, args.iter().copied())).await
    }

    async fn read_response(&mut self) -> Response {
        let mut line = String::new();
        let n = self.stream.read_line(&mut line).await.unwrap();
        assert!(n > 0, "server closed connection unexpectedly");
        serde_json::from_str(&line).unwrap()
    }

    /// True once the server has closed its side.
    async fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 16];
        matches!(self.stream.read(&mut buf).await, Ok(0) | Err(_))
    }
}

struct TestNode {
    addr: std::net::SocketAddr,
    server: Arc<Server>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestNode {
    async fn start(config: NodeConfig) -> Self {
        let server = Arc::new(Server::new(NodeConfig {
            port: 0,
            ..config
        }));
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                server
                    .run_until(listener, async {
                        let _ = rx.await;
                    })
                    .await
            })
        };

        Self {
            addr,
            server,
            shutdown: Some(tx),
            handle,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not shut down")
            .unwrap()
            .unwrap();
    }
}

fn config() -> NodeConfig {
    NodeConfig {
        workers: 4,
        idle_timeout: Duration::from_secs(10),
        sweep_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_set_get_roundtrip() {
    let node = TestNode::start(config()).await;
    let mut client = Client::connect(node.addr).await;

    assert_eq!(client.run("set", &["k", "v"]).await, Response::ok());
    assert_eq!(client.run("get", &["k"]).await, Response::value("v"));
    assert_eq!(
        client.run("get", &["missing"]).await.status_kind(),
        Some(Status::NoKey)
    );

    let keys = node.server.storage().keys(FIXED_IDENTITY);
    assert_eq!(keys, vec!["k"]);

    drop(client);
    node.stop().await;
}

#[tokio::test]
async fn test_all_commands_over_tcp() {
    let node = TestNode::start(config()).await;
    let mut client = Client::connect(node.addr).await;

    assert!(client.run("lpush", &["l", "a"]).await.is_ok());
    assert!(client.run("lpush", &["l", "b"]).await.is_ok());
    assert!(client.run("lset", &["l", "0", "z"]).await.is_ok());
    assert_eq!(client.run("lget", &["l", "0"]).await, Response::value("z"));
    assert_eq!(client.run("lget", &["l", "1"]).await, Response::value("b"));

    assert!(client.run("hset", &["m", "f", "v"]).await.is_ok());
    assert_eq!(client.run("hget", &["m", "f"]).await, Response::value("v"));
    assert_eq!(
        client.run("hget", &["m", "nope"]).await.status_kind(),
        Some(Status::WrongArguments)
    );

    assert_eq!(client.run("keys", &[]).await, Response::value("'l','m',"));
    assert!(client.run("del", &["l"]).await.is_ok());
    assert_eq!(client.run("keys", &[]).await, Response::value("'m',"));

    assert_eq!(
        client.run("frobnicate", &[]).await.status_kind(),
        Some(Status::UnknownCommand)
    );

    drop(client);
    node.stop().await;
}

#[tokio::test]
async fn test_no_workers_rejection() {
    let node = TestNode::start(NodeConfig {
        workers: 1,
        ..config()
    })
    .await;

    // First client takes the only worker
    let mut admitted = Client::connect(node.addr).await;
    assert!(admitted.run("set", &["k", "v"]).await.is_ok());

    // Second client waits about a second, then gets one rejection and EOF
    let started = tokio::time::Instant::now();
    let mut rejected = Client::connect(node.addr).await;
    let response = tokio::time::timeout(Duration::from_secs(3), rejected.read_response())
        .await
        .expect("no rejection received");

    assert_eq!(response, Response::no_workers());
    assert!(started.elapsed() >= Duration::from_millis(900));
    assert!(rejected.is_closed().await);

    let stats = node.server.stats();
    assert_eq!(stats.connections_rejected.load(Ordering::Relaxed), 1);
    assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);

    // The admitted session is unaffected
    assert_eq!(admitted.run("get", &["k"]).await, Response::value("v"));

    drop(admitted);
    node.stop().await;
}

#[tokio::test]
async fn test_worker_freed_after_disconnect() {
    let node = TestNode::start(NodeConfig {
        workers: 1,
        ..config()
    })
    .await;

    let mut first = Client::connect(node.addr).await;
    assert!(first.run("set", &["k", "v"]).await.is_ok());
    drop(first);

    // Give the session time to notice the disconnect
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut second = Client::connect(node.addr).await;
    assert_eq!(second.run("get", &["k"]).await, Response::value("v"));

    drop(second);
    node.stop().await;
}

#[tokio::test]
async fn test_accept_limit_waits_for_sessions() {
    let node = TestNode::start(NodeConfig {
        accept_limit: Some(1),
        ..config()
    })
    .await;

    let mut client = Client::connect(node.addr).await;
    assert!(client.run("set", &["k", "v"]).await.is_ok());

    // The accept loop is done, but the session still holds its permit
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!node.handle.is_finished());
    assert_eq!(node.server.pool().in_use(), 1);

    // Commands keep working until the client leaves
    assert_eq!(client.run("get", &["k"]).await, Response::value("v"));
    drop(client);

    tokio::time::timeout(Duration::from_secs(2), node.handle)
        .await
        .expect("server did not finish after last session")
        .unwrap()
        .unwrap();
    assert_eq!(node.server.pool().available(), 4);
}

#[tokio::test]
async fn test_idle_session_is_closed() {
    let node = TestNode::start(NodeConfig {
        idle_timeout: Duration::from_millis(100),
        ..config()
    })
    .await;

    let mut client = Client::connect(node.addr).await;
    assert!(client.run("set", &["k", "v"]).await.is_ok());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(client.is_closed().await);
    assert_eq!(node.server.pool().in_use(), 0);

    node.stop().await;
}

#[tokio::test]
async fn test_ttl_entries_are_reaped() {
    let node = TestNode::start(config()).await;
    let mut client = Client::connect(node.addr).await;

    let short = Command::new("set", ["short", "v"]).with_ttl(Duration::from_millis(200));
    assert!(client.send(short).await.is_ok());
    assert!(client.run("set", &["long", "v"]).await.is_ok());

    // Still alive before its death time
    assert_eq!(client.run("get", &["short"]).await, Response::value("v"));

    tokio::time::sleep(Duration::from_millis(400)).await;

    // The reaper removed it without anyone touching the key
    let storage = node.server.storage();
    assert!(storage.keys(FIXED_IDENTITY).contains(&"long".to_string()));
    assert_eq!(storage.len(), 1);

    assert_eq!(
        client.run("get", &["short"]).await.status_kind(),
        Some(Status::NoKey)
    );

    drop(client);
    node.stop().await;
}

#[tokio::test]
async fn test_concurrent_sessions_see_own_writes() {
    let node = TestNode::start(NodeConfig {
        workers: 8,
        ..config()
    })
    .await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let addr = node.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            for j in 0..50 {
                let key = format!("key-{}-{}", i, j);
                let value = format!("value-{}-{}", i, j);
                assert!(client.run("set", &[key.as_str(), value.as_str()]).await.is_ok());
                assert_eq!(client.run("get", &[key.as_str()]).await, Response::value(value));
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(node.server.storage().keys(FIXED_IDENTITY).len(), 400);
    node.stop().await;
}

#[tokio::test]
async fn test_malformed_payload_closes_session() {
    let node = TestNode::start(config()).await;
    let mut client = Client::connect(node.addr).await;

    client
        .stream
        .get_mut()
        .write_all(b"{\"Name\": 42}")
        .await
        .unwrap();

    assert!(client.is_closed().await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(node.server.pool().in_use(), 0);
    node.stop().await;
}
