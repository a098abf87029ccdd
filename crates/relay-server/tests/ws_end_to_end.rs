//! End-to-end tests over real WebSockets on a loopback listener.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use relay_core::HubHandle;
use relay_server::domain::ServerConfig;
use relay_server::infrastructure::RelayServer;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    hub: HubHandle,
    running: Arc<AtomicBool>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let server = RelayServer::bind(&config).await.expect("bind");
        let addr = server.local_addr().expect("addr");
        let hub = server.hub();
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(server.run(Arc::clone(&running)));
        Self {
            addr,
            hub,
            running,
            task,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    async fn connect(&self) -> Client {
        let (client, _response) = connect_async(self.url("/socket")).await.expect("connect");
        client
    }

    /// Waits until the hub reports `count` live peers.
    async fn wait_for_peers(&self, count: usize) {
        timeout(Duration::from_secs(5), async {
            loop {
                if self.hub.live_peers().await.expect("hub").len() == count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("peers registered in time");
    }

    async fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        self.task.await.expect("server task").expect("server run");
    }
}

fn loopback_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.bind_address = "127.0.0.1".to_string();
    config.server.port = 0;
    config
}

/// Next data message (text or binary), skipping control traffic.
async fn next_data(client: &mut Client) -> Message {
    loop {
        let message = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("message in time")
            .expect("stream open")
            .expect("read ok");
        if message.is_text() || message.is_binary() {
            return message;
        }
    }
}

#[tokio::test]
async fn test_message_reaches_every_other_client_but_not_sender() {
    // Arrange
    let server = TestServer::start(loopback_config()).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    let mut c = server.connect().await;
    server.wait_for_peers(3).await;

    // Act
    a.send(Message::Text("hi".into())).await.expect("send");

    // Assert
    assert_eq!(next_data(&mut b).await, Message::Text("hi".into()));
    assert_eq!(next_data(&mut c).await, Message::Text("hi".into()));
    let echo = timeout(Duration::from_millis(200), a.next()).await;
    assert!(echo.is_err(), "sender must not receive its own message");

    server.stop().await;
}

#[tokio::test]
async fn test_binary_messages_stay_binary() {
    let server = TestServer::start(loopback_config()).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    server.wait_for_peers(2).await;

    a.send(Message::Binary(vec![0, 1, 2, 255])).await.expect("send");

    assert_eq!(next_data(&mut b).await, Message::Binary(vec![0, 1, 2, 255]));
    server.stop().await;
}

#[tokio::test]
async fn test_one_senders_messages_arrive_in_order() {
    let server = TestServer::start(loopback_config()).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;
    server.wait_for_peers(2).await;

    for i in 0..20 {
        a.send(Message::Text(format!("m{i}"))).await.expect("send");
    }

    for i in 0..20 {
        assert_eq!(next_data(&mut b).await, Message::Text(format!("m{i}")));
    }
    server.stop().await;
}

#[tokio::test]
async fn test_disconnected_client_is_unregistered() {
    // Arrange
    let server = TestServer::start(loopback_config()).await;
    let mut a = server.connect().await;
    let _b = server.connect().await;
    server.wait_for_peers(2).await;

    // Act
    a.close(None).await.expect("close");

    // Assert
    server.wait_for_peers(1).await;
    server.stop().await;
}

#[tokio::test]
async fn test_oversize_message_disconnects_only_its_sender() {
    // Arrange
    let mut config = loopback_config();
    config.relay.max_frame_size = 64;
    let server = TestServer::start(config).await;
    let mut big = server.connect().await;
    let mut other = server.connect().await;
    server.wait_for_peers(2).await;

    // Act
    big.send(Message::Text("x".repeat(1024))).await.expect("send");

    // Assert: the sender is dropped, the other peer stays and got nothing.
    server.wait_for_peers(1).await;
    let nothing = timeout(Duration::from_millis(200), next_data(&mut other)).await;
    assert!(nothing.is_err(), "oversize message must not be relayed");
    server.stop().await;
}

#[tokio::test]
async fn test_wrong_path_is_rejected_with_404() {
    let server = TestServer::start(loopback_config()).await;

    let err = connect_async(server.url("/elsewhere"))
        .await
        .expect_err("handshake must fail");

    match err {
        WsError::Http(response) => assert_eq!(response.status(), StatusCode::NOT_FOUND),
        other => panic!("expected HTTP error, got {other}"),
    }
    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_sends_close_to_connected_clients() {
    // Arrange
    let server = TestServer::start(loopback_config()).await;
    let mut a = server.connect().await;
    server.wait_for_peers(1).await;

    // Act
    server.stop().await;

    // Assert
    let message = timeout(Duration::from_secs(5), a.next())
        .await
        .expect("message in time")
        .expect("stream open")
        .expect("read ok");
    assert!(matches!(message, Message::Close(_)));
}
