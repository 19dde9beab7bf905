//! End-to-end tests for the Parley server over real TCP and WebSocket
//! connections.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parley::prelude::*;
use parley_protocol::decode_unit;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);
const MAX_PAYLOAD: usize = 1024;

// =========================================================================
// Helpers
// =========================================================================

struct TestServer {
    tcp: String,
    ws: String,
    presence: MemoryStore,
    files: MemoryFileStore,
}

/// Starts a server on random ports with in-memory stores.
async fn start_server() -> TestServer {
    let presence = MemoryStore::new();
    let files = MemoryFileStore::new();
    let config = BrokerConfig {
        tcp_addr: "127.0.0.1:0".parse().unwrap(),
        ws_addr: "127.0.0.1:0".parse().unwrap(),
        max_payload: MAX_PAYLOAD,
        ..BrokerConfig::default()
    };
    let server = ParleyServer::builder()
        .config(config)
        .presence_store(presence.clone())
        .file_store(files.clone())
        .build()
        .await
        .expect("server should build");

    let tcp = server.tcp_addr().expect("tcp addr").to_string();
    let ws = server.ws_addr().expect("ws addr").to_string();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loops a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    TestServer { tcp, ws, presence, files }
}

fn codec() -> CodecConfig {
    CodecConfig {
        max_payload: usize::MAX,
        ..CodecConfig::default()
    }
}

struct TcpClient {
    stream: TcpStream,
    frames: FrameBuffer,
}

impl TcpClient {
    async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("tcp connect");
        Self {
            stream,
            frames: FrameBuffer::new(codec()),
        }
    }

    async fn send(&mut self, packet: &Packet) {
        self.stream.write_all(&encode(packet)).await.expect("tcp write");
    }

    async fn recv(&mut self) -> Packet {
        tokio::time::timeout(TIMEOUT, async {
            let mut buf = [0u8; 4096];
            loop {
                if let Some(packet) = self.frames.next_packet().expect("valid frame") {
                    return packet;
                }
                let n = self.stream.read(&mut buf).await.expect("tcp read");
                assert!(n > 0, "server closed the connection");
                self.frames.extend(&buf[..n]);
            }
        })
        .await
        .expect("timed out waiting for packet")
    }
}

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct WsClient {
    ws: ClientWs,
}

impl WsClient {
    async fn connect(addr: &str) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/websocket"))
            .await
            .expect("ws connect");
        Self { ws }
    }

    async fn send(&mut self, packet: &Packet) {
        self.ws
            .send(Message::Binary(encode(packet)))
            .await
            .expect("ws send");
    }

    async fn recv(&mut self) -> Packet {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Binary(data))) => {
                        return decode_unit(&data, &codec()).expect("one packet per message");
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("websocket ended: {other:?}"),
                }
            }
        })
        .await
        .expect("timed out waiting for packet")
    }
}

fn login(name: &str, id: u32) -> Packet {
    Packet::new(MessageType::Login)
        .with_sender(name)
        .with_message_id(id)
}

fn expect_ack(packet: &Packet, id: u32) {
    assert_eq!(packet.kind, MessageType::Ack, "expected ACK, got {packet:?}");
    assert_eq!(packet.message_id, id);
}

/// Polls `check` until it holds or the timeout passes.
async fn eventually(check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition never held");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =========================================================================
// Framing
// =========================================================================

#[tokio::test]
async fn test_tcp_login_split_across_writes() {
    let server = start_server().await;
    let mut client = TcpClient::connect(&server.tcp).await;

    let bytes = encode(&login("alice", 1));
    client.stream.write_all(&bytes[..10]).await.unwrap();
    client.stream.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.stream.write_all(&bytes[10..]).await.unwrap();

    expect_ack(&client.recv().await, 1);
    eventually(|| server.presence.online().unwrap() == vec!["alice".to_string()]).await;
}

#[tokio::test]
async fn test_tcp_two_packets_in_one_write() {
    let server = start_server().await;
    let mut client = TcpClient::connect(&server.tcp).await;

    let mut bytes = encode(&login("alice", 1)).to_vec();
    let subscribe = Packet::new(MessageType::Subscribe)
        .with_topic("news")
        .with_message_id(2);
    bytes.extend_from_slice(&encode(&subscribe));
    client.stream.write_all(&bytes).await.unwrap();

    expect_ack(&client.recv().await, 1);
    expect_ack(&client.recv().await, 2);
}

#[tokio::test]
async fn test_tcp_oversized_frame_is_rejected_and_stream_continues() {
    let server = start_server().await;
    let mut client = TcpClient::connect(&server.tcp).await;

    let big = Packet::text("news", "")
        .with_payload(vec![b'x'; MAX_PAYLOAD + 1])
        .with_message_id(9);
    client.send(&big).await;
    client.send(&login("alice", 10)).await;

    let err = client.recv().await;
    assert_eq!(err.kind, MessageType::Error);
    assert_eq!(err.message_id, 9);
    expect_ack(&client.recv().await, 10);
}

#[tokio::test]
async fn test_ws_unknown_type_is_error_and_connection_survives() {
    let server = start_server().await;
    let mut client = WsClient::connect(&server.ws).await;

    let mut bytes = encode(&login("alice", 3)).to_vec();
    bytes[0..4].copy_from_slice(&42u32.to_le_bytes());
    client.ws.send(Message::Binary(bytes.into())).await.unwrap();

    let err = client.recv().await;
    assert_eq!(err.kind, MessageType::Error);
    assert_eq!(err.message_id, 3);

    client.send(&login("alice", 4)).await;
    expect_ack(&client.recv().await, 4);
}

// =========================================================================
// Routing across transports
// =========================================================================

#[tokio::test]
async fn test_group_publish_from_tcp_reaches_ws_subscriber() {
    let server = start_server().await;
    let mut tcp = TcpClient::connect(&server.tcp).await;
    let mut ws = WsClient::connect(&server.ws).await;

    tcp.send(&login("alice", 1)).await;
    expect_ack(&tcp.recv().await, 1);
    ws.send(&login("bob", 1)).await;
    expect_ack(&ws.recv().await, 1);

    tcp.send(&Packet::new(MessageType::Subscribe).with_topic("news").with_message_id(2))
        .await;
    expect_ack(&tcp.recv().await, 2);
    ws.send(&Packet::new(MessageType::Subscribe).with_topic("news").with_message_id(2))
        .await;
    expect_ack(&ws.recv().await, 2);

    let publish = Packet::text("news", "hello over tcp")
        .with_sender("alice")
        .with_flags(Flags::GROUP)
        .with_message_id(3);
    tcp.send(&publish).await;

    let got = ws.recv().await;
    assert_eq!(got.kind, MessageType::PublishText);
    assert_eq!(got.sender, "alice");
    assert_eq!(got.payload_text(), "hello over tcp");
    expect_ack(&tcp.recv().await, 3);
}

#[tokio::test]
async fn test_private_file_transfer_from_ws_to_tcp() {
    let server = start_server().await;
    let mut ws = WsClient::connect(&server.ws).await;
    let mut tcp = TcpClient::connect(&server.tcp).await;

    ws.send(&login("alice", 1)).await;
    expect_ack(&ws.recv().await, 1);
    tcp.send(&login("bob", 1)).await;
    expect_ack(&tcp.recv().await, 1);

    let announce = Packet::new(MessageType::PublishFile)
        .with_sender("alice")
        .with_topic("bob")
        .with_flags(Flags::PRIVATE | Flags::FILE)
        .with_payload("photo.jpg")
        .with_message_id(7);
    ws.send(&announce).await;
    expect_ack(&ws.recv().await, 7);

    for (data, flags) in [
        (&b"abc"[..], Flags::PRIVATE | Flags::FILE),
        (&b"def"[..], Flags::PRIVATE | Flags::FILE | Flags::LAST),
    ] {
        let chunk = Packet::new(MessageType::FileData)
            .with_sender("alice")
            .with_topic("bob")
            .with_flags(flags)
            .with_payload(data.to_vec())
            .with_message_id(7);
        ws.send(&chunk).await;
        expect_ack(&ws.recv().await, 7);

        let relayed = tcp.recv().await;
        assert_eq!(relayed.kind, MessageType::FileData);
        assert_eq!(relayed.payload.as_ref(), data);
    }

    assert_eq!(server.files.contents("photo.jpg").unwrap(), b"abcdef");
}

// =========================================================================
// Game and disconnect
// =========================================================================

#[tokio::test]
async fn test_game_over_ws_and_abort_on_disconnect() {
    let server = start_server().await;
    let mut p1 = WsClient::connect(&server.ws).await;
    let mut p2 = WsClient::connect(&server.ws).await;

    p1.send(&Packet::text(topics::GAME_JOIN, "").with_message_id(1)).await;
    let wait = p1.recv().await;
    assert_eq!(wait.topic, topics::GAME_WAIT);
    expect_ack(&p1.recv().await, 1);

    p2.send(&Packet::text(topics::GAME_JOIN, "").with_message_id(1)).await;
    let start1 = p1.recv().await;
    assert_eq!((start1.topic.as_str(), start1.payload_text().as_str()), (topics::GAME_START, "X"));
    let start2 = p2.recv().await;
    assert_eq!((start2.topic.as_str(), start2.payload_text().as_str()), (topics::GAME_START, "O"));
    expect_ack(&p2.recv().await, 1);

    p1.send(&Packet::text(topics::GAME_MOVE, "0").with_message_id(2)).await;
    let mv = p2.recv().await;
    assert_eq!(mv.topic, topics::GAME_MOVE);
    assert_eq!(mv.payload_text(), "0");
    expect_ack(&p1.recv().await, 2);

    p1.ws.close(None).await.unwrap();
    drop(p1);

    let abort = p2.recv().await;
    assert_eq!(abort.topic, topics::GAME_ABORT);
    assert_eq!(abort.payload_text(), "opponent_left");
}

#[tokio::test]
async fn test_disconnect_removes_user_from_presence() {
    let server = start_server().await;
    let mut client = TcpClient::connect(&server.tcp).await;
    client.send(&login("alice", 1)).await;
    expect_ack(&client.recv().await, 1);
    client
        .send(&Packet::new(MessageType::Subscribe).with_topic("news").with_message_id(2))
        .await;
    expect_ack(&client.recv().await, 2);

    drop(client);

    eventually(|| server.presence.online().unwrap().is_empty()).await;
    eventually(|| server.presence.subscriptions().unwrap().is_empty()).await;
    // The topic list remembers names after subscribers leave.
    assert_eq!(server.presence.topics().unwrap(), vec!["news".to_string()]);
}
