//! Integration tests for the raw TCP stream transport.

use parley_transport::{Connection, TcpTransport, Transport, TransportKind};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn accept_pair() -> (parley_transport::TcpConnection, TcpStream) {
    let mut transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().expect("local addr");

    let server_handle = tokio::spawn(async move {
        transport.accept().await.expect("should accept")
    });
    let client = TcpStream::connect(addr).await.expect("should connect");
    let server = server_handle.await.expect("accept task");
    (server, client)
}

#[tokio::test]
async fn test_tcp_accept_and_send_receive() {
    let (server, mut client) = accept_pair().await;
    assert_eq!(server.kind(), TransportKind::Stream);
    assert!(server.id().into_inner() > 0);

    server.send(b"from server").await.expect("send");
    let mut buf = [0u8; 11];
    client.read_exact(&mut buf).await.expect("read");
    assert_eq!(&buf, b"from server");

    client.write_all(b"from client").await.expect("write");
    let mut received = Vec::new();
    while received.len() < 11 {
        let chunk = server
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, b"from client");
}

#[tokio::test]
async fn test_tcp_recv_returns_none_on_client_close() {
    let (server, client) = accept_pair().await;
    drop(client);

    let result = server.recv().await.expect("recv should not error");
    assert!(result.is_none(), "EOF should read as a clean close");
}

#[tokio::test]
async fn test_tcp_close_shuts_down_write_half() {
    let (server, mut client) = accept_pair().await;
    server.close().await.expect("close");

    let mut buf = Vec::new();
    let n = client.read_to_end(&mut buf).await.expect("read to end");
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_tcp_connection_ids_are_distinct() {
    let (a, _ca) = accept_pair().await;
    let (b, _cb) = accept_pair().await;
    assert_ne!(a.id(), b.id());
}
