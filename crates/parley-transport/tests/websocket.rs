//! Integration tests for the WebSocket transport.
//!
//! These tests spin up a real WebSocket listener and a tungstenite client
//! to verify that whole units cross the wire intact.

#[cfg(feature = "websocket")]
mod websocket {
    use futures_util::{SinkExt, StreamExt};
    use parley_transport::{
        Connection, Transport, TransportKind, WebSocketTransport,
    };
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds on an OS-assigned port and returns the transport plus its
    /// address.
    async fn bind() -> (WebSocketTransport, String) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr").to_string();
        (transport, addr)
    }

    async fn connect_client(addr: &str) -> ClientWs {
        let url = format!("ws://{addr}/websocket");
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("client should connect");
        ws
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (mut transport, addr) = bind().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.expect("task should complete");

        assert!(server_conn.id().into_inner() > 0);
        assert_eq!(server_conn.kind(), TransportKind::Message);

        // --- Server sends, client receives ---
        server_conn
            .send(b"hello from server")
            .await
            .expect("send should succeed");
        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"hello from server");

        // --- Client sends, server receives one unit ---
        client_ws
            .send(Message::Binary(b"hello from client".to_vec().into()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from client");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_send_while_recv_pending() {
        // A reader parked in recv() must not block writers.
        let (mut transport, addr) = bind().await;
        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let mut client_ws = connect_client(&addr).await;
        let server_conn =
            std::sync::Arc::new(server_handle.await.expect("accept task"));

        let reader = std::sync::Arc::clone(&server_conn);
        let pending = tokio::spawn(async move { reader.recv().await });

        tokio::time::timeout(
            std::time::Duration::from_secs(2),
            server_conn.send(b"ping"),
        )
        .await
        .expect("send must not wait for recv")
        .expect("send should succeed");

        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"ping");

        client_ws.send(Message::Close(None)).await.unwrap();
        let result = pending.await.unwrap().expect("recv should not error");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut transport, addr) = bind().await;
        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });

        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_message_over_cap_fails_recv() {
        let (transport, addr) = bind().await;
        let mut transport = transport.with_max_message_size(64);
        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let mut client_ws = connect_client(&addr).await;
        let server_conn = server_handle.await.unwrap();

        client_ws
            .send(Message::Binary(vec![1u8; 64].into()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("message at the cap is accepted")
            .expect("should have data");
        assert_eq!(received.len(), 64);

        client_ws
            .send(Message::Binary(vec![2u8; 65].into()))
            .await
            .unwrap();
        assert!(server_conn.recv().await.is_err());
    }
}
