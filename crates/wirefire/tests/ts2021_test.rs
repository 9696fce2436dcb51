//! integration tests for the /ts2021 noise upgrade.

mod common;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use base64::Engine;
use common::*;
use wirefire_types::MachinePrivate;

/// serve the app on an ephemeral port and return its address.
async fn spawn_server(state: wirefire::AppState) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = wirefire::create_app(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// build a client-side initiator against the test server key.
fn client_handshake() -> snow::HandshakeState {
    let server_pub = MachinePrivate::from_text(TEST_PRIVATE_KEY).unwrap().public();
    let client_keypair = wirefire_proto::noise::builder()
        .unwrap()
        .generate_keypair()
        .unwrap();

    wirefire_proto::noise::builder()
        .unwrap()
        .local_private_key(&client_keypair.private)
        .remote_public_key(server_pub.as_bytes())
        .prologue(b"Tailscale Control Protocol v68")
        .build_initiator()
        .unwrap()
}

/// read from the socket until the end of the http response headers.
async fn read_headers(stream: &mut TcpStream) -> String {
    let mut collected = Vec::new();
    let mut byte = [0u8; 1];
    while !collected.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert!(n > 0, "connection closed before headers completed");
        collected.push(byte[0]);
    }
    String::from_utf8(collected).unwrap()
}

#[tokio::test]
async fn upgrade_completes_noise_handshake() {
    let state = test_state().await;
    let addr = spawn_server(state).await;

    // client initiation: -> e, es, s, ss
    let mut client = client_handshake();
    let mut buf = vec![0u8; 1024];
    let len = client.write_message(&[], &mut buf).unwrap();

    // wire framing: [version:2 be][type:1=0x01][len:2 be][payload]
    let mut init = Vec::with_capacity(5 + len);
    init.extend_from_slice(&68u16.to_be_bytes());
    init.push(0x01);
    init.extend_from_slice(&(len as u16).to_be_bytes());
    init.extend_from_slice(&buf[..len]);
    let handshake_b64 = base64::engine::general_purpose::STANDARD.encode(&init);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "POST /ts2021 HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Upgrade: tailscale-control-protocol\r\n\
         Connection: upgrade\r\n\
         X-Tailscale-Handshake: {handshake_b64}\r\n\
         Content-Length: 0\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let headers = read_headers(&mut stream).await;
    assert!(
        headers.starts_with("HTTP/1.1 101"),
        "expected 101 switching protocols, got: {headers}"
    );
    assert!(headers.to_lowercase().contains("upgrade: tailscale-control-protocol"));

    // server response framing: [type:1=0x02][len:2 be][payload]
    let mut header = [0u8; 3];
    stream.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0x02, "expected noise response message");
    let payload_len = u16::from_be_bytes([header[1], header[2]]) as usize;

    let mut payload = vec![0u8; payload_len];
    stream.read_exact(&mut payload).await.unwrap();

    // client processes <- e, ee, se; both sides are now in transport mode
    let mut buf = vec![0u8; 1024];
    client.read_message(&payload, &mut buf).unwrap();
    assert!(client.is_handshake_finished());
    let transport = client.into_transport_mode().unwrap();
    drop(transport);
}

#[tokio::test]
async fn upgrade_without_upgrade_header_is_rejected() {
    let state = test_state().await;
    let addr = spawn_server(state).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "POST /ts2021 HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Content-Length: 0\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let headers = read_headers(&mut stream).await;
    assert!(
        headers.starts_with("HTTP/1.1 400"),
        "expected 400 without the upgrade header, got: {headers}"
    );
}

#[tokio::test]
async fn upgrade_without_handshake_header_is_rejected() {
    let state = test_state().await;
    let addr = spawn_server(state).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "POST /ts2021 HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Upgrade: tailscale-control-protocol\r\n\
         Connection: upgrade\r\n\
         Content-Length: 0\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let headers = read_headers(&mut stream).await;
    assert!(
        headers.starts_with("HTTP/1.1 400"),
        "expected 400 without the handshake header, got: {headers}"
    );
}
