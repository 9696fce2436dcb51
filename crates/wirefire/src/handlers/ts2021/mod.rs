//! ts2021 protocol handler: the `/ts2021` noise-upgraded channel.
//!
//! a native client POSTs `/ts2021` with `Upgrade: tailscale-control-protocol`
//! and its base64 noise initiation in the `X-Tailscale-Handshake` header:
//!
//! ```text
//! POST /ts2021
//! Upgrade: tailscale-control-protocol
//! Connection: upgrade
//! X-Tailscale-Handshake: <base64 noise init>
//!
//! response: 101 switching protocols
//! then: noise response + http/2 (cleartext) over the noise transport
//! ```
//!
//! the server completes the IK handshake, learns the client's machine key
//! from the static slot, and serves http/2 on the encrypted stream. one
//! upgraded connection outlives a single request: it carries the register
//! call and then the map long-poll.
//!
//! ## frame size limits
//!
//! the noise transport has strict frame limits: 4096 bytes per frame on the
//! wire (3-byte header + ciphertext), leaving 4077 bytes of plaintext per
//! frame. larger writes are chunked.

mod noise_stream;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::Engine;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use wirefire_proto::NoiseHandshake;
use wirefire_types::MachinePrivate;

use noise_stream::NoiseStream;

use super::MachineKeyContext;
use crate::AppState;

/// handshake initiation message type.
const MSG_TYPE_INITIATION: u8 = 0x01;
/// handshake response message type.
const MSG_TYPE_RESPONSE: u8 = 0x02;
/// post-handshake data record type.
const MSG_TYPE_RECORD: u8 = 0x04;

/// maximum plaintext bytes per noise frame.
const MAX_PLAINTEXT_SIZE: usize = 4077;

/// handle a ts2021 protocol upgrade request.
pub async fn ts2021(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request<Body>,
) -> Response {
    let upgrade = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !upgrade.eq_ignore_ascii_case("tailscale-control-protocol") {
        return (
            StatusCode::BAD_REQUEST,
            "missing or invalid Upgrade header, expected: tailscale-control-protocol",
        )
            .into_response();
    }

    let Some(handshake_b64) = headers
        .get("X-Tailscale-Handshake")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return (StatusCode::BAD_REQUEST, "missing X-Tailscale-Handshake header").into_response();
    };

    let server_key = state.server_key.clone();

    tokio::spawn(async move {
        let upgraded = match hyper::upgrade::on(request).await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                error!(error = %e, "ts2021 http upgrade failed");
                return;
            }
        };

        if let Err(e) = serve_connection(upgraded, handshake_b64, server_key, state).await {
            error!(error = %e, "failed to serve noise connection");
        }
    });

    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::UPGRADE, "tailscale-control-protocol")
        .header(header::CONNECTION, "upgrade")
        .body(Body::empty())
        .expect("valid status and headers")
}

/// complete the noise handshake on the upgraded stream, then run the
/// http/2 server over the encrypted transport until the client goes away.
async fn serve_connection(
    upgraded: hyper::upgrade::Upgraded,
    handshake_b64: String,
    server_key: MachinePrivate,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut io = TokioIo::new(upgraded);

    let init_message = base64::engine::general_purpose::STANDARD.decode(&handshake_b64)?;

    // initiation framing: [version:2 be][type:1][len:2 be][payload]
    if init_message.len() < 5 {
        return Err("initiation message too short".into());
    }

    let version = u16::from_be_bytes([init_message[0], init_message[1]]);
    let msg_type = init_message[2];
    let payload_len = u16::from_be_bytes([init_message[3], init_message[4]]) as usize;

    if msg_type != MSG_TYPE_INITIATION {
        return Err(format!("expected initiation type 0x01, got 0x{:02x}", msg_type).into());
    }

    if init_message.len() != 5 + payload_len {
        return Err(format!(
            "initiation length mismatch: expected {}, got {}",
            5 + payload_len,
            init_message.len()
        )
        .into());
    }

    debug!(version, payload_len, "processing noise initiation");

    // the prologue binds the handshake to the advertised protocol version
    let prologue = format!("Tailscale Control Protocol v{}", version);
    let mut handshake = NoiseHandshake::responder(server_key.as_bytes(), prologue.as_bytes())?;

    handshake.read_message(&init_message[5..])?;

    let response_payload = handshake.write_message(&[])?;

    // response framing: [type:1=0x02][len:2 be][payload]
    let mut response_msg = vec![MSG_TYPE_RESPONSE];
    response_msg.extend_from_slice(&(response_payload.len() as u16).to_be_bytes());
    response_msg.extend_from_slice(&response_payload);

    io.write_all(&response_msg).await?;
    io.flush().await?;

    if !handshake.is_complete() {
        return Err("handshake not complete after response".into());
    }

    let client_key = handshake
        .remote_static()
        .ok_or("missing client static key")?;
    let machine_key_context = MachineKeyContext::from_bytes(client_key);

    info!(
        peer = %machine_key_context.machine_key().short_string(),
        "noise handshake complete, serving http/2"
    );

    let transport = handshake.into_transport()?;
    let noise_stream = NoiseStream::new(io, transport);

    let router = crate::machine_router(state);

    let io = TokioIo::new(noise_stream);
    let service = hyper::service::service_fn(move |req: Request<hyper::body::Incoming>| {
        let mut router = router.clone();
        let machine_key_context = machine_key_context.clone();
        async move {
            let (mut parts, body) = req.into_parts();
            // hand the authenticated machine key to the inner handlers
            parts.extensions.insert(machine_key_context);
            let req = Request::from_parts(parts, Body::new(body));
            tower::Service::call(&mut router, req).await
        }
    });

    let mut http2 = hyper::server::conn::http2::Builder::new(hyper_util::rt::TokioExecutor::new());
    http2.max_frame_size(16384);

    // eof from the client ends the serve loop; that is the normal way a
    // session terminates
    if let Err(e) = http2.serve_connection(io, service).await {
        debug!(error = %e, "http/2 connection ended");
    }

    Ok(())
}
