//! handler for the /machine/map endpoint, served over the noise channel.
//!
//! a non-streaming request is a one-shot status write answered with a
//! single framed map response. a streaming request opens a long-poll
//! session: a producer task rebuilds the map when tailnet state changes
//! (debounced to one rebuild per sync window) and sends keep-alives, while
//! the response body drains the channel, frames each payload, and writes it
//! out. every frame is a little-endian u32 length followed by json or
//! zstd-compressed json.

use std::convert::Infallible;
use std::io::Write;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::Utc;
use futures_util::stream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use wirefire_db::queries;
use wirefire_proto::{
    MapRequest, MapResponse, SUPPORTED_CAPABILITY_VERSION, UNSUPPORTED_CLIENT_VERSION_MESSAGE,
};
use wirefire_types::MachineKey;

use super::{ApiError, MachineKeyContext, OptionExt, ResultExt};
use crate::AppState;
use crate::mapper::Mapper;
use crate::notifier::StateChanged;

/// how often the producer checks whether an update arrived.
const SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// how often keep-alives are sent to clients that asked for them.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// bound on in-flight responses between producer and consumer; a full
/// channel blocks the producer, backpressuring against a slow client.
const SESSION_CHANNEL_CAPACITY: usize = 8;

/// compression requested by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Compression {
    None,
    Zstd,
}

impl From<&str> for Compression {
    fn from(s: &str) -> Self {
        match s {
            "zstd" => Compression::Zstd,
            _ => Compression::None,
        }
    }
}

/// handle map requests.
///
/// NOTE: the body is taken as `Bytes` and parsed manually because the real
/// tailscale client does not send a content-type header over ts2021/http2.
pub async fn map(
    State(state): State<AppState>,
    ctx: MachineKeyContext,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: MapRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("invalid JSON request body"))?;

    let peer = ctx.machine_key().clone();
    info!(peer = %peer.short_string(), stream = req.stream, "POST /machine/map");

    if req.version < SUPPORTED_CAPABILITY_VERSION {
        warn!(peer = %peer.short_string(), version = req.version, "unsupported client version");
        return Err(ApiError::bad_request(UNSUPPORTED_CLIENT_VERSION_MESSAGE));
    }

    let machine = queries::find_machine_by_noise_key(state.db.conn(), &peer)
        .await
        .map_internal()?
        .or_bad_request("machine not found")?;

    let compression = Compression::from(req.compress.as_str());

    if !req.stream {
        // one-shot: write the reported status and answer with a single frame
        debug!(machine = %machine.complete_name(), "not streaming, updating machine info");

        let mut machine = machine;
        machine.host_info = req.hostinfo.clone();
        machine.disco_key = req.disco_key.clone();
        machine.node_key = req.node_key.clone();
        machine.endpoints = req.endpoints.clone();
        machine.last_seen = Some(Utc::now());

        let machine = queries::upsert_machine(state.db.conn(), &machine)
            .await
            .map_internal()?;
        state.notifier.notify_state_changed();

        let mut mapper = state.new_mapper();
        let resp = mapper
            .build(state.db.conn(), &machine)
            .await
            .map_internal()?
            .ok_or_else(|| ApiError::internal("interrupted while preparing map response"))?;

        let bytes = encode_length_prefixed(&resp, &compression)
            .ok_or_else(|| ApiError::internal("failed to encode map response"))?;

        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(bytes))
            .expect("valid status and headers")
            .into_response());
    }

    Ok(streaming_response(state, peer, req, compression))
}

/// open a streaming session: spawn the producer and hand the channel's
/// consuming end to the response body.
fn streaming_response(
    state: AppState,
    peer: MachineKey,
    req: MapRequest,
    compression: Compression,
) -> Response {
    // subscribe before the initial build so no update is lost in between
    let conduit = state.notifier.subscribe();
    let (tx, rx) = mpsc::channel::<MapResponse>(SESSION_CHANNEL_CAPACITY);

    tokio::spawn(produce(state, peer, req.keep_alive, conduit, tx));

    // the consumer: drain the channel, frame each response, flush to the
    // client. dropping the body (client gone) drops the receiver, which
    // stops the producer at its next send.
    let body_stream = stream::unfold((rx, compression), |(mut rx, compression)| async move {
        let resp = rx.recv().await?;
        let bytes = encode_length_prefixed(&resp, &compression)?;
        Some((Ok::<_, Infallible>(bytes), (rx, compression)))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(body_stream))
        .expect("valid status and headers")
}

/// producer half of a streaming session.
///
/// sends one full map response immediately, then cycles on three timers:
/// conduit signals only advance `last_update`; the sync tick rebuilds when
/// `last_sync < last_update`; the keep-alive tick pings clients that asked
/// for it. returning closes the channel, which terminates the consumer.
async fn produce(
    state: AppState,
    peer: MachineKey,
    keep_alive_requested: bool,
    mut conduit: broadcast::Receiver<StateChanged>,
    tx: mpsc::Sender<MapResponse>,
) {
    let mut mapper = state.new_mapper();

    // first update goes out immediately
    match build_for_peer(&state, &mut mapper, &peer).await {
        Ok(Some(resp)) => {
            if tx.send(resp).await.is_err() {
                return;
            }
        }
        Ok(None) => {}
        Err(e) => {
            warn!(peer = %peer.short_string(), error = %e, "failed to prepare map response");
            return;
        }
    }

    let mut sync = interval_at(Instant::now() + SYNC_INTERVAL, SYNC_INTERVAL);
    let mut keep_alive = interval_at(Instant::now() + KEEP_ALIVE_INTERVAL, KEEP_ALIVE_INTERVAL);

    // conduit signals only move last_update; the sync tick below compares
    // the two timestamps, so a burst of updates costs one rebuild
    let now = Instant::now();
    let (mut last_update, mut last_sync) = (now, now);

    loop {
        tokio::select! {
            changed = conduit.recv() => match changed {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    last_update = Instant::now();
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },

            _ = sync.tick() => {
                if last_sync < last_update {
                    match build_for_peer(&state, &mut mapper, &peer).await {
                        Ok(Some(resp)) => {
                            if tx.send(resp).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => continue, // interrupted; retry next tick
                        Err(e) => {
                            warn!(peer = %peer.short_string(), error = %e, "failed to prepare map response");
                            return;
                        }
                    }
                    last_sync = last_update;
                } else {
                    debug!(peer = %peer.short_string(), "peer in-sync");
                }
            },

            _ = keep_alive.tick() => {
                if keep_alive_requested && tx.send(MapResponse::keep_alive()).await.is_err() {
                    return;
                }
            },
        }
    }
}

/// re-query the machine and build a fresh map response.
///
/// each rebuild reads through the pool so it observes a consistent current
/// snapshot; the session holds no connection across timer waits.
async fn build_for_peer(
    state: &AppState,
    mapper: &mut Mapper,
    peer: &MachineKey,
) -> Result<Option<MapResponse>, wirefire_db::Error> {
    let machine = queries::find_machine_by_noise_key(state.db.conn(), peer)
        .await?
        .ok_or_else(|| wirefire_db::Error::InvalidData("no machine found with key".to_string()))?;

    mapper.build(state.db.conn(), &machine).await
}

/// compress a payload with zstd at the fastest level.
fn compress_zstd(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = zstd::stream::Encoder::new(Vec::new(), 1)?;
    encoder.write_all(data)?;
    encoder.finish()
}

/// encode a map response with a 4-byte little-endian length prefix.
///
/// the payload is json, zstd-compressed when requested. returns `None` if
/// serialisation fails or the payload exceeds the framing limit.
fn encode_length_prefixed(response: &MapResponse, compression: &Compression) -> Option<Bytes> {
    let json_bytes = serde_json::to_vec(response).ok()?;

    let payload = match compression {
        Compression::Zstd => compress_zstd(&json_bytes).ok()?,
        Compression::None => json_bytes,
    };

    let len = u32::try_from(payload.len()).ok()?;

    let mut body = Vec::with_capacity(4 + payload.len());
    body.extend_from_slice(&len.to_le_bytes());
    body.extend_from_slice(&payload);

    Some(Bytes::from(body))
}
