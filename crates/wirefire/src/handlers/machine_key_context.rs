//! machine key context for authenticated noise connections.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};

use wirefire_types::MachineKey;

/// the peer's machine key, authenticated by the noise handshake.
///
/// the ts2021 handler inserts this into request extensions after the
/// handshake completes; `/machine/*` handlers extract it instead of
/// trusting anything in the request body.
#[derive(Debug, Clone)]
pub struct MachineKeyContext(pub MachineKey);

impl MachineKeyContext {
    /// create a context from the raw static key bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(MachineKey::from_bytes(bytes))
    }

    /// the authenticated machine key.
    pub fn machine_key(&self) -> &MachineKey {
        &self.0
    }
}

impl<S> FromRequestParts<S> for MachineKeyContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<MachineKeyContext>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "missing machine key context - request must come through the ts2021 channel",
        ))
    }
}
