//! wire types for the tailscale control protocol, as spoken by wirefire.
//!
//! requests and responses serialize with pascalcase field names to match the
//! official client's json encoding. the [`noise`] module carries the
//! `/ts2021` handshake.

#![warn(missing_docs)]

mod error;
mod filter;
mod map;
pub mod noise;
mod register;

pub use error::Error;
pub use filter::{FilterRule, PortRange, Ports, SshAction, SshPolicy, SshPrincipal, SshRule};
pub use map::{
    Debug, DerpMap, DerpNode, DerpRegion, DnsConfig, MapRequest, MapResponse, Node, UserProfile,
};
pub use noise::{NoiseHandshake, NoiseTransport};
pub use register::{RegisterAuth, RegisterRequest, RegisterResponse, TailcfgLogin, TailcfgUser};

/// result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// minimum client capability version the coordinator supports.
pub const SUPPORTED_CAPABILITY_VERSION: u64 = 68;

/// minimum noise capability version required for the `/key` response.
pub const NOISE_CAPABILITY_VERSION: u64 = 28;

/// error message returned to clients older than the supported version.
pub const UNSUPPORTED_CLIENT_VERSION_MESSAGE: &str =
    "wirefire only support client version >= 1.48.0, please upgrade your client";
