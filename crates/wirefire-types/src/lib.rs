//! core types for wirefire - a self-hosted tailscale coordination server.
//!
//! this crate provides the fundamental data structures used throughout
//! wirefire:
//! - [`Machine`]: a registered device in a tailnet
//! - [`User`] / [`Tailnet`]: identity and network namespaces
//! - [`RegistrationRequest`]: an in-flight interactive login
//! - [`Config`]: application configuration

#![warn(missing_docs)]

mod config;
mod dns_label;
mod error;
mod keys;
mod machine;
mod registration;
mod tailnet;
mod user;

pub use config::{
    Config, DatabaseConfig, DerpConfig, DnsConfig, LogConfig, NoiseConfig, OidcConfig,
    ServerConfig,
};
pub use dns_label::{sanitize_hostname, sanitize_tailnet_name};
pub use error::Error;
pub use keys::{DiscoKey, MachineKey, MachinePrivate, NodeKey};
pub use machine::{HostInfo, Machine};
pub use registration::RegistrationRequest;
pub use tailnet::Tailnet;
pub use user::{User, UserClaims};

/// result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;
