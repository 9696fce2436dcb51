//! cryptographic key types for the tailscale control protocol.
//!
//! public keys serialize to tailscale's prefixed hex format
//! (e.g., `"nodekey:abc123..."`). the server's long-term identity is a
//! [`MachinePrivate`] parsed from its `privkey:` text form.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use zeroize::Zeroizing;

use crate::Error;

/// helper to implement tailscale key serialization with a given prefix.
macro_rules! impl_key_serde {
    ($type:ty, $prefix:expr) => {
        impl Serialize for $type {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let s = format!("{}:{}", $prefix, hex::encode(&self.0));
                serializer.serialize_str(&s)
            }
        }

        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                let expected_prefix = concat!($prefix, ":");
                let hex_str = s.strip_prefix(expected_prefix).ok_or_else(|| {
                    de::Error::custom(format!(
                        "key must start with '{}', got '{}'",
                        expected_prefix, s
                    ))
                })?;
                let bytes = hex::decode(hex_str)
                    .map_err(|e| de::Error::custom(format!("invalid hex in key: {}", e)))?;
                Ok(Self(bytes))
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}:{}", $prefix, hex::encode(&self.0))
            }
        }

        impl std::str::FromStr for $type {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let expected_prefix = concat!($prefix, ":");
                let hex_str = s
                    .strip_prefix(expected_prefix)
                    .ok_or_else(|| Error::InvalidKey(format!("missing '{}' prefix", $prefix)))?;
                let bytes = hex::decode(hex_str).map_err(|e| Error::InvalidKey(e.to_string()))?;
                Ok(Self(bytes))
            }
        }
    };
}

/// machine key - the noise static public key identifying a physical device.
///
/// this is the key authenticated by the `/ts2021` handshake and the primary
/// identity of a [`crate::Machine`] row.
/// serializes as `"mkey:<64 hex chars>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MachineKey(Vec<u8>);

impl_key_serde!(MachineKey, "mkey");

impl MachineKey {
    /// create a new machine key from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// get the raw bytes of the key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// returns a short string representation for logging.
    pub fn short_string(&self) -> String {
        if self.0.len() >= 4 {
            format!("mkey:{:02x}{:02x}...", self.0[0], self.0[1])
        } else {
            "mkey:???".to_string()
        }
    }
}

/// node key - the shorter-lived key for the per-node tunnel and relay protocol.
/// serializes as `"nodekey:<64 hex chars>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodeKey(Vec<u8>);

impl_key_serde!(NodeKey, "nodekey");

impl NodeKey {
    /// create a new node key from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// get the raw bytes of the key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// check if this is a zero key.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

/// disco key - used for direct peer-to-peer path discovery.
/// serializes as `"discokey:<64 hex chars>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DiscoKey(Vec<u8>);

impl_key_serde!(DiscoKey, "discokey");

impl DiscoKey {
    /// create a new disco key from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// get the raw bytes of the key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// check if the key is empty (not set).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// the coordination server's long-term noise private key.
///
/// parsed from its `"privkey:<64 hex chars>"` text form. the raw scalar is
/// kept in a zeroizing buffer and wiped on drop.
pub struct MachinePrivate(Zeroizing<Vec<u8>>);

impl MachinePrivate {
    /// parse the `privkey:`-prefixed hex text form.
    pub fn from_text(s: &str) -> crate::Result<Self> {
        let hex_str = s
            .strip_prefix("privkey:")
            .ok_or_else(|| Error::InvalidKey("missing 'privkey' prefix".to_string()))?;
        let bytes = hex::decode(hex_str).map_err(|e| Error::InvalidKey(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(Error::InvalidKey(format!(
                "expected 32 byte key, got {}",
                bytes.len()
            )));
        }
        Ok(Self(Zeroizing::new(bytes)))
    }

    /// the raw 32-byte curve25519 scalar.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// derive the corresponding public [`MachineKey`].
    pub fn public(&self) -> MachineKey {
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&self.0);
        let secret = crypto_box::SecretKey::from(scalar);
        MachineKey::from_bytes(secret.public_key().as_bytes().to_vec())
    }
}

impl Clone for MachinePrivate {
    fn clone(&self) -> Self {
        Self(Zeroizing::new(self.0.to_vec()))
    }
}

impl std::fmt::Debug for MachinePrivate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the scalar
        write!(f, "MachinePrivate(..)")
    }
}
