//! relay directory loading.
//!
//! the relay map is assembled at startup by fetching each configured source
//! and merging by region id, later sources winning. map sessions use the
//! content fingerprint to avoid resending an unchanged directory.

use sha2::{Digest, Sha256};
use thiserror::Error;

use wirefire_proto::DerpMap;

/// errors from relay directory loading.
#[derive(Debug, Error)]
pub enum DerpError {
    /// a source could not be fetched.
    #[error("failed to fetch relay map: {0}")]
    Http(#[from] reqwest::Error),

    /// a source returned something that is not a relay map.
    #[error("failed to parse relay map: {0}")]
    Json(#[from] serde_json::Error),
}

/// fetch all sources and return the merged relay map.
pub async fn load(sources: &[String]) -> Result<DerpMap, DerpError> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let mut result = DerpMap::default();
    for source in sources {
        let body = client.get(source).send().await?.text().await?;
        let map: DerpMap = serde_json::from_str(&body)?;
        for (id, region) in map.regions {
            result.regions.insert(id, region);
        }
    }

    Ok(result)
}

/// content fingerprint of a relay map.
///
/// region entries are hashed in id order so the digest is stable across
/// hash-map iteration orders.
pub fn fingerprint(map: &DerpMap) -> String {
    let mut ids: Vec<i32> = map.regions.keys().copied().collect();
    ids.sort_unstable();

    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.to_le_bytes());
        if let Ok(bytes) = serde_json::to_vec(&map.regions[&id]) {
            hasher.update(&bytes);
        }
    }
    hex::encode(hasher.finalize())
}
