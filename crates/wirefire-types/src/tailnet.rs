//! tailnet type - a logical private network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// an individual tailnet managed by wirefire.
///
/// tailnets are created and deleted by out-of-band administration; the
/// coordination core only reads them. the acl policy is persisted in its
/// textual form and parsed lazily by the map builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tailnet {
    /// auto-generated unique id.
    pub id: i64,

    /// unique name of the tailnet.
    pub name: String,

    /// access control policy in its persisted textual (json) form.
    pub acl: String,

    /// creation timestamp.
    pub created_at: DateTime<Utc>,

    /// last modification timestamp.
    pub updated_at: DateTime<Utc>,

    /// role of the user for whom this tailnet was fetched.
    ///
    /// not a column of the tailnets table; populated only by the
    /// membership-join query that lists a user's tailnets.
    #[serde(default)]
    pub role: String,
}
