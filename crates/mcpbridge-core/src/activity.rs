//! Activity records served by the activity endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single activity record.
///
/// The current services fabricate these from fixed sample data; a real
/// source would query the remote audit APIs, which requires permissions
/// not modeled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Stable identifier, e.g. `m365-1`.
    pub id: String,
    /// When the activity happened.
    pub timestamp: DateTime<Utc>,
    /// Activity kind, e.g. `auth` or `incident_created`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Originating system.
    pub source: String,
    /// Receiving system.
    pub target: String,
    /// Free-form detail payload.
    pub payload: serde_json::Value,
    /// Outcome, e.g. `success`.
    pub status: String,
}

impl Activity {
    /// Build a record with `status: "success"`.
    #[must_use]
    pub fn success(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        kind: impl Into<String>,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            kind: kind.into(),
            source: source.into(),
            target: "client".to_string(),
            payload,
            status: "success".to_string(),
        }
    }
}

/// Sort activities newest-first.
pub fn sort_newest_first(activities: &mut [Activity]) {
    activities.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}
