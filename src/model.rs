//! Wire types shared by the transport layer, cache, and diff engine

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A namespace's key-value configuration. Values are arbitrary JSON scalars/objects;
/// stringification only happens at the `get()` read boundary.
pub type Configuration = BTreeMap<String, serde_json::Value>;

/// `/services/config` response entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigServerResp {
    #[serde(rename = "appName")]
    pub app_name: String,
    #[serde(rename = "instanceId")]
    pub instance_id: String,
    #[serde(rename = "homepageUrl")]
    pub homepage_url: String,
}

/// `/configs/<appId>/<cluster>/<namespace>` response body, returned only on a 200.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NonCacheResp {
    #[serde(rename = "appId")]
    pub app_id: String,
    pub cluster: String,
    #[serde(rename = "namespaceName")]
    pub namespace_name: String,
    pub configurations: Configuration,
    #[serde(rename = "releaseKey")]
    pub release_key: String,
}

/// A single entry of the notification vector sent to, and received from,
/// `/notifications/v2`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Notification {
    #[serde(rename = "namespaceName")]
    pub namespace_name: String,
    #[serde(rename = "notificationId")]
    pub notification_id: i64,
}

/// Sentinel notification id meaning "not yet learned".
pub const UNKNOWN_NOTIFICATION_ID: i64 = -1;

/// The kind of a single configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

/// A single key's change between two configuration snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub key: String,
    pub value: serde_json::Value,
}

/// An event published to subscribers: the namespace that changed, its old and
/// new snapshots, the ordered list of changes that produced it, or an
/// out-of-band error (e.g. a failed lazy init on a fresh watch subscription).
#[derive(Debug, Clone, Default)]
pub struct ApolloResponse {
    pub namespace: String,
    pub old_value: Configuration,
    pub new_value: Configuration,
    pub changes: Vec<Change>,
    pub error: Option<String>,
}

/// An asynchronous failure surfaced on the client's error channel.
#[derive(Debug, Clone, thiserror::Error)]
#[error("long poll error: app_id={app_id} cluster={cluster} namespace={namespace:?} server={config_server_url}: {message}")]
pub struct LongPollerError {
    pub config_server_url: String,
    pub app_id: String,
    pub cluster: String,
    pub namespace: Option<String>,
    pub message: String,
}
