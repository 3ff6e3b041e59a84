//! Apollo config-service client
//!
//! This crate provides:
//! - A long-poll synchronization engine that keeps namespaces in sync with a
//!   centralized configuration service
//! - A load-balanced server selector with static and meta-server-refreshed variants
//! - A local JSON backup/restore path for surviving config-service outages
//! - A subscription interface that emits structured diffs on configuration change

pub mod backup;
pub mod balancer;
pub mod cache;
pub mod client;
pub mod diff;
pub mod error;
pub mod longpoll;
pub mod model;
pub mod signer;
pub mod subscribe;
pub mod transport;
pub mod url;

pub use client::{ApolloClient, ApolloClientOptions};
pub use error::{ClientError, Result};
pub use model::{ApolloResponse, Change, ChangeKind, Configuration, LongPollerError, Notification};

/// Default cluster name when none is configured.
pub const DEFAULT_CLUSTER: &str = "default";

/// Namespace `get()` falls back to when no namespace is given and no
/// default namespace was configured.
pub const DEFAULT_NAMESPACE: &str = "application";

/// `configType` value that carries no request-path suffix.
pub const DEFAULT_CONFIG_TYPE: &str = "properties";

/// Backup file path used when the caller doesn't override it.
pub const DEFAULT_BACKUP_FILE: &str = ".goApollo";

/// Long-poll loop interval when the caller doesn't override it.
pub const DEFAULT_LONG_POLLER_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// Balancer meta-server refresh interval when the caller doesn't override it.
pub const DEFAULT_REFRESH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Fallback meta-server address used when neither the builder nor the
/// environment supplies one.
pub const DEFAULT_META_SERVER_URL: &str = "http://apollo.meta";

/// Per-channel subscription send timeout.
pub const DEFAULT_WATCH_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(500);

/// Sentinel notification id meaning "not yet learned".
pub const UNKNOWN_NOTIFICATION_ID: i64 = model::UNKNOWN_NOTIFICATION_ID;

/// Environment variable fallback for the config-service server list.
pub const ENV_CONFIGSERVICE: &str = "APOLLO_CONFIGSERVICE";

/// Environment variable fallback for the meta-server address.
pub const ENV_META: &str = "APOLLO_META";
