//! Namespace state: concurrent maps for the live cache, release keys,
//! notification ids, and the initialized gate
//!
//! Grounded on the `DashMap`-of-entries shape used elsewhere in this crate's
//! lineage for per-key caches, generalized from one map of per-config content
//! to four maps keyed by namespace (mirroring the original Go client's four
//! `sync.Map` fields in `agollo.go`, since a namespace here carries a whole
//! configuration rather than one key's content+md5).

use std::collections::BTreeMap;

use dashmap::DashMap;

use crate::model::{Configuration, Notification, UNKNOWN_NOTIFICATION_ID};

/// The four per-namespace state maps the long-poll loop and bootstrap drive.
#[derive(Default)]
pub struct NamespaceState {
    configs: DashMap<String, Configuration>,
    release_keys: DashMap<String, String>,
    notification_ids: DashMap<String, i64>,
    initialized: DashMap<String, ()>,
}

impl NamespaceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot for `namespace`, or an empty configuration if never
    /// fetched. Does not mark the namespace as seen.
    pub fn get(&self, namespace: &str) -> Configuration {
        self.configs
            .get(namespace)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Like [`get`](Self::get), but also reports whether an entry already
    /// existed — used by `getNamespace` to decide whether a lazy
    /// auto-fetch-on-miss init is needed.
    pub fn get_or_init(&self, namespace: &str) -> (Configuration, bool) {
        let existed = self.configs.contains_key(namespace);
        let conf = self
            .configs
            .entry(namespace.to_string())
            .or_default()
            .clone();
        (conf, existed)
    }

    pub fn store(&self, namespace: &str, config: Configuration) {
        self.configs.insert(namespace.to_string(), config);
    }

    /// Cached release key for `namespace`, defaulting to (and persisting) an
    /// empty string the first time it's asked for — matches the Go client's
    /// `releaseKeyMap.LoadOrStore(namespace, "")`.
    pub fn release_key(&self, namespace: &str) -> String {
        self.release_keys
            .entry(namespace.to_string())
            .or_default()
            .clone()
    }

    pub fn set_release_key(&self, namespace: &str, release_key: String) {
        self.release_keys
            .insert(namespace.to_string(), release_key);
    }

    /// Current notification id for `namespace`, or the sentinel if unknown.
    pub fn notification_id(&self, namespace: &str) -> i64 {
        self.notification_ids
            .get(namespace)
            .map(|id| *id)
            .unwrap_or(UNKNOWN_NOTIFICATION_ID)
    }

    pub fn set_notification_id(&self, namespace: &str, id: i64) {
        self.notification_ids.insert(namespace.to_string(), id);
    }

    /// Snapshot the notification map into the vector the long-poll loop
    /// submits to `/notifications/v2`. Iteration order is unspecified.
    pub fn snapshot_notifications(&self) -> Vec<Notification> {
        self.notification_ids
            .iter()
            .map(|entry| Notification {
                namespace_name: entry.key().clone(),
                notification_id: *entry.value(),
            })
            .collect()
    }

    /// Attempt to atomically claim `namespace` as initialized. Returns `true`
    /// iff this call performed the insert (i.e. the caller should proceed
    /// with the reload/seed sequence); a concurrent or prior call that
    /// already claimed it returns `false`.
    pub fn try_mark_initialized(&self, namespace: &str) -> bool {
        self.initialized
            .insert(namespace.to_string(), ())
            .is_none()
    }

    pub fn is_initialized(&self, namespace: &str) -> bool {
        self.initialized.contains_key(namespace)
    }

    /// Whole-cache snapshot for the backup file: every namespace's current
    /// configuration. DashMap iteration isn't linearized with concurrent
    /// writers, so a snapshot taken mid-update may mix pre- and post-update
    /// namespaces; that's acceptable for a backup meant to survive outages,
    /// not to provide a consistent point-in-time view.
    pub fn snapshot_all(&self) -> BTreeMap<String, Configuration> {
        self.configs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_missing_returns_empty() {
        let state = NamespaceState::new();
        assert!(state.get("application").is_empty());
    }

    #[test]
    fn test_get_or_init_reports_existing() {
        let state = NamespaceState::new();
        let (_, existed) = state.get_or_init("application");
        assert!(!existed);

        let (_, existed) = state.get_or_init("application");
        assert!(existed);
    }

    #[test]
    fn test_release_key_defaults_to_empty_and_persists() {
        let state = NamespaceState::new();
        assert_eq!(state.release_key("application"), "");
        state.set_release_key("application", "abc".to_string());
        assert_eq!(state.release_key("application"), "abc");
    }

    #[test]
    fn test_notification_id_defaults_to_sentinel() {
        let state = NamespaceState::new();
        assert_eq!(state.notification_id("application"), UNKNOWN_NOTIFICATION_ID);
        state.set_notification_id("application", 42);
        assert_eq!(state.notification_id("application"), 42);
    }

    #[test]
    fn test_try_mark_initialized_once() {
        let state = NamespaceState::new();
        assert!(state.try_mark_initialized("application"));
        assert!(!state.try_mark_initialized("application"));
    }

    #[test]
    fn test_snapshot_all() {
        let state = NamespaceState::new();
        let mut conf = Configuration::new();
        conf.insert("timeout".to_string(), json!("100"));
        state.store("application", conf.clone());

        let snapshot = state.snapshot_all();
        assert_eq!(snapshot.get("application"), Some(&conf));
    }
}
