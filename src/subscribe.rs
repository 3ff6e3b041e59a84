//! Subscription fan-out: a global channel and per-namespace channels that
//! receive [`ApolloResponse`] change events
//!
//! Grounded on the original client's `sendWatchCh`/`getWatchChs`/
//! `fixWatchNamespace` trio in `agollo.go`. The channel idiom itself is
//! adapted from this crate's trait-callback listener design elsewhere:
//! subscribers want channels rather than callbacks, so each one gets its own
//! bounded `tokio::sync::mpsc` pair instead of a shared broadcast channel, so
//! one blocked subscriber can never starve another (see DESIGN.md, Open
//! Question 2).

use std::path::Path;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::diff::diff;
use crate::model::{ApolloResponse, Configuration};
use crate::DEFAULT_WATCH_TIMEOUT;

/// Channel capacity handed to each new subscriber.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 16;

type Subscriber = mpsc::Sender<ApolloResponse>;

/// Normalize a caller-supplied namespace to the suffixed form the server
/// uses in its notification messages: a namespace lacking any extension is
/// assumed to be the default config type. This is independent of (and the
/// opposite of) the request-path suffix rule in [`crate::url::namespace_for_request`]:
/// that rule omits the suffix for the default type in the wire path, while
/// this one always adds it for the subscription-key form.
pub fn fix_watch_namespace(namespace: &str) -> String {
    let has_extension = Path::new(namespace).extension().is_some();

    if has_extension {
        namespace.to_string()
    } else {
        format!("{namespace}.{}", crate::DEFAULT_CONFIG_TYPE)
    }
}

/// Owns the global subscription list and the per-namespace subscription map.
#[derive(Default)]
pub struct SubscriptionHub {
    global: Mutex<Vec<Subscriber>>,
    namespaces: dashmap::DashMap<String, Vec<Subscriber>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new global subscriber and return its receiver.
    pub fn subscribe_global(&self) -> mpsc::Receiver<ApolloResponse> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.global.lock().push(tx);
        rx
    }

    /// Register a new subscriber for `namespace` (already suffix-normalized)
    /// and return its receiver plus a sender clone so the caller can deliver
    /// an out-of-band error (e.g. a failed lazy init) on the same channel.
    pub fn subscribe_namespace(
        &self,
        namespace: &str,
    ) -> (mpsc::Receiver<ApolloResponse>, Subscriber) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .push(tx.clone());
        (rx, tx)
    }

    /// Remove a previously registered namespace subscriber, identified by
    /// the sender handed back from [`subscribe_namespace`](Self::subscribe_namespace).
    pub fn unsubscribe_namespace(&self, namespace: &str, sender: &Subscriber) {
        if let Some(mut subscribers) = self.namespaces.get_mut(namespace) {
            subscribers.retain(|s| !s.same_channel(sender));
        }
    }

    /// Compute the diff between `old` and `new`; if non-empty, publish to the
    /// global channel and any channel registered for `namespace`. Each send
    /// gets its own fresh timeout so a blocked subscriber cannot stall the
    /// loop or starve any other subscriber.
    pub async fn publish(&self, namespace: &str, old: &Configuration, new: &Configuration) {
        let changes = diff(old, new);
        if changes.is_empty() {
            return;
        }

        let event = ApolloResponse {
            namespace: namespace.to_string(),
            old_value: old.clone(),
            new_value: new.clone(),
            changes,
            error: None,
        };

        let global_targets = self.global.lock().clone();
        for target in &global_targets {
            send_with_timeout(target, event.clone()).await;
        }

        let watch_namespace = fix_watch_namespace(namespace);
        if let Some(targets) = self.namespaces.get(&watch_namespace) {
            for target in targets.iter() {
                send_with_timeout(target, event.clone()).await;
            }
        }
    }
}

async fn send_with_timeout(target: &Subscriber, event: ApolloResponse) {
    match tokio::time::timeout(DEFAULT_WATCH_TIMEOUT, target.send(event)).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => debug!("subscriber channel closed, dropping event"),
        Err(_) => debug!("subscriber send timed out, dropping event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(pairs: &[(&str, serde_json::Value)]) -> Configuration {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_fix_watch_namespace_appends_default_suffix() {
        assert_eq!(fix_watch_namespace("test"), "test.properties");
    }

    #[test]
    fn test_fix_watch_namespace_keeps_existing_suffix() {
        assert_eq!(fix_watch_namespace("test.json"), "test.json");
    }

    #[tokio::test]
    async fn test_publish_empty_diff_is_dropped() {
        let hub = SubscriptionHub::new();
        let mut rx = hub.subscribe_global();
        let conf = config(&[("timeout", json!("100"))]);

        hub.publish("application", &conf, &conf).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_reaches_global_and_namespace_subscribers() {
        let hub = SubscriptionHub::new();
        let mut global_rx = hub.subscribe_global();
        let (mut ns_rx, _sender) = hub.subscribe_namespace("application.properties");

        let old = config(&[]);
        let new = config(&[("timeout", json!("100"))]);
        hub.publish("application", &old, &new).await;

        let global_event = global_rx.recv().await.unwrap();
        assert_eq!(global_event.namespace, "application");
        assert_eq!(global_event.changes.len(), 1);

        let ns_event = ns_rx.recv().await.unwrap();
        assert_eq!(ns_event.namespace, "application");
    }

    #[tokio::test]
    async fn test_unsubscribe_namespace_stops_delivery() {
        let hub = SubscriptionHub::new();
        let (mut rx, sender) = hub.subscribe_namespace("application.properties");
        hub.unsubscribe_namespace("application.properties", &sender);

        let old = config(&[]);
        let new = config(&[("timeout", json!("100"))]);
        hub.publish("application", &old, &new).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_hung_subscriber_does_not_block_others() {
        let hub = SubscriptionHub::new();
        // Capacity-1 channel that we never drain: the second send on this
        // channel will block until the per-channel timeout elapses.
        let _hung_rx = hub.subscribe_global();
        let (mut ns_rx, _sender) = hub.subscribe_namespace("application.properties");

        let old = config(&[]);
        let new = config(&[("timeout", json!("100"))]);

        // Fill the global subscriber's buffer so the next publish blocks on it.
        for i in 0..SUBSCRIBER_CHANNEL_CAPACITY + 1 {
            let new = config(&[("timeout", json!(i.to_string()))]);
            hub.publish("application", &old, &new).await;
        }

        // The namespace subscriber should still have received at least the
        // first event despite the hung global subscriber filling up.
        assert!(ns_rx.recv().await.is_some());
    }
}
