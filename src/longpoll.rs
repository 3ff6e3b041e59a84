//! Namespace reload and the long-poll synchronization loop
//!
//! Grounded on `original_source/core/agollo/agollo.go`'s `reloadNamespace`,
//! `longPoll`, and `initNamespace`. Notification snapshot/submit, reload,
//! diff-and-publish, and notification-id advance are kept in the same
//! sequence as the original so readers can never observe a notification id
//! advance before the cache it corresponds to has been updated.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use crate::backup;
use crate::balancer::Balancer;
use crate::cache::NamespaceState;
use crate::error::{ClientError, Result};
use crate::model::{LongPollerError, Notification, UNKNOWN_NOTIFICATION_ID};
use crate::subscribe::SubscriptionHub;
use crate::transport::ConfigServiceClient;

/// Everything the reload step and the long-poll loop need, shared behind an `Arc`.
pub struct LongPollContext {
    pub balancer: Arc<dyn Balancer>,
    pub transport: Arc<dyn ConfigServiceClient>,
    pub state: Arc<NamespaceState>,
    pub hub: Arc<SubscriptionHub>,
    pub app_id: String,
    pub cluster: String,
    pub ip: String,
    pub access_key: String,
    pub config_type: String,
    pub backup_file: Option<PathBuf>,
    pub fail_tolerant_on_backup_exists: bool,
    pub long_poller_interval: Duration,
    pub error_tx: mpsc::Sender<LongPollerError>,
}

/// What a reload actually did to the cache, distinguishing a genuine 200
/// fetch from a fail-tolerant restore: only the former seeds the
/// notification id during bootstrap (see [`init_namespace`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Fetched,
    Unchanged,
    Restored,
}

/// Reload one namespace from the config service, per §4.6.
pub async fn reload_namespace(ctx: &LongPollContext, namespace: &str) -> Result<ReloadOutcome> {
    let server_url = ctx.balancer.select().await?;
    let release_key = ctx.state.release_key(namespace);

    let result = ctx
        .transport
        .get_configs_from_non_cache(
            &server_url,
            &ctx.app_id,
            &ctx.cluster,
            namespace,
            &ctx.config_type,
            &release_key,
            &ctx.ip,
            &ctx.access_key,
        )
        .await;

    match result {
        Ok((StatusCode::OK, Some(body))) => {
            ctx.state.store(namespace, body.configurations);
            ctx.state.set_release_key(namespace, body.release_key);
            write_backup(ctx);
            Ok(ReloadOutcome::Fetched)
        }
        Ok((StatusCode::NOT_MODIFIED, _)) => Ok(ReloadOutcome::Unchanged),
        Ok((status, _)) => {
            restore_or_err(
                ctx,
                namespace,
                ClientError::ServerError {
                    status: status.as_u16(),
                    body: String::new(),
                },
            )
        }
        Err(err) => restore_or_err(ctx, namespace, err),
    }
}

fn write_backup(ctx: &LongPollContext) {
    let Some(path) = &ctx.backup_file else {
        return;
    };

    let snapshot = ctx.state.snapshot_all();
    if let Err(err) = backup::write_backup(path, &snapshot) {
        error!(error = %err, path = %path.display(), "failed to write backup file");
    }
}

fn restore_or_err(
    ctx: &LongPollContext,
    namespace: &str,
    err: ClientError,
) -> Result<ReloadOutcome> {
    if !ctx.fail_tolerant_on_backup_exists {
        return Err(err);
    }

    let Some(path) = &ctx.backup_file else {
        return Err(ClientError::BackupUnavailable {
            namespace: namespace.to_string(),
        });
    };

    match backup::load_namespace(path, namespace) {
        Ok(Some(config)) => {
            warn!(%namespace, "restoring namespace from backup after reload failure");
            ctx.state.store(namespace, config);
            Ok(ReloadOutcome::Restored)
        }
        Ok(None) => Err(ClientError::BackupUnavailable {
            namespace: namespace.to_string(),
        }),
        Err(backup_err) => {
            warn!(error = %backup_err, "backup file unreadable during fail-tolerant restore");
            Err(ClientError::BackupUnavailable {
                namespace: namespace.to_string(),
            })
        }
    }
}

/// Initialize one namespace per §4.4: atomic claim, reload, seed notification id.
/// Returns the reload error, if any, so the caller can report the first one while
/// still initializing every other namespace.
pub async fn init_namespace(ctx: &LongPollContext, namespace: &str) -> Option<ClientError> {
    if !ctx.state.try_mark_initialized(namespace) {
        return None;
    }

    let outcome = reload_namespace(ctx, namespace).await;

    if !matches!(outcome, Ok(ReloadOutcome::Fetched)) {
        ctx.state.set_notification_id(namespace, UNKNOWN_NOTIFICATION_ID);
        return outcome.err();
    }

    seed_notification_id(ctx, namespace).await;
    None
}

async fn seed_notification_id(ctx: &LongPollContext, namespace: &str) {
    let seed = vec![Notification {
        namespace_name: namespace.to_string(),
        notification_id: UNKNOWN_NOTIFICATION_ID,
    }];

    let server_url = match ctx.balancer.select().await {
        Ok(url) => url,
        Err(_) => return,
    };

    let response = ctx
        .transport
        .get_notifications(&server_url, &ctx.app_id, &ctx.cluster, &seed, &ctx.access_key)
        .await;

    match response {
        Ok((_status, notifications)) if !notifications.is_empty() => {
            for notification in notifications {
                ctx.state
                    .set_notification_id(&notification.namespace_name, notification.notification_id);
            }
        }
        _ => ctx.state.set_notification_id(namespace, UNKNOWN_NOTIFICATION_ID),
    }
}

/// Spawn the long-poll loop and return its shutdown handle. Sending `true`
/// on the handle interrupts the next sleep or in-flight iteration boundary.
pub fn spawn(ctx: Arc<LongPollContext>) -> watch::Sender<bool> {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        loop {
            run_iteration(&ctx).await;

            tokio::select! {
                _ = tokio::time::sleep(ctx.long_poller_interval) => {}
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        return;
                    }
                }
            }
        }
    });

    stop_tx
}

async fn run_iteration(ctx: &Arc<LongPollContext>) {
    let notifications = ctx.state.snapshot_notifications();

    let server_url = match ctx.balancer.select().await {
        Ok(url) => url,
        Err(err) => {
            emit_error(ctx, String::new(), None, &err.to_string());
            return;
        }
    };

    debug!(server_url = %server_url, count = notifications.len(), "polling for notifications");

    let response = ctx
        .transport
        .get_notifications(&server_url, &ctx.app_id, &ctx.cluster, &notifications, &ctx.access_key)
        .await;

    let changed = match response {
        Ok((_status, changed)) => changed,
        Err(err) => {
            emit_error(ctx, server_url, None, &err.to_string());
            return;
        }
    };

    for notification in changed {
        let namespace = notification.namespace_name.clone();
        let old = ctx.state.get(&namespace);

        match reload_namespace(ctx, &namespace).await {
            Ok(_) => {
                let new = ctx.state.get(&namespace);
                ctx.hub.publish(&namespace, &old, &new).await;
                ctx.state.set_notification_id(&namespace, notification.notification_id);
            }
            Err(err) => {
                warn!(%namespace, error = %err, "namespace reload failed, will retry next iteration");
                emit_error(ctx, server_url.clone(), Some(namespace), &err.to_string());
            }
        }
    }
}

fn emit_error(ctx: &LongPollContext, server_url: String, namespace: Option<String>, message: &str) {
    let err = LongPollerError {
        config_server_url: server_url,
        app_id: ctx.app_id.clone(),
        cluster: ctx.cluster.clone(),
        namespace,
        message: message.to_string(),
    };

    // Non-blocking: an unread errors channel must never stall the loop.
    if ctx.error_tx.try_send(err).is_err() {
        debug!("errors channel full or closed, dropping long-poll error");
    }
}
