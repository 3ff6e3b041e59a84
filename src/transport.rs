//! Stateless HTTP transport for the four config-service endpoints
//!
//! Every call here is a bare signed GET against one server URL picked by the
//! [`crate::balancer::Balancer`] currently in use; retry-across-servers and
//! failover live in the balancer, not here (narrowed from `BatataHttpClient`,
//! which folded both concerns into one type).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::model::{ConfigServerResp, NonCacheResp, Notification};
use crate::signer;
use crate::url::namespace_for_request;

/// Client read timeout. The notifications endpoint holds the connection up to ~60s
/// server-side, so this must comfortably exceed that.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// The four stateless config-service endpoints the long-poll loop and bootstrap drive.
#[async_trait]
pub trait ConfigServiceClient: Send + Sync {
    async fn get_config_servers(
        &self,
        meta_server_url: &str,
        app_id: &str,
        ip: &str,
        access_key: &str,
    ) -> Result<(StatusCode, Vec<ConfigServerResp>)>;

    #[allow(clippy::too_many_arguments)]
    async fn get_configs_from_non_cache(
        &self,
        config_server_url: &str,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        config_type: &str,
        release_key: &str,
        ip: &str,
        access_key: &str,
    ) -> Result<(StatusCode, Option<NonCacheResp>)>;

    async fn get_notifications(
        &self,
        config_server_url: &str,
        app_id: &str,
        cluster: &str,
        notifications: &[Notification],
        access_key: &str,
    ) -> Result<(StatusCode, Vec<Notification>)>;
}

/// `reqwest`-backed implementation used outside of tests.
pub struct ReqwestConfigServiceClient {
    client: Client,
}

impl ReqwestConfigServiceClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(CLIENT_TIMEOUT).build()?;
        Ok(Self { client })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        base_url: &str,
        request_path: &str,
        app_id: &str,
        access_key: &str,
    ) -> Result<(StatusCode, Option<T>)> {
        let full_url = format!("{base_url}{request_path}");
        let headers = signer::http_headers(access_key, app_id, request_path);

        let mut request = self.client.get(&full_url);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        debug!(url = %full_url, "issuing config-service request");
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::OK {
            let body: T = response.json().await?;
            Ok((status, Some(body)))
        } else {
            Ok((status, None))
        }
    }
}

#[async_trait]
impl ConfigServiceClient for ReqwestConfigServiceClient {
    async fn get_config_servers(
        &self,
        meta_server_url: &str,
        app_id: &str,
        ip: &str,
        access_key: &str,
    ) -> Result<(StatusCode, Vec<ConfigServerResp>)> {
        let request_path = format!(
            "/services/config?id={}&appId={}",
            urlencoding(ip),
            urlencoding(app_id)
        );

        let (status, body) = self
            .get_json::<Vec<ConfigServerResp>>(meta_server_url, &request_path, app_id, access_key)
            .await?;

        Ok((status, body.unwrap_or_default()))
    }

    async fn get_configs_from_non_cache(
        &self,
        config_server_url: &str,
        app_id: &str,
        cluster: &str,
        namespace: &str,
        config_type: &str,
        release_key: &str,
        ip: &str,
        access_key: &str,
    ) -> Result<(StatusCode, Option<NonCacheResp>)> {
        let request_path = format!(
            "/configs/{}/{}/{}?releaseKey={}&ip={}",
            urlencoding(app_id),
            urlencoding(cluster),
            urlencoding(&namespace_for_request(config_type, namespace)),
            urlencoding(release_key),
            urlencoding(ip),
        );

        let (status, body) = self
            .get_json::<NonCacheResp>(config_server_url, &request_path, app_id, access_key)
            .await?;

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NamespaceNotFound {
                namespace: namespace.to_string(),
            });
        }

        Ok((status, body))
    }

    async fn get_notifications(
        &self,
        config_server_url: &str,
        app_id: &str,
        cluster: &str,
        notifications: &[Notification],
        access_key: &str,
    ) -> Result<(StatusCode, Vec<Notification>)> {
        let notifications_json = serde_json::to_string(notifications)?;
        let request_path = format!(
            "/notifications/v2?appId={}&cluster={}&notifications={}",
            urlencoding(app_id),
            urlencoding(cluster),
            urlencoding(&notifications_json),
        );

        let (status, body) = self
            .get_json::<Vec<Notification>>(config_server_url, &request_path, app_id, access_key)
            .await?;

        Ok((status, body.unwrap_or_default()))
    }
}

/// Escape a single path/query value the way the original client's
/// `url.QueryEscape` calls do (see `original_source/core/client/{cache,noncache,notification}.go`).
/// `serde_urlencoded` (already the teacher's query-string crate, see
/// `batata-client/src/api.rs`) implements the same form-encoding rules, so a
/// one-pair round trip through it gives us an equivalent escape with no
/// hand-rolled percent-encoding table.
fn urlencoding(s: &str) -> String {
    serde_urlencoded::to_string([("v", s)])
        .map(|encoded| encoded.trim_start_matches("v=").to_string())
        .unwrap_or_default()
}
