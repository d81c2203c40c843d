use super::signing::sign_params;
use super::{build_url, describe_failure, DeliveryProvider, RemoteAsset, UploadOptions, UrlOptions};
use crate::config::BunnyConfig;
use crate::LogoKitError;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::collections::BTreeMap;

pub const PROVIDER_NAME: &str = "bunny";

const ACCESS_KEY: &str = "AccessKey";

/// Bunny storage zone for uploads, served through a pull zone.
pub struct BunnyProvider {
    client: Client,
    config: BunnyConfig,
}

impl BunnyProvider {
    pub fn new(client: Client, config: BunnyConfig) -> Self {
        Self { client, config }
    }

    fn storage_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.storage_endpoint.trim_end_matches('/'),
            self.config.storage_zone,
            path.trim_start_matches('/')
        )
    }

    fn purge_endpoint(&self) -> String {
        format!("{}/purge", self.config.api_base.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl DeliveryProvider for BunnyProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn upload(&self, bytes: Bytes, options: &UploadOptions) -> Result<RemoteAsset, LogoKitError> {
        let size_bytes = bytes.len();
        let resp = self
            .client
            .put(self.storage_url(&options.path))
            .header(ACCESS_KEY, &self.config.storage_api_key)
            .header(CONTENT_TYPE, options.content_type.as_ref())
            .body(bytes)
            .send()
            .await
            .map_err(|e| LogoKitError::UploadError(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LogoKitError::UploadError(describe_failure(status, &body)));
        }

        let url = self.url(&options.path, None);
        Ok(options.remote_asset(url, options.path.clone(), size_bytes))
    }

    fn url(&self, path: &str, options: Option<&UrlOptions>) -> String {
        let mut pairs = options.map(UrlOptions::query_pairs).unwrap_or_default();
        if let Some(key) = &self.config.signing_key {
            let mut params: BTreeMap<String, String> = pairs.into_iter().collect();
            let expires = time::OffsetDateTime::now_utc().unix_timestamp() + self.config.signed_url_ttl_seconds;
            if let Err(error) = sign_params(path, &mut params, key, expires) {
                tracing::warn!(%error, path, "Could not sign delivery URL");
            }
            pairs = params.into_iter().collect();
        }
        build_url(&self.config.pull_zone_url, path, &pairs)
    }

    async fn purge(&self, paths: &[String]) -> Result<(), LogoKitError> {
        // Bunny purges one URL per request.
        for path in paths {
            let target = build_url(&self.config.pull_zone_url, path, &[]);
            let resp = self
                .client
                .post(self.purge_endpoint())
                .query(&[("url", target.as_str())])
                .header(ACCESS_KEY, &self.config.api_key)
                .send()
                .await
                .map_err(|e| LogoKitError::PurgeError(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(LogoKitError::PurgeError(format!("{} ({})", describe_failure(status, &body), target)));
            }
        }
        Ok(())
    }
}
