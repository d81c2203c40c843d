use super::{build_url, describe_failure, DeliveryProvider, RemoteAsset, UploadOptions, UrlOptions};
use crate::config::CloudflareConfig;
use crate::LogoKitError;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

pub const PROVIDER_NAME: &str = "cloudflare";

/// Files accepted by a single purge request.
const PURGE_BATCH: usize = 30;

/// Cloudflare Images for uploads, zone cache purge for invalidation.
pub struct CloudflareProvider {
    client: Client,
    config: CloudflareConfig,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct UploadedImage {
    id: String,
    #[serde(default)]
    variants: Vec<String>,
}

fn api_errors(errors: &[ApiMessage]) -> String {
    errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.code))
        .collect::<Vec<_>>()
        .join(", ")
}

impl CloudflareProvider {
    pub fn new(client: Client, config: CloudflareConfig) -> Self {
        Self { client, config }
    }

    fn upload_endpoint(&self) -> String {
        format!(
            "{}/accounts/{}/images/v1",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_id
        )
    }

    fn purge_endpoint(&self) -> String {
        format!(
            "{}/zones/{}/purge_cache",
            self.config.api_base.trim_end_matches('/'),
            self.config.zone_id
        )
    }
}

#[async_trait::async_trait]
impl DeliveryProvider for CloudflareProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn upload(&self, bytes: Bytes, options: &UploadOptions) -> Result<RemoteAsset, LogoKitError> {
        let size_bytes = bytes.len();
        let file_name = options.path.rsplit('/').next().unwrap_or(&options.path).to_string();
        let part = Part::bytes(bytes.to_vec())
            .file_name(file_name)
            .mime_str(options.content_type.as_ref())
            .map_err(|e| LogoKitError::UploadError(e.to_string()))?;
        let metadata = json!({
            "width": options.width,
            "height": options.height,
            "format": options.format,
            "transform": options.transform,
        });
        let form = Form::new()
            .part("file", part)
            .text("id", options.path.clone())
            .text("metadata", metadata.to_string());

        let resp = self
            .client
            .post(self.upload_endpoint())
            .bearer_auth(&self.config.api_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| LogoKitError::UploadError(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| LogoKitError::UploadError(e.to_string()))?;
        if !status.is_success() {
            return Err(LogoKitError::UploadError(describe_failure(status, &body)));
        }

        let parsed: ApiResponse<UploadedImage> =
            serde_json::from_str(&body).map_err(|e| LogoKitError::UploadError(e.to_string()))?;
        let image = match parsed {
            ApiResponse { success: true, result: Some(image), .. } => image,
            ApiResponse { errors, .. } => return Err(LogoKitError::UploadError(api_errors(&errors))),
        };

        let url = image
            .variants
            .first()
            .cloned()
            .unwrap_or_else(|| self.url(&image.id, None));
        Ok(options.remote_asset(url, image.id, size_bytes))
    }

    fn url(&self, path: &str, options: Option<&UrlOptions>) -> String {
        let pairs = options.map(UrlOptions::query_pairs).unwrap_or_default();
        build_url(&self.config.delivery_base_url, path, &pairs)
    }

    async fn purge(&self, paths: &[String]) -> Result<(), LogoKitError> {
        let files: Vec<String> = paths.iter().map(|p| self.url(p, None)).collect();
        for batch in files.chunks(PURGE_BATCH) {
            let resp = self
                .client
                .post(self.purge_endpoint())
                .bearer_auth(&self.config.api_token)
                .json(&json!({ "files": batch }))
                .send()
                .await
                .map_err(|e| LogoKitError::PurgeError(e.to_string()))?;

            let status = resp.status();
            let body = resp.text().await.map_err(|e| LogoKitError::PurgeError(e.to_string()))?;
            if !status.is_success() {
                return Err(LogoKitError::PurgeError(describe_failure(status, &body)));
            }
            if let Ok(parsed) = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body) {
                if !parsed.success {
                    return Err(LogoKitError::PurgeError(api_errors(&parsed.errors)));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> CloudflareProvider {
        CloudflareProvider::new(
            Client::new(),
            CloudflareConfig {
                enabled: true,
                account_id: "acc".into(),
                api_token: "tok".into(),
                zone_id: "zone".into(),
                delivery_base_url: "https://imagedelivery.net/hash".into(),
                api_base: "https://api.cloudflare.com/client/v4/".into(),
            },
        )
    }

    #[test]
    fn endpoints() {
        let p = provider();
        assert_eq!(p.upload_endpoint(), "https://api.cloudflare.com/client/v4/accounts/acc/images/v1");
        assert_eq!(p.purge_endpoint(), "https://api.cloudflare.com/client/v4/zones/zone/purge_cache");
    }

    #[test]
    fn url_embeds_path_and_params() {
        let opts = UrlOptions { width: Some(100), format: Some(crate::config::ImageFormat::Webp), ..Default::default() };
        let url = provider().url("logos/abc.png", Some(&opts));
        assert!(url.starts_with("https://imagedelivery.net/hash/logos/abc.png?"));
        assert!(url.contains("width=100"));
        assert!(url.contains("format=webp"));
    }

    #[test]
    fn error_messages_are_joined() {
        let errors = vec![
            ApiMessage { code: 5400, message: "Bad request".into() },
            ApiMessage { code: 10000, message: "Auth".into() },
        ];
        assert_eq!(api_errors(&errors), "Bad request (5400), Auth (10000)");
    }
}
