//! Cloudflare Workers KV REST client.
//!
//! Implements [`KvNamespace`] over the v4 API so the data layer can run
//! outside a Worker.
//!
//! ### Endpoints
//!
//! - `GET/PUT/DELETE /accounts/{account}/storage/kv/namespaces/{ns}/values/{key}`
//! - `GET /accounts/{account}/storage/kv/namespaces/{ns}/keys`
//!
//! Authentication uses a bearer API token. A 404 on read means the key is
//! absent. Writes send the raw value as the body, or a multipart form with
//! `value` and `metadata` parts when metadata is attached. `expiration_ttl`
//! travels as a query parameter.

pub mod error;
pub mod response;

pub use error::KvHttpError;

use std::time::Instant;

use async_trait::async_trait;
use marknav_core::config::KvConfig;
use marknav_core::kv::{KvError, KvNamespace, ListOptions, ListResult, PutOptions};
use reqwest::{StatusCode, header, multipart};
use url::Url;

use response::{ApiEnvelope, ListKeysResponse};

/// Default user agent.
const DEFAULT_USER_AGENT: &str = concat!("marknav/", env!("CARGO_PKG_VERSION"));

/// Workers KV namespace client.
#[derive(Debug, Clone)]
pub struct CloudflareKv {
    http: reqwest::Client,
    /// `{base}/accounts/{account}/storage/kv/namespaces/{ns}`
    namespace_url: Url,
    api_token: String,
}

impl CloudflareKv {
    /// Create a client for the namespace described by `config`.
    pub fn new(config: &KvConfig) -> Result<Self, KvHttpError> {
        for (field, value) in
            [("account_id", &config.account_id), ("namespace_id", &config.namespace_id), ("api_token", &config.api_token)]
        {
            if value.trim().is_empty() {
                return Err(KvHttpError::Config(format!("{field} is required")));
            }
        }

        let mut namespace_url =
            Url::parse(&config.base_url).map_err(|e| KvHttpError::Config(format!("invalid base_url: {e}")))?;
        namespace_url
            .path_segments_mut()
            .map_err(|_| KvHttpError::Config("base_url cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["accounts", config.account_id.as_str(), "storage", "kv", "namespaces", config.namespace_id.as_str()]);

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(Self { http, namespace_url, api_token: config.api_token.clone() })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.namespace_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    /// Map a non-success status to an error, consuming the body for detail.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, KvHttpError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(KvHttpError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(KvHttpError::RateLimited),
            _ => {
                let body = response.bytes().await.unwrap_or_default();
                match serde_json::from_slice::<ApiEnvelope>(&body).map(ApiEnvelope::into_result) {
                    Ok(Err(api)) => Err(api),
                    _ => Err(KvHttpError::HttpError { status: status.as_u16() }),
                }
            }
        }
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, KvHttpError> {
        let start = Instant::now();
        let response = self.http.get(self.url(&["values", key])).bearer_auth(&self.api_token).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(key, elapsed = ?start.elapsed(), "kv get: absent");
            return Ok(None);
        }
        let text = Self::check(response).await?.text().await?;
        tracing::debug!(key, bytes = text.len(), elapsed = ?start.elapsed(), "kv get");
        Ok(Some(text))
    }

    async fn put_value(&self, key: &str, value: &str, options: PutOptions) -> Result<(), KvHttpError> {
        let mut request = self.http.put(self.url(&["values", key])).bearer_auth(&self.api_token);
        if let Some(ttl) = options.expiration_ttl {
            request = request.query(&[("expiration_ttl", ttl)]);
        }
        request = match options.metadata {
            Some(metadata) => {
                let form = multipart::Form::new().text("value", value.to_string()).text("metadata", metadata.to_string());
                request.multipart(form)
            }
            None => request.header(header::CONTENT_TYPE, "text/plain").body(value.to_string()),
        };

        let response = Self::check(request.send().await?).await?;
        let envelope: ApiEnvelope = response.json().await?;
        envelope.into_result()?;
        tracing::debug!(key, bytes = value.len(), "kv put");
        Ok(())
    }

    async fn delete_value(&self, key: &str) -> Result<(), KvHttpError> {
        let response = self.http.delete(self.url(&["values", key])).bearer_auth(&self.api_token).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let envelope: ApiEnvelope = Self::check(response).await?.json().await?;
        envelope.into_result()?;
        tracing::debug!(key, "kv delete");
        Ok(())
    }

    async fn list_keys(&self, options: ListOptions) -> Result<ListResult, KvHttpError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(prefix) = &options.prefix {
            query.push(("prefix", prefix.clone()));
        }
        if let Some(limit) = options.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(cursor) = &options.cursor {
            query.push(("cursor", cursor.clone()));
        }

        let response =
            self.http.get(self.url(&["keys"])).bearer_auth(&self.api_token).query(&query).send().await?;
        let raw: ListKeysResponse = Self::check(response).await?.json().await?;
        let page = ListResult::try_from(raw)?;
        tracing::debug!(keys = page.keys.len(), complete = page.list_complete, "kv list");
        Ok(page)
    }
}

#[async_trait]
impl KvNamespace for CloudflareKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.get_value(key).await?)
    }

    async fn put(&self, key: &str, value: &str, options: PutOptions) -> Result<(), KvError> {
        Ok(self.put_value(key, value, options).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        Ok(self.delete_value(key).await?)
    }

    async fn list(&self, options: ListOptions) -> Result<ListResult, KvError> {
        Ok(self.list_keys(options).await?)
    }
}
