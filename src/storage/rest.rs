//! Remote object storage over its REST API.
//!
//! Objects live in a public bucket:
//!
//! - upload: `POST {endpoint}/storage/v1/object/{bucket}/{key}`
//! - public URL: `{endpoint}/storage/v1/object/public/{bucket}/{key}`
//! - delete: `DELETE {endpoint}/storage/v1/object/{bucket}/{key}`
//! - bucket creation: `POST {endpoint}/storage/v1/bucket`
//!
//! Requests carry the API key both as `apikey` and as a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::json;

use super::{ObjectStore, StorageError};

/// Object storage reached over HTTP.
#[derive(Debug, Clone)]
pub struct RestObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
    api_key: Option<String>,
}

impl RestObjectStore {
    /// Builds a store for `bucket` at `endpoint`.
    ///
    /// # Errors
    /// Fails on an unparsable endpoint or if the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        bucket: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        Url::parse(endpoint).map_err(|e| StorageError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            api_key,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Public URL under which an uploaded `key` is served.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{key}", self.endpoint, self.bucket)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{key}", self.endpoint, self.bucket)
    }

    fn key_for(&self, reference: &str) -> Option<String> {
        let prefix = self.public_url("");
        reference
            .strip_prefix(&prefix)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    /// Creates the bucket as public if it does not exist yet.
    ///
    /// Returns `true` when the bucket was created and `false` when it was
    /// already there.
    ///
    /// # Errors
    /// Any other rejection or transport failure.
    pub async fn ensure_bucket(&self) -> Result<bool, StorageError> {
        let url = format!("{}/storage/v1/bucket", self.endpoint);
        let body = json!({ "id": self.bucket, "name": self.bucket, "public": true });
        let response = self.authorize(self.client.post(url).json(&body)).send().await?;

        let status = response.status();
        if status.is_success() {
            info!("created storage bucket {}", self.bucket);
            return Ok(true);
        }
        let text = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT || text.to_lowercase().contains("already exists") {
            debug!("storage bucket {} already exists", self.bucket);
            return Ok(false);
        }
        Err(StorageError::Rejected {
            status: status.as_u16(),
            body: text,
        })
    }
}

async fn check(response: Response, reference: &str) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(reference.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ObjectStore for RestObjectStore {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        let request = self
            .client
            .post(self.object_url(key))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);
        let response = self.authorize(request).send().await?;
        check(response, key).await?;
        Ok(self.public_url(key))
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.client.get(reference).send().await?;
        let response = check(response, reference).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete(&self, reference: &str) -> Result<(), StorageError> {
        let key = self
            .key_for(reference)
            .ok_or_else(|| StorageError::ForeignReference(reference.to_string()))?;
        let response = self
            .authorize(self.client.delete(self.object_url(&key)))
            .send()
            .await?;
        check(response, reference).await?;
        Ok(())
    }

    fn owns(&self, reference: &str) -> bool {
        self.key_for(reference).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RestObjectStore {
        RestObjectStore::new("https://storage.example.com/", "models", None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_public_url_layout() {
        assert_eq!(
            store().public_url("thumbnails/1_a.png"),
            "https://storage.example.com/storage/v1/object/public/models/thumbnails/1_a.png"
        );
    }

    #[test]
    fn test_owns_only_its_bucket() {
        let store = store();
        assert!(store.owns("https://storage.example.com/storage/v1/object/public/models/thumbnails/1_a.png"));
        assert!(!store.owns("https://storage.example.com/storage/v1/object/public/other/a.png"));
        assert!(!store.owns("https://storage.example.com/storage/v1/object/public/models/"));
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let result = RestObjectStore::new("not a url", "models", None, Duration::from_secs(1));
        assert!(matches!(result, Err(StorageError::InvalidEndpoint(_))));
    }
}
