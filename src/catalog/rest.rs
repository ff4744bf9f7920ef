//! Catalog hosted behind a REST table API.
//!
//! Tables `models` and `materials` live at `{endpoint}/rest/v1/{table}` and
//! are filtered with `id=eq.{id}`. Writes ask for the stored row back with
//! `Prefer: return=representation`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use super::{CatalogError, CatalogStore, MaterialRecord, ModelRecord, ThumbnailRef};

const MODELS: &str = "models";
const MATERIALS: &str = "materials";

/// A catalog reached over HTTP.
#[derive(Debug, Clone)]
pub struct RestCatalog {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RestCatalog {
    /// # Errors
    /// Fails on an unparsable endpoint or if the HTTP client cannot be built.
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, CatalogError> {
        Url::parse(endpoint).map_err(|e| CatalogError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.endpoint)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, id: Option<&str>) -> Result<Vec<T>, CatalogError> {
        let mut query = vec![("select", "*".to_string()), ("order", "created_at.asc".to_string())];
        if let Some(id) = id {
            query.push(("id", format!("eq.{id}")));
        }
        let request = self.client.get(self.table_url(table)).query(&query);
        let response = check(self.authorize(request).send().await?, table, id).await?;
        Ok(response.json().await?)
    }

    async fn insert<T: Serialize + DeserializeOwned>(&self, table: &'static str, id: &str, row: &T) -> Result<T, CatalogError> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(row);
        let response = self.authorize(request).send().await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(CatalogError::Duplicate {
                kind: kind_of(table),
                id: id.to_string(),
            });
        }
        let response = check(response, table, Some(id)).await?;
        let mut rows: Vec<T> = response.json().await?;
        rows.pop().ok_or_else(|| CatalogError::Rejected {
            status: StatusCode::OK.as_u16(),
            body: format!("insert into {table} returned no row"),
        })
    }

    async fn patch<T: DeserializeOwned>(&self, table: &'static str, id: &str, body: serde_json::Value) -> Result<T, CatalogError> {
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&body);
        let response = check(self.authorize(request).send().await?, table, Some(id)).await?;
        let mut rows: Vec<T> = response.json().await?;
        rows.pop().ok_or_else(|| CatalogError::NotFound {
            kind: kind_of(table),
            id: id.to_string(),
        })
    }

    async fn remove<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<Option<T>, CatalogError> {
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation");
        let response = check(self.authorize(request).send().await?, table, Some(id)).await?;
        let mut rows: Vec<T> = response.json().await?;
        Ok(rows.pop())
    }
}

fn kind_of(table: &str) -> &'static str {
    if table == MATERIALS {
        "material"
    } else {
        "model"
    }
}

async fn check(response: Response, table: &str, id: Option<&str>) -> Result<Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if let (StatusCode::NOT_FOUND, Some(id)) = (status, id) {
        return Err(CatalogError::NotFound {
            kind: kind_of(table),
            id: id.to_string(),
        });
    }
    let body = response.text().await.unwrap_or_default();
    debug!("{table} request rejected with {status}: {body}");
    Err(CatalogError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl CatalogStore for RestCatalog {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn list_models(&self) -> Result<Vec<ModelRecord>, CatalogError> {
        self.select(MODELS, None).await
    }

    async fn get_model(&self, id: &str) -> Result<Option<ModelRecord>, CatalogError> {
        Ok(self.select(MODELS, Some(id)).await?.pop())
    }

    async fn insert_model(&self, record: ModelRecord) -> Result<ModelRecord, CatalogError> {
        self.insert(MODELS, &record.id, &record).await
    }

    async fn set_thumbnail(&self, id: &str, thumbnail: ThumbnailRef) -> Result<ModelRecord, CatalogError> {
        let body = json!({ "thumbnail": thumbnail, "updated_at": Utc::now() });
        self.patch(MODELS, id, body).await
    }

    async fn delete_model(&self, id: &str) -> Result<Option<ModelRecord>, CatalogError> {
        self.remove(MODELS, id).await
    }

    async fn list_materials(&self) -> Result<Vec<MaterialRecord>, CatalogError> {
        self.select(MATERIALS, None).await
    }

    async fn get_material(&self, id: &str) -> Result<Option<MaterialRecord>, CatalogError> {
        Ok(self.select(MATERIALS, Some(id)).await?.pop())
    }

    async fn insert_material(&self, record: MaterialRecord) -> Result<MaterialRecord, CatalogError> {
        record.validate()?;
        self.insert(MATERIALS, &record.id, &record).await
    }

    async fn update_material(&self, record: MaterialRecord) -> Result<MaterialRecord, CatalogError> {
        record.validate()?;
        let body = json!({
            "name": record.name,
            "description": record.description,
            "color": record.color,
            "roughness": record.roughness,
            "metallic": record.metallic,
            "updated_at": Utc::now(),
        });
        self.patch(MATERIALS, &record.id, body).await
    }

    async fn delete_material(&self, id: &str) -> Result<Option<MaterialRecord>, CatalogError> {
        self.remove(MATERIALS, id).await
    }
}
