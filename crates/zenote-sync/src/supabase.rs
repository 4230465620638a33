//! [`RemoteStore`] over Supabase's PostgREST and Storage HTTP APIs.
//!
//! Rows live in the `blocks` table with snake_case columns and `type` for
//! the block kind. Images go to object storage and are served from the
//! bucket's public URL.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::{debug, trace};
use zenote_types::{Block, BlockId, PageId};

use crate::store::{BlockUpdate, CreatedBlock, NewBlock, RemoteStore, StoreError};

const URL_VAR: &str = "SUPABASE_URL";
const KEY_VAR: &str = "SUPABASE_API_KEY";

/// Connection settings.
#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub api_key: String,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Read `SUPABASE_URL` and `SUPABASE_API_KEY`.
    pub fn from_env() -> Result<Self, StoreError> {
        let url = std::env::var(URL_VAR).map_err(|_| StoreError::Config(format!("{URL_VAR} not set")))?;
        let key = std::env::var(KEY_VAR).map_err(|_| StoreError::Config(format!("{KEY_VAR} not set")))?;
        Ok(Self::new(url, key))
    }
}

/// Supabase-backed store.
#[derive(Clone)]
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct UpdateBody<'a> {
    #[serde(flatten)]
    fields: &'a BlockUpdate,
    updated_at: DateTime<Utc>,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| StoreError::Config(format!("api key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| StoreError::Config(format!("api key: {e}")))?;
        headers.insert("apikey", key);
        headers.insert(header::AUTHORIZATION, bearer);

        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            base_url: config.url,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/blocks", self.base_url)
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/storage/v1/object/{bucket}/{key}", self.base_url)
    }

    /// Where an uploaded object is served from.
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{key}", self.base_url)
    }
}

/// Turn a non-2xx response into [`StoreError::Status`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteStore for SupabaseStore {
    async fn create_block(&self, block: &NewBlock) -> Result<CreatedBlock, StoreError> {
        trace!(page = %block.page_id, order = block.order, kind = %block.kind, "create block");
        let response = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=representation")
            .json(block)
            .send()
            .await?;
        let text = check(response).await?.text().await?;
        let rows: Vec<CreatedBlock> = serde_json::from_str(&text)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Rejected("create returned no row".into()))
    }

    async fn update_block(&self, update: &BlockUpdate) -> Result<(), StoreError> {
        trace!(block = %update.id, "update block");
        let body = UpdateBody {
            fields: update,
            updated_at: Utc::now(),
        };
        let response = self
            .client
            .patch(self.table_url())
            .query(&[("id", format!("eq.{}", update.id))])
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete_block(&self, id: &BlockId) -> Result<(), StoreError> {
        trace!(block = %id, "delete block");
        let response = self
            .client
            .delete(self.table_url())
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn fetch_blocks(&self, page_id: &PageId) -> Result<Vec<Block>, StoreError> {
        let response = self
            .client
            .get(self.table_url())
            .query(&[
                ("select", "*".to_string()),
                ("page_id", format!("eq.{page_id}")),
                ("order", "order.asc".to_string()),
            ])
            .send()
            .await?;
        let text = check(response).await?.text().await?;
        let mut blocks: Vec<Block> = serde_json::from_str(&text)?;
        blocks.sort_by_key(|b| b.order);
        debug!(page = %page_id, count = blocks.len(), "fetched blocks");
        Ok(blocks)
    }

    async fn upload_image(&self, path: &Path, bucket: &str, key: &str) -> Result<String, StoreError> {
        let bytes = tokio::fs::read(path).await?;
        let content_type = mime_guess::from_path(path).first_or_octet_stream();
        debug!(%bucket, %key, bytes = bytes.len(), %content_type, "upload image");
        let response = self
            .client
            .post(self.object_url(bucket, key))
            .header(header::CONTENT_TYPE, content_type.as_ref())
            .body(bytes)
            .send()
            .await?;
        check(response).await?;
        Ok(self.public_url(bucket, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SupabaseStore {
        SupabaseStore::new(SupabaseConfig::new("https://proj.supabase.co/", "anon-key")).unwrap()
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let store = store();
        assert_eq!(store.table_url(), "https://proj.supabase.co/rest/v1/blocks");
        assert_eq!(
            store.object_url("images", "p1/a.png"),
            "https://proj.supabase.co/storage/v1/object/images/p1/a.png"
        );
        assert_eq!(
            store.public_url("images", "p1/a.png"),
            "https://proj.supabase.co/storage/v1/object/public/images/p1/a.png"
        );
    }

    #[test]
    fn update_body_carries_timestamp_but_not_id() {
        let update = BlockUpdate {
            id: BlockId::new("b1"),
            page_id: PageId::new("p1"),
            kind: zenote_types::BlockKind::Text,
            content: "hi".into(),
            order: 2,
        };
        let body = serde_json::to_value(UpdateBody {
            fields: &update,
            updated_at: Utc::now(),
        })
        .unwrap();
        assert!(body.get("id").is_none());
        assert!(body.get("updated_at").is_some());
        assert_eq!(body["content"], "hi");
    }

    #[test]
    fn debug_redacts_key() {
        let config = SupabaseConfig::new("https://proj.supabase.co", "secret");
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn invalid_key_is_a_config_error() {
        let err = SupabaseStore::new(SupabaseConfig::new("https://x", "bad\nkey")).err();
        assert!(matches!(err, Some(StoreError::Config(_))));
    }
}
