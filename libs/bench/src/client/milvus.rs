//! Milvus client over the RESTful v2 API.
//!
//! Every endpoint is a POST under `/v2/vectordb/` answering with
//! `{"code": 0, "data": ...}` on success and a non-zero code plus
//! `message` on failure. Request bodies are built by free functions so
//! they can be checked without a server.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::DatabaseClient;
use crate::schema::{
    CollectionSpec, CollectionStats, Hit, InsertBatch, LoadState, SearchHits, SearchRequest,
};

/// Name of the auto-generated primary key field.
pub const PRIMARY_FIELD: &str = "id";

/// Response wrapper shared by all v2 endpoints.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl Envelope {
    fn into_data(self, path: &str) -> Result<Value> {
        // Older 2.4 builds answer 200 instead of 0.
        if self.code != 0 && self.code != 200 {
            bail!(
                "{} failed with code {}: {}",
                path,
                self.code,
                self.message.as_deref().unwrap_or("no message")
            );
        }
        Ok(self.data.unwrap_or(Value::Null))
    }
}

pub struct MilvusClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl std::fmt::Debug for MilvusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MilvusClient")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl MilvusClient {
    /// Create a client for `endpoint` (e.g. `http://localhost:19530`).
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/vectordb/{}", self.endpoint, path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let url = self.url(path);
        debug!(url = %url, "POST");

        let mut req = self.http.post(&url).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let response = req
            .send()
            .await
            .with_context(|| format!("Failed to reach Milvus at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("{} returned HTTP {}: {}", path, status, text);
        }

        let envelope: Envelope = response
            .json()
            .await
            .with_context(|| format!("Invalid response body from {}", path))?;
        envelope.into_data(path)
    }
}

pub fn create_collection_body(spec: &CollectionSpec) -> Value {
    json!({
        "collectionName": spec.name,
        "schema": {
            "autoId": true,
            "enableDynamicField": false,
            "fields": [
                {
                    "fieldName": PRIMARY_FIELD,
                    "dataType": "Int64",
                    "isPrimary": true
                },
                {
                    "fieldName": spec.field,
                    "dataType": "FloatVector",
                    "elementTypeParams": { "dim": spec.dim.to_string() }
                }
            ]
        }
    })
}

pub fn insert_body(spec: &CollectionSpec, batch: &InsertBatch) -> Value {
    let rows: Vec<Value> = batch
        .vectors()
        .iter()
        .map(|v| {
            let mut row = Map::new();
            row.insert(spec.field.clone(), json!(v));
            Value::Object(row)
        })
        .collect();
    json!({
        "collectionName": spec.name,
        "data": rows
    })
}

pub fn index_body(spec: &CollectionSpec) -> Value {
    let params = if spec.index.index_type.is_clustered() {
        json!({ "nlist": spec.index.nlist })
    } else {
        json!({})
    };
    json!({
        "collectionName": spec.name,
        "indexParams": [
            {
                "fieldName": spec.field,
                "indexName": format!("{}_idx", spec.field),
                "metricType": spec.metric.as_str(),
                "indexType": spec.index.index_type.as_str(),
                "params": params
            }
        ]
    })
}

pub fn search_body(spec: &CollectionSpec, request: &SearchRequest, queries: &[Vec<f32>]) -> Value {
    let mut params = json!({});
    if spec.index.index_type.is_clustered() {
        params["nprobe"] = json!(request.nprobe);
    }
    json!({
        "collectionName": spec.name,
        "data": queries,
        "annsField": spec.field,
        "limit": request.topk,
        "outputFields": [PRIMARY_FIELD],
        "searchParams": {
            "metricType": spec.metric.as_str(),
            "params": params
        }
    })
}

fn parse_hit(value: &Value) -> Result<Hit> {
    let id = match &value[PRIMARY_FIELD] {
        Value::Number(n) => n.as_i64(),
        // Int64 ids are sometimes serialized as strings to survive JS clients.
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| anyhow!("search hit without a valid id: {}", value))?;
    let distance = value["distance"]
        .as_f64()
        .ok_or_else(|| anyhow!("search hit without a distance: {}", value))?;
    Ok(Hit {
        id,
        distance: distance as f32,
    })
}

/// Group search results per query.
///
/// Milvus returns either one list per query or a single flat list. A flat
/// list carries no query boundaries, so it is kept as one hit list; callers
/// that sent more than one query see the count mismatch.
pub fn parse_search_data(data: &Value, request: &SearchRequest) -> Result<SearchHits> {
    let items = data
        .as_array()
        .ok_or_else(|| anyhow!("search data is not an array: {}", data))?;

    if items.iter().all(Value::is_array) && !items.is_empty() {
        let per_query = items
            .iter()
            .map(|list| {
                list.as_array()
                    .into_iter()
                    .flatten()
                    .map(parse_hit)
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(SearchHits { per_query });
    }

    let hits = items.iter().map(parse_hit).collect::<Result<Vec<_>>>()?;
    if request.nq > 1 {
        debug!(nq = request.nq, hits = hits.len(), "flat search result for multiple queries");
    }
    Ok(SearchHits {
        per_query: vec![hits],
    })
}

/// Rows the server acknowledged for an insert.
fn parse_insert_count(data: &Value) -> Result<u64> {
    data["insertCount"]
        .as_u64()
        .ok_or_else(|| anyhow!("insert count missing from response: {}", data))
}

fn parse_load_state(data: &Value) -> Result<LoadState> {
    let state = data["loadState"]
        .as_str()
        .ok_or_else(|| anyhow!("load state missing from response: {}", data))?;
    match state {
        "LoadStateLoaded" => Ok(LoadState::Loaded),
        "LoadStateLoading" => {
            let progress = data["loadProgress"].as_u64().map(|p| p.min(100) as u8);
            Ok(LoadState::Loading(progress))
        }
        "LoadStateNotLoad" | "LoadStateNotExist" => Ok(LoadState::NotLoaded),
        other => bail!("unknown load state: {}", other),
    }
}

#[async_trait]
impl DatabaseClient for MilvusClient {
    fn backend_name(&self) -> &str {
        "milvus"
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        let data = self
            .post("collections/has", json!({ "collectionName": name }))
            .await?;
        data["has"]
            .as_bool()
            .ok_or_else(|| anyhow!("has_collection response missing 'has': {}", data))
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.post("collections/drop", json!({ "collectionName": name }))
            .await?;
        Ok(())
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        self.post("collections/create", create_collection_body(spec))
            .await?;
        Ok(())
    }

    async fn insert(&self, spec: &CollectionSpec, batch: &InsertBatch) -> Result<u64> {
        let data = self.post("entities/insert", insert_body(spec, batch)).await?;
        parse_insert_count(&data)
    }

    async fn flush(&self, names: &[&str]) -> Result<()> {
        for name in names {
            self.post("collections/flush", json!({ "collectionName": name }))
                .await?;
        }
        Ok(())
    }

    async fn get_stats(&self, name: &str) -> Result<CollectionStats> {
        let data = self
            .post("collections/get_stats", json!({ "collectionName": name }))
            .await?;
        let row_count = match &data["rowCount"] {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| anyhow!("get_stats response missing 'rowCount': {}", data))?;
        Ok(CollectionStats { row_count })
    }

    async fn create_index(&self, spec: &CollectionSpec) -> Result<()> {
        self.post("indexes/create", index_body(spec)).await?;
        Ok(())
    }

    async fn load_collection(&self, name: &str) -> Result<()> {
        self.post("collections/load", json!({ "collectionName": name }))
            .await?;
        Ok(())
    }

    async fn load_state(&self, name: &str) -> Result<LoadState> {
        let data = self
            .post("collections/get_load_state", json!({ "collectionName": name }))
            .await?;
        parse_load_state(&data)
    }

    async fn search(
        &self,
        spec: &CollectionSpec,
        request: &SearchRequest,
        queries: &[Vec<f32>],
    ) -> Result<SearchHits> {
        let data = self
            .post("entities/search", search_body(spec, request, queries))
            .await?;
        parse_search_data(&data, request)
    }
}
