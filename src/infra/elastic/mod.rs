//! Elasticsearch adapter for the search and indexer ports.

mod query;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use reqwest::{Client, RequestBuilder, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use crate::application::ports::{
    EventIndexer, SearchError, SearchPage, SearchPort, SnapshotFetch, SnapshotPage, StatsSummary,
};
use crate::domain::events::{ErrorEvent, EventItem, TermBucket, UNKNOWN_MEMBER};
use crate::domain::filters::{NormalizedFilters, StatsFilters};
use crate::infra::error::InfraError;

const METRIC_SEARCH_REQUEST_MS: &str = "insights_search_request_ms";
const MAX_ERROR_BODY: usize = 512;

pub struct ElasticsearchEngine {
    client: Client,
    base_url: Url,
    index: String,
}

impl ElasticsearchEngine {
    pub fn new(
        mut base_url: Url,
        index: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::search(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url,
            index: index.into(),
        })
    }

    /// Create the index with explicit mappings unless it already exists.
    pub async fn ensure_index(&self) -> Result<(), InfraError> {
        let url = self
            .url(&self.index)
            .map_err(|err| InfraError::search(err.to_string()))?;
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|err| InfraError::search(format!("index lookup failed: {err}")))?;

        match response.status() {
            status if status.is_success() => {
                info!(index = %self.index, "elasticsearch index already exists");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                self.send::<Value>(self.client.put(url).json(&query::index_mapping()))
                    .await
                    .map_err(|err| InfraError::search(format!("index creation failed: {err}")))?;
                info!(index = %self.index, "created elasticsearch index");
                Ok(())
            }
            status => Err(InfraError::search(format!(
                "index lookup returned status {status}"
            ))),
        }
    }

    fn url(&self, path: &str) -> Result<Url, SearchError> {
        self.base_url.join(path).map_err(SearchError::transport)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SearchError> {
        let started = Instant::now();
        let response = request.send().await.map_err(SearchError::transport)?;
        histogram!(METRIC_SEARCH_REQUEST_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(SearchError::decode);
        }

        let mut message = response.text().await.unwrap_or_default();
        if message.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|index| message.is_char_boundary(*index))
                .unwrap_or(0);
            message.truncate(cut);
        }
        Err(SearchError::Engine {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SearchPort for ElasticsearchEngine {
    async fn search(&self, filters: &NormalizedFilters) -> Result<SearchPage, SearchError> {
        let url = self.url(&format!("{}/_search", self.index))?;
        let body: SearchBody = self
            .send(self.client.post(url).json(&query::search_body(filters)))
            .await?;

        Ok(SearchPage {
            total: body.hits.total.map_or(0, Total::value),
            items: body.hits.hits.into_iter().map(Hit::into_item).collect(),
        })
    }

    async fn stats(&self, filters: &StatsFilters) -> Result<StatsSummary, SearchError> {
        let url = self.url(&format!("{}/_search", self.index))?;
        let body: SearchBody = self
            .send(self.client.post(url).json(&query::stats_body(filters)))
            .await?;
        let aggregations = body.aggregations.unwrap_or_default();

        Ok(StatsSummary {
            top_browsers: aggregations.top_browsers.into_buckets(),
            top_error_messages: aggregations.top_error_messages.into_buckets(),
        })
    }

    async fn open_snapshot(&self, keep_alive: Duration) -> Result<String, SearchError> {
        let mut url = self.url(&format!("{}/_pit", self.index))?;
        url.query_pairs_mut()
            .append_pair("keep_alive", &query::keep_alive(keep_alive));
        let opened: PitOpened = self.send(self.client.post(url)).await?;
        debug!(index = %self.index, "opened point-in-time");
        Ok(opened.id)
    }

    async fn close_snapshot(&self, snapshot_id: &str) -> Result<(), SearchError> {
        let url = self.url("_pit")?;
        match self
            .send::<Value>(self.client.delete(url).json(&json!({ "id": snapshot_id })))
            .await
        {
            Ok(_) | Err(SearchError::Engine { status: 404, .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn fetch_after(&self, request: SnapshotFetch<'_>) -> Result<SnapshotPage, SearchError> {
        let url = self.url("_search")?;
        let body: SearchBody = self
            .send(self.client.post(url).json(&query::snapshot_body(&request)))
            .await
            .map_err(|err| match err {
                SearchError::Engine { status: 404, .. } => {
                    SearchError::SnapshotExpired(request.snapshot_id.to_string())
                }
                other => other,
            })?;

        let last_sort = body
            .hits
            .hits
            .last()
            .and_then(|hit| query::sort_tuple(&hit.sort));

        Ok(SnapshotPage {
            total: body.hits.total.map_or(0, Total::value),
            items: body.hits.hits.into_iter().map(Hit::into_item).collect(),
            last_sort,
            snapshot_id: body.pit_id,
        })
    }
}

#[async_trait]
impl EventIndexer for ElasticsearchEngine {
    async fn bulk_index(&self, events: &[ErrorEvent]) -> Result<(), SearchError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut url = self.url("_bulk")?;
        url.query_pairs_mut().append_pair("refresh", "true");
        let outcome: BulkOutcome = self
            .send(
                self.client
                    .post(url)
                    .header(header::CONTENT_TYPE, "application/x-ndjson")
                    .body(query::bulk_body(&self.index, events)),
            )
            .await?;

        if outcome.errors {
            let failures: Vec<&BulkItemResult> = outcome
                .items
                .iter()
                .filter_map(|item| item.index.as_ref())
                .filter(|result| result.error.is_some())
                .collect();
            let status = failures.first().map_or(500, |result| result.status);
            let reason = failures
                .first()
                .and_then(|result| result.error.as_ref())
                .map(Value::to_string)
                .unwrap_or_default();
            return Err(SearchError::Engine {
                status,
                message: format!("{} documents rejected: {reason}", failures.len()),
            });
        }

        debug!(index = %self.index, count = events.len(), "bulk indexed events");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PitOpened {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    hits: Hits,
    #[serde(default)]
    pit_id: Option<String>,
    #[serde(default)]
    aggregations: Option<Aggregations>,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    total: Option<Total>,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Total {
    Count(u64),
    Object { value: u64 },
}

impl Total {
    fn value(self) -> u64 {
        match self {
            Total::Count(value) | Total::Object { value } => value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: HitSource,
    #[serde(default)]
    sort: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HitSource {
    timestamp: Option<Value>,
    user_id: Option<String>,
    browser: Option<String>,
    url: Option<String>,
    error_message: Option<String>,
    stack_trace: Option<String>,
}

impl Hit {
    fn into_item(self) -> EventItem {
        let HitSource {
            timestamp,
            user_id,
            browser,
            url,
            error_message,
            stack_trace,
        } = self.source;
        EventItem {
            id: self.id,
            timestamp: match timestamp {
                Some(Value::String(text)) => text,
                Some(other) => other.to_string(),
                None => String::new(),
            },
            user_id,
            browser,
            url,
            error_message: error_message.unwrap_or_default(),
            stack_trace,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Aggregations {
    top_browsers: TermsAggregation,
    top_error_messages: TermsAggregation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TermsAggregation {
    buckets: Vec<RawBucket>,
}

impl TermsAggregation {
    fn into_buckets(self) -> Vec<TermBucket> {
        self.buckets
            .into_iter()
            .map(|bucket| TermBucket {
                key: match bucket.key {
                    Value::String(text) => text,
                    Value::Null => UNKNOWN_MEMBER.to_string(),
                    other => other.to_string(),
                },
                doc_count: bucket.doc_count,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawBucket {
    #[serde(default)]
    key: Value,
    doc_count: u64,
}

#[derive(Debug, Deserialize)]
struct BulkOutcome {
    errors: bool,
    #[serde(default)]
    items: Vec<BulkItem>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(default)]
    index: Option<BulkItemResult>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}
