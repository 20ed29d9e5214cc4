//! HTTP client for the remote data API

use crate::error::RestConfigError;
use raffle_core::remote::{Record, RemoteError, RemoteFuture, RemoteStore};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};

/// Rows requested per page by [`RestRemoteStore::select_all`]
///
/// Matches the default `max-rows` limit of a PostgREST deployment.
pub const DEFAULT_PAGE_SIZE: u64 = 1_000;

/// Remote store backed by a PostgREST-style HTTP API
#[derive(Clone)]
pub struct RestRemoteStore {
    client: Client,
    base_url: Url,
    api_key: String,
    page_size: u64,
}

impl std::fmt::Debug for RestRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRemoteStore")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl RestRemoteStore {
    /// Create a store for the given endpoint and access key
    ///
    /// # Errors
    ///
    /// Returns [`RestConfigError`] if either value is empty or the URL is not
    /// an absolute http(s) URL.
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, RestConfigError> {
        Self::with_client(Client::new(), endpoint, api_key)
    }

    /// Create a store that reuses an existing HTTP client
    ///
    /// # Errors
    ///
    /// Same as [`RestRemoteStore::new`].
    pub fn with_client(
        client: Client,
        endpoint: &str,
        api_key: &str,
    ) -> Result<Self, RestConfigError> {
        let endpoint = endpoint.trim();
        let api_key = api_key.trim();
        if endpoint.is_empty() {
            return Err(RestConfigError::MissingUrl);
        }
        if api_key.is_empty() {
            return Err(RestConfigError::MissingKey);
        }

        let base_url = Url::parse(&format!("{}/rest/v1/", endpoint.trim_end_matches('/')))
            .map_err(|e| RestConfigError::InvalidUrl(e.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(RestConfigError::InvalidUrl(format!(
                "unsupported scheme {}",
                base_url.scheme()
            )));
        }

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Request at most `rows` rows per page when reading whole tables
    #[must_use]
    pub fn with_page_size(mut self, rows: u64) -> Self {
        self.page_size = rows.max(1);
        self
    }

    fn table_url(&self, table: &str) -> Result<Url, RemoteError> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(RemoteError::Query(format!("Invalid table name: {table}")));
        }
        self.base_url
            .join(table)
            .map_err(|e| RemoteError::Query(e.to_string()))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(status = status.as_u16(), body = %body, "Remote API rejected request");
                Err(RemoteError::Status {
                    status: status.as_u16(),
                    message: body,
                })
            },
        }
    }
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`
fn parse_content_range_total(response: &Response) -> Result<u64, RemoteError> {
    let header = response
        .headers()
        .get("content-range")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| RemoteError::Serialization("missing Content-Range header".to_string()))?;

    header
        .rsplit_once('/')
        .and_then(|(_, total)| total.parse().ok())
        .ok_or_else(|| RemoteError::Serialization(format!("unreadable Content-Range: {header}")))
}

impl RemoteStore for RestRemoteStore {
    fn backend(&self) -> &'static str {
        "rest"
    }

    fn select_all<'a>(&'a self, table: &'a str) -> RemoteFuture<'a, Vec<Record>> {
        Box::pin(async move {
            let url = self.table_url(table)?;
            let mut rows = Vec::new();
            let mut offset = 0_u64;

            loop {
                let last = offset + self.page_size - 1;
                let response = self
                    .send(
                        self.client
                            .get(url.clone())
                            .query(&[("select", "*"), ("order", "id.asc")])
                            .header("Range-Unit", "items")
                            .header("Range", format!("{offset}-{last}"))
                            .header("Prefer", "count=exact"),
                    )
                    .await?;
                // Servers without exact counts leave the total as `*`
                let total = parse_content_range_total(&response).ok();

                let page = response
                    .json::<Vec<Record>>()
                    .await
                    .map_err(|e| RemoteError::Serialization(e.to_string()))?;
                let fetched = page.len() as u64;
                rows.extend(page);
                offset += fetched;

                let exhausted = total.is_some_and(|total| offset >= total);
                if exhausted || fetched < self.page_size {
                    break;
                }
                tracing::trace!(table, offset, total, "Fetching next page");
            }

            Ok(rows)
        })
    }

    fn count<'a>(&'a self, table: &'a str) -> RemoteFuture<'a, u64> {
        Box::pin(async move {
            let url = self.table_url(table)?;
            let response = self
                .send(
                    self.client
                        .head(url)
                        .query(&[("select", "id")])
                        .header("Prefer", "count=exact"),
                )
                .await?;

            parse_content_range_total(&response)
        })
    }

    fn upsert<'a>(&'a self, table: &'a str, id: &'a str, record: Record) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let url = self.table_url(table)?;
            let mut record = record;
            if let Some(fields) = record.as_object_mut() {
                fields.insert("id".to_string(), Record::String(id.to_string()));
            }

            self.send(
                self.client
                    .post(url)
                    .query(&[("on_conflict", "id")])
                    .header("Prefer", "resolution=merge-duplicates,return=minimal")
                    .json(&[record]),
            )
            .await?;

            tracing::trace!(table, id, "Upserted remote record");
            Ok(())
        })
    }

    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let url = self.table_url(table)?;
            self.send(
                self.client
                    .delete(url)
                    .query(&[("id", format!("eq.{id}"))])
                    .header("Prefer", "return=minimal"),
            )
            .await?;
            Ok(())
        })
    }

    fn delete_all<'a>(&'a self, table: &'a str) -> RemoteFuture<'a, u64> {
        Box::pin(async move {
            let url = self.table_url(table)?;
            let response = self
                .send(
                    self.client
                        .delete(url)
                        .query(&[("id", "not.is.null")])
                        .header("Prefer", "return=minimal,count=exact"),
                )
                .await?;

            let removed = parse_content_range_total(&response).unwrap_or_default();
            tracing::info!(table, rows = removed, "Cleared remote table");
            Ok(removed)
        })
    }
}
