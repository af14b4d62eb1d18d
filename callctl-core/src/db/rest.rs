//! PostgREST backend
//!
//! Talks to `{url}/rest/v1/{table}` with the project key sent both as
//! `apikey` and as a bearer token, which is what the hosted gateway expects.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;

use super::{value_text, Filter, Order, Query, StoreError, TableStore};
use crate::config::Secret;
use crate::models::{Row, Table, ValidationError};

/// Error body returned by PostgREST
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl PostgrestError {
    fn into_store_error(self) -> StoreError {
        let mut message = self.message.unwrap_or_else(|| "unknown error".to_string());
        if let Some(details) = self.details.filter(|d| !d.is_empty()) {
            message = format!("{} ({})", message, details);
        }
        if let Some(hint) = self.hint.filter(|h| !h.is_empty()) {
            message = format!("{}; hint: {}", message, hint);
        }
        StoreError::Database {
            code: self.code,
            message,
        }
    }
}

/// PostgREST table store
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
}

impl RestStore {
    /// Create a store for a project URL (e.g. `https://abc.supabase.co`).
    pub fn new(url: &str, key: Secret) -> Result<Self, StoreError> {
        let invalid_key = || ValidationError::InvalidFormat {
            field: "api key",
            reason: "contains characters not allowed in an HTTP header",
        };

        let mut apikey = HeaderValue::from_str(key.expose()).map_err(|_| invalid_key())?;
        apikey.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", key.expose()))
            .map_err(|_| invalid_key())?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", apikey);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn filter_params(filter: &Filter) -> Vec<(String, String)> {
        filter
            .conditions()
            .iter()
            .map(|(column, value)| {
                let op = match value {
                    Value::Null => "is.null".to_string(),
                    other => format!("eq.{}", value_text(other)),
                };
                (column.as_str().to_string(), op)
            })
            .collect()
    }

    async fn send(request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<PostgrestError>(&body) {
            Ok(err) if err.code.is_some() || err.message.is_some() => Err(err.into_store_error()),
            _ => Err(StoreError::Status {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

/// Parse the total out of a `Content-Range` header (`0-9/42` or `*/42`).
pub(crate) fn parse_content_range_total(header: &str) -> Option<i64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl TableStore for RestStore {
    fn backend(&self) -> &'static str {
        "rest"
    }

    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>, StoreError> {
        let mut params = Self::filter_params(&query.filter);
        params.push(("select".into(), "*".into()));
        if let Some((column, order)) = &query.order_by {
            let dir = match order {
                Order::Asc => "asc",
                Order::Desc => "desc",
            };
            params.push(("order".into(), format!("{}.{}", column, dir)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".into(), limit.to_string()));
        }

        let response = Self::send(self.client.get(self.endpoint(table)).query(&params)).await?;
        Ok(response.json().await?)
    }

    async fn insert(&self, table: Table, row: &Row) -> Result<Row, StoreError> {
        let request = self
            .client
            .post(self.endpoint(table))
            .header("Prefer", "return=representation")
            .json(row);

        let rows: Vec<Row> = Self::send(request).await?.json().await?;
        rows.into_iter().next().ok_or_else(|| StoreError::Status {
            status: 201,
            body: "insert returned no representation".to_string(),
        })
    }

    async fn update(
        &self,
        table: Table,
        filter: &Filter,
        patch: &Row,
    ) -> Result<Vec<Row>, StoreError> {
        filter.require_non_empty()?;
        let request = self
            .client
            .patch(self.endpoint(table))
            .query(&Self::filter_params(filter))
            .header("Prefer", "return=representation")
            .json(patch);

        Ok(Self::send(request).await?.json().await?)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<u64, StoreError> {
        filter.require_non_empty()?;
        let request = self
            .client
            .delete(self.endpoint(table))
            .query(&Self::filter_params(filter))
            .header("Prefer", "return=representation");

        let rows: Vec<Row> = Self::send(request).await?.json().await?;
        Ok(rows.len() as u64)
    }

    async fn count(&self, table: Table, filter: &Filter) -> Result<i64, StoreError> {
        let mut params = Self::filter_params(filter);
        params.push(("select".into(), "*".into()));
        let request = self
            .client
            .head(self.endpoint(table))
            .query(&params)
            .header("Prefer", "count=exact");

        let response = Self::send(request).await?;
        let header = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        parse_content_range_total(&header).ok_or(StoreError::Status {
            status: response.status().as_u16(),
            body: format!("missing or unparsable Content-Range: '{}'", header),
        })
    }
}
