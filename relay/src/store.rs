//! Call-metadata store.
//!
//! Every outbound call is registered with a free-text description of what the
//! assistant should do on it. The media-stream handler looks the description
//! up by call SID when the carrier connects the call audio.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const CALLS_TABLE: &str = "calls";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Call store configuration error: {0}")]
    ConfigurationError(String),
    #[error("Call store request failed: {0}")]
    NetworkError(String),
    #[error("Call store returned HTTP {status}: {message}")]
    ApiError { status: u16, message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CallStore: Send + Sync {
    /// Description registered for `call_sid`, `None` if the call is unknown.
    async fn description(&self, call_sid: &str) -> StoreResult<Option<String>>;

    async fn register(&self, call_sid: &str, description: &str) -> StoreResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CallRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    call_sid: Option<String>,
    description: Option<String>,
}

// =============================================================================
// Supabase
// =============================================================================

/// PostgREST-backed store over the `calls` table.
pub struct SupabaseCallStore {
    client: reqwest::Client,
    base_url: String,
    service_role: String,
}

impl SupabaseCallStore {
    pub fn new(url: &str, service_role: &str, client: reqwest::Client) -> StoreResult<Self> {
        if url.trim().is_empty() {
            return Err(StoreError::ConfigurationError(
                "Supabase URL is required".to_string(),
            ));
        }
        if service_role.trim().is_empty() {
            return Err(StoreError::ConfigurationError(
                "Supabase service role key is required".to_string(),
            ));
        }
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            service_role: service_role.to_string(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{CALLS_TABLE}", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_role)
            .bearer_auth(&self.service_role)
            .timeout(REQUEST_TIMEOUT)
    }
}

async fn check_status(response: reqwest::Response) -> StoreResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::ApiError {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl CallStore for SupabaseCallStore {
    async fn description(&self, call_sid: &str) -> StoreResult<Option<String>> {
        let filter = format!("eq.{call_sid}");
        let request = self
            .client
            .get(self.table_url())
            .query(&[("call_sid", filter.as_str()), ("select", "description")]);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;
        let records: Vec<CallRecord> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        debug!(call_sid = %call_sid, rows = records.len(), "Looked up call description");
        Ok(records.into_iter().find_map(|record| record.description))
    }

    async fn register(&self, call_sid: &str, description: &str) -> StoreResult<()> {
        let record = CallRecord {
            call_sid: Some(call_sid.to_string()),
            description: Some(description.to_string()),
        };
        let request = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=minimal")
            .json(&record);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;
        check_status(response).await?;

        debug!(call_sid = %call_sid, "Registered call description");
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local store for tests and runs without a database.
#[derive(Debug, Default)]
pub struct InMemoryCallStore {
    calls: RwLock<HashMap<String, String>>,
}

impl InMemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CallStore for InMemoryCallStore {
    async fn description(&self, call_sid: &str) -> StoreResult<Option<String>> {
        Ok(self.calls.read().get(call_sid).cloned())
    }

    async fn register(&self, call_sid: &str, description: &str) -> StoreResult<()> {
        self.calls
            .write()
            .insert(call_sid.to_string(), description.to_string());
        Ok(())
    }
}
