//! HTTP backend for the live-map feeds.

use std::time::Duration;

use async_trait::async_trait;
use rallypoint_core::{Credential, RawEventRecord, UserAddress};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::{BackendError, Feed, MapBackend};

/// Reqwest client for the backend's `/user/*` routes.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend client for the given base URL.
    ///
    /// `base_url` should be like `http://localhost:5000` (a trailing slash is
    /// trimmed). `timeout` bounds every request end to end.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a feed. Non-success statuses come back as `Err` except 404, which
    /// is returned as `Ok(None)` for the caller to interpret.
    async fn get_json(
        &self,
        feed: Feed,
        credential: &Credential,
    ) -> Result<Option<Value>, BackendError> {
        let url = format!("{}{}", self.base_url, feed.path());
        debug!(url = %url, %feed, "fetching feed");

        let transport = |e: reqwest::Error| BackendError::Transport {
            feed,
            message: e.to_string(),
        };
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, credential.bearer())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_status(feed, status.as_u16(), body));
        }

        let body = resp.text().await.map_err(transport)?;
        let value: Value = serde_json::from_str(&body).map_err(|e| BackendError::Decode {
            feed,
            message: e.to_string(),
        })?;
        Ok(Some(unwrap_envelope(value)))
    }

    async fn get_collection(
        &self,
        feed: Feed,
        credential: &Credential,
    ) -> Result<Vec<RawEventRecord>, BackendError> {
        let value = self.get_json(feed, credential).await?.ok_or_else(|| {
            BackendError::from_status(feed, StatusCode::NOT_FOUND.as_u16(), String::new())
        })?;
        let records = decode_records(feed, value)?;
        info!(%feed, count = records.len(), "pulled records");
        Ok(records)
    }
}

/// Decode a collection row by row so one malformed record cannot hide the
/// rest of the feed. Only a body that is not an array fails the feed.
fn decode_records(feed: Feed, value: Value) -> Result<Vec<RawEventRecord>, BackendError> {
    let rows: Vec<Value> = decode(feed, value)?;
    Ok(rows.into_iter().map(RawEventRecord::from_row).collect())
}

/// The backend wraps payloads as `{"status": .., "message": .., "data": ..}`;
/// older routes return the payload bare.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn decode<T: DeserializeOwned>(feed: Feed, value: Value) -> Result<T, BackendError> {
    serde_json::from_value(value).map_err(|e| BackendError::Decode {
        feed,
        message: e.to_string(),
    })
}

#[async_trait]
impl MapBackend for HttpBackend {
    async fn help_calls(
        &self,
        credential: &Credential,
    ) -> Result<Vec<RawEventRecord>, BackendError> {
        self.get_collection(Feed::HelpCalls, credential).await
    }

    async fn safe_statuses(
        &self,
        credential: &Credential,
    ) -> Result<Vec<RawEventRecord>, BackendError> {
        self.get_collection(Feed::SafeStatus, credential).await
    }

    async fn user_address(
        &self,
        credential: &Credential,
    ) -> Result<Option<UserAddress>, BackendError> {
        match self.get_json(Feed::Address, credential).await? {
            None | Some(Value::Null) => {
                info!("no registered address");
                Ok(None)
            }
            Some(value) => decode(Feed::Address, value).map(Some),
        }
    }
}
