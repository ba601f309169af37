//! Home Assistant todo adapter.
//!
//! Talks to the HA REST API for item CRUD and to the WebSocket API for the
//! event-driven fast path. Every REST call goes through a bounded retry with
//! exponential backoff; the WebSocket subscription reconnects without bound.

mod retry;
mod wire;
mod ws;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::models::Item;
use crate::sync::{EventSource, RemoteSource};
use crate::util::compact_text;

use retry::{retry as with_retry, DEFAULT_MAX_ATTEMPTS};
use wire::{
    build_add_item_data, build_get_items_data, build_remove_item_data, build_update_item_data,
    remote_item_to_model, ServiceCallResponse, DOMAIN_TODO, SERVICE_ADD_ITEM, SERVICE_GET_ITEMS,
    SERVICE_REMOVE_ITEM, SERVICE_UPDATE_ITEM,
};

/// Adapter over the Home Assistant REST and WebSocket APIs.
#[derive(Clone, Debug)]
pub struct HomeAssistantAdapter {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl HomeAssistantAdapter {
    /// Creates an adapter for the given base URL and long-lived access token.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        if !crate::util::is_http_url(base_url) {
            return Err(Error::Config(format!(
                "Home Assistant URL {base_url:?} must include http:// or https://"
            )));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Validates connectivity and the access token, with retry.
    pub async fn ping(&self, cancel: &CancelToken) -> Result<()> {
        with_retry(cancel, DEFAULT_MAX_ATTEMPTS, move || async move {
            let response = self
                .client
                .get(format!("{}/api/", self.base_url))
                .bearer_auth(&self.token)
                .send()
                .await?;
            self.check_status(response).await.map(drop)
        })
        .await
    }

    /// POSTs a service call. `return_response` requests a data payload
    /// (required for `todo.get_items`, rejected by the mutation services).
    async fn call_service(
        &self,
        service: &str,
        body: &Value,
        return_response: bool,
    ) -> Result<Option<ServiceCallResponse>> {
        let mut url = format!("{}/api/services/{DOMAIN_TODO}/{service}", self.base_url);
        if return_response {
            url.push_str("?return_response");
        }

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        let response = self.check_status(response).await?;

        if return_response {
            Ok(Some(response.json::<ServiceCallResponse>().await?))
        } else {
            Ok(None)
        }
    }

    /// Maps HTTP status codes to the error taxonomy: 401 is a credential
    /// failure (never retried), 400 carries an HA error message, anything
    /// else ≥ 300 is a remote error.
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Credential(
                "Home Assistant returned 401 Unauthorized — check ha_token".into(),
            ));
        }
        if status == reqwest::StatusCode::BAD_REQUEST {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            return Err(Error::Remote(body.message));
        }
        if status.as_u16() >= 300 {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(format!(
                "Home Assistant returned unexpected status {status}: {}",
                compact_text(&body)
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteSource for HomeAssistantAdapter {
    async fn get_items(&self, cancel: &CancelToken, entity_id: &str) -> Result<Vec<Item>> {
        let data = build_get_items_data(entity_id);
        let payload = &data;

        let response = with_retry(cancel, DEFAULT_MAX_ATTEMPTS, move || async move {
            self.call_service(SERVICE_GET_ITEMS, payload, true).await
        })
        .await?
        .unwrap_or_default();

        let entity = response.service_response.get(entity_id).ok_or_else(|| {
            Error::Remote(format!("no service response for entity {entity_id}"))
        })?;

        Ok(entity.items.iter().map(remote_item_to_model).collect())
    }

    async fn add_item(&self, cancel: &CancelToken, entity_id: &str, item: &Item) -> Result<()> {
        let data = build_add_item_data(entity_id, item);
        let payload = &data;
        with_retry(cancel, DEFAULT_MAX_ATTEMPTS, move || async move {
            self.call_service(SERVICE_ADD_ITEM, payload, false).await
        })
        .await?;
        Ok(())
    }

    async fn update_item(
        &self,
        cancel: &CancelToken,
        entity_id: &str,
        current_title: &str,
        item: &Item,
    ) -> Result<()> {
        let data = build_update_item_data(entity_id, current_title, item);
        let payload = &data;
        with_retry(cancel, DEFAULT_MAX_ATTEMPTS, move || async move {
            self.call_service(SERVICE_UPDATE_ITEM, payload, false).await
        })
        .await?;
        Ok(())
    }

    async fn remove_item(&self, cancel: &CancelToken, entity_id: &str, title: &str) -> Result<()> {
        let data = build_remove_item_data(entity_id, title);
        let payload = &data;
        with_retry(cancel, DEFAULT_MAX_ATTEMPTS, move || async move {
            self.call_service(SERVICE_REMOVE_ITEM, payload, false).await
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl EventSource for HomeAssistantAdapter {
    async fn connect(&self) -> Result<()> {
        ws::probe(&self.base_url, &self.token).await
    }

    async fn subscribe(
        &self,
        cancel: CancelToken,
        entity_ids: Vec<String>,
        events: mpsc::Sender<String>,
    ) -> Result<()> {
        ws::subscribe(&self.base_url, &self.token, &entity_ids, events, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_non_http_url() {
        let err = HomeAssistantAdapter::new("homeassistant.local:8123", "token").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn new_trims_trailing_slash() {
        let adapter = HomeAssistantAdapter::new("http://ha.local:8123/", "token").unwrap();
        assert_eq!(adapter.base_url, "http://ha.local:8123");
    }
}
