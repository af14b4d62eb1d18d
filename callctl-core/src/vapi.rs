//! Calling-platform REST client
//!
//! Read-only: assistants, phone numbers and calls.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, Secret, Settings};
use crate::webhook::VapiCall;

const DEFAULT_BASE_URL: &str = "https://api.vapi.ai";

/// Calling-API error type
#[derive(Debug, thiserror::Error)]
pub enum VapiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("calling API returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Voice assistant configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_message: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Provisioned phone number
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneNumber {
    pub id: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Calling-platform client
pub struct VapiClient {
    client: Client,
    api_key: Secret,
    base_url: String,
}

impl VapiClient {
    pub fn new(api_key: Secret) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: Secret, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create client from settings (VAPI_API_KEY, optional VAPI_BASE_URL)
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let key = settings.require_vapi_key()?.clone();
        Ok(match &settings.vapi_base_url {
            Some(url) => Self::with_base_url(key, url.clone()),
            None => Self::new(key),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, VapiError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "Calling API request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.api_key.expose())
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VapiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    pub async fn list_assistants(&self) -> Result<Vec<Assistant>, VapiError> {
        self.get("/assistant", &[]).await
    }

    pub async fn list_phone_numbers(&self) -> Result<Vec<PhoneNumber>, VapiError> {
        self.get("/phone-number", &[]).await
    }

    pub async fn list_calls(&self, limit: u32) -> Result<Vec<VapiCall>, VapiError> {
        self.get("/call", &[("limit", limit.to_string())]).await
    }

    pub async fn get_call(&self, id: &str) -> Result<VapiCall, VapiError> {
        self.get(&format!("/call/{}", urlencoding::encode(id)), &[]).await
    }
}
