//! ServiceNow Table API adapter.
//!
//! Every operation is a single authenticated call against the incident
//! table; the basic-auth pair is applied per request and never refreshed.
//! Wrong credentials surface at call time via the remote 401/403.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use validator::Validate;

use mcpbridge_core::Secret;

/// Table adapter errors.
#[derive(Error, Debug)]
pub enum SnowError {
    /// Remote API returned an unexpected status.
    #[error("API error: {status} - {message}")]
    Api {
        /// Remote HTTP status code.
        status: u16,
        /// Remote response body.
        message: String,
    },

    /// Network error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Required credential fields are absent.
    #[error("{0}")]
    Config(String),

    /// Response decoded but without the expected payload.
    #[error("Unexpected response shape: {0}")]
    Payload(String),
}

/// Credential fields for the ServiceNow instance.
#[derive(Debug, Clone, Default)]
pub struct SnowSettings {
    /// Instance host, e.g. `dev1234.service-now.com`.
    pub instance: String,
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: Secret,
}

impl SnowSettings {
    /// Build settings from persisted `SNOW_*` keys.
    #[must_use]
    pub fn from_map(vars: &BTreeMap<String, String>) -> Self {
        Self {
            instance: vars.get("SNOW_INSTANCE").cloned().unwrap_or_default(),
            username: vars.get("SNOW_USERNAME").cloned().unwrap_or_default(),
            password: Secret::new(vars.get("SNOW_PASSWORD").cloned().unwrap_or_default()),
        }
    }

    /// True iff the instance host is set.
    #[must_use]
    pub fn configured(&self) -> bool {
        !self.instance.is_empty()
    }
}

/// Validated body of the incident-create endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IncidentCreate {
    /// Short description shown in incident lists.
    #[validate(length(min = 1))]
    pub title: String,
    /// Full description.
    #[validate(length(min = 1))]
    pub description: String,
    /// ServiceNow priority value, e.g. `1`..`5`.
    #[validate(length(min = 1))]
    pub priority: String,
    /// Incident category.
    #[validate(length(min = 1))]
    pub category: String,
}

/// ServiceNow Table API client.
pub struct SnowClient {
    http: Client,
    settings: SnowSettings,
    base_url: Option<String>,
}

impl SnowClient {
    /// Create a client for the instance named in `settings`.
    #[must_use]
    pub fn new(settings: SnowSettings) -> Self {
        let base_url = settings
            .configured()
            .then(|| format!("https://{}/api/now", settings.instance));
        Self {
            http: Client::new(),
            settings,
            base_url,
        }
    }

    /// Create with a custom base URL in place of `https://{instance}/api/now`.
    #[must_use]
    pub fn with_base_url(settings: SnowSettings, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            settings,
            base_url: Some(base_url.into()),
        }
    }

    /// The credential fields this client was built from.
    #[must_use]
    pub fn settings(&self) -> &SnowSettings {
        &self.settings
    }

    fn base_url(&self) -> Result<&str, SnowError> {
        self.base_url
            .as_deref()
            .ok_or_else(|| SnowError::Config("ServiceNow configuration is missing".to_string()))
    }

    /// Create an incident and return its `sys_id`.
    ///
    /// One outbound POST; the Table API answers HTTP 201 on success, and
    /// anything else is surfaced with the remote status and body.
    ///
    /// # Errors
    ///
    /// `Config` when the instance is not set, `Api` for non-201 responses,
    /// `Payload` when the 201 body lacks `result.sys_id`.
    pub async fn create_incident(&self, incident: &IncidentCreate) -> Result<String, SnowError> {
        let url = format!("{}/table/incident", self.base_url()?);
        let payload = IncidentPayload {
            short_description: &incident.title,
            description: &incident.description,
            priority: &incident.priority,
            category: &incident.category,
        };

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.settings.username, Some(self.settings.password.expose()))
            .json(&payload)
            .send()
            .await?;
        if response.status().as_u16() != 201 {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SnowError::Api { status, message });
        }

        let body: TableResponse = response.json().await?;
        body.result
            .get("sys_id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SnowError::Payload("result.sys_id missing".to_string()))
    }

    /// Fetch an incident record by `sys_id`, returning the `result` object.
    ///
    /// # Errors
    ///
    /// `Config` when the instance is not set, `Api` for non-200 responses.
    pub async fn get_incident(&self, incident_id: &str) -> Result<serde_json::Value, SnowError> {
        let url = format!("{}/table/incident/{incident_id}", self.base_url()?);

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.settings.username, Some(self.settings.password.expose()))
            .send()
            .await?;
        if response.status().as_u16() != 200 {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SnowError::Api { status, message });
        }

        let body: TableResponse = response.json().await?;
        Ok(body.result)
    }
}

// Table API wire types

#[derive(Debug, Serialize)]
struct IncidentPayload<'a> {
    short_description: &'a str,
    description: &'a str,
    priority: &'a str,
    category: &'a str,
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    result: serde_json::Value,
}
