//! Microsoft Graph adapter.
//!
//! Exchanges tenant/client credentials for a bearer token via the OAuth2
//! client-credentials grant, then issues the two Graph calls behind the
//! password-reset operation: a filtered user lookup and a password-profile
//! update. The token is memoized in a single slot for the client's
//! lifetime; the service swaps the whole client on configuration update,
//! which drops the memo.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::Mutex;
use validator::Validate;

use mcpbridge_core::Secret;

const DEFAULT_LOGIN_BASE: &str = "https://login.microsoftonline.com";
const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Graph adapter errors.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Token endpoint or Graph returned a non-success status.
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

    /// No directory user matched the lookup email.
    #[error("User with email {email} not found")]
    UserNotFound {
        /// Email the lookup filtered on.
        email: String,
    },

    /// Required credential fields are absent.
    #[error("{0}")]
    Config(String),
}

/// Credential fields for the Graph tenant.
#[derive(Debug, Clone, Default)]
pub struct GraphSettings {
    /// Azure AD tenant id.
    pub tenant_id: String,
    /// Application (client) id.
    pub client_id: String,
    /// Application client secret.
    pub client_secret: Secret,
}

impl GraphSettings {
    /// Build settings from persisted `M365_*` keys.
    #[must_use]
    pub fn from_map(vars: &BTreeMap<String, String>) -> Self {
        Self {
            tenant_id: vars.get("M365_TENANT_ID").cloned().unwrap_or_default(),
            client_id: vars.get("M365_CLIENT_ID").cloned().unwrap_or_default(),
            client_secret: Secret::new(
                vars.get("M365_CLIENT_SECRET").cloned().unwrap_or_default(),
            ),
        }
    }

    /// True iff all three required fields are non-empty.
    #[must_use]
    pub fn configured(&self) -> bool {
        !self.tenant_id.is_empty() && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Validated body of the password-reset endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PasswordResetRequest {
    /// Email of the family member whose password is reset.
    #[validate(email)]
    pub user_email: String,
    /// Password to set.
    #[validate(length(min = 1))]
    pub new_password: String,
    /// Require a password change at next sign-in (default true).
    #[serde(default = "default_force_change")]
    pub force_change: bool,
}

const fn default_force_change() -> bool {
    true
}

/// Microsoft Graph API client.
pub struct GraphClient {
    http: Client,
    settings: GraphSettings,
    login_base: String,
    graph_base: String,
    token: Mutex<Option<String>>,
}

impl GraphClient {
    /// Create a client against the production endpoints.
    #[must_use]
    pub fn new(settings: GraphSettings) -> Self {
        Self::with_endpoints(settings, DEFAULT_LOGIN_BASE, DEFAULT_GRAPH_BASE)
    }

    /// Create with custom login/Graph base URLs.
    #[must_use]
    pub fn with_endpoints(
        settings: GraphSettings,
        login_base: impl Into<String>,
        graph_base: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            settings,
            login_base: login_base.into(),
            graph_base: graph_base.into(),
            token: Mutex::new(None),
        }
    }

    /// The credential fields this client was built from.
    #[must_use]
    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// Acquire (or reuse) a bearer token via the client-credentials grant.
    ///
    /// Concurrent first calls may both hit the token endpoint; the last
    /// write wins and both tokens are valid.
    async fn bearer_token(&self) -> Result<String, GraphError> {
        if !self.settings.configured() {
            return Err(GraphError::Config(
                "M365 configuration is missing".to_string(),
            ));
        }

        if let Some(token) = self.token.lock().await.clone() {
            return Ok(token);
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base, self.settings.tenant_id
        );
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.expose()),
            ("scope", GRAPH_SCOPE),
        ];

        let response = self.http.post(&url).form(&params).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GraphError::Api { status, message });
        }

        let body: TokenResponse = response.json().await?;
        *self.token.lock().await = Some(body.access_token.clone());
        Ok(body.access_token)
    }

    /// Look up a directory user by primary email.
    async fn find_user_by_mail(&self, email: &str) -> Result<Option<GraphUser>, GraphError> {
        let token = self.bearer_token().await?;
        let url = format!("{}/v1.0/users", self.graph_base);
        let filter = format!("mail eq '{email}'");

        let response = self
            .http
            .get(&url)
            .query(&[("$filter", filter.as_str())])
            .bearer_auth(&token)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GraphError::Api { status, message });
        }

        let body: UserList = response.json().await?;
        Ok(body.value.into_iter().next())
    }

    /// Reset a family member's password.
    ///
    /// Issues the filtered lookup followed by a password-profile update.
    /// Exactly two Graph calls (plus at most one token exchange); no
    /// retries.
    ///
    /// # Errors
    ///
    /// `UserNotFound` when the lookup matches nobody; `Api` carrying the
    /// remote status and body for any non-success response at either step.
    pub async fn reset_password(&self, request: &PasswordResetRequest) -> Result<(), GraphError> {
        let user = self
            .find_user_by_mail(&request.user_email)
            .await?
            .ok_or_else(|| GraphError::UserNotFound {
                email: request.user_email.clone(),
            })?;

        let token = self.bearer_token().await?;
        let url = format!("{}/v1.0/users/{}", self.graph_base, user.id);
        let body = UserUpdate {
            password_profile: PasswordProfile {
                password: request.new_password.clone(),
                force_change_password_next_sign_in: request.force_change,
            },
        };

        let response = self
            .http
            .patch(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GraphError::Api { status, message });
        }

        Ok(())
    }
}

// Graph API wire types

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserList {
    #[serde(default)]
    value: Vec<GraphUser>,
}

/// Directory user as returned by the list call.
#[derive(Debug, Deserialize)]
pub struct GraphUser {
    /// Object id used for the update call.
    pub id: String,
    /// Display name, if present.
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserUpdate {
    password_profile: PasswordProfile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordProfile {
    password: String,
    force_change_password_next_sign_in: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> GraphSettings {
        GraphSettings {
            tenant_id: "tenant".to_string(),
            client_id: "client".to_string(),
            client_secret: Secret::from("secret"),
        }
    }

    fn reset_request(email: &str) -> PasswordResetRequest {
        PasswordResetRequest {
            user_email: email.to_string(),
            new_password: "N3w-Passw0rd".to_string(),
            force_change: true,
        }
    }

    async fn mount_token_endpoint(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=client"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({
                    "token_type": "Bearer",
                    "expires_in": 3599,
                    "access_token": "test-token"
                })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn reset_password_updates_the_matched_user() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .and(query_param("$filter", "mail eq 'jane.smith@example.com'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"id": "user-1", "displayName": "Jane Smith"}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path("/v1.0/users/user-1"))
            .and(body_string_contains("passwordProfile"))
            .and(body_string_contains("forceChangePasswordNextSignIn"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = GraphClient::with_endpoints(settings(), server.uri(), server.uri());
        client
            .reset_password(&reset_request("jane.smith@example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn zero_matches_yields_user_not_found() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        let client = GraphClient::with_endpoints(settings(), server.uri(), server.uri());
        let err = client
            .reset_password(&reset_request("nobody@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, GraphError::UserNotFound { .. }));
        assert!(err.to_string().contains("nobody@example.com"));
    }

    #[tokio::test]
    async fn token_endpoint_failure_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let client = GraphClient::with_endpoints(settings(), server.uri(), server.uri());
        let err = client
            .reset_password(&reset_request("jane.smith@example.com"))
            .await
            .unwrap_err();

        match err {
            GraphError::Api { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("invalid_client"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn token_is_memoized_across_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        let client = GraphClient::with_endpoints(settings(), server.uri(), server.uri());
        for _ in 0..3 {
            let _ = client.find_user_by_mail("a@example.com").await.unwrap();
        }
    }

    #[tokio::test]
    async fn unconfigured_client_fails_before_any_call() {
        let client = GraphClient::new(GraphSettings::default());
        let err = client
            .reset_password(&reset_request("jane.smith@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, GraphError::Config(_)));
        assert!(err.to_string().contains("M365 configuration is missing"));
    }

    #[test]
    fn force_change_defaults_to_true() {
        let request: PasswordResetRequest = serde_json::from_value(json!({
            "user_email": "jane.smith@example.com",
            "new_password": "pw"
        }))
        .unwrap();
        assert!(request.force_change);
    }

    #[test]
    fn invalid_email_fails_validation() {
        let request = reset_request("not-an-email");
        assert!(request.validate().is_err());
    }
}
