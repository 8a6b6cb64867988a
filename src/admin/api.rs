//! Atlas administrative API client.
//!
//! Only two endpoints are used:
//!
//! - `POST {apiBase}/groups/{groupId}/databaseUsers`
//! - `DELETE {apiBase}/groups/{groupId}/databaseUsers/admin/{username}`
//!
//! The API authenticates with HTTP digest auth (API user + API key).

use super::RemoteAdminError;
use async_trait::async_trait;
use digest_auth::{AuthContext, HttpMethod};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Authentication database for every user the broker creates.
pub const ADMIN_DB: &str = "admin";

const READ_WRITE_ROLE: &str = "readWrite";

/// Atlas project the broker manages users in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTarget {
    pub api_base: String,
    pub group_id: String,
}

impl ApiTarget {
    pub fn new(api_base: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            group_id: group_id.into(),
        }
    }

    /// `{apiBase}/groups/{groupId}/databaseUsers`
    pub fn users_url(&self) -> Result<Url, RemoteAdminError> {
        self.url_with(&["groups", &self.group_id, "databaseUsers"])
    }

    /// `{apiBase}/groups/{groupId}/databaseUsers/admin/{username}`
    pub fn user_url(&self, username: &str) -> Result<Url, RemoteAdminError> {
        self.url_with(&["groups", &self.group_id, "databaseUsers", ADMIN_DB, username])
    }

    fn url_with(&self, segments: &[&str]) -> Result<Url, RemoteAdminError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| {
            RemoteAdminError::InvalidUrl(format!("'{}': {}", self.api_base, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                RemoteAdminError::InvalidUrl(format!("'{}' cannot be a base URL", self.api_base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleGrant {
    pub database_name: String,
    pub role_name: String,
}

/// Body of the create-user call.
///
/// Serializes as
/// `{"databaseName":"admin","roles":[{"databaseName":<db>,"roleName":"readWrite"}],"username":<u>,"password":<p>}`.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserPayload {
    pub database_name: String,
    pub roles: Vec<RoleGrant>,
    pub username: String,
    pub password: String,
}

impl DatabaseUserPayload {
    /// A user authenticating against `admin` with `readWrite` on `database`.
    pub fn read_write(database: &str, username: &str, password: &str) -> Self {
        Self {
            database_name: ADMIN_DB.to_string(),
            roles: vec![RoleGrant {
                database_name: database.to_string(),
                role_name: READ_WRITE_ROLE.to_string(),
            }],
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Request body bytes, fields in declaration order.
    pub fn to_body(&self) -> Result<Vec<u8>, RemoteAdminError> {
        serde_json::to_vec(self).map_err(RemoteAdminError::Encode)
    }
}

impl fmt::Debug for DatabaseUserPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseUserPayload")
            .field("database_name", &self.database_name)
            .field("roles", &self.roles)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Remote user management.
///
/// Implementations perform a single attempt; the gateway owns timeouts,
/// retries and cancellation.
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn create_database_user(
        &self,
        target: &ApiTarget,
        user: &DatabaseUserPayload,
    ) -> Result<(), RemoteAdminError>;

    async fn delete_database_user(
        &self,
        target: &ApiTarget,
        username: &str,
    ) -> Result<(), RemoteAdminError>;
}

/// Digest-authenticated HTTP client for the Atlas admin API.
pub struct AtlasApiClient {
    client: Client,
    api_user: String,
    api_key: String,
}

impl AtlasApiClient {
    /// Create a client with its own connection pool.
    ///
    /// `timeout` is a per-request ceiling for the underlying HTTP client; the
    /// gateway applies its own bound on top.
    pub fn new(
        api_user: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteAdminError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .user_agent(concat!("atlas-broker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteAdminError::transport("<client builder>", e))?;

        Ok(Self::with_client(client, api_user, api_key))
    }

    /// Use an already configured HTTP client.
    pub fn with_client(
        client: Client,
        api_user: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_user: api_user.into(),
            api_key: api_key.into(),
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &Url,
        body: Option<&[u8]>,
        authorization: Option<String>,
    ) -> Result<Response, RemoteAdminError> {
        let mut request = self
            .client
            .request(method, url.clone())
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_vec());
        }
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        request
            .send()
            .await
            .map_err(|e| RemoteAdminError::transport(url.as_str(), e))
    }

    /// Send a request, answering a digest challenge if the API issues one.
    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&[u8]>,
    ) -> Result<Response, RemoteAdminError> {
        let first = self.send_once(method.clone(), url, body, None).await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }

        // Without a challenge there is nothing to answer; surface the 401.
        let Some(challenge) = first
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        else {
            return Ok(first);
        };

        let mut prompt = digest_auth::parse(&challenge)
            .map_err(|e| RemoteAdminError::Auth(format!("unparseable challenge: {}", e)))?;

        let request_uri = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let context = AuthContext::new_with_method(
            self.api_user.as_str(),
            self.api_key.as_str(),
            request_uri.as_str(),
            body,
            HttpMethod::from(method.as_str()),
        );
        let answer = prompt
            .respond(&context)
            .map_err(|e| RemoteAdminError::Auth(e.to_string()))?;

        debug!("Answering digest challenge for {} {}", method, url);
        self.send_once(method, url, body, Some(answer.to_header_string()))
            .await
    }

    async fn expect_success(url: &Url, response: Response) -> Result<(), RemoteAdminError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response
            .text()
            .await
            .map_err(|e| RemoteAdminError::transport(url.as_str(), e))?;
        Err(RemoteAdminError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}

#[async_trait]
impl AdminApi for AtlasApiClient {
    async fn create_database_user(
        &self,
        target: &ApiTarget,
        user: &DatabaseUserPayload,
    ) -> Result<(), RemoteAdminError> {
        let url = target.users_url()?;
        let body = user.to_body()?;
        let response = self.send(Method::POST, &url, Some(&body)).await?;
        Self::expect_success(&url, response).await
    }

    async fn delete_database_user(
        &self,
        target: &ApiTarget,
        username: &str,
    ) -> Result<(), RemoteAdminError> {
        let url = target.user_url(username)?;
        let response = self.send(Method::DELETE, &url, None).await?;
        Self::expect_success(&url, response).await
    }
}
