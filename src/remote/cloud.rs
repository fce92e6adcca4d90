//! Tenant REST API client
//!
//! Implements `ContentClient` against the analytics platform's REST API
//! (`/api/v1/spaces`, `/api/v1/data-connections`, `/api/v1/data-files`).
//! Authenticates with an API key sent as a bearer token.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::http_retry::{send_with_retry, HttpRetryConfig};
use super::{ContentClient, DataConnection, DataFile, RemoteError, Space};

const PAGE_LIMIT: u32 = 100;
/// Upper bound on followed `next` links for a single listing
const MAX_PAGES: usize = 1000;
const MAX_ERROR_LEN: usize = 300;

/// Connection settings for the tenant API
#[derive(Debug, Clone)]
pub struct CloudClientConfig {
    /// Tenant base URL, e.g. https://acme.eu.example-cloud.com
    pub tenant_url: Url,
    pub api_key: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
    pub retry: HttpRetryConfig,
}

/// Paginated list envelope
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    next: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct ApiSpace {
    id: String,
    name: String,
    #[serde(rename = "type")]
    space_type: Option<String>,
    description: Option<String>,
}

impl From<ApiSpace> for Space {
    fn from(s: ApiSpace) -> Self {
        Space {
            id: s.id,
            name: s.name,
            space_type: s.space_type,
            description: s.description.filter(|d| !d.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiConnection {
    id: String,
    #[serde(rename = "qName")]
    name: String,
    /// Empty string for personal connections
    #[serde(default)]
    space: Option<String>,
    #[serde(rename = "datasourceID", default)]
    datasource_id: Option<String>,
}

impl From<ApiConnection> for DataConnection {
    fn from(c: ApiConnection) -> Self {
        DataConnection {
            id: c.id,
            name: c.name,
            space_id: c.space.filter(|s| !s.is_empty()),
            datasource_id: c.datasource_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiStorageConnection {
    id: String,
    space_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiDataFile {
    id: String,
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    folder: bool,
    space_id: Option<String>,
    connection_id: Option<String>,
}

impl From<ApiDataFile> for DataFile {
    fn from(f: ApiDataFile) -> Self {
        DataFile {
            id: f.id,
            name: f.name,
            size: if f.folder { 0 } else { f.size },
            is_folder: f.folder,
            space_id: f.space_id,
            connection_id: f.connection_id,
        }
    }
}

/// Response body of create-style actions
#[derive(Debug, Deserialize)]
struct ApiCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEntry {
    title: Option<String>,
    detail: Option<String>,
}

#[derive(Serialize)]
struct JsonPatchOp<'a> {
    op: &'a str,
    path: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DuplicateConnectionRequest<'a> {
    data_connection_id: &'a str,
    space_id: &'a str,
    #[serde(rename = "qName", skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CopyRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    connection_id: Option<&'a str>,
}

/// Turn an error response into a readable message.
///
/// Prefers the structured `errors[].title/detail` list; falls back to the
/// raw body, truncated, and finally to the status reason.
fn sanitize_api_error(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        let parts: Vec<String> = parsed
            .errors
            .into_iter()
            .filter_map(|e| match (e.title, e.detail) {
                (Some(t), Some(d)) if !d.is_empty() => Some(format!("{}: {}", t, d)),
                (Some(t), _) => Some(t),
                (None, Some(d)) => Some(d),
                (None, None) => None,
            })
            .collect();
        if !parts.is_empty() {
            return parts.join("; ");
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
    }
    trimmed.chars().take(MAX_ERROR_LEN).collect()
}

/// Content client backed by the tenant REST API
pub struct CloudContentClient {
    config: CloudClientConfig,
    client: reqwest::Client,
}

impl CloudContentClient {
    pub fn new(config: CloudClientConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn bearer_header(&self) -> Result<HeaderValue, RemoteError> {
        let mut value =
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_key.expose_secret()))
                .map_err(|_| {
                    RemoteError::InvalidConfig("API key contains invalid characters".to_string())
                })?;
        value.set_sensitive(true);
        Ok(value)
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.config
            .tenant_url
            .join(path)
            .map_err(|e| RemoteError::InvalidConfig(format!("bad endpoint {}: {}", path, e)))
    }

    /// Map non-success responses to `RemoteError`
    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(
            status.as_u16(),
            sanitize_api_error(status, &body),
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, RemoteError> {
        debug!("GET {}", url);
        let request = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.bearer_header()?)
            .build()?;
        let response = send_with_retry(&self.client, request, &self.config.retry).await?;
        let response = Self::check(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<T, RemoteError> {
        debug!("{} {}", method, url);
        let response = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, self.bearer_header()?)
            .json(body)
            .send()
            .await?;
        let response = Self::check(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))
    }

    /// Follow `links.next.href` until the listing is exhausted
    async fn get_all_pages<T: DeserializeOwned>(&self, first: Url) -> Result<Vec<T>, RemoteError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(RemoteError::Parse(format!(
                    "listing did not terminate after {} pages",
                    MAX_PAGES
                )));
            }
            let page: Page<T> = self.get_json(url).await?;
            items.extend(page.data);
            if let Some(href) = page.links.and_then(|l| l.next).map(|n| n.href) {
                let url = Url::parse(&href).or_else(|_| self.endpoint(&href))?;
                next = Some(url);
            }
        }

        Ok(items)
    }

    fn with_query(mut url: Url, pairs: &[(&str, &str)]) -> Url {
        {
            let mut query = url.query_pairs_mut();
            for (k, v) in pairs {
                query.append_pair(k, v);
            }
        }
        url
    }
}

#[async_trait]
impl ContentClient for CloudContentClient {
    async fn list_spaces(&self) -> Result<Vec<Space>, RemoteError> {
        let limit = PAGE_LIMIT.to_string();
        let url = Self::with_query(
            self.endpoint("/api/v1/spaces")?,
            &[("limit", limit.as_str())],
        );
        let spaces: Vec<ApiSpace> = self.get_all_pages(url).await?;
        Ok(spaces.into_iter().map(Space::from).collect())
    }

    async fn get_space(&self, space_id: &str) -> Result<Space, RemoteError> {
        let url = self.endpoint(&format!(
            "/api/v1/spaces/{}",
            urlencoding::encode(space_id)
        ))?;
        let space: ApiSpace = self.get_json(url).await?;
        Ok(space.into())
    }

    async fn rename_space(&self, space_id: &str, new_name: &str) -> Result<Space, RemoteError> {
        let url = self.endpoint(&format!(
            "/api/v1/spaces/{}",
            urlencoding::encode(space_id)
        ))?;
        let patch = [JsonPatchOp {
            op: "replace",
            path: "/name",
            value: new_name,
        }];
        let space: ApiSpace = self.send_json(Method::PATCH, url, &patch[..]).await?;
        Ok(space.into())
    }

    async fn list_connections(
        &self,
        space_id: Option<&str>,
    ) -> Result<Vec<DataConnection>, RemoteError> {
        let limit = PAGE_LIMIT.to_string();
        let mut pairs = vec![("limit", limit.as_str())];
        if let Some(space) = space_id {
            pairs.push(("spaceId", space));
        }
        let url = Self::with_query(self.endpoint("/api/v1/data-connections")?, &pairs);
        let connections: Vec<ApiConnection> = self.get_all_pages(url).await?;
        Ok(connections.into_iter().map(DataConnection::from).collect())
    }

    async fn duplicate_connection(
        &self,
        source_id: &str,
        target_space_id: &str,
        new_name: Option<&str>,
    ) -> Result<String, RemoteError> {
        let url = self.endpoint("/api/v1/data-connections/actions/duplicate")?;
        let body = DuplicateConnectionRequest {
            data_connection_id: source_id,
            space_id: target_space_id,
            name: new_name,
        };
        let created: ApiCreated = self.send_json(Method::POST, url, &body).await?;
        Ok(created.id)
    }

    async fn resolve_file_storage_connection(
        &self,
        space_id: &str,
    ) -> Result<Option<String>, RemoteError> {
        let url = Self::with_query(
            self.endpoint("/api/v1/data-files/connections")?,
            &[("spaceId", space_id)],
        );
        let connections: Vec<ApiStorageConnection> = self.get_all_pages(url).await?;
        Ok(connections
            .into_iter()
            .find(|c| c.space_id.as_deref() == Some(space_id))
            .map(|c| c.id))
    }

    async fn list_files(
        &self,
        space_id: &str,
        include_folders: bool,
    ) -> Result<Vec<DataFile>, RemoteError> {
        let Some(connection_id) = self.resolve_file_storage_connection(space_id).await? else {
            return Ok(Vec::new());
        };

        let limit = PAGE_LIMIT.to_string();
        let url = Self::with_query(
            self.endpoint("/api/v1/data-files")?,
            &[
                ("connectionId", connection_id.as_str()),
                ("includeFolders", if include_folders { "true" } else { "false" }),
                ("limit", limit.as_str()),
            ],
        );
        let files: Vec<ApiDataFile> = self.get_all_pages(url).await?;
        Ok(files
            .into_iter()
            .map(DataFile::from)
            .filter(|f| f.space_id.as_deref().map_or(true, |s| s == space_id))
            .filter(|f| include_folders || !f.is_folder)
            .collect())
    }

    async fn copy_file(
        &self,
        source_id: &str,
        target_connection_id: Option<&str>,
        name: &str,
    ) -> Result<String, RemoteError> {
        let url = self.endpoint(&format!(
            "/api/v1/data-files/{}/actions/copy",
            urlencoding::encode(source_id)
        ))?;
        let body = CopyRequest {
            name,
            connection_id: target_connection_id,
        };
        let created: ApiCreated = self.send_json(Method::POST, url, &body).await?;
        Ok(created.id)
    }

    async fn copy_folder(
        &self,
        source_id: &str,
        target_connection_id: Option<&str>,
        name: &str,
    ) -> Result<String, RemoteError> {
        let url = self.endpoint(&format!(
            "/api/v1/data-files/folders/{}/actions/copy",
            urlencoding::encode(source_id)
        ))?;
        let body = CopyRequest {
            name,
            connection_id: target_connection_id,
        };
        let created: ApiCreated = self.send_json(Method::POST, url, &body).await?;
        Ok(created.id)
    }
}
