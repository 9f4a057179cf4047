//! Tableau Server REST API client.
//!
//! Authentication uses a personal access token. Every [`TableauClient::connect`]
//! call performs a fresh sign-in and returns a [`Session`] holding the
//! credentials token; sessions are never pooled.
//!
//! All requests ask for JSON responses. Publishing uses `multipart/mixed`
//! bodies with an XML `request_payload` part, as the REST API requires.

use std::path::Path;

use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::tableau::error::{TableauError, TableauResult};
use crate::tableau::paths::extension_of;

/// REST API version used when the server does not report one.
pub const DEFAULT_API_VERSION: &str = "3.19";

/// Oldest API version that serves `/serverinfo`.
const SERVER_INFO_API_VERSION: &str = "2.4";

/// Header carrying the session token.
const AUTH_HEADER: &str = "X-Tableau-Auth";

/// Items requested per page when listing.
const PAGE_SIZE: u64 = 100;

/// Files larger than this are sent through a chunked upload session.
pub const SINGLE_REQUEST_LIMIT: u64 = 64 * 1024 * 1024;

/// Chunk size for upload sessions.
const UPLOAD_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Datasource file types the publish endpoint accepts.
pub const PUBLISHABLE_EXTENSIONS: [&str; 4] = ["hyper", "tds", "tdsx", "tde"];

// ==================== Wire Types ====================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    credentials: SignInCredentials<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInCredentials<'a> {
    personal_access_token_name: &'a str,
    personal_access_token_secret: &'a str,
    site: SiteRef<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SiteRef<'a> {
    content_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    credentials: IssuedCredentials,
}

#[derive(Debug, Deserialize)]
struct IssuedCredentials {
    token: String,
    site: IssuedSite,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssuedSite {
    id: String,
    #[serde(default)]
    content_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    server_info: ServerInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    rest_api_version: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Tableau sends counts as strings; accept numbers too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Count {
    Number(u64),
    Text(String),
}

impl Count {
    fn value(&self) -> u64 {
        match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    total_available: Count,
}

#[derive(Debug, Deserialize)]
struct ProjectsResponse {
    #[serde(default)]
    pagination: Option<Pagination>,
    #[serde(default)]
    projects: ProjectList,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectList {
    #[serde(default)]
    project: Vec<Project>,
}

#[derive(Debug, Deserialize)]
struct DatasourcesResponse {
    #[serde(default)]
    pagination: Option<Pagination>,
    #[serde(default)]
    datasources: DatasourceList,
}

#[derive(Debug, Default, Deserialize)]
struct DatasourceList {
    #[serde(default)]
    datasource: Vec<Datasource>,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    datasource: Datasource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileUploadResponse {
    file_upload: FileUpload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileUpload {
    upload_session_id: String,
}

/// A project on the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project LUID.
    pub id: String,
    /// Project name.
    pub name: String,
    /// Parent project LUID, for nested projects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_project_id: Option<String>,
}

/// Reference to the project owning a datasource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProjectRef {
    /// Project LUID.
    pub id: String,
    /// Project name.
    #[serde(default)]
    pub name: Option<String>,
}

/// A published datasource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Datasource {
    /// Datasource LUID.
    pub id: String,
    /// Datasource name.
    pub name: String,
    /// Owning project.
    #[serde(default)]
    pub project: Option<ProjectRef>,
    /// Datasource type ("hyper", "excel-direct", ...).
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Datasource {
    /// LUID of the owning project, if reported.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.id.as_str())
    }
}

trait Paged {
    type Item;
    fn total(&self) -> Option<u64>;
    fn into_items(self) -> Vec<Self::Item>;
}

impl Paged for ProjectsResponse {
    type Item = Project;
    fn total(&self) -> Option<u64> {
        self.pagination.as_ref().map(|p| p.total_available.value())
    }
    fn into_items(self) -> Vec<Project> {
        self.projects.project
    }
}

impl Paged for DatasourcesResponse {
    type Item = Datasource;
    fn total(&self) -> Option<u64> {
        self.pagination.as_ref().map(|p| p.total_available.value())
    }
    fn into_items(self) -> Vec<Datasource> {
        self.datasources.datasource
    }
}

// ==================== Client ====================

/// Entry point for signing in to Tableau Server.
#[derive(Clone)]
pub struct TableauClient {
    http: Client,
    base_url: String,
    site_id: String,
    token_name: String,
    token_secret: String,
}

impl std::fmt::Debug for TableauClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableauClient")
            .field("base_url", &self.base_url)
            .field("site_id", &self.site_id)
            .field("token_name", &self.token_name)
            .finish_non_exhaustive()
    }
}

impl TableauClient {
    /// Creates a client from the configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.server_base().to_string(),
            site_id: config.site_id.clone(),
            token_name: config.token_name.clone(),
            token_secret: config.token_secret.clone(),
        }
    }

    /// Signs in with the personal access token.
    ///
    /// # Errors
    ///
    /// Returns [`TableauError::Authentication`] if the server is unreachable
    /// or rejects the credentials.
    pub async fn connect(&self) -> TableauResult<Session> {
        info!(server = %self.base_url, site = %self.site_id, "Connecting to Tableau Server");
        let api_version = self.server_api_version().await;

        let url = format!("{}/api/{api_version}/auth/signin", self.base_url);
        let body = SignInRequest {
            credentials: SignInCredentials {
                personal_access_token_name: &self.token_name,
                personal_access_token_secret: &self.token_secret,
                site: SiteRef {
                    content_url: &self.site_id,
                },
            },
        };

        let response = self
            .http
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                TableauError::authentication(format!("cannot reach {}: {e}", self.base_url))
            })?;

        let response = check_status(response).await.map_err(|e| match e {
            TableauError::Api { message, .. } => TableauError::authentication(message),
            other => other,
        })?;
        let signed_in: SignInResponse = response
            .json()
            .await
            .map_err(|e| TableauError::authentication(format!("unexpected sign-in response: {e}")))?;

        info!(
            site_id = %signed_in.credentials.site.id,
            site = %signed_in.credentials.site.content_url,
            api_version = %api_version,
            "Connected to Tableau Server"
        );
        Ok(Session {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            api_version,
            token: signed_in.credentials.token,
            site_luid: signed_in.credentials.site.id,
        })
    }

    /// Asks the server for its newest REST API version.
    async fn server_api_version(&self) -> String {
        let url = format!("{}/api/{SERVER_INFO_API_VERSION}/serverinfo", self.base_url);
        let reply = async {
            let response = self
                .http
                .get(&url)
                .header(header::ACCEPT, "application/json")
                .send()
                .await?
                .error_for_status()?;
            response.json::<ServerInfoResponse>().await
        }
        .await;

        match reply {
            Ok(info) => info.server_info.rest_api_version,
            Err(e) => {
                debug!(error = %e, "Server version lookup failed, using default");
                DEFAULT_API_VERSION.to_string()
            }
        }
    }
}

// ==================== Session ====================

/// An authenticated session on one site.
pub struct Session {
    http: Client,
    base_url: String,
    api_version: String,
    token: String,
    site_luid: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("site_luid", &self.site_luid)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// REST API version in use.
    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Site LUID returned by sign-in.
    #[must_use]
    pub fn site_luid(&self) -> &str {
        &self.site_luid
    }

    fn site_url(&self, path: &str) -> String {
        format!(
            "{}/api/{}/sites/{}/{path}",
            self.base_url, self.api_version, self.site_luid
        )
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(AUTH_HEADER, &self.token)
            .header(header::ACCEPT, "application/json")
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> TableauResult<T> {
        let response = check_status(self.authed(builder).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn get_all<P>(&self, path: &str) -> TableauResult<Vec<P::Item>>
    where
        P: Paged + DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page = 1_u64;
        loop {
            let builder = self.http.get(self.site_url(path)).query(&[
                ("pageSize", PAGE_SIZE.to_string()),
                ("pageNumber", page.to_string()),
            ]);
            let response: P = self.send(builder).await?;
            let total = response.total();
            let batch = response.into_items();
            let fetched = batch.len();
            items.extend(batch);

            let exhausted = total.map_or(true, |total| page * PAGE_SIZE >= total);
            if fetched == 0 || exhausted {
                break;
            }
            page += 1;
        }
        debug!(path, count = items.len(), "Listed items");
        Ok(items)
    }

    /// Lists every project on the site, in server order.
    ///
    /// # Errors
    ///
    /// Returns an error if a request fails.
    pub async fn list_projects(&self) -> TableauResult<Vec<Project>> {
        self.get_all::<ProjectsResponse>("projects").await
    }

    /// Lists every datasource on the site, in server order.
    ///
    /// # Errors
    ///
    /// Returns an error if a request fails.
    pub async fn list_datasources(&self) -> TableauResult<Vec<Datasource>> {
        self.get_all::<DatasourcesResponse>("datasources").await
    }

    /// Publishes a datasource file, overwriting any datasource with the same
    /// name in the project.
    ///
    /// # Errors
    ///
    /// Returns an error if the file type is not publishable, the file cannot
    /// be read, or the server rejects the upload.
    pub async fn publish_datasource(
        &self,
        file: &Path,
        name: &str,
        project_id: &str,
    ) -> TableauResult<Datasource> {
        let datasource_type = extension_of(file);
        if !PUBLISHABLE_EXTENSIONS.contains(&datasource_type.as_str()) {
            return Err(TableauError::UnsupportedFormat {
                path: file.to_path_buf(),
                extension: datasource_type,
                supported: PUBLISHABLE_EXTENSIONS.map(|e| format!(".{e}")).join(", "),
            });
        }

        let size = tokio::fs::metadata(file)
            .await
            .map_err(|e| TableauError::io(file, e))?
            .len();
        let payload = publish_payload(name, project_id);
        let file_name = file
            .file_name()
            .map_or_else(|| format!("{name}.{datasource_type}"), |n| n.to_string_lossy().into_owned());

        info!(
            file = %file.display(),
            name,
            project_id,
            size,
            "Publishing datasource"
        );

        let mut query = vec![
            ("overwrite", "true".to_string()),
            ("datasourceType", datasource_type),
        ];
        let boundary = new_boundary();
        let body = if size > SINGLE_REQUEST_LIMIT {
            let session_id = self.upload_in_chunks(file).await?;
            query.push(("uploadSessionId", session_id));
            multipart_body(&boundary, &[Part::xml("request_payload", &payload)])
        } else {
            let data = tokio::fs::read(file)
                .await
                .map_err(|e| TableauError::io(file, e))?;
            multipart_body(
                &boundary,
                &[
                    Part::xml("request_payload", &payload),
                    Part::file("tableau_datasource", &file_name, &data),
                ],
            )
        };

        let builder = self
            .http
            .post(self.site_url("datasources"))
            .query(&query)
            .header(header::CONTENT_TYPE, multipart_content_type(&boundary))
            .body(body);
        let published: PublishResponse = self.send(builder).await?;

        info!(
            id = %published.datasource.id,
            name = %published.datasource.name,
            "Published datasource"
        );
        Ok(published.datasource)
    }

    /// Sends a large file through an upload session; returns the session id.
    async fn upload_in_chunks(&self, file: &Path) -> TableauResult<String> {
        let started: FileUploadResponse = self.send(self.http.post(self.site_url("fileUploads"))).await?;
        let session_id = started.file_upload.upload_session_id;
        debug!(session_id = %session_id, "Started file upload session");

        let mut reader = tokio::fs::File::open(file)
            .await
            .map_err(|e| TableauError::io(file, e))?;
        let mut chunk = vec![0_u8; UPLOAD_CHUNK_SIZE];
        let mut chunks = 0_usize;
        loop {
            let filled = read_chunk(&mut reader, &mut chunk)
                .await
                .map_err(|e| TableauError::io(file, e))?;
            if filled == 0 {
                break;
            }

            let boundary = new_boundary();
            let body = multipart_body(
                &boundary,
                &[
                    Part::xml("request_payload", ""),
                    Part::file("tableau_file", "file", &chunk[..filled]),
                ],
            );
            let builder = self
                .http
                .put(self.site_url(&format!("fileUploads/{session_id}")))
                .header(header::CONTENT_TYPE, multipart_content_type(&boundary))
                .body(body);
            let _: FileUploadResponse = self.send(builder).await?;
            chunks += 1;
        }

        debug!(session_id = %session_id, chunks, "Uploaded file in chunks");
        Ok(session_id)
    }

    /// Signs out, ending the session. Failures are only logged.
    pub async fn sign_out(self) {
        let url = format!("{}/api/{}/auth/signout", self.base_url, self.api_version);
        match self.authed(self.http.post(&url)).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Signed out of Tableau Server");
            }
            Ok(response) => warn!(status = %response.status(), "Sign-out was rejected"),
            Err(e) => warn!(error = %e, "Error during sign-out"),
        }
    }
}

/// Turns a non-success response into [`TableauError::Api`].
async fn check_status(response: Response) -> TableauResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body).map_or_else(
        |_| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        },
        |parsed| {
            let error = parsed.error;
            let text = [error.summary, error.detail]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(": ");
            match error.code {
                Some(code) => format!("{text} (code {code})"),
                None => text,
            }
        },
    );
    Err(TableauError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn read_chunk(reader: &mut tokio::fs::File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

// ==================== Multipart ====================

/// One part of a `multipart/mixed` body.
struct Part<'a> {
    name: &'a str,
    file_name: Option<&'a str>,
    content_type: &'a str,
    data: &'a [u8],
}

impl<'a> Part<'a> {
    fn xml(name: &'a str, xml: &'a str) -> Self {
        Self {
            name,
            file_name: None,
            content_type: "text/xml",
            data: xml.as_bytes(),
        }
    }

    const fn file(name: &'a str, file_name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            file_name: Some(file_name),
            content_type: "application/octet-stream",
            data,
        }
    }
}

fn new_boundary() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/mixed; boundary={boundary}")
}

fn multipart_body(boundary: &str, parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        let disposition = match part.file_name {
            Some(file_name) => format!(
                "Content-Disposition: name=\"{}\"; filename=\"{}\"\r\n",
                part.name,
                file_name.replace('"', "")
            ),
            None => format!("Content-Disposition: name=\"{}\"\r\n", part.name),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

fn publish_payload(name: &str, project_id: &str) -> String {
    format!(
        "<tsRequest><datasource name=\"{}\"><project id=\"{}\"/></datasource></tsRequest>",
        escape_xml(name),
        escape_xml(project_id)
    )
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
