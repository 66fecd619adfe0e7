//! Google Drive API v3 connector.
//!
//! Implements the [`CloudProvider`] capability contract for Google Drive.
//! Drive is object-id based with no native hierarchical paths, so every
//! path-taking operation walks the path segments, resolving (and on
//! write, creating) intermediate folders — O(depth) round trips, accepted.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::provider::{
    join_path, path_segments, split_path, CloudProvider, FileListPage, ProviderError,
    ProviderResult, RemoteFile, TokenGrant,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_auth::{OAuthConfig, OAuthFlowManager, OAuthTokens, PkceVerifier};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::GoogleDriveError;
use crate::types::{DriveFile, FilesListResponse, FOLDER_MIME_TYPE};

/// Google Drive API base URL
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload endpoint base URL
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Maximum results per listing page
const MAX_PAGE_SIZE: u32 = 1000;

/// Fields to request for file resources
const FILE_FIELDS: &str = "id,name,mimeType,size,modifiedTime,sha256Checksum,parents,trashed";

/// Retry attempts for rate-limited and 5xx responses
const MAX_RETRIES: u32 = 3;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Multipart boundary for metadata+content uploads
const UPLOAD_BOUNDARY: &str = "daybook_drive_upload";

/// Google Drive connector
///
/// One instance serves one connection's view of Drive. OAuth operations
/// delegate to [`OAuthFlowManager`]; file operations hit the Drive API
/// with exponential backoff on rate limiting and server errors.
pub struct GoogleDriveConnector {
    http_client: Arc<dyn HttpClient>,
    oauth: OAuthFlowManager,
    tokens: RwLock<Option<OAuthTokens>>,
    pending_verifier: Mutex<Option<PkceVerifier>>,
}

impl GoogleDriveConnector {
    /// Connector with no token set yet (pre-handshake)
    pub fn new(http_client: Arc<dyn HttpClient>, oauth_config: OAuthConfig) -> Self {
        Self {
            oauth: OAuthFlowManager::new(oauth_config, http_client.clone()),
            http_client,
            tokens: RwLock::new(None),
            pending_verifier: Mutex::new(None),
        }
    }

    /// Connector over a stored token set
    pub fn with_tokens(
        http_client: Arc<dyn HttpClient>,
        oauth_config: OAuthConfig,
        tokens: OAuthTokens,
    ) -> Self {
        let connector = Self::new(http_client, oauth_config);
        *connector.tokens.write().expect("token lock poisoned") = Some(tokens);
        connector
    }

    fn access_token(&self) -> Result<String, GoogleDriveError> {
        self.tokens
            .read()
            .expect("token lock poisoned")
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or(GoogleDriveError::NotAuthenticated)
    }

    fn store_tokens(&self, tokens: OAuthTokens) {
        *self.tokens.write().expect("token lock poisoned") = Some(tokens);
    }

    fn grant_from(tokens: &OAuthTokens) -> TokenGrant {
        let expires_in = tokens
            .time_until_expiry()
            .map(|d| d.num_seconds())
            .unwrap_or(0);
        TokenGrant {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_in,
            token_type: tokens.token_type.clone(),
        }
    }

    /// Escape a literal for a Drive query expression
    fn escape_query_term(term: &str) -> String {
        term.replace('\\', "\\\\").replace('\'', "\\'")
    }

    fn parse_timestamp(rfc3339: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(rfc3339)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Convert a Drive file resource, attaching the path the caller
    /// addressed it by (id-based lookups only know the leaf name).
    fn convert(file: &DriveFile, path: &str) -> RemoteFile {
        RemoteFile {
            id: file.id.clone(),
            path: path.to_string(),
            name: file.name.clone(),
            checksum: file.sha256_checksum.clone(),
            size: file.size.as_ref().and_then(|s| s.parse().ok()),
            is_folder: file.is_folder(),
            modified_at: file
                .modified_time
                .as_deref()
                .and_then(Self::parse_timestamp),
        }
    }

    /// Execute one API request with exponential backoff on 429/5xx.
    #[instrument(skip(self, body), fields(url = %url))]
    async fn api_request(
        &self,
        method: HttpMethod,
        url: String,
        body: Option<Bytes>,
        content_type: Option<&str>,
    ) -> Result<HttpResponse, GoogleDriveError> {
        let token = self.access_token()?;
        let mut attempt = 0;

        loop {
            let mut request = HttpRequest::new(method, url.clone())
                .bearer_token(token.as_str())
                .header("Accept", "application/json")
                .timeout(REQUEST_TIMEOUT);
            if let Some(content_type) = content_type {
                request = request.header("Content-Type", content_type);
            }
            if let Some(body) = &body {
                request = request.body(body.clone());
            }

            match self.http_client.execute(request).await {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, "API request succeeded");
                    return Ok(response);
                }
                Ok(response) if response.status == 429 || response.is_server_error() => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        warn!(
                            status = response.status,
                            attempts = attempt,
                            "API request failed after retries"
                        );
                        return Err(GoogleDriveError::ApiError {
                            status_code: response.status,
                            message: format!("Request failed after {} retries", attempt),
                        });
                    }
                    let backoff_ms = 100u64 * 2u64.pow(attempt);
                    warn!(
                        status = response.status,
                        attempt, backoff_ms, "API request throttled, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Ok(response) => {
                    return Err(GoogleDriveError::ApiError {
                        status_code: response.status,
                        message: response.text().unwrap_or_default(),
                    });
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        return Err(GoogleDriveError::Transport(e.to_string()));
                    }
                    let backoff_ms = 100u64 * 2u64.pow(attempt);
                    warn!(error = %e, attempt, backoff_ms, "API request failed, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    fn parse_json<T: serde::de::DeserializeOwned>(
        response: &HttpResponse,
    ) -> Result<T, GoogleDriveError> {
        serde_json::from_slice(&response.body)
            .map_err(|e| GoogleDriveError::ParseError(e.to_string()))
    }

    async fn get_drive_file(&self, id: &str) -> Result<DriveFile, GoogleDriveError> {
        let url = format!("{}/files/{}?fields={}", DRIVE_API_BASE, id, FILE_FIELDS);
        let response = self.api_request(HttpMethod::Get, url, None, None).await?;
        Self::parse_json(&response)
    }

    async fn query_files(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<FilesListResponse, GoogleDriveError> {
        let mut url = format!(
            "{}/files?q={}&pageSize={}&fields=nextPageToken,files({})",
            DRIVE_API_BASE,
            urlencoding::encode(query),
            MAX_PAGE_SIZE,
            FILE_FIELDS
        );
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        let response = self.api_request(HttpMethod::Get, url, None, None).await?;
        Self::parse_json(&response)
    }

    /// Find a direct child of `parent_id` by name
    async fn find_child(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<DriveFile>, GoogleDriveError> {
        let query = format!(
            "'{}' in parents and name = '{}' and trashed = false",
            Self::escape_query_term(parent_id),
            Self::escape_query_term(name)
        );
        let list = self.query_files(&query, None).await?;
        Ok(list.files.into_iter().next())
    }

    /// Resolve a full path by walking its segments from the Drive root.
    /// Each segment costs one round trip.
    async fn resolve_path(&self, path: &str) -> Result<Option<DriveFile>, GoogleDriveError> {
        let segments = path_segments(path);
        let mut current_id = "root".to_string();
        let mut resolved: Option<DriveFile> = None;

        for (index, segment) in segments.iter().enumerate() {
            let Some(child) = self.find_child(&current_id, segment).await? else {
                return Ok(None);
            };
            // Intermediate segments must be folders
            if index + 1 < segments.len() && !child.is_folder() {
                return Ok(None);
            }
            current_id = child.id.clone();
            resolved = Some(child);
        }

        Ok(resolved)
    }

    async fn create_drive_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<DriveFile, GoogleDriveError> {
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id],
        });
        let url = format!("{}/files?fields={}", DRIVE_API_BASE, FILE_FIELDS);
        let response = self
            .api_request(
                HttpMethod::Post,
                url,
                Some(Bytes::from(metadata.to_string())),
                Some("application/json"),
            )
            .await?;
        Self::parse_json(&response)
    }

    /// Resolve a folder path, creating missing segments.
    /// Returns the folder id ("root" for the namespace root).
    async fn ensure_folder_path(&self, path: &str) -> Result<String, GoogleDriveError> {
        let mut current_id = "root".to_string();
        for segment in path_segments(path) {
            current_id = match self.find_child(&current_id, segment).await? {
                Some(child) if child.is_folder() => child.id,
                Some(child) => {
                    return Err(GoogleDriveError::ApiError {
                        status_code: 409,
                        message: format!("{} exists and is not a folder", child.name),
                    })
                }
                None => {
                    info!(segment, "Creating missing folder segment");
                    self.create_drive_folder(&current_id, segment).await?.id
                }
            };
        }
        Ok(current_id)
    }

    fn multipart_body(metadata: &serde_json::Value, content: &[u8]) -> Bytes {
        let mut body = Vec::with_capacity(content.len() + 512);
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{}\r\n",
                UPLOAD_BOUNDARY, metadata
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Type: application/octet-stream\r\n\r\n",
                UPLOAD_BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--", UPLOAD_BOUNDARY).as_bytes());
        Bytes::from(body)
    }

    async fn upload_new(
        &self,
        parent_id: &str,
        name: &str,
        content: Bytes,
    ) -> Result<DriveFile, GoogleDriveError> {
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id],
        });
        let url = format!(
            "{}/files?uploadType=multipart&fields={}",
            DRIVE_UPLOAD_BASE, FILE_FIELDS
        );
        let body = Self::multipart_body(&metadata, &content);
        let content_type = format!("multipart/related; boundary={}", UPLOAD_BOUNDARY);
        let response = self
            .api_request(HttpMethod::Post, url, Some(body), Some(content_type.as_str()))
            .await?;
        Self::parse_json(&response)
    }

    async fn upload_existing(
        &self,
        file_id: &str,
        content: Bytes,
    ) -> Result<DriveFile, GoogleDriveError> {
        let url = format!(
            "{}/files/{}?uploadType=media&fields={}",
            DRIVE_UPLOAD_BASE, file_id, FILE_FIELDS
        );
        let response = self
            .api_request(
                HttpMethod::Patch,
                url,
                Some(content),
                Some("application/octet-stream"),
            )
            .await?;
        Self::parse_json(&response)
    }
}

#[async_trait]
impl CloudProvider for GoogleDriveConnector {
    async fn is_authenticated(&self) -> bool {
        self.tokens
            .read()
            .expect("token lock poisoned")
            .as_ref()
            .is_some_and(|t| !t.is_expired())
    }

    async fn build_authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
    ) -> ProviderResult<String> {
        let (url, verifier) = self
            .oauth
            .build_auth_url(redirect_uri, state)
            .map_err(|e| ProviderError::auth(e.to_string()))?;
        *self
            .pending_verifier
            .lock()
            .expect("verifier lock poisoned") = Some(verifier);
        Ok(url)
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> ProviderResult<TokenGrant> {
        let verifier = self
            .pending_verifier
            .lock()
            .expect("verifier lock poisoned")
            .take()
            .ok_or_else(|| {
                ProviderError::configuration("No authorization flow in progress")
            })?;

        let tokens = self
            .oauth
            .exchange_code(code, redirect_uri, &verifier)
            .await
            .map_err(|e| ProviderError::auth(e.to_string()))?;

        let grant = Self::grant_from(&tokens);
        self.store_tokens(tokens);
        Ok(grant)
    }

    async fn refresh(&self, refresh_token: &str) -> ProviderResult<TokenGrant> {
        let tokens = self
            .oauth
            .refresh_access_token(refresh_token)
            .await
            .map_err(|e| ProviderError::auth(e.to_string()))?;

        let grant = Self::grant_from(&tokens);
        self.store_tokens(tokens);
        Ok(grant)
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        *self.tokens.write().expect("token lock poisoned") = None;
        *self
            .pending_verifier
            .lock()
            .expect("verifier lock poisoned") = None;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, path: &str, cursor: Option<String>) -> ProviderResult<FileListPage> {
        let folder_id = if path_segments(path).is_empty() {
            "root".to_string()
        } else {
            match self.resolve_path(path).await.map_err(ProviderError::from)? {
                Some(folder) if folder.is_folder() => folder.id,
                _ => {
                    return Err(ProviderError::not_found(format!(
                        "No folder at {}",
                        path
                    )))
                }
            }
        };

        let query = format!(
            "'{}' in parents and trashed = false",
            Self::escape_query_term(&folder_id)
        );
        let list = self
            .query_files(&query, cursor.as_deref())
            .await
            .map_err(ProviderError::from)?;

        let files = list
            .files
            .iter()
            .map(|f| Self::convert(f, &join_path(path, &f.name)))
            .collect();

        Ok(FileListPage {
            files,
            has_more: list.next_page_token.is_some(),
            cursor: list.next_page_token,
        })
    }

    async fn get(&self, id: &str) -> ProviderResult<RemoteFile> {
        let file = self.get_drive_file(id).await.map_err(ProviderError::from)?;
        let path = format!("/{}", file.name);
        Ok(Self::convert(&file, &path))
    }

    #[instrument(skip(self))]
    async fn get_by_path(&self, path: &str) -> ProviderResult<Option<RemoteFile>> {
        let resolved = self.resolve_path(path).await.map_err(ProviderError::from)?;
        Ok(resolved.map(|f| Self::convert(&f, path)))
    }

    async fn read(&self, id: &str) -> ProviderResult<Bytes> {
        let url = format!("{}/files/{}?alt=media", DRIVE_API_BASE, id);
        let response = self
            .api_request(HttpMethod::Get, url, None, None)
            .await
            .map_err(ProviderError::from)?;
        Ok(response.body)
    }

    #[instrument(skip(self, content), fields(size = content.len()))]
    async fn write(
        &self,
        path: &str,
        content: Bytes,
        overwrite: bool,
    ) -> ProviderResult<RemoteFile> {
        let (parent_path, name) = split_path(path);
        let parent_id = self
            .ensure_folder_path(&parent_path)
            .await
            .map_err(ProviderError::from)?;

        let existing = self
            .find_child(&parent_id, &name)
            .await
            .map_err(ProviderError::from)?;

        let file = match existing {
            Some(existing) if overwrite => self
                .upload_existing(&existing.id, content)
                .await
                .map_err(ProviderError::from)?,
            Some(_) => {
                return Err(ProviderError::protocol(format!("{} already exists", path)));
            }
            None => self
                .upload_new(&parent_id, &name, content)
                .await
                .map_err(ProviderError::from)?,
        };

        Ok(Self::convert(&file, path))
    }

    async fn delete(&self, id: &str) -> ProviderResult<()> {
        let url = format!("{}/files/{}", DRIVE_API_BASE, id);
        self.api_request(HttpMethod::Delete, url, None, None)
            .await
            .map_err(ProviderError::from)?;
        Ok(())
    }

    async fn move_item(&self, id: &str, new_path: &str) -> ProviderResult<RemoteFile> {
        let (parent_path, name) = split_path(new_path);
        let new_parent = self
            .ensure_folder_path(&parent_path)
            .await
            .map_err(ProviderError::from)?;
        let current = self.get_drive_file(id).await.map_err(ProviderError::from)?;

        let url = format!(
            "{}/files/{}?addParents={}&removeParents={}&fields={}",
            DRIVE_API_BASE,
            id,
            urlencoding::encode(&new_parent),
            urlencoding::encode(&current.parents.join(",")),
            FILE_FIELDS
        );
        let body = serde_json::json!({ "name": name }).to_string();
        let response = self
            .api_request(
                HttpMethod::Patch,
                url,
                Some(Bytes::from(body)),
                Some("application/json"),
            )
            .await
            .map_err(ProviderError::from)?;

        let file: DriveFile = Self::parse_json(&response).map_err(ProviderError::from)?;
        Ok(Self::convert(&file, new_path))
    }

    async fn copy_item(&self, id: &str, new_path: &str) -> ProviderResult<RemoteFile> {
        let (parent_path, name) = split_path(new_path);
        let parent_id = self
            .ensure_folder_path(&parent_path)
            .await
            .map_err(ProviderError::from)?;

        let url = format!("{}/files/{}/copy?fields={}", DRIVE_API_BASE, id, FILE_FIELDS);
        let body = serde_json::json!({ "name": name, "parents": [parent_id] }).to_string();
        let response = self
            .api_request(
                HttpMethod::Post,
                url,
                Some(Bytes::from(body)),
                Some("application/json"),
            )
            .await
            .map_err(ProviderError::from)?;

        let file: DriveFile = Self::parse_json(&response).map_err(ProviderError::from)?;
        Ok(Self::convert(&file, new_path))
    }

    async fn create_folder(&self, path: &str) -> ProviderResult<RemoteFile> {
        let folder_id = self
            .ensure_folder_path(path)
            .await
            .map_err(ProviderError::from)?;
        let file = self
            .get_drive_file(&folder_id)
            .await
            .map_err(ProviderError::from)?;
        Ok(Self::convert(&file, path))
    }
}
