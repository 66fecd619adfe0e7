//! WebDAV connector over the trusted relay.
//!
//! The calling environment cannot originate WebDAV itself, so every
//! operation is proxied through a trusted HTTPS relay speaking a small
//! JSON protocol. The relay is stateless: each request carries the target
//! server's credentials alongside the operation payload, and the relay
//! performs the actual DAV exchange.
//!
//! This is the credential-family backend: `connect`/`test_connection`
//! attach and verify stored credentials; the OAuth-family operations keep
//! their fail-fast "not supported" default implementations from the
//! capability trait.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::provider::{
    CloudProvider, FileListPage, ProviderCredentials, ProviderError, ProviderResult, RemoteFile,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::WebdavError;

/// Per-request timeout against the relay
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// File descriptor in the relay protocol
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayFile {
    id: String,
    path: String,
    name: String,
    sha256: Option<String>,
    size: Option<u64>,
    is_folder: bool,
    modified_at: Option<String>,
}

impl RelayFile {
    fn into_remote(self) -> RemoteFile {
        RemoteFile {
            id: self.id,
            path: self.path,
            name: self.name,
            checksum: self.sha256,
            size: self.size,
            is_folder: self.is_folder,
            modified_at: self
                .modified_at
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayListResponse {
    #[serde(default)]
    files: Vec<RelayFile>,
    #[serde(default)]
    has_more: bool,
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a, T: Serialize> {
    target: &'a ProviderCredentials,
    #[serde(flatten)]
    payload: T,
}

/// WebDAV connector proxied through the relay
pub struct WebdavConnector {
    http_client: Arc<dyn HttpClient>,
    relay_base_url: String,
    credentials: RwLock<Option<ProviderCredentials>>,
}

impl WebdavConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, relay_base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            relay_base_url: relay_base_url.into(),
            credentials: RwLock::new(None),
        }
    }

    /// Connector over stored credentials
    pub fn with_credentials(
        http_client: Arc<dyn HttpClient>,
        relay_base_url: impl Into<String>,
        credentials: ProviderCredentials,
    ) -> Self {
        let connector = Self::new(http_client, relay_base_url);
        *connector
            .credentials
            .write()
            .expect("credential lock poisoned") = Some(credentials);
        connector
    }

    fn current_credentials(&self) -> Result<ProviderCredentials, WebdavError> {
        self.credentials
            .read()
            .expect("credential lock poisoned")
            .clone()
            .ok_or(WebdavError::NotConnected)
    }

    /// POST one relay operation; non-2xx statuses become [`WebdavError`].
    #[instrument(skip(self, payload), fields(operation = operation))]
    async fn relay_call<T: Serialize>(
        &self,
        operation: &str,
        payload: T,
    ) -> Result<HttpResponse, WebdavError> {
        let credentials = self.current_credentials()?;
        let body = serde_json::to_vec(&RelayRequest {
            target: &credentials,
            payload,
        })
        .map_err(|e| WebdavError::ParseError(e.to_string()))?;

        let request = HttpRequest::new(
            HttpMethod::Post,
            format!("{}/v1/{}", self.relay_base_url.trim_end_matches('/'), operation),
        )
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .body(Bytes::from(body))
        .timeout(REQUEST_TIMEOUT);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| WebdavError::Transport(e.to_string()))?;

        if response.is_success() {
            debug!(status = response.status, "Relay call succeeded");
            Ok(response)
        } else {
            Err(WebdavError::RelayError {
                status_code: response.status,
                message: response.text().unwrap_or_default(),
            })
        }
    }

    fn parse_json<T: serde::de::DeserializeOwned>(
        response: &HttpResponse,
    ) -> Result<T, WebdavError> {
        serde_json::from_slice(&response.body).map_err(|e| WebdavError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl CloudProvider for WebdavConnector {
    async fn is_authenticated(&self) -> bool {
        // Authenticated by presence of stored credentials; the last
        // successful test_connection is tracked on the Connection record.
        self.credentials
            .read()
            .expect("credential lock poisoned")
            .is_some()
    }

    async fn connect(&self, credentials: &ProviderCredentials) -> ProviderResult<()> {
        *self
            .credentials
            .write()
            .expect("credential lock poisoned") = Some(credentials.clone());
        self.test_connection().await
    }

    async fn test_connection(&self) -> ProviderResult<()> {
        self.relay_call("test", serde_json::json!({}))
            .await
            .map_err(ProviderError::from)?;
        Ok(())
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        *self
            .credentials
            .write()
            .expect("credential lock poisoned") = None;
        Ok(())
    }

    async fn list(&self, path: &str, cursor: Option<String>) -> ProviderResult<FileListPage> {
        let response = self
            .relay_call("list", serde_json::json!({ "path": path, "cursor": cursor }))
            .await
            .map_err(ProviderError::from)?;
        let list: RelayListResponse = Self::parse_json(&response).map_err(ProviderError::from)?;

        Ok(FileListPage {
            files: list.files.into_iter().map(RelayFile::into_remote).collect(),
            has_more: list.has_more,
            cursor: list.cursor,
        })
    }

    async fn get(&self, id: &str) -> ProviderResult<RemoteFile> {
        let response = self
            .relay_call("get", serde_json::json!({ "id": id }))
            .await
            .map_err(ProviderError::from)?;
        let file: RelayFile = Self::parse_json(&response).map_err(ProviderError::from)?;
        Ok(file.into_remote())
    }

    async fn get_by_path(&self, path: &str) -> ProviderResult<Option<RemoteFile>> {
        let result = self
            .relay_call("get-by-path", serde_json::json!({ "path": path }))
            .await;

        match result {
            Ok(response) => {
                let file: Option<RelayFile> =
                    Self::parse_json(&response).map_err(ProviderError::from)?;
                Ok(file.map(RelayFile::into_remote))
            }
            // Absence is a value, not an error
            Err(WebdavError::RelayError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, id: &str) -> ProviderResult<Bytes> {
        let response = self
            .relay_call("read", serde_json::json!({ "id": id }))
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
        let response = self
            .relay_call(
                "write",
                serde_json::json!({
                    "path": path,
                    "overwrite": overwrite,
                    "contentBase64": BASE64.encode(&content),
                }),
            )
            .await
            .map_err(ProviderError::from)?;
        let file: RelayFile = Self::parse_json(&response).map_err(ProviderError::from)?;
        Ok(file.into_remote())
    }

    async fn delete(&self, id: &str) -> ProviderResult<()> {
        self.relay_call("delete", serde_json::json!({ "id": id }))
            .await
            .map_err(ProviderError::from)?;
        Ok(())
    }

    async fn move_item(&self, id: &str, new_path: &str) -> ProviderResult<RemoteFile> {
        let response = self
            .relay_call("move", serde_json::json!({ "id": id, "newPath": new_path }))
            .await
            .map_err(ProviderError::from)?;
        let file: RelayFile = Self::parse_json(&response).map_err(ProviderError::from)?;
        Ok(file.into_remote())
    }

    async fn copy_item(&self, id: &str, new_path: &str) -> ProviderResult<RemoteFile> {
        let response = self
            .relay_call("copy", serde_json::json!({ "id": id, "newPath": new_path }))
            .await
            .map_err(ProviderError::from)?;
        let file: RelayFile = Self::parse_json(&response).map_err(ProviderError::from)?;
        Ok(file.into_remote())
    }

    async fn create_folder(&self, path: &str) -> ProviderResult<RemoteFile> {
        let response = self
            .relay_call("mkdir", serde_json::json!({ "path": path }))
            .await
            .map_err(ProviderError::from)?;
        let file: RelayFile = Self::parse_json(&response).map_err(ProviderError::from)?;
        Ok(file.into_remote())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::provider::ProviderErrorKind;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn credentials() -> ProviderCredentials {
        ProviderCredentials {
            endpoint_url: "https://dav.example.com".to_string(),
            username: "user".to_string(),
            secret: "pass".to_string(),
            private_key: None,
            base_path: Some("/remote.php/dav".to_string()),
        }
    }

    fn json_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn connector(http: MockHttp) -> WebdavConnector {
        WebdavConnector::with_credentials(
            Arc::new(http),
            "https://relay.daybook.app",
            credentials(),
        )
    }

    #[tokio::test]
    async fn test_oauth_operations_are_unsupported() {
        let connector = connector(MockHttp::new());

        let err = connector
            .build_authorization_url("http://localhost/cb", "state")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unsupported);

        let err = connector.refresh("token").await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_operations_without_credentials_fail_fast() {
        let connector = WebdavConnector::new(Arc::new(MockHttp::new()), "https://relay");
        assert!(!connector.is_authenticated().await);

        let err = connector.get_by_path("/Daybook/r1.json").await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_connect_runs_a_connection_test() {
        let mut http = MockHttp::new();
        http.expect_execute().times(1).returning(|req| {
            assert!(req.url.ends_with("/v1/test"));
            // Credentials travel to the relay with the operation
            let body = String::from_utf8(req.body.unwrap().to_vec()).unwrap();
            assert!(body.contains("dav.example.com"));
            Ok(json_response(200, r#"{"ok":true}"#))
        });

        let connector = WebdavConnector::new(Arc::new(http), "https://relay.daybook.app");
        connector.connect(&credentials()).await.unwrap();
        assert!(connector.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_bad_credentials_map_to_auth_error() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(401, "unauthorized")));

        let connector = connector(MockHttp::new());
        // Rebuild with the failing mock
        let connector = WebdavConnector::with_credentials(
            Arc::new(http),
            connector.relay_base_url.clone(),
            credentials(),
        );

        let err = connector.test_connection().await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_get_by_path_absent_is_none() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(404, "no such path")));

        let connector = connector(http);
        let result = connector.get_by_path("/Daybook/missing.json").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_get_by_path_found() {
        let mut http = MockHttp::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(json_response(
                200,
                r#"{"id":"dav-1","path":"/Daybook/r1.json","name":"r1.json",
                    "sha256":"abc","size":17,"isFolder":false,
                    "modifiedAt":"2026-08-06T10:00:00Z"}"#,
            ))
        });

        let connector = connector(http);
        let remote = connector
            .get_by_path("/Daybook/r1.json")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(remote.id, "dav-1");
        assert_eq!(remote.checksum.as_deref(), Some("abc"));
        assert!(remote.modified_at.is_some());
    }

    #[tokio::test]
    async fn test_write_sends_base64_content() {
        let mut http = MockHttp::new();
        http.expect_execute().times(1).returning(|req| {
            assert!(req.url.ends_with("/v1/write"));
            let body: serde_json::Value =
                serde_json::from_slice(&req.body.unwrap()).unwrap();
            assert_eq!(body["path"], "/Daybook/r1.json");
            assert_eq!(body["overwrite"], true);
            let decoded = BASE64
                .decode(body["contentBase64"].as_str().unwrap())
                .unwrap();
            assert_eq!(decoded, b"payload");

            Ok(json_response(
                200,
                r#"{"id":"dav-1","path":"/Daybook/r1.json","name":"r1.json","isFolder":false}"#,
            ))
        });

        let connector = connector(http);
        let remote = connector
            .write("/Daybook/r1.json", Bytes::from_static(b"payload"), true)
            .await
            .unwrap();
        assert_eq!(remote.id, "dav-1");
    }

    #[tokio::test]
    async fn test_read_returns_raw_bytes() {
        let mut http = MockHttp::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from_static(b"raw content"),
            })
        });

        let connector = connector(http);
        let content = connector.read("dav-1").await.unwrap();
        assert_eq!(&content[..], b"raw content");
    }
}
