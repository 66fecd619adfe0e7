//! Serde DTOs for Google Drive API v3 responses.

use serde::Deserialize;

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// A file resource from the Drive API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Drive reports size as a decimal string
    pub size: Option<String>,
    pub modified_time: Option<String>,
    pub sha256_checksum: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub trashed: bool,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// Response of `GET /files`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_file_resource() {
        let json = r#"{
            "id": "file1",
            "name": "r1.json",
            "mimeType": "application/json",
            "size": "42",
            "modifiedTime": "2026-08-06T10:00:00.000Z",
            "sha256Checksum": "abc123",
            "parents": ["folder1"],
            "trashed": false
        }"#;

        let file: DriveFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.id, "file1");
        assert_eq!(file.sha256_checksum.as_deref(), Some("abc123"));
        assert!(!file.is_folder());
    }

    #[test]
    fn test_deserialize_folder_with_missing_optionals() {
        let json = r#"{
            "id": "folder1",
            "name": "journal",
            "mimeType": "application/vnd.google-apps.folder"
        }"#;

        let file: DriveFile = serde_json::from_str(json).unwrap();
        assert!(file.is_folder());
        assert!(file.size.is_none());
        assert!(file.parents.is_empty());
        assert!(!file.trashed);
    }

    #[test]
    fn test_deserialize_list_response() {
        let json = r#"{"files": [], "nextPageToken": "page2"}"#;
        let list: FilesListResponse = serde_json::from_str(json).unwrap();
        assert!(list.files.is_empty());
        assert_eq!(list.next_page_token.as_deref(), Some("page2"));
    }
}
