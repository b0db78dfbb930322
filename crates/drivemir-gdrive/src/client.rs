//! Drive v3 HTTP client
//!
//! Typed client over `reqwest` implementing the `IRemoteDrive` port.
//! Handles bearer authentication, the field masks every call needs, and
//! response status mapping into the adapter error taxonomy. Downloads
//! are exposed as `AsyncRead` streams so the engine can copy them in
//! small chunks without buffering whole files.

use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::json;
use tokio_util::io::StreamReader;
use tracing::debug;

use drivemir_core::ports::{ByteStream, ChangePage, FilePage, IRemoteDrive, RemoteFileMeta};

use crate::wire::{
    ChangeListResponse, FileListResponse, FileResource, StartPageTokenResponse, FILE_FIELDS,
};
use crate::DriveError;

/// Base URL for metadata calls.
const API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Base URL for media upload calls.
const UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/drive/v3";

/// Boundary used for multipart/related upload bodies.
const MULTIPART_BOUNDARY: &str = "drivemir_multipart_boundary";

/// HTTP client for the Drive v3 API.
pub struct DriveClient {
    http: Client,
    api_base: String,
    upload_base: String,
    access_token: String,
}

impl DriveClient {
    /// Creates a client with the given bearer token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_base: API_BASE_URL.to_string(),
            upload_base: UPLOAD_BASE_URL.to_string(),
            access_token: access_token.into(),
        }
    }

    /// Creates a client against custom base URLs (useful for testing).
    pub fn with_base_urls(
        access_token: impl Into<String>,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into(),
            upload_base: upload_base.into(),
            access_token: access_token.into(),
        }
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.access_token)
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn upload(&self, path: &str) -> String {
        format!("{}{}", self.upload_base, path)
    }

    /// Maps a non-success status onto the adapter error taxonomy.
    async fn check(response: Response) -> Result<Response, DriveError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let code = status.as_u16();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(DriveError::Auth { status: code, body })
        } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(DriveError::Transient { status: code, body })
        } else {
            Err(DriveError::Api { status: code, body })
        }
    }

    async fn fetch_file(&self, url: String, query: &[(&str, &str)]) -> Result<RemoteFileMeta, DriveError> {
        let response = self
            .request(Method::GET, url)
            .query(query)
            .send()
            .await?;
        let resource: FileResource = Self::check(response).await?.json().await?;
        resource.into_meta()
    }
}

#[async_trait::async_trait]
impl IRemoteDrive for DriveClient {
    async fn get_start_page_token(&self) -> anyhow::Result<String> {
        let response = self
            .request(Method::GET, self.api("/changes/startPageToken"))
            .send()
            .await
            .map_err(DriveError::from)?;
        let parsed: StartPageTokenResponse = Self::check(response).await?.json().await
            .map_err(DriveError::from)?;
        Ok(parsed.start_page_token)
    }

    async fn list_changes(&self, page_token: &str, page_size: i64) -> anyhow::Result<ChangePage> {
        let fields = format!("nextPageToken,changes(removed,fileId,file({FILE_FIELDS}))");
        let page_size = page_size.to_string();
        let response = self
            .request(Method::GET, self.api("/changes"))
            .query(&[
                ("pageToken", page_token),
                ("pageSize", page_size.as_str()),
                ("fields", fields.as_str()),
            ])
            .send()
            .await
            .map_err(DriveError::from)?;
        let parsed: ChangeListResponse = Self::check(response).await?.json().await
            .map_err(DriveError::from)?;

        debug!(changes = parsed.changes.len(), "change page received");

        let mut changes = Vec::with_capacity(parsed.changes.len());
        for change in parsed.changes {
            changes.push(change.into_record()?);
        }
        Ok(ChangePage {
            changes,
            next_page_token: parsed.next_page_token,
        })
    }

    async fn list_files(
        &self,
        page_token: Option<&str>,
        page_size: i64,
    ) -> anyhow::Result<FilePage> {
        let fields = format!("nextPageToken,files({FILE_FIELDS})");
        let page_size = page_size.to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("pageSize", page_size.as_str()),
            ("fields", fields.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response = self
            .request(Method::GET, self.api("/files"))
            .query(&query)
            .send()
            .await
            .map_err(DriveError::from)?;
        let parsed: FileListResponse = Self::check(response).await?.json().await
            .map_err(DriveError::from)?;

        debug!(files = parsed.files.len(), "file listing page received");

        let mut files = Vec::with_capacity(parsed.files.len());
        for resource in parsed.files {
            files.push(resource.into_meta()?);
        }
        Ok(FilePage {
            files,
            next_page_token: parsed.next_page_token,
        })
    }

    async fn get_root(&self) -> anyhow::Result<RemoteFileMeta> {
        Ok(self
            .fetch_file(self.api("/files/root"), &[("fields", FILE_FIELDS)])
            .await?)
    }

    async fn get_by_id(&self, id: &str) -> anyhow::Result<RemoteFileMeta> {
        Ok(self
            .fetch_file(self.api(&format!("/files/{id}")), &[("fields", FILE_FIELDS)])
            .await?)
    }

    async fn download(&self, id: &str) -> anyhow::Result<ByteStream> {
        let response = self
            .request(Method::GET, self.api(&format!("/files/{id}")))
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(DriveError::from)?;
        let response = Self::check(response).await?;

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            .boxed();
        Ok(Box::new(StreamReader::new(stream)))
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_ids: &[String],
    ) -> anyhow::Result<RemoteFileMeta> {
        let body = json!({
            "name": name,
            "mimeType": drivemir_core::domain::FOLDER_MIME_TYPE,
            "parents": parent_ids,
        });
        let response = self
            .request(Method::POST, self.api("/files"))
            .query(&[("fields", FILE_FIELDS)])
            .json(&body)
            .send()
            .await
            .map_err(DriveError::from)?;
        let resource: FileResource = Self::check(response).await?.json().await
            .map_err(DriveError::from)?;
        Ok(resource.into_meta()?)
    }

    async fn upload_new(
        &self,
        name: &str,
        parent_ids: &[String],
        data: Vec<u8>,
    ) -> anyhow::Result<RemoteFileMeta> {
        let metadata = json!({
            "name": name,
            "parents": parent_ids,
        });
        let body = multipart_related_body(&metadata.to_string(), &data);

        let response = self
            .request(Method::POST, self.upload("/files"))
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await
            .map_err(DriveError::from)?;
        let resource: FileResource = Self::check(response).await?.json().await
            .map_err(DriveError::from)?;
        Ok(resource.into_meta()?)
    }

    async fn update_media(&self, id: &str, data: Vec<u8>) -> anyhow::Result<RemoteFileMeta> {
        let response = self
            .request(Method::PATCH, self.upload(&format!("/files/{id}")))
            .query(&[("uploadType", "media"), ("fields", FILE_FIELDS)])
            .body(data)
            .send()
            .await
            .map_err(DriveError::from)?;
        let resource: FileResource = Self::check(response).await?.json().await
            .map_err(DriveError::from)?;
        Ok(resource.into_meta()?)
    }

    async fn rename_move(
        &self,
        id: &str,
        name: &str,
        add_parents: &[String],
        remove_parents: &[String],
    ) -> anyhow::Result<RemoteFileMeta> {
        let add = add_parents.join(",");
        let remove = remove_parents.join(",");
        let response = self
            .request(Method::PATCH, self.api(&format!("/files/{id}")))
            .query(&[
                ("addParents", add.as_str()),
                ("removeParents", remove.as_str()),
                ("fields", FILE_FIELDS),
            ])
            .json(&json!({ "name": name }))
            .send()
            .await
            .map_err(DriveError::from)?;
        let resource: FileResource = Self::check(response).await?.json().await
            .map_err(DriveError::from)?;
        Ok(resource.into_meta()?)
    }

    async fn copy_file(
        &self,
        source_id: &str,
        name: &str,
        parent_ids: &[String],
    ) -> anyhow::Result<RemoteFileMeta> {
        let body = json!({
            "name": name,
            "parents": parent_ids,
        });
        let response = self
            .request(Method::POST, self.api(&format!("/files/{source_id}/copy")))
            .query(&[("fields", FILE_FIELDS)])
            .json(&body)
            .send()
            .await
            .map_err(DriveError::from)?;
        let resource: FileResource = Self::check(response).await?.json().await
            .map_err(DriveError::from)?;
        Ok(resource.into_meta()?)
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        let response = self
            .request(Method::DELETE, self.api(&format!("/files/{id}")))
            .send()
            .await
            .map_err(DriveError::from)?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Builds a `multipart/related` body with a JSON metadata part and a
/// binary media part, as the multipart upload endpoint expects.
fn multipart_related_body(metadata: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + data.len() + 256);
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{MULTIPART_BOUNDARY}\r\nContent-Type: application/octet-stream\r\n\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--").as_bytes());
    body
}
