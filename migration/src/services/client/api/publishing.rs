//! Session-based chunked upload of workbook and data source files
//!
//! A publish is three steps: open an upload session, append the file in
//! chunks of `batch.file_chunk_size` bytes, then commit the session against
//! the content collection with the item metadata.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::services::client::errors::{ClientError, ClientResult};
use crate::services::client::rest_client::RestClient;
use crate::services::client::types::FileUploadResponse;
use crate::services::content::ContentType;
use crate::utils::format_bytes_human;

const WORKBOOK_FILE_TYPES: &[&str] = &["twb", "twbx"];
const DATA_SOURCE_FILE_TYPES: &[&str] = &["tds", "tdsx", "tde", "hyper"];

/// What a commit needs besides the upload session
#[derive(Debug, Clone)]
pub struct PublishOptions<'a, P: Serialize> {
    pub content_type: ContentType,
    pub name: &'a str,
    pub project_id: Uuid,
    /// Extension of the uploaded file, without the dot
    pub file_type: &'a str,
    pub overwrite: bool,
    pub payload: &'a P,
}

impl<P: Serialize> PublishOptions<'_, P> {
    /// Reject options the server would refuse, before any request is sent
    pub fn validate(&self) -> ClientResult<()> {
        if self.name.trim().is_empty() {
            return Err(ClientError::validation("name", "name must not be empty"));
        }
        if self.project_id.is_nil() {
            return Err(ClientError::validation("project", "a destination project is required"));
        }
        let allowed = match self.content_type {
            ContentType::Workbook => WORKBOOK_FILE_TYPES,
            ContentType::DataSource => DATA_SOURCE_FILE_TYPES,
            other => {
                return Err(ClientError::validation(
                    "content_type",
                    format!("{} content is not published from a file", other),
                ))
            }
        };
        if !allowed.contains(&self.file_type) {
            return Err(ClientError::validation(
                "file_type",
                format!("{} is not a {} file type", self.file_type, self.content_type),
            ));
        }
        Ok(())
    }

    fn type_parameter(&self) -> &'static str {
        match self.content_type {
            ContentType::Workbook => "workbookType",
            _ => "datasourceType",
        }
    }
}

/// Byte ranges of each chunk for a file of `total` bytes
pub fn plan_chunks(total: usize, chunk_size: usize) -> Vec<Range<usize>> {
    let chunk_size = chunk_size.max(1);
    let count = total.div_ceil(chunk_size);
    (0..count)
        .map(|index| {
            let start = index * chunk_size;
            start..(start + chunk_size).min(total)
        })
        .collect()
}

pub struct FilePublisher {
    rest: Arc<RestClient>,
    chunk_size: usize,
}

impl FilePublisher {
    pub fn new(rest: Arc<RestClient>, chunk_size: usize) -> Self {
        Self {
            rest,
            chunk_size: chunk_size.max(1),
        }
    }

    pub async fn initiate(&self, cancel: &CancellationToken) -> ClientResult<String> {
        let response: FileUploadResponse = self.rest.post("/fileUploads").send_json(cancel).await?;
        Ok(response.file_upload.upload_session_id)
    }

    pub async fn append(&self, upload_session_id: &str, chunk: Bytes, cancel: &CancellationToken) -> ClientResult<()> {
        let boundary = Uuid::new_v4().simple().to_string();
        let body = multipart_body(&boundary, b"", Some(&chunk));
        self.rest
            .put("/fileUploads")
            .segment(upload_session_id)
            .with_body(multipart_content_type(&boundary), body)
            .send_empty(cancel)
            .await
    }

    pub async fn commit<P, T>(
        &self,
        upload_session_id: &str,
        options: &PublishOptions<'_, P>,
        cancel: &CancellationToken,
    ) -> ClientResult<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(options.payload)?;
        let boundary = Uuid::new_v4().simple().to_string();
        self.rest
            .post(options.content_type.url_segment())
            .with_query("uploadSessionId", upload_session_id)
            .with_query(options.type_parameter(), options.file_type)
            .with_query("overwrite", options.overwrite.to_string())
            .with_body(
                multipart_content_type(&boundary),
                multipart_body(&boundary, &payload, None),
            )
            .send_json(cancel)
            .await
    }

    /// Upload `content` and commit it as a new (or overwritten) item
    #[instrument(skip(self, content, options, cancel), fields(name = options.name), err)]
    pub async fn publish<P, T>(
        &self,
        content: Bytes,
        options: &PublishOptions<'_, P>,
        cancel: &CancellationToken,
    ) -> ClientResult<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        options.validate()?;
        if content.is_empty() {
            return Err(ClientError::validation("file", "content file is empty"));
        }

        let upload_session_id = self.initiate(cancel).await?;
        let chunks = plan_chunks(content.len(), self.chunk_size);
        info!(
            "[FilePublisher] Uploading {} ({}) in {} chunk(s)",
            options.name,
            format_bytes_human(content.len() as u64),
            chunks.len()
        );

        for (index, range) in chunks.iter().enumerate() {
            debug!(
                "[FilePublisher] Chunk {}/{} ({} bytes)",
                index + 1,
                chunks.len(),
                range.len()
            );
            self.append(&upload_session_id, content.slice(range.clone()), cancel)
                .await?;
        }

        self.commit(&upload_session_id, options, cancel).await
    }
}

fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/mixed; boundary={}", boundary)
}

fn multipart_body(boundary: &str, payload: &[u8], file: Option<&Bytes>) -> Bytes {
    let mut body = BytesMut::with_capacity(payload.len() + file.map_or(0, Bytes::len) + 256);
    body.put_slice(format!("--{}\r\n", boundary).as_bytes());
    body.put_slice(b"Content-Disposition: name=\"request_payload\"\r\n");
    body.put_slice(b"Content-Type: application/json\r\n\r\n");
    body.put_slice(payload);
    body.put_slice(b"\r\n");
    if let Some(file) = file {
        body.put_slice(format!("--{}\r\n", boundary).as_bytes());
        body.put_slice(b"Content-Disposition: name=\"tableau_file\"; filename=\"file\"\r\n");
        body.put_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.put_slice(file);
        body.put_slice(b"\r\n");
    }
    body.put_slice(format!("--{}--\r\n", boundary).as_bytes());
    body.freeze()
}
