//! S3-compatible HTTP client.
//!
//! Every request is presigned with [`Presigner`] and sent with reqwest, so the
//! same signing code serves the engine and the URLs handed to clients.

use super::client::{ObjectListing, ObjectStoreClient, ObjectStoreConnector};
use super::presign::Presigner;
use super::xml::{self, InitiateMultipartUploadResult, ListBucketResult};
use assetstore_core::{
    ByteRange, HttpMethod, ObjectStoreConfig, ObjectStoreSettings, PartRecord, RequestDescriptor,
};
use assetstore_error::{
    AssetstoreError, AssetstoreResult, BackendUnavailableError, StorageError, StorageErrorKind,
};
use assetstore_interface::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, error, instrument};

const BACKEND: &str = "object store";

/// Connector producing [`HttpObjectStoreClient`]s.
#[derive(Debug, Clone, Default)]
pub struct HttpObjectStoreConnector {
    client: Client,
}

impl HttpObjectStoreConnector {
    /// Create a connector sharing one HTTP connection pool.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStoreConnector for HttpObjectStoreConnector {
    async fn connect(
        &self,
        config: &ObjectStoreConfig,
        settings: &ObjectStoreSettings,
    ) -> AssetstoreResult<Arc<dyn ObjectStoreClient>> {
        Ok(Arc::new(HttpObjectStoreClient {
            client: self.client.clone(),
            presigner: Presigner::new(config, settings)?,
        }))
    }
}

/// Object-store client speaking the S3 REST protocol.
#[derive(Debug, Clone)]
pub struct HttpObjectStoreClient {
    client: Client,
    presigner: Presigner,
}

impl HttpObjectStoreClient {
    /// Create a client for one bucket.
    pub fn new(config: &ObjectStoreConfig, settings: &ObjectStoreSettings) -> AssetstoreResult<Self> {
        Ok(Self {
            client: Client::new(),
            presigner: Presigner::new(config, settings)?,
        })
    }

    async fn send(
        &self,
        request: RequestDescriptor,
        extra_headers: &[(&str, String)],
        body: Option<Bytes>,
    ) -> AssetstoreResult<Response> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        for (name, value) in extra_headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        builder.send().await.map_err(|e| {
            error!(error = ?e, bucket = self.presigner.bucket(), "Object store request failed");
            BackendUnavailableError::new(BACKEND, format!("Request failed: {}", e)).into()
        })
    }

    /// Fail on a non-success status, reading the body for the message.
    async fn check(response: Response) -> AssetstoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "Object store returned error");
        let message = format!("{}: {}", status, xml::error_message(&body).unwrap_or(body));
        let kind = match status {
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                StorageErrorKind::PermissionDenied(message)
            }
            StatusCode::NOT_FOUND => StorageErrorKind::NotFound(message),
            _ => StorageErrorKind::UnexpectedResponse(message),
        };
        Err(StorageError::new(kind).into())
    }

    async fn text(response: Response) -> AssetstoreResult<String> {
        response.text().await.map_err(|e| {
            StorageError::new(StorageErrorKind::UnexpectedResponse(format!(
                "Failed to read body: {}",
                e
            )))
            .into()
        })
    }
}

#[async_trait]
impl ObjectStoreClient for HttpObjectStoreClient {
    #[instrument(skip(self), fields(bucket = self.presigner.bucket()))]
    async fn ping(&self) -> AssetstoreResult<()> {
        let request = self.presigner.presign(HttpMethod::Head, "", &[], &[])?;
        Self::check(self.send(request, &[], None).await?).await?;
        Ok(())
    }

    #[instrument(skip(self, body), fields(bucket = self.presigner.bucket(), size = body.len()))]
    async fn put_object(&self, key: &str, body: Bytes) -> AssetstoreResult<()> {
        let request =
            self.presigner
                .presign(HttpMethod::Put, key, &[], &[("x-amz-acl", "private")])?;
        Self::check(self.send(request, &[], Some(body)).await?).await?;
        debug!("Stored object");
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = self.presigner.bucket()))]
    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> AssetstoreResult<ByteStream> {
        let headers: Vec<(&str, String)> = match range {
            Some(range) => match range.header_value() {
                Some(value) => vec![("range", value)],
                None => return Ok(futures::stream::empty().boxed()),
            },
            None => Vec::new(),
        };
        let request = self.presigner.presign(HttpMethod::Get, key, &[], &[])?;
        let response = Self::check(self.send(request, &headers, None).await?).await?;
        Ok(response
            .bytes_stream()
            .map_err(|e| {
                AssetstoreError::from(BackendUnavailableError::new(
                    BACKEND,
                    format!("Download interrupted: {}", e),
                ))
            })
            .boxed())
    }

    #[instrument(skip(self), fields(bucket = self.presigner.bucket()))]
    async fn head_object(&self, key: &str) -> AssetstoreResult<Option<u64>> {
        let request = self.presigner.presign(HttpMethod::Head, key, &[], &[])?;
        let response = self.send(request, &[], None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        Ok(response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .or(Some(0)))
    }

    #[instrument(skip(self), fields(bucket = self.presigner.bucket()))]
    async fn delete_object(&self, key: &str) -> AssetstoreResult<()> {
        let request = self.presigner.presign(HttpMethod::Delete, key, &[], &[])?;
        let response = self.send(request, &[], None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = self.presigner.bucket()))]
    async fn list_objects(&self, prefix: &str, delimiter: &str) -> AssetstoreResult<ObjectListing> {
        let mut listing = ObjectListing::default();
        let mut token: Option<String> = None;
        loop {
            let mut query = vec![
                ("list-type", "2".to_string()),
                ("prefix", prefix.to_string()),
            ];
            if !delimiter.is_empty() {
                query.push(("delimiter", delimiter.to_string()));
            }
            if let Some(token) = &token {
                query.push(("continuation-token", token.clone()));
            }
            let request = self.presigner.presign(HttpMethod::Get, "", &query, &[])?;
            let body = Self::text(Self::check(self.send(request, &[], None).await?).await?).await?;
            let page: ListBucketResult = xml::parse(&body, "ListObjectsV2")?;
            token = page.next_token().map(str::to_string);
            page.extend(&mut listing);
            if token.is_none() {
                break;
            }
        }
        debug!(
            objects = listing.objects.len(),
            prefixes = listing.common_prefixes.len(),
            "Listed objects"
        );
        Ok(listing)
    }

    #[instrument(skip(self), fields(bucket = self.presigner.bucket()))]
    async fn create_multipart(&self, key: &str) -> AssetstoreResult<String> {
        let request = self.presigner.presign(
            HttpMethod::Post,
            key,
            &[("uploads", String::new())],
            &[("x-amz-acl", "private")],
        )?;
        let body = Self::text(Self::check(self.send(request, &[], None).await?).await?).await?;
        let result: InitiateMultipartUploadResult =
            xml::parse(&body, "CreateMultipartUpload")?;
        Ok(result.upload_id)
    }

    #[instrument(skip(self, body), fields(bucket = self.presigner.bucket(), size = body.len()))]
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> AssetstoreResult<String> {
        let request = self.presigner.presign(
            HttpMethod::Put,
            key,
            &[
                ("partNumber", part_number.to_string()),
                ("uploadId", upload_id.to_string()),
            ],
            &[],
        )?;
        let response = Self::check(self.send(request, &[], Some(body)).await?).await?;
        response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                StorageError::new(StorageErrorKind::UnexpectedResponse(format!(
                    "Part {} returned no ETag",
                    part_number
                )))
                .into()
            })
    }

    #[instrument(skip(self, parts), fields(bucket = self.presigner.bucket(), parts = parts.len()))]
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> AssetstoreResult<()> {
        let request = self.presigner.presign(
            HttpMethod::Post,
            key,
            &[("uploadId", upload_id.to_string())],
            &[],
        )?;
        let body = xml::complete_body(parts)?;
        let response = Self::check(
            self.send(request, &[("content-type", "application/xml".to_string())], Some(body.into()))
                .await?,
        )
        .await?;
        // A 200 can still carry an <Error> document.
        let text = Self::text(response).await?;
        if let Some(message) = xml::error_message(&text) {
            return Err(StorageError::new(StorageErrorKind::UnexpectedResponse(message)).into());
        }
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = self.presigner.bucket()))]
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> AssetstoreResult<()> {
        let request = self.presigner.presign(
            HttpMethod::Delete,
            key,
            &[("uploadId", upload_id.to_string())],
            &[],
        )?;
        let response = self.send(request, &[], None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }
}
