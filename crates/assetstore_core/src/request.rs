//! Request descriptors handed to clients that talk to a backend directly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP verb of a request descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    #[display("GET")]
    Get,
    /// PUT
    #[display("PUT")]
    Put,
    /// POST
    #[display("POST")]
    Post,
    /// HEAD
    #[display("HEAD")]
    Head,
    /// DELETE
    #[display("DELETE")]
    Delete,
}

/// A pre-signed request the client must send itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Verb
    pub method: HttpMethod,
    /// Absolute URL including the signature query
    pub url: String,
    /// Headers the client must send verbatim
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl RequestDescriptor {
    /// Descriptor with no headers.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Direct-to-object-store upload instructions carried on a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectUpload {
    /// Multipart upload, one part request per chunk
    pub chunked: bool,
    /// Size of every part but the last
    pub chunk_length: u64,
    /// First request to send
    pub request: RequestDescriptor,
}

/// How a download is presented to the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentDisposition {
    /// Save as a file
    #[default]
    Attachment,
    /// Display in place
    Inline,
}

impl ContentDisposition {
    /// `Content-Disposition` header value for a file name.
    ///
    /// # Examples
    ///
    /// ```
    /// use assetstore_core::ContentDisposition;
    ///
    /// assert_eq!(
    ///     ContentDisposition::Attachment.header_value("My File.txt"),
    ///     "attachment; filename=\"My File.txt\""
    /// );
    /// ```
    pub fn header_value(&self, name: &str) -> String {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        match self {
            ContentDisposition::Attachment => format!("attachment; filename=\"{}\"", escaped),
            ContentDisposition::Inline => format!("inline; filename=\"{}\"", escaped),
        }
    }
}

/// Inclusive-exclusive byte window; `end = None` reads to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    /// First byte
    pub start: u64,
    /// One past the last byte
    pub end: Option<u64>,
}

impl ByteRange {
    /// Range from `start` to the end.
    pub fn from(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Range `[start, end)`.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Clamp against a total size, returning `(start, end)` with `start <= end <= size`.
    pub fn clamp(&self, size: u64) -> (u64, u64) {
        let end = self.end.map_or(size, |end| end.min(size));
        (self.start.min(end), end)
    }

    /// Whether the window selects no bytes of a `size`-byte file.
    pub fn is_empty_for(&self, size: u64) -> bool {
        let (start, end) = self.clamp(size);
        start == end
    }

    /// HTTP `Range` header value for the window, or `None` when it selects
    /// nothing and no request should be made.
    ///
    /// ```
    /// use assetstore_core::ByteRange;
    ///
    /// assert_eq!(ByteRange::new(4, 10).header_value().as_deref(), Some("bytes=4-9"));
    /// assert_eq!(ByteRange::from(7).header_value().as_deref(), Some("bytes=7-"));
    /// assert_eq!(ByteRange::new(0, 0).header_value(), None);
    /// assert_eq!(ByteRange::new(5, 5).header_value(), None);
    /// ```
    pub fn header_value(&self) -> Option<String> {
        match self.end {
            None => Some(format!("bytes={}-", self.start)),
            Some(end) if end > self.start => Some(format!("bytes={}-{}", self.start, end - 1)),
            Some(_) => None,
        }
    }
}
