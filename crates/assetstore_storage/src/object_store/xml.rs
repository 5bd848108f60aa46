//! S3 REST response and request bodies.

use super::client::{ObjectListing, ObjectSummary};
use assetstore_core::PartRecord;
use assetstore_error::{AssetstoreResult, StorageError, StorageErrorKind};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// One page of a `ListObjectsV2` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ListedObject>,
    #[serde(default)]
    common_prefixes: Vec<ListedPrefix>,
    #[serde(default)]
    is_truncated: bool,
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedObject {
    key: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedPrefix {
    prefix: String,
}

impl ListBucketResult {
    /// Token for the next page, if the listing is truncated.
    pub(crate) fn next_token(&self) -> Option<&str> {
        self.next_continuation_token
            .as_deref()
            .filter(|_| self.is_truncated)
    }

    /// Append this page to `listing`.
    pub(crate) fn extend(self, listing: &mut ObjectListing) {
        listing.objects.extend(
            self.contents
                .into_iter()
                .map(|o| ObjectSummary { key: o.key, size: o.size }),
        );
        listing
            .common_prefixes
            .extend(self.common_prefixes.into_iter().map(|p| p.prefix));
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct InitiateMultipartUploadResult {
    pub(crate) upload_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ErrorDocument {
    pub(crate) code: Option<String>,
    pub(crate) message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteMultipartUpload {
    #[serde(rename = "Part", default)]
    parts: Vec<CompletedPart>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct CompletedPart {
    #[serde(rename = "PartNumber")]
    part_number: u32,
    #[serde(rename = "ETag")]
    etag: String,
}

/// Deserialize a response body.
pub(crate) fn parse<T: DeserializeOwned>(body: &str, what: &str) -> AssetstoreResult<T> {
    quick_xml::de::from_str(body).map_err(|e| {
        StorageError::new(StorageErrorKind::UnexpectedResponse(format!(
            "Malformed {} response: {}",
            what, e
        )))
        .into()
    })
}

/// Human-readable message of an `<Error>` body, if it is one.
pub(crate) fn error_message(body: &str) -> Option<String> {
    if !body.contains("<Error") {
        return None;
    }
    let doc: ErrorDocument = quick_xml::de::from_str(body).ok()?;
    match (doc.code, doc.message) {
        (Some(code), Some(message)) => Some(format!("{code}: {message}")),
        (code, message) => message.or(code),
    }
}

/// Body of a `CompleteMultipartUpload` request.
pub(crate) fn complete_body(parts: &[PartRecord]) -> AssetstoreResult<String> {
    let request = CompleteMultipartUpload {
        parts: parts
            .iter()
            .map(|p| CompletedPart {
                part_number: p.part_number,
                etag: p.etag.clone(),
            })
            .collect(),
    };
    quick_xml::se::to_string(&request).map_err(|e| {
        StorageError::new(StorageErrorKind::UnexpectedResponse(format!(
            "Cannot encode part list: {}",
            e
        )))
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>bucketname</Name>
  <Prefix>foo/</Prefix>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>abc==</NextContinuationToken>
  <Contents>
    <Key>foo/R&amp;D.txt</Key>
    <Size>42</Size>
  </Contents>
  <Contents>
    <Key>foo/line&#10;break&#x9;tab</Key>
    <Size>0</Size>
  </Contents>
  <CommonPrefixes><Prefix>foo/bar/</Prefix></CommonPrefixes>
</ListBucketResult>"#;

    #[test]
    fn test_listing_page_decodes_entities() {
        let page: ListBucketResult = parse(LISTING, "listing").unwrap();
        assert_eq!(page.next_token(), Some("abc=="));

        let mut listing = ObjectListing::default();
        page.extend(&mut listing);
        assert_eq!(
            listing.objects,
            vec![
                ObjectSummary {
                    key: "foo/R&D.txt".to_string(),
                    size: 42
                },
                ObjectSummary {
                    key: "foo/line\nbreak\ttab".to_string(),
                    size: 0
                },
            ]
        );
        assert_eq!(listing.common_prefixes, vec!["foo/bar/"]);
    }

    #[test]
    fn test_last_page_has_no_token() {
        let xml = "<ListBucketResult><IsTruncated>false</IsTruncated>\
                   <NextContinuationToken>ignored</NextContinuationToken></ListBucketResult>";
        let page: ListBucketResult = parse(xml, "listing").unwrap();
        assert_eq!(page.next_token(), None);

        let mut listing = ObjectListing::default();
        page.extend(&mut listing);
        assert!(listing.objects.is_empty());
    }

    #[test]
    fn test_upload_id_and_errors() {
        let xml = "<InitiateMultipartUploadResult><Bucket>b</Bucket><Key>k</Key>\
                   <UploadId>VXBsb2FkIElE</UploadId></InitiateMultipartUploadResult>";
        let result: InitiateMultipartUploadResult = parse(xml, "initiate").unwrap();
        assert_eq!(result.upload_id, "VXBsb2FkIElE");
        assert!(parse::<InitiateMultipartUploadResult>("<Other/>", "initiate").is_err());

        let error = "<Error><Code>NoSuchUpload</Code><Message>Gone &amp; forgotten</Message></Error>";
        assert_eq!(
            error_message(error).as_deref(),
            Some("NoSuchUpload: Gone & forgotten")
        );
        assert_eq!(error_message(xml), None);
    }

    #[test]
    fn test_complete_body_lists_parts_in_order() {
        let body = complete_body(&[
            PartRecord {
                part_number: 1,
                size: 5,
                etag: "\"abc\"".to_string(),
            },
            PartRecord {
                part_number: 2,
                size: 3,
                etag: "\"d&e\"".to_string(),
            },
        ])
        .unwrap();
        assert!(body.starts_with("<CompleteMultipartUpload><Part><PartNumber>1</PartNumber>"));

        let decoded: CompleteMultipartUpload = quick_xml::de::from_str(&body).unwrap();
        assert_eq!(decoded.parts.len(), 2);
        assert_eq!(decoded.parts[1].part_number, 2);
        assert_eq!(decoded.parts[1].etag, "\"d&e\"");
    }
}
