//! AWS Signature V4 query-string presigning.
//!
//! Produces path-style URLs (`{service}/{bucket}/{key}`) signed with
//! `UNSIGNED-PAYLOAD`, so clients can send the bytes themselves.

use assetstore_core::{HttpMethod, ObjectStoreConfig, ObjectStoreSettings, RequestDescriptor};
use assetstore_error::{AssetstoreResult, ValidationError};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// Signs object-store requests for one bucket.
#[derive(Debug, Clone)]
pub struct Presigner {
    endpoint: Url,
    bucket: String,
    region: String,
    credentials: Option<(String, String)>,
    expiry_secs: u64,
}

impl Presigner {
    /// Build a presigner from an Assetstore config, filling gaps from settings.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] on field `service` when the endpoint is
    /// not an http(s) URL.
    pub fn new(config: &ObjectStoreConfig, settings: &ObjectStoreSettings) -> AssetstoreResult<Self> {
        let service = config
            .service
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&settings.default_service);
        let endpoint = parse_endpoint(service)?;

        let credentials = match (&config.access_key_id, &config.secret) {
            (Some(key), Some(secret)) if !key.is_empty() => Some((key.clone(), secret.clone())),
            _ => None,
        };

        Ok(Self {
            endpoint,
            bucket: config.bucket.clone(),
            region: config
                .region
                .clone()
                .unwrap_or_else(|| settings.default_region.clone()),
            credentials,
            expiry_secs: settings.presign_expiry_secs,
        })
    }

    /// Bucket the presigner signs for.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Presign a request valid from now.
    pub fn presign(
        &self,
        method: HttpMethod,
        key: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> AssetstoreResult<RequestDescriptor> {
        self.presign_at(method, key, query, headers, Utc::now())
    }

    /// Presign a request valid from `now`.
    pub fn presign_at(
        &self,
        method: HttpMethod,
        key: &str,
        query: &[(&str, String)],
        headers: &[(&str, &str)],
        now: DateTime<Utc>,
    ) -> AssetstoreResult<RequestDescriptor> {
        let path = self.canonical_path(key);
        let host = host_header(&self.endpoint);

        let mut signed_headers: BTreeMap<String, String> = headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
            .collect();
        signed_headers.insert("host".to_string(), host);

        let mut params: Vec<(String, String)> = query
            .iter()
            .map(|(name, value)| (uri_encode(name), uri_encode(value)))
            .collect();

        if let Some((access_key, secret)) = &self.credentials {
            let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
            let date = now.format("%Y%m%d").to_string();
            let scope = format!("{}/{}/{}/aws4_request", date, self.region, SERVICE);
            let signed_names = signed_headers
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(";");

            params.push(("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()));
            params.push((
                "X-Amz-Credential".to_string(),
                uri_encode(&format!("{}/{}", access_key, scope)),
            ));
            params.push(("X-Amz-Date".to_string(), amz_date.clone()));
            params.push(("X-Amz-Expires".to_string(), self.expiry_secs.to_string()));
            params.push(("X-Amz-SignedHeaders".to_string(), uri_encode(&signed_names)));
            params.sort();

            let canonical_headers: String = signed_headers
                .iter()
                .map(|(name, value)| format!("{}:{}\n", name, value))
                .collect();
            let canonical_request = format!(
                "{}\n{}\n{}\n{}\n{}\nUNSIGNED-PAYLOAD",
                method,
                path,
                join_query(&params),
                canonical_headers,
                signed_names
            );
            let string_to_sign = format!(
                "{}\n{}\n{}\n{}",
                ALGORITHM,
                amz_date,
                scope,
                hex::encode(Sha256::digest(canonical_request.as_bytes()))
            );
            let key = signing_key(secret, &date, &self.region, SERVICE)?;
            let signature = hex::encode(hmac(&key, &string_to_sign)?);
            params.push(("X-Amz-Signature".to_string(), signature));
        } else {
            params.sort();
        }

        let mut url = format!("{}{}", self.origin(), path);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&join_query(&params));
        }

        let mut descriptor = RequestDescriptor::new(method, url);
        for (name, value) in headers {
            descriptor = descriptor.with_header(*name, *value);
        }
        Ok(descriptor)
    }

    fn origin(&self) -> String {
        let mut origin = format!("{}://{}", self.endpoint.scheme(), host_header(&self.endpoint));
        let base = self.endpoint.path().trim_end_matches('/');
        origin.push_str(base);
        origin
    }

    fn canonical_path(&self, key: &str) -> String {
        let mut path = String::from("/");
        path.push_str(&uri_encode(&self.bucket));
        if !key.is_empty() {
            path.push('/');
            path.push_str(
                &key.split('/')
                    .map(uri_encode)
                    .collect::<Vec<_>>()
                    .join("/"),
            );
        }
        path
    }
}

/// Parse a service endpoint, defaulting to https when no scheme is given.
fn parse_endpoint(service: &str) -> AssetstoreResult<Url> {
    let service = service.trim();
    let candidate = if service.contains("://") {
        service.to_string()
    } else {
        format!("https://{}", service)
    };
    let url = Url::parse(&candidate).map_err(|e| {
        ValidationError::field("service", format!("Invalid service \"{}\": {}", service, e))
    })?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ValidationError::field(
            "service",
            format!("The service \"{}\" must be an http or https URL.", service),
        )
        .into()),
    }
}

fn host_header(endpoint: &Url) -> String {
    let host = endpoint.host_str().unwrap_or_default();
    match endpoint.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// RFC 3986 encoding of everything except unreserved characters.
fn uri_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn join_query(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac(key: &[u8], data: &str) -> AssetstoreResult<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| ValidationError::field("secret", format!("Invalid signing key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the SigV4 signing key for a date, region and service.
fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> AssetstoreResult<Vec<u8>> {
    let date_key = hmac(format!("AWS4{}", secret).as_bytes(), date)?;
    let region_key = hmac(&date_key, region)?;
    let service_key = hmac(&region_key, service)?;
    hmac(&service_key, "aws4_request")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn presigner(prefix_service: Option<&str>) -> Presigner {
        let mut config = ObjectStoreConfig::new("bucketname");
        config.access_key_id = Some("someKey".to_string());
        config.secret = Some("someSecret".to_string());
        config.service = prefix_service.map(str::to_string);
        Presigner::new(&config, &ObjectStoreSettings::default()).unwrap()
    }

    #[test]
    fn signing_key_matches_published_derivation() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn put_is_path_style_and_signed() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let request = presigner(None)
            .presign_at(
                HttpMethod::Put,
                "foo/bar/My File.txt",
                &[],
                &[("x-amz-acl", "private")],
                now,
            )
            .unwrap();

        assert_eq!(request.method, HttpMethod::Put);
        assert!(
            request
                .url
                .starts_with("https://s3.amazonaws.com/bucketname/foo/bar/My%20File.txt?")
        );
        assert!(request.url.contains("X-Amz-Date=20240501T120000Z"));
        assert!(request.url.contains("X-Amz-SignedHeaders=host%3Bx-amz-acl"));
        assert!(request.url.contains("X-Amz-Signature="));
        assert_eq!(request.headers["x-amz-acl"], "private");
    }

    #[test]
    fn signature_is_deterministic_and_query_sensitive() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let signer = presigner(None);
        let a = signer
            .presign_at(HttpMethod::Get, "k", &[], &[], now)
            .unwrap();
        let b = signer
            .presign_at(HttpMethod::Get, "k", &[], &[], now)
            .unwrap();
        let c = signer
            .presign_at(
                HttpMethod::Get,
                "k",
                &[("response-content-disposition", "inline".to_string())],
                &[],
                now,
            )
            .unwrap();
        assert_eq!(a.url, b.url);
        assert_ne!(a.url, c.url);
    }

    #[test]
    fn inline_disposition_is_encoded() {
        let request = presigner(None)
            .presign(
                HttpMethod::Get,
                "foo/bar/key",
                &[(
                    "response-content-disposition",
                    "inline; filename=\"My File.txt\"".to_string(),
                )],
                &[],
            )
            .unwrap();
        assert!(
            request
                .url
                .contains("response-content-disposition=inline%3B%20filename%3D%22My%20File.txt%22")
        );
    }

    #[test]
    fn endpoint_validation() {
        assert!(parse_endpoint("ftp://nowhere").is_err());
        assert_eq!(
            parse_endpoint("s3.example.com").unwrap().as_str(),
            "https://s3.example.com/"
        );
        let signer = presigner(Some("http://localhost:9000"));
        let request = signer.presign(HttpMethod::Head, "k", &[], &[]).unwrap();
        assert!(request.url.starts_with("http://localhost:9000/bucketname/k?"));
    }

    #[test]
    fn anonymous_requests_carry_no_signature() {
        let config = ObjectStoreConfig::new("public");
        let signer = Presigner::new(&config, &ObjectStoreSettings::default()).unwrap();
        let request = signer
            .presign(HttpMethod::Post, "k", &[("uploads", String::new())], &[])
            .unwrap();
        assert_eq!(request.url, "https://s3.amazonaws.com/public/k?uploads=");
    }
}
