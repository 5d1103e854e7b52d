//! Object storage client for cover images.
//!
//! The server never proxies image bytes. Instead it hands out service-SAS
//! URLs: upload URLs scoped to create+write on one exact blob name for five
//! minutes, read URLs scoped to read for ten. The only direct REST call is
//! the idempotent container bootstrap at startup, signed with the shared-key
//! scheme.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use sha2::Sha256;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime};

/// Blob REST API / SAS version used for all requests and tokens.
const STORAGE_API_VERSION: &str = "2022-11-02";

/// Logical folder inside the container that all cover blobs live under.
const COVERS_FOLDER: &str = "covers";

/// Upload URLs are valid for five minutes from issuance.
const UPLOAD_TTL: Duration = Duration::minutes(5);

/// Read URLs are valid for ten minutes from issuance.
const READ_TTL: Duration = Duration::minutes(10);

/// SAS timestamps are whole-second UTC.
const SAS_TIME_FORMAT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

#[derive(thiserror::Error, Debug)]
pub enum BlobError {
    #[error("invalid storage credential: {0}")]
    Credential(String),

    #[error("failed to format SAS timestamp: {0}")]
    Time(#[from] time::error::Format),

    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("storage service rejected request: HTTP {status}: {body}")]
    Backend { status: u16, body: String },
}

/// A signed URL plus the blob name it is scoped to and when it stops
/// working.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub blob_name: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct BlobClient {
    client: reqwest::Client,
    account: String,
    key_bytes: Vec<u8>,
    container: String,
    base_url: String,
}

impl BlobClient {
    /// Build a client from account credentials. `endpoint` overrides the
    /// canonical `https://{account}.blob.core.windows.net` base, which local
    /// emulators need.
    pub fn new(
        account: &str,
        access_key: &str,
        container: &str,
        endpoint: Option<&str>,
    ) -> Result<Self, BlobError> {
        let key_bytes = BASE64_STANDARD
            .decode(access_key)
            .map_err(|e| BlobError::Credential(format!("access key is not valid base64: {e}")))?;

        let base_url = match endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{account}.blob.core.windows.net"),
        };

        Ok(Self {
            client: reqwest::Client::new(),
            account: account.to_string(),
            key_bytes,
            container: container.to_string(),
            base_url,
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Idempotent container bootstrap: create the container if it does not
    /// exist. 201 (created) and 409 (already exists) both count as success.
    pub async fn ensure_container(&self) -> Result<(), BlobError> {
        let date = httpdate::fmt_http_date(std::time::SystemTime::now());
        let auth = self.sign_shared_key("PUT", &date)?;

        let response = self
            .client
            .put(format!("{}/{}?restype=container", self.base_url, self.container))
            .header("authorization", auth)
            .header("x-ms-date", &date)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header("content-length", "0")
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                tracing::info!(container = %self.container, "storage container created");
                Ok(())
            }
            StatusCode::CONFLICT => {
                tracing::debug!(container = %self.container, "storage container already exists");
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(BlobError::Backend {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// Signed upload URL for a caller-chosen filename.
    ///
    /// The filename is reduced to `[A-Za-z0-9.-]` and prefixed with the
    /// covers folder and a millisecond timestamp, so repeated filenames
    /// never collide. The grant is create+write on that exact blob name.
    pub fn issue_upload_url(&self, desired_filename: &str) -> Result<SignedUrl, BlobError> {
        self.issue_upload_url_at(desired_filename, OffsetDateTime::now_utc())
    }

    /// Signed read URL for displaying an existing blob without making the
    /// container publicly readable.
    pub fn issue_read_url(&self, blob_name: &str) -> Result<SignedUrl, BlobError> {
        self.issue_read_url_at(blob_name, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_upload_url_at(
        &self,
        desired_filename: &str,
        now: OffsetDateTime,
    ) -> Result<SignedUrl, BlobError> {
        let millis = now.unix_timestamp_nanos() / 1_000_000;
        let blob_name = format!(
            "{COVERS_FOLDER}/{millis}-{}",
            sanitize_filename(desired_filename)
        );
        self.signed_blob_url(&blob_name, "cw", now, now + UPLOAD_TTL)
    }

    pub(crate) fn issue_read_url_at(
        &self,
        blob_name: &str,
        now: OffsetDateTime,
    ) -> Result<SignedUrl, BlobError> {
        self.signed_blob_url(blob_name, "r", now, now + READ_TTL)
    }

    fn signed_blob_url(
        &self,
        blob_name: &str,
        permissions: &str,
        start: OffsetDateTime,
        expiry: OffsetDateTime,
    ) -> Result<SignedUrl, BlobError> {
        let query = self.sas_query(blob_name, permissions, start, expiry)?;
        Ok(SignedUrl {
            url: format!("{}/{}/{}?{}", self.base_url, self.container, blob_name, query),
            blob_name: blob_name.to_string(),
            expires_at: expiry,
        })
    }

    /// Service-SAS query string for a single blob.
    ///
    /// String-to-sign, one field per line in this order:
    ///
    /// ```text
    /// permissions, start, expiry, canonicalized resource, identifier,
    /// IP range, protocol, version, resource, snapshot time,
    /// encryption scope, rscc, rscd, rsce, rscl, rsct
    /// ```
    fn sas_query(
        &self,
        blob_name: &str,
        permissions: &str,
        start: OffsetDateTime,
        expiry: OffsetDateTime,
    ) -> Result<String, BlobError> {
        let st = start.format(SAS_TIME_FORMAT)?;
        let se = expiry.format(SAS_TIME_FORMAT)?;
        let canonicalized_resource =
            format!("/blob/{}/{}/{}", self.account, self.container, blob_name);

        let string_to_sign = format!(
            "{permissions}\n{st}\n{se}\n{canonicalized_resource}\n\n\nhttps\n{STORAGE_API_VERSION}\nb\n\n\n\n\n\n"
        );

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(&self.key_bytes)
            .map_err(|e| BlobError::Credential(format!("HMAC key error: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("sv", STORAGE_API_VERSION)
            .append_pair("spr", "https")
            .append_pair("st", &st)
            .append_pair("se", &se)
            .append_pair("sr", "b")
            .append_pair("sp", permissions)
            .append_pair("sig", &signature)
            .finish();
        Ok(query)
    }

    /// Shared-key authorization header for the container bootstrap request.
    fn sign_shared_key(&self, method: &str, date: &str) -> Result<String, BlobError> {
        let canonicalized_headers =
            format!("x-ms-date:{date}\nx-ms-version:{STORAGE_API_VERSION}");
        let canonicalized_resource =
            format!("/{}/{}\nrestype:container", self.account, self.container);

        let string_to_sign = format!(
            "{method}\n\n\n\n\n\n\n\n\n\n\n\n{canonicalized_headers}\n{canonicalized_resource}"
        );

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(&self.key_bytes)
            .map_err(|e| BlobError::Credential(format!("HMAC key error: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!("SharedKey {}:{}", self.account, signature))
    }
}

/// Reduce a caller-supplied filename to alphanumerics, hyphens, and dots.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '.')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn test_client() -> BlobClient {
        BlobClient::new(
            "devstoreaccount1",
            // Azurite well-known development key.
            "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==",
            "covers",
            None,
        )
        .unwrap()
    }

    #[test]
    fn rejects_non_base64_key() {
        let err = BlobClient::new("acct", "!!!", "covers", None).unwrap_err();
        assert!(matches!(err, BlobError::Credential(_)));
    }

    #[test]
    fn sanitize_strips_disallowed_characters() {
        assert_eq!(sanitize_filename("my file!.png"), "myfile.png");
        assert_eq!(sanitize_filename("a-b.c"), "a-b.c");
        assert_eq!(sanitize_filename("../../etc/passwd"), "....etcpasswd");
    }

    #[test]
    fn upload_url_names_and_scopes_the_blob() {
        let client = test_client();
        let now = datetime!(2024-06-01 12:00:00 UTC);
        let signed = client.issue_upload_url_at("my file!.png", now).unwrap();

        let millis = now.unix_timestamp_nanos() / 1_000_000;
        assert_eq!(signed.blob_name, format!("covers/{millis}-myfile.png"));
        assert!(signed.url.contains("/covers/covers/"), "{}", signed.url);

        // create+write grant, no read.
        assert!(signed.url.contains("sp=cw"), "{}", signed.url);
        assert!(!signed.url.contains("sp=r"), "{}", signed.url);
        assert!(signed.url.contains("sig="), "{}", signed.url);
        assert_eq!(signed.expires_at, now + Duration::minutes(5));
    }

    #[test]
    fn read_url_is_read_only_with_ten_minute_window() {
        let client = test_client();
        let now = datetime!(2024-06-01 12:00:00 UTC);
        let signed = client.issue_read_url_at("covers/1-a.png", now).unwrap();

        assert!(signed.url.contains("sp=r"), "{}", signed.url);
        assert!(!signed.url.contains("sp=cw"), "{}", signed.url);
        assert!(signed.expires_at > now);
        assert!(signed.expires_at < now + Duration::minutes(11));
    }

    #[test]
    fn sas_timestamps_are_percent_encoded_in_query() {
        let client = test_client();
        let now = datetime!(2024-06-01 12:00:00 UTC);
        let signed = client.issue_read_url_at("covers/1-a.png", now).unwrap();

        assert!(
            signed.url.contains("st=2024-06-01T12%3A00%3A00Z"),
            "{}",
            signed.url
        );
        assert!(
            signed.url.contains("se=2024-06-01T12%3A10%3A00Z"),
            "{}",
            signed.url
        );
    }

    #[test]
    fn signatures_differ_per_blob_and_permission() {
        let client = test_client();
        let now = datetime!(2024-06-01 12:00:00 UTC);

        let a = client.sas_query("covers/1-a.png", "r", now, now + READ_TTL).unwrap();
        let b = client.sas_query("covers/1-b.png", "r", now, now + READ_TTL).unwrap();
        let c = client.sas_query("covers/1-a.png", "cw", now, now + READ_TTL).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn endpoint_override_replaces_canonical_host() {
        let client = BlobClient::new(
            "devstoreaccount1",
            "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==",
            "covers",
            Some("http://127.0.0.1:10000/devstoreaccount1/"),
        )
        .unwrap();

        let signed = client
            .issue_read_url_at("covers/1-a.png", datetime!(2024-06-01 12:00:00 UTC))
            .unwrap();
        assert!(
            signed.url.starts_with("http://127.0.0.1:10000/devstoreaccount1/covers/"),
            "{}",
            signed.url
        );
    }
}
