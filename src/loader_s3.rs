//! Amazon S3 loader.
//!
//! Lists and downloads objects from an S3 bucket using the S3 REST API with
//! AWS Signature V4 authentication. Pagination is handled through the
//! `ListObjectsV2` continuation token mechanism, and custom endpoints
//! (MinIO, LocalStack) are supported via `endpoint_url`.
//!
//! Signing uses only pure-Rust dependencies (`hmac`, `sha2`), no C library
//! bindings.
//!
//! Credentials come from the environment:
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (temporary credentials / IAM roles)

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::extract;
use crate::loader::Loader;
use crate::models::SourceMetadata;

type HmacSha256 = Hmac<Sha256>;

pub struct S3Loader {
    bucket: String,
    prefix: String,
    region: String,
    endpoint_url: Option<String>,
    allowed: Vec<String>,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3Loader {
    pub fn new(
        bucket: String,
        prefix: String,
        region: String,
        endpoint_url: Option<String>,
        allowed: Vec<String>,
    ) -> Result<Self> {
        Ok(Self {
            bucket,
            prefix,
            region,
            endpoint_url,
            allowed,
            creds: AwsCredentials::from_env()?,
            client: reqwest::Client::new(),
        })
    }

    fn host(&self) -> String {
        match &self.endpoint_url {
            Some(endpoint) => endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string(),
            None => format!("{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }

    fn extension_of(key: &str) -> String {
        let name = key.rsplit('/').next().unwrap_or(key);
        match name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => format!(".{}", ext.to_lowercase()),
            _ => String::new(),
        }
    }

    /// Domain is the first path segment of the key after the configured
    /// prefix, falling back to `"general"` for objects directly under it.
    fn domain_of(&self, key: &str) -> String {
        let rel = key
            .strip_prefix(self.prefix.trim_end_matches('/'))
            .map(|s| s.trim_start_matches('/'))
            .unwrap_or(key);
        match rel.split_once('/') {
            Some((first, _)) if !first.is_empty() => first.to_string(),
            _ => "general".to_string(),
        }
    }

    fn metadata_for(&self, key: &str) -> SourceMetadata {
        let title = key.rsplit('/').next().unwrap_or(key).to_string();
        SourceMetadata {
            source: format!("s3://{}/{}", self.bucket, key),
            title: Some(title),
            url: Some(format!("https://{}.s3.amazonaws.com/{}", self.bucket, key)),
            extension: Some(Self::extension_of(key)),
            domain: Some(self.domain_of(key)),
            tags: vec!["s3".to_string()],
            page_number: None,
        }
    }

    /// One page of `ListObjectsV2`. Returns keys plus the continuation token
    /// when the listing is truncated.
    async fn list_page(&self, continuation: Option<&str>) -> Result<(Vec<String>, Option<String>)> {
        let mut query_params = vec![
            ("list-type".to_string(), "2".to_string()),
            ("max-keys".to_string(), "1000".to_string()),
        ];
        if !self.prefix.is_empty() {
            query_params.push(("prefix".to_string(), self.prefix.clone()));
        }
        if let Some(token) = continuation {
            query_params.push(("continuation-token".to_string(), token.to_string()));
        }
        query_params.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical_querystring: String = query_params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let signed = self.sign_get("/", &canonical_querystring);
        let full_url = format!("https://{}/?{}", self.host(), canonical_querystring);

        let mut req = self
            .client
            .get(&full_url)
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date);
        if let Some(token) = &self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }

        let resp = req.send().await.with_context(|| {
            format!("Failed to list s3://{}/{}", self.bucket, self.prefix)
        })?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 ListObjectsV2 failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        let xml = resp.text().await?;
        parse_list_response(&xml)
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("/{}", encoded_key);
        let signed = self.sign_get(&canonical_uri, "");
        let url = format!("https://{}/{}", self.host(), encoded_key);

        let mut req = self
            .client
            .get(&url)
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date);
        if let Some(token) = &self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", self.bucket, key))?;
        if !resp.status().is_success() {
            bail!("S3 GetObject failed (HTTP {}) for key '{}'", resp.status(), key);
        }
        Ok(resp.bytes().await?.to_vec())
    }

    /// AWS SigV4 for an empty-payload GET request.
    fn sign_get(&self, canonical_uri: &str, canonical_querystring: &str) -> SignedRequest {
        let host = self.host();
        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(b"");

        let mut headers = vec![
            ("host".to_string(), host),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(token) = &self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String =
            headers.iter().map(|(k, v)| format!("{}:{}\n", k, v)).collect();

        let canonical_request = format!(
            "GET\n{}\n{}\n{}\n{}\n{}",
            canonical_uri, canonical_querystring, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        SignedRequest {
            authorization: format!(
                "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
                self.creds.access_key_id, credential_scope, signed_headers, signature
            ),
            amz_date,
            payload_hash,
        }
    }
}

#[async_trait]
impl Loader for S3Loader {
    fn name(&self) -> &str {
        "s3"
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let (batch, next) = self.list_page(continuation.as_deref()).await?;
            keys.extend(batch);
            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        keys.retain(|k| self.allowed.contains(&Self::extension_of(k)));
        keys.sort();
        Ok(keys)
    }

    async fn load(&self, key: &str) -> (String, SourceMetadata) {
        let bytes = match self.download(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "download failed, skipping object");
                return (String::new(), SourceMetadata::default());
            }
        };

        let ext = Self::extension_of(key);
        let text = if extract::is_binary_extension(&ext) {
            match extract::extract_text(&bytes, &ext) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(key, error = %e, "extraction failed, skipping object");
                    return (String::new(), SourceMetadata::default());
                }
            }
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };

        (text, self.metadata_for(key))
    }
}

struct SignedRequest {
    authorization: String,
    amz_date: String,
    payload_hash: String,
}

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();
        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// `kSigning = HMAC(HMAC(HMAC(HMAC("AWS4"+secret, date), region), service), "aws4_request")`
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode per RFC 3986, leaving only unreserved characters.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

/// Parse a `ListObjectsV2` response: object keys (directories excluded) plus
/// the continuation token when truncated.
fn parse_list_response(xml: &str) -> Result<(Vec<String>, Option<String>)> {
    let mut keys = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<&'static str> = None;
    let mut is_truncated = false;
    let mut next_token: Option<String> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                current = match e.local_name().as_ref() {
                    b"Key" => Some("key"),
                    b"IsTruncated" => Some("truncated"),
                    b"NextContinuationToken" => Some("token"),
                    _ => None,
                };
            }
            Ok(quick_xml::events::Event::Text(te)) => {
                let value = te.unescape().unwrap_or_default().into_owned();
                match current {
                    Some("key") => {
                        if !value.ends_with('/') {
                            keys.push(value);
                        }
                    }
                    Some("truncated") => is_truncated = value == "true",
                    Some("token") => next_token = Some(value),
                    _ => {}
                }
            }
            Ok(quick_xml::events::Event::End(_)) => current = None,
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => bail!("Failed to parse S3 listing XML: {}", e),
            _ => {}
        }
        buf.clear();
    }
    Ok((keys, if is_truncated { next_token } else { None }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_key_matches_aws_reference_vector() {
        // Example from the AWS SigV4 documentation.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20150830",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn uri_encoding_is_rfc3986() {
        assert_eq!(uri_encode("a b/c~d"), "a%20b%2Fc~d");
        assert_eq!(uri_encode("key-1_2.txt"), "key-1_2.txt");
    }

    #[test]
    fn list_response_parsing_with_pagination() {
        let xml = r#"<?xml version="1.0"?>
<ListBucketResult>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>tok123</NextContinuationToken>
  <Contents><Key>docs/a.md</Key></Contents>
  <Contents><Key>docs/sub/</Key></Contents>
  <Contents><Key>docs/b.txt</Key></Contents>
</ListBucketResult>"#;
        let (keys, token) = parse_list_response(xml).unwrap();
        assert_eq!(keys, vec!["docs/a.md", "docs/b.txt"]);
        assert_eq!(token.as_deref(), Some("tok123"));
    }

    #[test]
    fn list_response_final_page_has_no_token() {
        let xml = "<ListBucketResult><IsTruncated>false</IsTruncated><Contents><Key>k.md</Key></Contents></ListBucketResult>";
        let (keys, token) = parse_list_response(xml).unwrap();
        assert_eq!(keys, vec!["k.md"]);
        assert!(token.is_none());
    }

    #[test]
    fn extension_and_domain_extraction() {
        assert_eq!(S3Loader::extension_of("docs/report.PDF"), ".pdf");
        assert_eq!(S3Loader::extension_of("docs/README"), "");
    }
}
