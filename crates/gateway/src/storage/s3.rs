use super::sigv4::{self, AMZ_DATE_FORMAT, CanonicalRequest, Credentials, Signer};
use super::{ArtifactStore, StorageError, StoredArtifact, validate_key};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode, Url, header::AUTHORIZATION};
use std::collections::BTreeMap;

const SERVICE: &str = "s3";

/// S3-compatible object store. Objects are addressed virtual-hosted style on
/// AWS, or path style below a custom endpoint.
pub struct S3Store {
    client: reqwest::Client,
    bucket: String,
    region: String,
    endpoint: Option<Url>,
    credentials: Option<Credentials>,
}

impl S3Store {
    pub fn new(
        bucket: String,
        region: String,
        endpoint: Option<&str>,
        credentials: Option<Credentials>,
    ) -> anyhow::Result<Self> {
        let endpoint = endpoint.map(Url::parse).transpose()?;

        if credentials.is_none() {
            tracing::warn!(bucket = %bucket, "No AWS credentials found, S3 requests will be unsigned");
        }

        Ok(Self {
            client: reqwest::Client::builder().build()?,
            bucket,
            region,
            endpoint,
            credentials,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, key: &str) -> String {
        let key = sigv4::encode_key(key);
        match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.as_str().trim_end_matches('/'),
                self.bucket,
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<reqwest::Response, StorageError> {
        validate_key(key)?;
        let url = Url::parse(&self.object_url(key))
            .map_err(|_| StorageError::InvalidKey(key.to_string()))?;

        let now = Utc::now();
        let payload_hash = sigv4::sha256_hex(&body);

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host_header(&url));
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());
        headers.insert(
            "x-amz-date".to_string(),
            now.format(AMZ_DATE_FORMAT).to_string(),
        );
        if let Some(content_type) = content_type {
            headers.insert("content-type".to_string(), content_type.to_string());
        }

        let mut request = self.client.request(method.clone(), url.clone());

        if let Some(credentials) = &self.credentials {
            if let Some(token) = &credentials.session_token {
                headers.insert("x-amz-security-token".to_string(), token.clone());
            }
            let canonical = CanonicalRequest {
                method: method.as_str(),
                uri: url.path(),
                query: url.query().unwrap_or(""),
                headers: &headers,
                payload_hash: &payload_hash,
            };
            let authorization =
                Signer::new(credentials, &self.region, SERVICE).authorization(&canonical, now);
            request = request.header(AUTHORIZATION, authorization);
        }

        // reqwest derives Host from the URL
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            request = request.header(name.as_str(), value.as_str());
        }

        Ok(request.body(body).send().await?)
    }
}

/// Host header as signed: the port is included only when it is not the
/// scheme default.
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

#[async_trait]
impl ArtifactStore for S3Store {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredArtifact, StorageError> {
        let size = data.len();
        let response = self.send(Method::PUT, key, data, Some(content_type)).await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(key, status = status.as_u16(), "S3 upload rejected");
            return Err(StorageError::Status {
                status: status.as_u16(),
                key: key.to_string(),
            });
        }

        tracing::debug!(key, bytes = size, "Artifact uploaded to S3");

        Ok(StoredArtifact {
            key: key.to_string(),
            location: self.location(key),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.send(Method::GET, key, Vec::new(), None).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            status => Err(StorageError::Status {
                status: status.as_u16(),
                key: key.to_string(),
            }),
        }
    }

    fn location(&self, key: &str) -> String {
        self.object_url(key)
    }
}
