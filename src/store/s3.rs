//! S3-compatible content store (AWS S3, R2, MinIO)
//!
//! Containers are buckets and paths are object keys. "Directories" only exist
//! as key prefixes, so listing is a flat prefix scan.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};

use super::{object_key, trim_key, ContentStore};
use crate::config::StoreConfig;
use crate::error::{CmsError, Result};
use crate::mime;
use crate::types::{PageDetails, RawFile};

const NO_SUCH_BUCKET: &str = "NoSuchBucket";

/// Content store backed by an S3 bucket per container
#[derive(Clone)]
pub struct S3Store {
    client: S3Client,
}

impl S3Store {
    /// Build a client from the standard AWS environment, honoring a custom endpoint
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.region.as_deref() {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = config.endpoint.as_deref() {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(CmsError::Config(format!(
                    "store endpoint must be an http(s) URL, got '{}'",
                    endpoint
                )));
            }
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::info!(endpoint = ?config.endpoint, "S3 content store ready");
        Ok(Self {
            client: S3Client::from_conf(builder.build()),
        })
    }

    async fn fetch(&self, container: &str, key: &str) -> Result<Option<FetchedObject>> {
        let response = match self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                if err.code() == Some(NO_SUCH_BUCKET) {
                    return Ok(None);
                }
                let service_error = err.into_service_error();
                if service_error.is_no_such_key() {
                    return Ok(None);
                }
                return Err(CmsError::ContentStore(service_error.to_string()));
            }
        };

        let last_modified = response
            .last_modified()
            .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos()))
            .unwrap_or_else(Utc::now);
        let content_type = response.content_type().map(String::from);

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| CmsError::ContentStore(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(Some(FetchedObject {
            data,
            content_type,
            last_modified,
        }))
    }

    async fn exists(&self, container: &str, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(container)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.code() == Some(NO_SUCH_BUCKET) {
                    return Err(CmsError::ContainerNotFound(container.to_string()));
                }
                let service_error = err.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(CmsError::ContentStore(service_error.to_string()))
                }
            }
        }
    }
}

struct FetchedObject {
    data: Vec<u8>,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

/// Map a failed mutating call, singling out a missing bucket
fn mutation_error<E, R>(container: &str, err: SdkError<E, R>) -> CmsError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if err.code() == Some(NO_SUCH_BUCKET) {
        CmsError::ContainerNotFound(container.to_string())
    } else {
        CmsError::ContentStore(DisplayErrorContext(&err).to_string())
    }
}

#[async_trait]
impl ContentStore for S3Store {
    async fn get_text_file(&self, container: &str, path: &str) -> Result<PageDetails> {
        let key = trim_key(path);
        if container.trim().is_empty() || key.is_empty() {
            return Ok(PageDetails::missing(key));
        }

        match self.fetch(container.trim(), key).await? {
            Some(object) => {
                let content = String::from_utf8_lossy(&object.data).into_owned();
                Ok(PageDetails::new(key, content, object.last_modified))
            }
            None => Ok(PageDetails::missing(key)),
        }
    }

    async fn get_raw_file(&self, container: &str, path: &str) -> Result<RawFile> {
        let key = trim_key(path);
        if container.trim().is_empty() || key.is_empty() {
            return Ok(RawFile::empty());
        }

        let Some(object) = self.fetch(container.trim(), key).await? else {
            return Ok(RawFile::empty());
        };

        let filename = key.rsplit('/').next().unwrap_or(key).to_string();
        let content_type = object
            .content_type
            .unwrap_or_else(|| mime::content_type_for(&filename).to_string());
        Ok(RawFile {
            filename,
            content_type,
            data: object.data,
        })
    }

    async fn list_files(&self, container: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        if container.trim().is_empty() {
            return Ok(Vec::new());
        }

        let prefix = prefix.map(trim_key).filter(|p| !p.is_empty());
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = match self
                .client
                .list_objects_v2()
                .bucket(container.trim())
                .set_prefix(prefix.map(String::from))
                .set_continuation_token(continuation.take())
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) if err.code() == Some(NO_SUCH_BUCKET) => return Ok(Vec::new()),
                Err(err) => return Err(mutation_error(container, err)),
            };

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter(|key| !key.ends_with('/'))
                    .map(String::from),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn upload_file(
        &self,
        file: &RawFile,
        container: &str,
        sub_path: &str,
    ) -> Result<String> {
        if !file.is_valid() || container.trim().is_empty() {
            return Err(CmsError::UploadRejected(format!(
                "file '{}' has no name or no content",
                file.filename
            )));
        }

        let key = object_key(sub_path, &file.filename);
        let size = file.len();

        let response = self
            .client
            .put_object()
            .bucket(container.trim())
            .key(&key)
            .content_type(&file.content_type)
            .body(ByteStream::from(file.data.clone()))
            .send()
            .await
            .map_err(|e| mutation_error(container, e))?;

        let etag = response.e_tag().unwrap_or_default().to_string();
        tracing::debug!(
            "Uploaded {} bytes to s3://{}/{}",
            size,
            container.trim(),
            key
        );
        Ok(etag)
    }

    async fn delete_file(&self, container: &str, path: &str) -> Result<u64> {
        let key = trim_key(path);
        if container.trim().is_empty() || key.is_empty() {
            return Ok(0);
        }

        // S3 deletes are idempotent and never report whether the key existed
        if !self.exists(container.trim(), key).await? {
            return Ok(0);
        }

        self.client
            .delete_object()
            .bucket(container.trim())
            .key(key)
            .send()
            .await
            .map_err(|e| mutation_error(container, e))?;

        Ok(1)
    }
}
