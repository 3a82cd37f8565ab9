use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::sync::{Arc, Mutex};

use crate::{
    error::{AppError, AppResult},
    models::UploadFile,
};

// 1. StorageService Contract
/// StorageService
///
/// The blob store contract for profile photos. The real client
/// (`S3StorageClient`) and the in-memory mock (`MockStorageService`) are
/// interchangeable behind it.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in `Env::Local` to provision
    /// the MinIO bucket on startup.
    async fn ensure_bucket_exists(&self);

    /// Stores `file` as the profile photo of `owner_uid` under
    /// `profilePictures/{uid}` (replacing any earlier one) and returns its
    /// permanent public URL.
    async fn upload(&self, owner_uid: &str, file: &UploadFile) -> AppResult<String>;
}

/// Object key of a user's profile photo.
pub fn profile_photo_key(uid: &str) -> String {
    format!("profilePictures/{}", sanitize_key(uid))
}

// 2. The Real Implementation (S3/MinIO)
/// S3StorageClient
///
/// AWS SDK client pointed at any S3-compatible endpoint. `force_path_style`
/// keeps MinIO working.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_url: String,
}

impl S3StorageClient {
    /// new
    ///
    /// Constructs the S3 client using credentials and configuration from AppConfig.
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            // Path-style addressing (http://endpoint/bucket/key) for MinIO.
            .force_path_style(true)
            .build();

        let client = s3::Client::from_conf(config);

        Self {
            client,
            bucket_name: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// ensure_bucket_exists
    ///
    /// CreateBucket is idempotent, so this is safe to call at every startup.
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, "create_bucket skipped: {}", e);
        }
    }

    async fn upload(&self, owner_uid: &str, file: &UploadFile) -> AppResult<String> {
        let key = profile_photo_key(owner_uid);

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(&file.content_type)
            .body(ByteStream::from(file.bytes.clone()))
            .send()
            .await
            .map_err(|e| AppError::UploadFailed(format!("blob store put {key}: {e}")))?;

        Ok(format!("{}/{}", self.public_url, key))
    }
}

/// sanitize_key
///
/// Strips directory navigation (`..`, `.`) and empty segments from a key so
/// user input cannot escape its prefix.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 3. The Mock Implementation
/// MockStorageService
///
/// In-memory `StorageService` for tests. Remembers the key and size of every
/// stored object.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    objects: Arc<Mutex<Vec<(String, usize)>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn stored_objects(&self) -> Vec<(String, usize)> {
        self.objects.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn upload(&self, owner_uid: &str, file: &UploadFile) -> AppResult<String> {
        if self.should_fail {
            return Err(AppError::UploadFailed(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }
        let key = profile_photo_key(owner_uid);
        if let Ok(mut objects) = self.objects.lock() {
            objects.retain(|(existing, _)| existing != &key);
            objects.push((key.clone(), file.bytes.len()));
        }
        Ok(format!("http://localhost:9000/mock-bucket/{}", key))
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
