use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    error::{AppError, AppResult},
    models::UploadFile,
};

/// MediaUploader
///
/// Hosts resource files on the third-party media endpoint and hands back a
/// permanent URL. Uploads are unsigned, so nothing here can delete them again.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, file: &UploadFile) -> AppResult<String>;
}

pub type MediaState = Arc<dyn MediaUploader>;

/// PresetMediaUploader
///
/// Multipart POST of `file`, `upload_preset` and `folder` to the configured
/// endpoint. Success is a JSON body carrying `secure_url`.
pub struct PresetMediaUploader {
    client: reqwest::Client,
    endpoint: String,
    preset: String,
    folder: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    error: Option<UploadErrorBody>,
}

#[derive(Deserialize)]
struct UploadErrorBody {
    message: String,
}

impl PresetMediaUploader {
    pub fn new(endpoint: &str, preset: &str, folder: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            preset: preset.to_string(),
            folder: folder.to_string(),
        }
    }
}

#[async_trait]
impl MediaUploader for PresetMediaUploader {
    async fn upload(&self, file: &UploadFile) -> AppResult<String> {
        let mut part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        if !file.content_type.is_empty() {
            part = part
                .mime_str(&file.content_type)
                .map_err(|e| AppError::UploadFailed(format!("{}: {e}", file.file_name)))?;
        }

        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.preset.clone())
            .text("folder", self.folder.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::UploadFailed(format!("{}: {e}", file.file_name)))?;

        let status = response.status();
        let body = response
            .json::<UploadResponse>()
            .await
            .map_err(|e| AppError::UploadFailed(format!("{}: {e}", file.file_name)))?;

        match body.secure_url {
            Some(url) if status.is_success() => {
                tracing::debug!(file = %file.file_name, url = %url, "media upload complete");
                Ok(url)
            }
            _ => {
                let reason = body
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| format!("endpoint returned {status}"));
                Err(AppError::UploadFailed(format!(
                    "{}: {reason}",
                    file.file_name
                )))
            }
        }
    }
}

/// MockMediaUploader
///
/// Returns deterministic URLs and records them. `fail_after` makes every
/// upload past the first N fail, which is how tests reach the mid-batch
/// failure path.
#[derive(Default)]
pub struct MockMediaUploader {
    pub fail_after: Option<usize>,
    attempts: AtomicUsize,
    uploaded: Mutex<Vec<String>>,
}

impl MockMediaUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            ..Self::default()
        }
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MediaUploader for MockMediaUploader {
    async fn upload(&self, file: &UploadFile) -> AppResult<String> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| n >= limit) {
            return Err(AppError::UploadFailed(format!(
                "{}: Mock Media Error: Simulation requested",
                file.file_name
            )));
        }
        let url = format!(
            "https://media.test/semstore/resources/{}-{}",
            n, file.file_name
        );
        if let Ok(mut list) = self.uploaded.lock() {
            list.push(url.clone());
        }
        Ok(url)
    }
}
