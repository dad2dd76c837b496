//! Upload-then-train flow for building the knowledge base.

use std::path::Path;

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::job::{TrainingJob, TrainingRequest, UploadedFile};

/// Extensions accepted for training, with the MIME type sent on upload.
pub const ACCEPTED_FILE_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("doc", "application/msword"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("csv", "text/csv"),
    ("json", "application/json"),
];

pub fn accepted_file_type(path: &Path) -> Result<&'static str, ApiError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    ACCEPTED_FILE_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .ok_or_else(|| {
            let accepted: Vec<&str> = ACCEPTED_FILE_TYPES.iter().map(|(e, _)| *e).collect();
            ApiError::Validation(format!(
                "unsupported file type {:?}; accepted: {}",
                path.file_name().unwrap_or_default(),
                accepted.join(", ")
            ))
        })
}

/// Local view of uploaded documents and the training jobs started from them.
#[derive(Debug, Default, Clone)]
pub struct TrainingWorkspace {
    pub uploaded_files: Vec<UploadedFile>,
    pub training_jobs: Vec<TrainingJob>,
}

impl TrainingWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn refresh_files(&mut self, client: &ApiClient) -> Result<(), ApiError> {
        self.uploaded_files = client.list_training_files().await?;
        Ok(())
    }

    pub async fn refresh_jobs(&mut self, client: &ApiClient) -> Result<(), ApiError> {
        self.training_jobs = client.training_jobs().await?;
        Ok(())
    }

    /// Upload one document and record what the server stored.
    pub async fn upload(
        &mut self,
        client: &ApiClient,
        path: &Path,
    ) -> Result<&[UploadedFile], ApiError> {
        let stored = client.upload_training_file(path).await?;
        let start = self.uploaded_files.len();
        self.uploaded_files.extend(stored);
        Ok(&self.uploaded_files[start..])
    }

    /// Start a training run over every uploaded document.
    ///
    /// Issues exactly one request; on success a `queued` job is appended locally
    /// until the next poll replaces it with the server's copy.
    pub async fn start_training(
        &mut self,
        client: &ApiClient,
        name: &str,
    ) -> Result<&TrainingJob, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("training name is required".to_string()));
        }
        if self.uploaded_files.is_empty() {
            return Err(ApiError::Validation(
                "upload at least one file before training".to_string(),
            ));
        }

        let request = TrainingRequest {
            name: name.to_string(),
            file_ids: self.uploaded_files.iter().map(|f| f.id.clone()).collect(),
        };
        let reply = client.start_training(&request).await?;
        if let Some(message) = &reply.message {
            log::info!("Training {} accepted: {}", reply.job_id, message);
        }

        let mut job = TrainingJob::queued(reply.job_id, name);
        if let Some(status) = reply.status {
            job.status = status;
        }
        self.training_jobs.push(job);
        Ok(&self.training_jobs[self.training_jobs.len() - 1])
    }
}
