use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::json;
use std::path::Path;

use super::{segment, ApiClient};
use crate::ai::{
    ChatReply, ChatRequest, FilePreview, HealthSnapshot, SearchHit, SearchRequest, VectorDbStatus,
};
use crate::error::ApiError;
use crate::job::{StartTrainingReply, TrainingJob, TrainingRequest, UploadedFile};
use crate::wire::{decode_list, decode_object};
use crate::workspace::accepted_file_type;

impl ApiClient {
    pub async fn health(&self) -> Result<HealthSnapshot, ApiError> {
        let body = self.get("/ai/health").await?;
        Ok(decode_object(&body)?)
    }

    /// Upload one training document. Returns the metadata the server recorded.
    pub async fn upload_training_file(&self, path: &Path) -> Result<Vec<UploadedFile>, ApiError> {
        let mime = accepted_file_type(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ApiError::Validation(format!("invalid file name: {:?}", path)))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        log::info!("Uploading {} ({} bytes, {})", name, bytes.len(), mime);

        let part = Part::bytes(bytes).file_name(name).mime_str(mime)?;
        let form = Form::new().part("files", part);
        let body = self
            .execute(self.request(Method::POST, "/ai/upload-training-data").multipart(form))
            .await?;
        Ok(decode_list(&body, "files")?)
    }

    pub async fn list_training_files(&self) -> Result<Vec<UploadedFile>, ApiError> {
        let body = self.get("/ai/training-files").await?;
        Ok(decode_list(&body, "files")?)
    }

    pub async fn delete_training_file(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/ai/training-files/{}", segment(id)?);
        self.send_empty(Method::DELETE, &path).await?;
        Ok(())
    }

    /// Bulk delete; the body is always `{"file_ids": [...]}`.
    pub async fn delete_training_files(&self, ids: &[String]) -> Result<(), ApiError> {
        if ids.is_empty() {
            return Err(ApiError::Validation("no files selected".to_string()));
        }
        for id in ids {
            segment(id)?;
        }
        self.send_json(Method::DELETE, "/ai/training-files", &json!({ "file_ids": ids }))
            .await?;
        Ok(())
    }

    pub async fn preview_training_file(&self, id: &str) -> Result<FilePreview, ApiError> {
        let body = self.get(&format!("/ai/training-files/{}/preview", segment(id)?)).await?;
        Ok(decode_object(&body)?)
    }

    pub async fn start_training(
        &self,
        request: &TrainingRequest,
    ) -> Result<StartTrainingReply, ApiError> {
        let body = self.send_json(Method::POST, "/ai/start-training", request).await?;
        Ok(decode_object(&body)?)
    }

    pub async fn training_jobs(&self) -> Result<Vec<TrainingJob>, ApiError> {
        let body = self.get("/ai/training-jobs").await?;
        Ok(decode_list(&body, "jobs")?)
    }

    pub async fn vector_db_status(&self) -> Result<VectorDbStatus, ApiError> {
        let body = self.get("/ai/vector-database/status").await?;
        Ok(decode_object(&body)?)
    }

    pub async fn clear_vector_db(&self) -> Result<(), ApiError> {
        self.send_empty(Method::DELETE, "/ai/vector-database/clear").await?;
        Ok(())
    }

    pub async fn delete_collection(&self, name: &str) -> Result<(), ApiError> {
        let path = format!("/ai/vector-database/collection/{}", segment(name)?);
        self.send_empty(Method::DELETE, &path).await?;
        Ok(())
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        if request.message.trim().is_empty() {
            return Err(ApiError::Validation("message is empty".to_string()));
        }
        let body = self.send_json(Method::POST, "/ai/chat", request).await?;
        Ok(decode_object(&body)?)
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ApiError> {
        let request = SearchRequest { query: query.to_string(), limit };
        let body = self.send_json(Method::POST, "/ai/search", &request).await?;
        Ok(decode_list(&body, "results")?)
    }

    pub async fn suggestions(&self, message: &str) -> Result<Vec<String>, ApiError> {
        let body = self
            .send_json(Method::POST, "/ai/suggestions", &json!({ "message": message }))
            .await?;
        Ok(decode_list(&body, "suggestions")?)
    }
}
