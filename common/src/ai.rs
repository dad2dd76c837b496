use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawServiceHealth {
    Status(String),
    Detailed {
        status: String,
        #[serde(default, alias = "message", alias = "error")]
        detail: Option<String>,
    },
}

/// Health of one backend dependency (model, vector DB, storage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawServiceHealth")]
pub struct ServiceHealth {
    pub status: String,
    pub detail: Option<String>,
}

impl From<RawServiceHealth> for ServiceHealth {
    fn from(raw: RawServiceHealth) -> Self {
        match raw {
            RawServiceHealth::Status(status) => Self { status, detail: None },
            RawServiceHealth::Detailed { status, detail } => Self { status, detail },
        }
    }
}

fn healthy_word(status: &str) -> bool {
    matches!(
        status.to_ascii_lowercase().as_str(),
        "healthy" | "ok" | "up" | "connected" | "available"
    )
}

impl ServiceHealth {
    pub fn is_healthy(&self) -> bool {
        healthy_word(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceHealth>,
}

impl HealthSnapshot {
    /// Healthy when the overall status and every reported service are healthy.
    pub fn is_healthy(&self) -> bool {
        healthy_word(&self.status) && self.services.values().all(ServiceHealth::is_healthy)
    }

    pub fn unhealthy_services(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, s)| !s.is_healthy())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    #[serde(default, alias = "count", alias = "objects")]
    pub object_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorDbStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub collections: Vec<CollectionInfo>,
    #[serde(default)]
    pub total_objects: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePreview {
    /// Empty when the server does not echo the id back.
    #[serde(default, alias = "id", deserialize_with = "crate::wire::de_id")]
    pub file_id: String,
    #[serde(default, alias = "name")]
    pub filename: Option<String>,
    #[serde(alias = "preview", alias = "content", alias = "extracted_text")]
    pub text: String,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSource {
    #[serde(alias = "filename", alias = "source")]
    pub title: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(alias = "answer", alias = "message")]
    pub response: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub sources: Vec<ChatSource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(alias = "text")]
    pub content: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, alias = "filename")]
    pub source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_accepts_plain_and_detailed_services() {
        let health: HealthSnapshot = serde_json::from_str(
            r#"{"status": "healthy", "services": {
                "ai_model": "ok",
                "vector_db": {"status": "unavailable", "message": "connection refused"}
            }}"#,
        )
        .unwrap();
        assert!(!health.is_healthy());
        assert_eq!(health.unhealthy_services(), vec!["vector_db"]);
        assert_eq!(
            health.services["vector_db"].detail.as_deref(),
            Some("connection refused")
        );
    }

    #[test]
    fn test_chat_reply_aliases() {
        let reply: ChatReply = serde_json::from_str(
            r#"{"answer": "Check the fuse.", "sources": [{"filename": "m.pdf"}]}"#,
        )
        .unwrap();
        assert_eq!(reply.response, "Check the fuse.");
        assert_eq!(reply.sources[0].title, "m.pdf");
    }

    #[test]
    fn test_preview_file_id() {
        let preview: FilePreview =
            serde_json::from_str(r#"{"id": 42, "filename": "pump.pdf", "preview": "Intro"}"#)
                .unwrap();
        assert_eq!(preview.file_id, "42");
        assert_eq!(preview.text, "Intro");

        let preview: FilePreview =
            serde_json::from_str(r#"{"file_id": "f-9", "content": "Body", "truncated": true}"#)
                .unwrap();
        assert_eq!(preview.file_id, "f-9");
        assert!(preview.truncated);

        let preview: FilePreview = serde_json::from_str(r#"{"text": "Only text"}"#).unwrap();
        assert!(preview.file_id.is_empty());
        assert_eq!(preview.filename, None);
    }
}
