use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::session::Status;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub user_prompt: String,
    #[serde(default)]
    pub template_version: Option<u8>, // 1, 2 or 3; switches template when it differs
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
    pub status: Status,
    pub template_version: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub status: Status,
    pub template_version: u8,
    pub has_template: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_url: Option<String>,
    pub turns: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeleteResponse {
    pub session_id: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TemplateInfo {
    pub id: u8,
    pub name: String,
    pub description: String,
    pub preview_url: String,
    pub customizable_elements: Vec<String>,
    pub required_elements: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TemplatesResponse {
    pub templates: Vec<TemplateInfo>,
}
