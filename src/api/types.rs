// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Wire types for the backend HTTP API.
//!
//! All bodies are JSON. Errors from the service use `{"detail": "..."}` with
//! standard 400/404/500 status codes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `GET /health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// `POST /chat` request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// `POST /chat` non-streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub id: String,
    pub content: String,
    pub role: String,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub routing_reason: Option<String>,
}

/// A registered model, as returned by `GET /models`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelRecord {
    pub id: String,
    pub name: String,
    pub repo_id: String,
    pub filename: String,
    pub role: String,
    #[serde(default)]
    pub capabilities: HashMap<String, f64>,
    #[serde(default)]
    pub context_length: u32,
    pub is_downloaded: bool,
    #[serde(default)]
    pub local_path: Option<String>,
}

/// `GET /models` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelRecord>,
}

/// One GGUF file inside a search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GgufFile {
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub quantization: Option<String>,
}

/// One result from `GET /models/search`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub repo_id: String,
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub gguf_files: Vec<GgufFile>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `GET /models/search` response.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub models: Vec<SearchHit>,
}

/// `POST /models/download` request body.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadRequest {
    pub repo_id: String,
    pub filename: String,
}

/// `POST /models/download` response.
#[derive(Debug, Clone, Deserialize)]
pub struct StartDownloadResponse {
    pub status: String,
    pub download_id: String,
}

/// `GET /models/download/{id}/status` response.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadStatusResponse {
    pub status: String,
    #[serde(default)]
    pub downloaded_bytes: u64,
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default)]
    pub progress_percent: f64,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub capabilities: Option<HashMap<String, f64>>,
}

/// `POST /models/download/{id}/cancel` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelDownloadResponse {
    pub status: String,
    #[serde(default)]
    pub download_id: Option<String>,
}

/// An MCP tool, as returned by `GET /tools`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub enabled: bool,
}

/// A skill, as returned by `GET /skills`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub active: bool,
}

/// `PUT /tools/{id}` request body.
#[derive(Debug, Clone, Serialize)]
pub struct ToolUpdateRequest {
    pub enabled: bool,
}

/// Generic `{success, message?}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Generic `{status}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// `GET /chat/tools` response: the tools the orchestrator can call plus the
/// global tool-execution switch.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatToolsResponse {
    #[serde(default)]
    pub tools: Vec<serde_json::Value>,
    pub enabled: bool,
}

/// `POST /chat/tools/toggle` request body.
#[derive(Debug, Clone, Serialize)]
pub struct ToolsToggleRequest {
    pub enabled: bool,
}

/// `POST /chat/tools/toggle` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsToggleResponse {
    pub enabled: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body used by the service for non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
