// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! HTTP transport for the backend service.
//!
//! [`ApiClient`] performs exactly one HTTP exchange per call and maps every
//! failure into a typed [`ApiError`]. There is no retry logic at this layer;
//! retry policy, where it exists at all, belongs to callers. Every exchange
//! outcome is reported to the [`ConnectivityMonitor`] so the rest of the
//! application can distinguish "service not running" from "service returned
//! an error".
//!
//! # Example
//!
//! ```no_run
//! use leonard_client::api::ApiClient;
//! use leonard_client::config::ClientConfig;
//!
//! # async fn run() -> Result<(), leonard_client::api::ApiError> {
//! let client = ApiClient::new(&ClientConfig::default());
//! let health = client.health().await?;
//! println!("backend {} ({})", health.status, health.version);
//! # Ok(())
//! # }
//! ```

pub mod types;

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::health::ConnectivityMonitor;

use types::{
    CancelDownloadResponse, ChatReply, ChatRequest, ChatToolsResponse, DownloadRequest,
    DownloadStatusResponse, ErrorBody, HealthResponse, ModelRecord, ModelsResponse, SearchHit,
    SearchResponse, SkillRecord, StartDownloadResponse, StatusResponse, SuccessResponse,
    ToolRecord, ToolUpdateRequest, ToolsToggleRequest, ToolsToggleResponse,
};

/// Errors produced by the transport and the components built on it.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// Connection refused or reset: the service is not running.
    BackendUnreachable(String),
    /// Any other transport-level fault (timeout, I/O error, bad TLS, ...).
    TransportError(String),
    /// The service responded with a non-2xx status.
    ServerError { status: u16, detail: String },
    /// The response body could not be decoded into the expected shape.
    InvalidResponse(String),
    /// A download for the same (repo, file) pair is already active.
    DuplicateDownload { repo_id: String, filename: String },
}

impl ApiError {
    /// True when the failure means the service itself is down, as opposed to
    /// up and returning errors.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ApiError::BackendUnreachable(_))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BackendUnreachable(msg) => {
                write!(f, "Backend service is not running: {}", msg)
            }
            Self::TransportError(msg) => write!(f, "Transport error: {}", msg),
            Self::ServerError { status, detail } => {
                write!(f, "Server error (HTTP {}): {}", status, detail)
            }
            Self::InvalidResponse(msg) => write!(f, "Invalid response from backend: {}", msg),
            Self::DuplicateDownload { repo_id, filename } => {
                write!(f, "Download already active for {}/{}", repo_id, filename)
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// Client for the backend HTTP API.
///
/// Cheap to clone; the underlying connection pool and the connectivity
/// monitor are shared.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// Base URL for the backend API.
    base_url: String,
    /// HTTP client with configured timeouts.
    client: reqwest::Client,
    /// Reachability signal updated on every exchange.
    monitor: Arc<ConnectivityMonitor>,
}

impl ApiClient {
    /// Create a new client from the given config.
    pub fn new(config: &ClientConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            monitor: Arc::new(ConnectivityMonitor::new()),
        }
    }

    /// Base URL the client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The connectivity monitor fed by this client.
    pub fn monitor(&self) -> Arc<ConnectivityMonitor> {
        Arc::clone(&self.monitor)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a request-phase reqwest error into the taxonomy. Connection
    /// establishment failures and resets mean the service is not running;
    /// everything else is a generic transport fault.
    pub(crate) fn classify(error: reqwest::Error) -> ApiError {
        let text = error.to_string();
        if error.is_connect() || text.contains("connection reset") {
            ApiError::BackendUnreachable(text)
        } else {
            ApiError::TransportError(text)
        }
    }

    /// Perform one exchange: send the request, report the outcome to the
    /// connectivity monitor, and turn non-2xx statuses into `ServerError`.
    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = match request.send().await {
            Ok(response) => {
                // Any HTTP response at all means the service is up.
                self.monitor.record_success();
                response
            }
            Err(e) => {
                let error = Self::classify(e);
                if error.is_unreachable() {
                    self.monitor.record_unreachable();
                }
                return Err(error);
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = match response.json::<ErrorBody>().await {
            Ok(body) => body.detail,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };

        Err(ApiError::ServerError {
            status: status.as_u16(),
            detail,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
    ) -> Result<T, ApiError> {
        let response = self.execute(self.client.request(method, self.url(path))).await?;
        Self::decode(response).await
    }

    async fn request_json_with_body<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.client.request(method, self.url(path)).json(body);
        let response = self.execute(request).await?;
        Self::decode(response).await
    }

    // ── Endpoints ───────────────────────────────────────────────────────

    /// `GET /health`: liveness probe.
    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        self.request_json(Method::GET, "/health").await
    }

    /// `POST /chat`: one non-streaming exchange.
    pub async fn chat(
        &self,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatReply, ApiError> {
        let body = ChatRequest {
            message: message.to_string(),
            conversation_id: conversation_id.map(str::to_string),
            stream: None,
        };
        self.request_json_with_body(Method::POST, "/chat", &body).await
    }

    /// Open a streaming `POST /chat` exchange. Returns the raw response;
    /// the `chat` module turns it into a [`crate::chat::ChatStream`].
    ///
    /// A connection failure here, before any frame is read, surfaces as
    /// `BackendUnreachable` from the call itself.
    pub(crate) async fn open_chat_stream(
        &self,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<Response, ApiError> {
        let body = ChatRequest {
            message: message.to_string(),
            conversation_id: conversation_id.map(str::to_string),
            stream: Some(true),
        };
        let request = self
            .client
            .post(self.url("/chat"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body);
        self.execute(request).await
    }

    /// `POST /chat/clear`: drop server-side conversation state. The caller
    /// discards its local turn history independently.
    pub async fn clear_chat(&self) -> Result<StatusResponse, ApiError> {
        let request = self.client.post(self.url("/chat/clear"));
        let response = self.execute(request).await?;
        Self::decode(response).await
    }

    /// `GET /models`: list all registered models.
    pub async fn list_models(&self) -> Result<Vec<ModelRecord>, ApiError> {
        let response: ModelsResponse = self.request_json(Method::GET, "/models").await?;
        Ok(response.models)
    }

    /// `GET /models/search?q=&limit=`: search the hub for GGUF models.
    pub async fn search_models(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, ApiError> {
        let request = self
            .client
            .get(self.url("/models/search"))
            .query(&[("q", query), ("limit", &limit.to_string())]);
        let response = self.execute(request).await?;
        let decoded: SearchResponse = Self::decode(response).await?;
        Ok(decoded.models)
    }

    /// `POST /models/{id}/install`.
    pub async fn install_model(&self, model_id: &str) -> Result<SuccessResponse, ApiError> {
        let path = format!("/models/{}/install", model_id);
        let request = self.client.post(self.url(&path));
        let response = self.execute(request).await?;
        Self::decode(response).await
    }

    /// `DELETE /models/{id}`.
    pub async fn delete_model(&self, model_id: &str) -> Result<StatusResponse, ApiError> {
        let path = format!("/models/{}", model_id);
        self.request_json(Method::DELETE, &path).await
    }

    /// `POST /models/download {repo_id, filename}`: start an acquisition.
    pub async fn start_download(
        &self,
        repo_id: &str,
        filename: &str,
    ) -> Result<StartDownloadResponse, ApiError> {
        let body = DownloadRequest {
            repo_id: repo_id.to_string(),
            filename: filename.to_string(),
        };
        self.request_json_with_body(Method::POST, "/models/download", &body)
            .await
    }

    /// `GET /models/download/{id}/status`.
    pub async fn download_status(
        &self,
        download_id: &str,
    ) -> Result<DownloadStatusResponse, ApiError> {
        let path = format!("/models/download/{}/status", download_id);
        self.request_json(Method::GET, &path).await
    }

    /// `POST /models/download/{id}/cancel`.
    pub async fn cancel_download(
        &self,
        download_id: &str,
    ) -> Result<CancelDownloadResponse, ApiError> {
        let path = format!("/models/download/{}/cancel", download_id);
        let request = self.client.post(self.url(&path));
        let response = self.execute(request).await?;
        Self::decode(response).await
    }

    /// `GET /tools`: list MCP tools.
    pub async fn list_tools(&self) -> Result<Vec<ToolRecord>, ApiError> {
        self.request_json(Method::GET, "/tools").await
    }

    /// `PUT /tools/{id} {enabled}`: toggle one tool.
    pub async fn update_tool(
        &self,
        tool_id: &str,
        enabled: bool,
    ) -> Result<SuccessResponse, ApiError> {
        let path = format!("/tools/{}", tool_id);
        let body = ToolUpdateRequest { enabled };
        self.request_json_with_body(Method::PUT, &path, &body).await
    }

    /// `GET /chat/tools`: tools available to the orchestrator plus the
    /// global tool-execution switch.
    pub async fn chat_tools(&self) -> Result<ChatToolsResponse, ApiError> {
        self.request_json(Method::GET, "/chat/tools").await
    }

    /// `POST /chat/tools/toggle {enabled}`: flip the global switch.
    pub async fn toggle_chat_tools(
        &self,
        enabled: bool,
    ) -> Result<ToolsToggleResponse, ApiError> {
        let body = ToolsToggleRequest { enabled };
        self.request_json_with_body(Method::POST, "/chat/tools/toggle", &body)
            .await
    }

    /// `GET /skills`: list skills.
    pub async fn list_skills(&self) -> Result<Vec<SkillRecord>, ApiError> {
        self.request_json(Method::GET, "/skills").await
    }
}
