// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Resource collections: models, tools, and skills.
//!
//! [`ResourceStore`] keeps the three collections synchronized with the
//! backend. A refresh pass fetches all three concurrently and isolates
//! per-resource failures: one fetch failing never prevents the other two
//! from landing. Fetches are full replacement, never merges, so records
//! removed server-side disappear locally.
//!
//! Local mutation happens only after the server confirms the corresponding
//! change; nothing is flipped optimistically.

use std::sync::{Arc, RwLock};

use crate::api::types::{ModelRecord, SearchHit, SkillRecord, SuccessResponse, ToolRecord};
use crate::api::{ApiClient, ApiError};
use crate::sync::{resilient_read, resilient_write};

/// Seed queries for the featured model rail.
const FEATURED_SEED_QUERIES: &[&str] = &[
    "llama gguf",
    "qwen gguf",
    "mistral gguf",
    "phi gguf",
    "gemma gguf",
];

/// Stop the featured lookup once this many distinct repos are collected.
const FEATURED_TARGET: usize = 5;

/// Per-seed search size for the featured lookup.
const FEATURED_SEARCH_LIMIT: usize = 8;

/// Point-in-time view of the resource state.
#[derive(Debug, Clone, Default)]
pub struct ResourceSnapshot {
    pub models: Vec<ModelRecord>,
    pub tools: Vec<ToolRecord>,
    pub skills: Vec<SkillRecord>,
    pub featured: Vec<SearchHit>,
    /// True while a refresh pass has fetches outstanding.
    pub loading: bool,
    /// Most recent fetch failure of the current pass, if any.
    pub last_error: Option<ApiError>,
}

#[derive(Debug, Default)]
struct ResourceState {
    models: Vec<ModelRecord>,
    tools: Vec<ToolRecord>,
    skills: Vec<SkillRecord>,
    featured: Vec<SearchHit>,
    featured_loaded: bool,
    loading: bool,
    last_error: Option<ApiError>,
}

/// Add hits to the featured list, deduplicating by repo identity.
/// Returns true once the target count is reached.
fn merge_featured(featured: &mut Vec<SearchHit>, hits: Vec<SearchHit>, target: usize) -> bool {
    for hit in hits {
        if featured.len() >= target {
            break;
        }
        if featured.iter().all(|f| f.repo_id != hit.repo_id) {
            featured.push(hit);
        }
    }
    featured.len() >= target
}

/// Owner of the model/tool/skill collections.
///
/// Cheap to clone; all clones share one state. Mutation goes through a
/// single update path per collection, and readers get cloned snapshots.
#[derive(Debug, Clone)]
pub struct ResourceStore {
    client: ApiClient,
    state: Arc<RwLock<ResourceState>>,
}

impl ResourceStore {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            state: Arc::new(RwLock::new(ResourceState::default())),
        }
    }

    /// The transport this store fetches through.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Consistent snapshot of all collections and the loading flag.
    pub fn snapshot(&self) -> ResourceSnapshot {
        let state = resilient_read(&self.state);
        ResourceSnapshot {
            models: state.models.clone(),
            tools: state.tools.clone(),
            skills: state.skills.clone(),
            featured: state.featured.clone(),
            loading: state.loading,
            last_error: state.last_error.clone(),
        }
    }

    pub fn models(&self) -> Vec<ModelRecord> {
        resilient_read(&self.state).models.clone()
    }

    pub fn tools(&self) -> Vec<ToolRecord> {
        resilient_read(&self.state).tools.clone()
    }

    pub fn skills(&self) -> Vec<SkillRecord> {
        resilient_read(&self.state).skills.clone()
    }

    pub fn featured(&self) -> Vec<SearchHit> {
        resilient_read(&self.state).featured.clone()
    }

    pub fn is_loading(&self) -> bool {
        resilient_read(&self.state).loading
    }

    pub fn last_error(&self) -> Option<ApiError> {
        resilient_read(&self.state).last_error.clone()
    }

    /// Refresh all three collections with one coordinated pass.
    ///
    /// The three fetches run concurrently and independently; a failure in
    /// one is recorded (last failure wins) while the others still replace
    /// their collections. The loading flag covers the whole pass.
    pub async fn refresh_all(&self) {
        {
            let mut state = resilient_write(&self.state);
            state.loading = true;
            state.last_error = None;
        }

        let (models, tools, skills) = tokio::join!(
            self.client.list_models(),
            self.client.list_tools(),
            self.client.list_skills(),
        );

        let mut state = resilient_write(&self.state);
        match models {
            Ok(records) => state.models = records,
            Err(e) => {
                tracing::warn!(target: "resources", error = %e, "Models fetch failed");
                state.last_error = Some(e);
            }
        }
        match tools {
            Ok(records) => state.tools = records,
            Err(e) => {
                tracing::warn!(target: "resources", error = %e, "Tools fetch failed");
                state.last_error = Some(e);
            }
        }
        match skills {
            Ok(records) => state.skills = records,
            Err(e) => {
                tracing::warn!(target: "resources", error = %e, "Skills fetch failed");
                state.last_error = Some(e);
            }
        }
        state.loading = false;
    }

    /// Refresh only the model collection (full replacement).
    pub async fn refresh_models(&self) -> Result<(), ApiError> {
        let models = self.client.list_models().await?;
        resilient_write(&self.state).models = models;
        Ok(())
    }

    /// Refresh only the tool collection (full replacement).
    pub async fn refresh_tools(&self) -> Result<(), ApiError> {
        let tools = self.client.list_tools().await?;
        resilient_write(&self.state).tools = tools;
        Ok(())
    }

    /// Refresh only the skill collection (full replacement).
    pub async fn refresh_skills(&self) -> Result<(), ApiError> {
        let skills = self.client.list_skills().await?;
        resilient_write(&self.state).skills = skills;
        Ok(())
    }

    /// Populate the featured model list, best effort.
    ///
    /// Runs one bounded search per seed query, stops early once
    /// [`FEATURED_TARGET`] distinct repos are collected, and silently skips
    /// seeds that fail. Idempotent: once a pass has run, later calls in the
    /// same session return the cached list.
    pub async fn load_featured(&self) -> Vec<SearchHit> {
        {
            let state = resilient_read(&self.state);
            if state.featured_loaded {
                return state.featured.clone();
            }
        }

        let mut collected: Vec<SearchHit> = Vec::new();
        for seed in FEATURED_SEED_QUERIES {
            match self.client.search_models(seed, FEATURED_SEARCH_LIMIT).await {
                Ok(hits) => {
                    if merge_featured(&mut collected, hits, FEATURED_TARGET) {
                        break;
                    }
                }
                Err(e) => {
                    // Best effort: a failed seed never aborts the pass.
                    tracing::debug!(target: "resources", seed, error = %e, "Featured seed skipped");
                }
            }
        }

        let mut state = resilient_write(&self.state);
        state.featured = collected;
        state.featured_loaded = true;
        state.featured.clone()
    }

    /// Install a registered model. On confirmation the model collection is
    /// refreshed so the new download state becomes visible.
    pub async fn install_model(&self, model_id: &str) -> Result<SuccessResponse, ApiError> {
        let response = self.client.install_model(model_id).await?;
        self.refresh_models().await?;
        Ok(response)
    }

    /// Remove a model. The local record disappears only after the server
    /// confirms the deletion.
    pub async fn remove_model(&self, model_id: &str) -> Result<(), ApiError> {
        self.client.delete_model(model_id).await?;
        resilient_write(&self.state)
            .models
            .retain(|m| m.id != model_id);
        Ok(())
    }

    /// Toggle one tool. The local record is mutated only on server
    /// confirmation; on failure it is left exactly as it was.
    pub async fn set_tool_enabled(&self, tool_id: &str, enabled: bool) -> Result<(), ApiError> {
        self.client.update_tool(tool_id, enabled).await?;
        let mut state = resilient_write(&self.state);
        if let Some(tool) = state.tools.iter_mut().find(|t| t.id == tool_id) {
            tool.enabled = enabled;
        }
        Ok(())
    }

    /// Whether tool execution is globally enabled for chat.
    pub async fn chat_tools_enabled(&self) -> Result<bool, ApiError> {
        Ok(self.client.chat_tools().await?.enabled)
    }

    /// Flip the global tool-execution switch. Returns the confirmed state.
    pub async fn set_chat_tools_enabled(&self, enabled: bool) -> Result<bool, ApiError> {
        Ok(self.client.toggle_chat_tools(enabled).await?.enabled)
    }
}
