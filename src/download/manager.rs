// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Download lifecycle management.
//!
//! [`DownloadManager`] owns the set of in-flight model acquisitions. Each
//! started download gets one background poll loop that refreshes the task
//! from the server until a terminal phase is reached, then removes the task
//! after a short grace period so observers can render the final state.
//!
//! Progress fans out through `tokio::sync::watch`: every started download
//! has one sender, and any number of [`DownloadHandle`]s can observe it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;

use crate::api::{ApiClient, ApiError};
use crate::config::ClientConfig;
use crate::download::types::{DownloadPhase, DownloadTask};
use crate::resources::ResourceStore;
use crate::sync::{resilient_read, resilient_write};

/// Observer side of one download.
///
/// Cheap to clone. The watch channel always holds the latest task state, so
/// a handle obtained late still sees current progress.
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    download_id: String,
    progress_rx: watch::Receiver<DownloadTask>,
}

impl DownloadHandle {
    pub fn download_id(&self) -> &str {
        &self.download_id
    }

    /// Latest known state of the task.
    pub fn progress(&self) -> DownloadTask {
        self.progress_rx.borrow().clone()
    }

    /// Whether the task has reached a terminal phase.
    pub fn is_complete(&self) -> bool {
        self.progress_rx.borrow().status.is_terminal()
    }

    /// Wait until the task reaches a terminal phase, returning it.
    pub async fn wait(&mut self) -> DownloadTask {
        loop {
            {
                let task = self.progress_rx.borrow();
                if task.status.is_terminal() {
                    return task.clone();
                }
            }
            if self.progress_rx.changed().await.is_err() {
                // Sender dropped; whatever we last saw is final.
                return self.progress_rx.borrow().clone();
            }
        }
    }
}

/// Coordinator for model downloads.
///
/// Cheap to clone; all clones share the same task table. One poll loop per
/// download, spawned at start time, is the single writer for that task.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    client: ApiClient,
    resources: ResourceStore,
    poll_interval: Duration,
    completed_grace: Duration,
    cancelled_grace: Duration,
    tasks: Arc<RwLock<HashMap<String, DownloadTask>>>,
    watchers: Arc<RwLock<HashMap<String, watch::Sender<DownloadTask>>>>,
    /// (repo, file) pairs reserved by starts whose server round trip is
    /// still in flight. Checked together with `tasks` under one lock scope
    /// so two concurrent starts cannot both pass the duplicate scan.
    pending: Arc<RwLock<HashSet<(String, String)>>>,
}

impl DownloadManager {
    pub fn new(client: ApiClient, resources: ResourceStore, config: &ClientConfig) -> Self {
        Self {
            client,
            resources,
            poll_interval: config.poll_interval(),
            completed_grace: config.completed_grace(),
            cancelled_grace: config.cancelled_grace(),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            watchers: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Tasks that have not yet been removed, newest first.
    pub fn active_downloads(&self) -> Vec<DownloadTask> {
        let mut tasks: Vec<DownloadTask> =
            resilient_read(&self.tasks).values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Look up one task by download id.
    pub fn get(&self, download_id: &str) -> Option<DownloadTask> {
        resilient_read(&self.tasks).get(download_id).cloned()
    }

    /// Observer handle for an already-tracked download.
    pub fn handle(&self, download_id: &str) -> Option<DownloadHandle> {
        let rx = resilient_read(&self.watchers)
            .get(download_id)
            .map(|tx| tx.subscribe())?;
        Some(DownloadHandle {
            download_id: download_id.to_string(),
            progress_rx: rx,
        })
    }

    /// Start downloading a model file and begin polling its status.
    ///
    /// A second start for a (repo, file) pair whose task is still active is
    /// rejected locally without a server round trip. If the server maps the
    /// request onto a download we already track, the existing task keeps its
    /// poll loop and a fresh handle to it is returned.
    pub async fn start(
        &self,
        repo_id: &str,
        filename: &str,
    ) -> Result<DownloadHandle, ApiError> {
        let key = (repo_id.to_string(), filename.to_string());
        {
            let tasks = resilient_read(&self.tasks);
            let mut pending = resilient_write(&self.pending);
            if pending.contains(&key)
                || tasks.values().any(|t| {
                    t.repo_id == repo_id && t.filename == filename && t.status.is_active()
                })
            {
                return Err(ApiError::DuplicateDownload {
                    repo_id: repo_id.to_string(),
                    filename: filename.to_string(),
                });
            }
            // Reserve the pair until the task is in the table.
            pending.insert(key.clone());
        }

        let response = match self.client.start_download(repo_id, filename).await {
            Ok(response) => response,
            Err(e) => {
                resilient_write(&self.pending).remove(&key);
                return Err(e);
            }
        };
        let download_id = response.download_id;

        if let Some(handle) = self.handle(&download_id) {
            // Server resumed an acquisition we already poll.
            resilient_write(&self.pending).remove(&key);
            return Ok(handle);
        }

        let task = DownloadTask::new(download_id.clone(), repo_id, filename);
        let (tx, rx) = watch::channel(task.clone());
        resilient_write(&self.tasks).insert(download_id.clone(), task);
        resilient_write(&self.watchers).insert(download_id.clone(), tx);
        resilient_write(&self.pending).remove(&key);

        tracing::info!(
            target: "download",
            download_id = %download_id,
            repo_id,
            filename,
            "Download started"
        );

        let manager = self.clone();
        let poll_id = download_id.clone();
        tokio::spawn(async move {
            manager.poll_loop(&poll_id).await;
        });

        Ok(DownloadHandle {
            download_id,
            progress_rx: rx,
        })
    }

    /// Request cancellation of an in-flight download.
    ///
    /// The task moves to `Cancelling` immediately so observers reflect the
    /// intent; the poll loop picks up the server's terminal answer. If the
    /// cancel call itself fails, the flip is undone so the task resumes its
    /// prior phase instead of staying parked in `Cancelling`.
    pub async fn cancel(&self, download_id: &str) -> Result<(), ApiError> {
        let flipped = {
            let mut tasks = resilient_write(&self.tasks);
            match tasks.get_mut(download_id) {
                Some(task) if task.status.is_active() => {
                    let prior = task.status;
                    task.update_status(DownloadPhase::Cancelling);
                    Some((prior, task.clone()))
                }
                _ => None,
            }
        };
        let Some((prior, task)) = flipped else {
            return Ok(());
        };
        self.notify(download_id, &task);

        if let Err(e) = self.client.cancel_download(download_id).await {
            // The cancel never reached the server; undo the flip so normal
            // polling carries the task forward from its prior phase.
            let reverted = {
                let mut tasks = resilient_write(&self.tasks);
                tasks.get_mut(download_id).and_then(|task| {
                    if task.status == DownloadPhase::Cancelling {
                        task.status = prior;
                        task.updated_at = chrono::Utc::now();
                        Some(task.clone())
                    } else {
                        None
                    }
                })
            };
            if let Some(task) = reverted {
                self.notify(download_id, &task);
            }
            tracing::warn!(
                target: "download",
                download_id,
                error = %e,
                "Cancel request failed; download continues"
            );
            return Err(e);
        }
        tracing::info!(target: "download", download_id, "Cancel requested");
        Ok(())
    }

    /// Background loop: poll status until terminal, then schedule removal.
    async fn poll_loop(&self, download_id: &str) {
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let status = match self.client.download_status(download_id).await {
                Ok(status) => status,
                Err(e) => {
                    // Losing the poll channel means we can no longer say
                    // anything truthful about progress.
                    tracing::warn!(
                        target: "download",
                        download_id,
                        error = %e,
                        "Status poll failed; marking download as errored"
                    );
                    let failed = {
                        let mut tasks = resilient_write(&self.tasks);
                        tasks.get_mut(download_id).map(|task| {
                            task.fail(format!("status polling failed: {}", e));
                            task.clone()
                        })
                    };
                    if let Some(task) = failed {
                        self.notify(download_id, &task);
                        self.schedule_removal(download_id, self.cancelled_grace);
                    }
                    return;
                }
            };

            let updated = {
                let mut tasks = resilient_write(&self.tasks);
                match tasks.get_mut(download_id) {
                    Some(task) => {
                        task.apply_status(&status);
                        Some(task.clone())
                    }
                    // Removed while we slept; stop polling.
                    None => None,
                }
            };
            let Some(task) = updated else {
                return;
            };
            self.notify(download_id, &task);

            if task.status.is_terminal() {
                self.finish(download_id, &task).await;
                return;
            }
        }
    }

    /// Terminal bookkeeping: refresh models on success, then schedule the
    /// task's removal after the grace period for its outcome.
    async fn finish(&self, download_id: &str, task: &DownloadTask) {
        match task.status {
            DownloadPhase::Completed => {
                tracing::info!(
                    target: "download",
                    download_id,
                    model_id = task.model_id.as_deref().unwrap_or(""),
                    "Download completed"
                );
                if let Err(e) = self.resources.refresh_models().await {
                    tracing::warn!(
                        target: "download",
                        download_id,
                        error = %e,
                        "Model refresh after completion failed"
                    );
                }
                self.schedule_removal(download_id, self.completed_grace);
            }
            DownloadPhase::Cancelled => {
                tracing::info!(target: "download", download_id, "Download cancelled");
                self.schedule_removal(download_id, self.cancelled_grace);
            }
            _ => {
                tracing::warn!(
                    target: "download",
                    download_id,
                    error = task.error.as_deref().unwrap_or("unknown"),
                    "Download failed"
                );
                self.schedule_removal(download_id, self.cancelled_grace);
            }
        }
    }

    /// Drop the task and its watcher after `grace`, letting observers render
    /// the terminal state first. A no-op if the task is already gone.
    fn schedule_removal(&self, download_id: &str, grace: Duration) {
        let manager = self.clone();
        let download_id = download_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            resilient_write(&manager.tasks).remove(&download_id);
            resilient_write(&manager.watchers).remove(&download_id);
            tracing::debug!(target: "download", download_id = %download_id, "Download task removed");
        });
    }

    fn notify(&self, download_id: &str, task: &DownloadTask) {
        if let Some(tx) = resilient_read(&self.watchers).get(download_id) {
            let _ = tx.send(task.clone());
        }
    }
}
