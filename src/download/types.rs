// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Download task types and the acquisition state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::DownloadStatusResponse;

/// Phase of a model acquisition.
///
/// Success path: `Starting → Downloading → DetectingCapabilities →
/// Registering → Completed`. User cancellation: `Downloading → Cancelling →
/// Cancelled`. Any phase can move to `Error`. `Completed`, `Cancelled`, and
/// `Error` are terminal; a task never leaves a terminal phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPhase {
    /// Accepted by the server, transfer not yet running.
    Starting,
    /// Bytes are moving.
    Downloading,
    /// Transfer done, server inspecting the model.
    DetectingCapabilities,
    /// Server registering the model in its registry.
    Registering,
    /// Successfully installed.
    Completed,
    /// Cancel requested, waiting for the server to confirm.
    Cancelling,
    /// Cancelled by the user.
    Cancelled,
    /// Failed, either server-side or because polling itself broke.
    Error,
}

impl DownloadPhase {
    /// Parse a wire status string. Unknown statuses yield `None` so callers
    /// can keep the current phase rather than guess.
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "starting" => Some(Self::Starting),
            "downloading" => Some(Self::Downloading),
            "detecting_capabilities" => Some(Self::DetectingCapabilities),
            "registering" => Some(Self::Registering),
            "completed" => Some(Self::Completed),
            "cancelling" => Some(Self::Cancelling),
            "cancelled" => Some(Self::Cancelled),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns true once no further transition can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }

    /// Returns true while the acquisition is still in flight.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Downloading => "downloading",
            Self::DetectingCapabilities => "detecting_capabilities",
            Self::Registering => "registering",
            Self::Completed => "completed",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

/// Client-side state for one model acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Server-assigned identifier, treated as opaque.
    pub download_id: String,
    /// Source repository (e.g. "acme/foo").
    pub repo_id: String,
    /// File within the repository.
    pub filename: String,
    /// Current phase.
    pub status: DownloadPhase,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub progress_percent: f64,
    /// Terminal error detail, when the server reported one.
    pub error: Option<String>,
    /// Registry id of the installed model, present once completed.
    pub model_id: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the status was last updated.
    pub updated_at: DateTime<Utc>,
}

impl DownloadTask {
    /// Create a task for an accepted start request. Starts in
    /// `Downloading` with zero progress; the first poll overwrites it.
    pub fn new(
        download_id: impl Into<String>,
        repo_id: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            download_id: download_id.into(),
            repo_id: repo_id.into(),
            filename: filename.into(),
            status: DownloadPhase::Downloading,
            downloaded_bytes: 0,
            total_bytes: 0,
            progress_percent: 0.0,
            error: None,
            model_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a new phase, refusing to leave a terminal one.
    pub fn update_status(&mut self, phase: DownloadPhase) {
        if self.status.is_terminal() {
            return;
        }
        self.status = phase;
        self.updated_at = Utc::now();
    }

    /// Overwrite progress and phase from a status poll.
    ///
    /// Two guards keep the phase monotonic: a terminal phase is never left,
    /// and once the task is locally `Cancelling` only terminal phases are
    /// accepted (a poll answered before the cancel landed server-side may
    /// still say `downloading`).
    pub fn apply_status(&mut self, response: &DownloadStatusResponse) {
        if self.status.is_terminal() {
            return;
        }

        self.downloaded_bytes = response.downloaded_bytes;
        self.total_bytes = response.total_bytes;
        self.progress_percent = response.progress_percent;
        if response.error.is_some() {
            self.error = response.error.clone();
        }
        if response.model_id.is_some() {
            self.model_id = response.model_id.clone();
        }

        match DownloadPhase::parse(&response.status) {
            Some(phase) => {
                if self.status == DownloadPhase::Cancelling && !phase.is_terminal() {
                    self.updated_at = Utc::now();
                    return;
                }
                self.status = phase;
                self.updated_at = Utc::now();
            }
            None => {
                tracing::warn!(
                    target: "download",
                    download_id = %self.download_id,
                    status = %response.status,
                    "Unknown download status from server; keeping current phase"
                );
            }
        }
    }

    /// Mark the task failed locally (used when polling itself breaks).
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = DownloadPhase::Error;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Human-readable progress line for display.
    pub fn progress_display(&self) -> String {
        if self.total_bytes > 0 {
            format!(
                "{} / {} ({:.1}%)",
                format_size(self.downloaded_bytes),
                format_size(self.total_bytes),
                self.progress_percent
            )
        } else {
            self.status.as_str().to_string()
        }
    }
}

/// Format a byte count for display.
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(phase: &str) -> DownloadStatusResponse {
        serde_json::from_value(serde_json::json!({ "status": phase })).unwrap()
    }

    #[test]
    fn test_phase_parse_round_trip() {
        for phase in [
            DownloadPhase::Starting,
            DownloadPhase::Downloading,
            DownloadPhase::DetectingCapabilities,
            DownloadPhase::Registering,
            DownloadPhase::Completed,
            DownloadPhase::Cancelling,
            DownloadPhase::Cancelled,
            DownloadPhase::Error,
        ] {
            assert_eq!(DownloadPhase::parse(phase.as_str()), Some(phase));
        }
        assert_eq!(DownloadPhase::parse("paused"), None);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(DownloadPhase::Completed.is_terminal());
        assert!(DownloadPhase::Cancelled.is_terminal());
        assert!(DownloadPhase::Error.is_terminal());
        assert!(DownloadPhase::Downloading.is_active());
        assert!(DownloadPhase::Cancelling.is_active());
    }

    #[test]
    fn test_apply_status_overwrites_progress() {
        let mut task = DownloadTask::new("d1", "acme/foo", "foo.gguf");
        let response: DownloadStatusResponse = serde_json::from_value(serde_json::json!({
            "status": "downloading",
            "downloaded_bytes": 1_000_000,
            "total_bytes": 4_000_000,
            "progress_percent": 25.0
        }))
        .unwrap();

        task.apply_status(&response);
        assert_eq!(task.status, DownloadPhase::Downloading);
        assert_eq!(task.downloaded_bytes, 1_000_000);
        assert_eq!(task.total_bytes, 4_000_000);
        assert_eq!(task.progress_percent, 25.0);
    }

    #[test]
    fn test_terminal_phase_never_regresses() {
        let mut task = DownloadTask::new("d1", "acme/foo", "foo.gguf");
        task.apply_status(&status("completed"));
        assert_eq!(task.status, DownloadPhase::Completed);

        task.apply_status(&status("downloading"));
        assert_eq!(task.status, DownloadPhase::Completed);

        task.update_status(DownloadPhase::Downloading);
        assert_eq!(task.status, DownloadPhase::Completed);

        task.fail("too late");
        assert_eq!(task.status, DownloadPhase::Completed);
        assert!(task.error.is_none());
    }

    #[test]
    fn test_cancelling_only_accepts_terminal_phases() {
        let mut task = DownloadTask::new("d1", "acme/foo", "foo.gguf");
        task.update_status(DownloadPhase::Cancelling);

        // A stale poll answered before the cancel landed.
        task.apply_status(&status("downloading"));
        assert_eq!(task.status, DownloadPhase::Cancelling);

        task.apply_status(&status("cancelled"));
        assert_eq!(task.status, DownloadPhase::Cancelled);
    }

    #[test]
    fn test_unknown_status_keeps_phase_but_takes_progress() {
        let mut task = DownloadTask::new("d1", "acme/foo", "foo.gguf");
        let response: DownloadStatusResponse = serde_json::from_value(serde_json::json!({
            "status": "defragmenting",
            "downloaded_bytes": 10,
            "total_bytes": 100,
            "progress_percent": 10.0
        }))
        .unwrap();
        task.apply_status(&response);
        assert_eq!(task.status, DownloadPhase::Downloading);
        assert_eq!(task.downloaded_bytes, 10);
    }

    #[test]
    fn test_fail_sets_error_state() {
        let mut task = DownloadTask::new("d1", "acme/foo", "foo.gguf");
        task.fail("poll failed");
        assert_eq!(task.status, DownloadPhase::Error);
        assert_eq!(task.error.as_deref(), Some("poll failed"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(1_048_576), "1.0 MB");
        assert_eq!(format_size(4_294_967_296), "4.0 GB");
    }
}
