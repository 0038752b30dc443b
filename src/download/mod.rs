// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Model download tracking.
//!
//! Downloads run server-side; this module mirrors their lifecycle on the
//! client. [`DownloadManager`] starts and cancels acquisitions and polls
//! their status in the background, [`DownloadTask`] is the per-download
//! state machine, and [`DownloadHandle`] lets callers observe progress
//! without holding any locks.

pub mod manager;
pub mod types;

pub use manager::{DownloadHandle, DownloadManager};
pub use types::{format_size, DownloadPhase, DownloadTask};
