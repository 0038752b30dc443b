// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! leonard-client - Client library for the Leonard local inference service
//!
//! Talks to a locally running Leonard backend over HTTP and keeps the
//! client-side state (conversation log, resource collections, download
//! tasks) synchronized with it.
//!
//! # Core Modules
//!
//! - [`api`] - HTTP transport, wire types, and failure classification
//! - [`chat`] - Conversation log and streaming reply consumption
//! - [`resources`] - Models, tools, and skills collections
//! - [`download`] - Background model download tracking
//! - [`health`] - Passive backend reachability signal
//! - [`config`] - Client configuration and timing knobs

pub mod api;
pub mod chat;
pub mod config;
pub mod download;
pub mod health;
pub mod resources;
pub mod sync;

// Re-export the transport surface
pub use api::{ApiClient, ApiError};

// Re-export chat types
pub use chat::{ChatStream, Conversation, ConversationTurn, TurnRole};

// Re-export resource types
pub use resources::{ResourceSnapshot, ResourceStore};

// Re-export download types
pub use download::{format_size, DownloadHandle, DownloadManager, DownloadPhase, DownloadTask};

// Re-export the connectivity monitor
pub use health::ConnectivityMonitor;

// Re-export configuration
pub use config::ClientConfig;
