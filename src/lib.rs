// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Feature-Matrix Cache
//!
//! A snapshot cache and change-detection engine for slow-moving reference
//! datasets served by a read-only upstream API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Upstream API (read-only)                │
//! │  • Paginated record fetches, bounded timeout               │
//! │  • Optional entity-tag short-circuit (304 Not Modified)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    (one sync cycle per dataset)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Diff Engine (pure)                     │
//! │  • Identity keys from pipe-joined dimension values         │
//! │  • Created / Updated / Removed against stored snapshot     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                       (atomic replace)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Snapshot Store (CSV)                    │
//! │  • One snapshot + metadata sidecar per dataset             │
//! │  • One retained historical snapshot per calendar day       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                       (append, deduped)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Change Log (bounded CSV)                   │
//! │  • Newest-first, capped retention                          │
//! │  • Filterable queries, daily trend aggregation             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fmw_cache::{CacheConfig, CacheService, DatasetName, HttpFeatureApi};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CacheConfig {
//!         api_base_url: "http://backend.example.com/v1".into(),
//!         cache_dir: "./_cache".into(),
//!         ..Default::default()
//!     };
//!
//!     let api = Arc::new(HttpFeatureApi::new(&config)?);
//!     let service = CacheService::new(config, api)?;
//!
//!     let dataset = DatasetName::new("IMS", "VoLTE");
//!     let counts = service.sync(&dataset).await?;
//!     println!("added {} updated {} removed {}", counts.added, counts.updated, counts.removed);
//!
//!     // Reads never fail: missing or unreadable snapshots come back empty.
//!     let records = service.load(&dataset);
//!     println!("{} rows cached", records.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - **Fail-closed sync**: a fetch or parse failure aborts the cycle before
//!   any write; the last-known-good snapshot keeps being served
//! - **Atomic snapshots**: readers never observe a partially written file
//! - **Deterministic diffs**: same inputs, same changes, sorted by key
//! - **Bounded change log**: deduplicated, capped, newest-first
//! - **Staleness as status, not error**: stale data is served with an
//!   indicator, never withheld
//!
//! ## Modules
//!
//! - [`service`]: The main [`CacheService`] orchestrating sync cycles
//! - [`api`]: The [`FeatureApi`] upstream seam and its HTTP implementation
//! - [`diff`]: Pure snapshot diffing and change records
//! - [`identity`]: Identity-key derivation from record dimensions
//! - [`snapshot`]: Atomic CSV snapshot store with daily retention
//! - [`changelog`]: Bounded change log with queries and trends
//! - [`staleness`]: Freshness policy
//! - [`record`]: The feature record and dataset naming

pub mod api;
pub mod changelog;
pub mod config;
pub mod diff;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod record;
pub mod service;
pub mod snapshot;
pub mod staleness;

pub use api::{FeatureApi, FetchOutcome, HttpFeatureApi};
pub use changelog::{ChangeFilter, ChangeLog, DailyTrend, DEFAULT_CHANGELOG_CAP};
pub use config::CacheConfig;
pub use diff::{snapshot_diff, ChangeAction, ChangeRecord, SnapshotDiff, SyncCounts};
pub use error::{StorageError, SyncError};
pub use identity::{Dimension, KeySpec, DEFAULT_DIMENSIONS, KEY_DELIMITER};
pub use record::{DatasetName, FeatureRecord};
pub use service::{CacheService, SyncSummary};
pub use snapshot::{SnapshotStore, SyncMetadata};
pub use staleness::{needs_refresh, Freshness};
