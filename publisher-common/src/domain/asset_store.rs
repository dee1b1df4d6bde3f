// This file is part of dkg-publisher.
// Copyright (C) 2025 AgentDKG Contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::{
    Asset, AssetStatus, AttemptResult, Batch, FailureRate, LeasedWallet, NewAsset,
    PublishingAttempt,
};
use std::time::Duration;
use thiserror::Error;

/// Durable state of assets, attempts and retries. Every operation is single-row-atomic unless
/// noted; conditional updates express their precondition in the predicate, so a concurrent actor
/// losing a race observes [AssetStoreError::InvalidTransition] or a `false` return and must treat
/// it as benign.
#[trait_variant::make(Send)]
pub trait AssetStore
where
    Self: Clone + Send + Sync + 'static,
{
    /// Insert a new asset with status `queued`. No jobs are enqueued here; scheduling is the
    /// queue poller's business alone.
    async fn register(&self, new_asset: NewAsset) -> Result<Asset, AssetStoreError>;

    /// Get an asset by id.
    async fn get(&self, id: i64) -> Result<Option<Asset>, AssetStoreError>;

    /// List assets of the given source, newest first.
    async fn list_by_source(
        &self,
        source: &str,
        filter: SourceFilter,
    ) -> Result<Vec<Asset>, AssetStoreError>;

    /// Queued assets ready for scheduling, ordered by priority (descending) then queue time
    /// (ascending), limited. Read-only.
    async fn pending_for_scheduling(&self, limit: u64) -> Result<Vec<Asset>, AssetStoreError>;

    /// Atomically claim a queued asset for processing, transitioning it to `assigned`. Returns
    /// `false` if the asset was claimed elsewhere, is terminal, or has exhausted its retry
    /// budget; in the latter case the asset is transitioned to permanent `failed` here.
    async fn claim_for_processing(&self, id: i64) -> Result<bool, AssetStoreError>;

    /// Conditional transition `assigned|queued|failed → publishing`.
    async fn mark_publishing(&self, id: i64) -> Result<(), AssetStoreError>;

    /// Terminal success: stores the UAL and publish-site metadata and clears the error. The
    /// transition is write-once; a second call fails.
    async fn mark_published(
        &self,
        id: i64,
        ual: &str,
        transaction_hash: Option<&str>,
        blockchain: &str,
    ) -> Result<(), AssetStoreError>;

    /// Settle a failed attempt: within the retry budget the asset returns to `queued` with
    /// cleared assignment, otherwise it becomes permanently `failed`.
    async fn handle_failure(
        &self,
        id: i64,
        error_message: &str,
    ) -> Result<FailureOutcome, AssetStoreError>;

    /// Non-terminal assets stuck in the given stage for longer than `older_than`.
    async fn stuck_assets(
        &self,
        kind: StuckKind,
        older_than: Duration,
    ) -> Result<Vec<Asset>, AssetStoreError>;

    /// Atomically reset a stuck `assigned` asset back to `queued`, clearing its assignment and
    /// unlocking the referenced wallet in the same transaction. Returns `false` if the asset
    /// moved on in the meantime.
    async fn rescue_assigned(&self, id: i64, last_error: &str) -> Result<bool, AssetStoreError>;

    /// Record the start of a publish try and bump the asset's attempt counter. Returns the
    /// attempt id.
    async fn record_attempt(
        &self,
        asset_id: i64,
        worker_id: &str,
        wallet: &LeasedWallet,
        otnode_url: &str,
    ) -> Result<i64, AssetStoreError>;

    /// Write the terminal outcome onto a started attempt.
    async fn update_attempt(
        &self,
        attempt_id: i64,
        result: AttemptResult,
    ) -> Result<(), AssetStoreError>;

    /// The most recent attempt for the given asset.
    async fn latest_attempt(
        &self,
        asset_id: i64,
    ) -> Result<Option<PublishingAttempt>, AssetStoreError>;

    /// Bulk re-queue of `failed` assets matching the criteria, resetting their retry counters.
    /// Returns the number of affected assets.
    async fn retry_failed(&self, criteria: RetryCriteria) -> Result<u64, AssetStoreError>;

    /// Attempt counts completed within the given window, for failure-rate alerting.
    async fn failure_rate(&self, window: Duration) -> Result<FailureRate, AssetStoreError>;

    /// Recompute the hourly attempt rollup for the current hour.
    async fn rollup_metrics(&self) -> Result<(), AssetStoreError>;

    /// Create a batch for grouped registration.
    async fn create_batch(
        &self,
        name: Option<&str>,
        source: Option<&str>,
    ) -> Result<Batch, AssetStoreError>;

    /// Get a batch by id.
    async fn get_batch(&self, id: i64) -> Result<Option<Batch>, AssetStoreError>;
}

/// Stage a stuck asset is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckKind {
    /// `assigned` without publishing having started.
    Assigned,

    /// `publishing` for too long.
    Publishing,
}

/// Outcome of [AssetStore::handle_failure].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The asset returned to `queued`; one more retry has been consumed.
    Requeued { retry_count: i32 },

    /// The retry budget is exhausted; the asset is permanently `failed`.
    Terminal,
}

/// Filter for [AssetStore::list_by_source].
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceFilter {
    pub status: Option<AssetStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Criteria for [AssetStore::retry_failed].
#[derive(Debug, Clone, Default)]
pub struct RetryCriteria {
    pub source: Option<String>,
    pub max_attempts: Option<u32>,
}

/// Error possibly returned by [AssetStore] operations.
#[derive(Debug, Error)]
pub enum AssetStoreError {
    #[error("asset {0} not found")]
    NotFound(i64),

    #[error("attempt {0} not found")]
    AttemptNotFound(i64),

    #[error("invalid transition for asset {id} in status {found:?}")]
    InvalidTransition { id: i64, found: AssetStatus },

    #[error("UAL must not be empty")]
    EmptyUal,

    #[error("storage fault")]
    Storage(#[from] sqlx::Error),
}
