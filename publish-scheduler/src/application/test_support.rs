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

//! Shared mock stores for the poller and health monitor tests.

use publisher_common::domain::{
    Asset, AssetStatus, AssetStore, AssetStoreError, AttemptResult, AttemptStatus, Batch,
    FailureOutcome, FailureRate, Job, JobQueue, LeasedWallet, NewAsset, Privacy, PublishEvent,
    Publisher, PublishingAttempt, QueueStats, RetryCriteria, SourceFilter, StuckKind, Wallet,
    WalletPool, WalletPoolError, WalletStats,
};
use secrecy::SecretString;
use std::{
    convert::Infallible,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use time::OffsetDateTime;

pub(crate) fn asset(id: i64, status: AssetStatus) -> Asset {
    Asset {
        id,
        content_url: format!("/tmp/content/{id}"),
        content_size: 1,
        source: None,
        source_id: None,
        batch_id: None,
        priority: 50,
        privacy: Privacy::Private,
        epochs: 2,
        replications: 1,
        max_attempts: 3,
        attempt_count: 1,
        retry_count: 0,
        status,
        wallet_id: Some(7),
        ual: None,
        transaction_hash: None,
        blockchain: None,
        last_error: None,
        created_at: OffsetDateTime::UNIX_EPOCH,
        queued_at: Some(OffsetDateTime::UNIX_EPOCH),
        assigned_at: None,
        publishing_started_at: None,
        published_at: None,
        next_retry_at: None,
        updated_at: OffsetDateTime::UNIX_EPOCH,
    }
}

pub(crate) fn started_attempt(id: i64, asset_id: i64) -> PublishingAttempt {
    PublishingAttempt {
        id,
        asset_id,
        attempt_number: 1,
        worker_id: "worker-0".to_string(),
        wallet_address: "0x00a3".to_string(),
        wallet_id: 7,
        otnode_url: "mock://otnode".to_string(),
        blockchain: "otp:2043".to_string(),
        status: AttemptStatus::Started,
        ual: None,
        transaction_hash: None,
        gas_used: None,
        error_type: None,
        error_message: None,
        started_at: OffsetDateTime::UNIX_EPOCH,
        completed_at: None,
        duration_seconds: None,
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockAssetState {
    pub queued: Vec<i64>,
    pub requested_limit: Option<u64>,
    pub stuck_assigned: Vec<Asset>,
    pub stuck_publishing: Vec<Asset>,
    pub rescued: Vec<i64>,
    pub attempt_updates: Vec<(i64, AttemptResult)>,
    pub failures: Vec<(i64, String)>,
    pub failure_outcome_terminal: bool,
    pub latest_attempt: Option<PublishingAttempt>,
    pub failure_rate: FailureRate,
    pub rollups: usize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockAssetStore(pub Arc<Mutex<MockAssetState>>);

impl MockAssetStore {
    pub fn state(&self) -> MutexGuard<'_, MockAssetState> {
        self.0.lock().expect("mutex is not poisoned")
    }
}

impl AssetStore for MockAssetStore {
    async fn register(&self, _new_asset: NewAsset) -> Result<Asset, AssetStoreError> {
        unimplemented!()
    }

    async fn get(&self, _id: i64) -> Result<Option<Asset>, AssetStoreError> {
        unimplemented!()
    }

    async fn list_by_source(
        &self,
        _source: &str,
        _filter: SourceFilter,
    ) -> Result<Vec<Asset>, AssetStoreError> {
        unimplemented!()
    }

    async fn pending_for_scheduling(&self, limit: u64) -> Result<Vec<Asset>, AssetStoreError> {
        let mut state = self.state();
        state.requested_limit = Some(limit);

        Ok(state
            .queued
            .iter()
            .take(limit as usize)
            .map(|&id| asset(id, AssetStatus::Queued))
            .collect())
    }

    async fn claim_for_processing(&self, _id: i64) -> Result<bool, AssetStoreError> {
        unimplemented!()
    }

    async fn mark_publishing(&self, _id: i64) -> Result<(), AssetStoreError> {
        unimplemented!()
    }

    async fn mark_published(
        &self,
        _id: i64,
        _ual: &str,
        _transaction_hash: Option<&str>,
        _blockchain: &str,
    ) -> Result<(), AssetStoreError> {
        unimplemented!()
    }

    async fn handle_failure(
        &self,
        id: i64,
        error_message: &str,
    ) -> Result<FailureOutcome, AssetStoreError> {
        let mut state = self.state();
        state.failures.push((id, error_message.to_string()));

        Ok(if state.failure_outcome_terminal {
            FailureOutcome::Terminal
        } else {
            FailureOutcome::Requeued { retry_count: 1 }
        })
    }

    async fn stuck_assets(
        &self,
        kind: StuckKind,
        _older_than: Duration,
    ) -> Result<Vec<Asset>, AssetStoreError> {
        let state = self.state();

        Ok(match kind {
            StuckKind::Assigned => state.stuck_assigned.clone(),
            StuckKind::Publishing => state.stuck_publishing.clone(),
        })
    }

    async fn rescue_assigned(&self, id: i64, _last_error: &str) -> Result<bool, AssetStoreError> {
        self.state().rescued.push(id);
        Ok(true)
    }

    async fn record_attempt(
        &self,
        _asset_id: i64,
        _worker_id: &str,
        _wallet: &LeasedWallet,
        _otnode_url: &str,
    ) -> Result<i64, AssetStoreError> {
        unimplemented!()
    }

    async fn update_attempt(
        &self,
        attempt_id: i64,
        result: AttemptResult,
    ) -> Result<(), AssetStoreError> {
        self.state().attempt_updates.push((attempt_id, result));
        Ok(())
    }

    async fn latest_attempt(
        &self,
        _asset_id: i64,
    ) -> Result<Option<PublishingAttempt>, AssetStoreError> {
        Ok(self.state().latest_attempt.clone())
    }

    async fn retry_failed(&self, _criteria: RetryCriteria) -> Result<u64, AssetStoreError> {
        unimplemented!()
    }

    async fn failure_rate(&self, _window: Duration) -> Result<FailureRate, AssetStoreError> {
        Ok(self.state().failure_rate)
    }

    async fn rollup_metrics(&self) -> Result<(), AssetStoreError> {
        self.state().rollups += 1;
        Ok(())
    }

    async fn create_batch(
        &self,
        _name: Option<&str>,
        _source: Option<&str>,
    ) -> Result<Batch, AssetStoreError> {
        unimplemented!()
    }

    async fn get_batch(&self, _id: i64) -> Result<Option<Batch>, AssetStoreError> {
        unimplemented!()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockWalletPool {
    pub stats: WalletStats,
    pub stuck_wallets: u64,
    pub releases: Arc<Mutex<Vec<(i64, bool)>>>,
}

impl MockWalletPool {
    pub fn releases(&self) -> Vec<(i64, bool)> {
        self.releases.lock().expect("mutex is not poisoned").clone()
    }
}

impl WalletPool for MockWalletPool {
    async fn lease_for(&self, _asset_id: i64) -> Result<Option<LeasedWallet>, WalletPoolError> {
        unimplemented!()
    }

    async fn release(&self, wallet_id: i64, success: bool) -> Result<(), WalletPoolError> {
        self.releases
            .lock()
            .expect("mutex is not poisoned")
            .push((wallet_id, success));
        Ok(())
    }

    async fn stats(&self) -> Result<WalletStats, WalletPoolError> {
        Ok(self.stats)
    }

    async fn health(&self, _wallet_id: i64) -> Result<bool, WalletPoolError> {
        Ok(true)
    }

    async fn unlock_stuck(&self) -> Result<u64, WalletPoolError> {
        Ok(self.stuck_wallets)
    }

    async fn register_wallet(
        &self,
        _address: &str,
        _signing_key: &SecretString,
        _blockchain: &str,
    ) -> Result<Wallet, WalletPoolError> {
        unimplemented!()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockJobQueue {
    pub stats: QueueStats,
    pub duplicates: Arc<Mutex<Vec<i64>>>,
    pub enqueued: Arc<Mutex<Vec<(i64, u8)>>>,
    pub removed: Arc<Mutex<Vec<i64>>>,
}

impl MockJobQueue {
    pub fn with_stats(stats: QueueStats) -> Self {
        Self {
            stats,
            ..Default::default()
        }
    }

    pub fn mark_duplicate(&self, asset_id: i64) {
        self.duplicates
            .lock()
            .expect("mutex is not poisoned")
            .push(asset_id);
    }

    pub fn enqueued(&self) -> Vec<(i64, u8)> {
        self.enqueued.lock().expect("mutex is not poisoned").clone()
    }

    pub fn removed(&self) -> Vec<i64> {
        self.removed.lock().expect("mutex is not poisoned").clone()
    }
}

impl JobQueue for MockJobQueue {
    type Error = Infallible;

    async fn enqueue(&self, asset_id: i64, priority: u8) -> Result<bool, Self::Error> {
        if self
            .duplicates
            .lock()
            .expect("mutex is not poisoned")
            .contains(&asset_id)
        {
            return Ok(false);
        }

        self.enqueued
            .lock()
            .expect("mutex is not poisoned")
            .push((asset_id, priority));
        Ok(true)
    }

    async fn next_job(&self) -> Result<Option<Job>, Self::Error> {
        unimplemented!()
    }

    async fn heartbeat(&self, _job: &Job) -> Result<(), Self::Error> {
        unimplemented!()
    }

    async fn complete(&self, _job: &Job) -> Result<(), Self::Error> {
        unimplemented!()
    }

    async fn fail(&self, _job: &Job, _error: &str) -> Result<(), Self::Error> {
        unimplemented!()
    }

    async fn remove(&self, asset_id: i64) -> Result<bool, Self::Error> {
        self.removed
            .lock()
            .expect("mutex is not poisoned")
            .push(asset_id);
        Ok(true)
    }

    async fn stats(&self) -> Result<QueueStats, Self::Error> {
        Ok(self.stats)
    }

    async fn pause(&self) -> Result<(), Self::Error> {
        unimplemented!()
    }

    async fn resume(&self) -> Result<(), Self::Error> {
        unimplemented!()
    }

    async fn is_paused(&self) -> Result<bool, Self::Error> {
        Ok(false)
    }

    async fn clear_completed(&self) -> Result<u64, Self::Error> {
        unimplemented!()
    }

    async fn clear_failed(&self) -> Result<u64, Self::Error> {
        unimplemented!()
    }

    async fn retry_failed(&self) -> Result<u64, Self::Error> {
        unimplemented!()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingPublisher {
    pub events: Arc<Mutex<Vec<(String, PublishEvent)>>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<(String, PublishEvent)> {
        self.events.lock().expect("mutex is not poisoned").clone()
    }
}

impl Publisher for RecordingPublisher {
    type Error = Infallible;

    async fn publish(&self, topic: &str, event: PublishEvent) -> Result<(), Self::Error> {
        self.events
            .lock()
            .expect("mutex is not poisoned")
            .push((topic.to_string(), event));
        Ok(())
    }
}
