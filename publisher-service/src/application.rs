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

use crate::domain::{HealthSnapshot, RegisterInput, ValidationError, validate};
use futures::Stream;
use log::info;
use publisher_common::{
    domain::{
        AssetStore, AssetStoreError, AssetSummary, ContentStore, ContentStoreError, JobQueue,
        NewAsset, PublishEvent, QueueStats, RetryCriteria, SourceFilter, Subscriber, WalletPool,
        WalletPoolError, WalletStats, asset_topic,
    },
    error::BoxError,
};
use thiserror::Error;

/// The ingress and operator facade over the pipeline's components. Registration persists the
/// content and inserts the asset as `queued`; no job is enqueued here, scheduling is the queue
/// poller's business alone.
#[derive(Debug, Clone)]
pub struct Service<A, W, Q, C, S> {
    assets: A,
    wallets: W,
    queue: Q,
    content_store: C,
    events: S,
}

impl<A, W, Q, C, S> Service<A, W, Q, C, S>
where
    A: AssetStore,
    W: WalletPool,
    Q: JobQueue,
    C: ContentStore,
    S: Subscriber,
{
    pub fn new(assets: A, wallets: W, queue: Q, content_store: C, events: S) -> Self {
        Self {
            assets,
            wallets,
            queue,
            content_store,
            events,
        }
    }

    /// Live progress events of one asset. The stream ends once the asset's topic is closed,
    /// i.e. after the terminal event.
    pub fn subscribe(&self, asset_id: i64) -> impl Stream<Item = PublishEvent> + Send + 'static {
        self.events.subscribe(&asset_topic(asset_id))
    }

    /// Accept a submission: validate, persist the content bytes, insert the asset as `queued`.
    pub async fn register(&self, input: RegisterInput) -> Result<AssetSummary, ServiceError> {
        let registration = validate(input)?;

        let bytes =
            serde_json::to_vec(&registration.content).map_err(|_| ValidationError::Content)?;
        let (handle, content_size) = self.content_store.save(&bytes).await?;

        let asset = self
            .assets
            .register(NewAsset {
                content_url: handle.into(),
                content_size,
                source: registration.source,
                source_id: registration.source_id,
                batch_id: registration.batch_id,
                priority: registration.priority,
                privacy: registration.privacy,
                epochs: registration.epochs,
                replications: registration.replications,
                max_attempts: registration.max_attempts,
            })
            .await?;

        info!(
            asset_id = asset.id,
            source:? = asset.source,
            priority = asset.priority as i64;
            "asset registered"
        );

        Ok(asset.into())
    }

    pub async fn get_status(&self, id: i64) -> Result<Option<AssetSummary>, ServiceError> {
        let asset = self.assets.get(id).await?;
        Ok(asset.map(Into::into))
    }

    pub async fn list_by_source(
        &self,
        source: &str,
        filter: SourceFilter,
    ) -> Result<Vec<AssetSummary>, ServiceError> {
        let assets = self.assets.list_by_source(source, filter).await?;
        Ok(assets.into_iter().map(Into::into).collect())
    }

    /// Re-queue failed assets matching the criteria, resetting their retry budgets.
    pub async fn retry_failed(&self, criteria: RetryCriteria) -> Result<u64, ServiceError> {
        let affected = self.assets.retry_failed(criteria).await?;
        info!(affected; "failed assets re-queued");
        Ok(affected)
    }

    pub async fn queue_stats(&self) -> Result<QueueStats, ServiceError> {
        self.queue.stats().await.map_err(queue_error)
    }

    pub async fn wallet_stats(&self) -> Result<WalletStats, ServiceError> {
        Ok(self.wallets.stats().await?)
    }

    pub async fn pause_queue(&self) -> Result<(), ServiceError> {
        self.queue.pause().await.map_err(queue_error)?;
        info!("queue paused");
        Ok(())
    }

    pub async fn resume_queue(&self) -> Result<(), ServiceError> {
        self.queue.resume().await.map_err(queue_error)?;
        info!("queue resumed");
        Ok(())
    }

    pub async fn clear_completed_jobs(&self) -> Result<u64, ServiceError> {
        self.queue.clear_completed().await.map_err(queue_error)
    }

    pub async fn clear_failed_jobs(&self) -> Result<u64, ServiceError> {
        self.queue.clear_failed().await.map_err(queue_error)
    }

    pub async fn retry_failed_jobs(&self) -> Result<u64, ServiceError> {
        self.queue.retry_failed().await.map_err(queue_error)
    }

    pub async fn health(&self) -> Result<HealthSnapshot, ServiceError> {
        let queue = self.queue.stats().await.map_err(queue_error)?;
        let paused = self.queue.is_paused().await.map_err(queue_error)?;
        let wallets = self.wallets.stats().await?;

        Ok(HealthSnapshot {
            queue,
            wallets,
            paused,
        })
    }
}

fn queue_error<E>(error: E) -> ServiceError
where
    E: Into<BoxError>,
{
    ServiceError::Queue(error.into())
}

/// Error possibly returned by [Service] operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Assets(#[from] AssetStoreError),

    #[error(transparent)]
    Wallets(#[from] WalletPoolError),

    #[error(transparent)]
    Content(#[from] ContentStoreError),

    #[error("queue fault")]
    Queue(#[source] BoxError),
}
