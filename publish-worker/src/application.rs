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

mod metrics;

use crate::{
    application::metrics::Metrics,
    domain::{DkgClient, PublishExecutor},
};
use anyhow::Context;
use log::{debug, error, info, warn};
use publisher_common::domain::{
    AssetStore, AssetStoreError, AttemptResult, ContentStore, FailureOutcome, Job, JobQueue,
    PublishEvent, Publisher, WalletPool, asset_topic,
};
use serde::Deserialize;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use tokio::{
    select,
    signal::unix::Signal,
    task,
    time::{interval, sleep},
};
use uuid::Uuid;

const NO_WALLETS_AVAILABLE: &str = "no wallets available";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Number of parallel worker processes; the per-process concurrency is derived from the
    /// wallet count divided by this.
    #[serde(default = "worker_count_default")]
    pub worker_count: u32,

    #[serde(with = "humantime_serde", default = "idle_delay_default")]
    pub idle_delay: Duration,

    #[serde(with = "humantime_serde", default = "heartbeat_interval_default")]
    pub heartbeat_interval: Duration,

    #[serde(with = "humantime_serde", default = "wallet_watch_interval_default")]
    pub wallet_watch_interval: Duration,
}

pub async fn run<A, W, Q, C, D, P>(
    config: Config,
    assets: A,
    wallets: W,
    queue: Q,
    executor: PublishExecutor<C, D>,
    publisher: P,
    mut sigterm: Signal,
) -> anyhow::Result<()>
where
    A: AssetStore,
    W: WalletPool,
    Q: JobQueue,
    C: ContentStore,
    D: DkgClient,
    P: Publisher,
{
    let Config {
        worker_count,
        idle_delay,
        heartbeat_interval,
        wallet_watch_interval,
    } = config;

    let worker_id = format!("worker-{}", Uuid::new_v4());
    let target_concurrency = Arc::new(AtomicUsize::new(1));
    let in_flight = Arc::new(AtomicUsize::new(0));

    update_concurrency(&wallets, worker_count, &target_concurrency, None)
        .await
        .context("determine initial concurrency")?;
    let metrics = Metrics::new(target_concurrency.load(Ordering::Acquire));
    info!(
        worker_id:% = worker_id,
        concurrency = target_concurrency.load(Ordering::Acquire) as u64;
        "starting worker"
    );

    // Track the wallet count and size the worker live, without a restart.
    let concurrency_task = task::spawn({
        let wallets = wallets.clone();
        let target_concurrency = target_concurrency.clone();

        async move {
            loop {
                sleep(wallet_watch_interval).await;

                if let Err(error) =
                    update_concurrency(&wallets, worker_count, &target_concurrency, Some(&metrics))
                        .await
                {
                    warn!(error:% = format!("{error:#}"); "cannot update worker concurrency");
                }
            }
        }
    });

    let consume_task = task::spawn({
        let target_concurrency = target_concurrency.clone();
        let in_flight = in_flight.clone();
        let queue = queue.clone();

        async move {
            loop {
                if in_flight.load(Ordering::Acquire)
                    >= target_concurrency.load(Ordering::Acquire).max(1)
                {
                    sleep(idle_delay).await;
                    continue;
                }

                let job = match queue.next_job().await {
                    Ok(Some(job)) => job,

                    Ok(None) => {
                        sleep(idle_delay).await;
                        continue;
                    }

                    Err(e) => {
                        warn!(error:% = e; "cannot fetch next job");
                        sleep(idle_delay).await;
                        continue;
                    }
                };

                in_flight.fetch_add(1, Ordering::AcqRel);
                metrics.job_started();

                task::spawn({
                    let worker_id = worker_id.clone();
                    let assets = assets.clone();
                    let wallets = wallets.clone();
                    let queue = queue.clone();
                    let executor = executor.clone();
                    let publisher = publisher.clone();
                    let in_flight = in_flight.clone();

                    async move {
                        let result = process_job(
                            &job,
                            &worker_id,
                            heartbeat_interval,
                            &assets,
                            &wallets,
                            &queue,
                            &executor,
                            &publisher,
                            &metrics,
                        )
                        .await;

                        if let Err(e) = result {
                            error!(
                                asset_id = job.asset_id,
                                error:% = format!("{e:#}");
                                "job processing failed"
                            );

                            if let Err(e) = queue.fail(&job, &format!("{e:#}")).await {
                                warn!(job_id:% = job.id, error:% = e; "cannot fail job");
                            }
                        }

                        in_flight.fetch_sub(1, Ordering::AcqRel);
                        metrics.job_finished();
                    }
                });
            }
        }
    });

    let consume_abort = consume_task.abort_handle();

    select! {
        result = concurrency_task => result.context("concurrency_task panicked"),

        result = consume_task => result.context("consume_task panicked"),

        _ = sigterm.recv() => {
            // Stop taking new jobs, then let the in-flight ones finish.
            warn!("SIGTERM received, draining in-flight jobs");
            consume_abort.abort();

            while in_flight.load(Ordering::Acquire) > 0 {
                sleep(Duration::from_millis(100)).await;
            }

            Ok(())
        }
    }
}

/// Process one job: claim the asset, lease a wallet, run the publish attempt, settle the result.
/// A `false` claim or a lost publishing race is benign; everything else updates the attempt log
/// and the retry accounting.
#[allow(clippy::too_many_arguments)]
async fn process_job<A, W, Q, C, D, P>(
    job: &Job,
    worker_id: &str,
    heartbeat_interval: Duration,
    assets: &A,
    wallets: &W,
    queue: &Q,
    executor: &PublishExecutor<C, D>,
    publisher: &P,
    metrics: &Metrics,
) -> anyhow::Result<()>
where
    A: AssetStore,
    W: WalletPool,
    Q: JobQueue,
    C: ContentStore,
    D: DkgClient,
    P: Publisher,
{
    let asset_id = job.asset_id;

    // The claim is the idempotency guard: a `false` means another worker owns the asset, it is
    // terminal, or the retry budget is exhausted (handled by the store).
    if !assets
        .claim_for_processing(asset_id)
        .await
        .context("claim asset")?
    {
        debug!(asset_id; "asset not claimable, dropping job");
        queue.complete(job).await.context("complete job")?;
        return Ok(());
    }

    let asset = assets
        .get(asset_id)
        .await
        .context("get asset")?
        .with_context(|| format!("claimed asset {asset_id} disappeared"))?;

    // Keep the processing lease alive while working.
    let heartbeat_task = task::spawn({
        let queue = queue.clone();
        let job = job.clone();

        async move {
            let mut heartbeat = interval(heartbeat_interval);
            heartbeat.tick().await;

            loop {
                heartbeat.tick().await;

                if let Err(e) = queue.heartbeat(&job).await {
                    warn!(job_id:% = job.id, error:% = e; "cannot renew job lease");
                }
            }
        }
    });

    let Some(wallet) = wallets
        .lease_for(asset_id)
        .await
        .context("lease wallet")?
    else {
        // No wallet held, so nothing to release; the failure consumes one retry.
        heartbeat_task.abort();
        warn!(asset_id; "no wallets available");

        let outcome = assets
            .handle_failure(asset_id, NO_WALLETS_AVAILABLE)
            .await
            .context("handle failure")?;
        notify_failure(publisher, asset_id, NO_WALLETS_AVAILABLE, outcome).await;
        queue.fail(job, NO_WALLETS_AVAILABLE).await.context("fail job")?;

        return Ok(());
    };

    let attempt_id = assets
        .record_attempt(asset_id, worker_id, &wallet, executor.otnode_url())
        .await
        .context("record attempt")?;

    if let Err(e) = assets.mark_publishing(asset_id).await {
        heartbeat_task.abort();

        return match e {
            AssetStoreError::InvalidTransition { .. } => {
                // A concurrent actor already moved the asset on; exit silently.
                debug!(asset_id; "lost publishing race, dropping job");

                assets
                    .update_attempt(
                        attempt_id,
                        AttemptResult::Failed {
                            error_type: "InvalidTransition".to_string(),
                            error_message: "asset was taken over by another actor".to_string(),
                            duration: Duration::ZERO,
                        },
                    )
                    .await
                    .context("update attempt")?;
                wallets
                    .release(wallet.id, false)
                    .await
                    .context("release wallet")?;
                queue.complete(job).await.context("complete job")?;

                Ok(())
            }

            e => Err(e).context("mark asset publishing"),
        };
    }

    let started = Instant::now();
    let result = executor.publish(&asset, &wallet).await;
    let duration = started.elapsed();
    heartbeat_task.abort();

    match result {
        Ok(receipt) => {
            assets
                .update_attempt(
                    attempt_id,
                    AttemptResult::Success {
                        ual: receipt.ual.clone(),
                        transaction_hash: receipt.transaction_hash.clone(),
                        duration,
                    },
                )
                .await
                .context("update attempt")?;
            assets
                .mark_published(
                    asset_id,
                    &receipt.ual,
                    receipt.transaction_hash.as_deref(),
                    &wallet.blockchain,
                )
                .await
                .context("mark asset published")?;
            wallets
                .release(wallet.id, true)
                .await
                .context("release wallet")?;

            let topic = asset_topic(asset_id);
            let _ = publisher
                .publish(
                    &topic,
                    PublishEvent::Published {
                        asset_id,
                        ual: receipt.ual.clone(),
                    },
                )
                .await;
            let _ = publisher.publish(&topic, PublishEvent::Closed).await;

            metrics.published(duration);
            queue.complete(job).await.context("complete job")?;

            info!(
                asset_id,
                ual:% = receipt.ual,
                duration_ms = duration.as_millis() as u64;
                "asset published"
            );

            Ok(())
        }

        Err(e) => {
            let error_type = e.error_type().to_string();
            let error_message = e.to_string();

            assets
                .update_attempt(
                    attempt_id,
                    AttemptResult::Failed {
                        error_type: error_type.clone(),
                        error_message: error_message.clone(),
                        duration,
                    },
                )
                .await
                .context("update attempt")?;
            wallets
                .release(wallet.id, false)
                .await
                .context("release wallet")?;

            let outcome = assets
                .handle_failure(asset_id, &error_message)
                .await
                .context("handle failure")?;
            notify_failure(publisher, asset_id, &error_message, outcome).await;

            metrics.failed(&error_type);

            // The job records a failure for queue metrics; if the asset went back to queued,
            // the poller re-enqueues it.
            queue.fail(job, &error_message).await.context("fail job")?;

            warn!(
                asset_id,
                error_type:% = error_type,
                error:% = error_message,
                outcome:? = outcome;
                "publish attempt failed"
            );

            Ok(())
        }
    }
}

async fn notify_failure<P>(publisher: &P, asset_id: i64, error: &str, outcome: FailureOutcome)
where
    P: Publisher,
{
    let terminal = outcome == FailureOutcome::Terminal;
    let topic = asset_topic(asset_id);

    let _ = publisher
        .publish(
            &topic,
            PublishEvent::Failed {
                asset_id,
                error: error.to_string(),
                terminal,
            },
        )
        .await;

    if terminal {
        let _ = publisher.publish(&topic, PublishEvent::Closed).await;
    }
}

async fn update_concurrency<W>(
    wallets: &W,
    worker_count: u32,
    target_concurrency: &AtomicUsize,
    metrics: Option<&Metrics>,
) -> anyhow::Result<()>
where
    W: WalletPool,
{
    let stats = wallets.stats().await.context("get wallet stats")?;
    let concurrency = concurrency_for(stats.total, worker_count);

    let old = target_concurrency.swap(concurrency, Ordering::AcqRel);
    if old != concurrency {
        info!(total_wallets = stats.total, concurrency = concurrency as u64; "worker concurrency updated");

        if let Some(metrics) = metrics {
            metrics.set_concurrency(concurrency);
        }
    }

    Ok(())
}

/// `max(1, ceil(total_wallets / worker_count))`.
fn concurrency_for(total_wallets: u64, worker_count: u32) -> usize {
    total_wallets.div_ceil(worker_count.max(1) as u64).max(1) as usize
}

fn worker_count_default() -> u32 {
    1
}

fn idle_delay_default() -> Duration {
    Duration::from_millis(500)
}

fn heartbeat_interval_default() -> Duration {
    Duration::from_secs(30)
}

fn wallet_watch_interval_default() -> Duration {
    Duration::from_secs(5 * 60)
}

#[cfg(test)]
mod tests {
    use crate::{
        application::{Metrics, concurrency_for, process_job},
        domain::{
            CreateAssetOptions, CreateAssetResult, DkgClient, MintKnowledgeCollection,
            OperationResult, PublishExecutor, PublishOperation,
        },
    };
    use publisher_common::{
        domain::{
            Asset, AssetStatus, AssetStore, AssetStoreError, AttemptResult, Batch, ContentStore,
            FailureOutcome, FailureRate, Job, JobQueue, LeasedWallet, NewAsset, NoopPublisher,
            Privacy, PublishingAttempt, QueueStats, RetryCriteria, SourceFilter, StuckKind,
            Wallet, WalletPool, WalletPoolError, WalletStats, job_id,
        },
        infra::content_store::{self, FsContentStore},
    };
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use std::{
        convert::Infallible,
        error::Error as StdError,
        sync::{Arc, Mutex},
        time::Duration,
    };
    use time::OffsetDateTime;

    #[test]
    fn test_concurrency_for() {
        assert_eq!(concurrency_for(0, 1), 1);
        assert_eq!(concurrency_for(1, 1), 1);
        assert_eq!(concurrency_for(10, 3), 4);
        assert_eq!(concurrency_for(10, 0), 10);
    }

    #[tokio::test]
    async fn test_process_job_happy_path() -> Result<(), Box<dyn StdError>> {
        let fixture = Fixture::new(json!({"@type": "Thing", "name": "X"})).await?;
        let assets = MockAssetStore::claimable(fixture.asset.clone());
        let wallets = MockWalletPool::with_wallet();
        let queue = MockJobQueue::default();
        let executor = PublishExecutor::new(
            fixture.content_store.clone(),
            MockDkgClient::succeeding("did:dkg:otp/0x1/1", "0xabc"),
        );

        process_job(
            &job(),
            "worker-0",
            Duration::from_secs(30),
            &assets,
            &wallets,
            &queue,
            &executor,
            &NoopPublisher,
            &Metrics::new(1),
        )
        .await?;

        let state = assets.state();
        assert_eq!(state.attempt_results.len(), 1);
        assert!(matches!(
            &state.attempt_results[0],
            (1, AttemptResult::Success { ual, .. }) if ual == "did:dkg:otp/0x1/1"
        ));
        assert_eq!(
            state.published.as_ref().map(|(ual, _, _)| ual.as_str()),
            Some("did:dkg:otp/0x1/1")
        );
        assert!(state.failures.is_empty());

        assert_eq!(wallets.releases(), vec![(1, true)]);
        assert_eq!(queue.completed(), vec![job_id(1)]);
        assert!(queue.failed().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_process_job_lost_claim() -> Result<(), Box<dyn StdError>> {
        let fixture = Fixture::new(json!({"@type": "Thing"})).await?;
        let assets = MockAssetStore::unclaimable(fixture.asset.clone());
        let wallets = MockWalletPool::with_wallet();
        let queue = MockJobQueue::default();
        let executor = PublishExecutor::new(
            fixture.content_store.clone(),
            MockDkgClient::succeeding("did:dkg:otp/0x1/1", "0xabc"),
        );

        process_job(
            &job(),
            "worker-0",
            Duration::from_secs(30),
            &assets,
            &wallets,
            &queue,
            &executor,
            &NoopPublisher,
            &Metrics::new(1),
        )
        .await?;

        // The job is dropped without touching wallets or attempts.
        assert!(assets.state().attempt_results.is_empty());
        assert!(wallets.releases().is_empty());
        assert_eq!(queue.completed(), vec![job_id(1)]);

        Ok(())
    }

    #[tokio::test]
    async fn test_process_job_no_wallet() -> Result<(), Box<dyn StdError>> {
        let fixture = Fixture::new(json!({"@type": "Thing"})).await?;
        let assets = MockAssetStore::claimable(fixture.asset.clone());
        let wallets = MockWalletPool::empty();
        let queue = MockJobQueue::default();
        let executor = PublishExecutor::new(
            fixture.content_store.clone(),
            MockDkgClient::succeeding("did:dkg:otp/0x1/1", "0xabc"),
        );

        process_job(
            &job(),
            "worker-0",
            Duration::from_secs(30),
            &assets,
            &wallets,
            &queue,
            &executor,
            &NoopPublisher,
            &Metrics::new(1),
        )
        .await?;

        let state = assets.state();
        assert!(state.attempt_results.is_empty());
        assert_eq!(state.failures, vec!["no wallets available".to_string()]);
        assert_eq!(queue.failed(), vec![job_id(1)]);

        Ok(())
    }

    #[tokio::test]
    async fn test_process_job_dkg_failure() -> Result<(), Box<dyn StdError>> {
        let fixture = Fixture::new(json!({"@type": "Thing"})).await?;
        let assets = MockAssetStore::claimable(fixture.asset.clone());
        let wallets = MockWalletPool::with_wallet();
        let queue = MockJobQueue::default();
        let executor = PublishExecutor::new(
            fixture.content_store.clone(),
            MockDkgClient::failing("RATE_LIMIT", "busy"),
        );

        process_job(
            &job(),
            "worker-0",
            Duration::from_secs(30),
            &assets,
            &wallets,
            &queue,
            &executor,
            &NoopPublisher,
            &Metrics::new(1),
        )
        .await?;

        let state = assets.state();
        assert!(matches!(
            &state.attempt_results[0],
            (1, AttemptResult::Failed { error_type, .. }) if error_type == "RATE_LIMIT"
        ));
        assert!(state.published.is_none());
        assert_eq!(state.failures.len(), 1);

        assert_eq!(wallets.releases(), vec![(1, false)]);
        assert_eq!(queue.failed(), vec![job_id(1)]);

        Ok(())
    }

    fn job() -> Job {
        Job {
            id: job_id(1),
            asset_id: 1,
            priority: 50,
        }
    }

    struct Fixture {
        _root: tempfile::TempDir,
        content_store: FsContentStore,
        asset: Asset,
    }

    impl Fixture {
        async fn new(payload: Value) -> Result<Self, Box<dyn StdError>> {
            let root = tempfile::tempdir()?;
            let content_store = FsContentStore::new(content_store::Config {
                root_dir: root.path().to_owned(),
            })
            .await?;

            let bytes = serde_json::to_vec(&payload)?;
            let (handle, size) = content_store.save(&bytes).await?;

            let asset = Asset {
                id: 1,
                content_url: handle.as_str().to_string(),
                content_size: size as i64,
                source: None,
                source_id: None,
                batch_id: None,
                priority: 50,
                privacy: Privacy::Private,
                epochs: 2,
                replications: 1,
                max_attempts: 3,
                attempt_count: 0,
                retry_count: 0,
                status: AssetStatus::Assigned,
                wallet_id: None,
                ual: None,
                transaction_hash: None,
                blockchain: None,
                last_error: None,
                created_at: OffsetDateTime::UNIX_EPOCH,
                queued_at: None,
                assigned_at: None,
                publishing_started_at: None,
                published_at: None,
                next_retry_at: None,
                updated_at: OffsetDateTime::UNIX_EPOCH,
            };

            Ok(Self {
                _root: root,
                content_store,
                asset,
            })
        }
    }

    #[derive(Debug, Default)]
    struct MockAssetState {
        asset: Option<Asset>,
        claimable: bool,
        attempt_seq: i64,
        attempt_results: Vec<(i64, AttemptResult)>,
        published: Option<(String, Option<String>, String)>,
        failures: Vec<String>,
    }

    #[derive(Debug, Clone, Default)]
    struct MockAssetStore(Arc<Mutex<MockAssetState>>);

    impl MockAssetStore {
        fn claimable(asset: Asset) -> Self {
            Self(Arc::new(Mutex::new(MockAssetState {
                asset: Some(asset),
                claimable: true,
                ..Default::default()
            })))
        }

        fn unclaimable(asset: Asset) -> Self {
            Self(Arc::new(Mutex::new(MockAssetState {
                asset: Some(asset),
                claimable: false,
                ..Default::default()
            })))
        }

        fn state(&self) -> std::sync::MutexGuard<'_, MockAssetState> {
            self.0.lock().expect("mutex is not poisoned")
        }
    }

    impl AssetStore for MockAssetStore {
        async fn register(&self, _new_asset: NewAsset) -> Result<Asset, AssetStoreError> {
            unimplemented!()
        }

        async fn get(&self, _id: i64) -> Result<Option<Asset>, AssetStoreError> {
            Ok(self.state().asset.clone())
        }

        async fn list_by_source(
            &self,
            _source: &str,
            _filter: SourceFilter,
        ) -> Result<Vec<Asset>, AssetStoreError> {
            unimplemented!()
        }

        async fn pending_for_scheduling(
            &self,
            _limit: u64,
        ) -> Result<Vec<Asset>, AssetStoreError> {
            unimplemented!()
        }

        async fn claim_for_processing(&self, _id: i64) -> Result<bool, AssetStoreError> {
            let mut state = self.state();
            let claimed = state.claimable;
            state.claimable = false;
            Ok(claimed)
        }

        async fn mark_publishing(&self, _id: i64) -> Result<(), AssetStoreError> {
            Ok(())
        }

        async fn mark_published(
            &self,
            _id: i64,
            ual: &str,
            transaction_hash: Option<&str>,
            blockchain: &str,
        ) -> Result<(), AssetStoreError> {
            self.state().published = Some((
                ual.to_string(),
                transaction_hash.map(ToOwned::to_owned),
                blockchain.to_string(),
            ));
            Ok(())
        }

        async fn handle_failure(
            &self,
            _id: i64,
            error_message: &str,
        ) -> Result<FailureOutcome, AssetStoreError> {
            self.state().failures.push(error_message.to_string());
            Ok(FailureOutcome::Requeued { retry_count: 1 })
        }

        async fn stuck_assets(
            &self,
            _kind: StuckKind,
            _older_than: Duration,
        ) -> Result<Vec<Asset>, AssetStoreError> {
            unimplemented!()
        }

        async fn rescue_assigned(
            &self,
            _id: i64,
            _last_error: &str,
        ) -> Result<bool, AssetStoreError> {
            unimplemented!()
        }

        async fn record_attempt(
            &self,
            _asset_id: i64,
            _worker_id: &str,
            _wallet: &LeasedWallet,
            _otnode_url: &str,
        ) -> Result<i64, AssetStoreError> {
            let mut state = self.state();
            state.attempt_seq += 1;
            Ok(state.attempt_seq)
        }

        async fn update_attempt(
            &self,
            attempt_id: i64,
            result: AttemptResult,
        ) -> Result<(), AssetStoreError> {
            self.state().attempt_results.push((attempt_id, result));
            Ok(())
        }

        async fn latest_attempt(
            &self,
            _asset_id: i64,
        ) -> Result<Option<PublishingAttempt>, AssetStoreError> {
            unimplemented!()
        }

        async fn retry_failed(&self, _criteria: RetryCriteria) -> Result<u64, AssetStoreError> {
            unimplemented!()
        }

        async fn failure_rate(&self, _window: Duration) -> Result<FailureRate, AssetStoreError> {
            unimplemented!()
        }

        async fn rollup_metrics(&self) -> Result<(), AssetStoreError> {
            unimplemented!()
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
    struct MockWalletPool {
        wallet: Option<LeasedWallet>,
        releases: Arc<Mutex<Vec<(i64, bool)>>>,
    }

    impl MockWalletPool {
        fn with_wallet() -> Self {
            Self {
                wallet: Some(LeasedWallet {
                    id: 1,
                    address: "0x00a3".to_string(),
                    blockchain: "otp:2043".to_string(),
                    signing_key: "0xsecret".into(),
                }),
                releases: Default::default(),
            }
        }

        fn empty() -> Self {
            Self::default()
        }

        fn releases(&self) -> Vec<(i64, bool)> {
            self.releases.lock().expect("mutex is not poisoned").clone()
        }
    }

    impl WalletPool for MockWalletPool {
        async fn lease_for(&self, _asset_id: i64) -> Result<Option<LeasedWallet>, WalletPoolError> {
            Ok(self.wallet.clone())
        }

        async fn release(&self, wallet_id: i64, success: bool) -> Result<(), WalletPoolError> {
            self.releases
                .lock()
                .expect("mutex is not poisoned")
                .push((wallet_id, success));
            Ok(())
        }

        async fn stats(&self) -> Result<WalletStats, WalletPoolError> {
            Ok(WalletStats {
                total: self.wallet.iter().count() as u64,
                ..Default::default()
            })
        }

        async fn health(&self, _wallet_id: i64) -> Result<bool, WalletPoolError> {
            Ok(true)
        }

        async fn unlock_stuck(&self) -> Result<u64, WalletPoolError> {
            Ok(0)
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
    struct MockJobQueue {
        completed: Arc<Mutex<Vec<String>>>,
        failed: Arc<Mutex<Vec<String>>>,
    }

    impl MockJobQueue {
        fn completed(&self) -> Vec<String> {
            self.completed.lock().expect("mutex is not poisoned").clone()
        }

        fn failed(&self) -> Vec<String> {
            self.failed.lock().expect("mutex is not poisoned").clone()
        }
    }

    impl JobQueue for MockJobQueue {
        type Error = Infallible;

        async fn enqueue(&self, _asset_id: i64, _priority: u8) -> Result<bool, Self::Error> {
            unimplemented!()
        }

        async fn next_job(&self) -> Result<Option<Job>, Self::Error> {
            Ok(None)
        }

        async fn heartbeat(&self, _job: &Job) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn complete(&self, job: &Job) -> Result<(), Self::Error> {
            self.completed
                .lock()
                .expect("mutex is not poisoned")
                .push(job.id.clone());
            Ok(())
        }

        async fn fail(&self, job: &Job, _error: &str) -> Result<(), Self::Error> {
            self.failed
                .lock()
                .expect("mutex is not poisoned")
                .push(job.id.clone());
            Ok(())
        }

        async fn remove(&self, _asset_id: i64) -> Result<bool, Self::Error> {
            unimplemented!()
        }

        async fn stats(&self) -> Result<QueueStats, Self::Error> {
            Ok(QueueStats::default())
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

    #[derive(Clone)]
    struct MockDkgClient {
        result: CreateAssetResult,
    }

    impl MockDkgClient {
        fn succeeding(ual: &str, transaction_hash: &str) -> Self {
            Self {
                result: CreateAssetResult {
                    ual: Some(ual.to_string()),
                    operation: OperationResult {
                        publish: PublishOperation {
                            status: Some("COMPLETED".to_string()),
                            ..Default::default()
                        },
                        mint_knowledge_collection: MintKnowledgeCollection {
                            transaction_hash: Some(transaction_hash.to_string()),
                        },
                    },
                },
            }
        }

        fn failing(error_type: &str, error_message: &str) -> Self {
            Self {
                result: CreateAssetResult {
                    ual: None,
                    operation: OperationResult {
                        publish: PublishOperation {
                            status: Some("FAILED".to_string()),
                            error_type: Some(error_type.to_string()),
                            error_message: Some(error_message.to_string()),
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                },
            }
        }
    }

    impl DkgClient for MockDkgClient {
        type Error = Infallible;

        fn endpoint(&self) -> &str {
            "mock://otnode"
        }

        async fn create_asset(
            &self,
            _content: &Value,
            _options: CreateAssetOptions,
            _wallet: &LeasedWallet,
        ) -> Result<CreateAssetResult, Self::Error> {
            Ok(self.result.clone())
        }
    }
}
