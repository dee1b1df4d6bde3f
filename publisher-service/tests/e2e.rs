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

//! End-to-end scenarios against real Postgres and Redis (testcontainers) with a scripted DKG
//! client: register → poller enqueues → worker claims, leases, publishes → result settled.

use anyhow::{Context as AnyhowContext, bail};
use publish_scheduler::application as scheduler;
use publish_worker::{
    application as worker,
    domain::{
        CreateAssetOptions, CreateAssetResult, DkgClient, MintKnowledgeCollection,
        OperationResult, PublishExecutor, PublishOperation,
    },
};
use publisher_common::{
    domain::{
        Asset, AssetStatus, AssetStore, AttemptStatus, InMemoryPubSub, LeasedWallet,
        NoopPublisher, WalletPool,
    },
    infra::{
        asset_store::PgAssetStore,
        content_store::{self, FsContentStore},
        job_queue::{self, RedisJobQueue},
        migrations,
        pool::{self, postgres::PostgresPool},
        wallet_pool::PgWalletPool,
    },
};
use publisher_service::{
    application::Service,
    domain::{PublishOptions, RegisterInput},
};
use serde_json::{Value, json};
use sqlx::postgres::PgSslMode;
use std::{
    convert::Infallible,
    error::Error as StdError,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::{postgres::Postgres, redis::Redis};
use tokio::{
    signal::unix::{SignalKind, signal},
    task,
    time::sleep,
};

const KEK: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
const UAL: &str = "did:dkg:otp:2043/0xabc/1";

#[tokio::test]
async fn test_happy_path() -> Result<(), Box<dyn StdError>> {
    let fixture = Fixture::start(ScriptedDkgClient::failing_times(0)).await?;
    fixture.register_wallet("0x00a3").await?;

    let summary = fixture
        .service
        .register(register_input(json!({"@type": "Thing", "name": "X"}), None))
        .await?;
    assert_eq!(summary.status, AssetStatus::Queued);
    assert!(summary.ual.is_none());
    assert_eq!(summary.attempt_count, 0);

    let asset = fixture
        .await_status(summary.id, AssetStatus::Published)
        .await?;
    assert_eq!(asset.ual.as_deref(), Some(UAL));
    assert_eq!(asset.attempt_count, 1);
    assert_eq!(asset.retry_count, 0);

    let attempt = fixture
        .assets
        .latest_attempt(summary.id)
        .await?
        .context("attempt recorded")?;
    assert_eq!(attempt.status, AttemptStatus::Success);
    assert_eq!(attempt.attempt_number, 1);
    assert_eq!(attempt.ual.as_deref(), Some(UAL));

    // The wallet is released and counted as successfully used.
    let stats = fixture.wallets.stats().await?;
    assert_eq!(stats.available, 1);
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.avg_uses, 1.0);

    Ok(())
}

#[tokio::test]
async fn test_retry_then_success() -> Result<(), Box<dyn StdError>> {
    let fixture = Fixture::start(ScriptedDkgClient::failing_times(1)).await?;
    fixture.register_wallet("0x00a4").await?;

    let summary = fixture
        .service
        .register(register_input(json!({"@type": "Thing"}), None))
        .await?;

    let asset = fixture
        .await_status(summary.id, AssetStatus::Published)
        .await?;
    assert_eq!(asset.attempt_count, 2);
    assert_eq!(asset.retry_count, 1);
    assert_eq!(asset.ual.as_deref(), Some(UAL));

    let attempt = fixture
        .assets
        .latest_attempt(summary.id)
        .await?
        .context("attempt recorded")?;
    assert_eq!(attempt.status, AttemptStatus::Success);
    assert_eq!(attempt.attempt_number, 2);

    Ok(())
}

#[tokio::test]
async fn test_terminal_failure() -> Result<(), Box<dyn StdError>> {
    let fixture = Fixture::start(ScriptedDkgClient::always_failing()).await?;
    fixture.register_wallet("0x00a5").await?;

    let summary = fixture
        .service
        .register(register_input(
            json!({"@type": "Thing"}),
            Some(PublishOptions {
                max_attempts: Some(3),
                ..Default::default()
            }),
        ))
        .await?;

    let asset = fixture
        .await_status(summary.id, AssetStatus::Failed)
        .await?;
    assert_eq!(asset.attempt_count, 3);
    assert!(
        asset
            .last_error
            .as_deref()
            .is_some_and(|e| e.starts_with("Final failure after 3 attempts:"))
    );

    let attempt = fixture
        .assets
        .latest_attempt(summary.id)
        .await?
        .context("attempt recorded")?;
    assert_eq!(attempt.status, AttemptStatus::Failed);
    assert_eq!(attempt.attempt_number, 3);

    // The wallet is ultimately released and the failed asset is not re-enqueued.
    let stats = fixture.wallets.stats().await?;
    assert_eq!(stats.available, 1);

    sleep(Duration::from_millis(500)).await;
    let asset = fixture
        .assets
        .get(summary.id)
        .await?
        .context("asset exists")?;
    assert_eq!(asset.status, AssetStatus::Failed);

    Ok(())
}

fn register_input(content: Value, publish_options: Option<PublishOptions>) -> RegisterInput {
    RegisterInput {
        content,
        metadata: None,
        publish_options,
    }
}

struct Fixture {
    _postgres: ContainerAsync<Postgres>,
    _redis: ContainerAsync<Redis>,
    _content_root: tempfile::TempDir,
    assets: PgAssetStore,
    wallets: PgWalletPool,
    service: Service<PgAssetStore, PgWalletPool, RedisJobQueue, FsContentStore, InMemoryPubSub>,
}

impl Fixture {
    /// Start Postgres and Redis, wire up all components and spawn the worker and scheduler
    /// loops, the way the service binary assembles them.
    async fn start(dkg: ScriptedDkgClient) -> Result<Self, Box<dyn StdError>> {
        let postgres = Postgres::default()
            .with_db_name("publisher")
            .with_user("publisher")
            .with_password("publisher")
            .with_tag("17.1-alpine")
            .start()
            .await
            .context("start Postgres container")?;
        let postgres_port = postgres
            .get_host_port_ipv4(5432)
            .await
            .context("get Postgres port")?;

        let redis = Redis::default()
            .start()
            .await
            .context("start Redis container")?;
        let redis_port = redis
            .get_host_port_ipv4(6379)
            .await
            .context("get Redis port")?;

        let pool = PostgresPool::new(pool::postgres::Config {
            host: "localhost".to_string(),
            port: postgres_port,
            dbname: "publisher".to_string(),
            user: "publisher".to_string(),
            password: "publisher".into(),
            sslmode: PgSslMode::Prefer,
            max_connections: 10,
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(5 * 60),
        })
        .await?;
        migrations::postgres::run(&pool).await?;

        let assets = PgAssetStore::new(pool.clone());
        let wallets = PgWalletPool::new(pool, &KEK.into(), Duration::from_secs(30 * 60))?;

        let queue = RedisJobQueue::new(job_queue::Config {
            url: format!("redis://localhost:{redis_port}"),
            queue_name: "knowledge-asset-publishing".to_string(),
            job_lease: Duration::from_secs(15 * 60),
            completed_retention: Duration::from_secs(24 * 60 * 60),
            completed_max: 100,
            failed_retention: Duration::from_secs(7 * 24 * 60 * 60),
            failed_max: 50,
        })
        .await?;

        let content_root = tempfile::tempdir()?;
        let content_store = FsContentStore::new(content_store::Config {
            root_dir: content_root.path().to_owned(),
        })
        .await?;

        task::spawn(worker::run(
            worker::Config {
                worker_count: 1,
                idle_delay: Duration::from_millis(50),
                heartbeat_interval: Duration::from_secs(30),
                wallet_watch_interval: Duration::from_secs(5 * 60),
            },
            assets.clone(),
            wallets.clone(),
            queue.clone(),
            PublishExecutor::new(content_store.clone(), dkg),
            NoopPublisher,
            signal(SignalKind::terminate()).context("register SIGTERM handler")?,
        ));

        task::spawn(scheduler::run(
            scheduler::Config {
                poll_frequency: Duration::from_millis(100),
                health_check_interval: Duration::from_secs(60),
                assigned_timeout: Duration::from_secs(5 * 60),
                publishing_timeout: Duration::from_secs(15 * 60),
            },
            assets.clone(),
            wallets.clone(),
            queue.clone(),
            NoopPublisher,
            signal(SignalKind::terminate()).context("register SIGTERM handler")?,
        ));

        let service = Service::new(
            assets.clone(),
            wallets.clone(),
            queue,
            content_store,
            InMemoryPubSub::new(),
        );

        Ok(Self {
            _postgres: postgres,
            _redis: redis,
            _content_root: content_root,
            assets,
            wallets,
            service,
        })
    }

    async fn register_wallet(&self, address: &str) -> Result<(), Box<dyn StdError>> {
        self.wallets
            .register_wallet(address, &"0xsecret".into(), "otp:2043")
            .await?;
        Ok(())
    }

    async fn await_status(&self, id: i64, expected: AssetStatus) -> anyhow::Result<Asset> {
        let deadline = Instant::now() + Duration::from_secs(30);

        loop {
            let asset = self.assets.get(id).await?.context("asset exists")?;
            if asset.status == expected {
                return Ok(asset);
            }
            if Instant::now() > deadline {
                bail!("asset {id} stuck in {:?}", asset.status);
            }

            sleep(Duration::from_millis(100)).await;
        }
    }
}

/// DKG client failing the first `failures` calls with a rate-limit error, succeeding afterwards.
#[derive(Debug, Clone)]
struct ScriptedDkgClient {
    remaining_failures: Arc<AtomicU32>,
}

impl ScriptedDkgClient {
    fn failing_times(failures: u32) -> Self {
        Self {
            remaining_failures: Arc::new(AtomicU32::new(failures)),
        }
    }

    fn always_failing() -> Self {
        Self::failing_times(u32::MAX)
    }
}

impl DkgClient for ScriptedDkgClient {
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
        let failures = self.remaining_failures.load(Ordering::Acquire);
        if failures > 0 {
            self.remaining_failures
                .fetch_sub(1, Ordering::AcqRel);

            return Ok(CreateAssetResult {
                ual: None,
                operation: OperationResult {
                    publish: PublishOperation {
                        status: Some("FAILED".to_string()),
                        error_type: Some("RATE_LIMIT".to_string()),
                        error_message: Some("busy".to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            });
        }

        Ok(CreateAssetResult {
            ual: Some(UAL.to_string()),
            operation: OperationResult {
                publish: PublishOperation {
                    status: Some("COMPLETED".to_string()),
                    ..Default::default()
                },
                mint_knowledge_collection: MintKnowledgeCollection {
                    transaction_hash: Some("0xdeadbeef".to_string()),
                },
            },
        })
    }
}
