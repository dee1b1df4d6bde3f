// This file is part of dkg-publisher.
// Copyright (C) 2025 AgentDKG Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;
use log::{error, info, warn};
use publish_worker::{domain::PublishExecutor, infra::dkg::HttpDkgClient};
use publisher_common::{
    config::ConfigExt,
    domain::InMemoryPubSub,
    infra::{
        asset_store::PgAssetStore, content_store::FsContentStore, job_queue::RedisJobQueue,
        migrations, pool::postgres::PostgresPool, wallet_pool::PgWalletPool,
    },
    telemetry,
};
use publisher_service::{application::Service, config::Config, infra};
use std::panic;
use tokio::{
    select,
    signal::unix::{SignalKind, signal},
    task,
};

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(config) => config,

        Err(error) => {
            eprintln!("cannot load configuration: {error}");
            std::process::exit(1);
        }
    };

    let telemetry::Config {
        logging_config,
        metrics_config,
    } = config.telemetry_config.clone();

    let _logging_guards = match telemetry::init_logging(logging_config) {
        Ok(guards) => guards,

        Err(error) => {
            eprintln!("cannot initialize logging: {error}");
            std::process::exit(1);
        }
    };
    telemetry::init_metrics(metrics_config);

    panic::set_hook(Box::new(|panic| error!(panic:%; "process panicked")));

    if let Err(error) = run(config).await {
        let error = format!("{error:#}");
        error!(error; "process exited with ERROR");
        std::process::exit(1);
    }
}

/// All-in-one assembly: worker, scheduler and API in one process, sharing the pool, the queue
/// and the in-process pub/sub surface.
async fn run(config: Config) -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("register SIGTERM handler")?;

    info!(config:?; "starting");

    let Config {
        run_migrations,
        worker_config,
        scheduler_config,
        infra_config,
        telemetry_config: _,
    } = config;

    let infra::Config {
        storage_config,
        queue_config,
        content_store_config,
        dkg_config,
        api_config,
        wallet_kek,
        wallet_timeout,
    } = infra_config;

    scheduler_config
        .validate(wallet_timeout)
        .context("validate timeout ordering")?;

    let pool = PostgresPool::new(storage_config)
        .await
        .context("create DB pool for Postgres")?;
    if run_migrations {
        migrations::postgres::run(&pool)
            .await
            .context("run migrations for Postgres")?;
    }

    let assets = PgAssetStore::new(pool.clone());
    let wallets =
        PgWalletPool::new(pool, &wallet_kek, wallet_timeout).context("create wallet pool")?;
    let queue = RedisJobQueue::new(queue_config)
        .await
        .context("create Redis job queue")?;
    let content_store = FsContentStore::new(content_store_config)
        .await
        .context("create content store")?;
    let dkg = HttpDkgClient::new(dkg_config).context("create DKG client")?;
    let pub_sub = InMemoryPubSub::new();

    let worker_task = task::spawn(publish_worker::application::run(
        worker_config,
        assets.clone(),
        wallets.clone(),
        queue.clone(),
        PublishExecutor::new(content_store.clone(), dkg),
        pub_sub.clone(),
        signal(SignalKind::terminate()).context("register SIGTERM handler")?,
    ));

    let scheduler_task = task::spawn(publish_scheduler::application::run(
        scheduler_config,
        assets.clone(),
        wallets.clone(),
        queue.clone(),
        pub_sub.clone(),
        signal(SignalKind::terminate()).context("register SIGTERM handler")?,
    ));

    let service = Service::new(assets, wallets, queue, content_store, pub_sub);
    let api_task = task::spawn(infra::api::serve(api_config, service));

    select! {
        result = worker_task => result
            .context("worker_task panicked")
            .and_then(|r| r.context("worker_task failed")),

        result = scheduler_task => result
            .context("scheduler_task panicked")
            .and_then(|r| r.context("scheduler_task failed")),

        result = api_task => result
            .context("api_task panicked")
            .and_then(|r| r.context("api_task failed")),

        _ = sigterm.recv() => {
            warn!("SIGTERM received");
            Ok(())
        }
    }
}
