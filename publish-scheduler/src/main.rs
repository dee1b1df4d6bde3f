// This file is part of dkg-publisher.
// Copyright (C) 2025 AgentDKG Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;
use log::{error, info};
use publish_scheduler::{application, config::Config, infra};
use publisher_common::{
    config::ConfigExt,
    domain::InMemoryPubSub,
    infra::{
        asset_store::PgAssetStore, job_queue::RedisJobQueue, migrations,
        pool::postgres::PostgresPool, wallet_pool::PgWalletPool,
    },
    telemetry,
};
use std::panic;
use tokio::signal::unix::{SignalKind, signal};

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

async fn run(config: Config) -> anyhow::Result<()> {
    let sigterm = signal(SignalKind::terminate()).context("register SIGTERM handler")?;

    info!(config:?; "starting");

    let Config {
        run_migrations,
        application_config,
        infra_config,
        telemetry_config: _,
    } = config;

    let infra::Config {
        storage_config,
        queue_config,
        wallet_kek,
        wallet_timeout,
    } = infra_config;

    application_config
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

    application::run(
        application_config,
        assets,
        wallets,
        queue,
        InMemoryPubSub::new(),
        sigterm,
    )
    .await
    .context("run scheduler application")
}
