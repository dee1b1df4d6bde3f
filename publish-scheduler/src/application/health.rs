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

use anyhow::Context;
use log::{debug, error, warn};
use publisher_common::domain::{
    AssetStore, AttemptResult, AttemptStatus, FailureOutcome, HEALTH_TOPIC, JobQueue,
    PublishEvent, Publisher, StuckKind, WalletPool, asset_topic,
};
use std::time::Duration;
use tokio::time::interval;

const FAILURE_RATE_WINDOW: Duration = Duration::from_secs(60 * 60);
const FAILURE_RATE_MIN_ATTEMPTS: u64 = 10;
const FAILURE_RATE_THRESHOLD: f64 = 0.5;

/// The health monitor: periodically rescues stuck assets, reclaims stuck wallets and watches the
/// failure rate. It may act on an asset concurrently with a worker; the conditional updates in
/// the asset store make the later transition a no-op.
#[allow(clippy::too_many_arguments)]
pub async fn run<A, W, Q, P>(
    health_check_interval: Duration,
    assigned_timeout: Duration,
    publishing_timeout: Duration,
    assets: A,
    wallets: W,
    queue: Q,
    publisher: P,
) -> anyhow::Result<()>
where
    A: AssetStore,
    W: WalletPool,
    Q: JobQueue,
    P: Publisher,
{
    let mut ticker = interval(health_check_interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if let Err(e) = sweep(
            assigned_timeout,
            publishing_timeout,
            &assets,
            &wallets,
            &queue,
            &publisher,
        )
        .await
        {
            error!(error:% = format!("{e:#}"); "health sweep failed");
        }
    }
}

pub(crate) async fn sweep<A, W, Q, P>(
    assigned_timeout: Duration,
    publishing_timeout: Duration,
    assets: &A,
    wallets: &W,
    queue: &Q,
    publisher: &P,
) -> anyhow::Result<()>
where
    A: AssetStore,
    W: WalletPool,
    Q: JobQueue,
    P: Publisher,
{
    rescue_assigned(assigned_timeout, assets).await?;
    rescue_publishing(publishing_timeout, assets, wallets, queue, publisher).await?;

    let freed = wallets.unlock_stuck().await.context("unlock stuck wallets")?;
    if freed > 0 {
        warn!(freed; "unlocked stuck wallets");
    }

    check_failure_rate(assets, publisher).await?;

    assets.rollup_metrics().await.context("rollup hourly metrics")?;

    Ok(())
}

/// Assets `assigned` without publishing having started for too long go back to `queued`; their
/// wallet is unlocked in the same transaction.
async fn rescue_assigned<A>(assigned_timeout: Duration, assets: &A) -> anyhow::Result<()>
where
    A: AssetStore,
{
    let stuck = assets
        .stuck_assets(StuckKind::Assigned, assigned_timeout)
        .await
        .context("get stuck assigned assets")?;

    for asset in stuck {
        let minutes = assigned_timeout.as_secs() / 60;
        let last_error =
            format!("assigned but publishing never started within {minutes} minutes");

        match assets.rescue_assigned(asset.id, &last_error).await {
            Ok(true) => warn!(asset_id = asset.id; "stuck assigned asset requeued"),

            // A worker moved the asset on between detection and rescue.
            Ok(false) => debug!(asset_id = asset.id; "assigned asset recovered on its own"),

            Err(e) => {
                error!(asset_id = asset.id, error:% = e; "cannot rescue assigned asset")
            }
        }
    }

    Ok(())
}

/// Assets `publishing` for too long: the latest attempt is marked timed out, the queue job is
/// removed, the retry accounting runs, and the wallet is released.
async fn rescue_publishing<A, W, Q, P>(
    publishing_timeout: Duration,
    assets: &A,
    wallets: &W,
    queue: &Q,
    publisher: &P,
) -> anyhow::Result<()>
where
    A: AssetStore,
    W: WalletPool,
    Q: JobQueue,
    P: Publisher,
{
    let stuck = assets
        .stuck_assets(StuckKind::Publishing, publishing_timeout)
        .await
        .context("get stuck publishing assets")?;

    for asset in stuck {
        let minutes = publishing_timeout.as_secs() / 60;

        if let Some(attempt) = assets
            .latest_attempt(asset.id)
            .await
            .context("get latest attempt")?
            && attempt.status == AttemptStatus::Started
            && let Err(e) = assets
                .update_attempt(
                    attempt.id,
                    AttemptResult::Timeout {
                        duration: publishing_timeout,
                    },
                )
                .await
        {
            error!(asset_id = asset.id, error:% = e; "cannot time out attempt");
        }

        match queue.remove(asset.id).await {
            Ok(true) => debug!(asset_id = asset.id; "removed queue job of stuck asset"),
            Ok(false) => (),
            Err(e) => warn!(asset_id = asset.id, error:% = e; "cannot remove queue job"),
        }

        let error_message = format!("Timeout: publishing over {minutes} minutes");
        let outcome = assets
            .handle_failure(asset.id, &error_message)
            .await
            .context("handle failure of stuck asset")?;

        if let Some(wallet_id) = asset.wallet_id
            && let Err(e) = wallets.release(wallet_id, false).await
        {
            error!(asset_id = asset.id, wallet_id, error:% = e; "cannot release wallet");
        }

        let terminal = outcome == FailureOutcome::Terminal;
        let topic = asset_topic(asset.id);
        let _ = publisher
            .publish(
                &topic,
                PublishEvent::Failed {
                    asset_id: asset.id,
                    error: error_message,
                    terminal,
                },
            )
            .await;
        if terminal {
            let _ = publisher.publish(&topic, PublishEvent::Closed).await;
        }

        warn!(asset_id = asset.id, outcome:? = outcome; "stuck publishing asset reconciled");
    }

    Ok(())
}

async fn check_failure_rate<A, P>(assets: &A, publisher: &P) -> anyhow::Result<()>
where
    A: AssetStore,
    P: Publisher,
{
    let rate = assets
        .failure_rate(FAILURE_RATE_WINDOW)
        .await
        .context("get failure rate")?;

    if rate.total >= FAILURE_RATE_MIN_ATTEMPTS && rate.ratio() > FAILURE_RATE_THRESHOLD {
        let message = format!(
            "{} of {} publish attempts failed over the last hour",
            rate.failed, rate.total
        );
        warn!(failed = rate.failed, total = rate.total; "high publish failure rate");

        let _ = publisher
            .publish(HEALTH_TOPIC, PublishEvent::HealthAlert { message })
            .await;
    }

    Ok(())
}
