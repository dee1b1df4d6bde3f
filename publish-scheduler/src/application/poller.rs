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
use publisher_common::domain::{AssetStore, JobQueue, WalletPool};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// The queue poller: the only component that moves assets into the job queue. It paces itself by
/// wallet availability so the queue depth never exceeds the wallet count, bounding
/// wallet-starvation waits. Cycles run strictly sequentially, so the poller cannot race itself.
pub async fn run<A, W, Q>(
    poll_frequency: Duration,
    assets: A,
    wallets: W,
    queue: Q,
) -> anyhow::Result<()>
where
    A: AssetStore,
    W: WalletPool,
    Q: JobQueue,
{
    loop {
        let started = Instant::now();

        if let Err(e) = poll_cycle(&assets, &wallets, &queue).await {
            error!(error:% = format!("{e:#}"); "poll cycle failed");
        }

        let elapsed = started.elapsed();
        if elapsed > poll_frequency {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                poll_frequency_ms = poll_frequency.as_millis() as u64;
                "poll cycle exceeded poll frequency"
            );
        }

        sleep(poll_frequency.saturating_sub(elapsed)).await;
    }
}

async fn poll_cycle<A, W, Q>(assets: &A, wallets: &W, queue: &Q) -> anyhow::Result<()>
where
    A: AssetStore,
    W: WalletPool,
    Q: JobQueue,
{
    let wallet_stats = wallets.stats().await.context("get wallet stats")?;
    if wallet_stats.available == 0 {
        debug!("no wallets available, skipping poll cycle");
        return Ok(());
    }

    let queue_stats = queue.stats().await.context("get queue stats")?;
    let available_slots = wallet_stats.total.saturating_sub(queue_stats.depth());
    if available_slots == 0 {
        debug!(
            waiting = queue_stats.waiting,
            active = queue_stats.active;
            "queue depth at wallet count, skipping poll cycle"
        );
        return Ok(());
    }

    let pending = assets
        .pending_for_scheduling(available_slots)
        .await
        .context("get assets pending for scheduling")?;

    for asset in pending {
        let priority = asset.priority.clamp(0, 100) as u8;

        match queue.enqueue(asset.id, priority).await {
            Ok(true) => debug!(asset_id = asset.id, priority = priority as u64; "job enqueued"),

            // Benign: the job is already scheduled, e.g. after a crashed cycle.
            Ok(false) => debug!(asset_id = asset.id; "job already enqueued"),

            Err(e) => warn!(asset_id = asset.id, error:% = e; "cannot enqueue job"),
        }
    }

    Ok(())
}
