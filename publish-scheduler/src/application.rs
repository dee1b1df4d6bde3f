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

mod health;
mod poller;
#[cfg(test)]
mod test_support;

use anyhow::{Context, bail};
use log::warn;
use publisher_common::domain::{AssetStore, JobQueue, Publisher, WalletPool};
use serde::Deserialize;
use std::time::Duration;
use tokio::{select, signal::unix::Signal, task};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Cadence of the queue poller.
    #[serde(with = "humantime_serde", default = "poll_frequency_default")]
    pub poll_frequency: Duration,

    /// Cadence of the health monitor sweep.
    #[serde(with = "humantime_serde", default = "health_check_interval_default")]
    pub health_check_interval: Duration,

    /// Age after which an `assigned` asset without publishing counts as stuck.
    #[serde(with = "humantime_serde", default = "assigned_timeout_default")]
    pub assigned_timeout: Duration,

    /// Age after which a `publishing` asset counts as stuck.
    #[serde(with = "humantime_serde", default = "publishing_timeout_default")]
    pub publishing_timeout: Duration,
}

impl Config {
    /// The timeouts must be ordered `assigned < publishing < wallet` so a wallet is always
    /// reclaimed no later than the asset blocking it.
    pub fn validate(&self, wallet_timeout: Duration) -> anyhow::Result<()> {
        if !(self.assigned_timeout < self.publishing_timeout
            && self.publishing_timeout < wallet_timeout)
        {
            bail!(
                "timeouts must be ordered: assigned ({:?}) < publishing ({:?}) < wallet ({:?})",
                self.assigned_timeout,
                self.publishing_timeout,
                wallet_timeout
            );
        }

        Ok(())
    }
}

pub async fn run<A, W, Q, P>(
    config: Config,
    assets: A,
    wallets: W,
    queue: Q,
    publisher: P,
    mut sigterm: Signal,
) -> anyhow::Result<()>
where
    A: AssetStore,
    W: WalletPool,
    Q: JobQueue,
    P: Publisher,
{
    let Config {
        poll_frequency,
        health_check_interval,
        assigned_timeout,
        publishing_timeout,
    } = config;

    let poller_task = task::spawn(poller::run(
        poll_frequency,
        assets.clone(),
        wallets.clone(),
        queue.clone(),
    ));

    let health_task = task::spawn(health::run(
        health_check_interval,
        assigned_timeout,
        publishing_timeout,
        assets,
        wallets,
        queue,
        publisher,
    ));

    select! {
        result = poller_task => result
            .context("poller_task panicked")
            .and_then(|r| r.context("poller_task failed")),

        result = health_task => result
            .context("health_task panicked")
            .and_then(|r| r.context("health_task failed")),

        _ = sigterm.recv() => {
            warn!("SIGTERM received");
            Ok(())
        }
    }
}

fn poll_frequency_default() -> Duration {
    Duration::from_secs(2)
}

fn health_check_interval_default() -> Duration {
    Duration::from_secs(60)
}

fn assigned_timeout_default() -> Duration {
    Duration::from_secs(5 * 60)
}

fn publishing_timeout_default() -> Duration {
    Duration::from_secs(15 * 60)
}
