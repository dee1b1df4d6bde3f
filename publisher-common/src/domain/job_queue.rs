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

use serde::Serialize;
use std::error::Error as StdError;

/// One scheduled publish for one asset. Job ids are derived deterministically from the asset id
/// so that double-enqueueing dedups on the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub asset_id: i64,
    pub priority: u8,
}

/// The deterministic job id for an asset.
pub fn job_id(asset_id: i64) -> String {
    format!("asset-{asset_id}")
}

/// Per-state job counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

impl QueueStats {
    /// Jobs not yet settled; the poller bounds this by the wallet count.
    pub fn depth(&self) -> u64 {
        self.waiting + self.active
    }
}

/// Durable priority queue with deduplication and at-least-once delivery. Consumers must be
/// idempotent; retry is handled at the application layer, not by the queue.
#[trait_variant::make(Send)]
pub trait JobQueue
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// Enqueue a job for the given asset. A no-op returning `false` if a job with the same id is
    /// already waiting, active or delayed; a settled job with the same id is dropped first and
    /// the new one takes its place.
    async fn enqueue(&self, asset_id: i64, priority: u8) -> Result<bool, Self::Error>;

    /// Pop the highest-priority waiting job and move it to `active` under a processing lease.
    /// Returns `None` if the queue is empty or paused. Jobs whose lease expired are returned to
    /// `waiting` first.
    async fn next_job(&self) -> Result<Option<Job>, Self::Error>;

    /// Renew the processing lease of an active job.
    async fn heartbeat(&self, job: &Job) -> Result<(), Self::Error>;

    /// Settle an active job as completed.
    async fn complete(&self, job: &Job) -> Result<(), Self::Error>;

    /// Settle an active job as failed, recording the error.
    async fn fail(&self, job: &Job, error: &str) -> Result<(), Self::Error>;

    /// Remove the job for the given asset from whatever state it is in. Returns `true` if a job
    /// was removed.
    async fn remove(&self, asset_id: i64) -> Result<bool, Self::Error>;

    /// Per-state counters.
    async fn stats(&self) -> Result<QueueStats, Self::Error>;

    /// Stop handing out jobs; enqueueing remains possible.
    async fn pause(&self) -> Result<(), Self::Error>;

    /// Resume handing out jobs.
    async fn resume(&self) -> Result<(), Self::Error>;

    async fn is_paused(&self) -> Result<bool, Self::Error>;

    /// Drop all completed job records. Returns the number of dropped records.
    async fn clear_completed(&self) -> Result<u64, Self::Error>;

    /// Drop all failed job records. Returns the number of dropped records.
    async fn clear_failed(&self) -> Result<u64, Self::Error>;

    /// Move all failed jobs back to `waiting`. Returns the number of moved jobs.
    async fn retry_failed(&self) -> Result<u64, Self::Error>;
}
