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

use crate::domain::{Job, JobQueue, QueueStats, job_id};
use fastrace::trace;
use indoc::indoc;
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use serde::Deserialize;
use std::{
    sync::LazyLock,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Priority score: higher priority sorts first, FIFO among equals. The factor leaves 2^42
/// sequence numbers per priority level before scores collide.
const SCORE_FACTOR: &str = "4398046511104";

/// Checks the job id against all states: waiting, active and delayed jobs dedup to a no-op, a
/// settled job record is dropped and replaced.
static ENQUEUE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(&indoc! {"
        local state = redis.call('HGET', KEYS[6], 'state')
        if state == 'waiting' or state == 'active' or state == 'delayed' then
            return 0
        end
        if state then
            redis.call('ZREM', KEYS[4], ARGV[1])
            redis.call('ZREM', KEYS[5], ARGV[1])
            redis.call('DEL', KEYS[6])
        end
        local seq = redis.call('INCR', KEYS[7])
        local score = (100 - tonumber(ARGV[3])) * FACTOR + seq
        redis.call('ZADD', KEYS[1], score, ARGV[1])
        redis.call('HSET', KEYS[6],
            'asset_id', ARGV[2], 'priority', ARGV[3], 'state', 'waiting', 'enqueued_at', ARGV[4])
        return 1
    "}.replace("FACTOR", SCORE_FACTOR))
});

/// Requeues a handful of lease-expired active jobs, then pops the best waiting job and leases it.
static NEXT_JOB_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(&indoc! {"
        if redis.call('EXISTS', KEYS[3]) == 1 then
            return nil
        end
        local stalled = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1], 'LIMIT', 0, 10)
        for _, id in ipairs(stalled) do
            redis.call('ZREM', KEYS[2], id)
            local key = ARGV[3] .. id
            local priority = tonumber(redis.call('HGET', key, 'priority') or '50')
            local seq = redis.call('INCR', KEYS[4])
            redis.call('ZADD', KEYS[1], (100 - priority) * FACTOR + seq, id)
            redis.call('HSET', key, 'state', 'waiting')
        end
        local popped = redis.call('ZPOPMIN', KEYS[1])
        if popped[1] == nil then
            return nil
        end
        local id = popped[1]
        local key = ARGV[3] .. id
        redis.call('ZADD', KEYS[2], tonumber(ARGV[1]) + tonumber(ARGV[2]), id)
        redis.call('HSET', key, 'state', 'active', 'started_at', ARGV[1])
        return {id, redis.call('HGET', key, 'asset_id'), redis.call('HGET', key, 'priority')}
    "}.replace("FACTOR", SCORE_FACTOR))
});

/// Moves an active job into a settled set and trims that set by age and count.
static SETTLE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(indoc! {"
        redis.call('ZREM', KEYS[1], ARGV[1])
        redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
        redis.call('HSET', KEYS[3], 'state', ARGV[5], 'finished_at', ARGV[2])
        if ARGV[7] ~= '' then
            redis.call('HSET', KEYS[3], 'error', ARGV[7])
        end
        local expired = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[2] - ARGV[3])
        for _, id in ipairs(expired) do
            redis.call('DEL', ARGV[6] .. id)
        end
        redis.call('ZREMRANGEBYSCORE', KEYS[2], '-inf', ARGV[2] - ARGV[3])
        local excess = redis.call('ZCARD', KEYS[2]) - tonumber(ARGV[4])
        if excess > 0 then
            local oldest = redis.call('ZRANGE', KEYS[2], 0, excess - 1)
            for _, id in ipairs(oldest) do
                redis.call('DEL', ARGV[6] .. id)
            end
            redis.call('ZREMRANGEBYRANK', KEYS[2], 0, excess - 1)
        end
        return 1
    "})
});

/// Removes a job from every state set and drops its record.
static REMOVE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(indoc! {"
        local removed = 0
        for i = 1, 5 do
            removed = removed + redis.call('ZREM', KEYS[i], ARGV[1])
        end
        redis.call('DEL', KEYS[6])
        return removed
    "})
});

/// Moves all failed jobs back to waiting.
static RETRY_FAILED_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(&indoc! {"
        local ids = redis.call('ZRANGE', KEYS[1], 0, -1)
        for _, id in ipairs(ids) do
            local key = ARGV[1] .. id
            local priority = tonumber(redis.call('HGET', key, 'priority') or '50')
            local seq = redis.call('INCR', KEYS[3])
            redis.call('ZADD', KEYS[2], (100 - priority) * FACTOR + seq, id)
            redis.call('HSET', key, 'state', 'waiting')
            redis.call('HDEL', key, 'error')
        end
        redis.call('DEL', KEYS[1])
        return #ids
    "}.replace("FACTOR", SCORE_FACTOR))
});

/// Drops a settled set and all its job records.
static CLEAR_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(indoc! {"
        local ids = redis.call('ZRANGE', KEYS[1], 0, -1)
        for _, id in ipairs(ids) do
            redis.call('DEL', ARGV[1] .. id)
        end
        redis.call('DEL', KEYS[1])
        return #ids
    "})
});

/// Redis-backed [JobQueue]. Jobs live in per-state sorted sets plus one hash per job; all
/// multi-step transitions run as Lua scripts, so every queue operation is atomic.
#[derive(Clone)]
pub struct RedisJobQueue {
    connection: ConnectionManager,
    config: Config,
}

impl RedisJobQueue {
    pub async fn new(config: Config) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(config.url.as_str())?;
        let connection = client.get_connection_manager().await?;

        Ok(Self { connection, config })
    }

    fn key(&self, suffix: &str) -> String {
        format!("queue:{}:{suffix}", self.config.queue_name)
    }

    fn job_key_prefix(&self) -> String {
        self.key("job:")
    }

    fn job_key(&self, job_id: &str) -> String {
        format!("{}{job_id}", self.job_key_prefix())
    }

    async fn settle(
        &self,
        job: &Job,
        settled_key: &str,
        state: &str,
        retention: Duration,
        max_kept: u64,
        error: &str,
    ) -> Result<(), redis::RedisError> {
        let mut connection = self.connection.clone();

        let _: i64 = SETTLE_SCRIPT
            .key(self.key("active"))
            .key(self.key(settled_key))
            .key(self.job_key(&job.id))
            .arg(&job.id)
            .arg(now_ms())
            .arg(retention.as_millis() as u64)
            .arg(max_kept)
            .arg(state)
            .arg(self.job_key_prefix())
            .arg(error)
            .invoke_async(&mut connection)
            .await?;

        Ok(())
    }
}

impl JobQueue for RedisJobQueue {
    type Error = redis::RedisError;

    #[trace(properties = { "asset_id": "{asset_id}" })]
    async fn enqueue(&self, asset_id: i64, priority: u8) -> Result<bool, Self::Error> {
        let job_id = job_id(asset_id);
        let mut connection = self.connection.clone();

        let enqueued: i64 = ENQUEUE_SCRIPT
            .key(self.key("waiting"))
            .key(self.key("active"))
            .key(self.key("delayed"))
            .key(self.key("completed"))
            .key(self.key("failed"))
            .key(self.job_key(&job_id))
            .key(self.key("seq"))
            .arg(&job_id)
            .arg(asset_id)
            .arg(priority.min(100))
            .arg(now_ms())
            .invoke_async(&mut connection)
            .await?;

        Ok(enqueued == 1)
    }

    #[trace]
    async fn next_job(&self) -> Result<Option<Job>, Self::Error> {
        let mut connection = self.connection.clone();

        let popped: Option<(String, i64, u8)> = NEXT_JOB_SCRIPT
            .key(self.key("waiting"))
            .key(self.key("active"))
            .key(self.key("paused"))
            .key(self.key("seq"))
            .arg(now_ms())
            .arg(self.config.job_lease.as_millis() as u64)
            .arg(self.job_key_prefix())
            .invoke_async(&mut connection)
            .await?;

        Ok(popped.map(|(id, asset_id, priority)| Job {
            id,
            asset_id,
            priority,
        }))
    }

    #[trace]
    async fn heartbeat(&self, job: &Job) -> Result<(), Self::Error> {
        let mut connection = self.connection.clone();
        let deadline = now_ms() + self.config.job_lease.as_millis() as u64;

        // XX: only renew while the job is still active.
        let _: i64 = redis::cmd("ZADD")
            .arg(self.key("active"))
            .arg("XX")
            .arg("CH")
            .arg(deadline)
            .arg(&job.id)
            .query_async(&mut connection)
            .await?;

        Ok(())
    }

    #[trace]
    async fn complete(&self, job: &Job) -> Result<(), Self::Error> {
        self.settle(
            job,
            "completed",
            "completed",
            self.config.completed_retention,
            self.config.completed_max,
            "",
        )
        .await
    }

    #[trace]
    async fn fail(&self, job: &Job, error: &str) -> Result<(), Self::Error> {
        self.settle(
            job,
            "failed",
            "failed",
            self.config.failed_retention,
            self.config.failed_max,
            error,
        )
        .await
    }

    #[trace(properties = { "asset_id": "{asset_id}" })]
    async fn remove(&self, asset_id: i64) -> Result<bool, Self::Error> {
        let job_id = job_id(asset_id);
        let mut connection = self.connection.clone();

        let removed: i64 = REMOVE_SCRIPT
            .key(self.key("waiting"))
            .key(self.key("active"))
            .key(self.key("delayed"))
            .key(self.key("completed"))
            .key(self.key("failed"))
            .key(self.job_key(&job_id))
            .arg(&job_id)
            .invoke_async(&mut connection)
            .await?;

        Ok(removed > 0)
    }

    #[trace]
    async fn stats(&self) -> Result<QueueStats, Self::Error> {
        let mut connection = self.connection.clone();

        let (waiting, active, completed, failed, delayed): (u64, u64, u64, u64, u64) =
            redis::pipe()
                .zcard(self.key("waiting"))
                .zcard(self.key("active"))
                .zcard(self.key("completed"))
                .zcard(self.key("failed"))
                .zcard(self.key("delayed"))
                .query_async(&mut connection)
                .await?;

        Ok(QueueStats {
            waiting,
            active,
            completed,
            failed,
            delayed,
        })
    }

    #[trace]
    async fn pause(&self) -> Result<(), Self::Error> {
        let mut connection = self.connection.clone();
        let _: () = connection.set(self.key("paused"), 1).await?;
        Ok(())
    }

    #[trace]
    async fn resume(&self) -> Result<(), Self::Error> {
        let mut connection = self.connection.clone();
        let _: () = connection.del(self.key("paused")).await?;
        Ok(())
    }

    #[trace]
    async fn is_paused(&self) -> Result<bool, Self::Error> {
        let mut connection = self.connection.clone();
        let paused: bool = connection.exists(self.key("paused")).await?;
        Ok(paused)
    }

    #[trace]
    async fn clear_completed(&self) -> Result<u64, Self::Error> {
        let mut connection = self.connection.clone();

        let cleared: i64 = CLEAR_SCRIPT
            .key(self.key("completed"))
            .arg(self.job_key_prefix())
            .invoke_async(&mut connection)
            .await?;

        Ok(cleared as u64)
    }

    #[trace]
    async fn clear_failed(&self) -> Result<u64, Self::Error> {
        let mut connection = self.connection.clone();

        let cleared: i64 = CLEAR_SCRIPT
            .key(self.key("failed"))
            .arg(self.job_key_prefix())
            .invoke_async(&mut connection)
            .await?;

        Ok(cleared as u64)
    }

    #[trace]
    async fn retry_failed(&self) -> Result<u64, Self::Error> {
        let mut connection = self.connection.clone();

        let moved: i64 = RETRY_FAILED_SCRIPT
            .key(self.key("failed"))
            .key(self.key("waiting"))
            .key(self.key("seq"))
            .arg(self.job_key_prefix())
            .invoke_async(&mut connection)
            .await?;

        Ok(moved as u64)
    }
}

/// Configuration for the Redis job queue.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,

    #[serde(default = "queue_name_default")]
    pub queue_name: String,

    #[serde(with = "humantime_serde", default = "job_lease_default")]
    pub job_lease: Duration,

    #[serde(with = "humantime_serde", default = "completed_retention_default")]
    pub completed_retention: Duration,

    #[serde(default = "completed_max_default")]
    pub completed_max: u64,

    #[serde(with = "humantime_serde", default = "failed_retention_default")]
    pub failed_retention: Duration,

    #[serde(default = "failed_max_default")]
    pub failed_max: u64,
}

fn queue_name_default() -> String {
    "knowledge-asset-publishing".to_string()
}

fn job_lease_default() -> Duration {
    Duration::from_secs(15 * 60)
}

fn completed_retention_default() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn completed_max_default() -> u64 {
    100
}

fn failed_retention_default() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn failed_max_default() -> u64 {
    50
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
