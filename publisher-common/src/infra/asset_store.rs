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

use crate::{
    domain::{
        Asset, AssetStatus, AssetStore, AssetStoreError, AttemptResult, Batch, FailureOutcome,
        FailureRate, LeasedWallet, NewAsset, PublishingAttempt, RetryCriteria, SourceFilter,
        StuckKind,
    },
    infra::pool::postgres::PostgresPool,
};
use fastrace::trace;
use indoc::indoc;
use time::OffsetDateTime;

/// Sqlx transaction for Postgres.
type SqlxTransaction = sqlx::Transaction<'static, sqlx::Postgres>;

const DEFAULT_LIST_LIMIT: u64 = 50;
const MAX_LIST_LIMIT: u64 = 500;

/// Postgres-backed [AssetStore]. All conditional transitions carry their precondition in the SQL
/// predicate; losing a race surfaces as zero affected rows, never as inconsistent state.
#[derive(Debug, Clone)]
pub struct PgAssetStore {
    pool: PostgresPool,
}

impl PgAssetStore {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, id: i64) -> Result<Option<AssetStatus>, sqlx::Error> {
        let query = indoc! {"
            SELECT status
            FROM assets
            WHERE id = $1
        "};

        let status = sqlx::query_as::<_, (AssetStatus,)>(query)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?
            .map(|(status,)| status);

        Ok(status)
    }

    fn transition_error(
        &self,
        id: i64,
        status: Option<AssetStatus>,
    ) -> AssetStoreError {
        match status {
            Some(found) => AssetStoreError::InvalidTransition { id, found },
            None => AssetStoreError::NotFound(id),
        }
    }
}

impl AssetStore for PgAssetStore {
    #[trace]
    async fn register(&self, new_asset: NewAsset) -> Result<Asset, AssetStoreError> {
        let NewAsset {
            content_url,
            content_size,
            source,
            source_id,
            batch_id,
            priority,
            privacy,
            epochs,
            replications,
            max_attempts,
        } = new_asset;

        let mut tx = self.pool.begin().await?;

        let query = indoc! {"
            INSERT INTO assets (
                content_url,
                content_size,
                source,
                source_id,
                batch_id,
                priority,
                privacy,
                epochs,
                replications,
                max_attempts,
                status,
                queued_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'queued', now())
            RETURNING *
        "};

        let asset = sqlx::query_as::<_, Asset>(query)
            .bind(&content_url)
            .bind(content_size as i64)
            .bind(&source)
            .bind(&source_id)
            .bind(batch_id)
            .bind(priority as i32)
            .bind(privacy)
            .bind(epochs as i32)
            .bind(replications as i32)
            .bind(max_attempts as i32)
            .fetch_one(&mut *tx)
            .await?;

        if let Some(batch_id) = asset.batch_id {
            let query = indoc! {"
                UPDATE batches
                SET total = total + 1, pending = pending + 1, completed_at = NULL
                WHERE id = $1
            "};

            sqlx::query(query).bind(batch_id).execute(&mut *tx).await?;
        }

        tx.commit().await?;

        Ok(asset)
    }

    #[trace]
    async fn get(&self, id: i64) -> Result<Option<Asset>, AssetStoreError> {
        let query = indoc! {"
            SELECT *
            FROM assets
            WHERE id = $1
        "};

        let asset = sqlx::query_as::<_, Asset>(query)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(asset)
    }

    #[trace]
    async fn list_by_source(
        &self,
        source: &str,
        filter: SourceFilter,
    ) -> Result<Vec<Asset>, AssetStoreError> {
        let SourceFilter {
            status,
            limit,
            offset,
        } = filter;

        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
        let offset = offset.unwrap_or_default();

        let query = indoc! {"
            SELECT *
            FROM assets
            WHERE source = $1 AND ($2::ASSET_STATUS IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3
            OFFSET $4
        "};

        let assets = sqlx::query_as::<_, Asset>(query)
            .bind(source)
            .bind(status)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&*self.pool)
            .await?;

        Ok(assets)
    }

    #[trace]
    async fn pending_for_scheduling(&self, limit: u64) -> Result<Vec<Asset>, AssetStoreError> {
        let query = indoc! {"
            SELECT *
            FROM assets
            WHERE status = 'queued' AND (next_retry_at IS NULL OR next_retry_at <= now())
            ORDER BY priority DESC, queued_at ASC
            LIMIT $1
        "};

        let assets = sqlx::query_as::<_, Asset>(query)
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await?;

        Ok(assets)
    }

    #[trace(properties = { "id": "{id}" })]
    async fn claim_for_processing(&self, id: i64) -> Result<bool, AssetStoreError> {
        let mut tx = self.pool.begin().await?;

        let query = indoc! {"
            UPDATE assets
            SET status = 'assigned', assigned_at = now(), updated_at = now()
            WHERE id = $1 AND status = 'queued' AND retry_count < max_attempts
            RETURNING batch_id
        "};

        let claimed = sqlx::query_as::<_, (Option<i64>,)>(query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some((batch_id,)) = claimed {
            if let Some(batch_id) = batch_id {
                move_batch_counter(batch_id, BatchCounter::Pending, BatchCounter::Processing, &mut tx)
                    .await?;
            }
            tx.commit().await?;

            return Ok(true);
        }

        // A queued asset with an exhausted retry budget is flipped to terminal failed here so it
        // cannot be scheduled again.
        let query = indoc! {"
            UPDATE assets
            SET status = 'failed', last_error = 'max retries', updated_at = now()
            WHERE id = $1 AND status = 'queued' AND retry_count >= max_attempts
            RETURNING batch_id
        "};

        let exhausted = sqlx::query_as::<_, (Option<i64>,)>(query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some((Some(batch_id),)) = exhausted {
            move_batch_counter(batch_id, BatchCounter::Pending, BatchCounter::Failed, &mut tx)
                .await?;
        }

        tx.commit().await?;

        Ok(false)
    }

    #[trace(properties = { "id": "{id}" })]
    async fn mark_publishing(&self, id: i64) -> Result<(), AssetStoreError> {
        let query = indoc! {"
            UPDATE assets
            SET status = 'publishing', publishing_started_at = now(), updated_at = now()
            WHERE id = $1 AND status IN ('assigned', 'queued', 'failed')
        "};

        let updated = sqlx::query(query).bind(id).execute(&*self.pool).await?;

        if updated.rows_affected() == 0 {
            let status = self.current_status(id).await?;
            return Err(self.transition_error(id, status));
        }

        Ok(())
    }

    #[trace(properties = { "id": "{id}" })]
    async fn mark_published(
        &self,
        id: i64,
        ual: &str,
        transaction_hash: Option<&str>,
        blockchain: &str,
    ) -> Result<(), AssetStoreError> {
        if ual.is_empty() {
            return Err(AssetStoreError::EmptyUal);
        }

        let mut tx = self.pool.begin().await?;

        // `published` is write-once: the predicate excludes it, making the transition
        // irreversible. Any other state is accepted so a late success after a health-monitor
        // reset still lands and the UAL is not lost.
        let query = indoc! {"
            UPDATE assets
            SET status = 'published',
                ual = $2,
                transaction_hash = $3,
                blockchain = $4,
                published_at = now(),
                last_error = NULL,
                updated_at = now()
            WHERE id = $1 AND status <> 'published'
            RETURNING batch_id
        "};

        let updated = sqlx::query_as::<_, (Option<i64>,)>(query)
            .bind(id)
            .bind(ual)
            .bind(transaction_hash)
            .bind(blockchain)
            .fetch_optional(&mut *tx)
            .await?;

        match updated {
            Some((batch_id,)) => {
                if let Some(batch_id) = batch_id {
                    move_batch_counter(
                        batch_id,
                        BatchCounter::Processing,
                        BatchCounter::Published,
                        &mut tx,
                    )
                    .await?;
                }
                tx.commit().await?;

                Ok(())
            }

            None => {
                let status = self.current_status(id).await?;
                Err(self.transition_error(id, status))
            }
        }
    }

    #[trace(properties = { "id": "{id}" })]
    async fn handle_failure(
        &self,
        id: i64,
        error_message: &str,
    ) -> Result<FailureOutcome, AssetStoreError> {
        let mut tx = self.pool.begin().await?;

        let query = indoc! {"
            SELECT retry_count, max_attempts, status, batch_id
            FROM assets
            WHERE id = $1
            FOR UPDATE
        "};

        let (retry_count, max_attempts, status, batch_id) =
            sqlx::query_as::<_, (i32, i32, AssetStatus, Option<i64>)>(query)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(AssetStoreError::NotFound(id))?;

        if status == AssetStatus::Published {
            return Err(AssetStoreError::InvalidTransition { id, found: status });
        }

        let was_processing = matches!(status, AssetStatus::Assigned | AssetStatus::Publishing);

        // The failing attempt itself counts against the budget: the max_attempts-th failure is
        // terminal, it does not schedule another retry.
        let outcome = if retry_count + 1 < max_attempts {
            let query = indoc! {"
                UPDATE assets
                SET status = 'queued',
                    retry_count = retry_count + 1,
                    wallet_id = NULL,
                    assigned_at = NULL,
                    publishing_started_at = NULL,
                    next_retry_at = now(),
                    last_error = $2,
                    updated_at = now()
                WHERE id = $1
            "};

            sqlx::query(query)
                .bind(id)
                .bind(error_message)
                .execute(&mut *tx)
                .await?;

            if let Some(batch_id) = batch_id
                && was_processing
            {
                move_batch_counter(batch_id, BatchCounter::Processing, BatchCounter::Pending, &mut tx)
                    .await?;
            }

            FailureOutcome::Requeued {
                retry_count: retry_count + 1,
            }
        } else {
            let last_error = format!("Final failure after {max_attempts} attempts: {error_message}");

            let query = indoc! {"
                UPDATE assets
                SET status = 'failed',
                    retry_count = max_attempts,
                    wallet_id = NULL,
                    last_error = $2,
                    updated_at = now()
                WHERE id = $1
            "};

            sqlx::query(query)
                .bind(id)
                .bind(&last_error)
                .execute(&mut *tx)
                .await?;

            if let Some(batch_id) = batch_id {
                let from = if was_processing {
                    BatchCounter::Processing
                } else {
                    BatchCounter::Pending
                };
                move_batch_counter(batch_id, from, BatchCounter::Failed, &mut tx).await?;
            }

            FailureOutcome::Terminal
        };

        tx.commit().await?;

        Ok(outcome)
    }

    #[trace]
    async fn stuck_assets(
        &self,
        kind: StuckKind,
        older_than: std::time::Duration,
    ) -> Result<Vec<Asset>, AssetStoreError> {
        let cutoff = OffsetDateTime::now_utc() - older_than;

        let query = match kind {
            StuckKind::Assigned => indoc! {"
                SELECT *
                FROM assets
                WHERE status = 'assigned'
                  AND publishing_started_at IS NULL
                  AND assigned_at < $1
            "},

            StuckKind::Publishing => indoc! {"
                SELECT *
                FROM assets
                WHERE status = 'publishing'
                  AND publishing_started_at < $1
            "},
        };

        let assets = sqlx::query_as::<_, Asset>(query)
            .bind(cutoff)
            .fetch_all(&*self.pool)
            .await?;

        Ok(assets)
    }

    #[trace(properties = { "id": "{id}" })]
    async fn rescue_assigned(&self, id: i64, last_error: &str) -> Result<bool, AssetStoreError> {
        let mut tx = self.pool.begin().await?;

        let query = indoc! {"
            SELECT wallet_id, batch_id
            FROM assets
            WHERE id = $1 AND status = 'assigned' AND publishing_started_at IS NULL
            FOR UPDATE
        "};

        let row = sqlx::query_as::<_, (Option<i64>, Option<i64>)>(query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some((wallet_id, batch_id)) = row else {
            return Ok(false);
        };

        let query = indoc! {"
            UPDATE assets
            SET status = 'queued',
                wallet_id = NULL,
                assigned_at = NULL,
                next_retry_at = now(),
                last_error = $2,
                updated_at = now()
            WHERE id = $1
        "};

        sqlx::query(query)
            .bind(id)
            .bind(last_error)
            .execute(&mut *tx)
            .await?;

        if let Some(wallet_id) = wallet_id {
            let query = indoc! {"
                UPDATE wallets
                SET locked = FALSE, locked_at = NULL, locked_by = NULL
                WHERE id = $1 AND locked
            "};

            sqlx::query(query).bind(wallet_id).execute(&mut *tx).await?;
        }

        if let Some(batch_id) = batch_id {
            move_batch_counter(batch_id, BatchCounter::Processing, BatchCounter::Pending, &mut tx)
                .await?;
        }

        tx.commit().await?;

        Ok(true)
    }

    #[trace(properties = { "asset_id": "{asset_id}" })]
    async fn record_attempt(
        &self,
        asset_id: i64,
        worker_id: &str,
        wallet: &LeasedWallet,
        otnode_url: &str,
    ) -> Result<i64, AssetStoreError> {
        let mut tx = self.pool.begin().await?;

        let query = indoc! {"
            UPDATE assets
            SET attempt_count = attempt_count + 1, updated_at = now()
            WHERE id = $1
            RETURNING attempt_count
        "};

        let (attempt_number,) = sqlx::query_as::<_, (i32,)>(query)
            .bind(asset_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AssetStoreError::NotFound(asset_id))?;

        let query = indoc! {"
            INSERT INTO publishing_attempts (
                asset_id,
                attempt_number,
                worker_id,
                wallet_address,
                wallet_id,
                otnode_url,
                blockchain,
                status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'started')
            RETURNING id
        "};

        let (attempt_id,) = sqlx::query_as::<_, (i64,)>(query)
            .bind(asset_id)
            .bind(attempt_number)
            .bind(worker_id)
            .bind(&wallet.address)
            .bind(wallet.id)
            .bind(otnode_url)
            .bind(&wallet.blockchain)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(attempt_id)
    }

    #[trace(properties = { "attempt_id": "{attempt_id}" })]
    async fn update_attempt(
        &self,
        attempt_id: i64,
        result: AttemptResult,
    ) -> Result<(), AssetStoreError> {
        let updated = match result {
            AttemptResult::Success {
                ual,
                transaction_hash,
                duration,
            } => {
                let query = indoc! {"
                    UPDATE publishing_attempts
                    SET status = 'success',
                        ual = $2,
                        transaction_hash = $3,
                        completed_at = now(),
                        duration_seconds = $4
                    WHERE id = $1
                "};

                sqlx::query(query)
                    .bind(attempt_id)
                    .bind(ual)
                    .bind(transaction_hash)
                    .bind(duration.as_secs_f64())
                    .execute(&*self.pool)
                    .await?
            }

            AttemptResult::Failed {
                error_type,
                error_message,
                duration,
            } => {
                let query = indoc! {"
                    UPDATE publishing_attempts
                    SET status = 'failed',
                        error_type = $2,
                        error_message = $3,
                        completed_at = now(),
                        duration_seconds = $4
                    WHERE id = $1
                "};

                sqlx::query(query)
                    .bind(attempt_id)
                    .bind(error_type)
                    .bind(error_message)
                    .bind(duration.as_secs_f64())
                    .execute(&*self.pool)
                    .await?
            }

            AttemptResult::Timeout { duration } => {
                let query = indoc! {"
                    UPDATE publishing_attempts
                    SET status = 'timeout',
                        error_type = 'Timeout',
                        completed_at = now(),
                        duration_seconds = $2
                    WHERE id = $1
                "};

                sqlx::query(query)
                    .bind(attempt_id)
                    .bind(duration.as_secs_f64())
                    .execute(&*self.pool)
                    .await?
            }
        };

        if updated.rows_affected() == 0 {
            return Err(AssetStoreError::AttemptNotFound(attempt_id));
        }

        Ok(())
    }

    #[trace(properties = { "asset_id": "{asset_id}" })]
    async fn latest_attempt(
        &self,
        asset_id: i64,
    ) -> Result<Option<PublishingAttempt>, AssetStoreError> {
        let query = indoc! {"
            SELECT *
            FROM publishing_attempts
            WHERE asset_id = $1
            ORDER BY attempt_number DESC
            LIMIT 1
        "};

        let attempt = sqlx::query_as::<_, PublishingAttempt>(query)
            .bind(asset_id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(attempt)
    }

    #[trace]
    async fn retry_failed(&self, criteria: RetryCriteria) -> Result<u64, AssetStoreError> {
        let RetryCriteria {
            source,
            max_attempts,
        } = criteria;

        let query = indoc! {"
            WITH requeued AS (
                UPDATE assets
                SET status = 'queued',
                    retry_count = 0,
                    queued_at = now(),
                    next_retry_at = now(),
                    wallet_id = NULL,
                    assigned_at = NULL,
                    publishing_started_at = NULL,
                    max_attempts = COALESCE($2::INT, max_attempts),
                    updated_at = now()
                WHERE status = 'failed' AND ($1::TEXT IS NULL OR source = $1)
                RETURNING batch_id
            ),
            counts AS (
                SELECT batch_id, count(*) AS cnt
                FROM requeued
                WHERE batch_id IS NOT NULL
                GROUP BY batch_id
            ),
            reopened AS (
                UPDATE batches b
                SET failed = b.failed - c.cnt,
                    pending = b.pending + c.cnt,
                    completed_at = NULL
                FROM counts c
                WHERE b.id = c.batch_id
                RETURNING b.id
            )
            SELECT count(*)
            FROM requeued
        "};

        let (affected,) = sqlx::query_as::<_, (i64,)>(query)
            .bind(source)
            .bind(max_attempts.map(|n| n as i32))
            .fetch_one(&*self.pool)
            .await?;

        Ok(affected as u64)
    }

    #[trace]
    async fn failure_rate(
        &self,
        window: std::time::Duration,
    ) -> Result<FailureRate, AssetStoreError> {
        let cutoff = OffsetDateTime::now_utc() - window;

        let query = indoc! {"
            SELECT
                count(*),
                count(*) FILTER (WHERE status IN ('failed', 'timeout'))
            FROM publishing_attempts
            WHERE completed_at >= $1
        "};

        let (total, failed) = sqlx::query_as::<_, (i64, i64)>(query)
            .bind(cutoff)
            .fetch_one(&*self.pool)
            .await?;

        Ok(FailureRate {
            total: total as u64,
            failed: failed as u64,
        })
    }

    #[trace]
    async fn rollup_metrics(&self) -> Result<(), AssetStoreError> {
        let query = indoc! {"
            INSERT INTO metrics_hourly (
                hour,
                attempts,
                successes,
                failures,
                timeouts,
                total_duration_seconds
            )
            SELECT
                date_trunc('hour', completed_at),
                count(*),
                count(*) FILTER (WHERE status = 'success'),
                count(*) FILTER (WHERE status = 'failed'),
                count(*) FILTER (WHERE status = 'timeout'),
                coalesce(sum(duration_seconds), 0)
            FROM publishing_attempts
            WHERE completed_at >= date_trunc('hour', now())
            GROUP BY 1
            ON CONFLICT (hour) DO UPDATE SET
                attempts = EXCLUDED.attempts,
                successes = EXCLUDED.successes,
                failures = EXCLUDED.failures,
                timeouts = EXCLUDED.timeouts,
                total_duration_seconds = EXCLUDED.total_duration_seconds
        "};

        sqlx::query(query).execute(&*self.pool).await?;

        Ok(())
    }

    #[trace]
    async fn create_batch(
        &self,
        name: Option<&str>,
        source: Option<&str>,
    ) -> Result<Batch, AssetStoreError> {
        let query = indoc! {"
            INSERT INTO batches (name, source)
            VALUES ($1, $2)
            RETURNING *
        "};

        let batch = sqlx::query_as::<_, Batch>(query)
            .bind(name)
            .bind(source)
            .fetch_one(&*self.pool)
            .await?;

        Ok(batch)
    }

    #[trace]
    async fn get_batch(&self, id: i64) -> Result<Option<Batch>, AssetStoreError> {
        let query = indoc! {"
            SELECT *
            FROM batches
            WHERE id = $1
        "};

        let batch = sqlx::query_as::<_, Batch>(query)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(batch)
    }
}

#[derive(Debug, Clone, Copy)]
enum BatchCounter {
    Pending,
    Processing,
    Published,
    Failed,
}

impl BatchCounter {
    fn column(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }
}

async fn move_batch_counter(
    batch_id: i64,
    from: BatchCounter,
    to: BatchCounter,
    tx: &mut SqlxTransaction,
) -> Result<(), sqlx::Error> {
    // Column names come from the enum above, not from user input.
    let query = format!(
        "UPDATE batches SET {from} = {from} - 1, {to} = {to} + 1 WHERE id = $1",
        from = from.column(),
        to = to.column(),
    );

    sqlx::query(&query).bind(batch_id).execute(&mut **tx).await?;

    let query = indoc! {"
        UPDATE batches
        SET completed_at = now()
        WHERE id = $1 AND completed_at IS NULL AND pending = 0 AND processing = 0
    "};

    sqlx::query(query).bind(batch_id).execute(&mut **tx).await?;

    Ok(())
}
