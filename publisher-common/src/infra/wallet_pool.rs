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
    domain::{LeasedWallet, Wallet, WalletPool, WalletPoolError, WalletStats},
    infra::pool::postgres::PostgresPool,
};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use fastrace::trace;
use indoc::indoc;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use time::OffsetDateTime;

const NONCE_LEN: usize = 12;

/// Postgres-backed [WalletPool]. Signing keys are stored ChaCha20-Poly1305 encrypted under a key
/// encryption key and only decrypted inside a lease.
#[derive(Clone)]
pub struct PgWalletPool {
    pool: PostgresPool,
    cipher: ChaCha20Poly1305,
    wallet_timeout: Duration,
}

impl PgWalletPool {
    /// Create a wallet pool over the given database pool. `kek` must be 32 hex-encoded bytes;
    /// `wallet_timeout` is the lock age after which a wallet counts as stuck.
    pub fn new(
        pool: PostgresPool,
        kek: &SecretString,
        wallet_timeout: Duration,
    ) -> Result<Self, WalletPoolError> {
        let key = const_hex::decode(kek.expose_secret())
            .ok()
            .filter(|key| key.len() == 32)
            .ok_or(WalletPoolError::InvalidKek)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));

        Ok(Self {
            pool,
            cipher,
            wallet_timeout,
        })
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<SecretString, WalletPoolError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(WalletPoolError::Secret(chacha20poly1305::Error));
        }

        let (nonce, ciphertext) = ciphertext.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(WalletPoolError::Secret)?;
        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| WalletPoolError::Secret(chacha20poly1305::Error))?;

        Ok(plaintext.into())
    }

    fn encrypt(&self, signing_key: &SecretString) -> Result<Vec<u8>, WalletPoolError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, signing_key.expose_secret().as_bytes())
            .map_err(WalletPoolError::Secret)?;

        // Layout at rest: nonce followed by the ciphertext.
        let mut secret_ciphertext = nonce.to_vec();
        secret_ciphertext.extend_from_slice(&ciphertext);

        Ok(secret_ciphertext)
    }
}

impl WalletPool for PgWalletPool {
    #[trace(properties = { "asset_id": "{asset_id}" })]
    async fn lease_for(&self, asset_id: i64) -> Result<Option<LeasedWallet>, WalletPoolError> {
        let mut tx = self.pool.begin().await?;

        // SKIP LOCKED keeps concurrent leases from queueing up on the same row.
        let query = indoc! {"
            SELECT id, address, secret_ciphertext, blockchain
            FROM wallets
            WHERE active AND NOT locked
            ORDER BY last_used_at ASC NULLS FIRST
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        "};

        let row = sqlx::query_as::<_, (i64, String, Vec<u8>, String)>(query)
            .fetch_optional(&mut *tx)
            .await?;

        let Some((id, address, secret_ciphertext, blockchain)) = row else {
            return Ok(None);
        };

        let query = indoc! {"
            UPDATE wallets
            SET locked = TRUE, locked_at = now(), locked_by = $2
            WHERE id = $1
        "};

        sqlx::query(query)
            .bind(id)
            .bind(asset_id)
            .execute(&mut *tx)
            .await?;

        let query = indoc! {"
            UPDATE assets
            SET wallet_id = $2, updated_at = now()
            WHERE id = $1
        "};

        sqlx::query(query)
            .bind(asset_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // Decrypt before committing so a bad ciphertext rolls the lease back.
        let signing_key = self.decrypt(&secret_ciphertext)?;

        tx.commit().await?;

        Ok(Some(LeasedWallet {
            id,
            address,
            blockchain,
            signing_key,
        }))
    }

    #[trace(properties = { "wallet_id": "{wallet_id}" })]
    async fn release(&self, wallet_id: i64, success: bool) -> Result<(), WalletPoolError> {
        let mut tx = self.pool.begin().await?;

        let query = indoc! {"
            UPDATE wallets
            SET locked = FALSE,
                locked_at = NULL,
                locked_by = NULL,
                last_used_at = now(),
                total_uses = total_uses + 1,
                successful_uses = successful_uses + CASE WHEN $2 THEN 1 ELSE 0 END,
                failed_uses = failed_uses + CASE WHEN $2 THEN 0 ELSE 1 END
            WHERE id = $1
        "};

        let updated = sqlx::query(query)
            .bind(wallet_id)
            .bind(success)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(WalletPoolError::NotFound(wallet_id));
        }

        let query = indoc! {"
            INSERT INTO wallet_metrics (wallet_id, hour, uses, successes, failures)
            VALUES (
                $1,
                date_trunc('hour', now()),
                1,
                CASE WHEN $2 THEN 1 ELSE 0 END,
                CASE WHEN $2 THEN 0 ELSE 1 END
            )
            ON CONFLICT (wallet_id, hour) DO UPDATE SET
                uses = wallet_metrics.uses + 1,
                successes = wallet_metrics.successes + CASE WHEN $2 THEN 1 ELSE 0 END,
                failures = wallet_metrics.failures + CASE WHEN $2 THEN 0 ELSE 1 END
        "};

        sqlx::query(query)
            .bind(wallet_id)
            .bind(success)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    #[trace]
    async fn stats(&self) -> Result<WalletStats, WalletPoolError> {
        let query = indoc! {"
            SELECT
                count(*) FILTER (WHERE active),
                count(*) FILTER (WHERE active AND NOT locked),
                count(*) FILTER (WHERE active AND locked),
                coalesce(avg(total_uses) FILTER (WHERE active), 0)::FLOAT8
            FROM wallets
        "};

        let (total, available, in_use, avg_uses) =
            sqlx::query_as::<_, (i64, i64, i64, f64)>(query)
                .fetch_one(&*self.pool)
                .await?;

        Ok(WalletStats {
            total: total as u64,
            available: available as u64,
            in_use: in_use as u64,
            avg_uses,
        })
    }

    #[trace(properties = { "wallet_id": "{wallet_id}" })]
    async fn health(&self, wallet_id: i64) -> Result<bool, WalletPoolError> {
        let cutoff = OffsetDateTime::now_utc() - self.wallet_timeout;

        let query = indoc! {"
            SELECT locked, locked_at
            FROM wallets
            WHERE id = $1
        "};

        let (locked, locked_at) =
            sqlx::query_as::<_, (bool, Option<OffsetDateTime>)>(query)
                .bind(wallet_id)
                .fetch_optional(&*self.pool)
                .await?
                .ok_or(WalletPoolError::NotFound(wallet_id))?;

        Ok(!(locked && locked_at.is_some_and(|locked_at| locked_at < cutoff)))
    }

    #[trace]
    async fn unlock_stuck(&self) -> Result<u64, WalletPoolError> {
        let cutoff = OffsetDateTime::now_utc() - self.wallet_timeout;

        let query = indoc! {"
            UPDATE wallets
            SET locked = FALSE, locked_at = NULL, locked_by = NULL
            WHERE locked AND locked_at < $1
        "};

        let freed = sqlx::query(query).bind(cutoff).execute(&*self.pool).await?;

        Ok(freed.rows_affected())
    }

    #[trace]
    async fn register_wallet(
        &self,
        address: &str,
        signing_key: &SecretString,
        blockchain: &str,
    ) -> Result<Wallet, WalletPoolError> {
        let secret_ciphertext = self.encrypt(signing_key)?;

        let query = indoc! {"
            INSERT INTO wallets (address, secret_ciphertext, blockchain)
            VALUES ($1, $2, $3)
            RETURNING
                id, address, blockchain, active, locked, locked_by, locked_at, last_used_at,
                total_uses, successful_uses, failed_uses
        "};

        let wallet = sqlx::query_as::<_, Wallet>(query)
            .bind(address)
            .bind(secret_ciphertext)
            .bind(blockchain)
            .fetch_one(&*self.pool)
            .await?;

        Ok(wallet)
    }
}
