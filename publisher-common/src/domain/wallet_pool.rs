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

use crate::domain::{LeasedWallet, Wallet, WalletStats};
use secrecy::SecretString;
use thiserror::Error;

/// Lease and release of signing identities under mutual exclusion. A wallet is held by at most
/// one asset at a time; the lease transaction is the only place where `assets.wallet_id` and
/// `wallets.locked` are flipped together.
#[trait_variant::make(Send)]
pub trait WalletPool
where
    Self: Clone + Send + Sync + 'static,
{
    /// Lease the first available wallet for the given asset, locking it and writing the wallet
    /// reference onto the asset in a single transaction. Returns `None` if no wallet is
    /// available.
    async fn lease_for(&self, asset_id: i64) -> Result<Option<LeasedWallet>, WalletPoolError>;

    /// Release a leased wallet and update its usage counters.
    async fn release(&self, wallet_id: i64, success: bool) -> Result<(), WalletPoolError>;

    /// Pool-wide counters.
    async fn stats(&self) -> Result<WalletStats, WalletPoolError>;

    /// `false` if the wallet has been locked for longer than the wallet timeout.
    async fn health(&self, wallet_id: i64) -> Result<bool, WalletPoolError>;

    /// Bulk release of wallets locked for longer than the wallet timeout. Idempotent. Returns
    /// the number of freed wallets.
    async fn unlock_stuck(&self) -> Result<u64, WalletPoolError>;

    /// Add a wallet to the pool, encrypting its signing key at rest.
    async fn register_wallet(
        &self,
        address: &str,
        signing_key: &SecretString,
        blockchain: &str,
    ) -> Result<Wallet, WalletPoolError>;
}

/// Error possibly returned by [WalletPool] operations.
#[derive(Debug, Error)]
pub enum WalletPoolError {
    #[error("wallet {0} not found")]
    NotFound(i64),

    #[error("cannot decrypt or encrypt wallet signing key")]
    Secret(#[source] chacha20poly1305::Error),

    #[error("wallet key encryption key must be 32 hex-encoded bytes")]
    InvalidKek,

    #[error("storage fault")]
    Storage(#[from] sqlx::Error),
}
