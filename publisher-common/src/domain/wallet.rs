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

use secrecy::SecretString;
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// A blockchain-signing identity. The signing secret is not part of this view; it is only
/// surfaced, decrypted, by a lease.
#[derive(Debug, Clone, FromRow)]
pub struct Wallet {
    pub id: i64,
    pub address: String,
    pub blockchain: String,
    pub active: bool,
    pub locked: bool,
    pub locked_by: Option<i64>,
    pub locked_at: Option<OffsetDateTime>,
    pub last_used_at: Option<OffsetDateTime>,
    pub total_uses: i64,
    pub successful_uses: i64,
    pub failed_uses: i64,
}

/// A wallet leased to exactly one asset, including its decrypted signing key.
#[derive(Debug, Clone)]
pub struct LeasedWallet {
    pub id: i64,
    pub address: String,
    pub blockchain: String,
    pub signing_key: SecretString,
}

/// Pool-wide wallet counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStats {
    pub total: u64,
    pub available: u64,
    pub in_use: u64,
    pub avg_uses: f64,
}
