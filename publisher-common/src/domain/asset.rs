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

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Lifecycle status of an asset:
/// `pending → queued → assigned → publishing → (published | failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ASSET_STATUS", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Pending,
    Queued,
    Assigned,
    Publishing,
    Published,
    Failed,
}

impl AssetStatus {
    /// `published` and `failed` are terminal; there is no re-entry.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Failed)
    }
}

/// Payload privacy: the single outer key wrapping the document sent to the DKG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "PRIVACY", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Private,
    Public,
}

impl Privacy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

/// A content submission with its publishing metadata and lifecycle state.
#[derive(Debug, Clone, FromRow)]
pub struct Asset {
    pub id: i64,
    pub content_url: String,
    pub content_size: i64,
    pub source: Option<String>,
    pub source_id: Option<String>,
    pub batch_id: Option<i64>,
    pub priority: i32,
    pub privacy: Privacy,
    pub epochs: i32,
    pub replications: i32,
    pub max_attempts: i32,
    pub attempt_count: i32,
    pub retry_count: i32,
    pub status: AssetStatus,
    pub wallet_id: Option<i64>,
    pub ual: Option<String>,
    pub transaction_hash: Option<String>,
    pub blockchain: Option<String>,
    pub last_error: Option<String>,
    pub created_at: OffsetDateTime,
    pub queued_at: Option<OffsetDateTime>,
    pub assigned_at: Option<OffsetDateTime>,
    pub publishing_started_at: Option<OffsetDateTime>,
    pub published_at: Option<OffsetDateTime>,
    pub next_retry_at: Option<OffsetDateTime>,
    pub updated_at: OffsetDateTime,
}

/// Input for inserting a new asset; content bytes must already be persisted in the content store.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub content_url: String,
    pub content_size: u64,
    pub source: Option<String>,
    pub source_id: Option<String>,
    pub batch_id: Option<i64>,
    pub priority: u8,
    pub privacy: Privacy,
    pub epochs: u32,
    pub replications: u32,
    pub max_attempts: u32,
}

/// Caller-facing summary of an asset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub id: i64,
    pub status: AssetStatus,
    pub ual: Option<String>,
    pub transaction_hash: Option<String>,
    pub blockchain: Option<String>,
    pub source: Option<String>,
    pub source_id: Option<String>,
    pub priority: i32,
    pub attempt_count: i32,
    pub retry_count: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
}

impl From<Asset> for AssetSummary {
    fn from(asset: Asset) -> Self {
        Self {
            id: asset.id,
            status: asset.status,
            ual: asset.ual,
            transaction_hash: asset.transaction_hash,
            blockchain: asset.blockchain,
            source: asset.source,
            source_id: asset.source_id,
            priority: asset.priority,
            attempt_count: asset.attempt_count,
            retry_count: asset.retry_count,
            max_attempts: asset.max_attempts,
            last_error: asset.last_error,
            created_at: asset.created_at,
            published_at: asset.published_at,
        }
    }
}
