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
use std::time::Duration;
use time::OffsetDateTime;

/// Status of a single publish try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ATTEMPT_STATUS", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Started,
    Success,
    Failed,
    Timeout,
}

/// Append-only record of a single publish try, kept for metrics and post-mortem.
#[derive(Debug, Clone, FromRow)]
pub struct PublishingAttempt {
    pub id: i64,
    pub asset_id: i64,
    pub attempt_number: i32,
    pub worker_id: String,
    pub wallet_address: String,
    pub wallet_id: i64,
    pub otnode_url: String,
    pub blockchain: String,
    pub status: AttemptStatus,
    pub ual: Option<String>,
    pub transaction_hash: Option<String>,
    pub gas_used: Option<i64>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub started_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub duration_seconds: Option<f64>,
}

/// Terminal outcome written back onto a started attempt.
#[derive(Debug, Clone)]
pub enum AttemptResult {
    Success {
        ual: String,
        transaction_hash: Option<String>,
        duration: Duration,
    },
    Failed {
        error_type: String,
        error_message: String,
        duration: Duration,
    },
    Timeout {
        duration: Duration,
    },
}

/// Attempt counts over a time window, used for failure-rate alerting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureRate {
    pub total: u64,
    pub failed: u64,
}

impl FailureRate {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}
