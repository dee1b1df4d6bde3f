// This file is part of dkg-publisher.
// Copyright (C) 2025 AgentDKG Contributors
// SPDX-License-Identifier: Apache-2.0

use publisher_common::infra::{job_queue, pool};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "storage")]
    pub storage_config: pool::postgres::Config,

    #[serde(rename = "queue")]
    pub queue_config: job_queue::Config,

    /// Key encryption key for wallet signing secrets, 32 hex-encoded bytes.
    pub wallet_kek: SecretString,

    #[serde(with = "humantime_serde", default = "wallet_timeout_default")]
    pub wallet_timeout: Duration,
}

pub fn wallet_timeout_default() -> Duration {
    Duration::from_secs(30 * 60)
}
