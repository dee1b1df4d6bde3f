// This file is part of dkg-publisher.
// Copyright (C) 2025 AgentDKG Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod api;

use publish_worker::infra::dkg;
use publisher_common::infra::{content_store, job_queue, pool};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "storage")]
    pub storage_config: pool::postgres::Config,

    #[serde(rename = "queue")]
    pub queue_config: job_queue::Config,

    #[serde(rename = "content_store")]
    pub content_store_config: content_store::Config,

    #[serde(rename = "dkg")]
    pub dkg_config: dkg::Config,

    #[serde(rename = "api")]
    pub api_config: api::Config,

    /// Key encryption key for wallet signing secrets, 32 hex-encoded bytes.
    pub wallet_kek: SecretString,

    #[serde(with = "humantime_serde", default = "wallet_timeout_default")]
    pub wallet_timeout: Duration,
}

pub fn wallet_timeout_default() -> Duration {
    Duration::from_secs(30 * 60)
}
