// This file is part of dkg-publisher.
// Copyright (C) 2025 AgentDKG Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::infra;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub run_migrations: bool,

    #[serde(rename = "worker")]
    pub worker_config: publish_worker::application::Config,

    #[serde(rename = "scheduler")]
    pub scheduler_config: publish_scheduler::application::Config,

    #[serde(rename = "infra")]
    pub infra_config: infra::Config,

    #[serde(rename = "telemetry")]
    pub telemetry_config: publisher_common::telemetry::Config,
}
