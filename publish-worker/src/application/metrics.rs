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

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Worker metrics, exported via the Prometheus listener.
#[derive(Debug, Clone, Copy)]
pub struct Metrics;

impl Metrics {
    pub fn new(concurrency: usize) -> Self {
        gauge!("publisher_worker_concurrency").set(concurrency as f64);
        gauge!("publisher_jobs_active").set(0.0);

        Self
    }

    pub fn set_concurrency(&self, concurrency: usize) {
        gauge!("publisher_worker_concurrency").set(concurrency as f64);
    }

    pub fn job_started(&self) {
        counter!("publisher_jobs_started_total").increment(1);
        gauge!("publisher_jobs_active").increment(1.0);
    }

    pub fn job_finished(&self) {
        gauge!("publisher_jobs_active").decrement(1.0);
    }

    pub fn published(&self, duration: Duration) {
        counter!("publisher_assets_published_total").increment(1);
        histogram!("publisher_publish_duration_seconds").record(duration.as_secs_f64());
    }

    pub fn failed(&self, error_type: &str) {
        counter!("publisher_publish_failures_total", "error_type" => error_type.to_string())
            .increment(1);
    }
}
