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

use log::{LevelFilter, error};
use logforth::append::{
    self,
    rolling_file::{RollingFile, RollingFileWriter, Rotation},
};
use logforth::non_blocking::{NonBlockingBuilder, WorkerGuard};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use std::{io, net::IpAddr, path::PathBuf};
use thiserror::Error;

/// Telemetry configuration: logging and metrics.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "logging")]
    pub logging_config: LoggingConfig,

    #[serde(rename = "metrics")]
    pub metrics_config: MetricsConfig,
}

/// Configuration for the rolling file logs.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub directory: PathBuf,

    #[serde(default = "info_retention_days_default")]
    pub info_retention_days: usize,

    #[serde(default = "error_retention_days_default")]
    pub error_retention_days: usize,
}

/// Configuration for the Prometheus exporter.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub address: IpAddr,
    pub port: u16,
}

/// Guards keeping the non-blocking log writers alive; must be held until shutdown.
pub struct LoggingGuards {
    _info: WorkerGuard,
    _error: WorkerGuard,
}

/// Initialize logging: stderr plus rolling daily files, one stream retained for
/// [LoggingConfig::info_retention_days] at info level and one for
/// [LoggingConfig::error_retention_days] at error level.
pub fn init_logging(config: LoggingConfig) -> Result<LoggingGuards, InitLoggingError> {
    let LoggingConfig {
        directory,
        info_retention_days,
        error_retention_days,
    } = config;

    let info_writer = RollingFileWriter::builder()
        .rotation(Rotation::Daily)
        .filename_prefix("publisher")
        .max_log_files(info_retention_days)
        .build(&directory)?;
    let (info_writer, info_guard) =
        NonBlockingBuilder::new("publisher-info-log", info_writer).finish();

    let error_writer = RollingFileWriter::builder()
        .rotation(Rotation::Daily)
        .filename_prefix("publisher.error")
        .max_log_files(error_retention_days)
        .build(&directory)?;
    let (error_writer, error_guard) =
        NonBlockingBuilder::new("publisher-error-log", error_writer).finish();

    logforth::builder()
        .dispatch(|dispatch| {
            dispatch
                .filter(LevelFilter::Info)
                .append(append::Stderr::default())
        })
        .dispatch(|dispatch| {
            dispatch
                .filter(LevelFilter::Info)
                .append(RollingFile::new(info_writer))
        })
        .dispatch(|dispatch| {
            dispatch
                .filter(LevelFilter::Error)
                .append(RollingFile::new(error_writer))
        })
        .apply();

    Ok(LoggingGuards {
        _info: info_guard,
        _error: error_guard,
    })
}

/// Initialize metrics: install the Prometheus exporter with an HTTP listener at the configured
/// address and port.
pub fn init_metrics(config: MetricsConfig) {
    let MetricsConfig { address, port } = config;

    if let Err(e) = PrometheusBuilder::new()
        .with_http_listener((address, port))
        .install()
    {
        error!(error:% = e; "cannot install prometheus metrics exporter");
    }
}

/// Error possibly returned by [init_logging].
#[derive(Debug, Error)]
#[error("cannot initialize logging")]
pub struct InitLoggingError(#[from] io::Error);

fn info_retention_days_default() -> usize {
    14
}

fn error_retention_days_default() -> usize {
    30
}
