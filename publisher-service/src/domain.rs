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

use publisher_common::domain::{Privacy, QueueStats, WalletStats};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const DEFAULT_PRIORITY: u8 = 50;
const DEFAULT_EPOCHS: u32 = 2;
const DEFAULT_REPLICATIONS: u32 = 1;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A content submission as accepted from external callers.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub content: Value,

    #[serde(default)]
    pub metadata: Option<Metadata>,

    #[serde(rename = "publishOptions", default)]
    pub publish_options: Option<PublishOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub source: Option<String>,
    pub source_id: Option<String>,
    pub batch_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOptions {
    pub priority: Option<i64>,
    pub privacy: Option<Privacy>,
    pub epochs: Option<u32>,
    pub max_attempts: Option<u32>,
    pub replications: Option<u32>,
}

/// A [RegisterInput] that passed validation, with all defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRegistration {
    pub content: Value,
    pub source: Option<String>,
    pub source_id: Option<String>,
    pub batch_id: Option<i64>,
    pub priority: u8,
    pub privacy: Privacy,
    pub epochs: u32,
    pub replications: u32,
    pub max_attempts: u32,
}

/// Validate a registration: the content must be a non-empty JSON object (JSON-LD document), the
/// numeric options must be positive. An out-of-range priority is clamped into 0..=100.
pub fn validate(input: RegisterInput) -> Result<ValidatedRegistration, ValidationError> {
    let RegisterInput {
        content,
        metadata,
        publish_options,
    } = input;

    match content.as_object() {
        Some(object) if !object.is_empty() => (),
        _ => return Err(ValidationError::Content),
    }

    let metadata = metadata.unwrap_or_default();
    let options = publish_options.unwrap_or_default();

    let priority = options
        .priority
        .unwrap_or(DEFAULT_PRIORITY as i64)
        .clamp(0, 100) as u8;

    let epochs = options.epochs.unwrap_or(DEFAULT_EPOCHS);
    if epochs == 0 {
        return Err(ValidationError::Positive("epochs"));
    }

    let replications = options.replications.unwrap_or(DEFAULT_REPLICATIONS);
    if replications == 0 {
        return Err(ValidationError::Positive("replications"));
    }

    let max_attempts = options.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
    if max_attempts == 0 {
        return Err(ValidationError::Positive("maxAttempts"));
    }

    Ok(ValidatedRegistration {
        content,
        source: metadata.source,
        source_id: metadata.source_id,
        batch_id: metadata.batch_id,
        priority,
        privacy: options.privacy.unwrap_or(Privacy::Private),
        epochs,
        replications,
        max_attempts,
    })
}

/// Malformed input at registration; reported synchronously, no state change.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("content must be a non-empty JSON object")]
    Content,

    #[error("{0} must be positive")]
    Positive(&'static str),
}

/// Point-in-time view of the pipeline's health.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub queue: QueueStats,
    pub wallets: WalletStats,
    pub paused: bool,
}
