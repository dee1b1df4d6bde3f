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

use publisher_common::domain::LeasedWallet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error as StdError;

/// Finalization confirmations requested for every publish.
pub const MINIMUM_FINALIZATION_CONFIRMATIONS: u32 = 3;

/// DKG client abstraction. The cryptography of the DKG lives behind this trait; the pipeline
/// only interprets the result shape.
#[trait_variant::make(Send)]
pub trait DkgClient
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// The node endpoint this client publishes against, recorded on publishing attempts.
    fn endpoint(&self) -> &str;

    /// Create a knowledge asset on the DKG, signed by the given wallet.
    async fn create_asset(
        &self,
        content: &Value,
        options: CreateAssetOptions,
        wallet: &LeasedWallet,
    ) -> Result<CreateAssetResult, Self::Error>;
}

/// Options passed to [DkgClient::create_asset].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetOptions {
    pub epochs_num: u32,
    pub minimum_number_of_finalization_confirmations: u32,
    pub minimum_number_of_node_replications: u32,
}

/// Result shape of a DKG create call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAssetResult {
    #[serde(rename = "UAL", default)]
    pub ual: Option<String>,

    #[serde(default)]
    pub operation: OperationResult,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationResult {
    #[serde(default)]
    pub publish: PublishOperation,

    #[serde(rename = "mintKnowledgeCollection", default)]
    pub mint_knowledge_collection: MintKnowledgeCollection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishOperation {
    #[serde(default)]
    pub status: Option<String>,

    #[serde(rename = "errorType", default)]
    pub error_type: Option<String>,

    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,

    #[serde(rename = "operationId", default)]
    pub operation_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MintKnowledgeCollection {
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: Option<String>,
}
