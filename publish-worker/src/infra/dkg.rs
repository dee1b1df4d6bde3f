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

use crate::domain::{CreateAssetOptions, CreateAssetResult, DkgClient};
use publisher_common::domain::LeasedWallet;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// DKG client talking to an OriginTrail node gateway over HTTP. The gateway performs the
/// DKG-side cryptography; this client only ships the wrapped payload, the publish options and
/// the signing identity.
#[derive(Debug, Clone)]
pub struct HttpDkgClient {
    client: reqwest::Client,
    endpoint: String,
    blockchain: String,
}

impl HttpDkgClient {
    pub fn new(config: Config) -> Result<Self, HttpDkgClientError> {
        let Config {
            endpoint,
            blockchain,
            request_timeout,
        } = config;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            blockchain,
        })
    }
}

impl DkgClient for HttpDkgClient {
    type Error = HttpDkgClientError;

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn create_asset(
        &self,
        content: &Value,
        options: CreateAssetOptions,
        wallet: &LeasedWallet,
    ) -> Result<CreateAssetResult, Self::Error> {
        let request = CreateAssetRequest {
            content,
            options,
            blockchain: &self.blockchain,
            wallet: WalletIdentity {
                address: &wallet.address,
                private_key: wallet.signing_key.expose_secret(),
            },
        };

        let result = self
            .client
            .post(format!("{}/assets", self.endpoint))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<CreateAssetResult>()
            .await?;

        Ok(result)
    }
}

#[derive(Debug, Serialize)]
struct CreateAssetRequest<'a> {
    content: &'a Value,
    options: CreateAssetOptions,
    blockchain: &'a str,
    wallet: WalletIdentity<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletIdentity<'a> {
    address: &'a str,
    private_key: &'a str,
}

/// Configuration for the HTTP DKG client.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub endpoint: String,
    pub blockchain: String,

    /// DKG publishes typically take minutes; the request timeout must accommodate that.
    #[serde(with = "humantime_serde", default = "request_timeout_default")]
    pub request_timeout: Duration,
}

/// Error possibly returned by [HttpDkgClient].
#[derive(Debug, Error)]
#[error("DKG request failed")]
pub struct HttpDkgClientError(#[from] reqwest::Error);

fn request_timeout_default() -> Duration {
    Duration::from_secs(10 * 60)
}
