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

use crate::domain::{CreateAssetOptions, DkgClient, MINIMUM_FINALIZATION_CONFIRMATIONS};
use fastrace::trace;
use publisher_common::domain::{
    Asset, ContentHandle, ContentStore, ContentStoreError, LeasedWallet,
};
use serde_json::{Value, json};
use std::error::Error as StdError;
use thiserror::Error;
use tokio::io::AsyncReadExt;

/// Performs one publish attempt against the DKG: load the payload, wrap it according to the
/// asset's privacy, invoke the client, interpret the result. Never mutates asset or wallet
/// state; settling the outcome is the worker's business.
#[derive(Debug, Clone)]
pub struct PublishExecutor<C, D> {
    content_store: C,
    dkg: D,
}

impl<C, D> PublishExecutor<C, D>
where
    C: ContentStore,
    D: DkgClient,
{
    pub fn new(content_store: C, dkg: D) -> Self {
        Self { content_store, dkg }
    }

    /// The node endpoint, recorded on publishing attempts.
    pub fn otnode_url(&self) -> &str {
        self.dkg.endpoint()
    }

    #[trace]
    pub async fn publish(
        &self,
        asset: &Asset,
        wallet: &LeasedWallet,
    ) -> Result<PublishReceipt, PublishError<D::Error>> {
        let handle = ContentHandle::from(asset.content_url.clone());
        let mut content = self.content_store.open(&handle).await?;

        let mut bytes = Vec::with_capacity(asset.content_size as usize);
        content
            .read_to_end(&mut bytes)
            .await
            .map_err(|error| PublishError::Content(error.into()))?;

        let payload =
            serde_json::from_slice::<Value>(&bytes).map_err(PublishError::MalformedPayload)?;

        // The outer object has exactly one key, the privacy level.
        let wrapped = json!({ asset.privacy.as_str(): payload });

        let options = CreateAssetOptions {
            epochs_num: asset.epochs as u32,
            minimum_number_of_finalization_confirmations: MINIMUM_FINALIZATION_CONFIRMATIONS,
            minimum_number_of_node_replications: asset.replications as u32,
        };

        let result = self
            .dkg
            .create_asset(&wrapped, options, wallet)
            .await
            .map_err(PublishError::Client)?;

        let publish_operation = &result.operation.publish;
        if publish_operation.error_type.is_some() || publish_operation.error_message.is_some() {
            return Err(PublishError::DkgApi {
                error_type: publish_operation
                    .error_type
                    .clone()
                    .unwrap_or_else(|| "DkgApiError".to_string()),
                error_message: publish_operation.error_message.clone().unwrap_or_default(),
            });
        }

        let ual = result
            .ual
            .filter(|ual| !ual.is_empty())
            .ok_or(PublishError::MissingUal)?;

        let transaction_hash = result
            .operation
            .mint_knowledge_collection
            .transaction_hash
            .filter(|transaction_hash| !transaction_hash.is_empty());

        Ok(PublishReceipt {
            ual,
            transaction_hash,
        })
    }
}

/// Successful publish outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub ual: String,
    pub transaction_hash: Option<String>,
}

/// Error possibly returned by [PublishExecutor::publish].
#[derive(Debug, Error)]
pub enum PublishError<E>
where
    E: StdError + Send + Sync + 'static,
{
    #[error("cannot load content")]
    Content(#[from] ContentStoreError),

    #[error("content is not a valid JSON document")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("DKG client fault")]
    Client(#[source] E),

    #[error("DKG reported {error_type}: {error_message}")]
    DkgApi {
        error_type: String,
        error_message: String,
    },

    #[error("DKG returned success without a UAL")]
    MissingUal,
}

impl<E> PublishError<E>
where
    E: StdError + Send + Sync + 'static,
{
    /// Error kind as recorded on the publishing attempt.
    pub fn error_type(&self) -> &str {
        match self {
            Self::Content(_) => "ContentError",
            Self::MalformedPayload(_) => "ValidationError",
            Self::Client(_) => "NetworkError",
            Self::DkgApi { error_type, .. } => error_type,
            Self::MissingUal => "MissingUal",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{
        CreateAssetOptions, CreateAssetResult, DkgClient, MintKnowledgeCollection,
        OperationResult, PublishError, PublishExecutor, PublishOperation,
    };
    use assert_matches::assert_matches;
    use publisher_common::domain::{
        Asset, AssetStatus, ContentStore, LeasedWallet, Privacy,
    };
    use serde_json::{Value, json};
    use std::{
        convert::Infallible,
        error::Error as StdError,
        sync::{Arc, Mutex},
    };
    use time::OffsetDateTime;

    #[tokio::test]
    async fn test_publish() -> Result<(), Box<dyn StdError>> {
        let (_root, content_store, asset) = stored_asset(json!({"@type": "Thing", "name": "X"})).await?;

        let dkg = MockDkgClient::succeeding("did:dkg:otp/0x1/7", "0xabc");
        let executor = PublishExecutor::new(content_store, dkg.clone());

        let receipt = executor.publish(&asset, &wallet()).await?;
        assert_eq!(receipt.ual, "did:dkg:otp/0x1/7");
        assert_eq!(receipt.transaction_hash.as_deref(), Some("0xabc"));

        // The payload is wrapped with exactly one key, the privacy level.
        let sent = dkg.last_content().expect("content was sent");
        let object = sent.as_object().expect("content is an object");
        assert_eq!(object.len(), 1);
        assert_eq!(object["private"], json!({"@type": "Thing", "name": "X"}));

        let options = dkg.last_options().expect("options were sent");
        assert_eq!(
            options,
            CreateAssetOptions {
                epochs_num: 2,
                minimum_number_of_finalization_confirmations: 3,
                minimum_number_of_node_replications: 1,
            }
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_publish_dkg_api_error() -> Result<(), Box<dyn StdError>> {
        let (_root, content_store, asset) = stored_asset(json!({"@type": "Thing"})).await?;

        let dkg = MockDkgClient::failing("RATE_LIMIT", "busy");
        let executor = PublishExecutor::new(content_store, dkg);

        let result = executor.publish(&asset, &wallet()).await;
        assert_matches!(
            result,
            Err(PublishError::DkgApi { error_type, error_message })
                if error_type == "RATE_LIMIT" && error_message == "busy"
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_publish_missing_ual() -> Result<(), Box<dyn StdError>> {
        let (_root, content_store, asset) = stored_asset(json!({"@type": "Thing"})).await?;

        let dkg = MockDkgClient::new(CreateAssetResult::default());
        let executor = PublishExecutor::new(content_store, dkg);

        let result = executor.publish(&asset, &wallet()).await;
        assert_matches!(result, Err(PublishError::MissingUal));

        Ok(())
    }

    #[tokio::test]
    async fn test_publish_malformed_payload() -> Result<(), Box<dyn StdError>> {
        let root = tempfile::tempdir()?;
        let content_store = publisher_common::infra::content_store::FsContentStore::new(
            publisher_common::infra::content_store::Config {
                root_dir: root.path().to_owned(),
            },
        )
        .await?;
        let (handle, size) = content_store.save(b"not json").await?;
        let asset = asset(handle.as_str(), size);

        let dkg = MockDkgClient::succeeding("did:dkg:otp/0x1/7", "0xabc");
        let executor = PublishExecutor::new(content_store, dkg);

        let result = executor.publish(&asset, &wallet()).await;
        assert_matches!(result, Err(PublishError::MalformedPayload(_)));
        assert_eq!(result.unwrap_err().error_type(), "ValidationError");

        Ok(())
    }

    async fn stored_asset(
        payload: Value,
    ) -> Result<
        (
            tempfile::TempDir,
            publisher_common::infra::content_store::FsContentStore,
            Asset,
        ),
        Box<dyn StdError>,
    > {
        let root = tempfile::tempdir()?;
        let content_store = publisher_common::infra::content_store::FsContentStore::new(
            publisher_common::infra::content_store::Config {
                root_dir: root.path().to_owned(),
            },
        )
        .await?;

        let bytes = serde_json::to_vec(&payload)?;
        let (handle, size) = content_store.save(&bytes).await?;
        let asset = asset(handle.as_str(), size);

        Ok((root, content_store, asset))
    }

    fn asset(content_url: &str, content_size: u64) -> Asset {
        Asset {
            id: 1,
            content_url: content_url.to_string(),
            content_size: content_size as i64,
            source: None,
            source_id: None,
            batch_id: None,
            priority: 50,
            privacy: Privacy::Private,
            epochs: 2,
            replications: 1,
            max_attempts: 3,
            attempt_count: 0,
            retry_count: 0,
            status: AssetStatus::Publishing,
            wallet_id: Some(1),
            ual: None,
            transaction_hash: None,
            blockchain: None,
            last_error: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            queued_at: None,
            assigned_at: None,
            publishing_started_at: None,
            published_at: None,
            next_retry_at: None,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn wallet() -> LeasedWallet {
        LeasedWallet {
            id: 1,
            address: "0x00a3".to_string(),
            blockchain: "otp:2043".to_string(),
            signing_key: "0xsecret".into(),
        }
    }

    #[derive(Clone)]
    struct MockDkgClient {
        result: CreateAssetResult,
        sent: Arc<Mutex<Option<(Value, CreateAssetOptions)>>>,
    }

    impl MockDkgClient {
        fn new(result: CreateAssetResult) -> Self {
            Self {
                result,
                sent: Arc::new(Mutex::new(None)),
            }
        }

        fn succeeding(ual: &str, transaction_hash: &str) -> Self {
            Self::new(CreateAssetResult {
                ual: Some(ual.to_string()),
                operation: OperationResult {
                    publish: PublishOperation {
                        status: Some("COMPLETED".to_string()),
                        ..Default::default()
                    },
                    mint_knowledge_collection: MintKnowledgeCollection {
                        transaction_hash: Some(transaction_hash.to_string()),
                    },
                },
            })
        }

        fn failing(error_type: &str, error_message: &str) -> Self {
            Self::new(CreateAssetResult {
                ual: None,
                operation: OperationResult {
                    publish: PublishOperation {
                        status: Some("FAILED".to_string()),
                        error_type: Some(error_type.to_string()),
                        error_message: Some(error_message.to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            })
        }

        fn last_content(&self) -> Option<Value> {
            self.sent
                .lock()
                .expect("mutex is not poisoned")
                .as_ref()
                .map(|(content, _)| content.clone())
        }

        fn last_options(&self) -> Option<CreateAssetOptions> {
            self.sent
                .lock()
                .expect("mutex is not poisoned")
                .as_ref()
                .map(|(_, options)| *options)
        }
    }

    impl DkgClient for MockDkgClient {
        type Error = Infallible;

        fn endpoint(&self) -> &str {
            "mock://otnode"
        }

        async fn create_asset(
            &self,
            content: &Value,
            options: CreateAssetOptions,
            _wallet: &LeasedWallet,
        ) -> Result<CreateAssetResult, Self::Error> {
            *self.sent.lock().expect("mutex is not poisoned") =
                Some((content.clone(), options));
            Ok(self.result.clone())
        }
    }
}
