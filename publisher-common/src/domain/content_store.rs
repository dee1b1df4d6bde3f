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

use derive_more::{AsRef, Display, From, Into};
use std::io;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Opaque dereferenceable handle to stored content bytes, stable for the asset's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, AsRef, Display, From, Into)]
pub struct ContentHandle(String);

impl ContentHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Immutable, opaque byte blobs keyed by a URL-like handle.
#[trait_variant::make(Send)]
pub trait ContentStore
where
    Self: Clone + Send + Sync + 'static,
{
    /// Persist the given bytes once and return a handle plus the persisted size.
    async fn save(&self, bytes: &[u8]) -> Result<(ContentHandle, u64), ContentStoreError>;

    /// Open the content for reading. The stream is replayable by calling `open` again.
    async fn open(
        &self,
        handle: &ContentHandle,
    ) -> Result<impl AsyncRead + Send + Unpin + 'static, ContentStoreError>;

    /// Delete the content. Deleting an absent handle is not an error.
    async fn delete(&self, handle: &ContentHandle) -> Result<(), ContentStoreError>;
}

/// Error possibly returned by [ContentStore] operations.
#[derive(Debug, Error)]
pub enum ContentStoreError {
    #[error("content {0} not found")]
    NotFound(ContentHandle),

    #[error("content store I/O fault")]
    Io(#[from] io::Error),
}
