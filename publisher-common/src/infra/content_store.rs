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

use crate::domain::{ContentHandle, ContentStore, ContentStoreError};
use fastrace::trace;
use serde::Deserialize;
use std::{io, path::PathBuf};
use tokio::{fs, io::AsyncRead};
use uuid::Uuid;

/// Filesystem-backed [ContentStore]: one file per handle under a configured root directory.
/// Content is written once and never modified; the handle is the absolute file path.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub async fn new(config: Config) -> Result<Self, ContentStoreError> {
        let Config { root_dir } = config;

        fs::create_dir_all(&root_dir).await?;

        Ok(Self { root: root_dir })
    }
}

impl ContentStore for FsContentStore {
    #[trace]
    async fn save(&self, bytes: &[u8]) -> Result<(ContentHandle, u64), ContentStoreError> {
        let path = self.root.join(Uuid::new_v4().to_string());

        fs::write(&path, bytes).await?;

        let handle = ContentHandle::from(path.to_string_lossy().into_owned());
        Ok((handle, bytes.len() as u64))
    }

    #[trace]
    async fn open(
        &self,
        handle: &ContentHandle,
    ) -> Result<impl AsyncRead + Send + Unpin + 'static, ContentStoreError> {
        fs::File::open(handle.as_str()).await.map_err(|error| {
            if error.kind() == io::ErrorKind::NotFound {
                ContentStoreError::NotFound(handle.clone())
            } else {
                error.into()
            }
        })
    }

    #[trace]
    async fn delete(&self, handle: &ContentHandle) -> Result<(), ContentStoreError> {
        match fs::remove_file(handle.as_str()).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// Configuration for the filesystem content store.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub root_dir: PathBuf,
}
