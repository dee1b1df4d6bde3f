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

mod asset;
mod asset_store;
mod attempt;
mod batch;
mod content_store;
mod job_queue;
mod pub_sub;
mod wallet;
mod wallet_pool;

pub use asset::*;
pub use asset_store::*;
pub use attempt::*;
pub use batch::*;
pub use content_store::*;
pub use job_queue::*;
pub use pub_sub::*;
pub use wallet::*;
pub use wallet_pool::*;
