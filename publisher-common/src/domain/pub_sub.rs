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

use async_stream::stream;
use dashmap::DashMap;
use futures::Stream;
use log::warn;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, error::Error as StdError, sync::Arc};
use tokio::sync::broadcast::{self, error::RecvError};

const TOPIC_CAPACITY: usize = 128;

/// Topic for the progress events of one asset.
pub fn asset_topic(asset_id: i64) -> String {
    format!("asset-{asset_id}")
}

/// Topic for pipeline-wide health alerts.
pub const HEALTH_TOPIC: &str = "health";

/// Event published on a topic while an asset moves through the pipeline. `Closed` is a sentinel
/// ending all subscriptions of the topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PublishEvent {
    Published {
        asset_id: i64,
        ual: String,
    },

    Failed {
        asset_id: i64,
        error: String,
        terminal: bool,
    },

    HealthAlert {
        message: String,
    },

    Closed,
}

/// Publisher abstraction.
#[trait_variant::make(Send)]
pub trait Publisher
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    async fn publish(&self, topic: &str, event: PublishEvent) -> Result<(), Self::Error>;
}

/// Subscriber abstraction.
pub trait Subscriber
where
    Self: Clone + Send + Sync + 'static,
{
    /// Subscribe to the given topic. The stream ends when the `Closed` sentinel is published.
    fn subscribe(&self, topic: &str) -> impl Stream<Item = PublishEvent> + Send + 'static;
}

/// In-process pub/sub surface: one broadcast channel per topic. Publishing `Closed` drops the
/// topic, bounding its lifetime.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPubSub {
    topics: Arc<DashMap<String, broadcast::Sender<PublishEvent>>>,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<PublishEvent> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Publisher for InMemoryPubSub {
    type Error = Infallible;

    async fn publish(&self, topic: &str, event: PublishEvent) -> Result<(), Self::Error> {
        let closed = event == PublishEvent::Closed;

        // A send error just means there is no subscriber right now.
        let _ = self.sender(topic).send(event);

        if closed {
            self.topics.remove(topic);
        }

        Ok(())
    }
}

impl Subscriber for InMemoryPubSub {
    fn subscribe(&self, topic: &str) -> impl Stream<Item = PublishEvent> + Send + 'static {
        let mut receiver = self.sender(topic).subscribe();
        let topic = topic.to_string();

        stream! {
            loop {
                match receiver.recv().await {
                    Ok(PublishEvent::Closed) | Err(RecvError::Closed) => break,

                    Ok(event) => yield event,

                    Err(RecvError::Lagged(skipped)) => {
                        warn!(topic:% = topic, skipped; "subscriber lagged, events skipped");
                    }
                }
            }
        }
    }
}

/// Publisher discarding all events, e.g. for tests.
#[derive(Debug, Clone, Default)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    type Error = Infallible;

    async fn publish(&self, _topic: &str, _event: PublishEvent) -> Result<(), Self::Error> {
        Ok(())
    }
}
