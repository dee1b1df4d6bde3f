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

use crate::{
    application::{Service, ServiceError},
    domain::{HealthSnapshot, RegisterInput},
};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use log::info;
use publisher_common::{
    domain::{
        AssetStatus, AssetStoreError, AssetSummary, InMemoryPubSub, QueueStats, RetryCriteria,
        SourceFilter, WalletStats,
    },
    infra::{
        asset_store::PgAssetStore, content_store::FsContentStore, job_queue::RedisJobQueue,
        wallet_pool::PgWalletPool,
    },
};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, io, net::IpAddr};
use thiserror::Error;
use tokio::net::TcpListener;

/// The service over its production store implementations.
pub type AppService =
    Service<PgAssetStore, PgWalletPool, RedisJobQueue, FsContentStore, InMemoryPubSub>;

/// Serve the operator and ingress API.
pub async fn serve(config: Config, service: AppService) -> Result<(), ApiError> {
    let Config { address, port } = config;

    let listener = TcpListener::bind((address, port))
        .await
        .map_err(ApiError::Bind)?;
    info!(address:?, port; "listening to TCP connections");

    axum::serve(listener, make_app(service))
        .await
        .map_err(ApiError::Serve)
}

/// The mountable router: ingress (register, status, listing, retry) plus operator controls and
/// the dashboard.
pub fn make_app(service: AppService) -> Router {
    Router::new()
        .route("/assets", post(register).get(list_assets))
        .route("/assets/retry-failed", post(retry_failed))
        .route("/assets/{id}", get(get_asset))
        .route("/assets/{id}/events", get(asset_events))
        .route("/queue/stats", get(queue_stats))
        .route("/queue/pause", post(pause_queue))
        .route("/queue/resume", post(resume_queue))
        .route("/queue/clear-completed", post(clear_completed))
        .route("/queue/clear-failed", post(clear_failed))
        .route("/queue/retry-failed", post(retry_failed_jobs))
        .route("/wallets/stats", get(wallet_stats))
        .route("/health", get(health))
        .route("/dashboard", get(dashboard))
        .with_state(service)
}

async fn register(
    State(service): State<AppService>,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<AssetSummary>), ApiError> {
    let summary = service.register(input).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn get_asset(
    State(service): State<AppService>,
    Path(id): Path<i64>,
) -> Result<Json<AssetSummary>, ApiError> {
    let summary = service
        .get_status(id)
        .await?
        .ok_or(ApiError::NotFound(id))?;
    Ok(Json(summary))
}

/// Progress events of one asset as server-sent events; the stream ends after the terminal
/// event closes the topic.
async fn asset_events(
    State(service): State<AppService>,
    Path(id): Path<i64>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = service
        .subscribe(id)
        .map(|event| Ok(Event::default().json_data(event).unwrap_or_default()));

    Sse::new(events)
}

#[derive(Debug, Deserialize)]
struct ListParams {
    source: String,
    status: Option<AssetStatus>,
    limit: Option<u64>,
    offset: Option<u64>,
}

async fn list_assets(
    State(service): State<AppService>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<AssetSummary>>, ApiError> {
    let ListParams {
        source,
        status,
        limit,
        offset,
    } = params;

    let summaries = service
        .list_by_source(
            &source,
            SourceFilter {
                status,
                limit,
                offset,
            },
        )
        .await?;
    Ok(Json(summaries))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetryFailedParams {
    source: Option<String>,
    max_attempts: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Affected {
    affected: u64,
}

async fn retry_failed(
    State(service): State<AppService>,
    params: Option<Json<RetryFailedParams>>,
) -> Result<Json<Affected>, ApiError> {
    let RetryFailedParams {
        source,
        max_attempts,
    } = params.map(|Json(params)| params).unwrap_or_default();

    let affected = service
        .retry_failed(RetryCriteria {
            source,
            max_attempts,
        })
        .await?;
    Ok(Json(Affected { affected }))
}

async fn queue_stats(State(service): State<AppService>) -> Result<Json<QueueStats>, ApiError> {
    Ok(Json(service.queue_stats().await?))
}

async fn pause_queue(State(service): State<AppService>) -> Result<StatusCode, ApiError> {
    service.pause_queue().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn resume_queue(State(service): State<AppService>) -> Result<StatusCode, ApiError> {
    service.resume_queue().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_completed(State(service): State<AppService>) -> Result<Json<Affected>, ApiError> {
    let affected = service.clear_completed_jobs().await?;
    Ok(Json(Affected { affected }))
}

async fn clear_failed(State(service): State<AppService>) -> Result<Json<Affected>, ApiError> {
    let affected = service.clear_failed_jobs().await?;
    Ok(Json(Affected { affected }))
}

async fn retry_failed_jobs(State(service): State<AppService>) -> Result<Json<Affected>, ApiError> {
    let affected = service.retry_failed_jobs().await?;
    Ok(Json(Affected { affected }))
}

async fn health(State(service): State<AppService>) -> Result<Json<HealthSnapshot>, ApiError> {
    Ok(Json(service.health().await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardView {
    service: &'static str,
    version: &'static str,
    queue: QueueStats,
    wallets: WalletStats,
    paused: bool,
}

async fn dashboard(State(service): State<AppService>) -> Result<Json<DashboardView>, ApiError> {
    let HealthSnapshot {
        queue,
        wallets,
        paused,
    } = service.health().await?;

    Ok(Json(DashboardView {
        service: "dkg-publisher",
        version: env!("CARGO_PKG_VERSION"),
        queue,
        wallets,
        paused,
    }))
}

/// Configuration for the API.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub address: IpAddr,
    pub port: u16,
}

/// Error possibly returned by the API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("cannot bind tcp listener")]
    Bind(#[source] io::Error),

    #[error("cannot serve API")]
    Serve(#[source] io::Error),

    #[error("asset {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),

            ApiError::Service(ServiceError::Validation(error)) => {
                (StatusCode::BAD_REQUEST, error.to_string())
            }

            ApiError::Service(ServiceError::Assets(AssetStoreError::NotFound(_))) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }

            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
