// This file is part of dkg-publisher.
// Copyright (C) 2025 AgentDKG Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
