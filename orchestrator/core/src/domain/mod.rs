// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain model of the agent manager.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Control-plane resources, status derivations, promotion
//!   graph, retry policy values and the call context. Nothing here performs
//!   I/O except the configuration loader.

pub mod call_context;
pub mod retry;
pub mod condition;
pub mod build_status;
pub mod deployment_status;
pub mod promotion;
pub mod control_plane;
pub mod repository;
pub mod platform_config;
