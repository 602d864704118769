// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Manager Core
//!
//! Drives AI agents through an external control plane: builds, workload
//! updates and per-environment deployment status, with every remote call
//! wrapped in a classified, cancellable retry loop.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, orchestration use cases and the adapters they
//!   run on (control-plane REST client, outbound HTTP layer, Postgres pool)

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
