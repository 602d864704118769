// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Control-plane client implementations.
//!
//! - [`HttpControlPlaneClient`] - REST API over the outbound HTTP layer
//! - [`InMemoryControlPlane`] - map-backed fake with scripted failures

pub mod http;
pub mod memory;

pub use http::HttpControlPlaneClient;
pub use memory::InMemoryControlPlane;
