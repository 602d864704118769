// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod retry;
pub mod transient;
pub mod http;
pub mod db;
pub mod repositories;
pub mod control_plane;

pub use control_plane::{HttpControlPlaneClient, InMemoryControlPlane};
