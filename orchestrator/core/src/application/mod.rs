// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_orchestration;
pub mod orchestration;

// Re-export use cases for convenience
pub use agent_orchestration::{
    AgentOrchestrationService, BuildDetails, BuildSummary, DeployOutcome, DeployRequest,
    DeploymentSummary, OrchestrationError,
};
pub use orchestration::StandardAgentOrchestrationService;
