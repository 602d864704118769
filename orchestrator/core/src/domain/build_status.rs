// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Build Status Derivation
//!
//! Turns the conditions reported on a build resource into the single view the
//! platform shows: a status label, a completion percentage, an end timestamp,
//! and the per-stage step list.
//!
//! Every function here is pure over the *set* of conditions. Shuffling the
//! input, repeating it, or adding condition types outside the build vocabulary
//! never changes the result.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Derived, never persisted, recomputed on every read

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::domain::condition::{Condition, ConditionSet, ConditionStatus};

/// Build lifecycle stages in the order the control plane progresses through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum BuildStage {
    Initiated,
    Triggered,
    Completed,
    Deployed,
}

impl BuildStage {
    pub const ORDERED: [BuildStage; 4] = [
        BuildStage::Initiated,
        BuildStage::Triggered,
        BuildStage::Completed,
        BuildStage::Deployed,
    ];

    pub const FINAL: BuildStage = BuildStage::Deployed;

    /// Condition type reported by the control plane for this stage.
    pub fn condition_type(self) -> &'static str {
        match self {
            BuildStage::Initiated => "BuildInitiated",
            BuildStage::Triggered => "BuildTriggered",
            BuildStage::Completed => "BuildCompleted",
            BuildStage::Deployed => "WorkloadUpdated",
        }
    }

    /// Percentage reached once this stage reports true.
    pub fn weight(self) -> u8 {
        match self {
            BuildStage::Initiated => 10,
            BuildStage::Triggered => 40,
            BuildStage::Completed => 80,
            BuildStage::Deployed => 100,
        }
    }

    pub fn from_condition_type(condition_type: &str) -> Option<Self> {
        Self::ORDERED
            .into_iter()
            .find(|stage| stage.condition_type() == condition_type)
    }
}

/// Status label shown for a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatusLabel {
    /// Final stage reported true.
    Completed,
    /// Reason code of the latest stage reported so far.
    Reason(String),
    /// No recognized stage reported yet.
    Unknown,
}

impl BuildStatusLabel {
    pub fn as_str(&self) -> &str {
        match self {
            BuildStatusLabel::Completed => "Completed",
            BuildStatusLabel::Reason(reason) => reason,
            BuildStatusLabel::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for BuildStatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BuildStatusLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStep {
    pub stage: BuildStage,
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Everything derivable from a build's conditions in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedBuildStatus {
    pub status: BuildStatusLabel,
    pub percent_complete: u8,
    pub ended_at: Option<DateTime<Utc>>,
    pub steps: Vec<BuildStep>,
}

impl DerivedBuildStatus {
    pub fn from_conditions(conditions: &[Condition]) -> Self {
        let set = ConditionSet::new(conditions);
        Self {
            status: status_label(&set),
            percent_complete: percent_complete(&set),
            ended_at: end_time(&set),
            steps: steps(&set),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Whole seconds from `started_at` to the end, once the build has ended.
    pub fn duration_seconds(&self, started_at: DateTime<Utc>) -> Option<i64> {
        self.ended_at
            .map(|ended| (ended - started_at).num_seconds().max(0))
    }
}

pub fn build_status_label(conditions: &[Condition]) -> BuildStatusLabel {
    status_label(&ConditionSet::new(conditions))
}

pub fn build_percent_complete(conditions: &[Condition]) -> u8 {
    percent_complete(&ConditionSet::new(conditions))
}

pub fn build_end_time(conditions: &[Condition]) -> Option<DateTime<Utc>> {
    end_time(&ConditionSet::new(conditions))
}

fn status_label(set: &ConditionSet<'_>) -> BuildStatusLabel {
    for stage in BuildStage::ORDERED.into_iter().rev() {
        let Some(condition) = set.get(stage.condition_type()) else {
            continue;
        };
        if stage == BuildStage::FINAL && condition.is_true() {
            return BuildStatusLabel::Completed;
        }
        if condition.reason.is_empty() {
            return BuildStatusLabel::Reason(stage.condition_type().to_string());
        }
        return BuildStatusLabel::Reason(condition.reason.clone());
    }
    BuildStatusLabel::Unknown
}

fn percent_complete(set: &ConditionSet<'_>) -> u8 {
    BuildStage::ORDERED
        .into_iter()
        .filter(|stage| set.get(stage.condition_type()).is_some_and(Condition::is_true))
        .map(BuildStage::weight)
        .max()
        .unwrap_or(0)
}

fn end_time(set: &ConditionSet<'_>) -> Option<DateTime<Utc>> {
    let first_failure = BuildStage::ORDERED
        .into_iter()
        .filter_map(|stage| set.get(stage.condition_type()))
        .find(|condition| condition.is_false());
    if let Some(failed) = first_failure {
        return Some(failed.last_transition_time);
    }
    set.get(BuildStage::FINAL.condition_type())
        .map(|c| c.last_transition_time)
}

fn steps(set: &ConditionSet<'_>) -> Vec<BuildStep> {
    BuildStage::ORDERED
        .into_iter()
        .filter_map(|stage| {
            set.get(stage.condition_type()).map(|c| BuildStep {
                stage,
                condition_type: c.condition_type.clone(),
                status: c.status,
                reason: c.reason.clone(),
                message: c.message.clone(),
                at: c.last_transition_time,
            })
        })
        .collect()
}
