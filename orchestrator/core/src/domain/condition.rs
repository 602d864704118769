// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Status conditions reported by the control plane.
//!
//! A resource carries an unordered bag of conditions, nominally one per type.
//! [`ConditionSet`] indexes that bag so lookups do not depend on arrival order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn new(
        condition_type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        last_transition_time: DateTime<Utc>,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: String::new(),
            last_transition_time,
            observed_generation: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_observed_generation(mut self, generation: i64) -> Self {
        self.observed_generation = Some(generation);
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }

    /// Total order used to pick one record when a type is reported twice.
    fn precedence_key(&self) -> (DateTime<Utc>, ConditionStatus, &str, &str, Option<i64>) {
        (
            self.last_transition_time,
            self.status,
            &self.reason,
            &self.message,
            self.observed_generation,
        )
    }
}

/// Conditions indexed by type.
#[derive(Debug, Clone, Default)]
pub struct ConditionSet<'a> {
    by_type: HashMap<&'a str, &'a Condition>,
}

impl<'a> ConditionSet<'a> {
    pub fn new(conditions: &'a [Condition]) -> Self {
        let mut by_type: HashMap<&'a str, &'a Condition> = HashMap::new();
        for condition in conditions {
            by_type
                .entry(condition.condition_type.as_str())
                .and_modify(|current| {
                    if condition.precedence_key() > current.precedence_key() {
                        *current = condition;
                    }
                })
                .or_insert(condition);
        }
        Self { by_type }
    }

    pub fn get(&self, condition_type: &str) -> Option<&'a Condition> {
        self.by_type.get(condition_type).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Latest transition time across every condition.
    pub fn latest_transition(&self) -> Option<DateTime<Utc>> {
        self.by_type.values().map(|c| c.last_transition_time).max()
    }
}
