// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Promotion Graph
//!
//! A deployment pipeline is a list of promotion paths, each leading from one
//! source environment to an ordered list of targets. Every pipeline in use
//! today is a straight chain (`dev -> staging -> prod`), but nothing here
//! enforces that; queries degrade to "nothing found" on anything else.
//!
//! # Architecture
//!
//! - **Layer:** Domain
//! - **Purpose:** Environment ordering, entry environment, next hop

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::control_plane::Environment;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetEnvironment {
    pub name: String,
    #[serde(default)]
    pub requires_approval: bool,
}

impl TargetEnvironment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_approval: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionPath {
    pub source_environment: String,
    #[serde(default)]
    pub target_environments: Vec<TargetEnvironment>,
}

impl PromotionPath {
    pub fn new<I, S>(source: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source_environment: source.into(),
            target_environments: targets.into_iter().map(TargetEnvironment::new).collect(),
        }
    }

    /// Path whose targets carry their own approval flags.
    pub fn with_targets(
        source: impl Into<String>,
        targets: impl IntoIterator<Item = TargetEnvironment>,
    ) -> Self {
        Self {
            source_environment: source.into(),
            target_environments: targets.into_iter().collect(),
        }
    }
}

/// Next environment an agent can be promoted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionTarget {
    pub name: String,
    pub display_name: String,
    pub requires_approval: bool,
}

/// Environments in first-seen order: each path's source, then its targets.
///
/// This is not a topological sort. Paths listed out of chain order produce an
/// order that follows the listing, e.g. `[staging->prod, dev->staging]` gives
/// `[staging, prod, dev]`.
pub fn build_environment_order(paths: &[PromotionPath]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let names = paths.iter().flat_map(|path| {
        std::iter::once(&path.source_environment)
            .chain(path.target_environments.iter().map(|t| &t.name))
    });
    for name in names {
        if seen.insert(name.as_str()) {
            order.push(name.clone());
        }
    }
    order
}

/// First source environment that no path promotes into.
///
/// `None` for an empty pipeline, or when every source is also some target
/// (a cycle). Callers treat `None` as "undeterminable", not as a failure.
pub fn find_lowest_environment(paths: &[PromotionPath]) -> Option<String> {
    let targets: HashSet<&str> = paths
        .iter()
        .flat_map(|p| p.target_environments.iter().map(|t| t.name.as_str()))
        .collect();
    paths
        .iter()
        .map(|p| p.source_environment.as_str())
        .find(|source| !targets.contains(source))
        .map(str::to_string)
}

/// Next hop out of `source`: the first target of the first path whose source
/// matches. Additional targets on that path, and later paths with the same
/// source, are not considered.
pub fn find_promotion_target(
    source: &str,
    paths: &[PromotionPath],
    environments: &HashMap<String, Environment>,
) -> Option<PromotionTarget> {
    let path = paths.iter().find(|p| p.source_environment == source)?;
    let target = path.target_environments.first()?;
    let display_name = environments
        .get(&target.name)
        .map(|env| env.display_name.clone())
        .unwrap_or_default();
    Some(PromotionTarget {
        name: target.name.clone(),
        display_name,
        requires_approval: target.requires_approval,
    })
}
