//! Ordering of stages along their upstream links.

use crate::errors::ConfigError;
use std::collections::{BTreeMap, HashSet};

/// Returns stage ids ordered so every upstream precedes its downstream.
///
/// `stages` maps each stage id to its optional upstream. Fails on an
/// upstream that is not itself a stage, or on a cycle. Output is
/// deterministic for a given input.
pub fn stage_order(stages: &BTreeMap<String, Option<String>>) -> Result<Vec<String>, ConfigError> {
    for (stage, upstream) in stages {
        if let Some(up) = upstream {
            if !stages.contains_key(up) {
                return Err(ConfigError::UnknownUpstream {
                    job: stage.clone(),
                    upstream: up.clone(),
                });
            }
        }
    }

    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(stages.len());

    for start in stages.keys() {
        // Walk up the chain, then emit it root-first.
        let mut chain = Vec::new();
        let mut on_chain = HashSet::new();
        let mut node = Some(start.as_str());

        while let Some(current) = node {
            if visited.contains(current) {
                break;
            }
            if !on_chain.insert(current) {
                return Err(ConfigError::UpstreamCycle(current.to_string()));
            }
            chain.push(current);
            node = stages.get(current).and_then(|up| up.as_deref());
        }

        for stage in chain.into_iter().rev() {
            visited.insert(stage);
            order.push(stage.to_string());
        }
    }

    Ok(order)
}
