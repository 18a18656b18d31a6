// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Secret resolution
//!
//! Runs after the step list and graph are final. Each distinct secret
//! name is looked up once; lookups run concurrently. A missing secret, or
//! a failing provider, leaves the reference empty.

use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};

use crate::context::{Build, Repo};
use crate::engine::CompiledStep;
use crate::pipeline::PipelineDefinition;
use crate::secret::{SecretProvider, SecretRequest};

/// Outcome counts, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    pub requested: usize,
    pub resolved: usize,
}

pub async fn resolve(
    steps: &mut [CompiledStep],
    provider: &dyn SecretProvider,
    build: &Build,
    repo: &Repo,
    pipeline: &PipelineDefinition,
) -> ResolveSummary {
    let names: BTreeSet<String> = steps
        .iter()
        .flat_map(|s| s.secrets.iter().map(|secret| secret.name.clone()))
        .collect();

    if names.is_empty() {
        return ResolveSummary::default();
    }

    let lookups = names.iter().map(|name| async move {
        let request = SecretRequest {
            name,
            build,
            repo,
            pipeline,
        };
        let found = match provider.find(&request).await {
            Ok(Some(value)) => Some(value.data),
            Ok(None) => {
                tracing::debug!(secret = %name, "secret not found");
                None
            }
            Err(e) => {
                tracing::warn!(
                    secret = %name,
                    error = %e,
                    "secret lookup failed, leaving it unresolved"
                );
                None
            }
        };
        (name.clone(), found)
    });

    let found: BTreeMap<String, Vec<u8>> = join_all(lookups)
        .await
        .into_iter()
        .filter_map(|(name, data)| data.map(|d| (name, d)))
        .collect();

    for step in steps.iter_mut() {
        for secret in step.secrets.iter_mut() {
            if let Some(data) = found.get(&secret.name) {
                secret.data = data.clone();
            }
        }
    }

    let summary = ResolveSummary {
        requested: names.len(),
        resolved: found.len(),
    };
    tracing::debug!(
        requested = summary.requested,
        resolved = summary.resolved,
        "resolved secrets"
    );
    summary
}
