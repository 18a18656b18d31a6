// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Secret providers
//!
//! The compiler only needs one capability from a secret backend: look a
//! secret up by name, given the build it is requested for. Backends are
//! free to fail; the compiler treats failures as "not found".

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::context::{Build, Repo};
use crate::pipeline::PipelineDefinition;

/// Context of one secret lookup
#[derive(Debug, Clone, Copy)]
pub struct SecretRequest<'a> {
    pub name: &'a str,
    pub build: &'a Build,
    pub repo: &'a Repo,
    pub pipeline: &'a PipelineDefinition,
}

/// A resolved secret value
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue {
    pub name: String,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretValue")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Trait for secret backends
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Find a secret. `Ok(None)` means the backend has no such secret.
    async fn find(&self, request: &SecretRequest<'_>) -> anyhow::Result<Option<SecretValue>>;
}

/// In-memory secrets, e.g. from `--secret` flags or the runner config
#[derive(Clone, Default)]
pub struct StaticSecrets {
    values: BTreeMap<String, String>,
}

impl StaticSecrets {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for StaticSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticSecrets")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl SecretProvider for StaticSecrets {
    async fn find(&self, request: &SecretRequest<'_>) -> anyhow::Result<Option<SecretValue>> {
        Ok(self.values.get(request.name).map(|v| SecretValue {
            name: request.name.to_string(),
            data: v.as_bytes().to_vec(),
        }))
    }
}

/// Queries providers in order and returns the first hit. A failing
/// provider does not hide the ones after it.
#[derive(Default)]
pub struct CombinedSecrets {
    providers: Vec<Box<dyn SecretProvider>>,
}

impl CombinedSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl SecretProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }
}

#[async_trait]
impl SecretProvider for CombinedSecrets {
    async fn find(&self, request: &SecretRequest<'_>) -> anyhow::Result<Option<SecretValue>> {
        let mut last_err = None;
        for provider in &self.providers {
            match provider.find(request).await {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {}
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}
