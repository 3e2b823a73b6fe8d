use crate::access::AccessGate;
use crate::config::ServerConfig;
use crate::engine::{ContextUplifter, UpliftEngine};
use crate::entail::EntailmentValidationService;
use crate::profiles::{ProfileRegistryCache, RegistryOptions};
use crate::uplift::UpliftOrchestrator;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Shared per-process services.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    gate: Arc<AccessGate>,
    engine: Arc<dyn UpliftEngine>,
    profiles: Arc<ProfileRegistryCache>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>) -> Result<Self> {
        let engine = ContextUplifter::new(config.fetch_timeout)?;
        Self::with_engine(config, Arc::new(engine))
    }

    /// Build the state around a different transformation engine.
    pub fn with_engine(config: Arc<ServerConfig>, engine: Arc<dyn UpliftEngine>) -> Result<Self> {
        let gate = AccessGate::new(config.remote_fetch.clone(), config.fetch_timeout)?;
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .context("failed to build profile HTTP client")?;
        let options = RegistryOptions {
            mappings: config.artifact_mappings.clone(),
            ignore_artifact_errors: true,
            client,
        };
        let profiles = ProfileRegistryCache::new(config.profile_sources.clone(), options, config.profiles_ttl);

        Ok(Self {
            config,
            gate: Arc::new(gate),
            engine,
            profiles: Arc::new(profiles),
        })
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn profiles(&self) -> Arc<ProfileRegistryCache> {
        self.profiles.clone()
    }

    pub fn orchestrator(&self) -> UpliftOrchestrator<'_> {
        UpliftOrchestrator::new(&self.gate, self.engine.as_ref(), &self.config.context_fetch)
    }

    pub fn entailment(&self) -> EntailmentValidationService {
        EntailmentValidationService::new(self.profiles.clone())
    }
}
