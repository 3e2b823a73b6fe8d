//! Time-bounded profile registry cache.
//!
//! Readers get an `Arc` snapshot without waiting on a rebuild in progress
//! unless the snapshot has expired. Expired snapshots are rebuilt by one
//! caller at a time; concurrent callers wait and then reuse its result.

use super::{ProfileRegistry, RegistryOptions};
use crate::metrics::METRICS;
use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Clone)]
struct Snapshot {
    registry: Arc<ProfileRegistry>,
    built_at: Instant,
}

pub struct ProfileRegistryCache {
    sources: Vec<String>,
    options: RegistryOptions,
    ttl: Duration,
    current: RwLock<Option<Snapshot>>,
    rebuild: Mutex<()>,
    empty: Arc<ProfileRegistry>,
}

impl ProfileRegistryCache {
    pub fn new(sources: Vec<String>, options: RegistryOptions, ttl: Duration) -> Self {
        Self {
            sources,
            options,
            ttl,
            current: RwLock::new(None),
            rebuild: Mutex::new(()),
            empty: Arc::new(ProfileRegistry::empty()),
        }
    }

    fn fresh(&self) -> Option<Arc<ProfileRegistry>> {
        self.current
            .read()
            .as_ref()
            .filter(|snapshot| snapshot.built_at.elapsed() < self.ttl)
            .map(|snapshot| snapshot.registry.clone())
    }

    /// The current registry, rebuilt first if it is older than the TTL.
    ///
    /// When a rebuild fails the previous registry is served if there is one.
    pub async fn get(&self) -> Result<Arc<ProfileRegistry>> {
        if self.sources.is_empty() {
            return Ok(self.empty.clone());
        }
        if let Some(registry) = self.fresh() {
            return Ok(registry);
        }

        let _guard = self.rebuild.lock().await;
        // another caller may have rebuilt while we waited
        if let Some(registry) = self.fresh() {
            return Ok(registry);
        }

        let started = Instant::now();
        match ProfileRegistry::load(&self.sources, &self.options).await {
            Ok(registry) => {
                let registry = Arc::new(registry);
                *self.current.write() = Some(Snapshot {
                    registry: registry.clone(),
                    built_at: Instant::now(),
                });
                METRICS.record_registry_rebuild(registry.len());
                info!(
                    profiles = registry.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "profile registry rebuilt"
                );
                Ok(registry)
            }
            Err(e) => {
                let stale = self.current.read().as_ref().map(|s| s.registry.clone());
                match stale {
                    Some(registry) => {
                        warn!(error = %format!("{e:#}"), "profile registry rebuild failed, serving previous registry");
                        Ok(registry)
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Drop the current snapshot so the next `get` rebuilds.
    pub fn invalidate(&self) {
        self.current.write().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tokio::task::JoinSet;

    const PROFILE: &str = r#"
        @prefix prof: <http://www.w3.org/ns/dx/prof/> .
        <https://example.org/profiles/p> a prof:Profile .
    "#;

    fn cache(dir: &std::path::Path, ttl: Duration) -> ProfileRegistryCache {
        ProfileRegistryCache::new(
            vec![dir.join("profiles.ttl").display().to_string()],
            RegistryOptions::default(),
            ttl,
        )
    }

    #[tokio::test]
    #[serial(profile_registry)]
    async fn snapshot_is_reused_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("profiles.ttl"), PROFILE).unwrap();
        let cache = cache(dir.path(), Duration::from_secs(3600));

        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.has_profile("https://example.org/profiles/p"));
    }

    #[tokio::test]
    #[serial(profile_registry)]
    async fn expired_snapshot_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("profiles.ttl"), PROFILE).unwrap();
        let cache = cache(dir.path(), Duration::ZERO);

        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    #[serial(profile_registry)]
    async fn failed_rebuild_serves_previous_registry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("profiles.ttl"), PROFILE).unwrap();
        let cache = cache(dir.path(), Duration::ZERO);

        let first = cache.get().await.unwrap();
        fs::write(dir.path().join("profiles.ttl"), "not turtle at all <").unwrap();
        let second = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        cache.invalidate();
        assert!(cache.get().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[serial(profile_registry)]
    async fn concurrent_callers_share_one_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("profiles.ttl"), PROFILE).unwrap();
        let cache = Arc::new(cache(dir.path(), Duration::from_secs(3600)));

        let stale = cache.get().await.unwrap();
        cache.invalidate();
        let rebuilds_before = METRICS.profile_registry_rebuilds_total.get();

        let mut callers = JoinSet::new();
        for _ in 0..16 {
            let cache = cache.clone();
            callers.spawn(async move { cache.get().await.unwrap() });
        }
        let mut results = Vec::new();
        while let Some(result) = callers.join_next().await {
            results.push(result.unwrap());
        }

        assert_eq!(results.len(), 16);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
        assert!(!Arc::ptr_eq(&results[0], &stale));
        assert_eq!(METRICS.profile_registry_rebuilds_total.get() - rebuilds_before, 1);
    }

    #[tokio::test]
    async fn no_sources_yields_empty_registry() {
        let cache = ProfileRegistryCache::new(Vec::new(), RegistryOptions::default(), Duration::ZERO);
        assert!(cache.get().await.unwrap().is_empty());
    }
}
