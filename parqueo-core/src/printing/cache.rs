//! TTL settings cache shared by the printing service
//!
//! Holds the process-wide simulation-mode flag (24 h expiry), short-lived
//! design overrides used for previews (5 min expiry) and the last design
//! known to have been active (no expiry, the print-time fallback).
//!
//! Entries are eventually consistent with the service's in-memory copies;
//! the service re-reads them through its reload operations.

use super::types::TicketDesign;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Expiry for the simulation-mode flag
pub const SIMULATION_MODE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Expiry for preview design overrides
pub const DESIGN_OVERRIDE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Entry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn live(&self) -> Option<T> {
        (Instant::now() < self.expires_at).then(|| self.value.clone())
    }
}

#[derive(Debug, Default)]
struct SettingsCacheInner {
    simulation_mode: Option<Entry<bool>>,
    design_override: Option<Entry<TicketDesign>>,
    last_design: Option<TicketDesign>,
}

/// Printing settings cache
#[derive(Debug, Clone)]
pub struct SettingsCache {
    inner: Arc<RwLock<SettingsCacheInner>>,
}

impl SettingsCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SettingsCacheInner::default())),
        }
    }

    /// Store the simulation-mode flag with the given expiry
    pub async fn set_simulation_mode(&self, enabled: bool, ttl: Duration) {
        let mut inner = self.inner.write().await;
        inner.simulation_mode = Some(Entry::new(enabled, ttl));
    }

    /// Read the simulation-mode flag; expired entries read as absent
    pub async fn simulation_mode(&self) -> Option<bool> {
        let inner = self.inner.read().await;
        inner.simulation_mode.as_ref().and_then(Entry::live)
    }

    /// Store a short-lived design override (previews)
    pub async fn set_design_override(&self, design: TicketDesign, ttl: Duration) {
        let mut inner = self.inner.write().await;
        inner.design_override = Some(Entry::new(design, ttl));
    }

    /// Read the design override, if still live
    pub async fn design_override(&self) -> Option<TicketDesign> {
        let inner = self.inner.read().await;
        inner.design_override.as_ref().and_then(Entry::live)
    }

    /// Remember the last design known to have been active
    pub async fn remember_design(&self, design: TicketDesign) {
        let mut inner = self.inner.write().await;
        inner.last_design = Some(design);
    }

    /// Last design known to have been active
    pub async fn last_design(&self) -> Option<TicketDesign> {
        let inner = self.inner.read().await;
        inner.last_design.clone()
    }

    /// Drop everything
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        *inner = SettingsCacheInner::default();
    }
}

impl Default for SettingsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulation_mode_roundtrip() {
        let cache = SettingsCache::new();
        assert!(cache.simulation_mode().await.is_none());

        cache.set_simulation_mode(true, SIMULATION_MODE_TTL).await;
        assert_eq!(cache.simulation_mode().await, Some(true));

        cache.set_simulation_mode(false, SIMULATION_MODE_TTL).await;
        assert_eq!(cache.simulation_mode().await, Some(false));
    }

    #[tokio::test]
    async fn test_simulation_mode_set_twice_is_idempotent() {
        let cache = SettingsCache::new();
        cache.set_simulation_mode(true, SIMULATION_MODE_TTL).await;
        cache.set_simulation_mode(true, SIMULATION_MODE_TTL).await;
        assert_eq!(cache.simulation_mode().await, Some(true));
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let cache = SettingsCache::new();
        cache
            .set_simulation_mode(true, Duration::from_secs(0))
            .await;
        assert!(cache.simulation_mode().await.is_none());
    }

    #[tokio::test]
    async fn test_design_override_expiry() {
        let cache = SettingsCache::new();
        let design = TicketDesign::default();

        cache
            .set_design_override(design.clone(), DESIGN_OVERRIDE_TTL)
            .await;
        assert!(cache.design_override().await.is_some());

        cache
            .set_design_override(design, Duration::from_secs(0))
            .await;
        assert!(cache.design_override().await.is_none());
    }

    #[tokio::test]
    async fn test_last_design_has_no_expiry() {
        let cache = SettingsCache::new();
        cache.remember_design(TicketDesign::default()).await;
        assert!(cache.last_design().await.is_some());

        cache.clear().await;
        assert!(cache.last_design().await.is_none());
    }
}
