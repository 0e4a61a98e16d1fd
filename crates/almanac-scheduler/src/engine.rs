//! Scheduler — the top-level container of profiles.
//!
//! Constructed with a config folder and geographic coordinates, it loads
//! every profile file at startup, owns the profile lifecycle, and re-emits
//! every event fire to host subscribers.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use almanac_core::config::ProfileRecord;
use almanac_core::error::Result;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::runtime::Handle;

use crate::event::Event;
use crate::notify::FireHub;
use crate::profile::Profile;
use crate::store;

/// The scheduler. Cheap to share behind an `Arc`; all operations are
/// thread-safe.
pub struct Scheduler {
    config_dir: PathBuf,
    latitude: f64,
    longitude: f64,
    profiles: DashMap<String, Profile>,
    fired: Arc<FireHub>,
    runtime: Handle,
    disposed: AtomicBool,
}

impl Scheduler {
    /// Create a scheduler rooted at `config_dir` for a location. Must be
    /// called on a tokio runtime; timers and saves spawn onto it.
    pub fn new(config_dir: impl Into<PathBuf>, latitude: f64, longitude: f64) -> Self {
        Self {
            config_dir: config_dir.into(),
            latitude,
            longitude,
            profiles: DashMap::new(),
            fired: Arc::new(FireHub::new()),
            runtime: Handle::current(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Ensure the config folder exists and load every profile file in it.
    /// Unreadable files are skipped with a warning; the rest of the load
    /// continues.
    pub async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        let files = store::discover(&self.config_dir).await?;
        for path in files {
            let record = match store::read_profile(&path).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("⚠️ Skipping profile file {}: {e}", path.display());
                    continue;
                }
            };
            let Some(profile) = self.install_profile(&record) else {
                continue;
            };
            for event in &record.events {
                // A false return is already logged; the load keeps going.
                profile.add_event(event);
            }
        }
        tracing::info!(
            "⏰ Scheduler initialized: {} profiles from {}",
            self.profiles.len(),
            self.config_dir.display()
        );
        Ok(())
    }

    /// Create an empty profile. Returns false on a duplicate name.
    pub fn add_profile(&self, name: &str, description: Option<&str>) -> bool {
        let record = ProfileRecord {
            name: name.to_string(),
            description: description.map(str::to_string),
            ..ProfileRecord::default()
        };
        self.install_profile(&record).is_some()
    }

    fn install_profile(&self, record: &ProfileRecord) -> Option<Profile> {
        let name = record.name.trim();
        if name.is_empty() {
            tracing::warn!("⚠️ Refusing profile with empty name");
            return None;
        }
        match self.profiles.entry(name.to_string()) {
            Entry::Occupied(_) => {
                tracing::warn!("⚠️ Duplicate profile name '{name}'");
                None
            }
            Entry::Vacant(slot) => {
                let profile = Profile::new(
                    name,
                    record.description.as_deref(),
                    &self.config_dir,
                    self.latitude,
                    self.longitude,
                    self.runtime.clone(),
                );
                // Re-emit profile-level fires to the scheduler's subscribers.
                let hub = Arc::clone(&self.fired);
                profile.on_event_fired(move |event| hub.dispatch(event));
                slot.insert(profile.clone());
                tracing::info!("📁 Profile added: '{name}'");
                Some(profile)
            }
        }
    }

    /// Remove a profile, stop its events, and delete its file.
    pub async fn remove_profile(&self, name: &str) -> bool {
        match self.profiles.remove(name) {
            Some((_, profile)) => {
                profile.dispose().await;
                let path = store::profile_path(&self.config_dir, name);
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!("⚠️ Could not delete {}: {e}", path.display());
                }
                tracing::info!("🗑️ Profile removed: '{name}'");
                true
            }
            None => false,
        }
    }

    pub fn get_profile(&self, name: &str) -> Option<Profile> {
        self.profiles.get(name).map(|p| p.value().clone())
    }

    /// Snapshot of the profiles, sorted by name.
    pub fn profiles(&self) -> Vec<Profile> {
        let mut all: Vec<_> = self.profiles.iter().map(|p| p.value().clone()).collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    /// Subscribe to every event fire across every profile. Callbacks run
    /// synchronously on the firing event's timer task: be fast, and never
    /// assume a dedicated thread.
    pub fn on_event_fired(&self, subscriber: impl Fn(&Arc<Event>) + Send + Sync + 'static) {
        self.fired.subscribe(Arc::new(subscriber));
    }

    /// Dispose every profile (flushing pending saves, files retained) and
    /// clear the map. Idempotent.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let all: Vec<Profile> = self.profiles.iter().map(|p| p.value().clone()).collect();
        self.profiles.clear();
        for profile in all {
            profile.dispose().await;
        }
        self.fired.clear();
        tracing::info!("⏰ Scheduler disposed");
    }
}
