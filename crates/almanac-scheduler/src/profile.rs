//! Profile container — a named, persisted set of events.
//!
//! The profile re-emits event fires at profile level, tracks a dirty flag,
//! and owns the debounced save: every dirty edge arms a single-shot
//! 3-second timer, so a burst of fires coalesces into one disk write. All
//! profiles in the process serialize their writes through one mutex to
//! bound concurrent file I/O.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration as StdDuration;

use almanac_core::config::{self, EventRecord, ProfileRecord};
use almanac_core::error::Result;
use chrono::{DateTime, Local};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::runtime::Handle;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;

use crate::event::{Event, EventContext, EventOwner};
use crate::notify::FireHub;
use crate::store;

/// Delay between a dirty edge and the save it schedules.
pub(crate) const SAVE_DEBOUNCE: StdDuration = StdDuration::from_secs(3);

/// One write at a time across every profile in the process.
static SAVE_LOCK: TokioMutex<()> = TokioMutex::const_new(());

/// A named set of events persisted to `<name>-Profile.json`. Cheap to
/// clone; clones share state.
#[derive(Clone)]
pub struct Profile {
    inner: Arc<ProfileInner>,
}

pub(crate) struct ProfileInner {
    name: String,
    description: RwLock<String>,
    path: std::path::PathBuf,
    latitude: f64,
    longitude: f64,
    events: DashMap<String, Arc<Event>>,
    fired: FireHub,
    changed: AtomicBool,
    save_armed: AtomicBool,
    save_task: Mutex<Option<JoinHandle<()>>>,
    last_modified: Mutex<DateTime<Local>>,
    disposed: AtomicBool,
    runtime: Handle,
    self_weak: Weak<ProfileInner>,
}

impl EventOwner for ProfileInner {
    fn mark_changed(&self) {
        self.set_changed();
    }

    fn release(&self, name: &str) {
        if let Some((_, event)) = self.events.remove(name) {
            event.dispose();
            tracing::info!("🗑️ One-time event '{name}' finished and left profile '{}'", self.name);
        }
        self.set_changed();
    }
}

impl ProfileInner {
    fn set_changed(&self) {
        self.changed.store(true, Ordering::SeqCst);
        self.arm_save();
    }

    /// Arm the single-shot save timer. Re-arming while armed coalesces.
    fn arm_save(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if self.save_armed.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak = self.self_weak.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(SAVE_DEBOUNCE).await;
            let Some(inner) = weak.upgrade() else { return };
            inner.save_armed.store(false, Ordering::SeqCst);
            if inner.changed.load(Ordering::SeqCst) && !inner.disposed.load(Ordering::SeqCst) {
                if let Err(e) = inner.save().await {
                    tracing::warn!("⚠️ Deferred save failed for profile '{}': {e}", inner.name);
                }
            }
        });
        *self.lock_save_task() = Some(task);
    }

    /// Serialize and write the profile file. The dirty flag clears only on
    /// success; a failed save retries on the next dirty edge.
    async fn save(&self) -> Result<()> {
        let _io = SAVE_LOCK.lock().await;
        let record = self.to_record();
        store::write_profile(&self.path, &record).await?;
        self.changed.store(false, Ordering::SeqCst);
        tracing::debug!("💾 Saved profile '{}' ({} events)", self.name, record.events.len());
        Ok(())
    }

    /// Build the persisted record: events sorted by target time with ids
    /// renumbered 1..N, and a fresh last-modified stamp.
    fn to_record(&self) -> ProfileRecord {
        let events = self.sorted_events();
        for (index, event) in events.iter().enumerate() {
            event.set_id(index as u32 + 1);
        }
        let stamp = Local::now();
        *self.last_modified.lock().unwrap_or_else(|e| e.into_inner()) = stamp;
        let description = self.description.read().unwrap_or_else(|e| e.into_inner());
        ProfileRecord {
            name: self.name.clone(),
            description: (!description.is_empty()).then(|| description.clone()),
            last_modified: Some(config::format_local(stamp)),
            events: events.iter().map(|e| e.to_record()).collect(),
        }
    }

    fn sorted_events(&self) -> Vec<Arc<Event>> {
        let mut events: Vec<_> = self.events.iter().map(|e| Arc::clone(e.value())).collect();
        events.sort_by_key(|e| e.target_time());
        events
    }

    fn lock_save_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.save_task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Profile {
    pub(crate) fn new(
        name: &str,
        description: Option<&str>,
        dir: &Path,
        latitude: f64,
        longitude: f64,
        runtime: Handle,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| ProfileInner {
            name: name.to_string(),
            description: RwLock::new(description.unwrap_or_default().to_string()),
            path: store::profile_path(dir, name),
            latitude,
            longitude,
            events: DashMap::new(),
            fired: FireHub::new(),
            changed: AtomicBool::new(false),
            save_armed: AtomicBool::new(false),
            save_task: Mutex::new(None),
            last_modified: Mutex::new(Local::now()),
            disposed: AtomicBool::new(false),
            runtime,
            self_weak: weak.clone(),
        });
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn description(&self) -> String {
        self.inner
            .description
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_description(&self, description: &str) {
        *self
            .inner
            .description
            .write()
            .unwrap_or_else(|e| e.into_inner()) = description.to_string();
        self.inner.set_changed();
    }

    /// Construct an event from `record` and add it, replacing any existing
    /// event with the same name. Returns false when construction fails.
    pub fn add_event(&self, record: &EventRecord) -> bool {
        self.add_event_with(record, true)
    }

    /// Like [`add_event`](Self::add_event) but with explicit overwrite
    /// control; without it a name collision is refused.
    pub fn add_event_with(&self, record: &EventRecord, overwrite: bool) -> bool {
        if overwrite {
            self.remove_event(record.name.trim());
        }
        let owner: Weak<dyn EventOwner> = self.inner.self_weak.clone();
        let ctx = EventContext {
            owner,
            latitude: self.inner.latitude,
            longitude: self.inner.longitude,
            runtime: self.inner.runtime.clone(),
        };
        let event = match Event::from_record(record, ctx) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    "⚠️ Rejected event '{}' in profile '{}': {e}",
                    record.name,
                    self.inner.name
                );
                return false;
            }
        };
        match self.inner.events.entry(event.name().to_string()) {
            Entry::Occupied(_) => {
                tracing::warn!(
                    "⚠️ Duplicate event name '{}' in profile '{}'",
                    event.name(),
                    self.inner.name
                );
                event.dispose();
                false
            }
            Entry::Vacant(slot) => {
                // Re-emit this event's fires at profile level.
                let weak = self.inner.self_weak.clone();
                event.on_fired(move |fired| {
                    if let Some(inner) = weak.upgrade() {
                        inner.fired.dispatch(fired);
                    }
                });
                tracing::info!(
                    "📅 Event added: '{}' in profile '{}' → next {}",
                    event.name(),
                    self.inner.name,
                    event.target_time()
                );
                slot.insert(event);
                self.inner.set_changed();
                true
            }
        }
    }

    /// Remove an event by name, stopping its timer.
    pub fn remove_event(&self, name: &str) -> bool {
        match self.inner.events.remove(name) {
            Some((_, event)) => {
                event.dispose();
                self.inner.set_changed();
                tracing::info!("🗑️ Event removed: '{name}' from profile '{}'", self.inner.name);
                true
            }
            None => false,
        }
    }

    pub fn get_event(&self, name: &str) -> Option<Arc<Event>> {
        self.inner.events.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Snapshot of the events, sorted ascending by target time.
    pub fn events(&self) -> Vec<Arc<Event>> {
        self.inner.sorted_events()
    }

    pub fn event_count(&self) -> usize {
        self.inner.events.len()
    }

    /// Enable every event; returns true only if all succeeded.
    pub fn enable_all(&self) -> bool {
        let mut all_ok = true;
        for event in self.inner.sorted_events() {
            if let Err(e) = event.enable() {
                tracing::warn!("⚠️ Enable failed for event '{}': {e}", event.name());
                all_ok = false;
            }
        }
        all_ok
    }

    pub fn disable_all(&self) -> bool {
        for event in self.inner.sorted_events() {
            event.disable();
        }
        true
    }

    pub fn remove_all_events(&self) -> bool {
        let names: Vec<String> = self.inner.events.iter().map(|e| e.key().clone()).collect();
        let mut all_ok = true;
        for name in names {
            all_ok &= self.remove_event(&name);
        }
        all_ok
    }

    /// Subscribe to fires from any event in this profile.
    pub fn on_event_fired(&self, subscriber: impl Fn(&Arc<Event>) + Send + Sync + 'static) {
        self.inner.fired.subscribe(Arc::new(subscriber));
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.changed.load(Ordering::SeqCst)
    }

    pub fn last_modified(&self) -> DateTime<Local> {
        *self
            .inner
            .last_modified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Flush to disk immediately, bypassing the debounce.
    pub async fn save_now(&self) -> Result<()> {
        self.inner.save().await
    }

    /// The profile file this container persists to.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Disarm the save timer, flush once if dirty, and stop every event.
    /// Idempotent; the profile file is retained.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.inner.lock_save_task().take() {
            task.abort();
        }
        if self.inner.changed.load(Ordering::SeqCst) {
            if let Err(e) = self.inner.save().await {
                tracing::warn!("⚠️ Final save failed for profile '{}': {e}", self.inner.name);
            }
        }
        for entry in self.inner.events.iter() {
            entry.value().dispose();
        }
        self.inner.events.clear();
        self.inner.fired.clear();
        tracing::debug!("Profile '{}' disposed", self.inner.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_core::rule::{Frequency, RecurrenceRule};
    use chrono::{Duration, Timelike};
    use std::sync::atomic::AtomicUsize;

    fn test_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("almanac-test-profile-{tag}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn profile(tag: &str, dir: &Path) -> Profile {
        Profile::new(tag, Some("test profile"), dir, 44.8125, 20.4612, Handle::current())
    }

    fn in_minutes(mins: i64) -> DateTime<Local> {
        crate::recurrence::round_to_minute(Local::now() + Duration::minutes(mins))
    }

    #[tokio::test]
    async fn test_add_remove_and_overwrite() {
        let dir = test_dir("add-remove");
        let profile = profile("p", &dir);

        let record = EventRecord::absolute("only", in_minutes(10), RecurrenceRule::one_time());
        assert!(profile.add_event(&record));
        assert_eq!(profile.event_count(), 1);

        // Same name without overwrite: refused.
        assert!(!profile.add_event_with(&record, false));
        assert_eq!(profile.event_count(), 1);

        // With overwrite: replaced, still one entry.
        assert!(profile.add_event(&record));
        assert_eq!(profile.event_count(), 1);

        assert!(profile.remove_event("only"));
        assert!(!profile.remove_event("only"));
        assert_eq!(profile.event_count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_rejected_event_leaves_map_unchanged() {
        let dir = test_dir("reject");
        let profile = profile("p", &dir);

        let record =
            EventRecord::absolute("stale", Local::now() - Duration::minutes(5), RecurrenceRule::one_time());
        assert!(!profile.add_event(&record));
        assert_eq!(profile.event_count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_events_sorted_by_target() {
        let dir = test_dir("sorted");
        let profile = profile("p", &dir);

        profile.add_event(&EventRecord::absolute("later", in_minutes(30), RecurrenceRule::one_time()));
        profile.add_event(&EventRecord::absolute("sooner", in_minutes(10), RecurrenceRule::one_time()));
        profile.add_event(&EventRecord::absolute("middle", in_minutes(20), RecurrenceRule::one_time()));

        let names: Vec<_> = profile.events().iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["sooner", "middle", "later"]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_save_renumbers_ids_and_rounds_targets() {
        let dir = test_dir("save");
        let profile = profile("p", &dir);

        profile.add_event(&EventRecord::absolute("b", in_minutes(20), RecurrenceRule::one_time()));
        profile.add_event(&EventRecord::absolute("a", in_minutes(10), RecurrenceRule::one_time()));
        profile.save_now().await.unwrap();
        assert!(!profile.is_dirty());

        let record = store::read_profile(profile.path()).await.unwrap();
        assert_eq!(record.name, "p");
        assert!(record.last_modified.is_some());
        let ids: Vec<_> = record.events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(record.events[0].name, "a");
        for event in &record.events {
            let target = config::parse_local(event.target_time.as_deref().unwrap()).unwrap();
            assert_eq!(target.second(), 0);
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_debounced_save_coalesces() {
        let dir = test_dir("debounce");
        let profile = profile("p", &dir);

        profile.add_event(&EventRecord::absolute("e1", in_minutes(10), RecurrenceRule::one_time()));
        profile.add_event(&EventRecord::absolute("e2", in_minutes(11), RecurrenceRule::one_time()));
        assert!(profile.is_dirty());
        assert!(!profile.path().exists(), "save must not run before the debounce");

        tokio::time::sleep(StdDuration::from_millis(3600)).await;
        assert!(profile.path().exists());
        assert!(!profile.is_dirty());
        let record = store::read_profile(profile.path()).await.unwrap();
        assert_eq!(record.events.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_fire_reemitted_at_profile_level() {
        let dir = test_dir("fanout");
        let profile = profile("p", &dir);

        let fires = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fires);
        profile.on_event_fired(move |event| {
            assert_eq!(event.name(), "pulse");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let rule = RecurrenceRule::new(Frequency::EveryNthMinute, 5, 0);
        profile.add_event(&EventRecord::absolute("pulse", in_minutes(10), rule));
        let event = profile.get_event("pulse").unwrap();
        let target = event.target_time();
        event.tick(target + Duration::seconds(1)).unwrap();
        assert_eq!(fires.load(Ordering::SeqCst), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_one_shot_fire_removes_event_from_profile() {
        let dir = test_dir("oneshot");
        let profile = profile("p", &dir);

        profile.add_event(&EventRecord::absolute("once", in_minutes(10), RecurrenceRule::one_time()));
        let event = profile.get_event("once").unwrap();
        let target = event.target_time();
        event.tick(target + Duration::seconds(1)).unwrap();

        assert_eq!(profile.event_count(), 0);
        assert!(profile.is_dirty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_bulk_enable_disable_remove() {
        let dir = test_dir("bulk");
        let profile = profile("p", &dir);
        let rule = RecurrenceRule::new(Frequency::EveryNthDay, 1, 0);
        profile.add_event(&EventRecord::absolute("x", in_minutes(10), rule));
        profile.add_event(&EventRecord::absolute("y", in_minutes(20), rule));

        assert!(profile.disable_all());
        assert!(profile.events().iter().all(|e| e.state() == almanac_core::rule::EventState::Disabled));
        assert!(profile.enable_all());
        assert!(profile.events().iter().all(|e| e.state() == almanac_core::rule::EventState::Enabled));
        assert!(profile.remove_all_events());
        assert_eq!(profile.event_count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_dispose_flushes_and_is_idempotent() {
        let dir = test_dir("dispose");
        let profile = profile("p", &dir);
        profile.add_event(&EventRecord::absolute("e", in_minutes(10), RecurrenceRule::one_time()));
        assert!(profile.is_dirty());

        profile.dispose().await;
        assert!(profile.path().exists(), "dispose must flush a dirty profile");
        assert_eq!(profile.event_count(), 0);
        profile.dispose().await;

        std::fs::remove_dir_all(&dir).ok();
    }
}
