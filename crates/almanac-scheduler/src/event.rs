//! Event runtime — one timer, one recurrence rule, one action list.
//!
//! Each enabled event owns a sleeper task that wakes on exact minute
//! boundaries. A tick that observes `now >= target` delivers the fire to
//! subscribers synchronously, stamps `last_fired`, marks the owning profile
//! dirty, and advances the target through the recurrence arithmetic (or
//! removes the event from its profile when the rule is one-time).

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration as StdDuration;

use almanac_core::config::{self, EventRecord};
use almanac_core::error::{AlmanacError, Result};
use almanac_core::rule::{EventState, EventType, RecurrenceRule};
use chrono::{DateTime, Duration, Local, Timelike};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::notify::FireHub;
use crate::recurrence;
use crate::solar::{self, AstroOffset, DEFAULT_ASTRO_OFFSET};

/// Callback handed to [`Event::execute_actions`]; receives the action name
/// and the firing event.
pub type ActionCallback = Arc<dyn Fn(&str, &Arc<Event>) + Send + Sync>;

/// Back-reference surface an event needs from its owning container:
/// navigate and notify, never destroy.
pub(crate) trait EventOwner: Send + Sync {
    /// Propagate the dirty flag (schedules a debounced save).
    fn mark_changed(&self);
    /// Remove a finished one-time event from the container.
    fn release(&self, name: &str);
}

/// Everything an event needs from its surroundings at construction time.
pub(crate) struct EventContext {
    pub(crate) owner: Weak<dyn EventOwner>,
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
    pub(crate) runtime: Handle,
}

/// Fields mutated after construction, guarded by one mutex.
struct EventCells {
    id: u32,
    description: String,
    rec_description: String,
    state: EventState,
    target_time: DateTime<Local>,
    last_fired: Option<DateTime<Local>>,
    actions: Vec<String>,
    /// Set when the last advance produced a target at or before "now"
    /// (solar sentinel); the next tick re-anchors instead of firing.
    needs_reanchor: bool,
}

/// A scheduled event inside a profile.
pub struct Event {
    name: String,
    event_type: EventType,
    rule: RecurrenceRule,
    astro: Option<AstroOffset>,
    acknowledge: bool,
    latitude: f64,
    longitude: f64,
    cells: Mutex<EventCells>,
    fired: FireHub,
    owner: Weak<dyn EventOwner>,
    timer: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("event_type", &self.event_type)
            .field("rule", &self.rule)
            .field("astro", &self.astro)
            .field("acknowledge", &self.acknowledge)
            .field("latitude", &self.latitude)
            .field("longitude", &self.longitude)
            .finish_non_exhaustive()
    }
}

/// Read-only copy of an event's current state.
#[derive(Debug, Clone)]
pub struct EventSnapshot {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub rec_description: String,
    pub event_type: EventType,
    pub state: EventState,
    pub rule: RecurrenceRule,
    pub astro_offset: Option<String>,
    pub target_time: DateTime<Local>,
    pub last_fired: Option<DateTime<Local>>,
    pub actions: Vec<String>,
}

impl Event {
    /// Build a runtime event from a persisted record.
    ///
    /// Rejects an empty name, an invalid recurrence rule, and a one-time
    /// event whose target already passed. A recurring target in the past is
    /// advanced to the next future occurrence, never fired retroactively.
    pub(crate) fn from_record(record: &EventRecord, ctx: EventContext) -> Result<Arc<Self>> {
        let name = record.name.trim().to_string();
        if name.is_empty() {
            return Err(AlmanacError::Config("event name must be non-empty".into()));
        }

        let event_type = EventType::parse(&record.event_type);
        let state = EventState::parse(&record.state);
        let rule = RecurrenceRule::new(
            almanac_core::rule::Frequency::parse(&record.frequency),
            record.rate,
            record.add_rate,
        );
        rule.validate()?;

        // An anchor is meaningful for astronomical events only.
        let astro = match event_type {
            EventType::Astronomical => Some(AstroOffset::parse(
                record.astro_offset.as_deref().unwrap_or(DEFAULT_ASTRO_OFFSET),
            )),
            EventType::Absolute => None,
        };

        let now = Local::now();
        let target = match record.target_time.as_deref() {
            Some(s) => config::parse_local(s)?,
            None => match (record.date.as_deref(), record.time.as_deref()) {
                (Some(date), Some(time)) => config::combine_legacy(date, time)?,
                _ => {
                    tracing::warn!(
                        "⚠️ Event '{name}' has no target time, defaulting to five minutes from now"
                    );
                    now + Duration::minutes(5)
                }
            },
        };

        let last_fired = record.last_fired.as_deref().and_then(|s| {
            config::parse_local(s)
                .map_err(|e| tracing::warn!("⚠️ Ignoring bad last-fired on '{name}': {e}"))
                .ok()
        });

        let mut actions = Vec::new();
        for action in record.actions.iter().flatten() {
            let trimmed = action.trim();
            if !trimmed.is_empty() && !actions.iter().any(|a: &String| a == trimmed) {
                actions.push(trimmed.to_string());
            }
        }

        let event = Arc::new(Self {
            name: name.clone(),
            event_type,
            rule,
            astro,
            acknowledge: record.acknowledge,
            latitude: ctx.latitude,
            longitude: ctx.longitude,
            cells: Mutex::new(EventCells {
                id: record.id,
                description: record.description.clone().unwrap_or_default(),
                rec_description: String::new(),
                state,
                target_time: target,
                last_fired,
                actions,
                needs_reanchor: false,
            }),
            fired: FireHub::new(),
            owner: ctx.owner,
            timer: Mutex::new(None),
            runtime: ctx.runtime,
        });

        let next = event.advance_target(target, now)?;
        if !rule.is_recurring() && next < now {
            return Err(AlmanacError::Schedule(format!(
                "one-time event '{name}' target {next} is already in the past"
            )));
        }
        {
            let mut cells = event.cells();
            cells.target_time = next;
            cells.rec_description = rule.describe(next);
            cells.needs_reanchor = next <= now;
        }

        if state == EventState::Enabled {
            event.arm();
        }
        Ok(event)
    }

    // ── scheduling ───────────────────────────────────────────

    /// Advance `target` past `now` through the recurrence arithmetic, then
    /// resolve the solar anchor for astronomical events. Solar failure
    /// degrades to "now" so the timer loop can re-anchor on a later tick.
    fn advance_target(&self, target: DateTime<Local>, now: DateTime<Local>) -> Result<DateTime<Local>> {
        let mut next = recurrence::next_fire(target, now, &self.rule)?;
        if let Some(anchor) = self.astro {
            next = match solar::solar_time(anchor.kind, next, self.latitude, self.longitude, false) {
                Ok(instant) => instant + Duration::minutes(anchor.minutes),
                Err(e) => {
                    tracing::warn!("⚠️ Solar resolution failed for event '{}': {e}", self.name);
                    now
                }
            };
            next = recurrence::round_to_minute(next);
        }
        Ok(next)
    }

    /// Spawn the sleeper task: wake on every minute boundary and evaluate.
    pub(crate) fn arm(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let task = self.runtime.spawn(async move {
            loop {
                tokio::time::sleep(delay_to_next_minute(Local::now())).await;
                let Some(event) = weak.upgrade() else { break };
                match event.tick(Local::now()) {
                    Ok(true) => {}
                    Ok(false) => break,
                    // Tick failures are logged and the event stays armed.
                    Err(e) => tracing::warn!("⚠️ {e}"),
                }
            }
        });
        if let Some(old) = self.lock_timer().replace(task) {
            old.abort();
        }
    }

    fn disarm(&self) {
        if let Some(task) = self.lock_timer().take() {
            task.abort();
        }
    }

    /// One minute-boundary evaluation at `now`. Returns `Ok(false)` when
    /// the sleeper loop should stop (a one-time event fired and removed
    /// itself).
    pub(crate) fn tick(self: &Arc<Self>, now: DateTime<Local>) -> Result<bool> {
        let (target, reanchor) = {
            let cells = self.cells();
            (cells.target_time, cells.needs_reanchor)
        };
        if reanchor {
            // The previous advance fell back to the sentinel; try to anchor
            // a real target before delivering anything.
            let next = self.advance_target(now, now)?;
            let mut cells = self.cells();
            cells.target_time = next;
            cells.needs_reanchor = next <= now;
            return Ok(true);
        }
        if now < target {
            return Ok(true);
        }

        tracing::info!("🔔 Event fired: '{}' (target {target})", self.name);
        self.fired.dispatch(self);
        self.cells().last_fired = Some(now);
        self.notify_changed();

        if !self.rule.is_recurring() {
            if let Some(owner) = self.owner.upgrade() {
                owner.release(&self.name);
            }
            return Ok(false);
        }

        match self.advance_target(target, now) {
            Ok(next) => {
                let mut cells = self.cells();
                cells.target_time = next;
                cells.rec_description = self.rule.describe(next);
                cells.needs_reanchor = next <= now;
                Ok(true)
            }
            Err(e) => Err(AlmanacError::Timer(format!(
                "tick could not advance event '{}': {e}",
                self.name
            ))),
        }
    }

    /// Recompute the next target from now, mark the event enabled, and arm
    /// its timer.
    pub fn enable(self: &Arc<Self>) -> Result<()> {
        let now = Local::now();
        let target = self.cells().target_time;
        let next = self.advance_target(target, now)?;
        if !self.rule.is_recurring() && next < now {
            return Err(AlmanacError::Schedule(format!(
                "cannot enable one-time event '{}': target {next} is in the past",
                self.name
            )));
        }
        {
            let mut cells = self.cells();
            cells.target_time = next;
            cells.state = EventState::Enabled;
            cells.rec_description = self.rule.describe(next);
            cells.needs_reanchor = next <= now;
        }
        self.arm();
        self.notify_changed();
        Ok(())
    }

    /// Stop the timer and mark the event disabled. Disabling an already
    /// disabled event is a no-op success.
    pub fn disable(&self) {
        {
            let mut cells = self.cells();
            if cells.state == EventState::Disabled {
                return;
            }
            cells.state = EventState::Disabled;
        }
        self.disarm();
        self.notify_changed();
    }

    /// Stop the timer for good; called on removal and profile disposal.
    pub(crate) fn dispose(&self) {
        self.disarm();
        self.fired.clear();
    }

    // ── actions ──────────────────────────────────────────────

    /// Append an action name. Names are trimmed; empty names and exact
    /// duplicates are refused.
    pub fn add_action(&self, action: &str) -> bool {
        let trimmed = action.trim();
        if trimmed.is_empty() {
            return false;
        }
        {
            let mut cells = self.cells();
            if cells.actions.iter().any(|a| a == trimmed) {
                return false;
            }
            cells.actions.push(trimmed.to_string());
        }
        self.notify_changed();
        true
    }

    pub fn remove_action(&self, action: &str) -> bool {
        let trimmed = action.trim();
        let removed = {
            let mut cells = self.cells();
            let before = cells.actions.len();
            cells.actions.retain(|a| a != trimmed);
            cells.actions.len() != before
        };
        if removed {
            self.notify_changed();
        }
        removed
    }

    pub fn clear_actions(&self) {
        self.cells().actions.clear();
        self.notify_changed();
    }

    /// Replace the action list, applying the same trim/dedup rules as
    /// [`add_action`](Self::add_action).
    pub fn set_actions(&self, actions: &[String]) {
        let mut deduped: Vec<String> = Vec::with_capacity(actions.len());
        for action in actions {
            let trimmed = action.trim();
            if !trimmed.is_empty() && !deduped.iter().any(|a| a == trimmed) {
                deduped.push(trimmed.to_string());
            }
        }
        self.cells().actions = deduped;
        self.notify_changed();
    }

    pub fn actions(&self) -> Vec<String> {
        self.cells().actions.clone()
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.cells().actions.iter().any(|a| a == action.trim())
    }

    pub fn has_actions(&self) -> bool {
        !self.cells().actions.is_empty()
    }

    /// Invoke `callback` once per action, each on its own task. Neither
    /// errors nor panics reach the caller.
    pub fn execute_actions(self: &Arc<Self>, callback: ActionCallback) {
        for action in self.actions() {
            let cb = Arc::clone(&callback);
            let event = Arc::clone(self);
            self.runtime.spawn(async move {
                if catch_unwind(AssertUnwindSafe(|| cb(&action, &event))).is_err() {
                    tracing::warn!(
                        "⚠️ Action callback panicked: '{action}' on event '{}'",
                        event.name
                    );
                }
            });
        }
    }

    // ── accessors ────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn rule(&self) -> RecurrenceRule {
        self.rule
    }

    pub fn state(&self) -> EventState {
        self.cells().state
    }

    pub fn target_time(&self) -> DateTime<Local> {
        self.cells().target_time
    }

    pub fn last_fired(&self) -> Option<DateTime<Local>> {
        self.cells().last_fired
    }

    pub fn id(&self) -> u32 {
        self.cells().id
    }

    pub(crate) fn set_id(&self, id: u32) {
        self.cells().id = id;
    }

    pub fn description(&self) -> String {
        self.cells().description.clone()
    }

    pub fn set_description(&self, description: &str) {
        self.cells().description = description.to_string();
        self.notify_changed();
    }

    /// The anchor string for astronomical events (`"Sunset:-10"`), `None`
    /// for absolute events.
    pub fn astro_offset(&self) -> Option<String> {
        self.astro.map(|a| a.to_string())
    }

    pub fn snapshot(&self) -> EventSnapshot {
        let cells = self.cells();
        EventSnapshot {
            id: cells.id,
            name: self.name.clone(),
            description: cells.description.clone(),
            rec_description: cells.rec_description.clone(),
            event_type: self.event_type,
            state: cells.state,
            rule: self.rule,
            astro_offset: self.astro.map(|a| a.to_string()),
            target_time: cells.target_time,
            last_fired: cells.last_fired,
            actions: cells.actions.clone(),
        }
    }

    /// Subscribe to this event's fires. The profile installs one of these
    /// on add; hosts usually subscribe at the profile or scheduler level.
    pub fn on_fired(&self, subscriber: impl Fn(&Arc<Event>) + Send + Sync + 'static) {
        self.fired.subscribe(Arc::new(subscriber));
    }

    pub(crate) fn clear_fired(&self) {
        self.fired.clear();
    }

    /// Rebuild the persisted record, legacy fields normalized away.
    pub(crate) fn to_record(&self) -> EventRecord {
        let cells = self.cells();
        EventRecord {
            id: cells.id,
            name: self.name.clone(),
            description: (!cells.description.is_empty()).then(|| cells.description.clone()),
            rec_description: Some(cells.rec_description.clone()),
            event_type: self.event_type.as_str().to_string(),
            state: cells.state.as_str().to_string(),
            frequency: self.rule.frequency.as_str().to_string(),
            rate: self.rule.rate,
            add_rate: self.rule.add_rate,
            astro_offset: self.astro.map(|a| a.to_string()),
            target_time: Some(config::format_local(cells.target_time)),
            time: None,
            date: None,
            last_fired: cells.last_fired.map(config::format_local),
            acknowledge: self.acknowledge,
            actions: (!cells.actions.is_empty()).then(|| cells.actions.clone()),
        }
    }

    fn notify_changed(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.mark_changed();
        }
    }

    fn cells(&self) -> MutexGuard<'_, EventCells> {
        self.cells.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        if let Some(task) = self.lock_timer().take() {
            task.abort();
        }
    }
}

/// Milliseconds until the next exact minute boundary.
fn delay_to_next_minute(now: DateTime<Local>) -> StdDuration {
    let floor = now
        .with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .unwrap_or(now);
    ((floor + Duration::minutes(1)) - now)
        .to_std()
        .unwrap_or(StdDuration::from_secs(1))
}
