//! # Almanac Scheduler
//!
//! In-process recurring-event scheduler for long-running applications.
//! Named profiles persist sets of events to JSON files; each event declares
//! when and how often to fire, either at absolute wall-clock cadences or
//! anchored to a solar phenomenon at the configured coordinates.
//!
//! ## Design principles
//! - One sleeper task per event, woken on exact minute boundaries —
//!   zero overhead when idle, one-minute resolution by contract
//! - JSON file per profile — human-readable, git-friendly, survives restarts
//! - Debounced durability — bursts of changes coalesce into one write
//! - In-process fan-out only — subscribers are plain callbacks, no brokers
//!
//! ## Architecture
//! ```text
//! Scheduler (config dir, latitude, longitude)
//!   ├── Profile "Garden"  →  Garden-Profile.json
//!   │     ├── Event "water-beds"   every 3 days @ 06:30
//!   │     ├── Event "lights-on"    astronomical, Sunset:-10
//!   │     └── dirty → 3s debounce → serialized JSON write
//!   └── Profile "Barn"    →  Barn-Profile.json
//!
//! timer tick → Event fires → Profile fan-out → Scheduler fan-out → host
//! ```
//!
//! ## Example
//! ```no_run
//! use almanac_core::{EventRecord, Frequency, RecurrenceRule};
//! use almanac_scheduler::Scheduler;
//! use chrono::Local;
//!
//! # async fn run() -> almanac_core::Result<()> {
//! let scheduler = Scheduler::new("/var/lib/almanac", 44.8125, 20.4612);
//! scheduler.initialize().await?;
//! scheduler.on_event_fired(|event| {
//!     println!("fired: {}", event.name());
//! });
//!
//! scheduler.add_profile("Garden", Some("outdoor automation"));
//! let garden = scheduler.get_profile("Garden").expect("just added");
//! let rule = RecurrenceRule::new(Frequency::EveryNthDay, 1, 0);
//! garden.add_event(&EventRecord::astronomical(
//!     "lights-on",
//!     "Sunset:-10",
//!     Local::now(),
//!     rule,
//! ));
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod event;
pub mod notify;
pub mod profile;
pub mod recurrence;
pub mod solar;
pub mod store;

pub use engine::Scheduler;
pub use event::{ActionCallback, Event, EventSnapshot};
pub use notify::{FireHub, FireSubscriber};
pub use profile::Profile;
pub use recurrence::{next_fire, round_to_minute};
pub use solar::{AstroOffset, DEFAULT_ASTRO_OFFSET, SolarKind, SolarTimes, solar_time, solar_times};

pub use almanac_core::{AlmanacError, EventRecord, EventState, EventType, Frequency, ProfileRecord, RecurrenceRule, Result};
