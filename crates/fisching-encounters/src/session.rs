//! Per-session owner of both encounter schedulers.
//!
//! One [`EncounterSession`] is created per game session and handed to the
//! collaborators that need it. There is no process-wide instance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use fisching_common::{FastRandom, MonotonicClock, RandomSource, SharedClock};

use crate::catalog::EncounterCatalog;
use crate::config::SchedulerConfig;
use crate::events::EventScheduler;
use crate::hunts::HuntScheduler;
use crate::snapshot::EncounterSnapshot;

/// What a HUD shows for one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterStatus {
    /// Active world event name.
    pub event: Option<String>,
    /// Seconds left on the world event.
    pub event_remaining_s: Option<f64>,
    /// Active hunt name in the pool.
    pub hunt: Option<String>,
    /// Seconds left on the hunt.
    pub hunt_remaining_s: Option<f64>,
    /// Combined luck multiplier.
    pub luck_multiplier: f64,
    /// Combined XP multiplier.
    pub xp_multiplier: f64,
    /// Rarity weight overrides; hunt entries win over event entries.
    pub rarity_weights: BTreeMap<String, f64>,
    /// Extra fish available: event fish first, then hunt fish.
    pub fish_pool: Vec<String>,
}

impl Default for EncounterStatus {
    fn default() -> Self {
        Self {
            event: None,
            event_remaining_s: None,
            hunt: None,
            hunt_remaining_s: None,
            luck_multiplier: 1.0,
            xp_multiplier: 1.0,
            rarity_weights: BTreeMap::new(),
            fish_pool: Vec::new(),
        }
    }
}

impl EncounterStatus {
    /// Whether anything special is going on.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.event.is_none() && self.hunt.is_none()
    }
}

/// Event and hunt schedulers sharing one clock.
pub struct EncounterSession {
    events: EventScheduler,
    hunts: HuntScheduler,
    clock: SharedClock,
}

impl std::fmt::Debug for EncounterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncounterSession")
            .field("events", &self.events)
            .field("hunts", &self.hunts)
            .finish_non_exhaustive()
    }
}

impl EncounterSession {
    /// Creates a session on the process monotonic clock.
    #[must_use]
    pub fn new(catalog: EncounterCatalog, config: &SchedulerConfig) -> Self {
        Self::with_sources(
            catalog,
            config,
            MonotonicClock::shared(),
            Box::new(FastRandom::new()),
            Box::new(FastRandom::new()),
        )
    }

    /// Creates a session with explicit time and random sources.
    #[must_use]
    pub fn with_sources(
        catalog: EncounterCatalog,
        config: &SchedulerConfig,
        clock: SharedClock,
        event_rng: Box<dyn RandomSource>,
        hunt_rng: Box<dyn RandomSource>,
    ) -> Self {
        let EncounterCatalog { events, hunts } = catalog;
        Self {
            events: EventScheduler::with_sources(events, config, clock.clone(), event_rng),
            hunts: HuntScheduler::with_sources(hunts, config, clock.clone(), hunt_rng),
            clock,
        }
    }

    /// The world event scheduler.
    #[must_use]
    pub fn events(&self) -> &EventScheduler {
        &self.events
    }

    /// The pool hunt scheduler.
    #[must_use]
    pub fn hunts(&self) -> &HuntScheduler {
        &self.hunts
    }

    /// Starts both loops. Returns whether any loop was started.
    pub fn start(&self) -> bool {
        let events = self.events.start();
        let hunts = self.hunts.start();
        events || hunts
    }

    /// Stops both loops.
    pub fn stop(&self) {
        self.events.stop();
        self.hunts.stop();
    }

    /// Buffers notifications from both schedulers instead of printing them.
    pub fn set_quiet(&self, quiet: bool) {
        self.events.suppress_notifications(quiet);
        self.hunts.suppress_notifications(quiet);
    }

    /// Drains buffered notifications: event messages first, then hunt messages.
    pub fn drain_notifications(&self) -> Vec<String> {
        let mut messages = self.events.pop_notifications();
        messages.extend(self.hunts.pop_notifications());
        messages
    }

    /// Records a catch in `pool_name`.
    pub fn record_catch(&self, pool_name: &str) {
        self.hunts.record_catch(pool_name);
    }

    /// Builds the HUD summary for `pool_name`.
    #[must_use]
    pub fn status_for_pool(&self, pool_name: &str) -> EncounterStatus {
        let now = self.clock.now();
        let mut status = EncounterStatus::default();

        if let Some(active) = self.events.get_active_event() {
            let event = &active.definition;
            status.event = Some(event.name.clone());
            status.event_remaining_s = Some(active.time_left(now));
            status.luck_multiplier *= event.luck_multiplier;
            status.xp_multiplier *= event.xp_multiplier;
            status.rarity_weights.extend(event.rarity_weights.clone());
            status.fish_pool.extend(event.fish_pool.iter().cloned());
        }

        if let Some(active) = self.hunts.get_active_hunt_for_pool(pool_name) {
            let hunt = &active.definition;
            status.hunt = Some(hunt.name.clone());
            status.hunt_remaining_s = Some(active.time_left(now));
            status.rarity_weights.extend(hunt.rarity_weights.clone());
            status.fish_pool.extend(hunt.fish_pool.iter().cloned());
        }

        status
    }

    /// Captures both schedulers.
    #[must_use]
    pub fn serialize_state(&self) -> EncounterSnapshot {
        EncounterSnapshot {
            events: self.events.serialize_state(),
            hunts: self.hunts.serialize_state(),
        }
    }

    /// Restores both schedulers from a raw persisted value.
    pub fn restore_state(&self, raw: &serde_json::Value) {
        self.restore_snapshot(&EncounterSnapshot::from_value(raw));
    }

    /// Restores both schedulers from a decoded snapshot.
    pub fn restore_snapshot(&self, snapshot: &EncounterSnapshot) {
        self.events.restore_snapshot(&snapshot.events);
        self.hunts.restore_snapshot(&snapshot.hunts);
    }
}
