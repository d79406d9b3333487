//! World event scheduler.
//!
//! World events are global: at most one is active at a time. While none is
//! active, every definition is checked once per `interval_s` and rolls its
//! `chance`; the first success in catalog order starts.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use fisching_common::{FastRandom, MonotonicClock, RandomSource, SharedClock};

use crate::config::SchedulerConfig;
use crate::devtools::{DevToolsGate, ForcedTrigger};
use crate::lifecycle::{LifecycleCore, SharedState};
use crate::snapshot::{remaining, ActiveEventSnapshot, EventProgressSnapshot, EventSnapshot};

/// A world event loaded from the catalog. Never mutated after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    /// Unique name (case-insensitive).
    pub name: String,
    /// Flavour text shown when the event starts.
    #[serde(default)]
    pub description: String,
    /// Trigger probability per eligibility check, in `[0, 1]`.
    #[serde(default)]
    pub chance: f64,
    /// Seconds between eligibility checks.
    #[serde(default)]
    pub interval_s: f64,
    /// How long the event stays active.
    #[serde(default)]
    pub duration_s: f64,
    /// Luck multiplier while active.
    #[serde(default = "default_multiplier")]
    pub luck_multiplier: f64,
    /// XP multiplier while active.
    #[serde(default = "default_multiplier")]
    pub xp_multiplier: f64,
    /// Fish made available while active.
    #[serde(default)]
    pub fish_pool: Vec<String>,
    /// Rarity weight overrides while active.
    #[serde(default)]
    pub rarity_weights: BTreeMap<String, f64>,
    /// Mutations that may roll while active.
    #[serde(default)]
    pub mutation_pool: Vec<String>,
}

fn default_multiplier() -> f64 {
    1.0
}

impl EventDefinition {
    /// Creates a definition that never triggers on its own.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            chance: 0.0,
            interval_s: 0.0,
            duration_s: 0.0,
            luck_multiplier: 1.0,
            xp_multiplier: 1.0,
            fish_pool: Vec::new(),
            rarity_weights: BTreeMap::new(),
            mutation_pool: Vec::new(),
        }
    }

    /// Sets the trigger chance and check interval.
    #[must_use]
    pub fn with_trigger(mut self, chance: f64, interval_s: f64) -> Self {
        self.chance = chance;
        self.interval_s = interval_s;
        self
    }

    /// Sets the active duration.
    #[must_use]
    pub fn with_duration(mut self, duration_s: f64) -> Self {
        self.duration_s = duration_s;
        self
    }

    /// Sets the luck and XP multipliers.
    #[must_use]
    pub fn with_multipliers(mut self, luck: f64, xp: f64) -> Self {
        self.luck_multiplier = luck;
        self.xp_multiplier = xp;
        self
    }

    /// Adds a rarity weight override.
    #[must_use]
    pub fn with_rarity_weight(mut self, rarity: impl Into<String>, weight: f64) -> Self {
        self.rarity_weights.insert(rarity.into(), weight);
        self
    }

    /// Case-insensitive name comparison.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// The currently running world event.
#[derive(Debug, Clone)]
pub struct ActiveEvent {
    /// Definition shared with the catalog.
    pub definition: Arc<EventDefinition>,
    /// Monotonic start time.
    pub started_at: f64,
    /// Monotonic end time.
    pub ends_at: f64,
}

impl ActiveEvent {
    fn begin(definition: Arc<EventDefinition>, now: f64) -> Self {
        let ends_at = now + definition.duration_s;
        Self {
            definition,
            started_at: now,
            ends_at,
        }
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Seconds left at `now`, never negative.
    #[must_use]
    pub fn time_left(&self, now: f64) -> f64 {
        (self.ends_at - now).max(0.0)
    }

    /// Whether the event has run its course at `now`.
    #[must_use]
    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.ends_at
    }
}

/// Mutable event scheduler state, guarded by the lifecycle mutex.
struct EventState {
    active: Option<ActiveEvent>,
    last_checks: HashMap<String, f64>,
    rng: Box<dyn RandomSource>,
}

impl EventState {
    fn fresh(events: &[Arc<EventDefinition>], now: f64, rng: Box<dyn RandomSource>) -> Self {
        Self {
            active: None,
            last_checks: events.iter().map(|e| (e.name.clone(), now)).collect(),
            rng,
        }
    }

    fn reset(&mut self, events: &[Arc<EventDefinition>], now: f64) {
        self.active = None;
        self.last_checks = events.iter().map(|e| (e.name.clone(), now)).collect();
    }
}

/// Read-only data shared with the loop thread.
struct EventContext {
    events: Vec<Arc<EventDefinition>>,
    clock: SharedClock,
}

fn started_message(event: &EventDefinition) -> String {
    format!("Event started: {}! {}", event.name, event.description)
}

fn ended_message(event: &EventDefinition) -> String {
    format!("The event '{}' has ended.", event.name)
}

fn forced_end_message(event: &EventDefinition) -> String {
    format!("The event '{}' was ended (forced).", event.name)
}

/// One loop iteration: expire first, then roll for a new event.
fn run_tick(ctx: &EventContext, shared: &SharedState<EventState>) {
    let now = ctx.clock.now();
    shared.mutate_and_notify(|state, outbox| {
        if state.active.as_ref().is_some_and(|active| active.is_expired(now)) {
            if let Some(ended) = state.active.take() {
                debug!("Event '{}' expired", ended.name());
                outbox.push(ended_message(&ended.definition));
            }
        }

        if state.active.is_some() {
            return;
        }

        for event in &ctx.events {
            let last_check = state.last_checks.entry(event.name.clone()).or_insert(now);
            if now - *last_check < event.interval_s {
                continue;
            }
            *last_check = now;

            let roll = state.rng.next_unit();
            if roll <= event.chance {
                debug!("Event '{}' triggered (roll {roll:.3} <= {:.3})", event.name, event.chance);
                state.active = Some(ActiveEvent::begin(Arc::clone(event), now));
                outbox.push(started_message(event));
                break;
            }
        }
    });
}

/// Background scheduler for global world events.
pub struct EventScheduler {
    context: Arc<EventContext>,
    core: LifecycleCore<EventState>,
    gate: DevToolsGate,
}

impl std::fmt::Debug for EventScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventScheduler")
            .field("events", &self.context.events.len())
            .field("running", &self.core.is_running())
            .field("dev_tools", &self.gate.is_enabled())
            .finish_non_exhaustive()
    }
}

impl EventScheduler {
    /// Creates a scheduler on the process monotonic clock with a random source.
    #[must_use]
    pub fn new(events: Vec<EventDefinition>, dev_tools_enabled: bool) -> Self {
        let config = SchedulerConfig {
            dev_tools_enabled,
            ..SchedulerConfig::default()
        };
        Self::from_config(events, &config)
    }

    /// Creates a scheduler from a loaded config.
    #[must_use]
    pub fn from_config(events: Vec<EventDefinition>, config: &SchedulerConfig) -> Self {
        Self::with_sources(
            events,
            config,
            MonotonicClock::shared(),
            Box::new(FastRandom::new()),
        )
    }

    /// Creates a scheduler with explicit time and random sources.
    #[must_use]
    pub fn with_sources(
        events: Vec<EventDefinition>,
        config: &SchedulerConfig,
        clock: SharedClock,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        let events: Vec<Arc<EventDefinition>> = events.into_iter().map(Arc::new).collect();
        let state = EventState::fresh(&events, clock.now(), rng);
        let core = LifecycleCore::new("events", state)
            .with_timing(config.tick_interval(), config.stop_timeout());
        core.shared()
            .suppress_notifications(config.suppress_notifications);

        Self {
            context: Arc::new(EventContext { events, clock }),
            core,
            gate: DevToolsGate::new(config.dev_tools_enabled),
        }
    }

    /// Starts the background loop. No-op with an empty catalog or when running.
    pub fn start(&self) -> bool {
        let ctx = Arc::clone(&self.context);
        self.core
            .start(!self.context.events.is_empty(), move |shared| run_tick(&ctx, shared))
    }

    /// Stops the background loop.
    pub fn stop(&self) {
        self.core.stop();
    }

    /// Whether the background loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Runs one loop iteration on the calling thread.
    pub(crate) fn tick(&self) {
        run_tick(&self.context, self.core.shared());
    }

    /// Toggles buffering of notifications.
    pub fn suppress_notifications(&self, value: bool) {
        self.core.shared().suppress_notifications(value);
    }

    /// Drains buffered notifications.
    pub fn pop_notifications(&self) -> Vec<String> {
        self.core.shared().pop_notifications()
    }

    /// Snapshot of the active event, if any.
    #[must_use]
    pub fn get_active_event(&self) -> Option<ActiveEvent> {
        self.core.shared().with_state(|state| state.active.clone())
    }

    /// Seconds left on the active event.
    #[must_use]
    pub fn active_event_time_left(&self) -> Option<f64> {
        let now = self.context.clock.now();
        self.get_active_event().map(|active| active.time_left(now))
    }

    /// Catalog in load order.
    #[must_use]
    pub fn list_events(&self) -> Vec<Arc<EventDefinition>> {
        self.context.events.clone()
    }

    /// Whether forced triggers are allowed.
    #[must_use]
    pub fn dev_tools_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    /// Starts the named event immediately, replacing any active one.
    ///
    /// Returns `None` (with no side effects) when dev tools are disabled or
    /// no event matches `name`. An exact name wins over a case-insensitive one.
    pub fn force_event(&self, name: &str) -> Option<Arc<EventDefinition>> {
        if !self.gate.is_enabled() {
            return None;
        }
        let events = &self.context.events;
        let selected = events
            .iter()
            .find(|event| event.name == name)
            .or_else(|| events.iter().find(|event| event.matches_name(name)))
            .map(Arc::clone)?;
        let now = self.context.clock.now();

        self.core.shared().mutate_and_notify(|state, outbox| {
            let previous = state
                .active
                .replace(ActiveEvent::begin(Arc::clone(&selected), now));
            state.last_checks.insert(selected.name.clone(), now);

            if let Some(previous) = previous {
                if previous.definition.name != selected.name {
                    outbox.push(forced_end_message(&previous.definition));
                }
            }
            outbox.push(started_message(&selected));
        });

        info!("Forced event '{}'", selected.name);
        Some(selected)
    }

    /// Captures remaining durations for persistence.
    #[must_use]
    pub fn serialize_state(&self) -> EventSnapshot {
        let now = self.context.clock.now();
        self.core.shared().with_state(|state| {
            let events = self
                .context
                .events
                .iter()
                .map(|event| {
                    let last_check = state.last_checks.get(&event.name).copied().unwrap_or(now);
                    let next_check_in_s = if event.interval_s > 0.0 {
                        remaining(event.interval_s - (now - last_check))
                    } else {
                        0.0
                    };
                    (event.name.clone(), EventProgressSnapshot { next_check_in_s })
                })
                .collect();

            let active = state
                .active
                .as_ref()
                .map(|active| ActiveEventSnapshot {
                    name: active.definition.name.clone(),
                    remaining_s: active.time_left(now),
                })
                .filter(|active| active.remaining_s > 0.0);

            EventSnapshot { active, events }
        })
    }

    /// Restores from a raw persisted value, failing soft on any malformed part.
    pub fn restore_state(&self, raw: &serde_json::Value) {
        self.restore_snapshot(&EventSnapshot::from_value(raw));
    }

    /// Restores from a decoded snapshot.
    ///
    /// State is reset first; unknown names and expired entries are skipped.
    pub fn restore_snapshot(&self, snapshot: &EventSnapshot) {
        let now = self.context.clock.now();
        let events = &self.context.events;
        self.core.shared().with_state(|state| {
            state.reset(events, now);

            for (name, progress) in &snapshot.events {
                let Some(event) = events.iter().find(|e| &e.name == name) else {
                    debug!("Skipping unknown event '{name}' in snapshot");
                    continue;
                };
                let last_check = if event.interval_s > 0.0 {
                    let next_check_in = remaining(progress.next_check_in_s).min(event.interval_s);
                    now - (event.interval_s - next_check_in)
                } else {
                    now
                };
                state.last_checks.insert(event.name.clone(), last_check);
            }

            let Some(active) = &snapshot.active else {
                return;
            };
            let remaining_s = remaining(active.remaining_s);
            if remaining_s <= 0.0 {
                return;
            }
            match events.iter().find(|e| e.name == active.name) {
                Some(definition) => {
                    state.active = Some(ActiveEvent {
                        definition: Arc::clone(definition),
                        started_at: now,
                        ends_at: now + remaining_s,
                    });
                },
                None => debug!("Skipping unknown active event '{}'", active.name),
            }
        });
    }
}

impl ForcedTrigger for EventScheduler {
    type Definition = Arc<EventDefinition>;

    fn dev_tools_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    fn forceable(&self) -> Vec<Self::Definition> {
        self.list_events()
    }

    fn trigger_key(definition: &Self::Definition) -> &str {
        &definition.name
    }

    fn force(&self, key: &str) -> Option<Self::Definition> {
        self.force_event(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fisching_common::{FixedRandom, ManualClock, SequenceRandom};

    fn event(name: &str) -> EventDefinition {
        EventDefinition::new(name, "Descricao")
            .with_trigger(0.0, 30.0)
            .with_duration(30.0)
    }

    fn scheduler(
        events: Vec<EventDefinition>,
        dev_tools: bool,
        clock: &Arc<ManualClock>,
        rng: Box<dyn RandomSource>,
    ) -> EventScheduler {
        let config = SchedulerConfig {
            dev_tools_enabled: dev_tools,
            suppress_notifications: true,
            ..SchedulerConfig::default()
        };
        let clock: SharedClock = clock.clone();
        EventScheduler::with_sources(events, &config, clock, rng)
    }

    #[test]
    fn test_force_event_queues_start_notification() {
        let clock = Arc::new(ManualClock::new(100.0));
        let manager = scheduler(
            vec![EventDefinition::new("Tempestade", "Ventos fortes").with_duration(30.0)],
            true,
            &clock,
            Box::new(FixedRandom::new(0.5)),
        );

        let selected = manager.force_event("tempestade").expect("event exists");
        assert_eq!(selected.name, "Tempestade");

        let active = manager.get_active_event().expect("active");
        assert_eq!(active.name(), "Tempestade");
        assert_eq!(active.started_at, 100.0);
        assert_eq!(active.ends_at, 130.0);
        assert_eq!(
            manager.pop_notifications(),
            vec!["Event started: Tempestade! Ventos fortes"]
        );
    }

    #[test]
    fn test_force_event_replacement_orders_notifications() {
        let clock = Arc::new(ManualClock::new(250.0));
        let manager = scheduler(
            vec![event("Nublado"), event("Tempestade")],
            true,
            &clock,
            Box::new(FixedRandom::new(0.5)),
        );

        manager.force_event("nublado");
        assert_eq!(manager.pop_notifications(), vec!["Event started: Nublado! Descricao"]);

        manager.force_event("TEMPESTADE");
        assert_eq!(
            manager.pop_notifications(),
            vec![
                "The event 'Nublado' was ended (forced).",
                "Event started: Tempestade! Descricao",
            ]
        );
    }

    #[test]
    fn test_force_same_event_restarts_without_end_notice() {
        let clock = Arc::new(ManualClock::new(10.0));
        let manager = scheduler(vec![event("Nublado")], true, &clock, Box::new(FixedRandom::new(0.5)));

        manager.force_event("Nublado");
        clock.advance(12.0);
        manager.force_event("Nublado");

        let active = manager.get_active_event().expect("active");
        assert_eq!(active.started_at, 22.0);
        assert_eq!(active.ends_at, 52.0);
        assert_eq!(
            manager.pop_notifications(),
            vec![
                "Event started: Nublado! Descricao",
                "Event started: Nublado! Descricao",
            ]
        );
    }

    #[test]
    fn test_force_event_disabled() {
        let clock = Arc::new(ManualClock::new(0.0));
        let manager = scheduler(vec![event("Tempestade")], false, &clock, Box::new(FixedRandom::new(0.0)));

        assert!(manager.force_event("tempestade").is_none());
        assert!(manager.get_active_event().is_none());
        assert!(manager.pop_notifications().is_empty());
    }

    #[test]
    fn test_disabled_force_leaves_natural_event_alone() {
        let clock = Arc::new(ManualClock::new(0.0));
        let manager = scheduler(
            vec![event("Nublado").with_trigger(1.0, 10.0), event("Tempestade")],
            false,
            &clock,
            Box::new(FixedRandom::new(0.0)),
        );
        clock.set(10.0);
        manager.tick();
        let before = manager.get_active_event().expect("triggered");
        assert_eq!(manager.pop_notifications(), vec!["Event started: Nublado! Descricao"]);

        clock.set(12.0);
        assert!(manager.force_event("Tempestade").is_none());
        assert!(manager.force_event("Nublado").is_none());

        let after = manager.get_active_event().expect("still active");
        assert_eq!(after.name(), "Nublado");
        assert_eq!(after.started_at, before.started_at);
        assert_eq!(after.ends_at, before.ends_at);
        assert!(manager.pop_notifications().is_empty());
    }

    #[test]
    fn test_force_unknown_event() {
        let clock = Arc::new(ManualClock::new(0.0));
        let manager = scheduler(vec![event("Tempestade")], true, &clock, Box::new(FixedRandom::new(0.0)));

        assert!(manager.force_event("Nevasca").is_none());
        assert!(manager.get_active_event().is_none());
        assert!(manager.pop_notifications().is_empty());
    }

    #[test]
    fn test_tick_waits_for_interval() {
        let clock = Arc::new(ManualClock::new(0.0));
        let manager = scheduler(
            vec![event("Nublado").with_trigger(1.0, 30.0)],
            false,
            &clock,
            Box::new(FixedRandom::new(0.0)),
        );

        clock.set(29.0);
        manager.tick();
        assert!(manager.get_active_event().is_none());

        clock.set(30.0);
        manager.tick();
        assert_eq!(manager.get_active_event().expect("active").name(), "Nublado");
    }

    #[test]
    fn test_tick_earlier_catalog_entry_wins() {
        let clock = Arc::new(ManualClock::new(0.0));
        let manager = scheduler(
            vec![
                event("Primeiro").with_trigger(1.0, 10.0),
                event("Segundo").with_trigger(1.0, 10.0),
            ],
            false,
            &clock,
            Box::new(FixedRandom::new(0.0)),
        );

        clock.set(10.0);
        manager.tick();
        assert_eq!(manager.get_active_event().expect("active").name(), "Primeiro");
        assert_eq!(manager.pop_notifications(), vec!["Event started: Primeiro! Descricao"]);
    }

    #[test]
    fn test_tick_failed_roll_resets_check() {
        let clock = Arc::new(ManualClock::new(0.0));
        let manager = scheduler(
            vec![event("Nublado").with_trigger(0.5, 10.0)],
            false,
            &clock,
            Box::new(SequenceRandom::new(vec![0.9, 0.1])),
        );

        clock.set(10.0);
        manager.tick();
        assert!(manager.get_active_event().is_none());

        // Not eligible again until a full interval has passed.
        clock.set(15.0);
        manager.tick();
        assert!(manager.get_active_event().is_none());

        clock.set(20.0);
        manager.tick();
        assert!(manager.get_active_event().is_some());
    }

    #[test]
    fn test_tick_expires_before_rolling() {
        let clock = Arc::new(ManualClock::new(0.0));
        let manager = scheduler(
            vec![event("Nublado").with_trigger(1.0, 10.0).with_duration(5.0)],
            false,
            &clock,
            Box::new(FixedRandom::new(0.0)),
        );

        clock.set(10.0);
        manager.tick();
        assert!(manager.get_active_event().is_some());

        clock.set(20.0);
        manager.tick();
        assert_eq!(
            manager.pop_notifications(),
            vec![
                "Event started: Nublado! Descricao",
                "The event 'Nublado' has ended.",
                "Event started: Nublado! Descricao",
            ]
        );
        assert_eq!(manager.get_active_event().expect("active").started_at, 20.0);
    }

    #[test]
    fn test_forced_event_is_not_rerolled_next_tick() {
        let clock = Arc::new(ManualClock::new(0.0));
        let manager = scheduler(
            vec![event("Nublado").with_trigger(1.0, 10.0).with_duration(1.0)],
            true,
            &clock,
            Box::new(FixedRandom::new(0.0)),
        );

        clock.set(50.0);
        manager.force_event("Nublado");
        clock.set(52.0);
        manager.tick();

        assert!(manager.get_active_event().is_none());
        assert_eq!(
            manager.pop_notifications(),
            vec!["Event started: Nublado! Descricao", "The event 'Nublado' has ended."]
        );
    }

    #[test]
    fn test_time_left() {
        let clock = Arc::new(ManualClock::new(0.0));
        let manager = scheduler(vec![event("Nublado")], true, &clock, Box::new(FixedRandom::new(0.0)));
        assert!(manager.active_event_time_left().is_none());

        manager.force_event("Nublado");
        clock.advance(10.0);
        assert_eq!(manager.active_event_time_left(), Some(20.0));

        clock.advance(100.0);
        assert_eq!(manager.active_event_time_left(), Some(0.0));
    }

    #[test]
    fn test_serialize_restore_roundtrip() {
        let clock = Arc::new(ManualClock::new(100.0));
        let events = vec![event("Nublado"), event("Tempestade").with_trigger(0.1, 60.0)];
        let manager = scheduler(events.clone(), true, &clock, Box::new(FixedRandom::new(0.9)));
        manager.force_event("Nublado");
        clock.advance(10.0);

        let raw = manager.serialize_state().to_value();

        let other_clock = Arc::new(ManualClock::new(5000.0));
        let restored = scheduler(events, true, &other_clock, Box::new(FixedRandom::new(0.9)));
        restored.restore_state(&raw);

        let active = restored.get_active_event().expect("restored");
        assert_eq!(active.name(), "Nublado");
        assert_eq!(active.time_left(5000.0), 20.0);

        let state = restored.serialize_state();
        assert_eq!(state.events["Tempestade"].next_check_in_s, 50.0);
    }

    #[test]
    fn test_restore_garbage_resets() {
        let clock = Arc::new(ManualClock::new(0.0));
        let manager = scheduler(vec![event("Nublado")], true, &clock, Box::new(FixedRandom::new(0.0)));
        manager.force_event("Nublado");

        manager.restore_state(&serde_json::json!("not a snapshot"));
        assert!(manager.get_active_event().is_none());

        manager.restore_state(&serde_json::json!({
            "active": {"name": "Desconhecido", "remaining_s": 40.0},
            "events": {"Nublado": {"next_check_in_s": "oops"}}
        }));
        assert!(manager.get_active_event().is_none());
        assert_eq!(manager.serialize_state().events["Nublado"].next_check_in_s, 0.0);
    }

    #[test]
    fn test_start_requires_catalog() {
        let manager = EventScheduler::new(Vec::new(), false);
        assert!(!manager.start());
        assert!(!manager.is_running());
        manager.stop();
    }
}
