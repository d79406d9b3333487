//! Pool hunt scheduler.
//!
//! Every catch in a pool raises the disturbance of the hunts targeting that
//! pool. The background loop checks each hunt once per `check_interval_s`
//! and spawns it with probability `disturbance / disturbance_max`, or with
//! certainty once disturbance is maxed out.
//!
//! Per pool slot the machine is `Idle -> Active -> Idle`, with a cooldown
//! after a natural end. Cooldown is not a stored phase: a hunt whose
//! `cooldown_ends_at` is in the future is simply skipped.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use fisching_common::{FastRandom, MonotonicClock, RandomSource, SharedClock};

use crate::config::SchedulerConfig;
use crate::devtools::{DevToolsGate, ForcedTrigger};
use crate::lifecycle::{LifecycleCore, SharedState};
use crate::snapshot::{
    finite_or_zero, remaining, ActiveHuntSnapshot, HuntProgressSnapshot, HuntSnapshot,
};

/// A hunt loaded from the catalog. Never mutated after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuntDefinition {
    /// Unique id.
    pub hunt_id: String,
    /// Display name.
    pub name: String,
    /// Flavour text.
    #[serde(default)]
    pub description: String,
    /// Pool this hunt spawns in.
    pub pool_name: String,
    /// How long the hunt stays active.
    #[serde(default)]
    pub duration_s: f64,
    /// Seconds between spawn checks.
    #[serde(default)]
    pub check_interval_s: f64,
    /// Disturbance added per catch in the pool.
    #[serde(default)]
    pub disturbance_per_catch: f64,
    /// Disturbance at which a spawn is guaranteed.
    #[serde(default)]
    pub disturbance_max: f64,
    /// Seconds after a natural end before the hunt may spawn again.
    #[serde(default)]
    pub cooldown_s: f64,
    /// Passive disturbance loss per check.
    #[serde(default)]
    pub disturbance_decay_per_check: f64,
    /// Rarity weight overrides while active.
    #[serde(default)]
    pub rarity_weights: BTreeMap<String, f64>,
    /// Fish made available while active.
    #[serde(default)]
    pub fish_pool: Vec<String>,
}

impl HuntDefinition {
    /// Creates a hunt with no disturbance model; configure it with the `with_*` methods.
    #[must_use]
    pub fn new(
        hunt_id: impl Into<String>,
        name: impl Into<String>,
        pool_name: impl Into<String>,
    ) -> Self {
        Self {
            hunt_id: hunt_id.into(),
            name: name.into(),
            description: String::new(),
            pool_name: pool_name.into(),
            duration_s: 0.0,
            check_interval_s: 0.0,
            disturbance_per_catch: 0.0,
            disturbance_max: 0.0,
            cooldown_s: 0.0,
            disturbance_decay_per_check: 0.0,
            rarity_weights: BTreeMap::new(),
            fish_pool: Vec::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets active duration and check interval.
    #[must_use]
    pub fn with_timing(mut self, duration_s: f64, check_interval_s: f64) -> Self {
        self.duration_s = duration_s;
        self.check_interval_s = check_interval_s;
        self
    }

    /// Sets per-catch disturbance and the guaranteed-spawn threshold.
    #[must_use]
    pub fn with_disturbance(mut self, per_catch: f64, max: f64) -> Self {
        self.disturbance_per_catch = per_catch;
        self.disturbance_max = max;
        self
    }

    /// Sets the cooldown after a natural end.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown_s: f64) -> Self {
        self.cooldown_s = cooldown_s;
        self
    }

    /// Sets passive decay per check.
    #[must_use]
    pub fn with_decay(mut self, decay_per_check: f64) -> Self {
        self.disturbance_decay_per_check = decay_per_check;
        self
    }

    /// Case-insensitive id comparison.
    #[must_use]
    pub fn matches_id(&self, hunt_id: &str) -> bool {
        self.hunt_id.to_lowercase() == hunt_id.to_lowercase()
    }

    /// Whether this hunt can ever spawn naturally.
    #[must_use]
    pub fn can_spawn(&self) -> bool {
        self.disturbance_max > 0.0
    }

    /// Clamps `value` into `[0, disturbance_max]`, or pins it at zero when
    /// the hunt has no positive maximum.
    #[must_use]
    pub fn clamp_disturbance(&self, value: f64) -> f64 {
        if !self.can_spawn() || value.is_nan() {
            return 0.0;
        }
        value.clamp(0.0, self.disturbance_max)
    }

    /// Spawn probability for a given disturbance, in `[0, 1]`.
    #[must_use]
    pub fn spawn_chance(&self, disturbance: f64) -> f64 {
        if !self.can_spawn() {
            return 0.0;
        }
        (disturbance / self.disturbance_max).clamp(0.0, 1.0)
    }
}

/// Mutable per-hunt progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HuntProgress {
    /// Accumulated disturbance, always within `[0, disturbance_max]`.
    pub disturbance: f64,
    /// Time of the last eligibility check.
    pub last_check: f64,
    /// The hunt cannot spawn before this time.
    pub cooldown_ends_at: f64,
}

impl HuntProgress {
    fn fresh(now: f64) -> Self {
        Self {
            disturbance: 0.0,
            last_check: now,
            cooldown_ends_at: 0.0,
        }
    }
}

/// A hunt currently running in its pool.
#[derive(Debug, Clone)]
pub struct ActiveHunt {
    /// Definition shared with the catalog.
    pub definition: Arc<HuntDefinition>,
    /// Monotonic start time.
    pub started_at: f64,
    /// Monotonic end time.
    pub ends_at: f64,
}

impl ActiveHunt {
    fn begin(definition: Arc<HuntDefinition>, now: f64) -> Self {
        let ends_at = now + definition.duration_s;
        Self {
            definition,
            started_at: now,
            ends_at,
        }
    }

    /// Hunt id.
    #[must_use]
    pub fn hunt_id(&self) -> &str {
        &self.definition.hunt_id
    }

    /// Seconds left at `now`, never negative.
    #[must_use]
    pub fn time_left(&self, now: f64) -> f64 {
        (self.ends_at - now).max(0.0)
    }

    /// Whether the hunt has run its course at `now`.
    #[must_use]
    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.ends_at
    }
}

/// Immutable catalog with lookup indices.
struct HuntCatalog {
    hunts: Vec<Arc<HuntDefinition>>,
    by_id: HashMap<String, usize>,
    by_pool: HashMap<String, Vec<usize>>,
}

impl HuntCatalog {
    fn new(hunts: Vec<HuntDefinition>) -> Self {
        let hunts: Vec<Arc<HuntDefinition>> = hunts.into_iter().map(Arc::new).collect();
        let mut by_id = HashMap::new();
        let mut by_pool: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, hunt) in hunts.iter().enumerate() {
            by_id.entry(hunt.hunt_id.clone()).or_insert(index);
            by_pool.entry(hunt.pool_name.clone()).or_default().push(index);
        }
        Self {
            hunts,
            by_id,
            by_pool,
        }
    }

    fn get(&self, hunt_id: &str) -> Option<&Arc<HuntDefinition>> {
        self.by_id.get(hunt_id).map(|&index| &self.hunts[index])
    }

    fn in_pool(&self, pool_name: &str) -> impl Iterator<Item = &Arc<HuntDefinition>> {
        self.by_pool
            .get(pool_name)
            .into_iter()
            .flatten()
            .map(|&index| &self.hunts[index])
    }

    fn fresh_progress(&self, now: f64) -> HashMap<String, HuntProgress> {
        self.hunts
            .iter()
            .map(|hunt| (hunt.hunt_id.clone(), HuntProgress::fresh(now)))
            .collect()
    }
}

/// Mutable hunt scheduler state, guarded by the lifecycle mutex.
struct HuntState {
    progress: HashMap<String, HuntProgress>,
    active_by_pool: BTreeMap<String, ActiveHunt>,
    rng: Box<dyn RandomSource>,
}

/// Read-only data shared with the loop thread.
struct HuntContext {
    catalog: HuntCatalog,
    clock: SharedClock,
}

fn started_message(hunt: &HuntDefinition) -> String {
    format!("Hunt started in {}: {}", hunt.pool_name, hunt.name)
}

fn ended_message(hunt: &HuntDefinition) -> String {
    format!("The hunt '{}' has ended.", hunt.name)
}

fn forced_end_message(hunt: &HuntDefinition) -> String {
    format!("The hunt '{}' was ended (forced).", hunt.name)
}

/// One loop iteration: expire finished hunts, then run due spawn checks.
fn run_tick(ctx: &HuntContext, shared: &SharedState<HuntState>) {
    let now = ctx.clock.now();
    shared.mutate_and_notify(|state, outbox| {
        let HuntState {
            progress,
            active_by_pool,
            rng,
        } = state;

        let expired: Vec<String> = active_by_pool
            .iter()
            .filter(|(_, active)| active.is_expired(now))
            .map(|(pool, _)| pool.clone())
            .collect();
        for pool in expired {
            let Some(active) = active_by_pool.remove(&pool) else {
                continue;
            };
            let hunt = &active.definition;
            if let Some(entry) = progress.get_mut(&hunt.hunt_id) {
                entry.cooldown_ends_at = entry
                    .cooldown_ends_at
                    .max(now + hunt.cooldown_s.max(0.0));
            }
            debug!("Hunt '{}' in {pool} expired", hunt.hunt_id);
            outbox.push(ended_message(hunt));
        }

        for hunt in &ctx.catalog.hunts {
            let Some(entry) = progress.get_mut(&hunt.hunt_id) else {
                continue;
            };
            if now - entry.last_check < hunt.check_interval_s {
                continue;
            }
            entry.last_check = now;

            if active_by_pool.contains_key(&hunt.pool_name) || now < entry.cooldown_ends_at {
                continue;
            }

            if hunt.disturbance_decay_per_check > 0.0 {
                entry.disturbance =
                    hunt.clamp_disturbance(entry.disturbance - hunt.disturbance_decay_per_check);
            }
            if !hunt.can_spawn() {
                continue;
            }

            let guaranteed = entry.disturbance >= hunt.disturbance_max;
            let chance = hunt.spawn_chance(entry.disturbance);
            let spawn = guaranteed || (chance > 0.0 && rng.next_unit() <= chance);
            if !spawn {
                continue;
            }

            debug!(
                "Hunt '{}' spawned in {} (disturbance {:.2}, guaranteed: {guaranteed})",
                hunt.hunt_id, hunt.pool_name, entry.disturbance
            );
            active_by_pool.insert(hunt.pool_name.clone(), ActiveHunt::begin(Arc::clone(hunt), now));
            entry.disturbance = 0.0;
            outbox.push(started_message(hunt));
        }
    });
}

/// Background scheduler for disturbance-driven pool hunts.
pub struct HuntScheduler {
    context: Arc<HuntContext>,
    core: LifecycleCore<HuntState>,
    gate: DevToolsGate,
}

impl std::fmt::Debug for HuntScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuntScheduler")
            .field("hunts", &self.context.catalog.hunts.len())
            .field("running", &self.core.is_running())
            .field("dev_tools", &self.gate.is_enabled())
            .finish_non_exhaustive()
    }
}

impl HuntScheduler {
    /// Creates a scheduler on the process monotonic clock with a random source.
    #[must_use]
    pub fn new(hunts: Vec<HuntDefinition>, dev_tools_enabled: bool) -> Self {
        let config = SchedulerConfig {
            dev_tools_enabled,
            ..SchedulerConfig::default()
        };
        Self::from_config(hunts, &config)
    }

    /// Creates a scheduler from a loaded config.
    #[must_use]
    pub fn from_config(hunts: Vec<HuntDefinition>, config: &SchedulerConfig) -> Self {
        Self::with_sources(
            hunts,
            config,
            MonotonicClock::shared(),
            Box::new(FastRandom::new()),
        )
    }

    /// Creates a scheduler with explicit time and random sources.
    #[must_use]
    pub fn with_sources(
        hunts: Vec<HuntDefinition>,
        config: &SchedulerConfig,
        clock: SharedClock,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        let catalog = HuntCatalog::new(hunts);
        let state = HuntState {
            progress: catalog.fresh_progress(clock.now()),
            active_by_pool: BTreeMap::new(),
            rng,
        };
        let core = LifecycleCore::new("hunts", state)
            .with_timing(config.tick_interval(), config.stop_timeout());
        core.shared()
            .suppress_notifications(config.suppress_notifications);

        Self {
            context: Arc::new(HuntContext { catalog, clock }),
            core,
            gate: DevToolsGate::new(config.dev_tools_enabled),
        }
    }

    /// Starts the background loop. No-op with an empty catalog or when running.
    pub fn start(&self) -> bool {
        let ctx = Arc::clone(&self.context);
        self.core.start(!self.context.catalog.hunts.is_empty(), move |shared| {
            run_tick(&ctx, shared);
        })
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

    /// Snapshot of the hunt active in `pool_name`, if any.
    #[must_use]
    pub fn get_active_hunt_for_pool(&self, pool_name: &str) -> Option<ActiveHunt> {
        self.core
            .shared()
            .with_state(|state| state.active_by_pool.get(pool_name).cloned())
    }

    /// Seconds left on the hunt active in `pool_name`.
    #[must_use]
    pub fn hunt_time_left(&self, pool_name: &str) -> Option<f64> {
        let now = self.context.clock.now();
        self.get_active_hunt_for_pool(pool_name)
            .map(|active| active.time_left(now))
    }

    /// Catalog in load order.
    #[must_use]
    pub fn list_hunts(&self) -> Vec<Arc<HuntDefinition>> {
        self.context.catalog.hunts.clone()
    }

    /// Progress of one hunt, for HUDs and diagnostics.
    #[must_use]
    pub fn progress(&self, hunt_id: &str) -> Option<HuntProgress> {
        self.core
            .shared()
            .with_state(|state| state.progress.get(hunt_id).copied())
    }

    /// Whether forced triggers are allowed.
    #[must_use]
    pub fn dev_tools_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    /// Raises the disturbance of every hunt targeting `pool_name`.
    ///
    /// Never spawns anything itself; only the loop evaluates spawns.
    pub fn record_catch(&self, pool_name: &str) {
        let catalog = &self.context.catalog;
        if catalog.in_pool(pool_name).next().is_none() {
            return;
        }
        self.core.shared().with_state(|state| {
            for hunt in catalog.in_pool(pool_name) {
                if let Some(entry) = state.progress.get_mut(&hunt.hunt_id) {
                    let raised = entry.disturbance + hunt.disturbance_per_catch.max(0.0);
                    entry.disturbance = hunt.clamp_disturbance(raised);
                }
            }
        });
    }

    /// Starts the hunt with id `hunt_id` in its pool, replacing whatever
    /// hunt is active there.
    ///
    /// An exact id wins; otherwise the first case-insensitive match is used.
    ///
    /// Disturbance is reset and no cooldown applies. Returns `None` (with no
    /// side effects) when dev tools are disabled or the id is unknown.
    pub fn force_hunt(&self, hunt_id: &str) -> Option<Arc<HuntDefinition>> {
        if !self.gate.is_enabled() {
            return None;
        }
        let hunts = &self.context.catalog.hunts;
        let selected = hunts
            .iter()
            .find(|hunt| hunt.hunt_id == hunt_id)
            .or_else(|| hunts.iter().find(|hunt| hunt.matches_id(hunt_id)))
            .map(Arc::clone)?;
        let now = self.context.clock.now();

        self.core.shared().mutate_and_notify(|state, outbox| {
            let replaced = state.active_by_pool.insert(
                selected.pool_name.clone(),
                ActiveHunt::begin(Arc::clone(&selected), now),
            );
            if let Some(entry) = state.progress.get_mut(&selected.hunt_id) {
                entry.disturbance = 0.0;
            }

            if let Some(replaced) = replaced {
                if replaced.definition.hunt_id != selected.hunt_id {
                    outbox.push(forced_end_message(&replaced.definition));
                }
            }
            outbox.push(started_message(&selected));
        });

        info!("Forced hunt '{}' in {}", selected.hunt_id, selected.pool_name);
        Some(selected)
    }

    /// Captures remaining durations for persistence.
    #[must_use]
    pub fn serialize_state(&self) -> HuntSnapshot {
        let now = self.context.clock.now();
        let catalog = &self.context.catalog;
        self.core.shared().with_state(|state| {
            let hunts = catalog
                .hunts
                .iter()
                .filter_map(|hunt| {
                    let entry = state.progress.get(&hunt.hunt_id)?;
                    let next_check_in_s = if hunt.check_interval_s > 0.0 {
                        remaining(hunt.check_interval_s - (now - entry.last_check))
                    } else {
                        0.0
                    };
                    let snapshot = HuntProgressSnapshot {
                        disturbance: hunt.clamp_disturbance(entry.disturbance),
                        cooldown_remaining_s: remaining(entry.cooldown_ends_at - now),
                        next_check_in_s,
                    };
                    Some((hunt.hunt_id.clone(), snapshot))
                })
                .collect();

            let active_by_pool = state
                .active_by_pool
                .iter()
                .filter_map(|(pool, active)| {
                    let remaining_s = active.time_left(now);
                    (remaining_s > 0.0).then(|| {
                        let snapshot = ActiveHuntSnapshot {
                            hunt_id: active.definition.hunt_id.clone(),
                            remaining_s,
                        };
                        (pool.clone(), snapshot)
                    })
                })
                .collect();

            HuntSnapshot {
                hunts,
                active_by_pool,
            }
        })
    }

    /// Restores from a raw persisted value, failing soft on any malformed part.
    pub fn restore_state(&self, raw: &serde_json::Value) {
        self.restore_snapshot(&HuntSnapshot::from_value(raw));
    }

    /// Restores from a decoded snapshot.
    ///
    /// All progress is reset to a fresh baseline first, then known hunts are
    /// restored. A pool entry is re-activated only when the hunt is known,
    /// targets that pool, the pool is still free and time remains.
    pub fn restore_snapshot(&self, snapshot: &HuntSnapshot) {
        let now = self.context.clock.now();
        let catalog = &self.context.catalog;
        self.core.shared().with_state(|state| {
            state.active_by_pool.clear();
            state.progress = catalog.fresh_progress(now);

            for (hunt_id, saved) in &snapshot.hunts {
                let (Some(hunt), Some(entry)) = (catalog.get(hunt_id), state.progress.get_mut(hunt_id))
                else {
                    debug!("Skipping unknown hunt '{hunt_id}' in snapshot");
                    continue;
                };

                let next_check_in = remaining(saved.next_check_in_s);
                entry.last_check = if hunt.check_interval_s > 0.0 {
                    let next_check_in = next_check_in.min(hunt.check_interval_s);
                    now - (hunt.check_interval_s - next_check_in)
                } else {
                    now
                };
                entry.disturbance = hunt.clamp_disturbance(finite_or_zero(saved.disturbance));
                entry.cooldown_ends_at = now + remaining(saved.cooldown_remaining_s);
            }

            for (pool, saved) in &snapshot.active_by_pool {
                let Some(hunt) = catalog.get(&saved.hunt_id) else {
                    debug!("Skipping unknown active hunt '{}'", saved.hunt_id);
                    continue;
                };
                if &hunt.pool_name != pool || state.active_by_pool.contains_key(pool) {
                    continue;
                }
                let remaining_s = remaining(saved.remaining_s);
                if remaining_s <= 0.0 {
                    continue;
                }
                state.active_by_pool.insert(
                    pool.clone(),
                    ActiveHunt {
                        definition: Arc::clone(hunt),
                        started_at: now,
                        ends_at: now + remaining_s,
                    },
                );
            }
        });
    }
}

impl ForcedTrigger for HuntScheduler {
    type Definition = Arc<HuntDefinition>;

    fn dev_tools_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    fn forceable(&self) -> Vec<Self::Definition> {
        self.list_hunts()
    }

    fn trigger_key(definition: &Self::Definition) -> &str {
        &definition.hunt_id
    }

    fn force(&self, key: &str) -> Option<Self::Definition> {
        self.force_hunt(key)
    }
}
