//! Encounter definition catalogs.
//!
//! Catalogs are authored as RON and normalised once at load, before the
//! schedulers see them. Out-of-range numbers are clamped, unusable entries
//! dropped and duplicates resolved first-wins.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use fisching_common::{CatalogError, EncounterResult};

use crate::events::EventDefinition;
use crate::hunts::HuntDefinition;
use crate::snapshot::{finite_or_zero, remaining};

/// Default catalog file name.
pub const CATALOG_FILE: &str = "encounters.ron";

/// Event and hunt definitions for one game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterCatalog {
    /// World events, in trigger priority order.
    pub events: Vec<EventDefinition>,
    /// Pool hunts, in check order.
    pub hunts: Vec<HuntDefinition>,
}

impl EncounterCatalog {
    /// Parses and normalises a RON catalog.
    pub fn from_ron_str(text: &str) -> EncounterResult<Self> {
        let catalog: Self = ron::from_str(text).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Ok(catalog.normalized())
    }

    /// Reads, parses and normalises a RON catalog file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> EncounterResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let catalog = Self::from_ron_str(&text)?;
        info!(
            "Loaded {} events and {} hunts from {}",
            catalog.events.len(),
            catalog.hunts.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Clamps every numeric field and drops unusable or duplicate entries.
    #[must_use]
    pub fn normalized(self) -> Self {
        let mut seen_events = HashSet::new();
        let events = self
            .events
            .into_iter()
            .filter_map(|event| match validate_event(&event) {
                Ok(()) => Some(event),
                Err(e) => {
                    warn!("Dropping event: {e}");
                    None
                },
            })
            .filter(|event| {
                let fresh = seen_events.insert(event.name.to_lowercase());
                if !fresh {
                    warn!("Dropping duplicate event '{}'", event.name);
                }
                fresh
            })
            .map(normalize_event)
            .collect();

        let mut seen_hunts = HashSet::new();
        let hunts = self
            .hunts
            .into_iter()
            .filter_map(|hunt| match validate_hunt(&hunt) {
                Ok(()) => Some(hunt),
                Err(e) => {
                    warn!("Dropping hunt: {e}");
                    None
                },
            })
            .filter(|hunt| {
                let fresh = seen_hunts.insert(hunt.hunt_id.to_lowercase());
                if !fresh {
                    warn!("Dropping duplicate hunt '{}'", hunt.hunt_id);
                }
                fresh
            })
            .map(normalize_hunt)
            .collect();

        Self { events, hunts }
    }

    /// Drops hunts whose target pool is not in `pools`; pool names are case-sensitive.
    #[must_use]
    pub fn restrict_to_pools(mut self, pools: &HashSet<String>) -> Self {
        self.hunts.retain(|hunt| {
            let known = pools.contains(&hunt.pool_name);
            if !known {
                warn!("Dropping hunt '{}': unknown pool '{}'", hunt.hunt_id, hunt.pool_name);
            }
            known
        });
        self
    }

    /// Whether the catalog defines nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.hunts.is_empty()
    }
}

fn validate_event(event: &EventDefinition) -> Result<(), CatalogError> {
    if event.name.trim().is_empty() {
        return Err(CatalogError::EmptyName);
    }
    Ok(())
}

fn validate_hunt(hunt: &HuntDefinition) -> Result<(), CatalogError> {
    if hunt.hunt_id.trim().is_empty() || hunt.name.trim().is_empty() {
        return Err(CatalogError::EmptyName);
    }
    if hunt.pool_name.trim().is_empty() {
        return Err(CatalogError::EmptyPool {
            hunt_id: hunt.hunt_id.clone(),
        });
    }
    Ok(())
}

fn normalize_weights(weights: BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    weights
        .into_iter()
        .map(|(rarity, weight)| (rarity, remaining(weight)))
        .collect()
}

fn normalize_event(mut event: EventDefinition) -> EventDefinition {
    event.chance = finite_or_zero(event.chance).clamp(0.0, 1.0);
    event.interval_s = remaining(event.interval_s);
    event.duration_s = remaining(event.duration_s);
    event.luck_multiplier = remaining(event.luck_multiplier);
    event.xp_multiplier = remaining(event.xp_multiplier);
    event.rarity_weights = normalize_weights(event.rarity_weights);
    event
}

fn normalize_hunt(mut hunt: HuntDefinition) -> HuntDefinition {
    hunt.duration_s = remaining(hunt.duration_s);
    hunt.check_interval_s = remaining(hunt.check_interval_s);
    hunt.disturbance_per_catch = remaining(hunt.disturbance_per_catch);
    hunt.disturbance_max = remaining(hunt.disturbance_max);
    hunt.cooldown_s = remaining(hunt.cooldown_s);
    hunt.disturbance_decay_per_check = remaining(hunt.disturbance_decay_per_check);
    hunt.rarity_weights = normalize_weights(hunt.rarity_weights);
    hunt
}

#[cfg(test)]
mod tests {
    use super::*;
    use fisching_common::EncounterError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"(
        events: [
            (
                name: "Tempestade",
                description: "Chuva forte no lago",
                chance: 1.5,
                interval_s: 60.0,
                duration_s: -5.0,
                luck_multiplier: 1.5,
                rarity_weights: {"Raro": 2.0, "Comum": -1.0},
            ),
            (name: "tempestade", chance: 0.1),
            (name: "  "),
        ],
        hunts: [
            (
                hunt_id: "megalodon",
                name: "Megalodon",
                pool_name: "Oceano",
                duration_s: 120.0,
                check_interval_s: 30.0,
                disturbance_per_catch: 2.0,
                disturbance_max: 10.0,
                disturbance_decay_per_check: -1.0,
            ),
            (hunt_id: "megalodon", name: "Outro", pool_name: "Rio"),
            (hunt_id: "sem_pool", name: "Sem pool", pool_name: ""),
        ],
    )"#;

    #[test]
    fn test_parse_and_normalize() {
        let catalog = EncounterCatalog::from_ron_str(SAMPLE).expect("valid catalog");

        assert_eq!(catalog.events.len(), 1);
        let event = &catalog.events[0];
        assert_eq!(event.name, "Tempestade");
        assert_eq!(event.chance, 1.0);
        assert_eq!(event.duration_s, 0.0);
        assert_eq!(event.xp_multiplier, 1.0);
        assert_eq!(event.rarity_weights["Raro"], 2.0);
        assert_eq!(event.rarity_weights["Comum"], 0.0);

        assert_eq!(catalog.hunts.len(), 1);
        let hunt = &catalog.hunts[0];
        assert_eq!(hunt.name, "Megalodon");
        assert_eq!(hunt.cooldown_s, 0.0);
        assert_eq!(hunt.disturbance_decay_per_check, 0.0);
    }

    #[test]
    fn test_hunt_ids_dedup_ignoring_case() {
        let catalog = EncounterCatalog {
            events: Vec::new(),
            hunts: vec![
                HuntDefinition::new("H1", "Caos", "Rio"),
                HuntDefinition::new("h1", "Marola", "Lagoa"),
                HuntDefinition::new("h2", "Onda", "Lagoa"),
            ],
        }
        .normalized();

        let ids: Vec<&str> = catalog.hunts.iter().map(|hunt| hunt.hunt_id.as_str()).collect();
        assert_eq!(ids, vec!["H1", "h2"]);
        assert_eq!(catalog.hunts[0].pool_name, "Rio");
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = EncounterCatalog::from_ron_str("()").expect("valid catalog");
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_parse_error() {
        let err = EncounterCatalog::from_ron_str("(events: 3)").expect_err("bad shape");
        assert!(matches!(err, EncounterError::Catalog(CatalogError::Parse(_))));
    }

    #[test]
    fn test_restrict_to_pools() {
        let catalog = EncounterCatalog {
            events: Vec::new(),
            hunts: vec![
                HuntDefinition::new("h1", "Caos", "Rio"),
                HuntDefinition::new("h2", "Marola", "Lagoa"),
            ],
        };
        let pools = HashSet::from(["Rio".to_string()]);
        let restricted = catalog.restrict_to_pools(&pools);
        assert_eq!(restricted.hunts.len(), 1);
        assert_eq!(restricted.hunts[0].hunt_id, "h1");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write");

        let catalog = EncounterCatalog::load_from(file.path()).expect("loads");
        assert_eq!(catalog.events.len(), 1);
        assert_eq!(catalog.hunts.len(), 1);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = EncounterCatalog::load_from("/nonexistent/encounters.ron").expect_err("missing");
        assert!(matches!(err, EncounterError::Io(_)));
    }
}
