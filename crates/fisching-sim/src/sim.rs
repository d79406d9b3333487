//! Real-time simulation loop.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use fisching_encounters::{
    EncounterCatalog, EncounterSession, EncounterSnapshot, EncounterStatus, SchedulerConfig,
    CATALOG_FILE, CONFIG_FILE,
};

/// Directory holding the sample catalog and config.
const ASSET_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets");

/// Command line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "fisching-sim")]
#[command(about = "Run the encounter schedulers headless and print what happens")]
pub struct SimArgs {
    /// Encounter catalog (RON) [default: assets/encounters.ron]
    #[arg(short, long)]
    pub catalog: Option<PathBuf>,

    /// Scheduler config (TOML); defaults are used when missing [default: assets/fisching.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Pools that exist in this world, comma separated; hunts elsewhere are dropped
    #[arg(long, value_delimiter = ',')]
    pub pools: Vec<String>,

    /// How long to run, in seconds
    #[arg(short, long, default_value = "60")]
    pub seconds: u64,

    /// Pool the simulated player fishes in
    #[arg(short, long, default_value = "Oceano")]
    pub pool: String,

    /// Seconds between simulated catches (0 = never)
    #[arg(long, default_value = "3")]
    pub catch_every: u64,

    /// Force this event at startup (needs dev tools)
    #[arg(long)]
    pub force_event: Option<String>,

    /// Force this hunt at startup (needs dev tools)
    #[arg(long)]
    pub force_hunt: Option<String>,

    /// Enable dev tools regardless of the config file
    #[arg(long)]
    pub dev_tools: bool,

    /// Restore scheduler state from this snapshot (JSON) before starting
    #[arg(long)]
    pub restore: Option<PathBuf>,

    /// Write scheduler state to this snapshot (JSON) on exit
    #[arg(long)]
    pub save: Option<PathBuf>,
}

/// Loads everything, runs the session for `args.seconds` and shuts down.
pub fn run(args: &SimArgs) -> Result<()> {
    let mut config = SchedulerConfig::load_from(asset_path(args.config.as_deref(), CONFIG_FILE));
    config.dev_tools_enabled |= args.dev_tools;
    config.suppress_notifications = true;

    let catalog_path = asset_path(args.catalog.as_deref(), CATALOG_FILE);
    let mut catalog = EncounterCatalog::load_from(&catalog_path)
        .with_context(|| format!("loading catalog {}", catalog_path.display()))?;
    if !args.pools.is_empty() {
        let pools: HashSet<String> = args.pools.iter().cloned().collect();
        catalog = catalog.restrict_to_pools(&pools);
    }
    if catalog.is_empty() {
        warn!("Catalog is empty, nothing will ever happen");
    }

    let session = EncounterSession::new(catalog, &config);
    if let Some(path) = &args.restore {
        restore_snapshot(&session, path)?;
    }
    apply_forced(&session, args);

    session.start();
    print_messages(&session.drain_notifications());

    for second in 1..=args.seconds {
        thread::sleep(Duration::from_secs(1));
        if args.catch_every > 0 && second % args.catch_every == 0 {
            session.record_catch(&args.pool);
        }
        print_messages(&session.drain_notifications());
        if second % 10 == 0 {
            println!("[{second:>4}s] {}", describe(&session.status_for_pool(&args.pool)));
        }
    }

    session.stop();
    print_messages(&session.drain_notifications());

    if let Some(path) = &args.save {
        save_snapshot(&session, path)?;
    }
    Ok(())
}

/// `explicit` when given, otherwise `file_name` inside the asset directory.
fn asset_path(explicit: Option<&Path>, file_name: &str) -> PathBuf {
    explicit.map_or_else(|| Path::new(ASSET_DIR).join(file_name), Path::to_path_buf)
}

fn apply_forced(session: &EncounterSession, args: &SimArgs) {
    if let Some(name) = &args.force_event {
        if session.events().force_event(name).is_none() {
            warn!("Could not force event '{name}' (unknown or dev tools disabled)");
        }
    }
    if let Some(hunt_id) = &args.force_hunt {
        if session.hunts().force_hunt(hunt_id).is_none() {
            warn!("Could not force hunt '{hunt_id}' (unknown or dev tools disabled)");
        }
    }
}

fn print_messages(messages: &[String]) {
    for message in messages {
        println!("🔔 {message}");
    }
}

/// One-line HUD summary.
fn describe(status: &EncounterStatus) -> String {
    if status.is_quiet() {
        return "calm waters".to_string();
    }
    let mut parts = Vec::new();
    if let (Some(name), Some(left)) = (&status.event, status.event_remaining_s) {
        parts.push(format!("event {name} ({left:.0}s left)"));
    }
    if let (Some(name), Some(left)) = (&status.hunt, status.hunt_remaining_s) {
        parts.push(format!("hunt {name} ({left:.0}s left)"));
    }
    parts.push(format!(
        "luck x{:.2}, xp x{:.2}",
        status.luck_multiplier, status.xp_multiplier
    ));
    parts.join(" | ")
}

fn restore_snapshot(session: &EncounterSession, path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let snapshot = EncounterSnapshot::from_json(&text)?;
    session.restore_snapshot(&snapshot);
    info!("Restored encounter state from {}", path.display());
    Ok(())
}

fn save_snapshot(session: &EncounterSession, path: &Path) -> Result<()> {
    let snapshot = session.serialize_state();
    let text = serde_json::to_string_pretty(&snapshot.to_value())?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text).with_context(|| format!("writing snapshot {}", path.display()))?;
    info!("Saved encounter state to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(dir: &Path) -> SimArgs {
        SimArgs {
            catalog: Some(dir.join("encounters.ron")),
            config: Some(dir.join("missing.toml")),
            pools: Vec::new(),
            seconds: 0,
            pool: "Oceano".to_string(),
            catch_every: 0,
            force_event: None,
            force_hunt: Some("megalodon".to_string()),
            dev_tools: true,
            restore: None,
            save: Some(dir.join("out").join("snapshot.json")),
        }
    }

    const CATALOG: &str = r#"(
        hunts: [
            (
                hunt_id: "megalodon",
                name: "Megalodon",
                pool_name: "Oceano",
                duration_s: 300.0,
                check_interval_s: 30.0,
                disturbance_per_catch: 1.0,
                disturbance_max: 10.0,
            ),
        ],
    )"#;

    #[test]
    fn test_describe_quiet() {
        assert_eq!(describe(&EncounterStatus::default()), "calm waters");
    }

    #[test]
    fn test_describe_active() {
        let status = EncounterStatus {
            hunt: Some("Megalodon".to_string()),
            hunt_remaining_s: Some(12.4),
            ..EncounterStatus::default()
        };
        assert_eq!(describe(&status), "hunt Megalodon (12s left) | luck x1.00, xp x1.00");
    }

    #[test]
    fn test_run_saves_snapshot() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("encounters.ron"), CATALOG).expect("write catalog");
        let args = args(dir.path());

        run(&args).expect("sim runs");

        let text = fs::read_to_string(dir.path().join("out").join("snapshot.json")).expect("saved");
        let snapshot = EncounterSnapshot::from_json(&text).expect("valid snapshot");
        assert_eq!(snapshot.hunts.active_by_pool["Oceano"].hunt_id, "megalodon");
    }

    #[test]
    fn test_run_drops_hunts_in_unknown_pools() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("encounters.ron"), CATALOG).expect("write catalog");
        let args = SimArgs {
            pools: vec!["Lagoa".to_string()],
            ..args(dir.path())
        };

        run(&args).expect("sim runs");

        let text = fs::read_to_string(dir.path().join("out").join("snapshot.json")).expect("saved");
        let snapshot = EncounterSnapshot::from_json(&text).expect("valid snapshot");
        assert!(snapshot.hunts.hunts.is_empty());
        assert!(snapshot.hunts.active_by_pool.is_empty());
    }

    #[test]
    fn test_asset_path_defaults() {
        let default = asset_path(None, CATALOG_FILE);
        assert!(default.ends_with("assets/encounters.ron"));
        assert!(default.exists());
        assert!(asset_path(None, CONFIG_FILE).exists());

        let explicit = asset_path(Some(Path::new("elsewhere.ron")), CATALOG_FILE);
        assert_eq!(explicit, PathBuf::from("elsewhere.ron"));
    }

    #[test]
    fn test_run_missing_catalog_fails() {
        let dir = TempDir::new().expect("temp dir");
        assert!(run(&args(dir.path())).is_err());
    }
}
