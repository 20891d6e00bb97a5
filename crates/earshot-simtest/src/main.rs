//! Earshot Headless Simulation Harness
//!
//! Loads a map and checks the simulation core against it without any audio
//! or speech output. Runs entirely in-process.
//!
//! Usage:
//!   cargo run -p earshot-simtest
//!   cargo run -p earshot-simtest -- --verbose
//!   cargo run -p earshot-simtest -- --map path/to/map.json
//!   cargo run -p earshot-simtest -- --config path/to/config.json --json

use earshot_core::entity::{EntityRecord, Slot};
use earshot_core::geometry::{Point, Rect};
use earshot_core::kernel::{Address, Command, Event, Message};
use earshot_core::map::MapDocument;
use earshot_core::obstruction::Obstruction;
use earshot_core::pathfinding::PathRequest;
use earshot_core::persistence;
use earshot_core::world::World;
use earshot_core::{validate_config, SimulationEngine, WorldConfig};
use log::{Level, LevelFilter, Log, Metadata, Record};
use serde::Serialize;

// ── Demo map (same JSON the core's tests use) ───────────────────────────
const DEMO_MAP_JSON: &str = include_str!("../../../data/demo_map.json");

/// Ticks the determinism and save checks run for.
const SOAK_TICKS: u32 = 600;

// ── Logging ─────────────────────────────────────────────────────────────

struct StderrLogger {
    level: Level,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static QUIET: StderrLogger = StderrLogger { level: Level::Warn };
static CHATTY: StderrLogger = StderrLogger { level: Level::Debug };

fn init_logging(verbose: bool) {
    let (logger, filter) = if verbose {
        (&CHATTY, LevelFilter::Debug)
    } else {
        (&QUIET, LevelFilter::Warn)
    };
    if log::set_logger(logger).is_ok() {
        log::set_max_level(filter);
    }
}

// ── Test harness ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

impl TestResult {
    fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            detail: detail.into(),
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    let as_json = args.iter().any(|a| a == "--json");
    let option = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
    };
    init_logging(verbose);
    if !as_json {
        println!("=== Earshot Simulation Harness ===\n");
    }

    let loaded = match option("--map") {
        Some(path) => MapDocument::load(path),
        None => MapDocument::from_json(DEMO_MAP_JSON),
    };
    let map = match loaded {
        Ok(map) => map,
        Err(e) => {
            eprintln!("fatal: {}", e);
            std::process::exit(1);
        }
    };
    let config = match option("--config").map(|path| load_config(path)) {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            eprintln!("fatal: {}", e);
            std::process::exit(1);
        }
        None => WorldConfig::default(),
    };
    if !as_json {
        println!("map '{}' ({}x{})\n", map.name, map.width, map.height);
    }

    let mut results = Vec::new();

    // 1. Configuration and map structure
    results.extend(validate_structure(&map, &config));

    // 2. Zone graph
    results.extend(validate_zone_graph(&map, &config));

    // 3. Pathfinding between accessible zones
    results.extend(validate_pathfinding(&map, &config));

    // 4. Listener and emitters
    results.extend(validate_acoustics(&map, &config));

    // 5. Passage messaging
    results.extend(validate_passages(&map, &config));

    // 6. Determinism
    results.extend(validate_determinism(&map, &config));

    // 7. Save / load
    results.extend(validate_persistence(&map, &config));

    // 8. Engine pacing
    results.extend(validate_engine(&map, &config));

    // ── Summary ──
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    if as_json {
        let report = Report {
            map: &map.name,
            passed,
            failed,
            results: &results,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("could not encode report: {}", e),
        }
        if failed > 0 {
            std::process::exit(1);
        }
        return;
    }

    println!();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

#[derive(Serialize)]
struct Report<'a> {
    map: &'a str,
    passed: usize,
    failed: usize,
    results: &'a [TestResult],
}

fn load_config(path: &str) -> Result<WorldConfig, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path, e))?;
    WorldConfig::from_json(&text).map_err(|e| format!("{}: {}", path, e))
}

/// Build a fresh world, or record why it could not be built.
fn build(map: &MapDocument, config: &WorldConfig, results: &mut Vec<TestResult>) -> Option<World> {
    match World::init(map, config.clone()) {
        Ok(world) => Some(world),
        Err(e) => {
            results.push(TestResult::new("world_init", false, e.to_string()));
            None
        }
    }
}

/// First tile of `area` a walker could stand on.
fn standing_tile(world: &World, area: &Rect) -> Option<Point> {
    area.points().find(|p| {
        world.grid().is_walkable(p) && world.registry().items.at_point(p, |i| !i.portable).is_none()
    })
}

fn script() -> Address {
    Address::Script("simtest".into())
}

// ── 1. Structure ────────────────────────────────────────────────────────

fn validate_structure(map: &MapDocument, config: &WorldConfig) -> Vec<TestResult> {
    log::info!("--- Structure ---");
    let mut results = Vec::new();

    let problems = validate_config(config);
    results.push(TestResult::new(
        "config_valid",
        problems.is_empty(),
        if problems.is_empty() {
            "default configuration is usable".to_string()
        } else {
            problems.join("; ")
        },
    ));

    results.push(TestResult::new(
        "map_has_zones",
        !map.zones.is_empty(),
        format!("{} zones, {} passages", map.zones.len(), map.passages.len()),
    ));

    let Some(world) = build(map, config, &mut results) else {
        return results;
    };
    results.push(TestResult::new(
        "world_init",
        true,
        format!(
            "{} items, {} entities",
            world.registry().items.len(),
            world.registry().entities.len()
        ),
    ));

    let stranded: Vec<_> = map
        .spawns
        .iter()
        .filter(|s| !world.grid().is_walkable(&s.at))
        .map(|s| s.name.as_str())
        .collect();
    results.push(TestResult::new(
        "spawns_on_walkable_tiles",
        stranded.is_empty(),
        if stranded.is_empty() {
            "every spawn stands on walkable terrain".to_string()
        } else {
            format!("stranded: {}", stranded.join(", "))
        },
    ));

    let homeless: Vec<_> = world
        .registry()
        .entities
        .iter()
        .filter(|e| e.zone().is_none())
        .map(|e| e.name().to_string())
        .collect();
    results.push(TestResult::new(
        "spawns_inside_zones",
        homeless.is_empty(),
        if homeless.is_empty() {
            "every entity starts inside a zone".to_string()
        } else {
            format!("outside every zone: {}", homeless.join(", "))
        },
    ));

    results
}

// ── 2. Zone graph ───────────────────────────────────────────────────────

fn validate_zone_graph(map: &MapDocument, config: &WorldConfig) -> Vec<TestResult> {
    log::info!("--- Zone Graph ---");
    let mut results = Vec::new();
    let Some(world) = build(map, config, &mut results) else {
        return results;
    };

    let names = world.registry().zones.names();
    let mut asymmetric = Vec::new();
    for a in &names {
        for b in &names {
            if world.are_neighbors(a, b) != world.are_neighbors(b, a) {
                asymmetric.push(format!("{}/{}", a, b));
            }
        }
    }
    results.push(TestResult::new(
        "neighbors_symmetric",
        asymmetric.is_empty(),
        if asymmetric.is_empty() {
            format!("{} zones checked pairwise", names.len())
        } else {
            format!("asymmetric pairs: {}", asymmetric.join(", "))
        },
    ));

    let unlinked: Vec<_> = map
        .passages
        .iter()
        .filter(|p| !world.are_neighbors(&p.zones[0], &p.zones[1]))
        .map(|p| p.name.as_str())
        .collect();
    results.push(TestResult::new(
        "passages_make_neighbors",
        unlinked.is_empty(),
        if unlinked.is_empty() {
            "every passage links its two zones".to_string()
        } else {
            format!("not linked: {}", unlinked.join(", "))
        },
    ));

    let locked_out: Vec<_> = map
        .passages
        .iter()
        .filter(|p| p.openable && !world.is_accessible(&p.zones[0], &p.zones[1]))
        .map(|p| p.name.as_str())
        .collect();
    results.push(TestResult::new(
        "openable_passages_grant_access",
        locked_out.is_empty(),
        if locked_out.is_empty() {
            format!(
                "{} openable, {} sealed",
                map.passages.iter().filter(|p| p.openable).count(),
                map.passages.iter().filter(|p| !p.openable).count()
            )
        } else {
            format!("zones cut off despite: {}", locked_out.join(", "))
        },
    ));

    results
}

// ── 3. Pathfinding ──────────────────────────────────────────────────────

fn validate_pathfinding(map: &MapDocument, config: &WorldConfig) -> Vec<TestResult> {
    log::info!("--- Pathfinding ---");
    let mut results = Vec::new();
    let Some(mut world) = build(map, config, &mut results) else {
        return results;
    };

    for passage in world.registry().passages.names() {
        let open = Message::command(script(), Command::Open);
        let _ = world.send(Address::passage(passage), open);
    }
    world.tick();

    let mut checked = 0;
    let mut stuck = Vec::new();
    for spec in &map.passages {
        let [a, b] = &spec.zones;
        if !world.is_accessible(a, b) {
            continue;
        }
        let (Some(zone_a), Some(zone_b)) = (world.find_zone(a), world.find_zone(b)) else {
            continue;
        };
        let (Some(from), Some(to)) = (
            standing_tile(&world, &zone_a.area),
            standing_tile(&world, &zone_b.area),
        ) else {
            continue;
        };
        let request = PathRequest::new(from, to)
            .through_objects(true)
            .max_distance(config.max_path_distance)
            .connectivity(config.connectivity);
        checked += 1;
        if world.find_path(&request).is_none() {
            stuck.push(format!("{} -> {}", a, b));
        }
    }
    results.push(TestResult::new(
        "accessible_zones_connected",
        stuck.is_empty(),
        if stuck.is_empty() {
            format!("{} zone links walkable with doors open", checked)
        } else {
            format!("no path: {}", stuck.join(", "))
        },
    ));

    // Restricted searches never leave their start zone.
    let mut leaks = Vec::new();
    for zone in world.registry().zones.iter() {
        let Some(from) = standing_tile(&world, &zone.area) else {
            continue;
        };
        for other in world.registry().zones.iter().filter(|z| z.name != zone.name) {
            let Some(to) = standing_tile(&world, &other.area) else {
                continue;
            };
            let request = PathRequest::new(from, to).through_objects(true).within_start_zone(true);
            if world.find_path(&request).is_some() {
                leaks.push(format!("{} -> {}", zone.name, other.name));
            }
        }
    }
    results.push(TestResult::new(
        "start_zone_restriction",
        leaks.is_empty(),
        if leaks.is_empty() {
            "restricted searches stay home".to_string()
        } else {
            format!("escaped: {}", leaks.join(", "))
        },
    ));

    results
}

// ── 4. Acoustics ────────────────────────────────────────────────────────

fn validate_acoustics(map: &MapDocument, config: &WorldConfig) -> Vec<TestResult> {
    log::info!("--- Acoustics ---");
    let mut results = Vec::new();
    let Some(mut world) = build(map, config, &mut results) else {
        return results;
    };

    let listener = world.listener().map(str::to_string);
    results.push(TestResult::new(
        "listener_present",
        listener.is_some(),
        format!("listener: {}", listener.as_deref().unwrap_or("none")),
    ));

    world.tick();
    let levels = world.sound_levels();
    let announced: Vec<String> = world
        .drain_outbound()
        .into_iter()
        .filter_map(|(_, m)| match m.as_event() {
            Some(Event::ObstructionChanged { source, .. }) => Some(source.clone()),
            _ => None,
        })
        .collect();
    let silent: Vec<_> = levels
        .iter()
        .filter(|l| !announced.contains(&l.source))
        .map(|l| l.source.as_str())
        .collect();
    results.push(TestResult::new(
        "emitters_announce_category",
        silent.is_empty(),
        if silent.is_empty() {
            format!("{} emitters classified on the first tick", levels.len())
        } else {
            format!("never announced: {}", silent.join(", "))
        },
    ));

    if let Some(ears) = world.listener_position() {
        let same_spot = world.classify(ears, ears);
        results.push(TestResult::new(
            "listener_hears_own_tile",
            same_spot == Obstruction::None,
            format!("own tile classified as {}", same_spot),
        ));
    }

    let far_point = Point::new(map.width as i32 * 4, map.height as i32 * 4);
    let far = world
        .listener_position()
        .map(|ears| world.classify(ears, far_point));
    results.push(TestResult::new(
        "beyond_threshold_is_far",
        far.map_or(true, |c| c == Obstruction::Far),
        format!("{} classified as {:?}", far_point, far),
    ));

    // Every emitter asked directly answers the asker with its category.
    let asker = Address::Script("narrator".into());
    for level in &levels {
        let query = Message::command(asker.clone(), Command::QueryObstruction);
        let to = if world.find_item(&level.source).is_some() {
            Address::item(&level.source)
        } else {
            Address::component(&level.source, Slot::Sound)
        };
        let _ = world.send(to, query);
    }
    for _ in 0..2 {
        world.tick();
    }
    let reports = world
        .drain_outbound()
        .into_iter()
        .filter(|(to, m)| *to == asker && m.kind() == "obstruction_report")
        .count();
    results.push(TestResult::new(
        "obstruction_queries_answered",
        reports == levels.len(),
        format!("{}/{} reports", reports, levels.len()),
    ));

    results
}

// ── 5. Passages ─────────────────────────────────────────────────────────

fn validate_passages(map: &MapDocument, config: &WorldConfig) -> Vec<TestResult> {
    log::info!("--- Passages ---");
    let mut results = Vec::new();
    let Some(mut world) = build(map, config, &mut results) else {
        return results;
    };

    let mut wrong = Vec::new();
    for spec in &map.passages {
        let before = world.find_passage(&spec.name).map(|p| p.is_open());
        let toggle = Message::command(script(), Command::Toggle);
        let _ = world.send(Address::passage(&spec.name), toggle);
        world.tick();
        let after = world.find_passage(&spec.name).map(|p| p.is_open());
        let flipped = before.is_some() && before != after;
        if flipped != spec.openable {
            wrong.push(spec.name.as_str());
        }
    }
    results.push(TestResult::new(
        "toggle_respects_openable",
        wrong.is_empty(),
        if wrong.is_empty() {
            format!("{} passages toggled", map.passages.len())
        } else {
            format!("misbehaved: {}", wrong.join(", "))
        },
    ));

    let privileged = world.send(
        Address::World,
        Message::command(
            Address::External,
            Command::Destroy {
                target: Address::zone(map.zones.first().map_or("", |z| z.name.as_str())),
            },
        ),
    );
    results.push(TestResult::new(
        "privileged_commands_checked",
        privileged.is_err(),
        "host may not destroy objects directly",
    ));

    results
}

// ── 6. Determinism ──────────────────────────────────────────────────────

fn snapshot(world: &World) -> Vec<EntityRecord> {
    world.registry().entities.iter().map(|e| e.record()).collect()
}

fn validate_determinism(map: &MapDocument, config: &WorldConfig) -> Vec<TestResult> {
    log::info!("--- Determinism ---");
    let mut results = Vec::new();
    let (Some(mut a), Some(mut b)) = (build(map, config, &mut results), build(map, config, &mut results)) else {
        return results;
    };

    for _ in 0..SOAK_TICKS {
        a.tick();
        b.tick();
    }
    let same = snapshot(&a) == snapshot(&b);
    results.push(TestResult::new(
        "same_map_same_story",
        same,
        format!("{} ticks on two worlds", SOAK_TICKS),
    ));

    let moved: Vec<_> = a
        .registry()
        .entities
        .iter()
        .filter(|e| {
            let start = map.spawns.iter().find(|s| s.name == e.name()).map(|s| s.at);
            start.is_some() && e.position() != start
        })
        .map(|e| e.name().to_string())
        .collect();
    let wanderers = map.spawns.iter().filter(|s| s.wander).count();
    results.push(TestResult::new(
        "wanderers_move",
        wanderers == 0 || !moved.is_empty(),
        format!("{} of {} wanderers left their spawn", moved.len(), wanderers),
    ));

    results
}

// ── 7. Persistence ──────────────────────────────────────────────────────

fn validate_persistence(map: &MapDocument, config: &WorldConfig) -> Vec<TestResult> {
    log::info!("--- Persistence ---");
    let mut results = Vec::new();
    let Some(mut world) = build(map, config, &mut results) else {
        return results;
    };
    for _ in 0..SOAK_TICKS / 2 {
        world.tick();
    }

    let mut buffer = Vec::new();
    if let Err(e) = persistence::save_world(&mut buffer, &world) {
        results.push(TestResult::new("save", false, e.to_string()));
        return results;
    }
    results.push(TestResult::new("save", true, format!("{} bytes", buffer.len())));

    match persistence::load_world(&buffer[..], map, config.clone()) {
        Ok(loaded) => {
            results.push(TestResult::new(
                "load_restores_entities",
                snapshot(&loaded) == snapshot(&world),
                format!("{} entities", loaded.registry().entities.len()),
            ));
            results.push(TestResult::new(
                "load_restores_tick",
                loaded.tick_count() == world.tick_count(),
                format!("tick {}", loaded.tick_count()),
            ));
            results.push(TestResult::new(
                "load_restores_listener",
                loaded.listener() == world.listener(),
                format!("listener {:?}", loaded.listener()),
            ));
        }
        Err(e) => results.push(TestResult::new("load", false, e.to_string())),
    }

    let mut truncated = buffer.clone();
    truncated.truncate(buffer.len() / 2);
    results.push(TestResult::new(
        "truncated_save_rejected",
        persistence::load_world(&truncated[..], map, config.clone()).is_err(),
        "half a save file does not load",
    ));

    results
}

// ── 8. Engine ───────────────────────────────────────────────────────────

fn validate_engine(map: &MapDocument, config: &WorldConfig) -> Vec<TestResult> {
    log::info!("--- Engine ---");
    let mut results = Vec::new();
    let mut engine = match SimulationEngine::new(map.clone(), config.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            results.push(TestResult::new("engine_init", false, e.to_string()));
            return results;
        }
    };

    let one_second = engine.update(1.0);
    results.push(TestResult::new(
        "catch_up_capped",
        one_second <= config.max_catch_up_ticks,
        format!("1s of wall time ran {} ticks", one_second),
    ));

    engine.set_time_scale(0.0);
    let paused = engine.update(1.0);
    results.push(TestResult::new(
        "time_scale_zero_pauses",
        paused == 0,
        format!("{} ticks while paused", paused),
    ));

    results
}
