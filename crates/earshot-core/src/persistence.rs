//! Save/Load for a running world
//!
//! A snapshot holds the four registries, the listener, the tick counter and
//! the dynamic walls, encoded with bincode. The tile grid is not saved: on
//! load it is regenerated from the map document, dynamic walls are replayed
//! on top, the registries are restored and every object is told `Reloaded`
//! so it can rebuild transient state such as walking paths.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::config::WorldConfig;
use crate::entity::{Entity, EntityRecord};
use crate::geometry::Point;
use crate::item::Item;
use crate::kernel::{Address, Event};
use crate::map::{self, MapDocument, MapError};
use crate::passage::Passage;
use crate::registry::RegistryError;
use crate::world::World;
use crate::zone::Zone;

/// Version number for save file format (increment when format changes)
const SAVE_VERSION: u32 = 1;

/// Borrowed view written by [`save_world`]. Field order and types must
/// match [`SaveData`].
#[derive(Serialize)]
struct SaveDataRef<'a> {
    version: u32,
    map_name: &'a str,
    tick: u64,
    listener: Option<&'a str>,
    placed_walls: &'a [Point],
    zones: Vec<&'a Zone>,
    passages: Vec<&'a Passage>,
    items: Vec<&'a Item>,
    entities: Vec<EntityRecord>,
}

/// Serializable snapshot of a world
#[derive(Deserialize)]
pub struct SaveData {
    /// Save format version
    pub version: u32,
    /// Map the snapshot was taken on
    pub map_name: String,
    pub tick: u64,
    pub listener: Option<String>,
    /// Walls placed at runtime, in placement order
    pub placed_walls: Vec<Point>,
    pub zones: Vec<Zone>,
    pub passages: Vec<Passage>,
    pub items: Vec<Item>,
    pub entities: Vec<EntityRecord>,
}

/// Save a world to a writer
pub fn save_world<W: Write>(writer: W, world: &World) -> Result<(), SaveError> {
    let registry = world.registry();
    let save_data = SaveDataRef {
        version: SAVE_VERSION,
        map_name: world.map_name(),
        tick: world.tick_count(),
        listener: world.listener(),
        placed_walls: world.placed_walls(),
        zones: registry.zones.iter().collect(),
        passages: registry.passages.iter().collect(),
        items: registry.items.iter().collect(),
        entities: registry.entities.iter().map(|e| e.record()).collect(),
    };
    bincode::serialize_into(writer, &save_data)?;
    log::info!(
        "saved world '{}' at tick {} ({} entities)",
        save_data.map_name,
        save_data.tick,
        save_data.entities.len()
    );
    Ok(())
}

/// Load a world from a reader, rebuilding its grid from `map`
pub fn load_world<R: Read>(reader: R, map: &MapDocument, config: WorldConfig) -> Result<World, SaveError> {
    let save_data: SaveData = bincode::deserialize_from(reader)?;

    if save_data.version != SAVE_VERSION {
        return Err(SaveError::VersionMismatch {
            expected: SAVE_VERSION,
            found: save_data.version,
        });
    }
    if save_data.map_name != map.name {
        return Err(SaveError::MapMismatch {
            expected: map.name.clone(),
            found: save_data.map_name,
        });
    }

    let grid = map::build_grid(map)?;
    let mut world = World::new(&map.name, grid, config);
    for at in save_data.placed_walls {
        world.place_wall(at);
    }
    for zone in save_data.zones {
        world.add_zone(zone)?;
    }
    for passage in save_data.passages {
        world.add_passage(passage)?;
    }
    for item in save_data.items {
        world.add_item(item)?;
    }
    world.set_listener(save_data.listener);
    for record in save_data.entities {
        world.add_entity(Entity::from_record(record))?;
    }
    world.set_tick_count(save_data.tick);
    // Arrival notices from re-registration are not news to the host.
    world.drain_outbound();

    let told = world.broadcast(Address::World, Event::Reloaded);
    log::info!(
        "loaded world '{}' at tick {} ({} objects reloaded)",
        world.map_name(),
        world.tick_count(),
        told
    );
    Ok(world)
}

/// Errors that can occur during save/load
#[derive(Debug)]
pub enum SaveError {
    Io(std::io::Error),
    Bincode(Box<bincode::ErrorKind>),
    VersionMismatch { expected: u32, found: u32 },
    MapMismatch { expected: String, found: String },
    Map(MapError),
    Registry(RegistryError),
}

impl From<std::io::Error> for SaveError {
    fn from(e: std::io::Error) -> Self {
        SaveError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for SaveError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        SaveError::Bincode(e)
    }
}

impl From<MapError> for SaveError {
    fn from(e: MapError) -> Self {
        SaveError::Map(e)
    }
}

impl From<RegistryError> for SaveError {
    fn from(e: RegistryError) -> Self {
        SaveError::Registry(e)
    }
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveError::Io(e) => write!(f, "IO error: {}", e),
            SaveError::Bincode(e) => write!(f, "Serialization error: {}", e),
            SaveError::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Save version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            SaveError::MapMismatch { expected, found } => {
                write!(f, "Save belongs to map '{}', not '{}'", found, expected)
            }
            SaveError::Map(e) => write!(f, "Map error: {}", e),
            SaveError::Registry(e) => write!(f, "Registry error: {}", e),
        }
    }
}

impl std::error::Error for SaveError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityBlueprint;
    use crate::geometry::Rect;

    const MAP: &str = r#"{
        "name": "cellar",
        "width": 10,
        "height": 4,
        "zones": [
            { "name": "west", "area": { "x1": 0, "y1": 0, "x2": 3, "y2": 3 } },
            { "name": "east", "area": { "x1": 5, "y1": 0, "x2": 9, "y2": 3 },
              "objects": [ { "name": "barrel", "kind": "barrel", "area": { "x1": 8, "y1": 3, "x2": 8, "y2": 3 } } ] }
        ],
        "passages": [
            { "name": "hatch", "area": { "x1": 4, "y1": 1, "x2": 4, "y2": 1 },
              "zones": ["west", "east"], "state": "closed" }
        ],
        "spawns": [
            { "name": "hero", "kind": "player", "at": { "x": 1, "y": 1 } },
            { "name": "rat", "kind": "creature", "at": { "x": 7, "y": 2 }, "wander": true, "sound": "squeak" }
        ]
    }"#;

    #[test]
    fn test_save_load_roundtrip() {
        let map = MapDocument::from_json(MAP).unwrap();
        let mut world = World::init(&map, WorldConfig::default()).unwrap();
        world.place_wall(Point::new(2, 3));
        world.spawn(EntityBlueprint::npc("ghost", Point::new(6, 0), false, None)).unwrap();
        for _ in 0..10 {
            world.tick();
        }

        let mut buffer = Vec::new();
        save_world(&mut buffer, &world).expect("Save failed");

        let loaded = load_world(&buffer[..], &map, WorldConfig::default()).expect("Load failed");
        assert_eq!(loaded.tick_count(), world.tick_count());
        assert_eq!(loaded.listener(), Some("hero"));
        assert_eq!(loaded.registry().zones.names(), world.registry().zones.names());
        assert_eq!(loaded.registry().entities.names(), vec!["hero", "rat", "ghost"]);
        assert!(loaded.find_passage("hatch").unwrap().is_closed());
        assert_eq!(
            loaded.find_item("barrel").unwrap().footprint,
            Some(Rect::new(8, 3, 8, 3))
        );
        assert!(loaded.grid().is_wall(&Point::new(2, 3)));
        assert_eq!(loaded.placed_walls(), &[Point::new(2, 3)]);
        for entity in world.registry().entities.iter() {
            let restored = loaded.find_entity(entity.name()).unwrap();
            assert_eq!(restored.record(), entity.record());
        }
    }

    #[test]
    fn test_version_mismatch() {
        let map = MapDocument::from_json(MAP).unwrap();
        let world = World::init(&map, WorldConfig::default()).unwrap();
        let mut buffer = Vec::new();
        save_world(&mut buffer, &world).unwrap();
        // version is the leading little-endian u32
        buffer[0] = 99;
        let err = load_world(&buffer[..], &map, WorldConfig::default()).unwrap_err();
        assert!(matches!(err, SaveError::VersionMismatch { expected: 1, found: 99 }));
    }

    #[test]
    fn test_wrong_map_rejected() {
        let map = MapDocument::from_json(MAP).unwrap();
        let world = World::init(&map, WorldConfig::default()).unwrap();
        let mut buffer = Vec::new();
        save_world(&mut buffer, &world).unwrap();

        let mut other = map.clone();
        other.name = "attic".into();
        let err = load_world(&buffer[..], &other, WorldConfig::default()).unwrap_err();
        assert!(matches!(err, SaveError::MapMismatch { .. }));
    }
}
