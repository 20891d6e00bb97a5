//! Map documents: the JSON description a world is built from.
//!
//! Load order: floor terrain for every zone, then panels, then walls, then
//! passage footprints carved to `Threshold`. After the grid, zones,
//! passages and objects are registered and spawns are created.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entity::{EntityBlueprint, EntityKind};
use crate::geometry::{Point, Rect};
use crate::grid::{Terrain, TileGrid};
use crate::item::Item;
use crate::passage::{Passage, PassageKind, PassageState};
use crate::registry::RegistryError;
use crate::world::World;
use crate::zone::{Ambience, Zone, ZoneKind};

/// Fatal load errors.
#[derive(Debug)]
pub enum MapError {
    Missing(PathBuf),
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
    Registry(RegistryError),
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapError::Missing(path) => write!(f, "map file not found: {}", path.display()),
            MapError::Io(e) => write!(f, "IO error reading map: {}", e),
            MapError::Parse(e) => write!(f, "malformed map: {}", e),
            MapError::Invalid(msg) => write!(f, "invalid map: {}", msg),
            MapError::Registry(e) => write!(f, "map registration failed: {}", e),
        }
    }
}

impl std::error::Error for MapError {}

impl From<std::io::Error> for MapError {
    fn from(e: std::io::Error) -> Self {
        MapError::Io(e)
    }
}

impl From<serde_json::Error> for MapError {
    fn from(e: serde_json::Error) -> Self {
        MapError::Parse(e)
    }
}

impl From<RegistryError> for MapError {
    fn from(e: RegistryError) -> Self {
        MapError::Registry(e)
    }
}

fn default_floor() -> Terrain {
    Terrain::Floor
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSpec {
    pub area: Rect,
    pub terrain: Terrain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub name: String,
    pub kind: String,
    pub area: Rect,
    #[serde(default)]
    pub wall: bool,
    #[serde(default)]
    pub portable: bool,
    #[serde(default)]
    pub sound: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub name: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
    pub area: Rect,
    #[serde(default)]
    pub kind: ZoneKind,
    #[serde(default)]
    pub ambience: Ambience,
    #[serde(default = "default_floor")]
    pub floor: Terrain,
    #[serde(default)]
    pub panels: Vec<PanelSpec>,
    #[serde(default)]
    pub walls: Vec<Rect>,
    #[serde(default)]
    pub objects: Vec<ObjectSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageSpec {
    pub name: String,
    pub area: Rect,
    pub zones: [String; 2],
    #[serde(default)]
    pub kind: PassageKind,
    #[serde(default)]
    pub state: PassageState,
    #[serde(default = "default_true")]
    pub openable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnSpec {
    pub name: String,
    pub kind: EntityKind,
    pub at: Point,
    #[serde(default)]
    pub wander: bool,
    #[serde(default)]
    pub sound: Option<String>,
}

impl SpawnSpec {
    pub fn blueprint(&self) -> EntityBlueprint {
        match self.kind {
            EntityKind::Player => EntityBlueprint::player(&self.name, self.at),
            kind => EntityBlueprint::npc(&self.name, self.at, self.wander, self.sound.clone()).with_kind(kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDocument {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub zones: Vec<ZoneSpec>,
    #[serde(default)]
    pub passages: Vec<PassageSpec>,
    #[serde(default)]
    pub spawns: Vec<SpawnSpec>,
}

impl MapDocument {
    pub fn from_json(text: &str) -> Result<Self, MapError> {
        let mut doc: MapDocument = serde_json::from_str(text)?;
        doc.normalize();
        doc.validate()?;
        Ok(doc)
    }

    /// Read and validate a map file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MapError::Missing(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        log::info!("loading map from {}", path.display());
        Self::from_json(&text)
    }

    /// Sort the corners of every rectangle in the document.
    pub fn normalize(&mut self) {
        for zone in &mut self.zones {
            zone.area = zone.area.normalized();
            for panel in &mut zone.panels {
                panel.area = panel.area.normalized();
            }
            for wall in &mut zone.walls {
                *wall = wall.normalized();
            }
            for object in &mut zone.objects {
                object.area = object.area.normalized();
            }
        }
        for passage in &mut self.passages {
            passage.area = passage.area.normalized();
        }
    }

    /// Structural checks that parsing cannot express.
    pub fn validate(&self) -> Result<(), MapError> {
        if self.width == 0 || self.height == 0 {
            return Err(MapError::Invalid(format!(
                "map '{}' has empty dimensions {}x{}",
                self.name, self.width, self.height
            )));
        }
        let too_large = self.width.checked_mul(self.height).is_none()
            || i32::try_from(self.width).is_err()
            || i32::try_from(self.height).is_err();
        if too_large {
            return Err(MapError::Invalid(format!(
                "map '{}' dimensions {}x{} are too large",
                self.name, self.width, self.height
            )));
        }
        let bounds = Rect::new(0, 0, self.width as i32 - 1, self.height as i32 - 1);
        let check = |what: &str, rect: &Rect| {
            if bounds.contains_rect(&rect.normalized()) {
                Ok(())
            } else {
                Err(MapError::Invalid(format!("{} {} lies outside the map", what, rect)))
            }
        };

        for zone in &self.zones {
            check(&format!("zone '{}'", zone.name), &zone.area)?;
            for panel in &zone.panels {
                check(&format!("panel in zone '{}'", zone.name), &panel.area)?;
            }
            for wall in &zone.walls {
                check(&format!("wall in zone '{}'", zone.name), wall)?;
            }
            for object in &zone.objects {
                check(&format!("object '{}'", object.name), &object.area)?;
            }
        }
        for passage in &self.passages {
            check(&format!("passage '{}'", passage.name), &passage.area)?;
            let [a, b] = &passage.zones;
            if a == b {
                return Err(MapError::Invalid(format!(
                    "passage '{}' joins zone '{}' to itself",
                    passage.name, a
                )));
            }
            for zone in &passage.zones {
                if !self.zones.iter().any(|z| &z.name == zone) {
                    return Err(MapError::Invalid(format!(
                        "passage '{}' names unknown zone '{}'",
                        passage.name, zone
                    )));
                }
            }
        }
        for spawn in &self.spawns {
            if !bounds.contains(&spawn.at) {
                return Err(MapError::Invalid(format!(
                    "spawn '{}' at {} lies outside the map",
                    spawn.name, spawn.at
                )));
            }
        }
        Ok(())
    }
}

/// Paint the terrain described by `map`.
pub fn build_grid(map: &MapDocument) -> Result<TileGrid, MapError> {
    map.validate()?;
    let mut grid = TileGrid::new(map.width, map.height);
    for zone in &map.zones {
        grid.fill(&zone.area.normalized(), zone.floor);
    }
    for zone in &map.zones {
        for panel in &zone.panels {
            grid.fill(&panel.area.normalized(), panel.terrain);
        }
    }
    for zone in &map.zones {
        for wall in &zone.walls {
            grid.fill(&wall.normalized(), Terrain::Wall);
        }
    }
    for passage in &map.passages {
        grid.fill(&passage.area.normalized(), Terrain::Threshold);
    }
    Ok(grid)
}

/// Register the map's zones, passages and objects in `world`, then create
/// its spawns.
pub fn populate(world: &mut World, map: &MapDocument) -> Result<(), MapError> {
    for spec in &map.zones {
        let mut zone = Zone::new(&spec.name, spec.area, spec.kind).with_ambience(spec.ambience.clone());
        if let Some(friendly) = &spec.friendly_name {
            zone = zone.with_friendly_name(friendly);
        }
        world.add_zone(zone)?;
    }
    for spec in &map.passages {
        let passage = Passage::new(&spec.name, spec.area, spec.zones.clone(), spec.kind, spec.state)
            .with_openable(spec.openable);
        world.add_passage(passage)?;
    }
    for zone in &map.zones {
        for spec in &zone.objects {
            let item = Item::new(&spec.name, &spec.kind, spec.area)
                .with_wall(spec.wall)
                .with_portable(spec.portable)
                .with_sound(spec.sound.clone());
            world.add_item(item)?;
        }
    }
    for spawn in &map.spawns {
        world.spawn(spawn.blueprint())?;
    }
    Ok(())
}
