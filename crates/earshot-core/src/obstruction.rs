//! Listener-to-source acoustic obstruction.
//!
//! Decides what stands between a sound source and the listener. Rules, first
//! match wins:
//! 1. beyond the audibility threshold, or in zones that are neither the same
//!    nor accessible neighbors: `Far`;
//! 2. an endpoint standing in a passage that joins it to the other endpoint's
//!    zone: `Door` if that passage is closed, `None` if open;
//! 3. a diagonal segment (bounding rectangle wider than one tile both ways):
//!    `IndirectPath`;
//! 4. a closed passage crossing the segment interior: `Door`;
//! 5. a wall tile or wall-tagged item in the interior: `Wall`;
//! 6. any other placed item in the interior: `Object`;
//! 7. otherwise `None`.
//!
//! The interior excludes both endpoints, so the source's own tile and the
//! listener's own tile never obstruct.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};
use crate::grid::TileGrid;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Obstruction {
    None,
    Object,
    Door,
    Wall,
    IndirectPath,
    Far,
}

impl std::fmt::Display for Obstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Obstruction::None => "none",
            Obstruction::Object => "object",
            Obstruction::Door => "door",
            Obstruction::Wall => "wall",
            Obstruction::IndirectPath => "indirect path",
            Obstruction::Far => "far",
        };
        f.write_str(label)
    }
}

/// Zones a point belongs to: the zones containing it, plus both sides of any
/// passage covering it.
fn zones_at<'a>(registry: &'a Registry, p: &Point) -> Vec<&'a str> {
    let mut zones: Vec<&str> = registry
        .zones
        .iter()
        .filter(|z| z.area.contains(p))
        .map(|z| z.name.as_str())
        .collect();
    for passage in registry.passages.iter().filter(|ps| ps.area.contains(p)) {
        for zone in &passage.zones {
            if !zones.contains(&zone.as_str()) {
                zones.push(zone);
            }
        }
    }
    zones
}

fn within_earshot(registry: &Registry, from_zones: &[&str], to_zones: &[&str]) -> bool {
    from_zones
        .iter()
        .any(|a| to_zones.iter().any(|b| registry.is_accessible(a, b)))
}

/// Rule 2: an endpoint sitting in a passage that leads to the other side.
fn passage_override(registry: &Registry, endpoint: &Point, other_zones: &[&str]) -> Option<Obstruction> {
    registry
        .passages
        .iter()
        .filter(|p| p.area.contains(endpoint))
        .find(|p| other_zones.iter().any(|z| p.touches(z)))
        .map(|p| if p.is_closed() { Obstruction::Door } else { Obstruction::None })
}

/// Classify the straight line from `from` (listener) to `to` (source).
pub fn classify(
    registry: &Registry,
    grid: &TileGrid,
    from: Point,
    to: Point,
    audibility_threshold: f32,
) -> Obstruction {
    if from.distance(&to) > audibility_threshold {
        return Obstruction::Far;
    }

    let from_zones = zones_at(registry, &from);
    let to_zones = zones_at(registry, &to);
    if !within_earshot(registry, &from_zones, &to_zones) {
        return Obstruction::Far;
    }

    let crosses_zones = !from_zones.iter().any(|z| to_zones.contains(z))
        || registry.passage_at(&from).is_some()
        || registry.passage_at(&to).is_some();
    if crosses_zones {
        if let Some(category) = passage_override(registry, &to, &from_zones)
            .or_else(|| passage_override(registry, &from, &to_zones))
        {
            return category;
        }
    }

    if !Rect::spanning(from, to).is_line() {
        return Obstruction::IndirectPath;
    }

    let Some(interior) = Rect::line_interior(from, to) else {
        return Obstruction::None;
    };

    if registry
        .passages
        .iter()
        .any(|p| p.is_closed() && p.area.intersects(&interior))
    {
        return Obstruction::Door;
    }

    let placed = registry.items.intersecting(&interior);
    if grid.any_wall_in(&interior) || placed.iter().any(|item| item.is_wall) {
        return Obstruction::Wall;
    }

    if !placed.is_empty() {
        return Obstruction::Object;
    }

    Obstruction::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Terrain;
    use crate::item::Item;
    use crate::passage::{Passage, PassageKind, PassageState};
    use crate::zone::{Zone, ZoneKind};

    const EARSHOT: f32 = 24.0;

    /// Two rooms side by side, separated by a wall at x=10 with a door at
    /// (10, 5). A third room far to the east is only reachable through a
    /// sealed hatch.
    fn layout(door: PassageState) -> (Registry, TileGrid) {
        let mut grid = TileGrid::new(60, 12);
        grid.fill(&Rect::new(0, 0, 9, 11), Terrain::Floor);
        grid.fill(&Rect::new(11, 0, 20, 11), Terrain::Floor);
        grid.fill(&Rect::new(10, 0, 10, 11), Terrain::Wall);
        grid.set(&Point::new(10, 5), Terrain::Threshold);
        grid.fill(&Rect::new(22, 0, 59, 11), Terrain::Floor);
        grid.fill(&Rect::new(21, 0, 21, 11), Terrain::Wall);
        grid.set(&Point::new(21, 3), Terrain::Threshold);

        let mut registry = Registry::new();
        registry.zones.insert(Zone::new("west", Rect::new(0, 0, 9, 11), ZoneKind::Indoor)).unwrap();
        registry.zones.insert(Zone::new("east", Rect::new(11, 0, 20, 11), ZoneKind::Indoor)).unwrap();
        registry.zones.insert(Zone::new("annex", Rect::new(22, 0, 59, 11), ZoneKind::Indoor)).unwrap();
        registry
            .passages
            .insert(Passage::new(
                "door",
                Rect::new(10, 5, 10, 5),
                ["west".into(), "east".into()],
                PassageKind::Door,
                door,
            ))
            .unwrap();
        registry
            .passages
            .insert(
                Passage::new(
                    "hatch",
                    Rect::new(21, 3, 21, 3),
                    ["east".into(), "annex".into()],
                    PassageKind::Gate,
                    PassageState::Closed,
                )
                .with_openable(false),
            )
            .unwrap();
        registry.rebuild_adjacency();
        (registry, grid)
    }

    #[test]
    fn test_same_zone_clear_line() {
        let (registry, grid) = layout(PassageState::Closed);
        let got = classify(&registry, &grid, Point::new(1, 2), Point::new(8, 2), EARSHOT);
        assert_eq!(got, Obstruction::None);
    }

    #[test]
    fn test_closed_door_then_open() {
        let (mut registry, grid) = layout(PassageState::Closed);
        let listener = Point::new(4, 5);
        let source = Point::new(16, 5);
        assert_eq!(classify(&registry, &grid, listener, source, EARSHOT), Obstruction::Door);

        registry.passages.get_mut("door").unwrap().state = PassageState::Open;
        assert_eq!(classify(&registry, &grid, listener, source, EARSHOT), Obstruction::None);
    }

    #[test]
    fn test_wall_between_zones() {
        let (registry, grid) = layout(PassageState::Open);
        let got = classify(&registry, &grid, Point::new(4, 8), Point::new(16, 8), EARSHOT);
        assert_eq!(got, Obstruction::Wall);
    }

    #[test]
    fn test_far_beyond_threshold_regardless_of_geometry() {
        let (registry, grid) = layout(PassageState::Open);
        let got = classify(&registry, &grid, Point::new(1, 1), Point::new(19, 1), 10.0);
        assert_eq!(got, Obstruction::Far);
        let got = classify(&registry, &grid, Point::new(1, 5), Point::new(19, 5), 10.0);
        assert_eq!(got, Obstruction::Far);
    }

    #[test]
    fn test_inaccessible_zone_is_far() {
        let (registry, grid) = layout(PassageState::Open);
        let got = classify(&registry, &grid, Point::new(18, 3), Point::new(24, 3), EARSHOT);
        assert_eq!(got, Obstruction::Far);
        // West and annex are not neighbors at all.
        let got = classify(&registry, &grid, Point::new(8, 3), Point::new(23, 3), EARSHOT);
        assert_eq!(got, Obstruction::Far);
    }

    #[test]
    fn test_diagonal_is_indirect() {
        let (registry, grid) = layout(PassageState::Open);
        let got = classify(&registry, &grid, Point::new(1, 1), Point::new(6, 7), EARSHOT);
        assert_eq!(got, Obstruction::IndirectPath);
    }

    #[test]
    fn test_source_in_doorway_overrides() {
        let (mut registry, grid) = layout(PassageState::Closed);
        let listener = Point::new(13, 9);
        let in_doorway = Point::new(10, 5);
        assert_eq!(classify(&registry, &grid, listener, in_doorway, EARSHOT), Obstruction::Door);

        registry.passages.get_mut("door").unwrap().state = PassageState::Open;
        assert_eq!(classify(&registry, &grid, listener, in_doorway, EARSHOT), Obstruction::None);
    }

    #[test]
    fn test_items_on_the_line() {
        let (mut registry, grid) = layout(PassageState::Open);
        registry.items.insert(Item::new("table", "table", Rect::new(4, 2, 5, 2))).unwrap();
        let got = classify(&registry, &grid, Point::new(1, 2), Point::new(8, 2), EARSHOT);
        assert_eq!(got, Obstruction::Object);

        registry
            .items
            .insert(Item::new("screen", "partition", Rect::new(6, 2, 6, 2)).with_wall(true))
            .unwrap();
        let got = classify(&registry, &grid, Point::new(1, 2), Point::new(8, 2), EARSHOT);
        assert_eq!(got, Obstruction::Wall);
    }

    #[test]
    fn test_endpoints_do_not_obstruct() {
        let (mut registry, grid) = layout(PassageState::Open);
        registry.items.insert(Item::new("radio", "radio", Rect::new(8, 2, 8, 2))).unwrap();
        let got = classify(&registry, &grid, Point::new(1, 2), Point::new(8, 2), EARSHOT);
        assert_eq!(got, Obstruction::None);
    }

    #[test]
    fn test_outside_any_zone_is_far() {
        let (registry, grid) = layout(PassageState::Open);
        let got = classify(&registry, &grid, Point::new(10, 1), Point::new(10, 3), EARSHOT);
        assert_eq!(got, Obstruction::Far);
    }
}
