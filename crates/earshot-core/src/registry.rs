//! Name-keyed registries and spatial queries.
//!
//! Each table keeps rows in registration order, which is also the tie-break
//! order for every spatial query. Removals requested while the world is
//! ticking are queued here and flushed by the world at the start of the next
//! tick.

use std::collections::HashMap;

use crate::entity::Entity;
use crate::geometry::{Point, Rect};
use crate::item::Item;
use crate::kernel::Address;
use crate::passage::Passage;
use crate::zone::{Membership, Zone};

/// Anything stored in a [`Table`].
pub trait Named {
    fn name(&self) -> &str;
}

/// Table rows that occupy space.
pub trait Placed: Named {
    fn footprint(&self) -> Option<Rect>;
}

impl Named for Zone {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Placed for Zone {
    fn footprint(&self) -> Option<Rect> {
        Some(self.area)
    }
}

impl Named for Passage {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Placed for Passage {
    fn footprint(&self) -> Option<Rect> {
        Some(self.area)
    }
}

impl Named for Item {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Placed for Item {
    fn footprint(&self) -> Option<Rect> {
        self.footprint
    }
}

/// Errors raised by registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateKey { table: &'static str, name: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateKey { table, name } => {
                write!(f, "duplicate {} name '{}'", table, name)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Insertion-ordered table with a name index.
#[derive(Debug)]
pub struct Table<T> {
    label: &'static str,
    rows: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: Named> Table<T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn insert(&mut self, row: T) -> Result<(), RegistryError> {
        if self.index.contains_key(row.name()) {
            return Err(RegistryError::DuplicateKey {
                table: self.label,
                name: row.name().to_string(),
            });
        }
        self.index.insert(row.name().to_string(), self.rows.len());
        self.rows.push(row);
        Ok(())
    }

    /// Remove a row, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<T> {
        let position = self.index.remove(name)?;
        let row = self.rows.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(row)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.rows[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.rows[i]),
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.rows.iter_mut()
    }

    pub fn names(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn at(&self, position: usize) -> Option<&T> {
        self.rows.get(position)
    }

    pub fn at_mut(&mut self, position: usize) -> Option<&mut T> {
        self.rows.get_mut(position)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.index.clear();
    }
}

impl<T: Placed> Table<T> {
    /// Matching placed rows with their Manhattan distance to `point`, closest
    /// first. The sort is stable so equal distances keep registration order.
    fn ranked<F>(&self, point: &Point, predicate: F) -> Vec<(u32, &T)>
    where
        F: Fn(&T) -> bool,
    {
        let mut ranked: Vec<(u32, &T)> = self
            .rows
            .iter()
            .filter(|row| predicate(*row))
            .filter_map(|row| row.footprint().map(|f| (f.manhattan_to(point), row)))
            .collect();
        ranked.sort_by_key(|(distance, _)| *distance);
        ranked
    }

    /// Up to `limit` matching rows nearest to `point`.
    pub fn nearest<F>(&self, point: &Point, limit: usize, predicate: F) -> Vec<&T>
    where
        F: Fn(&T) -> bool,
    {
        self.ranked(point, predicate)
            .into_iter()
            .take(limit)
            .map(|(_, row)| row)
            .collect()
    }

    /// Matching rows whose footprint lies within `radius` (Manhattan) of `point`.
    pub fn within<F>(&self, point: &Point, radius: u32, predicate: F) -> Vec<&T>
    where
        F: Fn(&T) -> bool,
    {
        self.ranked(point, predicate)
            .into_iter()
            .take_while(|(distance, _)| *distance <= radius)
            .map(|(_, row)| row)
            .collect()
    }

    /// Rows whose footprint intersects `area`, ordered by distance to the
    /// area's center.
    pub fn intersecting(&self, area: &Rect) -> Vec<&T> {
        self.ranked(&area.center(), |row| {
            row.footprint().is_some_and(|f| f.intersects(area))
        })
        .into_iter()
        .map(|(_, row)| row)
        .collect()
    }

    /// First row (registration order) whose footprint contains `point`.
    pub fn at_point<F>(&self, point: &Point, predicate: F) -> Option<&T>
    where
        F: Fn(&T) -> bool,
    {
        self.rows
            .iter()
            .find(|row| row.footprint().is_some_and(|f| f.contains(point)) && predicate(*row))
    }
}

/// The four world tables plus the deferred-removal queue.
#[derive(Debug)]
pub struct Registry {
    pub entities: Table<Entity>,
    pub items: Table<Item>,
    pub zones: Table<Zone>,
    pub passages: Table<Passage>,
    removals: Vec<Address>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entities: Table::new("entity"),
            items: Table::new("item"),
            zones: Table::new("zone"),
            passages: Table::new("passage"),
            removals: Vec::new(),
        }
    }

    /// Ask for `target` to be removed at the next flush point.
    pub fn queue_removal(&mut self, target: Address) {
        if !self.removals.contains(&target) {
            self.removals.push(target);
        }
    }

    pub fn pending_removals(&self) -> &[Address] {
        &self.removals
    }

    pub(crate) fn take_removals(&mut self) -> Vec<Address> {
        std::mem::take(&mut self.removals)
    }

    /// Recompute every zone's neighbor set from the passage table. Each
    /// passage adds both directions, so the relation is symmetric.
    pub fn rebuild_adjacency(&mut self) {
        for zone in self.zones.iter_mut() {
            zone.clear_neighbors();
        }
        let links: Vec<[String; 2]> = self.passages.iter().map(|p| p.zones.clone()).collect();
        for [a, b] in links {
            if !(self.zones.contains(&a) && self.zones.contains(&b)) {
                continue;
            }
            if let Some(zone) = self.zones.get_mut(&a) {
                zone.add_neighbor(&b);
            }
            if let Some(zone) = self.zones.get_mut(&b) {
                zone.add_neighbor(&a);
            }
        }
    }

    pub fn are_neighbors(&self, a: &str, b: &str) -> bool {
        self.zones.get(a).is_some_and(|zone| zone.is_neighbor(b))
    }

    /// Whether sound (or a walker) can get from zone `a` to zone `b`: the same
    /// zone, or neighbors with at least one passage that is not sealed.
    pub fn is_accessible(&self, a: &str, b: &str) -> bool {
        if a == b {
            return self.zones.contains(a);
        }
        self.are_neighbors(a, b)
            && self
                .passages
                .iter()
                .any(|p| p.connects(a, b) && !p.is_sealed())
    }

    pub fn zone_at(&self, point: &Point) -> Option<&Zone> {
        self.zones.at_point(point, |_| true)
    }

    pub fn passage_at(&self, point: &Point) -> Option<&Passage> {
        self.passages.at_point(point, |_| true)
    }

    /// An entity other than `ignore` standing on `point`.
    pub fn entity_at(&self, point: &Point, ignore: Option<&str>) -> Option<&Entity> {
        self.entities
            .at_point(point, |e| Some(e.name()) != ignore)
    }

    pub fn item_at(&self, point: &Point) -> Option<&Item> {
        self.items.at_point(point, |_| true)
    }

    /// What currently lies inside `area`.
    pub fn membership(&self, area: &Rect) -> Membership {
        Membership {
            entities: self.entities.intersecting(area).iter().map(|e| e.name().to_string()).collect(),
            items: self.items.intersecting(area).iter().map(|i| i.name.clone()).collect(),
            passages: self.passages.intersecting(area).iter().map(|p| p.name.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passage::{PassageKind, PassageState};
    use crate::zone::ZoneKind;

    fn crate_at(name: &str, x: i32, y: i32) -> Item {
        Item::new(name, "crate", Rect::new(x, y, x, y))
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut items = Table::new("item");
        items.insert(crate_at("box", 0, 0)).unwrap();
        let err = items.insert(crate_at("box", 3, 3)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateKey {
                table: "item",
                name: "box".into()
            }
        );
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_find_missing_is_none() {
        let items: Table<Item> = Table::new("item");
        assert!(items.get("ghost").is_none());
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut items = Table::new("item");
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            items.insert(crate_at(name, i as i32, 0)).unwrap();
        }
        assert!(items.remove("b").is_some());
        assert_eq!(items.names(), vec!["a", "c", "d"]);
        assert_eq!(items.get("d").map(|i| i.name.as_str()), Some("d"));
        assert!(items.remove("b").is_none());
    }

    #[test]
    fn test_nearest_ties_follow_registration_order() {
        let mut items = Table::new("item");
        items.insert(crate_at("east", 7, 5)).unwrap();
        items.insert(crate_at("far", 20, 20)).unwrap();
        items.insert(crate_at("west", 3, 5)).unwrap();
        items.insert(crate_at("north", 5, 7)).unwrap();

        let origin = Point::new(5, 5);
        let nearest: Vec<_> = items.nearest(&origin, 3, |_| true).iter().map(|i| i.name.as_str()).collect();
        assert_eq!(nearest, vec!["east", "west", "north"]);

        let filtered = items.nearest(&origin, 1, |i| i.name != "east");
        assert_eq!(filtered[0].name, "west");
    }

    #[test]
    fn test_within_radius() {
        let mut items = Table::new("item");
        items.insert(crate_at("near", 1, 0)).unwrap();
        items.insert(crate_at("mid", 3, 0)).unwrap();
        items.insert(crate_at("far", 9, 0)).unwrap();
        let hits: Vec<_> = items.within(&Point::new(0, 0), 3, |_| true).iter().map(|i| i.name.as_str()).collect();
        assert_eq!(hits, vec!["near", "mid"]);
    }

    #[test]
    fn test_intersecting_skips_carried_items() {
        let mut items = Table::new("item");
        items.insert(crate_at("in", 2, 2)).unwrap();
        let mut carried = crate_at("carried", 2, 3);
        carried.footprint = None;
        items.insert(carried).unwrap();
        items.insert(crate_at("out", 9, 9)).unwrap();
        let hits = items.intersecting(&Rect::new(0, 0, 4, 4));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "in");
    }

    fn three_zones() -> Registry {
        let mut registry = Registry::new();
        registry.zones.insert(Zone::new("hall", Rect::new(0, 0, 4, 4), ZoneKind::Indoor)).unwrap();
        registry.zones.insert(Zone::new("yard", Rect::new(6, 0, 10, 4), ZoneKind::Outdoor)).unwrap();
        registry.zones.insert(Zone::new("vault", Rect::new(0, 6, 4, 10), ZoneKind::Indoor)).unwrap();
        registry
            .passages
            .insert(Passage::new(
                "front",
                Rect::new(5, 2, 5, 2),
                ["hall".into(), "yard".into()],
                PassageKind::Door,
                PassageState::Closed,
            ))
            .unwrap();
        registry
            .passages
            .insert(
                Passage::new(
                    "vault_door",
                    Rect::new(2, 5, 2, 5),
                    ["vault".into(), "hall".into()],
                    PassageKind::Door,
                    PassageState::Closed,
                )
                .with_openable(false),
            )
            .unwrap();
        registry.rebuild_adjacency();
        registry
    }

    #[test]
    fn test_neighbors_symmetric() {
        let registry = three_zones();
        let names = registry.zones.names();
        for a in &names {
            for b in &names {
                assert_eq!(registry.are_neighbors(a, b), registry.are_neighbors(b, a));
            }
        }
        assert!(registry.are_neighbors("hall", "yard"));
        assert!(registry.are_neighbors("vault", "hall"));
        assert!(!registry.are_neighbors("yard", "vault"));
    }

    #[test]
    fn test_sealed_passage_blocks_access() {
        let registry = three_zones();
        assert!(registry.is_accessible("hall", "yard"));
        assert!(!registry.is_accessible("hall", "vault"));
        assert!(registry.is_accessible("vault", "vault"));
        assert!(!registry.is_accessible("hall", "nowhere"));
    }

    #[test]
    fn test_zone_and_passage_lookup() {
        let registry = three_zones();
        assert_eq!(registry.zone_at(&Point::new(8, 1)).map(|z| z.name.as_str()), Some("yard"));
        assert!(registry.zone_at(&Point::new(5, 2)).is_none());
        assert_eq!(registry.passage_at(&Point::new(5, 2)).map(|p| p.name.as_str()), Some("front"));
    }

    #[test]
    fn test_removal_queue_dedupes() {
        let mut registry = Registry::new();
        registry.queue_removal(Address::item("box"));
        registry.queue_removal(Address::item("box"));
        assert_eq!(registry.pending_removals().len(), 1);
        assert_eq!(registry.take_removals(), vec![Address::item("box")]);
        assert!(registry.pending_removals().is_empty());
    }
}
