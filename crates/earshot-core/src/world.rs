//! The world: grid, registries, message routing and the tick loop.
//!
//! A [`World`] is the explicit context every subsystem works against. It is
//! built by [`World::init`] (or empty with [`World::new`]) and dismantled
//! with [`World::teardown`].
//!
//! Tick order:
//! 1. flush deferred removals;
//! 2. zones, then passages, then items, each handling at most one message;
//! 3. entities: one entity message is copied onto the inner bus, then every
//!    component ticks in list order.
//!
//! While an object runs it sees the world read-only. Its follow-up messages
//! are routed right after it returns; messages addressed to
//! [`Address::World`] are applied at that point, so registries change only
//! on behalf of the object that just ran.

use std::rc::Rc;

use crate::components::{ComponentState, SoundRole, SoundState};
use crate::config::WorldConfig;
use crate::entity::{activate_components, tick_components, Component, Entity, EntityBlueprint, Slot};
use crate::geometry::{Point, Rect};
use crate::grid::{Terrain, TileGrid};
use crate::item::Item;
use crate::kernel::{
    dispatch, Address, Command, Delivery, Event, KernelError, Mailboxed, Message, Obstacle, Outbox,
};
use crate::map::{MapDocument, MapError};
use crate::obstruction::{self, Obstruction};
use crate::passage::Passage;
use crate::pathfinding::{self, PathRequest, WalkMap};
use crate::registry::{Registry, RegistryError};
use crate::zone::Zone;

/// How one emitter is currently heard by the listener.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLevel {
    pub source: String,
    pub sound: String,
    pub category: Option<Obstruction>,
    pub gain: f32,
}

#[derive(Debug)]
pub struct World {
    config: WorldConfig,
    map_name: String,
    grid: TileGrid,
    registry: Registry,
    listener: Option<String>,
    placed_walls: Vec<Point>,
    outbound: Vec<(Address, Rc<Message>)>,
    tick: u64,
}

impl World {
    /// An empty world over `grid`.
    pub fn new(map_name: impl Into<String>, grid: TileGrid, config: WorldConfig) -> Self {
        Self {
            config,
            map_name: map_name.into(),
            grid,
            registry: Registry::new(),
            listener: None,
            placed_walls: Vec::new(),
            outbound: Vec::new(),
            tick: 0,
        }
    }

    /// Build a live world from a map document: grid, zones, passages,
    /// objects and spawns.
    pub fn init(map: &MapDocument, config: WorldConfig) -> Result<Self, MapError> {
        let grid = crate::map::build_grid(map)?;
        let mut world = World::new(&map.name, grid, config);
        crate::map::populate(&mut world, map)?;
        log::info!(
            "world '{}' ready: {} zones, {} passages, {} items, {} entities",
            world.map_name,
            world.registry.zones.len(),
            world.registry.passages.len(),
            world.registry.items.len(),
            world.registry.entities.len()
        );
        Ok(world)
    }

    /// Deactivate and drop every object. The grid stays.
    pub fn teardown(&mut self) {
        for entity in self.registry.entities.iter_mut() {
            let mut components = entity.take_components();
            for component in components.iter_mut() {
                component.deactivate();
            }
            entity.restore_components(components);
            entity.mark_active(false);
        }
        self.registry.entities.clear();
        self.registry.items.clear();
        self.registry.passages.clear();
        self.registry.zones.clear();
        self.registry.take_removals();
        self.outbound.clear();
        self.listener = None;
        log::info!("world '{}' torn down after {} ticks", self.map_name, self.tick);
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub(crate) fn set_tick_count(&mut self, tick: u64) {
        self.tick = tick;
    }

    pub fn listener(&self) -> Option<&str> {
        self.listener.as_deref()
    }

    pub fn set_listener(&mut self, name: Option<String>) {
        self.listener = name;
    }

    pub fn listener_position(&self) -> Option<Point> {
        self.listener.as_deref().and_then(|name| self.entity_position(name))
    }

    pub fn placed_walls(&self) -> &[Point] {
        &self.placed_walls
    }

    pub fn find_entity(&self, name: &str) -> Option<&Entity> {
        self.registry.entities.get(name)
    }

    pub fn find_item(&self, name: &str) -> Option<&Item> {
        self.registry.items.get(name)
    }

    pub fn find_zone(&self, name: &str) -> Option<&Zone> {
        self.registry.zones.get(name)
    }

    pub fn find_passage(&self, name: &str) -> Option<&Passage> {
        self.registry.passages.get(name)
    }

    pub fn entity_position(&self, name: &str) -> Option<Point> {
        self.registry.entities.get(name).and_then(|e| e.position())
    }

    /// The zone an entity currently counts as being in.
    pub fn zone_of(&self, entity: &str) -> Option<&Zone> {
        let zone = self.registry.entities.get(entity)?.zone()?;
        self.registry.zones.get(zone)
    }

    pub fn are_neighbors(&self, a: &str, b: &str) -> bool {
        self.registry.are_neighbors(a, b)
    }

    pub fn is_accessible(&self, a: &str, b: &str) -> bool {
        self.registry.is_accessible(a, b)
    }

    pub fn find_path(&self, request: &PathRequest<'_>) -> Option<Vec<Point>> {
        pathfinding::find_path(self, request)
    }

    /// Obstruction between the listener point `from` and the source `to`.
    pub fn classify(&self, from: Point, to: Point) -> Obstruction {
        obstruction::classify(&self.registry, &self.grid, from, to, self.config.audibility_threshold)
    }

    /// What a single step of `mover` onto `to` would run into.
    pub fn step_blocker(&self, mover: &str, to: &Point) -> Option<Obstacle> {
        if !self.grid.in_bounds(to) || self.grid.terrain(to) == Terrain::Void {
            return Some(Obstacle::Edge);
        }
        if self.grid.is_wall(to) {
            return Some(Obstacle::Wall);
        }
        if let Some(passage) = self.registry.passages.at_point(to, |p| p.is_closed()) {
            return Some(Obstacle::Door(passage.name.clone()));
        }
        if !self.grid.is_walkable(to) {
            return Some(Obstacle::Edge);
        }
        if let Some(other) = self.registry.entity_at(to, Some(mover)) {
            return Some(Obstacle::Entity(other.name().to_string()));
        }
        if let Some(item) = self.registry.items.at_point(to, |i| !i.portable) {
            return Some(Obstacle::Object(item.name.clone()));
        }
        None
    }

    /// Emitters and how they are heard right now: sounding entities first,
    /// then active items. Items switch gain without fading.
    pub fn sound_levels(&self) -> Vec<SourceLevel> {
        let entities = self
            .registry
            .entities
            .iter()
            .filter_map(|entity| match entity.component(Slot::Sound)?.state() {
                ComponentState::Sound(SoundState {
                    role: SoundRole::Emitter { sound },
                    category,
                    fade,
                }) => Some(SourceLevel {
                    source: entity.name().to_string(),
                    sound,
                    category,
                    gain: fade.value(),
                }),
                _ => None,
            });
        let items = self.registry.items.iter().filter_map(|item| {
            let sound = item.sound.clone().filter(|_| item.active)?;
            let category = item.heard();
            Some(SourceLevel {
                source: item.name.clone(),
                sound,
                category,
                gain: category.map_or(0.0, |c| self.config.attenuation.gain(c)),
            })
        });
        entities.chain(items).collect()
    }

    /// Where an item's sound comes from: its own tile, or its holder's.
    pub fn item_position(&self, item: &Item) -> Option<Point> {
        match (&item.footprint, &item.holder) {
            (Some(area), _) => Some(area.origin()),
            (None, Some(holder)) => self.entity_position(holder),
            (None, None) => None,
        }
    }

    pub fn add_zone(&mut self, zone: Zone) -> Result<(), RegistryError> {
        let name = zone.name.clone();
        self.registry.zones.insert(zone)?;
        if let Some(zone) = self.registry.zones.get_mut(&name) {
            zone.activate();
        }
        self.registry.rebuild_adjacency();
        Ok(())
    }

    pub fn add_passage(&mut self, passage: Passage) -> Result<(), RegistryError> {
        let name = passage.name.clone();
        self.registry.passages.insert(passage)?;
        if let Some(passage) = self.registry.passages.get_mut(&name) {
            passage.activate();
        }
        self.registry.rebuild_adjacency();
        Ok(())
    }

    pub fn add_item(&mut self, item: Item) -> Result<(), RegistryError> {
        let name = item.name.clone();
        self.registry.items.insert(item)?;
        if let Some(item) = self.registry.items.get_mut(&name) {
            item.activate();
        }
        Ok(())
    }

    /// Register and activate an assembled entity. The first entity carrying
    /// listener ears becomes the listener.
    pub fn add_entity(&mut self, entity: Entity) -> Result<(), RegistryError> {
        let name = entity.name().to_string();
        let has_ears = matches!(
            entity.component(Slot::Sound).map(|c| c.state()),
            Some(ComponentState::Sound(SoundState {
                role: SoundRole::Listener,
                ..
            }))
        );
        self.registry.entities.insert(entity)?;
        if has_ears && self.listener.is_none() {
            log::info!("listener is '{}'", name);
            self.listener = Some(name.clone());
        }
        self.activate_entity(&name);
        Ok(())
    }

    /// Entity factory: build components from the blueprint, attach,
    /// register and activate.
    pub fn spawn(&mut self, blueprint: EntityBlueprint) -> Result<(), RegistryError> {
        log::debug!("spawning '{}' at {:?}", blueprint.name, blueprint.at);
        self.add_entity(Entity::from_record(blueprint.into_record()))
    }

    /// Queue `target` for removal at the start of the next tick.
    pub fn destroy(&mut self, target: Address) {
        self.registry.queue_removal(target);
    }

    /// Turn a tile into wall at runtime. The placement is saved.
    pub fn place_wall(&mut self, at: Point) -> bool {
        if !self.grid.set(&at, Terrain::Wall) {
            return false;
        }
        if !self.placed_walls.contains(&at) {
            self.placed_walls.push(at);
        }
        true
    }

    /// Messages addressed to the host since the last drain, in send order.
    pub fn drain_outbound(&mut self) -> Vec<(Address, Rc<Message>)> {
        std::mem::take(&mut self.outbound)
    }

    /// Deliver a message from outside the tick loop.
    pub fn send(&mut self, to: Address, message: Message) -> Result<Delivery, KernelError> {
        message.authorize()?;
        Ok(self.deliver(to, Rc::new(message)))
    }

    /// Post one event to every zone, passage, item and entity. Components
    /// receive it through their entity.
    pub fn broadcast(&mut self, sender: Address, event: Event) -> usize {
        let message = Rc::new(Message::event(sender, event));
        let mut targets: Vec<Address> = Vec::new();
        targets.extend(self.registry.zones.names().into_iter().map(Address::Zone));
        targets.extend(self.registry.passages.names().into_iter().map(Address::Passage));
        targets.extend(self.registry.items.names().into_iter().map(Address::Item));
        targets.extend(self.registry.entities.names().into_iter().map(Address::Entity));
        targets
            .into_iter()
            .filter(|to| self.deliver(to.clone(), Rc::clone(&message)) == Delivery::Delivered)
            .count()
    }

    /// Advance the simulation by one tick.
    pub fn tick(&mut self) {
        self.tick += 1;
        self.flush_removals();
        self.tick_zones();
        self.tick_passages();
        self.tick_items();
        self.tick_entities();
    }

    fn tick_zones(&mut self) {
        for i in 0..self.registry.zones.len() {
            let listener = self.listener.clone();
            let mut outbox = Outbox::new();
            let Some(zone) = self.registry.zones.at_mut(i) else {
                continue;
            };
            dispatch(zone, |z, m| z.handle(m, listener.as_deref(), &mut outbox));
            let area = zone.area;
            let members = self.registry.membership(&area);
            if let Some(zone) = self.registry.zones.at_mut(i) {
                zone.set_members(members);
            }
            self.route(outbox);
        }
    }

    fn tick_passages(&mut self) {
        for i in 0..self.registry.passages.len() {
            let mut outbox = Outbox::new();
            if let Some(passage) = self.registry.passages.at_mut(i) {
                dispatch(passage, |p, m| p.handle(m, &mut outbox));
            }
            self.route(outbox);
        }
    }

    fn tick_items(&mut self) {
        for i in 0..self.registry.items.len() {
            let mut outbox = Outbox::new();
            if let Some(item) = self.registry.items.at_mut(i) {
                dispatch(item, |it, m| it.handle(m, &mut outbox));
            }
            self.route(outbox);
            self.reclassify_item(i);
        }
    }

    /// Classify a sounding item against the listener and announce changes
    /// the same way entity emitters do.
    fn reclassify_item(&mut self, i: usize) {
        let Some(item) = self.registry.items.at(i) else {
            return;
        };
        let category = if item.is_sounding() {
            self.item_position(item).map(|at| match self.listener_position() {
                Some(ears) => self.classify(ears, at),
                None => Obstruction::Far,
            })
        } else {
            None
        };
        let name = item.name.clone();
        let Some(item) = self.registry.items.at_mut(i) else {
            return;
        };
        if item.heard() == category {
            return;
        }
        item.set_heard(category);
        if let Some(category) = category {
            log::debug!("item '{}' now heard through {}", name, category);
            self.notify(Address::External, Event::ObstructionChanged { source: name, category });
        }
    }

    fn tick_entities(&mut self) {
        for name in self.registry.entities.names() {
            let inbound = match self.registry.entities.get_mut(&name) {
                Some(entity) if entity.is_active() => entity.mailbox_mut().pop(),
                _ => continue,
            };
            self.with_components(&name, |owner, components, world, outbox| {
                tick_components(owner, components, inbound, world, outbox)
            });
        }
    }

    /// Run `f` over an entity's components while the rest of the world is
    /// borrowed read-only, then route what they sent.
    fn with_components<F>(&mut self, name: &str, f: F)
    where
        F: FnOnce(&str, &mut [Box<dyn Component>], &World, &mut Outbox),
    {
        let Some(entity) = self.registry.entities.get_mut(name) else {
            return;
        };
        let mut components = entity.take_components();
        let mut outbox = Outbox::new();
        f(name, &mut components, self, &mut outbox);
        if let Some(entity) = self.registry.entities.get_mut(name) {
            entity.restore_components(components);
        }
        self.route(outbox);
    }

    fn activate_entity(&mut self, name: &str) {
        let Some(at) = self.registry.entities.get_mut(name).map(|entity| {
            entity.mark_active(true);
            entity.position()
        }) else {
            return;
        };
        self.with_components(name, |owner, components, world, outbox| {
            activate_components(owner, components, world, outbox)
        });
        if let Some(at) = at {
            self.relocate(name, Some(Rect::point(at)));
        }
    }

    fn route(&mut self, outbox: Outbox) {
        for (to, message) in outbox.into_inner() {
            if let Err(err) = message.authorize() {
                log::error!("dropping message to {}: {}", to, err);
                continue;
            }
            let kind = message.kind();
            match self.deliver(to.clone(), Rc::new(message)) {
                Delivery::Delivered | Delivery::Suppressed => {}
                Delivery::Disabled => log::trace!("{} is inactive, '{}' dropped", to, kind),
                Delivery::NoSuchTarget => log::warn!("no target {} for '{}'", to, kind),
            }
        }
    }

    fn deliver(&mut self, to: Address, message: Rc<Message>) -> Delivery {
        match &to {
            Address::World => {
                self.apply(&message);
                Delivery::Delivered
            }
            Address::External | Address::Script(_) => {
                self.outbound.push((to.clone(), message));
                Delivery::Delivered
            }
            Address::Entity(name) => match self.registry.entities.get_mut(name) {
                Some(entity) => entity.post(message),
                None => Delivery::NoSuchTarget,
            },
            Address::Component(name, slot) => {
                match self.registry.entities.get_mut(name).and_then(|e| e.component_mut(*slot)) {
                    Some(component) => component.post(message),
                    None => Delivery::NoSuchTarget,
                }
            }
            Address::Zone(name) => match self.registry.zones.get_mut(name) {
                Some(zone) => zone.post(message),
                None => Delivery::NoSuchTarget,
            },
            Address::Passage(name) => match self.registry.passages.get_mut(name) {
                Some(passage) => passage.post(message),
                None => Delivery::NoSuchTarget,
            },
            Address::Item(name) => match self.registry.items.get_mut(name) {
                Some(item) => item.post(message),
                None => Delivery::NoSuchTarget,
            },
        }
    }

    fn notify(&mut self, to: Address, event: Event) {
        self.deliver(to, Rc::new(Message::event(Address::World, event)));
    }

    /// Apply a command addressed to the world.
    fn apply(&mut self, message: &Message) {
        let Some(command) = message.as_command() else {
            log::trace!("world ignores event '{}'", message.kind());
            return;
        };
        let actor = message.sender().owning_entity().map(str::to_string);
        match (command, actor) {
            (Command::Place { to }, Some(actor)) => self.place(&actor, *to),
            (Command::Teleport { entity, to }, _) => self.teleport(entity, *to),
            (Command::Destroy { target }, _) => self.destroy(target.clone()),
            (Command::PickUp { item }, Some(actor)) => self.pick_up(&actor, item),
            (Command::Drop { item, at }, Some(actor)) => self.drop_item(&actor, item, *at),
            (other, _) => log::warn!("world ignores '{}' from {}", other.kind(), message.sender()),
        }
    }

    fn place(&mut self, actor: &str, to: Point) {
        let Some(from) = self.entity_position(actor) else {
            return;
        };
        let blocker = if from.chebyshev(&to) > 1 {
            Some(Obstacle::Edge)
        } else {
            self.step_blocker(actor, &to)
        };
        match blocker {
            None => self.relocate(actor, Some(Rect::point(to))),
            Some(obstacle) => {
                log::debug!("{} blocked at {} by {:?}", actor, to, obstacle);
                let with = match obstacle {
                    Obstacle::Entity(name) | Obstacle::Object(name) | Obstacle::Door(name) => Some(name),
                    Obstacle::Wall | Obstacle::Edge => None,
                };
                self.notify(Address::entity(actor), Event::Collision { with, at: to });
            }
        }
    }

    fn teleport(&mut self, entity: &str, to: Option<Point>) {
        if !self.registry.entities.contains(entity) {
            log::warn!("cannot teleport unknown entity '{}'", entity);
            return;
        }
        self.relocate(entity, to.map(Rect::point));
        let stop = Message::command(Address::World, Command::Stop);
        self.deliver(Address::component(entity, Slot::Physics), Rc::new(stop));
    }

    /// Move an entity and emit zone transitions. A doorway tile belongs to no
    /// zone, so standing in one keeps the zone the entity came from.
    fn relocate(&mut self, name: &str, footprint: Option<Rect>) {
        let at = footprint.map(|f| f.origin());
        let zone_here = at.and_then(|p| self.registry.zone_at(&p)).map(|z| z.name.clone());
        let in_doorway = at.is_some_and(|p| self.registry.passage_at(&p).is_some());

        let Some(entity) = self.registry.entities.get_mut(name) else {
            return;
        };
        let old_zone = entity.zone().map(str::to_string);
        let new_zone = match zone_here {
            None if in_doorway => old_zone.clone(),
            other => other,
        };
        entity.set_footprint(footprint);
        entity.set_zone(new_zone.clone());

        if old_zone != new_zone {
            if let Some(zone) = old_zone {
                log::debug!("{} left zone '{}'", name, zone);
                let left = Event::LeftZone {
                    entity: name.to_string(),
                    zone: zone.clone(),
                };
                self.notify(Address::Zone(zone), left.clone());
                self.notify(Address::entity(name), left);
            }
            if let Some(zone) = new_zone {
                let entered = Event::EnteredZone {
                    entity: name.to_string(),
                    zone: zone.clone(),
                };
                self.notify(Address::Zone(zone), entered.clone());
                self.notify(Address::entity(name), entered);
            }
        }
        if let Some(at) = at {
            let moved = Event::Moved {
                entity: name.to_string(),
                at,
            };
            self.notify(Address::External, moved);
        }
    }

    fn interaction_failed(&mut self, actor: &str, reason: String) {
        log::warn!("{}: {}", actor, reason);
        let failed = Event::InteractionFailed { reason };
        self.notify(Address::entity(actor), failed.clone());
        self.notify(Address::External, failed);
    }

    fn pick_up(&mut self, actor: &str, item: &str) {
        let Some(at) = self.entity_position(actor) else {
            self.interaction_failed(actor, format!("{} is nowhere", actor));
            return;
        };
        let reach = self.config.reach;
        let check = match self.registry.items.get(item) {
            None => Err(format!("there is no {}", item)),
            Some(found) if !found.portable => Err(format!("{} cannot be carried", item)),
            Some(found) => match found.footprint {
                None => Err(format!("{} is already carried", item)),
                Some(area) if area.manhattan_to(&at) > reach => Err(format!("{} is out of reach", item)),
                Some(_) => Ok(()),
            },
        };
        if let Err(reason) = check {
            self.interaction_failed(actor, reason);
            return;
        }

        if let Some(found) = self.registry.items.get_mut(item) {
            found.footprint = None;
            found.holder = Some(actor.to_string());
        }
        if let Some(entity) = self.registry.entities.get_mut(actor) {
            entity.inventory_mut().insert(item.to_string());
        }
        log::debug!("{} picked up {}", actor, item);
        let event = Event::ItemPickedUp {
            item: item.to_string(),
            by: actor.to_string(),
        };
        self.notify(Address::entity(actor), event.clone());
        self.notify(Address::External, event);
    }

    fn drop_item(&mut self, actor: &str, item: &str, at: Option<Point>) {
        let Some(entity) = self.registry.entities.get(actor) else {
            return;
        };
        let (Some(here), true) = (entity.position(), entity.holds(item)) else {
            self.interaction_failed(actor, format!("{} is not carrying {}", actor, item));
            return;
        };
        let spot = at.unwrap_or(here);
        if spot.manhattan(&here) > self.config.reach || !self.grid.is_walkable(&spot) {
            self.interaction_failed(actor, format!("{} cannot be dropped at {}", item, spot));
            return;
        }

        if let Some(found) = self.registry.items.get_mut(item) {
            found.footprint = Some(Rect::point(spot));
            found.holder = None;
        }
        if let Some(entity) = self.registry.entities.get_mut(actor) {
            entity.inventory_mut().remove(item);
        }
        log::debug!("{} dropped {} at {}", actor, item, spot);
        let event = Event::ItemDropped {
            item: item.to_string(),
            by: actor.to_string(),
            at: spot,
        };
        self.notify(Address::entity(actor), event.clone());
        self.notify(Address::External, event);
    }

    fn flush_removals(&mut self) {
        for target in self.registry.take_removals() {
            let removed = match &target {
                Address::Entity(name) => self.remove_entity(name),
                Address::Item(name) => self.remove_item(name),
                Address::Zone(name) => self.remove_zone(name),
                Address::Passage(name) => {
                    let removed = self.registry.passages.remove(name).is_some();
                    self.registry.rebuild_adjacency();
                    removed
                }
                other => {
                    log::warn!("{} cannot be destroyed", other);
                    false
                }
            };
            if removed {
                log::debug!("destroyed {}", target);
                self.notify(Address::External, Event::Destroyed { target });
            }
        }
    }

    /// Carried items fall where the entity last stood.
    fn remove_entity(&mut self, name: &str) -> bool {
        let Some(mut entity) = self.registry.entities.remove(name) else {
            return false;
        };
        let mut components = entity.take_components();
        for component in components.iter_mut() {
            component.deactivate();
        }
        entity.mark_active(false);

        let drop_at = entity.position().map(Rect::point);
        for item in entity.inventory() {
            if let Some(found) = self.registry.items.get_mut(item) {
                found.holder = None;
                found.footprint = drop_at;
            }
        }
        if let Some(zone) = entity.zone() {
            let left = Event::LeftZone {
                entity: name.to_string(),
                zone: zone.to_string(),
            };
            self.notify(Address::zone(zone), left);
        }
        if self.listener.as_deref() == Some(name) {
            self.listener = None;
        }
        true
    }

    fn remove_item(&mut self, name: &str) -> bool {
        let Some(item) = self.registry.items.remove(name) else {
            return false;
        };
        if let Some(holder) = item.holder.as_deref() {
            if let Some(entity) = self.registry.entities.get_mut(holder) {
                entity.inventory_mut().remove(name);
            }
        }
        true
    }

    /// Removing a zone also removes the passages leading into it.
    fn remove_zone(&mut self, name: &str) -> bool {
        if self.registry.zones.remove(name).is_none() {
            return false;
        }
        let doomed: Vec<String> = self
            .registry
            .passages
            .iter()
            .filter(|p| p.touches(name))
            .map(|p| p.name.clone())
            .collect();
        for passage in doomed {
            self.registry.passages.remove(&passage);
        }
        for entity in self.registry.entities.iter_mut() {
            if entity.zone() == Some(name) {
                entity.set_zone(None);
            }
        }
        self.registry.rebuild_adjacency();
        true
    }
}

impl WalkMap for World {
    fn in_bounds(&self, p: &Point) -> bool {
        self.grid.in_bounds(p)
    }

    /// Fixed furniture is as solid as terrain.
    fn terrain_walkable(&self, p: &Point) -> bool {
        self.grid.is_walkable(p) && self.registry.items.at_point(p, |i| !i.portable).is_none()
    }

    fn occupied(&self, p: &Point, mover: Option<&str>) -> bool {
        self.registry.entity_at(p, mover).is_some()
    }

    fn closed_passage(&self, p: &Point) -> bool {
        self.registry.passages.at_point(p, |ps| ps.is_closed()).is_some()
    }

    fn zone_name(&self, p: &Point) -> Option<&str> {
        self.registry.zone_at(p).map(|z| z.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use crate::geometry::Direction;
    use crate::kernel::InputAction;
    use crate::passage::{PassageKind, PassageState};
    use crate::zone::ZoneKind;

    /// Two 5x5 rooms joined by a door at (5, 2).
    fn two_rooms() -> World {
        let mut grid = TileGrid::new(11, 5);
        grid.fill(&Rect::new(0, 0, 4, 4), Terrain::Floor);
        grid.fill(&Rect::new(6, 0, 10, 4), Terrain::Floor);
        grid.fill(&Rect::new(5, 0, 5, 4), Terrain::Wall);
        grid.set(&Point::new(5, 2), Terrain::Threshold);
        let mut world = World::new("test", grid, WorldConfig::default());
        world.add_zone(Zone::new("hall", Rect::new(0, 0, 4, 4), ZoneKind::Indoor)).unwrap();
        world.add_zone(Zone::new("den", Rect::new(6, 0, 10, 4), ZoneKind::Indoor)).unwrap();
        world
            .add_passage(Passage::new(
                "door",
                Rect::new(5, 2, 5, 2),
                ["hall".into(), "den".into()],
                PassageKind::Door,
                PassageState::Closed,
            ))
            .unwrap();
        world
    }

    fn input(world: &mut World, action: InputAction) {
        world
            .send(
                Address::component("hero", Slot::Input),
                Message::command(Address::External, Command::Input(action)),
            )
            .unwrap();
    }

    /// Send an input action and run the two ticks it takes to reach physics
    /// and be carried out.
    fn press(world: &mut World, action: InputAction) {
        input(world, action);
        world.tick();
        world.tick();
    }

    fn kinds(world: &mut World) -> Vec<&'static str> {
        world.drain_outbound().iter().map(|(_, m)| m.kind()).collect()
    }

    #[test]
    fn test_spawn_sets_listener_and_zone() {
        let mut world = two_rooms();
        world.spawn(EntityBlueprint::player("hero", Point::new(1, 1))).unwrap();
        assert_eq!(world.listener(), Some("hero"));
        assert_eq!(world.zone_of("hero").map(|z| z.name.as_str()), Some("hall"));

        let err = world
            .spawn(EntityBlueprint::player("hero", Point::new(2, 2)))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateKey { table: "entity", .. }));
    }

    #[test]
    fn test_player_step_moves_one_tile() {
        let mut world = two_rooms();
        world.spawn(EntityBlueprint::player("hero", Point::new(1, 1))).unwrap();
        press(&mut world, InputAction::Step(Direction::East));
        assert_eq!(world.entity_position("hero"), Some(Point::new(2, 1)));
    }

    #[test]
    fn test_step_into_closed_door_bumps() {
        let mut world = two_rooms();
        world.spawn(EntityBlueprint::player("hero", Point::new(4, 2))).unwrap();
        world.drain_outbound();
        press(&mut world, InputAction::Step(Direction::East));
        assert_eq!(world.entity_position("hero"), Some(Point::new(4, 2)));
        let bumps: Vec<_> = world
            .drain_outbound()
            .into_iter()
            .filter_map(|(_, m)| match m.as_event() {
                Some(Event::Bumped { obstacle, .. }) => Some(obstacle.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(bumps, vec![Obstacle::Door("door".into())]);
    }

    #[test]
    fn test_interact_opens_door_and_walk_through() {
        let mut world = two_rooms();
        world.spawn(EntityBlueprint::player("hero", Point::new(4, 2))).unwrap();
        input(&mut world, InputAction::Interact);
        // input -> physics -> passage, one hop per tick
        for _ in 0..3 {
            world.tick();
        }
        assert!(world.find_passage("door").unwrap().is_open());

        press(&mut world, InputAction::Step(Direction::East));
        assert_eq!(world.zone_of("hero").map(|z| z.name.as_str()), Some("hall"));
        press(&mut world, InputAction::Step(Direction::East));
        assert_eq!(world.entity_position("hero"), Some(Point::new(6, 2)));
        assert_eq!(world.zone_of("hero").map(|z| z.name.as_str()), Some("den"));
    }

    #[test]
    fn test_privileged_send_rejected() {
        let mut world = two_rooms();
        world.spawn(EntityBlueprint::player("hero", Point::new(1, 1))).unwrap();
        let err = world
            .send(
                Address::World,
                Message::command(
                    Address::External,
                    Command::Teleport {
                        entity: "hero".into(),
                        to: None,
                    },
                ),
            )
            .unwrap_err();
        assert!(matches!(err, KernelError::Unauthorized { kind: "teleport", .. }));
        assert_eq!(world.entity_position("hero"), Some(Point::new(1, 1)));
    }

    #[test]
    fn test_destroy_is_deferred_and_drops_inventory() {
        let mut world = two_rooms();
        world.spawn(EntityBlueprint::player("hero", Point::new(1, 1))).unwrap();
        world
            .add_item(Item::new("key", "key", Rect::new(2, 1, 2, 1)).with_portable(true))
            .unwrap();
        input(&mut world, InputAction::PickUp);
        world.tick();
        assert!(world.find_entity("hero").unwrap().holds("key"));
        assert!(!world.find_item("key").unwrap().is_placed());

        world
            .send(
                Address::World,
                Message::command(
                    Address::Script("trap".into()),
                    Command::Destroy {
                        target: Address::entity("hero"),
                    },
                ),
            )
            .unwrap();
        assert!(world.find_entity("hero").is_some());
        world.drain_outbound();
        world.tick();
        assert!(world.find_entity("hero").is_none());
        assert_eq!(world.listener(), None);
        assert_eq!(
            world.find_item("key").unwrap().footprint,
            Some(Rect::point(Point::new(1, 1)))
        );
        assert!(kinds(&mut world).contains(&"destroyed"));
    }

    #[test]
    fn test_place_wall_blocks_step() {
        let mut world = two_rooms();
        world.spawn(EntityBlueprint::player("hero", Point::new(1, 1))).unwrap();
        assert!(world.place_wall(Point::new(1, 2)));
        assert!(!world.place_wall(Point::new(40, 40)));
        assert_eq!(world.placed_walls(), &[Point::new(1, 2)]);
        assert_eq!(world.step_blocker("hero", &Point::new(1, 2)), Some(Obstacle::Wall));
    }

    #[test]
    fn test_carried_radio_sounds_from_holder() {
        let mut world = two_rooms();
        world.spawn(EntityBlueprint::player("hero", Point::new(1, 1))).unwrap();
        world
            .add_item(
                Item::new("radio", "radio", Rect::point(Point::new(1, 2)))
                    .with_portable(true)
                    .with_sound(Some("static".into())),
            )
            .unwrap();
        world.tick();
        assert_eq!(world.find_item("radio").unwrap().heard(), Some(Obstruction::None));

        world
            .send(
                Address::World,
                Message::command(
                    Address::component("hero", Slot::Physics),
                    Command::PickUp { item: "radio".into() },
                ),
            )
            .unwrap();
        let radio = world.find_item("radio").unwrap();
        assert_eq!(radio.holder.as_deref(), Some("hero"));
        assert_eq!(world.item_position(radio), Some(Point::new(1, 1)));
        assert_eq!(world.sound_levels().len(), 1);
    }

    #[test]
    fn test_teardown_empties_registries() {
        let mut world = two_rooms();
        world
            .spawn(EntityBlueprint::npc("rat", Point::new(7, 1), false, None).with_kind(EntityKind::Creature))
            .unwrap();
        world.teardown();
        assert!(world.registry().entities.is_empty());
        assert!(world.registry().zones.is_empty());
        assert!(world.drain_outbound().is_empty());
    }
}
