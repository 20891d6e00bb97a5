//! Entities and the component capability interface.
//!
//! An entity is a name, a footprint, an inventory and an ordered list of
//! components. Components never call each other: they talk through messages,
//! either directly (`Address::Component`) or through their owner's inner bus
//! (`Address::Entity`), which copies every message the entity receives into
//! each component's mailbox except the one that produced it.

use std::collections::BTreeSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::components::{self, AiState, ComponentState, InputState, PhysicsState, SoundRole, SoundState};
use crate::geometry::{Point, Rect};
use crate::kernel::{dispatch, Address, Command, Event, Mailbox, Mailboxed, Message, MessageBody, Outbox};
use crate::registry::{Named, Placed};
use crate::world::World;

/// Capability slot of a component. Declaration order is activation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Sound,
    Input,
    Physics,
    Ai,
}

impl Slot {
    pub const ACTIVATION_ORDER: [Slot; 4] = [Slot::Sound, Slot::Input, Slot::Physics, Slot::Ai];
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Slot::Sound => "sound",
            Slot::Input => "input",
            Slot::Physics => "physics",
            Slot::Ai => "ai",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    #[default]
    Npc,
    Creature,
}

/// What a component sees while it runs: a read-only world, its own identity,
/// and an outbox for everything it wants to change.
pub struct Context<'a> {
    pub world: &'a World,
    owner: &'a str,
    slot: Slot,
    outbox: &'a mut Outbox,
}

impl<'a> Context<'a> {
    pub fn new(world: &'a World, owner: &'a str, slot: Slot, outbox: &'a mut Outbox) -> Self {
        Self {
            world,
            owner,
            slot,
            outbox,
        }
    }

    pub fn owner(&self) -> &str {
        self.owner
    }

    pub fn address(&self) -> Address {
        Address::component(self.owner, self.slot)
    }

    /// The owner's current tile, if it is anywhere.
    pub fn position(&self) -> Option<Point> {
        self.world.entity_position(self.owner)
    }

    pub fn send(&mut self, to: Address, body: MessageBody) {
        let message = Message::new(self.address(), body);
        self.outbox.send(to, message);
    }

    pub fn command(&mut self, to: Address, command: Command) {
        self.send(to, MessageBody::Command(command));
    }

    pub fn event(&mut self, to: Address, event: Event) {
        self.send(to, MessageBody::Event(event));
    }

    /// Command a sibling component directly.
    pub fn command_sibling(&mut self, slot: Slot, command: Command) {
        let to = Address::component(self.owner, slot);
        self.command(to, command);
    }

    /// Publish an event on the owner's inner bus.
    pub fn tell_owner(&mut self, event: Event) {
        let to = Address::entity(self.owner);
        self.event(to, event);
    }
}

/// Capability interface implemented by every component variant.
pub trait Component: Mailboxed + std::fmt::Debug {
    fn slot(&self) -> Slot;

    /// Bind the component to its owning entity.
    fn attach(&mut self, owner: &str);

    fn activate(&mut self, _ctx: &mut Context<'_>) {
        self.mailbox_mut().activate();
    }

    fn deactivate(&mut self) {
        self.mailbox_mut().deactivate();
    }

    fn handle(&mut self, message: &Message, ctx: &mut Context<'_>);

    /// Advance multi-tick state (walking, fades). Runs once per tick after
    /// the message, if any, has been handled.
    fn advance(&mut self, _ctx: &mut Context<'_>) {}

    fn tick(&mut self, ctx: &mut Context<'_>) {
        dispatch(self, |component, message| component.handle(message, ctx));
        self.advance(ctx);
    }

    /// Persistable state, enough to rebuild the component with
    /// [`components::build`].
    fn state(&self) -> ComponentState;
}

/// Owner name and mailbox shared by every component implementation.
#[derive(Debug, Default)]
pub struct ComponentCore {
    pub owner: String,
    pub mailbox: Mailbox,
}

#[derive(Debug)]
pub struct Entity {
    name: String,
    pub kind: EntityKind,
    footprint: Option<Rect>,
    /// Zone the entity was last seen in; maintained by the world on moves.
    zone: Option<String>,
    inventory: BTreeSet<String>,
    components: Vec<Box<dyn Component>>,
    mailbox: Mailbox,
    active: bool,
}

impl Entity {
    /// Build an entity from an ordered component list. `None` entries are
    /// skipped.
    pub fn new(
        name: impl Into<String>,
        kind: EntityKind,
        components: Vec<Option<Box<dyn Component>>>,
    ) -> Self {
        let name = name.into();
        let components: Vec<Box<dyn Component>> = components
            .into_iter()
            .flatten()
            .map(|mut c| {
                c.attach(&name);
                c
            })
            .collect();
        Self {
            name,
            kind,
            footprint: None,
            zone: None,
            inventory: BTreeSet::new(),
            components,
            mailbox: Mailbox::new(),
            active: false,
        }
    }

    pub fn with_footprint(mut self, footprint: Option<Rect>) -> Self {
        self.footprint = footprint;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn footprint(&self) -> Option<Rect> {
        self.footprint
    }

    pub fn position(&self) -> Option<Point> {
        self.footprint.map(|f| f.origin())
    }

    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    pub fn inventory(&self) -> &BTreeSet<String> {
        &self.inventory
    }

    pub fn holds(&self, item: &str) -> bool {
        self.inventory.contains(item)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn components(&self) -> impl Iterator<Item = &dyn Component> {
        self.components.iter().map(|c| c.as_ref())
    }

    pub fn component(&self, slot: Slot) -> Option<&dyn Component> {
        self.components().find(|c| c.slot() == slot)
    }

    pub(crate) fn component_mut(&mut self, slot: Slot) -> Option<&mut Box<dyn Component>> {
        self.components.iter_mut().find(|c| c.slot() == slot)
    }

    pub(crate) fn set_footprint(&mut self, footprint: Option<Rect>) {
        self.footprint = footprint;
    }

    pub(crate) fn set_zone(&mut self, zone: Option<String>) {
        self.zone = zone;
    }

    pub(crate) fn inventory_mut(&mut self) -> &mut BTreeSet<String> {
        &mut self.inventory
    }

    pub(crate) fn take_components(&mut self) -> Vec<Box<dyn Component>> {
        std::mem::take(&mut self.components)
    }

    pub(crate) fn restore_components(&mut self, components: Vec<Box<dyn Component>>) {
        self.components = components;
    }

    pub(crate) fn mark_active(&mut self, active: bool) {
        self.active = active;
        if active {
            self.mailbox.activate();
        } else {
            self.mailbox.deactivate();
        }
    }

    pub fn record(&self) -> EntityRecord {
        EntityRecord {
            name: self.name.clone(),
            kind: self.kind,
            footprint: self.footprint,
            inventory: self.inventory.iter().cloned().collect(),
            active: self.active,
            components: self.components.iter().map(|c| c.state()).collect(),
        }
    }

    pub fn from_record(record: EntityRecord) -> Self {
        let components = record
            .components
            .iter()
            .map(|state| Some(components::build(state)))
            .collect();
        let mut entity = Entity::new(record.name, record.kind, components).with_footprint(record.footprint);
        entity.inventory = record.inventory.into_iter().collect();
        entity.active = record.active;
        entity
    }
}

impl Mailboxed for Entity {
    fn address(&self) -> Address {
        Address::entity(&self.name)
    }

    fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.mailbox
    }
}

impl Named for Entity {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Placed for Entity {
    fn footprint(&self) -> Option<Rect> {
        self.footprint
    }
}

/// Start components in slot order (sound, input, physics, AI) regardless of
/// their list order.
pub(crate) fn activate_components(
    owner: &str,
    components: &mut [Box<dyn Component>],
    world: &World,
    outbox: &mut Outbox,
) {
    for slot in Slot::ACTIVATION_ORDER {
        for component in components.iter_mut().filter(|c| c.slot() == slot) {
            let mut ctx = Context::new(world, owner, slot, outbox);
            component.activate(&mut ctx);
        }
    }
}

/// One entity tick: copy the dequeued entity message (if any) onto the inner
/// bus, then tick every component in list order.
pub(crate) fn tick_components(
    owner: &str,
    components: &mut [Box<dyn Component>],
    inbound: Option<Rc<Message>>,
    world: &World,
    outbox: &mut Outbox,
) {
    if let Some(message) = inbound {
        log::trace!("entity:{} redistributes {} from {}", owner, message.kind(), message.sender());
        for component in components.iter_mut() {
            component.post(Rc::clone(&message));
        }
    }
    for component in components.iter_mut() {
        let slot = component.slot();
        let mut ctx = Context::new(world, owner, slot, outbox);
        component.tick(&mut ctx);
    }
}

/// Serializable entity snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    pub kind: EntityKind,
    pub footprint: Option<Rect>,
    pub inventory: Vec<String>,
    pub active: bool,
    pub components: Vec<ComponentState>,
}

/// Recipe the factory turns into a live, registered, activated entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBlueprint {
    pub name: String,
    pub kind: EntityKind,
    pub at: Option<Point>,
    pub components: Vec<ComponentState>,
}

impl EntityBlueprint {
    /// The player: ears, keyboard, legs.
    pub fn player(name: impl Into<String>, at: Point) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::Player,
            at: Some(at),
            components: vec![
                ComponentState::Sound(SoundState::new(SoundRole::Listener)),
                ComponentState::Input(InputState::default()),
                ComponentState::Physics(PhysicsState::default()),
            ],
        }
    }

    /// A non-player character, optionally wandering and optionally audible.
    pub fn npc(name: impl Into<String>, at: Point, wander: bool, sound: Option<String>) -> Self {
        let name = name.into();
        let mut components = Vec::new();
        if let Some(sound) = sound {
            components.push(ComponentState::Sound(SoundState::new(SoundRole::Emitter { sound })));
        }
        components.push(ComponentState::Physics(PhysicsState::default()));
        if wander {
            components.push(ComponentState::Ai(AiState::seeded(seed_from_name(&name))));
        }
        Self {
            name,
            kind: EntityKind::Npc,
            at: Some(at),
            components,
        }
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn into_record(self) -> EntityRecord {
        EntityRecord {
            name: self.name,
            kind: self.kind,
            footprint: self.at.map(Rect::point),
            inventory: Vec::new(),
            active: true,
            components: self.components,
        }
    }
}

/// Stable seed for an entity's random choices (FNV-1a over the name).
pub fn seed_from_name(name: &str) -> u64 {
    name.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Physics, PlayerInput, SoundComponent};

    #[test]
    fn test_none_components_filtered_and_attached() {
        let entity = Entity::new(
            "hero",
            EntityKind::Player,
            vec![
                None,
                Some(Box::new(PlayerInput::new()) as Box<dyn Component>),
                None,
                Some(Box::new(Physics::new()) as Box<dyn Component>),
            ],
        );
        assert_eq!(entity.components().count(), 2);
        let input = entity.component(Slot::Input).unwrap();
        assert_eq!(input.address(), Address::component("hero", Slot::Input));
        assert!(entity.component(Slot::Ai).is_none());
    }

    #[test]
    fn test_record_round_trip_preserves_layout() {
        let mut entity = Entity::new(
            "guard",
            EntityKind::Npc,
            vec![
                Some(Box::new(SoundComponent::new(SoundRole::Emitter {
                    sound: "steps".into(),
                })) as Box<dyn Component>),
                Some(Box::new(Physics::new()) as Box<dyn Component>),
            ],
        )
        .with_footprint(Some(Rect::point(Point::new(3, 4))));
        entity.inventory_mut().insert("key".into());

        let record = entity.record();
        let rebuilt = Entity::from_record(record.clone());
        assert_eq!(rebuilt.record(), record);
        assert_eq!(rebuilt.position(), Some(Point::new(3, 4)));
        assert!(rebuilt.holds("key"));
    }

    #[test]
    fn test_npc_blueprint_layout() {
        let bp = EntityBlueprint::npc("cat", Point::new(1, 1), true, Some("purr".into()));
        let slots: Vec<_> = bp.components.iter().map(|c| c.slot()).collect();
        assert_eq!(slots, vec![Slot::Sound, Slot::Physics, Slot::Ai]);
    }

    #[test]
    fn test_seed_is_stable() {
        assert_eq!(seed_from_name("guard"), seed_from_name("guard"));
        assert_ne!(seed_from_name("guard"), seed_from_name("cook"));
    }
}
