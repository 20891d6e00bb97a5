//! Message kernel: addresses, messages, mailboxes and dispatch.
//!
//! Every live object (zone, passage, item, entity, component) owns one
//! [`Mailbox`]. Senders never call into a receiver directly; they append a
//! [`Message`] to its mailbox and the receiver handles at most one message per
//! tick. Handlers write follow-up messages into an [`Outbox`] that the world
//! routes once the handler returns, so no object is ever re-entered.
//!
//! Two delivery rules apply to every mailbox:
//! - a disabled (deactivated) mailbox accepts nothing;
//! - a message whose sender is the mailbox owner is dropped, unless its kind
//!   is whitelisted to loop back (cutscene lifecycle notifications).

use std::collections::VecDeque;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::entity::Slot;
use crate::geometry::{Direction, Point};
use crate::obstruction::Obstruction;
use crate::zone::Ambience;

/// Stable, serializable reference to a message endpoint. Objects are named by
/// their registry keys; live handles are only resolved during routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    /// The world itself (registry mutations, privileged commands).
    World,
    /// The audio/UI host outside the core.
    External,
    /// A scripted layer (dialogue, cutscenes) identified by name.
    Script(String),
    Entity(String),
    Component(String, Slot),
    Zone(String),
    Passage(String),
    Item(String),
}

impl Address {
    pub fn entity(name: impl Into<String>) -> Self {
        Address::Entity(name.into())
    }

    pub fn component(owner: impl Into<String>, slot: Slot) -> Self {
        Address::Component(owner.into(), slot)
    }

    pub fn zone(name: impl Into<String>) -> Self {
        Address::Zone(name.into())
    }

    pub fn passage(name: impl Into<String>) -> Self {
        Address::Passage(name.into())
    }

    pub fn item(name: impl Into<String>) -> Self {
        Address::Item(name.into())
    }

    /// The entity this address belongs to, for entity and component addresses.
    pub fn owning_entity(&self) -> Option<&str> {
        match self {
            Address::Entity(name) | Address::Component(name, _) => Some(name),
            _ => None,
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::World => write!(f, "world"),
            Address::External => write!(f, "external"),
            Address::Script(name) => write!(f, "script:{}", name),
            Address::Entity(name) => write!(f, "entity:{}", name),
            Address::Component(name, slot) => write!(f, "component:{}/{}", name, slot),
            Address::Zone(name) => write!(f, "zone:{}", name),
            Address::Passage(name) => write!(f, "passage:{}", name),
            Address::Item(name) => write!(f, "item:{}", name),
        }
    }
}

/// Player-level intents produced by the (external) keybinding layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputAction {
    Step(Direction),
    /// Open or close the nearest door within reach.
    Interact,
    /// Pick up the nearest portable item within reach.
    PickUp,
    Drop(String),
    Halt,
}

/// What a blocked step ran into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Obstacle {
    Wall,
    Door(String),
    Object(String),
    Entity(String),
    /// Void or out of bounds.
    Edge,
}

/// Requests. Most are addressed to an entity or component; `Place`,
/// `Teleport`, `Destroy`, `PickUp` and `Drop` are addressed to the world.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Walk to the first reachable point, in priority order.
    GoTo {
        points: Vec<Point>,
        threshold: u32,
        watch: Option<String>,
    },
    /// Walk up to an actor and keep watching it.
    Follow { actor: String },
    Stop,
    Step { direction: Direction },
    /// Toggle the named passage, or the nearest one within reach.
    UseDoor { passage: Option<String> },
    Input(InputAction),
    Open,
    Close,
    Toggle,
    Use,
    QueryObstruction,
    Place { to: Point },
    Teleport { entity: String, to: Option<Point> },
    Destroy { target: Address },
    PickUp { item: String },
    Drop { item: String, at: Option<Point> },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::GoTo { .. } => "go_to",
            Command::Follow { .. } => "follow",
            Command::Stop => "stop",
            Command::Step { .. } => "step",
            Command::UseDoor { .. } => "use_door",
            Command::Input(_) => "input",
            Command::Open => "open",
            Command::Close => "close",
            Command::Toggle => "toggle",
            Command::Use => "use",
            Command::QueryObstruction => "query_obstruction",
            Command::Place { .. } => "place",
            Command::Teleport { .. } => "teleport",
            Command::Destroy { .. } => "destroy",
            Command::PickUp { .. } => "pick_up",
            Command::Drop { .. } => "drop",
        }
    }
}

/// Notifications of something that already happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    EnteredZone { entity: String, zone: String },
    LeftZone { entity: String, zone: String },
    /// Sent to each neighbor of `zone` when `entity` enters it.
    NeighborEntered { zone: String, entity: String },
    Moved { entity: String, at: Point },
    Collision { with: Option<String>, at: Point },
    Bumped { entity: String, at: Point, obstacle: Obstacle },
    Arrived { entity: String, at: Point },
    PathNotFound { entity: String },
    /// A walk in progress was cancelled by `Stop` or a teleport.
    Stopped { entity: String },
    PassageOpened { passage: String },
    PassageClosed { passage: String },
    InteractionFailed { reason: String },
    ItemPickedUp { item: String, by: String },
    ItemDropped { item: String, by: String, at: Point },
    ItemUsed { item: String, by: Address, active: bool },
    ObstructionChanged { source: String, category: Obstruction },
    ObstructionReport { source: String, category: Obstruction },
    AmbienceChanged { zone: String, ambience: Ambience },
    Destroyed { target: Address },
    Reloaded,
    CutsceneStarted { name: String },
    CutsceneEnded { name: String },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::EnteredZone { .. } => "entered_zone",
            Event::LeftZone { .. } => "left_zone",
            Event::NeighborEntered { .. } => "neighbor_entered",
            Event::Moved { .. } => "moved",
            Event::Collision { .. } => "collision",
            Event::Bumped { .. } => "bumped",
            Event::Arrived { .. } => "arrived",
            Event::PathNotFound { .. } => "path_not_found",
            Event::Stopped { .. } => "stopped",
            Event::PassageOpened { .. } => "passage_opened",
            Event::PassageClosed { .. } => "passage_closed",
            Event::InteractionFailed { .. } => "interaction_failed",
            Event::ItemPickedUp { .. } => "item_picked_up",
            Event::ItemDropped { .. } => "item_dropped",
            Event::ItemUsed { .. } => "item_used",
            Event::ObstructionChanged { .. } => "obstruction_changed",
            Event::ObstructionReport { .. } => "obstruction_report",
            Event::AmbienceChanged { .. } => "ambience_changed",
            Event::Destroyed { .. } => "destroyed",
            Event::Reloaded => "reloaded",
            Event::CutsceneStarted { .. } => "cutscene_started",
            Event::CutsceneEnded { .. } => "cutscene_ended",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Command(Command),
    Event(Event),
}

/// An immutable tagged record. Fields are private so a message cannot change
/// once built; mailboxes share it behind an `Rc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    sender: Address,
    body: MessageBody,
}

impl Message {
    pub fn new(sender: Address, body: MessageBody) -> Self {
        Self { sender, body }
    }

    pub fn command(sender: Address, command: Command) -> Self {
        Self::new(sender, MessageBody::Command(command))
    }

    pub fn event(sender: Address, event: Event) -> Self {
        Self::new(sender, MessageBody::Event(event))
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn as_command(&self) -> Option<&Command> {
        match &self.body {
            MessageBody::Command(c) => Some(c),
            MessageBody::Event(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match &self.body {
            MessageBody::Event(e) => Some(e),
            MessageBody::Command(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.body {
            MessageBody::Command(c) => c.kind(),
            MessageBody::Event(e) => e.kind(),
        }
    }

    /// Kinds allowed back into their own sender's mailbox.
    pub fn may_loop_back(&self) -> bool {
        matches!(
            self.body,
            MessageBody::Event(Event::CutsceneStarted { .. } | Event::CutsceneEnded { .. })
        )
    }

    /// Reject privileged commands from senders that may not issue them.
    pub fn authorize(&self) -> Result<(), KernelError> {
        let allowed = match &self.body {
            MessageBody::Command(Command::Place { .. }) => {
                matches!(self.sender, Address::Component(_, Slot::Physics))
            }
            MessageBody::Command(Command::Teleport { .. } | Command::Destroy { .. }) => {
                matches!(self.sender, Address::World | Address::Script(_))
            }
            _ => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(KernelError::Unauthorized {
                kind: self.kind(),
                sender: self.sender.clone(),
            })
        }
    }
}

/// Outcome of posting a message. Only `Delivered` enqueues anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The target's messaging is disabled.
    Disabled,
    /// Sender and target are the same object.
    Suppressed,
    /// No object answers to the address.
    NoSuchTarget,
}

/// FIFO message queue owned by exactly one object.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: VecDeque<Rc<Message>>,
    enabled: bool,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable messaging on a fresh, empty queue.
    pub fn activate(&mut self) {
        self.queue.clear();
        self.enabled = true;
    }

    /// Disable messaging. Queued messages are kept for [`Mailbox::resume`].
    pub fn deactivate(&mut self) {
        self.enabled = false;
    }

    /// Re-enable messaging without discarding the backlog.
    pub fn resume(&mut self) {
        self.enabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Append `message` unless messaging is disabled or it would loop back
    /// to `owner`.
    pub fn post(&mut self, owner: &Address, message: Rc<Message>) -> Delivery {
        if !self.enabled {
            return Delivery::Disabled;
        }
        if message.sender() == owner && !message.may_loop_back() {
            return Delivery::Suppressed;
        }
        self.queue.push_back(message);
        Delivery::Delivered
    }

    /// Dequeue the oldest message.
    pub fn pop(&mut self) -> Option<Rc<Message>> {
        self.queue.pop_front()
    }

    pub fn peek(&self) -> Option<&Message> {
        self.queue.front().map(|m| m.as_ref())
    }
}

/// Anything that owns a mailbox and can be addressed.
pub trait Mailboxed {
    fn address(&self) -> Address;
    fn mailbox(&self) -> &Mailbox;
    fn mailbox_mut(&mut self) -> &mut Mailbox;

    fn post(&mut self, message: Rc<Message>) -> Delivery {
        let owner = self.address();
        self.mailbox_mut().post(&owner, message)
    }
}

/// Dequeue at most one message from `target` and hand it to `handle`.
/// An empty mailbox is a no-op. Returns whether a message was handled.
pub fn dispatch<T, F>(target: &mut T, handle: F) -> bool
where
    T: Mailboxed + ?Sized,
    F: FnOnce(&mut T, &Message),
{
    match target.mailbox_mut().pop() {
        Some(message) => {
            log::trace!("{} <- {} from {}", target.address(), message.kind(), message.sender());
            handle(target, message.as_ref());
            true
        }
        None => false,
    }
}

/// Follow-up messages produced by a handler, routed after it returns.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<(Address, Message)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: Address, message: Message) {
        self.pending.push((to, message));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, (Address, Message)> {
        self.pending.drain(..)
    }

    pub fn into_inner(self) -> Vec<(Address, Message)> {
        self.pending
    }
}

/// Caller bugs detected by the kernel.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelError {
    Unauthorized { kind: &'static str, sender: Address },
}

impl std::fmt::Display for KernelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelError::Unauthorized { kind, sender } => {
                write!(f, "{} may not send privileged message '{}'", sender, kind)
            }
        }
    }
}

impl std::error::Error for KernelError {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        name: String,
        mailbox: Mailbox,
        seen: Vec<&'static str>,
    }

    impl Recorder {
        fn new(name: &str) -> Self {
            let mut mailbox = Mailbox::new();
            mailbox.activate();
            Self {
                name: name.to_string(),
                mailbox,
                seen: Vec::new(),
            }
        }
    }

    impl Mailboxed for Recorder {
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

    fn msg(sender: Address, command: Command) -> Rc<Message> {
        Rc::new(Message::command(sender, command))
    }

    #[test]
    fn test_fifo_one_per_dispatch() {
        let mut recorder = Recorder::new("a");
        recorder.post(msg(Address::External, Command::Open));
        recorder.post(msg(Address::External, Command::Close));
        recorder.post(msg(Address::External, Command::Toggle));

        for _ in 0..3 {
            assert!(dispatch(&mut recorder, |p, m| p.seen.push(m.kind())));
        }
        assert_eq!(recorder.seen, vec!["open", "close", "toggle"]);
        assert!(!dispatch(&mut recorder, |p, m| p.seen.push(m.kind())));
        assert_eq!(recorder.seen.len(), 3);
    }

    #[test]
    fn test_self_sent_message_dropped() {
        let mut recorder = Recorder::new("a");
        let delivery = recorder.post(msg(Address::entity("a"), Command::Stop));
        assert_eq!(delivery, Delivery::Suppressed);
        assert!(recorder.mailbox.is_empty());
    }

    #[test]
    fn test_cutscene_events_loop_back() {
        let mut recorder = Recorder::new("a");
        let started = Rc::new(Message::event(
            Address::entity("a"),
            Event::CutsceneStarted { name: "intro".into() },
        ));
        let ended = Rc::new(Message::event(
            Address::entity("a"),
            Event::CutsceneEnded { name: "intro".into() },
        ));
        assert_eq!(recorder.post(started), Delivery::Delivered);
        assert_eq!(recorder.post(ended), Delivery::Delivered);
        assert_eq!(recorder.mailbox.len(), 2);
    }

    #[test]
    fn test_deactivate_keeps_backlog_and_resume() {
        let mut recorder = Recorder::new("a");
        recorder.post(msg(Address::External, Command::Open));
        recorder.mailbox.deactivate();
        assert_eq!(recorder.post(msg(Address::External, Command::Close)), Delivery::Disabled);
        assert_eq!(recorder.mailbox.len(), 1);

        recorder.mailbox.resume();
        assert_eq!(recorder.mailbox.peek().map(|m| m.kind()), Some("open"));

        recorder.mailbox.activate();
        assert!(recorder.mailbox.is_empty());
    }

    #[test]
    fn test_privileged_commands() {
        let teleport = Command::Teleport {
            entity: "hero".into(),
            to: None,
        };
        assert!(Message::command(Address::Script("intro".into()), teleport.clone())
            .authorize()
            .is_ok());
        assert_eq!(
            Message::command(Address::External, teleport).authorize(),
            Err(KernelError::Unauthorized {
                kind: "teleport",
                sender: Address::External
            })
        );

        let place = Command::Place { to: Point::new(1, 1) };
        assert!(Message::command(Address::component("hero", Slot::Physics), place.clone())
            .authorize()
            .is_ok());
        assert!(Message::command(Address::component("hero", Slot::Ai), place)
            .authorize()
            .is_err());
    }
}
