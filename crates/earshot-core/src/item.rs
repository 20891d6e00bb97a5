//! Placed objects: furniture, props and things that can be carried.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::kernel::{Address, Command, Event, Mailbox, Mailboxed, Message, Outbox};
use crate::obstruction::Obstruction;

#[derive(Debug, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    /// Free-form type tag from the map ("chair", "radio", ...).
    pub kind: String,
    /// `None` while carried.
    pub footprint: Option<Rect>,
    /// Counts as a wall for sound obstruction (shelving, partitions).
    pub is_wall: bool,
    pub portable: bool,
    /// Looping sound the item emits while active. A carried item sounds
    /// from its holder's tile.
    pub sound: Option<String>,
    pub active: bool,
    /// Entity carrying the item.
    pub holder: Option<String>,
    /// Category last announced to the host; `None` while silent.
    #[serde(skip)]
    heard: Option<Obstruction>,
    #[serde(skip)]
    mailbox: Mailbox,
}

impl Item {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, footprint: Rect) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            footprint: Some(footprint.normalized()),
            is_wall: false,
            portable: false,
            sound: None,
            active: false,
            holder: None,
            heard: None,
            mailbox: Mailbox::new(),
        }
    }

    pub fn with_wall(mut self, is_wall: bool) -> Self {
        self.is_wall = is_wall;
        self
    }

    pub fn with_portable(mut self, portable: bool) -> Self {
        self.portable = portable;
        self
    }

    pub fn with_sound(mut self, sound: Option<String>) -> Self {
        self.active = sound.is_some();
        self.sound = sound;
        self
    }

    pub fn is_placed(&self) -> bool {
        self.footprint.is_some()
    }

    pub fn is_sounding(&self) -> bool {
        self.active && self.sound.is_some()
    }

    pub fn heard(&self) -> Option<Obstruction> {
        self.heard
    }

    pub(crate) fn set_heard(&mut self, category: Option<Obstruction>) {
        self.heard = category;
    }

    pub fn activate(&mut self) {
        self.mailbox.activate();
    }

    pub fn handle(&mut self, message: &Message, outbox: &mut Outbox) {
        if let Some(Command::QueryObstruction) = message.as_command() {
            // classified at the end of every tick; silent items are out of earshot
            let report = Event::ObstructionReport {
                source: self.name.clone(),
                category: self.heard.unwrap_or(Obstruction::Far),
            };
            outbox.send(message.sender().clone(), Message::event(self.address(), report));
            return;
        }
        if let Some(Command::Use) = message.as_command() {
            self.active = !self.active;
            log::debug!("item '{}' used by {}, active={}", self.name, message.sender(), self.active);
            let event = Event::ItemUsed {
                item: self.name.clone(),
                by: message.sender().clone(),
                active: self.active,
            };
            outbox.send(message.sender().clone(), Message::event(self.address(), event.clone()));
            outbox.send(Address::External, Message::event(self.address(), event));
        }
    }
}

impl Mailboxed for Item {
    fn address(&self) -> Address {
        Address::item(&self.name)
    }

    fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.mailbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_toggles_active() {
        let mut radio = Item::new("radio", "radio", Rect::new(1, 1, 1, 1))
            .with_sound(Some("static".into()));
        radio.activate();
        assert!(radio.active);

        let mut outbox = Outbox::new();
        radio.handle(&Message::command(Address::entity("hero"), Command::Use), &mut outbox);
        assert!(!radio.active);
        assert_eq!(outbox.len(), 2);
    }

    #[test]
    fn test_query_reports_last_heard_category() {
        let mut stove = Item::new("stove", "stove", Rect::new(1, 1, 1, 1))
            .with_sound(Some("crackle".into()));
        let asker = Address::Script("narrator".into());
        let query = Message::command(asker.clone(), Command::QueryObstruction);

        let mut outbox = Outbox::new();
        stove.handle(&query, &mut outbox);
        stove.set_heard(Some(Obstruction::Door));
        stove.handle(&query, &mut outbox);

        let reports: Vec<_> = outbox
            .into_inner()
            .into_iter()
            .map(|(to, m)| {
                assert_eq!(to, asker);
                match m.as_event() {
                    Some(Event::ObstructionReport { category, .. }) => *category,
                    other => panic!("unexpected {:?}", other),
                }
            })
            .collect();
        assert_eq!(reports, vec![Obstruction::Far, Obstruction::Door]);
    }

    #[test]
    fn test_other_commands_ignored() {
        let mut chair = Item::new("chair", "chair", Rect::new(1, 1, 1, 1));
        let mut outbox = Outbox::new();
        chair.handle(&Message::command(Address::External, Command::Open), &mut outbox);
        assert!(outbox.is_empty());
        assert!(chair.is_placed());
        assert!(!chair.portable);
    }
}
