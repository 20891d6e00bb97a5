//! Passages (doors and gates) connecting exactly two zones.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::kernel::{Address, Command, Event, Mailbox, Mailboxed, Message, Outbox};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassageKind {
    #[default]
    Door,
    Gate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassageState {
    #[default]
    Open,
    Closed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Passage {
    pub name: String,
    pub area: Rect,
    /// The two zones this passage joins, in map order.
    pub zones: [String; 2],
    pub kind: PassageKind,
    pub state: PassageState,
    pub openable: bool,
    #[serde(skip)]
    mailbox: Mailbox,
}

impl Passage {
    pub fn new(
        name: impl Into<String>,
        area: Rect,
        zones: [String; 2],
        kind: PassageKind,
        state: PassageState,
    ) -> Self {
        Self {
            name: name.into(),
            area: area.normalized(),
            zones,
            kind,
            state,
            openable: true,
            mailbox: Mailbox::new(),
        }
    }

    pub fn with_openable(mut self, openable: bool) -> Self {
        self.openable = openable;
        self
    }

    pub fn is_open(&self) -> bool {
        self.state == PassageState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state == PassageState::Closed
    }

    /// Closed for good: nothing can ever pass.
    pub fn is_sealed(&self) -> bool {
        self.is_closed() && !self.openable
    }

    pub fn touches(&self, zone: &str) -> bool {
        self.zones.iter().any(|z| z == zone)
    }

    /// Whether this passage joins `a` and `b` (in either order).
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.zones[0] == a && self.zones[1] == b) || (self.zones[0] == b && self.zones[1] == a)
    }

    pub fn other_side(&self, zone: &str) -> Option<&str> {
        if self.zones[0] == zone {
            Some(&self.zones[1])
        } else if self.zones[1] == zone {
            Some(&self.zones[0])
        } else {
            None
        }
    }

    /// Move to `target`. Returns whether the state changed, or the reason it
    /// cannot.
    pub fn set_state(&mut self, target: PassageState) -> Result<bool, String> {
        if self.state == target {
            return Ok(false);
        }
        if !self.openable {
            return Err(format!("{} cannot be opened or closed", self.name));
        }
        self.state = target;
        Ok(true)
    }

    pub fn activate(&mut self) {
        self.mailbox.activate();
    }

    pub fn handle(&mut self, message: &Message, outbox: &mut Outbox) {
        let target = match message.as_command() {
            Some(Command::Open) => PassageState::Open,
            Some(Command::Close) => PassageState::Closed,
            Some(Command::Toggle) => match self.state {
                PassageState::Open => PassageState::Closed,
                PassageState::Closed => PassageState::Open,
            },
            _ => return,
        };

        match self.set_state(target) {
            Ok(true) => {
                log::debug!("passage '{}' is now {:?}", self.name, self.state);
                let event = match self.state {
                    PassageState::Open => Event::PassageOpened {
                        passage: self.name.clone(),
                    },
                    PassageState::Closed => Event::PassageClosed {
                        passage: self.name.clone(),
                    },
                };
                for zone in &self.zones {
                    outbox.send(Address::zone(zone), Message::event(self.address(), event.clone()));
                }
                outbox.send(Address::External, Message::event(self.address(), event));
            }
            Ok(false) => {}
            Err(reason) => {
                log::warn!("{}", reason);
                outbox.send(
                    message.sender().clone(),
                    Message::event(self.address(), Event::InteractionFailed { reason }),
                );
            }
        }
    }
}

impl Mailboxed for Passage {
    fn address(&self) -> Address {
        Address::passage(&self.name)
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

    fn door(state: PassageState) -> Passage {
        let mut door = Passage::new(
            "oak_door",
            Rect::new(5, 2, 5, 2),
            ["hall".to_string(), "yard".to_string()],
            PassageKind::Door,
            state,
        );
        door.activate();
        door
    }

    #[test]
    fn test_connects_is_symmetric() {
        let d = door(PassageState::Open);
        assert!(d.connects("hall", "yard"));
        assert!(d.connects("yard", "hall"));
        assert!(!d.connects("hall", "cellar"));
        assert_eq!(d.other_side("yard"), Some("hall"));
        assert_eq!(d.other_side("cellar"), None);
    }

    #[test]
    fn test_toggle_notifies_zones_and_host() {
        let mut d = door(PassageState::Closed);
        let mut outbox = Outbox::new();
        d.handle(&Message::command(Address::entity("hero"), Command::Toggle), &mut outbox);

        assert!(d.is_open());
        let sent = outbox.into_inner();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|(_, m)| m.kind() == "passage_opened"));
        assert_eq!(sent[2].0, Address::External);
    }

    #[test]
    fn test_sealed_passage_refuses() {
        let mut d = door(PassageState::Closed).with_openable(false);
        assert!(d.is_sealed());
        let mut outbox = Outbox::new();
        d.handle(&Message::command(Address::entity("hero"), Command::Open), &mut outbox);

        assert!(d.is_closed());
        let sent = outbox.into_inner();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Address::entity("hero"));
        assert_eq!(sent[0].1.kind(), "interaction_failed");
    }

    #[test]
    fn test_redundant_open_is_silent() {
        let mut d = door(PassageState::Open);
        let mut outbox = Outbox::new();
        d.handle(&Message::command(Address::External, Command::Open), &mut outbox);
        assert!(outbox.is_empty());
    }
}
