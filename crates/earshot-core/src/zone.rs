//! Zones: named regions of the map with their own ambience.
//!
//! A zone's neighbor set and membership lists are derived data. Neighbors are
//! rebuilt from passages whenever the passage table changes; membership is
//! recomputed from spatial containment on every zone update.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::kernel::{Address, Event, Mailbox, Mailboxed, Message, Outbox};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    #[default]
    Indoor,
    Outdoor,
}

/// Background loop descriptor handed to the audio layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ambience {
    pub sound: Option<String>,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_volume() -> f32 {
    1.0
}

impl Default for Ambience {
    fn default() -> Self {
        Self {
            sound: None,
            volume: default_volume(),
        }
    }
}

/// Names of what currently stands inside a zone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    pub entities: Vec<String>,
    pub items: Vec<String>,
    pub passages: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub friendly_name: String,
    pub area: Rect,
    pub kind: ZoneKind,
    pub ambience: Ambience,
    #[serde(skip)]
    neighbors: BTreeSet<String>,
    #[serde(skip)]
    members: Membership,
    #[serde(skip)]
    mailbox: Mailbox,
}

impl Zone {
    pub fn new(name: impl Into<String>, area: Rect, kind: ZoneKind) -> Self {
        let name = name.into();
        Self {
            friendly_name: name.clone(),
            name,
            area: area.normalized(),
            kind,
            ambience: Ambience::default(),
            neighbors: BTreeSet::new(),
            members: Membership::default(),
            mailbox: Mailbox::new(),
        }
    }

    pub fn with_friendly_name(mut self, friendly_name: impl Into<String>) -> Self {
        self.friendly_name = friendly_name.into();
        self
    }

    pub fn with_ambience(mut self, ambience: Ambience) -> Self {
        self.ambience = ambience;
        self
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &str> {
        self.neighbors.iter().map(String::as_str)
    }

    pub fn is_neighbor(&self, other: &str) -> bool {
        self.neighbors.contains(other)
    }

    pub(crate) fn clear_neighbors(&mut self) {
        self.neighbors.clear();
    }

    pub(crate) fn add_neighbor(&mut self, other: &str) {
        if other != self.name {
            self.neighbors.insert(other.to_string());
        }
    }

    pub fn members(&self) -> &Membership {
        &self.members
    }

    pub(crate) fn set_members(&mut self, members: Membership) {
        self.members = members;
    }

    pub fn activate(&mut self) {
        self.mailbox.activate();
    }

    /// Handle one message. `listener` is the entity whose ears the audio
    /// layer renders from.
    pub fn handle(&mut self, message: &Message, listener: Option<&str>, outbox: &mut Outbox) {
        let Some(event) = message.as_event() else {
            return;
        };
        match event {
            Event::EnteredZone { entity, zone } if *zone == self.name => {
                log::debug!("{} entered zone '{}'", entity, self.name);
                if listener == Some(entity.as_str()) {
                    outbox.send(
                        Address::External,
                        Message::event(
                            self.address(),
                            Event::AmbienceChanged {
                                zone: self.name.clone(),
                                ambience: self.ambience.clone(),
                            },
                        ),
                    );
                }
                for neighbor in &self.neighbors {
                    outbox.send(
                        Address::zone(neighbor),
                        Message::event(
                            self.address(),
                            Event::NeighborEntered {
                                zone: self.name.clone(),
                                entity: entity.clone(),
                            },
                        ),
                    );
                }
            }
            Event::LeftZone { entity, zone } if *zone == self.name => {
                log::debug!("{} left zone '{}'", entity, self.name);
            }
            Event::NeighborEntered { zone, entity } => {
                log::trace!("zone '{}': {} entered neighbor '{}'", self.name, entity, zone);
            }
            Event::PassageOpened { passage } | Event::PassageClosed { passage } => {
                log::trace!("zone '{}': passage '{}' changed", self.name, passage);
            }
            Event::Reloaded => self.members = Membership::default(),
            _ => {}
        }
    }
}

impl Mailboxed for Zone {
    fn address(&self) -> Address {
        Address::zone(&self.name)
    }

    fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.mailbox
    }
}
