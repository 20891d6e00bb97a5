//! Sound: the listener's ears, or an emitter that tracks how it is heard.
//!
//! An emitter classifies the line from the listener to itself every tick.
//! When the category changes it tells the audio host and starts fading its
//! gain toward the attenuation table's value for the new category.

use serde::{Deserialize, Serialize};

use super::ComponentState;
use crate::entity::{Component, ComponentCore, Context, Slot};
use crate::kernel::{Address, Command, Event, Mailbox, Mailboxed, Message};
use crate::obstruction::Obstruction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SoundRole {
    Listener,
    Emitter { sound: String },
}

/// Linear gain ramp advanced once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fade {
    pub start: f32,
    pub target: f32,
    pub elapsed: u32,
    pub duration: u32,
}

impl Fade {
    pub fn settled(gain: f32) -> Self {
        Self {
            start: gain,
            target: gain,
            elapsed: 0,
            duration: 0,
        }
    }

    pub fn value(&self) -> f32 {
        if self.elapsed >= self.duration {
            return self.target;
        }
        let t = self.elapsed as f32 / self.duration as f32;
        self.start + (self.target - self.start) * t
    }

    pub fn is_done(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Start a new ramp from the current value.
    pub fn retarget(&mut self, target: f32, duration: u32) {
        *self = Self {
            start: self.value(),
            target,
            elapsed: 0,
            duration,
        };
    }

    pub fn advance(&mut self) {
        if !self.is_done() {
            self.elapsed += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundState {
    pub role: SoundRole,
    pub category: Option<Obstruction>,
    pub fade: Fade,
}

impl SoundState {
    pub fn new(role: SoundRole) -> Self {
        Self {
            role,
            category: None,
            fade: Fade::settled(0.0),
        }
    }
}

#[derive(Debug)]
pub struct SoundComponent {
    core: ComponentCore,
    role: SoundRole,
    category: Option<Obstruction>,
    fade: Fade,
}

impl SoundComponent {
    pub fn new(role: SoundRole) -> Self {
        Self::from_state(SoundState::new(role))
    }

    pub fn from_state(state: SoundState) -> Self {
        Self {
            core: ComponentCore::default(),
            role: state.role,
            category: state.category,
            fade: state.fade,
        }
    }

    pub fn role(&self) -> &SoundRole {
        &self.role
    }

    pub fn is_listener(&self) -> bool {
        self.role == SoundRole::Listener
    }

    pub fn category(&self) -> Option<Obstruction> {
        self.category
    }

    pub fn gain(&self) -> f32 {
        self.fade.value()
    }

    /// Category as heard by the current listener right now.
    fn classify(&self, ctx: &Context<'_>) -> Obstruction {
        match (ctx.world.listener_position(), ctx.position()) {
            (Some(ears), Some(source)) => ctx.world.classify(ears, source),
            _ => Obstruction::Far,
        }
    }
}

impl Mailboxed for SoundComponent {
    fn address(&self) -> Address {
        Address::component(&self.core.owner, Slot::Sound)
    }

    fn mailbox(&self) -> &Mailbox {
        &self.core.mailbox
    }

    fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.core.mailbox
    }
}

impl Component for SoundComponent {
    fn slot(&self) -> Slot {
        Slot::Sound
    }

    fn attach(&mut self, owner: &str) {
        self.core.owner = owner.to_string();
    }

    fn handle(&mut self, message: &Message, ctx: &mut Context<'_>) {
        if let Some(Command::QueryObstruction) = message.as_command() {
            let category = self.classify(ctx);
            let report = Event::ObstructionReport {
                source: ctx.owner().to_string(),
                category,
            };
            ctx.event(message.sender().clone(), report);
            return;
        }
        if let Some(Event::Reloaded) = message.as_event() {
            // Forget the category so the host hears it again.
            self.category = None;
        }
    }

    fn advance(&mut self, ctx: &mut Context<'_>) {
        if self.is_listener() {
            return;
        }
        let category = self.classify(ctx);
        if self.category != Some(category) {
            log::debug!("{} now heard through {}", ctx.owner(), category);
            self.category = Some(category);
            let config = ctx.world.config();
            self.fade
                .retarget(config.attenuation.gain(category), config.fade_ticks);
            let changed = Event::ObstructionChanged {
                source: ctx.owner().to_string(),
                category,
            };
            ctx.event(Address::External, changed);
        }
        self.fade.advance();
    }

    fn state(&self) -> ComponentState {
        ComponentState::Sound(SoundState {
            role: self.role.clone(),
            category: self.category,
            fade: self.fade,
        })
    }
}
