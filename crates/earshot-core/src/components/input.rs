//! Player input: maps intents from the keybinding layer onto commands.

use serde::{Deserialize, Serialize};

use super::ComponentState;
use crate::entity::{Component, ComponentCore, Context, Slot};
use crate::kernel::{Address, Command, Event, InputAction, Mailbox, Mailboxed, Message};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    /// Input is ignored while a cutscene runs.
    pub locked: bool,
}

#[derive(Debug, Default)]
pub struct PlayerInput {
    core: ComponentCore,
    locked: bool,
}

impl PlayerInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: InputState) -> Self {
        Self {
            core: ComponentCore::default(),
            locked: state.locked,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    fn pick_up_nearest(&self, ctx: &mut Context<'_>) {
        let Some(at) = ctx.position() else {
            return;
        };
        let reach = ctx.world.config().reach;
        let nearest = ctx
            .world
            .registry()
            .items
            .within(&at, reach, |item| item.portable)
            .first()
            .map(|item| item.name.clone());
        match nearest {
            Some(item) => ctx.command(Address::World, Command::PickUp { item }),
            None => {
                let reason = "nothing to pick up".to_string();
                ctx.event(Address::External, Event::InteractionFailed { reason });
            }
        }
    }

    fn apply(&self, action: &InputAction, ctx: &mut Context<'_>) {
        match action {
            InputAction::Step(direction) => {
                ctx.command_sibling(Slot::Physics, Command::Step { direction: *direction })
            }
            InputAction::Interact => ctx.command_sibling(Slot::Physics, Command::UseDoor { passage: None }),
            InputAction::PickUp => self.pick_up_nearest(ctx),
            InputAction::Drop(item) => ctx.command(
                Address::World,
                Command::Drop {
                    item: item.clone(),
                    at: None,
                },
            ),
            InputAction::Halt => ctx.command_sibling(Slot::Physics, Command::Stop),
        }
    }
}

impl Mailboxed for PlayerInput {
    fn address(&self) -> Address {
        Address::component(&self.core.owner, Slot::Input)
    }

    fn mailbox(&self) -> &Mailbox {
        &self.core.mailbox
    }

    fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.core.mailbox
    }
}

impl Component for PlayerInput {
    fn slot(&self) -> Slot {
        Slot::Input
    }

    fn attach(&mut self, owner: &str) {
        self.core.owner = owner.to_string();
    }

    fn handle(&mut self, message: &Message, ctx: &mut Context<'_>) {
        if let Some(Command::Input(action)) = message.as_command() {
            if self.locked {
                log::debug!("{} input locked, dropping {:?}", ctx.owner(), action);
                return;
            }
            self.apply(action, ctx);
            return;
        }
        match message.as_event() {
            Some(Event::CutsceneStarted { .. }) => self.locked = true,
            Some(Event::CutsceneEnded { .. }) => self.locked = false,
            _ => {}
        }
    }

    fn state(&self) -> ComponentState {
        ComponentState::Input(InputState { locked: self.locked })
    }
}
