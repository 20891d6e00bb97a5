//! Component variants.
//!
//! | Slot | Type | Role |
//! |------|------|------|
//! | sound | [`SoundComponent`] | listener ears or an emitter tracking obstruction |
//! | input | [`PlayerInput`] | turns player intents into commands |
//! | physics | [`Physics`] | movement state machine and walking |
//! | ai | [`WanderAi`] | idle wandering around the home zone |

mod ai;
mod input;
mod physics;
mod sound;

pub use ai::{AiState, WanderAi};
pub use input::{InputState, PlayerInput};
pub use physics::{Motion, Physics, PhysicsState};
pub use sound::{Fade, SoundComponent, SoundRole, SoundState};

use serde::{Deserialize, Serialize};

use crate::entity::{Component, Slot};

/// Persistable state of one component, tagged by variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComponentState {
    Sound(SoundState),
    Input(InputState),
    Physics(PhysicsState),
    Ai(AiState),
}

impl ComponentState {
    pub fn slot(&self) -> Slot {
        match self {
            ComponentState::Sound(_) => Slot::Sound,
            ComponentState::Input(_) => Slot::Input,
            ComponentState::Physics(_) => Slot::Physics,
            ComponentState::Ai(_) => Slot::Ai,
        }
    }
}

/// Rebuild a component from its saved state. The result is unattached and
/// inactive.
pub fn build(state: &ComponentState) -> Box<dyn Component> {
    match state {
        ComponentState::Sound(s) => Box::new(SoundComponent::from_state(s.clone())),
        ComponentState::Input(s) => Box::new(PlayerInput::from_state(s.clone())),
        ComponentState::Physics(s) => Box::new(Physics::from_state(s.clone())),
        ComponentState::Ai(s) => Box::new(WanderAi::from_state(s.clone())),
    }
}
