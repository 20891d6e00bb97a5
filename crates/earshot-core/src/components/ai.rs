//! Idle wandering.
//!
//! After `interval_ticks` of standing still the walker picks up to three
//! random floor tiles inside its current zone and asks its physics component
//! to go to the first reachable one. Random draws come from a generator
//! seeded with `seed + draws`, so a saved game replays the same choices.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::ComponentState;
use crate::entity::{Component, ComponentCore, Context, Slot};
use crate::geometry::Point;
use crate::kernel::{Address, Command, Event, Mailbox, Mailboxed, Message};

const CANDIDATES: usize = 3;
const SAMPLES: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiState {
    pub seed: u64,
    /// Number of decisions taken so far.
    pub draws: u64,
    pub interval_ticks: u32,
    /// Manhattan radius of a wander leg.
    pub radius: u32,
    /// Set while a cutscene runs.
    pub suspended: bool,
}

impl AiState {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            draws: 0,
            interval_ticks: 300,
            radius: 6,
            suspended: false,
        }
    }
}

#[derive(Debug)]
pub struct WanderAi {
    core: ComponentCore,
    state: AiState,
    idle_ticks: u32,
    walking: bool,
}

impl WanderAi {
    pub fn new(seed: u64) -> Self {
        Self::from_state(AiState::seeded(seed))
    }

    pub fn from_state(state: AiState) -> Self {
        Self {
            core: ComponentCore::default(),
            state,
            idle_ticks: 0,
            walking: false,
        }
    }

    pub fn is_walking(&self) -> bool {
        self.walking
    }

    pub fn is_suspended(&self) -> bool {
        self.state.suspended
    }

    /// Draw wander candidates around `at`, restricted to walkable tiles of
    /// the zone the walker stands in.
    fn pick_targets(&mut self, ctx: &Context<'_>, at: Point) -> Vec<Point> {
        let mut rng = StdRng::seed_from_u64(self.state.seed.wrapping_add(self.state.draws));
        self.state.draws += 1;

        let world = ctx.world;
        let home = world.registry().zone_at(&at).map(|z| z.area);
        let radius = self.state.radius as i32;
        let mut targets = Vec::new();
        for _ in 0..SAMPLES {
            let p = at.offset(rng.gen_range(-radius..=radius), rng.gen_range(-radius..=radius));
            let in_home = home.map_or(false, |area| area.contains(&p));
            if p != at && in_home && world.grid().is_walkable(&p) && !targets.contains(&p) {
                targets.push(p);
                if targets.len() == CANDIDATES {
                    break;
                }
            }
        }
        targets
    }
}

impl Mailboxed for WanderAi {
    fn address(&self) -> Address {
        Address::component(&self.core.owner, Slot::Ai)
    }

    fn mailbox(&self) -> &Mailbox {
        &self.core.mailbox
    }

    fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.core.mailbox
    }
}

impl Component for WanderAi {
    fn slot(&self) -> Slot {
        Slot::Ai
    }

    fn attach(&mut self, owner: &str) {
        self.core.owner = owner.to_string();
    }

    fn handle(&mut self, message: &Message, ctx: &mut Context<'_>) {
        match message.as_event() {
            Some(Event::Arrived { .. } | Event::PathNotFound { .. } | Event::Stopped { .. } | Event::Reloaded) => {
                self.walking = false;
                self.idle_ticks = 0;
            }
            Some(Event::CutsceneStarted { name }) => {
                log::debug!("{} pauses for cutscene '{}'", ctx.owner(), name);
                self.state.suspended = true;
                self.walking = false;
                ctx.command_sibling(Slot::Physics, Command::Stop);
            }
            Some(Event::CutsceneEnded { .. }) => {
                self.state.suspended = false;
                self.idle_ticks = 0;
            }
            _ => {}
        }
    }

    fn advance(&mut self, ctx: &mut Context<'_>) {
        if self.state.suspended || self.walking {
            return;
        }
        self.idle_ticks += 1;
        if self.idle_ticks < self.state.interval_ticks {
            return;
        }
        self.idle_ticks = 0;
        let Some(at) = ctx.position() else {
            return;
        };
        let points = self.pick_targets(ctx, at);
        if points.is_empty() {
            return;
        }
        log::trace!("{} wanders toward {:?}", ctx.owner(), points);
        self.walking = true;
        ctx.command_sibling(
            Slot::Physics,
            Command::GoTo {
                points,
                threshold: 0,
                watch: None,
            },
        );
    }

    fn state(&self) -> ComponentState {
        ComponentState::Ai(self.state.clone())
    }
}
