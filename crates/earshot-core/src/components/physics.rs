//! Movement: a small state machine driving tile-by-tile walking.
//!
//! ```text
//! Idle ──GoTo──▶ MovingToTarget ──arrive──▶ Idle | WatchingActor
//! Idle ──Follow─▶ MovingToActor ──adjacent─▶ WatchingActor{follow}
//! WatchingActor{follow} ──actor drifts away──▶ MovingToActor
//! any ──Stop──▶ Idle
//! ```
//!
//! Steps are requested from the world with `Place`; the world answers a
//! blocked step with `Collision`, after which the walker pauses and re-plans
//! around other walkers, giving up after `max_replans` attempts. Paths are
//! never saved: after a reload they are planned again from the saved goal.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::ComponentState;
use crate::entity::{Component, ComponentCore, Context, Slot};
use crate::geometry::{Direction, Point};
use crate::kernel::{Address, Command, Event, Mailbox, Mailboxed, Message};
use crate::pathfinding::PathRequest;

/// Distance at which a followed actor is chased again.
const FOLLOW_SLACK: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Motion {
    #[default]
    Idle,
    MovingToTarget {
        goal: Point,
        threshold: u32,
    },
    MovingToActor {
        actor: String,
    },
    WatchingActor {
        actor: String,
        follow: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsState {
    pub motion: Motion,
    /// Actor to watch once a `GoTo` arrives.
    pub watch: Option<String>,
    pub facing: Direction,
    /// Overrides the world's walking pace.
    pub ticks_per_step: Option<u32>,
}

impl Default for PhysicsState {
    fn default() -> Self {
        Self {
            motion: Motion::Idle,
            watch: None,
            facing: Direction::North,
            ticks_per_step: None,
        }
    }
}

#[derive(Debug)]
pub struct Physics {
    core: ComponentCore,
    motion: Motion,
    watch: Option<String>,
    facing: Direction,
    ticks_per_step: Option<u32>,
    path: VecDeque<Point>,
    cooldown: u32,
    paused: u32,
    replans: u8,
    avoid_walkers: bool,
    needs_plan: bool,
}

impl Default for Physics {
    fn default() -> Self {
        Self::new()
    }
}

impl Physics {
    pub fn new() -> Self {
        Self::from_state(PhysicsState::default())
    }

    pub fn from_state(state: PhysicsState) -> Self {
        let needs_plan = state.motion != Motion::Idle;
        Self {
            core: ComponentCore::default(),
            motion: state.motion,
            watch: state.watch,
            facing: state.facing,
            ticks_per_step: state.ticks_per_step,
            path: VecDeque::new(),
            cooldown: 0,
            paused: 0,
            replans: 0,
            avoid_walkers: false,
            needs_plan,
        }
    }

    pub fn motion(&self) -> &Motion {
        &self.motion
    }

    pub fn facing(&self) -> Direction {
        self.facing
    }

    pub fn path(&self) -> &VecDeque<Point> {
        &self.path
    }

    fn reset_route(&mut self) {
        self.path.clear();
        self.paused = 0;
        self.replans = 0;
        self.avoid_walkers = false;
        self.needs_plan = false;
    }

    fn go_idle(&mut self) {
        self.motion = Motion::Idle;
        self.watch = None;
        self.reset_route();
    }

    /// Cancel any walk. The owner hears about it only if something was
    /// actually interrupted.
    fn stop(&mut self, ctx: &mut Context<'_>) {
        let interrupted = self.motion != Motion::Idle;
        self.go_idle();
        if interrupted {
            log::debug!("{} stops", ctx.owner());
            let entity = ctx.owner().to_string();
            ctx.tell_owner(Event::Stopped { entity });
        }
    }

    fn give_up(&mut self, ctx: &mut Context<'_>) {
        log::debug!("{} gives up moving", ctx.owner());
        self.go_idle();
        let entity = ctx.owner().to_string();
        ctx.tell_owner(Event::PathNotFound { entity });
    }

    fn plan(&self, ctx: &Context<'_>, goal: Point, include_goal: bool) -> Option<VecDeque<Point>> {
        let start = ctx.position()?;
        let config = ctx.world.config();
        let request = PathRequest::new(start, goal)
            .mover(ctx.owner())
            .through_objects(!self.avoid_walkers)
            .include_goal(include_goal)
            .max_distance(config.max_path_distance)
            .connectivity(config.connectivity);
        ctx.world.find_path(&request).map(VecDeque::from)
    }

    fn start_go_to(&mut self, ctx: &mut Context<'_>, points: &[Point], threshold: u32, watch: Option<String>) {
        self.reset_route();
        for goal in points {
            if let Some(path) = self.plan(ctx, *goal, true) {
                self.motion = Motion::MovingToTarget {
                    goal: *goal,
                    threshold,
                };
                self.watch = watch;
                self.path = path;
                return;
            }
        }
        self.give_up(ctx);
    }

    fn start_follow(&mut self, ctx: &mut Context<'_>, actor: &str) {
        self.reset_route();
        let Some(target) = ctx.world.entity_position(actor) else {
            self.give_up(ctx);
            return;
        };
        match self.plan(ctx, target, false) {
            Some(path) => {
                self.motion = Motion::MovingToActor {
                    actor: actor.to_string(),
                };
                self.watch = Some(actor.to_string());
                self.path = path;
            }
            None => self.give_up(ctx),
        }
    }

    /// A single manual step. Blocked steps are reported, not retried.
    fn step(&mut self, ctx: &mut Context<'_>, direction: Direction) {
        let Some(from) = ctx.position() else {
            return;
        };
        self.go_idle();
        self.facing = direction;
        let to = from.step(direction);
        match ctx.world.step_blocker(ctx.owner(), &to) {
            Some(obstacle) => {
                let bumped = Event::Bumped {
                    entity: ctx.owner().to_string(),
                    at: to,
                    obstacle,
                };
                ctx.event(Address::External, bumped.clone());
                ctx.tell_owner(bumped);
            }
            None => ctx.command(Address::World, Command::Place { to }),
        }
    }

    fn use_door(&mut self, ctx: &mut Context<'_>, passage: Option<&str>) {
        let Some(at) = ctx.position() else {
            return;
        };
        let reach = ctx.world.config().reach;
        let registry = ctx.world.registry();
        let target = match passage {
            Some(name) => registry
                .passages
                .get(name)
                .filter(|p| p.area.manhattan_to(&at) <= reach)
                .map(|p| p.name.clone()),
            None => registry
                .passages
                .within(&at, reach, |_| true)
                .first()
                .map(|p| p.name.clone()),
        };
        match target {
            Some(name) => ctx.command(Address::passage(name), Command::Toggle),
            None => {
                let reason = "no door within reach".to_string();
                ctx.event(Address::External, Event::InteractionFailed { reason });
            }
        }
    }

    fn on_collision(&mut self, ctx: &mut Context<'_>, with: Option<&str>) {
        if self.motion == Motion::Idle {
            return;
        }
        self.path.clear();
        if self.replans >= ctx.world.config().max_replans {
            self.give_up(ctx);
            return;
        }
        self.replans += 1;
        log::debug!(
            "{} collided with {}, re-plan {}",
            ctx.owner(),
            with.unwrap_or("terrain"),
            self.replans
        );
        self.avoid_walkers = true;
        self.paused = ctx.world.config().collision_pause_ticks.max(1);
    }

    fn arrive(&mut self, ctx: &mut Context<'_>, at: Point) {
        self.reset_route();
        self.motion = match self.watch.take() {
            Some(actor) => Motion::WatchingActor { actor, follow: false },
            None => Motion::Idle,
        };
        let entity = ctx.owner().to_string();
        ctx.tell_owner(Event::Arrived { entity, at });
    }

    /// Take the next step if the pace allows it.
    fn walk(&mut self, ctx: &mut Context<'_>, from: Point) {
        if self.cooldown > 0 {
            return;
        }
        let Some(next) = self.path.pop_front() else {
            return;
        };
        if let Some(direction) = Direction::between(&from, &next) {
            self.facing = direction;
        }
        ctx.command(Address::World, Command::Place { to: next });
        self.cooldown = self
            .ticks_per_step
            .unwrap_or(ctx.world.config().walk_ticks_per_step);
    }

    fn advance_to_target(&mut self, ctx: &mut Context<'_>, at: Point, goal: Point, threshold: u32) {
        if at.manhattan(&goal) <= threshold {
            self.arrive(ctx, at);
            return;
        }
        if self.needs_plan || (self.path.is_empty() && self.replans > 0) {
            self.needs_plan = false;
            match self.plan(ctx, goal, true) {
                Some(path) => self.path = path,
                None => {
                    self.give_up(ctx);
                    return;
                }
            }
        }
        if self.path.is_empty() {
            self.arrive(ctx, at);
            return;
        }
        self.walk(ctx, at);
    }

    fn advance_to_actor(&mut self, ctx: &mut Context<'_>, at: Point, actor: &str) {
        let Some(target) = ctx.world.entity_position(actor) else {
            self.give_up(ctx);
            return;
        };
        if at.manhattan(&target) <= 1 {
            self.reset_route();
            self.motion = Motion::WatchingActor {
                actor: actor.to_string(),
                follow: true,
            };
            if let Some(direction) = Direction::between(&at, &target) {
                self.facing = direction;
            }
            let entity = ctx.owner().to_string();
            ctx.tell_owner(Event::Arrived { entity, at });
            return;
        }
        let stale = self.path.back().map_or(true, |end| end.manhattan(&target) > 1);
        if self.needs_plan || stale {
            self.needs_plan = false;
            match self.plan(ctx, target, false) {
                Some(path) => self.path = path,
                None => {
                    self.give_up(ctx);
                    return;
                }
            }
        }
        self.walk(ctx, at);
    }

    fn advance_watching(&mut self, ctx: &mut Context<'_>, at: Point, actor: &str, follow: bool) {
        let Some(target) = ctx.world.entity_position(actor) else {
            self.go_idle();
            return;
        };
        if let Some(direction) = Direction::between(&at, &target) {
            self.facing = direction;
        }
        if follow && at.manhattan(&target) > FOLLOW_SLACK {
            self.motion = Motion::MovingToActor {
                actor: actor.to_string(),
            };
            self.needs_plan = true;
        }
    }
}

impl Mailboxed for Physics {
    fn address(&self) -> Address {
        Address::component(&self.core.owner, Slot::Physics)
    }

    fn mailbox(&self) -> &Mailbox {
        &self.core.mailbox
    }

    fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.core.mailbox
    }
}

impl Component for Physics {
    fn slot(&self) -> Slot {
        Slot::Physics
    }

    fn attach(&mut self, owner: &str) {
        self.core.owner = owner.to_string();
    }

    fn handle(&mut self, message: &Message, ctx: &mut Context<'_>) {
        if let Some(command) = message.as_command() {
            match command {
                Command::GoTo {
                    points,
                    threshold,
                    watch,
                } => self.start_go_to(ctx, points, *threshold, watch.clone()),
                Command::Follow { actor } => self.start_follow(ctx, actor),
                Command::Stop => self.stop(ctx),
                Command::Step { direction } => self.step(ctx, *direction),
                Command::UseDoor { passage } => self.use_door(ctx, passage.as_deref()),
                _ => {}
            }
            return;
        }
        match message.as_event() {
            Some(Event::Collision { with, .. }) => self.on_collision(ctx, with.as_deref()),
            Some(Event::Reloaded) => {
                self.path.clear();
                self.cooldown = 0;
                self.paused = 0;
                self.needs_plan = self.motion != Motion::Idle;
            }
            _ => {}
        }
    }

    fn advance(&mut self, ctx: &mut Context<'_>) {
        self.cooldown = self.cooldown.saturating_sub(1);
        if self.paused > 0 {
            self.paused -= 1;
            if self.paused == 0 {
                self.needs_plan = true;
            }
            return;
        }
        let Some(at) = ctx.position() else {
            return;
        };
        match self.motion.clone() {
            Motion::Idle => {}
            Motion::MovingToTarget { goal, threshold } => self.advance_to_target(ctx, at, goal, threshold),
            Motion::MovingToActor { actor } => self.advance_to_actor(ctx, at, &actor),
            Motion::WatchingActor { actor, follow } => self.advance_watching(ctx, at, &actor, follow),
        }
    }

    fn state(&self) -> ComponentState {
        ComponentState::Physics(PhysicsState {
            motion: self.motion.clone(),
            watch: self.watch.clone(),
            facing: self.facing,
            ticks_per_step: self.ticks_per_step,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::grid::TileGrid;
    use crate::kernel::Outbox;
    use crate::world::World;

    fn walking() -> Physics {
        Physics::from_state(PhysicsState {
            motion: Motion::MovingToTarget {
                goal: Point::new(3, 3),
                threshold: 0,
            },
            ..PhysicsState::default()
        })
    }

    fn stop_message() -> Message {
        Message::command(Address::World, Command::Stop)
    }

    #[test]
    fn test_stop_while_walking_tells_owner() {
        let world = World::new("test", TileGrid::new(4, 4), WorldConfig::default());
        let mut physics = walking();
        physics.attach("dog");
        let mut outbox = Outbox::new();
        let mut ctx = Context::new(&world, "dog", Slot::Physics, &mut outbox);
        physics.handle(&stop_message(), &mut ctx);

        assert_eq!(physics.motion(), &Motion::Idle);
        let sent = outbox.into_inner();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Address::entity("dog"));
        assert_eq!(sent[0].1.as_event(), Some(&Event::Stopped { entity: "dog".into() }));
    }

    #[test]
    fn test_stop_while_idle_is_silent() {
        let world = World::new("test", TileGrid::new(4, 4), WorldConfig::default());
        let mut physics = Physics::new();
        physics.attach("dog");
        let mut outbox = Outbox::new();
        let mut ctx = Context::new(&world, "dog", Slot::Physics, &mut outbox);
        physics.handle(&stop_message(), &mut ctx);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_replan_limit_at_type_maximum_gives_up() {
        let config = WorldConfig {
            max_replans: u8::MAX,
            ..WorldConfig::default()
        };
        let world = World::new("test", TileGrid::new(4, 4), config);
        let mut physics = walking();
        physics.attach("dog");
        physics.replans = u8::MAX;
        let mut outbox = Outbox::new();
        let mut ctx = Context::new(&world, "dog", Slot::Physics, &mut outbox);
        physics.on_collision(&mut ctx, Some("cat"));

        assert_eq!(physics.motion(), &Motion::Idle);
        let sent = outbox.into_inner();
        assert_eq!(sent[0].1.as_event(), Some(&Event::PathNotFound { entity: "dog".into() }));
    }

    #[test]
    fn test_collision_pauses_and_counts_replans() {
        let world = World::new("test", TileGrid::new(4, 4), WorldConfig::default());
        let mut physics = walking();
        physics.attach("dog");
        physics.path.push_back(Point::new(1, 0));
        let mut outbox = Outbox::new();
        let mut ctx = Context::new(&world, "dog", Slot::Physics, &mut outbox);
        physics.on_collision(&mut ctx, Some("cat"));

        assert_eq!(physics.replans, 1);
        assert!(physics.avoid_walkers);
        assert!(physics.path().is_empty());
        assert_eq!(physics.paused, world.config().collision_pause_ticks);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_restored_motion_needs_plan() {
        let physics = Physics::from_state(PhysicsState {
            motion: Motion::MovingToTarget {
                goal: Point::new(4, 4),
                threshold: 0,
            },
            ..PhysicsState::default()
        });
        assert!(physics.needs_plan);
        assert!(physics.path().is_empty());

        let idle = Physics::new();
        assert!(!idle.needs_plan);
        assert_eq!(idle.motion(), &Motion::Idle);
    }

    #[test]
    fn test_state_drops_transient_path() {
        let mut physics = Physics::new();
        physics.path.push_back(Point::new(1, 0));
        physics.cooldown = 7;
        let state = physics.state();
        let rebuilt = Physics::from_state(match state {
            ComponentState::Physics(s) => s,
            other => panic!("unexpected state {:?}", other),
        });
        assert!(rebuilt.path().is_empty());
        assert_eq!(rebuilt.cooldown, 0);
    }
}
