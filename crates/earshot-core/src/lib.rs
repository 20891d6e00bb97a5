//! Simulation core for Earshot, an audio-only adventure game.
//!
//! Nothing here renders. The core decides where everyone is, which doors are
//! open and what stands between each sound and the listener; an audio host
//! turns the events it drains from the world into sound and speech.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`geometry`] | Points, directions and inclusive tile rectangles |
//! | [`grid`] | Terrain tile grid and walkability |
//! | [`config`] | World tunables, attenuation table and validation |
//! | [`kernel`] | Addresses, messages, mailboxes and one-per-tick dispatch |
//! | [`zone`] | Named regions with ambience, neighbors and membership |
//! | [`passage`] | Doors and gates joining two zones |
//! | [`item`] | Placed and carried objects |
//! | [`registry`] | Name-keyed tables, spatial queries, deferred removal |
//! | [`pathfinding`] | Constrained breadth-first grid search |
//! | [`obstruction`] | Listener-to-source acoustic obstruction |
//! | [`entity`] | Entities, the component interface, blueprints |
//! | [`components`] | Sound, input, physics and wander AI |
//! | [`world`] | The world context: routing and the tick loop |
//! | [`map`] | JSON map documents and world population |
//! | [`persistence`] | bincode save/load |
//! | [`engine`] | Fixed-rate driver with time scale |

pub mod components;
pub mod config;
pub mod engine;
pub mod entity;
pub mod geometry;
pub mod grid;
pub mod item;
pub mod kernel;
pub mod map;
pub mod obstruction;
pub mod passage;
pub mod pathfinding;
pub mod persistence;
pub mod registry;
pub mod world;
pub mod zone;

pub use config::{validate_config, WorldConfig};
pub use engine::SimulationEngine;
pub use entity::{EntityBlueprint, EntityKind, Slot};
pub use geometry::{Direction, Point, Rect};
pub use kernel::{Address, Command, Event, InputAction, Message};
pub use map::{MapDocument, MapError};
pub use obstruction::Obstruction;
pub use persistence::SaveError;
pub use world::World;
