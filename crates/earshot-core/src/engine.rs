//! Simulation engine - fixed-rate driver around a [`World`]

use crate::config::WorldConfig;
use crate::kernel::{Address, Message};
use crate::map::{MapDocument, MapError};
use crate::persistence::{self, SaveError};
use crate::world::World;

/// Main simulation engine
pub struct SimulationEngine {
    /// The live world
    pub world: World,
    /// Map the world was built from, kept to regenerate the grid on load
    map: MapDocument,
    /// Unspent wall-clock time in seconds
    accumulator: f64,
    time_scale: f32,
}

impl SimulationEngine {
    /// Build a world from `map` and wrap it.
    pub fn new(map: MapDocument, config: WorldConfig) -> Result<Self, MapError> {
        let world = World::init(&map, config)?;
        Ok(Self {
            world,
            map,
            accumulator: 0.0,
            time_scale: 1.0,
        })
    }

    /// Advance by `delta_seconds` of wall-clock time. Runs every whole tick
    /// that fits, capped at `max_catch_up_ticks`; the remainder carries over.
    /// Returns the number of ticks run.
    pub fn update(&mut self, delta_seconds: f32) -> u32 {
        let tick_seconds = self.world.config().tick_seconds() as f64;
        let cap = self.world.config().max_catch_up_ticks.max(1);
        self.accumulator += (delta_seconds.max(0.0) * self.time_scale) as f64;

        let mut ran = 0;
        while self.accumulator >= tick_seconds && ran < cap {
            self.world.tick();
            self.accumulator -= tick_seconds;
            ran += 1;
        }
        if ran == cap && self.accumulator >= tick_seconds {
            log::warn!(
                "simulation fell behind, dropping {:.3}s",
                self.accumulator
            );
            self.accumulator = 0.0;
        }
        ran
    }

    /// Run exactly `ticks` ticks, ignoring wall-clock time.
    pub fn step(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.world.tick();
        }
    }

    /// Send a message from the host into the world. Unauthorized messages
    /// are logged and dropped.
    pub fn send(&mut self, to: Address, message: Message) {
        if let Err(err) = self.world.send(to, message) {
            log::error!("{}", err);
        }
    }

    /// Set time scale (1.0 = real time)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Simulated seconds since the world started
    pub fn sim_seconds(&self) -> f64 {
        self.world.tick_count() as f64 * self.world.config().tick_seconds() as f64
    }

    pub fn map(&self) -> &MapDocument {
        &self.map
    }

    /// Save the complete simulation to a writer
    pub fn save<W: std::io::Write>(&self, writer: W) -> Result<(), SaveError> {
        persistence::save_world(writer, &self.world)
    }

    /// Replace the world with one loaded from a reader
    pub fn load<R: std::io::Read>(&mut self, reader: R) -> Result<(), SaveError> {
        let config = self.world.config().clone();
        self.world = persistence::load_world(reader, &self.map, config)?;
        self.accumulator = 0.0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> MapDocument {
        MapDocument::from_json(
            r#"{ "name": "tiny", "width": 4, "height": 4,
                 "zones": [ { "name": "room", "area": { "x1": 0, "y1": 0, "x2": 3, "y2": 3 } } ] }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_accumulator_runs_whole_ticks() {
        let mut engine = SimulationEngine::new(tiny(), WorldConfig::default()).unwrap();
        // 100 Hz: 25 ms is two and a half ticks
        assert_eq!(engine.update(0.025), 2);
        assert_eq!(engine.update(0.005), 1);
        assert_eq!(engine.world.tick_count(), 3);
    }

    #[test]
    fn test_catch_up_is_capped() {
        let mut engine = SimulationEngine::new(tiny(), WorldConfig::default()).unwrap();
        assert_eq!(engine.update(10.0), 25);
        assert_eq!(engine.update(0.0), 0);
    }

    #[test]
    fn test_time_scale() {
        let mut engine = SimulationEngine::new(tiny(), WorldConfig::default()).unwrap();
        engine.set_time_scale(2.0);
        assert_eq!(engine.update(0.05), 10);
        engine.set_time_scale(-1.0);
        assert_eq!(engine.time_scale(), 0.0);
        assert_eq!(engine.update(1.0), 0);
        assert!((engine.sim_seconds() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_save_load_keeps_tick() {
        let mut engine = SimulationEngine::new(tiny(), WorldConfig::default()).unwrap();
        engine.step(7);
        let mut buffer = Vec::new();
        engine.save(&mut buffer).expect("Save failed");
        engine.step(5);
        engine.load(&buffer[..]).expect("Load failed");
        assert_eq!(engine.world.tick_count(), 7);
    }
}
