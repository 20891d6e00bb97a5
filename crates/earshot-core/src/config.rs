//! World configuration and validation.
//!
//! ```
//! use earshot_core::config::{validate_config, WorldConfig};
//!
//! let config = WorldConfig::default();
//! assert!(validate_config(&config).is_empty());
//! assert_eq!(config.tick_rate_hz, 100);
//! ```

use serde::{Deserialize, Serialize};

use crate::obstruction::Obstruction;

/// Grid connectivity used by the pathfinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    #[default]
    Four,
    Eight,
}

/// Target gain per obstruction category. The audio layer owns filtering;
/// the core only decides how loud a source should be heading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttenuationTable {
    pub none: f32,
    pub object: f32,
    pub door: f32,
    pub wall: f32,
    pub indirect_path: f32,
    pub far: f32,
}

impl Default for AttenuationTable {
    fn default() -> Self {
        Self {
            none: 1.0,
            object: 0.8,
            door: 0.45,
            wall: 0.25,
            indirect_path: 0.6,
            far: 0.0,
        }
    }
}

impl AttenuationTable {
    pub fn gain(&self, category: Obstruction) -> f32 {
        match category {
            Obstruction::None => self.none,
            Obstruction::Object => self.object,
            Obstruction::Door => self.door,
            Obstruction::Wall => self.wall,
            Obstruction::IndirectPath => self.indirect_path,
            Obstruction::Far => self.far,
        }
    }

    fn entries(&self) -> [(&'static str, f32); 6] {
        [
            ("none", self.none),
            ("object", self.object),
            ("door", self.door),
            ("wall", self.wall),
            ("indirect_path", self.indirect_path),
            ("far", self.far),
        ]
    }
}

/// Tunables for a running world.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Fixed simulation rate.
    pub tick_rate_hz: u32,
    /// Sources farther than this (cartesian tiles) are always `Far`.
    pub audibility_threshold: f32,
    /// Default grid-cost cap for path searches.
    pub max_path_distance: u32,
    pub connectivity: Connectivity,
    /// Ticks between two walking steps.
    pub walk_ticks_per_step: u32,
    /// Ticks a mover waits after bumping into someone before re-planning.
    pub collision_pause_ticks: u32,
    /// Re-plans attempted before a move is abandoned.
    pub max_replans: u8,
    /// Manhattan distance within which doors and items can be used.
    pub reach: u32,
    /// Length of a gain fade in ticks.
    pub fade_ticks: u32,
    /// Upper bound on ticks run by one `SimulationEngine::update` call.
    pub max_catch_up_ticks: u32,
    pub attenuation: AttenuationTable,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 100,
            audibility_threshold: 24.0,
            max_path_distance: 256,
            connectivity: Connectivity::Four,
            walk_ticks_per_step: 25,
            collision_pause_ticks: 50,
            max_replans: 3,
            reach: 1,
            fade_ticks: 20,
            max_catch_up_ticks: 25,
            attenuation: AttenuationTable::default(),
        }
    }
}

impl WorldConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Duration of one tick in seconds.
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.tick_rate_hz.max(1) as f32
    }
}

/// Check a configuration. An empty result means it is usable.
pub fn validate_config(config: &WorldConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.tick_rate_hz == 0 {
        errors.push("tick rate must be at least 1 Hz".to_string());
    }
    if !(config.audibility_threshold > 0.0) {
        errors.push(format!(
            "audibility threshold must be positive, got {}",
            config.audibility_threshold
        ));
    }
    if config.max_path_distance == 0 {
        errors.push("max path distance must be at least 1".to_string());
    }
    if config.walk_ticks_per_step == 0 {
        errors.push("walk ticks per step must be at least 1".to_string());
    }
    if config.fade_ticks == 0 {
        errors.push("fade ticks must be at least 1".to_string());
    }
    if config.max_catch_up_ticks == 0 {
        errors.push("max catch-up ticks must be at least 1".to_string());
    }
    for (name, gain) in config.attenuation.entries() {
        if !(0.0..=1.0).contains(&gain) {
            errors.push(format!("attenuation gain '{}' out of range 0-1: {}", name, gain));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(validate_config(&WorldConfig::default()).is_empty());
    }

    #[test]
    fn test_invalid_values_reported() {
        let config = WorldConfig {
            tick_rate_hz: 0,
            audibility_threshold: -1.0,
            attenuation: AttenuationTable {
                wall: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("'wall'")));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = WorldConfig::from_json(r#"{ "tick_rate_hz": 50, "connectivity": "eight" }"#)
            .unwrap();
        assert_eq!(config.tick_rate_hz, 50);
        assert_eq!(config.connectivity, Connectivity::Eight);
        assert_eq!(config.max_path_distance, 256);
        assert!((config.tick_seconds() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_gain_lookup() {
        let table = AttenuationTable::default();
        assert_eq!(table.gain(Obstruction::None), 1.0);
        assert_eq!(table.gain(Obstruction::Far), 0.0);
        assert!(table.gain(Obstruction::Wall) < table.gain(Obstruction::Door));
    }
}
