// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use serde::Deserialize;

use crate::data::UnboundParameter;
use crate::run::bullet::CoordinateSystem;

/// Host-supplied settings for an [`Engine`](crate::run::Engine).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// The difficulty, exposed to expressions as `$rank`; usually within `0..=1`.
    pub rank: f32,
    /// The speed of bullets fired without a speed from a source which is not moving.
    pub default_speed: f32,
    /// Scales every `wait` duration.
    pub wait_time_multiplier: f32,
    /// Added to every resolved direction.
    pub angle_offset: f32,
    /// Scales the speed used when integrating positions.
    pub speed_multiplier: f32,
    /// The plane shooters created by the host move in.
    pub coordinate_system: CoordinateSystem,
    /// The seed for `$rand`.
    pub seed: u32,
    /// How deeply actions may be nested through references and repeats.
    ///
    /// A reference which is the last command of its action replaces that action instead of
    /// nesting, so patterns looping through a trailing `actionRef` never reach this limit.
    pub max_reference_depth: usize,
    /// The most iterations a single `repeat` may expand to.
    pub max_repeat_count: usize,
    /// How to treat `$N` with no bound parameter.
    pub unbound_parameter: UnboundParameter,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            rank: 0.,
            default_speed: 1.,
            wait_time_multiplier: 1.,
            angle_offset: 0.,
            speed_multiplier: 1.,
            coordinate_system: CoordinateSystem::default(),
            seed: 1,
            max_reference_depth: 64,
            max_repeat_count: 65_536,
            unbound_parameter: UnboundParameter::default(),
        }
    }
}
