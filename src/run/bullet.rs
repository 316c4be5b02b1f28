// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use glam::Vec3;
use serde::Deserialize;

use crate::run::action::ActionRunner;
use crate::run::change::{AccelInfo, ChangeInfo};

/// Squared distance below which a bullet is considered to sit on its target.
const AIM_EPSILON: f32 = 1e-6;

/// The plane bullets move in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CoordinateSystem {
    /// Movement in the `x`/`y` plane; "up" is `+y`.
    #[serde(rename = "xy")]
    XY,
    /// Movement in the `y`/`z` plane; "up" is `+y`.
    #[serde(rename = "yz")]
    YZ,
}

impl CoordinateSystem {
    /// Map horizontal and vertical components into a vector.
    pub fn plane(self, horizontal: f32, vertical: f32) -> Vec3 {
        match self {
            CoordinateSystem::XY => Vec3::new(horizontal, vertical, 0.),
            CoordinateSystem::YZ => Vec3::new(0., vertical, horizontal),
        }
    }

    /// The horizontal and vertical components of a vector within the plane.
    pub fn components(self, vector: Vec3) -> (f32, f32) {
        match self {
            CoordinateSystem::XY => (vector.x, vector.y),
            CoordinateSystem::YZ => (vector.z, vector.y),
        }
    }
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        CoordinateSystem::XY
    }
}

/// Bring a heading into `(-360, 360]`.
///
/// Non-finite headings become `0`.
pub fn normalize_heading(degrees: f32) -> f32 {
    if !degrees.is_finite() {
        0.
    } else if degrees > 360. {
        let wrapped = degrees % 360.;
        if wrapped == 0. {
            360.
        } else {
            wrapped
        }
    } else if degrees <= -360. {
        degrees % 360.
    } else {
        degrees
    }
}

/// The unit movement vector for a heading in degrees, measured clockwise from "up".
pub fn angle_to_vector(heading: f32, coordinate_system: CoordinateSystem) -> Vec3 {
    let (sin, cos) = heading.to_radians().sin_cos();
    coordinate_system.plane(sin, cos)
}

/// The heading which points from one position to another.
///
/// Returns `None` when the positions coincide within the plane.
pub fn bearing(from: Vec3, to: Vec3, coordinate_system: CoordinateSystem) -> Option<f32> {
    let (horizontal, vertical) = coordinate_system.components(to - from);

    if horizontal * horizontal + vertical * vertical < AIM_EPSILON {
        None
    } else {
        Some(normalize_heading(horizontal.atan2(vertical).to_degrees()))
    }
}

/// A simulated bullet.
///
/// Invisible bullets are shooters: they run actions and fire, but never move on their own.
#[derive(Debug, Clone)]
pub struct Bullet {
    /// The position of the bullet.
    pub position: Vec3,
    /// The speed along the heading.
    pub speed: f32,
    /// The current acceleration.
    pub acceleration: Vec3,
    /// Whether the bullet moves and renders.
    pub visible: bool,
    /// The plane the bullet moves in.
    pub coordinate_system: CoordinateSystem,

    heading: f32,
    active: bool,
    actions: Vec<ActionRunner>,
    direction_change: ChangeInfo,
    speed_change: ChangeInfo,
    accel: AccelInfo,
    accumulated_velocity: Vec3,
}

impl Bullet {
    /// A visible bullet.
    pub fn new(
        position: Vec3,
        heading: f32,
        speed: f32,
        coordinate_system: CoordinateSystem,
    ) -> Self {
        Bullet {
            position,
            speed,
            acceleration: Vec3::ZERO,
            visible: true,
            coordinate_system,

            heading: normalize_heading(heading),
            active: true,
            actions: Vec::new(),
            direction_change: ChangeInfo::default(),
            speed_change: ChangeInfo::default(),
            accel: AccelInfo::default(),
            accumulated_velocity: Vec3::ZERO,
        }
    }

    /// An invisible shooter.
    pub fn shooter(position: Vec3, coordinate_system: CoordinateSystem) -> Self {
        Bullet {
            visible: false,
            ..Self::new(position, 0., 0., coordinate_system)
        }
    }

    /// The heading in degrees, clockwise from "up".
    pub fn heading(&self) -> f32 {
        self.heading
    }

    /// Set the heading.
    pub fn set_heading(&mut self, heading: f32) {
        self.heading = normalize_heading(heading);
    }

    /// Whether the bullet is still alive.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Deactivate the bullet and drop its pending actions.
    pub fn vanish(&mut self) {
        self.active = false;
        self.actions.clear();
    }

    /// The action stack; the last runner is the one executing.
    pub fn actions(&self) -> &[ActionRunner] {
        &self.actions
    }

    /// Whether the bullet has actions left to run.
    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }

    /// Push an action onto the stack.
    pub fn push_action(&mut self, runner: ActionRunner) {
        self.actions.push(runner);
    }

    pub(crate) fn actions_mut(&mut self) -> &mut Vec<ActionRunner> {
        &mut self.actions
    }

    /// The direction ramp.
    pub fn direction_change(&self) -> &ChangeInfo {
        &self.direction_change
    }

    /// Start ramping the heading.
    pub fn change_direction(&mut self, change: ChangeInfo) {
        self.direction_change = change;
    }

    /// The speed ramp.
    pub fn speed_change(&self) -> &ChangeInfo {
        &self.speed_change
    }

    /// Start ramping the speed.
    pub fn change_speed(&mut self, change: ChangeInfo) {
        self.speed_change = change;
    }

    /// The acceleration ramp.
    pub fn accel(&self) -> &AccelInfo {
        &self.accel
    }

    /// Start ramping the acceleration.
    pub fn set_accel(&mut self, accel: AccelInfo) {
        self.accel = accel;
    }

    /// Stop accelerating.
    pub fn clear_accel(&mut self) {
        self.accel = AccelInfo::default();
        self.acceleration = Vec3::ZERO;
    }

    /// The velocity gathered from acceleration so far.
    pub fn accumulated_velocity(&self) -> Vec3 {
        self.accumulated_velocity
    }

    /// The total velocity of the bullet.
    pub fn velocity(&self, speed_multiplier: f32) -> Vec3 {
        angle_to_vector(self.heading, self.coordinate_system) * self.speed * speed_multiplier
            + self.accumulated_velocity
    }

    /// Advance the bullet by one frame lasting `dt`.
    ///
    /// Ramps advance one frame each; only visible bullets move.
    pub fn tick(&mut self, dt: f32, speed_multiplier: f32) {
        if !self.active {
            return;
        }

        if let Some(heading) = self.direction_change.advance() {
            self.set_heading(heading);
        }
        if let Some(speed) = self.speed_change.advance() {
            self.speed = speed;
        }
        if let Some((horizontal, vertical)) = self.accel.advance() {
            self.acceleration = self.coordinate_system.plane(horizontal, vertical);
        }

        if !self.visible {
            return;
        }

        self.accumulated_velocity += self.acceleration * dt;
        self.position += self.velocity(speed_multiplier) * dt;
    }
}
