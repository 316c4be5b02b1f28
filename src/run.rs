// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

//! Facilities for running a BulletML document.
//!
//! A host keeps a pool of [`Bullet`]s. Every frame it calls [`Engine::step`] once per active
//! bullet, then [`Engine::integrate`] to move it, and adds whatever the engine fired through its
//! [`BulletManager`] into the pool. [`Runner`] is a ready-made host doing exactly that.

mod action;
mod bullet;
mod change;
mod config;
mod engine;
mod manager;
mod runner;

pub use self::action::ActionRunner;
pub use self::bullet::{angle_to_vector, bearing, normalize_heading, Bullet, CoordinateSystem};
pub use self::change::{AccelInfo, ChangeInfo};
pub use self::config::EngineConfig;
pub use self::engine::{Engine, EngineError};
pub use self::manager::BulletManager;
pub use self::runner::Runner;
