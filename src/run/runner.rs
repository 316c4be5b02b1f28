// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use std::mem;
use std::rc::Rc;

use glam::Vec3;
use log::debug;

use crate::data::Document;
use crate::run::bullet::Bullet;
use crate::run::config::EngineConfig;
use crate::run::engine::{Engine, EngineError};
use crate::run::manager::BulletManager;

/// Collects what the engine hands back during one update.
#[derive(Default)]
struct Collector {
    created: Vec<Bullet>,
    errors: Vec<EngineError>,
}

impl BulletManager for Collector {
    fn bullet_created(&mut self, bullet: Bullet) {
        self.created.push(bullet);
    }

    fn report(&mut self, error: &EngineError) {
        self.errors.push(error.clone());
    }
}

/// Run a document against a pool of bullets.
///
/// This is the simplest possible host: every update steps each bullet once, moves it, and adds
/// anything fired to the pool.
pub struct Runner {
    engine: Engine,
    bullets: Vec<Bullet>,
    errors: Vec<EngineError>,
}

impl Runner {
    /// Create a new runner for a document.
    pub fn new(document: Rc<Document>, config: EngineConfig) -> Self {
        Runner {
            engine: Engine::new(document, config),
            bullets: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Start the document's top actions from a position.
    ///
    /// Each top action gets its own shooter. Returns how many were created.
    pub fn spawn_shooter(&mut self, position: Vec3) -> usize {
        let shooters = self
            .engine
            .document()
            .top_actions()
            .iter()
            .map(|action| self.engine.shooter(action.clone(), position))
            .collect::<Vec<_>>();
        let count = shooters.len();
        debug!("spawned {} shooter(s) at {:?}", count, position);
        self.bullets.extend(shooters);
        count
    }

    /// Advance every bullet by one frame lasting `dt`.
    ///
    /// Returns whether any bullet still has actions to run.
    pub fn update(&mut self, dt: f32) -> bool {
        let mut collector = Collector::default();

        for bullet in self.bullets.iter_mut() {
            if !bullet.is_active() {
                continue;
            }
            self.engine.step(bullet, &mut collector);
            self.engine.integrate(bullet, dt);
        }

        self.bullets.retain(Bullet::is_active);
        self.bullets.extend(collector.created);
        self.errors.extend(collector.errors);

        self.bullets.iter().any(Bullet::has_actions)
    }

    /// The live bullets, shooters included.
    pub fn bullets(&self) -> &[Bullet] {
        &self.bullets
    }

    /// Set the position bullets aim at.
    pub fn set_target_position(&mut self, target: Vec3) {
        self.engine.set_target_position(target);
    }

    /// The engine driving the bullets.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The engine driving the bullets, for changing its settings.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Errors reported since they were last taken.
    pub fn errors(&self) -> &[EngineError] {
        &self.errors
    }

    /// Take the errors reported so far.
    pub fn take_errors(&mut self) -> Vec<EngineError> {
        mem::replace(&mut self.errors, Vec::new())
    }
}
