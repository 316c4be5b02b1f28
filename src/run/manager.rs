// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use crate::run::bullet::Bullet;
use crate::run::engine::EngineError;

/// The host side of an [`Engine`](crate::run::Engine).
///
/// The engine calls into this while stepping a bullet. It owns whatever pool the new bullets
/// go into; the host is expected to step and tick them from then on.
pub trait BulletManager {
    /// A bullet was fired.
    fn bullet_created(&mut self, bullet: Bullet);

    /// A problem was found while stepping a bullet.
    ///
    /// The engine has already logged the error and carries on with a safe default.
    fn report(&mut self, error: &EngineError) {
        let _ = error;
    }
}

impl BulletManager for Vec<Bullet> {
    fn bullet_created(&mut self, bullet: Bullet) {
        self.push(bullet);
    }
}
