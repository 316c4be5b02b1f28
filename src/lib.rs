// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

//! BulletML
//!
//! A BulletML parser and a resumable, stack-based interpreter for it.
//!
//! A pattern is loaded once with [`data::Document::parse`]. Bullets are driven by a
//! [`run::Engine`], which executes at most one command of a bullet's action stack per call to
//! [`run::Engine::step`], and by the bullet's own kinematic integration in
//! [`run::Bullet::tick`]. [`run::Runner`] ties both together for hosts which do not need their
//! own bullet pool.

#![warn(missing_docs)]

pub mod data;
pub mod run;
