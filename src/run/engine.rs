// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use std::iter;
use std::rc::Rc;

use glam::Vec3;
use log::{debug, trace, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::data::{
    Change, DirectionKind, Document, Element, ElementKind, Evaluator, ExpressionError,
    Parameters, Value,
};
use crate::run::action::ActionRunner;
use crate::run::bullet::{self, Bullet, CoordinateSystem};
use crate::run::change::{AccelInfo, ChangeInfo};
use crate::run::config::EngineConfig;
use crate::run::manager::BulletManager;

/// The heading used for aiming when a bullet sits on its target.
const DEFAULT_AIM_DIRECTION: f32 = 180.;

/// A problem found while running a pattern.
///
/// None of these stop the engine; the offending command is skipped or its value replaced by a
/// safe default.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A reference names a label which does not exist.
    #[error("could not find {} `{}`", kind, label)]
    UnresolvedReference {
        /// The kind of the reference element.
        kind: ElementKind,
        /// The label for the requested entity.
        label: String,
    },
    /// A command is missing a required child element.
    #[error("`{}` is missing a `{}` element", command, child)]
    MissingChild {
        /// The command.
        command: ElementKind,
        /// The kind of the missing child.
        child: ElementKind,
    },
    /// An element which is not a command appears within an action.
    #[error("`{}` is not a command", kind)]
    UnexpectedElement {
        /// The kind of the element.
        kind: ElementKind,
    },
    /// The body of an element could not be evaluated.
    #[error("failed to evaluate `{}`", element)]
    Expression {
        /// The kind of the element.
        element: ElementKind,
        /// The evaluation error.
        source: ExpressionError,
    },
    /// The body of an element evaluated to NaN or an infinity.
    #[error("`{}` evaluated to {}; using 0", element, value)]
    NonFinite {
        /// The kind of the element.
        element: ElementKind,
        /// The value.
        value: Value,
    },
    /// A `repeat` asked for more iterations than allowed; the limit is used instead.
    #[error("repeat of {} iterations exceeds the limit of {}", times, limit)]
    RepeatLimit {
        /// The requested number of iterations.
        times: Value,
        /// The number of iterations used.
        limit: usize,
    },
    /// Entering an action would nest actions too deeply.
    #[error("not entering action `{}`: nesting depth {} exceeds the limit", label, depth)]
    ReferenceDepth {
        /// The label of the action, if any.
        label: String,
        /// The depth the action would have run at.
        depth: usize,
    },
}

impl EngineError {
    fn unresolved_reference(reference: &Element) -> Self {
        Self::UnresolvedReference {
            kind: reference.kind(),
            label: reference.attribute("label").unwrap_or_default().into(),
        }
    }

    fn missing_child(command: ElementKind, child: ElementKind) -> Self {
        Self::MissingChild {
            command,
            child,
        }
    }
}

/// The outcome of a single command.
enum Status {
    /// Move on to the next command.
    Continue,
    /// Move on, then pause for a number of frames.
    Wait(u32),
    /// The current action has ended.
    Finish,
    /// The bullet is gone.
    Vanish,
    /// Move on, then run new actions first.
    Push(Vec<ActionRunner>),
    /// The current action is done; run another in its place.
    TailCall(ActionRunner),
}

/// What a command sees of the runner executing it.
struct Frame {
    params: Rc<Parameters>,
    depth: usize,
    /// Whether the command is the last of its action.
    tail: bool,
}

/// Executes BulletML actions one command at a time.
///
/// Besides the host settings, an engine carries the "last fired" state which `sequence`
/// directions, speeds, and accelerations build on. That state is shared by every bullet stepped
/// through the same engine; use one engine per independent stream of bullets.
pub struct Engine {
    document: Rc<Document>,
    config: EngineConfig,
    target: Vec3,
    evaluator: Evaluator,
    rng: SmallRng,

    last_sequence_direction: f32,
    last_sequence_speed: f32,
    last_sequence_horizontal_accel: f32,
    last_sequence_vertical_accel: f32,
    last_change_speed_sequence: Option<f32>,
}

impl Engine {
    /// Create an engine running a document.
    pub fn new(document: Rc<Document>, config: EngineConfig) -> Self {
        let mut evaluator = Evaluator::new();
        evaluator.set_rank(config.rank);
        evaluator.set_unbound_parameter(config.unbound_parameter);

        Engine {
            document,
            rng: SmallRng::seed_from_u64(u64::from(config.seed)),
            config,
            target: Vec3::ZERO,
            evaluator,

            last_sequence_direction: 0.,
            last_sequence_speed: 0.,
            last_sequence_horizontal_accel: 0.,
            last_sequence_vertical_accel: 0.,
            last_change_speed_sequence: None,
        }
    }

    /// The document being run.
    pub fn document(&self) -> &Rc<Document> {
        &self.document
    }

    /// The current settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The position bullets aim at.
    pub fn target_position(&self) -> Vec3 {
        self.target
    }

    /// Set the position bullets aim at.
    pub fn set_target_position(&mut self, target: Vec3) {
        self.target = target;
    }

    /// Set the plane new shooters move in.
    pub fn set_coordinate_system(&mut self, coordinate_system: CoordinateSystem) {
        self.config.coordinate_system = coordinate_system;
    }

    /// Set the difficulty exposed as `$rank`.
    pub fn set_rank_value(&mut self, rank: f32) {
        self.config.rank = rank;
        self.evaluator.set_rank(rank);
    }

    /// Set the speed used when neither the pattern nor the source provides one.
    pub fn set_default_speed(&mut self, speed: f32) {
        self.config.default_speed = speed;
    }

    /// Scale every `wait` duration.
    pub fn set_wait_time_multiplier(&mut self, multiplier: f32) {
        self.config.wait_time_multiplier = multiplier;
    }

    /// Set the angle added to every resolved direction.
    pub fn set_angle_offset(&mut self, offset: f32) {
        self.config.angle_offset = offset;
    }

    /// Scale the speed used when integrating positions.
    pub fn set_speed_multiplier(&mut self, multiplier: f32) {
        self.config.speed_multiplier = multiplier;
    }

    /// An invisible shooter at `position` running `action`.
    pub fn shooter(&self, action: Rc<Element>, position: Vec3) -> Bullet {
        let mut shooter = Bullet::shooter(position, self.config.coordinate_system);
        shooter.push_action(ActionRunner::new(action, Rc::new(Parameters::new())));
        shooter
    }

    /// Advance a bullet's kinematics by one frame.
    pub fn integrate(&self, bullet: &mut Bullet, dt: f32) {
        bullet.tick(dt, self.config.speed_multiplier);
    }

    /// Execute at most one command of the bullet's action stack.
    ///
    /// Returns whether the bullet still has work to do.
    pub fn step(&mut self, bullet: &mut Bullet, manager: &mut dyn BulletManager) -> bool {
        let (index, command, frame) = {
            let actions = bullet.actions_mut();
            let index = match actions.len().checked_sub(1) {
                Some(index) => index,
                None => return false,
            };

            let runner = &mut actions[index];
            if runner.count_down() {
                return true;
            }

            let command = match runner.current() {
                Some(command) => command.clone(),
                None => {
                    actions.pop();
                    return !actions.is_empty();
                },
            };

            let tail = runner.program_counter() + 1 >= runner.action().children().len();
            let frame = Frame {
                params: runner.parameters().clone(),
                depth: runner.depth(),
                tail,
            };

            (index, command, frame)
        };

        let status = self.dispatch(&command, bullet, &frame, manager);

        let actions = bullet.actions_mut();
        if let Some(runner) = actions.get_mut(index) {
            runner.advance();
        }

        match status {
            Status::Continue => true,
            Status::Wait(frames) => {
                if let Some(runner) = actions.get_mut(index) {
                    runner.wait(frames);
                }
                true
            },
            Status::Finish => {
                if let Some(runner) = actions.get_mut(index) {
                    runner.finish();
                }
                actions.truncate(index);
                !actions.is_empty()
            },
            Status::Vanish => {
                bullet.vanish();
                false
            },
            Status::Push(runners) => {
                trace!("entering {} action(s)", runners.len());
                actions.extend(runners);
                true
            },
            Status::TailCall(runner) => {
                trace!("replacing finished action");
                actions.truncate(index);
                actions.push(runner);
                true
            },
        }
    }

    fn dispatch(
        &mut self,
        command: &Rc<Element>,
        bullet: &mut Bullet,
        frame: &Frame,
        manager: &mut dyn BulletManager,
    ) -> Status {
        let params = &frame.params;
        match command.kind() {
            ElementKind::Wait => self.run_wait(command, params, manager),
            ElementKind::Vanish => Status::Vanish,
            ElementKind::Repeat => self.run_repeat(command, params, frame.depth, manager),
            ElementKind::Fire => {
                self.run_fire(command, bullet, params, manager);
                Status::Continue
            },
            ElementKind::FireRef => {
                if let Some(fire) = self.resolve(command, manager) {
                    let fire_params = self.reference_params(command, params, manager);
                    self.run_fire(&fire, bullet, &fire_params, manager);
                }
                Status::Continue
            },
            ElementKind::ChangeDirection => {
                self.run_change_direction(command, bullet, params, manager)
            },
            ElementKind::ChangeSpeed => self.run_change_speed(command, bullet, params, manager),
            ElementKind::Accel => self.run_accel(command, bullet, params, manager),
            ElementKind::Action | ElementKind::ActionRef => {
                // A final command hands its runner's place to the callee, so looping through
                // a trailing reference does not nest.
                let depth = if frame.tail {
                    frame.depth
                } else {
                    frame.depth + 1
                };
                let entered = self
                    .action_body(command, params, manager)
                    .and_then(|(action, action_params)| {
                        self.enter(action, action_params, depth, manager)
                    });

                match entered {
                    Some(runner) if frame.tail => Status::TailCall(runner),
                    Some(runner) => Status::Push(vec![runner]),
                    None => Status::Continue,
                }
            },
            kind => {
                self.report(
                    manager,
                    EngineError::UnexpectedElement {
                        kind,
                    },
                );
                Status::Continue
            },
        }
    }

    fn report(&self, manager: &mut dyn BulletManager, error: EngineError) {
        warn!("{}", error);
        manager.report(&error);
    }

    /// Evaluate the body of an element under the given parameters.
    ///
    /// Errors and non-finite results are reported and evaluate to `0`.
    fn value(
        &mut self,
        element: &Element,
        params: &Rc<Parameters>,
        manager: &mut dyn BulletManager,
    ) -> Value {
        self.evaluator.set_parameters(params.clone());
        self.evaluator.set_rand(self.rng.gen::<f32>());

        match self.evaluator.evaluate(element.text().unwrap_or_default()) {
            Ok(value) if value.is_finite() => value,
            Ok(value) => {
                self.report(
                    manager,
                    EngineError::NonFinite {
                        element: element.kind(),
                        value,
                    },
                );
                0.
            },
            Err(source) => {
                self.report(
                    manager,
                    EngineError::Expression {
                        element: element.kind(),
                        source,
                    },
                );
                0.
            },
        }
    }

    /// A duration in frames; at least one.
    fn frames(
        &mut self,
        term: &Element,
        params: &Rc<Parameters>,
        manager: &mut dyn BulletManager,
    ) -> u32 {
        self.value(term, params, manager).round().max(1.) as u32
    }

    fn resolve(&self, reference: &Element, manager: &mut dyn BulletManager) -> Option<Rc<Element>> {
        let found = self.document.resolve(reference).cloned();
        if found.is_none() {
            self.report(manager, EngineError::unresolved_reference(reference));
        }
        found
    }

    /// Bind the `param` children of a reference, evaluated in the caller's scope.
    fn reference_params(
        &mut self,
        reference: &Element,
        scope: &Rc<Parameters>,
        manager: &mut dyn BulletManager,
    ) -> Rc<Parameters> {
        let params = reference
            .children_of(ElementKind::Param)
            .enumerate()
            .map(|(idx, param)| (idx + 1, self.value(param, scope, manager)))
            .collect();
        Rc::new(params)
    }

    /// The action and parameters for an `action` or `actionRef` element.
    fn action_body(
        &mut self,
        element: &Rc<Element>,
        params: &Rc<Parameters>,
        manager: &mut dyn BulletManager,
    ) -> Option<(Rc<Element>, Rc<Parameters>)> {
        if element.kind() == ElementKind::ActionRef {
            let action = self.resolve(element, manager)?;
            let action_params = self.reference_params(element, params, manager);
            Some((action, action_params))
        } else {
            Some((element.clone(), params.clone()))
        }
    }

    /// A runner for an action run at `depth`, unless that is too deep.
    fn enter(
        &mut self,
        action: Rc<Element>,
        params: Rc<Parameters>,
        depth: usize,
        manager: &mut dyn BulletManager,
    ) -> Option<ActionRunner> {
        if depth > self.config.max_reference_depth {
            self.report(
                manager,
                EngineError::ReferenceDepth {
                    label: action.label().unwrap_or_default().into(),
                    depth,
                },
            );
            return None;
        }

        Some(ActionRunner::new(action, params).at_depth(depth))
    }

    fn run_wait(
        &mut self,
        wait: &Element,
        params: &Rc<Parameters>,
        manager: &mut dyn BulletManager,
    ) -> Status {
        let frames = self.value(wait, params, manager) * self.config.wait_time_multiplier;
        Status::Wait(frames.round().max(0.) as u32)
    }

    fn run_repeat(
        &mut self,
        repeat: &Element,
        params: &Rc<Parameters>,
        depth: usize,
        manager: &mut dyn BulletManager,
    ) -> Status {
        let times = match repeat.child(ElementKind::Times) {
            Some(times) => self.value(times, params, manager).round(),
            None => {
                self.report(
                    manager,
                    EngineError::missing_child(ElementKind::Repeat, ElementKind::Times),
                );
                return Status::Continue;
            },
        };

        if times <= 0. {
            return Status::Finish;
        }

        let limit = self.config.max_repeat_count;
        let count = if times > limit as f32 {
            self.report(
                manager,
                EngineError::RepeatLimit {
                    times,
                    limit,
                },
            );
            limit
        } else {
            times as usize
        };

        let body = repeat
            .children()
            .iter()
            .find(|child| {
                child.kind() == ElementKind::Action || child.kind() == ElementKind::ActionRef
            })
            .cloned();
        let body = match body {
            Some(body) => body,
            None => {
                self.report(
                    manager,
                    EngineError::missing_child(ElementKind::Repeat, ElementKind::Action),
                );
                return Status::Continue;
            },
        };

        let entered = self
            .action_body(&body, params, manager)
            .and_then(|(action, action_params)| {
                self.enter(action, action_params, depth + 1, manager)
            });

        match entered {
            Some(runner) => {
                debug!("repeating action {} times", count);
                Status::Push(iter::repeat(runner).take(count).collect())
            },
            None => Status::Continue,
        }
    }

    /// The bearing from a bullet to the target.
    fn aim(&self, source: &Bullet) -> f32 {
        bullet::bearing(source.position, self.target, source.coordinate_system)
            .unwrap_or(DEFAULT_AIM_DIRECTION)
    }

    fn direction(
        &mut self,
        direction: &Element,
        source: &Bullet,
        params: &Rc<Parameters>,
        manager: &mut dyn BulletManager,
    ) -> f32 {
        let kind = direction.value_type::<DirectionKind>().unwrap_or_default();
        let value = self.value(direction, params, manager);
        let offset = self.config.angle_offset;

        let heading = match kind {
            DirectionKind::Aim => self.aim(source) + value + offset,
            DirectionKind::Absolute => value + offset,
            DirectionKind::Relative => source.heading() + value + offset,
            DirectionKind::Sequence => {
                self.last_sequence_direction =
                    bullet::normalize_heading(self.last_sequence_direction + value);
                self.last_sequence_direction + offset
            },
        };

        bullet::normalize_heading(heading)
    }

    fn speed(
        &mut self,
        speed: &Element,
        source: &Bullet,
        params: &Rc<Parameters>,
        in_change: bool,
        manager: &mut dyn BulletManager,
    ) -> f32 {
        let kind = speed.value_type::<Change>().unwrap_or_default();
        let value = self.value(speed, params, manager);

        match kind {
            Change::Absolute => value,
            Change::Relative => source.speed + value,
            Change::Sequence if in_change => {
                let next = self.last_change_speed_sequence.unwrap_or(source.speed) + value;
                self.last_change_speed_sequence = Some(next);
                next
            },
            Change::Sequence => self.last_sequence_speed + value,
        }
    }

    fn accel_component(
        &mut self,
        component: Option<&Rc<Element>>,
        current: f32,
        horizontal: bool,
        params: &Rc<Parameters>,
        manager: &mut dyn BulletManager,
    ) -> f32 {
        let component = match component {
            Some(component) => component,
            None => return current,
        };

        let kind = component.value_type::<Change>().unwrap_or_default();
        let value = self.value(component, params, manager);

        match kind {
            Change::Absolute => value,
            Change::Relative => current + value,
            Change::Sequence => {
                let last = if horizontal {
                    &mut self.last_sequence_horizontal_accel
                } else {
                    &mut self.last_sequence_vertical_accel
                };
                *last += value;
                *last
            },
        }
    }

    fn run_fire(
        &mut self,
        fire: &Element,
        source: &Bullet,
        params: &Rc<Parameters>,
        manager: &mut dyn BulletManager,
    ) {
        let direction = fire
            .child(ElementKind::Direction)
            .map(|direction| self.direction(direction, source, params, manager));
        let speed = fire
            .child(ElementKind::Speed)
            .map(|speed| self.speed(speed, source, params, false, manager));

        let (template, template_params) = if let Some(bullet) = fire.child(ElementKind::Bullet) {
            (Some(bullet.clone()), params.clone())
        } else if let Some(reference) = fire.child(ElementKind::BulletRef) {
            match self.resolve(reference, manager) {
                Some(bullet) => {
                    let bullet_params = self.reference_params(reference, params, manager);
                    (Some(bullet), bullet_params)
                },
                None => (None, params.clone()),
            }
        } else {
            self.report(
                manager,
                EngineError::missing_child(ElementKind::Fire, ElementKind::Bullet),
            );
            (None, params.clone())
        };

        let mut heading = match direction {
            Some(direction) => direction,
            None => bullet::normalize_heading(self.aim(source) + self.config.angle_offset),
        };
        let mut speed = match speed {
            Some(speed) => speed,
            None if source.speed > 0. => source.speed,
            None => self.config.default_speed,
        };

        let mut spawned = Bullet::new(source.position, heading, speed, source.coordinate_system);

        if let Some(template) = template {
            let mut runners = Vec::new();
            for child in template.children() {
                if let ElementKind::Action | ElementKind::ActionRef = child.kind() {
                    if let Some((action, action_params)) =
                        self.action_body(child, &template_params, manager)
                    {
                        runners.push(ActionRunner::new(action, action_params));
                    }
                }
            }
            // The first declared action runs first.
            runners
                .into_iter()
                .rev()
                .for_each(|runner| spawned.push_action(runner));

            if let Some(direction) = template.child(ElementKind::Direction) {
                heading = self.direction(direction, source, &template_params, manager);
            }
            if let Some(bullet_speed) = template.child(ElementKind::Speed) {
                speed = self.speed(bullet_speed, source, &template_params, false, manager);
            }
        }

        spawned.set_heading(heading);
        spawned.speed = speed;

        self.last_sequence_direction =
            bullet::normalize_heading(spawned.heading() - self.config.angle_offset);
        self.last_sequence_speed = spawned.speed;

        trace!(
            "fired bullet at {:?} heading {} speed {}",
            spawned.position,
            spawned.heading(),
            spawned.speed,
        );
        manager.bullet_created(spawned);
    }

    fn run_change_direction(
        &mut self,
        command: &Element,
        bullet: &mut Bullet,
        params: &Rc<Parameters>,
        manager: &mut dyn BulletManager,
    ) -> Status {
        let (direction, term) = match self.with_term(command, ElementKind::Direction, manager) {
            Some(children) => children,
            None => return Status::Continue,
        };

        let target = self.direction(&direction, bullet, params, manager);
        let duration = self.frames(&term, params, manager);
        bullet.change_direction(ChangeInfo::new(bullet.heading(), target, duration));

        Status::Continue
    }

    fn run_change_speed(
        &mut self,
        command: &Element,
        bullet: &mut Bullet,
        params: &Rc<Parameters>,
        manager: &mut dyn BulletManager,
    ) -> Status {
        let (speed, term) = match self.with_term(command, ElementKind::Speed, manager) {
            Some(children) => children,
            None => return Status::Continue,
        };

        let target = self.speed(&speed, bullet, params, true, manager);
        let duration = self.frames(&term, params, manager);
        bullet.change_speed(ChangeInfo::new(bullet.speed, target, duration));

        Status::Continue
    }

    fn run_accel(
        &mut self,
        command: &Element,
        bullet: &mut Bullet,
        params: &Rc<Parameters>,
        manager: &mut dyn BulletManager,
    ) -> Status {
        let term = match command.child(ElementKind::Term) {
            Some(term) => term,
            None => {
                self.report(
                    manager,
                    EngineError::missing_child(ElementKind::Accel, ElementKind::Term),
                );
                return Status::Continue;
            },
        };

        let (current_horizontal, current_vertical) =
            bullet.coordinate_system.components(bullet.acceleration);
        let horizontal = self.accel_component(
            command.child(ElementKind::Horizontal),
            current_horizontal,
            true,
            params,
            manager,
        );
        let vertical = self.accel_component(
            command.child(ElementKind::Vertical),
            current_vertical,
            false,
            params,
            manager,
        );
        let duration = self.frames(term, params, manager);
        bullet.set_accel(AccelInfo::new(horizontal, vertical, duration));

        Status::Continue
    }

    /// The value child and the `term` child of a change command.
    fn with_term(
        &self,
        command: &Element,
        value: ElementKind,
        manager: &mut dyn BulletManager,
    ) -> Option<(Rc<Element>, Rc<Element>)> {
        for &kind in [value, ElementKind::Term].iter() {
            if command.child(kind).is_none() {
                self.report(manager, EngineError::missing_child(command.kind(), kind));
                return None;
            }
        }

        Some((
            command.child(value)?.clone(),
            command.child(ElementKind::Term)?.clone(),
        ))
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use approx::assert_abs_diff_eq;
    use glam::Vec3;
    use rstest::rstest;

    use crate::data::{Document, ElementKind, ExpressionError, UnboundParameter};
    use crate::run::{Bullet, BulletManager, CoordinateSystem, Engine, EngineConfig, EngineError};

    #[derive(Default)]
    struct Recorder {
        bullets: Vec<Bullet>,
        errors: Vec<EngineError>,
    }

    impl BulletManager for Recorder {
        fn bullet_created(&mut self, bullet: Bullet) {
            self.bullets.push(bullet);
        }

        fn report(&mut self, error: &EngineError) {
            self.errors.push(error.clone());
        }
    }

    fn engine_with(xml: &str, config: EngineConfig) -> Engine {
        let doc = Document::parse(xml).unwrap();
        assert!(doc.warnings().is_empty(), "{:?}", doc.warnings());
        Engine::new(Rc::new(doc), config)
    }

    fn engine(xml: &str) -> Engine {
        engine_with(xml, EngineConfig::default())
    }

    fn top_shooter(engine: &Engine) -> Bullet {
        let top = engine.document().top_action().unwrap().clone();
        engine.shooter(top, Vec3::ZERO)
    }

    fn run_to_end(engine: &mut Engine, bullet: &mut Bullet, recorder: &mut Recorder) {
        for _ in 0..1000 {
            if !engine.step(bullet, recorder) {
                return;
            }
        }
        panic!("the action never finished");
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(3)]
    fn test_wait_timing(#[case] frames: u32) {
        let mut engine = engine(&format!(
            r#"<bulletml>
              <action label="top">
                <wait>{}</wait>
                <fire><bullet/></fire>
              </action>
            </bulletml>"#,
            frames,
        ));
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();

        // The tick which processes the wait.
        assert!(engine.step(&mut shooter, &mut recorder));
        assert_eq!(shooter.actions()[0].wait_frames(), frames);

        for _ in 0..frames {
            assert!(engine.step(&mut shooter, &mut recorder));
            assert!(recorder.bullets.is_empty());
        }

        engine.step(&mut shooter, &mut recorder);
        assert_eq!(recorder.bullets.len(), 1);
    }

    #[test]
    fn test_wait_time_multiplier() {
        let mut engine = engine(
            r#"<bulletml><action label="top"><wait>2.4</wait></action></bulletml>"#,
        );
        engine.set_wait_time_multiplier(2.);
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();

        engine.step(&mut shooter, &mut recorder);
        assert_eq!(shooter.actions()[0].wait_frames(), 5);
    }

    #[test]
    fn test_sequence_direction() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <repeat>
                  <times>3</times>
                  <action>
                    <fire><direction type="sequence">23</direction><bullet/></fire>
                  </action>
                </repeat>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        let headings = recorder
            .bullets
            .iter()
            .map(Bullet::heading)
            .collect::<Vec<_>>();
        assert_eq!(headings.len(), 3);
        for (heading, expected) in headings.iter().zip([23., 46., 69.].iter()) {
            assert_abs_diff_eq!(heading, expected, epsilon = 1e-4);
        }
        assert!(recorder.errors.is_empty());
    }

    #[test]
    fn test_sequence_speed() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <fire><speed>2</speed><bullet/></fire>
                <fire><speed type="sequence">0.5</speed><bullet/></fire>
                <fire><speed type="sequence">0.5</speed><bullet/></fire>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        let speeds = recorder
            .bullets
            .iter()
            .map(|bullet| bullet.speed)
            .collect::<Vec<_>>();
        assert_eq!(speeds, [2., 2.5, 3.]);
    }

    #[test]
    fn test_template_speed_takes_precedence() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <fire><speed>3</speed><bulletRef label="slow"/></fire>
                <fire><speed>3</speed><bullet/></fire>
              </action>
              <bullet label="slow"><speed>2.5</speed></bullet>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        assert_eq!(recorder.bullets.len(), 2);
        assert_eq!(recorder.bullets[0].speed, 2.5);
        assert_eq!(recorder.bullets[1].speed, 3.);
    }

    #[test]
    fn test_fire_defaults() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <fire><bullet/></fire>
                <fire><bullet/></fire>
              </action>
            </bulletml>"#,
        );
        engine.set_default_speed(4.);
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();

        // Aim at a target to the right of the shooter.
        engine.set_target_position(Vec3::new(10., 0., 0.));
        engine.step(&mut shooter, &mut recorder);
        // Coincident positions fall back to a fixed heading.
        engine.set_target_position(Vec3::ZERO);
        engine.step(&mut shooter, &mut recorder);

        let fired = &recorder.bullets;
        assert_abs_diff_eq!(fired[0].heading(), 90., epsilon = 1e-4);
        assert_eq!(fired[0].speed, 4.);
        assert_abs_diff_eq!(fired[1].heading(), 180., epsilon = 1e-4);
        assert!(fired.iter().all(|bullet| bullet.visible));
        assert!(fired.iter().all(|bullet| bullet.position == Vec3::ZERO));
    }

    #[test]
    fn test_direction_types() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <fire><direction type="absolute">400</direction><bullet/></fire>
                <fire><direction type="relative">30</direction><bullet/></fire>
                <fire><direction>-15</direction><bullet/></fire>
              </action>
            </bulletml>"#,
        );
        engine.set_angle_offset(5.);
        engine.set_target_position(Vec3::new(0., 10., 0.));
        let mut shooter = top_shooter(&engine);
        shooter.set_heading(100.);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        let headings = recorder
            .bullets
            .iter()
            .map(Bullet::heading)
            .collect::<Vec<_>>();
        assert_abs_diff_eq!(headings[0], 45., epsilon = 1e-4);
        assert_abs_diff_eq!(headings[1], 135., epsilon = 1e-4);
        assert_abs_diff_eq!(headings[2], -10., epsilon = 1e-4);
    }

    #[test]
    fn test_repeat_pushes_runners() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <repeat>
                  <times>1 + 2</times>
                  <action><wait>1</wait></action>
                </repeat>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();

        assert!(engine.step(&mut shooter, &mut recorder));
        let actions = shooter.actions();
        assert_eq!(actions.len(), 4);
        assert!(actions[1..]
            .iter()
            .all(|runner| runner.action().kind() == ElementKind::Action));
        assert!(actions[1..].iter().all(|runner| runner.depth() == 1));
    }

    #[rstest]
    #[case("0")]
    #[case("-2")]
    fn test_repeat_nothing_finishes(#[case] times: &str) {
        let mut engine = engine(&format!(
            r#"<bulletml>
              <action label="top">
                <repeat>
                  <times>{}</times>
                  <action><wait>1</wait></action>
                </repeat>
                <fire><bullet/></fire>
              </action>
            </bulletml>"#,
            times,
        ));
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();

        assert!(!engine.step(&mut shooter, &mut recorder));
        assert!(!shooter.has_actions());
        assert!(!engine.step(&mut shooter, &mut recorder));
        assert!(recorder.bullets.is_empty());
    }

    #[test]
    fn test_unresolved_reference_continues() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <actionRef label="missing"/>
                <fire><bullet/></fire>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        assert_eq!(
            recorder.errors,
            [EngineError::UnresolvedReference {
                kind: ElementKind::ActionRef,
                label: "missing".into(),
            }],
        );
        assert_eq!(recorder.bullets.len(), 1);
    }

    #[test]
    fn test_unresolved_bullet_reference_fires_empty_bullet() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <fire><speed>2</speed><bulletRef label="missing"/></fire>
                <fireRef label="missing"/>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        assert_eq!(recorder.bullets.len(), 1);
        assert_eq!(recorder.bullets[0].speed, 2.);
        assert!(!recorder.bullets[0].has_actions());
        assert_eq!(recorder.errors.len(), 2);
    }

    #[test]
    fn test_vanish() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <action><vanish/></action>
                <fire><bullet/></fire>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();

        assert!(engine.step(&mut shooter, &mut recorder));
        assert!(!engine.step(&mut shooter, &mut recorder));
        assert!(!shooter.is_active());
        assert!(!shooter.has_actions());
        assert!(!engine.step(&mut shooter, &mut recorder));
        assert!(recorder.bullets.is_empty());
    }

    #[test]
    fn test_change_direction() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <changeDirection>
                  <direction type="absolute">90</direction>
                  <term>30</term>
                </changeDirection>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        engine.step(&mut shooter, &mut recorder);

        let change = shooter.direction_change();
        assert!(change.is_active());
        assert_eq!(change.start(), 0.);
        assert_eq!(change.target(), 90.);
        assert_eq!(change.duration(), 30);

        for _ in 0..15 {
            engine.integrate(&mut shooter, 1.);
        }
        assert_eq!(shooter.heading(), 45.);
        for _ in 0..15 {
            engine.integrate(&mut shooter, 1.);
        }
        assert_eq!(shooter.heading(), 90.);
        assert!(!shooter.direction_change().is_active());
    }

    #[test]
    fn test_change_speed_sequence() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <changeSpeed><speed type="sequence">1</speed><term>10</term></changeSpeed>
                <changeSpeed><speed type="sequence">1</speed><term>0</term></changeSpeed>
                <changeSpeed><speed type="relative">-1</speed><term>2</term></changeSpeed>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        shooter.speed = 3.;
        let mut recorder = Recorder::default();

        engine.step(&mut shooter, &mut recorder);
        assert_eq!(shooter.speed_change().target(), 4.);

        engine.step(&mut shooter, &mut recorder);
        assert_eq!(shooter.speed_change().target(), 5.);
        // Durations never drop below one frame.
        assert_eq!(shooter.speed_change().duration(), 1);

        engine.step(&mut shooter, &mut recorder);
        assert_eq!(shooter.speed_change().start(), 3.);
        assert_eq!(shooter.speed_change().target(), 2.);
    }

    #[test]
    fn test_accel() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <accel><horizontal>2</horizontal><term>4</term></accel>
                <accel><vertical type="relative">1</vertical><term>4</term></accel>
                <accel><horizontal type="sequence">0.5</horizontal><term>4</term></accel>
                <accel><horizontal type="sequence">0.5</horizontal><term>4</term></accel>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();

        engine.step(&mut shooter, &mut recorder);
        assert_eq!(shooter.accel().horizontal(), 2.);
        assert_eq!(shooter.accel().vertical(), 0.);
        assert_eq!(shooter.accel().duration(), 4);
        for _ in 0..4 {
            engine.integrate(&mut shooter, 1.);
        }
        assert_eq!(shooter.acceleration, Vec3::new(2., 0., 0.));

        // A missing axis keeps the stored acceleration.
        engine.step(&mut shooter, &mut recorder);
        assert_eq!(shooter.accel().horizontal(), 2.);
        assert_eq!(shooter.accel().vertical(), 1.);
        for _ in 0..4 {
            engine.integrate(&mut shooter, 1.);
        }

        engine.step(&mut shooter, &mut recorder);
        assert_eq!(shooter.accel().horizontal(), 0.5);
        engine.step(&mut shooter, &mut recorder);
        assert_eq!(shooter.accel().horizontal(), 1.);
        assert_eq!(shooter.accel().vertical(), 1.);
    }

    #[rstest]
    #[case(CoordinateSystem::XY)]
    #[case(CoordinateSystem::YZ)]
    fn test_relative_accel_during_ramp(#[case] coordinate_system: CoordinateSystem) {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <accel><horizontal>4</horizontal><term>4</term></accel>
                <accel><horizontal type="relative">1</horizontal><term>4</term></accel>
              </action>
            </bulletml>"#,
        );
        engine.set_coordinate_system(coordinate_system);
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();

        engine.step(&mut shooter, &mut recorder);
        engine.integrate(&mut shooter, 1.);
        assert_eq!(shooter.acceleration, coordinate_system.plane(1., 0.));

        // Relative to the ramped acceleration, not the ramp's target.
        engine.step(&mut shooter, &mut recorder);
        assert_eq!(shooter.accel().horizontal(), 2.);
        assert_eq!(shooter.accel().vertical(), 0.);
    }

    #[test]
    fn test_missing_child_is_skipped() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <changeDirection><direction>90</direction></changeDirection>
                <fire><bullet/></fire>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        assert_eq!(
            recorder.errors,
            [EngineError::MissingChild {
                command: ElementKind::ChangeDirection,
                child: ElementKind::Term,
            }],
        );
        assert!(!shooter.direction_change().is_active());
        assert_eq!(recorder.bullets.len(), 1);
    }

    #[test]
    fn test_reference_depth_limit() {
        let config = EngineConfig {
            max_reference_depth: 3,
            ..EngineConfig::default()
        };
        let mut engine = engine_with(
            r#"<bulletml>
              <action label="top">
                <actionRef label="top"/>
                <wait>1</wait>
              </action>
            </bulletml>"#,
            config,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        assert_eq!(
            recorder.errors,
            [EngineError::ReferenceDepth {
                label: "top".into(),
                depth: 4,
            }],
        );
    }

    #[test]
    fn test_trailing_reference_loops_without_nesting() {
        let config = EngineConfig {
            max_reference_depth: 3,
            ..EngineConfig::default()
        };
        let mut engine = engine_with(
            r#"<bulletml>
              <action label="top">
                <fire><bullet/></fire>
                <wait>1</wait>
                <actionRef label="top"/>
              </action>
            </bulletml>"#,
            config,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();

        // Each pass fires, waits, and re-enters over four steps.
        for _ in 0..200 {
            assert!(engine.step(&mut shooter, &mut recorder));
        }

        assert_eq!(recorder.bullets.len(), 50);
        assert!(recorder.errors.is_empty());
        assert_eq!(shooter.actions().len(), 1);
        assert_eq!(shooter.actions()[0].depth(), 0);
    }

    #[test]
    fn test_repeat_limit() {
        let config = EngineConfig {
            max_repeat_count: 5,
            ..EngineConfig::default()
        };
        let mut engine = engine_with(
            r#"<bulletml>
              <action label="top">
                <repeat>
                  <times>100000000</times>
                  <action><wait>1</wait></action>
                </repeat>
              </action>
            </bulletml>"#,
            config,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();

        assert!(engine.step(&mut shooter, &mut recorder));
        assert_eq!(shooter.actions().len(), 6);
        assert_eq!(
            recorder.errors,
            [EngineError::RepeatLimit {
                times: 100_000_000.,
                limit: 5,
            }],
        );
    }

    #[test]
    fn test_unbound_parameter_reported() {
        let config = EngineConfig {
            unbound_parameter: UnboundParameter::Report,
            ..EngineConfig::default()
        };
        let mut engine = engine_with(
            r#"<bulletml>
              <action label="top">
                <fire><speed>$1</speed><bullet/></fire>
              </action>
            </bulletml>"#,
            config,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        assert_eq!(
            recorder.errors,
            [EngineError::Expression {
                element: ElementKind::Speed,
                source: ExpressionError::UndefinedParameter {
                    index: 1,
                },
            }],
        );
        assert_eq!(recorder.bullets.len(), 1);
        assert_eq!(recorder.bullets[0].speed, 0.);
    }

    #[test]
    fn test_non_finite_values() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <fire>
                  <direction type="absolute">0 / 0</direction>
                  <speed>1 / 0</speed>
                  <bullet/>
                </fire>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        assert_eq!(recorder.errors.len(), 2);
        assert!(matches!(
            recorder.errors[0],
            EngineError::NonFinite {
                element: ElementKind::Direction,
                ..
            }
        ));
        assert_eq!(
            recorder.errors[1],
            EngineError::NonFinite {
                element: ElementKind::Speed,
                value: f32::INFINITY,
            },
        );
        assert_eq!(recorder.bullets[0].heading(), 0.);
        assert_eq!(recorder.bullets[0].speed, 0.);
    }

    #[test]
    fn test_bad_expression_is_reported() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <wait>2 +</wait>
                <fire><bullet/></fire>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();

        // The wait is treated as zero frames.
        engine.step(&mut shooter, &mut recorder);
        engine.step(&mut shooter, &mut recorder);
        assert_eq!(recorder.bullets.len(), 1);
        assert!(matches!(
            recorder.errors[..],
            [EngineError::Expression {
                element: ElementKind::Wait,
                ..
            }]
        ));
    }

    #[test]
    fn test_reference_parameters() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <actionRef label="shoot">
                  <param>10</param>
                  <param>$1</param>
                </actionRef>
                <fire><bulletRef label="curve"><param>4</param></bulletRef></fire>
              </action>
              <action label="shoot">
                <fire>
                  <direction type="absolute">$1 * 2</direction>
                  <speed>$2 + 1</speed>
                  <bullet/>
                </fire>
              </action>
              <bullet label="curve">
                <speed>$1</speed>
                <action>
                  <changeSpeed><speed>$1 * 2</speed><term>1</term></changeSpeed>
                </action>
              </bullet>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        let fired = &recorder.bullets;
        assert_eq!(fired.len(), 2);
        assert_abs_diff_eq!(fired[0].heading(), 20., epsilon = 1e-4);
        // `$1` is unbound at the top level.
        assert_eq!(fired[0].speed, 1.);

        let curve = &fired[1];
        assert_eq!(curve.speed, 4.);
        assert_eq!(curve.actions().len(), 1);
        assert_eq!(curve.actions()[0].parameters().get(&1), Some(&4.));

        let mut curve = curve.clone();
        engine.step(&mut curve, &mut recorder);
        assert_eq!(curve.speed_change().target(), 8.);
        assert!(recorder.errors.is_empty());
    }

    #[test]
    fn test_template_actions_run_in_order() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <fire>
                  <bullet>
                    <action><wait>5</wait></action>
                    <actionRef label="second"/>
                  </bullet>
                </fire>
              </action>
              <action label="second"><vanish/></action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        let fired = &recorder.bullets[0];
        let labels = fired
            .actions()
            .iter()
            .map(|runner| runner.action().label())
            .collect::<Vec<_>>();
        // The top of the stack is the first declared action.
        assert_eq!(labels, [Some("second"), None]);
    }

    #[test]
    fn test_unexpected_element() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <speed>1</speed>
                <fire><bullet/></fire>
              </action>
            </bulletml>"#,
        );
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        assert_eq!(
            recorder.errors,
            [EngineError::UnexpectedElement {
                kind: ElementKind::Speed,
            }],
        );
        assert_eq!(recorder.bullets.len(), 1);
    }

    #[test]
    fn test_rank() {
        let mut engine = engine(
            r#"<bulletml>
              <action label="top">
                <fire><speed>1 + $rank * 2</speed><bullet/></fire>
              </action>
            </bulletml>"#,
        );
        engine.set_rank_value(0.5);
        let mut shooter = top_shooter(&engine);
        let mut recorder = Recorder::default();
        run_to_end(&mut engine, &mut shooter, &mut recorder);

        assert_eq!(engine.config().rank, 0.5);
        assert_eq!(recorder.bullets[0].speed, 2.);
    }
}
