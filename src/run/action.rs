// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use std::rc::Rc;

use crate::data::{Element, Parameters};

/// A cursor into an action being executed.
///
/// Bullets hold a stack of these; the top one is the action currently running. The parameters
/// are the `$1..$N` bindings visible to the action's body and never change once the runner is
/// created.
#[derive(Debug, Clone)]
pub struct ActionRunner {
    action: Rc<Element>,
    program_counter: usize,
    wait_frames: u32,
    finished: bool,
    params: Rc<Parameters>,
    depth: usize,
}

impl ActionRunner {
    /// A runner at the start of an action.
    pub fn new(action: Rc<Element>, params: Rc<Parameters>) -> Self {
        ActionRunner {
            action,
            program_counter: 0,
            wait_frames: 0,
            finished: false,
            params,
            depth: 0,
        }
    }

    /// The same runner, entered through `depth` levels of actions.
    pub(crate) fn at_depth(self, depth: usize) -> Self {
        ActionRunner {
            depth,
            ..self
        }
    }

    /// The action being run.
    pub fn action(&self) -> &Rc<Element> {
        &self.action
    }

    /// The index of the next command.
    pub fn program_counter(&self) -> usize {
        self.program_counter
    }

    /// Frames left before the next command runs.
    pub fn wait_frames(&self) -> u32 {
        self.wait_frames
    }

    /// Whether the action was ended early.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The parameters bound for the action.
    pub fn parameters(&self) -> &Rc<Parameters> {
        &self.params
    }

    /// How many actions were entered to reach this one.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The next command, unless the action is over.
    pub(crate) fn current(&self) -> Option<&Rc<Element>> {
        if self.finished {
            None
        } else {
            self.action.children().get(self.program_counter)
        }
    }

    pub(crate) fn advance(&mut self) {
        self.program_counter += 1;
    }

    pub(crate) fn wait(&mut self, frames: u32) {
        self.wait_frames = frames;
    }

    /// Consume one frame of waiting; returns `false` when there was nothing to wait for.
    pub(crate) fn count_down(&mut self) -> bool {
        if self.wait_frames > 0 {
            self.wait_frames -= 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished = true;
    }
}
