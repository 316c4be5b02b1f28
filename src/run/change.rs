// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

/// A linear ramp of a scalar value over a number of frames.
///
/// Used for both `changeDirection` and `changeSpeed`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeInfo {
    start: f32,
    target: f32,
    duration: u32,
    current_frame: u32,
    active: bool,
}

impl ChangeInfo {
    /// A ramp from `start` to `target` over `duration` frames.
    ///
    /// The duration is at least one frame.
    pub fn new(start: f32, target: f32, duration: u32) -> Self {
        Self {
            start,
            target,
            duration: duration.max(1),
            current_frame: 0,
            active: true,
        }
    }

    /// The value at the start of the ramp.
    pub fn start(&self) -> f32 {
        self.start
    }

    /// The value at the end of the ramp.
    pub fn target(&self) -> f32 {
        self.target
    }

    /// The length of the ramp in frames.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// The number of frames which have elapsed.
    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    /// Whether the ramp is still in progress.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Advance the ramp by one frame and return the new value.
    ///
    /// Once the last frame is reached the target is returned exactly and the ramp deactivates.
    /// Inactive ramps return `None`.
    pub fn advance(&mut self) -> Option<f32> {
        if !self.active {
            return None;
        }

        self.current_frame += 1;
        if self.current_frame >= self.duration {
            self.current_frame = self.duration;
            self.active = false;
            Some(self.target)
        } else {
            let t = self.current_frame as f32 / self.duration as f32;
            Some(self.start + (self.target - self.start) * t)
        }
    }
}

impl Default for ChangeInfo {
    fn default() -> Self {
        Self {
            start: 0.,
            target: 0.,
            duration: 1,
            current_frame: 0,
            active: false,
        }
    }
}

/// A linear ramp of an acceleration from zero to `(horizontal, vertical)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelInfo {
    horizontal: f32,
    vertical: f32,
    duration: u32,
    current_frame: u32,
    active: bool,
}

impl AccelInfo {
    /// A ramp to the given components over `duration` frames.
    pub fn new(horizontal: f32, vertical: f32, duration: u32) -> Self {
        Self {
            horizontal,
            vertical,
            duration: duration.max(1),
            current_frame: 0,
            active: true,
        }
    }

    /// The final horizontal component.
    pub fn horizontal(&self) -> f32 {
        self.horizontal
    }

    /// The final vertical component.
    pub fn vertical(&self) -> f32 {
        self.vertical
    }

    /// The length of the ramp in frames.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// The number of frames which have elapsed.
    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    /// Whether the ramp is still in progress.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Advance the ramp by one frame and return the `(horizontal, vertical)` acceleration.
    pub fn advance(&mut self) -> Option<(f32, f32)> {
        if !self.active {
            return None;
        }

        self.current_frame += 1;
        if self.current_frame >= self.duration {
            self.current_frame = self.duration;
            self.active = false;
            Some((self.horizontal, self.vertical))
        } else {
            let t = self.current_frame as f32 / self.duration as f32;
            Some((self.horizontal * t, self.vertical * t))
        }
    }
}

impl Default for AccelInfo {
    fn default() -> Self {
        Self {
            horizontal: 0.,
            vertical: 0.,
            duration: 1,
            current_frame: 0,
            active: false,
        }
    }
}
