//! Mouse input handoff between a UI thread and the render thread.
//!
//! A windowing callback thread records events into a [`SharedInput`]; the
//! render thread drains the accumulated state once per frame with
//! [`SharedInput::take`] and applies it, e.g. to an
//! [`OrbitViewController`]. This is the only scene-side state that may be
//! touched from two threads.

use std::sync::Arc;

use glam::DVec2;
use parking_lot::Mutex;

use crate::scene::orbit::OrbitViewController;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    fn index(self) -> usize {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        }
    }
}

/// Input accumulated since the last drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFrame {
    /// Last known cursor position in pixels.
    pub cursor: DVec2,
    /// Cursor motion while each button was held, by [`MouseButton`] order.
    pub drag: [DVec2; 3],
    /// Scroll wheel ticks, positive away from the user.
    pub scroll: f64,
    pub buttons: [bool; 3],
}

impl InputFrame {
    pub fn drag(&self, button: MouseButton) -> DVec2 {
        self.drag[button.index()]
    }

    pub fn is_pressed(&self, button: MouseButton) -> bool {
        self.buttons[button.index()]
    }

    /// Apply the accumulated motion: left drag orbits, middle drag pans,
    /// right drag and the wheel zoom.
    pub fn apply_to(&self, orbit: &mut OrbitViewController, zoom_per_tick: f64) {
        let left = self.drag(MouseButton::Left);
        if left != DVec2::ZERO {
            orbit.orbit(left);
        }
        let middle = self.drag(MouseButton::Middle);
        if middle != DVec2::ZERO {
            orbit.pan(middle);
        }
        let right = self.drag(MouseButton::Right);
        let zoom = self.scroll * zoom_per_tick - right.y * zoom_per_tick * 0.1;
        if zoom != 0.0 {
            orbit.zoom(zoom);
        }
    }
}

#[derive(Debug, Default)]
struct InputState {
    frame: InputFrame,
    dirty: bool,
}

/// Cloneable handle to input shared between threads.
#[derive(Debug, Clone, Default)]
pub struct SharedInput {
    state: Arc<Mutex<InputState>>,
}

impl SharedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, button: MouseButton, cursor: DVec2) {
        let mut state = self.state.lock();
        state.frame.buttons[button.index()] = true;
        state.frame.cursor = cursor;
        state.dirty = true;
    }

    pub fn release(&self, button: MouseButton, cursor: DVec2) {
        let mut state = self.state.lock();
        state.frame.buttons[button.index()] = false;
        state.frame.cursor = cursor;
        state.dirty = true;
    }

    /// Cursor moved to `cursor`; adds the motion to every held button's drag.
    pub fn motion(&self, cursor: DVec2) {
        let mut state = self.state.lock();
        let delta = cursor - state.frame.cursor;
        state.frame.cursor = cursor;
        for i in 0..3 {
            if state.frame.buttons[i] {
                state.frame.drag[i] += delta;
                state.dirty = true;
            }
        }
    }

    pub fn scroll(&self, ticks: f64) {
        let mut state = self.state.lock();
        state.frame.scroll += ticks;
        state.dirty = true;
    }

    /// Read and reset the accumulated motion. `None` when nothing happened
    /// since the previous call. Button and cursor state carry over.
    pub fn take(&self) -> Option<InputFrame> {
        let mut state = self.state.lock();
        if !state.dirty {
            return None;
        }
        state.dirty = false;
        let frame = state.frame.clone();
        state.frame.drag = [DVec2::ZERO; 3];
        state.frame.scroll = 0.0;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;
    use crate::math::Pose;

    #[test]
    fn test_drag_accumulates_until_taken() {
        let input = SharedInput::new();
        assert_eq!(input.take(), None);

        input.press(MouseButton::Left, DVec2::new(10.0, 10.0));
        input.motion(DVec2::new(15.0, 12.0));
        input.motion(DVec2::new(20.0, 10.0));
        let frame = input.take().unwrap();
        assert_eq!(frame.drag(MouseButton::Left), DVec2::new(10.0, 0.0));
        assert!(frame.is_pressed(MouseButton::Left));

        assert_eq!(input.take(), None);
        input.motion(DVec2::new(21.0, 10.0));
        assert_eq!(input.take().unwrap().drag(MouseButton::Left), DVec2::new(1.0, 0.0));
    }

    #[test]
    fn test_motion_without_button_is_not_a_drag() {
        let input = SharedInput::new();
        input.motion(DVec2::new(5.0, 5.0));
        assert_eq!(input.take(), None);
    }

    #[test]
    fn test_events_from_another_thread() {
        let input = SharedInput::new();
        let producer = input.clone();
        std::thread::spawn(move || {
            for _ in 0..10 {
                producer.scroll(1.0);
            }
        })
        .join()
        .unwrap();
        assert_eq!(input.take().unwrap().scroll, 10.0);
    }

    #[test]
    fn test_scroll_zooms_orbit() {
        let pose = Pose::look_at(DVec3::new(-5.0, 0.0, 0.0), DVec3::ZERO, DVec3::Z);
        let mut orbit = OrbitViewController::new(pose, DVec3::ZERO);
        let input = SharedInput::new();
        input.scroll(2.0);
        input.take().unwrap().apply_to(&mut orbit, 0.5);
        assert!((orbit.distance() - 4.0).abs() < 1e-9);
    }
}
