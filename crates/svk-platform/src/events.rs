// SPDX-License-Identifier: CEPL-1.0
//! Window input as an injected capability set.
//!
//! The app hands any [`WindowEvents`] implementation to
//! [`dispatch_window_event`]; nothing has to inherit from a window type.

use tracing::trace;
use winit::event::{KeyEvent, MouseScrollDelta, WindowEvent};

pub trait WindowEvents {
    /// New inner size in physical pixels. Either dimension may be zero
    /// while the window is minimized.
    fn on_resize(&mut self, width: u32, height: u32);

    fn on_scroll(&mut self, _dx: f64, _dy: f64) {}

    fn on_key(&mut self, _key: &KeyEvent) {}
}

/// Forwards the events covered by [`WindowEvents`]. Returns `false` for
/// anything else so the caller can handle it.
pub fn dispatch_window_event<H>(handler: &mut H, event: &WindowEvent) -> bool
where
    H: WindowEvents + ?Sized,
{
    match event {
        WindowEvent::Resized(size) => {
            trace!("dispatch resize {}x{}", size.width, size.height);
            handler.on_resize(size.width, size.height);
            true
        }
        WindowEvent::MouseWheel { delta, .. } => {
            let (dx, dy) = scroll_delta(delta);
            handler.on_scroll(dx, dy);
            true
        }
        WindowEvent::KeyboardInput { event, .. } => {
            handler.on_key(event);
            true
        }
        _ => false,
    }
}

fn scroll_delta(delta: &MouseScrollDelta) -> (f64, f64) {
    match *delta {
        MouseScrollDelta::LineDelta(x, y) => (f64::from(x), f64::from(y)),
        MouseScrollDelta::PixelDelta(pos) => (pos.x, pos.y),
    }
}
