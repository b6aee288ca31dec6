//! A window with a title bar, the chrome every on-screen application
//! window gets. No glyph rendering (out of scope, §1) — the title bar is
//! a solid fill that brightens when the window is active, dimming when
//! it loses focus, and the border is a flat 1px frame.

use alloc::sync::Arc;
use spin::Mutex;

use crate::error::Error;
use crate::gui::geometry::{Rectangle, Vec2};
use crate::gui::layer::SharedWindow;
use crate::gui::pixel::{PixelColor, PixelFormat};
use crate::gui::window::Window;

pub const TITLE_BAR_HEIGHT: i32 = 24;
const BORDER_COLOR: PixelColor = PixelColor::new(0x50, 0x50, 0x50);
pub(crate) const TITLE_ACTIVE: PixelColor = PixelColor::new(0x00, 0x55, 0xAA);
pub(crate) const TITLE_INACTIVE: PixelColor = PixelColor::new(0x30, 0x30, 0x30);

pub struct ToplevelWindow {
    pub window: SharedWindow,
}

impl ToplevelWindow {
    pub fn new(width: i32, height: i32, format: PixelFormat) -> Result<Self, Error> {
        let window = Arc::new(Mutex::new(Window::new(width, height, format)));
        {
            let mut w = window.lock();
            // Installed before the initial paint so the exact same code
            // path repaints the title bar on every later real focus
            // change, routed through `Window::activate`/`deactivate`.
            w.set_chrome_repaint(repaint_title_bar);
            paint_border(&mut w)?;
            paint_title_bar(&mut w)?;
        }
        Ok(Self { window })
    }

    /// The shared window backing this toplevel, for registration with a
    /// `Layer` (the layer and this struct both hold a reference to it).
    pub fn shared_window(&self) -> SharedWindow {
        self.window.clone()
    }

    /// Rectangle (in window-local coordinates) available for content,
    /// below the title bar and inside the border.
    pub fn content_area(&self) -> Rectangle {
        let window = self.window.lock();
        Rectangle::new(
            Vec2::new(1, TITLE_BAR_HEIGHT + 1),
            Vec2::new(window.width() - 2, window.height() - TITLE_BAR_HEIGHT - 2),
        )
    }

    /// The title bar's own rectangle, in window-local coordinates — the
    /// dirty region `Activate`/`Deactivate` need to report upward.
    pub fn title_bar_rect(&self) -> Rectangle {
        Rectangle::new(Vec2::new(0, 0), Vec2::new(self.window.lock().width(), TITLE_BAR_HEIGHT + 1))
    }

    /// Convenience for callers that hold a `ToplevelWindow` directly rather
    /// than going through `ActiveLayer`/`Layer`'s `SharedWindow`. Focus
    /// changes routed through `ActiveLayer` reach the same repaint via
    /// `Window::activate`/`deactivate`'s chrome-repaint hook.
    pub fn activate(&self) {
        self.window.lock().activate();
    }

    pub fn deactivate(&self) {
        self.window.lock().deactivate();
    }
}

fn paint_border(window: &mut Window) -> Result<(), Error> {
    let w = window.width();
    let h = window.height();
    for x in 0..w {
        window.write(Vec2::new(x, 0), BORDER_COLOR)?;
        window.write(Vec2::new(x, h - 1), BORDER_COLOR)?;
    }
    for y in 0..h {
        window.write(Vec2::new(0, y), BORDER_COLOR)?;
        window.write(Vec2::new(w - 1, y), BORDER_COLOR)?;
    }
    Ok(())
}

fn paint_title_bar(window: &mut Window) -> Result<(), Error> {
    let color = if window.active { TITLE_ACTIVE } else { TITLE_INACTIVE };
    let w = window.width();
    for y in 1..TITLE_BAR_HEIGHT {
        for x in 1..(w - 1) {
            window.write(Vec2::new(x, y), color)?;
        }
    }
    Ok(())
}

/// `Window::chrome_repaint` hook for every `ToplevelWindow`: repaints the
/// title bar in the active/inactive color matching `window.active`.
fn repaint_title_bar(window: &mut Window) {
    let _ = paint_title_bar(window);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gui::pixel::PixelFormat;

    #[test]
    fn activate_brightens_title_bar_deactivate_dims_it() {
        let top = ToplevelWindow::new(40, 40, PixelFormat::Rgbx8).unwrap();
        let sample = Vec2::new(5, 5);
        assert_eq!(top.window.lock().read_pixel(sample), TITLE_INACTIVE);

        top.activate();
        assert_eq!(top.window.lock().read_pixel(sample), TITLE_ACTIVE);

        top.deactivate();
        assert_eq!(top.window.lock().read_pixel(sample), TITLE_INACTIVE);
    }
}
