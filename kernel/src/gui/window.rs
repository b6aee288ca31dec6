//! A window: a uniquely-owned logical bitmap with a synchronized shadow
//! buffer. Grounded on the original `Window`/`WindowWriter` pair, but
//! unlike the original the pixel grid and the drawable surface are the
//! same object here — the shadow `FrameBuffer` both stores the window's
//! pixels and satisfies the `Copy`-based fast blit path from §4.3.

use alloc::string::String;

use crate::error::Error;
use crate::gui::framebuffer::FrameBuffer;
use crate::gui::geometry::{Rectangle, Vec2};
use crate::gui::pixel::{PixelColor, PixelFormat, PixelSink};

pub struct Window {
    shadow: FrameBuffer,
    transparent: Option<PixelColor>,
    pub active: bool,
    pub title: Option<String>,
    chrome_repaint: Option<fn(&mut Window)>,
}

impl Window {
    pub fn new(width: i32, height: i32, format: PixelFormat) -> Self {
        Self {
            shadow: FrameBuffer::new_shadow(width, height, format),
            transparent: None,
            active: false,
            title: None,
            chrome_repaint: None,
        }
    }

    pub fn width(&self) -> i32 {
        self.shadow.width()
    }

    pub fn height(&self) -> i32 {
        self.shadow.height()
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width(), self.height())
    }

    pub fn set_transparent_color(&mut self, c: Option<PixelColor>) {
        self.transparent = c;
    }

    pub fn write(&mut self, pos: Vec2, color: PixelColor) -> Result<(), Error> {
        self.shadow.write(pos, color)
    }

    /// Draws this window's pixels into `dst` at `pos`, clipped to `area`
    /// (the caller's dirty rectangle, in `dst` coordinates).
    pub fn draw_to(&self, dst: &mut FrameBuffer, pos: Vec2, area: Rectangle) -> Result<(), Error> {
        let window_area = Rectangle::new(pos, self.size());
        let clip = window_area.intersect(&area).intersect(&dst.bounds());
        if clip.is_empty() {
            return Ok(());
        }

        match self.transparent {
            None => {
                let src_area = clip.translated(Vec2::new(-pos.x, -pos.y));
                dst.copy(clip.pos, &self.shadow, src_area)
            }
            Some(tc) => {
                for y in clip.pos.y..clip.bottom() {
                    for x in clip.pos.x..clip.right() {
                        let local = Vec2::new(x - pos.x, y - pos.y);
                        let c = self.shadow_pixel(local);
                        if c != tc {
                            dst.write(Vec2::new(x, y), c)?;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn shadow_pixel(&self, pos: Vec2) -> PixelColor {
        // The shadow buffer has no read accessor on the `PixelSink` trait
        // (writers don't need one); windows with a transparent color are
        // only ever the small mouse-cursor bitmap, so a direct reparse of
        // the packed bytes here is cheap and keeps `FrameBuffer` minimal.
        self.shadow.read_packed(pos)
    }

    /// Reads back a single pixel already written to this window's shadow
    /// buffer, e.g. to confirm a chrome repaint landed.
    pub fn read_pixel(&self, pos: Vec2) -> PixelColor {
        self.shadow.read_packed(pos)
    }

    /// Intra-window scroll, forwarded to the shadow buffer.
    pub fn move_rect(&mut self, dst_pos: Vec2, src_rect: Rectangle) {
        self.shadow.move_rect(dst_pos, src_rect);
    }

    /// Installs the hook window flavors with chrome (e.g. `ToplevelWindow`)
    /// use to repaint on focus change. Runs every time `activate`/
    /// `deactivate` flips `active`, including through the real focus-change
    /// path (`ActiveLayer::activate`), not just direct calls on this type.
    pub fn set_chrome_repaint(&mut self, f: fn(&mut Window)) {
        self.chrome_repaint = Some(f);
    }

    pub fn activate(&mut self) {
        self.active = true;
        if let Some(repaint) = self.chrome_repaint {
            repaint(self);
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        if let Some(repaint) = self.chrome_repaint {
            repaint(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_pixels_are_skipped() {
        let mut dst = FrameBuffer::new_shadow(4, 4, PixelFormat::Rgbx8);
        let mut win = Window::new(2, 2, PixelFormat::Rgbx8);
        win.set_transparent_color(Some(PixelColor::BLACK));
        win.write(Vec2::new(0, 0), PixelColor::BLACK).unwrap();
        win.write(Vec2::new(1, 1), PixelColor::WHITE).unwrap();
        dst.write(Vec2::new(0, 0), PixelColor::new(1, 2, 3)).unwrap();
        win.draw_to(&mut dst, Vec2::new(0, 0), dst.bounds()).unwrap();
        assert_eq!(dst.read_packed(Vec2::new(0, 0)), PixelColor::new(1, 2, 3));
        assert_eq!(dst.read_packed(Vec2::new(1, 1)), PixelColor::WHITE);
    }
}
