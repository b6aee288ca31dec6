//! An 80×25 grid of character cells. Glyph rendering is out of scope
//! (§1), so each cell is rendered as a solid foreground or background
//! block rather than a drawn character — the cell model (grid, cursor,
//! wrap, scroll) is the thing under test, not typography.

use alloc::sync::Arc;
use spin::Mutex;

use crate::error::Error;
use crate::gui::geometry::{Rectangle, Vec2};
use crate::gui::layer::SharedWindow;
use crate::gui::pixel::PixelFormat;
use crate::gui::pixel::PixelColor;
use crate::gui::window::Window;
use crate::message::{LayerOp, Message};

pub const COLS: i32 = 80;
pub const ROWS: i32 = 25;
const CELL_W: i32 = 8;
const CELL_H: i32 = 16;

pub struct ConsoleWindow {
    pub window: SharedWindow,
    pub layer_id: u32,
    fg: PixelColor,
    bg: PixelColor,
    cursor_col: i32,
    cursor_row: i32,
}

impl ConsoleWindow {
    pub fn new(layer_id: u32, fg: PixelColor, bg: PixelColor, format: PixelFormat) -> Result<Self, Error> {
        let window = Arc::new(Mutex::new(Window::new(COLS * CELL_W, ROWS * CELL_H, format)));
        let mut console = Self { window, layer_id, fg, bg, cursor_col: 0, cursor_row: 0 };
        console.clear()?;
        Ok(console)
    }

    /// The shared window backing this console, for registration with a
    /// `Layer` (the layer and the console both hold a reference to it).
    pub fn shared_window(&self) -> SharedWindow {
        self.window.clone()
    }

    fn clear(&mut self) -> Result<(), Error> {
        for row in 0..ROWS {
            for col in 0..COLS {
                self.fill_cell(col, row, self.bg)?;
            }
        }
        Ok(())
    }

    fn cell_rect(col: i32, row: i32) -> Rectangle {
        Rectangle::new(Vec2::new(col * CELL_W, row * CELL_H), Vec2::new(CELL_W, CELL_H))
    }

    fn fill_cell(&mut self, col: i32, row: i32, color: PixelColor) -> Result<(), Error> {
        let rect = Self::cell_rect(col, row);
        let mut window = self.window.lock();
        for y in rect.pos.y..rect.bottom() {
            for x in rect.pos.x..rect.right() {
                window.write(Vec2::new(x, y), color)?;
            }
        }
        Ok(())
    }

    fn scroll_one_row(&mut self) -> Result<(), Error> {
        {
            let mut window = self.window.lock();
            let width = window.width();
            window.move_rect(
                Vec2::new(0, 0),
                Rectangle::new(Vec2::new(0, CELL_H), Vec2::new(width, (ROWS - 1) * CELL_H)),
            );
        }
        for col in 0..COLS {
            self.fill_cell(col, ROWS - 1, self.bg)?;
        }
        Ok(())
    }

    /// Writes `s` starting at the cursor, wrapping at column 80 and
    /// scrolling when it would overflow row 25, then posts exactly one
    /// `Layer::DrawArea` naming the rectangle it touched.
    pub fn put_string(&mut self, s: &str) -> Result<(), Error> {
        let start_row = self.cursor_row;
        let mut scrolled = false;

        for c in s.chars() {
            if c == '\n' {
                self.newline(&mut scrolled)?;
                continue;
            }
            let color = if c == ' ' { self.bg } else { self.fg };
            self.fill_cell(self.cursor_col, self.cursor_row, color)?;
            self.cursor_col += 1;
            if self.cursor_col >= COLS {
                self.newline(&mut scrolled)?;
            }
        }

        let dirty = if scrolled {
            Rectangle::new(Vec2::new(0, 0), self.window.lock().size())
        } else {
            let top = start_row.min(self.cursor_row) * CELL_H;
            let bottom = (start_row.max(self.cursor_row) + 1) * CELL_H;
            Rectangle::new(Vec2::new(0, top), Vec2::new(self.window.lock().width(), bottom - top))
        };

        crate::task::scheduler::send_message(
            crate::task::scheduler::KERNEL_MAIN_TASK_ID,
            Message::Layer {
                op: LayerOp::DrawArea,
                layer_id: self.layer_id,
                x: dirty.pos.x,
                y: dirty.pos.y,
                w: dirty.size.x,
                h: dirty.size.y,
            },
        );
        Ok(())
    }

    fn newline(&mut self, scrolled: &mut bool) -> Result<(), Error> {
        self.cursor_col = 0;
        self.cursor_row += 1;
        if self.cursor_row >= ROWS {
            self.scroll_one_row()?;
            self.cursor_row = ROWS - 1;
            *scrolled = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_column_eighty() {
        let mut console =
            ConsoleWindow::new(1, PixelColor::WHITE, PixelColor::BLACK, PixelFormat::Rgbx8).unwrap();
        let line: alloc::string::String = core::iter::repeat('x').take(COLS as usize + 5).collect();
        console.put_string(&line).unwrap();
        assert_eq!(console.cursor_row, 1);
        assert_eq!(console.cursor_col, 5);
    }

    #[test]
    fn scrolls_when_exceeding_last_row() {
        let mut console =
            ConsoleWindow::new(1, PixelColor::WHITE, PixelColor::BLACK, PixelFormat::Rgbx8).unwrap();
        for _ in 0..(ROWS + 3) {
            console.put_string("line\n").unwrap();
        }
        assert_eq!(console.cursor_row, ROWS - 1);
    }
}
