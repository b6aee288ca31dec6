//! The compositor. Ordered stack of layers, each binding a window to a
//! screen position; `Draw` composes the stack (or a slice of it) into an
//! offscreen back buffer and blits the result to the real screen.
//! Grounded on the original `Layer`/`LayerManager` (`layer.cpp`/`.hpp`),
//! extended with `Draw(id)`/`FindLayerByPosition`/`GetHeight` per §4.4.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::{Error, ErrorKind};
use crate::gui::framebuffer::FrameBuffer;
use crate::gui::geometry::{Rectangle, Vec2};
use crate::gui::pixel::PixelFormat;
use crate::gui::window::Window;
use alloc::sync::Arc;
use spin::Mutex;

pub type SharedWindow = Arc<Mutex<Window>>;

pub struct Layer {
    id: u32,
    pos: Vec2,
    window: Option<SharedWindow>,
    pub draggable: bool,
}

impl Layer {
    fn new(id: u32) -> Self {
        Self { id, pos: Vec2::new(0, 0), window: None, draggable: false }
    }

    pub const fn id(&self) -> u32 {
        self.id
    }

    pub const fn pos(&self) -> Vec2 {
        self.pos
    }

    pub fn set_window(&mut self, window: SharedWindow) {
        self.window = Some(window);
    }

    pub fn window(&self) -> Option<&SharedWindow> {
        self.window.as_ref()
    }

    pub fn size(&self) -> Vec2 {
        self.window.as_ref().map(|w| w.lock().size()).unwrap_or_default()
    }

    fn bounds(&self) -> Rectangle {
        Rectangle::new(self.pos, self.size())
    }

    fn draw_to(&self, dst: &mut FrameBuffer, area: Rectangle) -> Result<(), Error> {
        if let Some(window) = &self.window {
            window.lock().draw_to(dst, self.pos, area)?;
        }
        Ok(())
    }
}

pub struct LayerManager {
    back_buffer: FrameBuffer,
    layers: BTreeMap<u32, Layer>,
    layer_stack: Vec<u32>,
    latest_id: u32,
}

impl LayerManager {
    pub fn new(screen_width: i32, screen_height: i32, format: PixelFormat) -> Self {
        Self {
            back_buffer: FrameBuffer::new_shadow(screen_width, screen_height, format),
            layers: BTreeMap::new(),
            layer_stack: Vec::new(),
            latest_id: 0,
        }
    }

    pub fn new_layer(&mut self) -> u32 {
        self.latest_id += 1;
        let id = self.latest_id;
        self.layers.insert(id, Layer::new(id));
        id
    }

    pub fn layer_mut(&mut self, id: u32) -> Option<&mut Layer> {
        self.layers.get_mut(&id)
    }

    pub fn layer(&self, id: u32) -> Option<&Layer> {
        self.layers.get(&id)
    }

    /// Index in `layer_stack`, or `-1` if hidden.
    pub fn get_height(&self, id: u32) -> i32 {
        self.layer_stack.iter().position(|&l| l == id).map(|i| i as i32).unwrap_or(-1)
    }

    pub fn hide(&mut self, id: u32) {
        if let Some(pos) = self.layer_stack.iter().position(|&l| l == id) {
            self.layer_stack.remove(pos);
        }
    }

    /// See §4.4: clamps, inserts if absent, otherwise erase+reinsert at
    /// the clamped index (decrementing when reinsertion lands past the
    /// end, so the index names the final position).
    pub fn up_down(&mut self, id: u32, new_height: i32) {
        if new_height < 0 {
            self.hide(id);
            return;
        }
        let len = self.layer_stack.len();
        let new_height = (new_height as usize).min(len);

        let old_pos = self.layer_stack.iter().position(|&l| l == id);
        match old_pos {
            None => {
                self.layer_stack.insert(new_height, id);
            }
            Some(old_pos) => {
                self.layer_stack.remove(old_pos);
                let insert_at = if new_height == self.layer_stack.len() + 1 {
                    new_height - 1
                } else {
                    new_height
                }
                .min(self.layer_stack.len());
                self.layer_stack.insert(insert_at, id);
            }
        }
    }

    pub fn move_layer(&mut self, id: u32, new_pos: Vec2) -> Result<(), Error> {
        let old_bounds = self.layer(id).map(|l| l.bounds()).unwrap_or_default();
        if let Some(layer) = self.layer_mut(id) {
            layer.pos = new_pos;
        } else {
            return Err(crate::make_error!(ErrorKind::IndexOutOfRange));
        }
        self.draw(old_bounds)?;
        self.draw_layer(id)
    }

    pub fn move_relative(&mut self, id: u32, delta: Vec2) -> Result<(), Error> {
        let new_pos = self.layer(id).map(|l| l.pos() + delta).unwrap_or_default();
        self.move_layer(id, new_pos)
    }

    /// Composites every layer in the stack (bottom-up) into the back
    /// buffer, clipped to `area`, then copies that region to the screen.
    pub fn draw(&mut self, area: Rectangle) -> Result<(), Error> {
        if area.is_empty() {
            return Ok(());
        }
        let stack = self.layer_stack.clone();
        for id in stack {
            if let Some(layer) = self.layers.get(&id) {
                layer.draw_to(&mut self.back_buffer, area)?;
            }
        }
        Ok(())
    }

    /// Fast path: redraws only from the named layer upward, over that
    /// layer's own bounds.
    pub fn draw_layer(&mut self, id: u32) -> Result<(), Error> {
        let height = self.get_height(id);
        if height < 0 {
            return Ok(());
        }
        let area = match self.layer(id) {
            Some(l) => l.bounds(),
            None => return Ok(()),
        };
        if area.is_empty() {
            return Ok(());
        }
        let slice: Vec<u32> = self.layer_stack[height as usize..].to_vec();
        for layer_id in slice {
            if let Some(layer) = self.layers.get(&layer_id) {
                layer.draw_to(&mut self.back_buffer, area)?;
            }
        }
        Ok(())
    }

    /// Blits the back buffer's `area` to the real screen.
    pub fn present(&mut self, screen: &mut FrameBuffer, area: Rectangle) -> Result<(), Error> {
        screen.copy(area.pos, &self.back_buffer, area)
    }

    /// Top-down scan for the first layer whose bounds contain `p`,
    /// excluding `exclude_id`.
    pub fn find_layer_by_position(&self, p: Vec2, exclude_id: u32) -> Option<u32> {
        self.layer_stack
            .iter()
            .rev()
            .find(|&&id| id != exclude_id && self.layers.get(&id).is_some_and(|l| l.bounds().contains(p)))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_down_with_negative_height_hides() {
        let mut mgr = LayerManager::new(100, 100, PixelFormat::Rgbx8);
        let id = mgr.new_layer();
        mgr.up_down(id, 0);
        assert_eq!(mgr.get_height(id), 0);
        mgr.up_down(id, -1);
        assert_eq!(mgr.get_height(id), -1);
    }

    #[test]
    fn up_down_clamps_above_stack_length() {
        let mut mgr = LayerManager::new(100, 100, PixelFormat::Rgbx8);
        let a = mgr.new_layer();
        let b = mgr.new_layer();
        mgr.up_down(a, 0);
        mgr.up_down(b, 100);
        assert_eq!(mgr.get_height(b), 1);
    }

    #[test]
    fn up_down_is_idempotent_at_unchanged_position() {
        let mut mgr = LayerManager::new(100, 100, PixelFormat::Rgbx8);
        let a = mgr.new_layer();
        let b = mgr.new_layer();
        mgr.up_down(a, 0);
        mgr.up_down(b, 1);
        let before = mgr.get_height(b);
        mgr.up_down(b, 1);
        assert_eq!(mgr.get_height(b), before);
    }

    #[test]
    fn find_layer_by_position_scans_top_down() {
        let mut mgr = LayerManager::new(100, 100, PixelFormat::Rgbx8);
        let bottom = mgr.new_layer();
        let top = mgr.new_layer();
        mgr.layer_mut(bottom).unwrap().window = Some(Arc::new(Mutex::new(Window::new(
            50, 50, PixelFormat::Rgbx8,
        ))));
        mgr.layer_mut(top).unwrap().window = Some(Arc::new(Mutex::new(Window::new(
            50, 50, PixelFormat::Rgbx8,
        ))));
        mgr.up_down(bottom, 0);
        mgr.up_down(top, 1);
        let found = mgr.find_layer_by_position(Vec2::new(10, 10), 0);
        assert_eq!(found, Some(top));
    }
}
