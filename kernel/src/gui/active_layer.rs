//! Input routing: tracks which layer has keyboard/mouse focus, converts
//! PS/2 events into messages for the owning task, and hit-tests clicks
//! against the layer stack for focus changes and dragging.

use alloc::collections::BTreeMap;

use crate::error::Error;
use crate::gui::geometry::Vec2;
use crate::gui::layer::LayerManager;
use crate::message::Message;

pub struct ActiveLayer {
    active: u32,
    mouse_layer: u32,
    mouse_pos: Vec2,
    drag_layer: Option<u32>,
    layer_task: BTreeMap<u32, u64>,
}

impl ActiveLayer {
    pub fn new(mouse_layer: u32) -> Self {
        Self {
            active: 0,
            mouse_layer,
            mouse_pos: Vec2::new(0, 0),
            drag_layer: None,
            layer_task: BTreeMap::new(),
        }
    }

    /// Registers which task owns a given layer's window, so routed
    /// events know where to go.
    pub fn bind_task(&mut self, layer_id: u32, task_id: u64) {
        self.layer_task.insert(layer_id, task_id);
    }

    pub fn active_layer(&self) -> u32 {
        self.active
    }

    /// Makes `layer_id` the active (focused) layer, redrawing the old
    /// and new layers' chrome and raising the new one directly under
    /// the mouse cursor.
    pub fn activate(&mut self, layer_id: u32, layers: &mut LayerManager) -> Result<(), Error> {
        if layer_id == self.active {
            return Ok(());
        }

        if self.active != 0 {
            if let Some(old) = layers.layer(self.active) {
                if let Some(window) = old.window().cloned() {
                    window.lock().deactivate();
                }
            }
            layers.draw_layer(self.active)?;
            self.send(self.active, Message::WindowActive { layer_id: self.active, active: false });
        }

        self.active = layer_id;

        if self.active != 0 {
            if let Some(active) = layers.layer(self.active) {
                if let Some(window) = active.window().cloned() {
                    window.lock().activate();
                }
            }
            let under_mouse = layers.get_height(self.mouse_layer) - 1;
            layers.up_down(self.active, under_mouse.max(0));
            layers.draw_layer(self.active)?;
            self.send(self.active, Message::WindowActive { layer_id: self.active, active: true });
        }
        Ok(())
    }

    /// Moves the mouse cursor layer and, absent a drag, forwards the
    /// motion to whichever task owns the active layer.
    pub fn mouse_move(
        &mut self,
        dx: i32,
        dy: i32,
        buttons: u8,
        layers: &mut LayerManager,
    ) -> Result<(), Error> {
        let new_pos = self.mouse_pos + Vec2::new(dx, dy);
        layers.move_relative(self.mouse_layer, Vec2::new(dx, dy))?;
        self.mouse_pos = new_pos;

        if let Some(dragged) = self.drag_layer {
            layers.move_relative(dragged, Vec2::new(dx, dy))?;
        } else if self.active != 0 {
            self.send(
                self.active,
                Message::MouseMove { x: new_pos.x, y: new_pos.y, dx, dy, buttons },
            );
        }
        Ok(())
    }

    /// Left-button press: hit-test for focus/drag; release: end any drag.
    pub fn mouse_button(
        &mut self,
        press: bool,
        button: u8,
        layers: &mut LayerManager,
    ) -> Result<(), Error> {
        const BTN_LEFT: u8 = 0x01;
        if button != BTN_LEFT {
            return Ok(());
        }

        if !press {
            self.drag_layer = None;
            return Ok(());
        }

        match layers.find_layer_by_position(self.mouse_pos, self.mouse_layer) {
            Some(hit) => {
                let draggable = layers.layer(hit).map(|l| l.draggable).unwrap_or(false);
                self.activate(hit, layers)?;
                if draggable {
                    self.drag_layer = Some(hit);
                }
            }
            None => {
                self.activate(0, layers)?;
            }
        }
        Ok(())
    }

    /// Routes a message (typically a decoded keyboard event) to whichever
    /// task owns the currently active layer. A no-op if no layer is
    /// active or the active layer has no bound task.
    pub fn send_to_active(&self, msg: Message) {
        self.send(self.active, msg);
    }

    fn send(&self, layer_id: u32, msg: Message) {
        if let Some(&task_id) = self.layer_task.get(&layer_id) {
            crate::task::scheduler::send_message(task_id, msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gui::layer::LayerManager;
    use crate::gui::pixel::PixelFormat;
    use crate::gui::toplevel_window::ToplevelWindow;

    /// Two draggable toplevel windows; clicking each in turn moves focus
    /// and raises the clicked window to directly under the mouse cursor.
    #[test]
    fn focus_handoff_activates_and_raises_the_clicked_window() {
        let mut layers = LayerManager::new(200, 200, PixelFormat::Rgbx8);
        let mouse_layer = layers.new_layer();
        let mut active = ActiveLayer::new(mouse_layer);

        let win_a = ToplevelWindow::new(50, 50, PixelFormat::Rgbx8).unwrap();
        let layer_a = layers.new_layer();
        layers.layer_mut(layer_a).unwrap().set_window(win_a.shared_window());
        layers.layer_mut(layer_a).unwrap().draggable = true;
        layers.move_layer(layer_a, Vec2::new(0, 0)).unwrap();
        layers.up_down(layer_a, 0);

        let win_b = ToplevelWindow::new(50, 50, PixelFormat::Rgbx8).unwrap();
        let layer_b = layers.new_layer();
        layers.layer_mut(layer_b).unwrap().set_window(win_b.shared_window());
        layers.layer_mut(layer_b).unwrap().draggable = true;
        layers.move_layer(layer_b, Vec2::new(100, 100)).unwrap();
        layers.up_down(layer_b, 1);

        layers.up_down(mouse_layer, 2);

        // Click inside window A.
        active.mouse_move(25, 25, 0, &mut layers).unwrap();
        active.mouse_button(true, 0x01, &mut layers).unwrap();
        active.mouse_button(false, 0x01, &mut layers).unwrap();

        assert_eq!(active.active_layer(), layer_a);
        assert!(win_a.window.lock().active);
        assert_eq!(layers.get_height(layer_a), layers.get_height(mouse_layer) - 1);

        // Click inside window B.
        active.mouse_move(100, 100, 0, &mut layers).unwrap();
        active.mouse_button(true, 0x01, &mut layers).unwrap();
        active.mouse_button(false, 0x01, &mut layers).unwrap();

        assert_eq!(active.active_layer(), layer_b);
        assert!(win_b.window.lock().active);
        assert!(!win_a.window.lock().active);
        assert_eq!(layers.get_height(layer_b), layers.get_height(mouse_layer) - 1);
    }
}
