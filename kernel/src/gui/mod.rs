//! The windowing subsystem: geometry, pixel formats, framebuffers,
//! windows, the compositing layer manager, and input routing.

pub mod active_layer;
pub mod console_window;
pub mod framebuffer;
pub mod geometry;
pub mod layer;
pub mod pixel;
pub mod toplevel_window;
pub mod window;

use spin::Once;

use crate::message::{LayerOp, Message};
use crate::sync::spinlock::SpinLock;
use active_layer::ActiveLayer;
use framebuffer::FrameBuffer;
use layer::LayerManager;
use pixel::{PixelFormat, PixelSink};

/// The whole window system as a single global: the compositor's layer
/// stack and the input-routing state, plus the edge-detector state
/// needed to turn raw PS/2 mouse packets into press/release events.
pub struct Desktop {
    pub layers: LayerManager,
    pub active: ActiveLayer,
    pub screen: FrameBuffer,
    last_mouse_buttons: u8,
}

static DESKTOP: Once<SpinLock<Desktop>> = Once::new();

/// Creates the layer manager and mouse cursor layer, backed by `screen`
/// (the real, Limine-provided framebuffer). Must be called exactly once
/// during boot, after the framebuffer is known.
pub fn init(screen: FrameBuffer, format: PixelFormat) {
    DESKTOP.call_once(|| {
        let mut layers = LayerManager::new(screen.width(), screen.height(), format);
        let mouse_layer = layers.new_layer();
        SpinLock::new(Desktop {
            layers,
            active: ActiveLayer::new(mouse_layer),
            screen,
            last_mouse_buttons: 0,
        })
    });
}

/// The global desktop. Panics if `init` has not run yet.
pub fn desktop() -> &'static SpinLock<Desktop> {
    DESKTOP.get().expect("gui::init not called")
}

impl Desktop {
    /// Feeds one decoded PS/2 mouse packet through the active-layer
    /// router, diffing against the last-seen button mask to synthesize
    /// press/release edges, then presents the affected screen region.
    pub fn handle_mouse_packet(&mut self, dx: i32, dy: i32, buttons: u8) {
        let _ = self.active.mouse_move(dx, dy, buttons, &mut self.layers);

        let changed = buttons ^ self.last_mouse_buttons;
        for bit in [mouse_bit::LEFT, mouse_bit::RIGHT, mouse_bit::MIDDLE] {
            if changed & bit != 0 {
                let pressed = buttons & bit != 0;
                let _ = self.active.mouse_button(pressed, bit, &mut self.layers);
            }
        }
        self.last_mouse_buttons = buttons;

        let _ = self.layers.present(&mut self.screen, geometry::Rectangle::new(
            geometry::Vec2::new(0, 0),
            geometry::Vec2::new(self.screen.width(), self.screen.height()),
        ));
    }

    /// Task 1's own message-loop body: the sole consumer of
    /// `Layer::{Move,MoveRelative,Draw,DrawArea}`. Every op ends with a
    /// blit of the touched region to the real screen.
    pub fn handle_layer_message(&mut self, msg: Message) {
        let Message::Layer { op, layer_id, x, y, w, h } = msg else { return };

        let screen_area = geometry::Rectangle::new(
            geometry::Vec2::new(0, 0),
            geometry::Vec2::new(self.screen.width(), self.screen.height()),
        );

        let present_area = match op {
            // Move/MoveRelative/Draw already redraw both the vacated and
            // the landing area into the back buffer; presenting the whole
            // screen is simplest and these ops are rare compared to
            // DrawArea (posted on every console PutString).
            LayerOp::Move => {
                let _ = self.layers.move_layer(layer_id, geometry::Vec2::new(x, y));
                screen_area
            }
            LayerOp::MoveRelative => {
                let _ = self.layers.move_relative(layer_id, geometry::Vec2::new(x, y));
                screen_area
            }
            LayerOp::Draw => {
                let _ = self.layers.draw_layer(layer_id);
                screen_area
            }
            LayerOp::DrawArea => {
                let pos = self.layers.layer(layer_id).map(|l| l.pos()).unwrap_or_default();
                let area = geometry::Rectangle::new(
                    pos + geometry::Vec2::new(x, y),
                    geometry::Vec2::new(w, h),
                );
                let _ = self.layers.draw(area);
                area
            }
        };

        let _ = self.layers.present(&mut self.screen, present_area);
    }
}

mod mouse_bit {
    pub const LEFT: u8 = 0x01;
    pub const RIGHT: u8 = 0x02;
    pub const MIDDLE: u8 = 0x04;
}
