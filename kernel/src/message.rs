//! The kernel message bus: a tagged-union event delivered exclusively to
//! per-task FIFO queues (there is no global queue). Producers are
//! interrupt handlers (timer, keyboard, mouse), the timer service, and
//! the window compositor; the sole consumers are task bodies, which
//! drain their own queue via `task::scheduler::receive_message`.

/// Which edge of a layer operation this message requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerOp {
    Move,
    MoveRelative,
    Draw,
    DrawArea,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Placeholder for a bus that has nothing to deliver; never queued.
    Null,
    /// An xHCI controller interrupt fired (USB stack is an external
    /// collaborator; the CORE only needs to know one happened).
    InterruptXHCI,
    /// A timer registered via `TimerManager::AddTimer` has come due.
    TimerTimeout { timeout: u64, value: i32 },
    /// A key was pressed or released.
    KeyPush {
        modifier: u8,
        keycode: u8,
        ascii: u8,
        pressed: bool,
    },
    /// The mouse moved; `dx`/`dy` are the relative deltas.
    MouseMove {
        x: i32,
        y: i32,
        dx: i32,
        dy: i32,
        buttons: u8,
    },
    /// A mouse button changed state.
    MouseButton { x: i32, y: i32, press: bool, button: u8 },
    /// A request to the window compositor concerning one layer.
    Layer {
        op: LayerOp,
        layer_id: u32,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
    },
    /// Sent back to the requester once a `Layer` message has been
    /// serviced, so callers can wait for their redraw to land.
    LayerFinish,
    /// The named layer became (or stopped being) the active layer.
    WindowActive { layer_id: u32, active: bool },
}

impl Message {
    pub const fn is_null(&self) -> bool {
        matches!(self, Message::Null)
    }
}

impl Default for Message {
    fn default() -> Self {
        Message::Null
    }
}
