// =============================================================================
// MinimalOS NextGen — Kernel Drivers
// =============================================================================
//
// IMPORTANT DESIGN NOTE:
//   These are the ONLY drivers that live in kernel space. They exist here
//   because the window compositor and scheduler need them before any
//   other code can run:
//
//   input.rs — PS/2 keyboard/mouse bring-up (decoding lives in khal,
//              routing in traps::handlers and gui::Desktop)
//
//   Everything else the original system described (disk, network, USB,
//   GPU, audio) is out of scope for this kernel.
// =============================================================================

pub mod input;
