//! Interrupt and exception handlers.

use x86_64::structures::idt::{InterruptStackFrame, PageFaultErrorCode};

use crate::gui;
use crate::message::Message;
use crate::task::scheduler;

/// IST index (in the TSS) carrying the dedicated double-fault stack.
pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

/// Breakpoint exception handler (INT 3).
///
/// This is a trap-type exception triggered by the `int3` instruction.
/// It's commonly used for debugging.
///
/// # Safety
///
/// This function must only be called by the CPU as an interrupt handler.
pub extern "x86-interrupt" fn breakpoint_handler(_stack_frame: InterruptStackFrame) {
    klog::info!("[020] Breakpoint exception triggered!");
}

/// Double fault handler. A double fault means the CPU failed to invoke
/// a handler for a prior exception; by the time we're here the machine
/// state may be unreliable, so we only log and halt.
pub extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) -> ! {
    klog::error!("DOUBLE FAULT: {:#?}", stack_frame);
    crate::arch::x86_64::cpu::halt_forever();
}

/// Page fault handler. Logs the faulting address and the frame, then
/// halts — this kernel has no demand paging or user-space recovery
/// path to resume from.
pub extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    let fault_addr = crate::arch::x86_64::cpu::read_cr2();
    klog::error!(
        "PAGE FAULT at {:#x}, error={:?}\n{:#?}",
        fault_addr,
        error_code,
        stack_frame
    );
    crate::arch::x86_64::cpu::halt_forever();
}

/// Spurious interrupt handler (vector 0xFF). The LAPIC raises this
/// when an interrupt is withdrawn before it can be serviced; the spec
/// for it is simply "do nothing, don't even send EOI".
pub extern "x86-interrupt" fn spurious_handler(_stack_frame: InterruptStackFrame) {}

/// LAPIC timer interrupt (vector `khal::apic::TIMER_VECTOR`). Advances
/// the tick counter, delivers any timers that came due as messages, and
/// preempts the running task if the task-switch sentinel fired.
pub extern "x86-interrupt" fn timer_handler(_stack_frame: InterruptStackFrame) {
    let result = crate::timer::tick();
    for (task_id, msg) in result.expired {
        scheduler::send_message(task_id, msg);
    }
    khal::apic::eoi();
    if result.preempt_now {
        scheduler::preempt();
    }
}

/// Keyboard interrupt (IRQ1). Decodes the scancode into a structured
/// event and routes it to whichever task owns the active layer.
pub extern "x86-interrupt" fn keyboard_handler(_stack_frame: InterruptStackFrame) {
    let scancode = khal::keyboard::read_scancode();
    if let Some(event) = khal::keyboard::handle_scancode_event(scancode) {
        let pressed = event.state == khal::keyboard::KeyState::Pressed;
        let ascii = match event.key {
            khal::keyboard::KeyKind::Char(c) if c.is_ascii() => c as u8,
            _ => 0,
        };
        let msg = Message::KeyPush { modifier: 0, keycode: event.scancode, ascii, pressed };
        gui::desktop().lock().active.send_to_active(msg);
    }
    khal::keyboard::send_eoi();
}

/// Mouse interrupt (IRQ12). Feeds the raw byte into the PS/2 packet
/// decoder; once a full 3-byte packet assembles, routes the motion and
/// any button edges through the desktop's active-layer tracking.
pub extern "x86-interrupt" fn mouse_handler(_stack_frame: InterruptStackFrame) {
    let byte = khal::mouse::read_data();
    if let Some(packet) = khal::mouse::handle_byte(byte) {
        gui::desktop().lock().handle_mouse_packet(
            packet.dx as i32,
            packet.dy as i32,
            packet.buttons,
        );
    }
    khal::mouse::send_eoi();
}
